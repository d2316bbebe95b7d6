use crate::actor::{CloseEvent, OutboundFrame, WebSocketContext, WebSocketOpenRequest};
use crate::actor::{CLOSE_INTERNAL_ERROR, CLOSE_NO_STATUS};
use crate::node::context::{LeaderWebSocket, NodeContext};
use crate::peer::ActorPeer;
use crate::protocol::{self, Body, NodeMessage, ToFollowerWebSocketOpen, ToLeaderWebSocketOpen};
use crate::protocol::{WebSocketClose, WebSocketFrame};
use crate::types::{ActorId, NodeId, WebSocketId};
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::mpsc;

fn open_confirmation(websocket_id: &WebSocketId) -> NodeMessage {
    NodeMessage::from_body(Body::ToFollowerWebSocketOpen(ToFollowerWebSocketOpen {
        websocket_id: websocket_id.to_string(),
    }))
}

/// Accepts a socket on behalf of the local actor.
///
/// `on_open` runs before the confirmation is published so it always precedes `on_message`.
/// Frames the actor sends from `on_open` are queued and only published after the confirmation.
/// If the confirmation can't be published the handler sees the socket close right away.
pub(super) async fn handle_open(
    ctx: Arc<NodeContext>,
    sender: Option<NodeId>,
    open: ToLeaderWebSocketOpen,
) {
    let Some(follower) = sender else {
        slog::error!(
            ctx.logger,
            "Websocket open without a sender node id";
            "WebSocketId" => &open.websocket_id
        );
        return;
    };
    let actor_id = ActorId::from(open.actor_id.clone());
    let websocket_id = WebSocketId::from(open.websocket_id.clone());
    let logger = ctx.logger.new(slog::o!(
        "ActorId" => actor_id.to_string(),
        "WebSocketId" => websocket_id.to_string()
    ));

    let already_open = ctx
        .leader_websockets
        .lock()
        .expect("leader_websockets mutex guard poison")
        .contains_key(&websocket_id);
    if already_open {
        // The follower missed our confirmation and asked again.
        slog::debug!(logger, "Repeating websocket open confirmation");
        ctx.publish(&follower, open_confirmation(&websocket_id)).await;
        return;
    }

    let Some(actor) = ActorPeer::get_leader_actor(&ctx, &actor_id).await else {
        slog::warn!(logger, "Websocket open for actor this node does not lead");
        return;
    };

    let encoding = open.encoding();
    let request = WebSocketOpenRequest {
        actor_id: actor_id.clone(),
        websocket_id: websocket_id.clone(),
        url: open.url,
        encoding,
        conn_params: open.conn_params,
        auth_data: open.auth_data,
        headers: protocol::headers_from_wire(&open.headers),
    };
    let handler = match ctx.router.connect_websocket(actor, request).await {
        Ok(handler) => handler,
        Err(e) => {
            slog::warn!(logger, "Actor rejected websocket: {}", e);
            let close =
                WebSocketClose::new(&websocket_id, Some(CLOSE_INTERNAL_ERROR), Some(e.to_string()));
            ctx.publish(&follower, NodeMessage::from_body(Body::ToFollowerWebSocketClose(close)))
                .await;
            return;
        }
    };

    let (context, frames) = WebSocketContext::new(websocket_id.clone(), actor_id.clone());
    let socket = LeaderWebSocket {
        actor_id,
        handler: handler.clone(),
        context: context.clone(),
    };
    let inserted = match ctx
        .leader_websockets
        .lock()
        .expect("leader_websockets mutex guard poison")
        .entry(websocket_id.clone())
    {
        Entry::Occupied(_) => false,
        Entry::Vacant(entry) => {
            entry.insert(socket);
            true
        }
    };
    if !inserted {
        // A repeated open raced this one through the handshake. The first one wins.
        slog::debug!(logger, "Discarding duplicate websocket handshake");
        ctx.publish(&follower, open_confirmation(&websocket_id)).await;
        return;
    }

    handler.on_open(&context);
    let confirmation = open_confirmation(&websocket_id).encode_to_bytes();
    if let Err(e) = ctx.driver.publish_to_node(&follower, confirmation).await {
        slog::warn!(logger, "Failed to confirm websocket open: {}", e);
        abandon_open(&ctx, &websocket_id);
        return;
    }
    slog::debug!(logger, "Websocket opened");

    tokio::spawn(run_writer(ctx.clone(), logger, follower, websocket_id, frames));
}

/// The follower never learned about the socket, so the actor must not keep treating it as open.
/// Its queued frames are dropped along with the writer that would have sent them.
fn abandon_open(ctx: &NodeContext, websocket_id: &WebSocketId) {
    let socket = ctx
        .leader_websockets
        .lock()
        .expect("leader_websockets mutex guard poison")
        .remove(websocket_id);
    let Some(socket) = socket else {
        return;
    };

    if socket.context.mark_closed() {
        let event = CloseEvent {
            code: CLOSE_INTERNAL_ERROR,
            reason: "Failed to confirm websocket open".to_string(),
            was_clean: false,
        };
        socket.handler.on_close(&socket.context, event);
    }
}

/// Publishes the actor's frames to the follower in order. Plain publishes: the follower has no
/// one to retry on behalf of.
async fn run_writer(
    ctx: Arc<NodeContext>,
    logger: slog::Logger,
    follower: NodeId,
    websocket_id: WebSocketId,
    mut frames: mpsc::UnboundedReceiver<OutboundFrame>,
) {
    while let Some(frame) = frames.recv().await {
        match frame {
            OutboundFrame::Message(message) => {
                let frame = WebSocketFrame::new(&websocket_id, message);
                let message = NodeMessage::from_body(Body::ToFollowerWebSocketMessage(frame));
                ctx.publish(&follower, message).await;
            }
            OutboundFrame::Close { code, reason } => {
                slog::debug!(logger, "Actor closed websocket"; "Code" => ?code);
                ctx.leader_websockets
                    .lock()
                    .expect("leader_websockets mutex guard poison")
                    .remove(&websocket_id);

                let close = WebSocketClose::new(&websocket_id, code, reason);
                let message = NodeMessage::from_body(Body::ToFollowerWebSocketClose(close));
                ctx.publish(&follower, message).await;
                return;
            }
        }
    }
}

fn lookup(ctx: &NodeContext, websocket_id: &WebSocketId) -> Option<LeaderWebSocket> {
    ctx.leader_websockets
        .lock()
        .expect("leader_websockets mutex guard poison")
        .get(websocket_id)
        .cloned()
}

pub(super) fn handle_message(ctx: &NodeContext, frame: WebSocketFrame) {
    let websocket_id = WebSocketId::from(frame.websocket_id.clone());
    let Some(socket) = lookup(ctx, &websocket_id) else {
        slog::warn!(
            ctx.logger,
            "Message for unknown leader websocket";
            "WebSocketId" => %websocket_id
        );
        return;
    };
    if ActorPeer::get_leader_peer(ctx, &socket.actor_id).is_none() {
        slog::warn!(
            ctx.logger,
            "Message for websocket of actor this node no longer leads";
            "ActorId" => %socket.actor_id,
            "WebSocketId" => %websocket_id
        );
        return;
    }

    socket.handler.on_message(&socket.context, frame.into_message());
}

pub(super) fn handle_close(ctx: &NodeContext, close: WebSocketClose) {
    let websocket_id = WebSocketId::from(close.websocket_id.clone());
    let socket = ctx
        .leader_websockets
        .lock()
        .expect("leader_websockets mutex guard poison")
        .remove(&websocket_id);
    let Some(socket) = socket else {
        slog::warn!(
            ctx.logger,
            "Close for unknown leader websocket";
            "WebSocketId" => %websocket_id
        );
        return;
    };

    if !socket.context.mark_closed() {
        return;
    }
    let event = CloseEvent {
        code: close.close_code().unwrap_or(CLOSE_NO_STATUS),
        reason: close.reason.unwrap_or_default(),
        was_clean: true,
    };
    slog::debug!(
        ctx.logger,
        "Follower closed websocket";
        "WebSocketId" => %websocket_id,
        "Code" => event.code
    );
    socket.handler.on_close(&socket.context, event);
}
