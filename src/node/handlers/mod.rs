mod fetch;
mod websocket_follower;
mod websocket_leader;

use crate::node::context::NodeContext;
use crate::protocol::{Ack, Body, NodeMessage};
use crate::types::{MessageId, NodeId};
use std::sync::Arc;

/// Handles one inbound message. Acks are sent before the body is processed. Anything that has to
/// wait on an actor is spawned; everything else runs inline, so frames for one socket keep their
/// order.
pub(crate) fn dispatch(ctx: &Arc<NodeContext>, message: NodeMessage) {
    let NodeMessage {
        sender_node_id,
        message_id,
        body,
    } = message;
    let sender = sender_node_id.map(NodeId::from);

    let Some(body) = body else {
        slog::warn!(ctx.logger, "Dropping node message without a body");
        return;
    };
    slog::trace!(
        ctx.logger,
        "Received node message";
        "Kind" => body.kind(),
        "MessageId" => ?message_id
    );

    if let Some(message_id) = message_id {
        if let Body::Ack(_) = body {
            slog::warn!(ctx.logger, "Dropping ack asking for an ack"; "MessageId" => &message_id);
            return;
        }
        match &sender {
            Some(sender) => send_ack(ctx, sender.clone(), message_id),
            None => slog::warn!(
                ctx.logger,
                "Cannot ack message without a sender";
                "MessageId" => &message_id
            ),
        }
    }

    match body {
        Body::Ack(ack) => {
            let message_id = MessageId::from(ack.message_id);
            if !ctx.message_acks.resolve(&message_id, ()) {
                slog::debug!(ctx.logger, "No publish waiting on ack"; "MessageId" => %message_id);
            }
        }
        Body::ToLeaderFetch(fetch) => {
            tokio::spawn(fetch::handle_leader_fetch(ctx.clone(), sender, fetch));
        }
        Body::ToFollowerFetchResponse(response) => fetch::handle_fetch_response(ctx, response),
        Body::ToLeaderWebSocketOpen(open) => {
            tokio::spawn(websocket_leader::handle_open(ctx.clone(), sender, open));
        }
        Body::ToLeaderWebSocketMessage(frame) => websocket_leader::handle_message(ctx, frame),
        Body::ToLeaderWebSocketClose(close) => websocket_leader::handle_close(ctx, close),
        Body::ToFollowerWebSocketOpen(open) => websocket_follower::handle_open(ctx, open),
        Body::ToFollowerWebSocketMessage(frame) => websocket_follower::handle_message(ctx, frame),
        Body::ToFollowerWebSocketClose(close) => websocket_follower::handle_close(ctx, close),
    }
}

fn send_ack(ctx: &Arc<NodeContext>, sender: NodeId, message_id: String) {
    let ack = NodeMessage::from_body(Body::Ack(Ack { message_id }));
    let ctx = ctx.clone();
    tokio::spawn(async move { ctx.publish(&sender, ack).await });
}
