use crate::actor::{ClientWebSocket, WebSocketError, WebSocketMessage};
use crate::actor::{CLOSE_GOING_AWAY, CLOSE_INTERNAL_ERROR};
use crate::node::context::{FollowerSocket, NodeContext, SocketKind};
use crate::node::relay_socket::{self, OpenState, RelayFrame};
use crate::protocol::ToLeaderWebSocketOpen;
use crate::relay::RelayConn;
use crate::types::{ActorId, WebSocketId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// A client socket terminated on this node whose actor may live elsewhere. The embedding server
/// feeds client traffic in through `on_message` and `on_close`; leader traffic comes back out
/// through the `ClientWebSocket` sink.
///
/// Client frames sent before the leader confirms the open are held and flushed in order once it
/// does.
pub struct ProxyWebSocket {
    shared: Arc<ProxySocketShared>,
}

struct ProxySocketShared {
    logger: slog::Logger,
    ctx: Arc<NodeContext>,
    kind: SocketKind,
    websocket_id: WebSocketId,
    actor_id: ActorId,
    conn: Arc<RelayConn>,
    client: Arc<dyn ClientWebSocket>,
    frames: mpsc::UnboundedSender<RelayFrame>,
    open_state: watch::Sender<OpenState>,
    closed: AtomicBool,
}

impl ProxyWebSocket {
    /// Registers the socket and starts opening it on the leader in the background. `open` is
    /// completed with this socket's id.
    pub(crate) async fn start(
        ctx: &Arc<NodeContext>,
        kind: SocketKind,
        actor_id: &ActorId,
        mut open: ToLeaderWebSocketOpen,
        client: Arc<dyn ClientWebSocket>,
    ) -> Result<ProxyWebSocket, WebSocketError> {
        let conn = RelayConn::start(ctx, actor_id).await?;
        let websocket_id = WebSocketId::generate();
        let logger = ctx.logger.new(slog::o!(
            "ActorId" => actor_id.to_string(),
            "WebSocketId" => websocket_id.to_string()
        ));

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ProxySocketShared {
            logger,
            ctx: ctx.clone(),
            kind,
            websocket_id: websocket_id.clone(),
            actor_id: actor_id.clone(),
            conn: conn.clone(),
            client,
            frames: frames_tx,
            open_state: watch::channel(OpenState::Pending).0,
            closed: AtomicBool::new(false),
        });
        let socket: Arc<dyn FollowerSocket> = shared.clone();
        ctx.socket_table(kind).insert(websocket_id.clone(), socket.clone());

        open.actor_id = actor_id.to_string();
        open.websocket_id = websocket_id.to_string();
        let open_state = shared.open_state.subscribe();
        let opener = shared.clone();
        tokio::spawn(async move {
            let opened = relay_socket::open_on_leader(&opener.ctx, &conn, open, open_state).await;
            match opened {
                Ok(()) => {
                    let socket = Arc::downgrade(&socket);
                    relay_socket::run_writer(conn, websocket_id, frames_rx, socket).await
                }
                Err(e) => opener.open_failed(e).await,
            }
        });

        Ok(ProxyWebSocket { shared })
    }

    pub fn websocket_id(&self) -> &WebSocketId {
        &self.shared.websocket_id
    }

    pub fn actor_id(&self) -> &ActorId {
        &self.shared.actor_id
    }

    /// A frame from the client, relayed to the leader without retry.
    pub fn on_message(&self, message: WebSocketMessage) {
        if self.shared.closed.load(Ordering::Acquire) {
            slog::debug!(self.shared.logger, "Dropping client message for closed websocket");
            return;
        }

        let _ = self.shared.frames.send(RelayFrame::Message { message, ack: None });
    }

    /// The client closed its socket.
    pub fn on_close(&self, code: Option<u16>, reason: Option<String>) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        slog::debug!(self.shared.logger, "Client closed websocket");
        self.shared.ctx.socket_table(self.shared.kind).remove(&self.shared.websocket_id);
        let _ = self.shared.frames.send(RelayFrame::Close { code, reason });
    }
}

impl Drop for ProxyWebSocket {
    fn drop(&mut self) {
        self.on_close(None, None);
    }
}

impl ProxySocketShared {
    async fn open_failed(&self, e: WebSocketError) {
        slog::warn!(self.logger, "Failed to open websocket on leader: {}", e);
        self.ctx.socket_table(self.kind).remove(&self.websocket_id);

        let (code, reason) = match &e {
            WebSocketError::ClosedBeforeOpen { code, reason } => (*code, reason.clone()),
            other => (CLOSE_INTERNAL_ERROR, other.to_string()),
        };
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.client.close(code, &reason);
        }

        self.conn.disconnect(true, "WebSocket open failed", None).await;
    }

    fn close_client(&self, code: u16, reason: &str) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.client.close(code, reason);
        }
        self.open_state.send_replace(OpenState::Closed {
            code,
            reason: reason.to_string(),
        });

        let conn = self.conn.clone();
        let reason = reason.to_string();
        tokio::spawn(async move { conn.disconnect(true, &reason, None).await });
    }
}

impl FollowerSocket for ProxySocketShared {
    fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    fn handle_open(&self) {
        slog::debug!(self.logger, "Websocket opened on leader");
        self.open_state.send_replace(OpenState::Open);
    }

    fn handle_message(&self, message: WebSocketMessage) {
        if !self.closed.load(Ordering::Acquire) {
            self.client.send(message);
        }
    }

    fn handle_close(&self, code: u16, reason: &str) {
        slog::debug!(self.logger, "Websocket closed by leader"; "Code" => code, "Reason" => reason);
        self.close_client(code, reason);
    }

    fn relay_failed(&self, reason: &str) {
        slog::warn!(self.logger, "Websocket lost its leader: {}", reason);
        self.ctx.socket_table(self.kind).remove(&self.websocket_id);
        self.close_client(CLOSE_GOING_AWAY, "Actor leader changed");
    }
}
