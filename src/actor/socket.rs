use crate::relay::RelayError;
use crate::types::{ActorId, WebSocketId};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Close code used when the peer did not provide one.
pub(crate) const CLOSE_NO_STATUS: u16 = 1005;
pub(crate) const CLOSE_GOING_AWAY: u16 = 1001;
pub(crate) const CLOSE_INTERNAL_ERROR: u16 = 1011;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WebSocketMessage {
    Text(String),
    Binary(Bytes),
}

impl WebSocketMessage {
    pub fn is_binary(&self) -> bool {
        matches!(self, WebSocketMessage::Binary(_))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closed,
}

/// Events observed by the consumer of a relayed socket, in arrival order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WebSocketEvent {
    Open,
    Message(WebSocketMessage),
    /// A relay failure. Always followed by `Close`.
    Error(String),
    Close(CloseEvent),
}

#[derive(Debug, thiserror::Error)]
pub enum WebSocketError {
    #[error("WebSocket is not open")]
    NotOpen,
    #[error("WebSocket closed before open ({code}): {reason}")]
    ClosedBeforeOpen { code: u16, reason: String },
    #[error("Timed out waiting for the actor to accept the WebSocket")]
    OpenTimeout,
    #[error("Relay failure: {0}")]
    Relay(#[from] RelayError),
}

/// Sink for a real client socket terminated on this node. Implementations forward to their
/// transport and must not block.
pub trait ClientWebSocket: Send + Sync {
    fn send(&self, message: WebSocketMessage);
    fn close(&self, code: u16, reason: &str);
}

#[derive(Debug)]
pub(crate) enum OutboundFrame {
    Message(WebSocketMessage),
    Close { code: Option<u16>, reason: Option<String> },
}

/// Leader-side handle for one relayed socket. Frames are queued in order and published to the
/// follower that opened the socket.
#[derive(Clone)]
pub struct WebSocketContext {
    websocket_id: WebSocketId,
    actor_id: ActorId,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    closed: Arc<AtomicBool>,
}

impl WebSocketContext {
    pub(crate) fn new(
        websocket_id: WebSocketId,
        actor_id: ActorId,
    ) -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = WebSocketContext {
            websocket_id,
            actor_id,
            outbound: tx,
            closed: Arc::new(AtomicBool::new(false)),
        };

        (ctx, rx)
    }

    pub fn websocket_id(&self) -> &WebSocketId {
        &self.websocket_id
    }

    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    pub fn ready_state(&self) -> ReadyState {
        if self.closed.load(Ordering::Acquire) {
            ReadyState::Closed
        } else {
            ReadyState::Open
        }
    }

    pub fn send(&self, message: WebSocketMessage) -> Result<(), WebSocketError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WebSocketError::NotOpen);
        }

        self.outbound
            .send(OutboundFrame::Message(message))
            .map_err(|_| WebSocketError::NotOpen)
    }

    /// Closes the socket toward the follower. Repeated calls are no-ops.
    pub fn close(&self, code: Option<u16>, reason: Option<String>) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.outbound.send(OutboundFrame::Close { code, reason });
    }

    /// Marks the socket closed without notifying the follower, because the follower is the side
    /// that closed it. Returns false if it was already closed.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}
