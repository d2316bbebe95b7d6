use crate::actor::{WebSocketError, WebSocketMessage};
use crate::node::context::{FollowerSocket, NodeContext};
use crate::protocol::{Body, NodeMessage, ToLeaderWebSocketOpen, WebSocketClose, WebSocketFrame};
use crate::relay::{RelayConn, RelayError};
use crate::types::WebSocketId;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;

/// Whether the leader has confirmed a follower-side socket yet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum OpenState {
    Pending,
    Open,
    Closed { code: u16, reason: String },
}

/// Work for a follower-side writer, in client order.
pub(crate) enum RelayFrame {
    Message {
        message: WebSocketMessage,
        /// Completed once the leader acks the frame.
        ack: Option<oneshot::Sender<Result<(), WebSocketError>>>,
    },
    Close {
        code: Option<u16>,
        reason: Option<String>,
    },
}

/// Publishes the open and waits for the leader to confirm it. Re-publishes whenever the
/// confirmation doesn't arrive within the open timeout.
pub(crate) async fn open_on_leader(
    ctx: &NodeContext,
    conn: &RelayConn,
    open: ToLeaderWebSocketOpen,
    mut open_state: watch::Receiver<OpenState>,
) -> Result<(), WebSocketError> {
    let attempts = ctx.options.message_retries + 1;

    for attempt in 1..=attempts {
        let message = NodeMessage::from_body(Body::ToLeaderWebSocketOpen(open.clone()));
        conn.publish_message_to_leader(message, true).await?;

        let waited = tokio::time::timeout(
            ctx.options.websocket_open_timeout,
            open_state.wait_for(|state| *state != OpenState::Pending),
        )
        .await;
        let outcome = match waited {
            Ok(Ok(state)) => state.clone(),
            Ok(Err(_)) => return Err(WebSocketError::NotOpen),
            Err(_) => {
                slog::warn!(
                    ctx.logger,
                    "Timed out waiting for websocket open";
                    "WebSocketId" => &open.websocket_id,
                    "Attempt" => attempt
                );
                continue;
            }
        };

        return match outcome {
            OpenState::Closed { code, reason } => {
                Err(WebSocketError::ClosedBeforeOpen { code, reason })
            }
            _ => Ok(()),
        };
    }

    Err(WebSocketError::OpenTimeout)
}

fn relay_failed(socket: &Weak<dyn FollowerSocket>, reason: &str) {
    if let Some(socket) = socket.upgrade() {
        socket.relay_failed(reason);
    }
}

fn close_message(
    websocket_id: &WebSocketId,
    code: Option<u16>,
    reason: Option<String>,
) -> NodeMessage {
    let close = WebSocketClose::new(websocket_id, code, reason);
    NodeMessage::from_body(Body::ToLeaderWebSocketClose(close))
}

/// Publishes one socket's frames to the leader in order, without retry. Acks are awaited
/// concurrently; the first failed frame fails the whole socket. Exits when the connection
/// disconnects or the socket is closed locally, in which case the close is the final message.
pub(crate) async fn run_writer(
    conn: Arc<RelayConn>,
    websocket_id: WebSocketId,
    mut frames: mpsc::UnboundedReceiver<RelayFrame>,
    socket: Weak<dyn FollowerSocket>,
) {
    let mut acks: JoinSet<Result<(), String>> = JoinSet::new();

    loop {
        tokio::select! {
            _ = conn.cancelled() => return,
            Some(joined) = acks.join_next() => {
                if let Ok(Err(reason)) = joined {
                    relay_failed(&socket, &reason);
                    return;
                }
            }
            frame = frames.recv() => match frame {
                Some(RelayFrame::Message { message, ack }) => {
                    let frame = WebSocketFrame::new(&websocket_id, message);
                    let message = NodeMessage::from_body(Body::ToLeaderWebSocketMessage(frame));

                    match conn.begin_publish_no_retry(message).await {
                        Ok(pending) => {
                            let conn = conn.clone();
                            acks.spawn(async move {
                                let result = conn.wait_for_ack(pending).await;
                                let failure = match &result {
                                    Ok(()) | Err(RelayError::Aborted) => None,
                                    Err(e) => Some(e.to_string()),
                                };
                                if let Some(ack) = ack {
                                    let _ = ack.send(result.map_err(WebSocketError::from));
                                }

                                failure.map_or(Ok(()), Err)
                            });
                        }
                        Err(e) => {
                            let aborted = matches!(e, RelayError::Aborted | RelayError::Disposed);
                            let reason = e.to_string();
                            if let Some(ack) = ack {
                                let _ = ack.send(Err(e.into()));
                            }
                            if !aborted {
                                relay_failed(&socket, &reason);
                            }
                            return;
                        }
                    }
                }
                Some(RelayFrame::Close { code, reason }) => {
                    let close = close_message(&websocket_id, code, reason);
                    conn.disconnect(false, "WebSocket closed by client", Some(close)).await;
                    return;
                }
                None => {
                    let close = close_message(&websocket_id, None, None);
                    conn.disconnect(false, "WebSocket dropped", Some(close)).await;
                    return;
                }
            }
        }
    }
}
