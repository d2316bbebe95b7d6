use crate::actor::{CloseEvent, ReadyState, WebSocketError, WebSocketEvent, WebSocketMessage};
use crate::actor::{CLOSE_GOING_AWAY, CLOSE_NO_STATUS};
use crate::node::context::{FollowerSocket, NodeContext};
use crate::node::relay_socket::{self, OpenState, RelayFrame};
use crate::protocol::{Body, Encoding, NodeMessage, ToLeaderWebSocketOpen, WebSocketClose};
use crate::relay::RelayConn;
use crate::types::{ActorId, WebSocketId};
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, oneshot, watch, Notify};

/// A socket to an actor that runs on whichever node leads it, driven entirely through the relay.
///
/// Events arrive in order through [`RelayWebSocket::recv`]: `Open` first, then messages, then
/// exactly one `Close`. A relay failure shows up as `Error` followed by a 1001 close. Dropping the
/// socket closes it.
pub struct RelayWebSocket {
    shared: Arc<RelaySocketShared>,
    events: mpsc::Receiver<WebSocketEvent>,
}

struct AdapterState {
    ready_state: ReadyState,
    // Delivered after everything already queued.
    pending_close: Option<CloseEvent>,
    close_delivered: bool,
}

struct RelaySocketShared {
    logger: slog::Logger,
    ctx: Arc<NodeContext>,
    websocket_id: WebSocketId,
    actor_id: ActorId,
    conn: Arc<RelayConn>,
    state: Mutex<AdapterState>,
    events: mpsc::Sender<WebSocketEvent>,
    close_ready: Notify,
    frames: mpsc::UnboundedSender<RelayFrame>,
    open_state: watch::Sender<OpenState>,
}

impl RelayWebSocket {
    pub(crate) async fn open(
        ctx: &Arc<NodeContext>,
        actor_id: &ActorId,
        path: &str,
        encoding: Encoding,
        conn_params: Option<Bytes>,
    ) -> Result<RelayWebSocket, WebSocketError> {
        let conn = RelayConn::start(ctx, actor_id).await?;
        let websocket_id = WebSocketId::generate();
        let logger = ctx.logger.new(slog::o!(
            "ActorId" => actor_id.to_string(),
            "WebSocketId" => websocket_id.to_string()
        ));

        let (events_tx, events_rx) = mpsc::channel(ctx.options.websocket_event_capacity);
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(RelaySocketShared {
            logger,
            ctx: ctx.clone(),
            websocket_id: websocket_id.clone(),
            actor_id: actor_id.clone(),
            conn: conn.clone(),
            state: Mutex::new(AdapterState {
                ready_state: ReadyState::Connecting,
                pending_close: None,
                close_delivered: false,
            }),
            events: events_tx,
            close_ready: Notify::new(),
            frames: frames_tx,
            open_state: watch::channel(OpenState::Pending).0,
        });
        let socket: Arc<dyn FollowerSocket> = shared.clone();

        // Registered before the open goes out, so the confirmation always finds us.
        ctx.relay_websockets.insert(websocket_id.clone(), socket.clone());

        let open = ToLeaderWebSocketOpen {
            actor_id: actor_id.to_string(),
            websocket_id: websocket_id.to_string(),
            url: path.to_string(),
            encoding: encoding as i32,
            conn_params,
            auth_data: None,
            headers: Vec::new(),
        };
        let open_state = shared.open_state.subscribe();
        let opened = relay_socket::open_on_leader(ctx, &conn, open, open_state).await;
        if let Err(e) = opened {
            slog::warn!(shared.logger, "Failed to open websocket: {}", e);
            ctx.relay_websockets.remove(&websocket_id);
            shared.mark_closed();

            // The leader may have accepted an open whose confirmation never arrived.
            let final_message = matches!(e, WebSocketError::OpenTimeout).then(|| {
                let close = WebSocketClose::new(&websocket_id, None, None);
                NodeMessage::from_body(Body::ToLeaderWebSocketClose(close))
            });
            conn.disconnect(final_message.is_none(), "WebSocket open failed", final_message)
                .await;
            return Err(e);
        }

        tokio::spawn(relay_socket::run_writer(
            conn,
            websocket_id,
            frames_rx,
            Arc::downgrade(&socket),
        ));

        Ok(RelayWebSocket {
            shared,
            events: events_rx,
        })
    }

    pub fn websocket_id(&self) -> &WebSocketId {
        &self.shared.websocket_id
    }

    pub fn actor_id(&self) -> &ActorId {
        &self.shared.actor_id
    }

    pub fn ready_state(&self) -> ReadyState {
        self.shared.lock().ready_state
    }

    /// Queues a frame for the leader. Delivery failures surface later as an `Error` event.
    pub fn send(&self, message: WebSocketMessage) -> Result<(), WebSocketError> {
        self.shared.enqueue(message, None)
    }

    /// Sends a frame and waits for the leader to ack it. A failure here also closes the socket.
    pub async fn send_acked(&self, message: WebSocketMessage) -> Result<(), WebSocketError> {
        let (tx, rx) = oneshot::channel();
        self.shared.enqueue(message, Some(tx))?;

        rx.await.unwrap_or(Err(WebSocketError::NotOpen))
    }

    /// Closes the socket and tells the leader. Repeated calls are no-ops.
    pub fn close(&self, code: Option<u16>, reason: Option<String>) {
        self.shared.close_locally(code, reason);
    }

    /// Next event, or `None` once the close has been delivered.
    pub async fn recv(&mut self) -> Option<WebSocketEvent> {
        loop {
            match self.events.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }

            {
                let mut state = self.shared.lock();
                if state.close_delivered {
                    return None;
                }
                if let Some(close) = state.pending_close.take() {
                    state.close_delivered = true;
                    return Some(WebSocketEvent::Close(close));
                }
            }

            tokio::select! {
                Some(event) = self.events.recv() => return Some(event),
                _ = self.shared.close_ready.notified() => {}
            }
        }
    }
}

impl Drop for RelayWebSocket {
    fn drop(&mut self) {
        self.shared.close_locally(None, None);
    }
}

impl RelaySocketShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, AdapterState> {
        self.state.lock().expect("AdapterState mutex guard poison")
    }

    fn enqueue(
        &self,
        message: WebSocketMessage,
        ack: Option<oneshot::Sender<Result<(), WebSocketError>>>,
    ) -> Result<(), WebSocketError> {
        if self.lock().ready_state != ReadyState::Open {
            return Err(WebSocketError::NotOpen);
        }

        self.frames
            .send(RelayFrame::Message { message, ack })
            .map_err(|_| WebSocketError::NotOpen)
    }

    /// Stores the close for `recv` and wakes it. Returns false if already closed.
    fn finish_close(&self, event: CloseEvent) -> bool {
        {
            let mut state = self.lock();
            if state.ready_state == ReadyState::Closed {
                return false;
            }
            state.ready_state = ReadyState::Closed;
            state.pending_close = Some(event.clone());
        }

        self.open_state.send_replace(OpenState::Closed {
            code: event.code,
            reason: event.reason,
        });
        self.close_ready.notify_one();
        true
    }

    /// Closed without an event, since the consumer never saw the socket.
    fn mark_closed(&self) {
        let mut state = self.lock();
        state.ready_state = ReadyState::Closed;
        state.close_delivered = true;
    }

    fn close_locally(&self, code: Option<u16>, reason: Option<String>) {
        let event = CloseEvent {
            code: code.unwrap_or(CLOSE_NO_STATUS),
            reason: reason.clone().unwrap_or_default(),
            was_clean: true,
        };
        if !self.finish_close(event) {
            return;
        }

        slog::debug!(self.logger, "Closing websocket");
        self.ctx.relay_websockets.remove(&self.websocket_id);
        let _ = self.frames.send(RelayFrame::Close { code, reason });
    }

    fn disconnect_from_leader(&self, reason: &str) {
        let conn = self.conn.clone();
        let reason = reason.to_string();
        tokio::spawn(async move { conn.disconnect(true, &reason, None).await });
    }
}

impl FollowerSocket for RelaySocketShared {
    fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    fn handle_open(&self) {
        {
            let mut state = self.lock();
            if state.ready_state != ReadyState::Connecting {
                slog::debug!(self.logger, "Ignoring repeated websocket open");
                return;
            }
            state.ready_state = ReadyState::Open;

            // First event on an empty queue, so there is always room.
            let _ = self.events.try_send(WebSocketEvent::Open);
        }

        self.open_state.send_replace(OpenState::Open);
    }

    fn handle_message(&self, message: WebSocketMessage) {
        let state = self.lock();
        if state.ready_state != ReadyState::Open {
            slog::debug!(self.logger, "Dropping message for websocket that isn't open");
            return;
        }

        match self.events.try_send(WebSocketEvent::Message(message)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                slog::warn!(self.logger, "Websocket event queue full, dropping message")
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    fn handle_close(&self, code: u16, reason: &str) {
        let event = CloseEvent {
            code,
            reason: reason.to_string(),
            was_clean: true,
        };
        if self.finish_close(event) {
            slog::debug!(
                self.logger,
                "Websocket closed by leader";
                "Code" => code,
                "Reason" => reason
            );
        }

        self.disconnect_from_leader(reason);
    }

    fn relay_failed(&self, reason: &str) {
        slog::warn!(self.logger, "Websocket lost its leader: {}", reason);
        self.ctx.relay_websockets.remove(&self.websocket_id);

        {
            let state = self.lock();
            if state.ready_state != ReadyState::Closed {
                let _ = self.events.try_send(WebSocketEvent::Error(reason.to_string()));
            }
        }
        self.finish_close(CloseEvent {
            code: CLOSE_GOING_AWAY,
            reason: "Actor leader changed".to_string(),
            was_clean: false,
        });

        self.disconnect_from_leader(reason);
    }
}
