use crate::actor::{Actor, ActorError, CloseEvent, WebSocketContext, WebSocketMessage};
use crate::protocol::Encoding;
use crate::types::{ActorId, WebSocketId};
use bytes::Bytes;
use http::{HeaderMap, Request, Response};
use std::sync::Arc;

/// Everything the leader knows about a socket the follower asked it to open.
#[derive(Clone, Debug)]
pub struct WebSocketOpenRequest {
    pub actor_id: ActorId,
    pub websocket_id: WebSocketId,
    /// Path plus query, as the client requested it.
    pub url: String,
    pub encoding: Encoding,
    pub conn_params: Option<Bytes>,
    pub auth_data: Option<Bytes>,
    /// Only set for raw pass-through sockets.
    pub headers: HeaderMap,
}

/// Callbacks for one socket on the leader side. They run on the node's dispatcher and must not
/// block; use the context to respond.
pub trait WebSocketHandler: Send + Sync {
    fn on_open(&self, ctx: &WebSocketContext) {
        let _ = ctx;
    }

    fn on_message(&self, ctx: &WebSocketContext, message: WebSocketMessage);

    fn on_close(&self, ctx: &WebSocketContext, event: CloseEvent) {
        let _ = (ctx, event);
    }
}

/// Bridge into the actor framework's request handling, supplied by the embedding application.
#[async_trait::async_trait]
pub trait ActorRouter: Send + Sync {
    async fn fetch(
        &self,
        actor: Arc<dyn Actor>,
        actor_id: &ActorId,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, ActorError>;

    async fn connect_websocket(
        &self,
        actor: Arc<dyn Actor>,
        request: WebSocketOpenRequest,
    ) -> Result<Arc<dyn WebSocketHandler>, ActorError>;
}
