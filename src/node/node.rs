use crate::actor::{ClientWebSocket, WebSocketError, CLOSE_GOING_AWAY};
use crate::node::context::{NodeContext, SocketKind};
use crate::node::pending::Pending;
use crate::node::proxy_websocket::ProxyWebSocket;
use crate::node::relay_websocket::RelayWebSocket;
use crate::peer::{ActorPeer, PeerSnapshot};
use crate::protocol::{self, Body, Encoding, NodeMessage};
use crate::protocol::{ToFollowerFetchResponse, ToLeaderFetch, ToLeaderWebSocketOpen};
use crate::relay::{RelayConn, RelayError};
use crate::types::{ActorId, NodeId, RequestId};
use bytes::Bytes;
use http::{HeaderMap, Request, Response, StatusCode};
use std::sync::Arc;
use tokio_util::sync::DropGuard;

/// One process's hub for actor traffic. Any node can serve any actor: traffic for actors led
/// elsewhere is relayed to the leader's node.
///
/// Dropping the node stops its background tasks without releasing leases. Call
/// [`Node::shutdown`] first to hand leadership off cleanly.
pub struct Node {
    ctx: Arc<NodeContext>,
    _stop_on_drop: DropGuard,
}

fn text_response(status: StatusCode, message: impl Into<String>) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from(message.into()));
    *response.status_mut() = status;
    response
}

fn into_response(fetched: ToFollowerFetchResponse) -> Response<Bytes> {
    let status = u16::try_from(fetched.status)
        .ok()
        .and_then(|status| StatusCode::from_u16(status).ok())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    if let Some(error) = fetched.error {
        return text_response(status, error);
    }

    let mut response = Response::new(fetched.body.unwrap_or_default());
    *response.status_mut() = status;
    *response.headers_mut() = protocol::headers_from_wire(&fetched.headers);
    response
}

async fn exchange(
    conn: &RelayConn,
    pending: &mut Pending<RequestId, ToFollowerFetchResponse>,
    message: NodeMessage,
) -> Result<ToFollowerFetchResponse, RelayError> {
    conn.publish_message_to_leader(message, true).await?;
    pending.wait().await.ok_or(RelayError::Aborted)
}

impl Node {
    pub(crate) fn new(ctx: Arc<NodeContext>) -> Self {
        let stop = ctx.shutdown.clone().drop_guard();
        Node {
            ctx,
            _stop_on_drop: stop,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.ctx.node_id
    }

    /// Relays an HTTP-shaped request to the actor's leader. Never fails: relay problems come back
    /// as 404 (no such actor), 503 (leader unreachable) or 504 (no response in time).
    pub async fn send_request(
        &self,
        actor_id: &ActorId,
        request: Request<Bytes>,
    ) -> Response<Bytes> {
        let request_id = RequestId::generate();
        let (parts, body) = request.into_parts();
        let url = parts
            .uri
            .path_and_query()
            .map_or_else(|| "/".to_string(), |path| path.as_str().to_string());
        let fetch = ToLeaderFetch {
            request_id: request_id.to_string(),
            actor_id: actor_id.to_string(),
            method: parts.method.to_string(),
            url,
            headers: protocol::headers_to_wire(&parts.headers),
            body: (!body.is_empty()).then_some(body),
        };

        let conn = match RelayConn::start(&self.ctx, actor_id).await {
            Ok(conn) => conn,
            Err(RelayError::ActorNotFound) => {
                return text_response(StatusCode::NOT_FOUND, "Actor not found");
            }
            Err(e) => {
                slog::warn!(
                    self.ctx.logger,
                    "Failed to reach actor: {}", e;
                    "ActorId" => %actor_id
                );
                return text_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string());
            }
        };

        // Registered before publishing. Dropped on every path below, which removes the entry.
        let mut pending = self.ctx.fetch_responses.register(request_id.clone());
        let message = NodeMessage::from_body(Body::ToLeaderFetch(fetch));
        let exchanged = exchange(&conn, &mut pending, message);
        let result = tokio::time::timeout(self.ctx.options.request_timeout, exchanged).await;
        drop(pending);
        conn.disconnect(false, "Request finished", None).await;

        match result {
            Ok(Ok(fetched)) => into_response(fetched),
            Ok(Err(RelayError::ActorNotFound)) => {
                text_response(StatusCode::NOT_FOUND, "Actor not found")
            }
            Ok(Err(e)) => {
                slog::warn!(
                    self.ctx.logger,
                    "Relayed request failed: {}", e;
                    "ActorId" => %actor_id,
                    "RequestId" => %request_id
                );
                text_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            Err(_) => {
                slog::warn!(
                    self.ctx.logger,
                    "Relayed request timed out";
                    "ActorId" => %actor_id,
                    "RequestId" => %request_id
                );
                text_response(StatusCode::GATEWAY_TIMEOUT, "Actor did not respond in time")
            }
        }
    }

    /// Opens a socket to the actor and returns once its leader has accepted it.
    pub async fn open_websocket(
        &self,
        actor_id: &ActorId,
        path: &str,
        encoding: Encoding,
        conn_params: Option<Bytes>,
    ) -> Result<RelayWebSocket, WebSocketError> {
        RelayWebSocket::open(&self.ctx, actor_id, path, encoding, conn_params).await
    }

    /// Relays a client socket this node already accepted to the actor's leader.
    pub async fn proxy_websocket(
        &self,
        actor_id: &ActorId,
        path: &str,
        encoding: Encoding,
        conn_params: Option<Bytes>,
        auth_data: Option<Bytes>,
        client: Arc<dyn ClientWebSocket>,
    ) -> Result<ProxyWebSocket, WebSocketError> {
        let open = ToLeaderWebSocketOpen {
            actor_id: String::new(),
            websocket_id: String::new(),
            url: path.to_string(),
            encoding: encoding as i32,
            conn_params,
            auth_data,
            headers: Vec::new(),
        };

        ProxyWebSocket::start(&self.ctx, SocketKind::Follower, actor_id, open, client).await
    }

    /// Like [`Node::proxy_websocket`], for a socket the actor handles itself. The upgrade
    /// request's headers travel to the leader.
    pub async fn handle_raw_websocket(
        &self,
        actor_id: &ActorId,
        path: &str,
        headers: &HeaderMap,
        auth_data: Option<Bytes>,
        client: Arc<dyn ClientWebSocket>,
    ) -> Result<ProxyWebSocket, WebSocketError> {
        let open = ToLeaderWebSocketOpen {
            actor_id: String::new(),
            websocket_id: String::new(),
            url: path.to_string(),
            encoding: Encoding::Json as i32,
            conn_params: None,
            auth_data,
            headers: protocol::headers_to_wire(headers),
        };

        ProxyWebSocket::start(&self.ctx, SocketKind::Raw, actor_id, open, client).await
    }

    /// `None` if this node holds no peer for the actor.
    pub fn peer_state(&self, actor_id: &ActorId) -> Option<PeerSnapshot> {
        let peers = self.ctx.actor_peers.lock().expect("actor_peers mutex guard poison");
        peers.get(actor_id).map(|peer| peer.snapshot())
    }

    /// Closes every socket, stops every actor this node leads and releases its leases, then stops
    /// dispatching.
    pub async fn shutdown(&self) {
        slog::info!(self.ctx.logger, "Node shutting down");
        self.ctx.close_all_websockets(CLOSE_GOING_AWAY, "Node shutting down");

        let peers: Vec<Arc<ActorPeer>> = self
            .ctx
            .actor_peers
            .lock()
            .expect("actor_peers mutex guard poison")
            .values()
            .cloned()
            .collect();
        for peer in peers {
            peer.dispose(true).await;
        }

        self.ctx.shutdown.cancel();
        slog::info!(self.ctx.logger, "Node shut down");
    }
}
