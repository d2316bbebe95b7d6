use crate::actor::{ActorBindings, ActorRegistry, ActorRouter};
use crate::actor::{WebSocketContext, WebSocketHandler, WebSocketMessage};
use crate::coordinate::CoordinateDriver;
use crate::node::pending::PendingTable;
use crate::options::CoordinateOptionsValidated;
use crate::peer::ActorPeer;
use crate::protocol::{NodeMessage, ToFollowerFetchResponse};
use crate::types::{ActorId, MessageId, NodeId, RequestId, WebSocketId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Follower-side end of a relayed socket, as seen by the dispatcher.
pub(crate) trait FollowerSocket: Send + Sync {
    fn actor_id(&self) -> &ActorId;

    /// The leader confirmed the open.
    fn handle_open(&self);

    fn handle_message(&self, message: WebSocketMessage);

    /// Closed by the leader, or torn down by this node. Nothing is sent back to the leader. The
    /// caller has already removed the socket from its table.
    fn handle_close(&self, code: u16, reason: &str);

    /// A live frame couldn't reach the leader. The socket removes itself from its table and
    /// closes.
    fn relay_failed(&self, reason: &str);
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum SocketKind {
    /// Raw pass-through of a client socket.
    Raw,
    /// `Node::open_websocket` adapter.
    Relay,
    /// Client socket terminated on this node and proxied to the leader.
    Follower,
}

pub(crate) struct SocketTable {
    sockets: Mutex<HashMap<WebSocketId, Arc<dyn FollowerSocket>>>,
}

impl SocketTable {
    fn new() -> Self {
        SocketTable {
            sockets: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<WebSocketId, Arc<dyn FollowerSocket>>> {
        self.sockets.lock().expect("SocketTable mutex guard poison")
    }

    pub fn insert(&self, websocket_id: WebSocketId, socket: Arc<dyn FollowerSocket>) {
        self.lock().insert(websocket_id, socket);
    }

    pub fn get(&self, websocket_id: &WebSocketId) -> Option<Arc<dyn FollowerSocket>> {
        self.lock().get(websocket_id).cloned()
    }

    pub fn remove(&self, websocket_id: &WebSocketId) -> Option<Arc<dyn FollowerSocket>> {
        self.lock().remove(websocket_id)
    }

    /// Removes and returns every socket bound to `actor_id`, or every socket if `None`.
    fn drain(&self, actor_id: Option<&ActorId>) -> Vec<Arc<dyn FollowerSocket>> {
        let mut sockets = self.lock();
        let ids: Vec<WebSocketId> = sockets
            .iter()
            .filter(|(_, socket)| actor_id.map_or(true, |actor_id| socket.actor_id() == actor_id))
            .map(|(id, _)| id.clone())
            .collect();

        ids.iter().filter_map(|id| sockets.remove(id)).collect()
    }
}

/// Leader-side socket: the actor's handshake callbacks plus the context they write through.
#[derive(Clone)]
pub(crate) struct LeaderWebSocket {
    pub actor_id: ActorId,
    pub handler: Arc<dyn WebSocketHandler>,
    pub context: WebSocketContext,
}

/// Everything one node shares between its components. Built once in `Node::start`. Each table
/// has its own lock and none is held across an await.
pub(crate) struct NodeContext {
    pub logger: slog::Logger,
    pub node_id: NodeId,
    pub options: CoordinateOptionsValidated,
    pub driver: Arc<dyn CoordinateDriver>,
    pub registry: ActorRegistry,
    pub router: Arc<dyn ActorRouter>,
    pub bindings: ActorBindings,
    /// Cancelled once the node shuts down or its handle is dropped.
    pub shutdown: CancellationToken,

    pub actor_peers: Mutex<HashMap<ActorId, Arc<ActorPeer>>>,
    pub message_acks: PendingTable<MessageId, ()>,
    pub fetch_responses: PendingTable<RequestId, ToFollowerFetchResponse>,
    pub raw_websockets: SocketTable,
    pub relay_websockets: SocketTable,
    pub follower_websockets: SocketTable,
    pub leader_websockets: Mutex<HashMap<WebSocketId, LeaderWebSocket>>,
}

pub(crate) struct NodeContextParts {
    pub logger: slog::Logger,
    pub node_id: NodeId,
    pub options: CoordinateOptionsValidated,
    pub driver: Arc<dyn CoordinateDriver>,
    pub registry: ActorRegistry,
    pub router: Arc<dyn ActorRouter>,
    pub bindings: ActorBindings,
}

impl NodeContext {
    pub fn new(parts: NodeContextParts) -> Arc<Self> {
        Arc::new(NodeContext {
            logger: parts.logger,
            node_id: parts.node_id,
            options: parts.options,
            driver: parts.driver,
            registry: parts.registry,
            router: parts.router,
            bindings: parts.bindings,
            shutdown: CancellationToken::new(),
            actor_peers: Mutex::new(HashMap::new()),
            message_acks: PendingTable::new(),
            fetch_responses: PendingTable::new(),
            raw_websockets: SocketTable::new(),
            relay_websockets: SocketTable::new(),
            follower_websockets: SocketTable::new(),
            leader_websockets: Mutex::new(HashMap::new()),
        })
    }

    pub fn socket_table(&self, kind: SocketKind) -> &SocketTable {
        match kind {
            SocketKind::Raw => &self.raw_websockets,
            SocketKind::Relay => &self.relay_websockets,
            SocketKind::Follower => &self.follower_websockets,
        }
    }

    /// Finds a follower-side socket the way inbound relay traffic is demultiplexed: raw first,
    /// then relay adapters, then proxied client sockets.
    pub fn find_follower_socket(
        &self,
        websocket_id: &WebSocketId,
    ) -> Option<(SocketKind, Arc<dyn FollowerSocket>)> {
        [SocketKind::Raw, SocketKind::Relay, SocketKind::Follower]
            .into_iter()
            .find_map(|kind| self.socket_table(kind).get(websocket_id).map(|socket| (kind, socket)))
    }

    /// Plain publish, no ack. Failures are logged.
    pub async fn publish(&self, node_id: &NodeId, message: NodeMessage) {
        if let Err(e) = self.driver.publish_to_node(node_id, message.encode_to_bytes()).await {
            slog::warn!(self.logger, "Failed to publish to node: {}", e; "Target" => %node_id);
        }
    }

    /// Closes every socket this node tracks for `actor_id`, on both the follower and leader side.
    /// Synchronous, so no inbound frame for the actor can be forwarded to a stale leader after it
    /// returns.
    pub fn close_actor_websockets(&self, actor_id: &ActorId, code: u16, reason: &str) {
        let mut closed = 0;
        for kind in [SocketKind::Raw, SocketKind::Relay, SocketKind::Follower] {
            for socket in self.socket_table(kind).drain(Some(actor_id)) {
                socket.handle_close(code, reason);
                closed += 1;
            }
        }
        slog::debug!(
            self.logger,
            "Closed follower websockets";
            "ActorId" => %actor_id,
            "Count" => closed
        );

        self.close_leader_websockets(actor_id, code, reason);
    }

    /// Tells followers that every socket this node serves for `actor_id` is gone.
    pub fn close_leader_websockets(&self, actor_id: &ActorId, code: u16, reason: &str) {
        let sockets: Vec<LeaderWebSocket> = {
            let mut table = self
                .leader_websockets
                .lock()
                .expect("leader_websockets mutex guard poison");
            let ids: Vec<WebSocketId> = table
                .iter()
                .filter(|(_, socket)| &socket.actor_id == actor_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| table.remove(id)).collect()
        };

        for socket in sockets {
            socket.context.close(Some(code), Some(reason.to_string()));
        }
    }

    /// Shutdown path: every socket regardless of actor.
    pub fn close_all_websockets(&self, code: u16, reason: &str) {
        for kind in [SocketKind::Raw, SocketKind::Relay, SocketKind::Follower] {
            for socket in self.socket_table(kind).drain(None) {
                socket.handle_close(code, reason);
            }
        }

        let sockets: Vec<LeaderWebSocket> = self
            .leader_websockets
            .lock()
            .expect("leader_websockets mutex guard poison")
            .drain()
            .map(|(_, socket)| socket)
            .collect();
        for socket in sockets {
            socket.context.close(Some(code), Some(reason.to_string()));
        }
    }
}
