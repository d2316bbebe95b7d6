use crate::actor::{Actor, ActorStartInput, CLOSE_GOING_AWAY};
use crate::coordinate::CoordinateError;
use crate::node::NodeContext;
use crate::peer::heartbeat::{HeartbeatHandle, HeartbeatTarget};
use crate::types::{ActorId, ActorMetadata, ConnId, NodeId};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::{Duration, Instant};

const REGION: &str = "unknown";

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("Actor not found")]
    ActorNotFound,
    #[error("No actor definition for type {0:?}")]
    NoActorDefinition(String),
    #[error("Actor failed to start: {0}")]
    ActorStartFailed(String),
    #[error("Actor peer disposed before it finished starting")]
    Disposed,
    #[error("Coordination store failure: {0}")]
    Coordinate(#[from] CoordinateError),
}

/// Observable leadership for one actor on this node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PeerSnapshot {
    Starting,
    Leader,
    Follower(NodeId),
}

#[derive(Clone, Debug)]
enum StartStatus {
    Starting,
    Started,
    Failed { not_found: bool, message: String },
}

/// Progress of the locally loaded actor. Only leaves `Idle` on a leader.
#[derive(Clone)]
enum Startup {
    Idle,
    Starting,
    Ready(Arc<dyn Actor>),
    Failed,
}

#[derive(Default)]
struct PeerState {
    metadata: Option<ActorMetadata>,
    leader_node_id: Option<NodeId>,
    reference_connections: HashSet<ConnId>,
    loaded_actor: Option<Arc<dyn Actor>>,
    /// Expiry of the last lease we know we hold. Only meaningful while leader.
    lease_deadline: Option<Instant>,
    heartbeat: Option<HeartbeatHandle>,
}

/// Per-(node, actor) leader election state machine.
///
/// Lock order is `NodeContext::actor_peers` then `PeerState`. Neither is held across an await.
pub(crate) struct ActorPeer {
    logger: slog::Logger,
    ctx: Arc<NodeContext>,
    actor_id: ActorId,
    disposed: AtomicBool,
    state: Mutex<PeerState>,
    status: watch::Sender<StartStatus>,
    startup: watch::Sender<Startup>,
}

/// Synchronous half of disposal, done while the registry lock is held.
struct Disposal<'a> {
    peer: &'a ActorPeer,
    was_leader: bool,
    loaded_actor: Option<Arc<dyn Actor>>,
}

impl ActorPeer {
    fn new(ctx: &Arc<NodeContext>, actor_id: &ActorId) -> Arc<Self> {
        Arc::new(ActorPeer {
            logger: ctx.logger.new(slog::o!("ActorId" => actor_id.to_string())),
            ctx: ctx.clone(),
            actor_id: actor_id.clone(),
            disposed: AtomicBool::new(false),
            state: Mutex::new(PeerState::default()),
            status: watch::channel(StartStatus::Starting).0,
            startup: watch::channel(Startup::Idle).0,
        })
    }

    /// Returns this node's peer for `actor_id`, creating and starting it if needed. `conn_id` is
    /// in the reference set before this returns, even on error paths that later release it.
    pub(crate) async fn acquire(
        ctx: &Arc<NodeContext>,
        actor_id: &ActorId,
        conn_id: &ConnId,
    ) -> Result<Arc<ActorPeer>, PeerError> {
        let (peer, created) = {
            let mut peers = ctx.actor_peers.lock().expect("actor_peers mutex guard poison");
            let (peer, created) = match peers.get(actor_id) {
                Some(peer) => (peer.clone(), false),
                None => {
                    let peer = ActorPeer::new(ctx, actor_id);
                    peers.insert(actor_id.clone(), peer.clone());
                    (peer, true)
                }
            };

            let count = peer.with_state(|state| {
                state.reference_connections.insert(conn_id.clone());
                state.reference_connections.len()
            });
            slog::debug!(
                peer.logger,
                "Added actor reference";
                "ConnId" => %conn_id,
                "References" => count
            );

            (peer, created)
        };

        if created {
            if let Err(e) = peer.start().await {
                slog::warn!(peer.logger, "Actor peer failed to start: {}", e);
                peer.status.send_replace(StartStatus::Failed {
                    not_found: matches!(e, PeerError::ActorNotFound),
                    message: e.to_string(),
                });
                peer.dispose(true).await;
                return Err(e);
            }
            peer.status.send_replace(StartStatus::Started);
        } else {
            peer.wait_started().await?;
        }

        Ok(peer)
    }

    /// The peer for `actor_id` if this node currently leads it.
    pub(crate) fn get_leader_peer(ctx: &NodeContext, actor_id: &ActorId) -> Option<Arc<ActorPeer>> {
        let peers = ctx.actor_peers.lock().expect("actor_peers mutex guard poison");
        peers.get(actor_id).filter(|peer| peer.is_leader()).cloned()
    }

    /// The locally loaded actor, waiting out its startup. `None` unless this node leads the
    /// actor and the actor started successfully.
    pub(crate) async fn get_leader_actor(
        ctx: &NodeContext,
        actor_id: &ActorId,
    ) -> Option<Arc<dyn Actor>> {
        let peer = Self::get_leader_peer(ctx, actor_id)?;
        peer.loaded_actor().await
    }

    pub(crate) fn is_leader(&self) -> bool {
        self.with_state(|state| state.leader_node_id.as_ref() == Some(&self.ctx.node_id))
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot(&self) -> PeerSnapshot {
        let starting = matches!(*self.status.borrow(), StartStatus::Starting);
        let leader = self.with_state(|state| state.leader_node_id.clone());
        match leader {
            Some(_) if starting => PeerSnapshot::Starting,
            None => PeerSnapshot::Starting,
            Some(leader) if leader == self.ctx.node_id => PeerSnapshot::Leader,
            Some(leader) => PeerSnapshot::Follower(leader),
        }
    }

    async fn loaded_actor(&self) -> Option<Arc<dyn Actor>> {
        let mut startup = self.startup.subscribe();
        let result = startup
            .wait_for(|startup| !matches!(startup, Startup::Starting))
            .await;
        match result.as_deref() {
            Ok(Startup::Ready(actor)) => Some(actor.clone()),
            _ => None,
        }
    }

    async fn wait_started(&self) -> Result<(), PeerError> {
        let mut status = self.status.subscribe();
        let status = status
            .wait_for(|status| !matches!(status, StartStatus::Starting))
            .await
            .map_err(|_| PeerError::Disposed)?
            .clone();

        match status {
            StartStatus::Started => Ok(()),
            StartStatus::Failed { not_found: true, .. } => Err(PeerError::ActorNotFound),
            StartStatus::Failed { message, .. } => Err(PeerError::ActorStartFailed(message)),
            StartStatus::Starting => Err(PeerError::Disposed),
        }
    }

    async fn start(self: &Arc<Self>) -> Result<(), PeerError> {
        let lease_duration = self.ctx.options.lease_duration;
        let requested_at = Instant::now();
        let output = self
            .ctx
            .driver
            .start_actor_and_acquire_lease(&self.actor_id, &self.ctx.node_id, lease_duration)
            .await?;
        let actor = output.actor.ok_or(PeerError::ActorNotFound)?;

        let is_leader = actor.leader_node_id == self.ctx.node_id;
        slog::debug!(
            self.logger,
            "Starting actor peer";
            "TypeName" => &actor.metadata.type_name,
            "Leader" => %actor.leader_node_id,
        );

        self.with_state(|state| {
            state.metadata = Some(actor.metadata);
            state.leader_node_id = Some(actor.leader_node_id);
            if is_leader {
                state.lease_deadline = Some(requested_at + lease_duration);
                self.startup.send_replace(Startup::Starting);
            }
        });

        if is_leader {
            self.convert_to_leader().await?;
        }

        let heartbeat = HeartbeatHandle::spawn(Arc::downgrade(self), &self.ctx.shutdown);
        // Installed under the state lock so disposal either takes it or we drop it here.
        let rejected = self.with_state(|state| {
            if self.is_disposed() {
                Some(heartbeat)
            } else {
                state.heartbeat = Some(heartbeat);
                None
            }
        });
        if rejected.is_some() {
            return Err(PeerError::Disposed);
        }

        Ok(())
    }

    /// Instantiates and starts the actor. The caller must have moved `startup` to `Starting`
    /// while recording self as leader, so readers never see a leader without a pending startup.
    async fn convert_to_leader(&self) -> Result<(), PeerError> {
        slog::info!(self.logger, "Acquired leadership");

        let metadata = self.with_state(|state| state.metadata.clone());
        let Some(metadata) = metadata else {
            self.startup.send_replace(Startup::Failed);
            return Err(PeerError::ActorStartFailed("missing actor metadata".to_string()));
        };

        let Some(definition) = self.ctx.registry.lookup(&metadata.type_name) else {
            self.startup.send_replace(Startup::Failed);
            return Err(PeerError::NoActorDefinition(metadata.type_name));
        };

        let actor = definition.instantiate();
        let input = ActorStartInput {
            bindings: self.ctx.bindings.clone(),
            actor_id: self.actor_id.clone(),
            type_name: metadata.type_name,
            key: metadata.key,
            region: REGION.to_string(),
        };
        if let Err(e) = actor.start(input).await {
            self.startup.send_replace(Startup::Failed);
            return Err(PeerError::ActorStartFailed(e.to_string()));
        }

        // Checked under the state lock: either disposal sees the loaded actor and stops it, or we
        // see the disposal and stop it here.
        let disposed = self.with_state(|state| {
            if self.is_disposed() {
                return true;
            }
            state.loaded_actor = Some(actor.clone());
            self.startup.send_replace(Startup::Ready(actor.clone()));
            false
        });
        if disposed {
            if let Err(e) = actor.stop().await {
                slog::error!(self.logger, "Actor failed to stop cleanly: {}", e);
            }
            return Err(PeerError::Disposed);
        }

        Ok(())
    }

    /// Leader heartbeat. Losing the lease disposes without release, since a release could delete
    /// a newer holder's lease.
    async fn extend_lease(&self) {
        let lease_duration = self.ctx.options.lease_duration;
        let requested_at = Instant::now();
        let result = self
            .ctx
            .driver
            .extend_lease(&self.actor_id, &self.ctx.node_id, lease_duration)
            .await;

        match result {
            Ok(output) if output.lease_valid => {
                slog::trace!(self.logger, "Lease is valid");
                self.with_state(|state| state.lease_deadline = Some(requested_at + lease_duration));
            }
            Ok(_) => {
                slog::info!(self.logger, "Lease is no longer ours");
                self.dispose(false).await;
            }
            Err(e) => {
                let deadline = self.with_state(|state| state.lease_deadline);
                let expired = deadline.map_or(true, |deadline| Instant::now() >= deadline);
                if expired {
                    slog::warn!(self.logger, "Could not renew lease before it expired: {}", e);
                    self.dispose(false).await;
                } else {
                    slog::warn!(self.logger, "Failed to extend lease, will retry: {}", e);
                }
            }
        }
    }

    /// Follower heartbeat. Claims the lease if it expired, and tears down sockets bound to a
    /// leader that is no longer authoritative.
    async fn attempt_acquire_lease(&self) {
        let lease_duration = self.ctx.options.lease_duration;
        let requested_at = Instant::now();
        let result = self
            .ctx
            .driver
            .attempt_acquire_lease(&self.actor_id, &self.ctx.node_id, lease_duration)
            .await;

        let new_leader = match result {
            Ok(output) => output.new_leader_node_id,
            Err(e) => {
                slog::warn!(self.logger, "Failed to check lease: {}", e);
                return;
            }
        };
        if self.is_disposed() {
            return;
        }

        let node_id = &self.ctx.node_id;
        let (leader_changed, promoted) = self.with_state(|state| {
            let was_leader = state.leader_node_id.as_ref() == Some(node_id);
            let previous = state.leader_node_id.replace(new_leader.clone());
            let promoted = !was_leader && &new_leader == node_id;
            let leader_changed =
                previous.as_ref() != Some(&new_leader)
                    && previous.as_ref().map_or(false, |prev| prev != node_id);
            if promoted {
                state.lease_deadline = Some(requested_at + lease_duration);
                self.startup.send_replace(Startup::Starting);
            }

            (leader_changed, promoted)
        });

        if leader_changed {
            slog::info!(
                self.logger,
                "Actor leader changed, closing websockets";
                "NewLeader" => %new_leader
            );
            self.ctx
                .close_actor_websockets(&self.actor_id, CLOSE_GOING_AWAY, "Actor leader changed");
        }

        if promoted {
            if let Err(e) = self.convert_to_leader().await {
                slog::error!(self.logger, "Failed to start actor after acquiring lease: {}", e);
                self.dispose(true).await;
            }
        }
    }

    pub(crate) async fn remove_connection_reference(&self, conn_id: &ConnId) {
        let disposal = {
            let mut peers = self.ctx.actor_peers.lock().expect("actor_peers mutex guard poison");
            let (removed, remaining) = self.with_state(|state| {
                let removed = state.reference_connections.remove(conn_id);
                (removed, state.reference_connections.len())
            });

            if removed {
                slog::debug!(
                    self.logger,
                    "Removed actor reference";
                    "ConnId" => %conn_id,
                    "References" => remaining
                );
            } else {
                slog::warn!(
                    self.logger,
                    "Removed actor reference that didn't exist";
                    "ConnId" => %conn_id
                );
            }

            if remaining == 0 {
                self.begin_dispose(&mut peers)
            } else {
                None
            }
        };

        if let Some(disposal) = disposal {
            disposal.finish(true).await;
        }
    }

    /// Idempotent. Only releases the lease if this peer was leader.
    pub(crate) async fn dispose(&self, release_lease: bool) {
        let disposal = {
            let mut peers = self.ctx.actor_peers.lock().expect("actor_peers mutex guard poison");
            self.begin_dispose(&mut peers)
        };

        if let Some(disposal) = disposal {
            disposal.finish(release_lease).await;
        }
    }

    /// Everything that must happen before the first suspension point: the disposed flag, the
    /// heartbeat cancel and the registry removal.
    fn begin_dispose(&self, peers: &mut HashMap<ActorId, Arc<ActorPeer>>) -> Option<Disposal<'_>> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return None;
        }

        slog::info!(self.logger, "Actor peer shutting down");

        let (heartbeat, was_leader, loaded_actor) = self.with_state(|state| {
            (
                state.heartbeat.take(),
                state.leader_node_id.as_ref() == Some(&self.ctx.node_id),
                state.loaded_actor.take(),
            )
        });
        drop(heartbeat);

        let registered = peers.get(&self.actor_id);
        if matches!(registered, Some(peer) if std::ptr::eq(Arc::as_ptr(peer), self)) {
            peers.remove(&self.actor_id);
        }

        // Wake anyone waiting on a startup that will never finish.
        self.status.send_if_modified(|status| {
            if matches!(status, StartStatus::Starting) {
                *status = StartStatus::Failed {
                    not_found: false,
                    message: "actor peer disposed".to_string(),
                };
                true
            } else {
                false
            }
        });
        self.startup.send_replace(Startup::Failed);

        Some(Disposal {
            peer: self,
            was_leader,
            loaded_actor,
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut PeerState) -> R) -> R {
        let mut state = self.state.lock().expect("PeerState mutex guard poison");
        f(&mut state)
    }
}

impl Disposal<'_> {
    async fn finish(self, release_lease: bool) {
        let peer = self.peer;

        if self.was_leader {
            // This node's own follower-side sockets are closed directly. The close frames the
            // leader side publishes never reach them while the store is unreachable.
            peer.ctx
                .close_actor_websockets(&peer.actor_id, CLOSE_GOING_AWAY, "Actor leader changed");

            // Awaited so the actor can persist state before anyone else may take the lease.
            if let Some(actor) = self.loaded_actor {
                if let Err(e) = actor.stop().await {
                    slog::error!(peer.logger, "Actor failed to stop cleanly: {}", e);
                }
            }

            if release_lease {
                let released = peer
                    .ctx
                    .driver
                    .release_lease(&peer.actor_id, &peer.ctx.node_id)
                    .await;
                if let Err(e) = released {
                    slog::warn!(peer.logger, "Failed to release lease, it will expire: {}", e);
                }
            }
        }

        slog::info!(peer.logger, "Actor peer shut down");
    }
}

#[async_trait::async_trait]
impl HeartbeatTarget for ActorPeer {
    fn next_heartbeat_interval(&self) -> Duration {
        let options = &self.ctx.options;
        if self.is_leader() {
            options.leader_heartbeat_interval()
        } else {
            let jitter_ms = options.check_lease_jitter.as_millis() as u64;
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
            options.check_lease_interval + jitter
        }
    }

    async fn heartbeat(&self) {
        if self.is_disposed() {
            return;
        }

        if self.is_leader() {
            self.extend_lease().await;
        } else {
            self.attempt_acquire_lease().await;
        }
    }
}
