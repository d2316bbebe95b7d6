use crate::types::{ActorId, ActorMetadata, NodeId};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Thin interface over the shared coordination store. Every call is a network round trip that may
/// fail; implementations don't retry.
///
/// The lease operations must be atomic in the store. Two nodes racing
/// `attempt_acquire_lease` must both observe the same single winner.
#[async_trait::async_trait]
pub trait CoordinateDriver: Send + Sync {
    /// Subscribes to the channel named for `node_id`. Messages are delivered in the order the
    /// store delivers them on that channel.
    async fn create_node_subscriber(
        &self,
        node_id: &NodeId,
    ) -> Result<NodeSubscription, CoordinateError>;

    /// Best effort. No delivery guarantee beyond what the store provides.
    async fn publish_to_node(&self, node_id: &NodeId, message: Bytes)
        -> Result<(), CoordinateError>;

    async fn get_actor_leader(
        &self,
        actor_id: &ActorId,
    ) -> Result<GetActorLeaderOutput, CoordinateError>;

    /// If the actor exists, sets the lease to `node_id` unless a live lease already exists, and
    /// returns the resulting holder with the actor's metadata. One atomic step.
    async fn start_actor_and_acquire_lease(
        &self,
        actor_id: &ActorId,
        node_id: &NodeId,
        lease_duration: Duration,
    ) -> Result<StartActorAndAcquireLeaseOutput, CoordinateError>;

    /// Resets the lease TTL only if `node_id` still holds it.
    async fn extend_lease(
        &self,
        actor_id: &ActorId,
        node_id: &NodeId,
        lease_duration: Duration,
    ) -> Result<ExtendLeaseOutput, CoordinateError>;

    async fn attempt_acquire_lease(
        &self,
        actor_id: &ActorId,
        node_id: &NodeId,
        lease_duration: Duration,
    ) -> Result<AttemptAcquireLeaseOutput, CoordinateError>;

    /// Deletes the lease only if `node_id` still holds it. No-op otherwise.
    async fn release_lease(&self, actor_id: &ActorId, node_id: &NodeId)
        -> Result<(), CoordinateError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinateError {
    #[error("Coordination store unavailable: {0}")]
    Unavailable(String),
    #[error("Corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("Failed to decode node message")]
    Decode(#[from] prost::DecodeError),
}

/// Raw frames published to one node's channel.
pub struct NodeSubscription {
    receiver: mpsc::UnboundedReceiver<Bytes>,
}

impl NodeSubscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<Bytes>) -> Self {
        NodeSubscription { receiver }
    }

    pub(crate) async fn recv(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }
}

#[derive(Clone, Debug)]
pub struct GetActorLeaderOutput {
    /// `None` if the actor was never created.
    pub actor: Option<ActorLeaderInfo>,
}

#[derive(Clone, Debug)]
pub struct ActorLeaderInfo {
    /// `None` if no live lease exists, usually because leadership is being transferred.
    pub leader_node_id: Option<NodeId>,
}

#[derive(Clone, Debug)]
pub struct StartActorAndAcquireLeaseOutput {
    pub actor: Option<StartedActorInfo>,
}

#[derive(Clone, Debug)]
pub struct StartedActorInfo {
    pub metadata: ActorMetadata,
    pub leader_node_id: NodeId,
}

#[derive(Copy, Clone, Debug)]
pub struct ExtendLeaseOutput {
    pub lease_valid: bool,
}

#[derive(Clone, Debug)]
pub struct AttemptAcquireLeaseOutput {
    pub new_leader_node_id: NodeId,
}
