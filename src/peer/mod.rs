mod actor_peer;
mod heartbeat;
mod time;

pub use actor_peer::PeerError;
pub use actor_peer::PeerSnapshot;

pub(crate) use actor_peer::ActorPeer;
