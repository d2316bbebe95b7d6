mod actor;
mod coordinate;
mod node;
mod options;
mod peer;
mod protocol;
mod relay;
mod types;

pub use actor::Actor;
pub use actor::ActorBindings;
pub use actor::ActorDefinition;
pub use actor::ActorError;
pub use actor::ActorRegistry;
pub use actor::ActorRouter;
pub use actor::ActorStartInput;
pub use actor::ClientWebSocket;
pub use actor::CloseEvent;
pub use actor::ReadyState;
pub use actor::WebSocketContext;
pub use actor::WebSocketError;
pub use actor::WebSocketEvent;
pub use actor::WebSocketHandler;
pub use actor::WebSocketMessage;
pub use actor::WebSocketOpenRequest;
pub use coordinate::ActorLeaderInfo;
pub use coordinate::AttemptAcquireLeaseOutput;
pub use coordinate::CoordinateDriver;
pub use coordinate::CoordinateError;
pub use coordinate::ExtendLeaseOutput;
pub use coordinate::GetActorLeaderOutput;
pub use coordinate::MemoryCoordinateDriver;
pub use coordinate::MemoryStore;
pub use coordinate::NodeSubscription;
pub use coordinate::StartActorAndAcquireLeaseOutput;
pub use coordinate::StartedActorInfo;
pub use node::Node;
pub use node::NodeConfig;
pub use node::NodeStartError;
pub use node::ProxyWebSocket;
pub use node::RelayWebSocket;
pub use options::CoordinateOptions;
pub use peer::PeerError;
pub use peer::PeerSnapshot;
pub use protocol::Encoding;
pub use relay::RelayError;
pub use types::ActorId;
pub use types::ActorMetadata;
pub use types::NodeId;
pub use types::WebSocketId;

// Module roots hold only `mod` and `pub use` lines. No `pub mod`: every export is named here.
