mod definition;
mod router;
mod socket;

pub use definition::Actor;
pub use definition::ActorBindings;
pub use definition::ActorDefinition;
pub use definition::ActorError;
pub use definition::ActorRegistry;
pub use definition::ActorStartInput;
pub use router::ActorRouter;
pub use router::WebSocketHandler;
pub use router::WebSocketOpenRequest;
pub use socket::ClientWebSocket;
pub use socket::CloseEvent;
pub use socket::ReadyState;
pub use socket::WebSocketContext;
pub use socket::WebSocketError;
pub use socket::WebSocketEvent;
pub use socket::WebSocketMessage;

pub(crate) use socket::OutboundFrame;
pub(crate) use socket::CLOSE_GOING_AWAY;
pub(crate) use socket::CLOSE_INTERNAL_ERROR;
pub(crate) use socket::CLOSE_NO_STATUS;
