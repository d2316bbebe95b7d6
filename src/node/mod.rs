mod context;
mod handlers;
mod node;
mod pending;
mod proxy_websocket;
mod relay_socket;
mod relay_websocket;
#[cfg(test)]
mod test_utils;
mod wiring;

pub use node::Node;
pub use proxy_websocket::ProxyWebSocket;
pub use relay_websocket::RelayWebSocket;
pub use wiring::NodeConfig;
pub use wiring::NodeStartError;

pub(crate) use context::NodeContext;
pub(crate) use pending::Pending;

#[cfg(test)]
pub(crate) use test_utils::{create_actor, test_node};
