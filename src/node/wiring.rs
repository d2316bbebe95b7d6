use crate::actor::{ActorBindings, ActorRegistry, ActorRouter};
use crate::coordinate::{CoordinateDriver, CoordinateError, NodeSubscriber};
use crate::node::context::{NodeContext, NodeContextParts};
use crate::node::handlers;
use crate::node::Node;
use crate::options::{CoordinateOptions, CoordinateOptionsValidated};
use crate::types::NodeId;
use std::convert::TryFrom;
use std::sync::Arc;

pub struct NodeConfig {
    pub logger: slog::Logger,
    pub options: CoordinateOptions,
    pub driver: Arc<dyn CoordinateDriver>,
    pub registry: ActorRegistry,
    pub router: Arc<dyn ActorRouter>,
    /// Handed to every actor this node starts.
    pub bindings: ActorBindings,
    /// Generated when absent. Tests pin it to get readable logs.
    pub node_id: Option<NodeId>,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeStartError {
    #[error("Illegal options for configuring node: {0}")]
    IllegalOptions(String),
    #[error("Failed to subscribe to node channel: {0}")]
    Subscribe(#[from] CoordinateError),
}

impl Node {
    /// Subscribes this node's channel and starts dispatching. The node serves traffic as soon as
    /// this returns.
    pub async fn start(config: NodeConfig) -> Result<Node, NodeStartError> {
        let options = CoordinateOptionsValidated::try_from(config.options)
            .map_err(|e| NodeStartError::IllegalOptions(e.to_string()))?;
        let node_id = config.node_id.unwrap_or_else(NodeId::generate);
        let logger = config.logger.new(slog::o!("NodeId" => node_id.to_string()));

        let subscription = config.driver.create_node_subscriber(&node_id).await?;

        let ctx = NodeContext::new(NodeContextParts {
            logger,
            node_id,
            options,
            driver: config.driver,
            registry: config.registry,
            router: config.router,
            bindings: config.bindings,
        });
        tokio::spawn(run_dispatcher(ctx.clone(), NodeSubscriber::new(subscription)));
        slog::info!(ctx.logger, "Node started");

        Ok(Node::new(ctx))
    }
}

/// The node's single consumer of its channel. Runs until shutdown or until the subscription ends.
async fn run_dispatcher(ctx: Arc<NodeContext>, mut subscriber: NodeSubscriber) {
    loop {
        let message = tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            message = subscriber.recv() => message,
        };

        match message {
            Some(Ok(message)) => handlers::dispatch(&ctx, message),
            Some(Err(e)) => slog::warn!(ctx.logger, "Dropping malformed node message: {}", e),
            None => {
                slog::warn!(ctx.logger, "Node subscription ended");
                break;
            }
        }
    }

    slog::info!(ctx.logger, "Node dispatcher stopped");
}
