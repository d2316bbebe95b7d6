use crate::types::ActorId;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque process-wide value handed to every actor on start (database handles, clients, etc).
pub type ActorBindings = Arc<dyn Any + Send + Sync>;

pub struct ActorStartInput {
    pub bindings: ActorBindings,
    pub actor_id: ActorId,
    pub type_name: String,
    pub key: Vec<String>,
    pub region: String,
}

/// A live actor instance. At most one exists per actor id across the fleet, on the node holding
/// the lease.
#[async_trait::async_trait]
pub trait Actor: Send + Sync + 'static {
    async fn start(&self, input: ActorStartInput) -> Result<(), ActorError>;

    /// Graceful stop. Called exactly once when the hosting node gives up leadership, and awaited
    /// before the lease is released so state can be flushed.
    async fn stop(&self) -> Result<(), ActorError>;

    /// Lets routers reach the concrete actor type.
    fn as_any(&self) -> &dyn Any;
}

pub trait ActorDefinition: Send + Sync {
    fn instantiate(&self) -> Arc<dyn Actor>;
}

impl<F> ActorDefinition for F
where
    F: Fn() -> Arc<dyn Actor> + Send + Sync,
{
    fn instantiate(&self) -> Arc<dyn Actor> {
        (self)()
    }
}

/// Maps actor type names (as written in the actor's metadata record) to definitions.
#[derive(Clone, Default)]
pub struct ActorRegistry {
    definitions: HashMap<String, Arc<dyn ActorDefinition>>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<D>(&mut self, type_name: impl Into<String>, definition: D)
    where
        D: ActorDefinition + 'static,
    {
        self.definitions.insert(type_name.into(), Arc::new(definition));
    }

    pub fn lookup(&self, type_name: &str) -> Option<Arc<dyn ActorDefinition>> {
        self.definitions.get(type_name).cloned()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ActorError {
    message: String,
}

impl ActorError {
    pub fn new(message: impl Into<String>) -> Self {
        ActorError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
