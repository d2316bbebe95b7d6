use crate::actor::{Actor, ActorError, ActorRegistry, ActorRouter, ActorStartInput};
use crate::actor::{WebSocketHandler, WebSocketOpenRequest};
use crate::coordinate::{MemoryCoordinateDriver, MemoryStore};
use crate::node::context::{NodeContext, NodeContextParts};
use crate::options::{CoordinateOptions, CoordinateOptionsValidated};
use crate::types::{ActorId, ActorMetadata, NodeId};
use bytes::Bytes;
use http::{Request, Response};
use std::any::Any;
use std::convert::TryFrom;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const ACTOR_TYPE: &str = "counter";

/// Start and stop counts across every actor instance one node created.
#[derive(Default)]
pub(crate) struct Lifecycle {
    starts: AtomicU32,
    stops: AtomicU32,
}

impl Lifecycle {
    pub(crate) fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    pub(crate) fn stops(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }
}

struct CountingActor {
    lifecycle: Arc<Lifecycle>,
}

#[async_trait::async_trait]
impl Actor for CountingActor {
    async fn start(&self, _input: ActorStartInput) -> Result<(), ActorError> {
        self.lifecycle.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ActorError> {
        self.lifecycle.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct NoRoutes;

#[async_trait::async_trait]
impl ActorRouter for NoRoutes {
    async fn fetch(
        &self,
        _actor: Arc<dyn Actor>,
        _actor_id: &ActorId,
        _request: Request<Bytes>,
    ) -> Result<Response<Bytes>, ActorError> {
        Err(ActorError::new("no routes"))
    }

    async fn connect_websocket(
        &self,
        _actor: Arc<dyn Actor>,
        _request: WebSocketOpenRequest,
    ) -> Result<Arc<dyn WebSocketHandler>, ActorError> {
        Err(ActorError::new("no routes"))
    }
}

/// A node context without a dispatcher. Nothing published to it is consumed.
pub(crate) struct TestNode {
    pub ctx: Arc<NodeContext>,
    pub driver: Arc<MemoryCoordinateDriver>,
    pub lifecycle: Arc<Lifecycle>,
}

pub(crate) fn test_node(store: &MemoryStore, name: &str) -> TestNode {
    let lifecycle = Arc::new(Lifecycle::default());
    let mut registry = ActorRegistry::new();
    let instances = lifecycle.clone();
    registry.register(ACTOR_TYPE, move || -> Arc<dyn Actor> {
        Arc::new(CountingActor {
            lifecycle: instances.clone(),
        })
    });

    let driver = Arc::new(MemoryCoordinateDriver::new(store.clone()));
    let ctx = NodeContext::new(NodeContextParts {
        logger: slog::Logger::root(slog::Discard, slog::o!()),
        node_id: NodeId::new(name),
        options: CoordinateOptionsValidated::try_from(CoordinateOptions::default()).unwrap(),
        driver: driver.clone(),
        registry,
        router: Arc::new(NoRoutes),
        bindings: Arc::new(()),
    });

    TestNode {
        ctx,
        driver,
        lifecycle,
    }
}

pub(crate) fn create_actor(store: &MemoryStore, name: &str) -> ActorId {
    let actor_id = ActorId::new(name);
    let metadata = ActorMetadata {
        type_name: ACTOR_TYPE.to_string(),
        key: vec![name.to_string()],
    };
    MemoryCoordinateDriver::new(store.clone())
        .create_actor(&actor_id, metadata)
        .unwrap();

    actor_id
}
