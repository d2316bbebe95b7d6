use actor_coordinate::{
    Actor, ActorError, ActorId, ActorMetadata, ActorRegistry, ActorRouter, ActorStartInput,
    CoordinateOptions, Encoding, MemoryCoordinateDriver, MemoryStore, Node, NodeConfig,
    WebSocketContext, WebSocketEvent, WebSocketHandler, WebSocketMessage, WebSocketOpenRequest,
};
use bytes::Bytes;
use http::{Request, Response};
use slog::Drain;
use std::any::Any;
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counts requests. Echoes socket messages back.
struct CounterActor {
    count: AtomicU64,
}

#[async_trait::async_trait]
impl Actor for CounterActor {
    async fn start(&self, input: ActorStartInput) -> Result<(), ActorError> {
        println!("Counter {} started", input.actor_id);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ActorError> {
        println!("Counter stopped at {}", self.count.load(Ordering::SeqCst));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Echo;

impl WebSocketHandler for Echo {
    fn on_message(&self, ctx: &WebSocketContext, message: WebSocketMessage) {
        let _ = ctx.send(message);
    }
}

struct CounterRouter;

#[async_trait::async_trait]
impl ActorRouter for CounterRouter {
    async fn fetch(
        &self,
        actor: Arc<dyn Actor>,
        _actor_id: &ActorId,
        _request: Request<Bytes>,
    ) -> Result<Response<Bytes>, ActorError> {
        let counter = actor
            .as_any()
            .downcast_ref::<CounterActor>()
            .ok_or_else(|| ActorError::new("not a counter"))?;
        let count = counter.count.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(Response::new(Bytes::from(count.to_string())))
    }

    async fn connect_websocket(
        &self,
        _actor: Arc<dyn Actor>,
        _request: WebSocketOpenRequest,
    ) -> Result<Arc<dyn WebSocketHandler>, ActorError> {
        Ok(Arc::new(Echo))
    }
}

fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!())
}

async fn start_node(logger: &slog::Logger, store: &MemoryStore) -> Result<Node, Box<dyn Error>> {
    let mut registry = ActorRegistry::new();
    registry.register("counter", || -> Arc<dyn Actor> {
        Arc::new(CounterActor {
            count: AtomicU64::new(0),
        })
    });

    let node = Node::start(NodeConfig {
        logger: logger.clone(),
        options: CoordinateOptions::default(),
        driver: Arc::new(MemoryCoordinateDriver::new(store.clone())),
        registry,
        router: Arc::new(CounterRouter),
        bindings: Arc::new(()),
        node_id: None,
    })
    .await?;

    Ok(node)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let logger = create_root_logger_for_stdout();
    let store = MemoryStore::new();

    let actor_id = ActorId::new("counter-1");
    MemoryCoordinateDriver::new(store.clone()).create_actor(
        &actor_id,
        ActorMetadata {
            type_name: "counter".to_string(),
            key: vec!["demo".to_string()],
        },
    )?;

    let leader = start_node(&logger, &store).await?;
    let follower = start_node(&logger, &store).await?;

    // The first node to reach the actor leads it for as long as anyone holds a connection.
    let mut held = leader.open_websocket(&actor_id, "/hold", Encoding::Json, None).await?;
    println!("Leader socket: {:?}", held.recv().await);

    for _ in 0..3 {
        let response = follower.send_request(&actor_id, Request::new(Bytes::new())).await;
        println!(
            "Relayed request got {} {:?}",
            response.status(),
            String::from_utf8_lossy(response.body())
        );
    }

    let mut socket = follower.open_websocket(&actor_id, "/echo", Encoding::Json, None).await?;
    socket.send(WebSocketMessage::Text("hello through the relay".to_string()))?;
    while let Some(event) = socket.recv().await {
        println!("Relayed socket: {:?}", event);
        if let WebSocketEvent::Message(_) = event {
            socket.close(Some(1000), Some("done".to_string()));
        }
    }
    held.close(Some(1000), None);

    follower.shutdown().await;
    leader.shutdown().await;

    Ok(())
}
