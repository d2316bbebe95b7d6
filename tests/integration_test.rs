use actor_coordinate::{
    Actor, ActorError, ActorId, ActorMetadata, ActorRegistry, ActorRouter, ActorStartInput,
    AttemptAcquireLeaseOutput, ClientWebSocket, CloseEvent, CoordinateDriver, CoordinateError,
    CoordinateOptions, Encoding, ExtendLeaseOutput, GetActorLeaderOutput, MemoryCoordinateDriver,
    MemoryStore, Node, NodeConfig, NodeId, NodeSubscription, PeerSnapshot, ReadyState, RelayError,
    RelayWebSocket, StartActorAndAcquireLeaseOutput, WebSocketContext, WebSocketError,
    WebSocketEvent, WebSocketHandler, WebSocketMessage, WebSocketOpenRequest,
};
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use slog::Drain;
use std::any::Any;
use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Duration;

const ACTOR_TYPE: &str = "counter";

/// Per-node record of what actors did on that node.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    /// Set once an actor on this node accepts a socket on `/cut-off`. From then on the node can't
    /// publish anything.
    cut_off: AtomicBool,
}

impl Recorder {
    fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn saw(&self, event: &str) -> bool {
        self.events.lock().unwrap().iter().any(|seen| seen == event)
    }
}

#[derive(Default)]
struct CounterActor {
    count: AtomicU64,
    recorder: Mutex<Option<Arc<Recorder>>>,
}

impl CounterActor {
    fn recorder(&self) -> Arc<Recorder> {
        self.recorder.lock().unwrap().clone().expect("actor started")
    }
}

#[async_trait::async_trait]
impl Actor for CounterActor {
    async fn start(&self, input: ActorStartInput) -> Result<(), ActorError> {
        let recorder = input
            .bindings
            .downcast::<Recorder>()
            .map_err(|_| ActorError::new("bindings are not a recorder"))?;
        recorder.record("start");
        *self.recorder.lock().unwrap() = Some(recorder);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ActorError> {
        self.recorder().record("stop");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Greets on open, echoes, and closes with 4000 when asked to.
struct EchoHandler {
    recorder: Arc<Recorder>,
}

impl WebSocketHandler for EchoHandler {
    fn on_open(&self, ctx: &WebSocketContext) {
        let _ = ctx.send(WebSocketMessage::Text("welcome".to_string()));
    }

    fn on_message(&self, ctx: &WebSocketContext, message: WebSocketMessage) {
        if message == WebSocketMessage::Text("close".to_string()) {
            ctx.close(Some(4000), Some("bye".to_string()));
        } else {
            let _ = ctx.send(message);
        }
    }

    fn on_close(&self, _ctx: &WebSocketContext, event: CloseEvent) {
        self.recorder.record(format!("ws-close:{}", event.code));
    }
}

struct CounterRouter;

#[async_trait::async_trait]
impl ActorRouter for CounterRouter {
    async fn fetch(
        &self,
        actor: Arc<dyn Actor>,
        _actor_id: &ActorId,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>, ActorError> {
        if request.uri().path() == "/fail" {
            return Err(ActorError::new("counter exploded"));
        }

        let counter = actor.as_any().downcast_ref::<CounterActor>().expect("counter actor");
        let count = counter.count.fetch_add(1, Ordering::SeqCst) + 1;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header("x-method", request.method().as_str())
            .header("content-length", "1")
            .body(Bytes::from(count.to_string()))
            .unwrap();

        Ok(response)
    }

    async fn connect_websocket(
        &self,
        actor: Arc<dyn Actor>,
        request: WebSocketOpenRequest,
    ) -> Result<Arc<dyn WebSocketHandler>, ActorError> {
        let counter = actor.as_any().downcast_ref::<CounterActor>().expect("counter actor");
        let recorder = counter.recorder();
        if request.url == "/cut-off" {
            recorder.cut_off.store(true, Ordering::SeqCst);
        }

        Ok(Arc::new(EchoHandler { recorder }))
    }
}

/// Memory driver whose publishes start failing once the node's recorder is cut off.
struct CutOffDriver {
    inner: Arc<MemoryCoordinateDriver>,
    recorder: Arc<Recorder>,
}

#[async_trait::async_trait]
impl CoordinateDriver for CutOffDriver {
    async fn create_node_subscriber(
        &self,
        node_id: &NodeId,
    ) -> Result<NodeSubscription, CoordinateError> {
        self.inner.create_node_subscriber(node_id).await
    }

    async fn publish_to_node(&self, node_id: &NodeId, message: Bytes)
        -> Result<(), CoordinateError> {
        if self.recorder.cut_off.load(Ordering::SeqCst) {
            return Err(CoordinateError::Unavailable("publishing cut off".to_string()));
        }
        self.inner.publish_to_node(node_id, message).await
    }

    async fn get_actor_leader(
        &self,
        actor_id: &ActorId,
    ) -> Result<GetActorLeaderOutput, CoordinateError> {
        self.inner.get_actor_leader(actor_id).await
    }

    async fn start_actor_and_acquire_lease(
        &self,
        actor_id: &ActorId,
        node_id: &NodeId,
        lease_duration: Duration,
    ) -> Result<StartActorAndAcquireLeaseOutput, CoordinateError> {
        self.inner.start_actor_and_acquire_lease(actor_id, node_id, lease_duration).await
    }

    async fn extend_lease(
        &self,
        actor_id: &ActorId,
        node_id: &NodeId,
        lease_duration: Duration,
    ) -> Result<ExtendLeaseOutput, CoordinateError> {
        self.inner.extend_lease(actor_id, node_id, lease_duration).await
    }

    async fn attempt_acquire_lease(
        &self,
        actor_id: &ActorId,
        node_id: &NodeId,
        lease_duration: Duration,
    ) -> Result<AttemptAcquireLeaseOutput, CoordinateError> {
        self.inner.attempt_acquire_lease(actor_id, node_id, lease_duration).await
    }

    async fn release_lease(&self, actor_id: &ActorId, node_id: &NodeId)
        -> Result<(), CoordinateError> {
        self.inner.release_lease(actor_id, node_id).await
    }
}

struct TestNode {
    node: Node,
    driver: Arc<MemoryCoordinateDriver>,
    recorder: Arc<Recorder>,
}

fn options() -> CoordinateOptions {
    CoordinateOptions {
        message_ack_timeout: Some(Duration::from_millis(500)),
        message_retry_backoff: Some(Duration::from_millis(250)),
        ..CoordinateOptions::default()
    }
}

async fn start_node(store: &MemoryStore, name: &str) -> Result<TestNode, Box<dyn Error>> {
    start_node_with(store, name, false).await
}

async fn start_node_with(
    store: &MemoryStore,
    name: &str,
    can_be_cut_off: bool,
) -> Result<TestNode, Box<dyn Error>> {
    let mut registry = ActorRegistry::new();
    registry.register(ACTOR_TYPE, || -> Arc<dyn Actor> { Arc::new(CounterActor::default()) });

    let driver = Arc::new(MemoryCoordinateDriver::new(store.clone()));
    let recorder = Arc::new(Recorder::default());
    let node_driver: Arc<dyn CoordinateDriver> = if can_be_cut_off {
        Arc::new(CutOffDriver {
            inner: driver.clone(),
            recorder: recorder.clone(),
        })
    } else {
        driver.clone()
    };
    let node = Node::start(NodeConfig {
        logger: create_root_logger_for_stdout(name.to_string()),
        options: options(),
        driver: node_driver,
        registry,
        router: Arc::new(CounterRouter),
        bindings: recorder.clone(),
        node_id: Some(NodeId::new(name)),
    })
    .await?;

    Ok(TestNode { node, driver, recorder })
}

fn create_actor(store: &MemoryStore, name: &str) -> ActorId {
    let actor_id = ActorId::new(name);
    MemoryCoordinateDriver::new(store.clone())
        .create_actor(
            &actor_id,
            ActorMetadata {
                type_name: ACTOR_TYPE.to_string(),
                key: vec![name.to_string()],
            },
        )
        .unwrap();

    actor_id
}

async fn next_event(socket: &mut RelayWebSocket) -> WebSocketEvent {
    tokio::time::timeout(Duration::from_secs(30), socket.recv())
        .await
        .expect("Timed out waiting for websocket event")
        .expect("Websocket already delivered its close")
}

/// Opens a socket and consumes the open and greeting, leaving the socket holding the actor.
async fn hold_actor(node: &Node, actor_id: &ActorId) -> RelayWebSocket {
    let mut socket = node
        .open_websocket(actor_id, "/hold", Encoding::Json, None)
        .await
        .expect("open websocket");
    assert_eq!(next_event(&mut socket).await, WebSocketEvent::Open);
    assert_eq!(
        next_event(&mut socket).await,
        WebSocketEvent::Message(WebSocketMessage::Text("welcome".to_string()))
    );

    socket
}

async fn eventually(description: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("Condition never became true: {}", description);
}

fn assert_leader_changed_close(event: WebSocketEvent) {
    match event {
        WebSocketEvent::Close(close) => {
            assert_eq!(close.code, 1001);
            assert_eq!(close.reason, "Actor leader changed");
        }
        other => panic!("Expected close, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn scenario_a_second_node_follows_first_leader() -> Result<(), Box<dyn Error>> {
    let store = MemoryStore::new();
    let actor_id = create_actor(&store, "actor-a");
    let a = start_node(&store, "node-a").await?;
    let b = start_node(&store, "node-b").await?;

    let _held_by_a = hold_actor(&a.node, &actor_id).await;
    let _held_by_b = hold_actor(&b.node, &actor_id).await;
    assert_eq!(a.node.peer_state(&actor_id), Some(PeerSnapshot::Leader));
    let following_a = Some(PeerSnapshot::Follower(a.node.node_id().clone()));
    assert_eq!(b.node.peer_state(&actor_id), following_a);

    // Several lease checks later, nothing has moved.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(a.node.peer_state(&actor_id), Some(PeerSnapshot::Leader));
    assert_eq!(b.node.peer_state(&actor_id), following_a);
    assert_eq!(a.recorder.events(), vec!["start"]);
    assert!(b.recorder.events().is_empty());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn scenario_b_followers_take_over_after_leader_crash() -> Result<(), Box<dyn Error>> {
    let store = MemoryStore::new();
    let actor_id = create_actor(&store, "actor-b");
    let a = start_node(&store, "node-a").await?;
    let b = start_node(&store, "node-b").await?;
    let c = start_node(&store, "node-c").await?;

    let _held_by_a = hold_actor(&a.node, &actor_id).await;
    let mut socket_b = hold_actor(&b.node, &actor_id).await;
    let mut socket_c = hold_actor(&c.node, &actor_id).await;

    a.driver.set_offline(true);

    // Both followers were bound to the crashed leader. Each notices the new holder and drops its
    // stale socket.
    assert_leader_changed_close(next_event(&mut socket_b).await);
    assert_leader_changed_close(next_event(&mut socket_c).await);
    assert_eq!(socket_b.ready_state(), ReadyState::Closed);
    assert_eq!(socket_c.ready_state(), ReadyState::Closed);

    // The crashed leader stops its actor once its lease would have run out.
    eventually("crashed leader stops actor", || {
        a.recorder.events() == vec!["start", "stop"]
    })
    .await;
    eventually("followers drop their peers", || {
        b.node.peer_state(&actor_id).is_none() && c.node.peer_state(&actor_id).is_none()
    })
    .await;

    let response = c.node.send_request(&actor_id, Request::new(Bytes::new())).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), &Bytes::from_static(b"1"));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn scenario_c_follower_disposal_keeps_leader_lease() -> Result<(), Box<dyn Error>> {
    let store = MemoryStore::new();
    let actor_id = create_actor(&store, "actor-c");
    let a = start_node(&store, "node-a").await?;
    let b = start_node(&store, "node-b").await?;

    let _held_by_a = hold_actor(&a.node, &actor_id).await;

    // B's peer is created for the request and disposed right after it.
    let response = b.node.send_request(&actor_id, Request::new(Bytes::new())).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(b.node.peer_state(&actor_id), None);

    let leader = b.driver.get_actor_leader(&actor_id).await?;
    let leader_node_id = leader.actor.and_then(|actor| actor.leader_node_id);
    assert_eq!(leader_node_id.as_ref(), Some(a.node.node_id()));
    assert_eq!(a.node.peer_state(&actor_id), Some(PeerSnapshot::Leader));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn scenario_d_live_send_to_lost_leader_closes_socket() -> Result<(), Box<dyn Error>> {
    let store = MemoryStore::new();
    let actor_id = create_actor(&store, "actor-d");
    let a = start_node(&store, "node-a").await?;
    let b = start_node(&store, "node-b").await?;

    let _held_by_a = hold_actor(&a.node, &actor_id).await;
    let mut socket = hold_actor(&b.node, &actor_id).await;

    // The lease still names A, so the frame goes to a node that will never ack it.
    a.driver.set_offline(true);
    let sent = socket.send_acked(WebSocketMessage::Text("ping".to_string())).await;
    match sent {
        Err(WebSocketError::Relay(RelayError::LeaderChanged(_))) => {}
        other => panic!("Expected leader changed, got {:?}", other),
    }

    match next_event(&mut socket).await {
        WebSocketEvent::Error(reason) => {
            assert!(reason.contains("Actor leader changed"), "{}", reason)
        }
        other => panic!("Expected error, got {:?}", other),
    }
    assert_leader_changed_close(next_event(&mut socket).await);
    assert_eq!(socket.ready_state(), ReadyState::Closed);
    assert!(matches!(
        socket.send(WebSocketMessage::Text("late".to_string())),
        Err(WebSocketError::NotOpen)
    ));
    assert_eq!(socket.recv().await, None);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn lost_lease_closes_leaders_own_sockets() -> Result<(), Box<dyn Error>> {
    let store = MemoryStore::new();
    let actor_id = create_actor(&store, "actor-own-socket");
    let a = start_node(&store, "node-a").await?;

    let mut socket = hold_actor(&a.node, &actor_id).await;
    assert_eq!(a.node.peer_state(&actor_id), Some(PeerSnapshot::Leader));

    // A can no longer renew, and nothing it publishes to itself arrives.
    a.driver.set_offline(true);

    assert_leader_changed_close(next_event(&mut socket).await);
    assert_eq!(socket.ready_state(), ReadyState::Closed);
    assert_eq!(socket.recv().await, None);
    eventually("leader drops its peer", || a.node.peer_state(&actor_id).is_none()).await;
    eventually("leader stops its actor", || a.recorder.events() == vec!["start", "stop"]).await;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_open_closes_actor_side() -> Result<(), Box<dyn Error>> {
    let store = MemoryStore::new();
    let actor_id = create_actor(&store, "actor-cut-off");
    let a = start_node_with(&store, "node-a", true).await?;
    let b = start_node(&store, "node-b").await?;

    let _held_by_a = hold_actor(&a.node, &actor_id).await;

    // The actor accepts the socket, then A loses the ability to tell B about it.
    let opening = b.node.open_websocket(&actor_id, "/cut-off", Encoding::Json, None);
    let opened = tokio::time::timeout(Duration::from_secs(120), opening)
        .await
        .expect("Timed out waiting for open to fail");
    assert!(opened.is_err());
    assert!(a.recorder.saw("ws-close:1011"));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn relayed_requests_reach_the_leader() -> Result<(), Box<dyn Error>> {
    let store = MemoryStore::new();
    let actor_id = create_actor(&store, "actor-fetch");
    let a = start_node(&store, "node-a").await?;
    let b = start_node(&store, "node-b").await?;

    let _held_by_a = hold_actor(&a.node, &actor_id).await;

    for expected in ["1", "2"] {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/increment")
            .body(Bytes::from_static(b"{}"))?;
        let response = b.node.send_request(&actor_id, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), &Bytes::from(expected));
        assert_eq!(response.headers()["x-method"], "POST");
        assert!(response.headers().get("content-length").is_none());
    }

    let request = Request::builder().uri("/fail").body(Bytes::new())?;
    let response = b.node.send_request(&actor_id, request).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body(), &Bytes::from_static(b"counter exploded"));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn request_for_unknown_actor_is_not_found() -> Result<(), Box<dyn Error>> {
    let store = MemoryStore::new();
    let a = start_node(&store, "node-a").await?;
    let actor_id = ActorId::new("never-created");

    let response = a.node.send_request(&actor_id, Request::new(Bytes::new())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(a.node.peer_state(&actor_id), None);

    let opened = a.node.open_websocket(&actor_id, "/", Encoding::Json, None).await;
    assert!(matches!(opened, Err(WebSocketError::Relay(RelayError::ActorNotFound))));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn relayed_websocket_echoes_and_closes() -> Result<(), Box<dyn Error>> {
    let store = MemoryStore::new();
    let actor_id = create_actor(&store, "actor-ws");
    let a = start_node(&store, "node-a").await?;
    let b = start_node(&store, "node-b").await?;

    let _held_by_a = hold_actor(&a.node, &actor_id).await;
    let mut socket = hold_actor(&b.node, &actor_id).await;
    assert_eq!(socket.ready_state(), ReadyState::Open);

    socket.send(WebSocketMessage::Text("one".to_string()))?;
    socket.send(WebSocketMessage::Binary(Bytes::from_static(&[1, 2, 3])))?;
    socket.send_acked(WebSocketMessage::Text("two".to_string())).await?;

    assert_eq!(
        next_event(&mut socket).await,
        WebSocketEvent::Message(WebSocketMessage::Text("one".to_string()))
    );
    assert_eq!(
        next_event(&mut socket).await,
        WebSocketEvent::Message(WebSocketMessage::Binary(Bytes::from_static(&[1, 2, 3])))
    );
    assert_eq!(
        next_event(&mut socket).await,
        WebSocketEvent::Message(WebSocketMessage::Text("two".to_string()))
    );

    // The actor closes from its side.
    socket.send(WebSocketMessage::Text("close".to_string()))?;
    match next_event(&mut socket).await {
        WebSocketEvent::Close(close) => {
            assert_eq!(close.code, 4000);
            assert_eq!(close.reason, "bye");
        }
        other => panic!("Expected close, got {:?}", other),
    }
    assert_eq!(socket.recv().await, None);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn closing_relayed_websocket_reaches_actor() -> Result<(), Box<dyn Error>> {
    let store = MemoryStore::new();
    let actor_id = create_actor(&store, "actor-ws-close");
    let a = start_node(&store, "node-a").await?;
    let b = start_node(&store, "node-b").await?;

    let _held_by_a = hold_actor(&a.node, &actor_id).await;
    let mut socket = hold_actor(&b.node, &actor_id).await;

    socket.close(Some(1000), Some("done".to_string()));
    match next_event(&mut socket).await {
        WebSocketEvent::Close(close) => assert_eq!(close.code, 1000),
        other => panic!("Expected close, got {:?}", other),
    }

    eventually("actor sees close", || a.recorder.saw("ws-close:1000")).await;
    eventually("follower drops its peer", || b.node.peer_state(&actor_id).is_none()).await;

    Ok(())
}

#[derive(Debug, PartialEq)]
enum ClientEvent {
    Message(WebSocketMessage),
    Close(u16, String),
}

struct TestClient {
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl ClientWebSocket for TestClient {
    fn send(&self, message: WebSocketMessage) {
        let _ = self.events.send(ClientEvent::Message(message));
    }

    fn close(&self, code: u16, reason: &str) {
        let _ = self.events.send(ClientEvent::Close(code, reason.to_string()));
    }
}

async fn next_client_event(events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(30), events.recv())
        .await
        .expect("Timed out waiting for client event")
        .expect("Client sink dropped")
}

#[tokio::test(start_paused = true)]
async fn proxied_client_socket_round_trips() -> Result<(), Box<dyn Error>> {
    let store = MemoryStore::new();
    let actor_id = create_actor(&store, "actor-proxy");
    let a = start_node(&store, "node-a").await?;
    let b = start_node(&store, "node-b").await?;

    let _held_by_a = hold_actor(&a.node, &actor_id).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = Arc::new(TestClient { events: tx });
    let proxy = b
        .node
        .proxy_websocket(&actor_id, "/chat", Encoding::Json, None, None, client)
        .await?;

    // Sent before the leader confirmed the open. Held until it does.
    proxy.on_message(WebSocketMessage::Text("early".to_string()));

    assert_eq!(
        next_client_event(&mut rx).await,
        ClientEvent::Message(WebSocketMessage::Text("welcome".to_string()))
    );
    assert_eq!(
        next_client_event(&mut rx).await,
        ClientEvent::Message(WebSocketMessage::Text("early".to_string()))
    );

    proxy.on_close(Some(1000), None);
    eventually("actor sees proxied close", || a.recorder.saw("ws-close:1000")).await;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn raw_socket_is_closed_when_actor_closes_it() -> Result<(), Box<dyn Error>> {
    let store = MemoryStore::new();
    let actor_id = create_actor(&store, "actor-raw");
    let a = start_node(&store, "node-a").await?;
    let b = start_node(&store, "node-b").await?;

    let _held_by_a = hold_actor(&a.node, &actor_id).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut headers = http::HeaderMap::new();
    headers.insert("x-client", http::HeaderValue::from_static("test"));
    let client = Arc::new(TestClient { events: tx });
    let raw = b
        .node
        .handle_raw_websocket(&actor_id, "/raw", &headers, None, client)
        .await?;

    assert_eq!(
        next_client_event(&mut rx).await,
        ClientEvent::Message(WebSocketMessage::Text("welcome".to_string()))
    );
    raw.on_message(WebSocketMessage::Text("close".to_string()));
    let closed = next_client_event(&mut rx).await;
    assert_eq!(closed, ClientEvent::Close(4000, "bye".to_string()));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_hands_leadership_to_next_caller() -> Result<(), Box<dyn Error>> {
    let store = MemoryStore::new();
    let actor_id = create_actor(&store, "actor-shutdown");
    let a = start_node(&store, "node-a").await?;
    let b = start_node(&store, "node-b").await?;

    let _held_by_a = hold_actor(&a.node, &actor_id).await;
    let mut socket = hold_actor(&b.node, &actor_id).await;

    a.node.shutdown().await;
    assert_eq!(a.recorder.events(), vec!["start", "stop"]);
    assert_eq!(a.node.peer_state(&actor_id), None);

    // The leader told B its socket is gone.
    match next_event(&mut socket).await {
        WebSocketEvent::Close(close) => assert_eq!(close.code, 1001),
        other => panic!("Expected close, got {:?}", other),
    }

    // The lease was released, so B can take over without waiting for expiry.
    eventually("follower drops its peer", || b.node.peer_state(&actor_id).is_none()).await;
    let response = b.node.send_request(&actor_id, Request::new(Bytes::new())).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(b.recorder.events(), vec!["start", "stop"]);

    Ok(())
}

fn create_root_logger_for_stdout(node_name: String) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("Node" => node_name))
}
