//! End-to-end tests that drive a real `axum` acceptor server over a real
//! TCP loopback connection with a real `tokio-tungstenite` initiator
//! client: round-trip replies, concurrent out-of-order replies, a peer
//! closing mid-wait, unanswered requests timing out, an idle session
//! being proactively closed, and the reconnect cooldown.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::any;
use peer_transport::{Config, Endpoint, Servlet, TransportError, WorkerPool, peer_frame};

/// A servlet whose behavior is driven by a small prefix language in the
/// payload, so each test can script exactly the acceptor behavior it needs
/// without a new `Servlet` impl per scenario.
struct ScriptedServlet;

#[async_trait::async_trait]
impl Servlet for ScriptedServlet {
    async fn handle(&self, endpoint: Endpoint, request_id: i64, payload: String) {
        if let Some(rest) = payload.strip_prefix("echo:") {
            let _ = endpoint.send_response(request_id, format!("reply:{rest}")).await;
        } else if let Some(rest) = payload.strip_prefix("delay:") {
            let (millis, body) = rest.split_once(':').expect("delay:<ms>:<body>");
            tokio::time::sleep(Duration::from_millis(millis.parse().expect("ms"))).await;
            let _ = endpoint.send_response(request_id, format!("reply:{body}")).await;
        } else if payload == "close" {
            endpoint.close().await;
        } else if payload == "slow" {
            // Never replies within any test's read_timeout.
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }
}

#[derive(Clone)]
struct AppState {
    config: Config,
    servlet: Arc<dyn Servlet>,
    pool: WorkerPool,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let endpoint = Endpoint::acceptor(state.config, state.servlet, state.pool);
        endpoint.accept(socket).await;
    })
}

fn test_config() -> Config {
    Config::new(
        false,
        Duration::from_secs(30),
        Duration::from_millis(500),
        Duration::from_millis(500),
    )
}

/// Starts a scripted acceptor server on an ephemeral loopback port and
/// returns its `ws://` base URI.
async fn spawn_server(config: Config) -> String {
    let state = AppState {
        config,
        servlet: Arc::new(ScriptedServlet),
        pool: WorkerPool::with_max_concurrency(8),
    };
    let app = Router::new().route("/ws", any(ws_handler)).with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("ws://{addr}/ws")
}

#[tokio::test]
async fn round_trips_a_request() {
    let uri = spawn_server(test_config()).await;
    let client = Endpoint::initiator(test_config());
    assert!(client.start_client(&uri).await.expect("connects"));

    let response = client.do_post("echo:hello").await.expect("gets a reply");
    assert_eq!(response, "reply:hello");
}

#[tokio::test]
async fn start_client_is_idempotent_once_open() {
    let uri = spawn_server(test_config()).await;
    let client = Endpoint::initiator(test_config());
    assert!(client.start_client(&uri).await.expect("connects"));
    assert!(client.start_client(&uri).await.expect("fast path"));
}

#[tokio::test]
async fn concurrent_requests_route_to_their_own_waiter_despite_out_of_order_replies() {
    let uri = spawn_server(test_config()).await;
    let client = Endpoint::initiator(test_config());
    assert!(client.start_client(&uri).await.expect("connects"));

    // request_id 0 replies last, request_id 2 replies first.
    let (a, b, c) = tokio::join!(
        client.do_post("delay:150:first"),
        client.do_post("delay:75:second"),
        client.do_post("delay:0:third"),
    );

    assert_eq!(a.expect("first completes"), "reply:first");
    assert_eq!(b.expect("second completes"), "reply:second");
    assert_eq!(c.expect("third completes"), "reply:third");
}

#[tokio::test]
async fn peer_close_during_wait_fails_with_session_closed() {
    let uri = spawn_server(test_config()).await;
    let client = Endpoint::initiator(test_config());
    assert!(client.start_client(&uri).await.expect("connects"));

    let start = tokio::time::Instant::now();
    let err = client.do_post("close").await.expect_err("peer closes without replying");
    assert!(matches!(err, TransportError::SessionClosed));
    assert!(
        start.elapsed() < Duration::from_millis(500),
        "must not wait out the full read_timeout"
    );
}

#[tokio::test]
async fn unanswered_request_times_out_without_poisoning_the_session() {
    let mut config = test_config();
    config.read_timeout = Duration::from_millis(100);
    let uri = spawn_server(config).await;
    let client = Endpoint::initiator(config);
    assert!(client.start_client(&uri).await.expect("connects"));

    let err = client.do_post("slow").await.expect_err("never replies");
    assert!(matches!(err, TransportError::ReadTimeout));

    // The endpoint must still be usable for further requests.
    let response = client.do_post("echo:still-open").await.expect("still open");
    assert_eq!(response, "reply:still-open");
}

#[tokio::test]
async fn idle_session_is_proactively_closed_after_idle_timeout() {
    let mut config = test_config();
    config.idle_timeout = Duration::from_millis(100);
    let uri = spawn_server(config).await;
    let client = Endpoint::initiator(config);
    assert!(client.start_client(&uri).await.expect("connects"));
    assert_eq!(client.negotiated_version().await, peer_frame::VERSION);

    // Neither side ever sends a frame, so both readers' idle watchdogs fire.
    tokio::time::sleep(Duration::from_millis(400)).await;

    let err = client.do_post("echo:too-late").await.expect_err("watchdog already closed the session");
    assert!(matches!(err, TransportError::SessionNotOpen));
}

#[tokio::test]
async fn reconnect_cooldown_blocks_a_second_attempt_within_ten_seconds() {
    let mut config = test_config();
    config.connect_timeout = Duration::from_millis(50);
    // Port 1 is a privileged port nothing binds to in test sandboxes;
    // the connection attempt fails fast (refused or timed out).
    let client = Endpoint::initiator(config);

    let first = client.start_client("ws://127.0.0.1:1/ws").await;
    assert!(matches!(first, Err(_) | Ok(false)));

    let second = client.start_client("ws://127.0.0.1:1/ws").await;
    assert!(!second.expect("cooldown short-circuits before attempting"));
}
