//! Exercises the reference `EchoServlet` over a real loopback connection,
//! the same way a user driving `serve` + `connect` from two terminals would.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::any;
use peer_transport::{Config, Endpoint, WorkerPool};
use peer_transport_example::EchoServlet;

#[derive(Clone)]
struct AppState {
    config: Config,
    pool: WorkerPool,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let endpoint = Endpoint::acceptor(state.config, Arc::new(EchoServlet), state.pool);
        endpoint.accept(socket).await;
    })
}

#[tokio::test]
async fn echoes_a_request() {
    let config = Config::new(
        false,
        Duration::from_secs(30),
        Duration::from_millis(500),
        Duration::from_millis(500),
    );
    let state = AppState {
        config,
        pool: WorkerPool::with_max_concurrency(4),
    };
    let app = Router::new().route("/ws", any(ws_handler)).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let client = Endpoint::initiator(config);
    assert!(client.start_client(&format!("ws://{addr}/ws")).await.expect("connects"));
    let response = client.do_post("ping").await.expect("reply");
    assert_eq!(response, "reply:ping");
}
