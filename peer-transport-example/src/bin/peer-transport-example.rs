//! Reference binary for `peer-transport`.
//!
//! `serve` hosts an [`EchoServlet`] acceptor on an axum route; `connect`
//! drives an initiator against any such server (or any other peer speaking
//! the same wire frame) and prints the reply.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::any;
use clap::{Parser, Subcommand};
use eyre::Context as _;
use peer_transport::{Endpoint, WorkerPool};
use peer_transport_example::{ConnectionArgs, EchoServlet};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Hosts an echo acceptor and waits for inbound connections.
    Serve {
        /// Address to bind the websocket upgrade endpoint on.
        #[clap(long, env = "PEER_TRANSPORT_BIND_ADDR", default_value = "127.0.0.1:10100")]
        bind_addr: SocketAddr,
    },
    /// Connects to `uri` as an initiator and sends one request.
    Connect {
        /// The `ws://` or `wss://` URI of the peer to connect to.
        #[clap(long, env = "PEER_TRANSPORT_PEER_URI")]
        uri: String,

        /// The request payload to send.
        #[clap(long, default_value = "hello")]
        payload: String,
    },
}

#[derive(Clone)]
struct AppState {
    config: peer_transport::Config,
    pool: WorkerPool,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let endpoint = Endpoint::acceptor(state.config, Arc::new(EchoServlet), state.pool);
        endpoint.accept(socket).await;
    })
}

async fn serve(cli: Cli, bind_addr: SocketAddr) -> eyre::Result<()> {
    let state = AppState {
        config: cli.connection.to_config(),
        pool: WorkerPool::new(),
    };
    let app = Router::new().route("/ws", any(ws_handler)).with_state(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding to {bind_addr}"))?;
    tracing::info!(%bind_addr, "listening for peer connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received ctrl-c, shutting down");
        })
        .await
        .context("while running axum server")
}

async fn connect(cli: Cli, uri: String, payload: String) -> eyre::Result<()> {
    let endpoint = Endpoint::initiator(cli.connection.to_config());
    let opened = endpoint
        .start_client(&uri)
        .await
        .with_context(|| format!("connecting to {uri}"))?;
    eyre::ensure!(opened, "peer at {uri} did not accept the websocket upgrade");

    let response = endpoint
        .do_post(payload)
        .await
        .context("while awaiting response")?;
    println!("{response}");
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command.clone() {
        Command::Serve { bind_addr } => serve(cli, bind_addr).await,
        Command::Connect { uri, payload } => connect(cli, uri, payload).await,
    }
}
