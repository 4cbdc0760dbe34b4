#![deny(missing_docs)]
//! Reference [`peer_transport::Servlet`] and CLI config shared by the
//! `peer-transport-example` binary's `serve` and `connect` subcommands.

use std::time::Duration;

use clap::Args;
use peer_transport::{Config, Endpoint};

/// Echoes every request back with a `reply:` prefix, the same scripted
/// shape used by `peer-transport`'s own integration tests, so `connect`
/// run against a local `serve` has something observable to show.
pub struct EchoServlet;

#[async_trait::async_trait]
impl peer_transport::Servlet for EchoServlet {
    async fn handle(&self, endpoint: Endpoint, request_id: i64, payload: String) {
        tracing::info!(request_id, %payload, "handling request");
        if let Err(err) = endpoint.send_response(request_id, format!("reply:{payload}")).await {
            tracing::warn!(request_id, error = %err, "failed to send response");
        }
    }
}

/// Shared connection tuning flags, flattened into the binary's top-level
/// CLI parser and turned into a [`peer_transport::Config`] via
/// [`ConnectionArgs::to_config`].
#[derive(Clone, Debug, Args)]
pub struct ConnectionArgs {
    /// Enable gzip compression for frame bodies at or above the codec's
    /// minimum-size threshold.
    #[clap(long, env = "PEER_TRANSPORT_ENABLE_GZIP")]
    pub enable_gzip: bool,

    /// How long a session may sit without an inbound frame before it is
    /// treated as dead and closed.
    #[clap(long, env = "PEER_TRANSPORT_IDLE_TIMEOUT", default_value = "90s", value_parser = humantime::parse_duration)]
    pub idle_timeout: Duration,

    /// How long `start_client` waits for the websocket upgrade to complete.
    #[clap(long, env = "PEER_TRANSPORT_CONNECT_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub connect_timeout: Duration,

    /// How long `do_post` waits for a matching response before timing out.
    #[clap(long, env = "PEER_TRANSPORT_READ_TIMEOUT", default_value = "30s", value_parser = humantime::parse_duration)]
    pub read_timeout: Duration,
}

impl ConnectionArgs {
    /// Builds the [`Config`] these flags describe.
    pub fn to_config(&self) -> Config {
        Config::new(self.enable_gzip, self.idle_timeout, self.connect_timeout, self.read_timeout)
    }
}
