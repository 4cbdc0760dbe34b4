//! The downward interface from the hosting application's configuration
//! collaborator.
//!
//! This crate deliberately does not read environment variables, files, or
//! a properties store itself — loading configuration is a Non-goal of the
//! transport layer (see the crate docs). [`Config`] is the plain-data
//! shape the hosting application is expected to populate however it sees
//! fit (a CLI parser, a config file, hardcoded defaults, ...).

use std::time::Duration;

/// Tunable parameters for a [`Endpoint`](crate::Endpoint), mapped from the
/// original property names they correspond to.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Enables per-message gzip compression on outbound frames whose
    /// payload is at least [`peer_frame::MIN_COMPRESS_SIZE`] bytes.
    ///
    /// Corresponds to `nxt.enablePeerServerGZIPFilter`.
    pub enable_gzip: bool,
    /// How long a session may go without receiving any inbound frame
    /// before the reader task proactively closes it.
    ///
    /// Corresponds to `Peers.webSocketIdleTimeout`.
    pub idle_timeout: Duration,
    /// Upper bound on how long `start_client` waits for the websocket
    /// upgrade to complete (the endpoint itself adds a further 100ms of
    /// slack on top of this value).
    ///
    /// Corresponds to `Peers.connectTimeout`.
    pub connect_timeout: Duration,
    /// Upper bound on how long `do_post` waits for a matching response.
    ///
    /// Corresponds to `Peers.readTimeout`.
    pub read_timeout: Duration,
}

impl Config {
    /// Builds a `Config` from explicit values. Exists mainly so call
    /// sites read as named fields rather than a positional tuple.
    pub fn new(
        enable_gzip: bool,
        idle_timeout: Duration,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Self {
        Self {
            enable_gzip,
            idle_timeout,
            connect_timeout,
            read_timeout,
        }
    }
}
