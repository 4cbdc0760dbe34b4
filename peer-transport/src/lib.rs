#![deny(missing_docs)]
//! A role-polymorphic request/response multiplexer over a single upgraded
//! websocket connection, for peer-to-peer node transports.
//!
//! An [`Endpoint`] owns at most one open session and a table of
//! outstanding requests keyed by request id. The same type serves both
//! roles:
//!
//! - An **initiator** calls [`Endpoint::start_client`] to open a session,
//!   then [`Endpoint::do_post`] to send a request and block until its
//!   matching response arrives, a [`TransportError::ReadTimeout`] elapses,
//!   or the session closes.
//! - An **acceptor** is built with a [`Servlet`] callback and a shared
//!   [`WorkerPool`], then driven from an already-upgraded socket via
//!   [`Endpoint::accept`]. Inbound requests are dispatched to the servlet
//!   on the pool; the servlet replies with [`Endpoint::send_response`].
//!
//! Wire framing (20-byte prefix, optional gzip body) lives in the sibling
//! [`peer_frame`] crate and is re-exported here for convenience.
//!
//! This crate does not load configuration itself — see [`Config`] — and
//! payloads are opaque UTF-8 strings; no JSON schema is enforced at this
//! layer.

mod config;
mod endpoint;
mod error;
mod pool;
mod session;
mod waiter;

pub use config::Config;
pub use endpoint::{Endpoint, Servlet};
pub use error::TransportError;
pub use pool::WorkerPool;

/// The wire frame codec, re-exported so callers don't need a direct
/// dependency on `peer-frame` just to read its constants or errors.
pub use peer_frame;
