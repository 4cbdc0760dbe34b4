//! Errors surfaced across the [`Endpoint`](crate::Endpoint) boundary.

use tokio_tungstenite::tungstenite::http::uri::InvalidUri;

/// Errors returned by [`Endpoint`](crate::Endpoint)'s public operations.
///
/// Decode failures on *inbound* frames never reach this type: they are
/// logged and the offending frame is dropped (see the crate docs).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// `do_post` or `send_response` was called with no live session.
    #[error("no live session on this endpoint")]
    SessionNotOpen,
    /// `start_client`'s upgrade did not complete within `connect_timeout + 100ms`.
    #[error("connect attempt timed out")]
    ConnectTimeout,
    /// `do_post`'s waiter did not complete within `read_timeout`.
    #[error("no response within the read timeout")]
    ReadTimeout,
    /// The session closed (locally or peer-initiated) before a pending
    /// `do_post` call completed.
    #[error("session closed")]
    SessionClosed,
    /// The underlying websocket transport reported an I/O failure.
    #[error("transport I/O error: {0}")]
    TransportIo(String),
    /// The URI passed to `start_client` could not be parsed into an
    /// upgrade request.
    #[error("invalid websocket URI: {0}")]
    InvalidUri(#[from] InvalidUri),
    /// Encoding the outbound frame failed (most commonly: the payload is
    /// larger than `MAX_MESSAGE_SIZE`).
    #[error(transparent)]
    Frame(#[from] peer_frame::FrameError),
}
