//! The role-polymorphic connection multiplexer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite;

use crate::config::Config;
use crate::error::TransportError;
use crate::pool::WorkerPool;
use crate::session::{self, InboundEvent, SessionSink, SessionStream};
use crate::waiter::Waiter;

/// Minimum interval between two `start_client` upgrade attempts against
/// the same endpoint. Armed even when an attempt fails fast, to avoid
/// tight reconnect loops against an unreachable peer.
const RECONNECT_COOLDOWN: Duration = Duration::from_millis(10_000);

/// Extra slack added to `connect_timeout` before a `start_client` call
/// gives up waiting for the upgrade to complete.
const CONNECT_SLACK: Duration = Duration::from_millis(100);

/// The application-level callback an acceptor dispatches decoded requests to.
///
/// Implementations are expected to eventually call
/// [`Endpoint::send_response`] with the same `request_id`. There is no
/// ordering requirement: replies may be sent out of arrival order.
#[async_trait::async_trait]
pub trait Servlet: Send + Sync + 'static {
    /// Handles one decoded inbound request.
    async fn handle(&self, endpoint: Endpoint, request_id: i64, payload: String);
}

/// Dynamic trait object handed to [`Endpoint::acceptor`].
pub type SharedServlet = Arc<dyn Servlet>;

/// Which side of the upgrade this endpoint is on.
enum Role {
    /// Originated the upgrade; calls `start_client` and `do_post`.
    Initiator,
    /// Was upgraded by a server; dispatches inbound frames to `servlet`
    /// on the shared `pool`.
    Acceptor {
        servlet: Arc<dyn Servlet>,
        pool: WorkerPool,
    },
}

struct State {
    sink: Option<SessionSink>,
    version: u32,
    next_request_id: i64,
    last_connect_attempt: Option<Instant>,
    pending: HashMap<i64, Arc<Waiter>>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            sink: None,
            version: peer_frame::VERSION,
            next_request_id: 0,
            last_connect_attempt: None,
            pending: HashMap::new(),
        }
    }
}

struct Inner {
    role: Role,
    config: Config,
    state: Mutex<State>,
}

/// A single peer-side connection, owning at most one open session and its
/// table of outstanding requests.
///
/// One type serves both roles: an [`Endpoint::initiator`] drives
/// [`start_client`](Endpoint::start_client) and
/// [`do_post`](Endpoint::do_post); an [`Endpoint::acceptor`] is driven by
/// [`accept`](Endpoint::accept) and replies via
/// [`send_response`](Endpoint::send_response). Cloning an `Endpoint` is
/// cheap — it is a handle to shared state, the same way a servlet callback
/// is handed its endpoint back to reply on.
#[derive(Clone)]
pub struct Endpoint(Arc<Inner>);

impl Endpoint {
    /// Builds an unconnected initiator endpoint. Call
    /// [`start_client`](Self::start_client) to open it.
    pub fn initiator(config: Config) -> Self {
        Self(Arc::new(Inner {
            role: Role::Initiator,
            config,
            state: Mutex::new(State::default()),
        }))
    }

    /// Builds an unconnected acceptor endpoint bound to `servlet` and the
    /// shared `pool`. Call [`accept`](Self::accept) with an already-upgraded
    /// socket to drive it to `[Open]`.
    pub fn acceptor(config: Config, servlet: Arc<dyn Servlet>, pool: WorkerPool) -> Self {
        Self(Arc::new(Inner {
            role: Role::Acceptor { servlet, pool },
            config,
            state: Mutex::new(State::default()),
        }))
    }

    /// Drives this acceptor endpoint from an already-upgraded socket until
    /// the session closes. Intended to be awaited directly inside an
    /// `axum` `on_upgrade` callback.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn accept(&self, socket: axum::extract::ws::WebSocket) {
        let (sink, stream) = session::split_server(socket);
        {
            let mut state = self.0.state.lock().await;
            state.sink = Some(sink);
        }
        self.run_reader(stream).await;
    }

    /// Opens (or reuses) a client session at `uri`.
    ///
    /// Returns `Ok(true)` once a session is open (including the idempotent
    /// fast path where one already was). Returns `Ok(false)` either when a
    /// reconnect attempt is still in its [`RECONNECT_COOLDOWN`] window, or
    /// when the server responded without upgrading (the caller is expected
    /// to fall back to plain HTTP in that case). Fails with
    /// [`TransportError::InvalidUri`] if `uri` does not parse into a
    /// websocket upgrade request; all other failures are returned as `Err`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn start_client(&self, uri: &str) -> Result<bool, TransportError> {
        let mut state = self.0.state.lock().await;
        if state.sink.is_some() {
            return Ok(true);
        }

        let request = uri.parse::<tungstenite::http::Uri>()?;

        let now = Instant::now();
        if let Some(last) = state.last_connect_attempt {
            if now.duration_since(last) < RECONNECT_COOLDOWN {
                return Ok(false);
            }
        }
        state.last_connect_attempt = Some(now);

        let deadline = self.0.config.connect_timeout + CONNECT_SLACK;
        match tokio::time::timeout(deadline, tokio_tungstenite::connect_async(request)).await {
            Ok(Ok((stream, _response))) => {
                let (sink, read_half) = session::split_client(stream);
                state.sink = Some(sink);
                state.version = peer_frame::VERSION;
                drop(state);
                let endpoint = self.clone();
                tokio::spawn(async move { endpoint.run_reader(read_half).await });
                Ok(true)
            }
            Ok(Err(tungstenite::Error::Http(_response))) => {
                drop(state);
                tracing::debug!("peer did not upgrade, falling back to caller's HTTP path");
                self.close().await;
                Ok(false)
            }
            Ok(Err(err)) => {
                drop(state);
                self.close().await;
                Err(TransportError::TransportIo(err.to_string()))
            }
            Err(_elapsed) => {
                drop(state);
                self.close().await;
                Err(TransportError::ConnectTimeout)
            }
        }
    }

    /// Sends `payload` as a new request and awaits its response.
    ///
    /// Allocates a fresh `request_id`, registers the waiter, and sends the
    /// frame — all under the endpoint lock, so a reply can never arrive
    /// before the waiter exists to receive it. The wait itself happens
    /// outside the lock.
    #[tracing::instrument(level = "debug", skip(self, payload), fields(request_id = tracing::field::Empty))]
    pub async fn do_post(&self, payload: impl Into<String>) -> Result<String, TransportError> {
        let payload = payload.into();
        let read_timeout = self.0.config.read_timeout;

        let (request_id, rx) = {
            let mut state = self.0.state.lock().await;
            if state.sink.is_none() {
                return Err(TransportError::SessionNotOpen);
            }
            let request_id = state.next_request_id;
            state.next_request_id = state.next_request_id.wrapping_add(1);
            tracing::Span::current().record("request_id", request_id);

            let frame = peer_frame::encode(payload.as_bytes(), request_id, peer_frame::VERSION, self.0.config.enable_gzip)?;

            let (waiter, rx) = Waiter::new();
            let waiter = Arc::new(waiter);
            state.pending.insert(request_id, Arc::clone(&waiter));

            let sink = state.sink.as_mut().expect("checked session is open above");
            if let Err(err) = sink.send_binary(frame).await {
                state.pending.remove(&request_id);
                return Err(TransportError::TransportIo(err));
            }
            (request_id, rx)
        };

        match tokio::time::timeout(read_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_recv_error)) => Err(TransportError::SessionClosed),
            Err(_elapsed) => {
                self.0.state.lock().await.pending.remove(&request_id);
                Err(TransportError::ReadTimeout)
            }
        }
    }

    /// Replies to `request_id` with `payload`.
    ///
    /// If the session already closed, the peer has necessarily already
    /// observed that and this is a silent, successful no-op — there is no
    /// one left to deliver the reply to.
    #[tracing::instrument(level = "debug", skip(self, payload))]
    pub async fn send_response(&self, request_id: i64, payload: impl Into<String>) -> Result<(), TransportError> {
        let payload = payload.into();
        let mut state = self.0.state.lock().await;
        let Some(sink) = state.sink.as_mut() else {
            return Ok(());
        };
        let frame = peer_frame::encode(payload.as_bytes(), request_id, peer_frame::VERSION, self.0.config.enable_gzip)?;
        sink.send_binary(frame).await.map_err(TransportError::TransportIo)
    }

    /// The lowest of this endpoint's own `VERSION` and the highest version
    /// seen from the peer so far, or `VERSION` if no frame has arrived yet.
    /// Tracked for diagnostics and future multi-version decoding; both
    /// sides of the wire still only speak `VERSION` today.
    pub async fn negotiated_version(&self) -> u32 {
        self.0.state.lock().await.version
    }

    /// Closes the session (best-effort) and fails every outstanding waiter
    /// with [`TransportError::SessionClosed`]. Idempotent: closing an
    /// already-closed endpoint is a no-op.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn close(&self) {
        let mut state = self.0.state.lock().await;
        if let Some(mut sink) = state.sink.take() {
            if let Err(err) = sink.close().await {
                tracing::debug!(error = %err, "best-effort close failed, dropping session anyway");
            }
        }
        for (_, waiter) in state.pending.drain() {
            waiter.complete_err(TransportError::SessionClosed);
        }
    }

    /// Drives a session's receive half until it closes or goes idle for
    /// longer than `idle_timeout`. Shared by both roles: the only
    /// difference between them is what [`on_binary_message`](Self::on_binary_message)
    /// does with a decoded frame.
    async fn run_reader(&self, mut stream: SessionStream) {
        let idle_timeout = self.0.config.idle_timeout;
        loop {
            match tokio::time::timeout(idle_timeout, stream.recv()).await {
                Ok(InboundEvent::Binary(bytes)) => self.on_binary_message(bytes).await,
                Ok(InboundEvent::Ignored) => continue,
                Ok(InboundEvent::Closed) => {
                    self.close().await;
                    return;
                }
                Err(_elapsed) => {
                    tracing::debug!(?idle_timeout, "session idle, closing");
                    self.close().await;
                    return;
                }
            }
        }
    }

    /// Decodes one inbound frame and dispatches it per role.
    ///
    /// A decode failure is logged and the frame dropped; it never tears
    /// down the session, since framing is self-delimited per message (a
    /// corrupt frame says nothing about the next one). If the dropped
    /// frame was meant to be a reply, its waiter only learns about this
    /// via `read_timeout` — preserved intentionally, not a bug to fix.
    async fn on_binary_message(&self, bytes: Vec<u8>) {
        let frame = match peer_frame::decode(&bytes) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(error = %err, "dropping malformed inbound frame");
                return;
            }
        };

        let mut state = self.0.state.lock().await;
        let negotiated = frame.version.min(peer_frame::VERSION);
        if negotiated != state.version {
            tracing::debug!(peer_version = frame.version, negotiated, "version negotiation updated");
            state.version = negotiated;
        }

        match &self.0.role {
            Role::Acceptor { servlet, pool } => {
                let endpoint = self.clone();
                let servlet = Arc::clone(servlet);
                let request_id = frame.request_id;
                let payload = frame.payload;
                pool.submit(async move {
                    servlet.handle(endpoint, request_id, payload).await;
                });
            }
            Role::Initiator => {
                if let Some(waiter) = state.pending.remove(&frame.request_id) {
                    waiter.complete_ok(frame.payload);
                }
            }
        }
    }
}
