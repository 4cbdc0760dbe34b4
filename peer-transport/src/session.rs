//! Transport-agnostic send/receive halves of an open session.
//!
//! An [`Endpoint`](crate::Endpoint) never touches `tokio_tungstenite` or
//! `axum` types directly outside of this module: [`SessionSink`] and
//! [`SessionStream`] hide which concrete websocket implementation backs a
//! given role, so the rest of the crate only deals in raw frame bytes.

use axum::extract::ws::{self, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, protocol::CloseFrame, protocol::frame::coding::CloseCode};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub(crate) type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The send half of an open session.
pub(crate) enum SessionSink {
    Client(SplitSink<ClientStream, tungstenite::Message>),
    Server(SplitSink<WebSocket, ws::Message>),
}

/// The receive half of an open session, driven exclusively by the
/// endpoint's reader task.
pub(crate) enum SessionStream {
    Client(SplitStream<ClientStream>),
    Server(SplitStream<WebSocket>),
}

/// Splits a client-initiated tungstenite stream into send/receive halves.
pub(crate) fn split_client(stream: ClientStream) -> (SessionSink, SessionStream) {
    let (sink, stream) = stream.split();
    (SessionSink::Client(sink), SessionStream::Client(stream))
}

/// Splits a server-side, already-upgraded axum socket into send/receive halves.
pub(crate) fn split_server(socket: WebSocket) -> (SessionSink, SessionStream) {
    let (sink, stream) = socket.split();
    (SessionSink::Server(sink), SessionStream::Server(stream))
}

impl SessionSink {
    /// Sends `bytes` as a single binary message.
    pub(crate) async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<(), String> {
        match self {
            SessionSink::Client(sink) => sink
                .send(tungstenite::Message::binary(bytes))
                .await
                .map_err(|err| err.to_string()),
            SessionSink::Server(sink) => sink
                .send(ws::Message::binary(bytes))
                .await
                .map_err(|err| err.to_string()),
        }
    }

    /// Sends a normal-closure `Close` frame. Best-effort: the caller
    /// logs and swallows any error, it never propagates further.
    pub(crate) async fn close(&mut self) -> Result<(), String> {
        match self {
            SessionSink::Client(sink) => sink
                .send(tungstenite::Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "closing".into(),
                })))
                .await
                .map_err(|err| err.to_string()),
            SessionSink::Server(sink) => sink
                .send(ws::Message::Close(Some(ws::CloseFrame {
                    code: ws::close_code::NORMAL,
                    reason: "closing".into(),
                })))
                .await
                .map_err(|err| err.to_string()),
        }
    }
}

/// One fully-read inbound event from a session's receive half.
pub(crate) enum InboundEvent {
    /// A binary frame, handed to the frame codec by the caller.
    Binary(Vec<u8>),
    /// A message this layer does not care about (text, ping, pong). The
    /// reader loop simply reads the next event.
    Ignored,
    /// The peer closed the connection, or the underlying stream ended.
    Closed,
}

impl SessionStream {
    /// Awaits and classifies the next event on this session's receive half.
    pub(crate) async fn recv(&mut self) -> InboundEvent {
        match self {
            SessionStream::Client(stream) => match stream.next().await {
                Some(Ok(tungstenite::Message::Binary(bytes))) => InboundEvent::Binary(bytes.to_vec()),
                Some(Ok(tungstenite::Message::Close(_))) | None => InboundEvent::Closed,
                Some(Ok(_other)) => InboundEvent::Ignored,
                Some(Err(err)) => {
                    tracing::debug!(error = %err, "client session read error, treating as closed");
                    InboundEvent::Closed
                }
            },
            SessionStream::Server(stream) => match stream.next().await {
                Some(Ok(ws::Message::Binary(bytes))) => InboundEvent::Binary(bytes.to_vec()),
                Some(Ok(ws::Message::Close(_))) | None => InboundEvent::Closed,
                Some(Ok(_other)) => InboundEvent::Ignored,
                Some(Err(err)) => {
                    tracing::debug!(error = %err, "server session read error, treating as closed");
                    InboundEvent::Closed
                }
            },
        }
    }
}
