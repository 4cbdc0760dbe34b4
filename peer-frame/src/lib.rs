#![deny(missing_docs, clippy::unwrap_used)]
//! Wire frame codec for the peer transport layer.
//!
//! A frame is a fixed 20-byte, big-endian prefix followed by a body of
//! UTF-8 JSON bytes, optionally gzip-compressed. [`encode`] and [`decode`]
//! are pure functions: no I/O, no shared state, so they can be fuzzed and
//! unit tested directly.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

/// Wire protocol version implemented by this crate. The only version
/// currently defined.
pub const VERSION: u32 = 1;

/// Bit 0 of the `flags` field: the body is gzip-compressed.
pub const FLAG_COMPRESSED: u32 = 0x1;

/// Minimum raw payload length, in bytes, eligible for gzip compression.
/// Shorter payloads are always sent raw, even when compression is enabled.
pub const MIN_COMPRESS_SIZE: usize = 256;

/// Maximum size, in bytes, of an encoded frame (20-byte prefix + body).
/// Enforced on both send and receive.
pub const MAX_MESSAGE_SIZE: usize = 192 * 1024 * 1024;

const PREFIX_LEN: usize = 20;

/// Errors returned by [`encode`] and [`decode`].
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The encoded frame would exceed [`MAX_MESSAGE_SIZE`].
    #[error("encoded frame exceeds the {MAX_MESSAGE_SIZE} byte maximum message size")]
    FrameTooLarge,
    /// Fewer than 20 bytes were given to [`decode`].
    #[error("frame is shorter than the 20-byte prefix")]
    MalformedPrefix,
    /// The gzip stream ended before producing the declared `uncompressed_len` bytes.
    #[error("gzip stream produced {actual} bytes, expected {expected}")]
    TruncatedCompressedBody {
        /// The `uncompressed_len` declared in the frame prefix.
        expected: u32,
        /// The number of bytes actually produced before the stream ended.
        actual: usize,
    },
    /// The decompressed (or raw) body is not valid UTF-8.
    #[error("frame body is not valid UTF-8")]
    InvalidUtf8(#[source] std::string::FromUtf8Error),
    /// gzip compression or decompression failed.
    #[error("gzip (de)compression failed")]
    Gzip(#[source] std::io::Error),
}

/// A frame decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Protocol version the sender claims to support.
    pub version: u32,
    /// Request id echoed between initiator and acceptor.
    pub request_id: i64,
    /// The decoded (and decompressed, if applicable) UTF-8 payload.
    pub payload: String,
}

/// Encodes `payload` into a wire frame.
///
/// Compresses the body with gzip iff `compression_enabled` and
/// `payload.len() >= MIN_COMPRESS_SIZE`. Fails with [`FrameError::FrameTooLarge`]
/// if the resulting frame (prefix + body) would exceed [`MAX_MESSAGE_SIZE`].
pub fn encode(
    payload: &[u8],
    request_id: i64,
    version: u32,
    compression_enabled: bool,
) -> Result<Vec<u8>, FrameError> {
    let (flags, uncompressed_len, body) = if compression_enabled && payload.len() >= MIN_COMPRESS_SIZE {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).map_err(FrameError::Gzip)?;
        let compressed = encoder.finish().map_err(FrameError::Gzip)?;
        (FLAG_COMPRESSED, payload.len(), compressed)
    } else {
        (0, payload.len(), payload.to_vec())
    };

    if PREFIX_LEN + body.len() > MAX_MESSAGE_SIZE {
        return Err(FrameError::FrameTooLarge);
    }

    let uncompressed_len = u32::try_from(uncompressed_len).map_err(|_| FrameError::FrameTooLarge)?;
    let mut frame = Vec::with_capacity(PREFIX_LEN + body.len());
    frame.extend_from_slice(&version.to_be_bytes());
    frame.extend_from_slice(&request_id.to_be_bytes());
    frame.extend_from_slice(&flags.to_be_bytes());
    frame.extend_from_slice(&uncompressed_len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decodes a wire frame produced by [`encode`].
pub fn decode(frame: &[u8]) -> Result<DecodedFrame, FrameError> {
    if frame.len() < PREFIX_LEN {
        return Err(FrameError::MalformedPrefix);
    }
    if frame.len() > MAX_MESSAGE_SIZE {
        return Err(FrameError::FrameTooLarge);
    }
    let version = u32::from_be_bytes(prefix_field(frame, 0));
    let request_id = i64::from_be_bytes(prefix_field(frame, 4));
    let flags = u32::from_be_bytes(prefix_field(frame, 12));
    let uncompressed_len = u32::from_be_bytes(prefix_field(frame, 16));
    if uncompressed_len as usize > MAX_MESSAGE_SIZE {
        return Err(FrameError::FrameTooLarge);
    }
    let body = &frame[PREFIX_LEN..];

    let bytes = if flags & FLAG_COMPRESSED != 0 {
        let mut decoder = GzDecoder::new(body).take(MAX_MESSAGE_SIZE as u64 + 1);
        let mut out = Vec::with_capacity((uncompressed_len as usize).min(MIN_COMPRESS_SIZE * 64));
        decoder.read_to_end(&mut out).map_err(FrameError::Gzip)?;
        if out.len() != uncompressed_len as usize {
            return Err(FrameError::TruncatedCompressedBody {
                expected: uncompressed_len,
                actual: out.len(),
            });
        }
        out
    } else {
        body.to_vec()
    };

    let payload = String::from_utf8(bytes).map_err(FrameError::InvalidUtf8)?;
    Ok(DecodedFrame {
        version,
        request_id,
        payload,
    })
}

/// Reads a fixed-size big-endian field out of the frame prefix.
///
/// `offset + N <= PREFIX_LEN` always holds for the call sites in this
/// module, so the slice-to-array conversion below never fails.
fn prefix_field<const N: usize>(frame: &[u8], offset: usize) -> [u8; N] {
    frame[offset..offset + N]
        .try_into()
        .expect("prefix field within the checked 20-byte prefix")
}
