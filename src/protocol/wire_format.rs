//! Wire format encoding and line scanning.
//!
//! ```text
//! <command>\r\n
//! <name>:<value>\r\n        (zero or more, first ':' separates)
//! \r\n
//! <body bytes>
//! \0
//! ```
//!
//! A heartbeat is a single `\n`. Lines are read terminated by `\r\n` or
//! bare `\n` and always written with `\r\n`.

use bytes::{BufMut, BytesMut};

use super::Frame;
use crate::error::{Result, StompError};

/// Frame terminator.
pub const NUL: u8 = 0x00;

/// Line feed; on its own this is a heartbeat.
pub const LF: u8 = 0x0A;

/// Carriage return.
pub const CR: u8 = 0x0D;

/// Line terminator written on the wire.
pub const EOL: &[u8] = b"\r\n";

/// The single byte a heartbeat serializes to.
pub const HEARTBEAT: &[u8] = &[LF];

/// Default maximum size of a single frame (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Well-known commands.
pub mod commands {
    pub const CONNECT: &str = "CONNECT";
    pub const STOMP: &str = "STOMP";
    pub const CONNECTED: &str = "CONNECTED";
    pub const SEND: &str = "SEND";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
    pub const ACK: &str = "ACK";
    pub const NACK: &str = "NACK";
    pub const BEGIN: &str = "BEGIN";
    pub const COMMIT: &str = "COMMIT";
    pub const ABORT: &str = "ABORT";
    pub const DISCONNECT: &str = "DISCONNECT";
    pub const MESSAGE: &str = "MESSAGE";
    pub const RECEIPT: &str = "RECEIPT";
    pub const ERROR: &str = "ERROR";
}

/// Well-known header names.
pub mod headers {
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const HEART_BEAT: &str = "heart-beat";
    pub const DESTINATION: &str = "destination";
    pub const RECEIPT: &str = "receipt";
    pub const RECEIPT_ID: &str = "receipt-id";
    pub const MESSAGE: &str = "message";
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const VERSION: &str = "version";
}

/// A line located at the start of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line {
    /// Length of the line content, terminator excluded.
    pub len: usize,
    /// Bytes to consume, terminator included.
    pub consumed: usize,
}

/// Find the first complete line in `buf`, scanning from `from`.
///
/// A line ends at the first `\n`; a `\r` directly before it belongs to the
/// terminator. A lone `\r` is ordinary content. Returns `None` when no `\n`
/// has arrived yet.
///
/// # Example
///
/// ```
/// use stompwire::protocol::find_line;
///
/// assert_eq!(find_line(b"AB\r", 0), None);
/// let line = find_line(b"AB\r\n", 0).unwrap();
/// assert_eq!(line.len, 2);
/// assert_eq!(line.consumed, 4);
/// ```
pub fn find_line(buf: &[u8], from: usize) -> Option<Line> {
    let start = from.min(buf.len());
    let pos = buf[start..].iter().position(|&b| b == LF)? + start;
    let len = if pos > 0 && buf[pos - 1] == CR {
        pos - 1
    } else {
        pos
    };
    Some(Line {
        len,
        consumed: pos + 1,
    })
}

/// Serialize a frame into `buf`.
///
/// The heartbeat sentinel becomes a single `\n`. When the body is non-empty
/// its byte length is written as `content-length`, replacing any existing
/// value in place. An existing `content-length` on an empty body becomes `0`.
pub fn encode_frame_into(frame: &Frame, buf: &mut BytesMut) -> Result<()> {
    if frame.is_heartbeat() {
        buf.put_slice(HEARTBEAT);
        return Ok(());
    }

    let command = frame.command().ok_or(StompError::MissingCommand)?;
    let body = frame.body();
    let content_length = (!body.is_empty() || frame.headers().contains(headers::CONTENT_LENGTH))
        .then(|| body.len().to_string());

    buf.reserve(encoded_len_hint(frame));
    buf.put_slice(command.as_bytes());
    buf.put_slice(EOL);

    let mut wrote_length = false;
    for (name, value) in frame.headers().iter() {
        let value = match &content_length {
            Some(len) if name == headers::CONTENT_LENGTH => {
                wrote_length = true;
                len.as_str()
            }
            _ => value,
        };
        put_header(buf, name, value);
    }
    if let (Some(len), false) = (&content_length, wrote_length) {
        put_header(buf, headers::CONTENT_LENGTH, len);
    }

    buf.put_slice(EOL);
    buf.put_slice(body);
    buf.put_u8(NUL);
    Ok(())
}

/// Serialize a frame into a fresh buffer.
pub fn encode_frame(frame: &Frame) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    encode_frame_into(frame, &mut buf)?;
    Ok(buf)
}

#[inline]
fn put_header(buf: &mut BytesMut, name: &str, value: &str) {
    buf.put_slice(name.as_bytes());
    buf.put_u8(b':');
    buf.put_slice(value.as_bytes());
    buf.put_slice(EOL);
}

fn encoded_len_hint(frame: &Frame) -> usize {
    let headers: usize = frame
        .headers()
        .iter()
        .map(|(n, v)| n.len() + v.len() + 3)
        .sum();
    frame.command().map_or(0, str::len) + headers + frame.body().len() + 32
}
