//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management and a state machine for
//! fragmented frames:
//! - `Command`: waiting for the command line (or a heartbeat `\n`)
//! - `Headers`: reading `name:value` lines until a blank line
//! - `Body`: reading `content-length` bytes, or up to the first NUL
//! - `Trailer`: a length-bounded body was read; skip its NUL if present
//!
//! # Example
//!
//! ```
//! use stompwire::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! let ready = buffer.feed(b"SEND\r\ndestination:q\r\n\r\nhi\0\n").unwrap();
//! assert_eq!(ready, 2);
//!
//! let frame = buffer.take_frame().unwrap();
//! assert_eq!(frame.command(), Some("SEND"));
//! assert_eq!(frame.body(), b"hi");
//! assert!(buffer.take_frame().unwrap().is_heartbeat());
//! assert!(!buffer.is_frame_ready());
//! ```

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};

use super::wire_format::{find_line, headers::CONTENT_LENGTH, DEFAULT_MAX_FRAME_SIZE, NUL};
use super::{Frame, Headers};
use crate::codec::FrameBuilder;
use crate::error::{ParseError, Result};

/// State machine for frame parsing.
#[derive(Debug, Default)]
enum State {
    #[default]
    Command,
    Headers {
        command: String,
        headers: Headers,
    },
    Body {
        command: String,
        headers: Headers,
        length: Option<usize>,
    },
    Trailer,
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// Bytes may be fed one at a time or many frames at once; frames come out
/// in wire order.
pub struct FrameBuffer {
    /// Unconsumed received bytes.
    buffer: BytesMut,
    /// Bytes of `buffer` already scanned for a terminator.
    scanned: usize,
    /// Current parsing state.
    state: State,
    /// Parsed frames not yet taken.
    ready: VecDeque<Frame>,
    /// Bytes consumed so far by the frame in progress.
    frame_size: usize,
    /// Maximum allowed frame size.
    max_frame_size: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 8KB, max frame: 16MB.
    pub fn new() -> Self {
        Self::with_capacity_and_max_frame(8 * 1024, DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with a custom max frame size.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self::with_capacity_and_max_frame(8 * 1024, max_frame_size)
    }

    /// Create a new frame buffer with custom capacity and max frame size.
    pub fn with_capacity_and_max_frame(capacity: usize, max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            scanned: 0,
            state: State::Command,
            ready: VecDeque::new(),
            frame_size: 0,
            max_frame_size,
        }
    }

    /// Append received bytes and parse as far as possible.
    ///
    /// Returns the number of frames that became ready during this call.
    /// Frames completed before a structural error stay ready.
    pub fn feed(&mut self, data: &[u8]) -> std::result::Result<usize, ParseError> {
        self.buffer.extend_from_slice(data);

        let mut count = 0;
        while let Some(frame) = self.try_extract_one()? {
            self.ready.push_back(frame);
            count += 1;
        }
        Ok(count)
    }

    /// Feed bytes and drain every ready frame.
    pub fn push(&mut self, data: &[u8]) -> std::result::Result<Vec<Frame>, ParseError> {
        self.feed(data)?;
        Ok(self.ready.drain(..).collect())
    }

    /// Check if a parsed frame is waiting.
    #[inline]
    pub fn is_frame_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Pop the oldest parsed frame.
    #[inline]
    pub fn take_frame(&mut self) -> Option<Frame> {
        self.ready.pop_front()
    }

    /// Get the number of buffered, unparsed bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if there are no buffered, unparsed bytes.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear buffered bytes, ready frames and parser state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.ready.clear();
        self.scanned = 0;
        self.frame_size = 0;
        self.state = State::Command;
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if the input can never become a valid frame
    fn try_extract_one(&mut self) -> std::result::Result<Option<Frame>, ParseError> {
        loop {
            match std::mem::take(&mut self.state) {
                State::Trailer => match self.buffer.first().copied() {
                    None => {
                        self.state = State::Trailer;
                        return Ok(None);
                    }
                    Some(NUL) => self.buffer.advance(1),
                    // Terminator missing; content-length already bounded the body.
                    Some(_) => {}
                },

                State::Command => {
                    if self.buffer.first() == Some(&NUL) {
                        self.buffer.advance(1);
                        continue;
                    }
                    let Some(line) = self.take_line()? else {
                        return Ok(None);
                    };
                    if line.is_empty() {
                        self.frame_size = 0;
                        return Ok(Some(Frame::heartbeat()));
                    }
                    let command = std::str::from_utf8(&line)
                        .map_err(|_| ParseError::InvalidUtf8)?
                        .to_string();
                    self.state = State::Headers {
                        command,
                        headers: Headers::new(),
                    };
                }

                State::Headers {
                    command,
                    mut headers,
                } => {
                    let Some(line) = self.take_line()? else {
                        self.state = State::Headers { command, headers };
                        return Ok(None);
                    };
                    if line.is_empty() {
                        let length = content_length(&headers)?;
                        if let Some(len) = length {
                            self.check_size(len)?;
                        }
                        self.state = State::Body {
                            command,
                            headers,
                            length,
                        };
                    } else {
                        let (name, value) = parse_header_line(&line)?;
                        headers.set(name, value);
                        self.state = State::Headers { command, headers };
                    }
                }

                State::Body {
                    command,
                    headers,
                    length: Some(len),
                } => {
                    if self.buffer.len() < len {
                        self.state = State::Body {
                            command,
                            headers,
                            length: Some(len),
                        };
                        return Ok(None);
                    }
                    let body = self.buffer.split_to(len).freeze();
                    self.frame_size = 0;
                    self.state = State::Trailer;
                    return Ok(Some(Frame::from_parts(Some(command), headers, body)));
                }

                State::Body {
                    command,
                    headers,
                    length: None,
                } => {
                    let from = self.scanned.min(self.buffer.len());
                    match self.buffer[from..].iter().position(|&b| b == NUL) {
                        Some(pos) => {
                            let body = self.buffer.split_to(from + pos).freeze();
                            self.buffer.advance(1);
                            self.scanned = 0;
                            self.frame_size = 0;
                            return Ok(Some(Frame::from_parts(Some(command), headers, body)));
                        }
                        None => {
                            self.scanned = self.buffer.len();
                            self.check_size(self.buffer.len())?;
                            self.state = State::Body {
                                command,
                                headers,
                                length: None,
                            };
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }

    /// Split off the next complete line, terminator removed.
    fn take_line(&mut self) -> std::result::Result<Option<Bytes>, ParseError> {
        match find_line(&self.buffer, self.scanned) {
            Some(line) => {
                let mut bytes = self.buffer.split_to(line.consumed);
                bytes.truncate(line.len);
                self.scanned = 0;
                self.frame_size = self.frame_size.saturating_add(line.consumed);
                Ok(Some(bytes.freeze()))
            }
            None => {
                self.scanned = self.buffer.len();
                self.check_size(self.buffer.len())?;
                Ok(None)
            }
        }
    }

    /// Fail if the frame in progress plus `pending` more bytes exceeds the
    /// maximum. Overflow counts as too large.
    fn check_size(&self, pending: usize) -> std::result::Result<(), ParseError> {
        match self.frame_size.checked_add(pending) {
            Some(size) if size <= self.max_frame_size => Ok(()),
            size => Err(ParseError::FrameTooLarge {
                size: size.unwrap_or(usize::MAX),
                max: self.max_frame_size,
            }),
        }
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::Command => "Command",
            State::Headers { .. } => "Headers",
            State::Body { .. } => "Body",
            State::Trailer => "Trailer",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuilder for FrameBuffer {
    fn to_bytes(&self, frame: &Frame) -> Result<Bytes> {
        Ok(super::encode_frame(frame)?.freeze())
    }

    fn feed(&mut self, data: &[u8]) -> std::result::Result<usize, ParseError> {
        FrameBuffer::feed(self, data)
    }

    fn is_frame_ready(&self) -> bool {
        FrameBuffer::is_frame_ready(self)
    }

    fn take_frame(&mut self) -> Option<Frame> {
        FrameBuffer::take_frame(self)
    }

    fn fresh(&self) -> Box<dyn FrameBuilder> {
        Box::new(FrameBuffer::with_max_frame_size(self.max_frame_size))
    }
}

/// Split a header line at its first colon.
fn parse_header_line(line: &[u8]) -> std::result::Result<(String, String), ParseError> {
    let text = std::str::from_utf8(line).map_err(|_| ParseError::InvalidUtf8)?;
    let (name, value) = text.split_once(':').ok_or_else(|| ParseError::MissingColon {
        line: text.to_string(),
    })?;
    Ok((name.to_string(), value.to_string()))
}

fn content_length(headers: &Headers) -> std::result::Result<Option<usize>, ParseError> {
    headers
        .get(CONTENT_LENGTH)
        .map(|value| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength {
                    value: value.to_string(),
                })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_frame;

    fn frame_bytes(frame: &Frame) -> Vec<u8> {
        encode_frame(frame).unwrap().to_vec()
    }

    fn sample_frames() -> Vec<Frame> {
        vec![
            Frame::new("SEND")
                .with_header("destination", "queue://a:b:c")
                .with_body(vec![0u8, 1, 2, 0, 255]),
            Frame::heartbeat(),
            Frame::new("SUBSCRIBE")
                .with_header("id", "0")
                .with_header("destination", "/topic/x"),
            Frame::new("MESSAGE").with_body("plain text body"),
        ]
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer
            .push(b"SEND\r\ndestination:q\r\n\r\nhello\0")
            .unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command(), Some("SEND"));
        assert_eq!(frames[0].header("destination"), Some("q"));
        assert_eq!(frames[0].body(), b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_round_trip_with_content_length() {
        let original = Frame::new("SEND")
            .with_header("destination", "queue://a:b:c")
            .with_header("x", "")
            .with_body(vec![0u8, 0, 10, 13, 58]);
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&frame_bytes(&original)).unwrap();

        assert_eq!(frames.len(), 1);
        let parsed = &frames[0];
        assert_eq!(parsed.command(), Some("SEND"));
        let headers: Vec<_> = parsed.headers().iter().collect();
        assert_eq!(
            headers,
            vec![
                ("destination", "queue://a:b:c"),
                ("x", ""),
                ("content-length", "5")
            ]
        );
        assert_eq!(parsed.body(), original.body());
    }

    #[test]
    fn test_multiple_frames_in_one_feed() {
        let mut buffer = FrameBuffer::new();
        let frames = sample_frames();
        let combined: Vec<u8> = frames.iter().flat_map(frame_bytes).collect();

        assert_eq!(buffer.feed(&combined).unwrap(), 4);
        assert_eq!(buffer.take_frame().unwrap().command(), Some("SEND"));
        assert!(buffer.take_frame().unwrap().is_heartbeat());
        assert_eq!(buffer.take_frame().unwrap().command(), Some("SUBSCRIBE"));
        assert_eq!(buffer.take_frame().unwrap().body(), b"plain text body");
        assert!(buffer.take_frame().is_none());
    }

    #[test]
    fn test_byte_at_a_time_matches_single_feed() {
        let combined: Vec<u8> = sample_frames().iter().flat_map(frame_bytes).collect();

        let mut whole = FrameBuffer::new();
        let expected = whole.push(&combined).unwrap();

        let mut trickle = FrameBuffer::new();
        let mut actual = Vec::new();
        for byte in &combined {
            actual.extend(trickle.push(&[*byte]).unwrap());
        }

        assert_eq!(actual, expected);
        assert_eq!(actual.len(), 4);
    }

    #[test]
    fn test_uneven_chunks() {
        let combined: Vec<u8> = sample_frames().iter().flat_map(frame_bytes).collect();
        let mut buffer = FrameBuffer::new();
        let mut frames = Vec::new();
        for chunk in combined.chunks(7) {
            frames.extend(buffer.push(chunk).unwrap());
        }
        assert_eq!(frames, FrameBuffer::new().push(&combined).unwrap());
    }

    #[test]
    fn test_missing_terminator_between_length_bounded_frames() {
        let first = Frame::new("SEND").with_body("one");
        let second = Frame::new("SEND").with_body("two");

        let mut bytes = frame_bytes(&first);
        assert_eq!(bytes.pop(), Some(NUL));
        bytes.extend(frame_bytes(&second));

        let frames = FrameBuffer::new().push(&bytes).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].body(), b"one");
        assert_eq!(frames[1].body(), b"two");
    }

    #[test]
    fn test_content_length_body_may_contain_nul() {
        let frames = FrameBuffer::new()
            .push(b"SEND\ncontent-length:3\n\na\0b\0")
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body(), b"a\0b");
    }

    #[test]
    fn test_bare_lf_line_endings() {
        let frames = FrameBuffer::new()
            .push(b"CONNECT\naccept-version:1.2\nhost:h\n\n\0")
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header("host"), Some("h"));
        assert!(frames[0].body().is_empty());
    }

    #[test]
    fn test_lone_cr_inside_header_value() {
        let frames = FrameBuffer::new().push(b"SEND\r\nk:a\rb\r\n\r\n\0").unwrap();
        assert_eq!(frames[0].header("k"), Some("a\rb"));
    }

    #[test]
    fn test_heartbeat_between_frames() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(b"\n\nSEND\n\n\0\r\n").unwrap();
        assert_eq!(frames.len(), 4);
        assert!(frames[0].is_heartbeat());
        assert!(frames[1].is_heartbeat());
        assert_eq!(frames[2].command(), Some("SEND"));
        assert!(frames[3].is_heartbeat());
    }

    #[test]
    fn test_fragmented_states() {
        let mut buffer = FrameBuffer::new();
        buffer.feed(b"SE").unwrap();
        assert_eq!(buffer.state_name(), "Command");
        buffer.feed(b"ND\r\nk:v").unwrap();
        assert_eq!(buffer.state_name(), "Headers");
        buffer.feed(b"\r\ncontent-length:4\r\n\r\nab").unwrap();
        assert_eq!(buffer.state_name(), "Body");
        assert_eq!(buffer.feed(b"cd").unwrap(), 1);
        assert_eq!(buffer.state_name(), "Trailer");
        buffer.feed(b"\0").unwrap();
        assert_eq!(buffer.state_name(), "Command");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_duplicate_header_last_value_wins() {
        let frames = FrameBuffer::new().push(b"SEND\nk:1\nk:2\n\n\0").unwrap();
        assert_eq!(frames[0].headers().len(), 1);
        assert_eq!(frames[0].header("k"), Some("2"));
    }

    #[test]
    fn test_header_without_colon_is_error() {
        let result = FrameBuffer::new().push(b"SEND\nbogus\n\n\0");
        assert_eq!(
            result.unwrap_err(),
            ParseError::MissingColon {
                line: "bogus".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_content_length_is_error() {
        let result = FrameBuffer::new().push(b"SEND\ncontent-length:abc\n\n\0");
        assert!(matches!(
            result,
            Err(ParseError::InvalidContentLength { .. })
        ));
    }

    #[test]
    fn test_incomplete_is_not_error() {
        let mut buffer = FrameBuffer::new();
        assert_eq!(buffer.feed(b"SEND\nk:v\n\nbody without end").unwrap(), 0);
        assert!(!buffer.is_frame_ready());
    }

    #[test]
    fn test_max_frame_size_validation() {
        let mut buffer = FrameBuffer::with_max_frame_size(32);
        let result = buffer.push(b"SEND\ncontent-length:1000\n\n");
        assert!(matches!(result, Err(ParseError::FrameTooLarge { .. })));

        let mut buffer = FrameBuffer::with_max_frame_size(16);
        let result = buffer.push(&[b'A'; 64]);
        assert!(matches!(result, Err(ParseError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_emptied_body_with_stale_content_length_keeps_framing() {
        let forwarded = Frame::new("SEND").with_header("content-length", "5");
        let next = Frame::new("SEND").with_header("n", "2");
        let mut bytes = frame_bytes(&forwarded);
        bytes.extend_from_slice(&frame_bytes(&next));

        let frames = FrameBuffer::new().push(&bytes).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].body().is_empty());
        assert_eq!(frames[0].content_length(), Some(0));
        assert_eq!(frames[1].command(), Some("SEND"));
        assert_eq!(frames[1].header("n"), Some("2"));
    }

    #[test]
    fn test_huge_content_length_is_too_large() {
        let input = format!("SEND\ncontent-length:{}\n\n", usize::MAX);
        let mut buffer = FrameBuffer::new();
        let result = buffer.feed(input.as_bytes());
        assert!(matches!(result, Err(ParseError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_frames_before_error_stay_ready() {
        let mut buffer = FrameBuffer::new();
        let result = buffer.feed(b"SEND\n\n\0BAD\nnocolon\n");
        assert!(result.is_err());
        assert_eq!(buffer.take_frame().unwrap().command(), Some("SEND"));
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = FrameBuffer::new();
        buffer.feed(b"SEND\nk:v\n").unwrap();
        assert_eq!(buffer.state_name(), "Headers");

        buffer.clear();

        assert_eq!(buffer.state_name(), "Command");
        assert!(buffer.is_empty());
        let frames = buffer.push(b"ACK\n\n\0").unwrap();
        assert_eq!(frames[0].command(), Some("ACK"));
    }

    #[test]
    fn test_builder_trait_round_trip() {
        let codec: Box<dyn FrameBuilder> = Box::new(FrameBuffer::new());
        let mut fresh = codec.fresh();
        let bytes = codec.to_bytes(&Frame::new("SEND").with_body("x")).unwrap();

        assert_eq!(fresh.feed(&bytes).unwrap(), 1);
        assert!(fresh.is_frame_ready());
        assert_eq!(fresh.take_frame().unwrap().body(), b"x");
    }
}
