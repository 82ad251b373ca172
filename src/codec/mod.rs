//! Codec module - pluggable wire codecs.
//!
//! A [`FrameBuilder`] turns [`Frame`]s into wire bytes and rebuilds them
//! from an arbitrary sequence of received chunks. Transports hold one
//! prototype codec for serialization and call [`FrameBuilder::fresh`] to
//! get an independent parser for every connection.
//!
//! The only shipped implementation is
//! [`FrameBuffer`](crate::protocol::FrameBuffer), the text framed codec.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use stompwire::codec::FrameBuilder;
//! use stompwire::protocol::{Frame, FrameBuffer};
//!
//! let prototype: Arc<dyn FrameBuilder> = Arc::new(FrameBuffer::new());
//! let bytes = prototype.to_bytes(&Frame::new("SEND").with_body("hi")).unwrap();
//!
//! let mut parser = prototype.fresh();
//! parser.feed(&bytes).unwrap();
//! assert_eq!(parser.take_frame().unwrap().body(), b"hi");
//! ```

use bytes::Bytes;

use crate::error::{ParseError, Result};
use crate::protocol::Frame;

/// A stateful wire codec.
///
/// Serialization is stateless (`&self`); parsing accumulates bytes and
/// queues completed frames.
pub trait FrameBuilder: Send + Sync {
    /// Serialize a frame to wire bytes.
    fn to_bytes(&self, frame: &Frame) -> Result<Bytes>;

    /// Append received bytes and parse as many frames as possible.
    ///
    /// Returns the number of frames that became ready. An incomplete frame
    /// is not an error.
    fn feed(&mut self, data: &[u8]) -> std::result::Result<usize, ParseError>;

    /// Check if a parsed frame is waiting.
    fn is_frame_ready(&self) -> bool;

    /// Pop the oldest parsed frame.
    fn take_frame(&mut self) -> Option<Frame>;

    /// A new codec with the same settings and empty state.
    fn fresh(&self) -> Box<dyn FrameBuilder>;
}
