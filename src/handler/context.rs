//! Per-frame context for handlers.
//!
//! A [`FrameContext`] pairs a received frame with the transport it arrived
//! on, so code processing the frame can answer without ambient state:
//! - `reply` - send any frame back
//! - `receipt` - acknowledge a `receipt` header with a `RECEIPT` frame
//! - `error` - send an `ERROR` frame tied to this frame
//!
//! # Example
//!
//! ```no_run
//! # async fn run(mut transport: stompwire::Transport) -> stompwire::Result<()> {
//! while let Some(ctx) = transport.next_context().await {
//!     if ctx.command() == Some("DISCONNECT") {
//!         ctx.receipt().await?;
//!         break;
//!     }
//!     ctx.reply(ctx.frame().clone()).await?;
//! }
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::{commands, headers, Frame};
use crate::transport::TransportHandle;

/// A received frame plus the transport it came from.
///
/// `FrameContext` is `Clone` and can be moved into spawned tasks.
#[derive(Clone)]
pub struct FrameContext {
    frame: Frame,
    transport: TransportHandle,
}

impl FrameContext {
    pub fn new(frame: Frame, transport: TransportHandle) -> Self {
        Self { frame, transport }
    }

    #[inline]
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }

    #[inline]
    pub fn command(&self) -> Option<&str> {
        self.frame.command()
    }

    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.frame.header(name)
    }

    #[inline]
    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    /// Send a frame back on the originating transport.
    pub async fn reply(&self, frame: Frame) -> Result<()> {
        self.transport.send(frame).await
    }

    /// Answer the frame's `receipt` header, if any.
    ///
    /// Returns whether a `RECEIPT` frame was sent.
    pub async fn receipt(&self) -> Result<bool> {
        let Some(frame) = self.receipt_frame() else {
            return Ok(false);
        };
        self.transport.send(frame).await?;
        Ok(true)
    }

    /// Send an `ERROR` frame describing a problem with this frame.
    pub async fn error(&self, message: &str, details: impl Into<Bytes>) -> Result<()> {
        self.transport.send(self.error_frame(message, details)).await
    }

    fn receipt_frame(&self) -> Option<Frame> {
        let id = self.frame.header(headers::RECEIPT)?;
        Some(Frame::new(commands::RECEIPT).with_header(headers::RECEIPT_ID, id))
    }

    fn error_frame(&self, message: &str, details: impl Into<Bytes>) -> Frame {
        let mut frame = Frame::new(commands::ERROR).with_header(headers::MESSAGE, message);
        if let Some(id) = self.frame.header(headers::RECEIPT) {
            frame.set_header(headers::RECEIPT_ID, id);
        }
        frame.with_body(details)
    }
}
