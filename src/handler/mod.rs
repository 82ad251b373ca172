//! Handler module - explicit context for processing received frames.
//!
//! Provides:
//! - [`FrameContext`] - the received frame plus a handle to reply on

mod context;

pub use context::FrameContext;
