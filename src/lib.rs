//! # stompwire
//!
//! Transport core for a STOMP-style messaging protocol over TCP.
//!
//! Frames are text-headed, length-or-NUL-delimited messages. This crate
//! turns sockets into duplex streams of such frames and leaves sessions,
//! subscriptions and routing to the layer above.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): `Frame`, the incremental `FrameBuffer`
//!   parser/serializer and heartbeat negotiation
//! - **Transport** ([`transport`]): one read task and one writer task per
//!   socket, a `Listener` for servers and a reconnecting `ClientConnector`
//!
//! ## Example
//!
//! ```no_run
//! use stompwire::{Frame, Listener, TransportEvent};
//!
//! #[tokio::main]
//! async fn main() -> stompwire::Result<()> {
//!     let mut listener = Listener::new();
//!     let bound = listener.bind("127.0.0.1:0").await?;
//!     println!("listening on {}", bound);
//!
//!     while let Some(mut transport) = listener.accept().await {
//!         tokio::spawn(async move {
//!             while let Some(event) = transport.next_event().await {
//!                 if let TransportEvent::FrameArrived(frame) = event {
//!                     let reply = Frame::new("MESSAGE").with_body(frame.body_bytes());
//!                     let _ = transport.send(reply).await;
//!                 }
//!             }
//!         });
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;
pub mod writer;

mod backpressure;

#[cfg(test)]
mod test_support;

pub use codec::FrameBuilder;
pub use config::{ConnectorConfig, ListenerConfig, TransportConfig};
pub use error::{ParseError, Result, StompError};
pub use handler::FrameContext;
pub use protocol::{Frame, FrameBuffer, Headers, HeartbeatValues};
pub use transport::{
    ClientConnector, Listener, ListenerEvent, Transport, TransportEvent, TransportHandle,
};
