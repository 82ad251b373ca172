//! Transport module - TCP connections carrying frames.
//!
//! Provides:
//! - [`Transport`] - one socket as a duplex stream of frames
//! - [`TransportHandle`] - cloneable sending side of a transport
//! - [`Listener`] - accepts server-side transports
//! - [`ClientConnector`] - connects and reconnects a client-side transport

mod connection;
mod connector;
mod listener;

pub use connection::{Transport, TransportEvent, TransportHandle};
pub use connector::ClientConnector;
pub use listener::{Listener, ListenerEvent};
