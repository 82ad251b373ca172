//! Client side: a [`Transport`] that connects, and reconnects, to one address.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::codec::FrameBuilder;
use crate::config::{ConnectorConfig, TransportConfig};
use crate::protocol::FrameBuffer;
use crate::transport::connection::Shared;
use crate::transport::Transport;

/// Builder for a reconnecting client [`Transport`].
///
/// ```no_run
/// # async fn run() {
/// use std::time::Duration;
/// use stompwire::transport::ClientConnector;
///
/// let mut transport = ClientConnector::new("127.0.0.1:61613")
///     .retry_interval(Duration::from_millis(500))
///     .connect();
/// while let Some(event) = transport.next_event().await {
///     println!("{:?}", event);
/// }
/// # }
/// ```
pub struct ClientConnector {
    addr: String,
    config: ConnectorConfig,
    codec: Option<Arc<dyn FrameBuilder>>,
}

impl ClientConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_config(addr, ConnectorConfig::default())
    }

    pub fn with_config(addr: impl Into<String>, config: ConnectorConfig) -> Self {
        Self {
            addr: addr.into(),
            config,
            codec: None,
        }
    }

    /// Delay between connect attempts while disconnected.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Surface failed connect attempts as `TransportEvent::Error`.
    pub fn report_connect_errors(mut self, report: bool) -> Self {
        self.config.report_connect_errors = report;
        self
    }

    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.config.transport = config;
        self
    }

    /// Use a custom wire codec instead of [`FrameBuffer`].
    pub fn codec(mut self, codec: Arc<dyn FrameBuilder>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Start connecting and return the transport immediately.
    ///
    /// The first attempt is made right away, then one per retry interval
    /// whenever the transport is disconnected. Frames queued before a
    /// disconnect are not replayed on the next connection. Must be called
    /// inside a tokio runtime.
    pub fn connect(self) -> Transport {
        let codec = self.codec.unwrap_or_else(|| {
            Arc::new(FrameBuffer::with_max_frame_size(
                self.config.transport.max_frame_size,
            ))
        });
        let transport = Transport::detached(self.config.transport.clone(), codec, true);

        tokio::spawn(connect_loop(
            transport.shared(),
            self.addr,
            self.config.retry_interval(),
            self.config.report_connect_errors,
        ));
        transport
    }
}

/// Connect loop - at most one attempt in flight, one tick per retry interval.
async fn connect_loop(shared: Arc<Shared>, addr: String, retry: Duration, report_errors: bool) {
    let lifetime = shared.lifetime();
    let mut ticker = tokio::time::interval(retry.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = lifetime.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if shared.is_connected() || shared.is_shutdown_requested() {
            continue;
        }

        debug!(%addr, "Connecting");
        let attempt = tokio::select! {
            biased;
            _ = lifetime.cancelled() => break,
            attempt = TcpStream::connect(addr.as_str()) => attempt,
        };

        match attempt {
            Ok(stream) => {
                info!(%addr, "Connected");
                if !shared.attach_stream(stream) {
                    break;
                }
            }
            Err(e) => {
                debug!(%addr, "Connect failed: {}", e);
                if report_errors {
                    shared.report_error(e.into());
                }
            }
        }
    }

    debug!(%addr, "Connect loop stopped");
}
