//! Duplex frame transport over one socket.
//!
//! A [`Transport`] owns one connection at a time and runs two tasks on it:
//!
//! ```text
//!            ┌──────────── read task ─────────────┐
//! socket ──► │ read ─► FrameBuilder::feed ─► take │ ──► TransportEvent channel ──► Transport
//!            └────────────────────────────────────┘
//!
//! TransportHandle::send ─► to_bytes ─► send queue ─► writer task ──► socket
//! ```
//!
//! Every event (frames, connection changes, errors) travels on one channel,
//! so their relative order is preserved. State changes are recorded and
//! emitted under the transport's lock, which makes `ConnectionChanged`
//! fire exactly once per real transition even when the read and write side
//! fail at the same time. Each connection gets a generation number; late
//! completions from a replaced connection are ignored.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::FrameBuilder;
use crate::config::TransportConfig;
use crate::error::{Result, StompError};
use crate::handler::FrameContext;
use crate::protocol::{Frame, FrameBuffer};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterExit, WriterHandle};

/// Notifications delivered by a [`Transport`], in occurrence order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A complete frame was received.
    FrameArrived(Frame),
    /// The socket connected (`true`) or disconnected (`false`).
    ConnectionChanged(bool),
    /// An I/O or protocol error closed the connection.
    Error(Arc<StompError>),
}

/// The live socket of a transport.
struct Link {
    generation: u64,
    writer: WriterHandle,
    cancel: CancellationToken,
    peer_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
}

struct LinkState {
    generation: u64,
    link: Option<Link>,
    shutdown_requested: bool,
    disposed: bool,
    events: Option<mpsc::UnboundedSender<TransportEvent>>,
}

impl LinkState {
    fn emit(&self, event: TransportEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        !self.disposed
            && self
                .link
                .as_ref()
                .is_some_and(|link| link.generation == generation)
    }
}

/// State shared between a transport, its handles and its tasks.
pub(crate) struct Shared {
    state: Mutex<LinkState>,
    prototype: Arc<dyn FrameBuilder>,
    config: TransportConfig,
    /// Client transports survive a disconnect and wait for a reconnect.
    reconnects: bool,
    /// Cancelled when the transport is disposed.
    lifetime: CancellationToken,
}

impl Shared {
    fn new(
        config: TransportConfig,
        prototype: Arc<dyn FrameBuilder>,
        reconnects: bool,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Self {
            state: Mutex::new(LinkState {
                generation: 0,
                link: None,
                shutdown_requested: false,
                disposed: false,
                events: Some(tx),
            }),
            prototype,
            config,
            reconnects,
            lifetime: CancellationToken::new(),
        });
        (shared, rx)
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lifetime(&self) -> CancellationToken {
        self.lifetime.clone()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.lock().link.is_some()
    }

    pub(crate) fn is_shutdown_requested(&self) -> bool {
        let state = self.lock();
        state.shutdown_requested || state.disposed
    }

    /// Attach a connected TCP stream. Returns `false` if the transport no
    /// longer accepts connections.
    pub(crate) fn attach_stream(self: &Arc<Self>, stream: TcpStream) -> bool {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        let peer_addr = stream.peer_addr().ok();
        let local_addr = stream.local_addr().ok();
        let (reader, writer) = stream.into_split();
        self.attach(reader, writer, peer_addr, local_addr)
    }

    /// Start the read and write tasks on a new connection.
    pub(crate) fn attach<R, W>(
        self: &Arc<Self>,
        reader: R,
        writer: W,
        peer_addr: Option<SocketAddr>,
        local_addr: Option<SocketAddr>,
    ) -> bool
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut state = self.lock();
        if state.disposed || state.shutdown_requested {
            return false;
        }

        let was_connected = match state.link.take() {
            Some(old) => {
                old.cancel.cancel();
                true
            }
            None => false,
        };

        state.generation += 1;
        let generation = state.generation;
        let cancel = self.lifetime.child_token();

        let (writer_handle, writer_task) = spawn_writer_task(writer, &self.config, cancel.clone());
        let reader_task = tokio::spawn(read_loop(
            self.clone(),
            generation,
            reader,
            self.prototype.fresh(),
            cancel.clone(),
        ));

        let shared = self.clone();
        tokio::spawn(async move {
            if let Err(e) = reader_task.await {
                error!("Read task failed: {}", e);
                shared.disconnect(generation, Some(StompError::ConnectionClosed));
            }
        });

        let shared = self.clone();
        tokio::spawn(async move {
            match writer_task.await {
                Ok(Ok(WriterExit::HalfClosed)) => {
                    debug!("Write side closed, waiting for peer to close")
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!("Write failed: {}", e);
                    shared.disconnect(generation, Some(e));
                }
                Err(e) => {
                    error!("Writer task failed: {}", e);
                    shared.disconnect(generation, Some(StompError::ConnectionClosed));
                }
            }
        });

        state.link = Some(Link {
            generation,
            writer: writer_handle,
            cancel,
            peer_addr,
            local_addr,
        });
        if !was_connected {
            state.emit(TransportEvent::ConnectionChanged(true));
        }
        true
    }

    fn deliver(&self, generation: u64, frames: Vec<Frame>) {
        let state = self.lock();
        if !state.is_current(generation) {
            return;
        }
        for frame in frames {
            state.emit(TransportEvent::FrameArrived(frame));
        }
    }

    /// Tear down the connection of `generation`, if it is still current.
    fn disconnect(&self, generation: u64, error: Option<StompError>) {
        let mut state = self.lock();
        if !state.is_current(generation) {
            return;
        }
        if let Some(link) = state.link.take() {
            link.cancel.cancel();
            info!(peer = ?link.peer_addr, "Disconnected");
        }

        state.emit(TransportEvent::ConnectionChanged(false));
        if let Some(error) = error {
            state.emit(TransportEvent::Error(Arc::new(error)));
        }

        if state.shutdown_requested || !self.reconnects {
            self.dispose_locked(&mut state);
        }
    }

    /// Surface an error that did not change the connection state.
    pub(crate) fn report_error(&self, error: StompError) {
        self.lock().emit(TransportEvent::Error(Arc::new(error)));
    }

    fn writer_for_send(&self) -> Result<WriterHandle> {
        let state = self.lock();
        if state.shutdown_requested {
            return Err(StompError::ShutdownRequested);
        }
        state
            .link
            .as_ref()
            .map(|link| link.writer.clone())
            .ok_or(StompError::NotConnected)
    }

    async fn shutdown(&self) {
        let writer = {
            let mut state = self.lock();
            if state.disposed || state.shutdown_requested {
                return;
            }
            state.shutdown_requested = true;
            match state.link.as_ref().map(|link| link.writer.clone()) {
                Some(writer) => writer,
                None => {
                    self.dispose_locked(&mut state);
                    return;
                }
            }
        };

        debug!("Shutdown requested, draining send queue");
        if writer.close().await.is_err() {
            self.dispose();
        }
    }

    fn dispose(&self) {
        let mut state = self.lock();
        self.dispose_locked(&mut state);
    }

    fn dispose_locked(&self, state: &mut LinkState) {
        if state.disposed {
            return;
        }
        state.disposed = true;
        if let Some(link) = state.link.take() {
            link.cancel.cancel();
            state.emit(TransportEvent::ConnectionChanged(false));
        }
        state.events = None;
        self.lifetime.cancel();
    }
}

/// Read loop - feeds socket bytes to the codec and delivers frames.
async fn read_loop<R>(
    shared: Arc<Shared>,
    generation: u64,
    mut reader: R,
    mut codec: Box<dyn FrameBuilder>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; shared.config.read_buffer_size.max(1)];

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            read = reader.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => {
                debug!("Peer closed connection");
                shared.disconnect(generation, None);
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!("Read failed: {}", e);
                shared.disconnect(generation, Some(StompError::Io(e)));
                return;
            }
        };

        let fed = codec.feed(&buf[..n]);

        let mut frames = Vec::new();
        while let Some(frame) = codec.take_frame() {
            frames.push(frame);
        }
        if !frames.is_empty() {
            shared.deliver(generation, frames);
        }

        if let Err(e) = fed {
            warn!("Protocol violation, closing connection: {}", e);
            shared.disconnect(generation, Some(StompError::Parse(e)));
            return;
        }
    }
}

/// Cloneable sending side of a [`Transport`].
#[derive(Clone)]
pub struct TransportHandle {
    shared: Arc<Shared>,
}

impl TransportHandle {
    /// Serialize and queue a frame, waiting while backpressure is active.
    ///
    /// Fails with `MissingCommand`, `NotConnected` or `ShutdownRequested`
    /// without queueing anything.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        let bytes = self.shared.prototype.to_bytes(&frame)?;
        let writer = self.shared.writer_for_send()?;
        writer.send(OutboundFrame::new(bytes)).await
    }

    /// Serialize and queue a frame without waiting.
    pub fn try_send(&self, frame: Frame) -> Result<()> {
        let bytes = self.shared.prototype.to_bytes(&frame)?;
        let writer = self.shared.writer_for_send()?;
        writer.try_send(OutboundFrame::new(bytes))
    }

    /// Send a frame and wait until all of its bytes are written.
    ///
    /// Fails with `ConnectionClosed` if the connection drops first.
    pub async fn send_confirmed(&self, frame: Frame) -> Result<()> {
        let bytes = self.shared.prototype.to_bytes(&frame)?;
        let writer = self.shared.writer_for_send()?;
        let (outbound, receipt) = OutboundFrame::with_receipt(bytes);
        writer.send(outbound).await?;
        receipt.await.map_err(|_| StompError::ConnectionClosed)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Frames queued but not yet fully written.
    pub fn pending_frames(&self) -> usize {
        self.shared
            .lock()
            .link
            .as_ref()
            .map_or(0, |link| link.writer.pending_count())
    }
}

/// A duplex stream of frames over one socket.
///
/// Dropping the transport closes its socket. Must be created inside a
/// tokio runtime.
pub struct Transport {
    handle: TransportHandle,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    /// Events received but passed over by `get_next_frame`.
    backlog: VecDeque<TransportEvent>,
}

impl Transport {
    /// Wrap an accepted TCP connection.
    pub fn from_stream(stream: TcpStream, config: TransportConfig) -> Self {
        let codec = Arc::new(FrameBuffer::with_max_frame_size(config.max_frame_size));
        Self::from_stream_with_codec(stream, config, codec)
    }

    /// Wrap an accepted TCP connection using a custom wire codec.
    pub fn from_stream_with_codec(
        stream: TcpStream,
        config: TransportConfig,
        codec: Arc<dyn FrameBuilder>,
    ) -> Self {
        let transport = Self::detached(config, codec, false);
        transport.handle.shared.attach_stream(stream);
        transport
    }

    /// Wrap any connected read/write pair, such as `tokio::io::duplex`.
    pub fn from_io<R, W>(reader: R, writer: W, config: TransportConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let codec = Arc::new(FrameBuffer::with_max_frame_size(config.max_frame_size));
        let transport = Self::detached(config, codec, false);
        transport.handle.shared.attach(reader, writer, None, None);
        transport
    }

    /// A transport with no connection yet.
    pub(crate) fn detached(
        config: TransportConfig,
        codec: Arc<dyn FrameBuilder>,
        reconnects: bool,
    ) -> Self {
        let (shared, events) = Shared::new(config, codec, reconnects);
        Self {
            handle: TransportHandle { shared },
            events,
            backlog: VecDeque::new(),
        }
    }

    pub(crate) fn shared(&self) -> Arc<Shared> {
        self.handle.shared.clone()
    }

    /// A cloneable handle for sending from other tasks.
    pub fn handle(&self) -> TransportHandle {
        self.handle.clone()
    }

    /// See [`TransportHandle::send`].
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.handle.send(frame).await
    }

    /// See [`TransportHandle::try_send`].
    pub fn try_send(&self, frame: Frame) -> Result<()> {
        self.handle.try_send(frame)
    }

    /// See [`TransportHandle::send_confirmed`].
    pub async fn send_confirmed(&self, frame: Frame) -> Result<()> {
        self.handle.send_confirmed(frame).await
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the transport is disposed and every event
    /// before that has been consumed.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        match self.backlog.pop_front() {
            Some(event) => Some(event),
            None => self.events.recv().await,
        }
    }

    /// Take the next event if one is already waiting.
    pub fn try_next_event(&mut self) -> Option<TransportEvent> {
        self.backlog
            .pop_front()
            .or_else(|| self.events.try_recv().ok())
    }

    /// Take the oldest received frame without waiting.
    ///
    /// Other events stay queued, in order, for [`next_event`](Self::next_event).
    pub fn get_next_frame(&mut self) -> Option<Frame> {
        while let Ok(event) = self.events.try_recv() {
            self.backlog.push_back(event);
        }
        let pos = self
            .backlog
            .iter()
            .position(|event| matches!(event, TransportEvent::FrameArrived(_)))?;
        match self.backlog.remove(pos) {
            Some(TransportEvent::FrameArrived(frame)) => Some(frame),
            _ => None,
        }
    }

    /// Wait for the next received frame, keeping other events queued.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            if let Some(frame) = self.get_next_frame() {
                return Some(frame);
            }
            let event = self.events.recv().await?;
            self.backlog.push_back(event);
        }
    }

    /// Wait for the next frame and wrap it with a reply handle.
    pub async fn next_context(&mut self) -> Option<FrameContext> {
        let frame = self.next_frame().await?;
        Some(FrameContext::new(frame, self.handle()))
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.handle
            .shared
            .lock()
            .link
            .as_ref()
            .and_then(|link| link.peer_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.handle
            .shared
            .lock()
            .link
            .as_ref()
            .and_then(|link| link.local_addr)
    }

    /// Close gracefully.
    ///
    /// Without a connection this closes immediately. Otherwise further
    /// sends are refused, queued frames are written, the write side is
    /// half-closed and the socket closes once the peer closes its side.
    pub async fn shutdown(&self) {
        self.handle.shared.shutdown().await;
    }

    /// Send a heartbeat every `interval` while connected.
    ///
    /// A zero interval does nothing. The pump stops with the transport.
    pub fn start_heartbeat(&self, interval: Duration) {
        if interval.is_zero() {
            return;
        }
        let handle = self.handle();
        let lifetime = self.handle.shared.lifetime();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = lifetime.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if !handle.is_connected() {
                    continue;
                }
                if let Err(e) = handle.try_send(Frame::heartbeat()) {
                    debug!("Heartbeat not sent: {}", e);
                }
            }
        });
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.handle.shared.dispose();
    }
}
