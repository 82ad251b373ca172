//! Accepts inbound connections and wraps each in a server-side [`Transport`].

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::FrameBuilder;
use crate::config::ListenerConfig;
use crate::error::{Result, StompError};
use crate::protocol::FrameBuffer;
use crate::transport::Transport;

/// Notifications delivered by a [`Listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerEvent {
    /// A connection was accepted and queued for [`Listener::get_next_transport`].
    ClientConnected { peer: SocketAddr },
}

/// One bound address and its accept loop.
struct Binding {
    bound: SocketAddr,
    /// Bumped on every rebind.
    generation: u64,
    cancel: CancellationToken,
}

struct ListenerState {
    pending: VecDeque<Transport>,
    bindings: HashMap<u64, Binding>,
    next_id: u64,
    events: Option<mpsc::UnboundedSender<ListenerEvent>>,
    closed: bool,
}

struct ListenerShared {
    state: Mutex<ListenerState>,
    config: ListenerConfig,
    codec: Arc<dyn FrameBuilder>,
    lifetime: CancellationToken,
}

impl ListenerShared {
    fn lock(&self) -> MutexGuard<'_, ListenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(self: &Arc<Self>, listener: TcpListener, bound: SocketAddr) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(StompError::ShutdownRequested);
        }
        let id = state.next_id;
        state.next_id += 1;

        let cancel = self.lifetime.child_token();
        state.bindings.insert(
            id,
            Binding {
                bound,
                generation: 0,
                cancel: cancel.clone(),
            },
        );
        tokio::spawn(accept_loop(self.clone(), id, listener, bound, cancel));
        Ok(())
    }

    /// Queue an accepted connection unless its listening socket was replaced.
    fn admit(&self, id: u64, generation: u64, stream: TcpStream, peer: SocketAddr) {
        let mut state = self.lock();
        let current = !state.closed
            && state
                .bindings
                .get(&id)
                .is_some_and(|binding| binding.generation == generation);
        if !current {
            debug!(%peer, "Discarding connection from stale listener");
            return;
        }

        let transport = Transport::from_stream_with_codec(
            stream,
            self.config.transport.clone(),
            self.codec.clone(),
        );
        state.pending.push_back(transport);
        if let Some(events) = &state.events {
            let _ = events.send(ListenerEvent::ClientConnected { peer });
        }
    }

    /// Retry binding `bound` until it succeeds or the binding is cancelled.
    async fn rebind(
        &self,
        id: u64,
        bound: SocketAddr,
        cancel: &CancellationToken,
    ) -> Option<(TcpListener, u64)> {
        let interval = self.config.rebind_interval();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(interval) => {}
            }

            match TcpListener::bind(bound).await {
                Ok(listener) => {
                    let mut state = self.lock();
                    let binding = state.bindings.get_mut(&id)?;
                    binding.generation += 1;
                    info!(%bound, "Rebound listener");
                    return Some((listener, binding.generation));
                }
                Err(e) => warn!(%bound, "Rebind failed: {}", e),
            }
        }
    }

    fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        for (_, binding) in state.bindings.drain() {
            binding.cancel.cancel();
        }
        state.pending.clear();
        state.events = None;
        self.lifetime.cancel();
    }
}

/// Accept loop - one outstanding accept per bound socket.
async fn accept_loop(
    shared: Arc<ListenerShared>,
    id: u64,
    mut listener: TcpListener,
    bound: SocketAddr,
    cancel: CancellationToken,
) {
    let mut generation = 0;

    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                debug!(%bound, %peer, "Accepted connection");
                shared.admit(id, generation, stream, peer);
            }
            Err(e) => {
                warn!(%bound, "Accept failed, rebinding: {}", e);
                drop(listener);
                match shared.rebind(id, bound, &cancel).await {
                    Some((rebound, next)) => {
                        listener = rebound;
                        generation = next;
                    }
                    None => break,
                }
            }
        }
    }

    debug!(%bound, "Accept loop stopped");
}

/// Accepts connections on one or more bound addresses.
///
/// Accepted transports are live as soon as they are queued; frames they
/// receive wait in their own event queue until the transport is claimed.
/// Dropping the listener closes every bound socket and every unclaimed
/// transport.
pub struct Listener {
    shared: Arc<ListenerShared>,
    events: mpsc::UnboundedReceiver<ListenerEvent>,
}

impl Listener {
    pub fn new() -> Self {
        Self::with_config(ListenerConfig::default())
    }

    pub fn with_config(config: ListenerConfig) -> Self {
        let codec = Arc::new(FrameBuffer::with_max_frame_size(
            config.transport.max_frame_size,
        ));
        Self::with_codec(config, codec)
    }

    /// Use a custom wire codec for every accepted transport.
    pub fn with_codec(config: ListenerConfig, codec: Arc<dyn FrameBuilder>) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(ListenerShared {
                state: Mutex::new(ListenerState {
                    pending: VecDeque::new(),
                    bindings: HashMap::new(),
                    next_id: 0,
                    events: Some(tx),
                    closed: false,
                }),
                config,
                codec,
                lifetime: CancellationToken::new(),
            }),
            events,
        }
    }

    /// Bind and start accepting.
    ///
    /// Returns the address actually bound, so binding port 0 reports the
    /// port the OS picked.
    pub async fn bind<A: ToSocketAddrs>(&self, addr: A) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let bound = listener.local_addr()?;
        self.shared.start(listener, bound)?;
        info!(%bound, "Listening");
        Ok(bound)
    }

    /// Bind, retrying every rebind interval while the address is unavailable.
    ///
    /// Fails only if the listener is closed while waiting.
    pub async fn bind_with_retry(&self, addr: SocketAddr) -> Result<SocketAddr> {
        let lifetime = self.shared.lifetime.clone();
        loop {
            match self.bind(addr).await {
                Ok(bound) => return Ok(bound),
                Err(StompError::Io(e)) => {
                    warn!(%addr, "Bind failed, retrying: {}", e);
                }
                Err(e) => return Err(e),
            }
            tokio::select! {
                biased;
                _ = lifetime.cancelled() => return Err(StompError::ShutdownRequested),
                _ = tokio::time::sleep(self.shared.config.rebind_interval()) => {}
            }
        }
    }

    /// Addresses currently bound, in bind order.
    pub fn bound_addrs(&self) -> Vec<SocketAddr> {
        let state = self.shared.lock();
        let mut bindings: Vec<_> = state.bindings.iter().collect();
        bindings.sort_by_key(|(id, _)| **id);
        bindings.into_iter().map(|(_, binding)| binding.bound).collect()
    }

    /// Stop accepting on one bound address. Returns `false` if it was not bound.
    pub fn unbind(&self, addr: SocketAddr) -> bool {
        let mut state = self.shared.lock();
        let id = state
            .bindings
            .iter()
            .find(|(_, binding)| binding.bound == addr)
            .map(|(id, _)| *id);
        match id.and_then(|id| state.bindings.remove(&id)) {
            Some(binding) => {
                binding.cancel.cancel();
                info!(%addr, "Unbound");
                true
            }
            None => false,
        }
    }

    /// Take the oldest accepted transport without waiting.
    pub fn get_next_transport(&self) -> Option<Transport> {
        self.shared.lock().pending.pop_front()
    }

    /// Accepted transports not yet claimed.
    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Wait for the next event. Returns `None` once the listener is closed.
    pub async fn next_event(&mut self) -> Option<ListenerEvent> {
        self.events.recv().await
    }

    /// Wait for the next accepted transport.
    pub async fn accept(&mut self) -> Option<Transport> {
        loop {
            if let Some(transport) = self.get_next_transport() {
                return Some(transport);
            }
            self.events.recv().await?;
        }
    }

    /// Stop every accept loop and retry timer and drop unclaimed transports.
    pub fn close(&self) {
        self.shared.close();
        info!("Listener closed");
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shared.close();
    }
}
