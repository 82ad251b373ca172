//! Test doubles shared by unit tests.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

/// Writer that accepts at most `chunk` bytes per call and records them.
///
/// Optionally fails every write once `fail_after` bytes were accepted.
pub(crate) struct ThrottledWriter {
    written: Arc<Mutex<Vec<u8>>>,
    shut_down: Arc<AtomicBool>,
    chunk: usize,
    fail_after: Option<usize>,
}

impl ThrottledWriter {
    pub(crate) fn new(chunk: usize) -> Self {
        Self {
            written: Arc::new(Mutex::new(Vec::new())),
            shut_down: Arc::new(AtomicBool::new(false)),
            chunk: chunk.max(1),
            fail_after: None,
        }
    }

    pub(crate) fn fail_after(mut self, bytes: usize) -> Self {
        self.fail_after = Some(bytes);
        self
    }

    pub(crate) fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        self.written.clone()
    }

    pub(crate) fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shut_down.clone()
    }
}

impl AsyncWrite for ThrottledWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut written = self.written.lock().unwrap();
        if matches!(self.fail_after, Some(limit) if written.len() >= limit) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated socket failure",
            )));
        }
        let n = buf.len().min(self.chunk);
        written.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shut_down.store(true, Ordering::Release);
        Poll::Ready(Ok(()))
    }
}
