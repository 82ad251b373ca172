//! Dedicated writer task for sending serialized frames.
//!
//! Each connection has one writer task that receives frames via a bounded
//! mpsc channel (the send queue) and owns the socket's write half. Only one
//! write is ever in flight, so frames go out in exactly the order they were
//! queued.
//!
//! # Architecture
//!
//! ```text
//! Sender 1 ─┐
//! Sender 2 ─┼─► mpsc::Sender<WriterCommand> ─► Writer Task ─► Socket
//! Sender N ─┘
//! ```
//!
//! A frame counts as delivered only after all of its bytes are written;
//! partial writes are resumed from the first unwritten byte. A `Close`
//! command queued behind frames half-closes the socket once they are out.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backpressure::BackpressureController;
use crate::config::TransportConfig;
use crate::error::{Result, StompError};

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A serialized frame ready to be written.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Wire bytes of the whole frame.
    pub bytes: Bytes,
    /// Signalled once every byte has been written.
    receipt: Option<oneshot::Sender<()>>,
}

impl OutboundFrame {
    /// Create a new outbound frame.
    #[inline]
    pub fn new(bytes: Bytes) -> Self {
        Self {
            bytes,
            receipt: None,
        }
    }

    /// Create a frame whose full write is reported on the returned receiver.
    ///
    /// The receiver errors if the frame is dropped unwritten.
    pub fn with_receipt(bytes: Bytes) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                bytes,
                receipt: Some(tx),
            },
            rx,
        )
    }

    /// Size of this frame on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    fn complete(self) {
        if let Some(receipt) = self.receipt {
            let _ = receipt.send(());
        }
    }
}

/// Commands accepted by the writer task.
#[derive(Debug)]
pub(crate) enum WriterCommand {
    Frame(OutboundFrame),
    /// Half-close after everything queued before it.
    Close,
}

/// Why the writer task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterExit {
    /// A `Close` command was processed and the write side shut down.
    HalfClosed,
    /// Every handle was dropped.
    Drained,
    /// The connection was cancelled.
    Cancelled,
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and can be shared across tasks.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriterCommand>,
    backpressure: BackpressureController,
}

impl WriterHandle {
    /// Queue a frame, waiting while backpressure is active.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.backpressure.reserve().await?;

        self.tx
            .send(WriterCommand::Frame(frame))
            .await
            .map_err(|_| {
                self.backpressure.release();
                StompError::ConnectionClosed
            })
    }

    /// Try to queue a frame without waiting for backpressure.
    ///
    /// Returns `Err(BackpressureTimeout)` immediately if at capacity.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<()> {
        self.backpressure.try_reserve()?;

        self.tx
            .try_send(WriterCommand::Frame(frame))
            .map_err(|e| {
                self.backpressure.release();
                match e {
                    mpsc::error::TrySendError::Full(_) => StompError::BackpressureTimeout,
                    mpsc::error::TrySendError::Closed(_) => StompError::ConnectionClosed,
                }
            })
    }

    /// Queue a half-close behind every frame already queued.
    pub(crate) async fn close(&self) -> Result<()> {
        self.tx
            .send(WriterCommand::Close)
            .await
            .map_err(|_| StompError::ConnectionClosed)
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.backpressure.is_active()
    }

    /// Get current pending frame count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.backpressure.pending_count()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task stops when `cancel` fires, after a `Close` command, when every
/// handle is dropped, or on the first write error.
pub fn spawn_writer_task<W>(
    writer: W,
    config: &TransportConfig,
    cancel: CancellationToken,
) -> (WriterHandle, JoinHandle<Result<WriterExit>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let backpressure = BackpressureController::with_timeout(
        config.max_pending_frames,
        config.backpressure_timeout(),
    );

    let handle = WriterHandle {
        tx,
        backpressure: backpressure.clone(),
    };
    let task = tokio::spawn(writer_loop(rx, writer, backpressure, cancel));

    (handle, task)
}

/// Main writer loop - receives frames and writes them to the socket.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<WriterCommand>,
    mut writer: W,
    backpressure: BackpressureController,
    cancel: CancellationToken,
) -> Result<WriterExit>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let command = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(WriterExit::Cancelled),
            command = rx.recv() => command,
        };

        let first = match command {
            Some(WriterCommand::Frame(frame)) => frame,
            Some(WriterCommand::Close) => {
                writer.shutdown().await?;
                return Ok(WriterExit::HalfClosed);
            }
            None => return Ok(WriterExit::Drained),
        };

        // Collect additional ready frames (non-blocking)
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        let mut close_after = false;

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(WriterCommand::Frame(frame)) => batch.push(frame),
                Ok(WriterCommand::Close) => {
                    close_after = true;
                    break;
                }
                Err(_) => break,
            }
        }

        let mut written = 0;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(WriterExit::Cancelled),
            result = write_batch(&mut writer, &batch, &mut written) => result,
        };
        if let Err(e) = result {
            complete_written(batch, written);
            return Err(e);
        }

        backpressure.release_many(batch.len());
        for frame in batch {
            frame.complete();
        }

        if close_after {
            writer.shutdown().await?;
            return Ok(WriterExit::HalfClosed);
        }
    }
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
///
/// Partial writes resume from the first unwritten byte. `total_written`
/// tracks progress so a failed batch can tell which frames went out whole.
async fn write_batch<W>(
    writer: &mut W,
    batch: &[OutboundFrame],
    total_written: &mut usize,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();

    while *total_written < total_size {
        let slices = build_remaining_slices(batch, *total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(StompError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        *total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Confirm the leading frames of a failed batch whose bytes were all
/// written. The rest are dropped, failing their receipts.
fn complete_written(batch: Vec<OutboundFrame>, written: usize) {
    let mut end = 0;
    for frame in batch {
        end += frame.size();
        if end > written {
            break;
        }
        frame.complete();
    }
}

/// Build IoSlice array for remaining data after partial write.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for frame in batch {
        let end = offset + frame.size();
        if skip_bytes < end && !frame.bytes.is_empty() {
            let start_in_frame = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame.bytes[start_in_frame..]));
        }
        offset = end;
    }

    slices
}
