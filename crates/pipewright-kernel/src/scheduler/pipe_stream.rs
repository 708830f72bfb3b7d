//! Bounded in-process byte pipe connecting a filter to its downstream stage.
//!
//! ```text
//!   filter worker ──▶ PipeWriter ──▶ [ring buffer, capacity N] ──▶ PipeReader ──▶ next stage
//!                     ├── write parks when the buffer is full
//!                     ├── read parks when the buffer is empty
//!                     ├── writer dropped or shut down → reader sees EOF
//!                     └── reader dropped → writer gets BrokenPipe
//! ```
//!
//! The buffer sits behind a `std::sync::Mutex`: critical sections are a few
//! `VecDeque` operations, never an await. Close flags are atomics so both
//! `Drop` impls stay synchronous. Wakers are registered under the lock, which
//! rules out lost wakeups between the check and the park.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Default pipe capacity, the Linux kernel's default pipe size.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

struct Ring {
    bytes: VecDeque<u8>,
    capacity: usize,
    /// Reader parked on an empty buffer.
    reader_waker: Option<Waker>,
    /// Writer parked on a full buffer.
    writer_waker: Option<Waker>,
}

struct Shared {
    ring: Mutex<Ring>,
    writer_closed: AtomicBool,
    reader_closed: AtomicBool,
    /// Total bytes accepted from the writer.
    transferred: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Writing half of a pipe.
pub struct PipeWriter {
    shared: Arc<Shared>,
}

/// Reading half of a pipe.
pub struct PipeReader {
    shared: Arc<Shared>,
}

/// Create a connected pipe with room for `capacity` unread bytes.
///
/// A capacity of zero is bumped to one so the writer can always make
/// progress once the reader drains.
pub fn pipe_stream(capacity: usize) -> (PipeWriter, PipeReader) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        ring: Mutex::new(Ring {
            bytes: VecDeque::with_capacity(capacity.min(8192)),
            capacity,
            reader_waker: None,
            writer_waker: None,
        }),
        writer_closed: AtomicBool::new(false),
        reader_closed: AtomicBool::new(false),
        transferred: AtomicU64::new(0),
    });

    (
        PipeWriter { shared: shared.clone() },
        PipeReader { shared },
    )
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed")
}

/// Read-only view of a pipe's traffic that outlives both halves.
///
/// The engine hands the writer to a filter worker and the reader to the next
/// stage; a meter taken beforehand still reports how much crossed the pipe.
#[derive(Clone)]
pub struct PipeMeter {
    shared: Arc<Shared>,
}

impl PipeMeter {
    /// Bytes accepted from the writer so far.
    pub fn bytes_written(&self) -> u64 {
        self.shared.transferred.load(Ordering::Relaxed)
    }

    /// Bytes still buffered, written but not yet read.
    pub fn pending(&self) -> usize {
        self.shared.lock().bytes.len()
    }

    /// Whether the reading half has gone away.
    pub fn is_reader_closed(&self) -> bool {
        self.shared.reader_closed.load(Ordering::Acquire)
    }

    /// Whether the writer has shut down or been dropped.
    pub fn is_writer_closed(&self) -> bool {
        self.shared.writer_closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for PipeMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeMeter")
            .field("bytes_written", &self.bytes_written())
            .field("reader_closed", &self.is_reader_closed())
            .field("writer_closed", &self.is_writer_closed())
            .finish()
    }
}

impl PipeWriter {
    /// A meter on this pipe.
    pub fn meter(&self) -> PipeMeter {
        PipeMeter {
            shared: self.shared.clone(),
        }
    }

    /// Bytes accepted into the pipe so far.
    pub fn bytes_written(&self) -> u64 {
        self.shared.transferred.load(Ordering::Relaxed)
    }

    /// Whether the reading half has gone away.
    pub fn is_reader_closed(&self) -> bool {
        self.shared.reader_closed.load(Ordering::Acquire)
    }

    fn poll_push(&self, cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if self.is_reader_closed() {
            return Poll::Ready(Err(broken_pipe()));
        }

        let mut ring = self.shared.lock();
        // The reader may have dropped between the check above and the lock.
        if self.is_reader_closed() {
            return Poll::Ready(Err(broken_pipe()));
        }

        let room = ring.capacity.saturating_sub(ring.bytes.len());
        if room == 0 {
            ring.writer_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let n = data.len().min(room);
        ring.bytes.extend(&data[..n]);
        self.shared.transferred.fetch_add(n as u64, Ordering::Relaxed);
        if let Some(waker) = ring.reader_waker.take() {
            waker.wake();
        }
        Poll::Ready(Ok(n))
    }

    fn mark_closed(&self) {
        self.shared.writer_closed.store(true, Ordering::Release);
        if let Ok(mut ring) = self.shared.ring.lock()
            && let Some(waker) = ring.reader_waker.take()
        {
            waker.wake();
        }
        // A poisoned lock is fine: the reader re-checks writer_closed on its next poll.
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.poll_push(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.mark_closed();
        Poll::Ready(Ok(()))
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.mark_closed();
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut ring = self.shared.lock();

        if ring.bytes.is_empty() {
            if self.shared.writer_closed.load(Ordering::Acquire) {
                // EOF: nothing buffered and nobody left to write.
                return Poll::Ready(Ok(()));
            }
            ring.reader_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let n = buf.remaining().min(ring.bytes.len());
        let (front, back) = ring.bytes.as_slices();
        if n <= front.len() {
            buf.put_slice(&front[..n]);
        } else {
            buf.put_slice(front);
            buf.put_slice(&back[..n - front.len()]);
        }
        ring.bytes.drain(..n);

        if let Some(waker) = ring.writer_waker.take() {
            waker.wake();
        }
        Poll::Ready(Ok(()))
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.shared.reader_closed.store(true, Ordering::Release);
        if let Ok(mut ring) = self.shared.ring.lock()
            && let Some(waker) = ring.writer_waker.take()
        {
            waker.wake();
        }
    }
}

impl std::fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeWriter")
            .field("bytes_written", &self.bytes_written())
            .finish()
    }
}

impl std::fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeReader").finish()
    }
}
