//! Bounded in-memory byte pipe connecting pipeline stages.
//!
//! A producer stage writes into the [`PipeWriter`] on a worker thread
//! while the consumer reads the [`PipeReader`]; the bounded ring gives
//! natural back-pressure. Dropping the reader makes the next write fail
//! with `BrokenPipe`, which is the downstream-cancellation signal;
//! dropping the writer lets the reader drain the ring and then observe
//! end-of-stream.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex};

/// Default ring capacity for pipeline stages.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

struct Ring {
    buf: VecDeque<u8>,
    capacity: usize,
    writer_closed: bool,
    reader_closed: bool,
}

struct Shared {
    ring: Mutex<Ring>,
    /// Signalled when space becomes available or the reader goes away.
    space: Condvar,
    /// Signalled when data becomes available or the writer goes away.
    data: Condvar,
}

/// Create a connected pipe with the given ring capacity in bytes.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared {
        ring: Mutex::new(Ring {
            buf: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            writer_closed: false,
            reader_closed: false,
        }),
        space: Condvar::new(),
        data: Condvar::new(),
    });
    (
        PipeWriter {
            shared: Arc::clone(&shared),
        },
        PipeReader { shared },
    )
}

/// Write half of the pipe, held by the producing stage.
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut ring = lock(&self.shared.ring)?;
        loop {
            if ring.reader_closed {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "pipe reader was dropped",
                ));
            }
            let space = ring.capacity - ring.buf.len();
            if space > 0 {
                let n = space.min(data.len());
                ring.buf.extend(&data[..n]);
                self.shared.data.notify_one();
                return Ok(n);
            }
            ring = wait(&self.shared.space, ring)?;
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        if let Ok(mut ring) = self.shared.ring.lock() {
            ring.writer_closed = true;
        }
        self.shared.data.notify_all();
    }
}

/// Read half of the pipe, returned to the caller.
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let mut ring = lock(&self.shared.ring)?;
        loop {
            if !ring.buf.is_empty() {
                let n = out.len().min(ring.buf.len());
                for slot in out[..n].iter_mut() {
                    // Invariant: n <= buf.len(), pop cannot fail.
                    if let Some(byte) = ring.buf.pop_front() {
                        *slot = byte;
                    }
                }
                self.shared.space.notify_one();
                return Ok(n);
            }
            if ring.writer_closed {
                return Ok(0);
            }
            ring = wait(&self.shared.data, ring)?;
        }
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        if let Ok(mut ring) = self.shared.ring.lock() {
            ring.reader_closed = true;
        }
        self.shared.space.notify_all();
    }
}

fn lock<'a>(mutex: &'a Mutex<Ring>) -> io::Result<std::sync::MutexGuard<'a, Ring>> {
    mutex
        .lock()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "pipe lock poisoned"))
}

fn wait<'a>(
    condvar: &Condvar,
    guard: std::sync::MutexGuard<'a, Ring>,
) -> io::Result<std::sync::MutexGuard<'a, Ring>> {
    condvar
        .wait(guard)
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "pipe lock poisoned"))
}
