use std::io;

use crate::error::{Error, Result};

/// Default size of the read buffer. Heads, chunk frames and small bodies
/// normally fit in a single fill.
pub(crate) const DEFAULT_READ_BUFFER: usize = 16 * 1024;

/// A byte stream with a fixed read buffer in front of it.
///
/// The buffer is a window `[start, end)` over bytes already read from the
/// stream. Consumers `peek` at the window, then `consume` what they used.
/// Bytes left in the window after a body ends are the head of the next
/// request on a kept-alive connection.
pub(crate) struct Connection<S> {
    stream: S,
    buf: Vec<u8>,
    start: usize,
    end: usize,
    /// Set when this connection must not serve another exchange.
    pub(crate) closing: bool,
}

impl<S: io::Read + io::Write> Connection<S> {
    pub(crate) fn new(stream: S, buffer_size: usize) -> Self {
        Connection {
            stream,
            buf: vec![0; buffer_size.max(512)],
            start: 0,
            end: 0,
            closing: false,
        }
    }

    /// Read at least one byte into the buffer when it is drained. A no-op
    /// while unconsumed bytes remain.
    pub(crate) fn fill(&mut self) -> Result<()> {
        if self.start < self.end {
            return Ok(());
        }

        self.start = 0;
        self.end = 0;

        let n = self.stream.read(&mut self.buf).map_err(read_err)?;
        if n == 0 {
            return Err(Error::EndOfStream);
        }
        self.end = n;

        Ok(())
    }

    pub(crate) fn peek(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    pub(crate) fn consume(&mut self, n: usize) {
        assert!(n <= self.end - self.start, "consume past buffered input");
        self.start += n;
    }

    /// Fill `out` with at least `min` bytes. Buffered bytes are drained
    /// first; once the remaining destination is larger than the buffer
    /// capacity the stream is read directly, skipping the copy.
    pub(crate) fn read_at_least(&mut self, out: &mut [u8], min: usize) -> Result<usize> {
        debug_assert!(min <= out.len());

        let mut n = 0;
        while n < min {
            let buffered = self.peek();
            if !buffered.is_empty() {
                let take = buffered.len().min(out.len() - n);
                out[n..n + take].copy_from_slice(&buffered[..take]);
                self.consume(take);
                n += take;
            } else if out.len() - n >= self.buf.len() {
                let direct = self.stream.read(&mut out[n..]).map_err(read_err)?;
                if direct == 0 {
                    return Err(Error::EndOfStream);
                }
                n += direct;
            } else {
                self.fill()?;
            }
        }

        Ok(n)
    }

    pub(crate) fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).map_err(write_err)
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        self.stream.flush().map_err(write_err)
    }

    pub(crate) fn into_inner(self) -> S {
        self.stream
    }
}

// The only projection from the OS error space. `io::Error` values must not
// escape this module.

fn read_err(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => Error::ConnectionResetByPeer,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::ConnectionTimedOut,
        io::ErrorKind::UnexpectedEof => Error::EndOfStream,
        _ => Error::UnexpectedReadFailure,
    }
}

fn write_err(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => Error::ConnectionResetByPeer,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::ConnectionTimedOut,
        _ => Error::UnexpectedWriteFailure,
    }
}
