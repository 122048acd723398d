use std::io;
use std::net::SocketAddr;

use http::{Method, StatusCode};
use log::{debug, trace};

use crate::body::RawBody;
use crate::comp::Decompressor;
use crate::conn::{Connection, DEFAULT_READ_BUFFER};
use crate::error::{Error, Result};
use crate::head::HeadParser;
use crate::request::{self, Request};
use crate::response::{self, Emitter, Response};
use crate::server::Breaker;

/// Outcome of [`Exchange::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Reset {
    /// The connection can serve the next exchange; call `wait` again.
    Reuse,
    /// The connection must be closed.
    Close,
}

/// Options for a new exchange.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Size of the fixed read buffer in front of the stream.
    pub read_buffer_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            read_buffer_size: DEFAULT_READ_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    First,
    Start,
    Waited,
    Responded,
    Finished,
}

/// One request/response pair (and, kept alive, the ones after it) on a
/// single connection.
///
/// Operations follow a strict order: `wait` reads and parses the request
/// head, `send` writes the response head, `write` the response body,
/// `finish` completes it and `reset` decides whether the connection serves
/// another exchange. Request body `read`s are legal between `wait` and
/// `finish`. Calling an operation outside its legal state is a programmer
/// error and panics.
///
/// The header buffer is borrowed for the lifetime of the exchange and must
/// not be shared with a concurrent exchange. Every operation may block on
/// the underlying stream; there is no timeout machinery, so a stalled peer
/// stalls the calling thread until the socket is closed from elsewhere.
pub struct Exchange<'b, S: io::Read + io::Write> {
    conn: Connection<S>,
    breaker: Breaker,
    peer: Option<SocketAddr>,
    head_buf: &'b mut [u8],
    parser: HeadParser,
    req: Request,
    res: Response,
    emit: Emitter,
    state: Lifecycle,
    sent_interim: bool,
}

impl<'b, S: io::Read + io::Write> Exchange<'b, S> {
    /// An exchange over any blocking byte stream. `header_buf` bounds the
    /// size of an accepted request head (8–64 KiB is typical).
    pub fn new(stream: S, header_buf: &'b mut [u8]) -> Self {
        Self::with_options(stream, header_buf, Options::default())
    }

    pub fn with_options(stream: S, header_buf: &'b mut [u8], options: Options) -> Self {
        Exchange {
            conn: Connection::new(stream, options.read_buffer_size),
            breaker: Breaker::None,
            peer: None,
            head_buf: header_buf,
            parser: HeadParser::new(),
            req: Request::default(),
            res: Response::default(),
            emit: Emitter::default(),
            state: Lifecycle::First,
            sent_interim: false,
        }
    }

    pub(crate) fn accepted(
        stream: S,
        peer: SocketAddr,
        header_buf: &'b mut [u8],
        options: Options,
        breaker: Breaker,
    ) -> Self {
        let mut ex = Self::with_options(stream, header_buf, options);
        ex.peer = Some(peer);
        ex.breaker = breaker;
        ex
    }

    /// Peer address, when the exchange was produced by a listener.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// The request parsed by the last successful [`wait`][Self::wait].
    pub fn request(&self) -> &Request {
        &self.req
    }

    /// The staged response. Meaningful to mutate before
    /// [`send`][Self::send].
    pub fn response(&self) -> &Response {
        &self.res
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.res
    }

    /// Read and parse the next request head.
    ///
    /// On an I/O error the connection is unusable: drop the exchange
    /// without responding (`EndOfStream` before any bytes is the peer
    /// closing a kept-alive connection cleanly). On a parse error the
    /// exchange moves to the responded-able state with the connection
    /// marked closing, so the caller can still send the advisory status:
    /// 431 for [`HeadersOversize`][Error::HeadersOversize], 400 otherwise.
    ///
    /// When the request carries `Expect: 100-continue`, send a `100` status
    /// (which leaves the exchange waited) and call `wait` again, or send a
    /// 417.
    pub fn wait(&mut self) -> Result<()> {
        match self.state {
            Lifecycle::First | Lifecycle::Start => {}
            // A re-entry after an interim 1xx; the head is already parsed.
            Lifecycle::Waited if self.sent_interim => return Ok(()),
            _ => panic!("wait called out of order"),
        }

        if let Err(e) = self.wait_inner() {
            if !is_io(e) {
                // Leave room for the advisory error response.
                self.req = Request::default();
                self.conn.closing = true;
                self.state = Lifecycle::Waited;
            }
            return Err(e);
        }

        Ok(())
    }

    fn wait_inner(&mut self) -> Result<()> {
        loop {
            self.conn.fill()?;
            let n = self.parser.feed(self.head_buf, self.conn.peek())?;
            self.conn.consume(n);
            if self.parser.is_complete() {
                break;
            }
        }

        let head = self.parser.get(self.head_buf);
        trace!("request head complete: {} bytes", head.len());

        let mut req = request::parse(head)?;
        self.parser
            .prepare_body(req.chunked, req.content_length);

        if req.has_body() {
            req.decompressor = Decompressor::new(req.compression)?;
        }

        debug!(
            "{} {} {:?}{}",
            req.method,
            req.target,
            req.version,
            if req.chunked { " (chunked)" } else { "" }
        );

        self.req = req;
        self.state = Lifecycle::Waited;
        Ok(())
    }

    /// Write the response head staged in [`response_mut`][Self::response_mut].
    ///
    /// A 1xx status writes an interim head and leaves the exchange waited;
    /// any other status moves it to the responded state. For a HEAD request
    /// the body that follows is elided from the wire.
    pub fn send(&mut self) -> Result<()> {
        assert!(
            self.state == Lifecycle::Waited,
            "send called out of order"
        );

        if self.res.status.is_informational() {
            response::send_interim(&mut self.conn, &self.res, self.req.version)?;
            self.sent_interim = true;
            trace!("interim {} sent", self.res.status);
            return Ok(());
        }

        let elide = self.req.method == Method::HEAD;
        self.emit = response::send_head(
            &mut self.conn,
            &self.res,
            self.req.version,
            self.req.keep_alive,
            elide,
        )?;

        self.state = Lifecycle::Responded;
        trace!("response head sent: {}", self.res.status);
        Ok(())
    }

    /// Read request body bytes. Zero means the body ended; for chunked
    /// bodies the trailers have then been appended to the request headers.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        assert!(
            matches!(self.state, Lifecycle::Waited | Lifecycle::Responded),
            "read called out of order"
        );

        let Exchange {
            conn,
            parser,
            head_buf,
            req,
            ..
        } = self;

        let mut raw = RawBody {
            conn,
            parser,
            head_buf: &mut **head_buf,
            headers: &mut req.headers,
            chunked: req.chunked,
        };

        match &mut req.decompressor {
            None => raw.read(out),
            Some(dec) => dec.read(out, |scratch| raw.read(scratch)),
        }
    }

    /// Drain the remaining request body.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0_u8; 4096];
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }

    /// Write response body bytes, framed per the transfer mode resolved by
    /// [`send`][Self::send]. In chunked mode an empty `bytes` is a no-op
    /// and does not terminate the body.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        assert!(
            self.state == Lifecycle::Responded,
            "write called out of order"
        );
        response::write_body(&mut self.conn, &mut self.emit, bytes)
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.write(bytes)
    }

    /// Complete the response body: the chunked terminator goes out, or the
    /// content-length budget is checked for completeness.
    pub fn finish(&mut self) -> Result<()> {
        assert!(
            self.state == Lifecycle::Responded,
            "finish called out of order"
        );

        response::finish_body(&mut self.conn, &self.emit)?;
        self.conn.flush()?;

        self.state = Lifecycle::Finished;
        Ok(())
    }

    /// One-shot response: status, the staged headers, and a fixed body with
    /// a synthesised content-length.
    pub fn respond(&mut self, status: StatusCode, body: &[u8]) -> Result<()> {
        self.res.status = status;
        self.res.transfer = response::Transfer::ContentLength(body.len() as u64);
        self.send()?;
        self.write(body)?;
        self.finish()
    }

    /// Release per-exchange state and decide connection reuse.
    ///
    /// The connection is kept alive iff the request body was fully read
    /// (otherwise we cannot find the next head), the request asked for
    /// keep-alive, and the application did not set `Connection: close` on
    /// the response.
    pub fn reset(&mut self) -> Reset {
        match self.state {
            Lifecycle::First => {
                self.state = Lifecycle::Start;
                return Reset::Reuse;
            }
            Lifecycle::Finished => {}
            _ => panic!("reset called out of order"),
        }

        if !self.parser.is_complete() {
            // Cannot re-synchronise on the next head.
            self.conn.closing = true;
        }

        let res_close = self
            .res
            .headers
            .get(http::header::CONNECTION)
            .map(|v| request::value_has_token(v, "close"))
            .unwrap_or(false);

        if !self.req.keep_alive || res_close {
            self.conn.closing = true;
        }

        // Fresh maps rather than clear-in-place: header storage must be
        // fully released between exchanges. The decompressor goes with the
        // old request.
        self.req = Request::default();
        self.res = Response::default();
        self.emit = Emitter::default();
        self.parser.reset();
        self.sent_interim = false;

        if self.conn.closing {
            trace!("exchange reset: closing");
            Reset::Close
        } else {
            trace!("exchange reset: reuse");
            self.state = Lifecycle::Start;
            Reset::Reuse
        }
    }

    /// Tear the exchange down. An accepted TCP exchange shuts the socket
    /// down in both directions through a second handle taken at accept
    /// time; over a caller-supplied transport dropping the stream is the
    /// only teardown there is.
    pub fn close(self) {
        let Exchange { breaker, .. } = self;
        if let Err(e) = breaker.disconnect() {
            debug!("socket shutdown on close failed: {}", e);
        }
    }

    /// The underlying stream. Mainly for tests over in-memory transports.
    pub fn into_inner(self) -> S {
        self.conn.into_inner()
    }
}

fn is_io(e: Error) -> bool {
    matches!(
        e,
        Error::ConnectionResetByPeer
            | Error::ConnectionTimedOut
            | Error::UnexpectedReadFailure
            | Error::UnexpectedWriteFailure
            | Error::EndOfStream
    )
}
