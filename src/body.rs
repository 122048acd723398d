use std::io;

use http::HeaderMap;

use crate::conn::Connection;
use crate::error::{Error, Result};
use crate::head::{HeadParser, State};
use crate::request;

/// Reader over the raw (not yet decompressed) request body.
///
/// Borrows the pieces of the exchange it needs for one `read` call and
/// demultiplexes identity vs. chunked framing. Zero means the body ended;
/// for chunked bodies the trailer section has been consumed and appended to
/// the request headers by then.
pub(crate) struct RawBody<'x, S> {
    pub(crate) conn: &'x mut Connection<S>,
    pub(crate) parser: &'x mut HeadParser,
    pub(crate) head_buf: &'x mut [u8],
    pub(crate) headers: &'x mut HeaderMap,
    pub(crate) chunked: bool,
}

impl<S: io::Read + io::Write> RawBody<'_, S> {
    pub(crate) fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.chunked {
            self.read_chunked(out)
        } else {
            self.read_identity(out)
        }
    }

    /// Identity framing: at most `next_chunk_length` more bytes off the
    /// connection. An early close is an error, the peer owed us bytes.
    fn read_identity(&mut self, out: &mut [u8]) -> Result<usize> {
        if self.parser.is_complete() {
            return Ok(0);
        }

        let remaining = self.parser.next_chunk_length;
        let max = (out.len() as u64).min(remaining) as usize;
        if max == 0 {
            return Ok(0);
        }

        let n = self.conn.read_at_least(&mut out[..max], 1)?;
        self.parser.next_chunk_length -= n as u64;
        if self.parser.next_chunk_length == 0 {
            self.parser.state = State::Complete;
        }

        Ok(n)
    }

    fn read_chunked(&mut self, out: &mut [u8]) -> Result<usize> {
        loop {
            match self.parser.state {
                State::Complete => return Ok(0),

                State::ChunkHeadSize | State::ChunkHeadExt => self.read_chunk_head()?,

                State::ChunkData => {
                    if out.is_empty() {
                        return Ok(0);
                    }

                    self.conn.fill()?;
                    let avail = self.conn.peek();
                    let take = avail
                        .len()
                        .min(out.len())
                        .min(usize::try_from(self.parser.next_chunk_length).unwrap_or(usize::MAX));

                    out[..take].copy_from_slice(&avail[..take]);
                    self.conn.consume(take);

                    self.parser.next_chunk_length -= take as u64;
                    if self.parser.next_chunk_length == 0 {
                        self.parser.state = State::ChunkDataSuffix;
                    }

                    return Ok(take);
                }

                State::ChunkDataSuffix => {
                    self.conn.fill()?;
                    if self.conn.peek()[0] != b'\r' {
                        return Err(Error::HttpHeadersInvalid);
                    }
                    self.conn.consume(1);
                    self.parser.state = State::ChunkDataSuffixLf;
                }

                State::ChunkDataSuffixLf => {
                    self.conn.fill()?;
                    if self.conn.peek()[0] != b'\n' {
                        return Err(Error::HttpHeadersInvalid);
                    }
                    self.conn.consume(1);
                    self.parser.state = State::ChunkHeadSize;
                    self.parser.chunk_has_digits = false;
                }

                // Trailer section, accumulated through the head machinery.
                State::Start | State::SeenCr | State::SeenCrlf | State::SeenCrlfCr => {
                    debug_assert!(self.parser.in_trailers());
                    self.read_trailers()?
                }
            }
        }
    }

    /// `hex-size [;ext] CRLF`, parsed byte by byte so the line may span any
    /// number of fills.
    fn read_chunk_head(&mut self) -> Result<()> {
        loop {
            self.conn.fill()?;
            let avail = self.conn.peek();

            let mut used = 0;
            let mut done = false;

            for &b in avail {
                used += 1;
                match self.parser.state {
                    State::ChunkHeadSize => {
                        if let Some(d) = hex_digit(b) {
                            self.parser.chunk_has_digits = true;
                            self.parser.next_chunk_length = self
                                .parser
                                .next_chunk_length
                                .checked_mul(16)
                                .and_then(|l| l.checked_add(u64::from(d)))
                                .ok_or(Error::HttpHeadersInvalid)?;
                        } else if (b == b';' || b == b'\r') && self.parser.chunk_has_digits {
                            self.parser.state = State::ChunkHeadExt;
                        } else {
                            return Err(Error::HttpHeadersInvalid);
                        }
                    }
                    // Extension bytes are noise up to the LF.
                    State::ChunkHeadExt => {
                        if b == b'\n' {
                            done = true;
                        }
                    }
                    _ => unreachable!("chunk head read outside chunk head states"),
                }
                if done {
                    break;
                }
            }

            self.conn.consume(used);

            if done {
                if self.parser.next_chunk_length == 0 {
                    self.parser.start_trailers();
                } else {
                    self.parser.state = State::ChunkData;
                }
                return Ok(());
            }
        }
    }

    fn read_trailers(&mut self) -> Result<()> {
        loop {
            self.conn.fill()?;

            let n = self
                .parser
                .feed(self.head_buf, self.conn.peek())
                .map_err(|e| match e {
                    Error::HeadersOversize => e,
                    _ => Error::InvalidTrailers,
                })?;
            self.conn.consume(n);

            if self.parser.is_complete() {
                let raw = self.parser.get(self.head_buf);
                request::parse_trailers(raw, self.headers)?;
                return Ok(());
            }
        }
    }
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
