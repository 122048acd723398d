use crate::error::{Error, Result};

/// Parser state. The head states (`Start` through `SeenCrlfCr`) frame the
/// request head and, re-armed, the chunked trailer section. The chunk states
/// frame the body afterwards; `next_chunk_length` carries the chunk size, or
/// the remaining content-length for an identity body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Start,
    SeenCr,
    SeenCrlf,
    SeenCrlfCr,
    ChunkHeadSize,
    ChunkHeadExt,
    ChunkData,
    ChunkDataSuffix,
    ChunkDataSuffixLf,
    Complete,
}

/// Incremental recogniser of `CRLF CRLF` terminated heads.
///
/// Consumed bytes are copied into the caller-borrowed header buffer, so the
/// network reads can arrive in any chunking. CRLF handling is strict: a bare
/// LF, a stray CR inside a line, or a CR not followed by LF is rejected.
pub(crate) struct HeadParser {
    pub(crate) state: State,
    pub(crate) next_chunk_length: u64,
    /// A chunk size line must carry at least one hex digit.
    pub(crate) chunk_has_digits: bool,
    pos: usize,
    trailers: bool,
}

impl HeadParser {
    pub(crate) fn new() -> Self {
        HeadParser {
            state: State::Start,
            next_chunk_length: 0,
            chunk_has_digits: false,
            pos: 0,
            trailers: false,
        }
    }

    /// Scan `input`, copying into `buf`, and return how many bytes were
    /// consumed. The caller must consume that many from the connection.
    /// Stops consuming once the head is complete.
    pub(crate) fn feed(&mut self, buf: &mut [u8], input: &[u8]) -> Result<usize> {
        for (i, &b) in input.iter().enumerate() {
            self.state = match self.state {
                State::Start => match b {
                    b'\r' => State::SeenCr,
                    b'\n' => return Err(Error::HttpHeadersInvalid),
                    _ => State::Start,
                },
                State::SeenCr => match b {
                    b'\n' => State::SeenCrlf,
                    _ => return Err(Error::HttpHeadersInvalid),
                },
                State::SeenCrlf => match b {
                    b'\r' => State::SeenCrlfCr,
                    b'\n' => return Err(Error::HttpHeadersInvalid),
                    _ => State::Start,
                },
                State::SeenCrlfCr => match b {
                    b'\n' => State::Complete,
                    _ => return Err(Error::HttpHeadersInvalid),
                },
                _ => unreachable!("head parser fed outside head states"),
            };

            if self.pos == buf.len() {
                return Err(Error::HeadersOversize);
            }
            buf[self.pos] = b;
            self.pos += 1;

            if self.state == State::Complete {
                return Ok(i + 1);
            }
        }

        Ok(input.len())
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// The accumulated head (or trailer head) once complete.
    pub(crate) fn get<'a>(&self, buf: &'a [u8]) -> &'a [u8] {
        debug_assert!(self.is_complete());
        &buf[..self.pos]
    }

    /// Arm the parser for the body following a parsed head.
    pub(crate) fn prepare_body(&mut self, chunked: bool, content_length: Option<u64>) {
        debug_assert!(self.is_complete());

        if chunked {
            self.state = State::ChunkHeadSize;
            self.next_chunk_length = 0;
            self.chunk_has_digits = false;
        } else {
            match content_length {
                Some(n) if n > 0 => {
                    self.state = State::ChunkData;
                    self.next_chunk_length = n;
                }
                // No body. The head stays complete.
                _ => {}
            }
        }
    }

    /// Re-arm for the trailer section after the final 0-chunk. Starting in
    /// `SeenCrlf` makes an immediate blank line terminate an empty trailer
    /// head. The header buffer is reused from the start.
    pub(crate) fn start_trailers(&mut self) {
        self.state = State::SeenCrlf;
        self.pos = 0;
        self.trailers = true;
    }

    pub(crate) fn in_trailers(&self) -> bool {
        self.trailers
    }

    pub(crate) fn reset(&mut self) {
        *self = HeadParser::new();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const HEAD: &[u8] = b"GET /path HTTP/1.1\r\nHost: foo\r\n\r\n";

    #[test]
    fn test_head_complete_in_one_feed() -> Result<()> {
        let mut buf = [0_u8; 128];
        let mut parser = HeadParser::new();

        let n = parser.feed(&mut buf, HEAD)?;
        assert_eq!(n, HEAD.len());
        assert!(parser.is_complete());
        assert_eq!(parser.get(&buf), HEAD);
        Ok(())
    }

    #[test]
    fn test_head_complete_over_any_chunking() -> Result<()> {
        // Every split point of the same head must yield the same result.
        for split in 1..HEAD.len() {
            let mut buf = [0_u8; 128];
            let mut parser = HeadParser::new();

            let n = parser.feed(&mut buf, &HEAD[..split])?;
            assert_eq!(n, split);
            assert!(!parser.is_complete());

            parser.feed(&mut buf, &HEAD[split..])?;
            assert!(parser.is_complete());
            assert_eq!(parser.get(&buf), HEAD);
        }
        Ok(())
    }

    #[test]
    fn test_stops_consuming_at_terminator() -> Result<()> {
        let mut buf = [0_u8; 128];
        let mut parser = HeadParser::new();

        let mut input = HEAD.to_vec();
        input.extend_from_slice(b"leftover body");

        let n = parser.feed(&mut buf, &input)?;
        assert_eq!(n, HEAD.len());
        assert!(parser.is_complete());
        Ok(())
    }

    #[test]
    fn test_oversize() {
        let mut buf = [0_u8; 16];
        let mut parser = HeadParser::new();
        assert_eq!(parser.feed(&mut buf, HEAD), Err(Error::HeadersOversize));
    }

    #[test]
    fn test_bare_lf_rejected() {
        let mut buf = [0_u8; 128];
        let mut parser = HeadParser::new();
        assert_eq!(
            parser.feed(&mut buf, b"GET / HTTP/1.1\nHost: foo\n\n"),
            Err(Error::HttpHeadersInvalid)
        );
    }

    #[test]
    fn test_stray_cr_rejected() {
        let mut buf = [0_u8; 128];
        let mut parser = HeadParser::new();
        assert_eq!(
            parser.feed(&mut buf, b"GET / HT\rTP/1.1\r\n\r\n"),
            Err(Error::HttpHeadersInvalid)
        );
    }

    #[test]
    fn test_trailer_rearm() -> Result<()> {
        let mut buf = [0_u8; 128];
        let mut parser = HeadParser::new();

        parser.feed(&mut buf, HEAD)?;
        parser.start_trailers();
        assert!(parser.in_trailers());

        // An empty trailer section is just the blank line.
        let n = parser.feed(&mut buf, b"\r\nnext request")?;
        assert_eq!(n, 2);
        assert!(parser.is_complete());
        assert_eq!(parser.get(&buf), b"\r\n");
        Ok(())
    }

    #[test]
    fn test_trailer_with_fields() -> Result<()> {
        let mut buf = [0_u8; 128];
        let mut parser = HeadParser::new();

        parser.feed(&mut buf, HEAD)?;
        parser.start_trailers();

        parser.feed(&mut buf, b"X-Checksum: abc\r\n\r\n")?;
        assert!(parser.is_complete());
        assert_eq!(parser.get(&buf), b"X-Checksum: abc\r\n\r\n");
        Ok(())
    }
}
