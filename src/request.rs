use std::str;

use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Version};

use crate::comp::Decompressor;
use crate::error::{Error, Result};

/// A compression coding named in Transfer-Encoding or Content-Encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coding {
    #[default]
    Identity,
    Deflate,
    Gzip,
    XGzip,
    Compress,
    XCompress,
    Zstd,
}

impl Coding {
    fn from_token(t: &str) -> Option<Coding> {
        let c = if t.eq_ignore_ascii_case("identity") {
            Coding::Identity
        } else if t.eq_ignore_ascii_case("deflate") {
            Coding::Deflate
        } else if t.eq_ignore_ascii_case("gzip") {
            Coding::Gzip
        } else if t.eq_ignore_ascii_case("x-gzip") {
            Coding::XGzip
        } else if t.eq_ignore_ascii_case("compress") {
            Coding::Compress
        } else if t.eq_ignore_ascii_case("x-compress") {
            Coding::XCompress
        } else if t.eq_ignore_ascii_case("zstd") {
            Coding::Zstd
        } else {
            return None;
        };
        Some(c)
    }

    pub fn is_identity(&self) -> bool {
        *self == Coding::Identity
    }
}

/// A parsed request head.
///
/// Obtained from [`Exchange::request`][crate::Exchange::request] after a
/// successful `wait`. Exactly one of "chunked", "content-length n" or
/// "no body" frames the body that follows.
#[derive(Debug, PartialEq)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) target: String,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
    pub(crate) content_length: Option<u64>,
    pub(crate) chunked: bool,
    pub(crate) compression: Coding,
    pub(crate) keep_alive: bool,
    pub(crate) decompressor: Option<Decompressor>,
}

impl Default for Request {
    fn default() -> Self {
        Request {
            method: Method::GET,
            target: String::new(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            content_length: None,
            chunked: false,
            compression: Coding::Identity,
            keep_alive: false,
            decompressor: None,
        }
    }
}

impl Request {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Whether the body uses chunked framing. Chunked wins over a
    /// Content-Length that is also present.
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn compression(&self) -> Coding {
        self.compression
    }

    pub fn has_body(&self) -> bool {
        self.chunked || self.content_length.map_or(false, |n| n > 0)
    }

    /// Whether the client sent `Expect: 100-continue` and awaits an interim
    /// response before transmitting the body.
    pub fn expects_continue(&self) -> bool {
        self.headers
            .get(header::EXPECT)
            .map(|v| v.as_bytes().eq_ignore_ascii_case(b"100-continue"))
            .unwrap_or(false)
    }
}

/// Interpret a complete head. The framing of the body and the keep-alive
/// intent are fixed here; the decompressor is attached by the exchange once
/// it knows a body actually follows.
pub(crate) fn parse(head: &[u8]) -> Result<Request> {
    let mut lines = Lines(head);

    // Skip blank lines ahead of the request line.
    let line = loop {
        match lines.next() {
            Some([]) => continue,
            Some(line) => break line,
            None => return Err(Error::HttpHeadersInvalid),
        }
    };

    let (method, target, version) = parse_request_line(line)?;

    let mut headers = HeaderMap::new();
    let mut content_length = None;
    let mut chunked = false;
    let mut compression: Option<Coding> = None;

    for line in lines {
        if line.is_empty() {
            continue;
        }
        if line[0] == b' ' || line[0] == b'\t' {
            return Err(Error::HttpHeaderContinuationsUnsupported);
        }

        let (name, value) = split_header_line(line)?;

        if name == header::CONTENT_LENGTH {
            if content_length.is_some() {
                return Err(Error::HttpHeadersInvalid);
            }
            content_length = Some(parse_content_length(value)?);
        } else if name == header::TRANSFER_ENCODING {
            parse_transfer_encoding(value, &mut chunked, &mut compression)?;
        } else if name == header::CONTENT_ENCODING {
            parse_content_encoding(value, &mut compression)?;
        }

        let value = HeaderValue::from_bytes(value).map_err(|_| Error::HttpHeadersInvalid)?;
        headers.append(name, value);
    }

    let keep_alive = keep_alive(version, &headers);

    Ok(Request {
        method,
        target,
        version,
        headers,
        content_length,
        chunked,
        compression: compression.unwrap_or(Coding::Identity),
        keep_alive,
        decompressor: None,
    })
}

/// Append trailer fields to the request headers. Trailers carry header lines
/// only; any malformation is a trailer error.
pub(crate) fn parse_trailers(raw: &[u8], headers: &mut HeaderMap) -> Result<()> {
    for line in Lines(raw) {
        if line.is_empty() {
            continue;
        }
        if line[0] == b' ' || line[0] == b'\t' {
            return Err(Error::InvalidTrailers);
        }

        let (name, value) = split_header_line(line).map_err(|_| Error::InvalidTrailers)?;
        let value = HeaderValue::from_bytes(value).map_err(|_| Error::InvalidTrailers)?;
        headers.append(name, value);
    }

    Ok(())
}

/// `METHOD SP TARGET SP VERSION`. The target is everything between the first
/// and the last space, so it may itself contain spaces.
fn parse_request_line(line: &[u8]) -> Result<(Method, String, Version)> {
    let line = str::from_utf8(line).map_err(|_| Error::HttpHeadersInvalid)?;

    if line.len() < 10 {
        return Err(Error::HttpHeadersInvalid);
    }

    let first = line.find(' ').ok_or(Error::HttpHeadersInvalid)?;
    let last = line.rfind(' ').expect("a space was found above");
    if first == last {
        return Err(Error::HttpHeadersInvalid);
    }

    let method = &line[..first];
    if method.is_empty() || method.len() > 24 {
        return Err(Error::HttpHeadersInvalid);
    }
    let method = Method::from_bytes(method.as_bytes()).map_err(|_| Error::UnknownHttpMethod)?;

    let target = &line[first + 1..last];
    if target.is_empty() {
        return Err(Error::HttpHeadersInvalid);
    }

    let version = match &line[last + 1..] {
        "HTTP/1.1" => Version::HTTP_11,
        "HTTP/1.0" => Version::HTTP_10,
        _ => return Err(Error::HttpHeadersInvalid),
    };

    Ok((method, target.to_string(), version))
}

/// Split on the first colon only, so values may contain colons.
fn split_header_line(line: &[u8]) -> Result<(HeaderName, &[u8])> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or(Error::HttpHeadersInvalid)?;

    let name = &line[..colon];
    if name.is_empty() {
        return Err(Error::HttpHeadersInvalid);
    }
    let name = HeaderName::from_bytes(name).map_err(|_| Error::HttpHeadersInvalid)?;

    let value = trim_ascii(&line[colon + 1..]);

    Ok((name, value))
}

/// Strictly base-10 digits; no sign, no whitespace. Shared with the
/// response side so both directions enforce the same grammar.
pub(crate) fn parse_content_length(value: &[u8]) -> Result<u64> {
    let s = str::from_utf8(value).map_err(|_| Error::InvalidContentLength)?;
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidContentLength);
    }
    s.parse::<u64>().map_err(|_| Error::InvalidContentLength)
}

/// Transfer-Encoding lists codings in the order they were applied; we decode
/// from the right. At most an outermost `chunked` followed by one
/// compression coding is accepted.
fn parse_transfer_encoding(
    value: &[u8],
    chunked: &mut bool,
    compression: &mut Option<Coding>,
) -> Result<()> {
    let s = str::from_utf8(value).map_err(|_| Error::HttpHeadersInvalid)?;
    let tokens: Vec<&str> = s.split(',').map(str::trim).collect();

    let mut iter = tokens.iter().rev();
    let mut token = iter.next();

    if let Some(t) = token {
        if t.eq_ignore_ascii_case("chunked") {
            if *chunked {
                return Err(Error::HttpHeadersInvalid);
            }
            *chunked = true;
            token = iter.next();
        }
    }

    if let Some(t) = token {
        if t.eq_ignore_ascii_case("chunked") {
            // A framing coding below the outermost one.
            return Err(Error::HttpHeadersInvalid);
        }
        let c = Coding::from_token(t).ok_or(Error::HttpTransferEncodingUnsupported)?;
        if compression.is_some() {
            return Err(Error::HttpHeadersInvalid);
        }
        *compression = Some(c);
    }

    if iter.next().is_some() {
        return Err(Error::HttpTransferEncodingUnsupported);
    }

    Ok(())
}

fn parse_content_encoding(value: &[u8], compression: &mut Option<Coding>) -> Result<()> {
    let s = str::from_utf8(value).map_err(|_| Error::HttpHeadersInvalid)?;
    let t = s.trim();

    if t.contains(',') {
        // Layered content encodings are double compression to us.
        return Err(Error::HttpHeadersInvalid);
    }

    let c = Coding::from_token(t).ok_or(Error::HttpTransferEncodingUnsupported)?;
    if compression.is_some() {
        return Err(Error::HttpHeadersInvalid);
    }
    *compression = Some(c);

    Ok(())
}

/// Keep-alive is request intent: HTTP/1.1 unless `close`, HTTP/1.0 only with
/// an explicit `keep-alive`.
fn keep_alive(version: Version, headers: &HeaderMap) -> bool {
    let mut close = false;
    let mut explicit = false;

    for v in headers.get_all(header::CONNECTION) {
        close |= value_has_token(v, "close");
        explicit |= value_has_token(v, "keep-alive");
    }

    match version {
        Version::HTTP_10 => explicit && !close,
        _ => !close,
    }
}

pub(crate) fn value_has_token(value: &HeaderValue, token: &str) -> bool {
    value
        .to_str()
        .map(|s| s.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
        .unwrap_or(false)
}

fn trim_ascii(mut b: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = b {
        b = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = b {
        b = rest;
    }
    b
}

/// CRLF-terminated lines of a head. The terminating blank line shows up as
/// an empty slice.
struct Lines<'a>(&'a [u8]);

impl<'a> Iterator for Lines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let cr = self.0.iter().position(|&b| b == b'\r')?;
        if self.0.get(cr + 1) != Some(&b'\n') {
            return None;
        }
        let line = &self.0[..cr];
        self.0 = &self.0[cr + 2..];
        Some(line)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_get() -> Result<()> {
        let req = parse(b"GET /path HTTP/1.1\r\nHost: foo\r\nContent-Type: text/plain\r\n\r\n")?;

        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.target(), "/path");
        assert_eq!(req.version(), Version::HTTP_11);
        assert_eq!(req.headers()["host"], "foo");
        assert_eq!(req.headers()["content-type"], "text/plain");
        assert_eq!(req.content_length(), None);
        assert!(!req.is_chunked());
        assert!(!req.has_body());
        assert!(req.keep_alive);
        Ok(())
    }

    #[test]
    fn test_target_between_first_and_last_space() -> Result<()> {
        let req = parse(b"GET /with space HTTP/1.1\r\n\r\n")?;
        assert_eq!(req.target(), "/with space");
        Ok(())
    }

    #[test]
    fn test_request_line_too_short() {
        assert_eq!(parse(b"GET / H\r\n\r\n"), Err(Error::HttpHeadersInvalid));
    }

    #[test]
    fn test_single_space_rejected() {
        assert_eq!(
            parse(b"GET /longpath\r\n\r\n"),
            Err(Error::HttpHeadersInvalid)
        );
    }

    #[test]
    fn test_bad_version() {
        assert_eq!(
            parse(b"GET / HTTP/2.0\r\n\r\n"),
            Err(Error::HttpHeadersInvalid)
        );
    }

    #[test]
    fn test_unknown_method_token() {
        assert_eq!(
            parse(b"GE{T / HTTP/1.1\r\n\r\n"),
            Err(Error::UnknownHttpMethod)
        );
    }

    #[test]
    fn test_method_length_cap() {
        assert_eq!(
            parse(b"ABCDEFGHIJKLMNOPQRSTUVWXY / HTTP/1.1\r\n\r\n"),
            Err(Error::HttpHeadersInvalid)
        );
    }

    #[test]
    fn test_custom_method() -> Result<()> {
        let req = parse(b"PURGE /cache HTTP/1.1\r\n\r\n")?;
        assert_eq!(req.method().as_str(), "PURGE");
        Ok(())
    }

    #[test]
    fn test_folded_header_rejected() {
        assert_eq!(
            parse(b"GET / HTTP/1.1\r\nHost: foo\r\n continued\r\n\r\n"),
            Err(Error::HttpHeaderContinuationsUnsupported)
        );
    }

    #[test]
    fn test_value_with_colon_preserved() -> Result<()> {
        let req = parse(b"GET / HTTP/1.1\r\nReferer: http://x/y\r\n\r\n")?;
        assert_eq!(req.headers()["referer"], "http://x/y");
        Ok(())
    }

    #[test]
    fn test_duplicate_content_length() {
        assert_eq!(
            parse(b"GET / HTTP/1.1\r\nContent-Length: 1\r\nContent-Length: 1\r\n\r\n"),
            Err(Error::HttpHeadersInvalid)
        );
    }

    #[test]
    fn test_bad_content_length() {
        assert_eq!(
            parse(b"GET / HTTP/1.1\r\nContent-Length: 12x\r\n\r\n"),
            Err(Error::InvalidContentLength)
        );
        assert_eq!(
            parse(b"GET / HTTP/1.1\r\nContent-Length: +12\r\n\r\n"),
            Err(Error::InvalidContentLength)
        );
    }

    #[test]
    fn test_transfer_encoding_chunked() -> Result<()> {
        let req = parse(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n")?;
        assert!(req.is_chunked());
        assert!(req.compression().is_identity());
        assert!(req.has_body());
        Ok(())
    }

    #[test]
    fn test_transfer_encoding_layered() -> Result<()> {
        // gzip applied first, chunked outermost.
        let req = parse(b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip, chunked\r\n\r\n")?;
        assert!(req.is_chunked());
        assert_eq!(req.compression(), Coding::Gzip);
        Ok(())
    }

    #[test]
    fn test_transfer_encoding_compression_only() -> Result<()> {
        let req = parse(b"POST / HTTP/1.1\r\nContent-Length: 4\r\nTransfer-Encoding: zstd\r\n\r\n")?;
        assert!(!req.is_chunked());
        assert_eq!(req.compression(), Coding::Zstd);
        Ok(())
    }

    #[test]
    fn test_chunked_wins_over_content_length() -> Result<()> {
        let req = parse(b"POST / HTTP/1.1\r\nContent-Length: 4\r\nTransfer-Encoding: chunked\r\n\r\n")?;
        assert!(req.is_chunked());
        assert_eq!(req.content_length(), Some(4));
        Ok(())
    }

    #[test]
    fn test_transfer_encoding_chunked_under_compression() {
        // Decoded right to left this puts chunked below the compression.
        assert_eq!(
            parse(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked, gzip\r\n\r\n"),
            Err(Error::HttpTransferEncodingUnsupported)
        );
    }

    #[test]
    fn test_transfer_encoding_three_codings() {
        assert_eq!(
            parse(b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip, deflate, chunked\r\n\r\n"),
            Err(Error::HttpTransferEncodingUnsupported)
        );
    }

    #[test]
    fn test_transfer_encoding_unknown_token() {
        assert_eq!(
            parse(b"POST / HTTP/1.1\r\nTransfer-Encoding: br, chunked\r\n\r\n"),
            Err(Error::HttpTransferEncodingUnsupported)
        );
    }

    #[test]
    fn test_chunked_twice() {
        assert_eq!(
            parse(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\nTransfer-Encoding: chunked\r\n\r\n"),
            Err(Error::HttpHeadersInvalid)
        );
    }

    #[test]
    fn test_double_compression_via_content_encoding() {
        assert_eq!(
            parse(b"POST / HTTP/1.1\r\nTransfer-Encoding: gzip, chunked\r\nContent-Encoding: gzip\r\n\r\n"),
            Err(Error::HttpHeadersInvalid)
        );
    }

    #[test]
    fn test_content_encoding_alone() -> Result<()> {
        let req = parse(b"POST / HTTP/1.1\r\nContent-Length: 2\r\nContent-Encoding: deflate\r\n\r\n")?;
        assert_eq!(req.compression(), Coding::Deflate);
        Ok(())
    }

    #[test]
    fn test_keep_alive_defaults() -> Result<()> {
        assert!(parse(b"GET / HTTP/1.1\r\n\r\n")?.keep_alive);
        assert!(!parse(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")?.keep_alive);
        assert!(!parse(b"GET / HTTP/1.0\r\n\r\n")?.keep_alive);
        assert!(parse(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n")?.keep_alive);
        Ok(())
    }

    #[test]
    fn test_expects_continue() -> Result<()> {
        let req = parse(b"POST / HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 2\r\n\r\n")?;
        assert!(req.expects_continue());
        Ok(())
    }

    #[test]
    fn test_multi_value_headers_keep_order() -> Result<()> {
        let req = parse(b"GET / HTTP/1.1\r\nAccept: a\r\nAccept: b\r\n\r\n")?;
        let all: Vec<_> = req
            .headers()
            .get_all("accept")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(all, ["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_trailers_appended() -> Result<()> {
        let mut headers = HeaderMap::new();
        parse_trailers(b"X-Checksum: abc\r\n\r\n", &mut headers)?;
        assert_eq!(headers["x-checksum"], "abc");
        Ok(())
    }

    #[test]
    fn test_trailers_reject_folding() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            parse_trailers(b" folded\r\n\r\n", &mut headers),
            Err(Error::InvalidTrailers)
        );
    }

    #[test]
    fn test_trailers_reject_missing_colon() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            parse_trailers(b"nocolon\r\n\r\n", &mut headers),
            Err(Error::InvalidTrailers)
        );
    }
}
