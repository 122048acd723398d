use std::io::{self, Write};

use http::{header, HeaderMap, StatusCode, Version};

use crate::conn::Connection;
use crate::error::{Error, Result};
use crate::request;

/// How a response body is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transfer {
    /// No body follows the head.
    #[default]
    None,
    /// Exactly this many bytes follow.
    ContentLength(u64),
    /// Chunked transfer-encoding.
    Chunked,
}

/// The staged response, filled in by the application before
/// [`send`][crate::Exchange::send].
///
/// Headers set here are written as-is. `Connection` and the framing header
/// are synthesised only when the application did not supply them.
pub struct Response {
    pub status: StatusCode,
    /// Overrides the canonical reason phrase of `status`.
    pub reason: Option<String>,
    pub headers: HeaderMap,
    pub transfer: Transfer,
}

impl Default for Response {
    fn default() -> Self {
        Response {
            status: StatusCode::OK,
            reason: None,
            headers: HeaderMap::new(),
            transfer: Transfer::None,
        }
    }
}

/// Wire-side framing state after the head went out.
#[derive(Default)]
pub(crate) struct Emitter {
    pub(crate) transfer: Transfer,
    /// HEAD response: framing accounting runs, the wire sees no body bytes.
    pub(crate) elide: bool,
}

/// Write the response head. Resolves the body framing from the
/// application-supplied headers when present, otherwise from the staged
/// transfer mode, synthesising the matching header.
pub(crate) fn send_head<S: io::Read + io::Write>(
    conn: &mut Connection<S>,
    res: &Response,
    version: Version,
    keep_alive: bool,
    elide_body: bool,
) -> Result<Emitter> {
    let mut transfer = res.transfer;

    let supplied_te = res.headers.get(header::TRANSFER_ENCODING);
    let supplied_cl = res.headers.get(header::CONTENT_LENGTH);

    if let Some(te) = supplied_te {
        if !te.as_bytes().eq_ignore_ascii_case(b"chunked") {
            return Err(Error::UnsupportedTransferEncoding);
        }
        transfer = Transfer::Chunked;
    } else if let Some(cl) = supplied_cl {
        // The header text is echoed verbatim below, so it must satisfy the
        // same digits-only grammar the request parser enforces.
        let n = request::parse_content_length(cl.as_bytes())?;
        transfer = Transfer::ContentLength(n);
    }

    let mut head = Vec::with_capacity(256);
    write_status_line(&mut head, version, res);

    for (name, value) in res.headers.iter() {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }

    if !res.headers.contains_key(header::CONNECTION) {
        if keep_alive {
            head.extend_from_slice(b"connection: keep-alive\r\n");
        } else {
            head.extend_from_slice(b"connection: close\r\n");
        }
    }

    if supplied_te.is_none() && supplied_cl.is_none() {
        match transfer {
            Transfer::Chunked => head.extend_from_slice(b"transfer-encoding: chunked\r\n"),
            Transfer::ContentLength(n) => {
                let _ = write!(head, "content-length: {}\r\n", n);
            }
            Transfer::None => {}
        }
    }

    head.extend_from_slice(b"\r\n");
    conn.write_all(&head)?;

    Ok(Emitter {
        transfer,
        elide: elide_body,
    })
}

/// An interim 1xx head is the status line alone. The exchange stays waited;
/// the real response follows later.
pub(crate) fn send_interim<S: io::Read + io::Write>(
    conn: &mut Connection<S>,
    res: &Response,
    version: Version,
) -> Result<()> {
    debug_assert!(res.status.is_informational());

    let mut head = Vec::with_capacity(64);
    write_status_line(&mut head, version, res);
    head.extend_from_slice(b"\r\n");

    conn.write_all(&head)
}

pub(crate) fn write_body<S: io::Read + io::Write>(
    conn: &mut Connection<S>,
    emit: &mut Emitter,
    bytes: &[u8],
) -> Result<()> {
    match &mut emit.transfer {
        Transfer::None => Err(Error::NotWriteable),

        Transfer::Chunked => {
            // An empty chunk would read as the terminator.
            if bytes.is_empty() || emit.elide {
                return Ok(());
            }

            let mut frame = Vec::with_capacity(bytes.len() + 16);
            let _ = write!(frame, "{:x}\r\n", bytes.len());
            frame.extend_from_slice(bytes);
            frame.extend_from_slice(b"\r\n");
            conn.write_all(&frame)
        }

        Transfer::ContentLength(remaining) => {
            let len = bytes.len() as u64;
            if len > *remaining {
                return Err(Error::MessageTooLong);
            }
            *remaining -= len;

            if emit.elide {
                return Ok(());
            }
            conn.write_all(bytes)
        }
    }
}

pub(crate) fn finish_body<S: io::Read + io::Write>(
    conn: &mut Connection<S>,
    emit: &Emitter,
) -> Result<()> {
    match emit.transfer {
        Transfer::None => Ok(()),
        Transfer::Chunked => {
            if !emit.elide {
                conn.write_all(b"0\r\n\r\n")?;
            }
            Ok(())
        }
        Transfer::ContentLength(remaining) => {
            if remaining != 0 {
                return Err(Error::MessageNotCompleted);
            }
            Ok(())
        }
    }
}

fn write_status_line(head: &mut Vec<u8>, version: Version, res: &Response) {
    let version = match version {
        Version::HTTP_10 => "HTTP/1.0",
        _ => "HTTP/1.1",
    };
    let reason = res
        .reason
        .as_deref()
        .or_else(|| res.status.canonical_reason())
        .unwrap_or("");

    let _ = write!(head, "{} {} {}\r\n", version, res.status.as_u16(), reason);
}
