use thiserror::Error;

pub(crate) type Result<T> = std::result::Result<T, Error>;

/// Error type for strix.
///
/// OS-level errors never leak out of the crate; the connection layer projects
/// them onto the I/O variants below. Misuse of the exchange ordering protocol
/// (such as writing a body before sending the head) is a programmer error and
/// panics instead of appearing here.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // I/O
    #[error("connection reset by peer")]
    ConnectionResetByPeer,

    #[error("connection timed out")]
    ConnectionTimedOut,

    #[error("unexpected failure reading from peer")]
    UnexpectedReadFailure,

    #[error("unexpected failure writing to peer")]
    UnexpectedWriteFailure,

    #[error("peer closed the stream")]
    EndOfStream,

    // Head framing
    #[error("request head larger than the header buffer")]
    HeadersOversize,

    // Request syntax
    #[error("malformed request head")]
    HttpHeadersInvalid,

    #[error("obsolete header line folding is not supported")]
    HttpHeaderContinuationsUnsupported,

    #[error("request method is not a valid token")]
    UnknownHttpMethod,

    #[error("content-length is not a base-10 number")]
    InvalidContentLength,

    // Codings
    #[error("unsupported transfer-encoding layering")]
    HttpTransferEncodingUnsupported,

    #[error("compress coding is not supported")]
    CompressionNotSupported,

    #[error("failed to decompress request body")]
    DecompressionFailure,

    #[error("malformed chunked trailers")]
    InvalidTrailers,

    // Response framing
    #[error("only chunked transfer-encoding can be sent")]
    UnsupportedTransferEncoding,

    #[error("response has no writeable body")]
    NotWriteable,

    #[error("attempt to write past the declared content-length")]
    MessageTooLong,

    #[error("fewer bytes written than the declared content-length")]
    MessageNotCompleted,
}
