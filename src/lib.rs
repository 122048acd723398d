//! Synchronous, embeddable HTTP/1.x server core.
//!
//! One [`Exchange`] per accepted connection, driven by the caller's thread:
//! the crate parses request heads, streams bodies (identity and chunked
//! framing, with deflate/gzip/zstd decompression underneath), frames
//! response bodies and decides connection reuse. There is no runtime and no
//! internal parallelism; applications get concurrency by dedicating a
//! thread per connection.
//!
//! ```no_run
//! use strix::{Exchange, Reset, Server};
//! use strix::http::StatusCode;
//!
//! fn main() -> std::io::Result<()> {
//!     let server = Server::listen("127.0.0.1:8080")?;
//!
//!     loop {
//!         let (stream, _peer) = server.accept_stream()?;
//!
//!         std::thread::spawn(move || {
//!             let mut header_buf = vec![0; 16 * 1024];
//!             let mut exchange = Exchange::new(stream, &mut header_buf);
//!
//!             loop {
//!                 if exchange.wait().is_err() {
//!                     break;
//!                 }
//!                 let body = exchange.read_all().unwrap();
//!                 println!("{} {} ({} body bytes)",
//!                     exchange.request().method(),
//!                     exchange.request().target(),
//!                     body.len());
//!
//!                 exchange.respond(StatusCode::OK, b"hello\n").unwrap();
//!
//!                 if exchange.reset() == Reset::Close {
//!                     break;
//!                 }
//!             }
//!         });
//!     }
//! }
//! ```
//!
//! After a failed [`Exchange::wait`] the caller owes the peer an advisory
//! status before dropping the exchange: nothing for I/O errors, `431` for
//! [`Error::HeadersOversize`], `400` for everything else.

mod body;
mod comp;
mod conn;
mod error;
mod exchange;
mod head;
mod request;
mod response;
mod server;

pub use error::Error;
pub use exchange::{Exchange, Options, Reset};
pub use request::{Coding, Request};
pub use response::{Response, Transfer};
pub use server::Server;

// Re-export the vocabulary types; the API speaks them.
pub use http;

#[cfg(test)]
pub(crate) mod testing {
    use std::io;

    /// In-memory stand-in for a TCP stream: reads come from a canned
    /// request, writes are captured for inspection.
    pub(crate) struct TestStream {
        input: io::Cursor<Vec<u8>>,
        pub(crate) output: Vec<u8>,
        /// Cap on bytes returned per read, to exercise arbitrary chunking.
        pub(crate) read_cap: usize,
    }

    impl TestStream {
        pub(crate) fn new(input: &[u8]) -> Self {
            TestStream {
                input: io::Cursor::new(input.to_vec()),
                output: Vec::new(),
                read_cap: usize::MAX,
            }
        }
    }

    impl io::Read for TestStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let take = buf.len().min(self.read_cap);
            io::Read::read(&mut self.input, &mut buf[..take])
        }
    }

    impl io::Write for TestStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
