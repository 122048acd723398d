use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use log::debug;

use crate::exchange::{Exchange, Options};

/// Severs an accepted connection independently of the exchange's own
/// stream handle. `io::Read + io::Write` has no teardown operation, so an
/// accepted TCP exchange carries a second handle to the socket and
/// [`Exchange::close`] shuts it down through this instead of merely
/// dropping it.
pub(crate) enum Breaker {
    /// Dropping the stream is the only teardown available.
    None,
    /// A cloned handle to the accepted socket.
    Tcp(TcpStream),
}

impl Breaker {
    pub(crate) fn disconnect(self) -> io::Result<()> {
        match self {
            Breaker::None => Ok(()),
            Breaker::Tcp(stream) => stream.shutdown(Shutdown::Both),
        }
    }
}

/// The TCP front door. Accepting yields one [`Exchange`] per connection;
/// everything after the accept runs on whichever thread the caller
/// dedicates to it.
///
/// Listener setup failures are plain `io::Error`s: they happen before any
/// HTTP exchange exists.
pub struct Server {
    listener: TcpListener,
}

impl Server {
    pub fn listen(addr: impl ToSocketAddrs) -> io::Result<Server> {
        let listener = TcpListener::bind(addr)?;
        debug!("listening on {}", listener.local_addr()?);
        Ok(Server { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Block until a connection arrives and bind an exchange to it. The
    /// header buffer is borrowed for as long as the exchange lives.
    pub fn accept<'b>(&self, header_buf: &'b mut [u8]) -> io::Result<Exchange<'b, TcpStream>> {
        self.accept_with_options(header_buf, Options::default())
    }

    pub fn accept_with_options<'b>(
        &self,
        header_buf: &'b mut [u8],
        options: Options,
    ) -> io::Result<Exchange<'b, TcpStream>> {
        let (stream, peer) = self.listener.accept()?;
        debug!("accepted connection from {}", peer);
        let breaker = Breaker::Tcp(stream.try_clone()?);
        Ok(Exchange::accepted(stream, peer, header_buf, options, breaker))
    }

    /// Accept the raw stream instead. For thread-per-connection setups
    /// where the exchange (and its header buffer) should live on the
    /// handler thread.
    pub fn accept_stream(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let pair = self.listener.accept()?;
        debug!("accepted connection from {}", pair.1);
        Ok(pair)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Reset;
    use http::StatusCode;
    use std::io::{Read, Write};
    use std::thread;

    #[test]
    fn test_serve_one_connection() {
        let server = Server::listen("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream
                .write_all(b"GET /hello HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                .unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).unwrap();
            response
        });

        let mut header_buf = [0_u8; 8 * 1024];
        let mut exchange = server.accept(&mut header_buf).unwrap();
        assert!(exchange.peer_addr().is_some());

        exchange.wait().unwrap();
        assert_eq!(exchange.request().target(), "/hello");

        exchange.respond(StatusCode::OK, b"hi there").unwrap();
        assert_eq!(exchange.reset(), Reset::Close);
        exchange.close();

        let response = client.join().unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("hi there"));
    }
}
