//! A proxy connection whose framing can be switched from plaintext to TLS
//! without reconnecting.
//!
//! The socket is wrapped in a [`BufReader`] while the CONNECT response is
//! parsed. That same reader is handed to the TLS session on upgrade, so any
//! bytes the proxy sent past the end of its response reach the TLS layer
//! instead of being lost.

use crate::error::ProbeError;
use openssl::ssl::Ssl;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio_openssl::SslStream;

pub type Socket = BufReader<TcpStream>;

pub enum Transport {
    Plain(Socket),
    Tls(Box<SslStream<Socket>>),
    Closed,
}

impl Transport {
    pub fn new(stream: TcpStream) -> Self {
        Transport::Plain(BufReader::new(stream))
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Transport::Closed)
    }

    /// Buffered plaintext side, used for line-oriented reads before upgrade.
    pub fn plain_mut(&mut self) -> Option<&mut Socket> {
        match self {
            Transport::Plain(socket) => Some(socket),
            _ => None,
        }
    }

    /// Runs a TLS client handshake over the current socket. On failure the
    /// socket is dropped and the transport is left closed.
    pub async fn upgrade(&mut self, ssl: Ssl) -> Result<(), ProbeError> {
        let socket = match std::mem::replace(self, Transport::Closed) {
            Transport::Plain(socket) => socket,
            other => {
                *self = other;
                return Err(ProbeError::TransportState("a TLS upgrade"));
            }
        };

        let mut stream = SslStream::new(ssl, socket)?;
        Pin::new(&mut stream)
            .connect()
            .await
            .map_err(ProbeError::TlsHandshake)?;
        *self = Transport::Tls(Box::new(stream));
        Ok(())
    }

    pub fn ssl(&self) -> Option<&openssl::ssl::SslRef> {
        match self {
            Transport::Tls(stream) => Some(stream.ssl()),
            _ => None,
        }
    }

    /// Best-effort orderly shutdown; the transport is closed afterwards
    /// whatever the peer does.
    pub async fn close(&mut self) {
        match std::mem::replace(self, Transport::Closed) {
            Transport::Plain(mut socket) => {
                let _ = socket.shutdown().await;
            }
            Transport::Tls(mut stream) => {
                let _ = stream.shutdown().await;
            }
            Transport::Closed => {}
        }
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is closed")
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(socket) => Pin::new(socket).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(&mut **stream).poll_read(cx, buf),
            Transport::Closed => Poll::Ready(Err(not_connected())),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(socket) => Pin::new(socket).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(&mut **stream).poll_write(cx, buf),
            Transport::Closed => Poll::Ready(Err(not_connected())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(socket) => Pin::new(socket).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(&mut **stream).poll_flush(cx),
            Transport::Closed => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(socket) => Pin::new(socket).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(&mut **stream).poll_shutdown(cx),
            Transport::Closed => Poll::Ready(Ok(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn buffered_bytes_survive_line_reads() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\n\r\nEXTRA")
                .await
                .unwrap();
        });

        let mut transport = Transport::new(TcpStream::connect(addr).await.unwrap());
        let mut line = Vec::new();
        let socket = transport.plain_mut().unwrap();
        socket.read_until(b'\n', &mut line).await.unwrap();
        line.clear();
        socket.read_until(b'\n', &mut line).await.unwrap();
        assert_eq!(line, b"\r\n");

        let mut rest = Vec::new();
        transport.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"EXTRA");
    }

    #[tokio::test]
    async fn closed_transport_rejects_io_and_upgrade() {
        let mut transport = Transport::Closed;
        let mut buf = [0u8; 4];
        let err = transport.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);

        let ctx = openssl::ssl::SslContext::builder(openssl::ssl::SslMethod::tls())
            .unwrap()
            .build();
        let ssl = Ssl::new(&ctx).unwrap();
        let err = transport.upgrade(ssl).await.unwrap_err();
        assert!(matches!(err, ProbeError::TransportState(_)));
        assert!(transport.is_closed());
    }
}
