//! Buffered message stream over a [`Socket`].
use bytes::{Buf, BytesMut};
use std::{io, time::Duration};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{
    Result,
    error::SslError,
    net::Socket,
    postgres::{FrontendProtocol, frontend},
    transport::{PgTransport, RawMessage},
};

const DEFAULT_BUF_CAPACITY: usize = 1024;

/// Buffered connection to postgres.
///
/// Holds one reusable read buffer and one write buffer; each received
/// message body is split out of the read buffer without reallocating, and
/// buffered sends coalesce into a single write on flush.
///
/// Every read and write on the underlying socket is bounded by the
/// configured timeout; hitting it surfaces as a timed-out [`io::Error`] and
/// is fatal to the session.
#[derive(Debug)]
pub(crate) struct PgStream {
    socket: Socket,
    read_buf: BytesMut,
    write_buf: BytesMut,
    timeout: Duration,
}

/// Bound an io future by the session timeout.
async fn timed<T>(limit: Duration, fut: impl Future<Output = io::Result<T>>) -> io::Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "stream operation timed out",
        )),
    }
}

impl PgStream {
    /// Open a socket, optionally upgrading to TLS via the SSLRequest
    /// preamble before any startup traffic.
    pub async fn connect(host: &str, port: u16, timeout: Duration, ssl: bool) -> Result<PgStream> {
        let mut socket = timed(timeout, Socket::connect(host, port)).await?;
        if ssl {
            socket = negotiate_ssl(socket, host, timeout).await?;
        }

        Ok(PgStream {
            socket,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            timeout,
        })
    }

    /// Whether the underlying socket is TLS upgraded.
    pub fn is_tls(&self) -> bool {
        self.socket.is_tls()
    }

    /// Gracefully close the stream with a best-effort Terminate.
    pub async fn close(&mut self) -> io::Result<()> {
        self.send(frontend::Terminate);
        self.flush().await?;
        self.socket.shutdown().await
    }

    /// Send a `CancelRequest` instead of a startup message, then hang up.
    ///
    /// Used by a second connection to cancel the query in progress on the
    /// session that owns the backend key.
    pub async fn cancel(mut self, process_id: i32, secret_key: i32) -> io::Result<()> {
        let mut buf = BytesMut::with_capacity(16);
        frontend::CancelRequest { process_id, secret_key }.write(&mut buf);
        timed(self.timeout, self.socket.write_all(&buf)).await?;
        self.socket.shutdown().await
    }
}

/// Write the 8-byte SSLRequest and read the single byte reply.
///
/// `S` upgrades the socket; `N` or anything else refuses. Exactly one byte
/// is read so no TLS handshake bytes are swallowed.
async fn negotiate_ssl(mut socket: Socket, host: &str, limit: Duration) -> Result<Socket> {
    let mut buf = BytesMut::with_capacity(8);
    frontend::SslRequest.write(&mut buf);
    timed(limit, socket.write_all(&buf)).await?;

    let mut reply = [0u8; 1];
    timed(limit, socket.read_exact(&mut reply)).await?;

    match reply[0] {
        b'S' => {
            tracing::debug!("server accepted ssl, starting tls handshake");
            Ok(socket.upgrade_tls(host).await?)
        }
        reply => Err(SslError::Refused { reply })?,
    }
}

impl PgTransport for PgStream {
    fn send<F: FrontendProtocol>(&mut self, message: F) {
        tracing::trace!("(F) '{}'", F::MSGTYPE as char);
        frontend::write(message, &mut self.write_buf);
    }

    fn send_startup(&mut self, startup: frontend::Startup<'_>) {
        tracing::trace!("(F) startup");
        startup.write(&mut self.write_buf);
    }

    async fn flush(&mut self) -> io::Result<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        let limit = self.timeout;
        timed(limit, self.socket.write_all_buf(&mut self.write_buf)).await
    }

    /// Block until one complete message is buffered, then split it out.
    ///
    /// Partial reads repeat until the whole length is satisfied; a stream
    /// that ends mid-message surfaces as [`io::ErrorKind::UnexpectedEof`].
    async fn recv(&mut self) -> Result<RawMessage> {
        let limit = self.timeout;
        loop {
            if let Some(mut header) = self.read_buf.get(..5) {
                let tag = header.get_u8();
                let len = header.get_i32() as usize;

                if self.read_buf.len() - 1/*tag*/ >= len {
                    self.read_buf.advance(5);
                    let body = self.read_buf.split_to(len - 4).freeze();
                    tracing::trace!("(B) '{}' {} bytes", tag as char, body.len());
                    return Ok(RawMessage { tag, body });
                }
                self.read_buf.reserve(1 + len - self.read_buf.len());
            } else {
                self.read_buf.reserve(DEFAULT_BUF_CAPACITY);
            }

            let n = timed(limit, self.socket.read_buf(&mut self.read_buf)).await?;
            if n == 0 {
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid message",
                ))?
            }
        }
    }
}
