//! The [`PgTransport`] trait.
use bytes::Bytes;
use std::io;

use crate::{
    Result,
    ext::FmtExt,
    postgres::{FrontendProtocol, frontend},
};

/// One framed backend message: tag byte plus payload.
///
/// Dispatch by tag and typed decoding happen in the protocol engine; the
/// transport only guarantees that `body` holds the complete payload.
pub(crate) struct RawMessage {
    pub tag: u8,
    pub body: Bytes,
}

impl std::fmt::Debug for RawMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawMessage")
            .field("tag", &(self.tag as char))
            .field("body", &self.body.lossy())
            .finish()
    }
}

/// A buffered stream which can send and receive postgres messages.
///
/// The live implementation is the session stream; tests drive the protocol
/// engine through a scripted implementation instead.
pub(crate) trait PgTransport {
    /// Buffer a message to be sent to the backend.
    ///
    /// Nothing is written to the underlying io until [`flush`][1]; small
    /// message sequences like `Parse`/`Describe`/`Sync` coalesce into one
    /// write.
    ///
    /// [1]: PgTransport::flush
    fn send<F: FrontendProtocol>(&mut self, message: F);

    /// Buffer the [`Startup`][1] message.
    ///
    /// For historical reasons, the very first message sent by the client has
    /// no initial message-type byte, so [`Startup`][1] does not implement
    /// [`FrontendProtocol`].
    ///
    /// [1]: frontend::Startup
    fn send_startup(&mut self, startup: frontend::Startup<'_>);

    /// Write all buffered messages to the underlying io.
    fn flush(&mut self) -> impl Future<Output = io::Result<()>>;

    /// Receive one complete backend message.
    fn recv(&mut self) -> impl Future<Output = Result<RawMessage>>;
}

impl<P> PgTransport for &mut P
where
    P: PgTransport,
{
    fn send<F: FrontendProtocol>(&mut self, message: F) {
        P::send(self, message);
    }

    fn send_startup(&mut self, startup: frontend::Startup<'_>) {
        P::send_startup(self, startup);
    }

    fn flush(&mut self) -> impl Future<Output = io::Result<()>> {
        P::flush(self)
    }

    fn recv(&mut self) -> impl Future<Output = Result<RawMessage>> {
        P::recv(self)
    }
}
