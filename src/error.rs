//! `postlet` error types.
use std::{backtrace::Backtrace, fmt, io};

use crate::{
    connection::ParseError,
    convert::DecodeError,
    postgres::{DatabaseError, ProtocolError},
};

/// A specialized [`Result`] type for `postlet` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `postlet` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// The server error, if this is one.
    pub fn as_database(&self) -> Option<&DatabaseError> {
        match &self.kind {
            ErrorKind::Database(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the session survives this error at a ReadyForQuery boundary.
    ///
    /// Server and decode errors are surfaced only after the stream is
    /// drained back to a command boundary; everything else closes the
    /// session.
    pub(crate) fn is_recoverable(&self) -> bool {
        matches!(self.kind, ErrorKind::Database(_) | ErrorKind::Decode(_))
    }

    pub(crate) fn with_context(mut self, context: impl Into<String>) -> Error {
        self.context = context.into();
        self
    }
}

/// All possible error kind from `postlet` library.
pub enum ErrorKind {
    /// Invalid or missing configuration, bad url, unsupported auth.
    Config(ConfigError),
    /// The byte stream stopped making sense; fatal to the session.
    Protocol(ProtocolError),
    /// Socket failure, timeout, or unexpected end of stream.
    Io(io::Error),
    /// An `ErrorResponse` reported by the server.
    Database(DatabaseError),
    /// SSL negotiation or TLS handshake failure.
    Ssl(SslError),
    /// A field payload could not be decoded.
    Decode(DecodeError),
}

/// Client misconfiguration detected before or during connection setup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}")]
    Url(#[from] ParseError),
    #[error("user required but not configured")]
    UserRequired,
    #[error("password required by server but not configured")]
    PasswordRequired,
    #[error("authentication method {code} not supported")]
    UnsupportedAuth { code: i32 },
    #[error("statement placeholder ${0} has no bound value")]
    Placeholder(usize),
}

/// SSL negotiation failure.
#[derive(Debug, thiserror::Error)]
pub enum SslError {
    #[error("SSL not honored (server replied {reply:#04x})")]
    Refused { reply: u8 },
    #[error("invalid tls server name: {0}")]
    ServerName(String),
    #[error("tls handshake failed: {0}")]
    Handshake(io::Error),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ConfigError>e => ErrorKind::Config(e));
from!(<ParseError>e => ErrorKind::Config(ConfigError::Url(e)));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<io::Error>e => ErrorKind::Io(e));
from!(<DatabaseError>e => ErrorKind::Database(e));
from!(<SslError>e => ErrorKind::Ssl(e));
from!(<DecodeError>e => ErrorKind::Decode(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Protocol(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::Ssl(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ssl_refusal_message() {
        let err = SslError::Refused { reply: b'N' };
        assert_eq!(err.to_string(), "SSL not honored (server replied 0x4e)");
    }

    #[test]
    fn only_boundary_errors_are_recoverable() {
        let database: Error = crate::postgres::DatabaseError::new(Default::default()).into();
        assert!(database.is_recoverable());

        let protocol: Error = ProtocolError::MissingNul.into();
        assert!(!protocol.is_recoverable());

        let timeout: Error = io::Error::new(io::ErrorKind::TimedOut, "timed out").into();
        assert!(!timeout.is_recoverable());
    }
}
