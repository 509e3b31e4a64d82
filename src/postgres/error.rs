//! Protocol and server reported errors.
use bytes::{Buf, Bytes};
use std::fmt;

use crate::{common::ByteStr, ext::BytesExt};

/// An error when translating buffer from postgres.
///
/// Any of these means the stream can no longer be trusted to be at a message
/// boundary, so they are fatal to the session.
pub enum ProtocolError {
    Unexpected {
        expect: Option<&'static str>,
        found: u8,
        phase: &'static str,
    },
    Unknown(u8),
    RowArity { expect: usize, got: usize },
    MissingNul,
    NonUtf8(std::str::Utf8Error),
}

impl ProtocolError {
    pub(crate) fn unexpected(found: u8, phase: &'static str) -> ProtocolError {
        Self::Unexpected { expect: None, found, phase }
    }

    pub(crate) fn expected(expect: &'static str, found: u8, phase: &'static str) -> ProtocolError {
        Self::Unexpected { expect: Some(expect), found, phase }
    }
}

fn fmt_tag(f: &mut fmt::Formatter<'_>, tag: u8) -> fmt::Result {
    if tag.is_ascii_graphic() {
        write!(f, "'{}'", tag as char)
    } else {
        write!(f, "{tag:#04x}")
    }
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unexpected { expect, found, phase } => {
                f.write_str("unexpected message ")?;
                fmt_tag(f, *found)?;
                write!(f, " during {phase}")?;
                if let Some(expect) = expect {
                    write!(f, " (expected {expect})")?;
                }
                Ok(())
            }
            Self::Unknown(tag) => {
                f.write_str("unknown message type ")?;
                fmt_tag(f, *tag)
            }
            Self::RowArity { expect, got } => {
                write!(f, "DataRow carries {got} fields, RowDescription announced {expect}")
            }
            Self::MissingNul => f.write_str("string field is not nul terminated"),
            Self::NonUtf8(e) => write!(f, "non utf8 protocol string: {e}"),
        }
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// The identified fields shared by `ErrorResponse` and `NoticeResponse`.
///
/// The message body consists of one or more identified fields, followed by a
/// zero byte as a terminator. Fields can appear in any order.
///
/// For each field there is the following:
///
/// `Byte1` A code identifying the field type; if zero, this is the message
/// terminator and no string follows. Since more field types might be added in
/// future, frontends should silently ignore fields of unrecognized type.
///
/// `String` The field value.
///
/// <https://www.postgresql.org/docs/current/protocol-error-fields.html>
#[derive(Debug, Clone, Default)]
pub struct ErrorFields {
    fields: Vec<(u8, ByteStr)>,
}

impl ErrorFields {
    pub(crate) fn parse(mut body: Bytes) -> Result<Self, ProtocolError> {
        let mut fields = Vec::new();
        loop {
            if body.is_empty() {
                break;
            }
            let code = body.get_u8();
            if code == 0 {
                break;
            }
            fields.push((code, body.get_nul_bytestr()?));
        }
        Ok(Self { fields })
    }

    /// Lookup a field by its single byte code, e.g. `b'M'` for the human message.
    pub fn get(&self, code: u8) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, v)| v.as_str())
    }

    /// All fields in server order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
        self.fields.iter().map(|(c, v)| (*c, v.as_str()))
    }

    /// Severity, e.g. `ERROR`, `FATAL`, `WARNING`, `NOTICE`.
    pub fn severity(&self) -> &str {
        self.get(b'S').unwrap_or("ERROR")
    }

    /// The primary human-readable message.
    pub fn message(&self) -> &str {
        self.get(b'M').unwrap_or_default()
    }

    /// The SQLSTATE code, five characters.
    pub fn sqlstate(&self) -> &str {
        self.get(b'C').unwrap_or_default()
    }

    /// Optional secondary message with more detail.
    pub fn detail(&self) -> Option<&str> {
        self.get(b'D')
    }

    /// Optional suggestion what to do about the problem.
    pub fn hint(&self) -> Option<&str> {
        self.get(b'H')
    }

    /// Error cursor position as an index into the original query string.
    pub fn position(&self) -> Option<&str> {
        self.get(b'P')
    }
}

impl fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity(), self.message())?;
        let code = self.sqlstate();
        if !code.is_empty() {
            write!(f, " ({code})")?;
        }
        if let Some(detail) = self.detail() {
            write!(f, "\ndetail: {detail}")?;
        }
        if let Some(hint) = self.hint() {
            write!(f, "\nhint: {hint}")?;
        }
        Ok(())
    }
}

/// An error reported by the server via `ErrorResponse`.
pub struct DatabaseError {
    fields: ErrorFields,
}

impl DatabaseError {
    pub(crate) fn new(fields: ErrorFields) -> Self {
        Self { fields }
    }

    /// The full field map.
    pub fn fields(&self) -> &ErrorFields {
        &self.fields
    }

    /// The primary human-readable message.
    pub fn message(&self) -> &str {
        self.fields.message()
    }

    /// The SQLSTATE code delivered as field `C`.
    pub fn sqlstate(&self) -> &str {
        self.fields.sqlstate()
    }

    /// Severity, e.g. `ERROR` or `FATAL`.
    pub fn severity(&self) -> &str {
        self.fields.severity()
    }
}

impl std::error::Error for DatabaseError { }

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fields.fmt(f)
    }
}

impl fmt::Debug for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// A warning reported by the server via `NoticeResponse`.
///
/// Notices never interrupt the protocol flow; the client surfaces them
/// through [`tracing`] and carries on.
pub struct Notice {
    fields: ErrorFields,
}

impl Notice {
    pub(crate) fn new(fields: ErrorFields) -> Self {
        Self { fields }
    }

    /// The full field map.
    pub fn fields(&self) -> &ErrorFields {
        &self.fields
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fields.fmt(f)
    }
}

impl fmt::Debug for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::BufMut;

    fn payload(fields: &[(u8, &str)]) -> Bytes {
        let mut buf = bytes::BytesMut::new();
        for (code, value) in fields {
            buf.put_u8(*code);
            buf.put(value.as_bytes());
            buf.put_u8(0);
        }
        buf.put_u8(0);
        buf.freeze()
    }

    #[test]
    fn parse_error_fields() {
        let body = payload(&[
            (b'S', "ERROR"),
            (b'C', "22012"),
            (b'M', "division by zero"),
        ]);
        let fields = ErrorFields::parse(body).unwrap();
        assert_eq!(fields.severity(), "ERROR");
        assert_eq!(fields.sqlstate(), "22012");
        assert_eq!(fields.message(), "division by zero");
        assert_eq!(fields.detail(), None);
    }

    #[test]
    fn unknown_fields_are_preserved() {
        let body = payload(&[(b'M', "boom"), (b'X', "future field")]);
        let fields = ErrorFields::parse(body).unwrap();
        assert_eq!(fields.get(b'X'), Some("future field"));
    }

    #[test]
    fn display_carries_sqlstate() {
        let body = payload(&[(b'S', "ERROR"), (b'C', "42P01"), (b'M', "no such table")]);
        let err = DatabaseError::new(ErrorFields::parse(body).unwrap());
        assert_eq!(err.to_string(), "ERROR: no such table (42P01)");
    }
}
