use bytes::{Buf, BufMut, Bytes};

use crate::{common::ByteStr, postgres::ProtocolError};

/// Integer signess in postgres docs is awful.
pub trait UsizeExt {
    /// Length is `usize` in rust, while sometime postgres want `u32`,
    /// this will panic when overflow instead of wrapping.
    fn to_u32(self) -> u32;
    /// Length is `usize` in rust, while sometime postgres want `u16`,
    /// this will panic when overflow instead of wrapping.
    fn to_u16(self) -> u16;
}

/// Nul string operation.
pub trait StrExt {
    /// String length plus nul (1).
    fn nul_string_len(&self) -> u32;
}

/// Nul string operation in [`BufMut`].
pub trait BufMutExt {
    /// Write string and nul termination.
    fn put_nul_string(&mut self, string: &str);
}

/// Nul string operation in [`Bytes`].
pub trait BytesExt {
    /// Read a nul terminated string.
    ///
    /// Using [`ByteStr`] avoid allocating [`Vec`] as it required for [`String::from_utf8`].
    fn get_nul_bytestr(&mut self) -> Result<ByteStr, ProtocolError>;
}

/// Helper trait to [`Display`][std::fmt::Display] bytes.
pub trait FmtExt {
    /// Lossy [`Display`][std::fmt::Display] bytes.
    fn lossy(&self) -> LossyFmt<'_>;
}

/// Lossy [`Display`][std::fmt::Display] implementation for bytes.
pub struct LossyFmt<'a>(pub &'a [u8]);

impl UsizeExt for usize {
    fn to_u32(self) -> u32 {
        self.try_into().expect("message size too large for protocol")
    }

    fn to_u16(self) -> u16 {
        self.try_into().expect("message size too large for protocol")
    }
}

impl StrExt for str {
    fn nul_string_len(&self) -> u32 {
        self.len().to_u32() + 1/* nul */
    }
}

impl<B: BufMut> BufMutExt for B {
    fn put_nul_string(&mut self, string: &str) {
        self.put(string.as_bytes());
        self.put_u8(b'\0');
    }
}

impl BytesExt for Bytes {
    fn get_nul_bytestr(&mut self) -> Result<ByteStr, ProtocolError> {
        let end = self
            .iter()
            .position(|e| matches!(e, b'\0'))
            .ok_or(ProtocolError::MissingNul)?;
        let me = self.split_to(end);
        Buf::advance(self, 1); // nul
        ByteStr::from_utf8(me).map_err(ProtocolError::NonUtf8)
    }
}

impl FmtExt for [u8] {
    fn lossy(&self) -> LossyFmt<'_> {
        LossyFmt(self)
    }
}

impl std::fmt::Display for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in self.0 {
            if b.is_ascii_graphic() || b.is_ascii_whitespace() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:x}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn nul_string_roundtrip() {
        let mut buf = BytesMut::new();
        buf.put_nul_string("TimeZone");
        buf.put_nul_string("UTC");
        let mut bytes = buf.freeze();
        assert_eq!(bytes.get_nul_bytestr().unwrap(), "TimeZone");
        assert_eq!(bytes.get_nul_bytestr().unwrap(), "UTC");
        assert!(bytes.is_empty());
    }

    #[test]
    fn missing_nul() {
        let mut bytes = Bytes::from_static(b"no terminator");
        assert!(matches!(
            bytes.get_nul_bytestr(),
            Err(ProtocolError::MissingNul)
        ));
    }
}
