//! Postgres Frontend Messages
//!
//! All struct fields here mirror the actual message sent to postgres.
use bytes::{BufMut, BytesMut};

use crate::ext::{BufMutExt, StrExt, UsizeExt};

// Frontend messages not needed by this client:
// CopyData('d')
// CopyDone('c')
// CopyFail('f')
// FunctionCall('F')
// GSSENCRequest
// SASLInitialResponse('p')
// SASLResponse('p')

/// Write a frontend message to `buf`.
///
/// Sends are buffered; several messages can be written back to back
/// (e.g. `Parse`, `Describe`, `Sync`) and flushed in one syscall.
pub fn write<F: FrontendProtocol>(msg: F, buf: &mut BytesMut) {
    // msgtype + length
    const PREFIX: usize = 1 + 4;

    let size = msg.size_hint();
    buf.reserve(PREFIX + size as usize);

    let offset = buf.len();
    buf.put_u8(F::MSGTYPE);
    buf.put_u32(4 + size);

    msg.encode(&mut *buf);

    assert_eq!(
        buf.len() - offset,
        PREFIX + size as usize,
        "[BUG] Frontend Message body not equal to size hint"
    );
}

/// A type which can be encoded into postgres frontend message.
///
/// For historical reasons, the very first message sent by the client (the startup message)
/// has no initial message-type byte.
///
/// Thus, [`Startup`], [`SslRequest`] and [`CancelRequest`] do not implement
/// [`FrontendProtocol`].
pub trait FrontendProtocol {
    /// message type
    const MSGTYPE: u8;

    /// size of the main body
    ///
    /// note that this is *only* the size of main body as oppose of actual postgres message
    fn size_hint(&self) -> u32;

    /// write the main body of the message
    ///
    /// writing less or past the hinted length results in panic
    fn encode(self, buf: impl BufMut);
}

/// Postgres Startup frontend message.
///
/// For historical reasons, the very first message sent by the client (the startup message)
/// has no initial message-type byte.
#[derive(Debug)]
pub struct Startup<'a> {
    /// The database user name to connect as. Required; there is no default.
    pub user: &'a str,
    /// The database to connect to. Defaults to the user name.
    pub database: Option<&'a str>,
}

impl Startup<'_> {
    pub fn write(self, buf: &mut BytesMut) {
        let offset = buf.len();

        // Length of message contents in bytes, including self.
        // reserve 4 bytes for length
        buf.put_u32(0);

        // Int32(196608)
        // The protocol version number.
        // The most significant 16 bits are the major version number (3 for the protocol described here).
        // The least significant 16 bits are the minor version number (0 for the protocol described here).
        buf.put_i32(196608);

        // The protocol version number is followed by one or more pairs of
        // parameter name and value strings.

        buf.put_nul_string("user");
        buf.put_nul_string(self.user);

        if let Some(db) = self.database {
            buf.put_nul_string("database");
            buf.put_nul_string(db);
        }

        // A zero byte is required as a terminator after the last name/value pair.
        buf.put_u8(b'\0');

        // write the length
        let mut written_buf = &mut buf[offset..];
        written_buf.put_u32(written_buf.len().to_u32());
    }
}

/// Request SSL negotiation before startup.
///
/// The server responds with a single byte containing `S` or `N`; there is no
/// length prefixed reply.
///
/// <https://www.postgresql.org/docs/current/protocol-flow.html#PROTOCOL-FLOW-SSL>
#[derive(Debug)]
pub struct SslRequest;

impl SslRequest {
    /// Int32(80877103), chosen to contain 1234 in the most significant 16
    /// bits and 5679 in the least significant 16 bits.
    pub const CODE: u32 = 80877103;

    pub fn write(self, buf: &mut BytesMut) {
        buf.put_u32(8);
        buf.put_u32(Self::CODE);
    }
}

/// Cancel an in-progress query from a separate connection.
///
/// Sent instead of a startup message, using the process id and secret key
/// captured from `BackendKeyData`.
#[derive(Debug)]
pub struct CancelRequest {
    /// The process ID of the target backend.
    pub process_id: i32,
    /// The secret key for the target backend.
    pub secret_key: i32,
}

impl CancelRequest {
    /// Int32(80877102), chosen to contain 1234 in the most significant 16
    /// bits and 5678 in the least significant 16 bits.
    pub const CODE: u32 = 80877102;

    pub fn write(self, buf: &mut BytesMut) {
        buf.put_u32(16);
        buf.put_u32(Self::CODE);
        buf.put_i32(self.process_id);
        buf.put_i32(self.secret_key);
    }
}

/// Password response to a cleartext or MD5 authentication request.
#[derive(Debug)]
pub struct PasswordMessage<'a> {
    /// The password (encrypted, if requested).
    pub password: &'a str,
}

impl FrontendProtocol for PasswordMessage<'_> {
    const MSGTYPE: u8 = b'p';

    fn size_hint(&self) -> u32 {
        self.password.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.password);
    }
}

/// Identifies the message as a simple query.
pub struct Query<'a> {
    /// The query string itself. May contain multiple SQL statements
    /// separated by semicolons.
    pub sql: &'a str,
}

impl FrontendProtocol for Query<'_> {
    const MSGTYPE: u8 = b'Q';

    fn size_hint(&self) -> u32 {
        self.sql.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.sql);
    }
}

/// Identifies the message as a Parse command.
pub struct Parse<'a> {
    /// Prepared statement name (an empty string selects the unnamed prepared statement).
    pub statement: &'a str,
    /// The query string to be parsed.
    pub sql: &'a str,
    /// Object IDs of the parameter data types.
    ///
    /// Note that this is not an indication of the number of parameters that might appear in the query string,
    /// only the number that the frontend wants to prespecify types for.
    /// An empty slice leaves every type to be inferred by the server.
    pub param_oids: &'a [u32],
}

impl FrontendProtocol for Parse<'_> {
    const MSGTYPE: u8 = b'P';

    fn size_hint(&self) -> u32 {
        self.statement.nul_string_len()
            + self.sql.nul_string_len()
            + 2
            + self.param_oids.len().to_u32() * 4
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.statement);
        buf.put_nul_string(self.sql);
        buf.put_u16(self.param_oids.len().to_u16());
        for oid in self.param_oids {
            buf.put_u32(*oid);
        }
    }
}

/// Identifies the message as a Bind command.
///
/// All parameters and all result columns use the text format: both format
/// code lists are left empty, which selects the default (text) for
/// everything.
pub struct Bind<'a> {
    /// The name of the destination portal (an empty string selects the unnamed portal).
    pub portal: &'a str,
    /// The name of the source prepared statement.
    pub statement: &'a str,
    /// Text-format parameter values; `None` binds NULL (wire length -1).
    pub params: &'a [Option<String>],
}

impl FrontendProtocol for Bind<'_> {
    const MSGTYPE: u8 = b'B';

    fn size_hint(&self) -> u32 {
        self.portal.nul_string_len()
            + self.statement.nul_string_len()
            // parameter format code count (0: all text)
            + 2
            // parameter count
            + 2
            + self.params.iter().fold(0, |acc, p| {
                acc + 4 + p.as_ref().map_or(0, |v| v.len().to_u32())
            })
            // result format code count (0: all text)
            + 2
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.portal);
        buf.put_nul_string(self.statement);
        buf.put_u16(0);
        buf.put_u16(self.params.len().to_u16());
        for param in self.params {
            match param {
                // The length of the parameter value, in bytes. As a special
                // case, -1 indicates a NULL parameter value; no value bytes
                // follow in the NULL case.
                None => buf.put_i32(-1),
                Some(value) => {
                    buf.put_i32(value.len().to_u32() as i32);
                    buf.put(value.as_bytes());
                }
            }
        }
        buf.put_u16(0);
    }
}

/// Identifies the message as a Describe command.
pub struct Describe<'a> {
    /// 'S' to describe a prepared statement; or 'P' to describe a portal.
    pub kind: u8,
    /// The name of the prepared statement or portal to describe
    /// (an empty string selects the unnamed prepared statement or portal).
    pub name: &'a str,
}

impl FrontendProtocol for Describe<'_> {
    const MSGTYPE: u8 = b'D';

    fn size_hint(&self) -> u32 {
        1 + self.name.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(self.kind);
        buf.put_nul_string(self.name);
    }
}

/// Identifies the message as an Execute command.
pub struct Execute<'a> {
    /// The name of the portal to execute (an empty string selects the unnamed portal).
    pub portal: &'a str,
    /// Maximum number of rows to return, if portal contains a query that returns rows
    /// (ignored otherwise). Zero denotes "no limit".
    pub max_rows: i32,
}

impl FrontendProtocol for Execute<'_> {
    const MSGTYPE: u8 = b'E';

    fn size_hint(&self) -> u32 {
        self.portal.nul_string_len() + 4
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.portal);
        buf.put_i32(self.max_rows);
    }
}

/// Identifies the message as a Close command.
pub struct Close<'a> {
    /// 'S' to close a prepared statement; or 'P' to close a portal.
    pub variant: u8,
    /// The name of the prepared statement or portal to close.
    pub name: &'a str,
}

impl FrontendProtocol for Close<'_> {
    const MSGTYPE: u8 = b'C';

    fn size_hint(&self) -> u32 {
        1 + self.name.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_u8(self.variant);
        buf.put_nul_string(self.name);
    }
}

/// Identifies the message as a Sync command.
///
/// Closes the current extended-query cycle; the server answers with
/// `ReadyForQuery` once the cycle is fully processed.
pub struct Sync;

impl FrontendProtocol for Sync {
    const MSGTYPE: u8 = b'S';

    fn size_hint(&self) -> u32 { 0 }

    fn encode(self, _: impl BufMut) { }
}

/// Identifies the message as a termination.
///
/// Sent on graceful close; the server then closes its side of the
/// connection.
pub struct Terminate;

impl FrontendProtocol for Terminate {
    const MSGTYPE: u8 = b'X';

    fn size_hint(&self) -> u32 { 0 }

    fn encode(self, _: impl BufMut) { }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Every tagged message must carry exactly one tag byte followed by a
    /// length equal to payload size + 4.
    fn assert_frame(buf: &[u8], tag: u8) {
        assert_eq!(buf[0], tag);
        let len = u32::from_be_bytes(buf[1..5].try_into().unwrap());
        assert_eq!(len as usize, buf.len() - 1);
    }

    #[test]
    fn query_frame() {
        let mut buf = BytesMut::new();
        write(Query { sql: "SELECT 1" }, &mut buf);
        assert_frame(&buf, b'Q');
        assert_eq!(&buf[5..], b"SELECT 1\0");
    }

    #[test]
    fn password_frame() {
        let mut buf = BytesMut::new();
        write(PasswordMessage { password: "sekret" }, &mut buf);
        assert_frame(&buf, b'p');
        assert_eq!(&buf[5..], b"sekret\0");
    }

    #[test]
    fn startup_layout() {
        let mut buf = BytesMut::new();
        Startup { user: "u", database: Some("db") }.write(&mut buf);

        // length prefix covers the whole message, there is no tag byte
        let len = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        assert_eq!(len as usize, buf.len());
        // protocol 3.0
        assert_eq!(&buf[4..8], &[0x00, 0x03, 0x00, 0x00]);
        assert_eq!(&buf[8..], b"user\0u\0database\0db\0\0");
    }

    #[test]
    fn startup_without_database() {
        let mut buf = BytesMut::new();
        Startup { user: "u", database: None }.write(&mut buf);
        assert_eq!(&buf[8..], b"user\0u\0\0");
    }

    #[test]
    fn ssl_request_layout() {
        let mut buf = BytesMut::new();
        SslRequest.write(&mut buf);
        assert_eq!(&buf[..], &[0x00, 0x00, 0x00, 0x08, 0x04, 0xD2, 0x16, 0x2F]);
    }

    #[test]
    fn cancel_request_layout() {
        let mut buf = BytesMut::new();
        CancelRequest { process_id: 7, secret_key: -2 }.write(&mut buf);
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[0..4], &[0x00, 0x00, 0x00, 0x10]);
        assert_eq!(u32::from_be_bytes(buf[4..8].try_into().unwrap()), CancelRequest::CODE);
        assert_eq!(i32::from_be_bytes(buf[8..12].try_into().unwrap()), 7);
        assert_eq!(i32::from_be_bytes(buf[12..16].try_into().unwrap()), -2);
    }

    #[test]
    fn parse_describe_sync_coalesce() {
        let mut buf = BytesMut::new();
        write(Parse { statement: "s1", sql: "SELECT $1", param_oids: &[23] }, &mut buf);
        write(Describe { kind: b'S', name: "s1" }, &mut buf);
        write(Sync, &mut buf);

        // three well formed frames back to back in one buffer
        let mut tags = Vec::new();
        let mut offset = 0;
        while offset < buf.len() {
            tags.push(buf[offset]);
            let len = u32::from_be_bytes(buf[offset + 1..offset + 5].try_into().unwrap());
            offset += 1 + len as usize;
        }
        assert_eq!(offset, buf.len());
        assert_eq!(tags, vec![b'P', b'D', b'S']);
    }

    #[test]
    fn bind_null_and_text_params() {
        let mut buf = BytesMut::new();
        let params = [Some(String::from("42")), None];
        write(Bind { portal: "", statement: "s1", params: &params }, &mut buf);

        assert_frame(&buf, b'B');
        let body = &buf[5..];
        // portal nul, statement nul
        assert_eq!(&body[..4], b"\0s1\0");
        // no format codes, two parameters
        assert_eq!(&body[4..8], &[0, 0, 0, 2]);
        // first param: length 2, "42"
        assert_eq!(&body[8..14], &[0, 0, 0, 2, b'4', b'2']);
        // second param: NULL sentinel length
        assert_eq!(&body[14..18], &[0xFF, 0xFF, 0xFF, 0xFF]);
        // no result format codes
        assert_eq!(&body[18..], &[0, 0]);
    }

    #[test]
    fn terminate_frame() {
        let mut buf = BytesMut::new();
        write(Terminate, &mut buf);
        assert_eq!(&buf[..], &[b'X', 0, 0, 0, 4]);
    }
}
