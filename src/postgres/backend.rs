//! Postgres Backend Messages
use bytes::{Buf, Bytes};

use super::error::{ErrorFields, ProtocolError};
use crate::{common::ByteStr, ext::BytesExt, row::FieldDescription};

/// A type that can be decoded from a postgres backend message.
pub trait BackendProtocol: Sized {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError>;
}

/// Postgres backend messages.
#[derive(Debug)]
pub enum BackendMessage {
    Authentication(Authentication),
    BackendKeyData(BackendKeyData),
    BindComplete(BindComplete),
    CloseComplete(CloseComplete),
    CommandComplete(CommandComplete),
    DataRow(DataRow),
    EmptyQueryResponse(EmptyQueryResponse),
    ErrorResponse(ErrorResponse),
    NegotiateProtocolVersion(NegotiateProtocolVersion),
    NoData(NoData),
    NoticeResponse(NoticeResponse),
    NotificationResponse(NotificationResponse),
    ParameterDescription(ParameterDescription),
    ParameterStatus(ParameterStatus),
    ParseComplete(ParseComplete),
    PortalSuspended(PortalSuspended),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
}

macro_rules! match_backend {
    ($($name:ident,)*) => {
        impl BackendMessage {
            pub fn msgtype(&self) -> u8 {
                match self {
                    $(Self::$name(_) => $name::MSGTYPE,)*
                }
            }
        }
        impl BackendProtocol for BackendMessage {
            fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
                let message = match msgtype {
                    $($name::MSGTYPE => Self::$name(<$name as BackendProtocol>::decode(msgtype, body)?),)*
                    _ => return Err(ProtocolError::Unknown(msgtype)),
                };
                Ok(message)
            }
        }
    };
}

match_backend! {
    Authentication,
    BackendKeyData,
    BindComplete,
    CloseComplete,
    CommandComplete,
    DataRow,
    EmptyQueryResponse,
    ErrorResponse,
    NegotiateProtocolVersion,
    NoData,
    NoticeResponse,
    NotificationResponse,
    ParameterDescription,
    ParameterStatus,
    ParseComplete,
    PortalSuspended,
    ReadyForQuery,
    RowDescription,
}

macro_rules! assert_msgtype {
    ($self:ident,$typ:ident) => {
        if $self::MSGTYPE != $typ {
            return Err(ProtocolError::expected(stringify!($self), $typ, "message decode"))
        }
    };
}

/// Identifies the message as an authentication request.
///
/// The first four bytes of the payload are the authentication code.
#[derive(Debug)]
pub enum Authentication {
    /// Int32(0) Specifies that the authentication was successful.
    Ok,
    /// Int32(2) Specifies that Kerberos V5 authentication is required.
    KerberosV5,
    /// Int32(3) Specifies that a clear-text password is required.
    CleartextPassword,
    /// Int32(5) Specifies that an MD5-encrypted password is required.
    /// Byte4 The salt to use when encrypting the password.
    MD5Password {
        salt: [u8; 4],
    },
    /// Int32(7) Specifies that GSSAPI authentication is required.
    GSS,
    /// Int32(9) Specifies that SSPI authentication is required.
    SSPI,
    /// Int32(10) Specifies that SASL authentication is required.
    SASL,
    /// Any code this client does not recognize.
    Unknown(i32),
}

impl Authentication {
    pub const MSGTYPE: u8 = b'R';

    /// The wire authentication code.
    pub fn code(&self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::KerberosV5 => 2,
            Self::CleartextPassword => 3,
            Self::MD5Password { .. } => 5,
            Self::GSS => 7,
            Self::SSPI => 9,
            Self::SASL => 10,
            Self::Unknown(code) => *code,
        }
    }
}

impl BackendProtocol for Authentication {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(Authentication, msgtype);
        let auth = match body.get_i32() {
            0 => Authentication::Ok,
            2 => Authentication::KerberosV5,
            3 => Authentication::CleartextPassword,
            5 => {
                let mut salt = [0u8; 4];
                body.copy_to_slice(&mut salt);
                Authentication::MD5Password { salt }
            }
            7 => Authentication::GSS,
            9 => Authentication::SSPI,
            10 => Authentication::SASL,
            code => Authentication::Unknown(code),
        };
        Ok(auth)
    }
}

/// Identifies the message as cancellation key data.
///
/// The frontend must save these values if it wishes to be able to issue
/// CancelRequest messages later.
#[derive(Debug, Clone, Copy)]
pub struct BackendKeyData {
    /// The process ID of this backend.
    pub process_id: i32,
    /// The secret key of this backend.
    pub secret_key: i32,
}

impl BackendKeyData {
    pub const MSGTYPE: u8 = b'K';
}

impl BackendProtocol for BackendKeyData {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(BackendKeyData, msgtype);
        Ok(Self {
            process_id: body.get_i32(),
            secret_key: body.get_i32(),
        })
    }
}

/// Identifies the message as a run-time parameter status report.
#[derive(Debug)]
pub struct ParameterStatus {
    /// The name of the run-time parameter being reported.
    pub name: ByteStr,
    /// The current value of the parameter.
    pub value: ByteStr,
}

impl ParameterStatus {
    pub const MSGTYPE: u8 = b'S';
}

impl BackendProtocol for ParameterStatus {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(ParameterStatus, msgtype);
        Ok(Self {
            name: body.get_nul_bytestr()?,
            value: body.get_nul_bytestr()?,
        })
    }
}

/// Identifies the message as a command-completed response.
///
/// For an INSERT command, the tag is `INSERT oid rows`; for DELETE
/// `DELETE rows`; for UPDATE `UPDATE rows`; for SELECT or CREATE TABLE AS
/// `SELECT rows`; otherwise the bare command word.
#[derive(Debug)]
pub struct CommandComplete {
    /// The command tag. This is usually a single word that identifies which
    /// SQL command was completed, preserved verbatim.
    pub tag: ByteStr,
}

impl CommandComplete {
    pub const MSGTYPE: u8 = b'C';
}

impl BackendProtocol for CommandComplete {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(CommandComplete, msgtype);
        Ok(Self { tag: body.get_nul_bytestr()? })
    }
}

/// Identifies the message as a data row.
///
/// Column values are decoded lazily against the active row description.
#[derive(Debug)]
pub struct DataRow {
    /// The number of column values that follow (possibly zero).
    pub columns: u16,
    /// Per column: Int32 length (-1 denotes NULL), then that many bytes.
    pub body: Bytes,
}

impl DataRow {
    pub const MSGTYPE: u8 = b'D';
}

impl BackendProtocol for DataRow {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(DataRow, msgtype);
        let columns = body.get_u16();
        Ok(Self { columns, body })
    }
}

/// Identifies the message as a row description.
///
/// The contents of this message describe the column layout of the rows that
/// a DataRow message for each returned row will follow.
#[derive(Debug)]
pub struct RowDescription {
    pub fields: Vec<FieldDescription>,
}

impl RowDescription {
    pub const MSGTYPE: u8 = b'T';
}

impl BackendProtocol for RowDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(RowDescription, msgtype);
        // Int16 Specifies the number of fields in a row (can be zero).
        let len = body.get_u16();
        let mut fields = Vec::with_capacity(len as usize);
        for _ in 0..len {
            fields.push(FieldDescription::parse(&mut body)?);
        }
        Ok(Self { fields })
    }
}

/// Identifies the message as a parameter description.
///
/// Sent in response to the statement variant of Describe.
#[derive(Debug)]
pub struct ParameterDescription {
    /// The object ID of each parameter data type.
    pub oids: Vec<u32>,
}

impl ParameterDescription {
    pub const MSGTYPE: u8 = b't';
}

impl BackendProtocol for ParameterDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(ParameterDescription, msgtype);
        // Int16 The number of parameters used by the statement (can be zero).
        let len = body.get_u16();
        let mut oids = Vec::with_capacity(len as usize);
        for _ in 0..len {
            oids.push(body.get_u32());
        }
        Ok(Self { oids })
    }
}

/// Identifies the message as an error.
#[derive(Debug)]
pub struct ErrorResponse {
    pub fields: ErrorFields,
}

impl ErrorResponse {
    pub const MSGTYPE: u8 = b'E';

    pub fn into_error(self) -> super::DatabaseError {
        super::DatabaseError::new(self.fields)
    }
}

impl BackendProtocol for ErrorResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(ErrorResponse, msgtype);
        Ok(Self { fields: ErrorFields::parse(body)? })
    }
}

/// A warning message. The frontend should display the message.
#[derive(Debug)]
pub struct NoticeResponse {
    pub fields: ErrorFields,
}

impl NoticeResponse {
    pub const MSGTYPE: u8 = b'N';

    pub fn into_notice(self) -> super::Notice {
        super::Notice::new(self.fields)
    }
}

impl BackendProtocol for NoticeResponse {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(NoticeResponse, msgtype);
        Ok(Self { fields: ErrorFields::parse(body)? })
    }
}

/// Identifies the message as a notification from `LISTEN`/`NOTIFY`.
#[derive(Debug)]
pub struct NotificationResponse {
    /// The process ID of the notifying backend process.
    pub process_id: i32,
    /// The name of the channel that the notify has been raised on.
    pub channel: ByteStr,
    /// The "payload" string passed from the notifying process.
    pub payload: ByteStr,
}

impl NotificationResponse {
    pub const MSGTYPE: u8 = b'A';
}

impl BackendProtocol for NotificationResponse {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(NotificationResponse, msgtype);
        Ok(Self {
            process_id: body.get_i32(),
            channel: body.get_nul_bytestr()?,
            payload: body.get_nul_bytestr()?,
        })
    }
}

/// Identifies the message as a protocol version negotiation message.
#[derive(Debug)]
pub struct NegotiateProtocolVersion {
    /// Newest minor protocol version supported by the server for the major
    /// protocol version requested by the client.
    pub minor: i32,
    /// Number of protocol options not recognized by the server.
    pub unrecognized: i32,
    /// The option names, nul separated.
    pub options: Bytes,
}

impl NegotiateProtocolVersion {
    pub const MSGTYPE: u8 = b'v';
}

impl BackendProtocol for NegotiateProtocolVersion {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(NegotiateProtocolVersion, msgtype);
        Ok(Self {
            minor: body.get_i32(),
            unrecognized: body.get_i32(),
            options: body,
        })
    }
}

/// ReadyForQuery is sent whenever the backend is ready for a new query cycle.
#[derive(Debug)]
pub struct ReadyForQuery {
    /// Current backend transaction status indicator: `I` if idle,
    /// `T` if in a transaction block, `E` if in a failed transaction block.
    pub status: u8,
}

impl ReadyForQuery {
    pub const MSGTYPE: u8 = b'Z';
}

impl BackendProtocol for ReadyForQuery {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(ReadyForQuery, msgtype);
        Ok(Self { status: body.get_u8() })
    }
}

macro_rules! unit_msg {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
            $(#[$doc])*
            #[derive(Debug)]
            pub struct $name;

            impl $name {
                pub const MSGTYPE: u8 = $ty;
            }

            impl BackendProtocol for $name {
                fn decode(msgtype: u8, _: Bytes) -> Result<Self, ProtocolError> {
                    assert_msgtype!($name, msgtype);
                    Ok(Self)
                }
            }
    )*};
}

unit_msg! {
    /// Identifies the message as a Bind-complete indicator.
    struct BindComplete, b'2';

    /// Identifies the message as a Close-complete indicator.
    struct CloseComplete, b'3';

    /// Identifies the message as a response to an empty query string.
    ///
    /// This substitutes for CommandComplete.
    struct EmptyQueryResponse, b'I';

    /// Identifies the message as a no-data indicator.
    struct NoData, b'n';

    /// Identifies the message as a Parse-complete indicator.
    struct ParseComplete, b'1';

    /// Identifies the message as a portal-suspended indicator.
    ///
    /// Note this only appears if an Execute message's row-count limit was reached.
    struct PortalSuspended, b's';
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn authentication_codes() {
        let ok = Authentication::decode(b'R', Bytes::from_static(&[0, 0, 0, 0])).unwrap();
        assert!(matches!(ok, Authentication::Ok));

        let clear = Authentication::decode(b'R', Bytes::from_static(&[0, 0, 0, 3])).unwrap();
        assert!(matches!(clear, Authentication::CleartextPassword));

        let md5 = Authentication::decode(
            b'R',
            Bytes::from_static(&[0, 0, 0, 5, 0xAA, 0xBB, 0xCC, 0xDD]),
        )
        .unwrap();
        assert!(matches!(md5, Authentication::MD5Password { salt: [0xAA, 0xBB, 0xCC, 0xDD] }));

        let other = Authentication::decode(b'R', Bytes::from_static(&[0, 0, 0, 42])).unwrap();
        assert_eq!(other.code(), 42);
    }

    #[test]
    fn backend_key_data() {
        let mut buf = BytesMut::new();
        buf.put_i32(4243);
        buf.put_i32(-99);
        let key = BackendKeyData::decode(b'K', buf.freeze()).unwrap();
        assert_eq!(key.process_id, 4243);
        assert_eq!(key.secret_key, -99);
    }

    #[test]
    fn parameter_status() {
        let body = Bytes::from_static(b"client_encoding\0UTF8\0");
        let status = ParameterStatus::decode(b'S', body).unwrap();
        assert_eq!(status.name, "client_encoding");
        assert_eq!(status.value, "UTF8");
    }

    #[test]
    fn command_complete_tag_excludes_nul() {
        let tag = CommandComplete::decode(b'C', Bytes::from_static(b"SELECT 2\0")).unwrap();
        assert_eq!(tag.tag, "SELECT 2");
    }

    #[test]
    fn row_description_fields() {
        let mut buf = BytesMut::new();
        buf.put_u16(2);
        for (name, oid) in [("id", 23u32), ("name", 25u32)] {
            buf.put(name.as_bytes());
            buf.put_u8(0);
            buf.put_u32(0); // table oid
            buf.put_i16(0); // attribute number
            buf.put_u32(oid);
            buf.put_i16(4);
            buf.put_i32(-1);
            buf.put_i16(0);
        }
        let rd = RowDescription::decode(b'T', buf.freeze()).unwrap();
        assert_eq!(rd.fields.len(), 2);
        assert_eq!(rd.fields[0].name, "id");
        assert_eq!(rd.fields[0].type_oid, 23);
        assert_eq!(rd.fields[1].name, "name");
        assert_eq!(rd.fields[1].type_oid, 25);
    }

    #[test]
    fn parameter_description_oids() {
        let mut buf = BytesMut::new();
        buf.put_u16(2);
        buf.put_u32(23);
        buf.put_u32(25);
        let pd = ParameterDescription::decode(b't', buf.freeze()).unwrap();
        assert_eq!(pd.oids, vec![23, 25]);
    }

    #[test]
    fn notification() {
        let mut buf = BytesMut::new();
        buf.put_i32(77);
        buf.put(&b"jobs\0payload text\0"[..]);
        let n = NotificationResponse::decode(b'A', buf.freeze()).unwrap();
        assert_eq!(n.process_id, 77);
        assert_eq!(n.channel, "jobs");
        assert_eq!(n.payload, "payload text");
    }

    #[test]
    fn unknown_message_tag() {
        let err = BackendMessage::decode(b'@', Bytes::new()).unwrap_err();
        assert!(matches!(err, ProtocolError::Unknown(b'@')));
    }
}
