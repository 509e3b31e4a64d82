//! Decoding server field payloads into [`Value`]s.
//!
//! A [`Converter`] is a registry mapping type oid to a named decoder. A
//! default table covers the builtin scalar types plus their common array
//! forms; server-defined enum types are installed at runtime since their
//! oids are assigned by `CREATE TYPE`.
//!
//! The converter is built during session startup, once `client_encoding`
//! and `TimeZone` are known from the parameter status messages.
use bytes::Bytes;
use std::collections::HashMap;

use crate::{
    common::ByteStr,
    postgres::{Oid, PgFormat, ProtocolError, backend::DataRow, oid},
    row::FieldDescription,
    value::{Point, Value},
};

use time::format_description::{BorrowedFormatItem as I, Component as C, modifier};

/// An error while decoding a field payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("non utf8 payload for {ty}")]
    NonUtf8 { ty: &'static str },
    #[error("invalid {ty} payload: {input}")]
    Invalid { ty: &'static str, input: String },
}

fn invalid(ty: &'static str, input: &[u8]) -> DecodeError {
    DecodeError::Invalid {
        ty,
        input: String::from_utf8_lossy(input).into_owned(),
    }
}

/// The session character encoding, from `client_encoding`.
///
/// UTF8 and SQL_ASCII are decoded to strings; any other encoding is stubbed,
/// string-typed payloads surface as [`Value::Raw`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Ascii,
    Other(ByteStr),
}

impl Encoding {
    fn from_name(name: &str) -> Encoding {
        let normalized: String = name
            .chars()
            .filter(|c| !matches!(c, '-' | '_'))
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match normalized.as_str() {
            "UTF8" => Encoding::Utf8,
            "SQLASCII" => Encoding::Ascii,
            _ => Encoding::Other(ByteStr::copy_from_str(name)),
        }
    }

    fn decode_text(&self, bytes: Bytes) -> Result<Value, DecodeError> {
        match self {
            Encoding::Utf8 => ByteStr::from_utf8(bytes)
                .map(Value::Text)
                .map_err(|_| DecodeError::NonUtf8 { ty: "text" }),
            Encoding::Ascii if bytes.is_ascii() => {
                // ascii is a utf8 subset
                Ok(Value::Text(ByteStr::from_utf8(bytes).expect("ascii checked")))
            }
            _ => Ok(Value::Raw(bytes)),
        }
    }
}

type DecodeFn = fn(&Converter, PgFormat, Bytes) -> Result<Value, DecodeError>;

/// A decoder tagged by its textual type name for diagnostics.
#[derive(Debug, Clone)]
pub(crate) struct Decoder {
    name: ByteStr,
    decode: DecodeFn,
}

/// Registry mapping type oid to decoder, bound to the session encoding and
/// timezone.
#[derive(Debug, Clone)]
pub struct Converter {
    decoders: HashMap<Oid, Decoder>,
    encoding: Encoding,
    timezone: Option<ByteStr>,
}

impl Converter {
    /// A converter with the default decoder table, UTF8, and no timezone.
    pub(crate) fn new() -> Converter {
        Converter {
            decoders: default_decoders(),
            encoding: Encoding::Utf8,
            timezone: None,
        }
    }

    /// Bind the encoding and timezone reported by the server during startup.
    pub(crate) fn initialize_from(params: &HashMap<ByteStr, ByteStr>) -> Converter {
        let mut me = Converter::new();
        if let Some(name) = params.get("client_encoding") {
            me.encoding = Encoding::from_name(name);
        }
        me.timezone = params.get("TimeZone").cloned();
        me
    }

    /// The active session encoding.
    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    /// The session `TimeZone`, as reported by the server.
    ///
    /// `timestamptz` payloads carry their own utc offset; the zone name is
    /// kept for diagnostics.
    pub fn timezone(&self) -> Option<&str> {
        self.timezone.as_deref()
    }

    /// The registered type name for an oid, e.g. `"int4"`.
    pub fn type_name(&self, oid: Oid) -> Option<&str> {
        self.decoders.get(&oid).map(|d| d.name.as_str())
    }

    /// Install a decoder for a server-defined enum type.
    pub(crate) fn install_enum(&mut self, oid: Oid, typname: ByteStr) {
        self.decoders.insert(oid, Decoder { name: typname, decode: decode_enum });
    }

    /// Decode one non-NULL field payload.
    ///
    /// Unregistered oids surface as [`Value::Raw`]; NULL never reaches here.
    pub fn decode(&self, field: &FieldDescription, body: Bytes) -> Result<Value, DecodeError> {
        self.decode_oid(field.type_oid, field.format, body)
    }

    pub(crate) fn decode_oid(
        &self,
        oid: Oid,
        format: PgFormat,
        body: Bytes,
    ) -> Result<Value, DecodeError> {
        match self.decoders.get(&oid) {
            Some(decoder) => (decoder.decode)(self, format, body),
            None => Ok(Value::Raw(body)),
        }
    }

    /// Decode a `DataRow` against its row description.
    ///
    /// The announced column count must match the description arity. A wire
    /// length of `0xFFFFFFFF` inserts [`Value::Null`] without invoking any
    /// decoder.
    pub(crate) fn decode_row(
        &self,
        fields: &[FieldDescription],
        row: DataRow,
    ) -> crate::Result<Vec<Value>> {
        use bytes::Buf;

        if row.columns as usize != fields.len() {
            Err(ProtocolError::RowArity {
                expect: fields.len(),
                got: row.columns as usize,
            })?
        }

        let mut body = row.body;
        let mut values = Vec::with_capacity(fields.len());
        for field in fields {
            let len = body.get_i32();
            if len == -1 {
                values.push(Value::Null);
                continue;
            }
            let payload = body.split_to(len as usize);
            values.push(self.decode(field, payload)?);
        }
        Ok(values)
    }
}

macro_rules! decoders {
    ($($oid:expr => $name:literal, $f:ident;)*) => {{
        let mut map = HashMap::new();
        $(map.insert($oid, Decoder { name: ByteStr::from_static($name), decode: $f });)*
        map
    }};
}

fn default_decoders() -> HashMap<Oid, Decoder> {
    decoders! {
        oid::BOOL => "bool", decode_bool;
        oid::BYTEA => "bytea", decode_bytea;
        oid::CHAR => "char", decode_text;
        oid::NAME => "name", decode_text;
        oid::INT8 => "int8", decode_int8;
        oid::INT2 => "int2", decode_int2;
        oid::INT4 => "int4", decode_int4;
        oid::TEXT => "text", decode_text;
        oid::OID => "oid", decode_oid_type;
        oid::JSON => "json", decode_json;
        oid::POINT => "point", decode_point;
        oid::FLOAT4 => "float4", decode_float4;
        oid::FLOAT8 => "float8", decode_float8;
        oid::BPCHAR => "bpchar", decode_text;
        oid::VARCHAR => "varchar", decode_text;
        oid::DATE => "date", decode_date;
        oid::TIME => "time", decode_time;
        oid::TIMESTAMP => "timestamp", decode_timestamp;
        oid::TIMESTAMPTZ => "timestamptz", decode_timestamptz;
        oid::INTERVAL => "interval", decode_interval;
        oid::TIMETZ => "timetz", decode_timetz;
        oid::NUMERIC => "numeric", decode_numeric;
        oid::UUID => "uuid", decode_uuid;
        oid::JSONB => "jsonb", decode_jsonb;

        oid::BOOL_ARRAY => "bool[]", decode_bool_array;
        oid::NAME_ARRAY => "name[]", decode_name_array;
        oid::INT2_ARRAY => "int2[]", decode_int2_array;
        oid::INT4_ARRAY => "int4[]", decode_int4_array;
        oid::TEXT_ARRAY => "text[]", decode_text_array;
        oid::BPCHAR_ARRAY => "bpchar[]", decode_bpchar_array;
        oid::VARCHAR_ARRAY => "varchar[]", decode_varchar_array;
        oid::INT8_ARRAY => "int8[]", decode_int8_array;
        oid::FLOAT4_ARRAY => "float4[]", decode_float4_array;
        oid::FLOAT8_ARRAY => "float8[]", decode_float8_array;
        oid::NUMERIC_ARRAY => "numeric[]", decode_numeric_array;
        oid::UUID_ARRAY => "uuid[]", decode_uuid_array;
    }
}

// ===== scalar decoders =====

fn text_str<'a>(ty: &'static str, body: &'a Bytes) -> Result<&'a str, DecodeError> {
    std::str::from_utf8(body).map_err(|_| DecodeError::NonUtf8 { ty })
}

fn decode_bool(_: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    let value = match format {
        PgFormat::Text => match text_str("bool", &body)? {
            "t" | "true" => true,
            "f" | "false" => false,
            _ => return Err(invalid("bool", &body)),
        },
        PgFormat::Binary => match &body[..] {
            [0] => false,
            [1] => true,
            _ => return Err(invalid("bool", &body)),
        },
    };
    Ok(Value::Bool(value))
}

macro_rules! int_decoder {
    ($f:ident, $name:literal, $int:ty, $variant:ident) => {
        fn $f(_: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
            let value: $int = match format {
                PgFormat::Text => text_str($name, &body)?
                    .parse()
                    .map_err(|_| invalid($name, &body))?,
                PgFormat::Binary => <$int>::from_be_bytes(
                    body[..].try_into().map_err(|_| invalid($name, &body))?,
                ),
            };
            Ok(Value::$variant(value))
        }
    };
}

int_decoder!(decode_int2, "int2", i16, Int2);
int_decoder!(decode_int4, "int4", i32, Int4);
int_decoder!(decode_int8, "int8", i64, Int8);

macro_rules! float_decoder {
    ($f:ident, $name:literal, $float:ty, $variant:ident) => {
        fn $f(_: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
            let value: $float = match format {
                PgFormat::Text => text_str($name, &body)?
                    .parse()
                    .map_err(|_| invalid($name, &body))?,
                PgFormat::Binary => <$float>::from_be_bytes(
                    body[..].try_into().map_err(|_| invalid($name, &body))?,
                ),
            };
            Ok(Value::$variant(value))
        }
    };
}

float_decoder!(decode_float4, "float4", f32, Float4);
float_decoder!(decode_float8, "float8", f64, Float8);

fn decode_oid_type(_: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    let value: u32 = match format {
        PgFormat::Text => text_str("oid", &body)?
            .parse()
            .map_err(|_| invalid("oid", &body))?,
        PgFormat::Binary => {
            u32::from_be_bytes(body[..].try_into().map_err(|_| invalid("oid", &body))?)
        }
    };
    Ok(Value::Int8(value as i64))
}

fn decode_numeric(_: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    match format {
        // the text form is exact; kept verbatim
        PgFormat::Text => ByteStr::from_utf8(body)
            .map(Value::Numeric)
            .map_err(|_| DecodeError::NonUtf8 { ty: "numeric" }),
        PgFormat::Binary => Ok(Value::Raw(body)),
    }
}

fn decode_interval(_: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    match format {
        PgFormat::Text => ByteStr::from_utf8(body)
            .map(Value::Interval)
            .map_err(|_| DecodeError::NonUtf8 { ty: "interval" }),
        PgFormat::Binary => Ok(Value::Raw(body)),
    }
}

fn decode_text(conv: &Converter, _: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    // text and binary representations are identical for the text family
    conv.encoding.decode_text(body)
}

fn decode_enum(conv: &Converter, _: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    match conv.encoding.decode_text(body)? {
        Value::Text(label) => Ok(Value::Enum(label)),
        other => Ok(other),
    }
}

fn decode_bytea(_: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    match format {
        PgFormat::Binary => Ok(Value::Bytea(body)),
        PgFormat::Text => {
            let text = text_str("bytea", &body)?;
            let Some(hex) = text.strip_prefix("\\x") else {
                // legacy escape output format is not supported
                return Err(invalid("bytea", &body));
            };
            if hex.len() % 2 != 0 {
                return Err(invalid("bytea", &body));
            }
            let mut out = Vec::with_capacity(hex.len() / 2);
            for pair in hex.as_bytes().chunks(2) {
                let digits = std::str::from_utf8(pair).map_err(|_| invalid("bytea", &body))?;
                out.push(u8::from_str_radix(digits, 16).map_err(|_| invalid("bytea", &body))?);
            }
            Ok(Value::Bytea(out.into()))
        }
    }
}

fn decode_uuid(_: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    let value = match format {
        PgFormat::Text => uuid::Uuid::parse_str(text_str("uuid", &body)?)
            .map_err(|_| invalid("uuid", &body))?,
        PgFormat::Binary => {
            uuid::Uuid::from_slice(&body).map_err(|_| invalid("uuid", &body))?
        }
    };
    Ok(Value::Uuid(value))
}

fn decode_json(_: &Converter, _: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    serde_json::from_slice(&body)
        .map(Value::Json)
        .map_err(|_| invalid("json", &body))
}

fn decode_jsonb(_: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    let payload = match format {
        PgFormat::Text => &body[..],
        // binary jsonb is a version byte followed by the json text
        PgFormat::Binary => match body.split_first() {
            Some((&1, rest)) => rest,
            _ => return Err(invalid("jsonb", &body)),
        },
    };
    serde_json::from_slice(payload)
        .map(Value::Json)
        .map_err(|_| invalid("jsonb", &body))
}

fn decode_point(_: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    if format == PgFormat::Binary {
        if body.len() != 16 {
            return Err(invalid("point", &body));
        }
        let x = f64::from_be_bytes(body[..8].try_into().map_err(|_| invalid("point", &body))?);
        let y = f64::from_be_bytes(body[8..].try_into().map_err(|_| invalid("point", &body))?);
        return Ok(Value::Point(Point::new(x, y)));
    }

    let text = text_str("point", &body)?;
    let inner = text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| invalid("point", &body))?;
    let (x, y) = inner.split_once(',').ok_or_else(|| invalid("point", &body))?;
    Ok(Value::Point(Point::new(
        x.trim().parse().map_err(|_| invalid("point", &body))?,
        y.trim().parse().map_err(|_| invalid("point", &body))?,
    )))
}

// ===== date and time decoders =====

const DATE_DESC: &[I<'_>] = &[
    I::Component(C::Year(modifier::Year::default())),
    I::Literal(b"-"),
    I::Component(C::Month(modifier::Month::default())),
    I::Literal(b"-"),
    I::Component(C::Day(modifier::Day::default())),
];

const SUBSECOND_DESC: &[I<'_>] = &[
    I::Literal(b"."),
    I::Component(C::Subsecond(modifier::Subsecond::default())),
];

const TIME_DESC: &[I<'_>] = &[
    I::Component(C::Hour(modifier::Hour::default())),
    I::Literal(b":"),
    I::Component(C::Minute(modifier::Minute::default())),
    I::Literal(b":"),
    I::Component(C::Second(modifier::Second::default())),
    I::Optional(&I::Compound(SUBSECOND_DESC)),
];

const TIMESTAMP_DESC: &[I<'_>] = &[
    I::Compound(DATE_DESC),
    I::Literal(b" "),
    I::Compound(TIME_DESC),
];

pub(crate) fn format_date(date: time::Date) -> String {
    date.format(&DATE_DESC).expect("format is statically known")
}

pub(crate) fn format_time(time: time::Time) -> String {
    time.format(&TIME_DESC).expect("format is statically known")
}

pub(crate) fn format_timestamp(ts: time::PrimitiveDateTime) -> String {
    ts.format(&TIMESTAMP_DESC).expect("format is statically known")
}

fn decode_date(_: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    if format == PgFormat::Binary {
        return Ok(Value::Raw(body));
    }
    time::Date::parse(text_str("date", &body)?, &DATE_DESC)
        .map(Value::Date)
        .map_err(|_| invalid("date", &body))
}

fn decode_time(_: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    if format == PgFormat::Binary {
        return Ok(Value::Raw(body));
    }
    time::Time::parse(text_str("time", &body)?, &TIME_DESC)
        .map(Value::Time)
        .map_err(|_| invalid("time", &body))
}

fn decode_timestamp(_: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    if format == PgFormat::Binary {
        return Ok(Value::Raw(body));
    }
    time::PrimitiveDateTime::parse(text_str("timestamp", &body)?, &TIMESTAMP_DESC)
        .map(Value::Timestamp)
        .map_err(|_| invalid("timestamp", &body))
}

fn decode_timestamptz(_: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    if format == PgFormat::Binary {
        return Ok(Value::Raw(body));
    }
    let text = text_str("timestamptz", &body)?;
    // the server renders in the session timezone with an explicit offset
    // suffix; the offset sign can only appear after the time part
    let at = text
        .rfind(['+', '-'])
        .filter(|&i| i > 10)
        .ok_or_else(|| invalid("timestamptz", &body))?;
    let stamp = time::PrimitiveDateTime::parse(&text[..at], &TIMESTAMP_DESC)
        .map_err(|_| invalid("timestamptz", &body))?;
    let offset = parse_offset(&text[at..]).ok_or_else(|| invalid("timestamptz", &body))?;
    Ok(Value::TimestampTz(stamp.assume_offset(offset)))
}

fn decode_timetz(_: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
    if format == PgFormat::Binary {
        return Ok(Value::Raw(body));
    }
    let text = text_str("timetz", &body)?;
    let at = text
        .find(['+', '-'])
        .ok_or_else(|| invalid("timetz", &body))?;
    let time = time::Time::parse(&text[..at], &TIME_DESC).map_err(|_| invalid("timetz", &body))?;
    let offset = parse_offset(&text[at..]).ok_or_else(|| invalid("timetz", &body))?;
    Ok(Value::TimeTz(time, offset))
}

/// Parse `+HH`, `+HH:MM` or `+HH:MM:SS` offset suffixes.
fn parse_offset(s: &str) -> Option<time::UtcOffset> {
    let sign: i8 = match s.as_bytes().first() {
        Some(b'+') => 1,
        Some(b'-') => -1,
        _ => return None,
    };
    let mut parts = s[1..].splitn(3, ':');
    let hours: i8 = parts.next()?.parse().ok()?;
    let minutes: i8 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    let seconds: i8 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    time::UtcOffset::from_hms(sign * hours, sign * minutes, sign * seconds).ok()
}

// ===== array decoders =====

macro_rules! array_decoder {
    ($f:ident, $name:literal, $elem:expr) => {
        fn $f(conv: &Converter, format: PgFormat, body: Bytes) -> Result<Value, DecodeError> {
            decode_array(conv, format, body, $elem, $name)
        }
    };
}

array_decoder!(decode_bool_array, "bool[]", oid::BOOL);
array_decoder!(decode_name_array, "name[]", oid::NAME);
array_decoder!(decode_int2_array, "int2[]", oid::INT2);
array_decoder!(decode_int4_array, "int4[]", oid::INT4);
array_decoder!(decode_text_array, "text[]", oid::TEXT);
array_decoder!(decode_bpchar_array, "bpchar[]", oid::BPCHAR);
array_decoder!(decode_varchar_array, "varchar[]", oid::VARCHAR);
array_decoder!(decode_int8_array, "int8[]", oid::INT8);
array_decoder!(decode_float4_array, "float4[]", oid::FLOAT4);
array_decoder!(decode_float8_array, "float8[]", oid::FLOAT8);
array_decoder!(decode_numeric_array, "numeric[]", oid::NUMERIC);
array_decoder!(decode_uuid_array, "uuid[]", oid::UUID);

fn decode_array(
    conv: &Converter,
    format: PgFormat,
    body: Bytes,
    elem: Oid,
    ty: &'static str,
) -> Result<Value, DecodeError> {
    if format == PgFormat::Binary {
        return Ok(Value::Raw(body));
    }
    let text = std::str::from_utf8(&body).map_err(|_| DecodeError::NonUtf8 { ty })?;
    let (value, rest) = parse_array(conv, elem, text, ty)?;
    if !rest.is_empty() {
        return Err(invalid(ty, &body));
    }
    Ok(value)
}

/// Recursive descent over the postgres text array syntax.
///
/// `{1,2,NULL}`, `{"a b","qu\"ote"}`, nested `{{1},{2}}`.
fn parse_array<'a>(
    conv: &Converter,
    elem: Oid,
    s: &'a str,
    ty: &'static str,
) -> Result<(Value, &'a str), DecodeError> {
    let fail = || invalid(ty, s.as_bytes());

    let mut rest = s.strip_prefix('{').ok_or_else(fail)?;
    let mut items = Vec::new();

    if let Some(r) = rest.strip_prefix('}') {
        return Ok((Value::Array(items), r));
    }

    loop {
        if rest.starts_with('{') {
            let (inner, r) = parse_array(conv, elem, rest, ty)?;
            items.push(inner);
            rest = r;
        } else if rest.starts_with('"') {
            let (member, r) = parse_quoted(rest, ty)?;
            items.push(conv.decode_oid(elem, PgFormat::Text, Bytes::from(member.into_bytes()))?);
            rest = r;
        } else {
            let end = rest.find([',', '}']).ok_or_else(fail)?;
            let member = &rest[..end];
            items.push(match member {
                "NULL" => Value::Null,
                _ => conv.decode_oid(elem, PgFormat::Text, Bytes::copy_from_slice(member.as_bytes()))?,
            });
            rest = &rest[end..];
        }

        if let Some(r) = rest.strip_prefix(',') {
            rest = r;
            continue;
        }
        if let Some(r) = rest.strip_prefix('}') {
            return Ok((Value::Array(items), r));
        }
        return Err(fail());
    }
}

/// Scan a double-quoted array member, unescaping `\"` and `\\`.
fn parse_quoted<'a>(s: &'a str, ty: &'static str) -> Result<(String, &'a str), DecodeError> {
    let fail = || invalid(ty, s.as_bytes());

    let mut out = String::new();
    let bytes = s.as_bytes();
    let mut i = 1; // opening quote
    loop {
        match bytes.get(i) {
            None => return Err(fail()),
            Some(b'\\') => {
                let c = *bytes.get(i + 1).ok_or_else(fail)?;
                out.push(c as char);
                i += 2;
            }
            Some(b'"') => {
                i += 1;
                break;
            }
            Some(_) => {
                let c = s[i..].chars().next().ok_or_else(fail)?;
                out.push(c);
                i += c.len_utf8();
            }
        }
    }
    Ok((out, &s[i..]))
}

#[cfg(test)]
mod test {
    use super::*;
    use time::macros::{date, datetime, offset, time as time_of_day};

    fn conv() -> Converter {
        Converter::new()
    }

    fn decode(oid: Oid, payload: &str) -> Value {
        conv()
            .decode_oid(oid, PgFormat::Text, Bytes::copy_from_slice(payload.as_bytes()))
            .unwrap()
    }

    #[test]
    fn scalar_text_decoding() {
        assert_eq!(decode(oid::BOOL, "t"), Value::Bool(true));
        assert_eq!(decode(oid::BOOL, "f"), Value::Bool(false));
        assert_eq!(decode(oid::INT2, "-12"), Value::Int2(-12));
        assert_eq!(decode(oid::INT4, "42"), Value::Int4(42));
        assert_eq!(decode(oid::INT8, "9007199254740993"), Value::Int8(9007199254740993));
        assert_eq!(decode(oid::FLOAT8, "-2.5"), Value::Float8(-2.5));
        assert_eq!(decode(oid::NUMERIC, "3.1400"), Value::Numeric(ByteStr::from_static("3.1400")));
    }

    #[test]
    fn float8_text_is_bit_exact() {
        let v = 0.1f64 + 0.2f64;
        let text = format!("{v}");
        assert_eq!(decode(oid::FLOAT8, &text), Value::Float8(v));
    }

    #[test]
    fn multibyte_text() {
        assert_eq!(decode(oid::TEXT, "héllo wörld ☃"), Value::text("héllo wörld ☃"));
    }

    #[test]
    fn bytea_hex() {
        assert_eq!(
            decode(oid::BYTEA, "\\x00ab7f"),
            Value::Bytea(Bytes::from_static(&[0x00, 0xAB, 0x7F]))
        );
        assert!(conv()
            .decode_oid(oid::BYTEA, PgFormat::Text, Bytes::from_static(b"\\xzz"))
            .is_err());
    }

    #[test]
    fn date_time_timestamp() {
        assert_eq!(decode(oid::DATE, "2024-02-29"), Value::Date(date!(2024-02-29)));
        assert_eq!(decode(oid::TIME, "13:04:05"), Value::Time(time_of_day!(13:04:05)));
        assert_eq!(
            decode(oid::TIME, "13:04:05.250"),
            Value::Time(time_of_day!(13:04:05.250))
        );
        assert_eq!(
            decode(oid::TIMESTAMP, "2024-01-02 03:04:05.678901"),
            Value::Timestamp(datetime!(2024-01-02 03:04:05.678901))
        );
    }

    #[test]
    fn timestamptz_offsets() {
        assert_eq!(
            decode(oid::TIMESTAMPTZ, "2024-01-02 03:04:05+02"),
            Value::TimestampTz(datetime!(2024-01-02 03:04:05 +02:00))
        );
        assert_eq!(
            decode(oid::TIMESTAMPTZ, "2024-01-02 03:04:05.5-05:30"),
            Value::TimestampTz(datetime!(2024-01-02 03:04:05.5 -05:30))
        );
    }

    #[test]
    fn timetz_payload() {
        assert_eq!(
            decode(oid::TIMETZ, "13:04:05+01"),
            Value::TimeTz(time_of_day!(13:04:05), offset!(+01:00))
        );
    }

    #[test]
    fn uuid_and_json() {
        assert_eq!(
            decode(oid::UUID, "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11"),
            Value::Uuid(uuid::uuid!("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11"))
        );
        assert_eq!(
            decode(oid::JSON, r#"{"a":[1,2]}"#),
            Value::Json(serde_json::json!({"a": [1, 2]}))
        );
    }

    #[test]
    fn point_roundtrip() {
        let v = decode(oid::POINT, "(1.5,-2.25)");
        assert_eq!(v, Value::Point(Point::new(1.5, -2.25)));
        assert_eq!(v.to_string(), "(1.5,-2.25)");
    }

    #[test]
    fn arrays() {
        assert_eq!(
            decode(oid::INT4_ARRAY, "{1,2,NULL}"),
            Value::Array(vec![Value::Int4(1), Value::Int4(2), Value::Null])
        );
        assert_eq!(
            decode(oid::TEXT_ARRAY, r#"{plain,"with space","qu\"ote","NULL"}"#),
            Value::Array(vec![
                Value::text("plain"),
                Value::text("with space"),
                Value::text("qu\"ote"),
                Value::text("NULL"),
            ])
        );
        assert_eq!(decode(oid::TEXT_ARRAY, "{}"), Value::Array(vec![]));
        assert_eq!(
            decode(oid::INT4_ARRAY, "{{1},{2}}"),
            Value::Array(vec![
                Value::Array(vec![Value::Int4(1)]),
                Value::Array(vec![Value::Int4(2)]),
            ])
        );
    }

    #[test]
    fn binary_scalars() {
        let c = conv();
        assert_eq!(
            c.decode_oid(oid::INT4, PgFormat::Binary, Bytes::from_static(&[0, 0, 0, 42])).unwrap(),
            Value::Int4(42)
        );
        assert_eq!(
            c.decode_oid(oid::FLOAT8, PgFormat::Binary, Bytes::copy_from_slice(&2.5f64.to_be_bytes())).unwrap(),
            Value::Float8(2.5)
        );
        assert_eq!(
            c.decode_oid(oid::BOOL, PgFormat::Binary, Bytes::from_static(&[1])).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn unknown_oid_is_raw() {
        let body = Bytes::from_static(b"whatever");
        assert_eq!(decode(999_999, "whatever"), Value::Raw(body));
    }

    #[test]
    fn enum_install() {
        let mut c = conv();
        c.install_enum(16_400, ByteStr::from_static("mood"));
        assert_eq!(c.type_name(16_400), Some("mood"));
        let v = c
            .decode_oid(16_400, PgFormat::Text, Bytes::from_static(b"happy"))
            .unwrap();
        assert_eq!(v, Value::Enum(ByteStr::from_static("happy")));
    }

    #[test]
    fn encoding_stub_passes_raw_bytes() {
        let mut params = HashMap::new();
        params.insert(
            ByteStr::from_static("client_encoding"),
            ByteStr::from_static("LATIN1"),
        );
        let c = Converter::initialize_from(&params);
        let payload = Bytes::from_static(&[0xE9]); // 'é' in latin1
        assert_eq!(
            c.decode_oid(oid::TEXT, PgFormat::Text, payload.clone()).unwrap(),
            Value::Raw(payload)
        );
    }

    #[test]
    fn initialize_binds_timezone() {
        let mut params = HashMap::new();
        params.insert(ByteStr::from_static("client_encoding"), ByteStr::from_static("UTF8"));
        params.insert(ByteStr::from_static("TimeZone"), ByteStr::from_static("Europe/Vienna"));
        let c = Converter::initialize_from(&params);
        assert_eq!(c.encoding(), &Encoding::Utf8);
        assert_eq!(c.timezone(), Some("Europe/Vienna"));
    }

    #[test]
    fn null_skips_decoders() {
        use crate::postgres::backend::DataRow;
        use bytes::{BufMut, BytesMut};

        let field = FieldDescription {
            name: ByteStr::from_static("n"),
            table_oid: 0,
            column: 0,
            type_oid: oid::INT4,
            type_size: 4,
            type_modifier: -1,
            format: PgFormat::Text,
        };

        let mut body = BytesMut::new();
        body.put_i32(-1);
        let row = DataRow { columns: 1, body: body.freeze() };
        let values = conv().decode_row(&[field], row).unwrap();
        assert_eq!(values, vec![Value::Null]);
    }

    #[test]
    fn row_arity_mismatch() {
        use crate::postgres::backend::DataRow;

        let row = DataRow { columns: 2, body: Bytes::new() };
        let err = conv().decode_row(&[], row).unwrap_err();
        assert!(matches!(
            err.kind(),
            crate::ErrorKind::Protocol(ProtocolError::RowArity { expect: 0, got: 2 })
        ));
    }
}
