//! Dynamically typed field values.
use bytes::Bytes;
use std::fmt;

use crate::common::ByteStr;

/// A decoded field value.
///
/// NULL is a dedicated variant, never handed to a decoder; the converter
/// short-circuits on the wire NULL length before any decoder runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    /// Arbitrary precision `numeric`, carried as the verbatim server text.
    Numeric(ByteStr),
    Text(ByteStr),
    Bytea(Bytes),
    Date(time::Date),
    Time(time::Time),
    TimeTz(time::Time, time::UtcOffset),
    Timestamp(time::PrimitiveDateTime),
    TimestampTz(time::OffsetDateTime),
    /// `interval`, carried as the verbatim server text.
    Interval(ByteStr),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    Point(Point),
    /// A label of a server-defined enum type.
    Enum(ByteStr),
    /// Homogeneous array of the element type.
    Array(Vec<Value>),
    /// Payload of a type with no registered decoder, or text received under
    /// an unsupported client encoding.
    Raw(Bytes),
}

/// Postgres spells the non-finite floats differently from [`Display`].
macro_rules! float_text {
    ($v:expr) => {{
        let v = $v;
        if v.is_nan() {
            String::from("NaN")
        } else if v.is_infinite() {
            String::from(if v > 0.0 { "Infinity" } else { "-Infinity" })
        } else {
            format!("{v}")
        }
    }};
}

impl Value {
    /// Convenience constructor copying a str into a [`Text`][Value::Text] value.
    pub fn text(s: &str) -> Value {
        Value::Text(ByteStr::copy_from_str(s))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer variant widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int2(v) => Some(*v as i64),
            Value::Int4(v) => Some(*v as i64),
            Value::Int8(v) => Some(*v),
            _ => None,
        }
    }

    /// Any float variant widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float4(v) => Some(*v as f64),
            Value::Float8(v) => Some(*v),
            _ => None,
        }
    }

    /// Textual variants as a str slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Numeric(s) | Value::Interval(s) | Value::Enum(s) => {
                Some(s.as_str())
            }
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytea(b) | Value::Raw(b) => Some(b),
            _ => None,
        }
    }

    /// Encode self into the postgres text format, `None` for NULL.
    ///
    /// This is the representation bound over the wire for extended-query
    /// parameters, and the basis for client-side quoting.
    pub(crate) fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(String::from(if *b { "t" } else { "f" })),
            Value::Int2(v) => Some(itoa::Buffer::new().format(*v).to_owned()),
            Value::Int4(v) => Some(itoa::Buffer::new().format(*v).to_owned()),
            Value::Int8(v) => Some(itoa::Buffer::new().format(*v).to_owned()),
            Value::Float4(v) => Some(float_text!(*v)),
            Value::Float8(v) => Some(float_text!(*v)),
            Value::Numeric(s) | Value::Interval(s) | Value::Enum(s) => Some(s.to_string()),
            Value::Text(s) => Some(s.to_string()),
            Value::Bytea(b) => Some(hex_text(b)),
            Value::Date(d) => Some(crate::convert::format_date(*d)),
            Value::Time(t) => Some(crate::convert::format_time(*t)),
            Value::TimeTz(t, o) => Some(format!(
                "{}{}",
                crate::convert::format_time(*t),
                offset_text(*o),
            )),
            Value::Timestamp(ts) => Some(crate::convert::format_timestamp(*ts)),
            Value::TimestampTz(ts) => Some(format!(
                "{}{}",
                crate::convert::format_timestamp(time::PrimitiveDateTime::new(ts.date(), ts.time())),
                offset_text(ts.offset()),
            )),
            Value::Uuid(u) => Some(u.to_string()),
            Value::Json(j) => Some(j.to_string()),
            Value::Point(p) => Some(p.to_string()),
            Value::Array(items) => Some(array_text(items)),
            Value::Raw(b) => Some(hex_text(b)),
        }
    }
}

fn hex_text(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn offset_text(offset: time::UtcOffset) -> String {
    let (h, m, _) = offset.as_hms();
    let sign = if offset.is_negative() { '-' } else { '+' };
    let (h, m) = (h.abs(), m.abs());
    if m == 0 {
        format!("{sign}{h:02}")
    } else {
        format!("{sign}{h:02}:{m:02}")
    }
}

/// Postgres text array syntax, with quoting for members that need it.
fn array_text(items: &[Value]) -> String {
    let mut out = String::from("{");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        match item.to_text() {
            None => out.push_str("NULL"),
            Some(text) => {
                let needs_quote = text.is_empty()
                    || text.eq_ignore_ascii_case("null")
                    || text.contains(['{', '}', ',', '"', '\\', ' ']);
                if needs_quote {
                    out.push('"');
                    for c in text.chars() {
                        if matches!(c, '"' | '\\') {
                            out.push('\\');
                        }
                        out.push(c);
                    }
                    out.push('"');
                } else {
                    out.push_str(&text);
                }
            }
        }
    }
    out.push('}');
    out
}

impl fmt::Display for Value {
    /// Render the postgres text form; NULL renders as `NULL`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

/// A point on a two dimensional plane.
///
/// The text form `(x,y)` round-trips through [`Display`] and the converter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Point {
        Point { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn point_display_roundtrips() {
        let p = Point::new(1.5, -2.25);
        assert_eq!(p.to_string(), "(1.5,-2.25)");
    }

    #[test]
    fn null_never_renders_a_payload() {
        assert_eq!(Value::Null.to_text(), None);
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    #[test]
    fn bool_text_form() {
        assert_eq!(Value::Bool(true).to_text().unwrap(), "t");
        assert_eq!(Value::Bool(false).to_text().unwrap(), "f");
    }

    #[test]
    fn bytea_hex_form() {
        let v = Value::Bytea(Bytes::from_static(&[0x00, 0xAB, 0x7F]));
        assert_eq!(v.to_text().unwrap(), "\\x00ab7f");
    }

    #[test]
    fn float_specials() {
        assert_eq!(Value::Float8(f64::NAN).to_text().unwrap(), "NaN");
        assert_eq!(Value::Float8(f64::INFINITY).to_text().unwrap(), "Infinity");
        assert_eq!(Value::Float4(-1.5).to_text().unwrap(), "-1.5");
    }

    #[test]
    fn array_text_quoting() {
        let v = Value::Array(vec![
            Value::text("plain"),
            Value::text("with space"),
            Value::text("qu\"ote"),
            Value::Null,
        ]);
        assert_eq!(v.to_text().unwrap(), r#"{plain,"with space","qu\"ote",NULL}"#);
    }

    #[test]
    fn integer_widening() {
        assert_eq!(Value::Int2(7).as_i64(), Some(7));
        assert_eq!(Value::Int8(-3).as_i64(), Some(-3));
        assert_eq!(Value::Text(ByteStr::from_static("x")).as_i64(), None);
    }
}
