//! Client-side formatted statements.
//!
//! A [`FormattedStatement`] substitutes `$1, $2, ...` placeholders into the
//! SQL text with safely quoted values before sending a simple query. This is
//! the client-side alternative to server-side binding; typed binding over
//! `Bind` is available through [`Connection::prepare`][1].
//!
//! [1]: crate::Connection::prepare
use crate::{
    Result,
    common::ByteStr,
    connection::Connection,
    error::ConfigError,
    row::QueryResult,
    value::Value,
};

/// A statement template with `$n` placeholders, bound by quoting.
#[derive(Debug, Clone)]
pub struct FormattedStatement {
    template: ByteStr,
}

impl FormattedStatement {
    pub(crate) fn new(template: &str) -> FormattedStatement {
        FormattedStatement { template: ByteStr::copy_from_str(template) }
    }

    /// The raw template.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Substitute placeholders with quoted `params`.
    ///
    /// Placeholders are 1-based; referencing one without a bound value
    /// fails with a configuration error.
    pub fn render(&self, params: &[Value]) -> Result<String> {
        let template = self.template.as_str();
        let mut out = String::with_capacity(template.len() + params.len() * 8);
        let bytes = template.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] == b'$' {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j].is_ascii_digit() {
                    j += 1;
                }
                if j > i + 1 {
                    let index: usize = template[i + 1..j]
                        .parse()
                        .map_err(|_| ConfigError::Placeholder(0))?;
                    let value = index
                        .checked_sub(1)
                        .and_then(|nth| params.get(nth))
                        .ok_or(ConfigError::Placeholder(index))?;
                    quote_into(&mut out, value);
                    i = j;
                    continue;
                }
            }
            // copy a full character; multibyte text passes through verbatim
            let Some(c) = template[i..].chars().next() else { break };
            out.push(c);
            i += c.len_utf8();
        }

        Ok(out)
    }

    /// Render with `params` and run as a simple query.
    pub async fn query(&self, conn: &mut Connection, params: &[Value]) -> Result<QueryResult> {
        let sql = self.render(params)?;
        conn.query(&sql).await
    }

    /// Render with `params` and run, returning only the command tags.
    pub async fn execute(&self, conn: &mut Connection, params: &[Value]) -> Result<Vec<ByteStr>> {
        let sql = self.render(params)?;
        conn.execute(&sql).await
    }
}

/// Quote a value as a SQL literal.
///
/// Booleans and finite numbers are written bare; everything else is single
/// quoted with embedded quotes doubled. Standard conforming strings are
/// assumed, so backslashes need no escaping.
fn quote_into(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("NULL"),
        Value::Bool(true) => out.push_str("TRUE"),
        Value::Bool(false) => out.push_str("FALSE"),
        Value::Int2(_) | Value::Int4(_) | Value::Int8(_) => {
            if let Some(text) = value.to_text() {
                out.push_str(&text);
            }
        }
        Value::Float4(v) if v.is_finite() => {
            if let Some(text) = value.to_text() {
                out.push_str(&text);
            }
        }
        Value::Float8(v) if v.is_finite() => {
            if let Some(text) = value.to_text() {
                out.push_str(&text);
            }
        }
        other => {
            let Some(text) = other.to_text() else {
                out.push_str("NULL");
                return;
            };
            out.push('\'');
            for c in text.chars() {
                if c == '\'' {
                    out.push('\'');
                }
                out.push(c);
            }
            out.push('\'');
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ErrorKind;
    use bytes::Bytes;

    fn render(template: &str, params: &[Value]) -> String {
        FormattedStatement::new(template).render(params).unwrap()
    }

    #[test]
    fn substitutes_in_order() {
        assert_eq!(
            render("SELECT $1 + $2", &[Value::Int4(2), Value::Int4(3)]),
            "SELECT 2 + 3"
        );
    }

    #[test]
    fn quotes_text_safely() {
        assert_eq!(
            render("SELECT $1", &[Value::text("O'Reilly")]),
            "SELECT 'O''Reilly'"
        );
    }

    #[test]
    fn placeholder_ten_is_not_one() {
        let params: Vec<Value> = (1..=10).map(Value::Int4).collect();
        assert_eq!(render("$10 $1", &params), "10 1");
    }

    #[test]
    fn null_and_bool_literals() {
        assert_eq!(
            render("INSERT INTO t VALUES ($1, $2, $3)", &[
                Value::Null,
                Value::Bool(true),
                Value::Bool(false),
            ]),
            "INSERT INTO t VALUES (NULL, TRUE, FALSE)"
        );
    }

    #[test]
    fn bytea_is_hex_quoted() {
        assert_eq!(
            render("SELECT $1", &[Value::Bytea(Bytes::from_static(&[0xAB]))]),
            "SELECT '\\xab'"
        );
    }

    #[test]
    fn non_finite_floats_are_quoted() {
        assert_eq!(render("SELECT $1", &[Value::Float8(f64::NAN)]), "SELECT 'NaN'");
        assert_eq!(render("SELECT $1", &[Value::Float8(-1.5)]), "SELECT -1.5");
    }

    #[test]
    fn bare_dollar_passes_through() {
        assert_eq!(render("SELECT '$ money $'", &[]), "SELECT '$ money $'");
    }

    #[test]
    fn missing_placeholder_fails() {
        let err = FormattedStatement::new("SELECT $2")
            .render(&[Value::Int4(1)])
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Config(ConfigError::Placeholder(2))
        ));
    }
}
