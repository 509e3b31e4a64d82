//! Row descriptions and query results.
use bytes::{Buf, Bytes};

use crate::{
    common::ByteStr,
    ext::BytesExt,
    postgres::{Oid, PgFormat, ProtocolError},
    value::Value,
};

/// Description of one result column, from a `RowDescription` message.
///
/// Immutable once constructed.
///
/// <https://www.postgresql.org/docs/current/protocol-message-formats.html#PROTOCOL-MESSAGE-FORMATS-ROWDESCRIPTION>
#[derive(Debug, Clone)]
pub struct FieldDescription {
    /// The field name, in the session encoding.
    pub name: ByteStr,
    /// If the field can be identified as a column of a specific table,
    /// the object ID of the table; otherwise zero.
    pub table_oid: Oid,
    /// If the field can be identified as a column of a specific table,
    /// the attribute number of the column; otherwise zero.
    pub column: i16,
    /// The object ID of the field's data type.
    pub type_oid: Oid,
    /// The data type size (see pg_type.typlen).
    /// Note that negative values denote variable-width types.
    pub type_size: i16,
    /// The type modifier (see pg_attribute.atttypmod).
    /// The meaning of the modifier is type-specific.
    pub type_modifier: i32,
    /// The format code being used for the field.
    ///
    /// In a RowDescription returned from the statement variant of Describe,
    /// the format code is not yet known and will always be zero.
    pub format: PgFormat,
}

impl FieldDescription {
    pub(crate) fn parse(body: &mut Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            name: body.get_nul_bytestr()?,
            table_oid: body.get_u32(),
            column: body.get_i16(),
            type_oid: body.get_u32(),
            type_size: body.get_i16(),
            type_modifier: body.get_i32(),
            format: PgFormat::from_code(body.get_i16()),
        })
    }
}

/// One sub-result of a query: a column layout plus the rows decoded
/// against it.
///
/// Every row holds exactly as many values as there are fields.
#[derive(Debug, Default)]
pub struct ResultSet {
    pub(crate) fields: Vec<FieldDescription>,
    pub(crate) rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub(crate) fn new(fields: Vec<FieldDescription>) -> Self {
        Self { fields, rows: Vec::new() }
    }

    /// The column descriptions, in server order.
    pub fn fields(&self) -> &[FieldDescription] {
        &self.fields
    }

    /// The decoded rows, in server order.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }
}

/// The aggregated reply to a query.
///
/// Carries the command tags and the result sets in the order produced by the
/// server. A multi-statement simple query yields one tag per statement and
/// one result set per statement that returned rows.
#[derive(Debug, Default)]
pub struct QueryResult {
    pub(crate) tags: Vec<ByteStr>,
    pub(crate) sets: Vec<ResultSet>,
}

impl QueryResult {
    /// Command tags in server order, preserved verbatim
    /// (`SELECT 2`, `INSERT 0 1`, `CREATE TABLE`, ...).
    ///
    /// An empty query string produces a single empty tag.
    pub fn tags(&self) -> &[ByteStr] {
        &self.tags
    }

    /// The first command tag, if any.
    pub fn tag(&self) -> Option<&str> {
        self.tags.first().map(|t| t.as_str())
    }

    /// All result sets in server order.
    pub fn sets(&self) -> &[ResultSet] {
        &self.sets
    }

    /// Field descriptions of the first result set.
    pub fn fields(&self) -> &[FieldDescription] {
        self.sets.first().map(ResultSet::fields).unwrap_or_default()
    }

    /// Rows of the first result set.
    pub fn rows(&self) -> &[Vec<Value>] {
        self.sets.first().map(ResultSet::rows).unwrap_or_default()
    }

    /// Value at `(row, column)` of the first result set.
    pub fn value(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows().get(row).and_then(|r| r.get(column))
    }
}
