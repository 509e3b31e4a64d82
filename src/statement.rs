//! Server-side prepared statements.
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::{
    Result,
    common::ByteStr,
    connection::Connection,
    postgres::Oid,
    protocol::StatementDescription,
    row::{FieldDescription, QueryResult},
    value::Value,
};

/// Statement names are identifiers; the server only considers this many
/// bytes significant.
const MAX_NAME: usize = 63;
const HASH_HEX: usize = 16;

/// Derive a server-side statement name from the SQL text.
///
/// Short statements use the SQL itself. Longer ones keep a prefix and append
/// a hash of the full text, staying within the significant length while
/// remaining collision resistant across distinct statements.
pub(crate) fn derive_name(sql: &str) -> String {
    let sql = sql.trim();
    if sql.len() <= MAX_NAME {
        return sql.to_owned();
    }

    let hash = {
        let mut hasher = DefaultHasher::new();
        sql.hash(&mut hasher);
        hasher.finish()
    };

    let mut cut = MAX_NAME - 1 - HASH_HEX;
    while !sql.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}_{hash:016x}", &sql[..cut])
}

/// A statement parsed and described on its session.
///
/// The name exists server-side for the lifetime of the session that
/// prepared it; executing against a different session raises a server
/// error. Parameter and field descriptions are immutable once the statement
/// is described.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    name: ByteStr,
    params: Vec<Oid>,
    fields: Vec<FieldDescription>,
}

impl PreparedStatement {
    pub(crate) fn new(name: ByteStr, desc: StatementDescription) -> PreparedStatement {
        PreparedStatement {
            name,
            params: desc.params,
            fields: desc.fields,
        }
    }

    /// The server-side statement name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type oids of the statement parameters, from `ParameterDescription`.
    pub fn param_types(&self) -> &[Oid] {
        &self.params
    }

    /// Row layout of the statement results; empty when the statement
    /// returns no rows.
    pub fn fields(&self) -> &[FieldDescription] {
        &self.fields
    }

    /// Bind `params` and execute, returning rows and command tags.
    ///
    /// Parameters are transmitted in text format over `Bind`;
    /// [`Value::Null`] binds NULL.
    pub async fn query(&self, conn: &mut Connection, params: &[Value]) -> Result<QueryResult> {
        conn.run_prepared(self, params).await
    }

    /// Bind `params` and execute, returning only the command tags.
    pub async fn execute(&self, conn: &mut Connection, params: &[Value]) -> Result<Vec<ByteStr>> {
        let result = conn.run_prepared(self, params).await?;
        Ok(result.tags)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn short_sql_is_its_own_name() {
        assert_eq!(derive_name("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn boundary_length_is_kept() {
        let sql = "x".repeat(63);
        assert_eq!(derive_name(&sql), sql);
    }

    #[test]
    fn long_sql_is_hashed_down() {
        let sql = "x".repeat(64);
        let name = derive_name(&sql);
        assert!(name.len() <= 63);
        assert_eq!(name.len(), 63);
        assert!(name.contains('_'));
    }

    #[test]
    fn distinct_long_sql_gets_distinct_names() {
        let prefix = "SELECT * FROM a_rather_long_table_name WHERE the_column = ".repeat(2);
        let a = derive_name(&format!("{prefix}1"));
        let b = derive_name(&format!("{prefix}2"));
        assert_ne!(a, b);
        // shared prefix, differing hash suffix
        assert_eq!(a[..40], b[..40]);
    }

    #[test]
    fn multibyte_prefix_is_cut_on_char_boundary() {
        let sql = "é".repeat(64);
        let name = derive_name(&sql);
        assert!(name.len() <= 63);
        assert!(name.is_char_boundary(name.find('_').unwrap()));
    }
}
