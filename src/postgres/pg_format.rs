/// Postgres data transmission format.
///
/// As of PostgreSQL 7.4 the only supported formats are "text" and "binary".
/// Text has format code zero, and Binary has format code one.
///
/// <https://www.postgresql.org/docs/current/protocol-overview.html#PROTOCOL-FORMAT-CODES>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgFormat {
    /// Text has format code zero.
    ///
    /// In the text transmitted representation, there is no trailing null character;
    /// the frontend must add one to received values if it wants to process them as C strings.
    Text,
    /// Binary has format code one.
    ///
    /// Binary representations for integers use network byte order (most significant byte first).
    /// Keep in mind that binary representations for complex data types might change across server versions.
    Binary,
}

impl PgFormat {
    /// Return format code for current format.
    pub fn format_code(&self) -> u16 {
        match self {
            PgFormat::Text => 0,
            PgFormat::Binary => 1,
        }
    }

    /// Parse a format code as sent in `RowDescription`.
    ///
    /// Any unknown code is treated as binary so no text decoder runs over
    /// bytes it does not understand.
    pub fn from_code(code: i16) -> PgFormat {
        match code {
            0 => PgFormat::Text,
            _ => PgFormat::Binary,
        }
    }
}
