//! Lightweight Postgres client
//!
//! Speaks the frontend/backend wire protocol v3.0 over a plain or TLS
//! upgraded socket, decodes fields through an oid keyed converter, and
//! recovers from in-query server errors without losing protocol
//! synchronization.
//!
//! # Examples
//!
//! Simple query:
//!
//! ```no_run
//! use postlet::Connection;
//!
//! # async fn app() -> postlet::Result<()> {
//! let mut conn = Connection::connect("psql://user:pw@localhost/app").await?;
//!
//! let res = conn.query("SELECT 42 AS n").await?;
//!
//! assert_eq!(res.tag(), Some("SELECT 1"));
//! assert_eq!(res.value(0, 0).unwrap().as_i64(), Some(42));
//! # Ok(())
//! # }
//! ```
//!
//! Prepared statement with typed parameters:
//!
//! ```no_run
//! use postlet::{Connection, Value};
//!
//! # async fn app() -> postlet::Result<()> {
//! let mut conn = Connection::connect("psql://user:pw@localhost/app").await?;
//!
//! let stmt = conn.prepare("SELECT $1::int + $2::int").await?;
//!
//! let res = stmt.query(&mut conn, &[Value::Int4(2), Value::Int4(3)]).await?;
//! assert_eq!(res.value(0, 0), Some(&Value::Int4(5)));
//!
//! let res = stmt.query(&mut conn, &[Value::Int4(10), Value::Int4(20)]).await?;
//! assert_eq!(res.value(0, 0), Some(&Value::Int4(30)));
//! # Ok(())
//! # }
//! ```
//!
//! Client-side formatted statement:
//!
//! ```no_run
//! use postlet::{Connection, Value};
//!
//! # async fn app() -> postlet::Result<()> {
//! let mut conn = Connection::connect("psql://user:pw@localhost/app").await?;
//!
//! let stmt = conn.format("INSERT INTO t(name) VALUES ($1)");
//! stmt.execute(&mut conn, &[Value::text("O'Reilly")]).await?;
//! # Ok(())
//! # }
//! ```

pub mod common;
mod ext;
mod net;
mod stream;
mod transport;

// Protocol
pub mod postgres;
mod protocol;

// Conversion
pub mod value;
pub mod convert;

// Component
pub mod row;
mod statement;
pub mod sql;

// Connection
pub mod connection;

mod error;

#[doc(inline)]
pub use connection::{Config, Connection, SessionStatus};
#[doc(inline)]
pub use convert::{Converter, DecodeError, Encoding};
#[doc(inline)]
pub use error::{ConfigError, Error, ErrorKind, Result, SslError};
#[doc(inline)]
pub use postgres::{DatabaseError, Notice};
#[doc(inline)]
pub use row::{FieldDescription, QueryResult, ResultSet};
#[doc(inline)]
pub use sql::FormattedStatement;
#[doc(inline)]
pub use statement::PreparedStatement;
#[doc(inline)]
pub use value::{Point, Value};
