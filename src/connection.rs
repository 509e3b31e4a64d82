//! Postgres connection.
mod config;

pub use config::{Config, ParseError};

use rand::Rng;
use std::collections::HashMap;

use crate::{
    Result,
    common::ByteStr,
    convert::Converter,
    postgres::backend::BackendKeyData,
    protocol,
    row::QueryResult,
    sql::FormattedStatement,
    statement::{self, PreparedStatement},
    stream::PgStream,
    value::Value,
};

/// Observable connection state.
///
/// Every operation takes the connection `&mut` from the first outbound byte
/// to the terminating ReadyForQuery, so `InFlight` is only ever seen when an
/// operation panicked mid-flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Closed,
    Ready,
    InFlight,
}

/// Live state of an open session: socket stream, converter, server
/// parameters and the backend key for out-of-band cancellation.
#[derive(Debug)]
struct Session {
    stream: PgStream,
    converter: Converter,
    params: HashMap<ByteStr, ByteStr>,
    key_data: BackendKeyData,
    status: SessionStatus,
}

/// A postgres connection, one serial session at a time.
///
/// The connection opens lazily: the first query performs socket setup,
/// optional SSL upgrade, startup and authentication. After a fatal error the
/// session is dropped and the next query reconnects automatically; a server
/// reported error keeps the session open and usable.
///
/// ```no_run
/// use postlet::Connection;
///
/// # async fn app() -> postlet::Result<()> {
/// let mut conn = Connection::connect("psql://user:pw@localhost/app").await?;
///
/// let res = conn.query("SELECT 42 AS n").await?;
/// assert_eq!(res.tag(), Some("SELECT 1"));
/// assert_eq!(res.value(0, 0).unwrap().as_i64(), Some(42));
///
/// conn.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Connection {
    config: Config,
    session: Option<Session>,
}

impl Connection {
    /// Build a connection from a url without touching the network; the
    /// session opens on first use.
    pub fn from_url(url: &str) -> Result<Connection> {
        Ok(Connection::with_config(Config::parse(url)?))
    }

    /// Build a connection from a config without touching the network.
    pub fn with_config(config: Config) -> Connection {
        Connection { config, session: None }
    }

    /// Connect and authenticate eagerly.
    pub async fn connect(url: &str) -> Result<Connection> {
        let mut conn = Connection::from_url(url)?;
        conn.open().await?;
        Ok(conn)
    }

    /// Connect with an SSLRequest upgrade before startup.
    pub async fn connect_ssl(url: &str) -> Result<Connection> {
        let mut conn = Connection::from_url(url)?;
        conn.config.ssl = true;
        conn.open().await?;
        Ok(conn)
    }

    /// Open the session now if it is not already open.
    pub async fn open(&mut self) -> Result<()> {
        if self.session.is_none() {
            self.session = Some(Self::open_session(&self.config).await?);
        }
        Ok(())
    }

    /// Whether an authenticated session is at a command boundary.
    pub fn is_connected(&self) -> bool {
        match &self.session {
            Some(session) => {
                session.status == SessionStatus::Ready && session.key_data.process_id != 0
            }
            None => false,
        }
    }

    /// Observable session state.
    pub fn status(&self) -> SessionStatus {
        self.session.as_ref().map(|s| s.status).unwrap_or(SessionStatus::Closed)
    }

    /// Whether the current session runs over TLS.
    pub fn ssl(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.stream.is_tls())
    }

    /// The backend process id, usable for `CancelRequest`.
    ///
    /// Servers that omit `BackendKeyData` leave a random non-zero
    /// placeholder here.
    pub fn backend_pid(&self) -> Option<i32> {
        self.session.as_ref().map(|s| s.key_data.process_id)
    }

    /// A server reported parameter, e.g. `server_version`, `TimeZone`.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.session
            .as_ref()
            .and_then(|s| s.params.get(name))
            .map(ByteStr::as_str)
    }

    /// The `server_version` parameter.
    pub fn server_version(&self) -> Option<&str> {
        self.parameter("server_version")
    }

    /// The session converter, once a session is open.
    pub fn converter(&self) -> Option<&Converter> {
        self.session.as_ref().map(|s| &s.converter)
    }

    /// Run a simple query and collect tags, descriptions and decoded rows.
    ///
    /// Multiple statements separated by semicolons produce multiple command
    /// tags and result sets in order.
    pub async fn query(&mut self, sql: &str) -> Result<QueryResult> {
        let session = self.session().await?;
        session.status = SessionStatus::InFlight;
        let res = protocol::simple_query(sql, &session.converter, &mut session.stream).await;
        self.settle(res)
    }

    /// Run a simple query and return only the command tags.
    pub async fn execute(&mut self, sql: &str) -> Result<Vec<ByteStr>> {
        let result = self.query(sql).await?;
        Ok(result.tags)
    }

    /// Parse and describe a prepared statement, named after the SQL text.
    pub async fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        let name = statement::derive_name(sql);
        self.prepare_named(sql, &name).await
    }

    /// Parse and describe a prepared statement under an explicit name.
    ///
    /// Only the first 63 bytes of the name are significant to the server.
    pub async fn prepare_named(&mut self, sql: &str, name: &str) -> Result<PreparedStatement> {
        let session = self.session().await?;
        session.status = SessionStatus::InFlight;
        let res = protocol::prepare(name, sql, &mut session.stream).await;
        let desc = self.settle(res)?;
        Ok(PreparedStatement::new(ByteStr::copy_from_str(name), desc))
    }

    pub(crate) async fn run_prepared(
        &mut self,
        stmt: &PreparedStatement,
        params: &[Value],
    ) -> Result<QueryResult> {
        let text: Vec<Option<String>> = params.iter().map(Value::to_text).collect();
        let session = self.session().await?;
        session.status = SessionStatus::InFlight;
        let res = protocol::execute_portal(
            stmt.name(),
            &text,
            stmt.fields(),
            &session.converter,
            &mut session.stream,
        )
        .await;
        self.settle(res)
    }

    /// Release a prepared statement on the server.
    pub async fn deallocate(&mut self, stmt: PreparedStatement) -> Result<()> {
        if self.session.is_none() {
            // the statement died with its session
            return Ok(());
        }
        let session = self.session().await?;
        session.status = SessionStatus::InFlight;
        let res = protocol::close_statement(stmt.name(), &mut session.stream).await;
        self.settle(res)
    }

    /// Build a client-side formatted statement over `$n` placeholders.
    pub fn format(&self, template: &str) -> FormattedStatement {
        FormattedStatement::new(template)
    }

    /// Probe the connection end to end.
    ///
    /// Runs `SELECT {n}` for a random `n` and checks both the command tag
    /// and the decoded value, exercising the full round trip.
    pub async fn is_working(&mut self) -> bool {
        let n: i32 = rand::thread_rng().gen_range(2..=i32::MAX);
        let sql = format!("SELECT {n} AS probe");
        match self.query(&sql).await {
            Ok(res) => {
                res.tag() == Some("SELECT 1")
                    && matches!(res.value(0, 0), Some(Value::Int4(v)) if *v == n)
            }
            Err(_) => false,
        }
    }

    /// Load server-defined enum types into the converter.
    ///
    /// Queries `pg_type`/`pg_enum` and installs a text decoder per enum oid,
    /// since enum oids are assigned at `CREATE TYPE` time and cannot be part
    /// of the default table. Returns the type names processed.
    pub async fn load_enums(&mut self) -> Result<Vec<ByteStr>> {
        const SQL: &str = "SELECT t.oid, t.typname FROM pg_type t \
            JOIN pg_enum e ON e.enumtypid = t.oid \
            GROUP BY t.oid, t.typname ORDER BY t.oid";

        let result = self.query(SQL).await?;

        let mut names = Vec::new();
        if let Some(session) = &mut self.session {
            for row in result.rows() {
                let oid = match row.first() {
                    Some(Value::Int8(oid)) => *oid as u32,
                    _ => continue,
                };
                let name = match row.get(1) {
                    Some(Value::Text(name)) => name.clone(),
                    _ => continue,
                };
                session.converter.install_enum(oid, name.clone());
                names.push(name);
            }
        }
        tracing::debug!("loaded {} enum types", names.len());
        Ok(names)
    }

    /// Cancel the in-progress query of this session from a second
    /// connection, using the stored backend key.
    ///
    /// Best effort: the server may have already finished the query.
    pub async fn cancel(&self) -> Result<()> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        let key = session.key_data;
        let stream = PgStream::connect(
            self.config.get_host(),
            self.config.port,
            self.config.get_timeout(),
            self.config.ssl,
        )
        .await?;
        stream.cancel(key.process_id, key.secret_key).await?;
        Ok(())
    }

    /// Close the session with a best-effort Terminate and release the
    /// socket. Idempotent; the next query reconnects.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.stream.close().await?;
        }
        Ok(())
    }

    async fn open_session(config: &Config) -> Result<Session> {
        tracing::debug!(
            host = config.get_host(),
            port = config.port,
            ssl = config.ssl,
            "opening session",
        );

        let mut stream =
            PgStream::connect(config.get_host(), config.port, config.get_timeout(), config.ssl)
                .await?;

        let outcome = match protocol::startup(config, &mut stream).await {
            Ok(outcome) => outcome,
            // the server closes its end after a startup failure; release
            // the socket and surface
            Err(err) => return Err(err.with_context("startup failed")),
        };

        let converter = Converter::initialize_from(&outcome.params);

        tracing::debug!(
            pid = outcome.key_data.process_id,
            version = outcome.params.get("server_version").map(ByteStr::as_str),
            "session ready",
        );

        Ok(Session {
            stream,
            converter,
            params: outcome.params,
            key_data: outcome.key_data,
            status: SessionStatus::Ready,
        })
    }

    async fn session(&mut self) -> Result<&mut Session> {
        if self.session.is_none() {
            self.session = Some(Self::open_session(&self.config).await?);
        }
        match &mut self.session {
            Some(session) => Ok(session),
            None => unreachable!("session opened above"),
        }
    }

    /// Restore the session state after an operation.
    ///
    /// Server and decode errors were drained to a command boundary, the
    /// session stays usable. Protocol, io and ssl errors leave the stream in
    /// an indeterminate state: drop the socket so the next query reconnects.
    fn settle<T>(&mut self, res: Result<T>) -> Result<T> {
        match &res {
            Ok(_) => {
                if let Some(session) = &mut self.session {
                    session.status = SessionStatus::Ready;
                }
            }
            Err(err) if err.is_recoverable() => {
                if let Some(session) = &mut self.session {
                    session.status = SessionStatus::Ready;
                }
            }
            Err(_) => {
                tracing::debug!("dropping session after fatal error");
                self.session = None;
            }
        }
        res
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn starts_closed() {
        let conn = Connection::from_url("psql://u@localhost").unwrap();
        assert!(!conn.is_connected());
        assert_eq!(conn.status(), SessionStatus::Closed);
        assert!(!conn.ssl());
        assert_eq!(conn.backend_pid(), None);
        assert_eq!(conn.server_version(), None);
    }

    #[test]
    fn rejects_foreign_scheme() {
        assert!(Connection::from_url("postgres://u@localhost").is_err());
    }

    #[test]
    fn format_is_available_offline() {
        let conn = Connection::from_url("psql://u@localhost").unwrap();
        let stmt = conn.format("SELECT $1");
        assert_eq!(stmt.render(&[Value::Int4(1)]).unwrap(), "SELECT 1");
    }
}
