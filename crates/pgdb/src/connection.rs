//! The database connection.
//!
//! A [`Connection`] owns one `tokio_postgres::Client` together with a private
//! current-thread runtime that drives it. Every public call blocks until the
//! server has answered, so the connection can be used from plain synchronous
//! code. Calling it from inside another tokio runtime is not supported.
//!
//! # Example
//!
//! ```ignore
//! use pgdb::{Connection, DbConfig, params};
//!
//! let conn = Connection::open(&DbConfig::from_env()?)?;
//! let mut stmt = conn.query(
//!     "SELECT id, name FROM users WHERE active = :active",
//!     &params! { "active" => true },
//! )?;
//! for user in stmt.get_all()? {
//!     println!("{:?}", user.get("name"));
//! }
//! ```

use crate::config::DbConfig;
use crate::error::{DbError, DbResult};
use crate::named;
use crate::param::{self, ParamType, TypedValue};
use crate::statement::Statement;
use crate::value::Value;
use std::cell::Cell;
use std::future::Future;
use std::time::Instant;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls};

/// Session time zone; all timestamps are normalized to it.
pub const TIME_ZONE: &str = "UTC";

const SQL_LOG_MAX_BYTES: usize = 200;
const INSERT_ID_SAVEPOINT: &str = "pgdb_last_insert_id";

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

/// SQL shortened for log output.
pub(crate) fn log_sql(sql: &str) -> String {
    match truncate_sql_bytes(sql, SQL_LOG_MAX_BYTES) {
        short if short.len() < sql.len() => format!("{short}..."),
        _ => sql.to_string(),
    }
}

/// A live database connection.
///
/// Not `Sync`: a connection and its statements belong to one thread at a time.
pub struct Connection {
    runtime: Runtime,
    client: Client,
    driver: JoinHandle<()>,
    in_transaction: Cell<bool>,
    host: String,
    database: String,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("in_transaction", &self.in_transaction.get())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Connect and prepare the session (UTF-8 client encoding, UTC time zone).
    pub fn open(config: &DbConfig) -> DbResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbError::Connection(format!("failed to start driver runtime: {e}")))?;

        let (client, connection) = runtime
            .block_on(config.to_pg_config().connect(NoTls))
            .map_err(|e| {
                DbError::Connection(format!(
                    "{}:{}/{} as {}: {e}",
                    config.host, config.port, config.database, config.user
                ))
            })?;
        let driver = runtime.spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(target: "pgdb.connection", error = %e, "connection closed with error");
            }
        });

        let conn = Self {
            runtime,
            client,
            driver,
            in_transaction: Cell::new(false),
            host: config.host.clone(),
            database: config.database.clone(),
        };

        let setup = format!("SET NAMES 'UTF8'; SET TIME ZONE '{TIME_ZONE}'");
        conn.block_on(conn.client.batch_execute(&setup))
            .map_err(|e| DbError::Connection(format!("session setup failed: {e}")))?;

        tracing::info!(
            target: "pgdb.connection",
            host = %config.host,
            port = config.port,
            database = %config.database,
            user = %config.user,
            "connected"
        );
        Ok(conn)
    }

    /// Prepare, bind and execute in one step.
    pub fn query(&self, text: &str, values: &[(&str, Value)]) -> DbResult<Statement<'_>> {
        let mut stmt = self.prepare(text)?.bind(values)?;
        stmt.execute()?;
        Ok(stmt)
    }

    /// Compile a statement written with `:name` placeholders.
    pub fn prepare(&self, text: &str) -> DbResult<Statement<'_>> {
        let named = named::rewrite(text);
        let started = Instant::now();
        let inner = self
            .block_on(self.client.prepare(&named.sql))
            .map_err(|e| DbError::statement(e, text))?;
        tracing::debug!(
            target: "pgdb.sql",
            sql = %log_sql(text),
            param_count = named.names.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "prepared"
        );
        Ok(Statement::new(self, inner, text.to_string(), named))
    }

    /// Most recent auto-generated identifier of this session.
    ///
    /// `None` when no sequence value has been generated yet, or it is zero.
    /// Inside a transaction the probe runs under a savepoint so that an
    /// undefined `lastval()` does not abort the transaction.
    pub fn last_insert_id(&self) -> DbResult<Option<String>> {
        let probe = async {
            if !self.in_transaction.get() {
                return self.client.query_one("SELECT lastval()", &[]).await;
            }
            self.client
                .batch_execute(&format!("SAVEPOINT {INSERT_ID_SAVEPOINT}"))
                .await?;
            let result = self.client.query_one("SELECT lastval()", &[]).await;
            let cleanup = match result {
                Ok(_) => format!("RELEASE SAVEPOINT {INSERT_ID_SAVEPOINT}"),
                Err(_) => format!(
                    "ROLLBACK TO SAVEPOINT {INSERT_ID_SAVEPOINT}; RELEASE SAVEPOINT {INSERT_ID_SAVEPOINT}"
                ),
            };
            self.client.batch_execute(&cleanup).await?;
            result
        };

        match self.block_on(probe) {
            Ok(row) => {
                let id: i64 = row.try_get(0)?;
                Ok((id != 0).then(|| id.to_string()))
            }
            Err(e) if e.code() == Some(&SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE) => Ok(None),
            Err(e) => Err(DbError::Query(e)),
        }
    }

    /// Start a transaction. Returns `self` for chaining.
    pub fn begin_transaction(&self) -> DbResult<&Self> {
        if self.in_transaction.get() {
            return Err(DbError::Transaction(
                "there is already an active transaction".into(),
            ));
        }
        self.block_on(self.client.batch_execute("BEGIN"))?;
        self.in_transaction.set(true);
        tracing::debug!(target: "pgdb.connection", "transaction started");
        Ok(self)
    }

    pub fn is_in_transaction(&self) -> bool {
        self.in_transaction.get()
    }

    pub fn commit(&self) -> DbResult<()> {
        self.end_transaction("COMMIT")
    }

    pub fn rollback(&self) -> DbResult<()> {
        self.end_transaction("ROLLBACK")
    }

    fn end_transaction(&self, command: &str) -> DbResult<()> {
        if !self.in_transaction.get() {
            return Err(DbError::Transaction("there is no active transaction".into()));
        }
        // The server ends the transaction even when COMMIT fails.
        self.in_transaction.set(false);
        self.block_on(self.client.batch_execute(command))?;
        tracing::debug!(target: "pgdb.connection", command, "transaction finished");
        Ok(())
    }

    /// Infer how a value would be bound: the storage type and the value in
    /// that type.
    pub fn value_and_type_for(&self, value: &Value) -> DbResult<(TypedValue, ParamType)> {
        let typed = param::infer(None, value)?;
        let ty = typed.param_type();
        Ok((typed, ty))
    }

    /// Render a value as a SQL literal, using the same inference as binding.
    pub fn quote(&self, value: &Value) -> DbResult<String> {
        let (typed, _) = self.value_and_type_for(value)?;
        typed.to_sql_literal()
    }

    /// Session time zone identifier.
    pub fn time_zone(&self) -> &'static str {
        TIME_ZONE
    }

    /// Close the connection, waiting for the driver to shut down.
    pub fn close(self) {
        let Connection {
            runtime,
            client,
            driver,
            host,
            database,
            ..
        } = self;
        drop(client);
        if let Err(e) = runtime.block_on(driver) {
            tracing::warn!(target: "pgdb.connection", error = %e, "driver task failed");
        }
        tracing::info!(target: "pgdb.connection", host = %host, database = %database, "closed");
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}
