//! Prepared statements: binding, execution and result access.

use crate::connection::{Connection, log_sql};
use crate::decode;
use crate::error::{DbError, DbResult};
use crate::kind::StatementKind;
use crate::named::NamedQuery;
use crate::param::{self, TypedValue};
use crate::value::{Record, Value};
use futures_util::{TryStreamExt, pin_mut};
use std::time::Instant;
use tokio_postgres::Row;

/// A prepared statement on a [`Connection`].
///
/// Rows of the last execute are kept until the next one; [`get_all`] decodes
/// them once and caches the records for the rest of that execute cycle.
///
/// [`get_all`]: Statement::get_all
pub struct Statement<'c> {
    conn: &'c Connection,
    inner: tokio_postgres::Statement,
    query: String,
    named: NamedQuery,
    kind: StatementKind,
    params: Vec<Option<TypedValue>>,
    rows: Vec<Row>,
    rows_affected: u64,
    all_rows: Option<Vec<Record>>,
    insert_id: Option<String>,
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("query", &self.query)
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("rows", &self.rows.len())
            .field("rows_affected", &self.rows_affected)
            .field("insert_id", &self.insert_id)
            .finish_non_exhaustive()
    }
}

impl<'c> Statement<'c> {
    pub(crate) fn new(
        conn: &'c Connection,
        inner: tokio_postgres::Statement,
        query: String,
        named: NamedQuery,
    ) -> Self {
        let kind = StatementKind::from_sql(&query);
        let params = vec![None; named.names.len()];
        Self {
            conn,
            inner,
            query,
            named,
            kind,
            params,
            rows: Vec::new(),
            rows_affected: 0,
            all_rows: None,
            insert_id: None,
        }
    }

    /// Bind values to named placeholders, inferring each storage type.
    ///
    /// Names may be written with or without the leading `:`. Binding a name
    /// again replaces its value.
    pub fn bind(mut self, values: &[(&str, Value)]) -> DbResult<Self> {
        for (name, value) in values {
            let position = self
                .named
                .position(name)
                .ok_or_else(|| DbError::UnknownParameter((*name).to_string()))?;
            self.params[position] = Some(param::infer(Some(*name), value)?);
        }
        Ok(self)
    }

    /// Run the statement.
    ///
    /// Clears cached rows first. After an INSERT that generated a new id the
    /// id is recorded; any other execute clears it. An INSERT that leaves the
    /// session's `lastval()` unchanged (explicit ids, tables without a
    /// sequence) records nothing.
    pub fn execute(&mut self) -> DbResult<&mut Self> {
        self.all_rows = None;
        self.rows.clear();
        self.rows_affected = 0;
        self.insert_id = None;

        let params = self.bound_params()?;
        let previous_id = if self.kind.is_insert() {
            self.conn.last_insert_id()?
        } else {
            None
        };
        let started = Instant::now();
        let client = self.conn.client();
        let inner = &self.inner;
        let result = self.conn.block_on(async {
            let stream = client.query_raw(inner, params).await?;
            pin_mut!(stream);
            let mut rows = Vec::new();
            while let Some(row) = stream.try_next().await? {
                rows.push(row);
            }
            let affected = stream.rows_affected();
            Ok::<_, tokio_postgres::Error>((rows, affected))
        });

        let (rows, affected) = match result {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(target: "pgdb.sql", sql = %log_sql(&self.query), error = %e, "execute failed");
                return Err(DbError::statement(e, self.query.clone()));
            }
        };
        self.rows_affected = affected.unwrap_or(rows.len() as u64);
        self.rows = rows;

        tracing::debug!(
            target: "pgdb.sql",
            sql = %log_sql(&self.query),
            param_count = self.params.len(),
            rows = self.rows_affected,
            elapsed_us = started.elapsed().as_micros() as u64,
            "executed"
        );

        if self.kind.is_insert() && self.rows_affected > 0 {
            self.insert_id = self
                .conn
                .last_insert_id()?
                .filter(|id| previous_id.as_ref() != Some(id));
        }
        Ok(self)
    }

    fn bound_params(&self) -> DbResult<Vec<&TypedValue>> {
        self.params
            .iter()
            .zip(&self.named.names)
            .map(|(value, name)| {
                value.as_ref().ok_or_else(|| DbError::Statement {
                    kind: "MissingParameter".to_string(),
                    message: format!("parameter :{name} was not bound"),
                    query: self.query.clone(),
                    source: None,
                })
            })
            .collect()
    }

    /// All rows of the last execute as associative records.
    pub fn get_all(&mut self) -> DbResult<&[Record]> {
        if self.all_rows.is_none() {
            let records = self
                .rows
                .iter()
                .map(decode::record)
                .collect::<DbResult<Vec<_>>>()?;
            self.all_rows = Some(records);
        }
        Ok(self.all_rows.as_deref().unwrap_or_default())
    }

    /// The first row, or an empty record when there are no rows.
    pub fn get_row(&mut self) -> DbResult<Record> {
        Ok(self.get_all()?.first().cloned().unwrap_or_default())
    }

    /// Values of one column across all rows.
    ///
    /// With `None`, the first column is read straight from the native rows.
    /// With a key, the key must be a column of the first row. No rows always
    /// yields an empty vec.
    pub fn get_column(&mut self, key: Option<&str>) -> DbResult<Vec<Value>> {
        if self.rows.is_empty() {
            return Ok(Vec::new());
        }
        let Some(key) = key else {
            return self
                .rows
                .iter()
                .map(|row| decode::column_value(row, 0))
                .collect();
        };

        let all = self.get_all()?;
        if !all[0].contains_key(key) {
            return Err(DbError::not_found(format!("key not found: {key}")));
        }
        Ok(all
            .iter()
            .map(|record| record.get(key).cloned().unwrap_or(Value::Null))
            .collect())
    }

    /// First value of [`get_column`](Statement::get_column), or `None` when
    /// there are no rows.
    pub fn get(&mut self, key: Option<&str>) -> DbResult<Option<Value>> {
        Ok(self.get_column(key)?.into_iter().next())
    }

    /// Rows affected (or returned) by the last execute.
    pub fn row_count(&self) -> u64 {
        self.rows_affected
    }

    /// Id generated by the last execute.
    pub fn insert_id(&self) -> DbResult<&str> {
        self.insert_id.as_deref().ok_or_else(|| {
            DbError::Logic("insert id requested but nothing was inserted".to_string())
        })
    }

    /// Original query text, as passed to `prepare`.
    pub fn query_string(&self) -> &str {
        &self.query
    }

    /// Result column names.
    pub fn columns(&self) -> Vec<&str> {
        self.inner.columns().iter().map(|c| c.name()).collect()
    }

    /// Placeholder names in the order they appear.
    pub fn parameter_names(&self) -> &[String] {
        &self.named.names
    }

    pub fn connection(&self) -> &'c Connection {
        self.conn
    }
}
