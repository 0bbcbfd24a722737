//! A [StoreDriver] backed by a SQLite or PostgreSQL database

use crate::{
    driver::{require_identity, StoreDriver},
    predicate::QueryPredicate,
    record::{Record, Value},
    DynTableError,
};
use anyhow::Result;
use async_std::task::block_on;
use futures::TryStreamExt;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use sqlx::{
    any::{Any, AnyArguments, AnyConnectOptions, AnyKind, AnyPool, AnyPoolOptions, AnyRow},
    query::Query,
    query as sqlx_query, Column, Row, ValueRef,
};
use std::str::FromStr;

/// The maximum number of connections held by the pool of a file-backed or server database.
static MAX_DB_CONNECTIONS: u32 = 5;

// Note that SQL_PARAM must be a 'word' (from the point of view of regular expressions) since in
// local_sql_syntax() we match it using '\b', which represents a word boundary.
/// The placeholder used for query parameters before they are converted to the local syntax.
pub static SQL_PARAM: &str = "DYNPARAM";

lazy_static! {
    // Matches either a quoted string, which is left alone, or a parameter placeholder.
    static ref SQL_PARAM_RE: Regex = Regex::new(&format!(
        r#"('[^'\\]*(?:\\.[^'\\]*)*'|"[^"\\]*(?:\\.[^"\\]*)*")|\b{}\b"#,
        SQL_PARAM
    ))
    .unwrap();
}

/// Given a database connection string, return a connection pool for it. The string can be a URL
/// of the form `postgresql://...` or `sqlite://...`, or the path of a SQLite database file, which
/// is created if it does not exist. In-memory SQLite databases are given a single connection,
/// since each connection to such a database sees a database of its own.
pub async fn get_pool_from_connection_string(database: &str) -> Result<AnyPool> {
    let connection_string = if database.starts_with("postgresql://")
        || database.starts_with("postgres://")
        || database.starts_with("sqlite:")
    {
        database.to_string()
    } else {
        format!("sqlite://{}?mode=rwc", database)
    };
    let connection_options = AnyConnectOptions::from_str(&connection_string)?;
    let max_connections = if database.contains(":memory:") {
        1
    } else {
        MAX_DB_CONNECTIONS
    };

    let pool = AnyPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(connection_options)
        .await?;
    Ok(pool)
}

/// Given a SQL string containing [SQL_PARAM] placeholders, replace each placeholder that is not
/// within quotation marks with the parameter syntax of the pool's database: `$1`, `$2`, ... for
/// PostgreSQL and `?` for SQLite.
pub fn local_sql_syntax(kind: AnyKind, sql: &str) -> String {
    let mut final_sql = String::from("");
    let mut pg_param_idx = 1;
    let mut saved_start = 0;
    for m in SQL_PARAM_RE.find_iter(sql) {
        let this_match = m.as_str();
        final_sql.push_str(&sql[saved_start..m.start()]);
        if this_match == SQL_PARAM {
            if kind == AnyKind::Postgres {
                final_sql.push_str(&format!("${}", pg_param_idx));
                pg_param_idx += 1;
            } else {
                final_sql.push_str("?");
            }
        } else {
            final_sql.push_str(this_match);
        }
        saved_start = m.end();
    }
    final_sql.push_str(&sql[saved_start..]);
    final_sql
}

/// Double-quotes the given identifier, doubling any double quotes within it.
pub fn quote_identifier(identifier: &str) -> String {
    format!(r#""{}""#, identifier.replace('"', r#""""#))
}

fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &Value,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Integer(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::String(_) | Value::Date(_) => query.bind(value.to_string()),
        Value::Record(r) => query.bind(r.to_json().to_string()),
    }
}

/// Converts a database row into a [Record], decoding each cell as the first of text, integer,
/// real, or boolean that the database accepts for the cell's type.
fn record_from_row(row: &AnyRow) -> Result<Record> {
    let mut record = Record::new();
    for column in row.columns() {
        let i = column.ordinal();
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else if let Ok(s) = row.try_get::<String, _>(i) {
            Value::String(s)
        } else if let Ok(n) = row.try_get::<i64, _>(i) {
            Value::Integer(n)
        } else if let Ok(n) = row.try_get::<i32, _>(i) {
            Value::Integer(n as i64)
        } else if let Ok(f) = row.try_get::<f64, _>(i) {
            Value::Float(f)
        } else if let Ok(f) = row.try_get::<f32, _>(i) {
            Value::Float(f as f64)
        } else if let Ok(b) = row.try_get::<bool, _>(i) {
            Value::Bool(b)
        } else {
            return Err(DynTableError::DataError(format!(
                "Unable to decode column '{}'",
                column.name()
            ))
            .into());
        };
        record.insert(column.name(), value);
    }
    Ok(record)
}

fn where_clause(predicate: &QueryPredicate) -> String {
    if predicate.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", predicate.to_sql())
    }
}

/// A [StoreDriver] that runs its queries against a database through a sqlx connection pool.
/// Predicates are embedded into the generated SQL as literals, while the values of inserted and
/// updated records are bound as parameters.
#[derive(Clone, Debug)]
pub struct SqlDriver {
    pub pool: AnyPool,
    pub database: String,
}

impl SqlDriver {
    /// Connects to the given database. See [get_pool_from_connection_string()].
    pub fn connect(database: &str) -> Result<Self> {
        let pool = block_on(get_pool_from_connection_string(database))?;
        log::info!("Connected to '{}' ({:?})", database, pool.any_kind());
        Ok(Self {
            pool,
            database: database.to_string(),
        })
    }

    /// Runs the given statement and returns the number of rows affected by it.
    pub fn execute(&self, sql: &str) -> Result<u64> {
        let result = block_on(sqlx_query(sql).execute(&self.pool))?;
        Ok(result.rows_affected())
    }

    fn query(&self, sql: &str) -> Result<Vec<Record>> {
        log::debug!("Running query: {}", sql);
        block_on(async {
            let mut records = vec![];
            let mut stream = sqlx_query(sql).fetch(&self.pool);
            while let Some(row) = stream.try_next().await? {
                records.push(record_from_row(&row)?);
            }
            Ok::<_, anyhow::Error>(records)
        })
    }
}

impl StoreDriver for SqlDriver {
    fn find(&self, table: &str, predicate: &QueryPredicate) -> Result<Vec<Record>> {
        self.query(&format!(
            "SELECT * FROM {}{}",
            quote_identifier(table),
            where_clause(predicate)
        ))
    }

    fn count(&self, table: &str, predicate: &QueryPredicate) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            quote_identifier(table),
            where_clause(predicate)
        );
        log::debug!("Running query: {}", sql);
        let row = block_on(sqlx_query(&sql).fetch_one(&self.pool))?;
        let count: i64 = row.try_get(0)?;
        Ok(count as u64)
    }

    fn insert(&self, table: &str, primary_key: &str, mut record: Record) -> Result<Record> {
        let sql = if record.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table))
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_identifier(table),
                record.keys().map(|field| quote_identifier(field)).join(", "),
                record.keys().map(|_| SQL_PARAM).join(", ")
            )
        };
        let sql = local_sql_syntax(self.pool.any_kind(), &sql);
        log::debug!("Running statement: {}", sql);

        let mut query = sqlx_query(&sql);
        for (_, value) in &record {
            query = bind_value(query, value);
        }
        let result = block_on(query.execute(&self.pool))?;

        if !record.contains_key_ignore_case(primary_key) {
            if let Some(id) = result.last_insert_id() {
                record.insert(primary_key, id);
            }
        }
        Ok(record)
    }

    fn update(&self, table: &str, primary_key: &str, record: &Record) -> Result<()> {
        let key = require_identity(record, table, primary_key)?;
        let fields = record
            .iter()
            .filter(|(field, _)| !field.eq_ignore_ascii_case(primary_key))
            .collect::<Vec<_>>();
        if fields.is_empty() {
            log::debug!("Nothing to update in '{}' for {} = {}", table, primary_key, key);
            return Ok(());
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            quote_identifier(table),
            fields
                .iter()
                .map(|(field, _)| format!("{} = {}", quote_identifier(field), SQL_PARAM))
                .join(", "),
            quote_identifier(primary_key),
            SQL_PARAM
        );
        let sql = local_sql_syntax(self.pool.any_kind(), &sql);
        log::debug!("Running statement: {}", sql);

        let mut query = sqlx_query(&sql);
        for (_, value) in &fields {
            query = bind_value(query, value);
        }
        query = bind_value(query, key);
        let result = block_on(query.execute(&self.pool))?;
        if result.rows_affected() == 0 {
            log::warn!("No row of '{}' has {} = {}", table, primary_key, key);
        }
        Ok(())
    }

    fn delete(&self, table: &str, primary_key: &str, record: &Record) -> Result<()> {
        let key = require_identity(record, table, primary_key)?;
        let sql = local_sql_syntax(
            self.pool.any_kind(),
            &format!(
                "DELETE FROM {} WHERE {} = {}",
                quote_identifier(table),
                quote_identifier(primary_key),
                SQL_PARAM
            ),
        );
        log::debug!("Running statement: {}", sql);
        let result = block_on(bind_value(sqlx_query(&sql), key).execute(&self.pool))?;
        if result.rows_affected() == 0 {
            log::warn!("No row of '{}' has {} = {}", table, primary_key, key);
        }
        Ok(())
    }
}
