//! The store driver interface, and an in-memory implementation of it

use crate::{
    predicate::QueryPredicate,
    record::{Record, Value},
    DynTableError,
};
use anyhow::Result;
use indexmap::IndexMap;
use std::sync::{Mutex, MutexGuard};

/// The relational store that table contexts delegate to. Implementations own the execution of
/// queries, connection management, and any transaction or retry semantics.
pub trait StoreDriver: Send + Sync {
    /// Return the rows of `table` satisfying the predicate (all rows if it is empty).
    fn find(&self, table: &str, predicate: &QueryPredicate) -> Result<Vec<Record>>;

    /// Return the number of rows of `table` satisfying the predicate.
    fn count(&self, table: &str, predicate: &QueryPredicate) -> Result<u64> {
        Ok(self.find(table, predicate)?.len() as u64)
    }

    /// Insert the record into `table` and return it as stored, i.e., carrying its primary key
    /// when the store assigned one.
    fn insert(&self, table: &str, primary_key: &str, record: Record) -> Result<Record>;

    /// Overwrite the fields given in the record for the row identified by its primary key.
    fn update(&self, table: &str, primary_key: &str, record: &Record) -> Result<()>;

    /// Delete the row identified by the record's primary key.
    fn delete(&self, table: &str, primary_key: &str, record: &Record) -> Result<()>;
}

/// Returns the (non-null) value of the record's primary key field, which is looked up
/// case-insensitively.
pub fn identity<'a>(record: &'a Record, primary_key: &str) -> Option<&'a Value> {
    record
        .get_ignore_case(primary_key)
        .filter(|value| !value.is_null())
}

/// Like [identity()] but fails if the record has no primary key value.
pub fn require_identity<'a>(
    record: &'a Record,
    table: &str,
    primary_key: &str,
) -> Result<&'a Value> {
    identity(record, primary_key).ok_or_else(|| {
        DynTableError::InputError(format!(
            "Record {} for table '{}' has no value for its primary key '{}'",
            record.to_json(),
            table,
            primary_key
        ))
        .into()
    })
}

/// A [StoreDriver] that keeps its tables in memory. Tables spring into existence on first use.
/// Records inserted without a primary key are given the next available integer key.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    tables: Mutex<IndexMap<String, Vec<Record>>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, IndexMap<String, Vec<Record>>>> {
        self.tables.lock().map_err(|e| {
            DynTableError::DataError(format!("In-memory store is unusable: {}", e)).into()
        })
    }

    /// Returns a copy of the rows currently held for the given table.
    pub fn rows(&self, table: &str) -> Result<Vec<Record>> {
        Ok(self.lock()?.get(table).cloned().unwrap_or_default())
    }

    /// Adds the given rows to the table without going through [StoreDriver::insert()].
    pub fn seed(&self, table: &str, rows: Vec<Record>) -> Result<()> {
        self.lock()?
            .entry(table.to_string())
            .or_default()
            .extend(rows);
        Ok(())
    }
}

fn same_identity(row: &Record, primary_key: &str, key: &Value) -> bool {
    identity(row, primary_key).map_or(false, |v| v.to_sql_literal() == key.to_sql_literal())
}

impl StoreDriver for MemoryDriver {
    fn find(&self, table: &str, predicate: &QueryPredicate) -> Result<Vec<Record>> {
        Ok(self
            .lock()?
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| predicate.matches(row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn insert(&self, table: &str, primary_key: &str, mut record: Record) -> Result<Record> {
        let mut tables = self.lock()?;
        let rows = tables.entry(table.to_string()).or_default();
        if identity(&record, primary_key).is_none() {
            let next_id = rows
                .iter()
                .filter_map(|row| identity(row, primary_key).and_then(|v| v.as_i64()))
                .max()
                .unwrap_or(0)
                .checked_add(1)
                .ok_or_else(|| {
                    DynTableError::DataError(format!(
                        "No integer {} is left for a new row of '{}'",
                        primary_key, table
                    ))
                })?;
            let field = record
                .field_name_ignore_case(primary_key)
                .unwrap_or(primary_key)
                .to_string();
            record.insert(&field, next_id);
        }
        rows.push(record.clone());
        Ok(record)
    }

    fn update(&self, table: &str, primary_key: &str, record: &Record) -> Result<()> {
        let key = require_identity(record, table, primary_key)?;
        let mut tables = self.lock()?;
        let mut updated = 0;
        for row in tables.get_mut(table).into_iter().flatten() {
            if same_identity(row, primary_key, key) {
                for (field, value) in record {
                    let field = row.field_name_ignore_case(field).unwrap_or(field).to_string();
                    row.insert(&field, value.clone());
                }
                updated += 1;
            }
        }
        if updated == 0 {
            log::warn!("No row of '{}' has {} = {}", table, primary_key, key);
        }
        Ok(())
    }

    fn delete(&self, table: &str, primary_key: &str, record: &Record) -> Result<()> {
        let key = require_identity(record, table, primary_key)?;
        let mut tables = self.lock()?;
        if let Some(rows) = tables.get_mut(table) {
            let before = rows.len();
            rows.retain(|row| !same_identity(row, primary_key, key));
            if rows.len() == before {
                log::warn!("No row of '{}' has {} = {}", table, primary_key, key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_rows_are_given_the_next_key() {
        let driver = MemoryDriver::new();
        driver
            .seed("Users", vec![Record::new().with("Id", 4).with("Name", "Ann")])
            .unwrap();
        let row = driver
            .insert("Users", "Id", Record::new().with("Name", "Bob"))
            .unwrap();
        assert_eq!(row.get_i64("Id"), Some(5));
        assert_eq!(driver.rows("Users").unwrap().len(), 2);
    }

    #[test]
    fn running_out_of_keys_is_an_error() {
        let driver = MemoryDriver::new();
        driver
            .seed("Users", vec![Record::new().with("Id", i64::MAX)])
            .unwrap();
        let err = driver
            .insert("Users", "Id", Record::new().with("Name", "Bob"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DynTableError>(),
            Some(DynTableError::DataError(_))
        ));
        assert_eq!(driver.rows("Users").unwrap().len(), 1);
    }

    #[test]
    fn update_and_delete_use_the_primary_key() {
        let driver = MemoryDriver::new();
        let ann = driver
            .insert("Users", "Id", Record::new().with("Name", "Ann"))
            .unwrap();
        driver
            .update("Users", "id", &Record::new().with("id", 1).with("name", "Anne"))
            .unwrap();
        let rows = driver.rows("Users").unwrap();
        assert_eq!(rows[0].get_str("Name"), Some("Anne"));
        assert_eq!(rows[0].keys().count(), 2);

        assert!(driver.delete("Users", "Id", &Record::new()).is_err());
        driver.delete("Users", "Id", &ann).unwrap();
        assert!(driver.rows("Users").unwrap().is_empty());
    }
}
