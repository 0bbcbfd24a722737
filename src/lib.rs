//! # dyntable
//! Dynamic finders and a filter/validator pipeline for relational tables.
//!
//! Operations are dispatched against a table by name. Besides the direct operations (`all`,
//! `single`, `count`, `insert`, `update`, `save`, `delete`, `validate`), names of the form
//! `findByNameAndCity` are turned into equality predicates over the columns they name, and names
//! of the form `findOrCreateByEmail` additionally insert a row when nothing is found. Every
//! insert, update, and delete is preceded by the filters registered for the table, and every
//! insert and update reports the names of the validators that the record failed.
//!
//! ```
//! use dyntable::{MemoryDriver, Outcome, Record, Registry, Value};
//! use std::sync::Arc;
//!
//! let registry = Registry::new();
//! registry.add_connection("main", Arc::new(MemoryDriver::new()));
//! registry.register("Users", |table| {
//!     table
//!         .set_primary_key("Id")
//!         .before_save(|user| {
//!             if let Some(Value::String(email)) = user.get_mut("Email") {
//!                 *email = email.to_lowercase();
//!             }
//!             Ok(())
//!         })
//!         .add_validator("required_name", |user| user.get("Name").is_none())
//! });
//!
//! let users = registry.create_context("Users", None, None).unwrap();
//! let ann = Record::new().with("Name", "Ann").with("Email", "Ann@Example.com");
//! users.dispatch("insert", &[ann.into()]).unwrap();
//! let found = users
//!     .dispatch("findByEmail", &["ann@example.com".into()])
//!     .unwrap();
//! assert_eq!(found.records().len(), 1);
//! ```
//!
//! ## Command line usage
//! Run:
//! ```text
//! dyntable --help
//! ```
//! to see command line options.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod pipeline;
pub mod predicate;
pub mod record;
pub mod registry;
pub mod settings;
pub mod sql;

pub use crate::{
    config::{ActionKind, FilterFn, TableConfiguration, TableConfigurationBuilder, ValidatorFn},
    dispatch::{classify, DirectOp, Invocation, Outcome, TableContext},
    driver::{MemoryDriver, StoreDriver},
    pipeline::ValidationResult,
    predicate::{translate, Condition, Operator, QueryPredicate},
    record::{Record, Value},
    registry::Registry,
    settings::{Settings, TableSettings},
    sql::SqlDriver,
};
use std::error::Error;

/// The primary key field assumed for tables whose configuration does not name one.
pub static DEFAULT_PRIMARY_KEY: &str = "Id";

/// Generic enum representing the errors returned by dyntable functions. These are returned
/// wrapped in an [anyhow::Error] and can be recovered using
/// [downcast_ref()](anyhow::Error::downcast_ref).
#[derive(Debug)]
pub enum DynTableError {
    /// A dispatched method name that is neither a direct operation nor a finder:
    UnresolvedMember(String),
    /// A call with fewer (or, for direct operations, other) arguments than the method requires:
    ArgumentArityMismatch {
        method: String,
        expected: usize,
        supplied: usize,
    },
    /// An argument of the wrong kind, e.g., a number where a record was expected:
    ArgumentTypeError(String),
    /// A finder method name that does not name a valid list of columns:
    MalformedMethodName(String),
    /// An error in the configuration or settings:
    ConfigError(String),
    /// An error involving the data returned by the store:
    DataError(String),
    /// An error in the inputs to a function:
    InputError(String),
}

impl std::fmt::Display for DynTableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Error for DynTableError {}
