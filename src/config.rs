//! Per-table configuration and the builder used to declare it

use crate::{record::Record, DEFAULT_PRIMARY_KEY};
use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};

/// The mutation before which a filter runs.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Deserialize, Serialize)]
pub enum ActionKind {
    BeforeSave,
    BeforeDelete,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::BeforeSave => write!(f, "before_save"),
            ActionKind::BeforeDelete => write!(f, "before_delete"),
        }
    }
}

/// A function that is given the record about to be saved or deleted and may modify it in place.
/// Filters are not expected to fail; returning an error aborts the mutation and the error is
/// passed on to the caller as is.
pub type FilterFn = Arc<dyn Fn(&mut Record) -> Result<()> + Sync + Send>;

/// A named validation rule. Note the polarity: a validator returns `true` when the record
/// *fails* the rule, in which case the validator's name is reported.
pub type ValidatorFn = Arc<dyn Fn(&Record) -> bool + Sync + Send>;

/// The frozen configuration of a table. Instances are produced by
/// [TableConfigurationBuilder::build()] and are not modified afterwards.
#[derive(Clone)]
pub struct TableConfiguration {
    /// The name of the table in the database
    pub table_name: String,
    /// The name of the connection that the table lives on. None means "the default connection".
    pub connection: Option<String>,
    /// The name of the table's primary key field
    pub primary_key: String,
    /// The filters to run before each kind of mutation, in registration order
    pub filters: HashMap<ActionKind, Vec<FilterFn>>,
    /// The table's validators, in registration order, indexed by rule name
    pub validators: IndexMap<String, ValidatorFn>,
}

impl TableConfiguration {
    /// A configuration with no filters and no validators.
    pub fn plain(table_name: &str, connection: Option<&str>, primary_key: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            connection: connection.map(|c| c.to_string()),
            primary_key: primary_key.to_string(),
            filters: HashMap::new(),
            validators: IndexMap::new(),
        }
    }

    pub fn filters_for(&self, kind: ActionKind) -> &[FilterFn] {
        self.filters.get(&kind).map(|f| f.as_slice()).unwrap_or(&[])
    }

    pub fn summary(&self) -> TableSummary {
        TableSummary {
            table: self.table_name.clone(),
            connection: self.connection.clone(),
            primary_key: self.primary_key.clone(),
            filters: [ActionKind::BeforeSave, ActionKind::BeforeDelete]
                .into_iter()
                .map(|kind| (kind.to_string(), self.filters_for(kind).len()))
                .collect(),
            validators: self.validators.keys().cloned().collect(),
        }
    }
}

impl fmt::Debug for TableConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.summary())
    }
}

/// A serializable description of a [TableConfiguration]. Filters are reported by count and
/// validators by name since functions themselves cannot be rendered.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub connection: Option<String>,
    pub primary_key: String,
    pub filters: IndexMap<String, usize>,
    pub validators: Vec<String>,
}

/// Declares the configuration of a table. For instance:
/// ```
/// use dyntable::{ActionKind, TableConfigurationBuilder};
///
/// let config = TableConfigurationBuilder::new("Users")
///     .set_connection("main")
///     .set_primary_key("UserId")
///     .add_filter(ActionKind::BeforeSave, |_record| Ok(()))
///     .add_validator("required_name", |record| record.get("Name").is_none())
///     .build();
/// assert_eq!(config.primary_key, "UserId");
/// ```
pub struct TableConfigurationBuilder {
    config: TableConfiguration,
}

impl TableConfigurationBuilder {
    /// A fresh builder for the table registered under `name`. Unless changed, the table name is
    /// `name` itself, the primary key is [DEFAULT_PRIMARY_KEY], and the default connection is used.
    pub fn new(name: &str) -> Self {
        Self {
            config: TableConfiguration::plain(name, None, DEFAULT_PRIMARY_KEY),
        }
    }

    pub fn set_table(mut self, table_name: &str) -> Self {
        self.config.table_name = table_name.to_string();
        self
    }

    pub fn set_connection(mut self, connection: &str) -> Self {
        self.config.connection = Some(connection.to_string());
        self
    }

    pub fn set_primary_key(mut self, primary_key: &str) -> Self {
        self.config.primary_key = primary_key.to_string();
        self
    }

    pub fn add_filter<F>(mut self, kind: ActionKind, filter: F) -> Self
    where
        F: Fn(&mut Record) -> Result<()> + Sync + Send + 'static,
    {
        self.config
            .filters
            .entry(kind)
            .or_default()
            .push(Arc::new(filter));
        self
    }

    pub fn before_save<F>(self, filter: F) -> Self
    where
        F: Fn(&mut Record) -> Result<()> + Sync + Send + 'static,
    {
        self.add_filter(ActionKind::BeforeSave, filter)
    }

    pub fn before_delete<F>(self, filter: F) -> Self
    where
        F: Fn(&mut Record) -> Result<()> + Sync + Send + 'static,
    {
        self.add_filter(ActionKind::BeforeDelete, filter)
    }

    /// Adds the named validator. The validator must return `true` when the record fails the rule.
    /// Adding a second validator with the same name replaces the first one but keeps its position.
    pub fn add_validator<F>(mut self, name: &str, validator: F) -> Self
    where
        F: Fn(&Record) -> bool + Sync + Send + 'static,
    {
        self.config
            .validators
            .insert(name.to_string(), Arc::new(validator));
        self
    }

    pub fn build(self) -> TableConfiguration {
        self.config
    }
}
