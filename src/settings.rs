//! Declarative settings read from a JSON file

use crate::{driver::StoreDriver, registry::Registry, sql::SqlDriver, DynTableError};
use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{fs::File, path::Path, sync::Arc};

/// The environment variable that the command line reads the location of the settings file from.
pub static SETTINGS_ENV: &str = "DYNTABLE_SETTINGS";

/// The environment variable that the command line reads the database connection string from.
pub static DATABASE_ENV: &str = "DYNTABLE_DATABASE";

/// The settings for a single table. Only `name` is required.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct TableSettings {
    /// The name that the table is registered under
    pub name: String,
    /// The name of the table in the database, if different from `name`
    #[serde(default)]
    pub table: Option<String>,
    /// The connection the table lives on. When absent the default connection is used.
    #[serde(default)]
    pub connection: Option<String>,
    /// The table's primary key. When absent, [DEFAULT_PRIMARY_KEY](crate::DEFAULT_PRIMARY_KEY)
    /// is used.
    #[serde(default)]
    pub primary_key: Option<String>,
}

/// Settings in the following format:
/// ```json
/// {
///     "connections": {"main": "sqlite://app.db", "reporting": "postgresql:///reports"},
///     "tables": [
///         {"name": "Users", "primary_key": "UserId"},
///         {"name": "Reports", "table": "monthly_report", "connection": "reporting"}
///     ]
/// }
/// ```
/// Connections are listed in order; the first one is the default connection. Filters and
/// validators cannot be expressed in settings and must be registered in code.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub connections: IndexMap<String, String>,
    #[serde(default)]
    pub tables: Vec<TableSettings>,
}

impl Settings {
    /// Reads the settings from the JSON file at the given path.
    pub fn from_path(path: &str) -> Result<Self> {
        if !Path::new(path).is_file() {
            return Err(
                DynTableError::ConfigError(format!("Settings file '{}' not found", path)).into(),
            );
        }
        let file = File::open(path)?;
        let settings: Settings = serde_json::from_reader(file)?;
        settings.check()?;
        Ok(settings)
    }

    /// Parses the settings from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.check()?;
        Ok(settings)
    }

    /// Checks that every table refers to a known connection.
    fn check(&self) -> Result<()> {
        for table in &self.tables {
            if let Some(connection) = &table.connection {
                if !self.connections.contains_key(connection) {
                    return Err(DynTableError::ConfigError(format!(
                        "Table '{}' refers to an undefined connection '{}'",
                        table.name, connection
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
}

impl Registry {
    /// Builds a registry out of the given settings, connecting to each configured database with a
    /// [SqlDriver].
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::from_settings_with(settings, |database| {
            Ok(Arc::new(SqlDriver::connect(database)?) as Arc<dyn StoreDriver>)
        })
    }

    /// Builds a registry out of the given settings, using `connect` to obtain a driver for each
    /// configured connection string.
    pub fn from_settings_with<F>(settings: &Settings, connect: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<Arc<dyn StoreDriver>>,
    {
        let registry = Registry::new();
        for (name, database) in &settings.connections {
            registry.add_connection(name, connect(database)?);
        }
        for table in &settings.tables {
            registry.register(&table.name, |mut builder| {
                if let Some(table_name) = &table.table {
                    builder = builder.set_table(table_name);
                }
                if let Some(connection) = &table.connection {
                    builder = builder.set_connection(connection);
                }
                if let Some(primary_key) = &table.primary_key {
                    builder = builder.set_primary_key(primary_key);
                }
                builder
            });
        }
        Ok(registry)
    }
}
