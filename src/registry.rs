//! The registry of table configurations and store connections

use crate::{
    config::{TableConfiguration, TableConfigurationBuilder},
    dispatch::TableContext,
    driver::StoreDriver,
    DynTableError, DEFAULT_PRIMARY_KEY,
};
use anyhow::Result;
use indexmap::IndexMap;
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

/// Holds the configurations of the tables known to an application, and the named connections
/// (store drivers) that those tables live on. Tables are expected to be registered at start-up,
/// after which the registry is only read from, although registering later is safe.
#[derive(Default)]
pub struct Registry {
    tables: RwLock<HashMap<String, Arc<TableConfiguration>>>,
    connections: RwLock<IndexMap<String, Arc<dyn StoreDriver>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("tables", &self.table_names())
            .field("connections", &self.connection_names())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the given driver available under the given connection name, replacing any driver
    /// previously added under that name. The first connection added is the default connection.
    pub fn add_connection(&self, name: &str, driver: Arc<dyn StoreDriver>) {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), driver);
    }

    pub fn connection_names(&self) -> Vec<String> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Returns the driver for the named connection, or for the default connection if no name is
    /// given.
    pub fn connection(&self, name: Option<&str>) -> Result<Arc<dyn StoreDriver>> {
        let connections = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let driver = match name {
            Some(name) => connections.get(name),
            None => connections.values().next(),
        };
        driver.cloned().ok_or_else(|| {
            DynTableError::ConfigError(match name {
                Some(name) => format!("No connection named '{}'", name),
                None => "No connections have been configured".to_string(),
            })
            .into()
        })
    }

    /// Calls `builder_fn` with a fresh [TableConfigurationBuilder] for `name` and stores the
    /// configuration it builds under `name`. Registering a name that is already registered
    /// replaces its configuration.
    pub fn register<F>(&self, name: &str, builder_fn: F)
    where
        F: FnOnce(TableConfigurationBuilder) -> TableConfigurationBuilder,
    {
        let config = builder_fn(TableConfigurationBuilder::new(name)).build();
        log::debug!("Registering table '{}': {:?}", name, config);
        let previous = self
            .tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::new(config));
        if previous.is_some() {
            log::info!("Replaced the configuration registered for '{}'", name);
        }
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<TableConfiguration>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Returns a context for the table registered under `name`. The registered connection and
    /// primary key take precedence over the given ones; `connection` is only used when the
    /// registered configuration names no connection. If nothing is registered under `name`, the
    /// context is made for a table called `name` on the given connection, with the given primary
    /// key (or [DEFAULT_PRIMARY_KEY]), and with no filters or validators. In either case the
    /// default connection is used when no connection is known.
    pub fn create_context(
        &self,
        name: &str,
        connection: Option<&str>,
        primary_key: Option<&str>,
    ) -> Result<TableContext> {
        let config = match self.resolve(name) {
            Some(config) => config,
            None => {
                log::debug!("No configuration registered for '{}'", name);
                Arc::new(TableConfiguration::plain(
                    name,
                    connection,
                    primary_key.unwrap_or(DEFAULT_PRIMARY_KEY),
                ))
            }
        };
        let connection = config.connection.as_deref().or(connection);
        let driver = self.connection(connection)?;
        Ok(TableContext::new(config, driver))
    }
}
