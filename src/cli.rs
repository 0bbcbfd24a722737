//! The dyntable command line interface

use crate::{
    record::Value,
    registry::Registry,
    settings::Settings,
    sql::SqlDriver,
    DynTableError,
};
use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use enquote::unquote;
use serde_json::{json, Value as SerdeValue};
use std::sync::Arc;

/// The name of the connection made from the --database option.
pub static DATABASE_CONNECTION: &str = "database";

// Help strings that are used in more than one subcommand:
static TABLE_HELP: &str = "The name of a table, registered or not";
static CONNECTION_HELP: &str = "The connection to use for a table that does not name one \
                                (default: the --database connection, if given, or else the \
                                first configured connection)";
static PRIMARY_KEY_HELP: &str = "The primary key of an unregistered table (default: Id)";

#[derive(Parser)]
#[command(version,
          about = "dyntable: dynamic finders for relational tables -- command line interface",
          long_about = None)]
pub struct Cli {
    /// Read connection and table settings from the given JSON file. If unspecified, the location
    /// is read from the environment variable DYNTABLE_SETTINGS, if it is defined.
    #[arg(long, action = ArgAction::Set, env = "DYNTABLE_SETTINGS")]
    pub settings: Option<String>,

    /// Can be one of (A) A URL of the form `postgresql://...` or `sqlite://...` (B) The filename
    /// (including path) of a sqlite database. If unspecified, the database is read from the
    /// environment variable DYNTABLE_DATABASE, if it is defined.
    #[arg(long, action = ArgAction::Set, env = "DYNTABLE_DATABASE")]
    pub database: Option<String>,

    /// Print more information about progress and results to the terminal
    #[arg(long, action = ArgAction::SetTrue)]
    pub verbose: bool,

    // Subcommands:
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a named operation, e.g., `findByNameAndCity Ann Oslo`, against a table and print its
    /// outcome as JSON. Each argument is read as JSON if possible and as a string otherwise.
    Dispatch {
        #[arg(long, action = ArgAction::Set, help = CONNECTION_HELP)]
        connection: Option<String>,

        #[arg(long, action = ArgAction::Set, help = PRIMARY_KEY_HELP)]
        primary_key: Option<String>,

        #[arg(value_name = "TABLE", action = ArgAction::Set, help = TABLE_HELP)]
        table: String,

        #[arg(value_name = "METHOD", action = ArgAction::Set,
              help = "The name of the operation to run")]
        method: String,

        #[arg(value_name = "ARGS", action = ArgAction::Append,
              help = "The positional arguments of the operation")]
        args: Vec<String>,
    },

    /// Print the configuration that a table resolves to, as JSON
    Show {
        #[arg(long, action = ArgAction::Set, help = CONNECTION_HELP)]
        connection: Option<String>,

        #[arg(long, action = ArgAction::Set, help = PRIMARY_KEY_HELP)]
        primary_key: Option<String>,

        #[arg(value_name = "TABLE", action = ArgAction::Set, help = TABLE_HELP)]
        table: String,
    },

    /// List the configured tables and connections
    List {},
}

/// Reads a command line argument as a [Value]: JSON if it parses as JSON, otherwise the argument
/// itself with any enclosing quotes removed.
pub fn parse_arg(arg: &str) -> Value {
    match serde_json::from_str::<SerdeValue>(arg) {
        Ok(value) => Value::from_json(&value),
        Err(_) => Value::String(unquote(arg).unwrap_or_else(|_| arg.to_string())),
    }
}

/// Builds the registry described by the command line options.
pub fn build_registry(cli: &Cli) -> Result<Registry> {
    let registry = match &cli.settings {
        Some(path) => Registry::from_settings(&Settings::from_path(path)?)?,
        None => Registry::new(),
    };
    if let Some(database) = &cli.database {
        registry.add_connection(DATABASE_CONNECTION, Arc::new(SqlDriver::connect(database)?));
    }
    if registry.connection_names().is_empty() {
        return Err(DynTableError::ConfigError(
            "Neither --settings nor --database has been given".to_string(),
        )
        .into());
    }
    Ok(registry)
}

pub fn process_command() -> Result<()> {
    let cli = Cli::parse();
    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    let _ = logger.try_init();

    let registry = build_registry(&cli)?;
    let default_connection = cli.database.as_ref().map(|_| DATABASE_CONNECTION);

    match &cli.command {
        Commands::Dispatch {
            connection,
            primary_key,
            table,
            method,
            args,
        } => {
            let context = registry.create_context(
                table,
                connection.as_deref().or(default_connection),
                primary_key.as_deref(),
            )?;
            let args = args.iter().map(|arg| parse_arg(arg)).collect::<Vec<_>>();
            let outcome = context.dispatch(method, &args)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Show {
            connection,
            primary_key,
            table,
        } => {
            let context = registry.create_context(
                table,
                connection.as_deref().or(default_connection),
                primary_key.as_deref(),
            )?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "registered": registry.resolve(table).is_some(),
                    "configuration": context.config().summary(),
                }))?
            );
        }
        Commands::List {} => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "tables": registry.table_names(),
                    "connections": registry.connection_names(),
                }))?
            );
        }
    }
    Ok(())
}
