//! The filters and validators that run ahead of mutations

use crate::{
    config::{ActionKind, TableConfiguration},
    record::Record,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// The names of the validation rules that a record failed, in the order in which the validators
/// were registered. An empty result means the record is valid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ValidationResult {
    pub failures: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }
}

fn run_filters(config: &TableConfiguration, kind: ActionKind, record: &mut Record) -> Result<bool> {
    let filters = config.filters_for(kind);
    log::debug!(
        "Running {} {} filter(s) for table '{}'",
        filters.len(),
        kind,
        config.table_name
    );
    for filter in filters {
        filter(&mut *record)?;
    }
    Ok(true)
}

/// Run every before-save filter of the given table, in registration order, against the record.
/// Always returns true: filters cannot veto a save. An error from a filter is returned as is and
/// any changes made by the filters that ran before it are kept.
pub fn before_save(config: &TableConfiguration, record: &mut Record) -> Result<bool> {
    run_filters(config, ActionKind::BeforeSave, record)
}

/// The before-delete counterpart of [before_save()].
pub fn before_delete(config: &TableConfiguration, record: &mut Record) -> Result<bool> {
    run_filters(config, ActionKind::BeforeDelete, record)
}

/// Evaluate every validator of the given table against the record and collect the names of the
/// ones that report a failure (i.e., that return true). All validators run regardless of whether
/// an earlier one failed.
pub fn validate(config: &TableConfiguration, record: &Record) -> ValidationResult {
    let failures = config
        .validators
        .iter()
        .filter(|(_, validator)| validator(record))
        .map(|(name, _)| name.to_string())
        .collect::<Vec<_>>();
    if !failures.is_empty() {
        log::warn!(
            "Record {} failed validation for table '{}': {}",
            record.to_json(),
            config.table_name,
            failures.join(", ")
        );
    }
    ValidationResult { failures }
}
