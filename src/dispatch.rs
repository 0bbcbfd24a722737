//! Resolution of dynamically named operations against a table

use crate::{
    config::TableConfiguration,
    driver::{identity, StoreDriver},
    pipeline::{self, ValidationResult},
    predicate::{self, finder_prefix, normalize, QueryPredicate, FIND_BY, FIND_OR_CREATE_BY},
    record::{Record, Value},
    DynTableError,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// The operations that a [TableContext] implements directly. Their names take precedence over
/// the finder naming conventions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectOp {
    All,
    Single,
    Count,
    Insert,
    Update,
    Save,
    Delete,
    Validate,
}

impl DirectOp {
    /// Given a normalized method name, return the direct operation it names, if any.
    pub fn from_normalized(normalized: &str) -> Option<Self> {
        match normalized {
            "all" => Some(DirectOp::All),
            "single" => Some(DirectOp::Single),
            "count" => Some(DirectOp::Count),
            "insert" => Some(DirectOp::Insert),
            "update" => Some(DirectOp::Update),
            "save" => Some(DirectOp::Save),
            "delete" => Some(DirectOp::Delete),
            "validate" => Some(DirectOp::Validate),
            _ => None,
        }
    }
}

/// How a method name is to be handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Invocation {
    Direct(DirectOp),
    FindBy,
    FindOrCreateBy,
    Unhandled,
}

/// Given a method name, decide how it should be handled. Method names are compared
/// case-insensitively and without regard to underscores. A direct operation always wins over the
/// finder conventions.
pub fn classify(method_name: &str) -> Invocation {
    let normalized = normalize(method_name);
    if let Some(op) = DirectOp::from_normalized(&normalized) {
        return Invocation::Direct(op);
    }
    match finder_prefix(&normalized) {
        Some(prefix) if prefix == FIND_OR_CREATE_BY => Invocation::FindOrCreateBy,
        Some(prefix) if prefix == FIND_BY => Invocation::FindBy,
        _ => Invocation::Unhandled,
    }
}

/// The result of a dispatched operation.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The rows found by a query
    Rows(Vec<Record>),
    /// The row with a given primary key, if there is one
    Row(Option<Record>),
    /// A number of rows
    Count(u64),
    /// A newly inserted record (carrying its primary key when the store assigned one) together
    /// with the result of validating it
    Inserted {
        record: Record,
        validation: ValidationResult,
    },
    /// An updated record together with the result of validating it
    Updated {
        record: Record,
        validation: ValidationResult,
    },
    /// A deleted record
    Deleted(Record),
    /// The result of validating a record without saving it
    Validation(ValidationResult),
}

impl Outcome {
    /// The records carried by this outcome, if any.
    pub fn records(&self) -> Vec<&Record> {
        match self {
            Outcome::Rows(rows) => rows.iter().collect(),
            Outcome::Row(row) => row.iter().collect(),
            Outcome::Inserted { record, .. }
            | Outcome::Updated { record, .. }
            | Outcome::Deleted(record) => vec![record],
            Outcome::Count(_) | Outcome::Validation(_) => vec![],
        }
    }
}

/// A table together with the store it lives in. This is what callers dispatch operations against.
#[derive(Clone)]
pub struct TableContext {
    config: Arc<TableConfiguration>,
    driver: Arc<dyn StoreDriver>,
}

impl fmt::Debug for TableContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableContext")
            .field("config", &self.config)
            .finish()
    }
}

fn arity_error(method_name: &str, expected: usize, supplied: usize) -> anyhow::Error {
    DynTableError::ArgumentArityMismatch {
        method: method_name.to_string(),
        expected,
        supplied,
    }
    .into()
}

fn expect_args(method_name: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(arity_error(method_name, expected, args.len()));
    }
    Ok(())
}

fn expect_record(method_name: &str, value: &Value) -> Result<Record> {
    match value {
        Value::Record(record) => Ok(record.clone()),
        _ => Err(DynTableError::ArgumentTypeError(format!(
            "'{}' expects a record but was given: {}",
            method_name, value
        ))
        .into()),
    }
}

impl TableContext {
    pub fn new(config: Arc<TableConfiguration>, driver: Arc<dyn StoreDriver>) -> Self {
        Self { config, driver }
    }

    pub fn config(&self) -> &TableConfiguration {
        &self.config
    }

    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    pub fn primary_key(&self) -> &str {
        &self.config.primary_key
    }

    /// The value of the record's primary key, if it has one.
    pub fn identity<'a>(&self, record: &'a Record) -> Option<&'a Value> {
        identity(record, &self.config.primary_key)
    }

    /// Given the name of an operation and its positional arguments, run the operation against
    /// this table. The name is handled as follows:
    /// - The name of a direct operation (see [DirectOp]) runs that operation. `single` takes a
    ///   primary key value, `count` takes an optional record of conditions, the others take a
    ///   record (`all` takes nothing).
    /// - A name of the form `findBy<Col1>And<Col2>...` finds the rows whose columns equal the
    ///   given arguments, in order.
    /// - A name of the form `findOrCreateBy<Col1>And<Col2>...` does the same but, when no row is
    ///   found, inserts one made up of the given columns and arguments. An extra trailing record
    ///   argument provides further fields for the new row.
    /// - Any other name results in an [DynTableError::UnresolvedMember] error.
    pub fn dispatch(&self, method_name: &str, args: &[Value]) -> Result<Outcome> {
        let invocation = classify(method_name);
        log::debug!(
            "Dispatching '{}' on table '{}' as {:?}",
            method_name,
            self.config.table_name,
            invocation
        );
        match invocation {
            Invocation::Direct(op) => self.dispatch_direct(method_name, op, args),
            Invocation::FindBy => Ok(Outcome::Rows(self.find_by(method_name, args)?)),
            Invocation::FindOrCreateBy => self.find_or_create_by(method_name, args),
            Invocation::Unhandled => Err(DynTableError::UnresolvedMember(format!(
                "Table '{}' has no operation named '{}'",
                self.config.table_name, method_name
            ))
            .into()),
        }
    }

    fn dispatch_direct(&self, method_name: &str, op: DirectOp, args: &[Value]) -> Result<Outcome> {
        match op {
            DirectOp::All => {
                expect_args(method_name, args, 0)?;
                Ok(Outcome::Rows(self.all()?))
            }
            DirectOp::Single => {
                expect_args(method_name, args, 1)?;
                Ok(Outcome::Row(self.single(&args[0])?))
            }
            DirectOp::Count => {
                let predicate = match args {
                    [] => QueryPredicate::new(),
                    [conditions] => {
                        QueryPredicate::from_record(&expect_record(method_name, conditions)?)
                    }
                    _ => return Err(arity_error(method_name, 1, args.len())),
                };
                Ok(Outcome::Count(self.count(&predicate)?))
            }
            DirectOp::Insert => {
                expect_args(method_name, args, 1)?;
                self.insert(expect_record(method_name, &args[0])?)
            }
            DirectOp::Update => {
                expect_args(method_name, args, 1)?;
                self.update(expect_record(method_name, &args[0])?)
            }
            DirectOp::Save => {
                expect_args(method_name, args, 1)?;
                self.save(expect_record(method_name, &args[0])?)
            }
            DirectOp::Delete => {
                expect_args(method_name, args, 1)?;
                self.delete(expect_record(method_name, &args[0])?)
            }
            DirectOp::Validate => {
                expect_args(method_name, args, 1)?;
                let record = expect_record(method_name, &args[0])?;
                Ok(Outcome::Validation(self.validate(&record)))
            }
        }
    }

    /// All of the rows of the table.
    pub fn all(&self) -> Result<Vec<Record>> {
        self.find(&QueryPredicate::new())
    }

    pub fn find(&self, predicate: &QueryPredicate) -> Result<Vec<Record>> {
        self.driver.find(&self.config.table_name, predicate)
    }

    /// The row whose primary key has the given value, if any.
    pub fn single(&self, key: &Value) -> Result<Option<Record>> {
        let predicate = QueryPredicate::new().and(&self.config.primary_key, key.clone());
        Ok(self.find(&predicate)?.into_iter().next())
    }

    pub fn count(&self, predicate: &QueryPredicate) -> Result<u64> {
        self.driver.count(&self.config.table_name, predicate)
    }

    /// Runs the table's validators against the record without saving it.
    pub fn validate(&self, record: &Record) -> ValidationResult {
        pipeline::validate(&self.config, record)
    }

    /// Runs the before-save filters and the validators, then inserts the record. Note that the
    /// record is inserted even when it fails validation: check the validation result returned
    /// with it, or call [TableContext::validate()] beforehand.
    pub fn insert(&self, mut record: Record) -> Result<Outcome> {
        pipeline::before_save(&self.config, &mut record)?;
        let validation = pipeline::validate(&self.config, &record);
        let record = self.driver.insert(
            &self.config.table_name,
            &self.config.primary_key,
            record,
        )?;
        log::info!(
            "Inserted {} into '{}'",
            record.to_json(),
            self.config.table_name
        );
        Ok(Outcome::Inserted { record, validation })
    }

    /// Runs the before-save filters and the validators, then updates the row identified by the
    /// record's primary key. As with [TableContext::insert()], validation failures do not prevent
    /// the update.
    pub fn update(&self, mut record: Record) -> Result<Outcome> {
        pipeline::before_save(&self.config, &mut record)?;
        let validation = pipeline::validate(&self.config, &record);
        self.driver
            .update(&self.config.table_name, &self.config.primary_key, &record)?;
        log::info!(
            "Updated {} in '{}'",
            record.to_json(),
            self.config.table_name
        );
        Ok(Outcome::Updated { record, validation })
    }

    /// Updates the record if it carries a primary key value and inserts it otherwise.
    pub fn save(&self, record: Record) -> Result<Outcome> {
        if self.identity(&record).is_some() {
            self.update(record)
        } else {
            self.insert(record)
        }
    }

    /// Runs the before-delete filters, then deletes the row identified by the record's primary key.
    pub fn delete(&self, mut record: Record) -> Result<Outcome> {
        pipeline::before_delete(&self.config, &mut record)?;
        self.driver
            .delete(&self.config.table_name, &self.config.primary_key, &record)?;
        log::info!(
            "Deleted {} from '{}'",
            record.to_json(),
            self.config.table_name
        );
        Ok(Outcome::Deleted(record))
    }

    /// Finds the rows matching a `findBy...` method name and its arguments.
    pub fn find_by(&self, method_name: &str, args: &[Value]) -> Result<Vec<Record>> {
        let predicate = predicate::translate(method_name, args)?;
        self.find(&predicate)
    }

    /// Finds the rows matching a `findOrCreateBy...` method name and its arguments. If there are
    /// none, a record is made out of the columns named by the method and the corresponding
    /// arguments. If an argument beyond those is given, it must be a record, whose fields are
    /// added to the new record unless a column of the same name is already present. The new
    /// record is then inserted as by [TableContext::insert()].
    pub fn find_or_create_by(&self, method_name: &str, args: &[Value]) -> Result<Outcome> {
        let predicate = predicate::translate(method_name, args)?;
        let rows = self.find(&predicate)?;
        if !rows.is_empty() {
            return Ok(Outcome::Rows(rows));
        }

        let columns = predicate.len();
        let mut record = predicate
            .conditions
            .into_iter()
            .map(|condition| (condition.column, condition.value))
            .collect::<Record>();
        if args.len() > columns {
            let seed = expect_record(method_name, &args[args.len() - 1])?;
            for (field, value) in seed {
                if !record.contains_key_ignore_case(&field) {
                    record.insert(&field, value);
                }
            }
        }
        log::debug!(
            "Nothing found by '{}'; creating {}",
            method_name,
            record.to_json()
        );
        self.insert(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_operations_take_precedence() {
        assert_eq!(classify("all"), Invocation::Direct(DirectOp::All));
        assert_eq!(classify("Insert"), Invocation::Direct(DirectOp::Insert));
        assert_eq!(classify("VALIDATE"), Invocation::Direct(DirectOp::Validate));
        assert_eq!(classify("findByName"), Invocation::FindBy);
        assert_eq!(classify("find_by_name"), Invocation::FindBy);
        assert_eq!(
            classify("FindOrCreateByEmail"),
            Invocation::FindOrCreateBy
        );
        assert_eq!(classify("launchRocket"), Invocation::Unhandled);
        assert_eq!(classify("find"), Invocation::Unhandled);
    }
}
