//! Translation of finder method names into equality predicates

use crate::{
    record::{Record, Value},
    sql::quote_identifier,
    DynTableError,
};
use anyhow::Result;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Prefix (in normalized form) of methods that look rows up by the columns named after it.
pub static FIND_BY: &str = "findby";

/// Prefix (in normalized form) of methods that look rows up and insert one when none is found.
pub static FIND_OR_CREATE_BY: &str = "findorcreateby";

/// The word that separates column names within a finder method name.
static COLUMN_SEPARATOR: &str = "and";

lazy_static! {
    // Known prefixes ordered from longest to shortest so that the longest match wins.
    static ref FINDER_PREFIXES: Vec<&'static str> = {
        let mut prefixes = vec![FIND_BY, FIND_OR_CREATE_BY];
        prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));
        prefixes
    };
    // Column names end up embedded in SQL, so only word characters are allowed in them.
    static ref COLUMN_RE: Regex = Regex::new(r"^\w+$").unwrap();
}

/// The comparison applied between a column and its value. Only equality is supported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Operator {
    Equals,
}

/// A single `column = value` term of a [QueryPredicate].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn equals(column: &str, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_string(),
            operator: Operator::Equals,
            value: value.into(),
        }
    }

    /// Renders this condition as a SQL fragment. The column is always quoted as an identifier,
    /// whatever characters it contains. A null value is compared using `IS NULL`, since `= NULL`
    /// never matches anything.
    pub fn to_sql(&self) -> String {
        let column = quote_identifier(&self.column);
        match (&self.operator, &self.value) {
            (Operator::Equals, Value::Null) => format!("{} IS NULL", column),
            (Operator::Equals, value) => format!("{} = {}", column, value.to_sql_literal()),
        }
    }

    /// Whether the given record satisfies this condition. Column names are compared
    /// case-insensitively and values are compared by their literal form, so that, e.g., the
    /// integer 1 and the float 1.0 are considered distinct just as they would be when embedded in
    /// a query.
    pub fn matches(&self, record: &Record) -> bool {
        match record.get_ignore_case(&self.column) {
            None => self.value.is_null(),
            Some(value) => match self.operator {
                Operator::Equals => value.to_sql_literal() == self.value.to_sql_literal(),
            },
        }
    }
}

/// A conjunction of [Condition]s, kept in the order in which the columns were named.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct QueryPredicate {
    pub conditions: Vec<Condition>,
}

impl QueryPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style method that appends an equality condition.
    pub fn and(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::equals(column, value));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.conditions.iter()
    }

    pub fn columns(&self) -> Vec<&str> {
        self.conditions.iter().map(|c| c.column.as_str()).collect()
    }

    /// Renders the predicate as a SQL fragment suitable for a WHERE clause, e.g.,
    /// `"name" = 'Ann' AND "city" = 'Oslo'`. An empty predicate renders as an empty string.
    pub fn to_sql(&self) -> String {
        self.conditions.iter().map(|c| c.to_sql()).join(" AND ")
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }

    /// Builds a predicate out of every field of the given record, in field order.
    pub fn from_record(record: &Record) -> Self {
        Self {
            conditions: record
                .iter()
                .map(|(field, value)| Condition::equals(field, value.clone()))
                .collect(),
        }
    }
}

/// Lower-cases the given method name and strips it of underscores.
pub fn normalize(method_name: &str) -> String {
    method_name.to_lowercase().replace('_', "")
}

/// Given a normalized method name, return the longest finder prefix it begins with, if any.
pub fn finder_prefix(normalized: &str) -> Option<&'static str> {
    FINDER_PREFIXES
        .iter()
        .find(|prefix| normalized.starts_with(*prefix))
        .copied()
}

/// Splits a method name into lower-cased words at underscores and at camel case boundaries
/// (`findByIDAndName` becomes `find`, `by`, `id`, `and`, `name`).
fn split_words(method_name: &str) -> Vec<String> {
    let mut words = vec![];
    for chunk in method_name.split('_').filter(|c| !c.is_empty()) {
        let chars = chunk.chars().collect::<Vec<_>>();
        let mut start = 0;
        for i in 1..chars.len() {
            let (prev, this) = (chars[i - 1], chars[i]);
            let next_is_lower = chars.get(i + 1).map_or(false, |n| n.is_lowercase());
            if this.is_uppercase()
                && (prev.is_lowercase()
                    || prev.is_numeric()
                    || (prev.is_uppercase() && next_is_lower))
            {
                words.push(chars[start..i].iter().collect::<String>().to_lowercase());
                start = i;
            }
        }
        words.push(chars[start..].iter().collect::<String>().to_lowercase());
    }
    words
}

/// Given the words of a method name, drop the leading words that together spell out `prefix`.
/// Returns None if the prefix does not end on a word boundary.
fn strip_prefix_words<'a>(words: &'a [String], prefix: &str) -> Option<&'a [String]> {
    let mut consumed = String::new();
    for (i, word) in words.iter().enumerate() {
        if consumed == prefix {
            return Some(&words[i..]);
        }
        consumed.push_str(word);
        if !prefix.starts_with(&consumed) {
            return None;
        }
    }
    (consumed == prefix).then(|| &words[words.len()..])
}

/// Given a method name such as `findByNameAndCity`, return the ordered list of (normalized) column
/// names that it refers to, i.e., `["name", "city"]`.
///
/// When the name carries word boundaries (camel case or underscores), only a whole word "and"
/// separates two columns, so that `findByBrand` refers to the column `brand`. When it doesn't
/// (e.g., `findbynameandcity`) the remainder is split on every occurrence of "and", which means
/// that such names cannot refer to columns containing "and": `findbybrandcity` refers to `br`
/// and `city`, while `findbybrand` is rejected since nothing follows its last "and".
pub fn parse_columns(method_name: &str) -> Result<Vec<String>> {
    let normalized = normalize(method_name);
    let prefix = finder_prefix(&normalized).unwrap_or("");
    let has_boundaries =
        method_name.contains('_') || method_name.chars().any(|c| c.is_uppercase());

    let words = split_words(method_name);
    let columns = match strip_prefix_words(&words, prefix) {
        Some(rest) if has_boundaries => rest
            .split(|word| word == COLUMN_SEPARATOR)
            .map(|group| group.concat())
            .collect::<Vec<_>>(),
        _ => normalized[prefix.len()..]
            .split(COLUMN_SEPARATOR)
            .map(|c| c.to_string())
            .collect::<Vec<_>>(),
    };

    for column in &columns {
        if !COLUMN_RE.is_match(column) {
            return Err(DynTableError::MalformedMethodName(format!(
                "'{}' does not name a valid list of columns",
                method_name
            ))
            .into());
        }
    }
    Ok(columns)
}

/// Given a method name and the positional arguments it was called with, build the predicate
/// pairing each column named by the method with the argument in the same position. Only as many
/// arguments as there are columns are consumed. Any further arguments are ignored here.
pub fn translate(method_name: &str, args: &[Value]) -> Result<QueryPredicate> {
    let columns = parse_columns(method_name)?;
    if args.len() < columns.len() {
        return Err(DynTableError::ArgumentArityMismatch {
            method: method_name.to_string(),
            expected: columns.len(),
            supplied: args.len(),
        }
        .into());
    }

    let predicate = QueryPredicate {
        conditions: columns
            .iter()
            .zip(args.iter())
            .map(|(column, value)| Condition::equals(column, value.clone()))
            .collect(),
    };
    log::debug!("Translated '{}' to: {}", method_name, predicate.to_sql());
    Ok(predicate)
}
