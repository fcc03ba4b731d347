//! Row filters and subscription scopes.
//!
//! Filters use the PostgREST textual form (`field=op.value`) on the wire and
//! for change subscriptions, so a [`Filter`] renders and parses that form.
//! [`Filter::matches`] evaluates the same predicate against a JSON row for
//! in-process clients.

use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Is,
    In,
}

impl FilterOp {
    /// Operator keyword as used by PostgREST.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Is => "is",
            Self::In => "in",
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "eq" => Self::Eq,
            "neq" => Self::Neq,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "is" => Self::Is,
            "in" => Self::In,
            other => return Err(Error::InvalidFilter(format!("unknown operator `{other}`"))),
        })
    }
}

/// A single `(field, operator, value)` predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    /// Creates a filter from its parts.
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl fmt::Display) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.to_string(),
        }
    }

    /// Shorthand for an equality filter.
    pub fn eq(field: impl Into<String>, value: impl fmt::Display) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    /// Query-string pair (`field`, `op.value`) for a PostgREST request.
    pub fn query_pair(&self) -> (String, String) {
        (self.field.clone(), format!("{}.{}", self.op, self.value))
    }

    /// Evaluates the predicate against a JSON row. A missing field is
    /// treated as `null`.
    pub fn matches(&self, row: &Value) -> bool {
        let actual = row.get(&self.field).unwrap_or(&Value::Null);
        match self.op {
            FilterOp::Eq => json_text(actual) == self.value,
            FilterOp::Neq => json_text(actual) != self.value,
            FilterOp::Gt => compare(actual, &self.value) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => compare(actual, &self.value) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Is => match self.value.as_str() {
                "null" => actual.is_null(),
                "true" => actual.as_bool() == Some(true),
                "false" => actual.as_bool() == Some(false),
                _ => false,
            },
            FilterOp::In => {
                let text = json_text(actual);
                self.value
                    .trim_start_matches('(')
                    .trim_end_matches(')')
                    .split(',')
                    .any(|candidate| candidate.trim() == text)
            }
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}.{}", self.field, self.op, self.value)
    }
}

impl FromStr for Filter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, rest) = s
            .split_once('=')
            .ok_or_else(|| Error::InvalidFilter(format!("missing `=` in `{s}`")))?;
        let (op, value) = rest
            .split_once('.')
            .ok_or_else(|| Error::InvalidFilter(format!("missing operator in `{s}`")))?;
        if field.is_empty() {
            return Err(Error::InvalidFilter(format!("empty field in `{s}`")));
        }
        Ok(Self {
            field: field.to_string(),
            op: op.parse()?,
            value: value.to_string(),
        })
    }
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn compare(actual: &Value, expected: &str) -> Option<Ordering> {
    if actual.is_null() {
        return None;
    }
    let text = json_text(actual);
    match (text.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b),
        _ => Some(text.as_str().cmp(expected)),
    }
}

/// Filter set of a row-set watcher.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RowFilters {
    /// Every row of the table, with an unfiltered change subscription.
    #[default]
    All,
    /// Initial-fetch filters (ANDed) plus the filter applied to change events.
    Scoped {
        initial: Vec<Filter>,
        change: Option<Filter>,
    },
    /// The parent scope does not exist; the set is empty and nothing is
    /// fetched or subscribed.
    Disabled,
}

impl RowFilters {
    /// Scopes both the fetch and the change subscription to `field = value`.
    pub fn scoped_eq(field: &str, value: impl fmt::Display) -> Self {
        let filter = Filter::eq(field, value);
        Self::Scoped {
            initial: vec![filter.clone()],
            change: Some(filter),
        }
    }

    /// Returns true for [`RowFilters::Disabled`].
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// Filters applied to the initial fetch.
    pub fn initial(&self) -> &[Filter] {
        match self {
            Self::Scoped { initial, .. } => initial,
            Self::All | Self::Disabled => &[],
        }
    }

    /// Filter applied to change events, if any.
    pub fn change(&self) -> Option<&Filter> {
        match self {
            Self::Scoped { change, .. } => change.as_ref(),
            Self::All | Self::Disabled => None,
        }
    }
}

/// One live channel: a table and an optional server-side change filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionScope {
    pub table: String,
    pub filter: Option<Filter>,
}

impl SubscriptionScope {
    pub fn new(table: impl Into<String>, filter: Option<Filter>) -> Self {
        Self {
            table: table.into(),
            filter,
        }
    }

    /// Stable channel name for this scope.
    pub fn channel_name(&self) -> String {
        match &self.filter {
            Some(filter) => format!("{}-{}-channel", self.table, filter),
            None => format!("{}-all-channel", self.table),
        }
    }

    /// Whether a row of this scope's table falls inside the filter.
    pub fn matches(&self, row: &Value) -> bool {
        self.filter.as_ref().is_none_or(|f| f.matches(row))
    }
}
