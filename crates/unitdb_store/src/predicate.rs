//! Native filter tree shared by the query layer and the stores.
//!
//! A [`Predicate`] is evaluated against a [`Record`]. Stores declare which
//! predicates they evaluate natively; anything else is filtered in memory
//! by the caller.

use crate::error::{StoreError, StoreResult};
use std::cmp::Ordering;
use std::fmt;
use unitdb_codec::{Record, Value};

/// Name of the prefix-match custom operator understood by [`crate::MemoryStore`].
pub const STARTS_WITH: &str = "starts_with";

/// Comparison operator of a [`Predicate::Compare`] leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

impl CompareOp {
    /// Operator symbol, for display.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn test(self, actual: Option<&Value>, expected: &Value) -> bool {
        // An unset property compares equal to null only.
        let Some(actual) = actual else {
            return match self {
                Self::Eq => expected.is_null(),
                Self::Ne => !expected.is_null(),
                _ => false,
            };
        };
        match self {
            Self::Eq => actual == expected,
            Self::Ne => actual != expected,
            Self::Lt => actual.compare(expected) == Some(Ordering::Less),
            Self::Le => matches!(
                actual.compare(expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::Gt => actual.compare(expected) == Some(Ordering::Greater),
            Self::Ge => matches!(
                actual.compare(expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

/// Boolean filter over record properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every record.
    True,
    /// Both operands match.
    And(Box<Predicate>, Box<Predicate>),
    /// Either operand matches.
    Or(Box<Predicate>, Box<Predicate>),
    /// The operand does not match.
    Not(Box<Predicate>),
    /// Compares a property against a value.
    Compare {
        /// Property name.
        field: String,
        /// Comparison operator.
        op: CompareOp,
        /// Right-hand operand.
        value: Value,
    },
    /// The property is an array containing the value.
    Contains {
        /// Property name.
        field: String,
        /// Element to look for.
        value: Value,
    },
    /// The property is set.
    IsSet(String),
    /// The property is unset.
    IsNotSet(String),
    /// Store-specific operator; only stores that declare support evaluate it.
    Custom {
        /// Operator name.
        op: String,
        /// Property name.
        field: String,
        /// Operand.
        value: Value,
    },
}

impl Predicate {
    /// Conjunction of two predicates.
    #[must_use]
    pub fn and(left: Predicate, right: Predicate) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    /// Disjunction of two predicates.
    #[must_use]
    pub fn or(left: Predicate, right: Predicate) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    /// Negation of a predicate.
    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(inner: Predicate) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Comparison leaf.
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Returns the top-level conjuncts, flattening nested `And` nodes.
    ///
    /// `True` contributes no conjunct.
    #[must_use]
    pub fn conjuncts(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        self.collect_conjuncts(&mut out);
        out
    }

    fn collect_conjuncts<'a>(&'a self, out: &mut Vec<&'a Predicate>) {
        match self {
            Self::True => {}
            Self::And(left, right) => {
                left.collect_conjuncts(out);
                right.collect_conjuncts(out);
            }
            other => out.push(other),
        }
    }

    /// Folds predicates into a left-deep conjunction; empty input is `True`.
    #[must_use]
    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        predicates
            .into_iter()
            .reduce(Predicate::and)
            .unwrap_or(Predicate::True)
    }

    /// Returns `true` if the predicate contains no custom operator.
    #[must_use]
    pub fn is_standard(&self) -> bool {
        match self {
            Self::True
            | Self::Compare { .. }
            | Self::Contains { .. }
            | Self::IsSet(_)
            | Self::IsNotSet(_) => true,
            Self::And(l, r) | Self::Or(l, r) => l.is_standard() && r.is_standard(),
            Self::Not(inner) => inner.is_standard(),
            Self::Custom { .. } => false,
        }
    }

    /// Returns `true` if [`evaluate`](Self::evaluate) knows every custom
    /// operator in the predicate.
    #[must_use]
    pub fn is_evaluable(&self) -> bool {
        match self {
            Self::And(l, r) | Self::Or(l, r) => l.is_evaluable() && r.is_evaluable(),
            Self::Not(inner) => inner.is_evaluable(),
            Self::Custom { op, .. } => op == STARTS_WITH,
            _ => true,
        }
    }

    /// Evaluates the predicate in memory, including the built-in custom
    /// operators such as [`STARTS_WITH`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedPredicate`] on any other custom
    /// operator.
    pub fn evaluate(&self, record: &Record) -> StoreResult<bool> {
        self.matches_with(record, &builtin_custom)
    }

    /// Evaluates the predicate; custom operators fail.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedPredicate`] on a custom operator.
    pub fn matches(&self, record: &Record) -> StoreResult<bool> {
        self.matches_with(record, &|op, _, _| {
            Err(StoreError::unsupported_predicate(format!(
                "custom operator `{op}`"
            )))
        })
    }

    /// Evaluates the predicate, delegating custom operators to `custom`.
    ///
    /// `custom` receives the operator name, the property value (if set) and
    /// the operand.
    ///
    /// # Errors
    ///
    /// Propagates errors from `custom`.
    pub fn matches_with(
        &self,
        record: &Record,
        custom: &dyn Fn(&str, Option<&Value>, &Value) -> StoreResult<bool>,
    ) -> StoreResult<bool> {
        Ok(match self {
            Self::True => true,
            Self::And(l, r) => l.matches_with(record, custom)? && r.matches_with(record, custom)?,
            Self::Or(l, r) => l.matches_with(record, custom)? || r.matches_with(record, custom)?,
            Self::Not(inner) => !inner.matches_with(record, custom)?,
            Self::Compare { field, op, value } => op.test(record.get(field), value),
            Self::Contains { field, value } => record
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Self::IsSet(field) => record.contains(field),
            Self::IsNotSet(field) => !record.contains(field),
            Self::Custom { op, field, value } => custom(op, record.get(field), value)?,
        })
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Self::True
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => f.write_str("TRUE"),
            Self::And(l, r) => write!(f, "({l} AND {r})"),
            Self::Or(l, r) => write!(f, "({l} OR {r})"),
            Self::Not(inner) => write!(f, "NOT {inner}"),
            Self::Compare { field, op, value } => write!(f, "{field} {} {value}", op.symbol()),
            Self::Contains { field, value } => write!(f, "{field} CONTAINS {value}"),
            Self::IsSet(field) => write!(f, "{field} IS SET"),
            Self::IsNotSet(field) => write!(f, "{field} IS NOT SET"),
            Self::Custom { op, field, value } => write!(f, "{op}({field}, {value})"),
        }
    }
}

fn builtin_custom(op: &str, actual: Option<&Value>, operand: &Value) -> StoreResult<bool> {
    match op {
        STARTS_WITH => Ok(match (actual.and_then(Value::as_text), operand.as_text()) {
            (Some(text), Some(prefix)) => text.starts_with(prefix),
            _ => false,
        }),
        other => Err(StoreError::unsupported_predicate(format!(
            "custom operator `{other}`"
        ))),
    }
}

/// A filter in the form handed to [`crate::StoreAdapter::cursor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeQuery {
    /// Entity type to scan.
    pub entity_type: String,
    /// Filter the store must evaluate.
    pub filter: Predicate,
    /// Number of matching records to skip.
    pub offset: usize,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
}

impl NativeQuery {
    /// Scan of every record of a type.
    pub fn all(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            filter: Predicate::True,
            offset: 0,
            limit: None,
        }
    }

    /// Sets the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the paging window.
    #[must_use]
    pub fn with_window(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}
