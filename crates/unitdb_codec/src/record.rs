//! Property records.

use crate::value::Value;
use std::collections::btree_map;
use std::collections::BTreeMap;

/// The persisted form of an entity: property name to value.
///
/// A property absent from the record is unset. Setting a property to
/// [`Value::Null`] is normalized to removing it, so that two records are
/// equal exactly when every property resolves to the same state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of a property, if set.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns `true` if the property is set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Sets a property, returning the previous value.
    ///
    /// Setting `Value::Null` unsets the property.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        let name = name.into();
        if value.is_null() {
            self.fields.remove(&name)
        } else {
            self.fields.insert(name, value)
        }
    }

    /// Unsets a property, returning the previous value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Returns the number of set properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no property is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over the set properties in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    /// Returns the names of properties whose values differ between the two
    /// records, including properties set on only one side.
    #[must_use]
    pub fn diff<'a>(&'a self, other: &'a Record) -> Vec<&'a str> {
        let mut changed: Vec<&str> = self
            .fields
            .iter()
            .filter(|(name, value)| other.fields.get(*name) != Some(*value))
            .map(|(name, _)| name.as_str())
            .collect();
        changed.extend(
            other
                .fields
                .keys()
                .filter(|name| !self.fields.contains_key(*name))
                .map(String::as_str),
        );
        changed
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.set(name, value);
        }
        record
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Map(record.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_unsets() {
        let mut record = Record::new();
        record.set("name", Value::from("Ulli"));
        assert!(record.contains("name"));

        let previous = record.set("name", Value::Null);
        assert_eq!(previous, Some(Value::from("Ulli")));
        assert!(!record.contains("name"));
        assert!(record.is_empty());
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let a: Record = vec![
            ("a".to_string(), Value::Integer(1)),
            ("b".to_string(), Value::Integer(2)),
        ]
        .into_iter()
        .collect();
        let b: Record = vec![
            ("b".to_string(), Value::Integer(2)),
            ("a".to_string(), Value::Integer(1)),
        ]
        .into_iter()
        .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn diff_reports_both_sides() {
        let mut a = Record::new();
        a.set("same", Value::Integer(1));
        a.set("changed", Value::Integer(1));
        a.set("only_a", Value::Bool(true));

        let mut b = Record::new();
        b.set("same", Value::Integer(1));
        b.set("changed", Value::Integer(2));
        b.set("only_b", Value::Bool(true));

        let mut diff = a.diff(&b);
        diff.sort_unstable();
        assert_eq!(diff, vec!["changed", "only_a", "only_b"]);
        assert!(a.diff(&a).is_empty());
    }
}
