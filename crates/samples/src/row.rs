//! Sample rows.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Field names of a sample, shared by all of its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl FieldMap {
    /// Build a field map from explicit names.
    pub fn new(names: Vec<String>) -> Self {
        let positions = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, positions }
    }

    /// Synthesize ordinal names `_0, _1, ...`.
    pub fn ordinal(width: usize) -> Self {
        Self::new((0..width).map(|i| format!("_{i}")).collect())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A single row, addressable by index and by field name.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
    fields: Arc<FieldMap>,
}

impl Row {
    pub(crate) fn new(values: Vec<Value>, fields: Arc<FieldMap>) -> Self {
        Self { values, fields }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.position(name).and_then(|i| self.values.get(i))
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn names(&self) -> &[String] {
        self.fields.names()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.fields.names().iter().zip(&self.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_named_and_index_access() {
        let fields = Arc::new(FieldMap::new(vec!["host".into(), "port".into()]));
        let row = Row::new(vec![json!("db1"), json!(5432)], fields);

        assert_eq!(row.get("host"), Some(&json!("db1")));
        assert_eq!(row.get_index(1), Some(&json!(5432)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.get_index(2), None);
    }

    #[test]
    fn test_ordinal_names() {
        let fields = FieldMap::ordinal(3);
        assert_eq!(fields.names(), &["_0", "_1", "_2"]);
        assert_eq!(fields.position("_2"), Some(2));
    }

    #[test]
    fn test_row_serializes_as_map() {
        let fields = Arc::new(FieldMap::ordinal(2));
        let row = Row::new(vec![json!("a"), json!(1)], fields);
        assert_eq!(serde_json::to_value(&row).unwrap(), json!({"_0": "a", "_1": 1}));
    }
}
