//! Query result rows.

use crate::error::{BridgeError, BridgeResult};
use sqlbridge_codec::{FromTypedValue, TypedValue};
use std::sync::Arc;

/// One result row with typed access by column name or index.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<TypedValue>,
}

impl Row {
    /// Creates a row. Rows of one result share their column list.
    pub fn new(columns: Arc<[String]>, values: Vec<TypedValue>) -> Self {
        Self { columns, values }
    }

    /// Returns the column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the values in column order.
    pub fn values(&self) -> &[TypedValue] {
        &self.values
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the raw value of `column`, if present.
    pub fn value(&self, column: &str) -> Option<&TypedValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Converts the value of `column` to `T`.
    pub fn get<T: FromTypedValue>(&self, column: &str) -> BridgeResult<T> {
        let value = self
            .value(column)
            .ok_or_else(|| BridgeError::not_found(format!("no column named {column}")))?;
        Ok(T::from_typed_value(value)?)
    }

    /// Converts the value at `index` to `T`.
    pub fn get_index<T: FromTypedValue>(&self, index: usize) -> BridgeResult<T> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| BridgeError::not_found(format!("no column at index {index}")))?;
        Ok(T::from_typed_value(value)?)
    }

    /// Renders the row as a JSON object keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }

    /// Consumes the row and returns its values.
    pub fn into_values(self) -> Vec<TypedValue> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn row() -> Row {
        Row::new(
            vec!["id".to_string(), "done".to_string(), "note".to_string()].into(),
            vec![
                TypedValue::Text("a".into()),
                TypedValue::Int(1),
                TypedValue::Null,
            ],
        )
    }

    #[test]
    fn typed_access_by_name() {
        let row = row();
        assert_eq!(row.get::<String>("id").unwrap(), "a");
        assert!(row.get::<bool>("done").unwrap());
        assert_eq!(row.get::<Option<String>>("note").unwrap(), None);
        assert_eq!(row.get_index::<i64>(1).unwrap(), 1);
    }

    #[test]
    fn missing_columns_and_bad_types() {
        let row = row();
        assert_eq!(row.get::<i64>("nope").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(row.get_index::<i64>(9).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(row.get::<i64>("id").unwrap_err().kind(), ErrorKind::Codec);
    }

    #[test]
    fn json_rendering() {
        assert_eq!(row().to_json(), json!({"id": "a", "done": 1, "note": null}));
    }
}
