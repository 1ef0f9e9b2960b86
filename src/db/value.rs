use std::fmt;

use crate::db::error::StorageError;

/// A statement parameter or a column value, independent of the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            None => Value::Null,
            Some(v) => v.into(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "'{}'", v),
        }
    }
}

/// One result row: column names in select order, with their values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.columns.push(column.into());
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn text(&self, column: &str) -> Result<&str, StorageError> {
        match self.get(column) {
            Some(Value::Text(v)) => Ok(v),
            Some(v) => Err(StorageError::Decode(format!("column '{}' is not text: {}", column, v))),
            None => Err(StorageError::Decode(format!("missing column '{}'", column))),
        }
    }

    pub fn integer(&self, column: &str) -> Result<i64, StorageError> {
        match self.get(column) {
            Some(Value::Integer(v)) => Ok(*v),
            Some(v) => Err(StorageError::Decode(format!("column '{}' is not an integer: {}", column, v))),
            None => Err(StorageError::Decode(format!("missing column '{}'", column))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors() {
        let mut row = Row::new();
        row.push("id", Value::Integer(7));
        row.push("token", Value::from("AB12CD"));
        row.push("note", Value::from(None::<String>));

        assert_eq!(row.len(), 3);
        assert_eq!(row.integer("id").unwrap(), 7);
        assert_eq!(row.text("token").unwrap(), "AB12CD");
        assert_eq!(row.get("note"), Some(&Value::Null));

        assert!(matches!(row.text("id"), Err(StorageError::Decode(_))));
        assert!(matches!(row.integer("missing"), Err(StorageError::Decode(_))));
    }
}
