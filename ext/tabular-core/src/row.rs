//! Positional rows and schema conformance checks

use crate::schema::child_path;
use crate::{DataType, Result, Schema, TabularError, Value};
use bytes::Bytes;

/// A schema-conformant ordered sequence of values
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn is_null_at(&self, index: usize) -> bool {
        matches!(self.values.get(index), Some(Value::Null) | None)
    }

    fn value_at(&self, index: usize) -> Result<&Value> {
        self.values.get(index).ok_or(TabularError::ArityMismatch {
            path: format!("[{}]", index),
            expected: index + 1,
            found: self.values.len(),
        })
    }

    pub fn get_int(&self, index: usize) -> Result<i32> {
        match self.value_at(index)? {
            Value::Integer(v) => Ok(*v),
            other => Err(mismatch(index, "integer", other)),
        }
    }

    pub fn get_long(&self, index: usize) -> Result<i64> {
        match self.value_at(index)? {
            Value::Long(v) => Ok(*v),
            other => Err(mismatch(index, "long", other)),
        }
    }

    pub fn get_float(&self, index: usize) -> Result<f32> {
        match self.value_at(index)? {
            Value::Float(v) => Ok(v.into_inner()),
            other => Err(mismatch(index, "float", other)),
        }
    }

    pub fn get_double(&self, index: usize) -> Result<f64> {
        match self.value_at(index)? {
            Value::Double(v) => Ok(v.into_inner()),
            other => Err(mismatch(index, "double", other)),
        }
    }

    pub fn get_string(&self, index: usize) -> Result<&str> {
        match self.value_at(index)? {
            Value::String(v) => Ok(v),
            other => Err(mismatch(index, "string", other)),
        }
    }

    pub fn get_bool(&self, index: usize) -> Result<bool> {
        match self.value_at(index)? {
            Value::Boolean(v) => Ok(*v),
            other => Err(mismatch(index, "boolean", other)),
        }
    }

    pub fn get_binary(&self, index: usize) -> Result<&Bytes> {
        match self.value_at(index)? {
            Value::Binary(v) => Ok(v),
            other => Err(mismatch(index, "binary", other)),
        }
    }

    pub fn get_list(&self, index: usize) -> Result<&[Value]> {
        match self.value_at(index)? {
            Value::Array(v) => Ok(v),
            other => Err(mismatch(index, "array", other)),
        }
    }

    pub fn get_struct(&self, index: usize) -> Result<&Row> {
        match self.value_at(index)? {
            Value::Struct(v) => Ok(v),
            other => Err(mismatch(index, "struct", other)),
        }
    }

    /// Check arity and every value against the schema, recursively
    ///
    /// The error string names the offending path.
    pub fn check_against(&self, schema: &Schema) -> std::result::Result<(), String> {
        check_row(self, schema, "")
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

impl FromIterator<Value> for Row {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Row::new(iter.into_iter().collect())
    }
}

fn mismatch(index: usize, expected: &str, found: &Value) -> TabularError {
    TabularError::type_mismatch(format!("[{}]", index), expected, found.type_name())
}

fn check_row(row: &Row, schema: &Schema, path: &str) -> std::result::Result<(), String> {
    if row.len() != schema.len() {
        return Err(format!(
            "{} has {} values but schema has {} fields",
            if path.is_empty() { "row" } else { path },
            row.len(),
            schema.len()
        ));
    }

    for (value, field) in row.values().iter().zip(schema.fields()) {
        let field_path = child_path(path, field.name());
        check_value(value, field.data_type(), field.is_nullable(), &field_path)?;
    }
    Ok(())
}

/// Validate a value against its declared type and nullability
pub(crate) fn check_value(
    value: &Value,
    data_type: &DataType,
    nullable: bool,
    path: &str,
) -> std::result::Result<(), String> {
    if value.is_null() {
        if !nullable {
            return Err(format!("found null value for non-nullable field {}", path));
        }
        return Ok(());
    }

    match (value, data_type) {
        (Value::Struct(row), DataType::Struct(schema)) => check_row(row, schema, path),
        (
            Value::Array(items),
            DataType::Array {
                element,
                contains_null,
            },
        ) => {
            for (idx, item) in items.iter().enumerate() {
                check_value(item, element, *contains_null, &format!("{}[{}]", path, idx))?;
            }
            Ok(())
        }
        (value, expected) if value.matches_tag(expected) => Ok(()),
        (value, expected) => Err(format!(
            "type mismatch at {}: expected {}, got {}",
            path,
            expected,
            value.type_name()
        )),
    }
}
