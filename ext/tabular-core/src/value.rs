use crate::{DataType, Row};
use bytes::Bytes;
use ordered_float::OrderedFloat;
use std::sync::Arc;

/// A single schema-conformant value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,

    // Numeric types
    Integer(i32),
    Long(i64),
    Float(OrderedFloat<f32>),
    Double(OrderedFloat<f64>),

    // Basic types
    String(Arc<str>),
    Boolean(bool),
    Binary(Bytes),

    // Complex types
    Struct(Row),
    Array(Vec<Value>),
}

impl Value {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of the value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Binary(_) => "binary",
            Value::Struct(_) => "struct",
            Value::Array(_) => "array",
        }
    }

    /// Shallow tag check: does the runtime variant match the type tag
    ///
    /// Null matches every type; nullability is checked by the caller.
    pub fn matches_tag(&self, data_type: &DataType) -> bool {
        matches!(
            (self, data_type),
            (Value::Null, _)
                | (Value::Integer(_), DataType::Integer)
                | (Value::Long(_), DataType::Long)
                | (Value::Float(_), DataType::Float)
                | (Value::Double(_), DataType::Double)
                | (Value::String(_), DataType::String)
                | (Value::Boolean(_), DataType::Boolean)
                | (Value::Binary(_), DataType::Binary)
                | (Value::Struct(_), DataType::Struct(_))
                | (Value::Array(_), DataType::Array { .. })
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(OrderedFloat(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(OrderedFloat(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Binary(v)
    }
}

impl From<Row> for Value {
    fn from(v: Row) -> Self {
        Value::Struct(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_creation() {
        let v = Value::Integer(42);
        assert_eq!(v, Value::from(42));
        assert!(!v.is_null());
        assert_eq!(v.type_name(), "integer");
    }

    #[test]
    fn test_null_value() {
        let v = Value::from(None::<i64>);
        assert!(v.is_null());
        assert!(v.matches_tag(&DataType::Long));
    }

    #[test]
    fn test_float_equality() {
        let v1 = Value::from(3.5f32);
        let v2 = Value::Float(OrderedFloat(3.5));
        assert_eq!(v1, v2);
        assert_ne!(v1, Value::from(3.5f64));
    }

    #[test]
    fn test_tag_matching() {
        assert!(Value::from("94110").matches_tag(&DataType::String));
        assert!(!Value::from(94110i64).matches_tag(&DataType::String));
        assert!(Value::from(vec![1.0f32, 2.0]).matches_tag(&DataType::array(DataType::Float)));
    }

    #[test]
    fn test_hash_consistency() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(Value::Long(42));
        set.insert(Value::from("hello"));

        assert!(set.contains(&Value::Long(42)));
        assert!(set.contains(&Value::from("hello")));
        assert!(!set.contains(&Value::Integer(42)));
    }
}
