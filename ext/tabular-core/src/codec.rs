//! Row codec: typed records to schema-conformant rows and back
//!
//! Encoding is schema-driven: every schema field is read through the
//! record's named accessor. Decoding is positional, in the record's
//! declared field order. Neither direction converts implicitly; a value
//! must already be of the requested type.

use crate::schema::child_path;
use crate::traits::record::{FieldType, RecordDescriptor, TypeDescriptor, TypedRecord};
use crate::{DataType, Field, Result, Row, Schema, TabularError, Value};
use bytes::Bytes;
use ordered_float::OrderedFloat;
use std::sync::Arc;

/// Derive a schema from a record type's field-descriptor table
pub fn infer_schema<T: TypedRecord>() -> Result<Schema> {
    let mut stack = Vec::new();
    schema_from_descriptor(T::descriptor(), "", &mut stack)
}

fn schema_from_descriptor(
    descriptor: &'static RecordDescriptor,
    path: &str,
    stack: &mut Vec<&'static RecordDescriptor>,
) -> Result<Schema> {
    if stack.iter().any(|d| std::ptr::eq(*d, descriptor)) {
        return Err(TabularError::UnsupportedFieldType {
            path: path.to_string(),
            type_name: format!("recursive record type {}", descriptor.type_name),
        });
    }

    stack.push(descriptor);
    let mut fields = Vec::with_capacity(descriptor.fields.len());
    for field in &descriptor.fields {
        let field_path = child_path(path, field.name);
        let (data_type, nullable) = map_descriptor(&field.type_descriptor, &field_path, stack)?;
        fields.push(Field::new(field.name, data_type, nullable));
    }
    stack.pop();

    Schema::new(fields)
}

fn map_descriptor(
    descriptor: &TypeDescriptor,
    path: &str,
    stack: &mut Vec<&'static RecordDescriptor>,
) -> Result<(DataType, bool)> {
    Ok(match descriptor {
        TypeDescriptor::Integer => (DataType::Integer, false),
        TypeDescriptor::Long => (DataType::Long, false),
        TypeDescriptor::Float => (DataType::Float, false),
        TypeDescriptor::Double => (DataType::Double, false),
        TypeDescriptor::String => (DataType::String, false),
        TypeDescriptor::Boolean => (DataType::Boolean, false),
        TypeDescriptor::Binary => (DataType::Binary, false),
        TypeDescriptor::Record(descriptor) => (
            DataType::Struct(schema_from_descriptor(descriptor(), path, stack)?),
            false,
        ),
        TypeDescriptor::Sequence(element) => {
            let (element, contains_null) = map_descriptor(element, &format!("{}[]", path), stack)?;
            (
                DataType::Array {
                    element: Box::new(element),
                    contains_null,
                },
                false,
            )
        }
        TypeDescriptor::Optional(inner) => (map_descriptor(inner, path, stack)?.0, true),
        TypeDescriptor::Unsupported(type_name) => {
            return Err(TabularError::UnsupportedFieldType {
                path: path.to_string(),
                type_name: type_name.to_string(),
            })
        }
    })
}

/// Encode a record into a row conforming to `schema`
pub fn encode<T: TypedRecord>(record: &T, schema: &Schema) -> Result<Row> {
    encode_at(record, schema, "")
}

/// Encode with a path prefix used in error messages
pub fn encode_at<T: TypedRecord>(record: &T, schema: &Schema, path: &str) -> Result<Row> {
    let mut values = Vec::with_capacity(schema.len());

    for field in schema.fields() {
        let field_path = child_path(path, field.name());
        let value = match record.encode_field(field.name(), field.data_type(), &field_path) {
            Some(value) => value?,
            None if field.is_nullable() => Value::Null,
            None => {
                return Err(TabularError::FieldAccess {
                    record: T::descriptor().type_name.to_string(),
                    field: field_path,
                })
            }
        };

        if value.is_null() && !field.is_nullable() {
            return Err(TabularError::type_mismatch(
                field_path,
                format!("non-null {}", field.data_type()),
                "null",
            ));
        }
        values.push(value);
    }

    Ok(Row::new(values))
}

/// Decode a row into a record, positionally by declared field order
pub fn decode<T: TypedRecord>(row: Row) -> Result<T> {
    decode_at(row, "")
}

/// Decode with a path prefix used in error messages
pub fn decode_at<T: TypedRecord>(row: Row, path: &str) -> Result<T> {
    let descriptor = T::descriptor();
    if row.len() != descriptor.field_count() {
        return Err(TabularError::ArityMismatch {
            path: if path.is_empty() {
                descriptor.type_name.to_string()
            } else {
                path.to_string()
            },
            expected: descriptor.field_count(),
            found: row.len(),
        });
    }
    T::decode_fields(row.into_values(), path)
}

/// Decode the next positional value of a record being built
#[doc(hidden)]
pub fn decode_next<F: FieldType>(
    values: &mut std::vec::IntoIter<Value>,
    path: &str,
    name: &str,
) -> Result<F> {
    let field_path = child_path(path, name);
    let value = values.next().ok_or_else(|| {
        TabularError::internal(format!("value for {} missing after arity check", field_path))
    })?;
    F::decode_value(value, &field_path)
}

/// Encode a nested record field
#[doc(hidden)]
pub fn encode_nested<T: TypedRecord>(record: &T, data_type: &DataType, path: &str) -> Result<Value> {
    match data_type {
        DataType::Struct(schema) => encode_at(record, schema, path).map(Value::Struct),
        other => Err(TabularError::type_mismatch(
            path,
            other,
            T::descriptor().type_name,
        )),
    }
}

/// Decode a nested record field
#[doc(hidden)]
pub fn decode_nested<T: TypedRecord>(value: Value, path: &str) -> Result<T> {
    match value {
        Value::Struct(row) => decode_at(row, path),
        other => Err(TabularError::type_mismatch(
            path,
            T::descriptor().type_name,
            other.type_name(),
        )),
    }
}

macro_rules! primitive_field_type {
    ($ty:ty, $tag:ident, $rust_name:expr, |$enc:ident| $encode:expr, |$dec:ident| $decode:expr) => {
        impl FieldType for $ty {
            fn type_descriptor() -> TypeDescriptor {
                TypeDescriptor::$tag
            }

            fn encode_value(&self, data_type: &DataType, path: &str) -> Result<Value> {
                match data_type {
                    DataType::$tag => {
                        let $enc = self;
                        Ok(Value::$tag($encode))
                    }
                    other => Err(TabularError::type_mismatch(path, other, $rust_name)),
                }
            }

            fn decode_value(value: Value, path: &str) -> Result<Self> {
                match value {
                    Value::$tag($dec) => Ok($decode),
                    other => Err(TabularError::type_mismatch(
                        path,
                        DataType::$tag,
                        other.type_name(),
                    )),
                }
            }
        }
    };
}

primitive_field_type!(i32, Integer, "i32", |v| *v, |v| v);
primitive_field_type!(i64, Long, "i64", |v| *v, |v| v);
primitive_field_type!(f32, Float, "f32", |v| OrderedFloat(*v), |v| v.into_inner());
primitive_field_type!(f64, Double, "f64", |v| OrderedFloat(*v), |v| v.into_inner());
primitive_field_type!(bool, Boolean, "bool", |v| *v, |v| v);
primitive_field_type!(String, String, "String", |v| Arc::from(v.as_str()), |v| v.to_string());
primitive_field_type!(Arc<str>, String, "Arc<str>", |v| v.clone(), |v| v);
primitive_field_type!(Bytes, Binary, "Bytes", |v| v.clone(), |v| v);

/// `u64` has no lossless type tag, so inference rejects it; it can still be
/// bound to an explicit `long` field with range-checked conversion.
impl FieldType for u64 {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::Unsupported("u64")
    }

    fn encode_value(&self, data_type: &DataType, path: &str) -> Result<Value> {
        match data_type {
            DataType::Long => i64::try_from(*self).map(Value::Long).map_err(|_| {
                TabularError::type_mismatch(path, "long within i64 range", format!("u64 {}", self))
            }),
            other => Err(TabularError::type_mismatch(path, other, "u64")),
        }
    }

    fn decode_value(value: Value, path: &str) -> Result<Self> {
        match value {
            Value::Long(v) => u64::try_from(v).map_err(|_| {
                TabularError::type_mismatch(path, "non-negative long", format!("long {}", v))
            }),
            other => Err(TabularError::type_mismatch(path, "long", other.type_name())),
        }
    }
}

impl<T: FieldType> FieldType for Option<T> {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::Optional(Box::new(T::type_descriptor()))
    }

    fn encode_value(&self, data_type: &DataType, path: &str) -> Result<Value> {
        match self {
            Some(inner) => inner.encode_value(data_type, path),
            None => Ok(Value::Null),
        }
    }

    fn decode_value(value: Value, path: &str) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::decode_value(other, path).map(Some),
        }
    }
}

impl<T: FieldType> FieldType for Vec<T> {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::Sequence(Box::new(T::type_descriptor()))
    }

    fn encode_value(&self, data_type: &DataType, path: &str) -> Result<Value> {
        encode_sequence(self.iter(), data_type, path, "Vec")
    }

    fn decode_value(value: Value, path: &str) -> Result<Self> {
        decode_sequence(value, path)
    }
}

/// Fixed-size arrays only accept sequences of exactly `N` elements
impl<T: FieldType, const N: usize> FieldType for [T; N] {
    fn type_descriptor() -> TypeDescriptor {
        TypeDescriptor::Sequence(Box::new(T::type_descriptor()))
    }

    fn encode_value(&self, data_type: &DataType, path: &str) -> Result<Value> {
        encode_sequence(self.iter(), data_type, path, "fixed-size array")
    }

    fn decode_value(value: Value, path: &str) -> Result<Self> {
        if let Value::Array(items) = &value {
            if items.len() != N {
                return Err(TabularError::type_mismatch(
                    path,
                    format!("array of exactly {} elements", N),
                    format!("array of {} elements", items.len()),
                ));
            }
        }
        let items: Vec<T> = decode_sequence(value, path)?;
        <[T; N]>::try_from(items)
            .map_err(|_| TabularError::internal(format!("length of {} changed while decoding", path)))
    }
}

fn encode_sequence<'a, T: FieldType + 'a>(
    items: impl Iterator<Item = &'a T>,
    data_type: &DataType,
    path: &str,
    rust_name: &str,
) -> Result<Value> {
    let DataType::Array {
        element,
        contains_null,
    } = data_type
    else {
        return Err(TabularError::type_mismatch(path, data_type, rust_name));
    };

    let mut values = Vec::new();
    for (idx, item) in items.enumerate() {
        let item_path = format!("{}[{}]", path, idx);
        let value = item.encode_value(element, &item_path)?;
        if value.is_null() && !contains_null {
            return Err(TabularError::type_mismatch(
                item_path,
                format!("non-null {}", element),
                "null",
            ));
        }
        values.push(value);
    }
    Ok(Value::Array(values))
}

fn decode_sequence<T: FieldType>(value: Value, path: &str) -> Result<Vec<T>> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| T::decode_value(item, &format!("{}[{}]", path, idx)))
            .collect(),
        other => Err(TabularError::type_mismatch(path, "array", other.type_name())),
    }
}
