//! Bidirectional conversion between Arrow arrays and rows
//!
//! Reads are driven by a target schema: struct children and batch columns
//! are matched by name, so files written with a different column order or
//! a subset of columns still decode. Writes are positional, because the
//! Arrow schema is always derived from the logical one.

use crate::schema::child_path;
use crate::{DataType, Field, Result, Row, Schema, TabularError, Value};
use arrow_array::{builder::*, Array, ArrayRef, ListArray, RecordBatch, RecordBatchOptions, StructArray};
use arrow_schema::{DataType as ArrowDataType, Field as ArrowField, Fields};
use bytes::Bytes;
use ordered_float::OrderedFloat;
use std::sync::Arc;

/// Name used for list item fields in derived Arrow schemas
const LIST_ITEM_NAME: &str = "item";

/// Convert the value at `index` of an Arrow array into a value of `data_type`
pub fn value_at(array: &dyn Array, index: usize, data_type: &DataType, path: &str) -> Result<Value> {
    use arrow_array::*;

    if array.is_null(index) {
        return Ok(Value::Null);
    }

    match (data_type, array.data_type()) {
        (DataType::Boolean, ArrowDataType::Boolean) => {
            let array = downcast_array::<BooleanArray>(array)?;
            Ok(Value::Boolean(array.value(index)))
        }

        // Narrower integers widen losslessly into integer
        (DataType::Integer, ArrowDataType::Int8) => {
            let array = downcast_array::<Int8Array>(array)?;
            Ok(Value::Integer(array.value(index) as i32))
        }
        (DataType::Integer, ArrowDataType::Int16) => {
            let array = downcast_array::<Int16Array>(array)?;
            Ok(Value::Integer(array.value(index) as i32))
        }
        (DataType::Integer, ArrowDataType::Int32) => {
            let array = downcast_array::<Int32Array>(array)?;
            Ok(Value::Integer(array.value(index)))
        }
        (DataType::Long, ArrowDataType::Int64) => {
            let array = downcast_array::<Int64Array>(array)?;
            Ok(Value::Long(array.value(index)))
        }
        (DataType::Float, ArrowDataType::Float32) => {
            let array = downcast_array::<Float32Array>(array)?;
            Ok(Value::Float(OrderedFloat(array.value(index))))
        }
        (DataType::Double, ArrowDataType::Float64) => {
            let array = downcast_array::<Float64Array>(array)?;
            Ok(Value::Double(OrderedFloat(array.value(index))))
        }

        (DataType::String, ArrowDataType::Utf8) => {
            let array = downcast_array::<StringArray>(array)?;
            Ok(Value::String(Arc::from(array.value(index))))
        }
        (DataType::String, ArrowDataType::LargeUtf8) => {
            let array = downcast_array::<LargeStringArray>(array)?;
            Ok(Value::String(Arc::from(array.value(index))))
        }
        // Binary read as string (binaryAsString), never lossy
        (DataType::String, ArrowDataType::Binary) => {
            let array = downcast_array::<BinaryArray>(array)?;
            utf8_value(array.value(index), path)
        }
        (DataType::String, ArrowDataType::LargeBinary) => {
            let array = downcast_array::<LargeBinaryArray>(array)?;
            utf8_value(array.value(index), path)
        }
        (DataType::Binary, ArrowDataType::Binary) => {
            let array = downcast_array::<BinaryArray>(array)?;
            Ok(Value::Binary(Bytes::copy_from_slice(array.value(index))))
        }
        (DataType::Binary, ArrowDataType::LargeBinary) => {
            let array = downcast_array::<LargeBinaryArray>(array)?;
            Ok(Value::Binary(Bytes::copy_from_slice(array.value(index))))
        }

        (DataType::Array { element, .. }, ArrowDataType::List(_)) => {
            let array = downcast_array::<ListArray>(array)?;
            list_values(array.value(index).as_ref(), element, path)
        }
        (DataType::Array { element, .. }, ArrowDataType::LargeList(_)) => {
            let array = downcast_array::<LargeListArray>(array)?;
            list_values(array.value(index).as_ref(), element, path)
        }

        (DataType::Struct(schema), ArrowDataType::Struct(_)) => {
            let array = downcast_array::<StructArray>(array)?;
            let columns = bind_struct_columns(array, schema, path)?;
            row_at(&columns, schema, index, path).map(Value::Struct)
        }

        (expected, found) => Err(TabularError::type_mismatch(
            path,
            expected,
            format!("arrow {}", found),
        )),
    }
}

fn utf8_value(bytes: &[u8], path: &str) -> Result<Value> {
    std::str::from_utf8(bytes)
        .map(|s| Value::String(Arc::from(s)))
        .map_err(|e| TabularError::type_mismatch(path, "utf-8 string", format!("binary ({})", e)))
}

fn list_values(items: &dyn Array, element: &DataType, path: &str) -> Result<Value> {
    let mut values = Vec::with_capacity(items.len());
    for i in 0..items.len() {
        values.push(value_at(items, i, element, &format!("{}[{}]", path, i))?);
    }
    Ok(Value::Array(values))
}

/// Columns of a batch or struct array resolved against a target schema
///
/// A `None` entry is a target field the source does not carry; it reads
/// as null.
pub(crate) type BoundColumns = Vec<Option<ArrayRef>>;

/// Match the columns of a batch to `schema` by name
pub(crate) fn bind_batch_columns(batch: &RecordBatch, schema: &Schema) -> Result<BoundColumns> {
    let batch_schema = batch.schema();
    schema
        .fields()
        .iter()
        .map(|field| {
            let column = batch_schema
                .index_of(field.name())
                .ok()
                .map(|idx| batch.column(idx).clone());
            check_bound(column, field, &child_path("", field.name()))
        })
        .collect()
}

fn bind_struct_columns(array: &StructArray, schema: &Schema, path: &str) -> Result<BoundColumns> {
    schema
        .fields()
        .iter()
        .map(|field| {
            let column = array.column_by_name(field.name()).cloned();
            check_bound(column, field, &child_path(path, field.name()))
        })
        .collect()
}

fn check_bound(column: Option<ArrayRef>, field: &Field, path: &str) -> Result<Option<ArrayRef>> {
    if column.is_none() && !field.is_nullable() {
        return Err(TabularError::schema(format!(
            "Non-nullable column '{}' is missing from the source data",
            path
        )));
    }
    Ok(column)
}

/// Assemble one row from bound columns
pub(crate) fn row_at(columns: &BoundColumns, schema: &Schema, index: usize, path: &str) -> Result<Row> {
    let mut values = Vec::with_capacity(columns.len());
    for (column, field) in columns.iter().zip(schema.fields()) {
        let value = match column {
            Some(array) => value_at(array.as_ref(), index, field.data_type(), &child_path(path, field.name()))?,
            None => Value::Null,
        };
        values.push(value);
    }
    Ok(Row::new(values))
}

macro_rules! build_primitive {
    ($values:expr, $builder:ident, $variant:ident, $path:expr, |$v:ident| $convert:expr) => {{
        let values = $values;
        let mut builder = $builder::with_capacity(values.len());
        for (idx, value) in values.into_iter().enumerate() {
            match value {
                Value::$variant($v) => builder.append_value($convert),
                Value::Null => builder.append_null(),
                other => return Err(build_mismatch($path, idx, stringify!($variant), &other)),
            }
        }
        Ok(Arc::new(builder.finish()) as ArrayRef)
    }};
}

/// Convert a vector of values to an Arrow array of the field's type
pub fn values_to_array(values: Vec<Value>, field: &ArrowField) -> Result<ArrayRef> {
    build_array(values, field, field.name())
}

fn build_array(values: Vec<Value>, field: &ArrowField, path: &str) -> Result<ArrayRef> {
    match field.data_type() {
        ArrowDataType::Boolean => build_primitive!(values, BooleanBuilder, Boolean, path, |v| v),
        ArrowDataType::Int32 => build_primitive!(values, Int32Builder, Integer, path, |v| v),
        ArrowDataType::Int64 => build_primitive!(values, Int64Builder, Long, path, |v| v),
        ArrowDataType::Float32 => {
            build_primitive!(values, Float32Builder, Float, path, |v| v.into_inner())
        }
        ArrowDataType::Float64 => {
            build_primitive!(values, Float64Builder, Double, path, |v| v.into_inner())
        }
        ArrowDataType::Utf8 => build_string_array(values, path),
        ArrowDataType::Binary => build_binary_array(values, path),
        ArrowDataType::List(item_field) => build_list_array(values, item_field, path),
        ArrowDataType::Struct(fields) => build_struct_array(values, fields, path),
        dt => Err(TabularError::UnsupportedFieldType {
            path: path.to_string(),
            type_name: format!("arrow {}", dt),
        }),
    }
}

/// Helper function to downcast an array with better error messages
fn downcast_array<T: 'static>(array: &dyn Array) -> Result<&T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        TabularError::internal(format!("Failed to cast to {}", std::any::type_name::<T>()))
    })
}

fn build_mismatch(path: &str, idx: usize, expected: &str, found: &Value) -> TabularError {
    TabularError::type_mismatch(
        format!("{} (value {})", path, idx),
        expected.to_lowercase(),
        found.type_name(),
    )
}

fn build_string_array(values: Vec<Value>, path: &str) -> Result<ArrayRef> {
    let mut builder = StringBuilder::with_capacity(values.len(), 0);
    for (idx, value) in values.into_iter().enumerate() {
        match value {
            Value::String(s) => builder.append_value(&s),
            Value::Null => builder.append_null(),
            other => return Err(build_mismatch(path, idx, "string", &other)),
        }
    }
    Ok(Arc::new(builder.finish()))
}

fn build_binary_array(values: Vec<Value>, path: &str) -> Result<ArrayRef> {
    let mut builder = BinaryBuilder::with_capacity(values.len(), 0);
    for (idx, value) in values.into_iter().enumerate() {
        match value {
            Value::Binary(b) => builder.append_value(&b),
            Value::Null => builder.append_null(),
            other => return Err(build_mismatch(path, idx, "binary", &other)),
        }
    }
    Ok(Arc::new(builder.finish()))
}

fn build_list_array(values: Vec<Value>, item_field: &Arc<ArrowField>, path: &str) -> Result<ArrayRef> {
    let mut all_items = Vec::new();
    let mut offsets = Vec::with_capacity(values.len() + 1);
    let mut null_buffer_builder = arrow_buffer::BooleanBufferBuilder::new(values.len());
    offsets.push(0i32);

    for (idx, value) in values.into_iter().enumerate() {
        match value {
            Value::Array(items) => {
                all_items.extend(items);
                let offset = i32::try_from(all_items.len()).map_err(|_| {
                    TabularError::invalid_argument(format!("List column {} exceeds i32 offsets", path))
                })?;
                offsets.push(offset);
                null_buffer_builder.append(true);
            }
            Value::Null => {
                offsets.push(offsets[offsets.len() - 1]);
                null_buffer_builder.append(false);
            }
            other => return Err(build_mismatch(path, idx, "array", &other)),
        }
    }

    let item_array = build_array(all_items, item_field, &format!("{}[]", path))?;
    let offset_buffer = arrow_buffer::OffsetBuffer::new(offsets.into());
    let null_buffer = null_buffer_builder.finish();

    Ok(Arc::new(ListArray::try_new(
        item_field.clone(),
        offset_buffer,
        item_array,
        Some(null_buffer.into()),
    )?))
}

fn build_struct_array(values: Vec<Value>, fields: &Fields, path: &str) -> Result<ArrayRef> {
    let num_rows = values.len();
    let mut null_buffer_builder = arrow_buffer::BooleanBufferBuilder::new(num_rows);
    let mut field_columns: Vec<Vec<Value>> = vec![Vec::with_capacity(num_rows); fields.len()];

    for (idx, value) in values.into_iter().enumerate() {
        match value {
            Value::Struct(row) => {
                if row.len() != fields.len() {
                    return Err(TabularError::ArityMismatch {
                        path: format!("{} (value {})", path, idx),
                        expected: fields.len(),
                        found: row.len(),
                    });
                }
                null_buffer_builder.append(true);
                for (column, field_value) in field_columns.iter_mut().zip(row.into_values()) {
                    column.push(field_value);
                }
            }
            Value::Null => {
                null_buffer_builder.append(false);
                for column in field_columns.iter_mut() {
                    column.push(Value::Null);
                }
            }
            other => return Err(build_mismatch(path, idx, "struct", &other)),
        }
    }

    let field_arrays = field_columns
        .into_iter()
        .zip(fields.iter())
        .map(|(column, field)| build_array(column, field, &child_path(path, field.name())))
        .collect::<Result<Vec<_>>>()?;

    let null_buffer = null_buffer_builder.finish();
    Ok(Arc::new(StructArray::try_new(
        fields.clone(),
        field_arrays,
        Some(null_buffer.into()),
    )?))
}

/// Convert a logical schema to an Arrow schema
pub fn schema_to_arrow(schema: &Schema) -> Arc<arrow_schema::Schema> {
    Arc::new(arrow_schema::Schema::new(fields_to_arrow(schema)))
}

fn fields_to_arrow(schema: &Schema) -> Fields {
    schema
        .fields()
        .iter()
        .map(|f| ArrowField::new(f.name(), data_type_to_arrow(f.data_type()), f.is_nullable()))
        .collect()
}

/// Convert a logical type tag to its Arrow type
pub fn data_type_to_arrow(data_type: &DataType) -> ArrowDataType {
    match data_type {
        DataType::Integer => ArrowDataType::Int32,
        DataType::Long => ArrowDataType::Int64,
        DataType::Float => ArrowDataType::Float32,
        DataType::Double => ArrowDataType::Float64,
        DataType::String => ArrowDataType::Utf8,
        DataType::Boolean => ArrowDataType::Boolean,
        DataType::Binary => ArrowDataType::Binary,
        DataType::Struct(schema) => ArrowDataType::Struct(fields_to_arrow(schema)),
        DataType::Array {
            element,
            contains_null,
        } => ArrowDataType::List(Arc::new(ArrowField::new(
            LIST_ITEM_NAME,
            data_type_to_arrow(element),
            *contains_null,
        ))),
    }
}

/// Convert an Arrow schema to a logical schema
///
/// With `binary_as_string`, binary columns at any depth become strings.
pub fn arrow_to_schema(schema: &arrow_schema::Schema, binary_as_string: bool) -> Result<Schema> {
    let fields = schema
        .fields()
        .iter()
        .map(|f| arrow_field_to_field(f, "", binary_as_string))
        .collect::<Result<Vec<_>>>()?;
    Schema::new(fields)
}

fn arrow_field_to_field(field: &ArrowField, prefix: &str, binary_as_string: bool) -> Result<Field> {
    let path = child_path(prefix, field.name());
    let data_type = arrow_type_to_data_type(field.data_type(), &path, binary_as_string)?;
    Ok(Field::new(field.name().as_str(), data_type, field.is_nullable()))
}

fn arrow_type_to_data_type(
    data_type: &ArrowDataType,
    path: &str,
    binary_as_string: bool,
) -> Result<DataType> {
    Ok(match data_type {
        ArrowDataType::Boolean => DataType::Boolean,
        ArrowDataType::Int8 | ArrowDataType::Int16 | ArrowDataType::Int32 => DataType::Integer,
        ArrowDataType::Int64 => DataType::Long,
        ArrowDataType::Float32 => DataType::Float,
        ArrowDataType::Float64 => DataType::Double,
        ArrowDataType::Utf8 | ArrowDataType::LargeUtf8 => DataType::String,
        ArrowDataType::Binary | ArrowDataType::LargeBinary if binary_as_string => DataType::String,
        ArrowDataType::Binary | ArrowDataType::LargeBinary => DataType::Binary,
        ArrowDataType::List(item) | ArrowDataType::LargeList(item) => DataType::Array {
            element: Box::new(arrow_type_to_data_type(
                item.data_type(),
                &format!("{}[]", path),
                binary_as_string,
            )?),
            contains_null: item.is_nullable(),
        },
        ArrowDataType::Struct(fields) => {
            let children = fields
                .iter()
                .map(|f| arrow_field_to_field(f, path, binary_as_string))
                .collect::<Result<Vec<_>>>()?;
            DataType::Struct(Schema::new(children)?)
        }
        other => {
            return Err(TabularError::UnsupportedFieldType {
                path: path.to_string(),
                type_name: format!("arrow {}", other),
            })
        }
    })
}

/// Build a record batch from rows that conform to `schema`
pub fn rows_to_record_batch(schema: &Schema, rows: Vec<Row>) -> Result<RecordBatch> {
    let arrow_schema = schema_to_arrow(schema);
    let num_rows = rows.len();
    let num_cols = schema.len();

    // Transpose rows to columns
    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(num_rows); num_cols];
    for (idx, row) in rows.into_iter().enumerate() {
        if row.len() != num_cols {
            return Err(TabularError::ArityMismatch {
                path: format!("row[{}]", idx),
                expected: num_cols,
                found: row.len(),
            });
        }
        for (column, value) in columns.iter_mut().zip(row.into_values()) {
            column.push(value);
        }
    }

    let arrays = columns
        .into_iter()
        .zip(arrow_schema.fields())
        .map(|(values, field)| values_to_array(values, field))
        .collect::<Result<Vec<_>>>()?;

    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    Ok(RecordBatch::try_new_with_options(arrow_schema, arrays, &options)?)
}

/// Decode every row of a batch against `schema`, matching columns by name
pub fn record_batch_to_rows(batch: &RecordBatch, schema: &Schema) -> Result<Vec<Row>> {
    let columns = bind_batch_columns(batch, schema)?;
    (0..batch.num_rows())
        .map(|idx| row_at(&columns, schema, idx, ""))
        .collect()
}
