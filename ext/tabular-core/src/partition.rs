//! Hive-style partition directories: `col=value` path segments
//!
//! Values are percent-escaped so any string round-trips through a
//! directory name. Nulls use the default-partition sentinel.

use crate::{DataType, Field, Result, Row, Schema, TabularError, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Directory value standing for a null partition value
///
/// A string value spelled the same is written with its first character
/// escaped, so it still reads back as that string.
pub const DEFAULT_PARTITION_NAME: &str = "__HIVE_DEFAULT_PARTITION__";

fn needs_escaping(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '{' | '[' | ']' | '^'
        )
}

/// Percent-escape characters that are unsafe in a path segment
pub fn escape_path_name(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if needs_escaping(c) {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                escaped.push_str(&format!("%{:02X}", byte));
            }
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Reverse [`escape_path_name`]; malformed escapes are kept literally
pub fn unescape_path_name(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' && idx + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[idx + 1..idx + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                idx += 3;
                continue;
            }
        }
        out.push(bytes[idx]);
        idx += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Render a partition value as its directory string; `None` for null
pub fn value_to_partition_string(value: &Value, path: &str) -> Result<Option<String>> {
    Ok(Some(match value {
        Value::Null => return Ok(None),
        Value::Integer(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::String(s) => s.to_string(),
        Value::Boolean(b) => b.to_string(),
        other => {
            return Err(TabularError::type_mismatch(
                path,
                "primitive partition value",
                other.type_name(),
            ))
        }
    }))
}

/// Escape a leading character that would make a directory read as hidden
/// or as the null sentinel
fn escape_segment_start(escaped: String, lead: char) -> String {
    match escaped.strip_prefix(lead) {
        Some(rest) => format!("%{:02X}{}", lead as u32, rest),
        None => escaped,
    }
}

fn partition_column_segment(column: &str) -> String {
    escape_segment_start(escape_path_name(column), '.')
}

fn partition_value_segment(value: Option<&str>) -> String {
    match value {
        None => DEFAULT_PARTITION_NAME.to_string(),
        Some(value) if value == DEFAULT_PARTITION_NAME => escape_segment_start(value.to_string(), '_'),
        Some(value) => escape_path_name(value),
    }
}

/// Build the relative directory for one combination of partition values
pub fn partition_dir(values: &[(&str, Option<&str>)]) -> PathBuf {
    values
        .iter()
        .map(|(column, value)| format!("{}={}", partition_column_segment(column), partition_value_segment(*value)))
        .collect()
}

/// Parse a `col=value` directory name
///
/// Returns `None` for names that are not partition segments.
pub fn parse_partition_segment(segment: &str) -> Option<(String, Option<String>)> {
    let (column, raw) = segment.split_once('=')?;
    if column.is_empty() {
        return None;
    }
    let value = if raw == DEFAULT_PARTITION_NAME {
        None
    } else {
        Some(unescape_path_name(raw))
    };
    Some((unescape_path_name(column), value))
}

/// Parse a directory value string as a value of `data_type`
pub fn parse_partition_value(raw: Option<&str>, data_type: &DataType, path: &str) -> Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Null);
    };
    let invalid = || TabularError::type_mismatch(path, data_type, format!("partition value '{}'", raw));

    Ok(match data_type {
        DataType::Integer => Value::Integer(raw.parse().map_err(|_| invalid())?),
        DataType::Long => Value::Long(raw.parse().map_err(|_| invalid())?),
        DataType::Float => Value::from(raw.parse::<f32>().map_err(|_| invalid())?),
        DataType::Double => Value::from(raw.parse::<f64>().map_err(|_| invalid())?),
        DataType::Boolean => Value::Boolean(raw.parse().map_err(|_| invalid())?),
        DataType::String => Value::String(Arc::from(raw)),
        _ => return Err(invalid()),
    })
}

/// Infer a column type from directory values: integer, long, double, string
///
/// Columns whose values are all null are typed as string.
pub fn infer_partition_type<'a, I>(values: I) -> DataType
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let present: Vec<&str> = values.into_iter().flatten().collect();
    if present.is_empty() {
        DataType::String
    } else if present.iter().all(|v| v.parse::<i32>().is_ok()) {
        DataType::Integer
    } else if present.iter().all(|v| v.parse::<i64>().is_ok()) {
        DataType::Long
    } else if present.iter().all(|v| v.parse::<f64>().is_ok()) {
        DataType::Double
    } else {
        DataType::String
    }
}

/// Resolved partitioning of a schema: which columns go into directory
/// names and which stay in data files
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionSpec {
    columns: Vec<String>,
    partition_indices: Vec<usize>,
    data_indices: Vec<usize>,
    data_schema: Schema,
}

impl PartitionSpec {
    /// Validate `columns` against `schema`
    ///
    /// Columns must exist, be distinct, be of a primitive non-binary type,
    /// and leave at least one data column.
    pub fn new(schema: &Schema, columns: &[String]) -> Result<Self> {
        let mut partition_indices = Vec::with_capacity(columns.len());
        for column in columns {
            let idx = schema
                .index_of(column)
                .ok_or_else(|| TabularError::UnknownPartitionColumn {
                    column: column.clone(),
                    available: schema.to_string(),
                })?;
            if partition_indices.contains(&idx) {
                return Err(TabularError::invalid_option(
                    "partitionBy",
                    format!("column '{}' listed more than once", column),
                ));
            }
            let data_type = schema.fields()[idx].data_type();
            if !data_type.is_primitive() || *data_type == DataType::Binary {
                return Err(TabularError::invalid_option(
                    "partitionBy",
                    format!("column '{}' of type {} cannot be a partition column", column, data_type),
                ));
            }
            partition_indices.push(idx);
        }

        if !columns.is_empty() && partition_indices.len() == schema.len() {
            return Err(TabularError::invalid_option(
                "partitionBy",
                "cannot use all columns for partitioning",
            ));
        }

        let data_indices: Vec<usize> = (0..schema.len())
            .filter(|idx| !partition_indices.contains(idx))
            .collect();
        let data_fields: Vec<Field> = data_indices
            .iter()
            .map(|&idx| schema.fields()[idx].clone())
            .collect();

        Ok(Self {
            columns: columns.to_vec(),
            partition_indices,
            data_indices,
            data_schema: Schema::new(data_fields)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The schema stored inside data files
    pub fn data_schema(&self) -> &Schema {
        &self.data_schema
    }

    /// Split a full row into its relative partition directory and data row
    pub fn split(&self, row: Row) -> Result<(PathBuf, Row)> {
        if self.is_empty() {
            return Ok((PathBuf::new(), row));
        }

        let mut rendered = Vec::with_capacity(self.columns.len());
        for (column, &idx) in self.columns.iter().zip(&self.partition_indices) {
            let value = row.get(idx).unwrap_or(&Value::Null);
            rendered.push(value_to_partition_string(value, column)?);
        }
        let segments: Vec<(&str, Option<&str>)> = self
            .columns
            .iter()
            .zip(&rendered)
            .map(|(column, value)| (column.as_str(), value.as_deref()))
            .collect();
        let dir = partition_dir(&segments);

        let mut values = row.into_values();
        let data = self
            .data_indices
            .iter()
            .map(|&idx| std::mem::replace(&mut values[idx], Value::Null))
            .collect();
        Ok((dir, data))
    }
}
