//! Newline-delimited JSON data files
//!
//! One object per line. Null fields are omitted on write and missing fields
//! read as null. Binary values are written as arrays of byte values, and
//! non-finite floats as the strings `NaN`, `Infinity` and `-Infinity`.

use crate::error::ErrorContext;
use crate::schema::child_path;
use crate::traits::{FileFormat, FileReadOptions, FileSink, FileWriteOptions, RowStream};
use crate::{DataType, Field, Result, Row, Schema, SchemaRef, TabularError, Value};
use bytes::Bytes;
use indexmap::IndexMap;
use serde_json::{Map, Number, Value as JsonValue};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// JSON-lines files with schema inference from the data
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl FileFormat for JsonFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn file_schema(&self, path: &Path, _options: &FileReadOptions) -> Result<Option<Schema>> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mut fields: Option<IndexMap<String, Shape>> = None;

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("reading {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let object = parse_object(&line, path, line_no)?;
            let shape = Shape::Object(object.iter().map(|(k, v)| (k.clone(), Shape::of(v))).collect());
            let merged = match fields.take() {
                None => shape,
                Some(current) => Shape::Object(current).merge(shape),
            };
            if let Shape::Object(merged) = merged {
                fields = Some(merged);
            }
        }

        fields.map(fields_to_schema).transpose()
    }

    fn open_rows(&self, path: &Path, target: SchemaRef, options: &FileReadOptions) -> Result<RowStream> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Ok(Box::new(JsonRows {
            lines: BufReader::new(file).lines(),
            line_no: 0,
            path: path.to_path_buf(),
            schema: target,
            binary_as_string: options.binary_as_string,
        }))
    }

    fn create_sink(
        &self,
        path: &Path,
        schema: SchemaRef,
        _options: &FileWriteOptions,
    ) -> Result<Box<dyn FileSink>> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        Ok(Box::new(JsonSink {
            out: BufWriter::new(file),
            schema,
            rows: 0,
        }))
    }
}

fn parse_object(line: &str, path: &Path, line_no: usize) -> Result<Map<String, JsonValue>> {
    let parsed: JsonValue = serde_json::from_str(line)
        .with_context(|| format!("parsing line {} of {}", line_no + 1, path.display()))?;
    match parsed {
        JsonValue::Object(object) => Ok(object),
        other => Err(TabularError::schema(format!(
            "line {} of {} is not a JSON object: {}",
            line_no + 1,
            path.display(),
            other
        ))),
    }
}

/// Type observed in JSON data while inferring a schema
#[derive(Debug, Clone, PartialEq)]
enum Shape {
    Null,
    Boolean,
    Long,
    Double,
    String,
    Array(Box<Shape>),
    Object(IndexMap<String, Shape>),
}

impl Shape {
    fn of(value: &JsonValue) -> Shape {
        match value {
            JsonValue::Null => Shape::Null,
            JsonValue::Bool(_) => Shape::Boolean,
            JsonValue::Number(n) if n.is_i64() => Shape::Long,
            JsonValue::Number(_) => Shape::Double,
            JsonValue::String(_) => Shape::String,
            JsonValue::Array(items) => Shape::Array(Box::new(
                items.iter().map(Shape::of).fold(Shape::Null, Shape::merge),
            )),
            JsonValue::Object(object) => {
                Shape::Object(object.iter().map(|(k, v)| (k.clone(), Shape::of(v))).collect())
            }
        }
    }

    /// Widen two observations to one type; irreconcilable ones become string
    fn merge(self, other: Shape) -> Shape {
        match (self, other) {
            (Shape::Null, other) | (other, Shape::Null) => other,
            (Shape::Long, Shape::Double) | (Shape::Double, Shape::Long) => Shape::Double,
            (Shape::Array(a), Shape::Array(b)) => Shape::Array(Box::new(a.merge(*b))),
            (Shape::Object(mut a), Shape::Object(b)) => {
                for (name, shape) in b {
                    match a.get_mut(&name) {
                        Some(existing) => {
                            let current = std::mem::replace(existing, Shape::Null);
                            *existing = current.merge(shape);
                        }
                        None => {
                            a.insert(name, shape);
                        }
                    }
                }
                Shape::Object(a)
            }
            (a, b) if a == b => a,
            _ => Shape::String,
        }
    }

    fn into_data_type(self) -> Result<DataType> {
        Ok(match self {
            Shape::Null | Shape::String => DataType::String,
            Shape::Boolean => DataType::Boolean,
            Shape::Long => DataType::Long,
            Shape::Double => DataType::Double,
            Shape::Array(element) => DataType::array(element.into_data_type()?),
            Shape::Object(fields) => DataType::Struct(fields_to_schema(fields)?),
        })
    }
}

fn fields_to_schema(fields: IndexMap<String, Shape>) -> Result<Schema> {
    let fields = fields
        .into_iter()
        .map(|(name, shape)| Ok(Field::new(name, shape.into_data_type()?, true)))
        .collect::<Result<Vec<_>>>()?;
    Schema::new(fields)
}

struct JsonRows {
    lines: Lines<BufReader<File>>,
    line_no: usize,
    path: PathBuf,
    schema: SchemaRef,
    binary_as_string: bool,
}

impl JsonRows {
    fn decode_line(&self, line: &str) -> Result<Row> {
        let mut object = parse_object(line, &self.path, self.line_no)?;
        decode_object(&mut object, &self.schema, "", self.binary_as_string)
    }
}

impl Iterator for JsonRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e).with_context(|| format!("reading {}", self.path.display()))),
            };
            let row = if line.trim().is_empty() {
                None
            } else {
                Some(self.decode_line(&line))
            };
            self.line_no += 1;
            if row.is_some() {
                return row;
            }
        }
    }
}

fn decode_object(object: &mut Map<String, JsonValue>, schema: &Schema, path: &str, binary_as_string: bool) -> Result<Row> {
    schema
        .fields()
        .iter()
        .map(|field| {
            let field_path = child_path(path, field.name());
            match object.remove(field.name()) {
                None | Some(JsonValue::Null) => Ok(Value::Null),
                Some(json) => json_to_value(json, field.data_type(), &field_path, binary_as_string),
            }
        })
        .collect()
}

fn json_to_value(json: JsonValue, data_type: &DataType, path: &str, binary_as_string: bool) -> Result<Value> {
    let mismatch = |json: &JsonValue| TabularError::type_mismatch(path, data_type, json_type_name(json));

    Ok(match (data_type, json) {
        (_, JsonValue::Null) => Value::Null,
        (DataType::Integer, JsonValue::Number(n)) => {
            let v = n
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| TabularError::type_mismatch(path, data_type, format!("number {}", n)))?;
            Value::Integer(v)
        }
        (DataType::Long, JsonValue::Number(n)) => Value::Long(
            n.as_i64()
                .ok_or_else(|| TabularError::type_mismatch(path, data_type, format!("number {}", n)))?,
        ),
        (DataType::Float, json) => Value::from(parse_float(&json).ok_or_else(|| mismatch(&json))? as f32),
        (DataType::Double, json) => Value::from(parse_float(&json).ok_or_else(|| mismatch(&json))?),
        (DataType::Boolean, JsonValue::Bool(b)) => Value::Boolean(b),
        (DataType::String, JsonValue::String(s)) => Value::String(Arc::from(s)),
        (DataType::String, JsonValue::Array(items)) if binary_as_string && is_byte_array(&items) => {
            let bytes = bytes_from_array(&items, path)?;
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|_| TabularError::type_mismatch(path, "string", "binary (invalid UTF-8)"))?;
            Value::String(Arc::from(text))
        }
        // Columns widened to string by inference keep the raw JSON text
        (DataType::String, json) => Value::String(Arc::from(json.to_string())),
        (DataType::Binary, JsonValue::Array(items)) => Value::Binary(bytes_from_array(&items, path)?),
        (DataType::Struct(schema), JsonValue::Object(mut object)) => {
            Value::Struct(decode_object(&mut object, schema, path, binary_as_string)?)
        }
        (DataType::Array { element, .. }, JsonValue::Array(items)) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| json_to_value(item, element, &format!("{}[{}]", path, i), binary_as_string))
                .collect::<Result<_>>()?,
        ),
        (_, json) => return Err(mismatch(&json)),
    })
}

fn parse_float(json: &JsonValue) -> Option<f64> {
    match json {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

fn is_byte_array(items: &[JsonValue]) -> bool {
    items
        .iter()
        .all(|item| item.as_u64().is_some_and(|b| b <= u8::MAX as u64))
}

fn bytes_from_array(items: &[JsonValue], path: &str) -> Result<Bytes> {
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or_else(|| TabularError::type_mismatch(path, "binary", format!("byte value {}", item)))
        })
        .collect::<Result<Vec<u8>>>()
        .map(Bytes::from)
}

fn json_type_name(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

struct JsonSink {
    out: BufWriter<File>,
    schema: SchemaRef,
    rows: usize,
}

impl FileSink for JsonSink {
    fn write_row(&mut self, row: Row) -> Result<()> {
        row.check_against(&self.schema)
            .map_err(|reason| TabularError::RowSchemaViolation {
                index: self.rows,
                reason,
            })?;

        let object = encode_object(row, &self.schema);
        serde_json::to_writer(&mut self.out, &JsonValue::Object(object))?;
        self.out.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<usize> {
        self.out.flush()?;
        Ok(self.rows)
    }
}

fn encode_object(row: Row, schema: &Schema) -> Map<String, JsonValue> {
    row.into_values()
        .into_iter()
        .zip(schema.fields())
        .filter(|(value, _)| !value.is_null())
        .map(|(value, field)| (field.name().to_string(), value_to_json(value, field.data_type())))
        .collect()
}

fn value_to_json(value: Value, data_type: &DataType) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Integer(v) => JsonValue::from(v),
        Value::Long(v) => JsonValue::from(v),
        Value::Float(v) => float_to_json(v.into_inner() as f64),
        Value::Double(v) => float_to_json(v.into_inner()),
        Value::String(s) => JsonValue::String(s.to_string()),
        Value::Boolean(b) => JsonValue::Bool(b),
        Value::Binary(bytes) => JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect()),
        Value::Struct(row) => match data_type {
            DataType::Struct(schema) => JsonValue::Object(encode_object(row, schema)),
            _ => JsonValue::Null,
        },
        Value::Array(items) => {
            let element = match data_type {
                DataType::Array { element, .. } => element.as_ref(),
                other => other,
            };
            JsonValue::Array(items.into_iter().map(|item| value_to_json(item, element)).collect())
        }
    }
}

fn float_to_json(v: f64) -> JsonValue {
    match Number::from_f64(v) {
        Some(n) => JsonValue::Number(n),
        None if v.is_nan() => JsonValue::String("NaN".to_string()),
        None if v > 0.0 => JsonValue::String("Infinity".to_string()),
        None => JsonValue::String("-Infinity".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchemaBuilder;

    fn write_lines(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    #[test]
    fn test_infer_widens_and_keeps_first_seen_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(
            dir.path(),
            "data.json",
            &[
                r#"{"name":"bao","id":1,"tags":["a"]}"#,
                r#"{"id":2.5,"extra":null,"loc":{"zip":"94110"}}"#,
                r#"{"name":7}"#,
            ],
        );

        let schema = JsonFormat
            .file_schema(&path, &FileReadOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(
            schema.to_string(),
            "struct<name:string,id:double,tags:array<string>,extra:string,loc:struct<zip:string>>"
        );
        assert!(schema.fields().iter().all(Field::is_nullable));

        let rows: Vec<Row> = JsonFormat
            .open_rows(&path, Arc::new(schema), &FileReadOptions::default())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].get_string(0).unwrap(), "7");
        assert!(rows[2].is_null_at(1));
    }

    #[test]
    fn test_empty_file_has_no_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(dir.path(), "empty.json", &[]);
        assert!(JsonFormat
            .file_schema(&path, &FileReadOptions::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_sink_omits_nulls_and_encodes_special_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let schema = Arc::new(
            SchemaBuilder::new()
                .field("id", DataType::Long, false)
                .field("score", DataType::Double, true)
                .field("raw", DataType::Binary, true)
                .field("note", DataType::String, true)
                .build()
                .unwrap(),
        );

        let mut sink = JsonFormat
            .create_sink(&path, schema.clone(), &FileWriteOptions::default())
            .unwrap();
        sink.write_row(Row::new(vec![
            Value::Long(1),
            Value::from(f64::NAN),
            Value::Binary(Bytes::from_static(b"hi")),
            Value::Null,
        ]))
        .unwrap();
        assert_eq!(sink.finish().unwrap(), 1);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\"id\":1,\"score\":\"NaN\",\"raw\":[104,105]}\n");

        let rows: Vec<Row> = JsonFormat
            .open_rows(&path, schema, &FileReadOptions::default())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert!(rows[0].get_double(1).unwrap().is_nan());
        assert_eq!(rows[0].get_binary(2).unwrap().as_ref(), b"hi");
        assert!(rows[0].is_null_at(3));
    }

    #[test]
    fn test_type_mismatch_reports_field_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(dir.path(), "bad.json", &[r#"{"loc":{"zip":true}}"#]);
        let schema = SchemaBuilder::new()
            .field(
                "loc",
                DataType::Struct(
                    SchemaBuilder::new()
                        .field("zip", DataType::Long, true)
                        .build()
                        .unwrap(),
                ),
                true,
            )
            .build()
            .unwrap();

        let err = JsonFormat
            .open_rows(&path, Arc::new(schema), &FileReadOptions::default())
            .unwrap()
            .next()
            .unwrap()
            .unwrap_err();
        match err {
            TabularError::TypeMismatch { path, .. } => assert_eq!(path, "loc.zip"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
