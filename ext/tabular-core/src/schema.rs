use crate::{Result, TabularError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Shared, immutable schema handle
pub type SchemaRef = Arc<Schema>;

/// Type tags supported by the schema model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    Integer,
    Long,
    Float,
    Double,
    String,
    Boolean,
    Binary,
    /// A nested structure with its own ordered fields
    Struct(Schema),
    /// An ordered sequence of elements of one type
    Array {
        element: Box<DataType>,
        contains_null: bool,
    },
}

/// A named, typed column of a schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

/// Ordered sequence of uniquely named fields
///
/// Equality is structural and order-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Field>", into = "Vec<Field>")]
pub struct Schema {
    fields: Vec<Field>,
}

impl DataType {
    /// Array type with nullable elements
    pub fn array(element: DataType) -> Self {
        DataType::Array {
            element: Box::new(element),
            contains_null: true,
        }
    }

    /// Array type whose elements may not be null
    pub fn array_non_null(element: DataType) -> Self {
        DataType::Array {
            element: Box::new(element),
            contains_null: false,
        }
    }

    /// Get the type name for display
    pub fn type_name(&self) -> &'static str {
        match self {
            DataType::Integer => "integer",
            DataType::Long => "long",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Binary => "binary",
            DataType::Struct(_) => "struct",
            DataType::Array { .. } => "array",
        }
    }

    /// Whether this is a leaf type (not a struct or array)
    pub fn is_primitive(&self) -> bool {
        !matches!(self, DataType::Struct(_) | DataType::Array { .. })
    }

    fn binary_as_string(&self) -> DataType {
        match self {
            DataType::Binary => DataType::String,
            DataType::Struct(schema) => DataType::Struct(schema.binary_as_string()),
            DataType::Array {
                element,
                contains_null,
            } => DataType::Array {
                element: Box::new(element.binary_as_string()),
                contains_null: *contains_null,
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Struct(schema) => write!(f, "{}", schema),
            DataType::Array { element, .. } => write!(f, "array<{}>", element),
            other => f.write_str(other.type_name()),
        }
    }
}

impl Field {
    pub fn new<S: Into<String>>(name: S, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Same field with a different nullability flag
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

impl Schema {
    /// Build a schema, rejecting duplicate names at any nesting level
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        check_unique_names(&fields, "")?;
        Ok(Self { fields })
    }

    /// The empty schema
    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Look up a top-level field by name
    pub fn field_with_name(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position of a top-level field
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Keep only the named top-level columns, in the requested order
    pub fn project(&self, columns: &[&str]) -> Result<Schema> {
        let fields = columns
            .iter()
            .map(|name| {
                self.field_with_name(name).cloned().ok_or_else(|| {
                    TabularError::schema(format!("Column '{}' not found in {}", name, self))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Schema::new(fields)
    }

    /// Union of two schemas
    ///
    /// Fields of `self` keep their order and new fields of `other` are
    /// appended. Fields present on only one side become nullable.
    pub fn merge(&self, other: &Schema) -> Result<Schema> {
        merge_fields(&self.fields, &other.fields, "")
    }

    /// Rewrite every binary type to string, at any depth
    pub fn binary_as_string(&self) -> Schema {
        Schema {
            fields: self
                .fields
                .iter()
                .map(|f| Field::new(f.name.clone(), f.data_type.binary_as_string(), f.nullable))
                .collect(),
        }
    }

    /// Append fields, rejecting name clashes
    pub fn extend(&self, extra: Vec<Field>) -> Result<Schema> {
        let mut fields = self.fields.clone();
        fields.extend(extra);
        Schema::new(fields)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("struct<")?;
        for (idx, field) in self.fields.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}:{}", field.name, field.data_type)?;
        }
        f.write_str(">")
    }
}

impl TryFrom<Vec<Field>> for Schema {
    type Error = TabularError;

    fn try_from(fields: Vec<Field>) -> Result<Self> {
        Schema::new(fields)
    }
}

impl From<Schema> for Vec<Field> {
    fn from(schema: Schema) -> Self {
        schema.fields
    }
}

fn check_unique_names(fields: &[Field], path: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(fields.len());
    for field in fields {
        let field_path = child_path(path, &field.name);
        if !seen.insert(field.name.as_str()) {
            return Err(TabularError::schema(format!(
                "Duplicate field name '{}'",
                field_path
            )));
        }
        check_nested_names(&field.data_type, &field_path)?;
    }
    Ok(())
}

fn check_nested_names(data_type: &DataType, path: &str) -> Result<()> {
    match data_type {
        DataType::Struct(schema) => check_unique_names(&schema.fields, path),
        DataType::Array { element, .. } => check_nested_names(element, &format!("{}[]", path)),
        _ => Ok(()),
    }
}

fn merge_fields(left: &[Field], right: &[Field], path: &str) -> Result<Schema> {
    let mut merged = Vec::with_capacity(left.len() + right.len());

    for field in left {
        match right.iter().find(|f| f.name == field.name) {
            Some(other) => {
                let field_path = child_path(path, &field.name);
                let data_type = merge_types(&field.data_type, &other.data_type, &field_path)?;
                merged.push(Field::new(
                    field.name.clone(),
                    data_type,
                    field.nullable || other.nullable,
                ));
            }
            None => merged.push(field.clone().with_nullable(true)),
        }
    }

    for field in right {
        if !left.iter().any(|f| f.name == field.name) {
            merged.push(field.clone().with_nullable(true));
        }
    }

    Schema::new(merged)
}

fn merge_types(left: &DataType, right: &DataType, path: &str) -> Result<DataType> {
    match (left, right) {
        (DataType::Struct(l), DataType::Struct(r)) => {
            Ok(DataType::Struct(merge_fields(&l.fields, &r.fields, path)?))
        }
        (
            DataType::Array {
                element: l,
                contains_null: ln,
            },
            DataType::Array {
                element: r,
                contains_null: rn,
            },
        ) => Ok(DataType::Array {
            element: Box::new(merge_types(l, r, &format!("{}[]", path))?),
            contains_null: *ln || *rn,
        }),
        (l, r) if l == r => Ok(l.clone()),
        (l, r) => Err(TabularError::schema(format!(
            "Failed to merge field '{}': incompatible types {} and {}",
            path, l, r
        ))),
    }
}

pub(crate) fn child_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Builder for creating schemas
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<Field>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field<S: Into<String>>(mut self, name: S, data_type: DataType, nullable: bool) -> Self {
        self.fields.push(Field::new(name, data_type, nullable));
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> Result<Schema> {
        Schema::new(self.fields)
    }
}
