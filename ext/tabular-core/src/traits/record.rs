use crate::{DataType, Result, Value};

/// Declared shape of a record field's type, before schema mapping
#[derive(Debug, Clone)]
pub enum TypeDescriptor {
    Integer,
    Long,
    Float,
    Double,
    String,
    Boolean,
    Binary,
    /// A nested record type
    Record(fn() -> &'static RecordDescriptor),
    /// A variable or fixed-size sequence
    Sequence(Box<TypeDescriptor>),
    /// A value that may be absent
    Optional(Box<TypeDescriptor>),
    /// A declared type with no type-tag mapping
    Unsupported(&'static str),
}

/// One entry in a record's field-descriptor table
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub type_descriptor: TypeDescriptor,
}

/// Field-descriptor table for a record type, built once per type
#[derive(Debug, Clone)]
pub struct RecordDescriptor {
    pub type_name: &'static str,
    pub fields: Vec<FieldDescriptor>,
}

impl FieldDescriptor {
    pub fn new(name: &'static str, type_descriptor: TypeDescriptor) -> Self {
        Self {
            name,
            type_descriptor,
        }
    }
}

impl RecordDescriptor {
    pub fn new(type_name: &'static str, fields: Vec<FieldDescriptor>) -> Self {
        Self { type_name, fields }
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// A caller-owned structured value with named field accessors
///
/// Implementations are usually generated by [`typed_record!`](crate::typed_record),
/// but can be written by hand.
pub trait TypedRecord: Sized {
    /// The record's field-descriptor table, in declaration order
    fn descriptor() -> &'static RecordDescriptor;

    /// Encode the named field against the requested type
    ///
    /// Returns `None` when the record has no accessor for `name`.
    fn encode_field(&self, name: &str, data_type: &DataType, path: &str) -> Option<Result<Value>>;

    /// Build the record from values in declaration order
    ///
    /// The caller has already checked that `values.len()` matches the
    /// descriptor's field count.
    fn decode_fields(values: Vec<Value>, path: &str) -> Result<Self>;
}

/// A Rust type that can appear as a record field
pub trait FieldType: Sized {
    fn type_descriptor() -> TypeDescriptor;

    /// Produce a value of exactly `data_type`, never converting implicitly
    fn encode_value(&self, data_type: &DataType, path: &str) -> Result<Value>;

    fn decode_value(value: Value, path: &str) -> Result<Self>;
}
