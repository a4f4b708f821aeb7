//! Seams between the core and its collaborators: typed records, storage
//! connectors and file formats

pub mod connector;
pub mod format;
pub mod record;

pub use connector::{Connector, ReadRequest, ReadSource};
pub use format::{FileFormat, FileReadOptions, FileSink, FileWriteOptions, RowStream};
pub use record::{FieldDescriptor, FieldType, RecordDescriptor, TypeDescriptor, TypedRecord};
