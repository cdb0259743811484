pub mod inspector;
pub mod types;

pub use inspector::{inspect, is_valid_database};
pub use types::{ColumnDescriptor, SchemaMap, TableSchema};
