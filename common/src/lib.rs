pub mod agent;
pub mod db;
pub mod error;
pub mod llm;
pub mod schema;
pub mod session;
pub mod tracing;

pub use error::{Result, SqlGenError};
