pub mod exec;

pub use exec::{execute_query, validate_query, ExecutionOutcome, QueryResults, SqlValue};
