pub mod executor;
pub mod parser;
pub mod prompt;

pub use executor::{
    correct_sql_query, generate_sql_query, run_query_workflow, GenerationOutcome,
    RejectionReason, WorkflowOutcome,
};
pub use parser::{clean_sql_response, NOT_DB_QUERY_PREFIX, SCHEMA_NEEDED_PREFIX};
pub use prompt::{build_correction_prompt, build_generation_prompt, render_schema};
