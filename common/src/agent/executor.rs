use crate::agent::parser::{clean_sql_response, NOT_DB_QUERY_PREFIX, SCHEMA_NEEDED_PREFIX};
use crate::agent::prompt::{build_correction_prompt, build_generation_prompt};
use crate::db::{execute_query, validate_query, ExecutionOutcome, QueryResults};
use crate::llm::CompletionService;
use crate::schema::SchemaMap;
use std::path::Path;

pub const NOT_DB_QUERY_MESSAGE: &str =
    "Sorry, this information is not available in the current database.";
pub const SCHEMA_NEEDED_MESSAGE: &str =
    "Unable to generate query without database schema information.";
pub const CANNOT_CORRECT_MESSAGE: &str =
    "Sorry, this query cannot be corrected with the available database schema.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    NotDbQuery,
    SchemaNeeded,
}

/// Result of one generation or correction round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Query(String),
    Rejected {
        reason: RejectionReason,
        message: &'static str,
    },
    Failure(String),
}

/// Terminal result of the full generate/validate/correct/execute chain.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome {
    Rows {
        query: String,
        corrected: bool,
        results: QueryResults,
    },
    Rejected {
        reason: RejectionReason,
        message: &'static str,
    },
    GenerationFailed(String),
    ExecutionFailed {
        query: String,
        error: String,
    },
}

/// Generate a SQL query for a natural-language question. The caller's
/// mode toggle decides whether a schema is passed: safe mode supplies it,
/// fast mode passes `None`.
#[tracing::instrument(skip(service, question, schema), fields(question_len = question.len(), with_schema = schema.is_some()))]
pub async fn generate_sql_query(
    service: &dyn CompletionService,
    question: &str,
    schema: Option<&SchemaMap>,
) -> GenerationOutcome {
    let prompt = build_generation_prompt(schema, question);

    let raw = match service.complete(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            return GenerationOutcome::Failure(format!("Error generating SQL query: {}", e));
        }
    };

    let trimmed = raw.trim();
    if trimmed.starts_with(NOT_DB_QUERY_PREFIX) {
        return GenerationOutcome::Rejected {
            reason: RejectionReason::NotDbQuery,
            message: NOT_DB_QUERY_MESSAGE,
        };
    }
    if trimmed.starts_with(SCHEMA_NEEDED_PREFIX) {
        return GenerationOutcome::Rejected {
            reason: RejectionReason::SchemaNeeded,
            message: SCHEMA_NEEDED_MESSAGE,
        };
    }

    GenerationOutcome::Query(clean_sql_response(trimmed))
}

/// Ask the service to repair a query that failed validation. Same shape
/// as generation, but a rejection means the query is uncorrectable and
/// there is no schema-needed branch.
#[tracing::instrument(skip(service, error_message, failed_query, schema), fields(with_schema = schema.is_some()))]
pub async fn correct_sql_query(
    service: &dyn CompletionService,
    error_message: &str,
    failed_query: &str,
    schema: Option<&SchemaMap>,
) -> GenerationOutcome {
    let prompt = build_correction_prompt(error_message, failed_query, schema);

    let raw = match service.complete(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            return GenerationOutcome::Failure(format!("Error correcting SQL query: {}", e));
        }
    };

    let trimmed = raw.trim();
    if trimmed.starts_with(NOT_DB_QUERY_PREFIX) {
        return GenerationOutcome::Rejected {
            reason: RejectionReason::NotDbQuery,
            message: CANNOT_CORRECT_MESSAGE,
        };
    }

    GenerationOutcome::Query(clean_sql_response(trimmed))
}

/// Explicit workflow states. `Correct` is reachable only from `Validate`
/// and transitions only to `Execute` or a terminal outcome, which makes
/// the one-correction bound structural rather than incidental.
enum Step {
    Validate { query: String },
    Correct { query: String, error: String },
    Execute { query: String, corrected: bool },
}

/// Full chain for one question: generate, validate with a plan-only
/// probe, correct at most once on a validation error, then execute the
/// working query. A corrected query is executed without re-validation.
#[tracing::instrument(skip(service, db_path, question, schema), fields(db = %db_path.display(), with_schema = schema.is_some()))]
pub async fn run_query_workflow(
    service: &dyn CompletionService,
    db_path: &Path,
    question: &str,
    schema: Option<&SchemaMap>,
) -> WorkflowOutcome {
    let query = match generate_sql_query(service, question, schema).await {
        GenerationOutcome::Query(query) => query,
        GenerationOutcome::Rejected { reason, message } => {
            return WorkflowOutcome::Rejected { reason, message };
        }
        GenerationOutcome::Failure(message) => {
            return WorkflowOutcome::GenerationFailed(message);
        }
    };

    let mut step = Step::Validate { query };
    loop {
        step = match step {
            Step::Validate { query } => {
                let (ok, error) = run_validation(db_path, &query).await;
                if ok {
                    Step::Execute {
                        query,
                        corrected: false,
                    }
                } else {
                    let error = error.unwrap_or_default();
                    tracing::info!("validation failed, attempting one correction: {}", error);
                    Step::Correct { query, error }
                }
            }
            Step::Correct { query, error } => {
                match correct_sql_query(service, &error, &query, schema).await {
                    GenerationOutcome::Query(corrected) => Step::Execute {
                        query: corrected,
                        corrected: true,
                    },
                    GenerationOutcome::Rejected { reason, message } => {
                        return WorkflowOutcome::Rejected { reason, message };
                    }
                    GenerationOutcome::Failure(message) => {
                        return WorkflowOutcome::GenerationFailed(message);
                    }
                }
            }
            Step::Execute { query, corrected } => {
                return match run_execution(db_path, &query).await {
                    ExecutionOutcome::Rows(results) => WorkflowOutcome::Rows {
                        query,
                        corrected,
                        results,
                    },
                    ExecutionOutcome::Error(error) => {
                        WorkflowOutcome::ExecutionFailed { query, error }
                    }
                };
            }
        };
    }
}

async fn run_validation(db_path: &Path, query: &str) -> (bool, Option<String>) {
    let path = db_path.to_path_buf();
    let query = query.to_string();

    match tokio::task::spawn_blocking(move || validate_query(&path, &query)).await {
        Ok(result) => result,
        Err(e) => (false, Some(format!("task join error: {}", e))),
    }
}

async fn run_execution(db_path: &Path, query: &str) -> ExecutionOutcome {
    let path = db_path.to_path_buf();
    let query = query.to_string();

    match tokio::task::spawn_blocking(move || execute_query(&path, &query)).await {
        Ok(outcome) => outcome,
        Err(e) => ExecutionOutcome::Error(format!("task join error: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqlValue;
    use crate::error::{Result, SqlGenError};
    use async_trait::async_trait;
    use rusqlite::Connection;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Deterministic stand-in for the remote service: hands out queued
    /// responses and records every prompt it was given.
    struct FakeCompletion {
        responses: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeCompletion {
        fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionService for FakeCompletion {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected completion call")
        }
    }

    fn orders_db(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("orders.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER NOT NULL, created_at TEXT);
             INSERT INTO orders (customer_id, created_at) VALUES
                 (5, '2024-01-01'),
                 (7, '2024-01-02'),
                 (5, '2024-01-03');",
        )
        .unwrap();
        path
    }

    fn orders_schema(path: &Path) -> SchemaMap {
        crate::schema::inspect(path).unwrap()
    }

    #[tokio::test]
    async fn test_generate_strips_sql_fence() {
        let fake = FakeCompletion::new(vec![Ok(
            "```sql\nSELECT * FROM orders WHERE customer_id = 5;\n```".to_string(),
        )]);

        let outcome = generate_sql_query(&fake, "show all orders for customer 5", None).await;
        assert_eq!(
            outcome,
            GenerationOutcome::Query("SELECT * FROM orders WHERE customer_id = 5;".to_string())
        );
    }

    #[tokio::test]
    async fn test_generate_rejects_not_db_query_regardless_of_trailing_content() {
        let fake = FakeCompletion::new(vec![Ok(
            "NOT_DB_QUERY: no such data\nand some trailing chatter".to_string(),
        )]);

        let outcome = generate_sql_query(&fake, "tell me a joke", None).await;
        assert_eq!(
            outcome,
            GenerationOutcome::Rejected {
                reason: RejectionReason::NotDbQuery,
                message: NOT_DB_QUERY_MESSAGE,
            }
        );
    }

    #[tokio::test]
    async fn test_generate_rejects_schema_needed() {
        let fake = FakeCompletion::new(vec![Ok(
            "SCHEMA_NEEDED: Please provide the database schema to generate an accurate query."
                .to_string(),
        )]);

        let outcome = generate_sql_query(&fake, "list the orders", None).await;
        assert_eq!(
            outcome,
            GenerationOutcome::Rejected {
                reason: RejectionReason::SchemaNeeded,
                message: SCHEMA_NEEDED_MESSAGE,
            }
        );
    }

    #[tokio::test]
    async fn test_generate_maps_transport_failure() {
        let fake = FakeCompletion::new(vec![Err(SqlGenError::Generation("boom".to_string()))]);

        let outcome = generate_sql_query(&fake, "list the orders", None).await;
        let GenerationOutcome::Failure(message) = outcome else {
            panic!("expected failure");
        };
        assert!(message.starts_with("Error generating SQL query:"));
        assert!(message.contains("boom"));
    }

    #[tokio::test]
    async fn test_correct_rejection_uses_cannot_correct_message() {
        let fake = FakeCompletion::new(vec![Ok(
            "NOT_DB_QUERY: This query cannot be corrected with the available database schema."
                .to_string(),
        )]);

        let outcome = correct_sql_query(&fake, "no such column: x", "SELECT x FROM orders", None).await;
        assert_eq!(
            outcome,
            GenerationOutcome::Rejected {
                reason: RejectionReason::NotDbQuery,
                message: CANNOT_CORRECT_MESSAGE,
            }
        );
    }

    // end-to-end scenario A: fenced response, valid query, rows returned
    #[tokio::test]
    async fn test_workflow_fenced_query_returns_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = orders_db(&dir);
        let schema = orders_schema(&path);
        let fake = FakeCompletion::new(vec![Ok(
            "```sql\nSELECT * FROM orders WHERE customer_id = 5;\n```".to_string(),
        )]);

        let outcome =
            run_query_workflow(&fake, &path, "show all orders for customer 5", Some(&schema))
                .await;
        let WorkflowOutcome::Rows {
            query,
            corrected,
            results,
        } = outcome
        else {
            panic!("expected rows");
        };
        assert_eq!(query, "SELECT * FROM orders WHERE customer_id = 5;");
        assert!(!corrected);
        assert_eq!(results.columns, vec!["id", "customer_id", "created_at"]);
        assert_eq!(results.rows.len(), 2);
        assert_eq!(results.rows[0][1], SqlValue::Integer(5));
    }

    // end-to-end scenario B: rejection stops the chain before execution
    #[tokio::test]
    async fn test_workflow_rejection_skips_execution() {
        let dir = tempfile::tempdir().unwrap();
        let path = orders_db(&dir);
        let fake = FakeCompletion::new(vec![Ok("NOT_DB_QUERY: no such data".to_string())]);

        let outcome = run_query_workflow(&fake, &path, "what is the weather?", None).await;
        assert_eq!(
            outcome,
            WorkflowOutcome::Rejected {
                reason: RejectionReason::NotDbQuery,
                message: NOT_DB_QUERY_MESSAGE,
            }
        );
        // only the generation prompt went out
        assert_eq!(fake.prompts().len(), 1);
    }

    // end-to-end scenario C: invalid column, one correction, executed
    // without re-validation
    #[tokio::test]
    async fn test_workflow_corrects_once_and_executes() {
        let dir = tempfile::tempdir().unwrap();
        let path = orders_db(&dir);
        let schema = orders_schema(&path);
        let fake = FakeCompletion::new(vec![
            Ok("SELECT customer FROM orders;".to_string()),
            Ok("SELECT customer_id FROM orders;".to_string()),
        ]);

        let outcome =
            run_query_workflow(&fake, &path, "list customers with orders", Some(&schema)).await;
        let WorkflowOutcome::Rows {
            query, corrected, results, ..
        } = outcome
        else {
            panic!("expected rows after correction");
        };
        assert_eq!(query, "SELECT customer_id FROM orders;");
        assert!(corrected);
        assert_eq!(results.rows.len(), 3);

        // the correction prompt carries the verbatim engine error and the
        // failed query
        let prompts = fake.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("no such column"));
        assert!(prompts[1].contains("SELECT customer FROM orders;"));
    }

    // the single-retry bound: a bad corrected query goes straight to
    // execution and fails there, never to a second correction
    #[tokio::test]
    async fn test_workflow_never_corrects_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = orders_db(&dir);
        let fake = FakeCompletion::new(vec![
            Ok("SELECT customer FROM orders;".to_string()),
            Ok("SELECT still_wrong FROM orders;".to_string()),
        ]);

        let outcome = run_query_workflow(&fake, &path, "list customers", None).await;
        let WorkflowOutcome::ExecutionFailed { query, error } = outcome else {
            panic!("expected execution failure");
        };
        assert_eq!(query, "SELECT still_wrong FROM orders;");
        assert!(error.contains("still_wrong"));
        assert_eq!(fake.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_workflow_correction_rejection_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let path = orders_db(&dir);
        let fake = FakeCompletion::new(vec![
            Ok("SELECT customer FROM orders;".to_string()),
            Ok("NOT_DB_QUERY: nothing to correct with".to_string()),
        ]);

        let outcome = run_query_workflow(&fake, &path, "list customers", None).await;
        assert_eq!(
            outcome,
            WorkflowOutcome::Rejected {
                reason: RejectionReason::NotDbQuery,
                message: CANNOT_CORRECT_MESSAGE,
            }
        );
    }

    #[tokio::test]
    async fn test_workflow_generation_failure_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let path = orders_db(&dir);
        let fake = FakeCompletion::new(vec![Err(SqlGenError::Generation("offline".to_string()))]);

        let outcome = run_query_workflow(&fake, &path, "list customers", None).await;
        let WorkflowOutcome::GenerationFailed(message) = outcome else {
            panic!("expected generation failure");
        };
        assert!(message.starts_with("Error generating SQL query:"));
    }
}
