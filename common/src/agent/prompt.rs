//! Deterministic prompt construction. The generation service's output
//! depends entirely on exact prompt text, so every rendering here must be
//! byte-stable for identical inputs: plain string building, no maps, no
//! clocks, no randomness.

use crate::schema::SchemaMap;

const GENERATION_PROMPT_SCHEMALESS: &str = "You are a SQL expert. Your task is to generate SQLite queries ONLY for database-related questions.\n\
\n\
CRITICAL INSTRUCTIONS:\n\
1. If the user's question is not about querying a database (e.g., general knowledge questions, non-database questions), respond with EXACTLY:\n   \"NOT_DB_QUERY: This question is not related to database querying.\"\n\
2. Only generate SQL for questions that are clearly asking to retrieve or analyze data from a database.\n\
3. If unsure about the schema, respond with EXACTLY:\n   \"SCHEMA_NEEDED: Please provide the database schema to generate an accurate query.\"\n\
\n\
Format SQL responses as a single query without any explanations or markdown.\n\
\n\
Now, process the following request:\n";

/// Render a schema for prompt embedding: a `Table:` header per table,
/// one indented line per column with its declared type and a
/// parenthesized constraint list, and a blank line between tables.
pub fn render_schema(schema: &SchemaMap) -> String {
    let mut lines = Vec::new();

    for table in &schema.tables {
        lines.push(format!("Table: {}", table.name));
        for column in &table.columns {
            let mut constraints = Vec::new();
            if column.is_primary_key {
                constraints.push("PRIMARY KEY");
            }
            if column.not_null {
                constraints.push("NOT NULL");
            }
            let constraint_suffix = if constraints.is_empty() {
                String::new()
            } else {
                format!(" ({})", constraints.join(", "))
            };
            lines.push(format!(
                "  - {} {}{}",
                column.name, column.declared_type, constraint_suffix
            ));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Build the prompt for first-pass SQL generation. With a schema the
/// model is restricted to the listed tables and columns; without one it
/// must ask for the schema or reject non-database questions outright.
pub fn build_generation_prompt(schema: Option<&SchemaMap>, question: &str) -> String {
    let Some(schema) = schema else {
        return format!("{}{}", GENERATION_PROMPT_SCHEMALESS, question);
    };

    format!(
        "You are a SQL expert. Your task is to generate SQLite queries ONLY for questions about the provided database.\n\
\n\
CRITICAL INSTRUCTIONS:\n\
1. If the user's question cannot be answered using the tables and columns below, respond with EXACTLY:\n   \"NOT_DB_QUERY: This question cannot be answered with the available database schema.\"\n\
2. Only use the tables and columns listed in this schema - DO NOT reference any tables or columns not listed here.\n\
3. Do not make assumptions about additional tables or columns.\n\
\n\
Database Schema:\n{}\n\
\n\
Format SQL responses as a single query without any explanations or markdown.\n\
\n\
Now, process the following request:\n{}",
        render_schema(schema),
        question
    )
}

/// Build the prompt for the single correction round: the verbatim engine
/// error, the failed query, and (when available) the schema rendering.
pub fn build_correction_prompt(
    error_message: &str,
    failed_query: &str,
    schema: Option<&SchemaMap>,
) -> String {
    let mut prompt = format!(
        "The following SQL query generated an error:\n{}\n\
\n\
Original query:\n{}\n\
\n\
Please correct the query to fix the error. The corrected query should be valid SQLite syntax.\n\
IMPORTANT: Only use tables and columns that exist in the database schema.\n\
If the query cannot be corrected using the available schema, respond with EXACTLY:\n\
\"NOT_DB_QUERY: This query cannot be corrected with the available database schema.\"\n",
        error_message, failed_query
    );

    if let Some(schema) = schema {
        prompt.push_str(&format!("\nDatabase Schema:\n{}\n", render_schema(schema)));
    }

    prompt.push_str("\nProvide only the corrected SQL query without any explanations.");
    prompt
}
