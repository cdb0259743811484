/// Literal marker the model must emit when the question is not a
/// database query (or cannot be answered / corrected with the schema).
pub const NOT_DB_QUERY_PREFIX: &str = "NOT_DB_QUERY:";

/// Literal marker the model must emit when it needs the schema.
pub const SCHEMA_NEEDED_PREFIX: &str = "SCHEMA_NEEDED:";

/// Strip a leading ```` ```sql ```` fence and a trailing ```` ``` ````
/// fence independently when present, then trim surrounding whitespace.
/// The inner text is left unchanged otherwise.
pub fn clean_sql_response(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```sql") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }

    text.trim().to_string()
}
