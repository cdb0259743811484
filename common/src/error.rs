use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqlGenError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("cannot open database: {0}")]
    DatabaseAccess(String),

    #[error("generation service error: {0}")]
    Generation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("tracing initialization failed: {0}")]
    Tracing(String),
}

pub type Result<T> = std::result::Result<T, SqlGenError>;
