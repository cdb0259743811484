use crate::error::Result;
use crate::schema::{inspect, SchemaMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Caller-selected toggle: safe mode includes the schema in generation
/// prompts, fast mode omits it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GenerationMode {
    #[default]
    Safe,
    Fast,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Safe => "safe",
            GenerationMode::Fast => "fast",
        }
    }
}

impl FromStr for GenerationMode {
    type Err = crate::SqlGenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "safe" => Ok(GenerationMode::Safe),
            "fast" => Ok(GenerationMode::Fast),
            other => Err(crate::SqlGenError::Config(format!(
                "unknown generation mode '{}', expected 'safe' or 'fast'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub question: String,
    pub query: String,
}

/// Explicit per-session state, owned by the presentation shell and passed
/// into controller calls. Created empty, mutated only by the shell,
/// discarded when the session ends. The core never holds onto it.
#[derive(Debug, Default)]
pub struct SessionContext {
    pub db_path: Option<PathBuf>,
    pub schema: Option<SchemaMap>,
    pub mode: GenerationMode,
    pub current_query: Option<String>,
    history: Vec<HistoryEntry>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the session at a database: inspect it and replace the cached
    /// schema snapshot. Any previously generated query is dropped.
    pub fn load_database(&mut self, path: &Path) -> Result<()> {
        let schema = inspect(path)?;
        self.db_path = Some(path.to_path_buf());
        self.schema = Some(schema);
        self.current_query = None;
        Ok(())
    }

    /// Schema to hand to generation, honoring the mode toggle.
    pub fn schema_for_generation(&self) -> Option<&SchemaMap> {
        match self.mode {
            GenerationMode::Safe => self.schema.as_ref(),
            GenerationMode::Fast => None,
        }
    }

    /// Record a generated query as the working query and append it to the
    /// session's (question, query) history.
    pub fn record_query(&mut self, question: &str, query: &str) {
        self.current_query = Some(query.to_string());
        self.history.push(HistoryEntry {
            question: question.to_string(),
            query: query.to_string(),
        });
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }
}
