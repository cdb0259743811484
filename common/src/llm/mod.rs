pub mod client;

pub use client::{CompletionService, GeminiClient};
