use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the user is asked to pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Photos to import.
    Images,
    /// A replacement for one photo whose file went missing.
    Relocate,
    /// Vocabulary files to import.
    Vocabularies,
    /// Template files to import.
    Templates,
}

/// Interactive file selection. `None` means the user cancelled, which is not an error.
#[async_trait]
pub trait Prompt: Send + Sync {
    async fn prompt_files(&self, kind: PromptKind) -> Option<Vec<PathBuf>>;
}

/// Used where nobody can answer: every prompt is cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

#[async_trait]
impl Prompt for NoPrompt {
    async fn prompt_files(&self, kind: PromptKind) -> Option<Vec<PathBuf>> {
        tracing::debug!(?kind, "no interactive prompt available");
        None
    }
}
