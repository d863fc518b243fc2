//! Patient-context collaborator seam.

use anyhow::Result;
use async_trait::async_trait;

/// Supplies the conversational context blob for a subject.
///
/// The returned text is folded into the upstream system instruction, so
/// implementations should keep it brief; the session core additionally
/// truncates it to a configured length.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn fetch_context_summary(&self, subject_id: &str) -> Result<String>;
}
