//! System instruction assembly for new upstream sessions.

use std::path::Path;
use tracing::warn;

/// Used when no prompt file is configured or the configured file cannot
/// be read.
const FALLBACK_PROMPT: &str = "You are a concise clinical voice assistant supporting a \
doctor during a patient consultation. Answer briefly and factually, use the available \
tools to look up patient data and update the board, and say so plainly when you do not \
know something.";

/// Builds the full system instruction: the base prompt followed by a
/// block identifying the current subject and, when available, a summary
/// of their context.
pub fn build(prompt_path: Option<&Path>, subject_id: &str, context_summary: &str) -> String {
    let base = load_base_prompt(prompt_path);
    let mut instruction = format!(
        "{base}\n\nYou are currently assisting with patient ID: {subject_id}."
    );
    if !context_summary.is_empty() {
        instruction.push_str("\n\nCurrent patient context:\n");
        instruction.push_str(context_summary);
    }
    instruction
}

fn load_base_prompt(prompt_path: Option<&Path>) -> String {
    let Some(path) = prompt_path else {
        return FALLBACK_PROMPT.to_string();
    };
    match std::fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => contents.trim().to_string(),
        Ok(_) => {
            warn!(path = %path.display(), "System prompt file is empty, using fallback");
            FALLBACK_PROMPT.to_string()
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "Failed to read system prompt file, using fallback");
            FALLBACK_PROMPT.to_string()
        }
    }
}

/// Truncates a context summary to at most `limit` characters, on a char
/// boundary.
pub fn truncate(summary: String, limit: usize) -> String {
    if summary.chars().count() <= limit {
        return summary;
    }
    summary.chars().take(limit).collect()
}
