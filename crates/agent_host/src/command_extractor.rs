//! Pulls the suggested shell command out of a model completion.
//!
//! The model is asked to wrap its command in a ```` ```bash ```` fenced block.
//! Only the first such block counts; anything after it stays in the prose.

use regex::Regex;
use std::sync::OnceLock;

static BASH_BLOCK_REGEX: OnceLock<Regex> = OnceLock::new();

fn bash_block_regex() -> &'static Regex {
    BASH_BLOCK_REGEX.get_or_init(|| {
        Regex::new(r"(?s)```bash\n(.*?)\n```").expect("bash block pattern is valid")
    })
}

/// A completion split into its command and the remaining explanation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCommand {
    /// Trimmed interior of the first bash block, if there was one.
    /// May be empty; use [`ExtractedCommand::actionable_command`] before acting on it.
    pub command: Option<String>,
    /// Completion with the first bash block removed, trimmed
    pub prose: String,
}

impl ExtractedCommand {
    /// The command, unless it is missing or blank
    pub fn actionable_command(&self) -> Option<&str> {
        self.command.as_deref().filter(|c| !c.is_empty())
    }
}

/// Split a completion into `(command, prose)`.
///
/// Unclosed or unlabeled fences are not commands. Never fails.
pub fn extract_command(completion: &str) -> ExtractedCommand {
    let re = bash_block_regex();
    match re.captures(completion) {
        Some(caps) => {
            let command = caps
                .get(1)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            let prose = re.replace(completion, "").trim().to_string();
            ExtractedCommand {
                command: Some(command),
                prose,
            }
        }
        None => ExtractedCommand {
            command: None,
            prose: completion.trim().to_string(),
        },
    }
}
