//! Agent Host - the Cogni assistant core
//!
//! This crate provides:
//! - A session controller that turns user actions into model requests
//! - Extraction of suggested shell commands from model replies
//! - A persisted, deduplicated history of suggested commands
//! - Periodic screen analysis while autonomous mode is on
//! - Safe execution of suggested commands

pub mod command_extractor;
pub mod command_history;
pub mod controller;
pub mod conversation;
pub mod executor;
pub mod persistence;
pub mod proactive;
pub mod prompts;
pub mod request_gate;

#[cfg(test)]
pub(crate) mod testing;

pub use command_extractor::{extract_command, ExtractedCommand};
pub use command_history::{CommandHistoryStore, Direction};
pub use controller::{ActionOutcome, RunOutcome, SessionConfig, SessionController};
pub use conversation::ConversationState;
pub use executor::{classify_command, execute_command, CommandResult, DangerLevel};
pub use persistence::{FileStore, MemoryStore, Persistence, PersistenceError};
pub use proactive::{LoopState, ProactiveAnalysisLoop, TickOutcome};
pub use request_gate::{RequestGate, RequestPermit};
