//! Runs a suggested command through the shell.
//!
//! Commands are classified first so a front end can ask before running
//! anything that writes, and so the worst ones never run at all.

use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{info, warn};

/// Output kept for display and for the follow-up analysis request
const MAX_OUTPUT_CHARS: usize = 10_000;

/// Danger level for commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DangerLevel {
    /// Read-only commands (ls, cat, grep, etc.)
    Safe,
    /// Writes that can be undone (cp, mv, mkdir) and anything unknown
    NeedsConfirmation,
    /// Destructive commands (rm, chmod, kill)
    Dangerous,
    /// Commands that require elevated privileges
    NeedsSudo,
    /// Never run
    Blocked,
}

/// Result of running a command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    /// Exit code (-1 when the process never finished)
    pub exit_code: i32,
    /// Stdout and stderr combined, truncated
    pub output: String,
    pub duration_ms: u64,
    pub success: bool,
}

const SAFE_COMMANDS: &[&str] = &[
    // File listing and info
    "ls", "find", "cat", "head", "tail", "wc", "du", "df", "pwd", "file", "stat", "tree",
    "which", "whereis",
    // Text processing
    "grep", "rg", "awk", "sort", "uniq", "cut", "tr", "diff", "column",
    // System info
    "uname", "hostname", "uptime", "free", "ps", "lscpu", "lsblk", "lsof", "id", "whoami",
    "date", "env", "printenv", "echo",
    // Network info
    "ip", "ifconfig", "netstat", "ss", "ping", "dig", "host",
    // Git reads
    "git status", "git log", "git diff", "git show", "git branch", "git remote",
    // Versions
    "node --version", "python3 --version", "cargo --version", "rustc --version",
];

const NEEDS_CONFIRMATION: &[&str] = &[
    "cp", "mv", "mkdir", "touch", "ln",
    "git add", "git commit", "git push", "git pull", "git merge", "git checkout", "git stash",
    "pip install", "npm install", "cargo install", "brew install",
];

const DANGEROUS_COMMANDS: &[&str] = &[
    "rm", "rmdir", "shred",
    "chmod", "chown", "chgrp",
    "kill", "killall", "pkill",
    "git reset --hard", "git clean", "git push --force",
];

const BLOCKED_COMMANDS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    ":(){ :|:& };:",
    "mkfs",
    "dd if=/dev/zero",
    "dd if=/dev/random",
    "> /dev/sda",
    ">/dev/sda",
];

/// Does `cmd` start with `prefix` as a whole word?
fn starts_with_word(cmd: &str, prefix: &str) -> bool {
    cmd.strip_prefix(prefix)
        .map(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
        .unwrap_or(false)
}

/// Classify a command by danger level
pub fn classify_command(cmd: &str) -> DangerLevel {
    let cmd_lower = cmd.to_lowercase();
    let cmd_trimmed = cmd_lower.trim();

    if BLOCKED_COMMANDS.iter().any(|b| cmd_trimmed.contains(b)) {
        return DangerLevel::Blocked;
    }

    if starts_with_word(cmd_trimmed, "sudo") {
        return DangerLevel::NeedsSudo;
    }

    if DANGEROUS_COMMANDS.iter().any(|d| {
        starts_with_word(cmd_trimmed, d)
            || cmd_trimmed.contains(&format!("| {} ", d))
            || cmd_trimmed.contains(&format!("; {} ", d))
            || cmd_trimmed.contains(&format!("&& {} ", d))
    }) {
        return DangerLevel::Dangerous;
    }

    if NEEDS_CONFIRMATION
        .iter()
        .any(|c| starts_with_word(cmd_trimmed, c))
    {
        return DangerLevel::NeedsConfirmation;
    }

    // Multi-line scripts and chains get a look before running
    if cmd_trimmed.contains('\n') || cmd_trimmed.contains("&&") || cmd_trimmed.contains(';') {
        return DangerLevel::NeedsConfirmation;
    }

    if SAFE_COMMANDS.iter().any(|s| starts_with_word(cmd_trimmed, s)) {
        return DangerLevel::Safe;
    }

    DangerLevel::NeedsConfirmation
}

/// Execute a command and return structured result.
///
/// Spawn failures and timeouts are reported in the result, never as an error.
pub async fn execute_command(cmd: &str, timeout_secs: u64) -> CommandResult {
    if classify_command(cmd) == DangerLevel::Blocked {
        warn!(command = cmd, "refusing blocked command");
        return CommandResult {
            command: cmd.to_string(),
            exit_code: -1,
            output: "This command is blocked for safety reasons.".to_string(),
            duration_ms: 0,
            success: false,
        };
    }

    let start = Instant::now();

    // Determine shell based on OS
    let (shell, shell_arg) = if cfg!(windows) {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    };

    let output = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        Command::new(shell)
            .arg(shell_arg)
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await;

    let duration_ms = start.elapsed().as_millis() as u64;

    let result = match output {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);

            let mut combined = stdout.into_owned();
            if !stderr.is_empty() {
                if !combined.is_empty() {
                    combined.push('\n');
                }
                combined.push_str(&stderr);
            }

            CommandResult {
                command: cmd.to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                output: truncate_output(combined),
                duration_ms,
                success: output.status.success(),
            }
        }
        Ok(Err(e)) => CommandResult {
            command: cmd.to_string(),
            exit_code: -1,
            output: format!("Failed to execute: {}", e),
            duration_ms,
            success: false,
        },
        Err(_) => CommandResult {
            command: cmd.to_string(),
            exit_code: -1,
            output: format!("Command timed out after {} seconds", timeout_secs),
            duration_ms,
            success: false,
        },
    };

    info!(
        command = cmd,
        exit_code = result.exit_code,
        duration_ms,
        "command finished"
    );
    result
}

fn truncate_output(output: String) -> String {
    let total = output.chars().count();
    if total <= MAX_OUTPUT_CHARS {
        return output;
    }
    format!(
        "{}...\n[Output truncated, {} characters total]",
        output.chars().take(MAX_OUTPUT_CHARS).collect::<String>(),
        total
    )
}
