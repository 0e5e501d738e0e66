//! Prompt text for Cogni.
//!
//! The system instruction fixes the ```` ```bash ```` convention that
//! [`crate::command_extractor`] relies on, and the proactive prompt fixes the
//! `NO_SUGGESTION` sentinel that [`crate::proactive`] filters on.

/// Literal reply meaning "nothing worth saying" from a proactive tick
pub const NO_SUGGESTION: &str = "NO_SUGGESTION";

/// System instruction sent with every request
pub const SYSTEM_INSTRUCTION: &str = r#"You are Cogni, an expert AI assistant for power users. Your primary goal is to help users by generating and explaining terminal commands.

When a user asks for a command to perform a task:
1.  Provide the single, most appropriate command for a standard Linux/macOS environment.
2.  Wrap the command in a markdown block like this: ```bash
your_command_here
```
3.  After the command block, provide a brief, clear explanation of what the command does and how it works.
4.  Do not include any text before the markdown block. Start your response directly with the command.

If the user provides you with the output of a command for analysis, explain it clearly, identify any important information or potential issues, and suggest next steps.
When analyzing a screen, provide concise and actionable advice.
Always be helpful, accurate, and format your responses with markdown for readability."#;

pub const GREETING: &str = "Hello! I'm Cogni. Ask me to perform a task, and I'll generate the command for you to run. Then, paste the output back for analysis.";

pub const AUTONOMOUS_ACTIVATED: &str = "Autonomous mode activated. I'll keep an eye on your screen and offer suggestions if I see something helpful.";

pub const PROACTIVE_PROMPT: &str = "Analyze the attached screenshot of my screen. I have not asked for help, but I want you to be a proactive assistant. Identify if I might be stuck, making an error, or could be doing something more efficiently. If you have a clear, concise, and highly relevant suggestion, provide it. If not, respond with the exact string 'NO_SUGGESTION'. Do not greet me.";

pub const CAPTURE_STARTED: &str =
    "Screen sharing started. Ask me a question about what you see!";

/// Analysis text shown when a screenshot answer had no prose of its own
pub const SCREEN_ANALYZED_FALLBACK: &str =
    "I've analyzed the screen. See my response in the chat.";

pub const SESSION_TOO_SHORT: &str = "I need a bit more conversation to analyze your day. Ask me a few more questions or work with me on a task, then try again.";

pub const SESSION_ANALYSIS_REQUEST: &str = "Can you analyze my day based on our conversation?";

pub const FILE_ANALYSIS_REQUEST: &str =
    "I've uploaded a file for analysis. Here are the insights:";

/// Prompt asking for a productivity review of the conversation so far
pub fn session_analysis_prompt(transcript: &str) -> String {
    format!(
        "Based on our conversation below, please provide a summary of my activities and suggest ways to improve my productivity. Analyze the topics I've asked about and the problems I've tried to solve to infer my workflow and challenges. Present it as a \"Productivity Analysis\" with key takeaways.\n\nConversation History:\n{}",
        transcript
    )
}

/// Prompt wrapping an uploaded document verbatim
pub fn file_analysis_prompt(content: &str) -> String {
    format!(
        "Please act as a productivity expert. Analyze the following data, which could be an exported browser history or another document, to provide a summary of my recent activities. Identify key themes, topics of interest, and suggest ways I could work more efficiently or learn more effectively based on this data. Format the output clearly.\n\nData:\n{}",
        content
    )
}

/// User message carrying pasted command output
pub fn command_output_message(output: &str) -> String {
    format!(
        "Here is the output from the last command I ran:\n\n```\n{}\n```",
        output.trim()
    )
}

/// Bot message shown when a manual request fails
pub fn error_message(context: Option<&str>, error: &str) -> String {
    match context {
        Some(context) => format!("Sorry, I ran into an issue during {}: {}", context, error),
        None => format!("Sorry, I ran into an issue: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proactive_prompt_names_sentinel() {
        assert!(PROACTIVE_PROMPT.contains(NO_SUGGESTION));
    }

    #[test]
    fn test_system_instruction_describes_bash_block() {
        assert!(SYSTEM_INSTRUCTION.contains("```bash\nyour_command_here\n```"));
    }

    #[test]
    fn test_command_output_message_is_fenced() {
        assert_eq!(
            command_output_message("  total 0\n"),
            "Here is the output from the last command I ran:\n\n```\ntotal 0\n```"
        );
    }

    #[test]
    fn test_error_message_context() {
        assert_eq!(
            error_message(None, "timeout"),
            "Sorry, I ran into an issue: timeout"
        );
        assert_eq!(
            error_message(Some("the file analysis"), "timeout"),
            "Sorry, I ran into an issue during the file analysis: timeout"
        );
    }
}
