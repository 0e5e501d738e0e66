//! Cogni - terminal front end
//!
//! Reads lines from stdin. Plain text is sent to the assistant (with a
//! screenshot while capture is on); lines starting with `/` are commands.

mod capture;
mod utils;

use agent_host::prompts::SYSTEM_INSTRUCTION;
use agent_host::{
    classify_command, ActionOutcome, DangerLevel, Direction, FileStore, RunOutcome,
    SessionConfig, SessionController,
};
use anyhow::Result;
use async_trait::async_trait;
use providers::GeminiClient;
use shared::events::SessionEvent;
use shared::gateway::{AssistanceGateway, GatewayError, ImagePayload};
use shared::message::{ChatMessage, MessageOrigin, Role};
use shared::settings::AppSettings;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::capture::ScreenCapture;

const HELP: &str = "\
Commands:
  /screen        start screen sharing
  /stop          stop screen sharing
  /auto          toggle autonomous mode (needs screen sharing)
  /day           analyze this session
  /file <path>   analyze a text file (e.g. exported browser history)
  /output        paste command output, end with a line containing only '.'
  /run           run the suggested command and analyze its output
  /copy          copy the suggested command to the clipboard
  /older /newer  step through command history
  /history       list command history
  /quit          exit";

/// Stand-in used when no API key is available; every request reports why.
struct UnconfiguredGateway {
    reason: String,
}

#[async_trait]
impl AssistanceGateway for UnconfiguredGateway {
    async fn request(
        &self,
        _prompt: &str,
        _image: Option<&ImagePayload>,
    ) -> Result<String, GatewayError> {
        Err(GatewayError::NotConfigured {
            provider: "gemini".to_string(),
            reason: self.reason.clone(),
        })
    }
}

fn build_gateway(settings: &AppSettings) -> Arc<dyn AssistanceGateway> {
    match GeminiClient::from_settings(&settings.model) {
        Ok(client) => {
            info!(model = client.model(), "using Gemini");
            Arc::new(client.with_system_instruction(SYSTEM_INSTRUCTION))
        }
        Err(e) => {
            warn!(error = %e, "Gemini is not configured");
            Arc::new(UnconfiguredGateway {
                reason: e.to_string(),
            })
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Interactive input state kept between lines
struct Repl {
    controller: Arc<SessionController>,
    settings: AppSettings,
    lines: Lines<BufReader<Stdin>>,
    history_cursor: Option<usize>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = utils::load_settings_or_default();
    // First run: write the defaults so there is a file to edit
    if utils::config_path().is_some_and(|path| !path.exists()) {
        if let Err(e) = utils::save_settings(&settings) {
            warn!(error = %e, "could not write default settings");
        }
    }
    let store_dir = utils::config_dir().unwrap_or_else(|| PathBuf::from(".cogni"));
    let persistence = Arc::new(FileStore::new(store_dir));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let controller = Arc::new(
        SessionController::new(
            build_gateway(&settings),
            persistence,
            SessionConfig::from(&settings),
        )
        .with_events(tx),
    );

    for message in controller.messages() {
        print_message(&message);
    }
    println!("(type /help for commands)");

    let renderer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            render_event(&event);
        }
    });

    let mut repl = Repl {
        controller: controller.clone(),
        settings,
        lines: BufReader::new(tokio::io::stdin()).lines(),
        history_cursor: None,
    };

    loop {
        prompt();
        let Some(line) = repl.lines.next_line().await? else {
            break;
        };
        match repl.handle_line(line.trim()).await? {
            Flow::Continue => {}
            Flow::Quit => break,
        }
    }

    controller.shutdown();
    renderer.abort();
    Ok(())
}

impl Repl {
    async fn handle_line(&mut self, line: &str) -> Result<Flow> {
        if line.is_empty() {
            return Ok(Flow::Continue);
        }
        if !line.starts_with('/') {
            self.history_cursor = None;
            let with_screenshot = self.controller.is_capturing();
            let outcome = self.controller.send_message(line, with_screenshot).await;
            report(&outcome);
            return Ok(Flow::Continue);
        }

        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" | "/exit" => return Ok(Flow::Quit),
            "/help" => println!("{}", HELP),
            "/screen" => self.start_capture(),
            "/stop" => {
                if self.controller.is_capturing() {
                    self.controller.stop_capture();
                } else {
                    println!("Screen sharing is not on.");
                }
            }
            "/auto" => {
                if self.controller.is_capturing() {
                    self.controller.toggle_autonomous();
                } else {
                    println!("Start screen sharing first (/screen).");
                }
            }
            "/day" => report(&self.controller.analyze_session().await),
            "/file" => self.analyze_file(arg).await,
            "/output" => {
                let output = self.read_block().await?;
                report(&self.controller.submit_command_output(&output).await);
            }
            "/run" => self.run_suggested().await?,
            "/copy" => copy_suggested(&self.controller),
            "/older" => self.step_history(Direction::Older),
            "/newer" => self.step_history(Direction::Newer),
            "/history" => {
                for (i, command) in self.controller.command_history().iter().enumerate() {
                    println!("{:>3}  {}", i, command);
                }
            }
            other => println!("Unknown command {}. Type /help.", other),
        }
        Ok(Flow::Continue)
    }

    fn start_capture(&self) {
        let Some(source) = self.settings.capture_source.clone() else {
            println!(
                "No capture source configured. Set \"capture_source\" in {}",
                utils::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "settings.json".into())
            );
            return;
        };
        self.controller
            .start_capture(Arc::new(ScreenCapture::new(source)));
    }

    async fn analyze_file(&self, arg: &str) {
        if arg.is_empty() {
            println!("Usage: /file <path>");
            return;
        }
        let path = utils::expand_user_path(arg);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let content = String::from_utf8_lossy(&bytes);
                report(&self.controller.analyze_file(&content).await);
            }
            Err(e) => println!("Could not read {}: {}", path.display(), e),
        }
    }

    /// Read lines until a lone "."
    async fn read_block(&mut self) -> Result<String> {
        println!("Paste the output, then a line with a single '.':");
        let mut block = String::new();
        while let Some(line) = self.lines.next_line().await? {
            if line.trim() == "." {
                break;
            }
            block.push_str(&line);
            block.push('\n');
        }
        Ok(block)
    }

    async fn confirm(&mut self, question: &str) -> Result<bool> {
        print!("{} [y/N] ", question);
        let _ = std::io::stdout().flush();
        let answer = self.lines.next_line().await?.unwrap_or_default();
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }

    async fn run_suggested(&mut self) -> Result<()> {
        let Some(command) = self.controller.suggested_command() else {
            println!("No command has been suggested yet.");
            return Ok(());
        };
        let level = classify_command(&command);
        if !matches!(level, DangerLevel::Safe | DangerLevel::Blocked) {
            let question = format!("Run `{}`? ({:?})", command, level);
            if !self.confirm(&question).await? {
                println!("Skipped.");
                return Ok(());
            }
        }

        match self.controller.run_suggested_command().await {
            RunOutcome::NoCommand => println!("No command has been suggested yet."),
            RunOutcome::Blocked { command } => {
                println!("`{}` is blocked for safety reasons.", command)
            }
            RunOutcome::Busy => println!("(still waiting on the previous answer)"),
            RunOutcome::Ran { result, analysis } => {
                println!(
                    "$ {}  [exit {}, {} ms]\n{}",
                    result.command,
                    result.exit_code,
                    result.duration_ms,
                    result.output.trim_end()
                );
                report(&analysis);
            }
        }
        Ok(())
    }

    fn step_history(&mut self, direction: Direction) {
        let (cursor, value) = self
            .controller
            .navigate_history(self.history_cursor, direction);
        self.history_cursor = cursor;
        if value.is_empty() {
            println!("(empty)");
        } else {
            println!("{}", value);
        }
    }
}

fn copy_suggested(controller: &SessionController) {
    let Some(command) = controller.suggested_command() else {
        println!("No command has been suggested yet.");
        return;
    };
    let copied = arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(command));
    match copied {
        Ok(()) => println!("Copied to clipboard."),
        Err(e) => {
            warn!(error = %e, "clipboard unavailable");
            println!("Could not copy: {}", e);
        }
    }
}

fn report(outcome: &ActionOutcome) {
    match outcome {
        ActionOutcome::Busy => println!("(still waiting on the previous answer)"),
        ActionOutcome::EmptyInput => println!("(nothing to send)"),
        ActionOutcome::Answered { .. }
        | ActionOutcome::Failed
        | ActionOutcome::NeedsMoreConversation => {}
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn print_message(message: &ChatMessage) {
    let tag = match message.origin {
        MessageOrigin::Proactive => " (proactive)",
        MessageOrigin::Normal => "",
    };
    println!(
        "\n{}{}: {}\n",
        message.role.transcript_label(),
        tag,
        message.content
    );
}

fn render_event(event: &SessionEvent) {
    match event {
        // The user already sees what they typed
        SessionEvent::MessageAppended(message) if message.role == Role::User => {}
        SessionEvent::MessageAppended(message) => print_message(message),
        SessionEvent::CommandSuggested { command } => {
            println!("Suggested command:\n    {}\n(/run to execute, /copy to copy)", command)
        }
        SessionEvent::CaptureChanged { active } => {
            println!("[screen sharing {}]", if *active { "on" } else { "off" })
        }
        SessionEvent::AutonomousChanged { enabled } => {
            println!("[autonomous mode {}]", if *enabled { "on" } else { "off" })
        }
    }
}
