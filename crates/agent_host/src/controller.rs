//! Session controller: every user-facing action goes through here.
//!
//! Lock order is `state` -> `proactive` -> `conversation`; no lock is held
//! across an `.await`.

use parking_lot::Mutex;
use shared::capture::{CaptureError, CaptureSession};
use shared::events::SessionEvent;
use shared::gateway::{AssistanceGateway, ImagePayload};
use shared::message::ChatMessage;
use shared::settings::AppSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::command_extractor::extract_command;
use crate::command_history::{CommandHistoryStore, Direction, DEFAULT_HISTORY_LIMIT};
use crate::conversation::ConversationState;
use crate::executor::{classify_command, execute_command, CommandResult, DangerLevel};
use crate::persistence::Persistence;
use crate::proactive::{LoopState, ProactiveAnalysisLoop, DEFAULT_PERIOD};
use crate::prompts;
use crate::request_gate::{RequestGate, RequestPermit};

/// Tunables for a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub autonomous_period: Duration,
    pub history_limit: usize,
    pub command_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autonomous_period: DEFAULT_PERIOD,
            history_limit: DEFAULT_HISTORY_LIMIT,
            command_timeout_secs: 60,
        }
    }
}

impl From<&AppSettings> for SessionConfig {
    fn from(settings: &AppSettings) -> Self {
        Self {
            autonomous_period: Duration::from_secs(settings.autonomous_interval_secs),
            history_limit: settings.command_history_limit,
            command_timeout_secs: settings.command_timeout_secs,
        }
    }
}

/// How a user action ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The model answered; `command` is the actionable command it suggested
    Answered { command: Option<String> },
    /// The model call failed and an error message was appended
    Failed,
    /// Another request is in flight
    Busy,
    /// Nothing to send
    EmptyInput,
    /// Too little conversation to analyze; guidance was appended
    NeedsMoreConversation,
}

/// Result of running the suggested command
#[derive(Debug, Clone)]
pub enum RunOutcome {
    NoCommand,
    Blocked { command: String },
    Busy,
    Ran {
        result: CommandResult,
        analysis: ActionOutcome,
    },
}

#[derive(Default)]
struct ControllerState {
    capture: Option<Arc<dyn CaptureSession>>,
    suggested_command: Option<String>,
    /// Latest screenshot-backed answer, shown while capture is active
    analysis: Option<String>,
}

pub struct SessionController {
    gateway: Arc<dyn AssistanceGateway>,
    gate: RequestGate,
    conversation: Arc<Mutex<ConversationState>>,
    history: Mutex<CommandHistoryStore>,
    proactive: Mutex<ProactiveAnalysisLoop>,
    state: Mutex<ControllerState>,
    events: Option<UnboundedSender<SessionEvent>>,
    command_timeout_secs: u64,
}

impl SessionController {
    pub fn new(
        gateway: Arc<dyn AssistanceGateway>,
        persistence: Arc<dyn Persistence>,
        config: SessionConfig,
    ) -> Self {
        let gate = RequestGate::new();
        let conversation = Arc::new(Mutex::new(ConversationState::with_greeting(
            prompts::GREETING,
        )));
        let history = CommandHistoryStore::open(persistence, config.history_limit);
        let proactive = ProactiveAnalysisLoop::new(
            gateway.clone(),
            gate.clone(),
            conversation.clone(),
            config.autonomous_period,
        );

        Self {
            gateway,
            gate,
            conversation,
            history: Mutex::new(history),
            proactive: Mutex::new(proactive),
            state: Mutex::new(ControllerState::default()),
            events: None,
            command_timeout_secs: config.command_timeout_secs,
        }
    }

    /// Stream session events (including asynchronous proactive messages)
    pub fn with_events(mut self, sender: UnboundedSender<SessionEvent>) -> Self {
        self.conversation.lock().set_event_sender(sender.clone());
        self.events = Some(sender);
        self
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn append(&self, message: ChatMessage) {
        self.conversation.lock().append(message);
    }

    /// Send a user message, optionally with a fresh frame from the capture session.
    pub async fn send_message(&self, text: &str, with_screenshot: bool) -> ActionOutcome {
        let text = text.trim();
        if text.is_empty() {
            return ActionOutcome::EmptyInput;
        }
        let Some(permit) = self.gate.try_acquire() else {
            debug!("send ignored, a request is already in flight");
            return ActionOutcome::Busy;
        };
        self.send_with_permit(&permit, text, with_screenshot).await
    }

    /// Body of [`Self::send_message`]; the caller already holds the gate.
    async fn send_with_permit(
        &self,
        _permit: &RequestPermit,
        text: &str,
        with_screenshot: bool,
    ) -> ActionOutcome {
        self.append(ChatMessage::user(text));
        self.state.lock().suggested_command = None;

        let image = if with_screenshot {
            self.capture_frame().await
        } else {
            None
        };

        let completion = match self.gateway.request(text, image.as_ref()).await {
            Ok(completion) => completion,
            Err(e) => {
                warn!(error = %e, "assistant request failed");
                self.append(ChatMessage::bot(prompts::error_message(None, &e.to_string())));
                return ActionOutcome::Failed;
            }
        };

        let extracted = extract_command(&completion);
        let command = extracted.actionable_command().map(str::to_string);

        if let Some(command) = &command {
            self.state.lock().suggested_command = Some(command.clone());
            self.history.lock().record(command);
            self.emit(SessionEvent::CommandSuggested {
                command: command.clone(),
            });
        }

        if !extracted.prose.is_empty() {
            self.append(ChatMessage::bot(extracted.prose.clone()));
        }

        if with_screenshot {
            let mut state = self.state.lock();
            if state.capture.is_some() {
                state.analysis = Some(if extracted.prose.is_empty() {
                    prompts::SCREEN_ANALYZED_FALLBACK.to_string()
                } else {
                    extracted.prose
                });
            }
        }

        ActionOutcome::Answered { command }
    }

    /// Grab a frame for a manual send. Any failure means "send without image".
    async fn capture_frame(&self) -> Option<ImagePayload> {
        let session = self.state.lock().capture.clone()?;
        match session.grab_frame().await {
            Ok(frame) => Some(frame),
            Err(CaptureError::Ended) => {
                warn!("capture session ended, sending without screenshot");
                self.detach_if_current(&session);
                None
            }
            Err(e) => {
                warn!(error = %e, "screenshot failed, sending without it");
                None
            }
        }
    }

    fn detach_if_current(&self, session: &Arc<dyn CaptureSession>) {
        let is_current = self
            .state
            .lock()
            .capture
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, session));
        if is_current {
            self.stop_capture();
        }
    }

    /// Paste back the output of a command for analysis
    pub async fn submit_command_output(&self, output: &str) -> ActionOutcome {
        if output.trim().is_empty() {
            return ActionOutcome::EmptyInput;
        }
        self.send_message(&prompts::command_output_message(output), false)
            .await
    }

    /// Run the suggested command and send its output back for analysis.
    ///
    /// Front ends should confirm anything [`classify_command`] does not call safe.
    pub async fn run_suggested_command(&self) -> RunOutcome {
        let Some(command) = self.suggested_command() else {
            return RunOutcome::NoCommand;
        };
        if classify_command(&command) == DangerLevel::Blocked {
            return RunOutcome::Blocked { command };
        }
        // Held until the output has been analyzed
        let Some(permit) = self.gate.try_acquire() else {
            return RunOutcome::Busy;
        };

        let result = execute_command(&command, self.command_timeout_secs).await;

        let output = if result.output.trim().is_empty() {
            "(no output)".to_string()
        } else {
            result.output.clone()
        };
        let message = prompts::command_output_message(&output);
        let analysis = self.send_with_permit(&permit, &message, false).await;
        RunOutcome::Ran { result, analysis }
    }

    /// Flip autonomous mode. Without a capture session this does nothing.
    pub fn toggle_autonomous(&self) -> bool {
        let state = self.state.lock();
        let mut proactive = self.proactive.lock();
        if state.capture.is_none() {
            debug!("autonomous mode needs an active capture session");
            return proactive.is_autonomous();
        }
        let enabled = !proactive.is_autonomous();
        proactive.set_autonomous(enabled);
        drop(proactive);
        drop(state);

        info!(enabled, "autonomous mode toggled");
        self.emit(SessionEvent::AutonomousChanged { enabled });
        enabled
    }

    /// Attach a live capture session, replacing (and stopping) any previous one
    pub fn start_capture(&self, session: Arc<dyn CaptureSession>) {
        let mut state = self.state.lock();
        let previous = state.capture.replace(session.clone());
        state.analysis = Some(prompts::CAPTURE_STARTED.to_string());
        self.proactive.lock().attach_session(session);
        drop(state);

        if let Some(previous) = previous {
            previous.stop();
        }
        info!("capture started");
        self.emit(SessionEvent::CaptureChanged { active: true });
    }

    /// End capture. Also turns autonomous mode off and clears the analysis text.
    pub fn stop_capture(&self) {
        let mut state = self.state.lock();
        state.analysis = None;
        let Some(session) = state.capture.take() else {
            return;
        };
        let was_autonomous = {
            let mut proactive = self.proactive.lock();
            let was = proactive.is_autonomous();
            proactive.set_autonomous(false);
            proactive.detach_session();
            was
        };
        drop(state);

        session.stop();
        info!("capture stopped");
        self.emit(SessionEvent::CaptureChanged { active: false });
        if was_autonomous {
            self.emit(SessionEvent::AutonomousChanged { enabled: false });
        }
    }

    /// Ask for a productivity review of the conversation so far
    pub async fn analyze_session(&self) -> ActionOutcome {
        let transcript = {
            let mut conversation = self.conversation.lock();
            if conversation.len() < 2 {
                conversation.append(ChatMessage::bot(prompts::SESSION_TOO_SHORT));
                return ActionOutcome::NeedsMoreConversation;
            }
            conversation.transcript()
        };

        let Some(_permit) = self.gate.try_acquire() else {
            return ActionOutcome::Busy;
        };
        self.append(ChatMessage::user(prompts::SESSION_ANALYSIS_REQUEST));

        let prompt = prompts::session_analysis_prompt(&transcript);
        self.answer_analysis(&prompt, "the analysis").await
    }

    /// Summarize an uploaded document. The text is used verbatim.
    pub async fn analyze_file(&self, content: &str) -> ActionOutcome {
        if content.is_empty() {
            return ActionOutcome::EmptyInput;
        }
        let Some(_permit) = self.gate.try_acquire() else {
            return ActionOutcome::Busy;
        };
        self.append(ChatMessage::user(prompts::FILE_ANALYSIS_REQUEST));

        let prompt = prompts::file_analysis_prompt(content);
        self.answer_analysis(&prompt, "the file analysis").await
    }

    /// Caller holds the gate
    async fn answer_analysis(&self, prompt: &str, context: &str) -> ActionOutcome {
        match self.gateway.request(prompt, None).await {
            Ok(response) => {
                self.append(ChatMessage::bot(response.trim()));
                ActionOutcome::Answered { command: None }
            }
            Err(e) => {
                warn!(error = %e, context, "analysis request failed");
                self.append(ChatMessage::bot(prompts::error_message(
                    Some(context),
                    &e.to_string(),
                )));
                ActionOutcome::Failed
            }
        }
    }

    /// Step through previously suggested commands like shell history
    pub fn navigate_history(
        &self,
        cursor: Option<usize>,
        direction: Direction,
    ) -> (Option<usize>, String) {
        self.history.lock().navigate(cursor, direction)
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.conversation.lock().messages().to_vec()
    }

    pub fn message_count(&self) -> usize {
        self.conversation.lock().len()
    }

    pub fn command_history(&self) -> Vec<String> {
        self.history.lock().entries().to_vec()
    }

    pub fn suggested_command(&self) -> Option<String> {
        self.state.lock().suggested_command.clone()
    }

    pub fn analysis(&self) -> Option<String> {
        self.state.lock().analysis.clone()
    }

    pub fn is_capturing(&self) -> bool {
        self.state.lock().capture.is_some()
    }

    pub fn is_autonomous(&self) -> bool {
        self.proactive.lock().is_autonomous()
    }

    pub fn loop_state(&self) -> LoopState {
        self.proactive.lock().state()
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Stop capture and cancel the proactive timer
    pub fn shutdown(&self) {
        self.stop_capture();
        self.proactive.lock().shutdown();
    }
}
