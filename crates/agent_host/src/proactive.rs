//! Proactive Analysis Loop
//!
//! While autonomous mode is on *and* a capture session is attached, a timer
//! grabs a frame every period, asks the model whether the user could use a
//! hand, and appends any suggestion to the conversation.
//!
//! ```text
//! Inactive --(autonomous && session)--> Armed --tick--> Running --> Armed
//!    ^                                    |
//!    +--------(either input drops)--------+
//! ```
//!
//! The loop owns at most one timer token. Arming always cancels the previous
//! token first; disarming aborts the timer task, which also drops any request
//! still in flight. A result is only applied while its token is live.

use parking_lot::Mutex;
use shared::capture::CaptureSession;
use shared::gateway::AssistanceGateway;
use shared::message::ChatMessage;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::conversation::ConversationState;
use crate::prompts::{AUTONOMOUS_ACTIVATED, NO_SUGGESTION, PROACTIVE_PROMPT};
use crate::request_gate::RequestGate;

/// Default time between ticks
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(20);

const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Observable state of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No timer
    Inactive,
    /// Timer scheduled, waiting for the next tick
    Armed,
    /// A tick is capturing or waiting on the model
    Running,
}

/// What a single tick ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another request held the gate
    SkippedBusy,
    /// No frame could be captured
    CaptureFailed,
    /// The model had nothing to add
    NoSuggestion,
    /// A suggestion was appended
    Suggested,
    /// The model call failed
    GatewayFailed,
    /// The loop was disarmed before the result landed
    Stale,
}

struct TimerToken {
    handle: JoinHandle<()>,
    live: Arc<AtomicBool>,
}

impl TimerToken {
    /// Ticks read `live` under the conversation lock; it is cleared under the
    /// same lock, so no append lands after this returns.
    fn cancel(self, conversation: &Mutex<ConversationState>) {
        {
            let _conversation = conversation.lock();
            self.live.store(false, Ordering::SeqCst);
        }
        self.handle.abort();
    }
}

/// Everything one tick needs, shared with the timer task
struct TickContext {
    gateway: Arc<dyn AssistanceGateway>,
    gate: RequestGate,
    conversation: Arc<Mutex<ConversationState>>,
    session: Arc<dyn CaptureSession>,
    live: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    executed: Arc<AtomicU64>,
}

/// Clears the running flag however the tick exits
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ProactiveAnalysisLoop {
    gateway: Arc<dyn AssistanceGateway>,
    gate: RequestGate,
    conversation: Arc<Mutex<ConversationState>>,
    period: Duration,
    autonomous: bool,
    session: Option<Arc<dyn CaptureSession>>,
    timer: Option<TimerToken>,
    running: Arc<AtomicBool>,
    executed: Arc<AtomicU64>,
}

impl ProactiveAnalysisLoop {
    pub fn new(
        gateway: Arc<dyn AssistanceGateway>,
        gate: RequestGate,
        conversation: Arc<Mutex<ConversationState>>,
        period: Duration,
    ) -> Self {
        Self {
            gateway,
            gate,
            conversation,
            period: period.max(MIN_PERIOD),
            autonomous: false,
            session: None,
            timer: None,
            running: Arc::new(AtomicBool::new(false)),
            executed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_autonomous(&self) -> bool {
        self.autonomous
    }

    pub fn set_autonomous(&mut self, enabled: bool) {
        self.autonomous = enabled;
        self.reconcile();
    }

    /// Attach a capture session. Replacing a session while armed re-arms on
    /// the new one.
    pub fn attach_session(&mut self, session: Arc<dyn CaptureSession>) {
        let replacing = self.session.is_some();
        self.session = Some(session);
        if replacing && self.timer.is_some() {
            self.arm();
        } else {
            self.reconcile();
        }
    }

    pub fn detach_session(&mut self) {
        self.session = None;
        self.reconcile();
    }

    pub fn state(&self) -> LoopState {
        match &self.timer {
            None => LoopState::Inactive,
            Some(_) if self.running.load(Ordering::SeqCst) => LoopState::Running,
            Some(_) => LoopState::Armed,
        }
    }

    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Ticks that got past the gate (captured or tried to)
    pub fn executed_ticks(&self) -> u64 {
        self.executed.load(Ordering::SeqCst)
    }

    /// Cancel the timer without touching the inputs
    pub fn shutdown(&mut self) {
        self.disarm();
    }

    fn reconcile(&mut self) {
        let should_arm = self.autonomous && self.session.is_some();
        match (should_arm, self.timer.is_some()) {
            (true, false) => self.arm(),
            (false, true) => self.disarm(),
            _ => {}
        }
    }

    fn arm(&mut self) {
        self.disarm();

        let Some(session) = self.session.clone() else {
            return;
        };
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "no async runtime, proactive analysis stays off");
                return;
            }
        };

        let live = Arc::new(AtomicBool::new(true));
        let ctx = TickContext {
            gateway: self.gateway.clone(),
            gate: self.gate.clone(),
            conversation: self.conversation.clone(),
            session,
            live: live.clone(),
            running: self.running.clone(),
            executed: self.executed.clone(),
        };
        let period = self.period;

        let handle = runtime.spawn(async move {
            // First tick one full period after arming
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let outcome = run_tick(&ctx).await;
                debug!(?outcome, "proactive tick finished");
            }
        });
        self.timer = Some(TimerToken { handle, live });

        info!(period_secs = period.as_secs(), "proactive analysis armed");
        self.conversation
            .lock()
            .append(ChatMessage::proactive(AUTONOMOUS_ACTIVATED));
    }

    fn disarm(&mut self) {
        if let Some(token) = self.timer.take() {
            token.cancel(&self.conversation);
            self.running.store(false, Ordering::SeqCst);
            info!("proactive analysis disarmed");
        }
    }
}

impl Drop for ProactiveAnalysisLoop {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn run_tick(ctx: &TickContext) -> TickOutcome {
    let Some(_permit) = ctx.gate.try_acquire() else {
        return TickOutcome::SkippedBusy;
    };
    ctx.running.store(true, Ordering::SeqCst);
    let _running = RunningGuard(ctx.running.clone());
    ctx.executed.fetch_add(1, Ordering::SeqCst);

    let frame = match ctx.session.grab_frame().await {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "proactive tick skipped, no frame");
            return TickOutcome::CaptureFailed;
        }
    };

    let response = match ctx.gateway.request(PROACTIVE_PROMPT, Some(&frame)).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "proactive analysis failed");
            return TickOutcome::GatewayFailed;
        }
    };

    let suggestion = response.trim();
    if suggestion.is_empty() || suggestion == NO_SUGGESTION {
        return TickOutcome::NoSuggestion;
    }

    let mut conversation = ctx.conversation.lock();
    if !ctx.live.load(Ordering::SeqCst) {
        return TickOutcome::Stale;
    }
    conversation.append(ChatMessage::proactive(suggestion));
    TickOutcome::Suggested
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCapture, ScriptedGateway};
    use shared::gateway::GatewayError;

    struct Harness {
        gateway: Arc<ScriptedGateway>,
        gate: RequestGate,
        conversation: Arc<Mutex<ConversationState>>,
        proactive: ProactiveAnalysisLoop,
    }

    fn harness(gateway: ScriptedGateway) -> Harness {
        let gateway = Arc::new(gateway);
        let gate = RequestGate::new();
        let conversation = Arc::new(Mutex::new(ConversationState::new()));
        let proactive = ProactiveAnalysisLoop::new(
            gateway.clone(),
            gate.clone(),
            conversation.clone(),
            DEFAULT_PERIOD,
        );
        Harness {
            gateway,
            gate,
            conversation,
            proactive,
        }
    }

    fn contents(conversation: &Mutex<ConversationState>) -> Vec<String> {
        conversation
            .lock()
            .messages()
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    async fn wait(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_arming_announces_and_ticks_append_suggestions() {
        let mut h = harness(ScriptedGateway::replying("You left a merge conflict in main.rs."));
        h.proactive.attach_session(Arc::new(FakeCapture::new()));
        assert_eq!(h.proactive.state(), LoopState::Inactive);

        h.proactive.set_autonomous(true);
        assert_eq!(h.proactive.state(), LoopState::Armed);
        assert_eq!(contents(&h.conversation), vec![AUTONOMOUS_ACTIVATED]);

        // Nothing before the first full period
        wait(19).await;
        assert_eq!(h.gateway.call_count(), 0);

        wait(2).await;
        assert_eq!(h.gateway.call_count(), 1);
        let log = h.conversation.lock();
        let last = log.last().unwrap();
        assert!(last.is_proactive());
        assert_eq!(last.content, "You left a merge conflict in main.rs.");
        drop(log);

        let calls = h.gateway.calls();
        assert_eq!(calls[0].prompt, PROACTIVE_PROMPT);
        assert!(calls[0].had_image);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autonomous_without_session_creates_no_timer() {
        let mut h = harness(ScriptedGateway::replying("tip"));
        h.proactive.set_autonomous(true);

        assert!(!h.proactive.has_timer());
        wait(100).await;
        assert_eq!(h.gateway.call_count(), 0);
        assert!(h.conversation.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabling_stops_all_ticks() {
        let mut h = harness(ScriptedGateway::replying(NO_SUGGESTION));
        h.proactive.attach_session(Arc::new(FakeCapture::new()));
        h.proactive.set_autonomous(true);

        wait(45).await;
        assert_eq!(h.gateway.call_count(), 2);

        h.proactive.set_autonomous(false);
        assert_eq!(h.proactive.state(), LoopState::Inactive);
        wait(200).await;
        assert_eq!(h.gateway.call_count(), 2);
        // Leaving Armed is silent
        assert_eq!(contents(&h.conversation), vec![AUTONOMOUS_ACTIVATED]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detaching_session_stops_all_ticks() {
        let mut h = harness(ScriptedGateway::replying(NO_SUGGESTION));
        h.proactive.attach_session(Arc::new(FakeCapture::new()));
        h.proactive.set_autonomous(true);
        wait(25).await;

        h.proactive.detach_session();
        wait(200).await;
        assert_eq!(h.gateway.call_count(), 1);
        assert!(h.proactive.is_autonomous());
        assert!(!h.proactive.has_timer());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sentinel_reply_adds_nothing() {
        let mut h = harness(ScriptedGateway::replying("  NO_SUGGESTION\n"));
        h.proactive.attach_session(Arc::new(FakeCapture::new()));
        h.proactive.set_autonomous(true);

        wait(61).await;
        assert_eq!(h.gateway.call_count(), 3);
        assert_eq!(h.conversation.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_gate_skips_tick_but_keeps_timer() {
        let mut h = harness(ScriptedGateway::replying("tip"));
        h.proactive.attach_session(Arc::new(FakeCapture::new()));
        h.proactive.set_autonomous(true);

        let permit = h.gate.try_acquire().unwrap();
        wait(21).await;
        assert_eq!(h.gateway.call_count(), 0);
        assert_eq!(h.proactive.executed_ticks(), 0);
        assert!(h.proactive.has_timer());

        drop(permit);
        wait(20).await;
        assert_eq!(h.gateway.call_count(), 1);
        assert!(!h.gate.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_failure_is_silent() {
        let mut h = harness(ScriptedGateway::replying("tip"));
        let capture = Arc::new(FakeCapture::new());
        capture.set_failing(true);
        h.proactive.attach_session(capture.clone());
        h.proactive.set_autonomous(true);

        wait(21).await;
        assert_eq!(h.proactive.executed_ticks(), 1);
        assert_eq!(h.gateway.call_count(), 0);
        assert_eq!(h.conversation.lock().len(), 1);
        assert_eq!(h.proactive.state(), LoopState::Armed);

        capture.set_failing(false);
        wait(20).await;
        assert_eq!(h.gateway.call_count(), 1);
        assert_eq!(h.conversation.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gateway_failure_is_logged_not_shown() {
        let gateway = ScriptedGateway::replying("second time lucky");
        gateway.push(Err(GatewayError::Transport("connection reset".into())));
        let mut h = harness(gateway);
        h.proactive.attach_session(Arc::new(FakeCapture::new()));
        h.proactive.set_autonomous(true);

        wait(21).await;
        assert_eq!(contents(&h.conversation), vec![AUTONOMOUS_ACTIVATED]);
        assert!(!h.gate.is_busy());

        wait(20).await;
        assert_eq!(
            contents(&h.conversation),
            vec![AUTONOMOUS_ACTIVATED, "second time lucky"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacing_session_rearms_single_timer() {
        let mut h = harness(ScriptedGateway::replying(NO_SUGGESTION));
        let first = Arc::new(FakeCapture::new());
        let second = Arc::new(FakeCapture::new());
        h.proactive.attach_session(first.clone());
        h.proactive.set_autonomous(true);
        wait(10).await;

        h.proactive.attach_session(second.clone());
        wait(50).await;

        // Re-armed at t=10: ticks at 30 and 50, all on the new session
        assert_eq!(first.frames_taken(), 0);
        assert_eq!(second.frames_taken(), 2);
        assert_eq!(h.gateway.call_count(), 2);
        assert_eq!(
            contents(&h.conversation),
            vec![AUTONOMOUS_ACTIVATED, AUTONOMOUS_ACTIVATED]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_enable_does_not_stack_timers() {
        let mut h = harness(ScriptedGateway::replying(NO_SUGGESTION));
        h.proactive.attach_session(Arc::new(FakeCapture::new()));
        h.proactive.set_autonomous(true);
        h.proactive.set_autonomous(true);
        h.proactive.set_autonomous(true);

        wait(41).await;
        assert_eq!(h.gateway.call_count(), 2);
        assert_eq!(h.conversation.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_result_is_dropped_after_disarm() {
        let gateway = ScriptedGateway::replying("late suggestion").with_delay(Duration::from_secs(5));
        let mut h = harness(gateway);
        h.proactive.attach_session(Arc::new(FakeCapture::new()));
        h.proactive.set_autonomous(true);

        wait(22).await;
        assert_eq!(h.proactive.state(), LoopState::Running);
        assert!(h.gate.is_busy());

        h.proactive.set_autonomous(false);
        wait(30).await;
        assert_eq!(contents(&h.conversation), vec![AUTONOMOUS_ACTIVATED]);
        assert!(!h.gate.is_busy());
        assert_eq!(h.proactive.state(), LoopState::Inactive);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disarm_waits_for_conversation_lock() {
        let mut h = harness(ScriptedGateway::replying("tip"));
        h.proactive.attach_session(Arc::new(FakeCapture::new()));
        h.proactive.set_autonomous(true);
        assert!(h.proactive.has_timer());

        // A tick that already checked liveness holds this lock while appending
        let held = h.conversation.lock();
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let mut proactive = h.proactive;
        let disarming = std::thread::spawn(move || {
            proactive.set_autonomous(false);
            let _ = done_tx.send(());
            proactive
        });

        assert!(done_rx
            .recv_timeout(std::time::Duration::from_millis(100))
            .is_err());
        drop(held);
        assert!(done_rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .is_ok());
        let proactive = disarming.join().unwrap();
        assert_eq!(proactive.state(), LoopState::Inactive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let h = harness(ScriptedGateway::replying("tip"));
        let gateway = h.gateway.clone();
        let mut proactive = h.proactive;
        proactive.attach_session(Arc::new(FakeCapture::new()));
        proactive.set_autonomous(true);
        drop(proactive);

        wait(100).await;
        assert_eq!(gateway.call_count(), 0);
    }

    #[test]
    fn test_arming_outside_runtime_is_harmless() {
        let h = harness(ScriptedGateway::replying("tip"));
        let mut proactive = h.proactive;
        proactive.attach_session(Arc::new(FakeCapture::new()));
        proactive.set_autonomous(true);
        assert!(!proactive.has_timer());
        assert!(h.conversation.lock().is_empty());
    }
}
