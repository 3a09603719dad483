//! Break scheduling state machine.
//!
//! The [`Scheduler`] owns every timer, counter and flag. It runs as a single
//! tokio task; timer expiry, prompt resolution and control commands are all
//! funnelled through one `select!` loop, so state is never touched from two
//! places at once.
//!
//! States: counting down (countdown timer armed), prompt active, paused
//! (pause timer armed, or paused with no timer when the deadline cannot be
//! represented). A meeting deferral is a transient pass through
//! `on_timer_fired` that lands straight back in counting down.

use crate::breaks::breaks::PromptOutcome;
use crate::clock::clock::Clock;
use crate::config::config::ScheduleConfig;
use crate::error::OracleError;
use crate::meeting::meeting::MeetingOracle;
use crate::prompt::prompt::BreakPrompt;
use crate::scheduler::handle::SchedulerHandle;
use crate::scheduler::status::{SchedulerState, status_text};
use crate::store::store::LastBreakStore;
use chrono::{DateTime, TimeDelta, Utc};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::oneshot::error::RecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Sleep;
use tracing::{debug, error, info, warn};

/// Control messages routed onto the scheduler task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TriggerNow,
    Pause(Duration),
    Resume,
    Wake,
}

/// A command plus an optional reply slot, answered with the state the
/// command left behind.
#[derive(Debug)]
pub(crate) struct Request {
    pub command: Command,
    pub reply: Option<oneshot::Sender<SchedulerState>>,
}

/// External capabilities the scheduler drives.
pub struct Collaborators {
    pub store: Box<dyn LastBreakStore>,
    pub oracle: Box<dyn MeetingOracle>,
    pub prompt: Box<dyn BreakPrompt>,
    pub clock: Arc<dyn Clock>,
}

/// A one-shot timer. Dropping it cancels it.
struct Timer {
    sleep: Pin<Box<Sleep>>,
}

impl Timer {
    fn after(delay: Duration) -> Self {
        Self {
            sleep: Box::pin(tokio::time::sleep(delay)),
        }
    }
}

enum Event {
    Request(Request),
    CountdownFired,
    PauseExpired,
    PromptResolved(Result<PromptOutcome, RecvError>),
}

pub struct Scheduler {
    config: ScheduleConfig,
    state: SchedulerState,
    countdown: Option<Timer>,
    pause_timer: Option<Timer>,
    pending_prompt: Option<oneshot::Receiver<PromptOutcome>>,
    store: Box<dyn LastBreakStore>,
    oracle: Box<dyn MeetingOracle>,
    break_prompt: Box<dyn BreakPrompt>,
    clock: Arc<dyn Clock>,
    status_tx: watch::Sender<SchedulerState>,
}

/// Delay before the next break given the last completed one.
///
/// A missing or stale record gets a full interval rather than an immediate
/// break, so launching after a long gap does not interrupt straight away.
pub fn delay_until_next_break(
    last_break: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval: Duration,
) -> Duration {
    let Some(last_break) = last_break else {
        return interval;
    };

    match now.signed_duration_since(last_break).to_std() {
        Ok(elapsed) if elapsed < interval => interval - elapsed,
        Ok(_) => interval,
        // Last break is in the future: the wall clock was moved back.
        Err(_) => interval,
    }
}

impl Scheduler {
    pub fn new(config: ScheduleConfig, collaborators: Collaborators) -> Self {
        let state = SchedulerState::default();
        let (status_tx, _) = watch::channel(state.clone());
        Self {
            config,
            state,
            countdown: None,
            pause_timer: None,
            pending_prompt: None,
            store: collaborators.store,
            oracle: collaborators.oracle,
            break_prompt: collaborators.prompt,
            clock: collaborators.clock,
            status_tx,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    #[cfg(test)]
    pub fn status_text(&self) -> String {
        status_text(&self.state, self.clock.now())
    }

    /// Receives a fresh snapshot after every transition.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.status_tx.subscribe()
    }

    /// Move the scheduler onto its own task and return a control handle.
    pub fn spawn(self) -> SchedulerHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let handle = SchedulerHandle::new(
            commands_tx,
            self.subscribe(),
            self.clock.clone(),
            self.config.pause_duration,
        );
        tokio::spawn(self.run(commands_rx));
        handle
    }

    /// Start from persisted state, then process events until every handle
    /// is dropped.
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Request>) {
        self.start();

        loop {
            let event = tokio::select! {
                request = commands.recv() => match request {
                    Some(request) => Event::Request(request),
                    None => break,
                },
                () = wait_for(&mut self.countdown) => Event::CountdownFired,
                () = wait_for(&mut self.pause_timer) => Event::PauseExpired,
                outcome = wait_for_prompt(&mut self.pending_prompt) => Event::PromptResolved(outcome),
            };
            self.handle(event);
        }

        self.countdown = None;
        self.pause_timer = None;
        info!("scheduler stopped");
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Request(Request { command, reply }) => {
                match command {
                    Command::TriggerNow => self.trigger_now(),
                    Command::Pause(duration) => self.pause(duration),
                    Command::Resume => self.resume(),
                    Command::Wake => self.on_wake(),
                }
                if let Some(reply) = reply {
                    let _ = reply.send(self.state.clone());
                }
            }
            Event::CountdownFired => self.on_timer_fired(),
            Event::PauseExpired => {
                info!("pause expired");
                self.resume();
            }
            Event::PromptResolved(outcome) => self.on_prompt_resolved(outcome),
        }
    }

    pub fn start(&mut self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            max_snoozes = self.config.max_snoozes,
            max_meeting_defers = self.config.max_meeting_defers,
            "scheduler starting"
        );
        self.schedule_from_last_break();
    }

    /// Evaluate a break right away. Meeting and snooze limits still apply.
    pub fn trigger_now(&mut self) {
        if self.state.prompt_active {
            debug!("break already in progress; ignoring manual trigger");
            return;
        }
        info!("manual break requested");
        self.cancel_countdown();
        self.on_timer_fired();
    }

    /// Pause for `duration`. Pausing again replaces the pause timer. A prompt
    /// already on screen is left alone.
    pub fn pause(&mut self, duration: Duration) {
        self.state.is_paused = true;
        self.cancel_countdown();

        let fires_at = self.deadline_after(duration);
        match fires_at {
            Some(fires_at) => {
                self.pause_timer = Some(Timer::after(duration));
                self.state.paused_until = Some(fires_at);
                info!(until = %fires_at, "paused");
            }
            None => {
                self.pause_timer = None;
                self.state.paused_until = None;
                warn!(?duration, "pause deadline out of range; paused until resumed");
            }
        }
        self.notify();
    }

    pub fn resume(&mut self) {
        self.state.is_paused = false;
        self.pause_timer = None;
        self.state.paused_until = None;
        info!("resumed");

        if self.state.prompt_active {
            // The prompt's resolution arms the next countdown.
            self.notify();
            return;
        }
        self.schedule_from_last_break();
    }

    /// The monotonic countdown stood still while the machine slept.
    pub fn on_wake(&mut self) {
        if self.state.is_paused || self.state.prompt_active {
            debug!("wake while paused or mid-break; nothing to reschedule");
            return;
        }
        info!("recalculating schedule after wake");
        self.schedule_from_last_break();
    }

    fn schedule_from_last_break(&mut self) {
        let last_break = match self.store.read_last_break() {
            Ok(last_break) => last_break,
            Err(e) => {
                warn!("cannot read last break, treating as never: {e}");
                None
            }
        };
        let delay = delay_until_next_break(last_break, self.clock.now(), self.config.interval);
        debug!(?last_break, delay_secs = delay.as_secs(), "scheduling from last break");
        self.arm_countdown(delay);
    }

    fn on_timer_fired(&mut self) {
        self.countdown = None;
        self.state.next_fire_time = None;

        let meeting = match self.check_meeting() {
            Ok(active) => active,
            Err(e) => {
                // Sensor trouble must never block a break.
                warn!("meeting check failed, assuming no meeting: {e}");
                false
            }
        };

        if meeting {
            if self.state.meeting_defer_count + 1 < self.config.max_meeting_defers {
                self.state.meeting_defer_count += 1;
                info!(
                    defers = self.state.meeting_defer_count,
                    max = self.config.max_meeting_defers,
                    "meeting in progress, deferring break"
                );
                self.arm_countdown(self.config.interval);
                return;
            }
            warn!(
                max = self.config.max_meeting_defers,
                "meeting defer limit reached, forcing break"
            );
        }

        self.state.meeting_defer_count = 0;
        let allow_snooze = self.state.snooze_count < self.config.max_snoozes;
        self.show_prompt(allow_snooze);
    }

    /// Device probes spawn processes and walk `/proc`. On a multi-threaded
    /// runtime the worker hands its other tasks off while they run; on a
    /// current-thread runtime the probe blocks the loop for its duration.
    fn check_meeting(&self) -> Result<bool, OracleError> {
        let oracle = &self.oracle;
        match Handle::try_current() {
            Ok(runtime) if runtime.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| oracle.is_meeting_active())
            }
            _ => oracle.is_meeting_active(),
        }
    }

    fn show_prompt(&mut self, allow_snooze: bool) {
        self.cancel_countdown();
        match self.break_prompt.show(allow_snooze) {
            Ok(outcome) => {
                self.pending_prompt = Some(outcome);
                self.state.prompt_active = true;
                info!(allow_snooze, snoozes = self.state.snooze_count, "break prompt shown");
                self.notify();
            }
            Err(e) => {
                error!("{e}; retrying after snooze delay");
                self.arm_countdown(self.config.snooze_delay);
            }
        }
    }

    fn on_prompt_resolved(&mut self, outcome: Result<PromptOutcome, RecvError>) {
        self.pending_prompt = None;
        self.state.prompt_active = false;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("break prompt went away without an outcome; retrying after snooze delay");
                self.arm_countdown(self.config.snooze_delay);
                return;
            }
        };
        info!("{} break {}", outcome.emoji(), outcome.as_str());

        match outcome {
            PromptOutcome::Completed => {
                self.state.snooze_count = 0;
                let now = self.clock.now();
                if let Err(e) = self.store.write_last_break(now) {
                    warn!("cannot persist last break: {e}");
                }
                self.arm_countdown(self.config.interval);
            }
            PromptOutcome::Snoozed => {
                self.state.snooze_count =
                    (self.state.snooze_count + 1).min(self.config.max_snoozes);
                info!(
                    snoozes = self.state.snooze_count,
                    max = self.config.max_snoozes,
                    "snoozed"
                );
                if self.state.snooze_count >= self.config.max_snoozes {
                    warn!("snooze limit reached, forcing break");
                    self.show_prompt(false);
                } else {
                    self.arm_countdown(self.config.snooze_delay);
                }
            }
        }
    }

    /// Replace the countdown timer. Never armed while paused; `resume`
    /// recomputes the schedule instead.
    fn arm_countdown(&mut self, delay: Duration) {
        self.cancel_countdown();

        if self.state.is_paused {
            debug!("paused; countdown left disarmed");
            self.notify();
            return;
        }

        match self.deadline_after(delay) {
            Some(fires_at) => {
                self.countdown = Some(Timer::after(delay));
                self.state.next_fire_time = Some(fires_at);
                debug!(at = %fires_at, "countdown armed");
            }
            None => {
                error!(?delay, "cannot arm countdown; waiting for the next wake or manual trigger");
            }
        }
        self.notify();
    }

    /// Idempotent.
    fn cancel_countdown(&mut self) {
        self.countdown = None;
        self.state.next_fire_time = None;
    }

    fn deadline_after(&self, delay: Duration) -> Option<DateTime<Utc>> {
        TimeDelta::from_std(delay)
            .ok()
            .and_then(|delay| self.clock.now().checked_add_signed(delay))
    }

    fn notify(&self) {
        self.status_tx.send_replace(self.state.clone());
    }
}

async fn wait_for(timer: &mut Option<Timer>) {
    match timer {
        Some(timer) => timer.sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn wait_for_prompt(
    prompt: &mut Option<oneshot::Receiver<PromptOutcome>>,
) -> Result<PromptOutcome, RecvError> {
    match prompt {
        Some(outcome) => outcome.await,
        None => std::future::pending().await,
    }
}
