//! The break prompt shown when a break is due.
//!
//! A prompt runs its own countdown and always resolves exactly once, either
//! as [`PromptOutcome::Completed`] when the countdown elapses or as
//! [`PromptOutcome::Snoozed`] when the user backs out early and snoozing is
//! allowed.

use crate::breaks::breaks::PromptOutcome;
use crate::error::PromptError;
use notify_rust::{Notification, Timeout};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until};

const SNOOZE_ACTION: &str = "snooze";
/// A dismissal this close to the end of the countdown is the notification
/// expiring, not the user escaping.
const DISMISS_GRACE: Duration = Duration::from_secs(1);
const CLOSING_NOTICE_MS: u32 = 3000;

pub trait BreakPrompt: Send {
    fn show(&self, allow_snooze: bool) -> Result<oneshot::Receiver<PromptOutcome>, PromptError>;
}

/// What the user did with the notification before the countdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptAction {
    Snooze,
    Dismissed,
}

/// A notification on screen and the channel its action listener reports on.
struct Displayed {
    id: Option<u32>,
    actions: oneshot::Receiver<PromptAction>,
}

/// Full-attention desktop notification with an optional snooze action.
pub struct NotificationPrompt {
    duration: Duration,
}

impl NotificationPrompt {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    fn build(&self, allow_snooze: bool) -> Notification {
        let mut notification = Notification::new();
        notification
            .summary("EyeBreak")
            .body(&format!(
                "Look 6 metres away for {} seconds",
                self.duration.as_secs()
            ))
            .timeout(Timeout::Milliseconds(
                u32::try_from(self.duration.as_millis()).unwrap_or(u32::MAX),
            ));

        #[cfg(all(unix, not(target_os = "macos")))]
        notification.urgency(notify_rust::Urgency::Critical);

        if allow_snooze {
            notification.action(SNOOZE_ACTION, "Snooze");
        }
        notification
    }
}

impl BreakPrompt for NotificationPrompt {
    fn show(&self, allow_snooze: bool) -> Result<oneshot::Receiver<PromptOutcome>, PromptError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PromptError::Display(e.to_string()))?;

        let Displayed { id, actions } = display(self.build(allow_snooze))?;
        let deadline = Instant::now() + self.duration;
        let (tx, rx) = oneshot::channel();

        runtime.spawn(async move {
            let outcome = conclude(actions, allow_snooze, deadline, |outcome| {
                retire(id, outcome)
            })
            .await;
            let _ = tx.send(outcome);
        });

        Ok(rx)
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn display(notification: Notification) -> Result<Displayed, PromptError> {
    let handle = notification
        .show()
        .map_err(|e| PromptError::Display(e.to_string()))?;

    let id = handle.id();
    let (tx, rx) = oneshot::channel();
    // wait_for_action blocks on the D-Bus signal loop.
    std::thread::spawn(move || {
        handle.wait_for_action(|action| {
            let action = if action == SNOOZE_ACTION {
                PromptAction::Snooze
            } else {
                PromptAction::Dismissed
            };
            let _ = tx.send(action);
        });
    });
    Ok(Displayed {
        id: Some(id),
        actions: rx,
    })
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn display(notification: Notification) -> Result<Displayed, PromptError> {
    notification
        .show()
        .map(|_| ())
        .map_err(|e| PromptError::Display(e.to_string()))?;

    // No action support here; the dropped sender leaves only the countdown.
    let (_tx, rx) = oneshot::channel();
    Ok(Displayed {
        id: None,
        actions: rx,
    })
}

#[cfg(all(unix, not(target_os = "macos")))]
fn replacing(notice: &mut Notification, id: Option<u32>) {
    if let Some(id) = id {
        notice.id(id);
    }
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn replacing(_notice: &mut Notification, _id: Option<u32>) {}

/// The short-lived notice that takes over the prompt's slot once the break
/// is done. Snoozed prompts were already closed by the user.
fn closing_notice(id: Option<u32>, outcome: PromptOutcome) -> Option<Notification> {
    if outcome != PromptOutcome::Completed {
        return None;
    }
    let mut notice = Notification::new();
    notice
        .summary("EyeBreak")
        .body("Done! Back to work.")
        .timeout(Timeout::Milliseconds(CLOSING_NOTICE_MS));
    replacing(&mut notice, id);
    Some(notice)
}

/// Critical notifications may outlive their timeout, and the action listener
/// stays parked until the daemon reports the id closed. Replacing the prompt
/// with a normal-urgency notice under the same id clears it from the screen
/// and lets the listener exit when the notice expires.
fn retire(id: Option<u32>, outcome: PromptOutcome) {
    let Some(notice) = closing_notice(id, outcome) else {
        return;
    };
    if let Err(e) = notice.show() {
        tracing::debug!("cannot show completion notice: {e}");
    }
}

/// Decide whether an early user action ends the prompt.
fn classify(action: PromptAction, remaining: Duration, allow_snooze: bool) -> Option<PromptOutcome> {
    if !allow_snooze {
        return None;
    }
    match action {
        PromptAction::Snooze => Some(PromptOutcome::Snoozed),
        PromptAction::Dismissed if remaining > DISMISS_GRACE => Some(PromptOutcome::Snoozed),
        PromptAction::Dismissed => None,
    }
}

/// Wait for the outcome and hand it to `retire` before reporting it.
async fn conclude<F>(
    actions: oneshot::Receiver<PromptAction>,
    allow_snooze: bool,
    deadline: Instant,
    retire: F,
) -> PromptOutcome
where
    F: FnOnce(PromptOutcome),
{
    let outcome = resolve(actions, allow_snooze, deadline).await;
    retire(outcome);
    outcome
}

async fn resolve(
    actions: oneshot::Receiver<PromptAction>,
    allow_snooze: bool,
    deadline: Instant,
) -> PromptOutcome {
    tokio::select! {
        action = actions => {
            if let Ok(action) = action {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if let Some(outcome) = classify(action, remaining, allow_snooze) {
                    return outcome;
                }
            }
        }
        _ = sleep_until(deadline) => return PromptOutcome::Completed,
    }

    sleep_until(deadline).await;
    PromptOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snooze_only_when_allowed() {
        let plenty = Duration::from_secs(15);
        assert_eq!(
            classify(PromptAction::Snooze, plenty, true),
            Some(PromptOutcome::Snoozed)
        );
        assert_eq!(classify(PromptAction::Snooze, plenty, false), None);
        assert_eq!(classify(PromptAction::Dismissed, plenty, false), None);
    }

    #[test]
    fn early_dismissal_is_an_escape() {
        assert_eq!(
            classify(PromptAction::Dismissed, Duration::from_secs(10), true),
            Some(PromptOutcome::Snoozed)
        );
        assert_eq!(
            classify(PromptAction::Dismissed, Duration::from_millis(200), true),
            None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_completes_without_action() {
        let (_tx, rx) = oneshot::channel::<PromptAction>();
        let started = Instant::now();
        let outcome = resolve(rx, true, started + Duration::from_secs(20)).await;
        assert_eq!(outcome, PromptOutcome::Completed);
        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn snooze_action_resolves_early() {
        let (tx, rx) = oneshot::channel();
        let started = Instant::now();
        tx.send(PromptAction::Snooze).unwrap();
        let outcome = resolve(rx, true, started + Duration::from_secs(20)).await;
        assert_eq!(outcome, PromptOutcome::Snoozed);
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn forced_break_ignores_snooze() {
        let (tx, rx) = oneshot::channel();
        let started = Instant::now();
        tx.send(PromptAction::Snooze).unwrap();
        let outcome = resolve(rx, false, started + Duration::from_secs(20)).await;
        assert_eq!(outcome, PromptOutcome::Completed);
        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn completed_prompt_is_retired() {
        let (_tx, rx) = oneshot::channel::<PromptAction>();
        let started = Instant::now();
        let mut retired = Vec::new();
        let outcome = conclude(rx, true, started + Duration::from_secs(20), |outcome| {
            retired.push(outcome)
        })
        .await;
        assert_eq!(outcome, PromptOutcome::Completed);
        assert_eq!(retired, vec![PromptOutcome::Completed]);
    }

    #[tokio::test(start_paused = true)]
    async fn snoozed_prompt_is_retired_too() {
        let (tx, rx) = oneshot::channel();
        tx.send(PromptAction::Snooze).unwrap();
        let mut retired = Vec::new();
        conclude(rx, true, Instant::now() + Duration::from_secs(20), |outcome| {
            retired.push(outcome)
        })
        .await;
        assert_eq!(retired, vec![PromptOutcome::Snoozed]);
    }

    #[test]
    fn completion_replaces_the_prompt_with_a_short_notice() {
        let notice = closing_notice(Some(42), PromptOutcome::Completed).unwrap();
        assert_eq!(notice.body, "Done! Back to work.");
        assert!(notice.actions.is_empty());
        assert_eq!(notice.timeout, Timeout::Milliseconds(CLOSING_NOTICE_MS));

        assert!(closing_notice(Some(42), PromptOutcome::Snoozed).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn closed_action_channel_waits_out_countdown() {
        let (tx, rx) = oneshot::channel::<PromptAction>();
        drop(tx);
        let started = Instant::now();
        let outcome = resolve(rx, true, started + Duration::from_secs(5)).await;
        assert_eq!(outcome, PromptOutcome::Completed);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
