pub const BREAK_INTERVAL_SECS: u64 = 20 * 60; // Time between breaks
pub const SNOOZE_DELAY_SECS: u64 = 60; // Delay after a snooze
pub const MAX_SNOOZES: u32 = 3; // Snoozes before a break is forced
pub const MAX_MEETING_DEFERS: u32 = 6; // Meeting deferrals before a break is forced
pub const PAUSE_DURATION_SECS: u64 = 60 * 60; // Default pause length
pub const PROMPT_DURATION_SECS: u64 = 20; // How long the break prompt counts down

/// How a break prompt was resolved. Every prompt resolves exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    Completed,
    Snoozed,
}

impl PromptOutcome {
    pub(crate) fn as_str(&self) -> &str {
        match self {
            PromptOutcome::Completed => "COMPLETED",
            PromptOutcome::Snoozed => "SNOOZED",
        }
    }

    pub(crate) fn emoji(&self) -> &str {
        match self {
            PromptOutcome::Completed => "👀",
            PromptOutcome::Snoozed => "💤",
        }
    }
}
