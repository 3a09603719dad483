use chrono::{DateTime, Utc};

/// Everything the scheduler knows about itself. Published to observers after
/// every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerState {
    pub is_paused: bool,
    pub snooze_count: u32,
    pub meeting_defer_count: u32,
    /// Set only while the countdown timer is armed.
    pub next_fire_time: Option<DateTime<Utc>>,
    /// Set only while the pause timer is armed.
    pub paused_until: Option<DateTime<Utc>>,
    pub prompt_active: bool,
}

/// Menu-bar text for `state` as seen at `now`. Never cached.
pub fn status_text(state: &SchedulerState, now: DateTime<Utc>) -> String {
    if state.is_paused {
        return "Paused".to_string();
    }
    if state.prompt_active {
        return "Break in progress".to_string();
    }
    let Some(next) = state.next_fire_time else {
        return "Scheduling...".to_string();
    };

    let remaining = next.signed_duration_since(now).num_seconds().max(0);
    format!("Next break in {}:{:02}", remaining / 60, remaining % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 14, 0, 0).unwrap()
    }

    fn counting_down(remaining: TimeDelta) -> SchedulerState {
        SchedulerState {
            next_fire_time: Some(now() + remaining),
            ..SchedulerState::default()
        }
    }

    #[test]
    fn zero_seconds_left() {
        assert_eq!(
            status_text(&counting_down(TimeDelta::zero()), now()),
            "Next break in 0:00"
        );
    }

    #[test]
    fn overdue_is_clamped_to_zero() {
        assert_eq!(
            status_text(&counting_down(TimeDelta::seconds(-42)), now()),
            "Next break in 0:00"
        );
    }

    #[test]
    fn exactly_one_minute() {
        assert_eq!(
            status_text(&counting_down(TimeDelta::minutes(1)), now()),
            "Next break in 1:00"
        );
    }

    #[test]
    fn fractional_seconds_are_floored() {
        assert_eq!(
            status_text(&counting_down(TimeDelta::milliseconds(59_999)), now()),
            "Next break in 0:59"
        );
        assert_eq!(
            status_text(&counting_down(TimeDelta::seconds(20 * 60)), now()),
            "Next break in 20:00"
        );
    }

    #[test]
    fn minutes_are_unbounded() {
        assert_eq!(
            status_text(&counting_down(TimeDelta::seconds(125 * 60 + 7)), now()),
            "Next break in 125:07"
        );
    }

    #[test]
    fn paused_wins_over_everything() {
        let state = SchedulerState {
            is_paused: true,
            prompt_active: true,
            next_fire_time: Some(now()),
            ..SchedulerState::default()
        };
        assert_eq!(status_text(&state, now()), "Paused");
    }

    #[test]
    fn prompt_in_progress() {
        let state = SchedulerState {
            prompt_active: true,
            ..SchedulerState::default()
        };
        assert_eq!(status_text(&state, now()), "Break in progress");
    }

    #[test]
    fn race_window_between_fire_and_rearm() {
        assert_eq!(
            status_text(&SchedulerState::default(), now()),
            "Scheduling..."
        );
    }
}
