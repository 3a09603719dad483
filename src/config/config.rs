use crate::breaks::breaks::{
    BREAK_INTERVAL_SECS, MAX_MEETING_DEFERS, MAX_SNOOZES, PAUSE_DURATION_SECS,
    PROMPT_DURATION_SECS, SNOOZE_DELAY_SECS,
};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONTROL_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8765));
const DEFAULT_WAKE_POLL_SECS: u64 = 5;
const DEFAULT_WAKE_GAP_SECS: u64 = 30;

/// On-disk configuration. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub break_interval_secs: u64,
    pub snooze_delay_secs: u64,
    pub max_snoozes: u32,
    pub max_meeting_defers: u32,
    pub pause_duration_secs: u64,
    pub prompt_duration_secs: u64,
    pub control_addr: SocketAddr,
    pub wake_poll_secs: u64,
    pub wake_gap_secs: u64,
    pub state_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            break_interval_secs: BREAK_INTERVAL_SECS,
            snooze_delay_secs: SNOOZE_DELAY_SECS,
            max_snoozes: MAX_SNOOZES,
            max_meeting_defers: MAX_MEETING_DEFERS,
            pause_duration_secs: PAUSE_DURATION_SECS,
            prompt_duration_secs: PROMPT_DURATION_SECS,
            control_addr: DEFAULT_CONTROL_ADDR,
            wake_poll_secs: DEFAULT_WAKE_POLL_SECS,
            wake_gap_secs: DEFAULT_WAKE_GAP_SECS,
            state_path: None,
        }
    }
}

/// Validated timing policy handed to the scheduler. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub interval: Duration,
    pub snooze_delay: Duration,
    pub max_snoozes: u32,
    pub max_meeting_defers: u32,
    pub pause_duration: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(BREAK_INTERVAL_SECS),
            snooze_delay: Duration::from_secs(SNOOZE_DELAY_SECS),
            max_snoozes: MAX_SNOOZES,
            max_meeting_defers: MAX_MEETING_DEFERS,
            pause_duration: Duration::from_secs(PAUSE_DURATION_SECS),
        }
    }
}

impl AppConfig {
    /// Default location: `<config_dir>/eyebreak/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("eyebreak").join("config.json"))
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(serde_json::from_str(&data)?)
    }

    pub fn schedule(&self) -> Result<ScheduleConfig, ConfigError> {
        non_zero("break_interval_secs", self.break_interval_secs)?;
        non_zero("snooze_delay_secs", self.snooze_delay_secs)?;
        non_zero("pause_duration_secs", self.pause_duration_secs)?;
        non_zero("prompt_duration_secs", self.prompt_duration_secs)?;
        if self.max_meeting_defers == 0 {
            return Err(ConfigError::Invalid {
                field: "max_meeting_defers",
                reason: "must be at least 1",
            });
        }

        Ok(ScheduleConfig {
            interval: Duration::from_secs(self.break_interval_secs),
            snooze_delay: Duration::from_secs(self.snooze_delay_secs),
            max_snoozes: self.max_snoozes,
            max_meeting_defers: self.max_meeting_defers,
            pause_duration: Duration::from_secs(self.pause_duration_secs),
        })
    }

    pub fn prompt_duration(&self) -> Duration {
        Duration::from_secs(self.prompt_duration_secs)
    }

    pub fn wake_poll(&self) -> Duration {
        Duration::from_secs(self.wake_poll_secs.max(1))
    }

    pub fn wake_gap(&self) -> Duration {
        Duration::from_secs(self.wake_gap_secs)
    }
}

fn non_zero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "must be greater than zero",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("nope.json"))).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.control_addr, DEFAULT_CONTROL_ADDR);
        assert_eq!(config.control_addr.to_string(), "127.0.0.1:8765");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"break_interval_secs": 600, "max_snoozes": 1}}"#).unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.break_interval_secs, 600);
        assert_eq!(config.max_snoozes, 1);
        assert_eq!(config.snooze_delay_secs, SNOOZE_DELAY_SECS);

        let schedule = config.schedule().unwrap();
        assert_eq!(schedule.interval, Duration::from_secs(600));
        assert_eq!(schedule.max_meeting_defers, MAX_MEETING_DEFERS);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            AppConfig::load(Some(file.path())),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = AppConfig {
            break_interval_secs: 0,
            ..AppConfig::default()
        };
        assert!(matches!(
            config.schedule(),
            Err(ConfigError::Invalid {
                field: "break_interval_secs",
                ..
            })
        ));
    }

    #[test]
    fn zero_meeting_defers_is_rejected() {
        let config = AppConfig {
            max_meeting_defers: 0,
            ..AppConfig::default()
        };
        assert!(config.schedule().is_err());
    }

    #[test]
    fn default_schedule_matches_constants() {
        let schedule = AppConfig::default().schedule().unwrap();
        assert_eq!(schedule, ScheduleConfig::default());
        assert_eq!(schedule.interval, Duration::from_secs(1200));
        assert_eq!(schedule.pause_duration, Duration::from_secs(3600));
    }
}
