//! Point-in-time meeting detection.
//!
//! A meeting is assumed when something is capturing from the microphone or a
//! camera, or when the focused window belongs to a known call client. Nothing
//! is cached between calls.

use crate::error::OracleError;
use crate::hypr::hypr;
use regex::Regex;
use std::process::Command;
use std::sync::OnceLock;

/// Called from the scheduler task, so implementations may block. The
/// scheduler steps off the async worker for the call when the runtime allows.
pub trait MeetingOracle: Send {
    fn is_meeting_active(&self) -> Result<bool, OracleError>;
}

type Probe = fn() -> Result<bool, OracleError>;

/// Checks capture devices and the focused window.
pub struct DeviceActivityOracle {
    probes: Vec<(&'static str, Probe)>,
}

impl Default for DeviceActivityOracle {
    fn default() -> Self {
        Self {
            probes: vec![
                ("microphone", microphone_in_use),
                ("camera", camera_in_use),
                ("window", meeting_window_focused),
            ],
        }
    }
}

impl DeviceActivityOracle {
    #[cfg(test)]
    fn with_probes(probes: Vec<(&'static str, Probe)>) -> Self {
        Self { probes }
    }
}

impl MeetingOracle for DeviceActivityOracle {
    /// True as soon as one probe reports activity. An error is only returned
    /// when no probe saw activity and at least one of them failed.
    fn is_meeting_active(&self) -> Result<bool, OracleError> {
        let mut first_error = None;
        for (name, probe) in &self.probes {
            match probe() {
                Ok(true) => {
                    tracing::debug!(probe = name, "meeting activity detected");
                    return Ok(true);
                }
                Ok(false) => {}
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(false),
        }
    }
}

/// Any PulseAudio/PipeWire source-output is an application recording audio.
fn microphone_in_use() -> Result<bool, OracleError> {
    let output = match Command::new("pactl")
        .args(["list", "short", "source-outputs"])
        .output()
    {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(OracleError::Probe {
                probe: "pactl",
                reason: e.to_string(),
            });
        }
    };

    if !output.status.success() {
        return Err(OracleError::Probe {
            probe: "pactl",
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(count_source_outputs(&String::from_utf8_lossy(&output.stdout)) > 0)
}

fn count_source_outputs(stdout: &str) -> usize {
    stdout.lines().filter(|line| !line.trim().is_empty()).count()
}

fn video_device_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^/dev/video\d+$").expect("static regex"))
}

/// A process holding `/dev/videoN` open is treated as an active camera.
fn camera_in_use() -> Result<bool, OracleError> {
    let proc_dir = match std::fs::read_dir("/proc") {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(OracleError::Probe {
                probe: "camera",
                reason: e.to_string(),
            });
        }
    };

    for entry in proc_dir.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        // Other users' processes are unreadable; skip them.
        let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        for fd in fds.flatten() {
            if let Ok(target) = std::fs::read_link(fd.path()) {
                if video_device_pattern().is_match(&target.to_string_lossy()) {
                    return Ok(true);
                }
            }
        }
    }

    Ok(false)
}

fn meeting_window_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)\b(zoom meeting|google meet|meet\.google\.com|microsoft teams|webex|jitsi|whereby|huddle)\b",
        )
        .expect("static regex")
    })
}

fn is_meeting_window(class: &str, title: &str) -> bool {
    class.eq_ignore_ascii_case("zoom")
        || meeting_window_pattern().is_match(title)
}

fn meeting_window_focused() -> Result<bool, OracleError> {
    Ok(hypr::get_active_window()?
        .map(|window| is_meeting_window(&window.class, &window.title))
        .unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle() -> Result<bool, OracleError> {
        Ok(false)
    }

    fn busy() -> Result<bool, OracleError> {
        Ok(true)
    }

    fn broken() -> Result<bool, OracleError> {
        Err(OracleError::Probe {
            probe: "test",
            reason: "unavailable".to_string(),
        })
    }

    #[test]
    fn any_active_probe_wins() {
        let oracle = DeviceActivityOracle::with_probes(vec![("a", broken), ("b", busy)]);
        assert!(oracle.is_meeting_active().unwrap());
    }

    #[test]
    fn all_idle_is_not_a_meeting() {
        let oracle = DeviceActivityOracle::with_probes(vec![("a", idle), ("b", idle)]);
        assert!(!oracle.is_meeting_active().unwrap());
    }

    #[test]
    fn failure_without_activity_is_reported() {
        let oracle = DeviceActivityOracle::with_probes(vec![("a", idle), ("b", broken)]);
        assert!(oracle.is_meeting_active().is_err());
    }

    #[test]
    fn counts_capture_streams() {
        let stdout = "42\t1\t7\tprotocol-native.c\ts16le 1ch 48000Hz\n\n";
        assert_eq!(count_source_outputs(stdout), 1);
        assert_eq!(count_source_outputs(""), 0);
    }

    #[test]
    fn video_device_paths() {
        assert!(video_device_pattern().is_match("/dev/video0"));
        assert!(video_device_pattern().is_match("/dev/video12"));
        assert!(!video_device_pattern().is_match("/dev/video"));
        assert!(!video_device_pattern().is_match("/dev/snd/pcmC0D0c"));
    }

    #[test]
    fn meeting_windows() {
        assert!(is_meeting_window("firefox", "Weekly sync - Google Meet — Mozilla Firefox"));
        assert!(is_meeting_window("zoom", "Zoom"));
        assert!(is_meeting_window("teams", "Standup | Microsoft Teams"));
        assert!(!is_meeting_window("kitty", "cargo test"));
        assert!(!is_meeting_window("firefox", "zoomed photo gallery"));
    }
}
