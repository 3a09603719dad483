use crate::error::OracleError;
use serde::Deserialize;
use std::process::Command;

#[derive(Debug, Deserialize)]
pub struct HyprlandWindow {
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub title: String,
}

/// Focused window on Hyprland. `None` when there is no compositor to ask
/// (not running Hyprland) or no window has focus.
pub fn get_active_window() -> Result<Option<HyprlandWindow>, OracleError> {
    let output = match Command::new("hyprctl").args(["activewindow", "-j"]).output() {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(OracleError::Probe {
                probe: "hyprctl",
                reason: e.to_string(),
            });
        }
    };

    if !output.status.success() {
        return Ok(None);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_active_window(&stdout)
}

fn parse_active_window(stdout: &str) -> Result<Option<HyprlandWindow>, OracleError> {
    let trimmed = stdout.trim();
    // hyprctl prints `{}` when nothing is focused.
    if trimmed.is_empty() || trimmed == "{}" || trimmed == "Invalid" {
        return Ok(None);
    }

    let window: HyprlandWindow =
        serde_json::from_str(trimmed).map_err(|e| OracleError::Probe {
            probe: "hyprctl",
            reason: e.to_string(),
        })?;
    tracing::trace!(class = %window.class, title = %window.title, "active window");
    Ok(Some(window))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_focused_window() {
        let json = r#"{"address":"0x1","class":"zoom","title":"Zoom Meeting","pid":42}"#;
        let window = parse_active_window(json).unwrap().unwrap();
        assert_eq!(window.class, "zoom");
        assert_eq!(window.title, "Zoom Meeting");
    }

    #[test]
    fn empty_object_means_no_focus() {
        assert!(parse_active_window("{}\n").unwrap().is_none());
        assert!(parse_active_window("   ").unwrap().is_none());
    }

    #[test]
    fn garbage_is_a_probe_error() {
        assert!(parse_active_window("not json").is_err());
    }
}
