//! Output formatting helpers for CLI commands

use crate::registry::{DeviceStatus, SessionView};
use chrono::{DateTime, Utc};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde_json::json;

/// Format an age in a human-readable way
pub fn format_age(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m ago", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s ago", minutes, secs)
    } else {
        format!("{}s ago", secs)
    }
}

fn status_cell(status: DeviceStatus) -> String {
    match status {
        DeviceStatus::Streaming => "Streaming".green().to_string(),
        DeviceStatus::Idle => "Idle".yellow().to_string(),
        DeviceStatus::Offline => "Offline".red().to_string(),
    }
}

/// Format devices as a table, with ages relative to `now`
pub fn format_devices_table(devices: &[SessionView], now: DateTime<Utc>) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Device", "Status", "Transport", "Last Seen", "Last Frame"]);

    for d in devices {
        let transport = if d.detached { "http" } else { "websocket" };
        let last_frame = d
            .last_frame_at
            .map(|at| format_age((now - at).num_seconds()))
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(&d.device_id),
            Cell::new(status_cell(d.status)),
            Cell::new(transport),
            Cell::new(format_age((now - d.last_seen).num_seconds())),
            Cell::new(last_frame),
        ]);
    }

    table.to_string()
}

/// Format devices as JSON
pub fn format_devices_json(devices: &[SessionView]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&json!({
        "devices": devices
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn view(device_id: &str, status: DeviceStatus, now: DateTime<Utc>) -> SessionView {
        SessionView {
            device_id: device_id.to_string(),
            status,
            connected_at: now - Duration::seconds(120),
            last_seen: now - Duration::seconds(5),
            last_frame_at: None,
            detached: false,
            telemetry: None,
        }
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(0), "0s ago");
        assert_eq!(format_age(59), "59s ago");
        assert_eq!(format_age(61), "1m 1s ago");
        assert_eq!(format_age(3725), "1h 2m ago");
        assert_eq!(format_age(-3), "0s ago");
    }

    #[test]
    fn test_format_devices_table_empty() {
        let output = format_devices_table(&[], Utc::now());
        assert!(output.contains("Device"));
    }

    #[test]
    fn test_format_devices_table_with_device() {
        let now = Utc::now();
        let mut device = view("cam-1", DeviceStatus::Streaming, now);
        device.detached = true;
        device.last_frame_at = Some(now - Duration::seconds(2));

        let output = format_devices_table(&[device], now);
        assert!(output.contains("cam-1"));
        assert!(output.contains("http"));
        assert!(output.contains("2s ago"));
    }

    #[test]
    fn test_format_devices_json_shape() {
        let now = Utc::now();
        let output = format_devices_json(&[view("cam-2", DeviceStatus::Idle, now)]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["devices"][0]["deviceId"], "cam-2");
        assert_eq!(parsed["devices"][0]["status"], "idle");
    }
}
