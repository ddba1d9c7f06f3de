//! Devices command implementation

use crate::cli::output::{format_devices_json, format_devices_table};
use crate::cli::DevicesArgs;
use crate::registry::{DeviceStatus, SessionView};
use crate::transport::ActiveDevicesResponse;
use std::time::Duration;

/// Fetch the active-device snapshot from a running relay.
pub async fn fetch_active_devices(base_url: &str) -> Result<Vec<SessionView>, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let url = format!("{}/api/devices/active", base_url.trim_end_matches('/'));

    let response: ActiveDevicesResponse = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(response.devices)
}

fn parse_status_filter(filter: Option<&str>) -> Result<Option<DeviceStatus>, String> {
    match filter.map(|s| s.to_lowercase()) {
        None => Ok(None),
        Some(s) => match s.as_str() {
            "streaming" => Ok(Some(DeviceStatus::Streaming)),
            "idle" => Ok(Some(DeviceStatus::Idle)),
            "offline" => Ok(Some(DeviceStatus::Offline)),
            _ => Err(format!(
                "Invalid status filter: {}. Expected streaming, idle or offline.",
                s
            )),
        },
    }
}

/// Filter and render a device list per the command arguments.
pub fn render_devices(
    args: &DevicesArgs,
    devices: Vec<SessionView>,
) -> Result<String, Box<dyn std::error::Error>> {
    let status = parse_status_filter(args.status.as_deref())?;
    let devices: Vec<SessionView> = devices
        .into_iter()
        .filter(|d| status.is_none_or(|s| d.status == s))
        .collect();

    if args.json {
        Ok(format_devices_json(&devices)?)
    } else if devices.is_empty() {
        Ok("No active devices".to_string())
    } else {
        Ok(format_devices_table(&devices, chrono::Utc::now()))
    }
}

/// Handle `edgewatch devices` command
pub async fn handle_devices(args: &DevicesArgs) -> Result<String, Box<dyn std::error::Error>> {
    let devices = fetch_active_devices(&args.url)
        .await
        .map_err(|e| format!("Failed to query relay at {}: {}", args.url, e))?;
    render_devices(args, devices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn args(json: bool, status: Option<&str>, url: &str) -> DevicesArgs {
        DevicesArgs {
            json,
            status: status.map(String::from),
            url: url.to_string(),
        }
    }

    fn view(device_id: &str, status: DeviceStatus) -> SessionView {
        let now = Utc::now();
        SessionView {
            device_id: device_id.to_string(),
            status,
            connected_at: now,
            last_seen: now,
            last_frame_at: None,
            detached: false,
            telemetry: None,
        }
    }

    #[test]
    fn test_parse_status_filter() {
        assert_eq!(parse_status_filter(None).unwrap(), None);
        assert_eq!(
            parse_status_filter(Some("Streaming")).unwrap(),
            Some(DeviceStatus::Streaming)
        );
        assert!(parse_status_filter(Some("healthy")).is_err());
    }

    #[test]
    fn test_render_devices_filters_by_status() {
        let devices = vec![
            view("cam-1", DeviceStatus::Streaming),
            view("cam-2", DeviceStatus::Idle),
        ];
        let output = render_devices(&args(true, Some("idle"), ""), devices).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["devices"].as_array().unwrap().len(), 1);
        assert_eq!(parsed["devices"][0]["deviceId"], "cam-2");
    }

    #[test]
    fn test_render_devices_empty_table() {
        let output = render_devices(&args(false, None, ""), vec![]).unwrap();
        assert_eq!(output, "No active devices");
    }

    #[tokio::test]
    async fn test_handle_devices_queries_relay() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/devices/active"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "devices": [{
                    "deviceId": "cam-7",
                    "status": "streaming",
                    "connectedAt": "2026-01-01T00:00:00Z",
                    "lastSeen": "2026-01-01T00:00:05Z"
                }]
            })))
            .mount(&server)
            .await;

        let output = handle_devices(&args(false, None, &server.uri())).await.unwrap();
        assert!(output.contains("cam-7"));
    }

    #[tokio::test]
    async fn test_handle_devices_reports_unreachable_relay() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/devices/active"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = handle_devices(&args(false, None, &server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to query relay"));
    }
}
