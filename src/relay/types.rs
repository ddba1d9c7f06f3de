//! Frame wire types.
//!
//! [`FrameSubmission`] is what a producer sends; it is deliberately lenient
//! (every field optional, several aliases) so malformed input surfaces as a
//! [`RelayError`](super::RelayError) with a useful code rather than a serde
//! message. [`FrameEnvelope`] is the validated form that gets cached,
//! relayed, and handed to persistence.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Axis-aligned box in percent of frame width/height (0..=100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Clamp every component into 0..=100. Non-finite values become 0.
    pub fn clamped(self) -> Self {
        Self {
            x: clamp_percent(self.x),
            y: clamp_percent(self.y),
            width: clamp_percent(self.width),
            height: clamp_percent(self.height),
        }
    }
}

pub(crate) fn clamp_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// A GPS fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude", alias = "lon")]
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

/// One detection as reported by the producer's on-device model.
///
/// Relayed to viewers as sent. Normalization into the closed hazard
/// taxonomy only happens on the persistence side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    #[serde(rename = "type", alias = "category", alias = "label", default)]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, alias = "gps", skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

/// A single detection posted on its own, outside any frame.
///
/// Position comes either as a `location`/`gps` object on the detection or as
/// flat `latitude`/`longitude` fields.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(flatten)]
    pub detection: Detection,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Producer clock. Unparseable values are treated as absent.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl DetectionReport {
    pub fn location(&self) -> Option<GeoPoint> {
        self.detection
            .location
            .or(match (self.latitude, self.longitude) {
                (Some(lat), Some(lng)) => Some(GeoPoint {
                    lat,
                    lng,
                    speed: None,
                }),
                _ => None,
            })
    }
}

/// A frame as submitted by a producer, before validation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSubmission {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default, alias = "frame")]
    pub payload: Option<String>,
    #[serde(default)]
    pub detections: Option<Vec<Detection>>,
    #[serde(default)]
    pub gps: Option<GeoPoint>,
    #[serde(default, alias = "stats")]
    pub telemetry: Option<Value>,
    /// Producer clock. Unparseable values are treated as absent.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl FrameSubmission {
    pub fn new(device_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            payload: Some(payload.into()),
            ..Self::default()
        }
    }

    pub fn with_detections(mut self, detections: Vec<Detection>) -> Self {
        self.detections = Some(detections);
        self
    }
}

/// A validated frame, shared between the cache, viewers, and persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameEnvelope {
    pub device_id: String,
    /// Opaque encoded image (base64 JPEG from the reference producers)
    pub payload: String,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Server arrival time
    pub received_at: DateTime<Utc>,
}

impl FrameEnvelope {
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Accepts RFC 3339, naive ISO 8601 (taken as UTC), or epoch seconds.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_timestamp))
}

pub(crate) fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .ok()
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => {
            let secs = n.as_f64()?;
            if !secs.is_finite() || secs < 0.0 {
                return None;
            }
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9) as u32;
            DateTime::from_timestamp(whole, nanos)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn test_submission_accepts_producer_field_names() {
        let submission: FrameSubmission = serde_json::from_value(json!({
            "deviceId": "pi-01",
            "frame": "aGVsbG8=",
            "timestamp": "2024-05-01T12:00:00.250",
            "detections": [{
                "type": "pothole",
                "confidence": 87.5,
                "severity": "high",
                "boundingBox": {"x": 10.0, "y": 20.0, "width": 5.0, "height": 8.0}
            }],
            "gps": {"latitude": 14.6, "longitude": 121.0, "speed": 32.0},
            "stats": {"fps": 14.2, "cpuUsage": 48}
        }))
        .unwrap();

        assert_eq!(submission.device_id.as_deref(), Some("pi-01"));
        assert_eq!(submission.payload.as_deref(), Some("aGVsbG8="));
        let detections = submission.detections.unwrap();
        assert_eq!(detections[0].label.as_deref(), Some("pothole"));
        assert_eq!(detections[0].bounding_box.unwrap().width, 5.0);
        let gps = submission.gps.unwrap();
        assert_eq!(gps.lat, 14.6);
        assert_eq!(gps.speed, Some(32.0));
        assert_eq!(submission.telemetry.unwrap()["fps"], 14.2);
        let ts = submission.timestamp.unwrap();
        assert_eq!(ts.hour(), 12);
        assert_eq!(ts.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_submission_missing_fields_default_to_none() {
        let submission: FrameSubmission = serde_json::from_value(json!({})).unwrap();
        assert!(submission.device_id.is_none());
        assert!(submission.payload.is_none());
        assert!(submission.detections.is_none());
        assert!(submission.timestamp.is_none());
    }

    #[test]
    fn test_detection_report_flat_fields() {
        let report: DetectionReport = serde_json::from_value(json!({
            "deviceId": "JETSON-001",
            "type": "Deep Pothole",
            "severity": "high",
            "confidence": 91,
            "latitude": 28.61,
            "longitude": 77.2,
            "boundingBox": {"x": 10, "y": 20, "width": 5, "height": 8},
            "timestamp": "2024-05-01T12:00:00Z",
            "raw": {"x1": 1}
        }))
        .unwrap();

        assert_eq!(report.device_id.as_deref(), Some("JETSON-001"));
        assert_eq!(report.detection.label.as_deref(), Some("Deep Pothole"));
        assert_eq!(report.detection.confidence, Some(91.0));
        assert_eq!(report.location().unwrap().lng, 77.2);
        assert_eq!(report.timestamp.unwrap().year(), 2024);
    }

    #[test]
    fn test_detection_report_location_object_wins() {
        let report: DetectionReport = serde_json::from_value(json!({
            "deviceId": "pi-01",
            "gps": {"lat": 1.0, "lng": 2.0},
            "latitude": 28.61,
            "longitude": 77.2
        }))
        .unwrap();
        assert_eq!(report.location().unwrap().lat, 1.0);

        let report: DetectionReport =
            serde_json::from_value(json!({"deviceId": "pi-01", "latitude": 28.61})).unwrap();
        assert!(report.location().is_none());
    }

    #[test]
    fn test_invalid_timestamp_is_absent() {
        let submission: FrameSubmission =
            serde_json::from_value(json!({"timestamp": "yesterday-ish"})).unwrap();
        assert!(submission.timestamp.is_none());

        let submission: FrameSubmission =
            serde_json::from_value(json!({"timestamp": null})).unwrap();
        assert!(submission.timestamp.is_none());
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let rfc = parse_timestamp(&json!("2024-05-01T12:00:00+02:00")).unwrap();
        assert_eq!(rfc.hour(), 10);

        let epoch = parse_timestamp(&json!(1714564800.5)).unwrap();
        assert_eq!(epoch.year(), 2024);
        assert_eq!(epoch.timestamp_subsec_millis(), 500);

        assert!(parse_timestamp(&json!(-5)).is_none());
        assert!(parse_timestamp(&json!(true)).is_none());
    }

    #[test]
    fn test_bounding_box_clamped() {
        let clamped = BoundingBox {
            x: -4.0,
            y: 250.0,
            width: f64::NAN,
            height: 12.5,
        }
        .clamped();
        assert_eq!(clamped.x, 0.0);
        assert_eq!(clamped.y, 100.0);
        assert_eq!(clamped.width, 0.0);
        assert_eq!(clamped.height, 12.5);
    }

    #[test]
    fn test_envelope_serializes_camel_case() {
        let envelope = FrameEnvelope {
            device_id: "pi-01".to_string(),
            payload: "abc".to_string(),
            detections: vec![],
            gps: None,
            telemetry: None,
            timestamp: None,
            received_at: Utc::now(),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["deviceId"], "pi-01");
        assert!(json.get("receivedAt").is_some());
        assert!(json.get("gps").is_none());
    }
}
