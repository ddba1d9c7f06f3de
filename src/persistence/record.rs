use super::taxonomy::{normalize_category, HazardCategory, Severity};
use crate::relay::types::clamp_percent;
use crate::relay::{BoundingBox, Detection, DetectionReport, FrameEnvelope, GeoPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable form of one detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    /// `{deviceId}-{arrival millis}-{random suffix}`
    pub id: String,
    pub device_id: String,
    pub category: HazardCategory,
    /// Label exactly as the producer sent it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_label: Option<String>,
    pub severity: Severity,
    /// Percent, clamped to 0..=100
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    /// Producer timestamp when it sent a valid one, arrival time otherwise
    pub detected_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    /// Set once a downstream repair ticket has been opened for this detection
    #[serde(default)]
    pub forwarded: bool,
}

impl DetectionRecord {
    /// Build the durable record for one detection of `envelope`.
    pub fn from_detection(envelope: &FrameEnvelope, detection: &Detection) -> Self {
        Self::build(
            &envelope.device_id,
            detection,
            detection.location.or(envelope.gps),
            envelope.timestamp,
            envelope.received_at,
        )
    }

    /// Build the durable record for a detection posted on its own.
    pub fn from_report(device_id: &str, report: &DetectionReport, received_at: DateTime<Utc>) -> Self {
        Self::build(
            device_id,
            &report.detection,
            report.location(),
            report.timestamp,
            received_at,
        )
    }

    fn build(
        device_id: &str,
        detection: &Detection,
        location: Option<GeoPoint>,
        timestamp: Option<DateTime<Utc>>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let reported_label = detection.label.clone();
        let category = reported_label
            .as_deref()
            .map(normalize_category)
            .unwrap_or(HazardCategory::FALLBACK);

        Self {
            id: record_id(device_id, received_at),
            device_id: device_id.to_string(),
            category,
            reported_label,
            severity: Severity::parse_or_default(detection.severity.as_deref()),
            confidence: clamp_percent(detection.confidence.unwrap_or(0.0)),
            bounding_box: detection.bounding_box.map(BoundingBox::clamped),
            location,
            detected_at: timestamp.unwrap_or(received_at),
            received_at,
            forwarded: false,
        }
    }

    /// One record per detection in the frame, in frame order.
    pub fn from_envelope(envelope: &FrameEnvelope) -> Vec<Self> {
        envelope
            .detections
            .iter()
            .map(|d| Self::from_detection(envelope, d))
            .collect()
    }

    /// Flip the forwarded flag. Never unset once set.
    pub fn mark_forwarded(&mut self) {
        self.forwarded = true;
    }
}

fn record_id(device_id: &str, received_at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        device_id,
        received_at.timestamp_millis(),
        &suffix[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn envelope(detections: Vec<Detection>) -> FrameEnvelope {
        FrameEnvelope {
            device_id: "pi-01".to_string(),
            payload: "abc".to_string(),
            detections,
            gps: Some(GeoPoint {
                lat: 28.61,
                lng: 77.2,
                speed: None,
            }),
            telemetry: None,
            timestamp: None,
            received_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn detection(label: &str, confidence: f64) -> Detection {
        Detection {
            label: Some(label.to_string()),
            severity: None,
            confidence: Some(confidence),
            bounding_box: None,
            location: None,
        }
    }

    #[test]
    fn test_record_normalizes_and_defaults() {
        let env = envelope(vec![detection("pothole", 87.5)]);
        let records = DetectionRecord::from_envelope(&env);

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.category, HazardCategory::SeverePothole);
        assert_eq!(record.reported_label.as_deref(), Some("pothole"));
        assert_eq!(record.severity, Severity::Medium);
        assert_eq!(record.confidence, 87.5);
        assert_eq!(record.detected_at, env.received_at);
        assert_eq!(record.location.unwrap().lat, 28.61);
        assert!(!record.forwarded);
    }

    #[test]
    fn test_record_id_shape_and_uniqueness() {
        let env = envelope(vec![detection("crack", 50.0), detection("crack", 50.0)]);
        let records = DetectionRecord::from_envelope(&env);

        let prefix = format!("pi-01-{}-", env.received_at.timestamp_millis());
        assert!(records[0].id.starts_with(&prefix));
        assert_eq!(records[0].id.len(), prefix.len() + 8);
        assert_ne!(records[0].id, records[1].id);
    }

    #[test]
    fn test_confidence_clamped() {
        let env = envelope(vec![
            detection("crack", 140.0),
            detection("crack", -3.0),
            detection("crack", f64::NAN),
        ]);
        let confidences: Vec<f64> = DetectionRecord::from_envelope(&env)
            .iter()
            .map(|r| r.confidence)
            .collect();
        assert_eq!(confidences, vec![100.0, 0.0, 0.0]);
    }

    #[test]
    fn test_detection_location_overrides_frame_gps() {
        let mut d = detection("crack", 10.0);
        d.location = Some(GeoPoint {
            lat: 1.0,
            lng: 2.0,
            speed: None,
        });
        d.severity = Some("HIGH".into());
        let record = DetectionRecord::from_detection(&envelope(vec![]), &d);
        assert_eq!(record.location.unwrap().lat, 1.0);
        assert_eq!(record.severity, Severity::High);
    }

    #[test]
    fn test_missing_label_uses_fallback() {
        let d = Detection {
            label: None,
            severity: None,
            confidence: None,
            bounding_box: None,
            location: None,
        };
        let record = DetectionRecord::from_detection(&envelope(vec![]), &d);
        assert_eq!(record.category, HazardCategory::SurfaceDamage);
        assert_eq!(record.confidence, 0.0);
    }

    #[test]
    fn test_record_from_standalone_report() {
        let report = DetectionReport {
            device_id: Some("JETSON-001".into()),
            detection: Detection {
                label: Some("manhole".into()),
                severity: Some("low".into()),
                confidence: Some(64.0),
                bounding_box: None,
                location: None,
            },
            latitude: Some(28.61),
            longitude: Some(77.2),
            timestamp: None,
        };
        let received_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let record = DetectionRecord::from_report("JETSON-001", &report, received_at);
        assert!(record.id.starts_with("JETSON-001-"));
        assert_eq!(record.category, HazardCategory::ManholeDepression);
        assert_eq!(record.severity, Severity::Low);
        assert_eq!(record.location.unwrap().lat, 28.61);
        assert_eq!(record.detected_at, received_at);
        assert!(!record.forwarded);
    }

    #[test]
    fn test_mark_forwarded() {
        let mut record = DetectionRecord::from_detection(&envelope(vec![]), &detection("x", 1.0));
        record.mark_forwarded();
        record.mark_forwarded();
        assert!(record.forwarded);
    }

    #[test]
    fn test_record_serialization() {
        let record = DetectionRecord::from_detection(&envelope(vec![]), &detection("crack", 1.0));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["category"], "Asphalt Crack");
        assert_eq!(json["severity"], "medium");
        assert_eq!(json["deviceId"], "pi-01");
        assert_eq!(json["forwarded"], false);
    }
}
