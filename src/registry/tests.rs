use super::*;
use chrono::{Duration as ChronoDuration, TimeZone};
use serde_json::json;

const WINDOW: Duration = Duration::from_secs(30);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn secs(n: i64) -> ChronoDuration {
    ChronoDuration::seconds(n)
}

#[test]
fn test_register_creates_session() {
    let mut registry = SessionRegistry::new();
    let conn = ConnectionId::generate();

    let registration = registry.register_at("cam-1", Some(conn.clone()), t0());

    assert!(registration.superseded.is_none());
    assert_eq!(registration.handle.device_id, "cam-1");
    let session = registry.get("cam-1").unwrap();
    assert!(session.is_bound_to(&conn));
    assert_eq!(session.connected_at, t0());
    assert_eq!(session.last_seen, t0());
    assert!(session.last_frame_at.is_none());
}

#[test]
fn test_reregister_supersedes_previous_session() {
    let mut registry = SessionRegistry::new();
    let first = ConnectionId::generate();
    let second = ConnectionId::generate();

    let a = registry.register_at("cam-1", Some(first.clone()), t0());
    let b = registry.register_at("cam-1", Some(second.clone()), t0() + secs(1));

    let superseded = b.superseded.unwrap();
    assert!(superseded.is_bound_to(&first));
    assert_eq!(registry.len(), 1);
    assert!(registry.get("cam-1").unwrap().is_bound_to(&second));
    assert!(!registry.is_current(&a.handle));
    assert!(registry.is_current(&b.handle));
}

#[test]
fn test_touch_unknown_device_is_noop() {
    let mut registry = SessionRegistry::new();
    assert!(!registry.touch_at("ghost", t0()));
    assert!(registry.is_empty());
}

#[test]
fn test_touch_refreshes_last_seen_monotonically() {
    let mut registry = SessionRegistry::new();
    registry.register_at("cam-1", None, t0());

    assert!(registry.touch_at("cam-1", t0() + secs(10)));
    assert_eq!(registry.get("cam-1").unwrap().last_seen, t0() + secs(10));

    // An out-of-order earlier touch never moves last_seen backwards
    registry.touch_at("cam-1", t0() + secs(5));
    assert_eq!(registry.get("cam-1").unwrap().last_seen, t0() + secs(10));
}

#[test]
fn test_record_frame_sets_last_frame_at() {
    let mut registry = SessionRegistry::new();
    registry.register_at("cam-1", None, t0());

    assert!(registry.record_frame_at("cam-1", t0() + secs(3)));
    let session = registry.get("cam-1").unwrap();
    assert_eq!(session.last_frame_at, Some(t0() + secs(3)));
    assert_eq!(session.last_seen, t0() + secs(3));
}

#[test]
fn test_update_telemetry_stores_snapshot() {
    let mut registry = SessionRegistry::new();
    registry.register_at("cam-1", None, t0());

    let snapshot = json!({"fps": 12.5, "temperature": 61});
    assert!(registry.update_telemetry_at("cam-1", snapshot.clone(), t0() + secs(2)));
    assert_eq!(registry.get("cam-1").unwrap().telemetry, Some(snapshot));
    assert!(!registry.update_telemetry_at("ghost", json!({}), t0()));
}

#[test]
fn test_remove_twice_is_noop() {
    let mut registry = SessionRegistry::new();
    registry.register_at("cam-1", None, t0());

    assert!(registry.remove("cam-1").is_some());
    assert!(registry.remove("cam-1").is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_remove_if_bound_ignores_other_connection() {
    let mut registry = SessionRegistry::new();
    let old = ConnectionId::generate();
    let new = ConnectionId::generate();
    registry.register_at("cam-1", Some(old.clone()), t0());
    registry.register_at("cam-1", Some(new.clone()), t0());

    assert!(registry.remove_if_bound("cam-1", &old).is_none());
    assert!(registry.contains("cam-1"));
    assert!(registry.remove_if_bound("cam-1", &new).is_some());
    assert!(!registry.contains("cam-1"));
}

#[test]
fn test_list_active_filters_by_window() {
    let mut registry = SessionRegistry::new();
    registry.register_at("fresh", None, t0() + secs(50));
    registry.register_at("stale", None, t0());

    let now = t0() + secs(60);
    let active = registry.list_active_at(now, WINDOW);
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].device_id, "fresh");
    assert_eq!(registry.stale_devices_at(now, WINDOW), vec!["stale".to_string()]);
}

#[test]
fn test_list_active_boundary_is_inclusive() {
    let mut registry = SessionRegistry::new();
    registry.register_at("cam-1", None, t0());

    assert_eq!(registry.list_active_at(t0() + secs(30), WINDOW).len(), 1);
    assert!(registry.list_active_at(t0() + secs(31), WINDOW).is_empty());
}

#[test]
fn test_list_active_sorted_by_device_id() {
    let mut registry = SessionRegistry::new();
    for id in ["cam-3", "cam-1", "cam-2"] {
        registry.register_at(id, None, t0());
    }
    let ids: Vec<_> = registry
        .list_active_at(t0(), WINDOW)
        .into_iter()
        .map(|v| v.device_id)
        .collect();
    assert_eq!(ids, vec!["cam-1", "cam-2", "cam-3"]);
}

#[test]
fn test_session_status() {
    let mut registry = SessionRegistry::new();
    registry.register_at("cam-1", None, t0());
    let session = registry.get("cam-1").unwrap().clone();
    assert_eq!(session.status_at(t0(), WINDOW), DeviceStatus::Idle);
    assert_eq!(session.status_at(t0() + secs(31), WINDOW), DeviceStatus::Offline);

    registry.record_frame_at("cam-1", t0() + secs(1));
    let session = registry.get("cam-1").unwrap();
    assert_eq!(session.status_at(t0() + secs(2), WINDOW), DeviceStatus::Streaming);
}

#[test]
fn test_future_last_seen_counts_as_live() {
    let mut registry = SessionRegistry::new();
    registry.register_at("cam-1", None, t0() + secs(5));
    assert_eq!(registry.list_active_at(t0(), WINDOW).len(), 1);
}

#[test]
fn test_session_view_serialization() {
    let mut registry = SessionRegistry::new();
    registry.register_at("cam-1", Some(ConnectionId::generate()), t0());
    let view = &registry.list_active_at(t0(), WINDOW)[0];

    let json = serde_json::to_value(view).unwrap();
    assert_eq!(json["deviceId"], "cam-1");
    assert_eq!(json["status"], "idle");
    assert_eq!(json["detached"], false);
    assert!(json.get("lastFrameAt").is_none());
    assert!(json.get("telemetry").is_none());
}
