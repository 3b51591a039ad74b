use super::*;
use serde_json::Value;
use time::macros::datetime;
use uuid::Uuid;

fn summary(name: &str, working: bool) -> PersonSummary {
    PersonSummary {
        user_id: Uuid::new_v4(),
        name: name.into(),
        email: format!("{name}@example.com"),
        avatar_url: String::new(),
        total_working_time: 3600,
        last_activity: datetime!(2025-03-18 09:00:00 UTC),
        is_currently_working: working,
        current_status: "Working".into(),
        status_text: "coding".into(),
        status_emoji: ":computer:".into(),
        weekly_hours: 1.0,
        monthly_hours: 1.0,
    }
}

#[test]
fn single_user_update_wraps_user() {
    let msg = DashboardMessage::SingleUserUpdate { user: summary("amy", true) };
    let json: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();

    assert_eq!(json["type"], "single_user_update");
    assert_eq!(json["data"]["user"]["name"], "amy");
    assert_eq!(json["data"]["user"]["is_currently_working"], true);
    assert_eq!(json["data"]["user"]["last_activity"], "2025-03-18T09:00:00Z");
}

#[test]
fn snapshot_messages_carry_users_and_analytics() {
    let snapshot = Snapshot::from_summaries(vec![summary("amy", true), summary("bob", false)], 20.0);
    assert_eq!(snapshot.analytics.total_users, 2);
    assert_eq!(snapshot.analytics.active_users, 1);
    assert!((snapshot.analytics.total_working_time - 2.0).abs() < 1e-9);
    assert!((snapshot.analytics.weekly_completion - 5.0).abs() < 1e-9);

    for (msg, tag) in [
        (DashboardMessage::InitialData(snapshot.clone()), "initial_data"),
        (DashboardMessage::UserUpdate(snapshot), "user_update"),
    ] {
        assert_eq!(msg.kind(), tag);
        let json: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(json["type"], tag);
        assert_eq!(json["data"]["users"].as_array().unwrap().len(), 2);
        assert_eq!(json["data"]["analytics"]["total_users"], 2);
        assert!(json["data"]["analytics"].get("monthly_completion").is_some());
    }
}

#[test]
fn empty_snapshot_encodes_empty_list() {
    let json: Value =
        serde_json::from_str(&DashboardMessage::InitialData(Snapshot::default()).encode().unwrap()).unwrap();
    assert_eq!(json["data"]["users"], Value::Array(vec![]));
    assert_eq!(json["data"]["analytics"]["avg_weekly_hours"], 0.0);
}
