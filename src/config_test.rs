use super::*;
use std::collections::HashMap;

fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    Config::from_lookup(|key| map.get(key).cloned())
}

#[test]
fn empty_env_uses_defaults() {
    let cfg = from_pairs(&[]).unwrap();
    assert_eq!(cfg.port, 3000);
    assert!(cfg.database_url.is_none());
    assert_eq!(cfg.db_max_connections, 5);
    assert!(cfg.slack.is_none());
    assert!(cfg.verbose_logs);
    assert_eq!(cfg.duration_refresh, Duration::from_secs(30));
    assert_eq!(cfg.full_update, Duration::from_secs(30));
    assert_eq!(cfg.hub.queue_capacity, 256);
    assert_eq!(cfg.hub.snapshot_timeout, Duration::from_secs(5));
    assert_eq!(cfg.heartbeat, Heartbeat::default());
    assert_eq!(cfg.person_queue_idle, Duration::from_secs(60));
    assert!((cfg.required_weekly_hours - 20.0).abs() < f64::EPSILON);
    assert!((cfg.hub.required_weekly_hours - 20.0).abs() < f64::EPSILON);
}

#[test]
fn overrides_are_applied() {
    let cfg = from_pairs(&[
        ("PORT", "8080"),
        ("DATABASE_URL", "postgres://localhost/worklog"),
        ("DB_MAX_CONNECTIONS", "12"),
        ("SLACK_APP_TOKEN", "xapp-1"),
        ("SLACK_BOT_TOKEN", "xoxb-1"),
        ("ENABLE_VERBOSE_LOGS", "false"),
        ("DURATION_REFRESH_SECS", "10"),
        ("BROADCAST_QUEUE_CAPACITY", "8"),
        ("HEARTBEAT_TIMEOUT_SECS", "90"),
        ("REQUIRED_WEEKLY_HOURS", "37.5"),
    ])
    .unwrap();

    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/worklog"));
    assert_eq!(cfg.db_max_connections, 12);
    let slack = cfg.slack.unwrap();
    assert_eq!(slack.app_token, "xapp-1");
    assert_eq!(slack.bot_token, "xoxb-1");
    assert!(!cfg.verbose_logs);
    assert_eq!(cfg.duration_refresh, Duration::from_secs(10));
    assert_eq!(cfg.hub.queue_capacity, 8);
    assert_eq!(cfg.heartbeat.timeout, Duration::from_secs(90));
    assert_eq!(cfg.heartbeat.interval, Duration::from_secs(30));
    assert!((cfg.required_weekly_hours - 37.5).abs() < f64::EPSILON);
    // Dashboard completion figures share the report target.
    assert!((cfg.hub.required_weekly_hours - 37.5).abs() < f64::EPSILON);
}

#[test]
fn invalid_port_is_an_error() {
    let err = from_pairs(&[("PORT", "http")]).unwrap_err();
    assert!(err.to_string().contains("invalid PORT"));
    assert!(from_pairs(&[("PORT", "70000")]).is_err());
}

#[test]
fn unparseable_values_fall_back_to_defaults() {
    let cfg = from_pairs(&[
        ("DB_MAX_CONNECTIONS", "many"),
        ("ENABLE_VERBOSE_LOGS", "maybe"),
        ("FULL_UPDATE_SECS", "-3"),
        ("BROADCAST_QUEUE_CAPACITY", "0"),
    ])
    .unwrap();
    assert_eq!(cfg.db_max_connections, 5);
    assert!(cfg.verbose_logs);
    assert_eq!(cfg.full_update, Duration::from_secs(30));
    assert_eq!(cfg.hub.queue_capacity, 1);
}

#[test]
fn zero_intervals_are_clamped() {
    let cfg = from_pairs(&[("DURATION_REFRESH_SECS", "0")]).unwrap();
    assert_eq!(cfg.duration_refresh, Duration::from_secs(1));
}

#[test]
fn slack_needs_both_tokens() {
    assert!(from_pairs(&[("SLACK_APP_TOKEN", "xapp-1")]).unwrap().slack.is_none());
    assert!(from_pairs(&[("SLACK_BOT_TOKEN", "xoxb-1"), ("SLACK_APP_TOKEN", " ")]).unwrap().slack.is_none());
}

#[test]
fn slack_tokens_are_redacted_in_debug() {
    let cfg = from_pairs(&[("SLACK_APP_TOKEN", "xapp-secret"), ("SLACK_BOT_TOKEN", "xoxb-secret")]).unwrap();
    let debug = format!("{cfg:?}");
    assert!(!debug.contains("secret"));
}

#[test]
fn bool_parsing_accepts_common_spellings() {
    for (raw, expected) in [("TRUE", Some(true)), ("on", Some(true)), ("0", Some(false)), ("No", Some(false)), ("x", None)] {
        assert_eq!(parse_bool(raw), expected, "{raw}");
    }
}
