use super::*;
use crate::services::directory::DirectoryError;
use crate::services::hub::{HubConfig, Payload, SUBSCRIBER_QUEUE_CAPACITY, Subscriber};
use crate::state::test_helpers::profile;
use crate::store::MemoryStore;
use serde_json::Value;
use std::collections::HashMap;
use time::Duration;
use time::macros::datetime;
use tokio::sync::mpsc;
use tokio::time::timeout;

// =============================================================================
// Fixtures
// =============================================================================

struct MapDirectory(HashMap<String, PersonProfile>);

#[async_trait::async_trait]
impl UserDirectory for MapDirectory {
    async fn profile(&self, external_id: &str) -> Result<PersonProfile, DirectoryError> {
        self.0
            .get(external_id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(external_id.to_string()))
    }
}

/// Every lookup succeeds; presence comes from a fixed answer.
struct AwayDirectory(Result<Presence, ()>);

#[async_trait::async_trait]
impl UserDirectory for AwayDirectory {
    async fn profile(&self, external_id: &str) -> Result<PersonProfile, DirectoryError> {
        Ok(profile(external_id))
    }

    async fn presence(&self, external_id: &str) -> Result<Presence, DirectoryError> {
        self.0
            .map_err(|()| DirectoryError::Lookup(format!("presence for {external_id}")))
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    tracker: PresenceTracker,
    rx: mpsc::Receiver<Payload>,
}

async fn fixture_with(directory: Option<Arc<dyn UserDirectory>>) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let (hub, _handle) = Hub::spawn(store.clone(), HubConfig::default());
    let (tx, mut rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
    hub.register(Subscriber { id: Uuid::new_v4(), tx }).await;
    let initial = recv(&mut rx).await;
    assert_eq!(initial["type"], "initial_data");

    let tracker = PresenceTracker::new(store.clone(), hub, directory);
    Fixture { store, tracker, rx }
}

async fn fixture() -> Fixture {
    let mut people = HashMap::new();
    people.insert("U1".to_string(), profile("U1"));
    people.insert("U2".to_string(), profile("U2"));
    let mut no_email = profile("U3");
    no_email.email = String::new();
    people.insert("U3".to_string(), no_email);
    fixture_with(Some(Arc::new(MapDirectory(people)))).await
}

fn event(user: &str, emoji: &str, text: &str, presence: Presence) -> StatusEvent {
    StatusEvent {
        external_user_id: user.into(),
        emoji: emoji.into(),
        text: text.into(),
        presence,
        profile: None,
    }
}

async fn recv(rx: &mut mpsc::Receiver<Payload>) -> Value {
    let payload = timeout(std::time::Duration::from_millis(200), rx.recv())
        .await
        .expect("payload receive timed out")
        .expect("subscriber channel closed unexpectedly");
    serde_json::from_str(&payload).expect("payload should be json")
}

async fn assert_no_broadcast(rx: &mut mpsc::Receiver<Payload>) {
    assert!(
        timeout(std::time::Duration::from_millis(80), rx.recv())
            .await
            .is_err(),
        "expected no broadcast"
    );
}

async fn person_id(store: &MemoryStore, external_id: &str) -> Uuid {
    store
        .person_by_external_id(external_id)
        .await
        .expect("person should exist")
        .id
}

const T0: OffsetDateTime = datetime!(2025-03-18 09:00:00 UTC);

// =============================================================================
// Presence parsing
// =============================================================================

#[test]
fn slack_presence_mapping() {
    assert_eq!(Presence::from_slack("active"), Presence::Active);
    assert_eq!(Presence::from_slack("away"), Presence::Away);
    assert_eq!(Presence::from_slack(""), Presence::Unknown);
    assert!(Presence::Unknown.is_online());
    assert!(Presence::Active.is_online());
    assert!(!Presence::Away.is_online());
}

#[test]
fn status_event_deserializes_with_defaults() {
    let event: StatusEvent = serde_json::from_str(r#"{"external_user_id":"U1","text":"coding"}"#).unwrap();
    assert_eq!(event.emoji, "");
    assert_eq!(event.presence, Presence::Unknown);
    assert!(event.profile.is_none());
}

// =============================================================================
// Transitions
// =============================================================================

#[tokio::test]
async fn repeated_identical_status_is_processed_once() {
    let mut f = fixture().await;
    let ev = event("U1", ":computer:", "coding", Presence::Active);

    let first = f.tracker.handle_at(&ev, T0).await;
    let second = f.tracker.handle_at(&ev, T0 + Duration::minutes(1)).await;

    assert!(matches!(first, Outcome::Applied { verdict: Verdict::Working, .. }));
    assert_eq!(second, Outcome::Duplicate);

    let id = person_id(&f.store, "U1").await;
    assert_eq!(f.store.status_history(id).await.len(), 1);
    let entries = f.store.entries(id).await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_open());

    let msg = recv(&mut f.rx).await;
    assert_eq!(msg["type"], "single_user_update");
    assert_eq!(msg["data"]["user"]["is_currently_working"], true);
    assert_no_broadcast(&mut f.rx).await;
}

#[tokio::test]
async fn not_working_status_closes_entry() {
    let mut f = fixture().await;
    f.tracker
        .handle_at(&event("U1", ":computer:", "coding", Presence::Active), T0)
        .await;
    let outcome = f
        .tracker
        .handle_at(&event("U1", ":hamburger:", "lunch", Presence::Active), T0 + Duration::hours(2))
        .await;

    assert!(matches!(outcome, Outcome::Applied { verdict: Verdict::NotWorking, .. }));
    let id = person_id(&f.store, "U1").await;
    let entries = f.store.entries(id).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].duration_secs, 7200);
    assert!(!entries[0].is_open());

    recv(&mut f.rx).await;
    let msg = recv(&mut f.rx).await;
    assert_eq!(msg["data"]["user"]["is_currently_working"], false);
    assert_eq!(msg["data"]["user"]["status_text"], "lunch");
}

#[tokio::test]
async fn switching_working_status_rolls_entry() {
    let f = fixture().await;
    f.tracker
        .handle_at(&event("U1", ":computer:", "coding", Presence::Active), T0)
        .await;
    f.tracker
        .handle_at(&event("U1", ":memo:", "reviewing", Presence::Active), T0 + Duration::minutes(30))
        .await;

    let id = person_id(&f.store, "U1").await;
    let entries = f.store.entries(id).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries.iter().filter(|e| e.is_open()).count(), 1);
    assert_eq!(entries[0].duration_secs, 1800);
    assert_eq!(entries[1].status_text, "reviewing");
}

#[tokio::test]
async fn away_presence_forces_offline_record() {
    let f = fixture().await;
    f.tracker
        .handle_at(&event("U1", ":computer:", "coding", Presence::Active), T0)
        .await;
    let outcome = f
        .tracker
        .handle_at(&event("U1", ":computer:", "coding", Presence::Away), T0 + Duration::hours(1))
        .await;

    assert!(matches!(outcome, Outcome::Applied { verdict: Verdict::NotWorking, .. }));
    let id = person_id(&f.store, "U1").await;
    let latest = f.store.latest_status_record(id).await.unwrap().unwrap();
    assert_eq!(latest.emoji, "");
    assert_eq!(latest.text, "offline");
    assert!(!latest.is_working);
    assert!(f.store.open_time_entry(id).await.unwrap().is_none());

    // Still offline with a different raw status: same marker, so a duplicate.
    let again = f
        .tracker
        .handle_at(&event("U1", ":coffee:", "writing", Presence::Away), T0 + Duration::hours(2))
        .await;
    assert_eq!(again, Outcome::Duplicate);
}

#[tokio::test]
async fn neutral_status_leaves_ledger_untouched() {
    let f = fixture().await;
    f.tracker
        .handle_at(&event("U1", ":computer:", "coding", Presence::Active), T0)
        .await;
    let outcome = f
        .tracker
        .handle_at(&event("U1", ":tada:", "happy friday", Presence::Active), T0 + Duration::minutes(5))
        .await;

    assert!(matches!(outcome, Outcome::Applied { verdict: Verdict::Neutral, .. }));
    let id = person_id(&f.store, "U1").await;
    assert_eq!(f.store.status_history(id).await.len(), 2);
    assert!(f.store.open_time_entry(id).await.unwrap().is_some());
}

#[tokio::test]
async fn unknown_presence_counts_as_online() {
    let f = fixture().await;
    let outcome = f
        .tracker
        .handle_at(&event("U1", "", "debugging", Presence::Unknown), T0)
        .await;
    assert!(matches!(outcome, Outcome::Applied { verdict: Verdict::Working, .. }));
}

#[tokio::test]
async fn mixed_signals_resolve_to_not_working() {
    let f = fixture().await;
    let outcome = f
        .tracker
        .handle_at(&event("U1", ":computer:", "lunch", Presence::Active), T0)
        .await;
    assert!(matches!(outcome, Outcome::Applied { verdict: Verdict::NotWorking, .. }));
    let id = person_id(&f.store, "U1").await;
    assert!(f.store.entries(id).await.is_empty());
}

#[tokio::test]
async fn flapping_statuses_are_all_recorded() {
    let f = fixture().await;
    let a = event("U1", ":computer:", "coding", Presence::Active);
    let b = event("U1", ":hamburger:", "lunch", Presence::Active);
    for (i, ev) in [&a, &b, &a].into_iter().enumerate() {
        let at = T0 + Duration::minutes(i64::try_from(i).unwrap() * 10);
        assert!(matches!(f.tracker.handle_at(ev, at).await, Outcome::Applied { .. }));
    }
    let id = person_id(&f.store, "U1").await;
    assert_eq!(f.store.status_history(id).await.len(), 3);
    assert_eq!(f.store.entries(id).await.len(), 2);
}

#[tokio::test]
async fn people_are_tracked_independently() {
    let f = fixture().await;
    f.tracker
        .handle_at(&event("U1", ":computer:", "coding", Presence::Active), T0)
        .await;
    let outcome = f
        .tracker
        .handle_at(&event("U2", ":computer:", "coding", Presence::Active), T0)
        .await;
    assert!(matches!(outcome, Outcome::Applied { .. }));
}

// =============================================================================
// Skips
// =============================================================================

#[tokio::test]
async fn missing_email_skips_without_writes() {
    let mut f = fixture().await;
    let outcome = f
        .tracker
        .handle_at(&event("U3", ":computer:", "coding", Presence::Active), T0)
        .await;

    assert_eq!(outcome, Outcome::Skipped(SkipReason::MissingEmail));
    assert!(f.store.person_by_external_id("U3").await.is_none());
    assert_no_broadcast(&mut f.rx).await;
}

#[tokio::test]
async fn directory_failure_skips_event() {
    let f = fixture().await;
    let outcome = f
        .tracker
        .handle_at(&event("U404", ":computer:", "coding", Presence::Active), T0)
        .await;
    assert_eq!(outcome, Outcome::Skipped(SkipReason::LookupFailed));
}

#[tokio::test]
async fn no_directory_and_no_profile_skips_event() {
    let f = fixture_with(None).await;
    let outcome = f
        .tracker
        .handle_at(&event("U1", ":computer:", "coding", Presence::Active), T0)
        .await;
    assert_eq!(outcome, Outcome::Skipped(SkipReason::LookupFailed));
}

#[tokio::test]
async fn inline_profile_bypasses_directory() {
    let f = fixture_with(None).await;
    let mut ev = event("U9", ":computer:", "coding", Presence::Active);
    // Mismatched ID inside the profile is overridden by the event's.
    ev.profile = Some(profile("mismatch"));

    let outcome = f.tracker.handle_at(&ev, T0).await;

    assert!(matches!(outcome, Outcome::Applied { verdict: Verdict::Working, .. }));
    assert!(f.store.person_by_external_id("U9").await.is_some());
    assert!(f.store.person_by_external_id("mismatch").await.is_none());
}

// =============================================================================
// Directory presence
// =============================================================================

#[tokio::test]
async fn unknown_event_presence_uses_directory_presence() {
    let f = fixture_with(Some(Arc::new(AwayDirectory(Ok(Presence::Away))))).await;
    let outcome = f
        .tracker
        .handle_at(&event("U1", ":computer:", "coding", Presence::Unknown), T0)
        .await;

    assert!(matches!(outcome, Outcome::Applied { verdict: Verdict::NotWorking, .. }));
    let id = person_id(&f.store, "U1").await;
    let latest = f.store.latest_status_record(id).await.unwrap().unwrap();
    assert_eq!(latest.text, "offline");
}

#[tokio::test]
async fn explicit_event_presence_wins_over_directory() {
    let f = fixture_with(Some(Arc::new(AwayDirectory(Ok(Presence::Away))))).await;
    let outcome = f
        .tracker
        .handle_at(&event("U1", ":computer:", "coding", Presence::Active), T0)
        .await;
    assert!(matches!(outcome, Outcome::Applied { verdict: Verdict::Working, .. }));
}

#[tokio::test]
async fn failed_presence_lookup_assumes_online() {
    let f = fixture_with(Some(Arc::new(AwayDirectory(Err(()))))).await;
    let outcome = f
        .tracker
        .handle_at(&event("U1", ":computer:", "coding", Presence::Unknown), T0)
        .await;
    assert!(matches!(outcome, Outcome::Applied { verdict: Verdict::Working, .. }));
}
