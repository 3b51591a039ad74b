use super::*;
use crate::state::test_helpers::profile;
use crate::store::MemoryStore;
use serde_json::Value;
use tokio::time::timeout;

async fn subscribe(hub: &Hub) -> (ConnId, mpsc::Receiver<Payload>) {
    let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
    let id = Uuid::new_v4();
    hub.register(Subscriber { id, tx }).await;
    (id, rx)
}

async fn recv_json(rx: &mut mpsc::Receiver<Payload>) -> Value {
    let payload = timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("payload receive timed out")
        .expect("subscriber channel closed unexpectedly");
    serde_json::from_str(&payload).expect("payload should be json")
}

async fn assert_no_payload(rx: &mut mpsc::Receiver<Payload>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no payload"
    );
}

async fn wait_for_count(hub: &Hub, expected: usize) {
    for _ in 0..50 {
        if hub.subscriber_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("subscriber count stuck at {}, expected {expected}", hub.subscriber_count());
}

fn empty_update() -> DashboardMessage {
    DashboardMessage::UserUpdate(Snapshot::default())
}

#[tokio::test]
async fn full_queue_drops_second_broadcast() {
    let store = Arc::new(MemoryStore::new());
    let config = HubConfig { queue_capacity: 1, ..HubConfig::default() };
    // Loop never runs, so nothing drains the queue.
    let (hub, _loop) = Hub::new(store, config);

    assert!(hub.broadcast(&empty_update()).is_ok());
    assert!(matches!(hub.broadcast(&empty_update()), Err(HubError::QueueFull)));
}

#[tokio::test]
async fn register_sends_initial_data_to_new_subscriber_only() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_person(&profile("U1")).await.unwrap();
    let (hub, _handle) = Hub::spawn(store, HubConfig::default());

    let (_a, mut rx_a) = subscribe(&hub).await;
    let first = recv_json(&mut rx_a).await;
    assert_eq!(first["type"], "initial_data");
    assert_eq!(first["data"]["users"].as_array().unwrap().len(), 1);
    assert_eq!(first["data"]["analytics"]["total_users"], 1);

    let (_b, mut rx_b) = subscribe(&hub).await;
    assert_eq!(recv_json(&mut rx_b).await["type"], "initial_data");
    assert_no_payload(&mut rx_a).await;
    assert_eq!(hub.subscriber_count(), 2);
}

#[tokio::test]
async fn broadcast_reaches_every_subscriber() {
    let (hub, _handle) = Hub::spawn(Arc::new(MemoryStore::new()), HubConfig::default());
    let (_a, mut rx_a) = subscribe(&hub).await;
    let (_b, mut rx_b) = subscribe(&hub).await;
    recv_json(&mut rx_a).await;
    recv_json(&mut rx_b).await;

    hub.broadcast(&empty_update()).unwrap();

    assert_eq!(recv_json(&mut rx_a).await["type"], "user_update");
    assert_eq!(recv_json(&mut rx_b).await["type"], "user_update");
}

#[tokio::test]
async fn unregister_closes_channel_and_is_idempotent() {
    let (hub, _handle) = Hub::spawn(Arc::new(MemoryStore::new()), HubConfig::default());
    let (id, mut rx) = subscribe(&hub).await;
    recv_json(&mut rx).await;

    hub.unregister(id).await;
    hub.unregister(id).await;
    hub.unregister(Uuid::new_v4()).await;

    let closed = timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("close should be observed");
    assert!(closed.is_none());
    assert_eq!(hub.subscriber_count(), 0);
}

#[tokio::test]
async fn dead_subscriber_removed_on_fan_out() {
    let (hub, _handle) = Hub::spawn(Arc::new(MemoryStore::new()), HubConfig::default());
    let (_dead, mut rx_dead) = subscribe(&hub).await;
    let (_live, mut rx_live) = subscribe(&hub).await;
    recv_json(&mut rx_dead).await;
    recv_json(&mut rx_live).await;
    drop(rx_dead);

    hub.broadcast(&empty_update()).unwrap();

    assert_eq!(recv_json(&mut rx_live).await["type"], "user_update");
    wait_for_count(&hub, 1).await;
}

#[tokio::test]
async fn publish_person_sends_single_user_update() {
    let store = Arc::new(MemoryStore::new());
    let person = store.upsert_person(&profile("U1")).await.unwrap();
    let (hub, _handle) = Hub::spawn(store, HubConfig::default());
    let (_id, mut rx) = subscribe(&hub).await;
    recv_json(&mut rx).await;

    hub.publish_person(person.id).await;

    let msg = recv_json(&mut rx).await;
    assert_eq!(msg["type"], "single_user_update");
    assert_eq!(msg["data"]["user"]["user_id"], person.id.to_string());
}

#[tokio::test]
async fn publish_unknown_person_sends_nothing() {
    let (hub, _handle) = Hub::spawn(Arc::new(MemoryStore::new()), HubConfig::default());
    let (_id, mut rx) = subscribe(&hub).await;
    recv_json(&mut rx).await;

    hub.publish_person(Uuid::new_v4()).await;

    assert_no_payload(&mut rx).await;
}

#[tokio::test]
async fn publish_full_update_sends_users_and_analytics() {
    let store = Arc::new(MemoryStore::new());
    store.upsert_person(&profile("U1")).await.unwrap();
    store.upsert_person(&profile("U2")).await.unwrap();
    let (hub, _handle) = Hub::spawn(store, HubConfig::default());
    let (_id, mut rx) = subscribe(&hub).await;
    recv_json(&mut rx).await;

    hub.publish_full_update().await;

    let msg = recv_json(&mut rx).await;
    assert_eq!(msg["type"], "user_update");
    assert_eq!(msg["data"]["analytics"]["total_users"], 2);
}

#[tokio::test]
async fn snapshot_completion_uses_configured_weekly_target() {
    let store = Arc::new(MemoryStore::new());
    let person = store.upsert_person(&profile("U1")).await.unwrap();
    let start = OffsetDateTime::now_utc() - time::Duration::hours(6);
    let entry = store
        .create_time_entry(crate::store::NewTimeEntry {
            person_id: person.id,
            start_time: start,
            status: "Working".into(),
            status_text: String::new(),
            status_emoji: String::new(),
        })
        .await
        .unwrap();
    store
        .close_time_entry(entry.id, start + time::Duration::hours(5), 5 * 3600)
        .await
        .unwrap();

    let config = HubConfig { required_weekly_hours: 10.0, ..HubConfig::default() };
    let (hub, _loop) = Hub::new(store, config);

    let analytics = hub.snapshot().await.unwrap().analytics;
    assert!((analytics.total_working_time - 5.0).abs() < 1e-9);
    assert!((analytics.weekly_completion - 50.0).abs() < 1e-9);
}

#[tokio::test]
async fn shutdown_closes_subscribers_and_rejects_broadcasts() {
    let (hub, handle) = Hub::spawn(Arc::new(MemoryStore::new()), HubConfig::default());
    let (_id, mut rx) = subscribe(&hub).await;
    recv_json(&mut rx).await;

    hub.shutdown().await;
    timeout(Duration::from_millis(200), handle)
        .await
        .expect("hub loop should stop")
        .expect("hub loop should not panic");

    assert!(rx.recv().await.is_none());
    assert_eq!(hub.subscriber_count(), 0);
    assert!(matches!(hub.broadcast(&empty_update()), Err(HubError::Closed)));
}
