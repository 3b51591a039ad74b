mod config;
mod db;
mod message;
mod routes;
mod services;
mod slack;
mod state;
mod store;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::Level;

use crate::services::directory::UserDirectory;
use crate::services::dispatch::EventDispatcher;
use crate::services::hub::Hub;
use crate::services::presence::PresenceTracker;
use crate::slack::client::SlackClient;
use crate::store::{MemoryStore, PgStore, RecordStore};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = config::Config::from_env().expect("invalid configuration");

    let level = if config.verbose_logs { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let store: Arc<dyn RecordStore> = match &config.database_url {
        Some(url) => {
            let pool = db::init_pool(url, config.db_max_connections)
                .await
                .expect("database init failed");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store, data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    // Slack is optional: without tokens only the HTTP intake feeds events.
    let slack_client = match &config.slack {
        Some(slack_config) => {
            let client = Arc::new(SlackClient::new(slack_config).expect("slack client init failed"));
            if let Err(e) = client.sync_users(store.as_ref()).await {
                tracing::warn!(error = %e, "slack user sync failed; continuing with stored people");
            }
            Some(client)
        }
        None => {
            tracing::warn!("SLACK_APP_TOKEN / SLACK_BOT_TOKEN not set; Slack ingestion disabled");
            None
        }
    };

    let (hub, hub_task) = Hub::spawn(store.clone(), config.hub);
    let directory = slack_client.clone().map(|c| c as Arc<dyn UserDirectory>);
    let tracker = PresenceTracker::new(store.clone(), hub.clone(), directory);
    let dispatcher = EventDispatcher::new(tracker, config.person_queue_idle);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = vec![
        services::schedule::spawn_duration_refresh(
            dispatcher.tracker().ledger().clone(),
            hub.clone(),
            config.duration_refresh,
            shutdown_rx.clone(),
        ),
        services::schedule::spawn_full_updates(hub.clone(), config.full_update, shutdown_rx.clone()),
    ];
    if let Some(client) = slack_client {
        tasks.push(slack::socket::spawn_socket_mode(client, dispatcher.clone(), shutdown_rx.clone()));
    }

    let port = config.port;
    let state = state::AppState::new(store, hub.clone(), dispatcher, config);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "worklog listening");
    // Dashboard sockets only end once the hub drops them, so the hub must stop
    // before the server waits for open connections.
    let stopping = hub.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(true);
            stopping.shutdown().await;
        })
        .await
        .expect("server failed");

    for task in tasks {
        let _ = task.await;
    }
    let _ = hub_task.await;
    tracing::info!("worklog stopped");
}
