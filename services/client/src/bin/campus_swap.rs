//! services/client/src/bin/campus_swap.rs

use campus_swap_core::{
    catalog::Catalog,
    notifications::{badge_label, NotificationFeed, NotificationMessage},
    session::SessionContext,
    AppState,
};
use client_lib::{
    adapters::{
        AuthAdapter, BackendHttp, RealtimeAdapter, RestAdapter, StorageAdapter, TracingNotifier,
    },
    config::Config,
    error::ClientError,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded for {}", config.supabase_url);

    // --- 2. Initialize Backend Adapters ---
    let http = BackendHttp::new(&config.supabase_url, &config.anon_key)?;
    let app = Arc::new(AppState {
        auth: Arc::new(AuthAdapter::new(http.clone())),
        db: Arc::new(RestAdapter::new(http.clone())),
        storage: Arc::new(StorageAdapter::new(http.clone(), config.storage_bucket.clone())),
        realtime: Arc::new(RealtimeAdapter::new(http, config.realtime_heartbeat)),
        notifier: Arc::new(TracingNotifier),
    });

    // --- 3. Start the Session ---
    let session = SessionContext::start(app.clone()).await;
    if let Some((email, password)) = config.credentials() {
        if let Err(e) = session.sign_in(email, password).await {
            warn!("Sign-in failed: {}", e.user_message);
        }
    }

    // --- 4. Show the Catalog ---
    let mut catalog = Catalog::new(app.clone());
    catalog.load().await;
    for item in catalog.filtered() {
        info!(
            "[{}] {} ({}) por {}",
            item.listing.category.label(),
            item.listing.title,
            item.listing.condition,
            item.owner.display_name
        );
    }

    // --- 5. Follow Notifications Until Ctrl-C ---
    let Some(user_id) = session.user_id() else {
        info!("Not signed in; set CAMPUS_SWAP_EMAIL and CAMPUS_SWAP_PASSWORD to follow notifications.");
        session.shutdown();
        return Ok(());
    };

    let feed = NotificationFeed::new(app.clone(), user_id);
    feed.reload().await;
    let handle = feed.follow().await?;
    info!(
        "Notifications: {}",
        feed.badge().unwrap_or_else(|| "nenhuma".to_string())
    );

    let mut updates = feed.subscribe();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutting down");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.loading {
                    continue;
                }
                info!(
                    "Notifications: {}",
                    badge_label(snapshot.unread_count)
                        .unwrap_or_else(|| "nenhuma".to_string())
                );
                for entry in &snapshot.entries {
                    let message = NotificationMessage::for_trade(entry);
                    info!("  {}: {}", message.title, message.description);
                }
            }
        }
    }

    handle.stop().await;
    session.shutdown();
    Ok(())
}
