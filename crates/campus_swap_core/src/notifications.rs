//! crates/campus_swap_core/src/notifications.rs
//!
//! The trade notification feed: trades addressed to the current user that are
//! pending or accepted, newest first, at most ten.
//!
//! Live updates use invalidate-and-refetch. A realtime change on the user's
//! trades does not patch the local list; it triggers a full `reload`. That
//! costs one round trip per event but the feed always reflects what the
//! backend returned last.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{TradeNotification, TradeStatus};
use crate::ports::{ChangeKind, PortResult, ToastVariant, TradeChange};
use crate::state::AppState;

pub const NOTIFICATION_LIMIT: usize = 10;
pub const FEED_STATUSES: [TradeStatus; 2] = [TradeStatus::Pending, TradeStatus::Accepted];

//=========================================================================================
// Rendering
//=========================================================================================

/// Title, description and tone of one feed entry, derived from its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub title: String,
    pub description: String,
    pub variant: ToastVariant,
}

impl NotificationMessage {
    pub fn for_trade(notification: &TradeNotification) -> Self {
        match notification.trade.status {
            TradeStatus::Pending => Self {
                title: "Nova proposta de troca".to_string(),
                description: format!(
                    "{} quer trocar por {}",
                    notification.proposer.display_name, notification.desired_title
                ),
                variant: ToastVariant::Default,
            },
            TradeStatus::Accepted => Self {
                title: "Proposta aceita".to_string(),
                description: format!(
                    "Sua troca foi aceita! Objeto: {}",
                    notification.desired_title
                ),
                variant: ToastVariant::Success,
            },
            _ => Self {
                title: "Notificação".to_string(),
                description: "Você tem uma atualização".to_string(),
                variant: ToastVariant::Default,
            },
        }
    }
}

/// The bell badge: nothing at zero, the count up to nine, then "9+".
pub fn badge_label(unread: usize) -> Option<String> {
    match unread {
        0 => None,
        1..=9 => Some(unread.to_string()),
        _ => Some("9+".to_string()),
    }
}

pub fn unread_count(entries: &[TradeNotification]) -> usize {
    entries
        .iter()
        .filter(|n| n.trade.status == TradeStatus::Pending)
        .count()
}

//=========================================================================================
// Feed
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    pub entries: Vec<TradeNotification>,
    pub unread_count: usize,
    pub loading: bool,
}

pub struct NotificationFeed {
    app: Arc<AppState>,
    recipient_id: Uuid,
    state: watch::Sender<FeedSnapshot>,
}

impl NotificationFeed {
    pub fn new(app: Arc<AppState>, recipient_id: Uuid) -> Arc<Self> {
        let (state, _) = watch::channel(FeedSnapshot {
            loading: true,
            ..FeedSnapshot::default()
        });
        Arc::new(Self {
            app,
            recipient_id,
            state,
        })
    }

    /// Refetches the whole feed. Errors are logged and the previous entries kept.
    pub async fn reload(&self) {
        self.state.send_modify(|s| s.loading = true);
        let result = self
            .app
            .db
            .list_trade_notifications(self.recipient_id, &FEED_STATUSES, NOTIFICATION_LIMIT)
            .await;

        match result {
            Ok(entries) => {
                debug!("Loaded {} notifications for {}", entries.len(), self.recipient_id);
                let unread = unread_count(&entries);
                self.state.send_replace(FeedSnapshot {
                    entries,
                    unread_count: unread,
                    loading: false,
                });
            }
            Err(e) => {
                error!("Failed to load notifications: {:?}", e);
                self.state.send_modify(|s| s.loading = false);
            }
        }
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.state.subscribe()
    }

    pub fn unread_count(&self) -> usize {
        self.state.borrow().unread_count
    }

    pub fn badge(&self) -> Option<String> {
        badge_label(self.unread_count())
    }

    /// There is no persisted read flag; this only refreshes the feed.
    pub async fn mark_as_read(&self, trade_id: Uuid) {
        debug!("mark_as_read({}) refreshes the feed", trade_id);
        self.reload().await;
    }

    /// Empties the local list. The backend is untouched, so the next reload
    /// brings the entries back.
    pub fn clear_all(&self) {
        self.state.send_modify(|s| {
            s.entries.clear();
            s.unread_count = 0;
        });
    }

    /// Subscribes to trade changes addressed to the recipient and reloads the
    /// feed on every insert or update until the returned handle is stopped.
    pub async fn follow(self: &Arc<Self>) -> PortResult<FeedHandle> {
        let mut subscription = self
            .app
            .realtime
            .subscribe_trade_changes(self.recipient_id)
            .await?;
        let token = subscription.token();
        let feed = Arc::clone(self);

        let task = tokio::spawn(async move {
            while let Some(change) = subscription.next().await {
                match change {
                    Ok(change) => feed.invalidate(change).await,
                    Err(e) => warn!("Trade change feed error: {:?}", e),
                }
            }
            debug!("Trade change feed for {} closed", feed.recipient_id);
        });

        info!("Following trade changes for {}", self.recipient_id);
        Ok(FeedHandle {
            token,
            task: Some(task),
        })
    }

    async fn invalidate(&self, change: TradeChange) {
        match change.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                debug!("Trade {} changed ({:?}); reloading feed", change.trade_id, change.kind);
                self.reload().await;
            }
            ChangeKind::Delete => {}
        }
    }
}

/// Keeps a live feed running. Dropping it tears the subscription down.
pub struct FeedHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Notification feed task ended abnormally: {:?}", e);
            }
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
