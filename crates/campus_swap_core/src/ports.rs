//! crates/campus_swap_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the marketplace core.
//! These traits form the boundary of the hexagonal architecture: the hosted
//! backend (auth, tables, object storage, realtime) sits behind them, and the
//! components in this crate only ever talk to the ports.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{
    AuthEvent, AuthSession, Listing, ListingWithOwner, Location, Message, NewListing,
    NewMessage, NewTrade, ObjectStatus, Profile, Trade, TradeNotification, TradeStatus,
    TradeWithParties,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the backend (HTTP, websocket, decoding).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The backend rejected the request and said why.
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

impl PortError {
    /// The bare message, without the variant prefix `Display` adds.
    pub fn message(&self) -> &str {
        match self {
            PortError::NotFound(msg) | PortError::Backend(msg) | PortError::Unexpected(msg) => msg,
            PortError::Unauthorized => "Unauthorized",
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Realtime Subscriptions
//=========================================================================================

pub type ChangeStream<T> = Pin<Box<dyn Stream<Item = PortResult<T>> + Send>>;

pub type AuthEventStream = Pin<Box<dyn Stream<Item = AuthEvent> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A committed change on the `trades` table.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeChange {
    pub kind: ChangeKind,
    pub trade_id: Uuid,
}

/// A live change feed scoped to one filter.
///
/// The feed stays open until `unsubscribe` is called, the subscription is
/// dropped, or a clone of its token is cancelled. Adapters watch the same token
/// to close the underlying channel.
pub struct Subscription<T> {
    stream: ChangeStream<T>,
    token: CancellationToken,
}

impl<T> Subscription<T> {
    pub fn new(stream: ChangeStream<T>, token: CancellationToken) -> Self {
        Self { stream, token }
    }

    /// A handle that tears this subscription down when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Waits for the next change. Returns `None` once torn down.
    pub async fn next(&mut self) -> Option<PortResult<T>> {
        if self.token.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = self.token.cancelled() => None,
            item = self.stream.next() => item,
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> PortResult<AuthSession>;

    /// Registers an account; the display name travels as profile metadata.
    /// Returns `None` when the backend requires confirmation before a session exists.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> PortResult<Option<AuthSession>>;

    async fn sign_out(&self) -> PortResult<()>;

    async fn current_session(&self) -> PortResult<Option<AuthSession>>;

    /// A push stream of session changes. Each call returns an independent stream.
    fn auth_events(&self) -> AuthEventStream;
}

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Profiles ---
    async fn get_profile(&self, user_id: Uuid) -> PortResult<Profile>;

    // --- Listings ---
    /// Every available listing with its owner, newest first.
    async fn list_available_listings(&self) -> PortResult<Vec<ListingWithOwner>>;

    async fn get_listing_with_owner(&self, listing_id: Uuid) -> PortResult<ListingWithOwner>;

    /// The owner's listings, newest first, optionally restricted to one status.
    async fn list_listings_by_owner(
        &self,
        owner_id: Uuid,
        status: Option<ObjectStatus>,
    ) -> PortResult<Vec<Listing>>;

    async fn insert_listing(&self, listing: NewListing) -> PortResult<Listing>;

    // --- Trades ---
    async fn insert_trade(&self, trade: NewTrade) -> PortResult<Trade>;

    /// Trades addressed to `recipient_id` in one of `statuses`, newest first.
    async fn list_trade_notifications(
        &self,
        recipient_id: Uuid,
        statuses: &[TradeStatus],
        limit: usize,
    ) -> PortResult<Vec<TradeNotification>>;

    /// Every trade where the user is proposer or recipient, newest first.
    async fn list_trades_for_participant(
        &self,
        user_id: Uuid,
    ) -> PortResult<Vec<TradeWithParties>>;

    // --- Messages ---
    /// The full thread of a trade, oldest first.
    async fn list_messages(&self, trade_id: Uuid) -> PortResult<Vec<Message>>;

    async fn insert_message(&self, message: NewMessage) -> PortResult<Message>;

    // --- Reference data ---
    async fn list_locations(&self) -> PortResult<Vec<Location>>;
}

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Uploads a blob under `path` inside the configured bucket.
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> PortResult<()>;

    /// The stable public URL for a previously uploaded `path`.
    fn public_url(&self, path: &str) -> String;
}

#[async_trait]
pub trait RealtimeService: Send + Sync {
    /// Inserts and updates on `trades` where `recipient_id` matches.
    async fn subscribe_trade_changes(
        &self,
        recipient_id: Uuid,
    ) -> PortResult<Subscription<TradeChange>>;

    /// Inserts on `messages` where `trade_id` matches.
    async fn subscribe_message_inserts(&self, trade_id: Uuid) -> PortResult<Subscription<Message>>;
}

//=========================================================================================
// User-facing Notifications
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastVariant {
    Default,
    Success,
    Destructive,
}

/// A transient banner shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub title: String,
    pub description: String,
    pub variant: ToastVariant,
}

impl Toast {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::with_variant(title, description, ToastVariant::Default)
    }

    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::with_variant(title, description, ToastVariant::Success)
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::with_variant(title, description, ToastVariant::Destructive)
    }

    fn with_variant(
        title: impl Into<String>,
        description: impl Into<String>,
        variant: ToastVariant,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn cancelled_token_ends_subscription() {
        let token = CancellationToken::new();
        let items: ChangeStream<u32> = Box::pin(stream::iter(vec![Ok(1), Ok(2)]));
        let mut sub = Subscription::new(items, token.clone());

        assert_eq!(sub.next().await, Some(Ok(1)));
        token.cancel();
        assert!(!sub.is_active());
        assert_eq!(sub.next().await, None);
    }

    #[test]
    fn dropping_subscription_cancels_token() {
        let token = CancellationToken::new();
        let sub: Subscription<u32> = Subscription::new(Box::pin(stream::pending()), token.clone());
        sub.unsubscribe();
        assert!(token.is_cancelled());
    }

    #[test]
    fn message_strips_variant_prefix() {
        let err = PortError::Backend("User already registered".to_string());
        assert_eq!(err.message(), "User already registered");
    }
}
