//! In-memory stand-ins for every port, shared by the component tests.
//!
//! `MemoryBackend` keeps the tables in a plain mutex and fans realtime events
//! out through a broadcast channel, so a test can drive several components
//! (even several users) against one backend.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::{future, stream, Stream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{
    AuthEvent, AuthSession, Listing, ListingWithOwner, Location, Message, NewListing,
    NewMessage, NewTrade, ObjectCategory, ObjectStatus, Profile, ProfileBadge, Trade,
    TradeNotification, TradeStatus, TradeWithParties,
};
use crate::ports::{
    AuthEventStream, AuthService, ChangeKind, DatabaseService, Notifier, PortError, PortResult,
    RealtimeService, StorageService, Subscription, Toast, TradeChange,
};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    GetProfile,
    ListAvailable,
    GetListing,
    ListByOwner,
    InsertListing,
    InsertTrade,
    Notifications,
    Conversations,
    ListMessages,
    InsertMessage,
    SignIn,
    SignUp,
    SignOut,
}

#[derive(Debug, Clone)]
enum RealtimeEvent {
    Trade { recipient_id: Uuid, change: TradeChange },
    Message(Message),
}

struct Account {
    email: String,
    password: String,
    user_id: Uuid,
}

#[derive(Default)]
struct Tables {
    profiles: Vec<Profile>,
    listings: Vec<Listing>,
    trades: Vec<Trade>,
    messages: Vec<Message>,
    locations: Vec<Location>,
    accounts: Vec<Account>,
    uploads: Vec<String>,
    session: Option<AuthSession>,
    failing: HashMap<Op, String>,
    fail_upload_at: Option<usize>,
    upload_attempts: usize,
    insert_trade_calls: usize,
    clock: i64,
}

impl Tables {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() + Duration::seconds(self.clock)
    }

    fn check(&self, op: Op) -> PortResult<()> {
        match self.failing.get(&op) {
            Some(message) => Err(PortError::Backend(message.clone())),
            None => Ok(()),
        }
    }

    fn profile(&self, id: Uuid) -> PortResult<Profile> {
        self.profiles
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Profile {} not found", id)))
    }

    fn listing(&self, id: Uuid) -> PortResult<Listing> {
        self.listings
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Listing {} not found", id)))
    }

    fn with_owner(&self, listing: Listing) -> PortResult<ListingWithOwner> {
        let owner = self.profile(listing.owner_id)?;
        Ok(ListingWithOwner { listing, owner })
    }
}

pub(crate) struct MemoryBackend {
    tables: Mutex<Tables>,
    realtime: broadcast::Sender<RealtimeEvent>,
    auth_events: broadcast::Sender<AuthEvent>,
    message_subscriptions: Mutex<Vec<(Uuid, CancellationToken)>>,
}

impl MemoryBackend {
    pub(crate) fn new() -> Arc<Self> {
        let (realtime, _) = broadcast::channel(64);
        let (auth_events, _) = broadcast::channel(64);
        Arc::new(Self {
            tables: Mutex::new(Tables::default()),
            realtime,
            auth_events,
            message_subscriptions: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn app(self: &Arc<Self>, notifier: Arc<RecordingNotifier>) -> Arc<AppState> {
        Arc::new(AppState {
            auth: self.clone(),
            db: self.clone(),
            storage: self.clone(),
            realtime: self.clone(),
            notifier,
        })
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    // --- Seeding ---

    pub(crate) fn add_profile(&self, name: &str) -> Profile {
        let mut tables = self.tables();
        let now = tables.tick();
        let id = Uuid::new_v4();
        let profile = Profile {
            id,
            email: format!("{}@ufrn.edu.br", id.simple()),
            display_name: name.to_string(),
            enrollment_number: None,
            program: None,
            bio: None,
            phone: None,
            avatar_url: None,
            active_affiliation: true,
            created_at: Some(now),
            updated_at: Some(now),
        };
        tables.profiles.push(profile.clone());
        profile
    }

    pub(crate) fn add_account(&self, email: &str, password: &str, name: &str) -> Profile {
        let mut profile = self.add_profile(name);
        let mut tables = self.tables();
        profile.email = email.to_string();
        if let Some(p) = tables.profiles.iter_mut().find(|p| p.id == profile.id) {
            p.email = email.to_string();
        }
        tables.accounts.push(Account {
            email: email.to_string(),
            password: password.to_string(),
            user_id: profile.id,
        });
        profile
    }

    pub(crate) fn add_listing(&self, owner_id: Uuid, title: &str, category: ObjectCategory) -> Listing {
        self.add_listing_with(owner_id, title, "", category, ObjectStatus::Available)
    }

    pub(crate) fn add_listing_with(
        &self,
        owner_id: Uuid,
        title: &str,
        description: &str,
        category: ObjectCategory,
        status: ObjectStatus,
    ) -> Listing {
        let mut tables = self.tables();
        let now = tables.tick();
        let listing = Listing {
            id: Uuid::new_v4(),
            owner_id,
            title: title.to_string(),
            description: description.to_string(),
            category,
            condition: "Usado".to_string(),
            images: Vec::new(),
            status,
            created_at: Some(now),
            updated_at: Some(now),
        };
        tables.listings.push(listing.clone());
        listing
    }

    // --- Failure injection ---

    pub(crate) fn fail(&self, op: Op, message: &str) {
        self.tables().failing.insert(op, message.to_string());
    }

    /// Makes the `n`-th upload (zero-based) fail.
    pub(crate) fn fail_upload_at(&self, n: usize) {
        self.tables().fail_upload_at = Some(n);
    }

    // --- Mutations the client never performs ---

    pub(crate) fn set_trade_status(&self, trade_id: Uuid, status: TradeStatus) {
        let recipient_id = {
            let mut tables = self.tables();
            let now = tables.tick();
            let Some(trade) = tables.trades.iter_mut().find(|t| t.id == trade_id) else {
                return;
            };
            trade.status = status;
            trade.updated_at = Some(now);
            trade.recipient_id
        };
        let _ = self.realtime.send(RealtimeEvent::Trade {
            recipient_id,
            change: TradeChange {
                kind: ChangeKind::Update,
                trade_id,
            },
        });
    }

    /// Delivers a message insert event without touching the tables.
    pub(crate) fn push_message_event(&self, message: Message) {
        let _ = self.realtime.send(RealtimeEvent::Message(message));
    }

    pub(crate) fn emit_auth(&self, event: AuthEvent) {
        let _ = self.auth_events.send(event);
    }

    pub(crate) fn set_session(&self, session: Option<AuthSession>) {
        self.tables().session = session;
    }

    // --- Inspection ---

    pub(crate) fn trades(&self) -> Vec<Trade> {
        self.tables().trades.clone()
    }

    pub(crate) fn listings(&self) -> Vec<Listing> {
        self.tables().listings.clone()
    }

    pub(crate) fn uploads(&self) -> Vec<String> {
        self.tables().uploads.clone()
    }

    pub(crate) fn insert_trade_calls(&self) -> usize {
        self.tables().insert_trade_calls
    }

    pub(crate) fn active_message_subscriptions(&self, trade_id: Uuid) -> usize {
        self.message_subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, token)| *id == trade_id && !token.is_cancelled())
            .count()
    }

    pub(crate) fn session_for(user_id: Uuid) -> AuthSession {
        AuthSession {
            user_id,
            email: None,
            access_token: format!("token-{}", user_id.simple()),
            refresh_token: None,
            expires_at: None,
        }
    }

    fn realtime_stream(&self) -> impl Stream<Item = RealtimeEvent> + Send + 'static {
        broadcast_stream(self.realtime.subscribe())
    }
}

fn broadcast_stream<T: Clone + Send + 'static>(
    rx: broadcast::Receiver<T>,
) -> impl Stream<Item = T> + Send + 'static {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(item) => return Some((item, rx)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl AuthService for MemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        let session = {
            let mut tables = self.tables();
            tables.check(Op::SignIn)?;
            let user_id = tables
                .accounts
                .iter()
                .find(|a| a.email == email && a.password == password)
                .map(|a| a.user_id)
                .ok_or_else(|| PortError::Backend("Invalid login credentials".to_string()))?;
            let session = MemoryBackend::session_for(user_id);
            tables.session = Some(session.clone());
            session
        };
        self.emit_auth(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> PortResult<Option<AuthSession>> {
        {
            let tables = self.tables();
            tables.check(Op::SignUp)?;
            if tables.accounts.iter().any(|a| a.email == email) {
                return Err(PortError::Backend("User already registered".to_string()));
            }
        }
        if password.len() < 6 {
            return Err(PortError::Backend(
                "Password should be at least 6 characters.".to_string(),
            ));
        }
        self.add_account(email, password, display_name);
        Ok(None)
    }

    async fn sign_out(&self) -> PortResult<()> {
        {
            let mut tables = self.tables();
            tables.check(Op::SignOut)?;
            tables.session = None;
        }
        self.emit_auth(AuthEvent::SignedOut);
        Ok(())
    }

    async fn current_session(&self) -> PortResult<Option<AuthSession>> {
        Ok(self.tables().session.clone())
    }

    fn auth_events(&self) -> AuthEventStream {
        Box::pin(broadcast_stream(self.auth_events.subscribe()))
    }
}

#[async_trait]
impl DatabaseService for MemoryBackend {
    async fn get_profile(&self, user_id: Uuid) -> PortResult<Profile> {
        let tables = self.tables();
        tables.check(Op::GetProfile)?;
        tables.profile(user_id)
    }

    async fn list_available_listings(&self) -> PortResult<Vec<ListingWithOwner>> {
        let tables = self.tables();
        tables.check(Op::ListAvailable)?;
        let mut listings: Vec<Listing> = tables
            .listings
            .iter()
            .filter(|l| l.status == ObjectStatus::Available)
            .cloned()
            .collect();
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        listings.into_iter().map(|l| tables.with_owner(l)).collect()
    }

    async fn get_listing_with_owner(&self, listing_id: Uuid) -> PortResult<ListingWithOwner> {
        let tables = self.tables();
        tables.check(Op::GetListing)?;
        let listing = tables.listing(listing_id)?;
        tables.with_owner(listing)
    }

    async fn list_listings_by_owner(
        &self,
        owner_id: Uuid,
        status: Option<ObjectStatus>,
    ) -> PortResult<Vec<Listing>> {
        let tables = self.tables();
        tables.check(Op::ListByOwner)?;
        let mut listings: Vec<Listing> = tables
            .listings
            .iter()
            .filter(|l| l.owner_id == owner_id && status.map_or(true, |s| l.status == s))
            .cloned()
            .collect();
        listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listings)
    }

    async fn insert_listing(&self, new: NewListing) -> PortResult<Listing> {
        let mut tables = self.tables();
        tables.check(Op::InsertListing)?;
        let now = tables.tick();
        let listing = Listing {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            title: new.title,
            description: new.description,
            category: new.category,
            condition: new.condition,
            images: new.images,
            status: new.status,
            created_at: Some(now),
            updated_at: Some(now),
        };
        tables.listings.push(listing.clone());
        Ok(listing)
    }

    async fn insert_trade(&self, new: NewTrade) -> PortResult<Trade> {
        let trade = {
            let mut tables = self.tables();
            tables.insert_trade_calls += 1;
            tables.check(Op::InsertTrade)?;
            let now = tables.tick();
            let trade = Trade {
                id: Uuid::new_v4(),
                proposer_id: new.proposer_id,
                recipient_id: new.recipient_id,
                offered_listing_id: new.offered_listing_id,
                desired_listing_id: new.desired_listing_id,
                location_id: new.location_id,
                status: new.status,
                message: new.message,
                created_at: Some(now),
                updated_at: Some(now),
            };
            tables.trades.push(trade.clone());
            trade
        };
        let _ = self.realtime.send(RealtimeEvent::Trade {
            recipient_id: trade.recipient_id,
            change: TradeChange {
                kind: ChangeKind::Insert,
                trade_id: trade.id,
            },
        });
        Ok(trade)
    }

    async fn list_trade_notifications(
        &self,
        recipient_id: Uuid,
        statuses: &[TradeStatus],
        limit: usize,
    ) -> PortResult<Vec<TradeNotification>> {
        let tables = self.tables();
        tables.check(Op::Notifications)?;
        let mut trades: Vec<Trade> = tables
            .trades
            .iter()
            .filter(|t| t.recipient_id == recipient_id && statuses.contains(&t.status))
            .cloned()
            .collect();
        trades.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        trades
            .into_iter()
            .take(limit)
            .map(|trade| {
                let proposer = tables.profile(trade.proposer_id)?;
                let offered = tables.listing(trade.offered_listing_id)?;
                let desired = tables.listing(trade.desired_listing_id)?;
                Ok(TradeNotification {
                    trade,
                    proposer: ProfileBadge {
                        display_name: proposer.display_name,
                        avatar_url: proposer.avatar_url,
                    },
                    offered_title: offered.title,
                    desired_title: desired.title,
                })
            })
            .collect()
    }

    async fn list_trades_for_participant(
        &self,
        user_id: Uuid,
    ) -> PortResult<Vec<TradeWithParties>> {
        let tables = self.tables();
        tables.check(Op::Conversations)?;
        let mut trades: Vec<Trade> = tables
            .trades
            .iter()
            .filter(|t| t.involves(user_id))
            .cloned()
            .collect();
        trades.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        trades
            .into_iter()
            .map(|trade| {
                Ok(TradeWithParties {
                    proposer: tables.profile(trade.proposer_id)?,
                    recipient: tables.profile(trade.recipient_id)?,
                    trade,
                })
            })
            .collect()
    }

    async fn list_messages(&self, trade_id: Uuid) -> PortResult<Vec<Message>> {
        let tables = self.tables();
        tables.check(Op::ListMessages)?;
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.trade_id == trade_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn insert_message(&self, new: NewMessage) -> PortResult<Message> {
        let message = {
            let mut tables = self.tables();
            tables.check(Op::InsertMessage)?;
            let now = tables.tick();
            let message = Message {
                id: Uuid::new_v4(),
                trade_id: new.trade_id,
                sender_id: new.sender_id,
                content: new.content,
                read: false,
                created_at: now,
            };
            tables.messages.push(message.clone());
            message
        };
        let _ = self.realtime.send(RealtimeEvent::Message(message.clone()));
        Ok(message)
    }

    async fn list_locations(&self) -> PortResult<Vec<Location>> {
        Ok(self.tables().locations.clone())
    }
}

#[async_trait]
impl StorageService for MemoryBackend {
    async fn upload(&self, path: &str, _data: Bytes, _content_type: &str) -> PortResult<()> {
        let mut tables = self.tables();
        let attempt = tables.upload_attempts;
        tables.upload_attempts += 1;
        if tables.fail_upload_at == Some(attempt) {
            return Err(PortError::Backend("The resource already exists".to_string()));
        }
        tables.uploads.push(path.to_string());
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://object-images/{}", path)
    }
}

#[async_trait]
impl RealtimeService for MemoryBackend {
    async fn subscribe_trade_changes(
        &self,
        recipient_id: Uuid,
    ) -> PortResult<Subscription<TradeChange>> {
        let changes = self.realtime_stream().filter_map(move |event| {
            future::ready(match event {
                RealtimeEvent::Trade { recipient_id: r, change } if r == recipient_id => {
                    Some(Ok(change))
                }
                _ => None,
            })
        });
        Ok(Subscription::new(Box::pin(changes), CancellationToken::new()))
    }

    async fn subscribe_message_inserts(&self, trade_id: Uuid) -> PortResult<Subscription<Message>> {
        let token = CancellationToken::new();
        self.message_subscriptions
            .lock()
            .unwrap()
            .push((trade_id, token.clone()));
        let inserts = self.realtime_stream().filter_map(move |event| {
            future::ready(match event {
                RealtimeEvent::Message(message) if message.trade_id == trade_id => Some(Ok(message)),
                _ => None,
            })
        });
        Ok(Subscription::new(Box::pin(inserts), token))
    }
}

//=========================================================================================
// Notifier
//=========================================================================================

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    toasts: Mutex<Vec<Toast>>,
}

impl RecordingNotifier {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().unwrap().clone()
    }

    pub(crate) fn titles(&self) -> Vec<String> {
        self.toasts().into_iter().map(|t| t.title).collect()
    }

    pub(crate) fn last(&self) -> Option<Toast> {
        self.toasts().pop()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, toast: Toast) {
        self.toasts.lock().unwrap().push(toast);
    }
}
