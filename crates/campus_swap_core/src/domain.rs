//! crates/campus_swap_core/src/domain.rs
//!
//! Defines the pure, core data structures for the marketplace.
//! These structs are independent of the backend's wire format: each query
//! variant gets its own projection, so a joined profile or listing is either
//! statically present or statically absent.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Enumerations
//=========================================================================================

/// Returned when a wire string does not name any variant of a domain enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} value: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// The category a listing is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectCategory {
    Books,
    Electronics,
    Clothing,
    Accessories,
    Furniture,
    Other,
}

impl ObjectCategory {
    pub const ALL: [ObjectCategory; 6] = [
        ObjectCategory::Books,
        ObjectCategory::Electronics,
        ObjectCategory::Clothing,
        ObjectCategory::Accessories,
        ObjectCategory::Furniture,
        ObjectCategory::Other,
    ];

    /// The value stored in the `categoria` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectCategory::Books => "livros",
            ObjectCategory::Electronics => "eletronicos",
            ObjectCategory::Clothing => "roupas",
            ObjectCategory::Accessories => "acessorios",
            ObjectCategory::Furniture => "moveis",
            ObjectCategory::Other => "outros",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ObjectCategory::Books => "Livros",
            ObjectCategory::Electronics => "Eletrônicos",
            ObjectCategory::Clothing => "Roupas",
            ObjectCategory::Accessories => "Acessórios",
            ObjectCategory::Furniture => "Móveis",
            ObjectCategory::Other => "Outros",
        }
    }
}

impl FromStr for ObjectCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("object category", s))
    }
}

impl fmt::Display for ObjectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a listing is in its trade lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObjectStatus {
    #[default]
    Available,
    InNegotiation,
    Traded,
}

impl ObjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectStatus::Available => "disponivel",
            ObjectStatus::InNegotiation => "em_negociacao",
            ObjectStatus::Traded => "trocado",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ObjectStatus::Available => "Disponível",
            ObjectStatus::InNegotiation => "Em negociação",
            ObjectStatus::Traded => "Trocado",
        }
    }
}

impl FromStr for ObjectStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disponivel" => Ok(ObjectStatus::Available),
            "em_negociacao" => Ok(ObjectStatus::InNegotiation),
            "trocado" => Ok(ObjectStatus::Traded),
            other => Err(UnknownVariant::new("object status", other)),
        }
    }
}

impl fmt::Display for ObjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The negotiation state of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TradeStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
    Completed,
    Cancelled,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pendente",
            TradeStatus::Accepted => "aceita",
            TradeStatus::Declined => "recusada",
            TradeStatus::Completed => "concluida",
            TradeStatus::Cancelled => "cancelada",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "Pendente",
            TradeStatus::Accepted => "Aceita",
            TradeStatus::Declined => "Recusada",
            TradeStatus::Completed => "Concluída",
            TradeStatus::Cancelled => "Cancelada",
        }
    }
}

impl FromStr for TradeStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pendente" => Ok(TradeStatus::Pending),
            "aceita" => Ok(TradeStatus::Accepted),
            "recusada" => Ok(TradeStatus::Declined),
            "concluida" => Ok(TradeStatus::Completed),
            "cancelada" => Ok(TradeStatus::Cancelled),
            other => Err(UnknownVariant::new("trade status", other)),
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRole {
    Admin,
    User,
}

impl AppRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppRole::Admin => "admin",
            AppRole::User => "user",
        }
    }
}

impl FromStr for AppRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(AppRole::Admin),
            "user" => Ok(AppRole::User),
            other => Err(UnknownVariant::new("app role", other)),
        }
    }
}

//=========================================================================================
// Accounts
//=========================================================================================

/// One profile per account, created by the backend on first authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub enrollment_number: Option<String>,
    pub program: Option<String>,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub active_affiliation: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Avatar fallback text: the first letter of the first two words of the
    /// display name, uppercased.
    pub fn initials(&self) -> String {
        initials(&self.display_name)
    }
}

/// The proposer fields a notification query expands.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileBadge {
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl ProfileBadge {
    pub fn initials(&self) -> String {
        initials(&self.display_name)
    }
}

fn initials(name: &str) -> String {
    let letters: String = name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .take(2)
        .collect();
    if letters.is_empty() {
        "U".to_string()
    } else {
        letters
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRole {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: AppRole,
}

/// A signed-in session as reported by the auth backend.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Push-style notifications from the auth backend.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    InitialSession(Option<AuthSession>),
    SignedIn(AuthSession),
    SignedOut,
    TokenRefreshed(AuthSession),
    UserUpdated(AuthSession),
}

impl AuthEvent {
    /// The session this event leaves in place, if any.
    pub fn session(&self) -> Option<&AuthSession> {
        match self {
            AuthEvent::InitialSession(session) => session.as_ref(),
            AuthEvent::SignedIn(session)
            | AuthEvent::TokenRefreshed(session)
            | AuthEvent::UserUpdated(session) => Some(session),
            AuthEvent::SignedOut => None,
        }
    }
}

//=========================================================================================
// Listings
//=========================================================================================

/// A physical object offered for exchange (the `objects` table).
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: ObjectCategory,
    pub condition: String,
    pub images: Vec<String>,
    pub status: ObjectStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Listing {
    pub fn cover_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// A listing joined with its owner's profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingWithOwner {
    pub listing: Listing,
    pub owner: Profile,
}

/// The row written when a listing is created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewListing {
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: ObjectCategory,
    pub condition: String,
    pub images: Vec<String>,
    pub status: ObjectStatus,
}

//=========================================================================================
// Trades
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub id: Uuid,
    pub proposer_id: Uuid,
    pub recipient_id: Uuid,
    pub offered_listing_id: Uuid,
    pub desired_listing_id: Uuid,
    pub location_id: Option<Uuid>,
    pub status: TradeStatus,
    pub message: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Trade {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.proposer_id == user_id || self.recipient_id == user_id
    }
}

/// A trade joined with both participants' profiles (the conversation list).
#[derive(Debug, Clone, PartialEq)]
pub struct TradeWithParties {
    pub trade: Trade,
    pub proposer: Profile,
    pub recipient: Profile,
}

/// A trade addressed to the current user, joined with what the feed renders.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeNotification {
    pub trade: Trade,
    pub proposer: ProfileBadge,
    pub offered_title: String,
    pub desired_title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTrade {
    pub proposer_id: Uuid,
    pub recipient_id: Uuid,
    pub offered_listing_id: Uuid,
    pub desired_listing_id: Uuid,
    pub location_id: Option<Uuid>,
    pub status: TradeStatus,
    pub message: Option<String>,
}

//=========================================================================================
// Chat, meeting points and ratings
//=========================================================================================

/// A chat message inside a trade. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub trade_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub trade_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
}

/// A meeting point on campus.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rating {
    pub id: Uuid,
    pub rater_id: Uuid,
    pub rated_id: Uuid,
    pub trade_id: Uuid,
    pub score: i32,
    pub comment: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}
