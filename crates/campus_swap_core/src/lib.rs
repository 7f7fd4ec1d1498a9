pub mod catalog;
pub mod chat;
pub mod domain;
pub mod input;
pub mod listing;
pub mod navigation;
pub mod notifications;
pub mod ports;
pub mod session;
pub mod state;
pub mod trade;

#[cfg(test)]
mod testing;

pub use domain::{
    AuthEvent, AuthSession, Listing, ListingWithOwner, Message, ObjectCategory, ObjectStatus,
    Profile, Trade, TradeNotification, TradeStatus, TradeWithParties,
};
pub use navigation::{Redirect, Route};
pub use ports::{
    AuthService, DatabaseService, Notifier, PortError, PortResult, RealtimeService,
    StorageService, Subscription, Toast, ToastVariant,
};
pub use state::AppState;
