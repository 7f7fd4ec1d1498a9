//! crates/campus_swap_core/src/state.rs
//!
//! Defines the shared application state handed to every component.

use std::sync::Arc;

use crate::ports::{AuthService, DatabaseService, Notifier, RealtimeService, StorageService};

//=========================================================================================
// AppState (Shared Across All Components)
//=========================================================================================

/// The backend ports, created once at startup and passed explicitly to every
/// component that needs them.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthService>,
    pub db: Arc<dyn DatabaseService>,
    pub storage: Arc<dyn StorageService>,
    pub realtime: Arc<dyn RealtimeService>,
    pub notifier: Arc<dyn Notifier>,
}
