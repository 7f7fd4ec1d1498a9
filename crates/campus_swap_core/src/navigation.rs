//! crates/campus_swap_core/src/navigation.rs
//!
//! The routed views of the marketplace. Operations that move the user
//! elsewhere return the next `Route` instead of navigating themselves.

use uuid::Uuid;

use crate::ports::PortError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Catalog,
    ListingDetail(Uuid),
    CreateListing,
    MyListings,
    ProposeTrade(Uuid),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Catalog => "/".to_string(),
            Route::ListingDetail(id) => format!("/objeto/{}", id),
            Route::CreateListing => "/cadastrar-objeto".to_string(),
            Route::MyListings => "/meus-objetos".to_string(),
            Route::ProposeTrade(id) => format!("/propor-troca/{}", id),
        }
    }
}

/// A view could not load and sends the user to `to` instead.
#[derive(Debug, thiserror::Error)]
#[error("redirecting to {}: {source}", .to.path())]
pub struct Redirect {
    pub to: Route,
    #[source]
    pub source: PortError,
}

impl Redirect {
    pub fn new(to: Route, source: PortError) -> Self {
        Self { to, source }
    }
}
