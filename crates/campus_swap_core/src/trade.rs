//! crates/campus_swap_core/src/trade.rs
//!
//! The trade proposal flow: pick one of your own available listings, offer it
//! for someone else's listing, and record a pending trade.
//!
//! Repeated submissions are not deduplicated. Each one records its own
//! pending trade.

use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{Listing, ListingWithOwner, NewTrade, ObjectStatus, TradeStatus};
use crate::input::{clamp_chars, TRADE_MESSAGE_MAX_CHARS};
use crate::navigation::{Redirect, Route};
use crate::ports::{PortError, Toast};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum TradeError {
    #[error("no listing selected to offer")]
    NothingOffered,
    #[error("listing {0} is not one of your available listings")]
    NotOwnListing(Uuid),
    #[error("cannot propose a trade for your own listing")]
    OwnListing,
    #[error("trade insert failed: {0}")]
    Backend(#[from] PortError),
}

pub struct TradeProposal {
    app: Arc<AppState>,
    proposer_id: Uuid,
    desired: ListingWithOwner,
    own_listings: Vec<Listing>,
    offered: Option<Uuid>,
    message: String,
    submitting: bool,
}

impl TradeProposal {
    /// Loads the desired listing (with its owner) and the proposer's own
    /// available listings. Any failure sends the user back to the catalog.
    pub async fn load(
        app: Arc<AppState>,
        proposer_id: Uuid,
        desired_id: Uuid,
    ) -> Result<Self, Redirect> {
        let loaded = async {
            let desired = app.db.get_listing_with_owner(desired_id).await?;
            let own = app
                .db
                .list_listings_by_owner(proposer_id, Some(ObjectStatus::Available))
                .await?;
            Ok::<_, PortError>((desired, own))
        }
        .await;

        let (desired, own_listings) = match loaded {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to load proposal data for {}: {:?}", desired_id, e);
                app.notifier.notify(Toast::destructive(
                    "Erro",
                    "Não foi possível carregar os dados.",
                ));
                return Err(Redirect::new(Route::Catalog, e));
            }
        };

        if desired.listing.owner_id == proposer_id {
            warn!("User {} tried to propose a trade for their own listing", proposer_id);
            app.notifier.notify(Toast::destructive(
                "Erro",
                "Você não pode propor uma troca pelo seu próprio objeto.",
            ));
            return Err(Redirect::new(
                Route::ListingDetail(desired_id),
                PortError::Unauthorized,
            ));
        }

        Ok(Self {
            app,
            proposer_id,
            desired,
            own_listings,
            offered: None,
            message: String::new(),
            submitting: false,
        })
    }

    pub fn desired(&self) -> &ListingWithOwner {
        &self.desired
    }

    /// The proposer's available listings, newest first.
    pub fn own_listings(&self) -> &[Listing] {
        &self.own_listings
    }

    /// Without listings of their own the user has nothing to offer and should
    /// be sent to create one.
    pub fn has_own_listings(&self) -> bool {
        !self.own_listings.is_empty()
    }

    pub fn select_offered(&mut self, listing_id: Uuid) -> Result<(), TradeError> {
        if !self.own_listings.iter().any(|l| l.id == listing_id) {
            return Err(TradeError::NotOwnListing(listing_id));
        }
        self.offered = Some(listing_id);
        Ok(())
    }

    pub fn offered(&self) -> Option<&Listing> {
        let id = self.offered?;
        self.own_listings.iter().find(|l| l.id == id)
    }

    /// Keeps at most 500 characters.
    pub fn set_message(&mut self, message: &str) {
        self.message = clamp_chars(message, TRADE_MESSAGE_MAX_CHARS);
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The "n/500" counter under the message box.
    pub fn message_counter(&self) -> String {
        format!("{}/{}", self.message.chars().count(), TRADE_MESSAGE_MAX_CHARS)
    }

    pub fn can_submit(&self) -> bool {
        self.offered.is_some() && !self.submitting
    }

    /// Records a pending trade from the proposer to the desired listing's
    /// owner and returns to the catalog.
    pub async fn submit(&mut self) -> Result<Route, TradeError> {
        let Some(offered_listing_id) = self.offered else {
            self.app.notifier.notify(Toast::destructive(
                "Erro",
                "Selecione um objeto para oferecer.",
            ));
            return Err(TradeError::NothingOffered);
        };
        if self.desired.listing.owner_id == self.proposer_id {
            return Err(TradeError::OwnListing);
        }

        let message = self.message.trim();
        let new_trade = NewTrade {
            proposer_id: self.proposer_id,
            recipient_id: self.desired.listing.owner_id,
            offered_listing_id,
            desired_listing_id: self.desired.listing.id,
            location_id: None,
            status: TradeStatus::Pending,
            message: (!message.is_empty()).then(|| message.to_string()),
        };

        self.submitting = true;
        let result = self.app.db.insert_trade(new_trade).await;
        self.submitting = false;

        match result {
            Ok(trade) => {
                info!(
                    "Trade {} proposed by {} to {}",
                    trade.id, trade.proposer_id, trade.recipient_id
                );
                self.app.notifier.notify(Toast::success(
                    "Proposta enviada!",
                    "Sua proposta de troca foi enviada com sucesso.",
                ));
                Ok(Route::Catalog)
            }
            Err(e) => {
                error!("Failed to submit trade proposal: {:?}", e);
                self.app.notifier.notify(Toast::destructive(
                    "Erro",
                    "Não foi possível enviar a proposta. Tente novamente.",
                ));
                Err(TradeError::Backend(e))
            }
        }
    }
}
