//! crates/campus_swap_core/src/listing.rs
//!
//! Listing lifecycle: composing and publishing a new listing (with its image
//! uploads), the detail view, and the owner's own listings.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{Listing, ListingWithOwner, NewListing, ObjectCategory, ObjectStatus};
use crate::input::{
    clamp_chars, CONDITION_MAX_CHARS, DESCRIPTION_MAX_CHARS, TITLE_MAX_CHARS,
};
use crate::navigation::{Redirect, Route};
use crate::ports::{PortError, Toast};
use crate::state::AppState;

pub const MAX_IMAGES: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("title, description, category and condition are all required")]
    MissingFields,
    #[error("at most {max} images per listing ({attempted} selected)")]
    TooManyImages { max: usize, attempted: usize },
    #[error("image upload failed: {0}")]
    Upload(#[source] PortError),
    #[error("listing insert failed: {0}")]
    Insert(#[source] PortError),
}

//=========================================================================================
// Draft
//=========================================================================================

/// An image picked by the user, not uploaded yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl ImageFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    /// Text after the last dot; the whole name when there is none.
    pub fn extension(&self) -> &str {
        self.file_name.rsplit('.').next().unwrap_or(&self.file_name)
    }
}

/// The create-listing form.
#[derive(Debug, Clone, Default)]
pub struct ListingDraft {
    title: String,
    description: String,
    category: Option<ObjectCategory>,
    condition: String,
    images: Vec<ImageFile>,
}

impl ListingDraft {
    pub fn set_title(&mut self, title: &str) {
        self.title = clamp_chars(title, TITLE_MAX_CHARS);
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = clamp_chars(description, DESCRIPTION_MAX_CHARS);
    }

    pub fn set_category(&mut self, category: ObjectCategory) {
        self.category = Some(category);
    }

    pub fn set_condition(&mut self, condition: &str) {
        self.condition = clamp_chars(condition, CONDITION_MAX_CHARS);
    }

    /// Adds a batch of images. A batch that would go over the cap is rejected
    /// whole and the current selection is left untouched.
    pub fn add_images(&mut self, files: Vec<ImageFile>) -> Result<(), ListingError> {
        let attempted = self.images.len() + files.len();
        if attempted > MAX_IMAGES {
            return Err(ListingError::TooManyImages {
                max: MAX_IMAGES,
                attempted,
            });
        }
        self.images.extend(files);
        Ok(())
    }

    pub fn remove_image(&mut self, index: usize) -> Option<ImageFile> {
        (index < self.images.len()).then(|| self.images.remove(index))
    }

    pub fn images(&self) -> &[ImageFile] {
        &self.images
    }

    pub fn validate(&self) -> Result<ObjectCategory, ListingError> {
        let texts_present = [&self.title, &self.description, &self.condition]
            .iter()
            .all(|field| !field.trim().is_empty());
        match self.category {
            Some(category) if texts_present => Ok(category),
            _ => Err(ListingError::MissingFields),
        }
    }
}

//=========================================================================================
// Composer
//=========================================================================================

/// Publishes a `ListingDraft` on behalf of `owner_id`.
pub struct ListingComposer {
    app: Arc<AppState>,
    owner_id: Uuid,
    draft: ListingDraft,
    submitting: bool,
}

impl ListingComposer {
    pub fn new(app: Arc<AppState>, owner_id: Uuid) -> Self {
        Self {
            app,
            owner_id,
            draft: ListingDraft::default(),
            submitting: false,
        }
    }

    pub fn draft(&self) -> &ListingDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut ListingDraft {
        &mut self.draft
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// `ListingDraft::add_images`, telling the user when the cap is hit.
    pub fn add_images(&mut self, files: Vec<ImageFile>) -> Result<(), ListingError> {
        self.draft.add_images(files).inspect_err(|_| {
            self.app.notifier.notify(Toast::destructive(
                "Limite de imagens",
                format!("Você pode adicionar no máximo {} imagens.", MAX_IMAGES),
            ));
        })
    }

    /// Uploads every image in order, then inserts the listing as available.
    /// The first failure stops everything; nothing is inserted.
    /// Returns the detail route of the new listing.
    pub async fn submit(&mut self) -> Result<Route, ListingError> {
        let category = match self.draft.validate() {
            Ok(category) => category,
            Err(e) => {
                self.app.notifier.notify(Toast::destructive(
                    "Campos obrigatórios",
                    "Preencha todos os campos obrigatórios.",
                ));
                return Err(e);
            }
        };

        self.submitting = true;
        let result = self.publish(category).await;
        self.submitting = false;

        match result {
            Ok(listing) => {
                info!("Published listing {} for {}", listing.id, self.owner_id);
                self.app.notifier.notify(Toast::success(
                    "Objeto cadastrado!",
                    "Seu objeto foi publicado com sucesso.",
                ));
                Ok(Route::ListingDetail(listing.id))
            }
            Err(e) => {
                error!("Failed to publish listing: {:?}", e);
                self.app.notifier.notify(Toast::destructive(
                    "Erro ao cadastrar",
                    "Ocorreu um erro ao publicar seu objeto.",
                ));
                Err(e)
            }
        }
    }

    async fn publish(&self, category: ObjectCategory) -> Result<Listing, ListingError> {
        let images = self.upload_images().await?;
        let new_listing = NewListing {
            owner_id: self.owner_id,
            title: self.draft.title.clone(),
            description: self.draft.description.clone(),
            category,
            condition: self.draft.condition.clone(),
            images,
            status: ObjectStatus::Available,
        };
        self.app
            .db
            .insert_listing(new_listing)
            .await
            .map_err(ListingError::Insert)
    }

    async fn upload_images(&self) -> Result<Vec<String>, ListingError> {
        let mut urls = Vec::with_capacity(self.draft.images.len());
        for image in &self.draft.images {
            let path = storage_path(self.owner_id, image);
            self.app
                .storage
                .upload(&path, image.data.clone(), &image.content_type)
                .await
                .map_err(ListingError::Upload)?;
            urls.push(self.app.storage.public_url(&path));
        }
        Ok(urls)
    }
}

/// `{owner}/{random}.{ext}`. The random part only avoids collisions.
fn storage_path(owner_id: Uuid, image: &ImageFile) -> String {
    format!("{}/{}.{}", owner_id, Uuid::new_v4().simple(), image.extension())
}

//=========================================================================================
// Detail
//=========================================================================================

pub struct ListingDetail {
    pub listing: ListingWithOwner,
    viewer_id: Option<Uuid>,
    current_image: usize,
}

impl ListingDetail {
    pub async fn load(
        app: &AppState,
        listing_id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> Result<Self, Redirect> {
        match app.db.get_listing_with_owner(listing_id).await {
            Ok(listing) => Ok(Self {
                listing,
                viewer_id,
                current_image: 0,
            }),
            Err(e) => {
                error!("Failed to load listing {}: {:?}", listing_id, e);
                app.notifier.notify(Toast::destructive(
                    "Erro",
                    "Não foi possível carregar os detalhes do objeto.",
                ));
                Err(Redirect::new(Route::Catalog, e))
            }
        }
    }

    pub fn is_owner(&self) -> bool {
        self.viewer_id == Some(self.listing.listing.owner_id)
    }

    /// Signed-in non-owners may propose a trade while the listing is available.
    pub fn can_propose_trade(&self) -> bool {
        self.viewer_id.is_some()
            && !self.is_owner()
            && self.listing.listing.status == ObjectStatus::Available
    }

    pub fn propose_route(&self) -> Option<Route> {
        self.can_propose_trade()
            .then(|| Route::ProposeTrade(self.listing.listing.id))
    }

    pub fn current_image(&self) -> Option<&str> {
        self.listing
            .listing
            .images
            .get(self.current_image)
            .map(String::as_str)
    }

    pub fn select_image(&mut self, index: usize) -> bool {
        if index < self.listing.listing.images.len() {
            self.current_image = index;
            true
        } else {
            warn!("Image index {} out of range", index);
            false
        }
    }
}

//=========================================================================================
// My Listings
//=========================================================================================

/// The owner's own listings, grouped by status tab on demand.
pub struct MyListings {
    app: Arc<AppState>,
    owner_id: Uuid,
    listings: Option<Vec<Listing>>,
}

impl MyListings {
    pub fn new(app: Arc<AppState>, owner_id: Uuid) -> Self {
        Self {
            app,
            owner_id,
            listings: None,
        }
    }

    pub async fn load(&mut self) {
        match self.app.db.list_listings_by_owner(self.owner_id, None).await {
            Ok(listings) => self.listings = Some(listings),
            Err(e) => {
                error!("Failed to load listings of {}: {:?}", self.owner_id, e);
                self.app.notifier.notify(Toast::destructive(
                    "Erro ao carregar objetos",
                    "Não foi possível carregar seus objetos.",
                ));
                self.listings = Some(Vec::new());
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.listings.is_none()
    }

    /// `None` is the "all" tab.
    pub fn by_status(&self, status: Option<ObjectStatus>) -> Vec<&Listing> {
        self.listings
            .iter()
            .flatten()
            .filter(|l| status.map_or(true, |s| l.status == s))
            .collect()
    }
}
