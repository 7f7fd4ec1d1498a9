//! crates/campus_swap_core/src/catalog.rs
//!
//! The catalog of available listings and its client-side filter.
//!
//! The whole result set is fetched once and filtered in memory; every change
//! to the search term, the category, or the source list recomputes the
//! filtered projection.

use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::{Listing, ListingWithOwner, ObjectCategory, UnknownVariant};
use crate::ports::Toast;
use crate::state::AppState;

//=========================================================================================
// Filter
//=========================================================================================

/// Anything the catalog filter can match against.
pub trait Searchable {
    fn title(&self) -> &str;
    fn description(&self) -> &str;
    fn category(&self) -> ObjectCategory;
}

impl Searchable for Listing {
    fn title(&self) -> &str {
        &self.title
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn category(&self) -> ObjectCategory {
        self.category
    }
}

impl Searchable for ListingWithOwner {
    fn title(&self) -> &str {
        &self.listing.title
    }

    fn description(&self) -> &str {
        &self.listing.description
    }

    fn category(&self) -> ObjectCategory {
        self.listing.category
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(ObjectCategory),
}

impl CategoryFilter {
    pub fn label(&self) -> &'static str {
        match self {
            CategoryFilter::All => "Todas as categorias",
            CategoryFilter::Only(category) => category.label(),
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = UnknownVariant;

    /// `"all"` (and the older `"todos"`) select every category.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" | "todos" => Ok(CategoryFilter::All),
            other => other.parse().map(CategoryFilter::Only),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub search_term: String,
    pub category: CategoryFilter,
}

impl CatalogFilter {
    pub fn new(search_term: impl Into<String>, category: CategoryFilter) -> Self {
        Self {
            search_term: search_term.into(),
            category,
        }
    }

    /// Case-insensitive substring match on title or description, and an exact
    /// category match unless the filter is `All`.
    pub fn matches<T: Searchable>(&self, item: &T) -> bool {
        let term = self.search_term.to_lowercase();
        let text_matches = term.is_empty()
            || item.title().to_lowercase().contains(&term)
            || item.description().to_lowercase().contains(&term);
        let category_matches = match self.category {
            CategoryFilter::All => true,
            CategoryFilter::Only(category) => item.category() == category,
        };
        text_matches && category_matches
    }

    /// The matching items, in their original order.
    pub fn apply<T: Searchable + Clone>(&self, items: &[T]) -> Vec<T> {
        items.iter().filter(|item| self.matches(*item)).cloned().collect()
    }
}

//=========================================================================================
// Catalog
//=========================================================================================

/// What the catalog grid should show.
#[derive(Debug, PartialEq)]
pub enum CatalogView<'a> {
    Loading,
    /// Nothing is listed at all.
    Empty,
    /// Listings exist but none match the current filter.
    NoMatches,
    Items(&'a [ListingWithOwner]),
}

pub struct Catalog {
    app: Arc<AppState>,
    source: Option<Vec<ListingWithOwner>>,
    filter: CatalogFilter,
    filtered: Vec<ListingWithOwner>,
}

impl Catalog {
    pub fn new(app: Arc<AppState>) -> Self {
        Self {
            app,
            source: None,
            filter: CatalogFilter::default(),
            filtered: Vec::new(),
        }
    }

    /// Fetches every available listing with its owner. On failure the catalog
    /// settles on an empty list and the user is told.
    pub async fn load(&mut self) {
        self.source = None;
        let listings = match self.app.db.list_available_listings().await {
            Ok(listings) => {
                info!("Loaded {} available listings", listings.len());
                listings
            }
            Err(e) => {
                error!("Failed to load listings: {:?}", e);
                self.app.notifier.notify(Toast::destructive(
                    "Erro ao carregar objetos",
                    "Ocorreu um erro ao buscar os objetos disponíveis.",
                ));
                Vec::new()
            }
        };
        self.set_source(listings);
    }

    pub fn set_source(&mut self, listings: Vec<ListingWithOwner>) {
        self.source = Some(listings);
        self.refilter();
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.filter.search_term = term.into();
        self.refilter();
    }

    pub fn set_category(&mut self, category: CategoryFilter) {
        self.filter.category = category;
        self.refilter();
    }

    pub fn filter(&self) -> &CatalogFilter {
        &self.filter
    }

    pub fn filtered(&self) -> &[ListingWithOwner] {
        &self.filtered
    }

    pub fn view(&self) -> CatalogView<'_> {
        match &self.source {
            None => CatalogView::Loading,
            Some(source) if source.is_empty() => CatalogView::Empty,
            Some(_) if self.filtered.is_empty() => CatalogView::NoMatches,
            Some(_) => CatalogView::Items(&self.filtered),
        }
    }

    fn refilter(&mut self) {
        self.filtered = match &self.source {
            Some(source) => self.filter.apply(source),
            None => Vec::new(),
        };
    }
}
