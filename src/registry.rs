//! Item Registry: listing storage, moderation status, and the browse
//! query consumed by the search UI.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::model::{AccountId, Listing, ListingId, ListingStatus, NewListing};
use crate::store::{Cursor, Page, State, Store, StoreError, paginate, time_key};

/// Error during a registry operation.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("listing {0} not found")]
    ListingNotFound(ListingId),

    #[error("cursor is not valid for this query")]
    InvalidCursor,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Conjunctive browse filter: every supplied predicate must match.
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    pub category: Option<String>,
    pub size: Option<String>,
    pub condition: Option<String>,
    pub status: Option<ListingStatus>,
    pub owner: Option<AccountId>,
}

impl ListingFilter {
    pub fn with_status(status: ListingStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    fn matches(&self, listing: &Listing) -> bool {
        self.category
            .as_deref()
            .is_none_or(|c| listing.category == c)
            && self.size.as_deref().is_none_or(|s| listing.size == s)
            && self
                .condition
                .as_deref()
                .is_none_or(|c| listing.condition == c)
            && self.status.is_none_or(|s| listing.status == s)
            && self.owner.as_deref().is_none_or(|o| listing.owner == o)
    }
}

/// Registry building blocks, composable inside any atomic unit.
impl State {
    /// Insert a new listing awaiting moderation. No point effects.
    pub fn create_listing(&mut self, draft: NewListing) -> ListingId {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.listings.insert(
            id,
            Listing {
                id,
                owner: draft.owner,
                point_value: draft.point_value,
                open_to_swap: draft.open_to_swap,
                title: draft.title,
                description: draft.description,
                category: draft.category,
                size: draft.size,
                condition: draft.condition,
                tags: draft.tags,
                images: draft.images,
                status: ListingStatus::Pending,
                moderation_notes: None,
                risk_score: 0.0,
                created_at: now,
                updated_at: now,
            },
        );
        debug!(%id, "listing created");
        id
    }

    pub fn listing(&self, id: &ListingId) -> Option<&Listing> {
        self.listings.get(id)
    }

    /// Listings matching `filter`, newest first, one page at a time.
    pub fn listings_page(
        &self,
        filter: &ListingFilter,
        page_size: usize,
        cursor: Option<&Cursor>,
    ) -> Result<Page<Listing>, RegistryError> {
        let after = match cursor {
            Some(cursor) => Some(cursor.key().ok_or(RegistryError::InvalidCursor)?),
            None => None,
        };
        let items: Vec<Listing> = self
            .listings
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        Ok(paginate(
            items,
            |l| (time_key(l.created_at), l.id),
            page_size,
            after,
        ))
    }

    /// Direct status write. Crate visibility keeps every caller outside
    /// the escrow and moderation workflows on the validated paths.
    pub(crate) fn set_listing_status(
        &mut self,
        id: &ListingId,
        status: ListingStatus,
        notes: Option<String>,
    ) -> Result<(), RegistryError> {
        let listing = self
            .listings
            .get_mut(id)
            .ok_or(RegistryError::ListingNotFound(*id))?;
        listing.status = status;
        if notes.is_some() {
            listing.moderation_notes = notes;
        }
        listing.updated_at = Utc::now();
        Ok(())
    }
}

/// Standalone registry interface: each operation is its own atomic unit.
#[derive(Debug)]
pub struct Registry<S> {
    store: Arc<S>,
}

impl<S> Clone for Registry<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> Registry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn create(&self, draft: NewListing) -> Result<ListingId, RegistryError> {
        self.store.run_atomic(|state| Ok(state.create_listing(draft)))
    }

    pub fn get(&self, id: &ListingId) -> Result<Listing, RegistryError> {
        self.store
            .read(|state| state.listing(id).cloned())?
            .ok_or(RegistryError::ListingNotFound(*id))
    }

    pub fn list(
        &self,
        filter: &ListingFilter,
        page_size: usize,
        cursor: Option<&Cursor>,
    ) -> Result<Page<Listing>, RegistryError> {
        self.store
            .read(|state| state.listings_page(filter, page_size, cursor))?
    }
}
