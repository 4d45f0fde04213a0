//! Moderation workflow: the admin approval gate every new listing must
//! pass before becoming redeemable.

use std::sync::Arc;

use tracing::info;

use crate::Points;
use crate::model::{AccountId, ListingId, ListingStatus};
use crate::store::{State, Store};

use super::RetryPolicy;
use super::error::ModerationError;

/// Fixed reward credited to the lister when an item clears moderation.
const APPROVAL_REWARD: Points = Points::new(50);
const APPROVAL_REASON: &str = "item listing approved";

/// Moderator verdict on a pending listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationVerdict {
    Approve,
    Reject,
}

/// Orchestrates listing approval and the associated lister reward.
#[derive(Debug)]
pub struct ModerationWorkflow<S> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S> Clone for ModerationWorkflow<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            retry: self.retry,
        }
    }
}

impl<S: Store> ModerationWorkflow<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Decide a pending listing.
    ///
    /// Approval flips the listing to approved and credits the lister the
    /// fixed reward; rejection only records the verdict and notes. The
    /// status flip and the reward commit as one unit. A listing that
    /// already received a verdict cannot be moderated again.
    pub async fn moderate(
        &self,
        listing_id: ListingId,
        moderator: &AccountId,
        verdict: ModerationVerdict,
        notes: Option<String>,
    ) -> Result<(), ModerationError> {
        self.retry
            .run(|| {
                let notes = notes.clone();
                self.store.run_atomic(|state| {
                    Self::decide(state, listing_id, moderator, verdict, notes)
                })
            })
            .await?;
        info!(listing = %listing_id, moderator = %moderator, ?verdict, "listing moderated");
        Ok(())
    }

    fn decide(
        state: &mut State,
        listing_id: ListingId,
        moderator: &str,
        verdict: ModerationVerdict,
        notes: Option<String>,
    ) -> Result<(), ModerationError> {
        let Some(moderator_account) = state.account(moderator) else {
            return Err(ModerationError::PermissionDenied(moderator.to_string()));
        };
        if !moderator_account.is_admin || moderator_account.suspended {
            return Err(ModerationError::PermissionDenied(moderator.to_string()));
        }

        let Some(listing) = state.listing(&listing_id) else {
            return Err(ModerationError::ListingNotFound(listing_id));
        };
        if listing.status != ListingStatus::Pending {
            return Err(ModerationError::AlreadyModerated(listing_id));
        }
        let owner = listing.owner.clone();

        let status = match verdict {
            ModerationVerdict::Approve => ListingStatus::Approved,
            ModerationVerdict::Reject => ListingStatus::Rejected,
        };
        state
            .set_listing_status(&listing_id, status, notes)
            .map_err(|_| ModerationError::ListingNotFound(listing_id))?;

        if verdict == ModerationVerdict::Approve {
            state.credit(&owner, APPROVAL_REWARD, APPROVAL_REASON, None)?;
        }
        Ok(())
    }
}
