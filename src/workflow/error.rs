//! Error types for the escrow and moderation workflows.

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::model::{AccountId, ListingId, SwapOrderId};
use crate::store::StoreError;

use super::Transient;

/// Error during a redemption request.
#[derive(Debug, Error)]
pub enum RedemptionError {
    /// The listing is missing or not currently approved for redemption.
    #[error("listing {0} is not available for redemption")]
    ItemUnavailable(ListingId),

    /// Direct-swap-only items cannot be redeemed for points.
    #[error("listing {0} has no point value")]
    NoPointValue(ListingId),

    #[error("account {0} is suspended")]
    AccountSuspended(AccountId),

    #[error("redemption failed: {0}")]
    Ledger(#[from] LedgerError),
}

impl From<StoreError> for RedemptionError {
    fn from(e: StoreError) -> Self {
        RedemptionError::Ledger(LedgerError::Store(e))
    }
}

impl Transient for RedemptionError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            RedemptionError::Ledger(LedgerError::Store(StoreError::Unavailable))
        )
    }
}

/// Error during a moderation verdict.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("listing {0} not found")]
    ListingNotFound(ListingId),

    /// The listing already received a verdict; moderation is not
    /// re-entrant, so a second approval can never award the reward twice.
    #[error("listing {0} has already been moderated")]
    AlreadyModerated(ListingId),

    #[error("account {0} is not allowed to moderate listings")]
    PermissionDenied(AccountId),

    #[error("moderation failed: {0}")]
    Ledger(#[from] LedgerError),
}

impl From<StoreError> for ModerationError {
    fn from(e: StoreError) -> Self {
        ModerationError::Ledger(LedgerError::Store(e))
    }
}

impl Transient for ModerationError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            ModerationError::Ledger(LedgerError::Store(StoreError::Unavailable))
        )
    }
}

/// Error during the fulfillment-facing swap transitions.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("swap order {0} not found")]
    OrderNotFound(SwapOrderId),

    /// The order's current status does not permit the requested
    /// transition.
    #[error("swap order {0} does not permit this transition")]
    InvalidState(SwapOrderId),

    #[error("listing {0} referenced by the swap order is missing")]
    ListingMissing(ListingId),

    #[error("refund failed: {0}")]
    Ledger(#[from] LedgerError),
}

impl From<StoreError> for FulfillmentError {
    fn from(e: StoreError) -> Self {
        FulfillmentError::Ledger(LedgerError::Store(e))
    }
}

impl Transient for FulfillmentError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            FulfillmentError::Ledger(LedgerError::Store(StoreError::Unavailable))
        )
    }
}
