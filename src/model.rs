//! Core domain documents for the points marketplace.
//!
//! These are the persisted shapes of the `accounts`, `listings`,
//! `swapOrders` and `pointsTransactions` collections. Accounts are keyed
//! by the external auth subject; everything else gets a generated id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Points;

/// Account identifier: the opaque subject id issued by the identity
/// provider, not a generated id.
pub type AccountId = String;

/// Listing identifier.
pub type ListingId = Uuid;

/// Swap order identifier.
pub type SwapOrderId = Uuid;

/// Ledger entry identifier.
pub type TxId = Uuid;

/// A user account with its cached point balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Cached projection of the transaction log; kept in lockstep with it
    /// inside every mutating unit. Never negative.
    pub balance: Points,
    pub is_admin: bool,
    pub suspended: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: impl Into<AccountId>, is_admin: bool) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            balance: Points::ZERO,
            is_admin,
            suspended: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Moderation lifecycle of a listing.
///
/// `Rejected` and `Completed` are terminal; a completed item may later be
/// relisted as a new listing, never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListingStatus {
    /// Awaiting a moderation verdict.
    Pending,
    /// Cleared by moderation; the only redeemable state.
    Approved,
    /// Refused by moderation.
    Rejected,
    /// Redeemed and held in escrow while the swap is fulfilled.
    InTransit,
    /// Swap fulfilled.
    Completed,
}

impl ListingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ListingStatus::Rejected | ListingStatus::Completed)
    }
}

/// A single clothing item offered on the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub owner: AccountId,
    /// Redemption price. Items without one are open to direct swap only.
    pub point_value: Option<Points>,
    pub open_to_swap: bool,
    pub title: String,
    pub description: String,
    pub category: String,
    pub size: String,
    pub condition: String,
    pub tags: Vec<String>,
    /// Opaque blob-store references, in display order.
    pub images: Vec<String>,
    pub status: ListingStatus,
    pub moderation_notes: Option<String>,
    pub risk_score: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Draft of a listing as submitted by a lister, before the registry
/// assigns an id and the pending status.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub owner: AccountId,
    pub point_value: Option<Points>,
    pub open_to_swap: bool,
    pub title: String,
    pub description: String,
    pub category: String,
    pub size: String,
    pub condition: String,
    pub tags: Vec<String>,
    pub images: Vec<String>,
}

/// Kind of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Earned,
    Spent,
    Expired,
    Refunded,
}

/// One entry of the append-only points ledger.
///
/// The per-account sum of entry amounts always equals that account's
/// cached balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsTransaction {
    pub id: TxId,
    pub account: AccountId,
    /// Signed: credits are positive, debits negative.
    pub amount: Points,
    pub kind: TxKind,
    pub reason: String,
    /// The swap order this entry settles, if any.
    pub swap_order: Option<SwapOrderId>,
    pub created_at: DateTime<Utc>,
}

/// Fulfillment lifecycle of a swap order.
///
/// `Disputed` is reachable from any non-terminal state; `Completed` and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Completed,
    Disputed,
    /// Terminal failure state; the escrowed points were refunded.
    Cancelled,
}

impl SwapStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SwapStatus::Completed | SwapStatus::Cancelled)
    }
}

/// Shipping details attached by fulfillment once a swap is underway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub carrier: String,
    pub tracking_number: Option<String>,
}

/// The escrow record created when a redemption succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapOrder {
    pub id: SwapOrderId,
    pub listing: ListingId,
    pub buyer: AccountId,
    pub seller: AccountId,
    /// Escrowed amount, debited from the buyer at creation.
    pub points: Points,
    pub status: SwapStatus,
    pub shipping: Option<ShippingDetails>,
    pub dispute_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
