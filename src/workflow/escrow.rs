//! Escrow workflow: redeeming an approved listing for points.
//!
//! This is the system's critical section. The buyer's debit, the swap
//! order creation and the listing status flip must commit as one
//! indivisible unit; a partial application would leave a buyer who paid
//! for an item still marked approved and re-redeemable by someone else.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::ledger::LedgerError;
use crate::model::{
    AccountId, ListingId, ListingStatus, SwapOrder, SwapOrderId, SwapStatus, TxId,
};
use crate::store::{State, Store};

use super::RetryPolicy;
use super::error::{FulfillmentError, RedemptionError};

/// Reason recorded on the escrow debit.
const ESCROW_REASON: &str = "item purchase (escrowed)";
/// Reason recorded when escrowed points return to the buyer.
const REFUND_REASON: &str = "swap refund";

impl State {
    /// Swap order read, for fulfillment and the order-detail views.
    pub fn swap_order(&self, id: &SwapOrderId) -> Option<&SwapOrder> {
        self.swap_orders.get(id)
    }
}

/// Moves points into escrow when a swap is requested, and releases them
/// if the swap falls through.
#[derive(Debug)]
pub struct EscrowWorkflow<S> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S> Clone for EscrowWorkflow<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            retry: self.retry,
        }
    }
}

impl<S: Store> EscrowWorkflow<S> {
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

    /// Redeem `listing_id` for `buyer`, escrowing its point value.
    ///
    /// Preconditions are re-read inside the transaction, never from a
    /// stale cache: the listing must be approved with a positive point
    /// value, and the buyer must exist, be in good standing, and cover
    /// the price. Of two concurrent redemptions of one listing at most
    /// one succeeds; the other observes the flipped status and fails
    /// with [`RedemptionError::ItemUnavailable`].
    pub async fn request_redemption(
        &self,
        listing_id: ListingId,
        buyer: &AccountId,
    ) -> Result<SwapOrderId, RedemptionError> {
        let order_id = self
            .retry
            .run(|| {
                self.store
                    .run_atomic(|state| Self::redeem(state, listing_id, buyer))
            })
            .await?;
        info!(listing = %listing_id, buyer = %buyer, order = %order_id, "redemption escrowed");
        Ok(order_id)
    }

    fn redeem(
        state: &mut State,
        listing_id: ListingId,
        buyer: &str,
    ) -> Result<SwapOrderId, RedemptionError> {
        let Some(listing) = state.listing(&listing_id) else {
            return Err(RedemptionError::ItemUnavailable(listing_id));
        };
        if listing.status != ListingStatus::Approved {
            return Err(RedemptionError::ItemUnavailable(listing_id));
        }
        let Some(value) = listing.point_value.filter(|v| v.is_positive()) else {
            return Err(RedemptionError::NoPointValue(listing_id));
        };
        let seller = listing.owner.clone();

        let Some(account) = state.account(buyer) else {
            return Err(LedgerError::AccountNotFound(buyer.to_string()).into());
        };
        if account.suspended {
            return Err(RedemptionError::AccountSuspended(buyer.to_string()));
        }

        let order_id = Uuid::new_v4();
        state.debit(buyer, value, ESCROW_REASON, Some(order_id))?;

        let now = Utc::now();
        state.swap_orders.insert(
            order_id,
            SwapOrder {
                id: order_id,
                listing: listing_id,
                buyer: buyer.to_string(),
                seller,
                points: value,
                status: SwapStatus::Pending,
                shipping: None,
                dispute_reason: None,
                created_at: now,
                updated_at: now,
            },
        );

        state
            .set_listing_status(&listing_id, ListingStatus::InTransit, None)
            .map_err(|_| RedemptionError::ItemUnavailable(listing_id))?;

        Ok(order_id)
    }

    /// Move a non-terminal order into the disputed branch.
    pub async fn mark_disputed(
        &self,
        order_id: SwapOrderId,
        reason: &str,
    ) -> Result<(), FulfillmentError> {
        self.retry
            .run(|| {
                self.store.run_atomic(|state| {
                    let order = state
                        .swap_orders
                        .get_mut(&order_id)
                        .ok_or(FulfillmentError::OrderNotFound(order_id))?;
                    if order.status.is_terminal() {
                        return Err(FulfillmentError::InvalidState(order_id));
                    }
                    order.status = SwapStatus::Disputed;
                    order.dispute_reason = Some(reason.to_string());
                    order.updated_at = Utc::now();
                    Ok(())
                })
            })
            .await?;
        info!(order = %order_id, reason, "swap disputed");
        Ok(())
    }

    /// Release the escrowed points of a disputed swap back to the buyer.
    ///
    /// The buyer is credited with a `refunded` ledger entry, the order
    /// moves to the terminal cancelled state, and the listing returns to
    /// approved (the garment never moved, so it goes back on the
    /// market). All three commit as one unit.
    pub async fn refund(&self, order_id: SwapOrderId) -> Result<TxId, FulfillmentError> {
        let tx = self
            .retry
            .run(|| {
                self.store
                    .run_atomic(|state| Self::release(state, order_id))
            })
            .await?;
        info!(order = %order_id, "escrow refunded");
        Ok(tx)
    }

    fn release(state: &mut State, order_id: SwapOrderId) -> Result<TxId, FulfillmentError> {
        let Some(order) = state.swap_orders.get(&order_id) else {
            return Err(FulfillmentError::OrderNotFound(order_id));
        };
        if order.status != SwapStatus::Disputed {
            return Err(FulfillmentError::InvalidState(order_id));
        }
        let buyer = order.buyer.clone();
        let amount = order.points;
        let listing_id = order.listing;

        let tx = state.refund_credit(&buyer, amount, REFUND_REASON, Some(order_id))?;
        state
            .set_listing_status(&listing_id, ListingStatus::Approved, None)
            .map_err(|_| FulfillmentError::ListingMissing(listing_id))?;

        let order = state
            .swap_orders
            .get_mut(&order_id)
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;
        order.status = SwapStatus::Cancelled;
        order.updated_at = Utc::now();

        Ok(tx)
    }
}
