//! Ledger Store: per-account point balances plus the append-only
//! transaction log.
//!
//! The balance on an account is a cached projection of the log; both are
//! updated inside the same atomic unit, so the per-account sum of entries
//! always equals the cached balance. The `State` methods are building
//! blocks meant to be composed into larger units by the workflows;
//! [`Ledger`] wraps each of them in its own transaction for standalone
//! callers.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::Points;
use crate::model::{Account, AccountId, PointsTransaction, SwapOrderId, TxId, TxKind};
use crate::store::{Cursor, Page, State, Store, StoreError, paginate, time_key};

/// Error during a ledger operation.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("insufficient balance for account {0}: balance {1}, requested {2}")]
    InsufficientBalance(AccountId, Points, Points),

    #[error("ledger amounts must be positive, got {0}")]
    NonPositiveAmount(Points),

    #[error("cursor is not valid for this query")]
    InvalidCursor,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of the operational balance-vs-log cross-check.
#[derive(Debug, Clone)]
pub struct LedgerAudit {
    pub account: AccountId,
    pub balance: Points,
    pub ledger_total: Points,
}

impl LedgerAudit {
    pub fn consistent(&self) -> bool {
        self.balance == self.ledger_total
    }
}

/// Ledger building blocks, composable inside any atomic unit.
impl State {
    /// Get-or-create an account keyed on the external auth subject.
    /// Re-registering an existing subject leaves it untouched.
    pub fn register_account(&mut self, subject: &str, is_admin: bool) -> &Account {
        self.accounts
            .entry(subject.to_string())
            .or_insert_with(|| Account::new(subject, is_admin))
    }

    pub fn account(&self, id: &str) -> Option<&Account> {
        self.accounts.get(id)
    }

    fn account_mut(&mut self, id: &str) -> Result<&mut Account, LedgerError> {
        self.accounts
            .get_mut(id)
            .ok_or_else(|| LedgerError::AccountNotFound(id.to_string()))
    }

    pub fn set_suspended(&mut self, account: &str, suspended: bool) -> Result<(), LedgerError> {
        let account = self.account_mut(account)?;
        account.suspended = suspended;
        account.updated_at = Utc::now();
        Ok(())
    }

    /// Increase `account`'s balance and append an `earned` entry.
    pub fn credit(
        &mut self,
        account: &str,
        amount: Points,
        reason: &str,
        swap_order: Option<SwapOrderId>,
    ) -> Result<TxId, LedgerError> {
        self.apply_credit(account, amount, TxKind::Earned, reason, swap_order)
    }

    /// Credit recorded as a `refunded` entry; used by the escrow release
    /// path.
    pub(crate) fn refund_credit(
        &mut self,
        account: &str,
        amount: Points,
        reason: &str,
        swap_order: Option<SwapOrderId>,
    ) -> Result<TxId, LedgerError> {
        self.apply_credit(account, amount, TxKind::Refunded, reason, swap_order)
    }

    fn apply_credit(
        &mut self,
        account: &str,
        amount: Points,
        kind: TxKind,
        reason: &str,
        swap_order: Option<SwapOrderId>,
    ) -> Result<TxId, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount(amount));
        }

        let entry = self.account_mut(account)?;
        entry.balance += amount;
        entry.updated_at = Utc::now();

        let id = Uuid::new_v4();
        self.transactions.push(PointsTransaction {
            id,
            account: account.to_string(),
            amount,
            kind,
            reason: reason.to_string(),
            swap_order,
            created_at: Utc::now(),
        });
        debug!(account, %amount, ?kind, "ledger entry appended");
        Ok(id)
    }

    /// Decrease `account`'s balance and append a `spent` entry with a
    /// negative amount. The balance never goes below zero; a debit that
    /// would is refused and leaves the account unchanged.
    pub fn debit(
        &mut self,
        account: &str,
        amount: Points,
        reason: &str,
        swap_order: Option<SwapOrderId>,
    ) -> Result<TxId, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount(amount));
        }

        let entry = self.account_mut(account)?;
        if entry.balance < amount {
            return Err(LedgerError::InsufficientBalance(
                account.to_string(),
                entry.balance,
                amount,
            ));
        }
        entry.balance -= amount;
        entry.updated_at = Utc::now();

        let id = Uuid::new_v4();
        self.transactions.push(PointsTransaction {
            id,
            account: account.to_string(),
            amount: -amount,
            kind: TxKind::Spent,
            reason: reason.to_string(),
            swap_order,
            created_at: Utc::now(),
        });
        debug!(account, %amount, "ledger entry appended");
        Ok(id)
    }

    /// Point-in-time balance read.
    pub fn balance(&self, account: &str) -> Result<Points, LedgerError> {
        self.account(account)
            .map(|a| a.balance)
            .ok_or_else(|| LedgerError::AccountNotFound(account.to_string()))
    }

    /// Ledger entries for `account`, newest first.
    pub fn history(
        &self,
        account: &str,
        page_size: usize,
        cursor: Option<&Cursor>,
    ) -> Result<Page<PointsTransaction>, LedgerError> {
        if self.account(account).is_none() {
            return Err(LedgerError::AccountNotFound(account.to_string()));
        }
        let after = match cursor {
            Some(cursor) => Some(cursor.key().ok_or(LedgerError::InvalidCursor)?),
            None => None,
        };
        let entries: Vec<PointsTransaction> = self
            .transactions
            .iter()
            .filter(|t| t.account == account)
            .cloned()
            .collect();
        Ok(paginate(
            entries,
            |t| (time_key(t.created_at), t.id),
            page_size,
            after,
        ))
    }

    /// Cross-check the cached balance against the transaction-log sum.
    pub fn reconcile(&self, account: &str) -> Result<LedgerAudit, LedgerError> {
        let balance = self.balance(account)?;
        let ledger_total = self
            .transactions
            .iter()
            .filter(|t| t.account == account)
            .map(|t| t.amount)
            .sum();
        Ok(LedgerAudit {
            account: account.to_string(),
            balance,
            ledger_total,
        })
    }
}

/// Standalone ledger interface: each operation is its own atomic unit.
#[derive(Debug)]
pub struct Ledger<S> {
    store: Arc<S>,
}

impl<S> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> Ledger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn register_account(
        &self,
        subject: &str,
        is_admin: bool,
    ) -> Result<Account, LedgerError> {
        self.store
            .run_atomic(|state| Ok(state.register_account(subject, is_admin).clone()))
    }

    pub fn set_suspended(&self, account: &str, suspended: bool) -> Result<(), LedgerError> {
        self.store
            .run_atomic(|state| state.set_suspended(account, suspended))
    }

    pub fn credit(&self, account: &str, amount: Points, reason: &str) -> Result<TxId, LedgerError> {
        self.store
            .run_atomic(|state| state.credit(account, amount, reason, None))
    }

    pub fn debit(&self, account: &str, amount: Points, reason: &str) -> Result<TxId, LedgerError> {
        self.store
            .run_atomic(|state| state.debit(account, amount, reason, None))
    }

    pub fn balance(&self, account: &str) -> Result<Points, LedgerError> {
        self.store.read(|state| state.balance(account))?
    }

    pub fn history(
        &self,
        account: &str,
        page_size: usize,
        cursor: Option<&Cursor>,
    ) -> Result<Page<PointsTransaction>, LedgerError> {
        self.store
            .read(|state| state.history(account, page_size, cursor))?
    }

    pub fn reconcile(&self, account: &str) -> Result<LedgerAudit, LedgerError> {
        self.store.read(|state| state.reconcile(account))?
    }
}
