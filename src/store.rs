//! Store abstraction over the managed backend.
//!
//! The workflows never talk to a concrete database; they depend on
//! [`Store`], whose `run_atomic` gives them the backend's transaction
//! primitive: all reads and writes inside the unit observe a single
//! consistent snapshot and commit together or not at all.
//! [`MemoryStore`] implements the same contract in memory and is what the
//! test suite runs against.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Account, AccountId, Listing, ListingId, PointsTransaction, SwapOrder, SwapOrderId};

/// Store-level failures, as opposed to domain preconditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store could not be reached; safe to retry with backoff.
    #[error("backing store unavailable")]
    Unavailable,
}

/// The four persisted collections, as seen inside a transaction.
///
/// Ledger and registry operations are defined as methods on this type so
/// that workflows can compose them inside one atomic unit.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub(crate) accounts: HashMap<AccountId, Account>,
    pub(crate) listings: HashMap<ListingId, Listing>,
    pub(crate) swap_orders: HashMap<SwapOrderId, SwapOrder>,
    /// Append-only audit log.
    pub(crate) transactions: Vec<PointsTransaction>,
}

/// Transactional access to the backing store.
pub trait Store: Send + Sync {
    /// Run `unit` against a consistent snapshot of the state. The unit
    /// commits only if it returns `Ok`; on `Err` nothing is durably
    /// written.
    fn run_atomic<T, E>(&self, unit: impl FnOnce(&mut State) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>;

    /// Point-in-time read with no side effects.
    fn read<T>(&self, read: impl FnOnce(&State) -> T) -> Result<T, StoreError>;
}

/// In-memory store with snapshot-and-swap transactions.
///
/// A mutex serializes units, so concurrent callers observe the
/// serializable behavior the workflows rely on; a unit mutates a copy of
/// the state which replaces the shared state only on commit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn run_atomic<T, E>(&self, unit: impl FnOnce(&mut State) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| E::from(StoreError::Unavailable))?;
        let mut draft = guard.clone();
        let value = unit(&mut draft)?;
        *guard = draft;
        Ok(value)
    }

    fn read<T>(&self, read: impl FnOnce(&State) -> T) -> Result<T, StoreError> {
        let guard = self.inner.lock().map_err(|_| StoreError::Unavailable)?;
        Ok(read(&guard))
    }
}

/// Sort key of the paginated queries: creation time with the id as
/// tie-breaker.
pub(crate) type SortKey = (i64, Uuid);

/// Nanosecond timestamp for sort keys. Saturates past the year 2262,
/// which only affects ordering between equally-saturated items.
pub(crate) fn time_key(at: chrono::DateTime<chrono::Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Opaque forward cursor: the sort key of the last item already seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub(crate) String);

impl Cursor {
    pub(crate) fn from_key((nanos, id): SortKey) -> Self {
        Cursor(format!("{nanos}:{id}"))
    }

    pub(crate) fn key(&self) -> Option<SortKey> {
        let (nanos, id) = self.0.split_once(':')?;
        Some((nanos.parse().ok()?, id.parse().ok()?))
    }
}

/// One page of a paginated query.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Present when more results may follow; feed back in to continue.
    pub next_cursor: Option<Cursor>,
}

/// Order `items` newest first and cut the page after `after`.
pub(crate) fn paginate<T>(
    mut items: Vec<T>,
    key: impl Fn(&T) -> SortKey,
    page_size: usize,
    after: Option<SortKey>,
) -> Page<T> {
    let page_size = page_size.max(1);
    items.sort_by(|a, b| key(b).cmp(&key(a)));
    if let Some(after) = after {
        items.retain(|item| key(item) < after);
    }
    let has_more = items.len() > page_size;
    items.truncate(page_size);
    let next_cursor = if has_more {
        items.last().map(|item| Cursor::from_key(key(item)))
    } else {
        None
    };
    Page { items, next_cursor }
}
