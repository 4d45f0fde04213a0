//! End-to-end tests over the public API, against the in-memory store.

use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use rewear_core::model::NewListing;
use rewear_core::store::State;
use rewear_core::{
    EscrowWorkflow, Ledger, LedgerError, ListingFilter, ListingStatus, MemoryStore,
    ModerationVerdict, ModerationWorkflow, Points, RedemptionError, Registry, RetryPolicy, Store,
    StoreError, SwapStatus, TxKind, estimate_impact,
};

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn draft(owner: &str, point_value: Option<Points>) -> NewListing {
    NewListing {
        owner: owner.to_string(),
        point_value,
        open_to_swap: point_value.is_none(),
        title: "Denim jacket".to_string(),
        description: "Lightly worn, straight cut".to_string(),
        category: "outerwear".to_string(),
        size: "M".to_string(),
        condition: "good".to_string(),
        tags: vec!["denim".to_string()],
        images: vec!["blob://jacket-front".to_string(), "blob://jacket-back".to_string()],
    }
}

struct Marketplace {
    store: Arc<MemoryStore>,
    ledger: Ledger<MemoryStore>,
    registry: Registry<MemoryStore>,
    escrow: EscrowWorkflow<MemoryStore>,
    moderation: ModerationWorkflow<MemoryStore>,
}

fn marketplace() -> Marketplace {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    Marketplace {
        ledger: Ledger::new(store.clone()),
        registry: Registry::new(store.clone()),
        escrow: EscrowWorkflow::new(store.clone()),
        moderation: ModerationWorkflow::new(store.clone()),
        store,
    }
}

#[tokio::test]
async fn full_listing_lifecycle() {
    let m = marketplace();
    m.ledger.register_account("admin", true).unwrap();
    m.ledger.register_account("seller", false).unwrap();
    m.ledger.register_account("buyer", false).unwrap();
    m.ledger
        .credit("buyer", Points::new(200), "welcome bonus")
        .unwrap();

    // Seller lists an item; it waits in the moderation queue.
    let listing_id = m.registry.create(draft("seller", Some(Points::new(150)))).unwrap();
    let pending = m
        .registry
        .list(&ListingFilter::with_status(ListingStatus::Pending), 10, None)
        .unwrap();
    assert_eq!(pending.items.len(), 1);

    // Admin approves: the item becomes browsable and the seller earns
    // the listing reward.
    m.moderation
        .moderate(
            listing_id,
            &"admin".to_string(),
            ModerationVerdict::Approve,
            None,
        )
        .await
        .unwrap();
    assert_eq!(m.ledger.balance("seller").unwrap(), Points::new(50));
    assert_eq!(
        m.registry.get(&listing_id).unwrap().status,
        ListingStatus::Approved
    );

    // Buyer redeems it.
    let order_id = m
        .escrow
        .request_redemption(listing_id, &"buyer".to_string())
        .await
        .unwrap();
    assert_eq!(m.ledger.balance("buyer").unwrap(), Points::new(50));
    assert_eq!(
        m.registry.get(&listing_id).unwrap().status,
        ListingStatus::InTransit
    );

    let order = m
        .store
        .read(|state: &State| state.swap_order(&order_id).cloned())
        .unwrap()
        .expect("order exists");
    assert_eq!(order.status, SwapStatus::Pending);
    assert_eq!(order.buyer, "buyer");
    assert_eq!(order.seller, "seller");
    assert_eq!(order.points, Points::new(150));

    // The buyer's history leads with the escrow debit.
    let history = m.ledger.history("buyer", 10, None).unwrap();
    assert_eq!(history.items[0].amount, Points::new(-150));
    assert_eq!(history.items[0].kind, TxKind::Spent);
    assert_eq!(history.items[0].swap_order, Some(order_id));

    // Cached balances and the audit log agree for everyone.
    for account in ["admin", "seller", "buyer"] {
        assert!(m.ledger.reconcile(account).unwrap().consistent());
    }

    // Dashboard math for one completed exchange.
    let impact = estimate_impact(1);
    assert_eq!(impact.co2_saved_kg, 8.5);
}

#[tokio::test]
async fn rejection_paths_leave_no_trace_in_the_ledger() {
    let m = marketplace();
    m.ledger.register_account("admin", true).unwrap();
    m.ledger.register_account("seller", false).unwrap();

    let listing_id = m.registry.create(draft("seller", Some(Points::new(150)))).unwrap();
    m.moderation
        .moderate(
            listing_id,
            &"admin".to_string(),
            ModerationVerdict::Reject,
            Some("low quality images".to_string()),
        )
        .await
        .unwrap();

    let listing = m.registry.get(&listing_id).unwrap();
    assert_eq!(listing.status, ListingStatus::Rejected);
    assert_eq!(listing.moderation_notes.as_deref(), Some("low quality images"));
    assert_eq!(m.ledger.balance("seller").unwrap(), Points::ZERO);
    assert!(m.ledger.history("seller", 10, None).unwrap().items.is_empty());

    // A rejected item can never be redeemed.
    m.ledger.register_account("buyer", false).unwrap();
    m.ledger.credit("buyer", Points::new(500), "seed").unwrap();
    let result = m
        .escrow
        .request_redemption(listing_id, &"buyer".to_string())
        .await;
    assert!(matches!(result, Err(RedemptionError::ItemUnavailable(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redemptions_of_one_listing_admit_exactly_one_winner() {
    let m = marketplace();
    m.ledger.register_account("admin", true).unwrap();
    m.ledger.register_account("seller", false).unwrap();

    let listing_id = m.registry.create(draft("seller", Some(Points::new(100)))).unwrap();
    m.moderation
        .moderate(
            listing_id,
            &"admin".to_string(),
            ModerationVerdict::Approve,
            None,
        )
        .await
        .unwrap();

    let buyers: Vec<String> = (0..8).map(|i| format!("buyer-{i}")).collect();
    for buyer in &buyers {
        m.ledger.register_account(buyer, false).unwrap();
        m.ledger.credit(buyer, Points::new(100), "seed").unwrap();
    }

    let mut handles = Vec::new();
    for buyer in buyers.clone() {
        let escrow = m.escrow.clone();
        handles.push(tokio::spawn(async move {
            escrow.request_redemption(listing_id, &buyer).await
        }));
    }

    let mut winners = 0;
    let mut unavailable = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(RedemptionError::ItemUnavailable(_)) => unavailable += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1, "exactly one redemption may succeed");
    assert_eq!(unavailable, buyers.len() - 1);

    // Exactly one buyer paid; everyone else kept their points.
    let paid = buyers
        .iter()
        .filter(|b| m.ledger.balance(b).unwrap() == Points::ZERO)
        .count();
    assert_eq!(paid, 1);
    for buyer in &buyers {
        assert!(m.ledger.reconcile(buyer).unwrap().consistent());
    }
}

#[tokio::test]
async fn browse_reads_are_idempotent() {
    let m = marketplace();
    m.ledger.register_account("seller", false).unwrap();
    for _ in 0..3 {
        m.registry.create(draft("seller", Some(Points::new(10)))).unwrap();
    }

    let filter = ListingFilter::default();
    let first = m.registry.list(&filter, 10, None).unwrap();
    let second = m.registry.list(&filter, 10, None).unwrap();
    let first_ids: Vec<_> = first.items.iter().map(|l| l.id).collect();
    let second_ids: Vec<_> = second.items.iter().map(|l| l.id).collect();
    assert_eq!(first_ids, second_ids);
}

/// Store wrapper that reports the backend as unreachable for the first
/// `failures` transactions, then recovers.
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicU32,
}

impl FlakyStore {
    fn new(failures: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures: AtomicU32::new(failures),
        }
    }

    fn trip(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Store for FlakyStore {
    fn run_atomic<T, E>(&self, unit: impl FnOnce(&mut State) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        if self.trip() {
            return Err(E::from(StoreError::Unavailable));
        }
        self.inner.run_atomic(unit)
    }

    fn read<T>(&self, read: impl FnOnce(&State) -> T) -> Result<T, StoreError> {
        self.inner.read(read)
    }
}

async fn seed_flaky(store: &Arc<FlakyStore>) -> rewear_core::ListingId {
    init_tracing();
    let ledger = Ledger::new(store.clone());
    ledger.register_account("admin", true).unwrap();
    ledger.register_account("seller", false).unwrap();
    ledger.register_account("buyer", false).unwrap();
    ledger.credit("buyer", Points::new(200), "seed").unwrap();

    let registry = Registry::new(store.clone());
    let listing_id = registry.create(draft("seller", Some(Points::new(150)))).unwrap();
    ModerationWorkflow::new(store.clone())
        .moderate(
            listing_id,
            &"admin".to_string(),
            ModerationVerdict::Approve,
            None,
        )
        .await
        .unwrap();
    listing_id
}

#[tokio::test]
async fn redemption_retries_through_transient_store_failures() {
    let store = Arc::new(FlakyStore::new(0));
    let listing_id = seed_flaky(&store).await;

    // Two outages: the third attempt of the default policy lands.
    store.failures.store(2, Ordering::SeqCst);
    let escrow = EscrowWorkflow::new(store.clone()).with_retry_policy(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    });
    escrow
        .request_redemption(listing_id, &"buyer".to_string())
        .await
        .unwrap();

    assert_eq!(
        Ledger::new(store.clone()).balance("buyer").unwrap(),
        Points::new(50)
    );
}

#[tokio::test]
async fn redemption_surfaces_exhausted_retries() {
    let store = Arc::new(FlakyStore::new(0));
    let listing_id = seed_flaky(&store).await;

    store.failures.store(3, Ordering::SeqCst);
    let escrow = EscrowWorkflow::new(store.clone()).with_retry_policy(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    });
    let result = escrow
        .request_redemption(listing_id, &"buyer".to_string())
        .await;
    assert!(matches!(
        result,
        Err(RedemptionError::Ledger(LedgerError::Store(StoreError::Unavailable)))
    ));

    // The failed attempts never touched the balance.
    assert_eq!(
        Ledger::new(store.clone()).balance("buyer").unwrap(),
        Points::new(200)
    );
}

#[tokio::test]
async fn precondition_failure_after_outage_leaves_no_partial_writes() {
    let store = Arc::new(FlakyStore::new(0));
    let listing_id = seed_flaky(&store).await;

    // Drain the buyer, then put one outage in front of the redemption:
    // the retry recovers from the outage and the precondition failure
    // surfaces with nothing written.
    Ledger::new(store.clone())
        .debit("buyer", Points::new(200), "drain")
        .unwrap();
    store.failures.store(1, Ordering::SeqCst);

    let escrow = EscrowWorkflow::new(store.clone()).with_retry_policy(RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    });
    let result = escrow
        .request_redemption(listing_id, &"buyer".to_string())
        .await;
    assert!(matches!(
        result,
        Err(RedemptionError::Ledger(LedgerError::InsufficientBalance(_, _, _)))
    ));

    let registry = Registry::new(store.clone());
    assert_eq!(registry.get(&listing_id).unwrap().status, ListingStatus::Approved);
    assert_eq!(Ledger::new(store.clone()).balance("buyer").unwrap(), Points::ZERO);
}
