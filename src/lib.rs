pub mod impact;
pub mod ledger;
pub mod model;
pub mod points;
pub mod registry;
pub mod store;
pub mod workflow;

pub use impact::{Impact, estimate_impact};
pub use ledger::{Ledger, LedgerAudit, LedgerError};
pub use model::{AccountId, ListingId, ListingStatus, SwapOrderId, SwapStatus, TxId, TxKind};
pub use points::Points;
pub use registry::{ListingFilter, Registry, RegistryError};
pub use store::{Cursor, MemoryStore, Page, Store, StoreError};
pub use workflow::{
    EscrowWorkflow, FulfillmentError, ModerationError, ModerationVerdict, ModerationWorkflow,
    RedemptionError, RetryPolicy,
};
