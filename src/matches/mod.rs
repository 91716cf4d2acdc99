//! Match confirmation protocol
//!
//! Reports are persisted as unconfirmed rows, held in the pending registry
//! and settled or discarded by the coordinator once the opponent decides.

pub mod coordinator;
pub mod locks;
pub mod registry;
pub mod store;

pub use coordinator::{
    ConfirmOutcome, CoordinatorStats, RejectOutcome, SettlementCoordinator, SubmitOutcome,
};
pub use locks::KeyedLocks;
pub use registry::PendingMatchRegistry;
pub use store::{InMemoryMatchStore, MatchStore, MockMatchStore};
