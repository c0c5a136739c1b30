//! Core primitives for the referral ledger.
//!
//! The crate is organised around a single mutating operation, the referral
//! trigger, and the small amount of state it needs:
//!
//! * [`model`]: accounts, referral codes and the account form used by the
//!   CRUD layer.
//! * [`policy`]: the fixed signup / milestone reward rule.
//! * [`store`]: the versioned read + conditional commit seam the trigger runs
//!   against.
//! * [`memory`]: the in-process store implementation.
//! * [`trigger`]: the reward ledger operation itself.
//! * [`retry`]: caller-side retry of transient commit conflicts.
//! * [`snapshot`]: serialisable ledger snapshots guarded by a Merkle state root.
//! * [`event`]: the audit journal appended by every committed trigger.

pub mod event;
pub mod memory;
pub mod model;
pub mod policy;
pub mod retry;
pub mod snapshot;
pub mod store;
pub mod trigger;

mod error;

pub use error::{ErrorKind, ReferralError};
pub use event::{EventRecord, LedgerEvent};
pub use memory::MemoryStore;
pub use model::{Account, AccountForm, AccountId, Amount, ReferralCode, Versioned};
pub use retry::RetryPolicy;
pub use snapshot::LedgerSnapshot;
pub use store::{LedgerStore, RowWrite, WriteBatch};
pub use trigger::{ReferralLedger, TriggerOutcome};
