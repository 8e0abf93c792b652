//! Append-only points ledger
//!
//! Source of truth for every balance. The cached `points_balance` column
//! exists for read performance only and is maintained transactionally by
//! [`store::apply`]; the invariant `points_balance == SUM(entries)` holds
//! after every committed transaction and can be audited and repaired
//! through [`store::verify_balance`] / [`store::repair_balance`].

pub mod entry;
pub mod store;

pub use entry::{LedgerEntry, LedgerSource, NewEntry};
pub use store::{ActivityRecord, BalanceAudit};
