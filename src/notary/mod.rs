//! Best-effort notarization against an external immutable ledger
//!
//! Nothing in here is a correctness dependency: the primary transaction
//! has always committed before this module runs, and a permanently dead
//! notary only costs `tx_hash` completeness.

pub mod client;
pub mod reconciler;

pub use client::{HttpNotary, Notary, NotarizeInstruction, NotarizeKind, NotaryError};
pub use reconciler::{
    race_with_timeout, spawn_reconciler, BackfillTarget, HashSink, NotarizeJob, PgHashSink,
    RaceOutcome, Reconciler,
};
