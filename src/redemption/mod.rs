//! Redemption request state machine and its transactional engine

pub mod engine;
pub mod state;

pub use engine::{CreatedRedemption, RedemptionEngine, TransitionOutcome};
pub use state::{Actor, RedeemRequest, RedeemStatus};
