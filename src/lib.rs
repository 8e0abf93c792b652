//! Scrip points engine
//!
//! Append-only points ledger with a cached balance column, a redemption
//! request state machine with compensating refunds, idempotent daily
//! awards, and best-effort notarization against an external audit ledger.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Environment-driven configuration
//! ├── error.rs       - Error taxonomy & HTTP mapping
//! ├── auth.rs        - Roles, capabilities, principal
//! ├── catalog.rs     - Reward catalog lookups
//! ├── ledger/        - Append-only ledger + cached balance
//! │   ├── entry.rs   - Entry types & sources
//! │   └── store.rs   - Apply/read/verify/repair operations
//! ├── redemption/    - Redemption request lifecycle
//! │   ├── state.rs   - Status graph & provenance metadata
//! │   └── engine.rs  - Transactional create/transition
//! ├── awards/        - Daily login bonus & AUM yield
//! │   ├── calculator.rs - Pure award math & tiers
//! │   └── claims.rs  - Idempotent period claims
//! ├── notary/        - External audit-ledger notarization
//! │   ├── client.rs  - Notary trait & HTTP client
//! │   └── reconciler.rs - Race-with-timeout & backfill worker
//! ├── api/           - HTTP API endpoints
//! │   ├── users.rs   - Registration with referral binding
//! │   ├── points.rs  - Balance, history, daily claim, purchase
//! │   ├── redemptions.rs - Create, list, cancel, review
//! │   ├── admin.rs   - Adjustments & balance repair
//! │   └── middleware.rs - Principal extraction
//! └── database/      - PostgreSQL pool, schema, users
//! ```

pub mod api;
pub mod auth;
pub mod awards;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod ledger;
pub mod notary;
pub mod redemption;

// Re-export main types for convenience
pub use auth::{Capability, Principal, Role};
pub use awards::{AumSource, AwardEngine, ClaimOutcome, HttpAumSource, PlannedAward, Tier};
pub use catalog::RewardItem;
pub use config::EngineConfig;
pub use database::pool::DatabasePool;
pub use database::users::{User, UserRepository};
pub use error::EngineError;
pub use ledger::{ActivityRecord, BalanceAudit, LedgerEntry, LedgerSource, NewEntry};
pub use notary::{
    race_with_timeout, spawn_reconciler, HttpNotary, Notary, NotaryError, NotarizeInstruction,
    NotarizeKind, PgHashSink, RaceOutcome, Reconciler,
};
pub use redemption::{Actor, RedeemRequest, RedeemStatus, RedemptionEngine};

// Re-export API types
pub use api::{
    create_admin_router, create_health_router, create_points_router, create_redemptions_router,
    create_users_router, principal_middleware, AdminApiState, PointsApiState, RedemptionsApiState,
    UsersApiState,
};
