//! PostgreSQL Database Module
//!
//! Connection pool, schema bootstrap and the user repository. Ledger,
//! redemption and claim persistence live with their domain modules.

pub mod pool;
pub mod users;

pub use pool::DatabasePool;
pub use users::UserRepository;
