//! Daily awards: login bonus and AUM yield
//!
//! Split into pure calculators (what a user would earn) and the claims
//! engine (whether this period already paid out). Handlers compute
//! plans first, then hand them to the engine.

pub mod calculator;
pub mod claims;

pub use calculator::{
    aum_yield, login_bonus, period_key_for, today_period_key, AumSource, HttpAumSource,
    PlannedAward, Tier,
};
pub use claims::{AwardEngine, ClaimOutcome};
