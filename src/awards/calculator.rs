//! Daily award calculators
//!
//! Pure planning: given config and an advisory AUM reading, produce the
//! credits a user would receive for a period. Nothing here touches
//! storage; the claims engine gates and applies the plans atomically.
//! AUM is read outside the claim transaction; the value is point-in-time
//! advisory data, not a correctness input.

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::config::EconomyConfig;
use crate::error::EngineError;
use crate::ledger::entry::LedgerSource;

/// One credit the claims engine should apply if the period is open.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedAward {
    pub source: LedgerSource,
    pub amount: i64,
    pub reason: String,
}

/// Calendar-day period key, e.g. `2024-01-01`.
pub fn period_key_for(date: chrono::NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn today_period_key() -> String {
    period_key_for(chrono::Utc::now().date_naive())
}

/// Fixed daily login bonus.
pub fn login_bonus(economy: &EconomyConfig, period_key: &str) -> Option<PlannedAward> {
    if economy.daily_login_bonus <= 0 {
        return None;
    }
    Some(PlannedAward {
        source: LedgerSource::Daily,
        amount: economy.daily_login_bonus,
        reason: format!("Daily login bonus {}", period_key),
    })
}

/// Wealth tier by assets under management.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Standard,
    Premium,
    Private,
}

impl Tier {
    pub fn for_aum(total_aum: i64) -> Tier {
        if total_aum >= 10_000_000 {
            Tier::Private
        } else if total_aum >= 1_000_000 {
            Tier::Premium
        } else {
            Tier::Standard
        }
    }

    pub fn multiplier(&self) -> f64 {
        match self {
            Tier::Standard => 1.0,
            Tier::Premium => 1.25,
            Tier::Private => 1.5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tier::Standard => "standard",
            Tier::Premium => "premium",
            Tier::Private => "private",
        }
    }
}

/// AUM-based daily yield: `floor(total_aum / divisor) * tier multiplier`,
/// truncated to whole points. No yield for empty portfolios or when the
/// base rounds to zero.
pub fn aum_yield(
    total_aum: i64,
    economy: &EconomyConfig,
    period_key: &str,
) -> Option<PlannedAward> {
    if total_aum <= 0 || economy.yield_divisor <= 0 {
        return None;
    }

    let base = total_aum / economy.yield_divisor;
    let tier = Tier::for_aum(total_aum);
    let amount = ((base as f64) * tier.multiplier()).floor() as i64;
    if amount <= 0 {
        return None;
    }

    Some(PlannedAward {
        source: LedgerSource::Yield,
        amount,
        reason: format!("Daily yield {} ({} tier)", period_key, tier.name()),
    })
}

/// Advisory read of a user's assets under management.
#[async_trait]
pub trait AumSource: Send + Sync {
    async fn total_aum(&self, user_id: Uuid) -> Result<i64, EngineError>;
}

#[derive(Debug, serde::Deserialize)]
struct AumResponse {
    total_aum: i64,
}

/// Wealth-service client. An unset or unusable URL or a failed read
/// degrades to an AUM of zero: the login bonus still pays out, only the
/// yield is lost for that claim.
pub struct HttpAumSource {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl HttpAumSource {
    pub fn from_config(economy: &EconomyConfig) -> anyhow::Result<Self> {
        let base_url = if economy.wealth_service_url.is_empty() {
            None
        } else {
            match Url::parse(&economy.wealth_service_url) {
                Ok(url) if url.cannot_be_a_base() => {
                    warn!(
                        url = %economy.wealth_service_url,
                        "Wealth service URL cannot be a base, AUM yield disabled"
                    );
                    None
                }
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(
                        url = %economy.wealth_service_url,
                        error = %e,
                        "Wealth service URL invalid, AUM yield disabled"
                    );
                    None
                }
            }
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .user_agent("scrip-engine")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build wealth service client: {}", e))?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl AumSource for HttpAumSource {
    async fn total_aum(&self, user_id: Uuid) -> Result<i64, EngineError> {
        let Some(base) = &self.base_url else {
            return Ok(0);
        };

        let url = match base.join(&format!("aum/{}", user_id)) {
            Ok(url) => url,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "AUM path join failed, assuming zero");
                return Ok(0);
            }
        };

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "AUM read failed, assuming zero");
                return Ok(0);
            }
        };

        if !response.status().is_success() {
            warn!(
                user_id = %user_id,
                status = %response.status(),
                "AUM read rejected, assuming zero"
            );
            return Ok(0);
        }

        match response.json::<AumResponse>().await {
            Ok(parsed) => Ok(parsed.total_aum),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "AUM response malformed, assuming zero");
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_economy() -> EconomyConfig {
        EconomyConfig {
            welcome_bonus: 100,
            referral_reward: 50,
            daily_login_bonus: 10,
            yield_divisor: 500_000,
            wealth_service_url: String::new(),
        }
    }

    #[test]
    fn test_login_bonus_is_the_configured_constant() {
        let plan = login_bonus(&test_economy(), "2024-01-01").unwrap();
        assert_eq!(plan.amount, 10);
        assert_eq!(plan.source, LedgerSource::Daily);
        assert!(plan.reason.contains("2024-01-01"));
    }

    #[test]
    fn test_zero_login_bonus_yields_no_plan() {
        let mut economy = test_economy();
        economy.daily_login_bonus = 0;
        assert!(login_bonus(&economy, "2024-01-01").is_none());
    }

    #[test]
    fn test_private_tier_yield() {
        // floor(12,000,000 / 500,000) * 1.5 = 24 * 1.5 = 36
        let plan = aum_yield(12_000_000, &test_economy(), "2024-01-01").unwrap();
        assert_eq!(plan.amount, 36);
        assert_eq!(plan.source, LedgerSource::Yield);
        assert!(plan.reason.contains("private"));
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(Tier::for_aum(0), Tier::Standard);
        assert_eq!(Tier::for_aum(999_999), Tier::Standard);
        assert_eq!(Tier::for_aum(1_000_000), Tier::Premium);
        assert_eq!(Tier::for_aum(9_999_999), Tier::Premium);
        assert_eq!(Tier::for_aum(10_000_000), Tier::Private);
    }

    #[test]
    fn test_yield_floors_twice() {
        // floor(8,700,000 / 500,000) = 17, premium tier: 17 * 1.25 = 21.25 -> 21
        let plan = aum_yield(8_700_000, &test_economy(), "2024-01-01").unwrap();
        assert_eq!(plan.amount, 21);
    }

    #[test]
    fn test_standard_tier_has_no_multiplier() {
        // floor(900,000 / 500,000) = 1, standard tier: 1 * 1.0 = 1
        let plan = aum_yield(900_000, &test_economy(), "2024-01-01").unwrap();
        assert_eq!(plan.amount, 1);
    }

    #[test]
    fn test_small_or_empty_portfolio_yields_nothing() {
        assert!(aum_yield(0, &test_economy(), "2024-01-01").is_none());
        assert!(aum_yield(-5, &test_economy(), "2024-01-01").is_none());
        assert!(aum_yield(499_999, &test_economy(), "2024-01-01").is_none());
    }

    #[test]
    fn test_period_key_format() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(period_key_for(date), "2024-01-01");

        let date = chrono::NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        assert_eq!(period_key_for(date), "2025-12-31");
    }

    #[tokio::test]
    async fn test_unset_wealth_service_reads_zero() {
        let source = HttpAumSource::from_config(&test_economy()).unwrap();
        let aum = source.total_aum(Uuid::new_v4()).await.unwrap();
        assert_eq!(aum, 0);
    }

    #[tokio::test]
    async fn test_non_base_wealth_url_reads_zero() {
        // mailto: parses as a URL but cannot anchor the aum/{id} path.
        let mut economy = test_economy();
        economy.wealth_service_url = "mailto:treasury@example.com".to_string();

        let source = HttpAumSource::from_config(&economy).unwrap();
        let aum = source.total_aum(Uuid::new_v4()).await.unwrap();
        assert_eq!(aum, 0);
    }
}
