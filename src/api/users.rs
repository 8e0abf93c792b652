//! User registration endpoint
//!
//! Endpoints:
//!   POST /  -> Register a user (welcome bonus, optional referral binding)
//!
//! Registration commits first; the referral binding is then raced against
//! the notarization timeout so the caller learns whether the binding was
//! confirmed without ever waiting longer than the configured budget. A
//! timeout means "not confirmed yet", never a failed registration.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EconomyConfig;
use crate::database::users::UserRepository;
use crate::error::EngineError;
use crate::ledger::store as ledger_store;
use crate::notary::{race_with_timeout, Notary, NotarizeInstruction, NotarizeKind, RaceOutcome};

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct UsersApiState {
    pub pool: PgPool,
    pub users: UserRepository,
    pub notary: Arc<dyn Notary>,
    pub economy: EconomyConfig,
    pub race_timeout: Duration,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub wallet_address: String,
    pub referral_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub wallet_address: String,
    pub referral_code: String,
    pub points_balance: i64,
    pub referral: Option<ReferralOutcome>,
}

/// What happened to the referral binding, including whether the external
/// notarization confirmed within the race window.
#[derive(Debug, Serialize)]
pub struct ReferralOutcome {
    pub referrer_id: Uuid,
    pub amount: i64,
    pub notarized: bool,
    pub tx_hash: Option<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// Register a user and bind the optional referral.
pub async fn register_user(
    State(state): State<UsersApiState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, EngineError> {
    let registered = state
        .users
        .register(
            &request.wallet_address,
            request.referral_code.as_deref(),
            &state.economy,
        )
        .await?;

    let referral = match registered.referral {
        Some(credit) => {
            let instruction = NotarizeInstruction::new(
                NotarizeKind::ReferralBound,
                credit.referrer_id,
                credit.amount,
                registered.user.id.to_string(),
            );

            let outcome =
                race_with_timeout(state.notary.clone(), instruction, state.race_timeout).await;

            let tx_hash = match &outcome {
                RaceOutcome::Confirmed(hash) => {
                    ledger_store::attach_tx_hash(&state.pool, credit.entry_id, hash).await;
                    Some(hash.clone())
                }
                RaceOutcome::TimedOut => {
                    info!(
                        referrer_id = %credit.referrer_id,
                        "Referral notarization still pending at response time"
                    );
                    None
                }
                RaceOutcome::Failed(e) => {
                    warn!(referrer_id = %credit.referrer_id, error = %e, "Referral notarization failed");
                    None
                }
            };

            Some(ReferralOutcome {
                referrer_id: credit.referrer_id,
                amount: credit.amount,
                notarized: outcome.confirmed(),
                tx_hash,
            })
        }
        None => None,
    };

    Ok(Json(RegisterResponse {
        user_id: registered.user.id,
        wallet_address: registered.user.wallet_address,
        referral_code: registered.user.referral_code,
        points_balance: registered.user.points_balance,
        referral,
    }))
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: UsersApiState) -> Router {
    Router::new()
        .route("/", post(register_user))
        .with_state(state)
}
