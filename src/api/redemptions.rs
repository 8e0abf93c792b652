//! Redemption API endpoints
//!
//! Endpoints:
//!   POST  /             -> Create a request (debits points)
//!   GET   /             -> List own requests
//!   GET   /{id}         -> Fetch one request
//!   POST  /{id}/cancel  -> Owner cancellation (refunds)
//!   PATCH /{id}         -> Admin review transition
//!
//! Ordering is the module's contract: the storage transaction commits
//! first, then notarization runs. Creation races the notarization so the
//! response can carry a confirmation; refunds notarize fire-and-forget
//! through the reconciler queue.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{resolve_target, TargetQuery};
use crate::auth::{Capability, Principal};
use crate::error::EngineError;
use crate::ledger::store as ledger_store;
use crate::notary::{
    race_with_timeout, BackfillTarget, Notary, NotarizeInstruction, NotarizeJob, NotarizeKind,
    RaceOutcome, Reconciler,
};
use crate::redemption::{Actor, RedeemRequest, RedeemStatus, RedemptionEngine};

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct RedemptionsApiState {
    pub pool: PgPool,
    pub engine: RedemptionEngine,
    pub notary: Arc<dyn Notary>,
    pub reconciler: Reconciler,
    pub race_timeout: Duration,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateRedemptionRequest {
    pub reward_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CreateRedemptionResponse {
    pub request: RedeemRequest,
    pub notarized: bool,
    pub tx_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub status: RedeemStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub request: RedeemRequest,
    pub refunded: bool,
    pub refund_entry_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RedemptionListResponse {
    pub user_id: Uuid,
    pub requests: Vec<RedeemRequest>,
    pub total: usize,
}

// ============================================================================
// API Handlers
// ============================================================================

/// Create a redemption request for the calling user.
pub async fn create_redemption(
    State(state): State<RedemptionsApiState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateRedemptionRequest>,
) -> Result<Json<CreateRedemptionResponse>, EngineError> {
    let created = state
        .engine
        .create(principal.user_id, request.reward_id)
        .await?;

    // The debit is committed; race the notarization for a confirmation
    // to report. A timeout here means "unknown", not "failed".
    let instruction = NotarizeInstruction::new(
        NotarizeKind::RedeemDebit,
        principal.user_id,
        created.request.points_used,
        created.request.id.to_string(),
    );
    let outcome = race_with_timeout(state.notary.clone(), instruction, state.race_timeout).await;

    let tx_hash = match &outcome {
        RaceOutcome::Confirmed(hash) => {
            state.engine.attach_tx_hash(created.request.id, hash).await;
            ledger_store::attach_tx_hash(&state.pool, created.debit_entry_id, hash).await;
            Some(hash.clone())
        }
        RaceOutcome::TimedOut => {
            info!(
                request_id = %created.request.id,
                "Redemption notarization still pending at response time"
            );
            None
        }
        RaceOutcome::Failed(e) => {
            warn!(request_id = %created.request.id, error = %e, "Redemption notarization failed");
            None
        }
    };

    Ok(Json(CreateRedemptionResponse {
        request: created.request,
        notarized: outcome.confirmed(),
        tx_hash,
    }))
}

/// List redemption requests, newest first.
pub async fn list_redemptions(
    State(state): State<RedemptionsApiState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<TargetQuery>,
) -> Result<Json<RedemptionListResponse>, EngineError> {
    let target = resolve_target(&principal, query.user_id)?;
    let requests = state.engine.list_for_user(target).await?;
    let total = requests.len();

    Ok(Json(RedemptionListResponse {
        user_id: target,
        requests,
        total,
    }))
}

/// Fetch a single request. Owners see their own; others need the view
/// capability.
pub async fn get_redemption(
    State(state): State<RedemptionsApiState>,
    Extension(principal): Extension<Principal>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<RedeemRequest>, EngineError> {
    let request = state.engine.get(request_id).await?;

    if request.user_id != principal.user_id {
        principal.require(Capability::ViewAnyUser)?;
    }

    Ok(Json(request))
}

/// Owner cancellation of a still-pending request.
pub async fn cancel_redemption(
    State(state): State<RedemptionsApiState>,
    Extension(principal): Extension<Principal>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, EngineError> {
    let outcome = state
        .engine
        .transition(
            request_id,
            RedeemStatus::Cancelled,
            Actor::Owner(principal.user_id),
            None,
        )
        .await?;

    enqueue_refund_notarization(&state, &outcome.request, outcome.refund_entry_id);

    Ok(Json(TransitionResponse {
        refunded: outcome.refund_entry_id.is_some(),
        refund_entry_id: outcome.refund_entry_id,
        request: outcome.request,
    }))
}

/// Admin review: advance fulfillment or reject with a reason.
pub async fn review_redemption(
    State(state): State<RedemptionsApiState>,
    Extension(principal): Extension<Principal>,
    Path(request_id): Path<Uuid>,
    Json(review): Json<ReviewRequest>,
) -> Result<Json<TransitionResponse>, EngineError> {
    principal.require(Capability::ReviewRedemptions)?;

    let outcome = state
        .engine
        .transition(
            request_id,
            review.status,
            Actor::Reviewer(principal.user_id),
            review.reason.as_deref(),
        )
        .await?;

    enqueue_refund_notarization(&state, &outcome.request, outcome.refund_entry_id);

    Ok(Json(TransitionResponse {
        refunded: outcome.refund_entry_id.is_some(),
        refund_entry_id: outcome.refund_entry_id,
        request: outcome.request,
    }))
}

/// Queue the refund for background notarization. The ledger is already
/// committed; this only affects the audit trail.
fn enqueue_refund_notarization(
    state: &RedemptionsApiState,
    request: &RedeemRequest,
    refund_entry_id: Option<i64>,
) {
    let Some(entry_id) = refund_entry_id else {
        return;
    };

    let instruction = NotarizeInstruction::new(
        NotarizeKind::RedeemRefund,
        request.user_id,
        request.points_used,
        request.id.to_string(),
    );
    state.reconciler.enqueue(NotarizeJob {
        instruction,
        target: BackfillTarget::LedgerEntry(entry_id),
    });
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: RedemptionsApiState) -> Router {
    Router::new()
        .route("/", post(create_redemption).get(list_redemptions))
        .route("/{id}", get(get_redemption).patch(review_redemption))
        .route("/{id}/cancel", post(cancel_redemption))
        .with_state(state)
}
