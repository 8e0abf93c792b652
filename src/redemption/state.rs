//! Redemption request lifecycle
//!
//! ```text
//!             +------------+        +---------+        +-----------+
//!  create --> |  pending   | -----> | processing | --> |   ready   | --> completed
//!             +------------+        +---------+        +-----------+
//!                   |                    |
//!                   v                    v
//!               cancelled            rejected
//!             (owner only)       (reason required)
//! ```
//!
//! `completed`, `cancelled` and `rejected` are terminal: no transition
//! leaves them under any role. Entry into `cancelled` or `rejected`
//! carries exactly one refund of the debited points, applied in the same
//! transaction as the status change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedeemStatus {
    Pending,
    Processing,
    Ready,
    Completed,
    Cancelled,
    Rejected,
}

impl RedeemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedeemStatus::Pending => "pending",
            RedeemStatus::Processing => "processing",
            RedeemStatus::Ready => "ready",
            RedeemStatus::Completed => "completed",
            RedeemStatus::Cancelled => "cancelled",
            RedeemStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<RedeemStatus> {
        match s {
            "pending" => Some(RedeemStatus::Pending),
            "processing" => Some(RedeemStatus::Processing),
            "ready" => Some(RedeemStatus::Ready),
            "completed" => Some(RedeemStatus::Completed),
            "cancelled" => Some(RedeemStatus::Cancelled),
            "rejected" => Some(RedeemStatus::Rejected),
            _ => None,
        }
    }

    /// No transition may leave a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RedeemStatus::Completed | RedeemStatus::Cancelled | RedeemStatus::Rejected
        )
    }

    /// Entry into these statuses refunds the debited points.
    pub fn grants_refund(&self) -> bool {
        matches!(self, RedeemStatus::Cancelled | RedeemStatus::Rejected)
    }

    pub fn can_transition_to(&self, next: RedeemStatus) -> bool {
        matches!(
            (self, next),
            (RedeemStatus::Pending, RedeemStatus::Processing)
                | (RedeemStatus::Pending, RedeemStatus::Cancelled)
                | (RedeemStatus::Processing, RedeemStatus::Ready)
                | (RedeemStatus::Processing, RedeemStatus::Rejected)
                | (RedeemStatus::Ready, RedeemStatus::Completed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reward_id: Uuid,
    /// Cost snapshot taken at request time; never re-derived from the
    /// catalog afterwards.
    pub points_used: i64,
    pub status: RedeemStatus,
    /// Free-form audit annotations: item snapshot at creation,
    /// cancellation/rejection provenance later.
    pub metadata: Value,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Who is asking for a transition.
#[derive(Debug, Clone, Copy)]
pub enum Actor {
    Owner(Uuid),
    Reviewer(Uuid),
}

impl Actor {
    pub fn id(&self) -> Uuid {
        match self {
            Actor::Owner(id) | Actor::Reviewer(id) => *id,
        }
    }
}

/// Validate one transition against the graph and role rules. Pure: no
/// storage access, so every path is unit-testable. Storage-side checks
/// (row existence, locking) belong to the engine.
pub fn check_transition(
    request: &RedeemRequest,
    target: RedeemStatus,
    actor: &Actor,
    reason: Option<&str>,
) -> Result<(), EngineError> {
    // Terminal guard first: it is what makes the refund exactly-once.
    if request.status.is_terminal() {
        return Err(EngineError::TerminalState {
            status: request.status.as_str().to_string(),
        });
    }

    if !request.status.can_transition_to(target) {
        return Err(EngineError::InvalidTransition {
            from: request.status.as_str().to_string(),
            to: target.as_str().to_string(),
        });
    }

    match target {
        RedeemStatus::Cancelled => match actor {
            Actor::Owner(id) if *id == request.user_id => {}
            _ => {
                return Err(EngineError::Forbidden(
                    "only the request owner may cancel, and only while pending",
                ))
            }
        },
        RedeemStatus::Rejected => {
            if reason.map(str::trim).unwrap_or("").is_empty() {
                return Err(EngineError::Validation(
                    "rejection requires a non-empty reason".to_string(),
                ));
            }
            if !matches!(actor, Actor::Reviewer(_)) {
                return Err(EngineError::Forbidden("rejection is a reviewer operation"));
            }
        }
        RedeemStatus::Processing | RedeemStatus::Ready | RedeemStatus::Completed => {
            if !matches!(actor, Actor::Reviewer(_)) {
                return Err(EngineError::Forbidden(
                    "fulfillment transitions are reviewer operations",
                ));
            }
        }
        RedeemStatus::Pending => {
            // Unreachable through the graph, kept for exhaustiveness.
            return Err(EngineError::InvalidTransition {
                from: request.status.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }
    }

    Ok(())
}

/// Provenance annotation for one transition, merged into the request's
/// metadata without touching unrelated keys.
pub fn provenance_patch(
    target: RedeemStatus,
    actor: &Actor,
    reason: Option<&str>,
    at: DateTime<Utc>,
) -> Value {
    let actor_id = actor.id().to_string();
    let stamp = at.to_rfc3339();

    match target {
        RedeemStatus::Cancelled => json!({
            "cancelled_by": actor_id,
            "cancelled_at": stamp,
        }),
        RedeemStatus::Rejected => json!({
            "rejected_by": actor_id,
            "rejected_at": stamp,
            "rejected_reason": reason.unwrap_or_default(),
        }),
        other => {
            let mut map = serde_json::Map::new();
            map.insert(format!("{}_by", other.as_str()), Value::String(actor_id));
            map.insert(format!("{}_at", other.as_str()), Value::String(stamp));
            Value::Object(map)
        }
    }
}

/// Merge `patch` into `metadata` key by key. Existing keys the patch
/// does not name survive untouched; a non-object metadata value is
/// replaced by an object holding the patch.
pub fn merge_metadata(metadata: &mut Value, patch: Value) {
    let Value::Object(patch_map) = patch else {
        return;
    };

    if !metadata.is_object() {
        *metadata = Value::Object(serde_json::Map::new());
    }

    if let Value::Object(map) = metadata {
        for (key, value) in patch_map {
            map.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_request(status: RedeemStatus) -> RedeemRequest {
        RedeemRequest {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            reward_id: Uuid::new_v4(),
            points_used: 60,
            status,
            metadata: json!({ "reward_title": "Coffee Mug", "required_points": 60 }),
            tx_hash: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    const ALL: [RedeemStatus; 6] = [
        RedeemStatus::Pending,
        RedeemStatus::Processing,
        RedeemStatus::Ready,
        RedeemStatus::Completed,
        RedeemStatus::Cancelled,
        RedeemStatus::Rejected,
    ];

    #[test]
    fn test_status_round_trip() {
        for status in ALL {
            assert_eq!(RedeemStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RedeemStatus::parse("approved"), None);
    }

    #[test]
    fn test_transition_graph_is_exactly_five_edges() {
        let mut allowed = Vec::new();
        for from in ALL {
            for to in ALL {
                if from.can_transition_to(to) {
                    allowed.push((from, to));
                }
            }
        }
        assert_eq!(
            allowed,
            vec![
                (RedeemStatus::Pending, RedeemStatus::Processing),
                (RedeemStatus::Pending, RedeemStatus::Cancelled),
                (RedeemStatus::Processing, RedeemStatus::Ready),
                (RedeemStatus::Processing, RedeemStatus::Rejected),
                (RedeemStatus::Ready, RedeemStatus::Completed),
            ]
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RedeemStatus::Completed.is_terminal());
        assert!(RedeemStatus::Cancelled.is_terminal());
        assert!(RedeemStatus::Rejected.is_terminal());
        assert!(!RedeemStatus::Pending.is_terminal());
        assert!(!RedeemStatus::Processing.is_terminal());
        assert!(!RedeemStatus::Ready.is_terminal());
    }

    #[test]
    fn test_refund_granting_statuses() {
        assert!(RedeemStatus::Cancelled.grants_refund());
        assert!(RedeemStatus::Rejected.grants_refund());
        assert!(!RedeemStatus::Completed.grants_refund());
        assert!(!RedeemStatus::Ready.grants_refund());
    }

    #[test]
    fn test_no_transition_leaves_a_terminal_state() {
        for from in [
            RedeemStatus::Completed,
            RedeemStatus::Cancelled,
            RedeemStatus::Rejected,
        ] {
            let request = create_test_request(from);
            for to in ALL {
                let err = check_transition(
                    &request,
                    to,
                    &Actor::Reviewer(Uuid::new_v4()),
                    Some("why not"),
                )
                .unwrap_err();
                assert!(
                    matches!(err, EngineError::TerminalState { .. }),
                    "expected terminal guard for {:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_owner_cancels_own_pending_request() {
        let request = create_test_request(RedeemStatus::Pending);
        let result = check_transition(
            &request,
            RedeemStatus::Cancelled,
            &Actor::Owner(request.user_id),
            None,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_other_user_cannot_cancel() {
        let request = create_test_request(RedeemStatus::Pending);
        let err = check_transition(
            &request,
            RedeemStatus::Cancelled,
            &Actor::Owner(Uuid::new_v4()),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[test]
    fn test_reviewer_cannot_cancel_on_behalf_of_owner() {
        let request = create_test_request(RedeemStatus::Pending);
        let err = check_transition(
            &request,
            RedeemStatus::Cancelled,
            &Actor::Reviewer(Uuid::new_v4()),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[test]
    fn test_cancel_of_processing_request_is_a_state_error() {
        let request = create_test_request(RedeemStatus::Processing);
        let err = check_transition(
            &request,
            RedeemStatus::Cancelled,
            &Actor::Owner(request.user_id),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[test]
    fn test_rejection_requires_reason() {
        let request = create_test_request(RedeemStatus::Processing);
        let reviewer = Actor::Reviewer(Uuid::new_v4());

        for missing in [None, Some(""), Some("   ")] {
            let err =
                check_transition(&request, RedeemStatus::Rejected, &reviewer, missing)
                    .unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)));
        }

        assert!(
            check_transition(&request, RedeemStatus::Rejected, &reviewer, Some("out of stock"))
                .is_ok()
        );
    }

    #[test]
    fn test_rejection_only_from_processing() {
        let request = create_test_request(RedeemStatus::Pending);
        let err = check_transition(
            &request,
            RedeemStatus::Rejected,
            &Actor::Reviewer(Uuid::new_v4()),
            Some("out of stock"),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[test]
    fn test_owner_cannot_drive_fulfillment() {
        let request = create_test_request(RedeemStatus::Pending);
        let err = check_transition(
            &request,
            RedeemStatus::Processing,
            &Actor::Owner(request.user_id),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[test]
    fn test_full_fulfillment_path() {
        let reviewer = Actor::Reviewer(Uuid::new_v4());

        let request = create_test_request(RedeemStatus::Pending);
        assert!(check_transition(&request, RedeemStatus::Processing, &reviewer, None).is_ok());

        let request = create_test_request(RedeemStatus::Processing);
        assert!(check_transition(&request, RedeemStatus::Ready, &reviewer, None).is_ok());

        let request = create_test_request(RedeemStatus::Ready);
        assert!(check_transition(&request, RedeemStatus::Completed, &reviewer, None).is_ok());
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        let reviewer = Actor::Reviewer(Uuid::new_v4());

        let request = create_test_request(RedeemStatus::Pending);
        let err = check_transition(&request, RedeemStatus::Completed, &reviewer, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));

        let request = create_test_request(RedeemStatus::Pending);
        let err =
            check_transition(&request, RedeemStatus::Ready, &reviewer, None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
    }

    #[test]
    fn test_provenance_merge_preserves_existing_keys() {
        let mut metadata = json!({
            "reward_title": "Coffee Mug",
            "required_points": 60,
        });

        let actor = Actor::Reviewer(Uuid::new_v4());
        let patch = provenance_patch(
            RedeemStatus::Rejected,
            &actor,
            Some("out of stock"),
            Utc::now(),
        );
        merge_metadata(&mut metadata, patch);

        assert_eq!(metadata["reward_title"], "Coffee Mug");
        assert_eq!(metadata["required_points"], 60);
        assert_eq!(metadata["rejected_reason"], "out of stock");
        assert_eq!(metadata["rejected_by"], actor.id().to_string());
        assert!(metadata.get("rejected_at").is_some());
    }

    #[test]
    fn test_cancellation_provenance_shape() {
        let owner = Uuid::new_v4();
        let patch = provenance_patch(
            RedeemStatus::Cancelled,
            &Actor::Owner(owner),
            None,
            Utc::now(),
        );
        assert_eq!(patch["cancelled_by"], owner.to_string());
        assert!(patch.get("cancelled_at").is_some());
        assert!(patch.get("rejected_reason").is_none());
    }

    #[test]
    fn test_fulfillment_provenance_uses_status_keys() {
        let reviewer = Actor::Reviewer(Uuid::new_v4());
        let patch = provenance_patch(RedeemStatus::Processing, &reviewer, None, Utc::now());
        assert!(patch.get("processing_by").is_some());
        assert!(patch.get("processing_at").is_some());
    }

    #[test]
    fn test_merge_into_non_object_metadata() {
        let mut metadata = Value::Null;
        merge_metadata(&mut metadata, json!({ "cancelled_by": "someone" }));
        assert_eq!(metadata["cancelled_by"], "someone");
    }

    #[test]
    fn test_successive_merges_accumulate() {
        let mut metadata = json!({ "reward_title": "Mug" });
        merge_metadata(&mut metadata, json!({ "processing_by": "a" }));
        merge_metadata(&mut metadata, json!({ "ready_by": "b" }));

        assert_eq!(metadata["reward_title"], "Mug");
        assert_eq!(metadata["processing_by"], "a");
        assert_eq!(metadata["ready_by"], "b");
    }
}
