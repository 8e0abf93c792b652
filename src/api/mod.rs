//! HTTP API endpoints for the points engine
//!
//! Provides REST APIs for:
//! - User registration with referral binding
//! - Points (balance, history, daily claim, purchase credits)
//! - Redemptions (create, list, cancel, admin review)
//! - Admin operations (adjustments, balance verification and repair)
//! - Principal extraction from trusted gateway headers

use axum::{routing::get, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{Capability, Principal};
use crate::error::EngineError;

pub mod admin;
pub mod middleware;
pub mod points;
pub mod redemptions;
pub mod users;

pub use admin::{create_router as create_admin_router, AdminApiState};
pub use middleware::{principal_from_headers, principal_middleware};
pub use points::{create_router as create_points_router, PointsApiState};
pub use redemptions::{create_router as create_redemptions_router, RedemptionsApiState};
pub use users::{create_router as create_users_router, UsersApiState};

/// Optional read target shared by the list/read endpoints.
#[derive(Debug, Deserialize)]
pub struct TargetQuery {
    pub user_id: Option<Uuid>,
}

/// Resolve whose data a read targets. Absent or self: the caller.
/// Anyone else requires the view capability.
pub fn resolve_target(
    principal: &Principal,
    requested: Option<Uuid>,
) -> Result<Uuid, EngineError> {
    match requested {
        Some(user_id) if user_id != principal.user_id => {
            principal.require(Capability::ViewAnyUser)?;
            Ok(user_id)
        }
        _ => Ok(principal.user_id),
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub fn create_health_router() -> axum::Router {
    axum::Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    #[test]
    fn test_resolve_target_defaults_to_caller() {
        let principal = Principal {
            user_id: Uuid::new_v4(),
            role: Role::User,
        };
        assert_eq!(resolve_target(&principal, None).unwrap(), principal.user_id);
        assert_eq!(
            resolve_target(&principal, Some(principal.user_id)).unwrap(),
            principal.user_id
        );
    }

    #[test]
    fn test_resolve_target_requires_view_capability_for_others() {
        let other = Uuid::new_v4();

        let user = Principal {
            user_id: Uuid::new_v4(),
            role: Role::User,
        };
        assert!(matches!(
            resolve_target(&user, Some(other)).unwrap_err(),
            EngineError::Forbidden(_)
        ));

        let viewer = Principal {
            user_id: Uuid::new_v4(),
            role: Role::AdminView,
        };
        assert_eq!(resolve_target(&viewer, Some(other)).unwrap(), other);
    }
}
