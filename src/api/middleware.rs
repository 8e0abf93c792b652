//! Principal extraction middleware
//!
//! Authentication terminates at the gateway: it verifies the caller and
//! forwards `x-user-id` / `x-user-role` headers. This middleware turns
//! those headers into a [`Principal`] request extension and rejects
//! requests that arrive without them. Registration and health are the
//! only anonymous paths.

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use tracing::debug;
use uuid::Uuid;

use crate::auth::{Principal, Role};
use crate::error::EngineError;

/// Paths served without an authenticated principal.
const PUBLIC_PATHS: &[&str] = &["/health", "/users"];

fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.iter().any(|p| path.starts_with(p))
}

/// Build a [`Principal`] from the gateway identity headers.
pub fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, EngineError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or(EngineError::Forbidden("missing or malformed x-user-id header"))?;

    let role = headers
        .get("x-user-role")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Role::parse(s.trim()))
        .ok_or(EngineError::Forbidden("missing or unknown x-user-role header"))?;

    Ok(Principal { user_id, role })
}

/// Attach the caller's [`Principal`] to the request.
pub async fn principal_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, EngineError> {
    if is_public_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let principal = principal_from_headers(&headers)?;
    debug!(
        user_id = %principal.user_id,
        role = principal.role.as_str(),
        path = request.uri().path(),
        "Principal attached"
    );

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn identity_headers(user_id: &str, role: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_str(user_id).unwrap());
        headers.insert("x-user-role", HeaderValue::from_str(role).unwrap());
        headers
    }

    #[test]
    fn test_principal_from_valid_headers() {
        let id = Uuid::new_v4();
        let principal =
            principal_from_headers(&identity_headers(&id.to_string(), "admin")).unwrap();
        assert_eq!(principal.user_id, id);
        assert_eq!(principal.role, Role::Admin);
    }

    #[test]
    fn test_missing_headers_are_rejected() {
        let err = principal_from_headers(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[test]
    fn test_malformed_user_id_is_rejected() {
        let headers = identity_headers("not-a-uuid", "user");
        let err = principal_from_headers(&headers).unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let headers = identity_headers(&Uuid::new_v4().to_string(), "root");
        let err = principal_from_headers(&headers).unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/health"));
        assert!(is_public_path("/users"));
        assert!(!is_public_path("/points/balance"));
        assert!(!is_public_path("/admin/points/adjust"));
    }
}
