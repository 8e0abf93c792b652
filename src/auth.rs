//! Roles and capability checks
//!
//! Identity is established upstream: the gateway authenticates the caller
//! and injects `x-user-id` / `x-user-role` headers, which the middleware
//! turns into a [`Principal`]. This module only answers "may this role do
//! that": a closed role enum plus one capability check per privileged
//! operation, decided once in the handler instead of string comparisons
//! scattered across routes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    AdminInput,
    AdminView,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::AdminInput => "admin_input",
            Role::AdminView => "admin_view",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            "admin_input" => Some(Role::AdminInput),
            "admin_view" => Some(Role::AdminView),
            "super_admin" => Some(Role::SuperAdmin),
            _ => None,
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::ReviewRedemptions | Capability::AdjustPoints => {
                matches!(self, Role::Admin | Role::SuperAdmin)
            }
            Capability::AwardPurchase => {
                matches!(self, Role::Admin | Role::AdminInput | Role::SuperAdmin)
            }
            Capability::ViewAnyUser => {
                matches!(self, Role::Admin | Role::AdminView | Role::SuperAdmin)
            }
            Capability::RepairLedger => matches!(self, Role::SuperAdmin),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Move a redemption through processing/ready/completed/rejected.
    ReviewRedemptions,
    /// Apply a signed manual ledger adjustment.
    AdjustPoints,
    /// Credit purchase points on behalf of a user.
    AwardPurchase,
    /// Read another user's balance, history and requests.
    ViewAnyUser,
    /// Recompute a cached balance from the ledger.
    RepairLedger,
}

/// Authenticated caller as established by the gateway.
#[derive(Debug, Clone, Copy)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn require(&self, capability: Capability) -> Result<(), EngineError> {
        if self.role.allows(capability) {
            Ok(())
        } else {
            Err(EngineError::Forbidden(
                "role does not grant this operation",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_round_trip() {
        for role in [
            Role::User,
            Role::Admin,
            Role::AdminInput,
            Role::AdminView,
            Role::SuperAdmin,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("root"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn test_plain_user_has_no_admin_capabilities() {
        for cap in [
            Capability::ReviewRedemptions,
            Capability::AdjustPoints,
            Capability::AwardPurchase,
            Capability::ViewAnyUser,
            Capability::RepairLedger,
        ] {
            assert!(!Role::User.allows(cap));
        }
    }

    #[test]
    fn test_admin_capability_matrix() {
        assert!(Role::Admin.allows(Capability::ReviewRedemptions));
        assert!(Role::Admin.allows(Capability::AdjustPoints));
        assert!(Role::Admin.allows(Capability::AwardPurchase));
        assert!(Role::Admin.allows(Capability::ViewAnyUser));
        assert!(!Role::Admin.allows(Capability::RepairLedger));
    }

    #[test]
    fn test_scoped_admin_roles() {
        // Input-only admins can award but not review or adjust.
        assert!(Role::AdminInput.allows(Capability::AwardPurchase));
        assert!(!Role::AdminInput.allows(Capability::ReviewRedemptions));
        assert!(!Role::AdminInput.allows(Capability::AdjustPoints));
        assert!(!Role::AdminInput.allows(Capability::ViewAnyUser));

        // View-only admins can read but mutate nothing.
        assert!(Role::AdminView.allows(Capability::ViewAnyUser));
        assert!(!Role::AdminView.allows(Capability::AwardPurchase));
        assert!(!Role::AdminView.allows(Capability::ReviewRedemptions));
        assert!(!Role::AdminView.allows(Capability::AdjustPoints));
    }

    #[test]
    fn test_super_admin_allows_everything() {
        for cap in [
            Capability::ReviewRedemptions,
            Capability::AdjustPoints,
            Capability::AwardPurchase,
            Capability::ViewAnyUser,
            Capability::RepairLedger,
        ] {
            assert!(Role::SuperAdmin.allows(cap));
        }
    }

    #[test]
    fn test_principal_require() {
        let admin = Principal {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        assert!(admin.require(Capability::AdjustPoints).is_ok());

        let user = Principal {
            user_id: Uuid::new_v4(),
            role: Role::User,
        };
        let err = user.require(Capability::AdjustPoints).unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }
}
