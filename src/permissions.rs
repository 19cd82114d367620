// Roles and the permissions each one carries

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

// ============================================================================
// ROLE
// ============================================================================

/// Pipeline stage for external users, job function for staff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Sales,
    Lead,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Sales => "sales",
            Role::Lead => "lead",
            Role::Customer => "customer",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "sales" => Some(Role::Sales),
            "lead" => Some(Role::Lead),
            "customer" => Some(Role::Customer),
            _ => None,
        }
    }

    /// Internal staff (as opposed to leads and customers)
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager | Role::Sales)
    }

    /// Human label used in "not found" messages
    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Manager => "Manajer",
            Role::Sales => "Sales",
            Role::Lead => "Lead",
            Role::Customer => "Pelanggan",
        }
    }

    /// Permission needed to manage users holding this role
    pub fn managed_by(&self) -> Permission {
        match self {
            Role::Admin | Role::Manager => Permission::ManageManagers,
            Role::Sales => Permission::ManageSales,
            Role::Lead => Permission::ManageLeads,
            Role::Customer => Permission::ManageCustomers,
        }
    }

    pub fn can(&self, permission: Permission) -> bool {
        use Permission::*;
        match self {
            Role::Admin => true,
            Role::Manager => permission != ManageManagers,
            Role::Sales => matches!(
                permission,
                ViewCatalog
                    | ManageLeads
                    | ManageCustomers
                    | ManageOffers
                    | ManageSubscriptions
                    | UsePersonalFinance
            ),
            Role::Lead | Role::Customer => {
                matches!(permission, ViewCatalog | RespondOffers | UsePersonalFinance)
            }
        }
    }
}

// ============================================================================
// PERMISSION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ManageCatalog,
    ViewCatalog,
    ManageLeads,
    ManageCustomers,
    ManageSales,
    ManageManagers,
    ManageOffers,
    RespondOffers,
    ManageSubscriptions,
    ApproveSubscriptions,
    ViewDashboard,
    ViewAuditLog,
    UsePersonalFinance,
}

/// Fail with `Forbidden` unless `role` carries `permission`.
pub fn authorize(role: Role, permission: Permission) -> AppResult<()> {
    if role.can(permission) {
        Ok(())
    } else {
        tracing::warn!(role = role.as_str(), ?permission, "permission denied");
        Err(AppError::Forbidden)
    }
}

/// Fail with `Forbidden` unless `role` carries at least one of `permissions`.
pub fn authorize_any(role: Role, permissions: &[Permission]) -> AppResult<()> {
    if permissions.iter().any(|p| role.can(*p)) {
        Ok(())
    } else {
        tracing::warn!(role = role.as_str(), ?permissions, "permission denied");
        Err(AppError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_names() {
        for role in [Role::Admin, Role::Manager, Role::Sales, Role::Lead, Role::Customer] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("owner"), None);
    }

    #[test]
    fn test_admin_can_everything() {
        assert!(Role::Admin.can(Permission::ManageManagers));
        assert!(Role::Admin.can(Permission::ApproveSubscriptions));
    }

    #[test]
    fn test_manager_cannot_manage_managers() {
        assert!(!Role::Manager.can(Permission::ManageManagers));
        assert!(Role::Manager.can(Permission::ManageSales));
        assert!(Role::Manager.can(Permission::ApproveSubscriptions));
    }

    #[test]
    fn test_sales_cannot_approve() {
        assert!(Role::Sales.can(Permission::ManageOffers));
        assert!(!Role::Sales.can(Permission::ApproveSubscriptions));
        assert!(!Role::Sales.can(Permission::ManageCatalog));
        assert!(authorize(Role::Sales, Permission::ViewDashboard).is_err());
    }

    #[test]
    fn test_external_users() {
        for role in [Role::Lead, Role::Customer] {
            assert!(role.can(Permission::RespondOffers));
            assert!(role.can(Permission::UsePersonalFinance));
            assert!(!role.can(Permission::ManageOffers));
            assert!(!role.is_staff());
        }
    }

    #[test]
    fn test_authorize_any() {
        use Permission::*;
        assert!(authorize_any(Role::Lead, &[ManageOffers, RespondOffers]).is_ok());
        assert!(authorize_any(Role::Sales, &[ApproveSubscriptions, ViewDashboard]).is_err());
    }
}
