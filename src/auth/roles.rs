use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Cashier,
}

/// Actions gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewProducts,
    ManageProducts,
    ManageCatalog,
    AdjustStock,
    ManagePurchases,
    CreateSales,
    ViewSales,
    PrintBarcodes,
    ViewActivity,
    ReadConfig,
    WriteConfig,
    ManageUsers,
}

const MANAGER_PERMISSIONS: &[Permission] = &[
    Permission::ViewProducts,
    Permission::ManageProducts,
    Permission::ManageCatalog,
    Permission::AdjustStock,
    Permission::ManagePurchases,
    Permission::CreateSales,
    Permission::ViewSales,
    Permission::PrintBarcodes,
    Permission::ViewActivity,
    Permission::ReadConfig,
];

const CASHIER_PERMISSIONS: &[Permission] = &[
    Permission::ViewProducts,
    Permission::CreateSales,
    Permission::ViewSales,
    Permission::PrintBarcodes,
];

impl Role {
    pub fn can(self, permission: Permission) -> bool {
        match self {
            Role::Admin => true,
            Role::Manager => MANAGER_PERMISSIONS.contains(&permission),
            Role::Cashier => CASHIER_PERMISSIONS.contains(&permission),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Cashier => "cashier",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_can_do_everything() {
        for p in [Permission::ManageUsers, Permission::WriteConfig, Permission::CreateSales] {
            assert!(Role::Admin.can(p));
        }
    }

    #[test]
    fn cashier_sells_but_does_not_manage() {
        assert!(Role::Cashier.can(Permission::CreateSales));
        assert!(Role::Cashier.can(Permission::ViewProducts));
        assert!(!Role::Cashier.can(Permission::ManageProducts));
        assert!(!Role::Cashier.can(Permission::ViewActivity));
        assert!(!Role::Cashier.can(Permission::ManageUsers));
    }

    #[test]
    fn only_admin_manages_users_and_config() {
        assert!(!Role::Manager.can(Permission::ManageUsers));
        assert!(!Role::Manager.can(Permission::WriteConfig));
        assert!(Role::Manager.can(Permission::ReadConfig));
        assert!(Role::Manager.can(Permission::AdjustStock));
    }

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Cashier).unwrap(), "\"cashier\"");
        let role: Role = serde_json::from_str("\"manager\"").unwrap();
        assert_eq!(role, Role::Manager);
        assert!(serde_json::from_str::<Role>("\"owner\"").is_err());
    }
}
