//! Customers, memberships and acting principals.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Membership tier of the customer owning a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    Standard,
    Premium,
}

impl Membership {
    pub fn as_str(&self) -> &'static str {
        match self {
            Membership::Standard => "standard",
            Membership::Premium => "premium",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "premium" => Membership::Premium,
            _ => Membership::Standard,
        }
    }
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer as seen through the vehicle that was brought in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub name: String,
    pub email: String,
    pub membership: Membership,
}

/// Role of an acting principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Advisor,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Advisor => "advisor",
            Role::Customer => "customer",
        }
    }

    /// Normalize a raw role token from the identity provider.
    ///
    /// Tokens arrive in mixed case ("ADMIN", "admin") and with legacy aliases.
    pub fn from_token(token: &str) -> Option<Self> {
        let normalized = token.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "admin" | "administrator" | "role_admin" => Some(Role::Admin),
            "advisor" | "service_advisor" | "serviceadvisor" | "role_advisor" => {
                Some(Role::Advisor)
            }
            "customer" | "user" | "role_customer" | "role_user" => Some(Role::Customer),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub principal_id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(principal_id: impl Into<String>, role: Role) -> Self {
        Self {
            principal_id: principal_id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_tokens_normalize_regardless_of_case() {
        assert_eq!(Role::from_token("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::from_token("admin"), Some(Role::Admin));
        assert_eq!(Role::from_token("Service-Advisor"), Some(Role::Advisor));
        assert_eq!(Role::from_token("ROLE_USER"), Some(Role::Customer));
        assert_eq!(Role::from_token("mechanic"), None);
    }

    #[test]
    fn unknown_membership_is_standard() {
        assert_eq!(Membership::from_string("PREMIUM"), Membership::Premium);
        assert_eq!(Membership::from_string("gold"), Membership::Standard);
    }
}
