//! Caller roles
//!
//! Stored role labels are German-first (`experte`) with English aliases
//! accepted on read. Unknown labels degrade to `User`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Role of an authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Role {
    /// Field observer - sees and manages own records only
    #[default]
    User = 0,
    /// Domain expert - verifies and corrects records
    Expert = 1,
    /// Administrator
    Admin = 2,
    /// Platform administrator
    SuperAdmin = 3,
}

impl Role {
    /// Parse a stored or token role label
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "experte" | "expert" => Role::Expert,
            "admin" => Role::Admin,
            "superadmin" | "super_admin" => Role::SuperAdmin,
            _ => Role::User,
        }
    }

    /// Canonical persisted label
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Expert => "experte",
            Role::Admin => "admin",
            Role::SuperAdmin => "superadmin",
        }
    }

    /// Expert, admin and superadmin may see every record and verify
    pub fn is_privileged(&self) -> bool {
        *self >= Role::Expert
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Role::parse(&label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(Role::parse("experte"), Role::Expert);
        assert_eq!(Role::parse("Expert"), Role::Expert);
        assert_eq!(Role::parse("admin"), Role::Admin);
        assert_eq!(Role::parse("superadmin"), Role::SuperAdmin);
        assert_eq!(Role::parse("user"), Role::User);
        assert_eq!(Role::parse("gardener"), Role::User);
        assert_eq!(Role::parse(""), Role::User);
    }

    #[test]
    fn test_privileged_roles() {
        assert!(!Role::User.is_privileged());
        assert!(Role::Expert.is_privileged());
        assert!(Role::Admin.is_privileged());
        assert!(Role::SuperAdmin.is_privileged());
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::SuperAdmin > Role::Admin);
        assert!(Role::Admin > Role::Expert);
        assert!(Role::Expert > Role::User);
    }

    #[test]
    fn test_serde_uses_persisted_labels() {
        assert_eq!(serde_json::to_string(&Role::Expert).unwrap(), "\"experte\"");
        let role: Role = serde_json::from_str("\"expert\"").unwrap();
        assert_eq!(role, Role::Expert);
        let role: Role = serde_json::from_str("\"unknown\"").unwrap();
        assert_eq!(role, Role::User);
    }
}
