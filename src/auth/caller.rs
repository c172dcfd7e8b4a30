//! Authenticated caller identity

use crate::auth::Role;
use crate::db::schemas::{AuditUser, VerifiedBy};

/// Identity attached to every authenticated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Stable user id (falls back to the e-mail when the token carries none)
    pub user_id: String,
    /// Primary identifier, lowercased
    pub email: String,
    /// Display name used in audit entries
    pub name: String,
    pub role: Role,
    pub organization_id: Option<String>,
}

impl Caller {
    pub fn new(email: &str, role: Role) -> Self {
        let email = email.trim().to_lowercase();
        Self {
            user_id: email.clone(),
            name: email.clone(),
            email,
            role,
            organization_id: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Whether this caller may verify, correct and unverify records
    pub fn can_verify(&self) -> bool {
        self.role.is_privileged()
    }

    /// Whether the record author is this caller
    pub fn owns(&self, author_email: &str) -> bool {
        self.email == author_email
    }

    /// Whether this caller may change a record's lifecycle (re-analyze, delete)
    pub fn can_manage(&self, author_email: &str) -> bool {
        self.can_verify() || self.owns(author_email)
    }

    pub fn audit_user(&self) -> AuditUser {
        AuditUser {
            user_id: self.user_id.clone(),
            user_name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }

    pub fn verified_by(&self) -> VerifiedBy {
        VerifiedBy {
            user_id: self.user_id.clone(),
            user_name: self.name.clone(),
            role: self.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_is_normalized() {
        let caller = Caller::new("  Anna.Muster@Example.org ", Role::User);
        assert_eq!(caller.email, "anna.muster@example.org");
        assert!(caller.owns("anna.muster@example.org"));
    }

    #[test]
    fn test_manage_rules() {
        let owner = Caller::new("owner@example.org", Role::User);
        let other = Caller::new("other@example.org", Role::User);
        let expert = Caller::new("expert@example.org", Role::Expert);

        assert!(owner.can_manage("owner@example.org"));
        assert!(!other.can_manage("owner@example.org"));
        assert!(expert.can_manage("owner@example.org"));
        assert!(!owner.can_verify());
        assert!(expert.can_verify());
    }
}
