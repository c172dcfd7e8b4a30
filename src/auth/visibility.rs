//! Record and name visibility rules
//!
//! The listing predicate, the facet predicate and the direct-lookup check all
//! come from here, so a caller can never learn about a record through one
//! path that another path would hide.

use tracing::info;

use crate::auth::Caller;
use crate::db::query::{RecordFilters, RecordQuery};
use crate::db::schemas::{HabitatRecord, NameVisibility, UserDoc};

/// Narrow the requested filters to what `caller` may see.
///
/// Privileged callers keep every filter. Everyone else is pinned to their own
/// records; a person filter naming someone else is dropped, not rejected.
pub fn build_filter(caller: &Caller, requested: &RecordFilters) -> RecordQuery {
    let mut query = RecordQuery::from_filters(requested);

    if caller.role.is_privileged() {
        return query;
    }

    if let Some(person) = query.person.take() {
        if !refers_to(caller, &person) {
            info!(
                caller = %caller.email,
                requested_person = %person,
                "Ignoring person filter for non-privileged caller"
            );
        }
    }

    query.author_email = Some(caller.email.clone());
    query
}

/// Predicate for public listings and facets: verified, non-deleted records of
/// any author. Person filtering is applied separately once name visibility
/// has been checked, and free-text search never looks at author names.
pub fn build_public_filter(requested: &RecordFilters) -> RecordQuery {
    let mut query = RecordQuery::from_filters(requested);
    query.author_email = None;
    query.person = None;
    query.verified = Some(true);
    query.hide_author_names = true;
    query
}

/// Direct lookup: owners and privileged callers, deleted records included
pub fn can_read_record(caller: &Caller, record: &HabitatRecord) -> bool {
    caller.role.is_privileged() || caller.owns(&record.author_email)
}

/// Whether a person's name may be shown to `viewer`.
///
/// `identities` are the user documents behind the name; one permissive
/// identity is enough. Names without any user document stay hidden.
pub fn is_name_visible(viewer: Option<&Caller>, identities: &[UserDoc]) -> bool {
    identities.iter().any(|user| {
        if viewer.is_some_and(|v| v.email == user.email) {
            return true;
        }
        match user.habitat_name_visibility {
            NameVisibility::Public => true,
            NameVisibility::Members => match (viewer, &user.organization_id) {
                (Some(v), Some(org)) => v.organization_id.as_deref() == Some(org.as_str()),
                _ => false,
            },
            NameVisibility::Private => false,
        }
    })
}

fn refers_to(caller: &Caller, person: &str) -> bool {
    person.trim().to_lowercase() == caller.email || person == caller.name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    fn filters_for(person: &str) -> RecordFilters {
        RecordFilters {
            person: Some(person.to_string()),
            gemeinde: Some("Bozen".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_user_is_pinned_to_own_records() {
        let user = Caller::new("anna@example.org", Role::User);
        let query = build_filter(&user, &filters_for("bert@example.org"));

        assert_eq!(query.author_email.as_deref(), Some("anna@example.org"));
        assert_eq!(query.person, None);
        assert_eq!(query.gemeinde.as_deref(), Some("Bozen"));
    }

    #[test]
    fn test_expert_keeps_person_filter() {
        for role in [Role::Expert, Role::Admin, Role::SuperAdmin] {
            let caller = Caller::new("eva@example.org", role);
            let query = build_filter(&caller, &filters_for("bert@example.org"));
            assert_eq!(query.author_email, None);
            assert_eq!(query.person.as_deref(), Some("bert@example.org"));
        }
    }

    #[test]
    fn test_public_filter_forces_verified() {
        let requested = RecordFilters {
            verified: Some(false),
            person: Some("Anna".into()),
            ..Default::default()
        };
        let query = build_public_filter(&requested);
        assert_eq!(query.verified, Some(true));
        assert_eq!(query.person, None);
        assert!(query.hide_author_names);
        assert!(!build_filter(&Caller::new("eva@example.org", Role::Expert), &requested)
            .hide_author_names);
    }

    #[test]
    fn test_can_read_record() {
        let record = HabitatRecord::new("r-1", "anna@example.org");
        assert!(can_read_record(&Caller::new("anna@example.org", Role::User), &record));
        assert!(!can_read_record(&Caller::new("bert@example.org", Role::User), &record));
        assert!(can_read_record(&Caller::new("eva@example.org", Role::Expert), &record));
    }

    #[test]
    fn test_name_visibility_levels() {
        let public = UserDoc::new("pub@example.org", Role::User);
        let members = UserDoc::new("mem@example.org", Role::User)
            .with_organization("org-1")
            .with_visibility(NameVisibility::Members);
        let private = UserDoc::new("priv@example.org", Role::User)
            .with_visibility(NameVisibility::Private);

        let colleague = Caller::new("c@example.org", Role::User).with_organization("org-1");
        let stranger = Caller::new("s@example.org", Role::User).with_organization("org-2");

        assert!(is_name_visible(None, std::slice::from_ref(&public)));
        assert!(is_name_visible(Some(&colleague), std::slice::from_ref(&members)));
        assert!(!is_name_visible(Some(&stranger), std::slice::from_ref(&members)));
        assert!(!is_name_visible(None, std::slice::from_ref(&members)));
        assert!(!is_name_visible(Some(&colleague), std::slice::from_ref(&private)));

        let myself = Caller::new("priv@example.org", Role::User);
        assert!(is_name_visible(Some(&myself), std::slice::from_ref(&private)));
        assert!(!is_name_visible(None, &[]));
    }

    #[test]
    fn test_one_permissive_identity_is_enough() {
        let identities = vec![
            UserDoc::new("a@example.org", Role::User).with_visibility(NameVisibility::Private),
            UserDoc::new("b@example.org", Role::User),
        ];
        assert!(is_name_visible(None, &identities));
    }
}
