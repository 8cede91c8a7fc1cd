//! Membership predicate.
//!
//! A project is visible to, and mutable by, its creator and its listed
//! members. There are no separate read/write roles.

use crate::model::{Identity, Project};

/// True iff `actor` created `project` or is listed among its members.
#[must_use]
pub fn can_access(actor: &Identity, project: &Project) -> bool {
    project.created_by == *actor || project.members.contains(actor)
}

/// Write eligibility. Same rule as [`can_access`].
#[must_use]
pub fn can_mutate(actor: &Identity, project: &Project) -> bool {
    can_access(actor, project)
}

#[cfg(test)]
mod tests {
    use super::{can_access, can_mutate};
    use crate::model::{Identity, Project, ProjectDraft};

    fn ident(raw: &str) -> Identity {
        Identity::parse(raw).expect("valid identity")
    }

    #[test]
    fn creator_and_members_have_access() {
        let mut project =
            Project::from_draft("p1", &ProjectDraft::named("Alpha"), ident("a@x.com"));
        project.members.insert(ident("b@x.com"));

        assert!(can_access(&ident("A@X.com"), &project));
        assert!(can_access(&ident("b@x.com"), &project));
        assert!(!can_access(&ident("c@x.com"), &project));
        assert!(!can_mutate(&ident("c@x.com"), &project));
    }

    #[test]
    fn creator_has_access_even_if_members_list_is_stale() {
        let mut project =
            Project::from_draft("p1", &ProjectDraft::named("Alpha"), ident("a@x.com"));
        project.members.clear();
        assert!(can_mutate(&ident("a@x.com"), &project));
    }
}
