//! Project locator.
//!
//! Collaborators do not know which identity created a project, so a lookup
//! by id scans every partition. Partition count equals the number of
//! distinct owners the client has touched, which is bounded by the viewer's
//! collaboration graph.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::model::{Identity, Project};

/// A project found in the index together with the partition that holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub partition: Identity,
    pub project: Rc<Project>,
}

/// Scan all partitions for `project_id`.
#[must_use]
pub fn locate(
    partitions: &BTreeMap<Identity, BTreeMap<String, Rc<Project>>>,
    project_id: &str,
) -> Option<Located> {
    partitions.iter().find_map(|(partition, entities)| {
        entities.get(project_id).map(|project| Located {
            partition: partition.clone(),
            project: Rc::clone(project),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::locate;
    use crate::model::{Identity, Project, ProjectDraft};
    use std::collections::BTreeMap;
    use std::rc::Rc;

    fn ident(raw: &str) -> Identity {
        Identity::parse(raw).expect("valid identity")
    }

    #[test]
    fn finds_project_in_any_partition() {
        let mut partitions = BTreeMap::new();
        for (owner, id) in [("a@x.com", "p1"), ("b@x.com", "p2")] {
            let project = Project::from_draft(id, &ProjectDraft::named(id), ident(owner));
            partitions
                .entry(ident(owner))
                .or_insert_with(BTreeMap::new)
                .insert(id.to_string(), Rc::new(project));
        }

        let found = locate(&partitions, "p2").expect("p2 present");
        assert_eq!(found.partition, ident("b@x.com"));
        assert_eq!(found.project.id, "p2");
        assert!(locate(&partitions, "p3").is_none());
    }
}
