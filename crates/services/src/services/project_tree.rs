use std::collections::HashMap;

use db::models::{
    priority::Priority,
    project::{ProjectStatus, ProjectWithStats},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ProjectNode {
    #[serde(flatten)]
    #[ts(flatten)]
    pub project: ProjectWithStats,
    pub children: Vec<ProjectNode>,
}

impl ProjectNode {
    fn leaf(project: ProjectWithStats) -> Self {
        Self {
            project,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including itself.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(ProjectNode::size).sum::<usize>()
    }
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct ProjectTreeFilter {
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    pub search: Option<String>,
}

impl ProjectTreeFilter {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.priority.is_none()
            && self.search.as_deref().is_none_or(|s| s.trim().is_empty())
    }

    pub fn matches(&self, project: &ProjectWithStats) -> bool {
        if self.status.is_some_and(|s| s != project.status) {
            return false;
        }
        if self.priority.is_some_and(|p| p != project.priority) {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => {
                let term = term.to_lowercase();
                project.name.to_lowercase().contains(&term)
                    || project
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&term))
            }
            None => true,
        }
    }
}

/// Arrange a flat list into a forest.
///
/// Roots are projects whose parent is not in the list. Siblings keep their input order.
/// Projects caught in a parent cycle are promoted to roots rather than dropped.
pub fn build_tree(projects: Vec<ProjectWithStats>) -> Vec<ProjectNode> {
    let index: HashMap<Uuid, usize> = projects.iter().enumerate().map(|(i, p)| (p.id, i)).collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); projects.len()];
    let mut roots = Vec::new();
    for (i, project) in projects.iter().enumerate() {
        match project.parent_id.and_then(|pid| index.get(&pid)) {
            Some(&parent) if parent != i => children[parent].push(i),
            _ => roots.push(i),
        }
    }

    let mut slots: Vec<Option<ProjectWithStats>> = projects.into_iter().map(Some).collect();
    let mut forest: Vec<ProjectNode> = roots
        .into_iter()
        .filter_map(|root| assemble(root, &children, &mut slots))
        .collect();

    // Anything still unclaimed sits on a cycle with no way in from a root.
    for i in 0..slots.len() {
        if slots[i].is_some() {
            if let Some(node) = assemble(i, &children, &mut slots) {
                forest.push(node);
            }
        }
    }
    forest
}

fn assemble(
    i: usize,
    children: &[Vec<usize>],
    slots: &mut [Option<ProjectWithStats>],
) -> Option<ProjectNode> {
    let mut node = ProjectNode::leaf(slots[i].take()?);
    node.children = children[i]
        .iter()
        .filter_map(|&child| assemble(child, children, slots))
        .collect();
    Some(node)
}

/// Keep every node that matches `pred` or has a matching descendant.
pub fn prune<F>(nodes: Vec<ProjectNode>, pred: &F) -> Vec<ProjectNode>
where
    F: Fn(&ProjectWithStats) -> bool,
{
    nodes
        .into_iter()
        .filter_map(|mut node| {
            node.children = prune(std::mem::take(&mut node.children), pred);
            (pred(&node.project) || !node.children.is_empty()).then_some(node)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use db::models::project::Project;

    use super::*;

    fn project(name: &str, parent_id: Option<Uuid>) -> ProjectWithStats {
        let now = Utc::now();
        ProjectWithStats {
            project: Project {
                id: Uuid::new_v4(),
                name: name.to_string(),
                description: None,
                status: ProjectStatus::Active,
                priority: Priority::Medium,
                parent_id,
                owner_id: Uuid::nil(),
                start_date: None,
                end_date: None,
                color: None,
                created_at: now,
                updated_at: now,
            },
            task_count: 0,
            completed_task_count: 0,
            progress: 0,
        }
    }

    fn names(nodes: &[ProjectNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.project.name.as_str()).collect()
    }

    #[test]
    fn builds_nested_tree_in_input_order() {
        let root = project("root", None);
        let a = project("a", Some(root.id));
        let b = project("b", Some(root.id));
        let a1 = project("a1", Some(a.id));
        // Child listed before its parent
        let tree = build_tree(vec![a1.clone(), root.clone(), a.clone(), b.clone()]);

        assert_eq!(names(&tree), vec!["root"]);
        assert_eq!(names(&tree[0].children), vec!["a", "b"]);
        assert_eq!(names(&tree[0].children[0].children), vec!["a1"]);
        assert_eq!(tree[0].size(), 4);
    }

    #[test]
    fn orphans_become_roots() {
        let orphan = project("orphan", Some(Uuid::new_v4()));
        let root = project("root", None);
        let tree = build_tree(vec![orphan, root]);
        assert_eq!(names(&tree), vec!["orphan", "root"]);
    }

    #[test]
    fn cycles_do_not_lose_projects() {
        let mut a = project("a", None);
        let b = project("b", Some(a.id));
        a.project.parent_id = Some(b.id);
        let mut selfish = project("self", None);
        selfish.project.parent_id = Some(selfish.id);

        let tree = build_tree(vec![a, b, selfish]);
        let total: usize = tree.iter().map(ProjectNode::size).sum();
        assert_eq!(total, 3);
        assert!(names(&tree).contains(&"self"));
    }

    #[test]
    fn prune_keeps_ancestors_of_matches() {
        let root = project("Website", None);
        let child = project("Checkout redesign", Some(root.id));
        let other = project("Hiring", None);
        let tree = build_tree(vec![root, child, other]);

        let filter = ProjectTreeFilter {
            search: Some("CHECKOUT".to_string()),
            ..Default::default()
        };
        let pruned = prune(tree, &|p| filter.matches(p));
        assert_eq!(names(&pruned), vec!["Website"]);
        assert_eq!(names(&pruned[0].children), vec!["Checkout redesign"]);
    }

    #[test]
    fn filter_matches_status_priority_and_description() {
        let mut p = project("Infra", None);
        p.project.description = Some("Move to the new cluster".to_string());
        p.project.priority = Priority::High;

        assert!(ProjectTreeFilter::default().is_empty());
        assert!(
            ProjectTreeFilter {
                search: Some("cluster".to_string()),
                priority: Some(Priority::High),
                ..Default::default()
            }
            .matches(&p)
        );
        assert!(
            !ProjectTreeFilter {
                status: Some(ProjectStatus::Completed),
                ..Default::default()
            }
            .matches(&p)
        );
    }
}
