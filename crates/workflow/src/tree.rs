//! Turns the backend's mailing list forest into a selectable checkbox tree.

use std::collections::BTreeSet;

use serde::Serialize;
use shared::domain::{GroupId, GroupNode};

use crate::selection::group_field_key;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCheckbox {
    pub group_id: GroupId,
    pub field_key: String,
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub default: bool,
}

/// A group with children. Carries its own checkbox only when parent groups are selectable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupContainer {
    pub group_id: GroupId,
    pub title: String,
    pub description: Option<String>,
    pub checkbox: Option<GroupCheckbox>,
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Checkbox(GroupCheckbox),
    Container(GroupContainer),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectableTree {
    pub nodes: Vec<TreeNode>,
}

impl SelectableTree {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every checkbox in display order, depth first.
    pub fn checkboxes(&self) -> Vec<&GroupCheckbox> {
        let mut out = Vec::new();
        collect_checkboxes(&self.nodes, &mut out);
        out
    }

    /// Ids the visitor can actually toggle; the domain of a selection diff.
    pub fn checkbox_ids(&self) -> BTreeSet<GroupId> {
        self.checkboxes()
            .into_iter()
            .map(|checkbox| checkbox.group_id)
            .collect()
    }
}

fn collect_checkboxes<'a>(nodes: &'a [TreeNode], out: &mut Vec<&'a GroupCheckbox>) {
    for node in nodes {
        match node {
            TreeNode::Checkbox(checkbox) => out.push(checkbox),
            TreeNode::Container(container) => {
                if let Some(checkbox) = &container.checkbox {
                    out.push(checkbox);
                }
                collect_checkboxes(&container.children, out);
            }
        }
    }
}

pub fn build_tree(
    forest: &[GroupNode],
    subscribed: &BTreeSet<GroupId>,
    parent_groups_selectable: bool,
) -> SelectableTree {
    SelectableTree {
        nodes: build_level(forest, subscribed, parent_groups_selectable),
    }
}

fn build_level(
    nodes: &[GroupNode],
    subscribed: &BTreeSet<GroupId>,
    parent_groups_selectable: bool,
) -> Vec<TreeNode> {
    let level = nodes
        .iter()
        .map(|node| {
            if node.is_leaf() {
                TreeNode::Checkbox(checkbox_for(node, subscribed))
            } else {
                TreeNode::Container(GroupContainer {
                    group_id: node.id,
                    title: display_title(node).to_string(),
                    description: node.description.clone(),
                    checkbox: parent_groups_selectable.then(|| checkbox_for(node, subscribed)),
                    children: build_level(&node.children, subscribed, parent_groups_selectable),
                })
            }
        })
        .collect();
    hoist_leaves(level)
}

/// Leaves go first within a level; relative input order is kept on both sides.
fn hoist_leaves(level: Vec<TreeNode>) -> Vec<TreeNode> {
    let (leaves, containers): (Vec<_>, Vec<_>) = level
        .into_iter()
        .partition(|node| matches!(node, TreeNode::Checkbox(_)));
    leaves.into_iter().chain(containers).collect()
}

fn checkbox_for(node: &GroupNode, subscribed: &BTreeSet<GroupId>) -> GroupCheckbox {
    GroupCheckbox {
        group_id: node.id,
        field_key: group_field_key(node.id),
        name: node.name.clone(),
        title: display_title(node).to_string(),
        description: node.description.clone(),
        default: subscribed.contains(&node.id),
    }
}

fn display_title(node: &GroupNode) -> &str {
    if node.title.is_empty() {
        &node.name
    } else {
        &node.title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: i64, title: &str) -> GroupNode {
        GroupNode {
            id: GroupId(id),
            name: title.to_lowercase(),
            title: title.to_string(),
            description: None,
            children: Vec::new(),
        }
    }

    fn parent(id: i64, title: &str, children: Vec<GroupNode>) -> GroupNode {
        GroupNode {
            children,
            ..leaf(id, title)
        }
    }

    fn checkbox(node: &TreeNode) -> &GroupCheckbox {
        match node {
            TreeNode::Checkbox(checkbox) => checkbox,
            TreeNode::Container(container) => panic!("expected checkbox, got {container:?}"),
        }
    }

    fn container(node: &TreeNode) -> &GroupContainer {
        match node {
            TreeNode::Container(container) => container,
            TreeNode::Checkbox(checkbox) => panic!("expected container, got {checkbox:?}"),
        }
    }

    #[test]
    fn parents_without_checkbox_when_not_selectable() {
        let forest = [leaf(1, "Weekly"), parent(2, "Regional", vec![leaf(3, "North")])];
        let tree = build_tree(&forest, &BTreeSet::from([GroupId(3)]), false);

        let weekly = checkbox(&tree.nodes[0]);
        assert_eq!(weekly.group_id, GroupId(1));
        assert!(!weekly.default);

        let regional = container(&tree.nodes[1]);
        assert!(regional.checkbox.is_none());
        let north = checkbox(&regional.children[0]);
        assert_eq!(north.group_id, GroupId(3));
        assert!(north.default);
        assert_eq!(north.field_key, "mailing_lists_3");

        assert_eq!(tree.checkbox_ids(), BTreeSet::from([GroupId(1), GroupId(3)]));
    }

    #[test]
    fn selectable_parents_carry_their_own_checkbox() {
        let forest = [parent(2, "Regional", vec![leaf(3, "North")])];
        let tree = build_tree(&forest, &BTreeSet::from([GroupId(2)]), true);

        let regional = container(&tree.nodes[0]);
        let own = regional.checkbox.as_ref().expect("parent checkbox");
        assert!(own.default);
        assert!(!checkbox(&regional.children[0]).default);
        assert_eq!(tree.checkbox_ids(), BTreeSet::from([GroupId(2), GroupId(3)]));
    }

    #[test]
    fn leaves_are_hoisted_with_stable_order() {
        let forest = [
            parent(10, "A", vec![leaf(11, "A1")]),
            leaf(5, "Five"),
            parent(20, "B", vec![parent(21, "B1", vec![leaf(22, "B11")]), leaf(23, "B2")]),
            leaf(4, "Four"),
        ];
        let tree = build_tree(&forest, &BTreeSet::new(), false);

        let order: Vec<GroupId> = tree
            .nodes
            .iter()
            .map(|node| match node {
                TreeNode::Checkbox(checkbox) => checkbox.group_id,
                TreeNode::Container(container) => container.group_id,
            })
            .collect();
        assert_eq!(order, [GroupId(5), GroupId(4), GroupId(10), GroupId(20)]);

        let b = container(&tree.nodes[3]);
        assert_eq!(checkbox(&b.children[0]).group_id, GroupId(23));
        assert_eq!(container(&b.children[1]).group_id, GroupId(21));
    }

    #[test]
    fn building_twice_yields_the_same_tree() {
        let forest = [leaf(1, "One"), parent(2, "Two", vec![leaf(3, "Three"), leaf(4, "Four")])];
        let subscribed = BTreeSet::from([GroupId(1), GroupId(4)]);

        let first = build_tree(&forest, &subscribed, true);
        let second = build_tree(&forest, &subscribed, true);
        assert_eq!(first, second);

        for checkbox in first.checkboxes() {
            assert_eq!(checkbox.default, subscribed.contains(&checkbox.group_id));
        }
    }

    #[test]
    fn untitled_groups_fall_back_to_their_name() {
        let mut node = leaf(7, "");
        node.name = "internal_name".into();
        let tree = build_tree(&[node], &BTreeSet::new(), false);
        assert_eq!(checkbox(&tree.nodes[0]).title, "internal_name");
    }
}
