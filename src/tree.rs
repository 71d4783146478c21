//! In-memory page tree
//!
//! [`PageTree`] indexes every [`PageNode`] by code and keeps each parent's
//! children ordered by position. [`PageTreeStore`] publishes it as an
//! immutable `Arc` snapshot: readers clone the `Arc` and never wait on a
//! writer, writers swap in a new tree after their transaction commits.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{PageNode, VersionKind};
use crate::position::{self, Positioned, ReparentPlan, Siblings, SwapPlan};

impl Positioned for PageNode {
    fn code(&self) -> &str {
        &self.code
    }

    fn parent_code(&self) -> Option<&str> {
        self.parent_code.as_deref()
    }

    fn position(&self) -> i32 {
        self.position
    }

    fn set_position(&mut self, position: i32) {
        self.position = position;
    }
}

/// Page tree keyed by code
#[derive(Debug, Clone, Default)]
pub struct PageTree {
    nodes: HashMap<String, PageNode>,
    children: HashMap<String, Vec<String>>,
    root: Option<String>,
}

impl PageTree {
    /// Build from loaded nodes
    pub fn from_nodes<I: IntoIterator<Item = PageNode>>(nodes: I) -> Self {
        let mut tree = PageTree::default();
        for node in nodes {
            if let Some(parent) = &node.parent_code {
                tree.children.entry(parent.clone()).or_default().push(node.code.clone());
            } else {
                tree.root = Some(node.code.clone());
            }
            tree.nodes.insert(node.code.clone(), node);
        }
        let codes: Vec<String> = tree.children.keys().cloned().collect();
        for parent in codes {
            tree.sort_children(&parent);
        }
        tree
    }

    fn sort_children(&mut self, parent: &str) {
        let nodes = &self.nodes;
        if let Some(codes) = self.children.get_mut(parent) {
            codes.sort_by(|a, b| {
                let pa = nodes.get(a).map_or(i32::MAX, |n| n.position);
                let pb = nodes.get(b).map_or(i32::MAX, |n| n.position);
                pa.cmp(&pb).then_with(|| a.cmp(b))
            });
        }
    }

    /// Number of pages
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no pages
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Page by code
    pub fn get(&self, code: &str) -> Option<&PageNode> {
        self.nodes.get(code)
    }

    /// Whether `code` exists
    pub fn contains(&self, code: &str) -> bool {
        self.nodes.contains_key(code)
    }

    /// Root page
    pub fn root(&self) -> Option<&PageNode> {
        self.root.as_deref().and_then(|code| self.nodes.get(code))
    }

    /// All pages, in no particular order
    pub fn nodes(&self) -> impl Iterator<Item = &PageNode> + '_ {
        self.nodes.values()
    }

    /// Child codes of `code` in position order
    pub fn children(&self, code: &str) -> &[String] {
        self.children.get(code).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Children of `code` in position order, restricted to pages that have `version`
    pub fn child_nodes(&self, code: &str, version: VersionKind) -> impl Iterator<Item = &PageNode> + '_ {
        self.children(code)
            .iter()
            .filter_map(|c| self.nodes.get(c))
            .filter(move |n| n.version(version).is_some())
    }

    /// Code of the child of `parent` at `position`
    pub fn child_at(&self, parent: &str, position: i32) -> Option<String> {
        self.children(parent)
            .iter()
            .find(|c| self.nodes.get(c.as_str()).is_some_and(|n| n.position == position))
            .cloned()
    }

    /// Add a node at the position it carries
    pub fn insert(&mut self, node: PageNode) {
        let code = node.code.clone();
        match node.parent_code.clone() {
            Some(parent) => {
                self.nodes.insert(code.clone(), node);
                self.children.entry(parent.clone()).or_default().push(code);
                self.sort_children(&parent);
            }
            None => {
                self.nodes.insert(code.clone(), node);
                self.root = Some(code);
            }
        }
    }

    /// Replace a node in place; parent and position are kept from the tree
    pub fn replace(&mut self, mut node: PageNode) {
        if let Some(current) = self.nodes.get_mut(&node.code) {
            node.parent_code = current.parent_code.clone();
            node.position = current.position;
            *current = node;
        }
    }

    /// Mutable access to a node
    pub fn get_mut(&mut self, code: &str) -> Option<&mut PageNode> {
        self.nodes.get_mut(code)
    }

    /// Remove a leaf and close the gap it leaves among its siblings
    pub fn remove(&mut self, code: &str) -> Option<PageNode> {
        let node = self.nodes.remove(code)?;
        self.children.remove(code);
        match &node.parent_code {
            Some(parent) => {
                if let Some(siblings) = self.children.get_mut(parent) {
                    siblings.retain(|c| c != code);
                }
                position::shift_down(self.nodes.values_mut(), parent, node.position);
            }
            None => self.root = None,
        }
        Some(node)
    }

    /// Apply a committed reparent
    pub fn apply_reparent(&mut self, plan: &ReparentPlan) {
        if let Some(node) = self.nodes.get_mut(&plan.code) {
            node.parent_code = Some(plan.new_parent.clone());
            node.position = plan.new_position;
        }
        if let Some(siblings) = self.children.get_mut(&plan.old_parent) {
            siblings.retain(|c| c != &plan.code);
        }
        self.children.entry(plan.new_parent.clone()).or_default().push(plan.code.clone());
        position::shift_down(self.nodes.values_mut(), &plan.old_parent, plan.old_position);
        self.sort_children(&plan.new_parent);
    }

    /// Apply a committed sibling swap
    pub fn apply_swap(&mut self, plan: &SwapPlan) {
        let mut parent = None;
        if let Some(node) = self.nodes.get_mut(&plan.up) {
            node.position -= 1;
            parent = node.parent_code.clone();
        }
        if let Some(node) = self.nodes.get_mut(&plan.down) {
            node.position += 1;
        }
        if let Some(parent) = parent {
            self.sort_children(&parent);
        }
    }
}

impl Siblings for PageTree {
    type Node = PageNode;

    fn lookup(&self, code: &str) -> Option<&PageNode> {
        self.nodes.get(code)
    }

    fn children_positions(&self, parent_code: &str) -> Vec<Option<i32>> {
        self.children(parent_code)
            .iter()
            .map(|c| self.nodes.get(c).map(|n| n.position))
            .collect()
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Shared, swappable tree snapshot
#[derive(Debug, Default)]
pub struct PageTreeStore {
    current: RwLock<Arc<PageTree>>,
}

impl PageTreeStore {
    /// Store holding `tree`
    pub fn new(tree: PageTree) -> Self {
        Self { current: RwLock::new(Arc::new(tree)) }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<PageTree> {
        Arc::clone(&self.current.read())
    }

    /// Replace the whole tree
    pub fn replace(&self, tree: PageTree) {
        *self.current.write() = Arc::new(tree);
    }

    /// Apply `f` to a copy of the tree and publish it. Readers holding the old
    /// snapshot keep it unchanged.
    ///
    /// The copy is made and edited without holding the lock, so `snapshot()`
    /// never waits for `f`. Callers must serialize updates among themselves.
    pub fn update<R>(&self, f: impl FnOnce(&mut PageTree) -> R) -> R {
        let mut next = PageTree::clone(&self.snapshot());
        let result = f(&mut next);
        *self.current.write() = Arc::new(next);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PageVersion;
    use std::time::Duration;

    fn node(code: &str, parent: Option<&str>, pos: i32) -> PageNode {
        let mut node = PageNode::new(code, parent.map(str::to_string), "free", PageVersion::new("home", 2));
        node.position = pos;
        node
    }

    fn sample() -> PageTree {
        PageTree::from_nodes(vec![
            node("c", Some("home"), 3),
            node("home", None, 1),
            node("a", Some("home"), 1),
            node("b", Some("home"), 2),
            node("b1", Some("b"), 1),
        ])
    }

    #[test]
    fn test_children_are_ordered() {
        let tree = sample();
        assert_eq!(tree.root().map(|n| n.code.as_str()), Some("home"));
        assert_eq!(tree.children("home"), ["a", "b", "c"]);
        assert!(tree.children("c").is_empty());
        assert_eq!(tree.child_at("home", 2).as_deref(), Some("b"));
    }

    #[test]
    fn test_remove_closes_gap() {
        let mut tree = sample();
        tree.remove("a").unwrap();
        assert_eq!(tree.children("home"), ["b", "c"]);
        assert_eq!(tree.get("b").unwrap().position, 1);
        assert_eq!(tree.get("c").unwrap().position, 2);
        assert_eq!(tree.get("b1").unwrap().position, 1);
    }

    #[test]
    fn test_apply_reparent_and_swap() {
        let mut tree = sample();
        let plan = position::plan_reparent(&tree, "a", "b").unwrap().unwrap();
        tree.apply_reparent(&plan);
        assert_eq!(tree.children("home"), ["b", "c"]);
        assert_eq!(tree.children("b"), ["b1", "a"]);
        assert_eq!(tree.get("a").unwrap().position, 2);
        assert_eq!(tree.get("c").unwrap().position, 2);

        let plan = position::plan_swap(&tree, "c", true, |p, pos| tree.child_at(p, pos)).unwrap().unwrap();
        tree.apply_swap(&plan);
        assert_eq!(tree.children("home"), ["c", "b"]);
    }

    #[test]
    fn test_online_children_filter() {
        let mut tree = sample();
        let b = tree.get_mut("b").unwrap();
        b.online = Some(b.draft.clone());
        let online: Vec<&str> = tree.child_nodes("home", VersionKind::Online).map(|n| n.code.as_str()).collect();
        assert_eq!(online, vec!["b"]);
        assert_eq!(tree.child_nodes("home", VersionKind::Draft).count(), 3);
    }

    #[test]
    fn test_store_snapshots_are_stable() {
        let store = PageTreeStore::new(sample());
        let before = store.snapshot();
        store.update(|tree| {
            tree.remove("c");
        });
        assert!(before.contains("c"));
        assert!(!store.snapshot().contains("c"));
        store.replace(PageTree::default());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_snapshot_does_not_wait_for_update() {
        let mut nodes = vec![node("home", None, 1)];
        nodes.extend((1..=5_000).map(|i| node(&format!("p{}", i), Some("home"), i)));
        let store = PageTreeStore::new(PageTree::from_nodes(nodes));
        let held = store.snapshot();

        let (tx, rx) = crossbeam_channel::bounded(1);
        let seen = store.update(|tree| {
            tree.remove("p1");
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    let _ = tx.send(store.snapshot().len());
                });
                rx.recv_timeout(Duration::from_secs(5))
            })
        });

        // The reader got the pre-update tree while the closure was still running
        assert_eq!(seen, Ok(5_001));
        assert_eq!(held.len(), 5_001);
        assert_eq!(store.snapshot().len(), 5_000);
        assert_eq!(store.snapshot().get("p2").map(|n| n.position), Some(1));
    }
}
