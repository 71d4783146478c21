//! Sibling position index
//!
//! Positions are 1-based and, for every parent, form the contiguous set
//! `{1..N}`. The functions here are pure: they compute plans against any
//! [`Siblings`] view (persisted rows inside a transaction, or the in-memory
//! tree) and leave applying them to the caller, so the row store and the tree
//! snapshot run the exact same arithmetic.

use crate::error::{Error, Result};

/// Anything that sits at a sibling position under a parent
pub trait Positioned {
    /// Page code
    fn code(&self) -> &str;
    /// Parent code, `None` for the root
    fn parent_code(&self) -> Option<&str>;
    /// Current 1-based position
    fn position(&self) -> i32;
    /// Overwrite the position
    fn set_position(&mut self, position: i32);
}

/// Read access to a set of positioned nodes
pub trait Siblings {
    /// Node type
    type Node: Positioned;

    /// Node by code
    fn lookup(&self, code: &str) -> Option<&Self::Node>;

    /// Children of `parent_code`; `None` entries are children that could not be resolved
    fn children_positions(&self, parent_code: &str) -> Vec<Option<i32>>;

    /// Number of nodes, bounds ancestor walks
    fn node_count(&self) -> usize;
}

/// Position for a node appended under a parent with the given children.
///
/// `max + 1`, or `1` for the first child. If any child could not be resolved
/// the maximum is unreliable and `count + 1` is used instead.
pub fn next_position<I>(children: I) -> i32
where
    I: IntoIterator<Item = Option<i32>>,
{
    let mut count = 0;
    let mut max = 0;
    let mut hole = false;
    for child in children {
        count += 1;
        match child {
            Some(position) => max = max.max(position),
            None => hole = true,
        }
    }
    if count == 0 {
        1
    } else if hole {
        count + 1
    } else {
        max + 1
    }
}

/// Decrement every sibling under `parent_code` positioned after `deleted`.
///
/// Returns the number of shifted nodes.
pub fn shift_down<'a, T, I>(nodes: I, parent_code: &str, deleted: i32) -> usize
where
    T: Positioned + 'a,
    I: IntoIterator<Item = &'a mut T>,
{
    let mut shifted = 0;
    for node in nodes {
        if node.parent_code() == Some(parent_code) && node.position() > deleted {
            let position = node.position();
            node.set_position(position - 1);
            shifted += 1;
        }
    }
    shifted
}

/// Whether `positions` is exactly `{1..N}`
pub fn is_contiguous<I>(positions: I) -> bool
where
    I: IntoIterator<Item = i32>,
{
    let mut sorted: Vec<i32> = positions.into_iter().collect();
    sorted.sort_unstable();
    sorted.iter().enumerate().all(|(idx, &pos)| pos == idx as i32 + 1)
}

/// Codes from the parent of `code` up to the root, nearest first.
///
/// Stops early on a dangling parent reference or a parent loop.
pub fn ancestors<S: Siblings>(tree: &S, code: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = tree.lookup(code).and_then(|n| n.parent_code()).map(str::to_string);
    while let Some(parent) = current {
        if chain.len() > tree.node_count() || chain.contains(&parent) {
            break;
        }
        current = tree.lookup(&parent).and_then(|n| n.parent_code()).map(str::to_string);
        chain.push(parent);
    }
    chain
}

/// Whether `code` sits anywhere below `ancestor`
pub fn is_descendant<S: Siblings>(tree: &S, code: &str, ancestor: &str) -> bool {
    ancestors(tree, code).iter().any(|c| c == ancestor)
}

/// Exchange of two adjacent sibling positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPlan {
    /// Page moving towards position 1 (`pos - 1`)
    pub up: String,
    /// Page moving away from position 1 (`pos + 1`)
    pub down: String,
}

/// Plan a one-step move of `code` among its siblings.
///
/// `Ok(None)` when the page is already first (moving up) or last (moving
/// down), or is the root.
pub fn plan_swap<S, F>(tree: &S, code: &str, up: bool, sibling_at: F) -> Result<Option<SwapPlan>>
where
    S: Siblings,
    F: Fn(&str, i32) -> Option<String>,
{
    let node = tree.lookup(code).ok_or_else(|| Error::draft_not_found(code))?;
    let Some(parent) = node.parent_code() else {
        return Ok(None);
    };
    let target = if up { node.position() - 1 } else { node.position() + 1 };
    if target < 1 {
        return Ok(None);
    }
    let Some(neighbour) = sibling_at(parent, target) else {
        return Ok(None);
    };
    let plan = if up {
        SwapPlan { up: code.to_string(), down: neighbour }
    } else {
        SwapPlan { up: neighbour, down: code.to_string() }
    };
    Ok(Some(plan))
}

/// Relocation of a page under a new parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReparentPlan {
    /// Page being moved
    pub code: String,
    /// Parent before the move
    pub old_parent: String,
    /// Position under the old parent
    pub old_position: i32,
    /// Parent after the move
    pub new_parent: String,
    /// Position appended under the new parent
    pub new_position: i32,
}

/// Plan moving `code` to the end of `new_parent`'s children.
///
/// `Ok(None)` when `new_parent` already is the parent. Fails when either page
/// is missing, when `code` is the root, or when `new_parent` is `code` itself
/// or one of its descendants.
pub fn plan_reparent<S: Siblings>(tree: &S, code: &str, new_parent: &str) -> Result<Option<ReparentPlan>> {
    let node = tree.lookup(code).ok_or_else(|| Error::draft_not_found(code))?;
    if tree.lookup(new_parent).is_none() {
        return Err(Error::draft_not_found(new_parent));
    }
    let Some(old_parent) = node.parent_code() else {
        return Err(Error::InvalidOperation("the root page cannot be moved"));
    };
    if new_parent == code || is_descendant(tree, new_parent, code) {
        return Err(Error::CyclicMove { code: code.to_string(), target: new_parent.to_string() });
    }
    if old_parent == new_parent {
        return Ok(None);
    }
    Ok(Some(ReparentPlan {
        code: code.to_string(),
        old_parent: old_parent.to_string(),
        old_position: node.position(),
        new_parent: new_parent.to_string(),
        new_position: next_position(tree.children_positions(new_parent)),
    }))
}
