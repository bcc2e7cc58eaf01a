//! Row tree builder.
//!
//! Nodes live in an arena keyed by [`RowId`]; `parent`/`children` are id references, so the
//! forest holds no reference cycles and any node is reachable in O(1).

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::key::{IdMap, IdSet, SegmentMap};
use crate::{GridError, Result, RowId};

/// Where a row sits in the grouped hierarchy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RowPath {
    /// No grouping: the row is a root.
    #[default]
    Flat,
    /// Tree data: the row itself occupies the last segment (`["docs", "a.txt"]`).
    Tree(Vec<String>),
    /// Row grouping: `(field, key)` group segments; the row is a leaf under the last group.
    Groups(Vec<(String, String)>),
}

impl RowPath {
    /// Depth of the row itself once attached (roots are 0).
    fn row_depth(&self) -> usize {
        match self {
            Self::Flat => 0,
            Self::Tree(path) => path.len().saturating_sub(1),
            Self::Groups(groups) => groups.len(),
        }
    }
}

/// One input row of [`build_row_tree`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeInput {
    pub id: RowId,
    pub path: RowPath,
}

impl TreeInput {
    pub fn flat(id: impl Into<RowId>) -> Self {
        Self {
            id: id.into(),
            path: RowPath::Flat,
        }
    }

    pub fn tree<S: Into<String>>(id: impl Into<RowId>, path: impl IntoIterator<Item = S>) -> Self {
        Self {
            id: id.into(),
            path: RowPath::Tree(path.into_iter().map(Into::into).collect()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RowNode {
    pub id: RowId,
    pub parent: Option<RowId>,
    pub children: Vec<RowId>,
    pub depth: usize,
    /// The segment that produced this node (`None` for row-grouping leaves and flat rows).
    pub grouping_key: Option<String>,
    /// For row-grouping groups, the field whose value is `grouping_key`.
    pub grouping_field: Option<String>,
    pub children_expanded: bool,
    /// Synthesized group with no underlying record.
    pub is_auto_generated: bool,
}

impl RowNode {
    fn new(id: RowId, parent: Option<RowId>, depth: usize) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            depth,
            grouping_key: None,
            grouping_field: None,
            children_expanded: false,
            is_auto_generated: false,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

pub type ExpansionPredicate = Arc<dyn Fn(&RowNode) -> bool + Send + Sync>;

/// Default expansion policy applied when a tree is built.
#[derive(Clone, Default)]
pub struct ExpansionConfig {
    /// Nodes with `depth <= d` start expanded; `None` starts everything collapsed.
    pub default_expansion_depth: Option<usize>,
    /// Overrides `default_expansion_depth` when set.
    pub predicate: Option<ExpansionPredicate>,
}

impl ExpansionConfig {
    pub fn is_expanded(&self, node: &RowNode) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(node),
            None => self
                .default_expansion_depth
                .is_some_and(|depth| node.depth <= depth),
        }
    }
}

impl core::fmt::Debug for ExpansionConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExpansionConfig")
            .field("default_expansion_depth", &self.default_expansion_depth)
            .field("predicate", &self.predicate.as_ref().map(|_| ".."))
            .finish()
    }
}

/// A forest of row nodes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowTree {
    pub(crate) nodes: IdMap<RowNode>,
    pub(crate) roots: Vec<RowId>,
}

impl RowTree {
    pub fn node(&self, id: &RowId) -> Option<&RowNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &RowId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn roots(&self) -> &[RowId] {
        &self.roots
    }

    pub fn children(&self, id: &RowId) -> &[RowId] {
        self.nodes.get(id).map_or(&[], |n| n.children.as_slice())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether any node has children.
    pub fn is_hierarchical(&self) -> bool {
        self.roots.len() != self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RowNode> {
        self.nodes.values()
    }

    /// Ancestors of `id`, nearest first.
    ///
    /// The walk is bounded by the node count, so a corrupted parent chain reports
    /// [`GridError::TreeCycle`] instead of looping.
    pub fn ancestors(&self, id: &RowId) -> Result<Vec<RowId>> {
        let mut out = Vec::new();
        let mut cur = self
            .nodes
            .get(id)
            .ok_or_else(|| GridError::UnknownRow { id: id.clone() })?;
        while let Some(parent) = &cur.parent {
            if out.len() >= self.nodes.len() {
                return Err(GridError::TreeCycle { id: id.clone() });
            }
            out.push(parent.clone());
            cur = self
                .nodes
                .get(parent)
                .ok_or_else(|| GridError::DetachedNode {
                    id: cur.id.clone(),
                    parent: parent.clone(),
                })?;
        }
        Ok(out)
    }

    /// Returns a copy of the tree with one node's expansion flag changed.
    pub fn with_expansion(&self, id: &RowId, expanded: bool) -> Result<Self> {
        let mut next = self.clone();
        let node = next
            .nodes
            .get_mut(id)
            .ok_or_else(|| GridError::UnknownRow { id: id.clone() })?;
        node.children_expanded = expanded;
        Ok(next)
    }

    pub(crate) fn set_expanded(&mut self, id: &RowId, expanded: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.children_expanded = expanded;
        }
    }

    /// Checks the forest invariants: every node reachable exactly once from the roots, parent
    /// links matching children lists, and `depth == parent depth + 1`.
    pub fn validate(&self) -> Result<()> {
        let mut seen = IdSet::default();
        let mut stack: Vec<(&RowId, Option<&RowId>, usize)> =
            self.roots.iter().rev().map(|id| (id, None, 0)).collect();

        while let Some((id, parent, depth)) = stack.pop() {
            if !seen.insert(id.clone()) {
                return Err(GridError::TreeCycle { id: id.clone() });
            }
            let node = self
                .nodes
                .get(id)
                .ok_or_else(|| GridError::UnknownRow { id: id.clone() })?;
            if node.parent.as_ref() != parent {
                return Err(GridError::DetachedNode {
                    id: id.clone(),
                    parent: parent.cloned().unwrap_or_else(|| id.clone()),
                });
            }
            if node.depth != depth {
                return Err(GridError::DepthMismatch {
                    id: id.clone(),
                    depth: node.depth,
                    expected: depth,
                });
            }
            for child in node.children.iter().rev() {
                stack.push((child, Some(id), depth + 1));
            }
        }

        if let Some(orphan) = self.nodes.values().find(|n| !seen.contains(&n.id)) {
            // An unreachable parent loop is a cycle, not just a detached node.
            self.ancestors(&orphan.id)?;
            return Err(GridError::DetachedNode {
                id: orphan.id.clone(),
                parent: orphan.parent.clone().unwrap_or_else(|| orphan.id.clone()),
            });
        }
        Ok(())
    }

    fn attach(&mut self, node: RowNode) {
        match &node.parent {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(parent) {
                    p.children.push(node.id.clone());
                }
            }
            None => self.roots.push(node.id.clone()),
        }
        self.nodes.insert(node.id.clone(), node);
    }

    fn depth_below(&self, parent: Option<&RowId>) -> usize {
        parent
            .and_then(|p| self.nodes.get(p))
            .map_or(0, |p| p.depth + 1)
    }
}

/// Builds the row forest.
///
/// Rows are processed by ascending path depth (stable), so every ancestor exists before a
/// descendant is attached and the input order of rows with different depths does not matter.
/// Two rows with the same tree path fail with [`GridError::DuplicatePath`].
pub fn build_row_tree(rows: &[TreeInput], expansion: &ExpansionConfig) -> Result<RowTree> {
    gdebug!(rows = rows.len(), "build_row_tree");

    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by_key(|&i| rows[i].path.row_depth());

    let mut tree = RowTree::default();
    let mut lookup = SegmentMap::default();

    for i in order {
        let input = &rows[i];
        if tree.nodes.contains_key(&input.id) {
            return Err(GridError::DuplicateRowId {
                id: input.id.clone(),
            });
        }

        match &input.path {
            RowPath::Flat => {
                tree.attach(RowNode::new(input.id.clone(), None, 0));
            }
            RowPath::Tree(path) => {
                let Some((terminal, ancestors)) = path.split_last() else {
                    tree.attach(RowNode::new(input.id.clone(), None, 0));
                    continue;
                };
                let parent = ensure_groups(
                    &mut tree,
                    &mut lookup,
                    ancestors.iter().map(|key| (None, key)),
                );
                let slot = (parent.clone(), terminal.clone());
                // Shallower rows come first, so the slot can only hold another row.
                match lookup.get(&slot) {
                    Some(existing) => {
                        return Err(GridError::DuplicatePath {
                            existing: existing.clone(),
                            duplicate: input.id.clone(),
                        });
                    }
                    None => {
                        let depth = tree.depth_below(parent.as_ref());
                        let mut node = RowNode::new(input.id.clone(), parent, depth);
                        node.grouping_key = Some(terminal.clone());
                        tree.attach(node);
                        lookup.insert(slot, input.id.clone());
                    }
                }
            }
            RowPath::Groups(groups) => {
                let parent = ensure_groups(
                    &mut tree,
                    &mut lookup,
                    groups.iter().map(|(field, key)| (Some(field), key)),
                );
                let depth = tree.depth_below(parent.as_ref());
                tree.attach(RowNode::new(input.id.clone(), parent, depth));
            }
        }
    }

    for node in tree.nodes.values_mut() {
        if !node.children.is_empty() {
            node.children_expanded = expansion.is_expanded(node);
        }
    }
    Ok(tree)
}

/// Walks `segments` from the roots, synthesizing missing group nodes. Returns the last node.
fn ensure_groups<'a>(
    tree: &mut RowTree,
    lookup: &mut SegmentMap,
    segments: impl Iterator<Item = (Option<&'a String>, &'a String)>,
) -> Option<RowId> {
    let mut parent: Option<RowId> = None;
    let mut prefix: Vec<String> = Vec::new();
    for (field, key) in segments {
        prefix.push(key.clone());
        let slot = (parent.clone(), key.clone());
        if let Some(existing) = lookup.get(&slot) {
            parent = Some(existing.clone());
            continue;
        }
        let id = RowId::Group(prefix.clone());
        let depth = tree.depth_below(parent.as_ref());
        let mut node = RowNode::new(id.clone(), parent.take(), depth);
        node.grouping_key = Some(key.clone());
        node.grouping_field = field.cloned();
        node.is_auto_generated = true;
        tree.attach(node);
        lookup.insert(slot, id.clone());
        parent = Some(id);
    }
    parent
}
