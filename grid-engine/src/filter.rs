//! Filtering engine.
//!
//! A [`FilterModel`] is compiled once against the column set into a list of active predicates;
//! inert items (blank value, or an operator that declines the value) are dropped at that point.
//! Visibility is then decided bottom-up over the row tree.

use alloc::string::String;
use alloc::vec::Vec;

use crate::key::{IdMap, IdSet};
use crate::operators::ApplyFilterFn;
use crate::{
    ColumnDef, ColumnSet, GridError, LinkOperator, Result, RowAccess, RowId, RowNode, RowTree,
};

/// The value half of a filter item.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterValue {
    Text(String),
    /// Multi-value operators (`isAnyOf`).
    List(Vec<String>),
}

impl FilterValue {
    /// Blank values make an item inert.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::List(items) => items.iter().all(|s| s.trim().is_empty()),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::Text(v.into())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterItem {
    pub field: String,
    pub operator: String,
    pub value: Option<FilterValue>,
}

impl FilterItem {
    pub fn new(
        field: impl Into<String>,
        operator: impl Into<String>,
        value: Option<impl Into<FilterValue>>,
    ) -> Self {
        Self {
            field: field.into(),
            operator: operator.into(),
            value: value.map(Into::into),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterModel {
    pub items: Vec<FilterItem>,
    pub link_operator: LinkOperator,
}

impl FilterModel {
    pub fn new(items: impl IntoIterator<Item = FilterItem>) -> Self {
        Self {
            items: items.into_iter().collect(),
            link_operator: LinkOperator::And,
        }
    }

    pub fn with_link_operator(mut self, link_operator: LinkOperator) -> Self {
        self.link_operator = link_operator;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Checks that every item names a known field and one of its operators.
    pub fn validate(&self, columns: &ColumnSet) -> Result<()> {
        CompiledFilter::compile(self, columns).map(|_| ())
    }

    /// Drops items whose column or operator does not exist.
    pub fn retain_valid(&mut self, columns: &ColumnSet) {
        self.items.retain(|item| {
            columns
                .get(&item.field)
                .is_some_and(|c| c.operator(&item.operator).is_some())
        });
    }
}

/// Active predicates of a filter model.
pub struct CompiledFilter<'c> {
    predicates: Vec<(&'c ColumnDef, ApplyFilterFn)>,
    link_operator: LinkOperator,
}

impl<'c> CompiledFilter<'c> {
    pub fn compile(model: &FilterModel, columns: &'c ColumnSet) -> Result<Self> {
        let mut predicates = Vec::with_capacity(model.items.len());
        for item in &model.items {
            let column = columns
                .get(&item.field)
                .ok_or_else(|| GridError::UnknownFilterField {
                    field: item.field.clone(),
                })?;
            let operator =
                column
                    .operator(&item.operator)
                    .ok_or_else(|| GridError::UnknownOperator {
                        field: item.field.clone(),
                        operator: item.operator.clone(),
                    })?;
            match operator.predicate(item.value.as_ref(), column) {
                Some(predicate) => predicates.push((column, predicate)),
                None => {
                    gwarn!(
                        field = item.field.as_str(),
                        operator = item.operator.as_str(),
                        "inert filter item"
                    );
                }
            }
        }
        Ok(Self {
            predicates,
            link_operator: model.link_operator,
        })
    }

    /// `true` when no item constrains anything.
    pub fn is_inert(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn matches(&self, id: &RowId, access: &RowAccess<'_>) -> bool {
        if self.predicates.is_empty() {
            return true;
        }
        let mut results = self
            .predicates
            .iter()
            .map(|(column, predicate)| predicate(&access.value(id, column)));
        match self.link_operator {
            LinkOperator::And => results.all(|pass| pass),
            LinkOperator::Or => results.any(|pass| pass),
        }
    }

    /// Direct match of one tree node.
    ///
    /// A synthesized group knows nothing but its key, so it is tested only when every active item
    /// reads that key (the grouping column or the group's own field).
    pub fn matches_node(&self, node: &RowNode, access: &RowAccess<'_>) -> bool {
        if node.is_auto_generated {
            let reads_key = |field: &str| {
                access.grouping_field == Some(field)
                    || node.grouping_field.as_deref() == Some(field)
            };
            if !self.predicates.iter().all(|(column, _)| reads_key(&column.field)) {
                return false;
            }
        }
        self.matches(&node.id, access)
    }
}

/// Visibility produced by the filtering engine (expansion not applied).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterResult {
    pub visible: IdSet,
    /// For every node, the number of visible descendants that are real rows.
    pub filtered_descendant_count: IdMap<usize>,
    /// Nodes matching the model on their own.
    pub passing_direct: IdSet,
}

impl FilterResult {
    pub fn is_visible(&self, id: &RowId) -> bool {
        self.visible.contains(id)
    }

    pub fn descendant_count(&self, id: &RowId) -> usize {
        self.filtered_descendant_count.get(id).copied().unwrap_or(0)
    }

    /// Every node visible, with full descendant counts.
    pub fn unfiltered(tree: &RowTree) -> Self {
        let mut result = Self::default();
        for node in tree.nodes() {
            result.visible.insert(node.id.clone());
            result.passing_direct.insert(node.id.clone());
        }
        if let Ok(order) = post_order(tree, tree.roots()) {
            for id in order {
                let count = count_below(tree, &result, &id);
                result.filtered_descendant_count.insert(id, count);
            }
        }
        result
    }
}

/// Children first, then parents. A node reached twice is a cycle.
fn post_order(tree: &RowTree, from: &[RowId]) -> Result<Vec<RowId>> {
    let mut seen = IdSet::default();
    let mut out = Vec::new();
    let mut stack: Vec<(RowId, bool)> = from.iter().rev().map(|id| (id.clone(), false)).collect();
    while let Some((id, children_done)) = stack.pop() {
        if children_done {
            out.push(id);
            continue;
        }
        if !seen.insert(id.clone()) {
            return Err(GridError::TreeCycle { id });
        }
        let children = tree.children(&id);
        stack.push((id.clone(), true));
        stack.extend(children.iter().rev().map(|c| (c.clone(), false)));
    }
    Ok(out)
}

fn count_below(tree: &RowTree, result: &FilterResult, id: &RowId) -> usize {
    tree.children(id)
        .iter()
        .filter(|c| result.visible.contains(*c))
        .map(|c| {
            let own = tree.node(c).is_some_and(|n| !n.is_auto_generated) as usize;
            own + result.descendant_count(c)
        })
        .sum()
}

fn any_visible_child(tree: &RowTree, result: &FilterResult, id: &RowId) -> bool {
    tree.children(id).iter().any(|c| result.visible.contains(c))
}

/// Decides direct matches, visibility and counts for the subtrees under `from`.
///
/// Synthesized groups that [`CompiledFilter::matches_node`] does not test are visible through
/// their descendants only.
fn evaluate_subtrees(
    tree: &RowTree,
    from: &[RowId],
    filter: &CompiledFilter<'_>,
    access: &RowAccess<'_>,
    disable_children_filtering: bool,
    result: &mut FilterResult,
) -> Result<()> {
    let order = post_order(tree, from)?;
    for id in &order {
        result.visible.remove(id);
        result.passing_direct.remove(id);
    }

    if disable_children_filtering {
        // The topmost tested node of each branch decides for everything below it. Pre-order, so
        // ancestors are settled first.
        let mut verdicts: IdMap<Option<bool>> = IdMap::default();
        for id in order.iter().rev() {
            let Some(node) = tree.node(id) else {
                continue;
            };
            let inherited = node
                .parent
                .as_ref()
                .and_then(|p| verdicts.get(p).copied().flatten());
            let verdict = match inherited {
                Some(verdict) => Some(verdict),
                None if filter.matches_node(node, access) => {
                    result.passing_direct.insert(id.clone());
                    Some(true)
                }
                None if node.is_auto_generated => None,
                None => Some(false),
            };
            if verdict == Some(true) {
                result.visible.insert(id.clone());
            }
            verdicts.insert(id.clone(), verdict);
        }
        for id in &order {
            let synthesized = tree.node(id).is_some_and(|n| n.is_auto_generated);
            if synthesized && any_visible_child(tree, result, id) {
                result.visible.insert(id.clone());
            }
        }
    } else {
        for id in &order {
            if tree.node(id).is_some_and(|n| filter.matches_node(n, access)) {
                result.passing_direct.insert(id.clone());
            }
            if result.passing_direct.contains(id) || any_visible_child(tree, result, id) {
                result.visible.insert(id.clone());
            }
        }
    }

    for id in order {
        let count = count_below(tree, result, &id);
        result.filtered_descendant_count.insert(id, count);
    }
    Ok(())
}

/// Filters every node of `tree`.
///
/// Default policy: a node is visible if it matches on its own or any descendant is visible. With
/// `disable_children_filtering` only the topmost tested node of each branch (usually a root) is
/// tested and everything below it follows.
pub fn filter_rows(
    tree: &RowTree,
    model: &FilterModel,
    columns: &ColumnSet,
    access: &RowAccess<'_>,
    disable_children_filtering: bool,
) -> Result<FilterResult> {
    let filter = CompiledFilter::compile(model, columns)?;
    gdebug!(
        rows = tree.len(),
        active_items = filter.predicates.len(),
        "filter_rows"
    );
    if filter.is_inert() {
        return Ok(FilterResult::unfiltered(tree));
    }
    let mut result = FilterResult::default();
    evaluate_subtrees(
        tree,
        tree.roots(),
        &filter,
        access,
        disable_children_filtering,
        &mut result,
    )?;
    Ok(result)
}

/// Re-filters after the values of `changed` rows were patched in place.
///
/// Only the changed rows and their ancestor chains are re-evaluated; every other node keeps its
/// previous visibility and count. The tree shape must be the one `prev` was computed on.
pub fn refilter_rows(
    prev: &FilterResult,
    changed: &[RowId],
    tree: &RowTree,
    model: &FilterModel,
    columns: &ColumnSet,
    access: &RowAccess<'_>,
    disable_children_filtering: bool,
) -> Result<FilterResult> {
    let filter = CompiledFilter::compile(model, columns)?;
    if filter.is_inert() {
        return Ok(prev.clone());
    }
    let mut result = prev.clone();

    if disable_children_filtering {
        // Rows below a real ancestor follow it; the others can flip everything under their
        // top-level root.
        let mut roots: Vec<RowId> = Vec::new();
        for id in changed.iter().filter(|id| tree.contains(id)) {
            let ancestors = tree.ancestors(id)?;
            let tested = ancestors
                .iter()
                .all(|a| tree.node(a).is_some_and(|n| n.is_auto_generated));
            let root = ancestors.last().unwrap_or(id);
            if tested && !roots.contains(root) {
                roots.push(root.clone());
            }
        }
        evaluate_subtrees(tree, &roots, &filter, access, true, &mut result)?;
        return Ok(result);
    }

    let changed_set: IdSet = changed.iter().cloned().collect();
    // Affected nodes, deepest first so children settle before parents.
    let mut affected: Vec<(usize, RowId)> = Vec::new();
    let mut seen = IdSet::default();
    for id in changed.iter().filter(|id| tree.contains(id)) {
        if seen.insert(id.clone()) {
            affected.push((tree.node(id).map_or(0, |n| n.depth), id.clone()));
        }
        for ancestor in tree.ancestors(id)? {
            if !seen.insert(ancestor.clone()) {
                break;
            }
            let depth = tree.node(&ancestor).map_or(0, |n| n.depth);
            affected.push((depth, ancestor));
        }
    }
    affected.sort_by(|a, b| b.0.cmp(&a.0));
    gtrace!(
        changed = changed.len(),
        affected = affected.len(),
        "refilter_rows"
    );

    for (_, id) in &affected {
        if let Some(node) = tree.node(id).filter(|_| changed_set.contains(id)) {
            if filter.matches_node(node, access) {
                result.passing_direct.insert(id.clone());
            } else {
                result.passing_direct.remove(id);
            }
        }
        if result.passing_direct.contains(id) || any_visible_child(tree, &result, id) {
            result.visible.insert(id.clone());
        } else {
            result.visible.remove(id);
        }
        let count = count_below(tree, &result, id);
        result.filtered_descendant_count.insert(id.clone(), count);
    }
    Ok(result)
}
