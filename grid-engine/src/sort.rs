//! Sorting engine.
//!
//! An empty sort model never reorders anything. A non-empty model becomes a single stable
//! multi-key comparison; blank keys always land after non-blank keys, in both directions.

use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;

use crate::key::IdMap;
use crate::{
    CellValue, ColumnDef, ColumnSet, GridError, Result, RowAccess, RowId, RowTree, SortDirection,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SortItem {
    pub field: String,
    pub direction: SortDirection,
}

impl SortItem {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Ordered sort keys; the first item is the primary key. At most one item per field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SortModel {
    items: Vec<SortItem>,
}

impl SortModel {
    /// Builds a model; a repeated field keeps its first occurrence.
    pub fn new(items: impl IntoIterator<Item = SortItem>) -> Self {
        let mut model = Self::default();
        for item in items {
            if model.direction(&item.field).is_none() {
                model.items.push(item);
            }
        }
        model
    }

    pub fn items(&self) -> &[SortItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn direction(&self, field: &str) -> Option<SortDirection> {
        self.items
            .iter()
            .find(|item| item.field == field)
            .map(|item| item.direction)
    }

    /// Checks every item against `columns`.
    pub fn validate(&self, columns: &ColumnSet) -> Result<()> {
        resolve_keys(self, columns).map(|_| ())
    }

    /// Drops items whose column is missing or not sortable.
    pub fn retain_valid(&mut self, columns: &ColumnSet) {
        self.items
            .retain(|item| columns.get(&item.field).is_some_and(ColumnDef::is_sortable));
    }
}

/// The direction that follows `current` in `sorting_order` (wrapping).
pub fn next_sort_direction(
    sorting_order: &[Option<SortDirection>],
    current: Option<SortDirection>,
) -> Option<SortDirection> {
    if sorting_order.is_empty() {
        return None;
    }
    match sorting_order.iter().position(|d| *d == current) {
        Some(i) => sorting_order[(i + 1) % sorting_order.len()],
        None => sorting_order[0],
    }
}

/// Applies a column-header click to `model`.
///
/// Without `allow_multi` the result holds at most the clicked field; with it, the clicked field
/// is updated in place (or appended) and the other keys keep their priority.
pub fn toggle_sort_model(
    model: &SortModel,
    field: &str,
    allow_multi: bool,
    sorting_order: &[Option<SortDirection>],
) -> SortModel {
    let next = next_sort_direction(sorting_order, model.direction(field));
    if !allow_multi {
        return SortModel::new(next.map(|direction| SortItem {
            field: field.into(),
            direction,
        }));
    }

    let mut items = model.items.clone();
    match (items.iter().position(|item| item.field == field), next) {
        (Some(i), Some(direction)) => items[i].direction = direction,
        (Some(i), None) => {
            items.remove(i);
        }
        (None, Some(direction)) => items.push(SortItem {
            field: field.into(),
            direction,
        }),
        (None, None) => {}
    }
    SortModel { items }
}

type SortKey<'c> = (&'c ColumnDef, SortDirection);

fn resolve_keys<'c>(model: &SortModel, columns: &'c ColumnSet) -> Result<Vec<SortKey<'c>>> {
    model
        .items
        .iter()
        .map(|item| {
            let column = columns
                .get(&item.field)
                .ok_or_else(|| GridError::UnknownSortField {
                    field: item.field.clone(),
                })?;
            if !column.is_sortable() {
                return Err(GridError::ColumnNotSortable {
                    field: item.field.clone(),
                });
            }
            Ok((column, item.direction))
        })
        .collect()
}

fn compare_keys(keys: &[SortKey<'_>], a: &[CellValue], b: &[CellValue]) -> Ordering {
    for (i, (column, direction)) in keys.iter().enumerate() {
        let ord = match (a[i].is_null(), b[i].is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let Some(comparator) = &column.sort_comparator else {
                    continue;
                };
                let ord = comparator(&a[i], &b[i]);
                match direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn sort_siblings(ids: &[RowId], keys: &[SortKey<'_>], access: &RowAccess<'_>) -> Vec<RowId> {
    let mut keyed: Vec<(Vec<CellValue>, &RowId)> = ids
        .iter()
        .map(|id| {
            let values = keys
                .iter()
                .map(|(column, _)| access.typed_value(id, column))
                .collect();
            (values, id)
        })
        .collect();
    keyed.sort_by(|a, b| compare_keys(keys, &a.0, &b.0));
    keyed.into_iter().map(|(_, id)| id.clone()).collect()
}

/// Sorts a flat list of row ids.
pub fn sort_row_ids(
    ids: &[RowId],
    model: &SortModel,
    columns: &ColumnSet,
    access: &RowAccess<'_>,
) -> Result<Vec<RowId>> {
    if model.is_empty() {
        return Ok(ids.to_vec());
    }
    let keys = resolve_keys(model, columns)?;
    gtrace!(rows = ids.len(), keys = keys.len(), "sort_row_ids");
    Ok(sort_siblings(ids, &keys, access))
}

/// Sibling order of a sorted row tree. Nesting is the tree's own; only sibling lists move.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SortedTree {
    pub roots: Vec<RowId>,
    /// Sorted children of every node that has any.
    pub children: IdMap<Vec<RowId>>,
}

impl SortedTree {
    /// The tree order, unsorted.
    pub fn from_tree(tree: &RowTree) -> Self {
        let children = tree
            .nodes()
            .filter(|n| !n.children.is_empty())
            .map(|n| (n.id.clone(), n.children.clone()))
            .collect();
        Self {
            roots: tree.roots().to_vec(),
            children,
        }
    }

    pub fn children_of(&self, id: &RowId) -> &[RowId] {
        self.children.get(id).map_or(&[], Vec::as_slice)
    }

    /// Depth-first flattening, ignoring expansion.
    pub fn flatten(&self) -> Vec<RowId> {
        let mut out = Vec::with_capacity(self.roots.len());
        let mut stack: Vec<&RowId> = self.roots.iter().rev().collect();
        while let Some(id) = stack.pop() {
            out.push(id.clone());
            stack.extend(self.children_of(id).iter().rev());
        }
        out
    }
}

/// Sorts every sibling list of `tree` independently, preserving parent/child nesting.
///
/// With `disable_children_sorting` only the roots are reordered.
pub fn sort_row_tree(
    tree: &RowTree,
    model: &SortModel,
    columns: &ColumnSet,
    access: &RowAccess<'_>,
    disable_children_sorting: bool,
) -> Result<SortedTree> {
    let mut sorted = SortedTree::from_tree(tree);
    if model.is_empty() {
        return Ok(sorted);
    }
    let keys = resolve_keys(model, columns)?;
    gtrace!(
        rows = tree.len(),
        keys = keys.len(),
        disable_children_sorting,
        "sort_row_tree"
    );

    sorted.roots = sort_siblings(tree.roots(), &keys, access);
    if !disable_children_sorting {
        for children in sorted.children.values_mut() {
            *children = sort_siblings(children, &keys, access);
        }
    }
    Ok(sorted)
}
