use alloc::vec::Vec;

use crate::RowId;
use crate::key::{IdMap, IdSet};

/// Selected row ids. Only real rows (never synthesized groups) are selectable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    ids: IdSet,
}

impl Selection {
    pub fn is_selected(&self, id: &RowId) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns whether the selection changed.
    pub fn set(&mut self, id: RowId, selected: bool) -> bool {
        if selected {
            self.ids.insert(id)
        } else {
            self.ids.remove(&id)
        }
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.ids.is_empty();
        self.ids.clear();
        changed
    }

    /// Replaces the selection with `ids`.
    pub fn replace(&mut self, ids: impl IntoIterator<Item = RowId>) -> bool {
        let next: IdSet = ids.into_iter().collect();
        let changed = next != self.ids;
        self.ids = next;
        changed
    }

    /// Drops ids that no longer have a record.
    pub fn retain_existing<V>(&mut self, rows: &IdMap<V>) {
        self.ids.retain(|id| rows.contains_key(id));
    }

    /// Selected ids in `order` order; ids missing from `order` are left out.
    pub fn in_order(&self, order: &[RowId]) -> Vec<RowId> {
        order
            .iter()
            .filter(|id| self.ids.contains(*id))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RowId> {
        self.ids.iter()
    }
}
