use alloc::string::ToString;

use crate::key::IdMap;
use crate::{CellValue, ColumnDef, RowId, RowRecord, RowTree};

/// Read access to cell values of tree nodes, including synthesized groups.
///
/// Synthesized groups have no record: they expose their `grouping_key` for the grouping column
/// (and, for row grouping, for the grouped field) and `Null` everywhere else.
#[derive(Clone, Copy)]
pub struct RowAccess<'a> {
    pub rows: &'a IdMap<RowRecord>,
    pub tree: &'a RowTree,
    /// Field of the synthetic grouping column, if one is active.
    pub grouping_field: Option<&'a str>,
}

impl<'a> RowAccess<'a> {
    pub fn new(rows: &'a IdMap<RowRecord>, tree: &'a RowTree) -> Self {
        Self {
            rows,
            tree,
            grouping_field: None,
        }
    }

    pub fn with_grouping_field(mut self, grouping_field: Option<&'a str>) -> Self {
        self.grouping_field = grouping_field;
        self
    }

    pub fn record(&self, id: &RowId) -> Option<&'a RowRecord> {
        self.rows.get(id)
    }

    /// Raw value of `column` for node `id`.
    pub fn value(&self, id: &RowId, column: &ColumnDef) -> CellValue {
        let node = self.tree.node(id);
        let grouping_key = || {
            node.and_then(|n| n.grouping_key.as_ref())
                .map_or(CellValue::Null, |k| CellValue::Text(k.to_string()))
        };

        if self.grouping_field == Some(column.field.as_str()) {
            return grouping_key();
        }
        if let Some(node) = node.filter(|n| n.is_auto_generated) {
            if node.grouping_field.as_deref() == Some(column.field.as_str()) {
                return grouping_key();
            }
            return CellValue::Null;
        }
        self.rows
            .get(id)
            .map_or(CellValue::Null, |row| column.cell_value(row))
    }

    /// Value of `column` for node `id` in the column's domain (unparseable ⇒ `Null`).
    pub fn typed_value(&self, id: &RowId, column: &ColumnDef) -> CellValue {
        column.column_type.coerce(&self.value(id, column))
    }
}
