use alloc::string::String;

use crate::RowId;

pub type Result<T, E = GridError> = core::result::Result<T, E>;

/// Errors reported by the engine.
///
/// Configuration errors are returned synchronously from the intent that caused them. Failures in
/// a pipeline stage are additionally published as [`crate::GridEvent::Error`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("sort model references unknown field `{field}`")]
    UnknownSortField { field: String },

    #[error("column `{field}` is not sortable")]
    ColumnNotSortable { field: String },

    #[error("filter model references unknown field `{field}`")]
    UnknownFilterField { field: String },

    #[error("column `{field}` has no filter operator `{operator}`")]
    UnknownOperator { field: String, operator: String },

    #[error("rows `{existing}` and `{duplicate}` have the same grouping path")]
    DuplicatePath { existing: RowId, duplicate: RowId },

    #[error("column field `{field}` is defined more than once")]
    DuplicateField { field: String },

    #[error("row id `{id}` appears more than once")]
    DuplicateRowId { id: RowId },

    #[error("unknown row `{id}`")]
    UnknownRow { id: RowId },

    #[error("unknown column `{field}`")]
    UnknownColumn { field: String },

    #[error("row tree contains a cycle through `{id}`")]
    TreeCycle { id: RowId },

    #[error("row `{id}` is not reachable from its parent `{parent}`")]
    DetachedNode { id: RowId, parent: RowId },

    #[error("row `{id}` has depth {depth}, expected {expected}")]
    DepthMismatch {
        id: RowId,
        depth: usize,
        expected: usize,
    },
}

impl GridError {
    /// Whether the error comes from caller configuration rather than a broken invariant.
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            Self::TreeCycle { .. }
                | Self::DuplicateRowId { .. }
                | Self::DetachedNode { .. }
                | Self::DepthMismatch { .. }
        )
    }
}
