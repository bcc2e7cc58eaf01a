//! A headless data-grid engine.
//!
//! For adapter-level utilities (debounced filter input, scroll anchoring), see the
//! `grid-engine-adapter` crate.
//!
//! The engine turns a flat row collection plus a column schema into:
//! - a (possibly hierarchical) row tree, for tree data or row grouping
//! - a sorted, filtered, expansion-aware visible ordering
//! - a buffered render window of rows and columns for the current viewport
//!
//! It is UI-agnostic. A rendering layer is expected to provide the viewport size, scroll offsets
//! and user intents (sort, filter, expand), and to read back immutable snapshots.
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[macro_use]
mod macros;

mod access;
mod column;
mod engine;
mod error;
mod events;
mod filter;
mod grouping;
mod key;
pub mod operators;
mod options;
mod preprocess;
mod selection;
mod sizing;
mod sort;
mod state;
mod tree;
mod types;
mod window;

#[cfg(test)]
mod tests;

pub use access::RowAccess;
pub use column::{
    ColumnDef, ColumnSet, ColumnType, DEFAULT_COLUMN_WIDTH, SortComparator, ValueFormatter,
    ValueGetter,
};
pub use engine::GridEngine;
pub use error::{GridError, Result};
pub use events::{GridEvent, GridEventKind, GridListener, Subscribers, SubscriptionId};
pub use filter::{
    CompiledFilter, FilterItem, FilterModel, FilterResult, FilterValue, filter_rows, refilter_rows,
};
pub use grouping::{
    GetTreeDataPath, GroupingKind, HydrationDeps, ROW_GROUP_FIELD, ROW_GROUPING_CONTRIBUTOR,
    TREE_DATA_CONTRIBUTOR, TREE_DATA_GROUP_FIELD, register_grouping_contributors,
};
pub use key::{IdMap, IdSet};
pub use operators::{ApplyFilterFn, FilterOperator, GetApplyFilterFn};
pub use options::GridOptions;
pub use preprocess::{HYDRATE_COLUMNS, HookName, PreProcessor, PreProcessorRegistry};
pub use selection::Selection;
pub use sizing::{Pagination, Size, Sizing, SizingInput, compute_sizing, compute_sizing_seeded};
pub use sort::{
    SortItem, SortModel, SortedTree, next_sort_direction, sort_row_ids, sort_row_tree,
    toggle_sort_model,
};
pub use state::{FrameState, ScrollState, ViewportState};
pub use tree::{
    ExpansionConfig, ExpansionPredicate, RowNode, RowPath, RowTree, TreeInput, build_row_tree,
};
pub use types::{
    CellValue, Density, IndexSpan, LinkOperator, RenderWindow, RowCounts, RowId, RowRecord,
    RowUpdate, SortDirection,
};
pub use window::{
    ColumnPositions, WindowLayout, WindowPhase, Windowing, compute_column_span, compute_row_span,
};
