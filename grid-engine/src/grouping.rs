//! Grouping kinds and the per-kind sort/filter strategies.
//!
//! Every grouping-dependent decision of the pipeline goes through a `match` on [`GroupingKind`]
//! in this module.

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::filter::{FilterResult, filter_rows, refilter_rows};
use crate::key::IdMap;
use crate::preprocess::{HYDRATE_COLUMNS, PreProcessorRegistry};
use crate::sort::{SortedTree, sort_row_ids, sort_row_tree};
use crate::{
    ColumnDef, ColumnSet, FilterModel, Result, RowAccess, RowId, RowPath, RowRecord, RowTree,
    SortModel, TreeInput,
};

/// Field of the synthetic column showing tree-data group keys.
pub const TREE_DATA_GROUP_FIELD: &str = "__tree_data_group__";
/// Field of the synthetic column showing row-grouping group keys.
pub const ROW_GROUP_FIELD: &str = "__row_group_by_columns_group__";

/// Extracts the tree-data path of a record (`["docs", "a.txt"]`).
pub type GetTreeDataPath = Arc<dyn Fn(&RowRecord) -> Vec<String> + Send + Sync>;

#[derive(Clone, Default)]
pub enum GroupingKind {
    /// Flat rows.
    #[default]
    None,
    /// Rows carry their own hierarchy path.
    TreeData { get_path: GetTreeDataPath },
    /// Rows are grouped by the values of `fields`, outermost first.
    RowGrouping { fields: Vec<String> },
}

impl GroupingKind {
    pub fn tree_data(get_path: impl Fn(&RowRecord) -> Vec<String> + Send + Sync + 'static) -> Self {
        Self::TreeData {
            get_path: Arc::new(get_path),
        }
    }

    pub fn row_grouping<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self::RowGrouping {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Field of the synthetic grouping column, when this kind adds one.
    pub fn grouping_field(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::TreeData { .. } => Some(TREE_DATA_GROUP_FIELD),
            Self::RowGrouping { fields } if fields.is_empty() => None,
            Self::RowGrouping { .. } => Some(ROW_GROUP_FIELD),
        }
    }

    /// Identity comparison (closures compare by pointer).
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::TreeData { get_path: a }, Self::TreeData { get_path: b }) => Arc::ptr_eq(a, b),
            (Self::RowGrouping { fields: a }, Self::RowGrouping { fields: b }) => a == b,
            _ => false,
        }
    }

    pub fn hydration_deps(&self) -> HydrationDeps {
        match self {
            Self::None => HydrationDeps::default(),
            Self::TreeData { .. } => HydrationDeps {
                tree_data: true,
                row_grouping_fields: Vec::new(),
            },
            Self::RowGrouping { fields } => HydrationDeps {
                tree_data: false,
                row_grouping_fields: fields.clone(),
            },
        }
    }

    /// The path of one record under this grouping.
    pub fn row_path(&self, row: &RowRecord, columns: &ColumnSet) -> RowPath {
        match self {
            Self::None => RowPath::Flat,
            Self::TreeData { get_path } => RowPath::Tree(get_path(row)),
            Self::RowGrouping { fields } if fields.is_empty() => RowPath::Flat,
            Self::RowGrouping { fields } => RowPath::Groups(
                fields
                    .iter()
                    .map(|field| (field.clone(), group_key(row, field, columns)))
                    .collect(),
            ),
        }
    }

    /// Tree builder input for `order`, skipping ids without a record.
    pub fn tree_inputs(
        &self,
        order: &[RowId],
        rows: &IdMap<RowRecord>,
        columns: &ColumnSet,
    ) -> Vec<TreeInput> {
        order
            .iter()
            .filter_map(|id| rows.get(id))
            .map(|row| TreeInput {
                id: row.id.clone(),
                path: self.row_path(row, columns),
            })
            .collect()
    }

    /// Sorts with the strategy of this grouping kind.
    pub fn sort(
        &self,
        tree: &RowTree,
        model: &SortModel,
        columns: &ColumnSet,
        access: &RowAccess<'_>,
        disable_children_sorting: bool,
    ) -> Result<SortedTree> {
        match self {
            Self::None => Ok(SortedTree {
                roots: sort_row_ids(tree.roots(), model, columns, access)?,
                children: Default::default(),
            }),
            Self::TreeData { .. } | Self::RowGrouping { .. } => {
                sort_row_tree(tree, model, columns, access, disable_children_sorting)
            }
        }
    }

    /// Filters with the strategy of this grouping kind.
    ///
    /// Only tree data honors `disable_children_filtering`; row-grouping groups are always
    /// visible when one of their rows is.
    pub fn filter(
        &self,
        tree: &RowTree,
        model: &FilterModel,
        columns: &ColumnSet,
        access: &RowAccess<'_>,
        disable_children_filtering: bool,
    ) -> Result<FilterResult> {
        let disable = self.disables_children_filtering(disable_children_filtering);
        filter_rows(tree, model, columns, access, disable)
    }

    /// Incremental variant of [`Self::filter`] after a value-only patch of `changed`.
    #[allow(clippy::too_many_arguments)]
    pub fn refilter(
        &self,
        prev: &FilterResult,
        changed: &[RowId],
        tree: &RowTree,
        model: &FilterModel,
        columns: &ColumnSet,
        access: &RowAccess<'_>,
        disable_children_filtering: bool,
    ) -> Result<FilterResult> {
        let disable = self.disables_children_filtering(disable_children_filtering);
        refilter_rows(prev, changed, tree, model, columns, access, disable)
    }

    /// Whether descendants follow their topmost tested ancestor instead of being tested.
    fn disables_children_filtering(&self, requested: bool) -> bool {
        match self {
            Self::None | Self::RowGrouping { .. } => false,
            Self::TreeData { .. } => requested,
        }
    }
}

impl core::fmt::Debug for GroupingKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::TreeData { .. } => f.debug_struct("TreeData").finish_non_exhaustive(),
            Self::RowGrouping { fields } => f
                .debug_struct("RowGrouping")
                .field("fields", fields)
                .finish(),
        }
    }
}

fn group_key(row: &RowRecord, field: &str, columns: &ColumnSet) -> String {
    match columns.get(field) {
        Some(column) => column.format(&column.cell_value(row)),
        None => row.get(field).to_string(),
    }
}

/// Dependency state of the [`HYDRATE_COLUMNS`] hook.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HydrationDeps {
    pub tree_data: bool,
    pub row_grouping_fields: Vec<String>,
}

pub const TREE_DATA_CONTRIBUTOR: &str = "treeData";
pub const ROW_GROUPING_CONTRIBUTOR: &str = "rowGrouping";

fn grouping_column(field: &str, header_name: &str) -> ColumnDef {
    ColumnDef::string(field)
        .with_header_name(header_name)
        .with_width(200)
}

fn insert_grouping_column(mut columns: ColumnSet, column: ColumnDef) -> ColumnSet {
    if columns.insert(0, column).is_err() {
        gtrace!("grouping column already defined by the caller");
    }
    columns
}

/// Registers the tree-data and row-grouping column contributors.
pub fn register_grouping_contributors(
    registry: &mut PreProcessorRegistry<ColumnSet, HydrationDeps>,
) {
    registry.batch(|registry| {
        registry.register(HYDRATE_COLUMNS, TREE_DATA_CONTRIBUTOR, |columns, deps| {
            if !deps.tree_data {
                return columns;
            }
            insert_grouping_column(columns, grouping_column(TREE_DATA_GROUP_FIELD, "Group"))
        });
        registry.register(HYDRATE_COLUMNS, ROW_GROUPING_CONTRIBUTOR, |columns, deps| {
            if deps.row_grouping_fields.is_empty() {
                return columns;
            }
            let header = deps.row_grouping_fields.join(", ");
            insert_grouping_column(columns, grouping_column(ROW_GROUP_FIELD, &header))
        });
    });
}
