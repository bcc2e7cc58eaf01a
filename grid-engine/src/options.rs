use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::{Density, ExpansionConfig, ExpansionPredicate, GroupingKind, RowNode, SortDirection};

/// Configuration for [`crate::GridEngine`].
///
/// Cheap to clone: closures are stored in `Arc`s, so callers can tweak a few fields and hand the
/// result to `GridEngine::set_options`, which re-runs only the pipeline stages affected by what
/// changed.
#[derive(Clone)]
pub struct GridOptions {
    /// Base row height in pixels, before density.
    pub row_height: u32,
    /// Base header height in pixels, before density.
    pub header_height: u32,
    pub density: Density,

    /// Rows materialized above and below the viewport.
    pub row_buffer: usize,
    /// Columns materialized left and right of the viewport.
    pub column_buffer: usize,

    /// Space reserved for a scrollbar when one is shown.
    pub scrollbar_size: u32,

    /// Page size of client-side pagination; `None` shows every row on one page.
    pub pagination: Option<usize>,
    /// Grow the box to fit the page instead of scrolling vertically.
    pub auto_height: bool,
    /// Derive the page size from the rows that fit in the box.
    pub auto_page_size: bool,

    pub grouping: GroupingKind,
    /// Groups with `depth <= d` start expanded.
    pub default_expansion_depth: Option<usize>,
    /// Decides the initial expansion of a group; wins over `default_expansion_depth`.
    pub is_group_expanded_by_default: Option<ExpansionPredicate>,
    /// Only reorder top-level rows when sorting grouped data.
    pub disable_children_sorting: bool,
    /// Only test top-level rows when filtering tree data.
    pub disable_children_filtering: bool,

    /// Directions a header click cycles through; `None` clears the column's sort.
    pub sorting_order: Vec<Option<SortDirection>>,

    /// Delay between the last filter keystroke and applying the filter model.
    pub filter_debounce_ms: u64,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            row_height: 52,
            header_height: 56,
            density: Density::Standard,
            row_buffer: 3,
            column_buffer: 3,
            scrollbar_size: 15,
            pagination: None,
            auto_height: false,
            auto_page_size: false,
            grouping: GroupingKind::None,
            default_expansion_depth: None,
            is_group_expanded_by_default: None,
            disable_children_sorting: false,
            disable_children_filtering: false,
            sorting_order: alloc::vec![Some(SortDirection::Asc), Some(SortDirection::Desc), None],
            filter_debounce_ms: 500,
        }
    }
}

impl GridOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row_height(mut self, row_height: u32) -> Self {
        self.row_height = row_height;
        self
    }

    pub fn with_header_height(mut self, header_height: u32) -> Self {
        self.header_height = header_height;
        self
    }

    pub fn with_density(mut self, density: Density) -> Self {
        self.density = density;
        self
    }

    pub fn with_buffers(mut self, row_buffer: usize, column_buffer: usize) -> Self {
        self.row_buffer = row_buffer;
        self.column_buffer = column_buffer;
        self
    }

    pub fn with_scrollbar_size(mut self, scrollbar_size: u32) -> Self {
        self.scrollbar_size = scrollbar_size;
        self
    }

    pub fn with_pagination(mut self, page_size: Option<usize>) -> Self {
        self.pagination = page_size;
        self
    }

    pub fn with_auto_height(mut self, auto_height: bool) -> Self {
        self.auto_height = auto_height;
        self
    }

    pub fn with_auto_page_size(mut self, auto_page_size: bool) -> Self {
        self.auto_page_size = auto_page_size;
        self
    }

    pub fn with_grouping(mut self, grouping: GroupingKind) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn with_default_expansion_depth(mut self, depth: Option<usize>) -> Self {
        self.default_expansion_depth = depth;
        self
    }

    pub fn with_is_group_expanded_by_default(
        mut self,
        predicate: Option<impl Fn(&RowNode) -> bool + Send + Sync + 'static>,
    ) -> Self {
        self.is_group_expanded_by_default = predicate.map(|f| Arc::new(f) as _);
        self
    }

    pub fn with_disable_children_sorting(mut self, disable: bool) -> Self {
        self.disable_children_sorting = disable;
        self
    }

    pub fn with_disable_children_filtering(mut self, disable: bool) -> Self {
        self.disable_children_filtering = disable;
        self
    }

    pub fn with_sorting_order(mut self, sorting_order: Vec<Option<SortDirection>>) -> Self {
        self.sorting_order = sorting_order;
        self
    }

    pub fn with_filter_debounce_ms(mut self, delay_ms: u64) -> Self {
        self.filter_debounce_ms = delay_ms;
        self
    }

    pub fn expansion_config(&self) -> ExpansionConfig {
        ExpansionConfig {
            default_expansion_depth: self.default_expansion_depth,
            predicate: self.is_group_expanded_by_default.clone(),
        }
    }

    pub(crate) fn same_expansion(&self, other: &Self) -> bool {
        let same_predicate = match (
            &self.is_group_expanded_by_default,
            &other.is_group_expanded_by_default,
        ) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_predicate && self.default_expansion_depth == other.default_expansion_depth
    }
}

impl core::fmt::Debug for GridOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GridOptions")
            .field("row_height", &self.row_height)
            .field("header_height", &self.header_height)
            .field("density", &self.density)
            .field("row_buffer", &self.row_buffer)
            .field("column_buffer", &self.column_buffer)
            .field("scrollbar_size", &self.scrollbar_size)
            .field("pagination", &self.pagination)
            .field("auto_height", &self.auto_height)
            .field("auto_page_size", &self.auto_page_size)
            .field("grouping", &self.grouping)
            .field("default_expansion_depth", &self.default_expansion_depth)
            .field("disable_children_sorting", &self.disable_children_sorting)
            .field("disable_children_filtering", &self.disable_children_filtering)
            .field("sorting_order", &self.sorting_order)
            .field("filter_debounce_ms", &self.filter_debounce_ms)
            .finish_non_exhaustive()
    }
}
