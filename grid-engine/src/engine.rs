use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::events::{GridEvent, Subscribers, SubscriptionId};
use crate::filter::FilterResult;
use crate::grouping::{HydrationDeps, register_grouping_contributors};
use crate::key::IdMap;
use crate::preprocess::{HYDRATE_COLUMNS, PreProcessorRegistry};
use crate::selection::Selection;
use crate::sizing::{Pagination, SizingInput, compute_sizing};
use crate::sort::{SortedTree, toggle_sort_model};
use crate::window::{ColumnPositions, WindowLayout, WindowPhase, Windowing};
use crate::{
    ColumnDef, ColumnSet, FilterModel, FrameState, GridError, GridOptions, GroupingKind,
    RenderWindow, Result, RowAccess, RowCounts, RowId, RowNode, RowRecord, RowTree, RowUpdate,
    ScrollState, Sizing, SortModel, ViewportState, build_row_tree,
};

/// Caller overrides applied on top of the hydrated columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ColumnPatch {
    hidden: Option<bool>,
    width: Option<u32>,
}

impl ColumnPatch {
    fn apply(&self, column: &mut ColumnDef) {
        if let Some(hidden) = self.hidden {
            column.hidden = hidden;
        }
        if let Some(width) = self.width {
            column.width = width;
        }
    }
}

/// Prior state of the rows touched by one `update_rows` batch.
#[derive(Default)]
struct RowUndo {
    /// `None` for rows the batch inserted.
    records: IdMap<Option<RowRecord>>,
    order: Option<Vec<RowId>>,
    overrides: Vec<(RowId, bool)>,
}

impl RowUndo {
    /// Remembers the first state seen for `id`.
    fn save(&mut self, id: &RowId, record: Option<&RowRecord>) {
        self.records
            .entry(id.clone())
            .or_insert_with(|| record.cloned());
    }

    fn save_order(&mut self, order: &[RowId]) {
        self.order.get_or_insert_with(|| order.to_vec());
    }

    fn restore(self, engine: &mut GridEngine) {
        for (id, record) in self.records {
            match record {
                Some(record) => {
                    engine.rows.insert(id, record);
                }
                None => {
                    engine.rows.remove(&id);
                }
            }
        }
        if let Some(order) = self.order {
            engine.row_order = order;
        }
        engine.expansion_overrides.extend(self.overrides);
    }
}

/// The grid data engine.
///
/// Owns every input (rows, columns, models, viewport) and every derived snapshot. Inputs change
/// only through the intent methods; each intent re-runs the pipeline from the first stage it
/// invalidates:
///
/// columns → row tree → sort → filter → visible ordering → sizing → render window.
///
/// Derived snapshots are published as `Arc`s and replaced, never mutated. Subscribers are
/// notified after each stage; [`GridEngine::batch_update`] coalesces those notifications.
#[derive(Clone, Debug)]
pub struct GridEngine {
    options: GridOptions,

    rows: IdMap<RowRecord>,
    row_order: Vec<RowId>, // insertion order

    raw_columns: ColumnSet,
    raw_columns_version: u64,
    column_patches: BTreeMap<String, ColumnPatch>,
    columns: Arc<ColumnSet>,
    column_positions: Arc<ColumnPositions>,
    registry: PreProcessorRegistry<ColumnSet, HydrationDeps>,

    tree: Arc<RowTree>,
    expansion_overrides: IdMap<bool>,

    sort_model: SortModel,
    sorted: SortedTree,

    filter_model: FilterModel,
    filter: FilterResult,

    visible: Arc<[RowId]>,
    visible_index: IdMap<usize>,
    hidden_by_collapse: usize,

    viewport: ViewportState,
    scroll: ScrollState,
    page: usize,
    sizing: Sizing,
    windowing: Windowing,

    selection: Selection,
    subscribers: Subscribers,
    last_error: Option<GridError>,
}

impl Default for GridEngine {
    fn default() -> Self {
        Self::new(GridOptions::default())
    }
}

impl GridEngine {
    pub fn new(options: GridOptions) -> Self {
        gdebug!(grouping = ?options.grouping, "GridEngine::new");
        let mut registry = PreProcessorRegistry::new();
        register_grouping_contributors(&mut registry);
        let mut engine = Self {
            options,
            rows: IdMap::default(),
            row_order: Vec::new(),
            raw_columns: ColumnSet::default(),
            raw_columns_version: 0,
            column_patches: BTreeMap::new(),
            columns: Arc::default(),
            column_positions: Arc::default(),
            registry,
            tree: Arc::default(),
            expansion_overrides: IdMap::default(),
            sort_model: SortModel::default(),
            sorted: SortedTree::default(),
            filter_model: FilterModel::default(),
            filter: FilterResult::default(),
            visible: Arc::from(Vec::<RowId>::new()),
            visible_index: IdMap::default(),
            hidden_by_collapse: 0,
            viewport: ViewportState::default(),
            scroll: ScrollState::default(),
            page: 0,
            sizing: Sizing::default(),
            windowing: Windowing::new(),
            selection: Selection::default(),
            subscribers: Subscribers::new(),
            last_error: None,
        };
        engine.hydrate_columns();
        engine.run_from_tree();
        engine
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    /// Replaces the options, re-running only the stages affected by what changed.
    pub fn set_options(&mut self, options: GridOptions) {
        let prev = core::mem::replace(&mut self.options, options);
        let next = &self.options;
        gtrace!(options = ?next, "GridEngine::set_options");

        let grouping_changed = !prev.grouping.same_as(&next.grouping);
        let expansion_changed = !prev.same_expansion(next);
        let sorting_changed = prev.disable_children_sorting != next.disable_children_sorting;
        let filtering_changed = prev.disable_children_filtering != next.disable_children_filtering;
        let pagination_changed =
            prev.pagination != next.pagination || prev.auto_page_size != next.auto_page_size;
        let sizing_changed = pagination_changed
            || prev.row_height != next.row_height
            || prev.header_height != next.header_height
            || prev.density != next.density
            || prev.scrollbar_size != next.scrollbar_size
            || prev.auto_height != next.auto_height;
        let window_changed =
            prev.row_buffer != next.row_buffer || prev.column_buffer != next.column_buffer;

        if pagination_changed {
            self.page = 0;
        }
        if grouping_changed {
            self.hydrate_columns();
            self.prune_stale_models();
            self.run_from_tree();
        } else if expansion_changed {
            self.run_from_tree();
        } else if sorting_changed {
            self.run_from_sort();
        } else if filtering_changed {
            self.run_from_filter();
        } else if sizing_changed {
            self.run_from_sizing();
        } else if window_changed {
            self.recompute_window();
        }
    }

    /// Clones the current options, applies `f`, then delegates to [`Self::set_options`].
    pub fn update_options(&mut self, f: impl FnOnce(&mut GridOptions)) {
        let mut next = self.options.clone();
        f(&mut next);
        self.set_options(next);
    }

    /// Batches several intents into a single round of notifications (latest snapshot per kind).
    pub fn batch_update(&mut self, f: impl FnOnce(&mut Self)) {
        self.subscribers.begin_batch();
        f(self);
        self.subscribers.end_batch();
    }

    pub fn subscribe(
        &mut self,
        listener: impl Fn(&GridEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    // ---- rows ----

    /// Replaces the whole row collection.
    ///
    /// Fails without changing anything when the rows cannot form a row tree (duplicate ids or
    /// grouping paths).
    pub fn set_rows(&mut self, rows: impl IntoIterator<Item = RowRecord>) -> Result<()> {
        let mut map = IdMap::default();
        let mut order = Vec::new();
        for row in rows {
            if map.contains_key(&row.id) {
                return Err(GridError::DuplicateRowId { id: row.id });
            }
            order.push(row.id.clone());
            map.insert(row.id.clone(), row);
        }
        gdebug!(rows = order.len(), "GridEngine::set_rows");
        let prev_rows = core::mem::replace(&mut self.rows, map);
        let prev_order = core::mem::replace(&mut self.row_order, order);
        if let Err(err) = self.rebuild_tree() {
            self.rows = prev_rows;
            self.row_order = prev_order;
            return Err(err);
        }
        self.selection.retain_existing(&self.rows);
        self.run_from_sort();
        Ok(())
    }

    /// Applies upserts and deletes.
    ///
    /// Patches that only change values (no insert, delete, or grouping path change) keep the row
    /// tree, re-sort, and re-filter just the patched rows and their ancestors.
    ///
    /// When the patched rows cannot form a row tree (a duplicate grouping path) the whole batch
    /// is rolled back and the error returned.
    pub fn update_rows(&mut self, updates: impl IntoIterator<Item = RowUpdate>) -> Result<()> {
        let mut structural = false;
        let mut changed = Vec::new();
        let mut undo = RowUndo::default();
        for update in updates {
            match update {
                RowUpdate::Upsert(record) => match self.rows.get_mut(&record.id) {
                    Some(existing) => {
                        undo.save(&record.id, Some(&*existing));
                        let before = self.options.grouping.row_path(existing, &self.raw_columns);
                        existing.values.extend(record.values);
                        let after = self.options.grouping.row_path(existing, &self.raw_columns);
                        structural |= before != after;
                        changed.push(record.id);
                    }
                    None => {
                        undo.save(&record.id, None);
                        undo.save_order(&self.row_order);
                        self.row_order.push(record.id.clone());
                        self.rows.insert(record.id.clone(), record);
                        structural = true;
                    }
                },
                RowUpdate::Delete(id) => match self.rows.remove(&id) {
                    Some(removed) => {
                        undo.save(&id, Some(&removed));
                        undo.save_order(&self.row_order);
                        self.row_order.retain(|r| *r != id);
                        if let Some(expanded) = self.expansion_overrides.remove(&id) {
                            undo.overrides.push((id, expanded));
                        }
                        structural = true;
                    }
                    None => {
                        gtrace!(id = %id, "delete of unknown row ignored");
                    }
                },
            }
        }
        gdebug!(structural, changed = changed.len(), "GridEngine::update_rows");

        if structural {
            if let Err(err) = self.rebuild_tree() {
                undo.restore(self);
                return Err(err);
            }
            self.selection.retain_existing(&self.rows);
            self.run_from_sort();
        } else if !changed.is_empty() {
            self.apply_sort();
            self.refilter(&changed);
            self.run_from_visible();
        }
        Ok(())
    }

    pub fn row(&self, id: &RowId) -> Option<&RowRecord> {
        self.rows.get(id)
    }

    /// Caller row ids in insertion order.
    pub fn row_ids(&self) -> &[RowId] {
        &self.row_order
    }

    // ---- columns ----

    /// Replaces the caller column set.
    pub fn set_columns(&mut self, columns: impl IntoIterator<Item = ColumnDef>) -> Result<()> {
        self.raw_columns = ColumnSet::new(columns)?;
        self.on_raw_columns_changed();
        Ok(())
    }

    /// Replaces columns with the same field, appends the others.
    pub fn update_columns(&mut self, columns: impl IntoIterator<Item = ColumnDef>) {
        for column in columns {
            self.raw_columns.upsert(column);
        }
        self.on_raw_columns_changed();
    }

    pub fn remove_column(&mut self, field: &str) -> Result<ColumnDef> {
        let removed = self
            .raw_columns
            .remove(field)
            .ok_or_else(|| GridError::UnknownColumn {
                field: field.into(),
            })?;
        self.column_patches.remove(field);
        self.on_raw_columns_changed();
        Ok(removed)
    }

    pub fn set_column_visibility(&mut self, field: &str, visible: bool) -> Result<()> {
        self.patch_column(field, |patch| patch.hidden = Some(!visible))
    }

    pub fn set_column_width(&mut self, field: &str, width: u32) -> Result<()> {
        self.patch_column(field, |patch| patch.width = Some(width))
    }

    /// Adds a contributor to the column hydration hook and re-derives the columns.
    pub fn register_column_preprocessor(
        &mut self,
        id: impl Into<String>,
        apply: impl Fn(ColumnSet, &HydrationDeps) -> ColumnSet + Send + Sync + 'static,
    ) {
        self.registry.register(HYDRATE_COLUMNS, id, apply);
        self.on_hydration_changed();
    }

    pub fn unregister_column_preprocessor(&mut self, id: &str) -> bool {
        let removed = self.registry.unregister(HYDRATE_COLUMNS, id);
        if removed {
            self.on_hydration_changed();
        }
        removed
    }

    pub fn preprocessors(&self) -> &PreProcessorRegistry<ColumnSet, HydrationDeps> {
        &self.registry
    }

    // ---- sort / filter ----

    pub fn set_sort_model(&mut self, model: SortModel) -> Result<()> {
        model.validate(&self.columns)?;
        gtrace!(model = ?model, "GridEngine::set_sort_model");
        self.sort_model = model;
        self.apply_sort();
        self.run_from_visible();
        Ok(())
    }

    /// Header-click intent: advances `field` through `sorting_order`.
    ///
    /// Without `allow_multi` every other sort key is dropped.
    pub fn toggle_column_sort(&mut self, field: &str, allow_multi: bool) -> Result<()> {
        let column = self
            .columns
            .get(field)
            .ok_or_else(|| GridError::UnknownSortField {
                field: field.into(),
            })?;
        if !column.is_sortable() {
            return Err(GridError::ColumnNotSortable {
                field: field.into(),
            });
        }
        let model = toggle_sort_model(
            &self.sort_model,
            field,
            allow_multi,
            &self.options.sorting_order,
        );
        self.set_sort_model(model)
    }

    pub fn set_filter_model(&mut self, model: FilterModel) -> Result<()> {
        model.validate(&self.columns)?;
        gtrace!(items = model.items.len(), "GridEngine::set_filter_model");
        self.filter_model = model;
        self.run_from_filter();
        Ok(())
    }

    // ---- viewport ----

    /// Measures the outer box. The first call moves windowing out of `Uninitialized`.
    pub fn report_viewport_size(&mut self, width: u32, height: u32) {
        gtrace!(width, height, "GridEngine::report_viewport_size");
        self.viewport = ViewportState { width, height };
        self.windowing.measure();
        self.run_from_sizing();
    }

    /// Scroll intent. Offsets are clamped to the scrollable range.
    pub fn report_scroll(&mut self, left: u64, top: u64) {
        let (max_left, max_top) = self.sizing.max_scroll();
        let scroll = ScrollState {
            left: left.min(max_left),
            top: top.min(max_top),
        };
        if scroll == self.scroll && self.windowing.window().is_some() {
            return;
        }
        self.scroll = scroll;
        self.recompute_window();
    }

    pub fn set_page(&mut self, page: usize) {
        let page = page.min(self.page_count() - 1);
        if page == self.page {
            return;
        }
        gtrace!(page, "GridEngine::set_page");
        self.page = page;
        self.scroll.top = 0;
        self.run_from_sizing();
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        self.sizing.page_count(self.visible.len())
    }

    // ---- expansion / grouping ----

    pub fn set_row_expansion(&mut self, id: &RowId, expanded: bool) -> Result<()> {
        let node = self
            .tree
            .node(id)
            .ok_or_else(|| GridError::UnknownRow { id: id.clone() })?;
        self.expansion_overrides.insert(id.clone(), expanded);
        if node.children_expanded == expanded {
            return Ok(());
        }
        gtrace!(id = %id, expanded, "GridEngine::set_row_expansion");
        self.tree = Arc::new(self.tree.with_expansion(id, expanded)?);
        self.subscribers
            .publish(GridEvent::RowTreeChanged(Arc::clone(&self.tree)));
        self.run_from_visible();
        Ok(())
    }

    /// Flips the expansion of `id`; returns the new state.
    pub fn toggle_row_expansion(&mut self, id: &RowId) -> Result<bool> {
        let expanded = !self
            .tree
            .node(id)
            .ok_or_else(|| GridError::UnknownRow { id: id.clone() })?
            .children_expanded;
        self.set_row_expansion(id, expanded)?;
        Ok(expanded)
    }

    pub fn set_grouping(&mut self, grouping: GroupingKind) {
        self.update_options(|o| o.grouping = grouping);
    }

    // ---- selection ----

    /// Selects or deselects one caller row. Synthesized groups are not selectable.
    pub fn select_row(&mut self, id: &RowId, selected: bool) -> Result<bool> {
        if !self.rows.contains_key(id) {
            return Err(GridError::UnknownRow { id: id.clone() });
        }
        Ok(self.selection.set(id.clone(), selected))
    }

    pub fn deselect_all(&mut self) -> bool {
        self.selection.clear()
    }

    /// Replaces the selection with the caller rows of the visible ordering.
    ///
    /// Rows filtered out or hidden under a collapsed ancestor are left out, and so are
    /// synthesized groups. Returns the number of selected rows.
    pub fn select_all_visible(&mut self) -> usize {
        let rows = &self.rows;
        let ids = self
            .visible
            .iter()
            .filter(|id| rows.contains_key(*id))
            .cloned();
        self.selection.replace(ids);
        self.selection.len()
    }

    pub fn is_row_selected(&self, id: &RowId) -> bool {
        self.selection.is_selected(id)
    }

    /// Selected ids in insertion order.
    pub fn selected_rows(&self) -> Vec<RowId> {
        self.selection.in_order(&self.row_order)
    }

    // ---- accessors ----

    pub fn visible_ordering(&self) -> Arc<[RowId]> {
        Arc::clone(&self.visible)
    }

    /// Position of `id` in the visible ordering.
    pub fn visible_index(&self, id: &RowId) -> Option<usize> {
        self.visible_index.get(id).copied()
    }

    /// Rows of the current page.
    pub fn page_rows(&self) -> &[RowId] {
        let first = self.sizing.page_first_row;
        self.visible
            .get(first..first + self.sizing.virtual_row_count)
            .unwrap_or(&[])
    }

    /// `None` until the viewport was measured.
    pub fn render_window(&self) -> Option<Arc<RenderWindow>> {
        self.windowing.window()
    }

    pub fn window_phase(&self) -> WindowPhase {
        self.windowing.phase()
    }

    pub fn row_tree(&self) -> Arc<RowTree> {
        Arc::clone(&self.tree)
    }

    pub fn row_node(&self, id: &RowId) -> Option<&RowNode> {
        self.tree.node(id)
    }

    pub fn filtered_descendant_count(&self, id: &RowId) -> usize {
        self.filter.descendant_count(id)
    }

    pub fn sizing(&self) -> &Sizing {
        &self.sizing
    }

    /// Hydrated columns, including synthetic grouping columns and hidden columns.
    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    pub fn visible_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.visible()
    }

    pub fn column_positions(&self) -> &ColumnPositions {
        &self.column_positions
    }

    pub fn sort_model(&self) -> &SortModel {
        &self.sort_model
    }

    pub fn filter_model(&self) -> &FilterModel {
        &self.filter_model
    }

    /// Node accounting; synthesized group nodes count like rows.
    pub fn row_counts(&self) -> RowCounts {
        let total = self.tree.len();
        RowCounts {
            visible: self.visible.len(),
            hidden_by_collapse: self.hidden_by_collapse,
            filtered_out: total.saturating_sub(self.filter.visible.len()),
            total,
        }
    }

    pub fn last_error(&self) -> Option<&GridError> {
        self.last_error.as_ref()
    }

    pub fn clear_last_error(&mut self) -> Option<GridError> {
        self.last_error.take()
    }

    pub fn frame_state(&self) -> FrameState {
        FrameState {
            viewport: self.viewport,
            scroll: self.scroll,
        }
    }

    pub fn scroll(&self) -> ScrollState {
        self.scroll
    }

    // ---- pipeline ----

    fn access(&self) -> RowAccess<'_> {
        RowAccess::new(&self.rows, &self.tree)
            .with_grouping_field(self.options.grouping.grouping_field())
    }

    fn report_error(&mut self, err: GridError) {
        gwarn!(error = %err, "pipeline stage failed");
        self.last_error = Some(err.clone());
        self.subscribers.publish(GridEvent::Error(err));
    }

    fn patch_column(&mut self, field: &str, f: impl FnOnce(&mut ColumnPatch)) -> Result<()> {
        if !self.columns.contains(field) {
            return Err(GridError::UnknownColumn {
                field: field.into(),
            });
        }
        f(self.column_patches.entry(field.into()).or_default());
        self.hydrate_columns();
        self.run_from_sizing();
        Ok(())
    }

    /// Re-derives the hydrated columns. Returns whether the hook result was recomputed.
    fn hydrate_columns(&mut self) -> bool {
        let deps = self.options.grouping.hydration_deps();
        let (mut columns, recomputed) = self.registry.run_cached(
            HYDRATE_COLUMNS,
            self.raw_columns_version,
            &self.raw_columns,
            &deps,
        );
        for (field, patch) in &self.column_patches {
            if let Some(column) = columns.get_mut(field) {
                patch.apply(column);
            }
        }
        self.column_positions = Arc::new(ColumnPositions::from_columns(&columns));
        self.columns = Arc::new(columns);
        recomputed
    }

    fn on_raw_columns_changed(&mut self) {
        self.raw_columns_version += 1;
        gdebug!(
            columns = self.raw_columns.len(),
            version = self.raw_columns_version,
            "columns changed"
        );
        self.hydrate_columns();
        self.prune_stale_models();
        // Row-grouping keys are formatted through the caller columns.
        self.run_from_tree();
    }

    fn on_hydration_changed(&mut self) {
        if self.hydrate_columns() {
            self.prune_stale_models();
            self.run_from_sort();
        }
    }

    /// Reports and drops sort/filter items that no longer resolve against the columns.
    fn prune_stale_models(&mut self) {
        if let Err(err) = self.sort_model.validate(&self.columns) {
            self.report_error(err);
            let mut model = self.sort_model.clone();
            model.retain_valid(&self.columns);
            self.sort_model = model;
        }
        if let Err(err) = self.filter_model.validate(&self.columns) {
            self.report_error(err);
            let mut model = self.filter_model.clone();
            model.retain_valid(&self.columns);
            self.filter_model = model;
        }
    }

    /// A failed build keeps the previous tree; the error is already reported.
    fn run_from_tree(&mut self) {
        let _ = self.rebuild_tree();
        self.run_from_sort();
    }

    fn run_from_sort(&mut self) {
        self.apply_sort();
        self.run_from_filter();
    }

    fn run_from_filter(&mut self) {
        self.apply_filter();
        self.run_from_visible();
    }

    fn run_from_visible(&mut self) {
        self.rebuild_visible();
        self.run_from_sizing();
    }

    fn run_from_sizing(&mut self) {
        self.recompute_sizing();
        self.recompute_window();
    }

    fn rebuild_tree(&mut self) -> Result<()> {
        let inputs =
            self.options
                .grouping
                .tree_inputs(&self.row_order, &self.rows, &self.raw_columns);
        gdebug!(rows = inputs.len(), "rebuild row tree");
        match build_row_tree(&inputs, &self.options.expansion_config()) {
            Ok(mut tree) => {
                for (id, expanded) in &self.expansion_overrides {
                    tree.set_expanded(id, *expanded);
                }
                self.tree = Arc::new(tree);
                self.subscribers
                    .publish(GridEvent::RowTreeChanged(Arc::clone(&self.tree)));
                Ok(())
            }
            // The previous tree stays in place.
            Err(err) => {
                self.report_error(err.clone());
                Err(err)
            }
        }
    }

    fn apply_sort(&mut self) {
        let result = self.options.grouping.sort(
            &self.tree,
            &self.sort_model,
            &self.columns,
            &self.access(),
            self.options.disable_children_sorting,
        );
        self.sorted = match result {
            Ok(sorted) => sorted,
            Err(err) => {
                self.report_error(err);
                SortedTree::from_tree(&self.tree)
            }
        };
        self.subscribers
            .publish(GridEvent::SortApplied(self.sorted.flatten().into()));
    }

    fn apply_filter(&mut self) {
        let result = self.options.grouping.filter(
            &self.tree,
            &self.filter_model,
            &self.columns,
            &self.access(),
            self.options.disable_children_filtering,
        );
        self.filter = match result {
            Ok(filter) => filter,
            Err(err) => {
                self.report_error(err);
                FilterResult::unfiltered(&self.tree)
            }
        };
    }

    fn refilter(&mut self, changed: &[RowId]) {
        let result = self.options.grouping.refilter(
            &self.filter,
            changed,
            &self.tree,
            &self.filter_model,
            &self.columns,
            &self.access(),
            self.options.disable_children_filtering,
        );
        match result {
            Ok(filter) => self.filter = filter,
            Err(_) => self.apply_filter(),
        }
    }

    /// Depth-first walk of the sorted tree: filter-visible nodes under expanded ancestors are
    /// shown, the other filter-visible nodes are hidden by collapse.
    fn rebuild_visible(&mut self) {
        let mut visible = Vec::new();
        let mut hidden_by_collapse = 0usize;
        let mut stack: Vec<(&RowId, bool)> =
            self.sorted.roots.iter().rev().map(|id| (id, true)).collect();
        while let Some((id, shown)) = stack.pop() {
            // A filtered-out node never has visible descendants.
            if !self.filter.is_visible(id) {
                continue;
            }
            if shown {
                visible.push(id.clone());
            } else {
                hidden_by_collapse += 1;
            }
            let expanded = self.tree.node(id).is_some_and(|n| n.children_expanded);
            for child in self.sorted.children_of(id).iter().rev() {
                stack.push((child, shown && expanded));
            }
        }

        self.visible_index = visible
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        self.hidden_by_collapse = hidden_by_collapse;
        self.visible = visible.into();
        gdebug!(
            visible = self.visible.len(),
            hidden_by_collapse,
            "visible ordering rebuilt"
        );
        self.subscribers
            .publish(GridEvent::FilterApplied(Arc::clone(&self.visible)));
    }

    fn recompute_sizing(&mut self) {
        let o = &self.options;
        let paginated = o.pagination.is_some() || o.auto_page_size;
        let input = SizingInput {
            row_count: self.visible.len(),
            row_height: o.row_height,
            header_height: o.header_height,
            density: o.density,
            box_width: self.viewport.width,
            box_height: self.viewport.height,
            columns_total_width: self.column_positions.total_width(),
            scrollbar_size: o.scrollbar_size,
            pagination: paginated.then(|| Pagination {
                page: self.page,
                page_size: o.pagination.unwrap_or(0),
            }),
            auto_height: o.auto_height,
            auto_page_size: o.auto_page_size,
        };
        let sizing = compute_sizing(&input);
        if let Some(size) = sizing.page_size {
            self.page = sizing.page_first_row / size;
        }

        let (max_left, max_top) = sizing.max_scroll();
        self.scroll.left = self.scroll.left.min(max_left);
        self.scroll.top = self.scroll.top.min(max_top);

        if sizing != self.sizing {
            self.sizing = sizing;
            self.subscribers.publish(GridEvent::SizingChanged(sizing));
        }
    }

    fn recompute_window(&mut self) {
        let layout = WindowLayout {
            viewport_width: self.sizing.viewport_inner.width,
            viewport_height: self.sizing.viewport_inner.height,
            row_height: self.sizing.row_height,
            page_first_row: self.sizing.page_first_row,
            row_count: self.sizing.virtual_row_count,
            columns: Arc::clone(&self.column_positions),
            row_buffer: self.options.row_buffer,
            column_buffer: self.options.column_buffer,
        };
        let prev = self.windowing.window();
        let Some(next) = self.windowing.update(&layout, self.scroll) else {
            return;
        };
        if !prev.is_some_and(|prev| Arc::ptr_eq(&prev, &next)) {
            self.subscribers.publish(GridEvent::WindowChanged(next));
        }
    }
}
