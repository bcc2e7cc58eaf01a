//! Column/row windowing engine.
//!
//! Computes the buffered index spans of rows and columns to materialize for a scroll position,
//! and keeps the resulting [`RenderWindow`] identity-stable while the spans do not move.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::{ColumnSet, IndexSpan, RenderWindow, ScrollState};

/// Cumulative left edges of the visible columns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnPositions {
    lefts: Vec<u64>,
    total_width: u64,
}

impl ColumnPositions {
    pub fn from_widths(widths: impl IntoIterator<Item = u32>) -> Self {
        let mut lefts = Vec::new();
        let mut total_width = 0u64;
        for width in widths {
            lefts.push(total_width);
            total_width += width as u64;
        }
        Self { lefts, total_width }
    }

    /// Positions of the non-hidden columns of `columns`.
    pub fn from_columns(columns: &ColumnSet) -> Self {
        Self::from_widths(columns.visible().map(|c| c.width))
    }

    pub fn len(&self) -> usize {
        self.lefts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lefts.is_empty()
    }

    pub fn total_width(&self) -> u64 {
        self.total_width
    }

    pub fn left(&self, index: usize) -> Option<u64> {
        self.lefts.get(index).copied()
    }

    pub fn right(&self, index: usize) -> Option<u64> {
        self.lefts.get(index)?;
        Some(self.lefts.get(index + 1).copied().unwrap_or(self.total_width))
    }

    /// Index of the first column whose right edge exceeds `offset`, clamped to the last column.
    pub fn index_at(&self, offset: u64) -> Option<usize> {
        if self.lefts.is_empty() {
            return None;
        }
        // First column starting after `offset`, minus one.
        let after = self.lefts.partition_point(|&left| left <= offset);
        Some(after.saturating_sub(1).min(self.lefts.len() - 1))
    }
}

fn buffered(first: usize, last: usize, buffer: usize, len: usize) -> IndexSpan {
    IndexSpan {
        first: first.saturating_sub(buffer),
        last: last.saturating_add(buffer).min(len - 1),
    }
}

/// Row span for a scroll offset within a page of `row_count` rows.
pub fn compute_row_span(
    scroll_top: u64,
    viewport_height: u64,
    row_height: u32,
    row_count: usize,
    buffer: usize,
) -> Option<IndexSpan> {
    if row_count == 0 {
        return None;
    }
    let row_height = row_height.max(1) as u64;
    let max = row_count - 1;
    let first = ((scroll_top / row_height) as usize).min(max);
    let last = ((scroll_top.saturating_add(viewport_height) / row_height) as usize).min(max);
    Some(buffered(first, last, buffer, row_count))
}

/// Column span for a horizontal scroll offset.
pub fn compute_column_span(
    positions: &ColumnPositions,
    scroll_left: u64,
    viewport_width: u64,
    buffer: usize,
) -> Option<IndexSpan> {
    let first = positions.index_at(scroll_left)?;
    let last = positions.index_at(scroll_left.saturating_add(viewport_width))?;
    Some(buffered(first, last, buffer, positions.len()))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WindowPhase {
    /// No viewport measurement yet; nothing may be rendered.
    #[default]
    Uninitialized,
    /// Viewport known, no window computed yet.
    Measured,
    /// The last update kept the previous window.
    Stable,
    /// The last update produced a new window.
    Updating,
}

/// Everything except the scroll position that determines a window.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WindowLayout {
    pub viewport_width: u64,
    pub viewport_height: u64,
    /// Row height after density.
    pub row_height: u32,
    /// Index of the first row of the current page in the visible ordering.
    pub page_first_row: usize,
    /// Rows on the current page.
    pub row_count: usize,
    pub columns: Arc<ColumnPositions>,
    pub row_buffer: usize,
    pub column_buffer: usize,
}

/// Stateful windowing for one grid view.
#[derive(Clone, Debug, Default)]
pub struct Windowing {
    phase: WindowPhase,
    current: Option<Arc<RenderWindow>>,
    layout: Option<WindowLayout>,
    scroll: ScrollState,
}

impl Windowing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> WindowPhase {
        self.phase
    }

    pub fn window(&self) -> Option<Arc<RenderWindow>> {
        self.current.clone()
    }

    /// Records that the viewport has been measured.
    pub fn measure(&mut self) {
        if self.phase == WindowPhase::Uninitialized {
            self.phase = WindowPhase::Measured;
        }
    }

    /// Back to `Uninitialized`, dropping the current window.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Recomputes the window for `layout` and `scroll`.
    ///
    /// A scroll along one axis only recomputes that axis. When neither span moves the previous
    /// `Arc` is returned unchanged. Returns `None` until [`Self::measure`] was called.
    pub fn update(
        &mut self,
        layout: &WindowLayout,
        scroll: ScrollState,
    ) -> Option<Arc<RenderWindow>> {
        if self.phase == WindowPhase::Uninitialized {
            return None;
        }

        let prev = self.current.as_deref().copied();
        let layout_changed = self.layout.as_ref() != Some(layout);
        let rows_dirty = layout_changed || prev.is_none() || scroll.top != self.scroll.top;
        let columns_dirty = layout_changed || prev.is_none() || scroll.left != self.scroll.left;
        self.scroll = scroll;
        if layout_changed {
            self.layout = Some(layout.clone());
        }

        let mut next = prev.unwrap_or(RenderWindow {
            rows: None,
            columns: None,
            offset_left: 0,
            offset_top: 0,
        });
        if rows_dirty {
            let span = compute_row_span(
                scroll.top,
                layout.viewport_height,
                layout.row_height,
                layout.row_count,
                layout.row_buffer,
            );
            next.offset_top = span.map_or(0, |s| s.first as u64 * layout.row_height as u64);
            next.rows = span.map(|s| IndexSpan {
                first: s.first + layout.page_first_row,
                last: s.last + layout.page_first_row,
            });
        }
        if columns_dirty {
            let span = compute_column_span(
                &layout.columns,
                scroll.left,
                layout.viewport_width,
                layout.column_buffer,
            );
            next.offset_left = span
                .and_then(|s| layout.columns.left(s.first))
                .unwrap_or(0);
            next.columns = span;
        }

        match &self.current {
            Some(current) if **current == next => {
                gtrace!("render window unchanged");
                self.phase = WindowPhase::Stable;
            }
            _ => {
                gtrace!(
                    first_row = next.first_row_index(),
                    last_row = next.last_row_index(),
                    first_column = next.first_column_index(),
                    last_column = next.last_column_index(),
                    "render window replaced"
                );
                self.current = Some(Arc::new(next));
                self.phase = WindowPhase::Updating;
            }
        }
        self.current.clone()
    }
}
