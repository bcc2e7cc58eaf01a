//! Viewport/container sizing engine.

use crate::Density;

/// Client-side pagination of the visible ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pagination {
    /// Zero-based page index.
    pub page: usize,
    pub page_size: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SizingInput {
    /// Length of the visible ordering.
    pub row_count: usize,
    /// Base row height, before density.
    pub row_height: u32,
    /// Base header height, before density.
    pub header_height: u32,
    pub density: Density,
    pub box_width: u32,
    pub box_height: u32,
    pub columns_total_width: u64,
    pub scrollbar_size: u32,
    pub pagination: Option<Pagination>,
    /// The box grows to fit every row of the page.
    pub auto_height: bool,
    /// The page size becomes the number of rows fitting in the box.
    pub auto_page_size: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Size {
    pub width: u64,
    pub height: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sizing {
    pub has_scroll_x: bool,
    pub has_scroll_y: bool,
    /// Content height of the current page.
    pub total_height: u64,
    pub total_width: u64,
    /// Rows of the current page that fit in the viewport at once.
    pub page_row_count: usize,
    /// Index (into the visible ordering) of the first row of the current page.
    pub page_first_row: usize,
    /// Rows on the current page; the row bound of the render window.
    pub virtual_row_count: usize,
    /// Effective page size (`None` without pagination).
    pub page_size: Option<usize>,
    /// Row height after density.
    pub row_height: u32,
    /// Header height after density.
    pub header_height: u32,
    /// Box height; differs from the input under `auto_height`.
    pub box_height: u64,
    /// Scrollable area: box minus header and reserved scrollbars.
    pub viewport_inner: Size,
}

impl Sizing {
    /// Number of pages (at least 1).
    pub fn page_count(&self, row_count: usize) -> usize {
        match self.page_size {
            Some(size) if size > 0 => row_count.div_ceil(size).max(1),
            _ => 1,
        }
    }

    /// Largest meaningful `(left, top)` scroll offset.
    pub fn max_scroll(&self) -> (u64, u64) {
        (
            self.total_width.saturating_sub(self.viewport_inner.width),
            self.total_height.saturating_sub(self.viewport_inner.height),
        )
    }
}

/// Computes sizing from scratch (no scrollbars assumed).
pub fn compute_sizing(input: &SizingInput) -> Sizing {
    compute_sizing_seeded(input, false, false)
}

/// Computes sizing starting the scrollbar fixed point from the given flags.
///
/// Flags only ever switch on, so the loop settles within three passes. Seeding with the flags
/// of a previous result reproduces that result.
pub fn compute_sizing_seeded(input: &SizingInput, seed_x: bool, seed_y: bool) -> Sizing {
    let row_height = input.density.scale(input.row_height).max(1);
    let header_height = input.density.scale(input.header_height);
    let scrollbar = input.scrollbar_size as u64;
    let box_width = input.box_width as u64;
    let box_height = input.box_height as u64;
    let total_width = input.columns_total_width;

    let page_size = if input.auto_page_size {
        let has_x = total_width > box_width;
        let available = box_height
            .saturating_sub(header_height as u64)
            .saturating_sub(if has_x { scrollbar } else { 0 });
        Some(((available / row_height as u64) as usize).max(1))
    } else {
        input.pagination.map(|p| p.page_size.max(1))
    };

    let (page_first_row, virtual_row_count) = match page_size {
        Some(size) => {
            let page = input.pagination.map_or(0, |p| p.page);
            let last_page = input.row_count.saturating_sub(1) / size;
            let first = page.min(last_page) * size;
            (first, size.min(input.row_count - first))
        }
        None => (0, input.row_count),
    };
    let total_height = virtual_row_count as u64 * row_height as u64;

    let (has_scroll_x, has_scroll_y, box_height) = if input.auto_height {
        let has_x = total_width > box_width;
        let grown = header_height as u64 + total_height + if has_x { scrollbar } else { 0 };
        (has_x, false, grown)
    } else if input.auto_page_size {
        (total_width > box_width, false, box_height)
    } else {
        let (mut x, mut y) = (seed_x, seed_y);
        for _ in 0..3 {
            let inner_width = box_width.saturating_sub(if y { scrollbar } else { 0 });
            let inner_height = box_height
                .saturating_sub(header_height as u64)
                .saturating_sub(if x { scrollbar } else { 0 });
            let next_x = x || total_width > inner_width;
            let next_y = y || total_height > inner_height;
            if (next_x, next_y) == (x, y) {
                break;
            }
            (x, y) = (next_x, next_y);
        }
        (x, y, box_height)
    };

    let viewport_inner = Size {
        width: box_width.saturating_sub(if has_scroll_y { scrollbar } else { 0 }),
        height: box_height
            .saturating_sub(header_height as u64)
            .saturating_sub(if has_scroll_x { scrollbar } else { 0 }),
    };
    let fitting = (viewport_inner.height / row_height as u64) as usize;

    gtrace!(
        has_scroll_x,
        has_scroll_y,
        total_height,
        virtual_row_count,
        "compute_sizing"
    );
    Sizing {
        has_scroll_x,
        has_scroll_y,
        total_height,
        total_width,
        page_row_count: fitting.min(virtual_row_count),
        page_first_row,
        virtual_row_count,
        page_size,
        row_height,
        header_height,
        box_height,
        viewport_inner,
    }
}
