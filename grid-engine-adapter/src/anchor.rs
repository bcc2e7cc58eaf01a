use grid_engine::{GridEngine, RowId};

/// A scroll anchor that keeps a row in place across re-sorts, re-filters and row updates.
///
/// Typical use cases:
/// - sorting or filtering while scrolled down, without the viewport jumping to other rows
/// - streaming row updates that insert rows above the viewport
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RowAnchor {
    pub id: RowId,
    /// The distance from the anchor row's top edge to the viewport's scroll offset.
    pub offset_in_viewport: u64,
}

/// Captures an anchor for the row at the top of the viewport.
///
/// Returns `None` before the viewport was measured or when the current page is empty.
pub fn capture_first_visible_anchor(engine: &GridEngine) -> Option<RowAnchor> {
    engine.render_window()?;
    let sizing = engine.sizing();
    let row_height = u64::from(sizing.row_height.max(1));
    let top = engine.scroll().top;
    let local = usize::try_from(top / row_height).ok()?;
    let id = engine.page_rows().get(local)?.clone();
    let offset_in_viewport = top - local as u64 * row_height;
    gtrace!(id = %id, offset_in_viewport, "capture anchor");
    Some(RowAnchor {
        id,
        offset_in_viewport,
    })
}

/// Applies a previously captured anchor by adjusting the scroll offset (and the page, when the
/// row moved to another page).
///
/// Returns `false` when the row is no longer in the visible ordering (deleted, filtered out, or
/// under a collapsed group).
pub fn apply_anchor(engine: &mut GridEngine, anchor: &RowAnchor) -> bool {
    let Some(index) = engine.visible_index(&anchor.id) else {
        gtrace!(id = %anchor.id, "anchor row not visible");
        return false;
    };
    if let Some(page_size) = engine.sizing().page_size.filter(|&size| size > 0) {
        engine.set_page(index / page_size);
    }

    let sizing = engine.sizing();
    let local = index.saturating_sub(sizing.page_first_row) as u64;
    let target = local
        .saturating_mul(u64::from(sizing.row_height))
        .saturating_add(anchor.offset_in_viewport);
    let left = engine.scroll().left;
    engine.report_scroll(left, target);
    true
}
