use grid_engine::{FilterModel, GridEngine, GridOptions, Result};

use crate::{DebouncedFilter, RowAnchor, apply_anchor, capture_first_visible_anchor};

/// A framework-neutral controller that wraps a [`GridEngine`] and provides common adapter
/// workflows (debounced filter input, scroll anchoring).
///
/// This type does not hold any UI objects. Adapters drive it by calling:
/// - `on_viewport_size` / `on_scroll` when UI events occur
/// - `on_filter_input` for every filter keystroke
/// - `tick(now_ms)` each frame/timer tick, which applies a filter model once its debounce delay
///   has elapsed
#[derive(Clone, Debug)]
pub struct GridController {
    engine: GridEngine,
    filter_input: DebouncedFilter,
}

impl GridController {
    pub fn new(options: GridOptions) -> Self {
        Self::from_engine(GridEngine::new(options))
    }

    pub fn from_engine(engine: GridEngine) -> Self {
        let filter_input = DebouncedFilter::new(engine.options().filter_debounce_ms);
        Self {
            engine,
            filter_input,
        }
    }

    pub fn engine(&self) -> &GridEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut GridEngine {
        &mut self.engine
    }

    pub fn into_engine(self) -> GridEngine {
        self.engine
    }

    pub fn on_viewport_size(&mut self, width: u32, height: u32) {
        self.engine.report_viewport_size(width, height);
    }

    /// Call this when the UI reports a scroll offset change (e.g. user wheel/drag).
    pub fn on_scroll(&mut self, left: u64, top: u64) {
        self.engine.report_scroll(left, top);
    }

    /// Schedules `model` for application after the filter debounce delay, replacing any model
    /// still waiting.
    ///
    /// The model is validated right away; an invalid model is rejected and the pending one is
    /// left alone.
    pub fn on_filter_input(&mut self, model: FilterModel, now_ms: u64) -> Result<()> {
        model.validate(self.engine.columns())?;
        self.filter_input
            .set_delay_ms(self.engine.options().filter_debounce_ms);
        self.filter_input.schedule(model, now_ms);
        Ok(())
    }

    /// Advances the controller. Returns whether a debounced filter model was applied.
    pub fn tick(&mut self, now_ms: u64) -> Result<bool> {
        let Some(model) = self.filter_input.poll(now_ms) else {
            return Ok(false);
        };
        gdebug!(now_ms, items = model.items.len(), "apply debounced filter");
        self.engine.set_filter_model(model)?;
        Ok(true)
    }

    /// Applies the pending filter model immediately. Returns whether there was one.
    pub fn apply_filter_now(&mut self) -> Result<bool> {
        let Some(model) = self.filter_input.flush() else {
            return Ok(false);
        };
        self.engine.set_filter_model(model)?;
        Ok(true)
    }

    pub fn cancel_filter_input(&mut self) -> bool {
        self.filter_input.cancel()
    }

    pub fn has_pending_filter(&self) -> bool {
        self.filter_input.is_pending()
    }

    pub fn capture_first_visible_anchor(&self) -> Option<RowAnchor> {
        capture_first_visible_anchor(&self.engine)
    }

    /// Restores a previously captured anchor. Returns `true` when the row is still visible.
    pub fn apply_anchor(&mut self, anchor: &RowAnchor) -> bool {
        apply_anchor(&mut self.engine, anchor)
    }

    /// Runs `f` on the engine while keeping the row at the top of the viewport in place.
    ///
    /// For example, `c.anchored(|e| e.set_sort_model(model))` re-sorts without moving the view
    /// away from the rows the user was looking at.
    pub fn anchored<R>(&mut self, f: impl FnOnce(&mut GridEngine) -> R) -> R {
        let anchor = self.capture_first_visible_anchor();
        let out = f(&mut self.engine);
        if let Some(anchor) = anchor {
            self.apply_anchor(&anchor);
        }
        out
    }
}
