use grid_engine::FilterModel;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Pending {
    model: FilterModel,
    due_ms: u64,
}

/// Debounce timer for filter input.
///
/// Holds at most one pending filter model. Every new keystroke replaces it and restarts the
/// delay; the model becomes due once `delay_ms` passed without further input. Time is supplied
/// by the adapter (`now_ms`), so the timer works with any clock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DebouncedFilter {
    delay_ms: u64,
    pending: Option<Pending>,
}

impl DebouncedFilter {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            pending: None,
        }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    /// Changes the delay of future schedules; a pending model keeps its due time.
    pub fn set_delay_ms(&mut self, delay_ms: u64) {
        self.delay_ms = delay_ms;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn due_ms(&self) -> Option<u64> {
        self.pending.as_ref().map(|p| p.due_ms)
    }

    /// Replaces any pending model with `model`, due `delay_ms` after `now_ms`.
    pub fn schedule(&mut self, model: FilterModel, now_ms: u64) {
        let due_ms = now_ms.saturating_add(self.delay_ms);
        gtrace!(due_ms, replaced = self.pending.is_some(), "schedule filter");
        self.pending = Some(Pending { model, due_ms });
    }

    /// Takes the pending model once it is due.
    pub fn poll(&mut self, now_ms: u64) -> Option<FilterModel> {
        if self.pending.as_ref()?.due_ms > now_ms {
            return None;
        }
        self.pending.take().map(|p| p.model)
    }

    /// Drops the pending model. Returns whether there was one.
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Takes the pending model without waiting for the delay.
    pub fn flush(&mut self) -> Option<FilterModel> {
        self.pending.take().map(|p| p.model)
    }
}

impl Default for DebouncedFilter {
    fn default() -> Self {
        Self::new(500)
    }
}
