use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::{GridError, RenderWindow, RowId, RowTree, Sizing};

/// A change notification, carrying the new immutable snapshot.
#[derive(Clone, Debug, PartialEq)]
pub enum GridEvent {
    RowTreeChanged(Arc<RowTree>),
    /// Depth-first order of every node after sorting (expansion and filtering not applied).
    SortApplied(Arc<[RowId]>),
    /// The new visible ordering.
    FilterApplied(Arc<[RowId]>),
    SizingChanged(Sizing),
    WindowChanged(Arc<RenderWindow>),
    /// A pipeline stage failed and fell back to a degraded result.
    Error(GridError),
}

/// Event kinds, in pipeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GridEventKind {
    RowTreeChanged,
    SortApplied,
    FilterApplied,
    SizingChanged,
    WindowChanged,
    Error,
}

impl GridEvent {
    pub fn kind(&self) -> GridEventKind {
        match self {
            Self::RowTreeChanged(_) => GridEventKind::RowTreeChanged,
            Self::SortApplied(_) => GridEventKind::SortApplied,
            Self::FilterApplied(_) => GridEventKind::FilterApplied,
            Self::SizingChanged(_) => GridEventKind::SizingChanged,
            Self::WindowChanged(_) => GridEventKind::WindowChanged,
            Self::Error(_) => GridEventKind::Error,
        }
    }
}

pub type GridListener = Arc<dyn Fn(&GridEvent) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Observer list owned by the engine.
///
/// Inside a batch, events are held back and coalesced (latest per kind, every error kept); the
/// batch flushes them in pipeline order when it ends.
#[derive(Clone, Default)]
pub struct Subscribers {
    listeners: Vec<(SubscriptionId, GridListener)>,
    next_id: u64,
    depth: usize,
    pending: Vec<GridEvent>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        listener: impl Fn(&GridEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn is_batching(&self) -> bool {
        self.depth > 0
    }

    pub fn publish(&mut self, event: GridEvent) {
        if self.depth > 0 {
            let kind = event.kind();
            // Errors are never merged; every one reaches listeners.
            let slot = match kind {
                GridEventKind::Error => None,
                _ => self.pending.iter_mut().find(|e| e.kind() == kind),
            };
            match slot {
                Some(slot) => *slot = event,
                None => self.pending.push(event),
            }
            return;
        }
        self.deliver(&event);
    }

    pub fn begin_batch(&mut self) {
        self.depth = self.depth.saturating_add(1);
    }

    pub fn end_batch(&mut self) {
        debug_assert!(self.depth > 0, "batch depth underflow");
        self.depth = self.depth.saturating_sub(1);
        if self.depth > 0 || self.pending.is_empty() {
            return;
        }
        let mut pending = core::mem::take(&mut self.pending);
        pending.sort_by_key(GridEvent::kind);
        for event in &pending {
            self.deliver(event);
        }
    }

    fn deliver(&self, event: &GridEvent) {
        for (_, listener) in &self.listeners {
            listener(event);
        }
    }
}

impl core::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscribers")
            .field("listeners", &self.listeners.len())
            .field("depth", &self.depth)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
