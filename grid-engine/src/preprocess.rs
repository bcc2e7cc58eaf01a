//! Preprocessing registry.
//!
//! Optional features contribute to named hooks without the owner of the hooked value knowing
//! about them. Contributions are folded over a seed in a deterministic order: registration tick
//! ascending, then contributor id. Registrations made inside one [`PreProcessorRegistry::batch`]
//! share a tick.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

pub type HookName = &'static str;

/// Derives the column set shown by the grid from the caller's column set.
pub const HYDRATE_COLUMNS: HookName = "hydrateColumns";

/// One contribution: receives the value folded so far and the hook's dependency state.
pub type PreProcessor<T, D> = Arc<dyn Fn(T, &D) -> T + Send + Sync>;

struct Registration<T, D> {
    id: String,
    tick: u64,
    apply: PreProcessor<T, D>,
}

impl<T, D> Clone for Registration<T, D> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            tick: self.tick,
            apply: Arc::clone(&self.apply),
        }
    }
}

#[derive(Clone)]
struct HookCache<T, D> {
    seed_version: u64,
    deps: D,
    result: T,
}

pub struct PreProcessorRegistry<T, D> {
    hooks: BTreeMap<HookName, Vec<Registration<T, D>>>,
    cache: BTreeMap<HookName, HookCache<T, D>>,
    /// Hooks whose contributions changed since their cached result.
    dirty: BTreeSet<HookName>,
    tick: u64,
    batch_depth: usize,
}

impl<T, D> Default for PreProcessorRegistry<T, D> {
    fn default() -> Self {
        Self {
            hooks: BTreeMap::new(),
            cache: BTreeMap::new(),
            dirty: BTreeSet::new(),
            tick: 0,
            batch_depth: 0,
        }
    }
}

impl<T: Clone, D: Clone> Clone for PreProcessorRegistry<T, D> {
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
            cache: self.cache.clone(),
            dirty: self.dirty.clone(),
            tick: self.tick,
            batch_depth: self.batch_depth,
        }
    }
}

impl<T, D> PreProcessorRegistry<T, D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `apply` as contributor `id` of `hook`.
    ///
    /// Re-registering an existing id replaces its function and keeps its position.
    pub fn register(
        &mut self,
        hook: HookName,
        id: impl Into<String>,
        apply: impl Fn(T, &D) -> T + Send + Sync + 'static,
    ) {
        let id = id.into();
        let apply: PreProcessor<T, D> = Arc::new(apply);
        gtrace!(hook, id = id.as_str(), "register preprocessor");

        let registrations = self.hooks.entry(hook).or_default();
        if let Some(existing) = registrations.iter_mut().find(|r| r.id == id) {
            existing.apply = apply;
        } else {
            if self.batch_depth == 0 {
                self.tick += 1;
            }
            registrations.push(Registration {
                id,
                tick: self.tick,
                apply,
            });
            registrations.sort_by(|a, b| a.tick.cmp(&b.tick).then_with(|| a.id.cmp(&b.id)));
        }
        self.dirty.insert(hook);
    }

    /// Removes contributor `id` from `hook`. Returns whether it was registered.
    pub fn unregister(&mut self, hook: HookName, id: &str) -> bool {
        let Some(registrations) = self.hooks.get_mut(hook) else {
            return false;
        };
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        let removed = registrations.len() != before;
        if removed {
            gtrace!(hook, id, "unregister preprocessor");
            self.dirty.insert(hook);
        }
        removed
    }

    /// Registers several contributors under one tick; their order is then decided by id.
    pub fn batch(&mut self, f: impl FnOnce(&mut Self)) {
        if self.batch_depth == 0 {
            self.tick += 1;
        }
        self.batch_depth += 1;
        f(self);
        self.batch_depth -= 1;
    }

    /// Contributor ids of `hook` in application order.
    pub fn contributors(&self, hook: HookName) -> Vec<&str> {
        self.hooks
            .get(hook)
            .map(|r| r.iter().map(|r| r.id.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn is_registered(&self, hook: HookName, id: &str) -> bool {
        self.hooks
            .get(hook)
            .is_some_and(|r| r.iter().any(|r| r.id == id))
    }

    /// Folds every contribution of `hook` over `seed`.
    pub fn run(&self, hook: HookName, seed: T, deps: &D) -> T {
        let Some(registrations) = self.hooks.get(hook) else {
            return seed;
        };
        registrations
            .iter()
            .fold(seed, |acc, registration| (registration.apply)(acc, deps))
    }
}

impl<T: Clone, D: Clone + PartialEq> PreProcessorRegistry<T, D> {
    /// Like [`Self::run`], but reuses the previous result unless a contribution changed, `deps`
    /// differs from the cached dependency state, or `seed_version` changed.
    ///
    /// Returns the result and whether it was recomputed.
    pub fn run_cached(
        &mut self,
        hook: HookName,
        seed_version: u64,
        seed: &T,
        deps: &D,
    ) -> (T, bool) {
        if !self.dirty.contains(hook) {
            let cached = self
                .cache
                .get(hook)
                .filter(|c| c.seed_version == seed_version && c.deps == *deps);
            if let Some(cache) = cached {
                return (cache.result.clone(), false);
            }
        }

        gdebug!(hook, seed_version, "run preprocessors");
        let result = self.run(hook, seed.clone(), deps);
        self.cache.insert(
            hook,
            HookCache {
                seed_version,
                deps: deps.clone(),
                result: result.clone(),
            },
        );
        self.dirty.remove(hook);
        (result, true)
    }
}

impl<T, D> core::fmt::Debug for PreProcessorRegistry<T, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let hooks: BTreeMap<&str, Vec<&str>> = self
            .hooks
            .iter()
            .map(|(hook, r)| (*hook, r.iter().map(|r| r.id.as_str()).collect()))
            .collect();
        f.debug_struct("PreProcessorRegistry")
            .field("hooks", &hooks)
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}
