//! Producer/dependent bookkeeping for wave release.
//!
//! [`DependencyManager`] is a generic two-level structure over abstract
//! producer and dependent identities. The scheduler instantiates it with
//! NodeGroup producers and Stage dependents, but nothing here knows about
//! either: the manager only tracks which dependents still wait on
//! outstanding producers and hands out the ones that became free.
//!
//! A dependent with N distinct producers becomes free exactly once, after
//! all N producers have reported. Registering the same (producer, dependent)
//! pair twice does not inflate the count, and removing an unknown producer
//! is a no-op.

use rustc_hash::{FxHashMap, FxHashSet};
use std::hash::Hash;

/// Tracks which dependents are still locked behind unfinished producers.
///
/// # Examples
///
/// ```rust
/// use tideflow::deps::DependencyManager;
///
/// let mut deps: DependencyManager<&str, &str> = DependencyManager::new();
/// deps.insert_dependency(Some("build"), "test");
/// deps.insert_dependency(None, "lint");
///
/// // "lint" has no producers and is immediately free.
/// assert_eq!(deps.obtain_free_dependents(), vec!["lint"]);
///
/// deps.remove_dependency(&"build");
/// assert_eq!(deps.obtain_free_dependents(), vec!["test"]);
/// assert!(!deps.has_locked_dependents());
/// ```
#[derive(Debug)]
pub struct DependencyManager<P, D> {
    /// producer -> dependents registered against it.
    dependents_of: FxHashMap<P, FxHashSet<D>>,
    /// dependent -> producers it still waits for. Doubles as the duplicate
    /// (producer, dependent) guard.
    waiting_on: FxHashMap<D, FxHashSet<P>>,
    /// Dependents currently free but not yet obtained.
    free: Vec<D>,
    /// Dependents already handed out once; never released again.
    released: FxHashSet<D>,
}

impl<P, D> Default for DependencyManager<P, D>
where
    P: Eq + Hash + Clone,
    D: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<P, D> DependencyManager<P, D>
where
    P: Eq + Hash + Clone,
    D: Eq + Hash + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            dependents_of: FxHashMap::default(),
            waiting_on: FxHashMap::default(),
            free: Vec::new(),
            released: FxHashSet::default(),
        }
    }

    /// Register that `dependent` waits for `producer`.
    ///
    /// A `None` producer frees the dependent immediately unless other
    /// producers are (or later become) registered against it.
    pub fn insert_dependency(&mut self, producer: Option<P>, dependent: D) {
        match producer {
            Some(producer) => {
                if self.released.contains(&dependent) {
                    return;
                }
                let waiting = self.waiting_on.entry(dependent.clone()).or_default();
                if !waiting.insert(producer.clone()) {
                    // Duplicate pair; the count must not inflate.
                    return;
                }
                self.dependents_of
                    .entry(producer)
                    .or_default()
                    .insert(dependent.clone());
                // A later-arriving producer re-locks a dependent that was
                // provisionally freed by a null producer.
                self.free.retain(|free| *free != dependent);
            }
            None => {
                let locked = self
                    .waiting_on
                    .get(&dependent)
                    .is_some_and(|waiting| !waiting.is_empty());
                if !locked {
                    self.mark_free(dependent);
                }
            }
        }
    }

    /// Record that `producer` finished, unlocking any dependents that were
    /// waiting only on it. Unknown or already-removed producers are ignored.
    pub fn remove_dependency(&mut self, producer: &P) {
        let Some(dependents) = self.dependents_of.remove(producer) else {
            return;
        };
        for dependent in dependents {
            let exhausted = match self.waiting_on.get_mut(&dependent) {
                Some(waiting) => {
                    waiting.remove(producer);
                    waiting.is_empty()
                }
                None => false,
            };
            if exhausted {
                self.waiting_on.remove(&dependent);
                self.mark_free(dependent);
            }
        }
    }

    /// Atomically drain and return the currently free dependents.
    ///
    /// Each dependent is returned at most once across its lifetime in this
    /// manager, even if later calls would re-free it.
    pub fn obtain_free_dependents(&mut self) -> Vec<D> {
        let drained = std::mem::take(&mut self.free);
        for dependent in &drained {
            self.released.insert(dependent.clone());
        }
        drained
    }

    /// Whether any dependent still waits on an unfinished producer.
    #[must_use]
    pub fn has_locked_dependents(&self) -> bool {
        self.waiting_on.values().any(|waiting| !waiting.is_empty())
    }

    /// Whether any dependent is free and not yet obtained.
    #[must_use]
    pub fn has_unlocked_dependents(&self) -> bool {
        !self.free.is_empty()
    }

    fn mark_free(&mut self, dependent: D) {
        if self.released.contains(&dependent) || self.free.contains(&dependent) {
            return;
        }
        self.free.push(dependent);
    }
}
