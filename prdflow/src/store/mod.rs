//! Run persistence.
//!
//! A [`RunStore`] owns every run. Mutations go through
//! [`RunStore::update`], which applies a mutator to a copy of the run
//! under that run's lock and commits the copy only if the mutator
//! succeeds. Locks are held for the duration of the mutation only, never
//! across a model call, so reads never wait on an in-flight stage.

mod file;
mod memory;

pub use file::FileRunStore;
pub use memory::InMemoryRunStore;

use crate::core::{Run, RunId};
use crate::errors::PrdflowError;

/// Default page size for [`RunStore::list`].
pub const DEFAULT_LIST_LIMIT: usize = 20;

/// Mutator applied by [`RunStore::update`].
pub type RunMutator<'a> = dyn FnMut(&mut Run) -> Result<(), PrdflowError> + 'a;

/// Keyed persistence of runs.
pub trait RunStore: Send + Sync {
    /// Inserts a new run.
    ///
    /// # Errors
    ///
    /// Fails if a run with the same identifier exists or persisting fails.
    fn put(&self, run: Run) -> Result<(), PrdflowError>;

    /// Returns a snapshot of a run.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown identifier.
    fn get(&self, id: &RunId) -> Result<Run, PrdflowError>;

    /// Atomically applies `mutator` under the run's lock and returns the
    /// committed run. Nothing is committed if the mutator fails.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, the mutator's error, or a persistence error.
    fn update(&self, id: &RunId, mutator: &mut RunMutator<'_>) -> Result<Run, PrdflowError>;

    /// Returns a page of runs, newest first.
    fn list(&self, limit: usize, offset: usize) -> Vec<Run>;

    /// Returns all runs that have not reached a terminal status.
    fn incomplete(&self) -> Vec<Run>;

    /// Returns the number of stored runs.
    fn len(&self) -> usize;

    /// Returns true if the store holds no runs.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sorts runs newest first, breaking ties by identifier.
pub(crate) fn newest_first(runs: &mut [Run]) {
    runs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}
