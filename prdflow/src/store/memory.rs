//! In-memory run store.

use super::{newest_first, RunMutator, RunStore};
use crate::core::{Run, RunId};
use crate::errors::PrdflowError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Run store backed by a concurrent map with one lock per run.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: DashMap<RunId, Arc<Mutex<Run>>>,
}

impl InMemoryRunStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &RunId) -> Result<Arc<Mutex<Run>>, PrdflowError> {
        // Clone the Arc so the map shard is released before the run lock is taken.
        self.runs
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PrdflowError::NotFound(id.to_string()))
    }

    fn snapshot(&self) -> Vec<Run> {
        let slots: Vec<Arc<Mutex<Run>>> = self.runs.iter().map(|e| Arc::clone(e.value())).collect();
        slots.iter().map(|slot| slot.lock().clone()).collect()
    }
}

impl RunStore for InMemoryRunStore {
    fn put(&self, run: Run) -> Result<(), PrdflowError> {
        match self.runs.entry(run.id.clone()) {
            Entry::Occupied(_) => Err(PrdflowError::validation(format!("run '{}' already exists", run.id))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(run)));
                Ok(())
            }
        }
    }

    fn get(&self, id: &RunId) -> Result<Run, PrdflowError> {
        Ok(self.slot(id)?.lock().clone())
    }

    fn update(&self, id: &RunId, mutator: &mut RunMutator<'_>) -> Result<Run, PrdflowError> {
        let slot = self.slot(id)?;
        let mut guard = slot.lock();
        let mut draft = guard.clone();
        mutator(&mut draft)?;
        *guard = draft.clone();
        Ok(draft)
    }

    fn list(&self, limit: usize, offset: usize) -> Vec<Run> {
        let mut runs = self.snapshot();
        newest_first(&mut runs);
        runs.into_iter().skip(offset).take(limit).collect()
    }

    fn incomplete(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = self.snapshot().into_iter().filter(|r| !r.is_terminal()).collect();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        runs
    }

    fn len(&self) -> usize {
        self.runs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunStatus;
    use crate::store::contract_tests;

    #[test]
    fn test_put_get_roundtrip() {
        contract_tests::put_get_roundtrip(&InMemoryRunStore::new());
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        contract_tests::get_unknown_is_not_found(&InMemoryRunStore::new());
    }

    #[test]
    fn test_failed_mutation_is_not_committed() {
        contract_tests::failed_mutation_is_not_committed(&InMemoryRunStore::new());
    }

    #[test]
    fn test_list_is_newest_first() {
        contract_tests::list_is_newest_first(&InMemoryRunStore::new());
    }

    #[test]
    fn test_incomplete_excludes_terminal() {
        contract_tests::incomplete_excludes_terminal(&InMemoryRunStore::new());
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let store = Arc::new(InMemoryRunStore::new());
        let run = Run::new("idea");
        let id = run.id.clone();
        store.put(run).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    store
                        .update(&id, &mut |run| run.transition(RunStatus::Running))
                        .is_ok()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        // Only one pending -> running transition can win.
        assert_eq!(successes, 1);
        assert_eq!(store.get(&id).unwrap().status, RunStatus::Running);
    }
}
