//! File-backed run store.
//!
//! Layout: `<data_dir>/runs/<run_id>/run.json`. Every committed mutation
//! rewrites the run's file atomically (write to a temporary file in the
//! same directory, then rename), so a crash leaves either the old or the
//! new version on disk. An in-memory index serves reads.

use super::{newest_first, RunMutator, RunStore};
use crate::core::{Run, RunId};
use crate::errors::PrdflowError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

const RUNS_DIR: &str = "runs";
const RUN_FILE: &str = "run.json";

/// Run store persisting each run as a JSON file.
#[derive(Debug)]
pub struct FileRunStore {
    root: PathBuf,
    runs: DashMap<RunId, Arc<Mutex<Run>>>,
}

impl FileRunStore {
    /// Opens a store rooted at `data_dir`, loading any runs already on disk.
    ///
    /// Unreadable run files are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the runs directory cannot be created or listed.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, PrdflowError> {
        let root = data_dir.as_ref().join(RUNS_DIR);
        fs::create_dir_all(&root)?;

        let runs = DashMap::new();
        for entry in fs::read_dir(&root)? {
            let path = entry?.path().join(RUN_FILE);
            if !path.is_file() {
                continue;
            }
            match load_run(&path) {
                Ok(run) => {
                    runs.insert(run.id.clone(), Arc::new(Mutex::new(run)));
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable run file"),
            }
        }

        info!(root = %root.display(), runs = runs.len(), "Opened file run store");
        Ok(Self { root, runs })
    }

    /// Returns the directory holding a run's files.
    #[must_use]
    pub fn run_dir(&self, id: &RunId) -> PathBuf {
        self.root.join(id.as_str())
    }

    fn write_run(&self, run: &Run) -> Result<(), PrdflowError> {
        let dir = self.run_dir(&run.id);
        fs::create_dir_all(&dir)?;
        let bytes = serde_json::to_vec_pretty(run)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(RUN_FILE)).map_err(|e| e.error)?;
        Ok(())
    }

    fn slot(&self, id: &RunId) -> Result<Arc<Mutex<Run>>, PrdflowError> {
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

fn load_run(path: &Path) -> Result<Run, PrdflowError> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

impl RunStore for FileRunStore {
    fn put(&self, run: Run) -> Result<(), PrdflowError> {
        let id = run.id.clone();
        let slot = Arc::new(Mutex::new(run));
        // The new run's own lock covers the disk write; the shard lock is
        // held only for the insert.
        let guard = slot.lock();
        match self.runs.entry(id.clone()) {
            Entry::Occupied(_) => return Err(PrdflowError::validation(format!("run '{id}' already exists"))),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&slot));
            }
        }
        if let Err(e) = self.write_run(&guard) {
            self.runs.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    fn get(&self, id: &RunId) -> Result<Run, PrdflowError> {
        Ok(self.slot(id)?.lock().clone())
    }

    fn update(&self, id: &RunId, mutator: &mut RunMutator<'_>) -> Result<Run, PrdflowError> {
        let slot = self.slot(id)?;
        let mut guard = slot.lock();
        let mut draft = guard.clone();
        mutator(&mut draft)?;
        // Disk first: a failed write leaves memory and disk agreeing on the old run.
        self.write_run(&draft)?;
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
