//! Single owner of the live guard list
//!
//! Readers get cloned snapshots. Writers update one label at a time, either
//! through a closure applied under the lock or through a compare-and-swap on
//! the entry's version, so two mint flows on different guards never write
//! back stale copies of each other's entries.
//!
//! Every recheck request bumps a generation counter. A refresh records the
//! generation before it reads the chain and only lands if no recheck was
//! requested in between; otherwise the flag stays raised for the next one.

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use super::list::dedupe_guards;
use super::GuardError;
use crate::types::EligibilityGuard;

#[derive(Debug, Clone)]
struct Entry {
    guard: EligibilityGuard,
    version: u64,
}

#[derive(Debug, Default)]
struct Recheck {
    pending: bool,
    generation: u64,
}

#[derive(Debug)]
pub struct GuardRegistry {
    entries: Mutex<Vec<Entry>>,
    recheck: Mutex<Recheck>,
    changes: watch::Sender<Vec<EligibilityGuard>>,
}

impl Default for GuardRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl GuardRegistry {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(Vec::new());
        Self {
            entries: Mutex::new(Vec::new()),
            recheck: Mutex::new(Recheck::default()),
            changes,
        }
    }

    /// Install an eligibility snapshot computed from reads that started at
    /// recheck generation `observed`, and clear the recheck flag
    ///
    /// Returns `false`, leaving the list and the raised flag untouched, when a
    /// recheck was requested after `observed`. Labels already present keep
    /// counting versions upward and keep their mint phase while a mint is in
    /// flight.
    pub fn replace_all(&self, guards: Vec<EligibilityGuard>, observed: u64) -> bool {
        let snapshot = {
            let mut entries = self.entries.lock();
            {
                let mut recheck = self.recheck.lock();
                if recheck.generation != observed {
                    debug!(
                        observed,
                        current = recheck.generation,
                        "Guard refresh predates a recheck request, discarded"
                    );
                    return false;
                }
                recheck.pending = false;
            }
            let next: Vec<Entry> = dedupe_guards(&guards)
                .into_iter()
                .map(|mut guard| {
                    let previous = entries.iter().find(|e| e.guard.label == guard.label);
                    // an in-flight mint keeps its phase across refreshes
                    if let Some(prev) = previous.filter(|e| e.guard.minting) {
                        guard.minting = true;
                        guard.loading_text = prev.guard.loading_text.clone();
                    }
                    let version = previous.map_or(0, |e| e.version + 1);
                    Entry { guard, version }
                })
                .collect();
            *entries = next;
            Self::collect(&entries)
        };
        debug!(guards = snapshot.len(), "Guard list replaced");
        self.changes.send_replace(snapshot);
        true
    }

    pub fn snapshot(&self) -> Vec<EligibilityGuard> {
        Self::collect(&self.entries.lock())
    }

    /// Entry and its version
    pub fn get(&self, label: &str) -> Option<(EligibilityGuard, u64)> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.guard.label == label)
            .map(|e| (e.guard.clone(), e.version))
    }

    /// Replace the entry for `label` if it is still at `expected`
    pub fn compare_and_swap(
        &self,
        label: &str,
        expected: u64,
        guard: EligibilityGuard,
    ) -> Result<u64, GuardError> {
        let snapshot = {
            let mut entries = self.entries.lock();
            let entry = entries
                .iter_mut()
                .find(|e| e.guard.label == label)
                .ok_or_else(|| GuardError::UnknownLabel(label.to_string()))?;
            if entry.version != expected {
                return Err(GuardError::Stale {
                    label: label.to_string(),
                    expected,
                    found: entry.version,
                });
            }
            entry.guard = EligibilityGuard {
                label: label.to_string(),
                ..guard
            };
            entry.version += 1;
            (entry.version, Self::collect(&entries))
        };
        self.changes.send_replace(snapshot.1);
        Ok(snapshot.0)
    }

    /// Apply `f` to the entry for `label` under the lock
    pub fn update<F>(&self, label: &str, f: F) -> Result<u64, GuardError>
    where
        F: FnOnce(&mut EligibilityGuard),
    {
        let (version, snapshot) = {
            let mut entries = self.entries.lock();
            let entry = entries
                .iter_mut()
                .find(|e| e.guard.label == label)
                .ok_or_else(|| GuardError::UnknownLabel(label.to_string()))?;
            f(&mut entry.guard);
            entry.guard.label = label.to_string();
            entry.version += 1;
            (entry.version, Self::collect(&entries))
        };
        self.changes.send_replace(snapshot);
        Ok(version)
    }

    /// Ask the front end to recompute eligibility
    pub fn request_recheck(&self) {
        let mut recheck = self.recheck.lock();
        recheck.pending = true;
        recheck.generation += 1;
    }

    /// Generation a refresh records before it starts reading
    pub fn recheck_generation(&self) -> u64 {
        self.recheck.lock().generation
    }

    pub fn needs_recheck(&self) -> bool {
        self.recheck.lock().pending
    }

    /// Read and clear the recheck flag
    pub fn take_recheck(&self) -> bool {
        std::mem::take(&mut self.recheck.lock().pending)
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<EligibilityGuard>> {
        self.changes.subscribe()
    }

    fn collect(entries: &[Entry]) -> Vec<EligibilityGuard> {
        entries.iter().map(|e| e.guard.clone()).collect()
    }
}
