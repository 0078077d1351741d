use std::sync::Arc;

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Debug)]
struct ProgramSlot<P> {
    // `None` once the count has dropped to zero.
    program: Option<P>,
    ref_count: usize,
}

#[derive(Debug)]
struct ProgramEntry<P> {
    slot: Mutex<ProgramSlot<P>>,
}

enum Released<P> {
    /// The count had already reached zero.
    AlreadyGone,
    Remaining(usize),
    Last(Option<P>),
}

impl<P> ProgramEntry<P> {
    fn new(program: P) -> Self {
        Self {
            slot: Mutex::new(ProgramSlot {
                program: Some(program),
                ref_count: 1,
            }),
        }
    }

    fn release(&self) -> Released<P> {
        let mut slot = self.slot.lock();
        if slot.ref_count == 0 {
            return Released::AlreadyGone;
        }
        slot.ref_count -= 1;
        if slot.ref_count > 0 {
            return Released::Remaining(slot.ref_count);
        }
        Released::Last(slot.program.take())
    }
}

impl<P: Clone> ProgramEntry<P> {
    /// `None` when the entry was released while waiting on its lock.
    fn acquire(&self) -> Option<P> {
        let mut slot = self.slot.lock();
        if slot.ref_count == 0 {
            return None;
        }
        let program = slot.program.clone()?;
        slot.ref_count += 1;
        Some(program)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A program with that name exists and was left untouched.
    KeptExisting,
    /// The existing program was replaced, its reference count kept.
    Overwritten,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The count was decremented and is still positive.
    Retained { ref_count: usize },
    /// The count reached zero; the entry is gone and its handle released.
    Released,
    NotFound,
}

/// Named, reference-counted compiled programs.
///
/// The store-wide lock guards inserting and erasing entries. Each entry has
/// its own lock for its reference count, so lookups of different names only
/// share the store lock for reading.
#[derive(Debug)]
pub struct ProgramStore<P> {
    entries: RwLock<HashMap<String, Arc<ProgramEntry<P>>>>,
}

impl<P> Default for ProgramStore<P> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<P: Clone> ProgramStore<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, program: P, name: &str, force_override: bool) -> InsertOutcome {
        let mut entries = self.entries.write();
        match entries.entry(name.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(ProgramEntry::new(program)));
                debug!("Inserted program '{}'", name);
                InsertOutcome::Inserted
            }
            Entry::Occupied(mut occupied) => {
                let mut slot = occupied.get().slot.lock();

                // A removal dropped the count to zero but has not erased the
                // entry yet: the name is free.
                if slot.ref_count == 0 {
                    drop(slot);
                    occupied.insert(Arc::new(ProgramEntry::new(program)));
                    debug!("Inserted program '{}'", name);
                    return InsertOutcome::Inserted;
                }

                if force_override {
                    slot.program = Some(program);
                    warn!(
                        "The program '{}' already exists. The old program was overwritten!",
                        name
                    );
                    InsertOutcome::Overwritten
                } else {
                    warn!("The program '{}' already exists.", name);
                    InsertOutcome::KeptExisting
                }
            }
        }
    }

    /// Returns the program and takes one more reference on it.
    pub fn get(&self, name: &str) -> Result<P> {
        let not_found = || Error::ProgramNotFound {
            name: name.to_string(),
        };

        let entry = self.entries.read().get(name).cloned().ok_or_else(not_found)?;
        entry.acquire().ok_or_else(not_found)
    }

    /// Drops one reference. The last one erases the entry and releases the
    /// program handle.
    pub fn remove(&self, name: &str) -> RemoveOutcome {
        let Some(entry) = self.entries.read().get(name).cloned() else {
            warn!("Program name [{}] passed for deletion not found.", name);
            return RemoveOutcome::NotFound;
        };

        let released = match entry.release() {
            Released::AlreadyGone => {
                warn!("Program name [{}] passed for deletion not found.", name);
                return RemoveOutcome::NotFound;
            }
            Released::Remaining(ref_count) => {
                debug!("Program '{}' has {} reference(s) left", name, ref_count);
                return RemoveOutcome::Retained { ref_count };
            }
            Released::Last(program) => program,
        };

        {
            let mut entries = self.entries.write();
            if entries
                .get(name)
                .is_some_and(|current| Arc::ptr_eq(current, &entry))
            {
                entries.remove(name);
            }
        }

        drop(released);
        debug!("Released program '{}'", name);
        RemoveOutcome::Released
    }

    /// Erases every entry for which `keep` returns false and returns how many
    /// were erased. `keep` runs without any store lock held.
    pub fn retain(&self, mut keep: impl FnMut(&str, &P) -> bool) -> usize {
        let snapshot: Vec<(String, Arc<ProgramEntry<P>>)> = self
            .entries
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(entry)))
            .collect();

        let doomed: Vec<(String, Arc<ProgramEntry<P>>)> = snapshot
            .into_iter()
            .filter(|(name, entry)| {
                let program = entry.slot.lock().program.clone();
                program.is_some_and(|program| !keep(name, &program))
            })
            .collect();

        if doomed.is_empty() {
            return 0;
        }

        let mut entries = self.entries.write();
        doomed
            .iter()
            .filter(|(name, entry)| {
                let same = entries
                    .get(name.as_str())
                    .is_some_and(|current| Arc::ptr_eq(current, entry));
                if same {
                    entries.remove(name.as_str());
                }
                same
            })
            .count()
    }

    pub fn ref_count(&self, name: &str) -> Option<usize> {
        let entry = self.entries.read().get(name).cloned()?;
        let ref_count = entry.slot.lock().ref_count;
        (ref_count > 0).then_some(ref_count)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ref_count(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<P> Drop for ProgramStore<P> {
    fn drop(&mut self) {
        let remaining = self.entries.get_mut().len();
        if remaining > 0 {
            debug!("Releasing {} remaining program(s)", remaining);
        }
    }
}
