// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File registry collaborator: a location catalog keyed by file.

use gantry_core::{DataFile, FailureCause, FileLocation};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// In-memory file-location catalog. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct FileRegistry {
    entries: Arc<Mutex<HashMap<DataFile, BTreeSet<String>>>>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&self, location: &FileLocation) {
        self.entries
            .lock()
            .entry(location.file().clone())
            .or_default()
            .insert(location.to_string());
    }

    pub fn remove_entry(&self, location: &FileLocation) -> Result<(), FailureCause> {
        let mut entries = self.entries.lock();
        let file = location.file();
        let known = match entries.get_mut(file) {
            Some(set) => set.remove(&location.to_string()),
            None => false,
        };
        if !known {
            return Err(FailureCause::FileNotFound {
                file: file.id().to_string(),
                location: location.to_string(),
            });
        }
        if entries.get(file).is_some_and(|set| set.is_empty()) {
            entries.remove(file);
        }
        Ok(())
    }

    /// Known locations of a file, lexicographically ordered.
    pub fn lookup(&self, file: &DataFile) -> Vec<String> {
        self.entries
            .lock()
            .get(file)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
