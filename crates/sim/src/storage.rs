// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Simulated storage: capacity accounting, transfer timing, optional
//! LRU eviction with open-handle pinning.
//!
//! A storage service holds [`DataFile`]s on one mount point. Reads,
//! writes, and copies cost `bytes / bandwidth` simulated seconds.
//! With LRU caching enabled, allocations evict the least recently used
//! unpinned files; an open [`FileHandle`] pins its file, which is how
//! a running invocation keeps its image in RAM.

use crate::clock::SimClock;
use gantry_core::{CachingBehavior, DataFile, FailureCause};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct FileEntry {
    pins: u32,
}

#[derive(Debug)]
struct State {
    free: u64,
    /// Insertion order is recency: front = least recently used.
    files: IndexMap<DataFile, FileEntry>,
}

#[derive(Debug)]
struct Shared {
    name: String,
    mount: String,
    capacity: u64,
    bandwidth: f64,
    caching: CachingBehavior,
    clock: SimClock,
    state: Mutex<State>,
}

/// Handle to a simulated storage service. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SimStorage {
    shared: Arc<Shared>,
}

impl SimStorage {
    pub fn new(
        name: impl Into<String>,
        mount: impl Into<String>,
        capacity: u64,
        bandwidth: f64,
        caching: CachingBehavior,
        clock: SimClock,
    ) -> Result<Self, FailureCause> {
        let name = name.into();
        if name.is_empty() {
            return Err(FailureCause::invalid_argument("storage name cannot be empty"));
        }
        if bandwidth <= 0.0 {
            return Err(FailureCause::invalid_argument(format!(
                "storage bandwidth must be positive, got {bandwidth}"
            )));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                name,
                mount: mount.into(),
                capacity,
                bandwidth,
                caching,
                clock,
                state: Mutex::new(State { free: capacity, files: IndexMap::new() }),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn mount(&self) -> &str {
        &self.shared.mount
    }

    pub fn capacity(&self) -> u64 {
        self.shared.capacity
    }

    pub fn free_space(&self) -> u64 {
        self.shared.state.lock().free
    }

    pub fn has_file(&self, file: &DataFile) -> bool {
        self.shared.state.lock().files.contains_key(file)
    }

    pub fn num_files(&self) -> usize {
        self.shared.state.lock().files.len()
    }

    /// Files currently held, least recently used first.
    pub fn files(&self) -> Vec<DataFile> {
        self.shared.state.lock().files.keys().cloned().collect()
    }

    fn not_found(&self, file: &DataFile) -> FailureCause {
        FailureCause::FileNotFound {
            file: file.id().to_string(),
            location: format!("{}:{}", self.shared.name, self.shared.mount),
        }
    }

    /// Make room for `size` bytes, evicting LRU unpinned files if the
    /// policy allows. Must be called under the state lock.
    fn allocate(&self, state: &mut State, size: u64) -> Result<(), FailureCause> {
        if state.free >= size {
            state.free -= size;
            return Ok(());
        }
        if self.shared.caching == CachingBehavior::Lru {
            let mut reclaimable = state.free;
            let mut victims = Vec::new();
            for (file, entry) in state.files.iter() {
                if reclaimable >= size {
                    break;
                }
                if entry.pins == 0 {
                    reclaimable += file.size();
                    victims.push(file.clone());
                }
            }
            if reclaimable >= size {
                for victim in victims {
                    tracing::debug!(
                        storage = %self.shared.name,
                        file = %victim,
                        "evicting"
                    );
                    state.files.shift_remove(&victim);
                    state.free += victim.size();
                }
                state.free -= size;
                return Ok(());
            }
        }
        Err(FailureCause::NotEnoughResources {
            job: None,
            service: self.shared.name.clone(),
        })
    }

    /// Mark a file most-recently-used. Must be called under the lock.
    fn touch(state: &mut State, file: &DataFile) {
        if let Some(entry) = state.files.shift_remove(file) {
            state.files.insert(file.clone(), entry);
        }
    }

    /// Instantaneously create (reserve space for) a file. Creating an
    /// existing file is a no-op.
    pub fn create_file(&self, file: &DataFile) -> Result<(), FailureCause> {
        let mut state = self.shared.state.lock();
        if state.files.contains_key(file) {
            return Ok(());
        }
        self.allocate(&mut state, file.size())?;
        state.files.insert(file.clone(), FileEntry { pins: 0 });
        Ok(())
    }

    /// Write a file: reserve space (unless present) and pay the
    /// transfer time.
    pub async fn write_file(&self, file: &DataFile) -> Result<(), FailureCause> {
        self.create_file(file)?;
        {
            let mut state = self.shared.state.lock();
            Self::touch(&mut state, file);
        }
        self.shared
            .clock
            .sleep(file.size() as f64 / self.shared.bandwidth)
            .await;
        Ok(())
    }

    /// Read `num_bytes` of a file (the whole file by default).
    pub async fn read_file(
        &self,
        file: &DataFile,
        num_bytes: Option<u64>,
    ) -> Result<(), FailureCause> {
        {
            let mut state = self.shared.state.lock();
            if !state.files.contains_key(file) {
                return Err(self.not_found(file));
            }
            Self::touch(&mut state, file);
        }
        let bytes = num_bytes.unwrap_or_else(|| file.size());
        self.shared.clock.sleep(bytes as f64 / self.shared.bandwidth).await;
        Ok(())
    }

    /// Remove a file, freeing its space. Pinned files cannot be
    /// removed.
    pub fn remove_file(&self, file: &DataFile) -> Result<(), FailureCause> {
        let mut state = self.shared.state.lock();
        match state.files.get(file) {
            None => Err(self.not_found(file)),
            Some(entry) if entry.pins > 0 => Err(FailureCause::NotAllowed {
                service: self.shared.name.clone(),
                reason: format!("file {} is pinned by open handles", file.id()),
            }),
            Some(_) => {
                state.files.shift_remove(file);
                state.free += file.size();
                Ok(())
            }
        }
    }

    /// Open a file, pinning it against eviction until the handle is
    /// closed or dropped.
    pub fn open_file(&self, file: &DataFile) -> Result<FileHandle, FailureCause> {
        let mut state = self.shared.state.lock();
        match state.files.get_mut(file) {
            None => Err(self.not_found(file)),
            Some(entry) => {
                entry.pins += 1;
                Self::touch(&mut state, file);
                Ok(FileHandle { storage: self.clone(), file: file.clone() })
            }
        }
    }

    /// Copy a file to another storage service: space is reserved at
    /// the destination up front, then the transfer time is paid at the
    /// slower end's bandwidth.
    pub async fn copy_file_to(
        &self,
        file: &DataFile,
        dst: &SimStorage,
    ) -> Result<(), FailureCause> {
        {
            let mut state = self.shared.state.lock();
            if !state.files.contains_key(file) {
                return Err(self.not_found(file));
            }
            Self::touch(&mut state, file);
        }
        dst.create_file(file)?;
        let bandwidth = self.shared.bandwidth.min(dst.shared.bandwidth);
        self.shared.clock.sleep(file.size() as f64 / bandwidth).await;
        Ok(())
    }

    fn unpin(&self, file: &DataFile) {
        let mut state = self.shared.state.lock();
        if let Some(entry) = state.files.get_mut(file) {
            entry.pins = entry.pins.saturating_sub(1);
        }
    }
}

/// Name-to-service lookup for storage services, so file locations can
/// be resolved at dispatch time.
#[derive(Debug, Clone, Default)]
pub struct StorageDirectory {
    inner: Arc<Mutex<std::collections::HashMap<String, SimStorage>>>,
}

impl StorageDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, storage: &SimStorage) {
        self.inner
            .lock()
            .insert(storage.name().to_string(), storage.clone());
    }

    pub fn get(&self, name: &str) -> Option<SimStorage> {
        self.inner.lock().get(name).cloned()
    }

    pub fn deregister(&self, name: &str) {
        self.inner.lock().remove(name);
    }
}

/// An open file. The file cannot be evicted or removed while at least
/// one handle is open.
#[derive(Debug)]
pub struct FileHandle {
    storage: SimStorage,
    file: DataFile,
}

impl FileHandle {
    pub fn file(&self) -> &DataFile {
        &self.file
    }

    /// Close the handle, releasing the pin.
    pub fn close(self) {
        // Drop does the unpin.
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        self.storage.unpin(&self.file);
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
