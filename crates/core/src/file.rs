// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Simulated files and file locations.
//!
//! A [`DataFile`] is a content identity: a named blob with a size, and
//! nothing else. Two files are the same file iff they are the same
//! handle (pointer identity), which is what makes a function image
//! shared across invocations a single cacheable unit.

use serde::Serialize;
use std::sync::Arc;

#[derive(Debug)]
struct DataFileInner {
    id: String,
    size: u64,
}

/// Handle to a simulated file. Cheap to clone; identity is the handle.
#[derive(Debug, Clone)]
pub struct DataFile(Arc<DataFileInner>);

impl DataFile {
    pub fn new(id: impl Into<String>, size: u64) -> Self {
        Self(Arc::new(DataFileInner { id: id.into(), size }))
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn size(&self) -> u64 {
        self.0.size
    }
}

impl PartialEq for DataFile {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for DataFile {}

impl std::hash::Hash for DataFile {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl std::fmt::Display for DataFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.id)
    }
}

impl Serialize for DataFile {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("DataFile", 2)?;
        s.serialize_field("id", &self.0.id)?;
        s.serialize_field("size", &self.0.size)?;
        s.end()
    }
}

/// Where a file lives (or should live) in the simulated world.
#[derive(Debug, Clone, PartialEq)]
pub enum FileLocation {
    /// A mount point on a named storage service.
    Service {
        service: String,
        mount: String,
        file: DataFile,
    },
    /// The per-job scratch space of whichever execution service runs
    /// the action; resolved at dispatch time.
    Scratch { file: DataFile },
}

impl FileLocation {
    pub fn service(
        service: impl Into<String>,
        mount: impl Into<String>,
        file: DataFile,
    ) -> Self {
        FileLocation::Service { service: service.into(), mount: mount.into(), file }
    }

    pub fn scratch(file: DataFile) -> Self {
        FileLocation::Scratch { file }
    }

    pub fn file(&self) -> &DataFile {
        match self {
            FileLocation::Service { file, .. } => file,
            FileLocation::Scratch { file } => file,
        }
    }

    pub fn uses_scratch(&self) -> bool {
        matches!(self, FileLocation::Scratch { .. })
    }
}

impl std::fmt::Display for FileLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileLocation::Service { service, mount, file } => {
                write!(f, "{}:{}/{}", service, mount, file.id())
            }
            FileLocation::Scratch { file } => write!(f, "scratch:/{}", file.id()),
        }
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
