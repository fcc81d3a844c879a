//! Auxiliary JSON documents (workflow state, quality dashboard).
//!
//! These documents are caches and logs, not sources of truth: a missing,
//! unreadable, or corrupt document reads as an empty object. Every reader
//! goes through [`read_object`] so the fallback is applied the same way
//! everywhere.
//!
//! Writes replace the whole document. There is no cross-process locking;
//! concurrent writers are last-writer-wins.

use crate::error::Result;
use crate::io;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

/// Whole-document read/write capability.
pub trait DocumentStore {
    /// Raw contents, or `None` when the document does not exist yet.
    fn read(&self) -> Result<Option<String>>;
    fn write(&self, contents: &str) -> Result<()>;
    /// Short label for log lines.
    fn describe(&self) -> String;
}

impl<T: DocumentStore + ?Sized> DocumentStore for &T {
    fn read(&self) -> Result<Option<String>> {
        (**self).read()
    }

    fn write(&self, contents: &str) -> Result<()> {
        (**self).write(contents)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// A document backed by a file, written atomically.
#[derive(Debug, Clone)]
pub struct FileDocument {
    path: PathBuf,
}

impl FileDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentStore for FileDocument {
    fn read(&self) -> Result<Option<String>> {
        io::read_optional(&self.path)
    }

    fn write(&self, contents: &str) -> Result<()> {
        io::atomic_write(&self.path, contents.as_bytes())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory document. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    contents: Arc<Mutex<Option<String>>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Arc::new(Mutex::new(Some(contents.into()))),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.contents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl DocumentStore for MemoryDocument {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.contents())
    }

    fn write(&self, contents: &str) -> Result<()> {
        *self.contents.lock().unwrap_or_else(|e| e.into_inner()) = Some(contents.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "<memory>".to_string()
    }
}

// ---------------------------------------------------------------------------
// Parse-or-default
// ---------------------------------------------------------------------------

/// Parse `contents` as JSON, falling back to `T::default()` when it is absent,
/// blank, or does not parse.
pub fn parse_or_default<T: DeserializeOwned + Default>(contents: Option<&str>) -> T {
    let Some(raw) = contents else {
        return T::default();
    };
    if raw.trim().is_empty() {
        return T::default();
    }
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("discarding unparseable document content: {e}");
            T::default()
        }
    }
}

/// Read a document as a JSON object. Missing, unreadable, corrupt, or
/// non-object documents all read as an empty object.
pub fn read_object(store: &impl DocumentStore) -> Map<String, Value> {
    match store.read() {
        Ok(contents) => parse_or_default(contents.as_deref()),
        Err(e) => {
            tracing::warn!("could not read {}: {e}; treating as empty", store.describe());
            Map::new()
        }
    }
}

pub fn write_object(store: &impl DocumentStore, doc: &Map<String, Value>) -> Result<()> {
    let data = serde_json::to_string_pretty(doc)?;
    store.write(&data)
}

/// Borrow `doc[key]` as an array, replacing any non-array value with `[]`.
pub fn ensure_array<'a>(doc: &'a mut Map<String, Value>, key: &str) -> &'a mut Vec<Value> {
    let slot = doc
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        tracing::warn!("'{key}' is not an array; resetting it");
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => items,
        _ => unreachable!("slot was just set to an array"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
