use std::path::PathBuf;

use crate::{
    error::{Error, Result},
    record::Index,
};

/// Durable backing for the document index.
///
/// The index is always loaded and saved as a whole. Implementations decide
/// how (and how atomically) that snapshot reaches storage.
pub trait IndexStore {
    /// Load the full index. A missing store yields an empty index; an
    /// unreadable or malformed one is [`Error::IndexCorruption`].
    fn load(&self) -> Result<Index>;

    /// Replace the persisted index with `index`.
    fn save(&mut self, index: &Index) -> Result<()>;
}

/// The index as one pretty-printed JSON object, rewritten on every save.
///
/// Saves truncate and rewrite the file in place, so a crash mid-write can
/// leave it corrupt. `docrefine repair` reconciles it with the content files.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn corruption(&self, reason: impl ToString) -> Error {
        Error::IndexCorruption {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl IndexStore for JsonFileStore {
    fn load(&self) -> Result<Index> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Index::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut index: Index =
            serde_json::from_slice(&raw).map_err(|e| self.corruption(e))?;
        for (id, record) in index.iter_mut() {
            if record.path.is_empty() {
                return Err(
                    self.corruption(format!("record '{id}' has an empty path"))
                );
            }
            record.id.clone_from(id);
        }
        Ok(index)
    }

    fn save(&mut self, index: &Index) -> Result<()> {
        let json = serde_json::to_vec_pretty(index)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Keeps the "persisted" index in memory. Useful for tests and for callers
/// that want an index without touching disk for metadata.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    saved: Index,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> &Index {
        &self.saved
    }

    /// Number of times the index has been written.
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl IndexStore for MemoryStore {
    fn load(&self) -> Result<Index> {
        Ok(self.saved.clone())
    }

    fn save(&mut self, index: &Index) -> Result<()> {
        self.saved = index.clone();
        self.saves += 1;
        Ok(())
    }
}
