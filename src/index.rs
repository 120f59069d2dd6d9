use std::path::Path;

use chrono::Utc;

use crate::{
    category::Category,
    data_dir::DataDir,
    doc_id,
    error::{Error, Result},
    record::{Attributes, Document, DocumentRecord, Index, IndexStats},
    store::{IndexStore, JsonFileStore},
};

/// Document repository: content files on disk plus the id → record index.
///
/// The whole index lives in memory for the lifetime of the value and is
/// written back through the store after every mutation. There is no locking;
/// only one process may use a data directory at a time.
///
/// # Examples
///
/// ```
/// # let tmp = tempfile::tempdir().unwrap();
/// use docrefine::{Category, DataDir, DocumentIndex, record::Attributes};
///
/// let data_dir = DataDir::at(tmp.path()).unwrap();
/// let mut index = DocumentIndex::open(&data_dir).unwrap();
///
/// let id = index
///     .add("Revenue: $7.2B", Category::Financial, Attributes::new(), None)
///     .unwrap();
/// let doc = index.get(&id).unwrap().unwrap();
/// assert_eq!(doc.content, "Revenue: $7.2B");
/// assert_eq!(index.stats().count(Category::Financial), 1);
/// ```
#[derive(Debug)]
pub struct DocumentIndex<S = JsonFileStore> {
    data_dir: DataDir,
    store: S,
    records: Index,
}

impl DocumentIndex<JsonFileStore> {
    /// Open the JSON index inside `data_dir`.
    pub fn open(data_dir: &DataDir) -> Result<Self> {
        let store = JsonFileStore::new(data_dir.index_file());
        Self::with_store(data_dir.clone(), store)
    }
}

impl<S: IndexStore> DocumentIndex<S> {
    /// Load the index from `store`. Corruption is returned, never papered
    /// over with an empty index.
    pub fn with_store(data_dir: DataDir, store: S) -> Result<Self> {
        let records = store.load()?;
        tracing::debug!(
            root = %data_dir.root().display(),
            documents = records.len(),
            "loaded document index"
        );
        Ok(Self {
            data_dir,
            store,
            records,
        })
    }

    /// Start from an empty index without reading the store.
    ///
    /// This is the explicit reset path for a corrupt index; nothing is
    /// written until the next mutation or [`DocumentIndex::persist`].
    pub fn empty(data_dir: DataDir, store: S) -> Self {
        Self {
            data_dir,
            store,
            records: Index::new(),
        }
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.data_dir
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ingest `content` under `category` and return its id.
    ///
    /// The content file is written first; the index is only touched once
    /// that write succeeded. Without an explicit id one is generated from
    /// the content hash and the current time.
    pub fn add(
        &mut self,
        content: &str,
        category: Category,
        attributes: Attributes,
        id: Option<&str>,
    ) -> Result<String> {
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("document content is empty".into()));
        }

        let now = Utc::now();
        let id = match id {
            Some(id) => {
                doc_id::validate(id)?;
                if self.records.contains_key(id) {
                    return Err(Error::InvalidInput(format!(
                        "document id '{id}' already exists"
                    )));
                }
                id.to_string()
            }
            None => loop {
                let candidate = doc_id::generate(category, content, now);
                let path = self.data_dir.content_path(category, &candidate);
                if !self.records.contains_key(&candidate) && !path.exists() {
                    break candidate;
                }
            },
        };

        // Orphan content files are left for `repair` to adopt.
        let path = self.data_dir.content_path(category, &id);
        if path.exists() {
            return Err(Error::InvalidInput(format!(
                "content file {} already exists; run `docrefine repair`",
                path.display()
            )));
        }
        std::fs::write(&path, content)?;

        let record = DocumentRecord {
            id: id.clone(),
            path: path.to_string_lossy().into_owned(),
            category,
            added: now,
            attributes,
        };
        self.records.insert(id.clone(), record);

        if let Err(e) = self.persist() {
            self.records.remove(&id);
            if let Err(cleanup) = std::fs::remove_file(&path) {
                tracing::warn!(
                    path = %path.display(),
                    "could not remove content after failed write: {cleanup}"
                );
            }
            return Err(e);
        }

        tracing::info!(%id, %category, "added document");
        Ok(id)
    }

    /// Look up a record without reading its content.
    pub fn record(&self, id: &str) -> Option<&DocumentRecord> {
        self.records.get(id)
    }

    /// All records in id order.
    pub fn records(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.records.values()
    }

    /// Fetch a record and its content. Unknown ids yield `None`; a record
    /// whose content cannot be read is an I/O error.
    pub fn get(&self, id: &str) -> Result<Option<Document>> {
        let Some(record) = self.records.get(id) else {
            return Ok(None);
        };
        let content = read_content(record)?;
        Ok(Some(Document {
            record: record.clone(),
            content,
        }))
    }

    /// Merge `attributes` into an existing record, overwriting duplicate keys.
    pub fn amend(
        &mut self,
        id: &str,
        attributes: Attributes,
    ) -> Result<&DocumentRecord> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| Error::document_not_found(id))?;
        record.attributes.extend(attributes);
        self.persist()?;

        tracing::info!(%id, "amended document attributes");
        self.records
            .get(id)
            .ok_or_else(|| Error::document_not_found(id))
    }

    /// Remove a document and its content file. Returns `false` for unknown
    /// ids. A content file that is already gone is not an error.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let Some(record) = self.records.get(id) else {
            tracing::warn!(%id, "document not found in index");
            return Ok(false);
        };

        match std::fs::remove_file(&record.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(%id, "content file was already gone");
            }
            Err(e) => return Err(e.into()),
        }

        self.records.remove(id);
        self.persist()?;

        tracing::info!(%id, "deleted document");
        Ok(true)
    }

    pub fn list_by_category(&self, category: Category) -> Vec<&DocumentRecord> {
        self.records
            .values()
            .filter(|r| r.category == category)
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats::from_records(self.records.values())
    }

    /// Write the current in-memory index through the store.
    pub fn persist(&mut self) -> Result<()> {
        self.store.save(&self.records)
    }

    /// Insert a record whose content already exists on disk. Does not
    /// persist; used by the repair pass, which persists once at the end.
    pub(crate) fn insert_record(&mut self, record: DocumentRecord) {
        self.records.insert(record.id.clone(), record);
    }

    /// Drop a record without touching its content. Does not persist.
    pub(crate) fn remove_record(&mut self, id: &str) -> bool {
        self.records.remove(id).is_some()
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }
}

/// Read the content file a record points at.
pub fn read_content(record: &DocumentRecord) -> Result<String> {
    Ok(std::fs::read_to_string(Path::new(&record.path))?)
}
