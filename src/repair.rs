use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::{
    category::Category,
    data_dir::DataDir,
    doc_id,
    error::Result,
    index::DocumentIndex,
    record::{Attributes, DocumentRecord},
    store::IndexStore,
    walker::{self, CONTENT_EXTENSIONS},
};

/// A content file that no index record points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanFile {
    pub path: PathBuf,
    pub category: Category,
}

/// Differences between the index and the content folders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairPlan {
    pub orphan_files: Vec<OrphanFile>,
    pub missing_ids: Vec<String>,
}

impl RepairPlan {
    pub fn is_clean(&self) -> bool {
        self.orphan_files.is_empty() && self.missing_ids.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// `(id, path)` of every orphan that was indexed.
    pub indexed: Vec<(String, PathBuf)>,
    pub removed: Vec<String>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Compare `records` with the `.txt` files under each category folder.
pub fn plan<'a>(
    data_dir: &DataDir,
    records: impl IntoIterator<Item = &'a DocumentRecord>,
) -> Result<RepairPlan> {
    let mut referenced = HashSet::new();
    let mut missing_ids = Vec::new();

    for record in records {
        match Path::new(&record.path).canonicalize() {
            Ok(path) if path.is_file() => {
                referenced.insert(path);
            }
            _ => missing_ids.push(record.id.clone()),
        }
    }

    let mut orphan_files = Vec::new();
    for category in Category::ALL {
        let dir = data_dir.category_dir(category);
        if !dir.is_dir() {
            continue;
        }
        for file in walker::discover_files(&dir, CONTENT_EXTENSIONS)? {
            if !referenced.contains(&file.absolute_path) {
                orphan_files.push(OrphanFile {
                    path: file.absolute_path,
                    category,
                });
            }
        }
    }

    tracing::debug!(
        orphans = orphan_files.len(),
        missing = missing_ids.len(),
        "repair plan computed"
    );
    Ok(RepairPlan {
        orphan_files,
        missing_ids,
    })
}

/// Index orphans in place, drop records whose content is gone, then
/// persist the index once.
///
/// An orphan keeps its file stem as id when that is a valid, unused id.
/// Orphans that cannot be read are reported in `failed`.
pub fn apply<S: IndexStore>(
    index: &mut DocumentIndex<S>,
    plan: &RepairPlan,
) -> Result<RepairReport> {
    let mut report = RepairReport::default();

    for id in &plan.missing_ids {
        if index.remove_record(id) {
            tracing::info!(%id, "removed record with missing content");
            report.removed.push(id.clone());
        }
    }

    let now = Utc::now();
    for orphan in &plan.orphan_files {
        let content = match std::fs::read_to_string(&orphan.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(
                    path = %orphan.path.display(),
                    "cannot read orphan file: {e}"
                );
                report.failed.push((orphan.path.clone(), e.to_string()));
                continue;
            }
        };

        let id = orphan_id(index, orphan, &content, now);
        let mut attributes = Attributes::new();
        attributes.insert("source".into(), json!("auto_repair"));
        attributes.insert("repaired_at".into(), json!(now.to_rfc3339()));

        index.insert_record(DocumentRecord {
            id: id.clone(),
            path: orphan.path.to_string_lossy().into_owned(),
            category: orphan.category,
            added: now,
            attributes,
        });
        tracing::info!(%id, category = %orphan.category, "indexed orphan file");
        report.indexed.push((id, orphan.path.clone()));
    }

    index.persist()?;
    Ok(report)
}

fn orphan_id<S: IndexStore>(
    index: &DocumentIndex<S>,
    orphan: &OrphanFile,
    content: &str,
    now: chrono::DateTime<Utc>,
) -> String {
    let stem = orphan
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| doc_id::validate(s).is_ok() && !index.contains(s));
    if let Some(stem) = stem {
        return stem;
    }

    loop {
        let candidate = doc_id::generate(orphan.category, content, now);
        if !index.contains(&candidate) {
            return candidate;
        }
    }
}

/// Print a plan for the terminal.
pub fn format_plan(plan: &RepairPlan) {
    if plan.is_clean() {
        println!("Index and content folders are consistent.");
        return;
    }
    for orphan in &plan.orphan_files {
        println!(
            "orphan  {} ({})",
            orphan.path.display(),
            orphan.category
        );
    }
    for id in &plan.missing_ids {
        println!("missing {id}");
    }
    println!(
        "\n{} orphan file(s), {} missing record(s)",
        plan.orphan_files.len(),
        plan.missing_ids.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JsonFileStore, MemoryStore};

    fn test_index() -> (tempfile::TempDir, DocumentIndex<MemoryStore>) {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = DataDir::at(tmp.path()).unwrap();
        let index =
            DocumentIndex::with_store(data_dir, MemoryStore::new()).unwrap();
        (tmp, index)
    }

    #[test]
    fn consistent_index_has_clean_plan() {
        let (_tmp, mut index) = test_index();
        index
            .add("revenue", Category::Financial, Attributes::new(), None)
            .unwrap();

        let plan = plan(index.data_dir(), index.records()).unwrap();
        assert!(plan.is_clean());
    }

    #[test]
    fn detects_orphans_and_missing_records() {
        let (tmp, mut index) = test_index();
        let gone = index
            .add("short lived", Category::Press, Attributes::new(), None)
            .unwrap();
        std::fs::remove_file(&index.record(&gone).unwrap().path).unwrap();
        let stray = tmp.path().join("product").join("stray.txt");
        std::fs::write(stray, "GreenLake").unwrap();
        std::fs::write(tmp.path().join("product").join("notes.md"), "ignored")
            .unwrap();

        let plan = plan(index.data_dir(), index.records()).unwrap();
        assert_eq!(plan.missing_ids, vec![gone]);
        assert_eq!(plan.orphan_files.len(), 1);
        assert_eq!(plan.orphan_files[0].category, Category::Product);
        assert!(plan.orphan_files[0].path.ends_with("product/stray.txt"));
    }

    #[test]
    fn apply_indexes_orphans_in_place() {
        let (tmp, mut index) = test_index();
        let stray = tmp.path().join("financial").join("q3-notes.txt");
        std::fs::write(&stray, "ARR grew 33%").unwrap();

        let plan = plan(index.data_dir(), index.records()).unwrap();
        let report = apply(&mut index, &plan).unwrap();

        assert_eq!(report.indexed.len(), 1);
        assert_eq!(report.indexed[0].0, "q3-notes");

        let doc = index.get("q3-notes").unwrap().unwrap();
        assert_eq!(doc.content, "ARR grew 33%");
        assert_eq!(doc.record.category, Category::Financial);
        assert_eq!(doc.record.attributes["source"], json!("auto_repair"));
        assert!(doc.record.attributes.contains_key("repaired_at"));
        assert!(stray.exists());
    }

    #[test]
    fn apply_removes_missing_and_persists_once() {
        let (_tmp, mut index) = test_index();
        let id = index
            .add("temporary", Category::Other, Attributes::new(), None)
            .unwrap();
        std::fs::remove_file(&index.record(&id).unwrap().path).unwrap();
        let saves_before = index.store().save_count();

        let plan = plan(index.data_dir(), index.records()).unwrap();
        let report = apply(&mut index, &plan).unwrap();

        assert_eq!(report.removed, vec![id.clone()]);
        assert!(index.record(&id).is_none());
        assert_eq!(index.store().save_count(), saves_before + 1);
        assert!(index.store().saved().is_empty());
    }

    #[test]
    fn orphan_with_taken_stem_gets_new_id() {
        let (tmp, mut index) = test_index();
        index
            .add("original", Category::Press, Attributes::new(), Some("memo"))
            .unwrap();
        std::fs::write(tmp.path().join("other").join("memo.txt"), "copy")
            .unwrap();

        let plan = plan(index.data_dir(), index.records()).unwrap();
        let report = apply(&mut index, &plan).unwrap();

        let (new_id, _) = &report.indexed[0];
        assert_ne!(new_id, "memo");
        assert!(new_id.starts_with("other_"));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn reset_rebuilds_corrupt_index_from_content() {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = DataDir::at(tmp.path()).unwrap();
        let id = {
            let mut index = DocumentIndex::open(&data_dir).unwrap();
            let attrs = Attributes::new();
            index
                .add("Q3 FY24 results", Category::Financial, attrs, None)
                .unwrap()
        };
        std::fs::write(data_dir.index_file(), "{ truncated").unwrap();
        assert!(DocumentIndex::open(&data_dir).is_err());

        let store = JsonFileStore::new(data_dir.index_file());
        let mut index = DocumentIndex::empty(data_dir.clone(), store);
        let plan = plan(index.data_dir(), index.records()).unwrap();
        apply(&mut index, &plan).unwrap();

        let reopened = DocumentIndex::open(&data_dir).unwrap();
        assert_eq!(reopened.len(), 1);
        let doc = reopened.get(&id).unwrap().unwrap();
        assert_eq!(doc.content, "Q3 FY24 results");
    }
}
