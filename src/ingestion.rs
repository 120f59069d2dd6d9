use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use serde_json::json;

use crate::{
    category::Category,
    error::{Error, Result},
    index::DocumentIndex,
    record::Attributes,
    store::IndexStore,
    walker::{self, DiscoveredFile},
};

/// Files larger than this are skipped by directory imports.
pub const MAX_IMPORT_BYTES: u64 = 10 * 1024 * 1024;

/// How much of a document the attribute heuristics look at.
const ATTRIBUTE_SNIFF_BYTES: usize = 8192;

static QUARTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bQ([1-4])\s+FY?(\d{4}|\d{2})\b").expect("valid regex")
});

static ARR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(arr|annual recurring revenue)\b").expect("valid regex")
});

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b((?:January|February|March|April|May|June|July|August|",
        r"September|October|November|December) \d{1,2},? \d{4})\b",
    ))
    .expect("valid regex")
});

/// Options for importing a single file.
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Category to file the document under; inferred when `None`.
    pub category: Option<Category>,
    /// Attributes that override anything the importer derives.
    pub attributes: Attributes,
    /// Explicit document id.
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportedFile {
    pub file: PathBuf,
    pub id: String,
    pub category: Category,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedImport {
    pub file: PathBuf,
    pub reason: String,
}

/// Outcome of a directory import.
#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub imported: Vec<ImportedFile>,
    pub failed: Vec<FailedImport>,
}

/// Read the text of a supported file. PDFs go through `pdf-extract`;
/// everything else is read as (lossy) UTF-8.
pub fn extract_text(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(Error::NotFound {
            kind: "file",
            name: path.display().to_string(),
        });
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => pdf_extract::extract_text(path)
            .map_err(|e| Error::Pdf(format!("{}: {e}", path.display()))),
        "txt" | "md" | "csv" | "json" => {
            let bytes = std::fs::read(path)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Err(Error::InvalidInput(format!(
            "unsupported file type: {}",
            path.display()
        ))),
    }
}

/// Pick a category for a file: first from its path, then from its content.
pub fn infer_category(path: &Path, content: &str) -> Category {
    match Category::infer(&path.to_string_lossy()) {
        Category::Other => Category::infer_from_content(content),
        category => category,
    }
}

/// Attributes guessed from the head of a document.
pub fn content_attributes(content: &str, category: Category) -> Attributes {
    let mut end = content.len().min(ATTRIBUTE_SNIFF_BYTES);
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    let head = &content[..end];
    let lower = head.to_lowercase();
    let mut attrs = Attributes::new();

    match category {
        Category::Financial => {
            if let Some(caps) = QUARTER_RE.captures(head) {
                attrs.insert("quarter".into(), json!(format!("Q{}", &caps[1])));
                let year = &caps[2];
                let year = if year.len() == 2 {
                    format!("20{year}")
                } else {
                    year.to_string()
                };
                attrs.insert("fiscal_year".into(), json!(year));
            }
            if ARR_RE.is_match(head) {
                attrs.insert("includes_arr".into(), json!(true));
            }
        }
        Category::Product => {
            // A later match wins, as Aruba sheets usually mention GreenLake.
            let products = [("greenlake", "GreenLake"), ("aruba", "Aruba")];
            for (needle, name) in products {
                if lower.contains(needle) {
                    attrs.insert("product".into(), json!(name));
                }
            }
        }
        Category::Press => {
            if let Some(caps) = DATE_RE.captures(head) {
                attrs.insert("publication_date".into(), json!(&caps[1]));
            }
        }
        Category::Other => {}
    }

    attrs
}

/// Import one file into the index.
///
/// Adds `source_file` and `file_size` attributes plus content heuristics;
/// caller attributes win over both.
pub fn import_file<S: IndexStore>(
    index: &mut DocumentIndex<S>,
    path: &Path,
    options: ImportOptions,
) -> Result<String> {
    let content = extract_text(path)?;
    let size = std::fs::metadata(path)?.len();
    import_content(index, path, &content, size, options)
}

/// Category and attributes a file would be indexed with.
fn planned_attributes(
    path: &Path,
    content: &str,
    size: u64,
    category: Option<Category>,
) -> (Category, Attributes) {
    let category =
        category.unwrap_or_else(|| infer_category(path, content));

    let mut attributes = content_attributes(content, category);
    if let Some(name) = path.file_name() {
        attributes
            .insert("source_file".into(), json!(name.to_string_lossy()));
    }
    attributes.insert("file_size".into(), json!(size));
    (category, attributes)
}

fn import_content<S: IndexStore>(
    index: &mut DocumentIndex<S>,
    path: &Path,
    content: &str,
    size: u64,
    options: ImportOptions,
) -> Result<String> {
    let (category, mut attributes) =
        planned_attributes(path, content, size, options.category);
    attributes.extend(options.attributes);

    let id = index.add(content, category, attributes, options.id.as_deref())?;
    tracing::info!(file = %path.display(), %id, "imported file");
    Ok(id)
}

/// Walk `dir` for importable files, applying the glob filter and the size
/// cap. Oversized files are returned as failures.
fn collect_candidates(
    dir: &Path,
    glob: Option<&str>,
) -> Result<(Vec<DiscoveredFile>, Vec<FailedImport>)> {
    if !dir.is_dir() {
        return Err(Error::NotFound {
            kind: "directory",
            name: dir.display().to_string(),
        });
    }

    let matcher = glob
        .map(|pattern| {
            globset::Glob::new(pattern)
                .map(|g| g.compile_matcher())
                .map_err(|e| {
                    Error::InvalidInput(format!(
                        "invalid glob pattern '{pattern}': {e}"
                    ))
                })
        })
        .transpose()?;

    let mut candidates = Vec::new();
    let mut failed = Vec::new();
    for file in walker::discover_files(dir, walker::IMPORTABLE_EXTENSIONS)? {
        if matcher
            .as_ref()
            .is_some_and(|m| !m.is_match(&file.relative_path))
        {
            continue;
        }
        if file.size > MAX_IMPORT_BYTES {
            tracing::warn!(
                file = %file.absolute_path.display(),
                size = file.size,
                "skipping large file"
            );
            failed.push(FailedImport {
                reason: format!("file too large ({} bytes)", file.size),
                file: file.absolute_path,
            });
            continue;
        }
        candidates.push(file);
    }
    Ok((candidates, failed))
}

/// Extract every candidate in parallel, keeping walk order.
fn extract_all(
    candidates: &[DiscoveredFile],
) -> Vec<(&DiscoveredFile, std::result::Result<String, String>)> {
    candidates
        .par_iter()
        .map(|file| {
            let text = extract_text(&file.absolute_path)
                .map_err(|e| e.to_string());
            (file, text)
        })
        .collect()
}

/// Import every supported file under `dir`.
///
/// Files are read in parallel and then added one at a time. A failing file
/// is recorded in the report and does not stop the batch.
pub fn import_dir<S: IndexStore>(
    index: &mut DocumentIndex<S>,
    dir: &Path,
    category: Option<Category>,
    glob: Option<&str>,
) -> Result<ImportReport> {
    let (candidates, failed) = collect_candidates(dir, glob)?;
    let mut report = ImportReport {
        failed,
        ..ImportReport::default()
    };

    // Extract in parallel, then index sequentially: the index is not shared.
    let extracted = extract_all(&candidates);

    for (file, text) in extracted {
        let path = &file.absolute_path;
        let outcome = text.and_then(|content| {
            let options = ImportOptions {
                category,
                ..ImportOptions::default()
            };
            import_content(index, path, &content, file.size, options)
                .map_err(|e| e.to_string())
        });

        match outcome {
            Ok(id) => {
                let category = index
                    .record(&id)
                    .map_or(Category::Other, |r| r.category);
                report.imported.push(ImportedFile {
                    file: path.clone(),
                    id,
                    category,
                });
            }
            Err(reason) => {
                tracing::warn!(
                    file = %path.display(),
                    "import failed: {reason}"
                );
                report.failed.push(FailedImport {
                    file: path.clone(),
                    reason,
                });
            }
        }
    }

    tracing::info!(
        imported = report.imported.len(),
        failed = report.failed.len(),
        "directory import finished"
    );
    Ok(report)
}

/// A file a directory import would add, with what it would be filed as.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedImport {
    pub file: PathBuf,
    pub category: Category,
    pub attributes: Attributes,
}

/// What `import_dir` would do, without touching the index.
#[derive(Debug, Default, Serialize)]
pub struct ImportPreview {
    pub planned: Vec<PlannedImport>,
    pub failed: Vec<FailedImport>,
}

/// Dry run of [`import_dir`]: discover and extract the same files and
/// report the category and attributes each would get.
pub fn preview_dir(
    dir: &Path,
    category: Option<Category>,
    glob: Option<&str>,
) -> Result<ImportPreview> {
    let (candidates, failed) = collect_candidates(dir, glob)?;
    let mut preview = ImportPreview {
        failed,
        ..ImportPreview::default()
    };

    for (file, text) in extract_all(&candidates) {
        let path = file.absolute_path.clone();
        match text {
            Ok(content) if content.trim().is_empty() => {
                preview.failed.push(FailedImport {
                    file: path,
                    reason: "document content is empty".into(),
                });
            }
            Ok(content) => {
                let (category, attributes) =
                    planned_attributes(&path, &content, file.size, category);
                preview.planned.push(PlannedImport {
                    file: path,
                    category,
                    attributes,
                });
            }
            Err(reason) => {
                preview.failed.push(FailedImport { file: path, reason });
            }
        }
    }
    Ok(preview)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_dir::DataDir;

    fn test_index() -> (tempfile::TempDir, DocumentIndex) {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = DataDir::at(tmp.path().join("data")).unwrap();
        let index = DocumentIndex::open(&data_dir).unwrap();
        (tmp, index)
    }

    #[test]
    fn infer_category_prefers_path() {
        let content = "HPE today announced record revenue";
        assert_eq!(
            infer_category(Path::new("docs/greenlake.txt"), content),
            Category::Product
        );
        assert_eq!(
            infer_category(Path::new("docs/memo.txt"), content),
            Category::Financial
        );
        assert_eq!(
            infer_category(Path::new("docs/memo.txt"), "lunch menu"),
            Category::Other
        );
    }

    #[test]
    fn financial_attributes() {
        let attrs = content_attributes(
            "HPE Q3 FY24 results. Annual Recurring Revenue (ARR) rose.",
            Category::Financial,
        );
        assert_eq!(attrs["quarter"], json!("Q3"));
        assert_eq!(attrs["fiscal_year"], json!("2024"));
        assert_eq!(attrs["includes_arr"], json!(true));
    }

    #[test]
    fn arr_needs_a_word_boundary() {
        let attrs = content_attributes("We carry on.", Category::Financial);
        assert!(!attrs.contains_key("includes_arr"));
    }

    #[test]
    fn product_and_press_attributes() {
        let product = content_attributes(
            "GreenLake with Aruba networking",
            Category::Product,
        );
        assert_eq!(product["product"], json!("Aruba"));

        let press = content_attributes(
            "PALO ALTO, Calif., June 4, 2024 - HPE today announced",
            Category::Press,
        );
        assert_eq!(press["publication_date"], json!("June 4, 2024"));
    }

    #[test]
    fn extract_text_rejects_unknown_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let png = tmp.path().join("x.png");
        std::fs::write(&png, "binary").unwrap();

        assert!(matches!(extract_text(&png), Err(Error::InvalidInput(_))));
        assert!(matches!(
            extract_text(&tmp.path().join("missing.txt")),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn import_file_adds_file_attributes() {
        let (tmp, mut index) = test_index();
        let src = tmp.path().join("q3_earnings.txt");
        std::fs::write(&src, "HPE Q3 FY24: ARR $1.7 billion").unwrap();

        let mut attributes = Attributes::new();
        attributes.insert("quarter".into(), json!("Q4"));
        let id = import_file(
            &mut index,
            &src,
            ImportOptions {
                attributes,
                ..ImportOptions::default()
            },
        )
        .unwrap();

        let record = index.record(&id).unwrap();
        assert_eq!(record.category, Category::Financial);
        assert_eq!(record.attributes["source_file"], json!("q3_earnings.txt"));
        assert_eq!(record.attributes["file_size"], json!(29));
        // Caller attributes override heuristics.
        assert_eq!(record.attributes["quarter"], json!("Q4"));
        assert_eq!(record.attributes["fiscal_year"], json!("2024"));
    }

    #[test]
    fn import_file_honors_explicit_category_and_id() {
        let (tmp, mut index) = test_index();
        let src = tmp.path().join("revenue.md");
        std::fs::write(&src, "# Launch\nNew offering").unwrap();

        let id = import_file(
            &mut index,
            &src,
            ImportOptions {
                category: Some(Category::Press),
                id: Some("launch".into()),
                ..ImportOptions::default()
            },
        )
        .unwrap();

        assert_eq!(id, "launch");
        assert_eq!(index.record(&id).unwrap().category, Category::Press);
    }

    #[test]
    fn import_dir_reports_successes_and_failures() {
        let (tmp, mut index) = test_index();
        let src = tmp.path().join("incoming");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("earnings.txt"), "Revenue up").unwrap();
        std::fs::write(src.join("greenlake.md"), "Cloud platform").unwrap();
        std::fs::write(src.join("empty.txt"), "   ").unwrap();
        std::fs::write(src.join("photo.png"), "binary").unwrap();

        let report = import_dir(&mut index, &src, None, None).unwrap();

        assert_eq!(report.imported.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].file.ends_with("empty.txt"));
        assert_eq!(index.stats().count(Category::Financial), 1);
        assert_eq!(index.stats().count(Category::Product), 1);
    }

    #[test]
    fn import_dir_applies_glob_and_category() {
        let (tmp, mut index) = test_index();
        let src = tmp.path().join("incoming");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("a.txt"), "alpha").unwrap();
        std::fs::write(src.join("b.md"), "beta").unwrap();

        let report =
            import_dir(&mut index, &src, Some(Category::Press), Some("*.md"))
                .unwrap();

        assert_eq!(report.imported.len(), 1);
        assert_eq!(report.imported[0].category, Category::Press);
        assert!(report.imported[0].file.ends_with("b.md"));
    }

    #[test]
    fn preview_dir_leaves_index_untouched() {
        let (tmp, index) = test_index();
        let src = tmp.path().join("incoming");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("q3_earnings.txt"), "Q3 FY24 ARR up").unwrap();
        std::fs::write(src.join("launch.md"), "HPE today announced").unwrap();
        std::fs::write(src.join("blank.txt"), "\n").unwrap();

        let preview = preview_dir(&src, None, None).unwrap();

        assert_eq!(preview.planned.len(), 2);
        assert_eq!(preview.failed.len(), 1);
        assert!(preview.failed[0].file.ends_with("blank.txt"));
        let earnings = preview
            .planned
            .iter()
            .find(|p| p.file.ends_with("q3_earnings.txt"))
            .unwrap();
        assert_eq!(earnings.category, Category::Financial);
        assert_eq!(earnings.attributes["quarter"], json!("Q3"));
        assert_eq!(index.stats().total, 0);
        assert!(!index.data_dir().index_file().exists());
    }

    #[test]
    fn preview_dir_honors_category_override() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "misc").unwrap();

        let preview =
            preview_dir(tmp.path(), Some(Category::Press), None).unwrap();
        assert_eq!(preview.planned[0].category, Category::Press);
    }

    #[test]
    fn import_dir_rejects_bad_glob() {
        let (tmp, mut index) = test_index();
        let err =
            import_dir(&mut index, tmp.path(), None, Some("[")).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
