use std::path::{Path, PathBuf};

use crate::{
    category::Category,
    error::{Error, Result},
};

/// File name of the persisted document index inside the data directory.
pub const INDEX_FILE: &str = "document_index.json";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The DOCREFINE_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/docrefine/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var("DOCREFINE_DATA_DIR") {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("docrefine")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        Self::at(root)
    }

    /// Use `root` directly, creating it and every category folder.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        let dir = Self { root };
        for category in Category::ALL {
            let path = dir.category_dir(category);
            std::fs::create_dir_all(&path)
                .map_err(|_| Error::DataDir(path.clone()))?;
        }
        Ok(dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_file(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn config_db(&self) -> PathBuf {
        self.root.join("config.redb")
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.root.join(category.as_str())
    }

    /// Where the content of document `id` lives.
    pub fn content_path(&self, category: Category, id: &str) -> PathBuf {
        self.category_dir(category).join(format!("{id}.txt"))
    }
}
