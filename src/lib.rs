//! docrefine - a small business-document library with keyword search and
//! LLM-assisted query refinement.
//!
//! Documents are plain-text files filed under one of four categories
//! (financial, product, press, other) inside a data directory, with a JSON
//! index mapping each id to its path, category, timestamp and attributes.
//! Keyword search scores documents by raw term occurrence counts, and
//! [`workflow::refine_query`] feeds the best matches to a
//! [`refiner::QueryRefiner`] to rewrite a user's query.
//!
//! # Quick start
//!
//! ```no_run
//! use docrefine::{
//!     Category, DataDir, DocumentIndex, record::Attributes, search,
//! };
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let mut index = DocumentIndex::open(&data_dir).unwrap();
//!
//! index
//!     .add(
//!         "Annual Recurring Revenue (ARR): $1.7 billion",
//!         Category::Financial,
//!         Attributes::new(),
//!         None,
//!     )
//!     .unwrap();
//!
//! for hit in search::search(&index, "ARR", None, search::DEFAULT_LIMIT) {
//!     println!("{} {} ({})", hit.rank, hit.id, hit.score);
//! }
//! ```

pub mod batch;
pub mod category;
pub mod config_db;
pub mod data_dir;
pub mod doc_id;
pub mod error;
pub mod index;
pub mod ingestion;
pub mod interactive;
pub mod record;
pub mod refiner;
pub mod repair;
pub mod search;
pub mod settings;
pub mod store;
pub mod text_util;
pub mod walker;
pub mod workflow;

pub use category::Category;
pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use index::DocumentIndex;
pub use refiner::{GeminiRefiner, QueryRefiner};
pub use store::{IndexStore, JsonFileStore, MemoryStore};
