use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    category::Category,
    error::{Error, Result},
};

/// Caller-supplied key/value pairs attached to a document.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// The in-memory index: document id to record, iterated in id order.
pub type Index = BTreeMap<String, DocumentRecord>;

/// Metadata for one indexed document.
///
/// On disk the record is stored under its id, so the id itself is not
/// serialized. Stores fill it back in on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(skip)]
    pub id: String,
    pub path: String,
    #[serde(rename = "type")]
    pub category: Category,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub added: DateTime<Utc>,
    #[serde(rename = "metadata", default)]
    pub attributes: Attributes,
}

/// A record together with its text.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub record: DocumentRecord,
    pub content: String,
}

/// Document counts per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total: usize,
    pub by_category: BTreeMap<Category, usize>,
}

impl IndexStats {
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a DocumentRecord>,
    ) -> Self {
        let mut by_category: BTreeMap<Category, usize> =
            Category::ALL.iter().map(|c| (*c, 0)).collect();
        let mut total = 0;
        for record in records {
            *by_category.entry(record.category).or_default() += 1;
            total += 1;
        }
        Self { total, by_category }
    }

    pub fn count(&self, category: Category) -> usize {
        self.by_category.get(&category).copied().unwrap_or(0)
    }
}

/// Parse `key=value` pairs from the command line into attributes.
///
/// Keys and values are trimmed; values are stored as JSON strings.
pub fn parse_attributes<I, S>(pairs: I) -> Result<Attributes>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut attributes = Attributes::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            Error::InvalidInput(format!("expected key=value, got '{pair}'"))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidInput(format!(
                "attribute key is empty in '{pair}'"
            )));
        }
        attributes.insert(
            key.to_string(),
            serde_json::Value::String(value.trim().to_string()),
        );
    }
    Ok(attributes)
}

/// Render attributes as `k: v, k: v` for display and refiner context.
pub fn describe_attributes(attributes: &Attributes) -> String {
    attributes
        .iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => format!("{k}: {s}"),
            other => format!("{k}: {other}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Accept RFC 3339 timestamps as well as naive ISO-8601 ones (read as UTC),
/// which older index files contain.
fn deserialize_timestamp<'de, D>(
    deserializer: D,
) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}
