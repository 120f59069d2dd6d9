use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use crate::{
    category::Category,
    error::{Error, Result},
};

/// Number of hex characters of the content hash kept in generated ids.
const HASH_LEN: usize = 8;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Derive a document id from its content and the ingestion time.
///
/// The id has the shape `<category>_<YYYYmmddHHMMSS>_<8 hex>`. The hex part
/// hashes the content together with the nanosecond timestamp and a
/// process-wide sequence number, so identical content added within the
/// same second still gets distinct ids.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use docrefine::{Category, doc_id};
///
/// let id = doc_id::generate(Category::Financial, "ARR up 33%", Utc::now());
/// assert!(id.starts_with("financial_"));
/// assert_eq!(id.len(), "financial_".len() + 14 + 1 + 8);
/// ```
pub fn generate(
    category: Category,
    content: &str,
    at: DateTime<Utc>,
) -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let nanos = at.timestamp_nanos_opt().unwrap_or_default();

    let mut hasher = blake3::Hasher::new();
    hasher.update(content.as_bytes());
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&seq.to_le_bytes());
    let hex = hasher.finalize().to_hex();

    format!(
        "{category}_{}_{}",
        at.format("%Y%m%d%H%M%S"),
        &hex.as_str()[..HASH_LEN]
    )
}

/// Check a caller-supplied id before it is used as a file name.
pub fn validate(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::InvalidInput("document id is empty".into()));
    }
    if id.contains(['/', '\\', '\0']) || id.contains("..") {
        return Err(Error::InvalidInput(format!(
            "document id '{id}' must not contain path separators or '..'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn has_category_prefix_and_timestamp() {
        let at = DateTime::parse_from_rfc3339("2024-09-03T10:11:12Z")
            .unwrap()
            .with_timezone(&Utc);
        let id = generate(Category::Press, "hello", at);
        assert!(id.starts_with("press_20240903101112_"), "{id}");
        assert_eq!(id.rsplit('_').next().unwrap().len(), HASH_LEN);
    }

    #[test]
    fn identical_content_same_instant_differs() {
        let at = Utc::now();
        let ids: HashSet<_> = (0..100)
            .map(|_| generate(Category::Financial, "same", at))
            .collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn validate_accepts_plain_ids() {
        assert!(validate("q3-earnings_2024").is_ok());
    }

    #[test]
    fn validate_rejects_paths() {
        for bad in ["", "  ", "../escape", "a/b", "a\\b", "nul\0"] {
            assert!(
                matches!(validate(bad), Err(Error::InvalidInput(_))),
                "accepted {bad:?}"
            );
        }
    }
}
