use serde::Serialize;

use crate::{
    category::Category,
    index::{self, DocumentIndex},
    record::{Attributes, describe_attributes},
    store::IndexStore,
    text_util,
};

/// Default number of hits returned by [`search`].
pub const DEFAULT_LIMIT: usize = 10;

/// One keyword search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub rank: usize,
    pub id: String,
    pub score: usize,
    pub category: Category,
    pub snippet: String,
    pub attributes: Attributes,
}

/// Lower-case the query and split it on whitespace. Repeated terms are
/// kept, so they count again when scoring.
pub fn query_terms(query: &str) -> Vec<String> {
    query.to_lowercase().split_whitespace().map(String::from).collect()
}

/// Count occurrences of `needle` in `haystack`, including overlapping ones:
/// "aa" occurs twice in "aaa".
///
/// # Examples
///
/// ```
/// use docrefine::search::count_occurrences;
///
/// assert_eq!(count_occurrences("aaa", "aa"), 2);
/// assert_eq!(count_occurrences("revenue and revenue", "revenue"), 2);
/// assert_eq!(count_occurrences("anything", ""), 0);
/// ```
pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack
        .char_indices()
        .filter(|(i, _)| haystack[*i..].starts_with(needle))
        .count()
}

/// Sum of raw occurrence counts of every term in already lower-cased text.
pub fn score(text_lower: &str, terms: &[String]) -> usize {
    terms
        .iter()
        .map(|term| count_occurrences(text_lower, term))
        .sum()
}

/// Linear keyword scan over every indexed document.
///
/// Documents scoring zero are dropped; the rest are ordered by descending
/// score, ties keeping index (id) order, and cut to `limit`. A document
/// whose content cannot be read is skipped with a warning.
pub fn search<S: IndexStore>(
    index: &DocumentIndex<S>,
    query: &str,
    category: Option<Category>,
    limit: usize,
) -> Vec<SearchHit> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return vec![];
    }

    let mut hits = Vec::new();
    for record in index.records() {
        if category.is_some_and(|c| c != record.category) {
            continue;
        }

        let content = match index::read_content(record) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(
                    id = %record.id,
                    path = %record.path,
                    "skipping unreadable document: {e}"
                );
                continue;
            }
        };

        let score = score(&content.to_lowercase(), &terms);
        if score == 0 {
            continue;
        }

        let snippet = text_util::extract_snippet(&content, &terms)
            .map(|(s, _)| s)
            .unwrap_or_default();
        hits.push(SearchHit {
            rank: 0,
            id: record.id.clone(),
            score,
            category: record.category,
            snippet,
            attributes: record.attributes.clone(),
        });
    }

    // Stable sort: equal scores keep id order.
    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits.truncate(limit);
    for (i, hit) in hits.iter_mut().enumerate() {
        hit.rank = i + 1;
    }

    tracing::debug!(query, results = hits.len(), "keyword search finished");
    hits
}

/// Format hits for human-readable terminal output.
pub fn format_human(hits: &[SearchHit], query: &str) {
    if hits.is_empty() {
        println!("No matching documents found for '{query}'.");
        return;
    }

    for hit in hits {
        println!(
            "{:>3}. [{}] {} ({})",
            hit.rank, hit.score, hit.id, hit.category
        );
        if !hit.attributes.is_empty() {
            println!("     {}", describe_attributes(&hit.attributes));
        }
        for line in hit.snippet.lines() {
            println!("     | {line}");
        }
    }
    println!("\n{} result(s)", hits.len());
}

/// Format hits as a JSON document on stdout.
pub fn format_json(hits: &[SearchHit], query: &str) -> crate::Result<()> {
    let out = serde_json::json!({
        "query": query,
        "result_count": hits.len(),
        "results": hits,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data_dir::DataDir, record::Attributes};

    const ARR_DOC: &str = "HPE Q3 FY24 Financial Results:\n\
        Annual Recurring Revenue (ARR): $1.7 billion, up 33% from prior year\n\
        Revenue: $7.2 billion, up 5% from prior year";

    const PRODUCT_DOC: &str = "HPE GreenLake for Private Cloud Enterprise:\n\
        a pay-per-use cloud platform. Revenue share options are available.";

    const PRESS_DOC: &str = "HPE Segment Reorganization:\n\
        HPE merged its HPC business with its AI initiatives.";

    fn setup_index_with_docs() -> (tempfile::TempDir, DocumentIndex) {
        let tmp = tempfile::tempdir().unwrap();
        let data_dir = DataDir::at(tmp.path()).unwrap();
        let mut index = DocumentIndex::open(&data_dir).unwrap();

        for (id, content, category) in [
            ("fin-q3", ARR_DOC, Category::Financial),
            ("prod-gl", PRODUCT_DOC, Category::Product),
            ("press-reorg", PRESS_DOC, Category::Press),
        ] {
            index
                .add(content, category, Attributes::new(), Some(id))
                .unwrap();
        }
        (tmp, index)
    }

    #[test]
    fn overlapping_matches_count() {
        assert_eq!(count_occurrences("aaa", "aa"), 2);
        assert_eq!(count_occurrences("aaaa", "aa"), 3);
        assert_eq!(count_occurrences("abc", "abcd"), 0);
    }

    #[test]
    fn count_handles_multibyte_text() {
        assert_eq!(count_occurrences("ééé", "éé"), 2);
        assert_eq!(count_occurrences("café revenue", "revenue"), 1);
    }

    #[test]
    fn query_terms_are_lowercased_and_kept() {
        assert_eq!(
            query_terms("  ARR  revenue\tARR "),
            vec!["arr", "revenue", "arr"]
        );
        assert!(query_terms(" \n ").is_empty());
    }

    #[test]
    fn arr_example() {
        let (_tmp, index) = setup_index_with_docs();

        let hits = search(&index, "ARR", None, DEFAULT_LIMIT);
        let fin = hits.iter().find(|h| h.id == "fin-q3").unwrap();
        assert!(fin.score >= 1);
        assert!(fin.snippet.contains("(ARR)"));

        let product_hits =
            search(&index, "ARR", Some(Category::Product), DEFAULT_LIMIT);
        assert!(product_hits.is_empty());
    }

    #[test]
    fn results_are_ranked_by_score() {
        let (_tmp, index) = setup_index_with_docs();
        let hits = search(&index, "revenue", None, DEFAULT_LIMIT);

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "fin-q3");
        assert_eq!(hits[0].score, 2);
        assert_eq!(hits[1].id, "prod-gl");
        assert_eq!(hits[1].score, 1);
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[1].rank, 2);
    }

    #[test]
    fn zero_scores_are_excluded() {
        let (_tmp, index) = setup_index_with_docs();
        assert!(search(&index, "xyzzy", None, DEFAULT_LIMIT).is_empty());
        assert!(search(&index, "   ", None, DEFAULT_LIMIT).is_empty());
    }

    #[test]
    fn repeated_terms_never_lower_scores() {
        let (_tmp, index) = setup_index_with_docs();
        let single = search(&index, "revenue", None, DEFAULT_LIMIT);
        let double = search(&index, "revenue revenue", None, DEFAULT_LIMIT);

        for hit in &single {
            let doubled = double.iter().find(|h| h.id == hit.id).unwrap();
            assert!(doubled.score >= hit.score);
        }
    }

    #[test]
    fn category_filter_is_respected() {
        let (_tmp, index) = setup_index_with_docs();
        for category in Category::ALL {
            for hit in search(&index, "hpe", Some(category), DEFAULT_LIMIT) {
                assert_eq!(hit.category, category);
            }
        }
    }

    #[test]
    fn limit_truncates_head() {
        let (_tmp, index) = setup_index_with_docs();
        let hits = search(&index, "hpe", None, 1);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn ties_keep_id_order() {
        let (_tmp, index) = setup_index_with_docs();
        // "hpe" occurs once in the financial and product documents.
        let hits = search(&index, "hpe", None, DEFAULT_LIMIT);
        let ones: Vec<_> = hits
            .iter()
            .filter(|h| h.score == 1)
            .map(|h| h.id.as_str())
            .collect();
        assert_eq!(ones, vec!["fin-q3", "prod-gl"]);
    }

    #[test]
    fn missing_content_is_skipped() {
        let (_tmp, index) = setup_index_with_docs();
        std::fs::remove_file(&index.record("fin-q3").unwrap().path).unwrap();

        let hits = search(&index, "revenue", None, DEFAULT_LIMIT);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "prod-gl");
    }
}
