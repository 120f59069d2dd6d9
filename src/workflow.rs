use std::time::{Duration, Instant};

use serde::Serialize;

use crate::{
    error::Result,
    index::DocumentIndex,
    record::describe_attributes,
    refiner::{QueryRefiner, RefineRequest},
    search::{self, SearchHit},
    store::IndexStore,
};

/// Number of documents consulted for context by default.
pub const DEFAULT_MAX_DOCS: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct RefineOptions {
    pub use_context: bool,
    pub max_docs: usize,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            use_context: true,
            max_docs: DEFAULT_MAX_DOCS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefineOutcome {
    pub original_query: String,
    pub refined_query: String,
    pub used_context: bool,
    /// Total characters of context sent to the refiner.
    pub context_length: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

/// Render one search hit as a context block for the refiner.
pub fn context_snippet(hit: &SearchHit) -> String {
    format!(
        "Document ({}):\n{}",
        describe_attributes(&hit.attributes),
        hit.snippet
    )
}

/// Gather context from the index (unless disabled) and ask `refiner` for a
/// better query. Refiner failures are returned as-is.
pub fn refine_query<S: IndexStore, R: QueryRefiner + ?Sized>(
    index: &DocumentIndex<S>,
    refiner: &R,
    query: &str,
    options: RefineOptions,
) -> Result<RefineOutcome> {
    let started = Instant::now();

    let context_snippets: Vec<String> = if options.use_context {
        search::search(index, query, None, options.max_docs)
            .iter()
            .map(context_snippet)
            .collect()
    } else {
        Vec::new()
    };
    let context_length = context_snippets.iter().map(|s| s.len()).sum();
    let used_context = !context_snippets.is_empty();

    tracing::debug!(
        query,
        snippets = context_snippets.len(),
        context_length,
        "refining query"
    );

    let request = RefineRequest {
        raw_query: query.to_string(),
        context_snippets,
    };
    let refined = refiner.refine(&request)?;

    let elapsed = started.elapsed();
    tracing::info!(
        elapsed_ms = elapsed.as_millis() as u64,
        used_context,
        "query refined"
    );

    Ok(RefineOutcome {
        original_query: query.to_string(),
        refined_query: refined.refined_query,
        used_context,
        context_length,
        elapsed,
    })
}

pub(crate) fn serialize_secs<S: serde::Serializer>(
    d: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(d.as_secs_f64())
}

/// Print an outcome for the terminal.
pub fn format_human(outcome: &RefineOutcome) {
    println!("Original query: {}", outcome.original_query);
    println!("Refined query:  {}", outcome.refined_query);
    if outcome.used_context {
        println!("Context: {} characters", outcome.context_length);
    } else {
        println!("Context: none");
    }
    println!("Time: {:.2}s", outcome.elapsed.as_secs_f64());
}
