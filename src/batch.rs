use std::{fmt::Write as _, path::Path, thread, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    error::Result,
    index::DocumentIndex,
    refiner::QueryRefiner,
    store::IndexStore,
    workflow::{self, RefineOptions},
};

/// Pause between refiner calls, to stay clear of API rate limits.
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_secs(1);

/// Queries from a text file: one per line. Blank lines and lines starting
/// with `#` are skipped.
pub fn read_queries(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_queries(&text))
}

pub fn parse_queries(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Result of one query in a batch. Exactly one of `refined_query` and
/// `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    pub original_query: String,
    pub refined_query: Option<String>,
    pub error: Option<String>,
    pub used_context: bool,
    pub context_length: usize,
    #[serde(serialize_with = "workflow::serialize_secs")]
    pub elapsed: Duration,
}

impl BatchEntry {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Refine every query in order, sleeping `pause` between calls.
///
/// A failing query is recorded in its entry and the batch carries on.
pub fn run_batch<S: IndexStore, R: QueryRefiner + ?Sized>(
    index: &DocumentIndex<S>,
    refiner: &R,
    queries: &[String],
    options: RefineOptions,
    pause: Duration,
) -> Vec<BatchEntry> {
    let mut entries = Vec::with_capacity(queries.len());

    for (i, query) in queries.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            thread::sleep(pause);
        }
        tracing::info!(
            n = i + 1,
            total = queries.len(),
            query = %query,
            "batch query"
        );

        let outcome = workflow::refine_query(index, refiner, query, options);
        let entry = match outcome {
            Ok(outcome) => BatchEntry {
                original_query: outcome.original_query,
                refined_query: Some(outcome.refined_query),
                error: None,
                used_context: outcome.used_context,
                context_length: outcome.context_length,
                elapsed: outcome.elapsed,
            },
            Err(e) => {
                tracing::warn!(query = %query, "batch query failed: {e}");
                BatchEntry {
                    original_query: query.clone(),
                    refined_query: None,
                    error: Some(e.to_string()),
                    used_context: false,
                    context_length: 0,
                    elapsed: Duration::ZERO,
                }
            }
        };
        entries.push(entry);
    }

    entries
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Mean refinement time over successful queries, in seconds.
    pub average_secs: f64,
    pub used_context: usize,
}

impl BatchSummary {
    pub fn from_entries(entries: &[BatchEntry]) -> Self {
        let succeeded: Vec<&BatchEntry> =
            entries.iter().filter(|e| e.succeeded()).collect();
        let average_secs = if succeeded.is_empty() {
            0.0
        } else {
            let total: f64 =
                succeeded.iter().map(|e| e.elapsed.as_secs_f64()).sum();
            total / succeeded.len() as f64
        };

        Self {
            total: entries.len(),
            succeeded: succeeded.len(),
            failed: entries.len() - succeeded.len(),
            average_secs,
            used_context: entries.iter().filter(|e| e.used_context).count(),
        }
    }
}

/// Markdown report of a batch run.
pub fn render_report(
    entries: &[BatchEntry],
    model: &str,
    use_context: bool,
    generated_at: DateTime<Utc>,
) -> String {
    let summary = BatchSummary::from_entries(entries);
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(out, "# Query Refinement Report");
    let _ = writeln!(
        out,
        "Generated: {}",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "Context enabled: {use_context}");
    let _ = writeln!(out, "Model: {model}");
    let _ = writeln!(out);

    let _ = writeln!(out, "## Summary");
    let _ = writeln!(out, "- Total queries: {}", summary.total);
    let _ = writeln!(out, "- Successful: {}", summary.succeeded);
    let _ = writeln!(out, "- Failed: {}", summary.failed);
    let _ = writeln!(
        out,
        "- Average processing time: {:.2} seconds",
        summary.average_secs
    );
    let _ = writeln!(
        out,
        "- Context used: {}/{} queries",
        summary.used_context, summary.total
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "## Detailed Results");
    for (i, entry) in entries.iter().enumerate() {
        let _ = writeln!(out, "### Query {}", i + 1);
        let _ = writeln!(out, "- Original: {}", entry.original_query);
        match (&entry.refined_query, &entry.error) {
            (_, Some(error)) => {
                let _ = writeln!(out, "- Error: {error}");
            }
            (Some(refined), None) => {
                let _ = writeln!(out, "- Refined: {refined}");
                let _ = writeln!(
                    out,
                    "- Processing time: {:.2} seconds",
                    entry.elapsed.as_secs_f64()
                );
                let _ = writeln!(out, "- Context used: {}", entry.used_context);
                let _ = writeln!(
                    out,
                    "- Context length: {} characters",
                    entry.context_length
                );
            }
            (None, None) => {}
        }
        let _ = writeln!(out);
    }

    out
}
