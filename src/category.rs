use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Fixed classification of an indexed document.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Financial,
    Product,
    Press,
    Other,
}

/// Keyword sets tested against a lower-cased source path, in priority order.
const PATH_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Financial,
        &["financial", "earnings", "revenue", "quarter", "fiscal"],
    ),
    (
        Category::Product,
        &["product", "service", "greenlake", "offering"],
    ),
    (
        Category::Press,
        &["press", "news", "release", "announcement"],
    ),
];

/// Keyword sets tested against document content, in priority order.
const CONTENT_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::Financial,
        &[
            "revenue",
            "quarterly results",
            "fiscal",
            "earnings",
            "eps",
            "arr",
        ],
    ),
    (
        Category::Product,
        &["product", "service", "greenlake", "platform", "solution"],
    ),
    (
        Category::Press,
        &["announces", "today announced", "press release"],
    ),
];

/// How much of a document the content pass looks at.
pub const CONTENT_SNIFF_BYTES: usize = 4096;

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Financial,
        Category::Product,
        Category::Press,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Financial => "financial",
            Category::Product => "product",
            Category::Press => "press",
            Category::Other => "other",
        }
    }

    /// Best-effort classification of a file name or path.
    ///
    /// Financial terms win over product terms, which win over press terms.
    /// Falls back to [`Category::Other`].
    ///
    /// # Examples
    ///
    /// ```
    /// use docrefine::Category;
    ///
    /// assert_eq!(Category::infer("Q3_Earnings.pdf"), Category::Financial);
    /// assert_eq!(Category::infer("greenlake-deck.txt"), Category::Product);
    /// assert_eq!(Category::infer("notes.txt"), Category::Other);
    /// ```
    pub fn infer(text: &str) -> Category {
        classify(text, PATH_KEYWORDS)
    }

    /// Classify by document body, looking only at its head.
    pub fn infer_from_content(content: &str) -> Category {
        let mut end = content.len().min(CONTENT_SNIFF_BYTES);
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        classify(&content[..end], CONTENT_KEYWORDS)
    }
}

fn classify(text: &str, sets: &[(Category, &[&str])]) -> Category {
    let lower = text.to_lowercase();
    sets.iter()
        .find(|(_, terms)| terms.iter().any(|term| lower.contains(term)))
        .map_or(Category::Other, |(category, _)| *category)
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "financial" => Ok(Category::Financial),
            "product" => Ok(Category::Product),
            "press" => Ok(Category::Press),
            "other" => Ok(Category::Other),
            other => Err(Error::InvalidInput(format!(
                "unsupported category '{other}' \
                 (expected financial, product, press or other)"
            ))),
        }
    }
}
