use std::{thread, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_MODEL_ID: &str = "gemini-1.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// What the refiner is asked: the user's words plus supporting excerpts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefineRequest {
    pub raw_query: String,
    pub context_snippets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefinedQuery {
    pub refined_query: String,
}

/// Turns a raw query plus context into a sharper query.
///
/// Failures are returned to the caller; implementations must not fall back
/// to echoing the raw query.
pub trait QueryRefiner {
    fn refine(&self, request: &RefineRequest) -> Result<RefinedQuery>;
}

/// Connection settings for [`GeminiRefiner`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
            temperature: 0.1,
            max_output_tokens: 150,
            top_p: 0.95,
        }
    }
}

/// [`QueryRefiner`] backed by the Gemini `generateContent` endpoint.
pub struct GeminiRefiner {
    config: GeminiConfig,
    client: reqwest::blocking::Client,
}

impl GeminiRefiner {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::Config("Gemini API key is empty".into()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }

    fn attempt(&self, body: &GenerateRequest<'_>) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(Error::Refiner(format!(
                "API returned {status}: {}",
                detail.trim()
            )));
        }

        let parsed: GenerateResponse = response.json()?;
        parsed.into_text()
    }
}

impl QueryRefiner for GeminiRefiner {
    fn refine(&self, request: &RefineRequest) -> Result<RefinedQuery> {
        let prompt = build_prompt(request);
        let body = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
                top_p: self.config.top_p,
            },
        };

        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.attempt(&body) {
                Ok(refined_query) => {
                    return Ok(RefinedQuery { refined_query });
                }
                Err(e) if attempt >= attempts => {
                    return Err(Error::Refiner(format!(
                        "giving up after {attempts} attempt(s): {e}"
                    )));
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        model = %self.config.model,
                        "refiner call failed, retrying: {e}"
                    );
                    thread::sleep(self.config.retry_delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Instruction text sent to the model.
pub fn build_prompt(request: &RefineRequest) -> String {
    let mut prompt = String::from(
        "Rewrite the user's search query as one precise, self-contained \
         question about the business documents below. Expand abbreviations \
         and make time periods explicit. Reply with the rewritten query only, \
         on a single line.\n",
    );

    if !request.context_snippets.is_empty() {
        prompt.push_str("\nContext:\n");
        for snippet in &request.context_snippets {
            prompt.push_str(snippet);
            prompt.push_str("\n\n");
        }
    }

    prompt.push_str(&format!(
        "\nQuery: \"{}\"\nRewritten query:",
        request.raw_query
    ));
    prompt
}

/// Trim whitespace and any quotes the model wrapped the answer in.
pub fn clean_refined(text: &str) -> String {
    text.trim().trim_matches(['"', '\'']).trim().to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Cleaned text of the first candidate, with its parts concatenated.
    /// A reply that is empty once quotes are stripped is an error.
    fn into_text(self) -> Result<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        let cleaned = clean_refined(&text);
        if cleaned.is_empty() {
            return Err(Error::Refiner("model returned no text".into()));
        }
        Ok(cleaned)
    }
}
