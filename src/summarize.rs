// src/summarize.rs
//! Summarizer boundary: provider abstraction over the OpenAI chat API with
//! a deterministic truncation fallback. A failed or absent summarizer is a
//! quality degradation, never an error — callers fall back to
//! [`truncate_summary`] and move on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Maximum characters kept by the truncation fallback.
pub const FALLBACK_SUMMARY_CHARS: usize = 200;

const MAX_SUMMARY_CHARS: usize = 300;

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce a one-sentence summary, or `None` when the provider is
    /// unavailable, over quota, or returns garbage. Callers degrade to
    /// truncation on `None`.
    async fn summarize(&self, title: &str, content: &str) -> Option<String>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type SharedSummarizer = Arc<dyn Summarizer>;

/// Factory: pick a provider from the environment.
///
/// * `SUMMARIZER_TEST_MODE=mock` returns a deterministic mock.
/// * `OPENAI_API_KEY` present builds the real client.
/// * Otherwise summaries degrade to truncation everywhere.
pub fn build_summarizer() -> SharedSummarizer {
    if std::env::var("SUMMARIZER_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(FixedSummarizer {
            fixed: "Mock summary.".to_string(),
        });
    }

    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Arc::new(OpenAiSummarizer::new(key, None)),
        _ => {
            tracing::info!("no OPENAI_API_KEY configured; summaries degrade to truncation");
            Arc::new(DisabledSummarizer)
        }
    }
}

/// Deterministic fallback: first [`FALLBACK_SUMMARY_CHARS`] characters of
/// the content with a truncation marker. Empty content falls back to the
/// title.
pub fn truncate_summary(title: &str, content: &str) -> String {
    let text = if content.trim().is_empty() {
        title
    } else {
        content
    };
    let mut out: String = text.chars().take(FALLBACK_SUMMARY_CHARS).collect();
    if text.chars().count() > FALLBACK_SUMMARY_CHARS {
        out.push('…');
    }
    out
}

/// Ensure a single line capped at [`MAX_SUMMARY_CHARS`] chars. Collapses
/// whitespace.
pub fn sanitize_summary(input: &str) -> String {
    let mut out = String::with_capacity(MAX_SUMMARY_CHARS);
    let mut prev_space = false;
    for ch in input.chars() {
        let c = match ch {
            '\r' | '\n' | '\t' => ' ',
            c => c,
        };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
        if out.len() >= MAX_SUMMARY_CHARS {
            break;
        }
    }
    out.trim().to_string()
}

/// OpenAI provider (Chat Completions API).
pub struct OpenAiSummarizer {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiSummarizer {
    /// `model_override`: pass Some("gpt-4o-mini") to override; defaults to gpt-4o-mini.
    pub fn new(api_key: String, model_override: Option<&str>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("cloud-news-digest/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        let model = model_override.unwrap_or("gpt-4o-mini").to_string();
        Self {
            http,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, title: &str, content: &str) -> Option<String> {
        if self.api_key.is_empty() {
            return None;
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let sys = "You summarize cloud service announcements. Return ONE short sentence (<=200 chars), neutral tone, no emojis. Output only the sentence.";
        let user = format!("{title}\n\n{content}");
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: sys,
                },
                Msg {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.2,
            max_tokens: 120,
        };

        let resp = match self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = ?e, "summarizer request failed; degrading to truncation");
                return None;
            }
        };

        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "summarizer non-success; degrading to truncation");
            return None;
        }
        let body: Resp = resp.json().await.ok()?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");
        let cleaned = sanitize_summary(content);
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Returns `None` always; used when no credential is configured.
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    async fn summarize(&self, _title: &str, _content: &str) -> Option<String> {
        None
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic provider for tests and local runs.
pub struct FixedSummarizer {
    pub fixed: String,
}

#[async_trait]
impl Summarizer for FixedSummarizer {
    async fn summarize(&self, _title: &str, _content: &str) -> Option<String> {
        Some(self.fixed.clone())
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
