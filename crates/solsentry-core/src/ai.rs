//! External LLM provider.
//!
//! [`AiProvider`] is the seam the pipeline talks to. [`OpenAiProvider`] speaks
//! the OpenAI-compatible chat completions API, which most hosted and local
//! model servers implement. Model output is free text, so parsing is
//! tolerant: structured JSON when present, raw text otherwise.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::AiError;
use crate::scanner::{Finding, FindingSource, Severity};

/// Upstream error bodies are cut to this many characters.
const MAX_ERROR_BODY_CHARS: usize = 512;

const REVIEW_SYSTEM_PROMPT: &str = "You are a senior Solidity security auditor. \
Review the contract and answer with a single JSON object of the form \
{\"summary\": string, \"risk_score\": integer 0-100, \"findings\": [{\"title\": string, \
\"severity\": \"info\"|\"low\"|\"medium\"|\"high\"|\"critical\", \"line\": integer or null, \
\"description\": string, \"recommendation\": string}]}. Do not add prose outside the JSON.";

const REWRITE_SYSTEM_PROMPT: &str = "You are a senior Solidity engineer. \
Rewrite the contract to fix the listed issues while preserving its external behaviour. \
Return the complete contract in a single ```solidity fenced block, followed by a short \
list of the changes you made.";

/// Input to a security review.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub source: String,
    pub contract_name: Option<String>,
    /// Heuristic findings to hand the model as hints.
    pub heuristic_findings: Vec<Finding>,
}

/// Output of a security review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiReview {
    pub summary: String,
    pub risk_score: Option<u32>,
    pub findings: Vec<Finding>,
    pub model: String,
}

/// Input to a rewrite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewriteRequest {
    pub source: String,
    pub findings: Vec<Finding>,
    pub instructions: Option<String>,
}

/// Output of a rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiRewrite {
    pub source: String,
    pub notes: String,
    pub model: String,
}

/// A large-language-model backend.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Provider name, e.g. `"openai"`.
    fn name(&self) -> &str;

    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Review a contract for security issues.
    async fn review(&self, request: &ReviewRequest) -> Result<AiReview, AiError>;

    /// Produce a revised contract addressing the given findings.
    async fn rewrite(&self, request: &RewriteRequest) -> Result<AiRewrite, AiError>;
}

/// Settings for [`OpenAiProvider`].
#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// Base URL without the trailing `/chat/completions`.
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Client for OpenAI-compatible chat completion endpoints.
#[derive(Debug)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    config: OpenAiConfig,
    endpoint: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    /// Build a provider with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::NotConfigured`] for an empty API key and
    /// [`AiError::Http`] if the HTTP client cannot be built.
    pub fn new(config: OpenAiConfig) -> Result<Self, AiError> {
        if config.api_key.trim().is_empty() {
            return Err(AiError::NotConfigured);
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("solsentry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AiError::Http {
                reason: e.to_string(),
            })?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        Ok(Self {
            http,
            config,
            endpoint,
        })
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String, AiError> {
        let body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AiError::Upstream {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY_CHARS),
            });
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| AiError::InvalidResponse {
            reason: e.to_string(),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AiError::InvalidResponse {
                reason: "response contained no message content".to_owned(),
            })
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn review(&self, request: &ReviewRequest) -> Result<AiReview, AiError> {
        let mut prompt = String::new();
        if let Some(name) = &request.contract_name {
            prompt.push_str(&format!("Contract: {name}\n\n"));
        }
        if !request.heuristic_findings.is_empty() {
            prompt.push_str("A static scan reported:\n");
            prompt.push_str(&findings_list(&request.heuristic_findings));
            prompt.push('\n');
        }
        prompt.push_str("```solidity\n");
        prompt.push_str(&request.source);
        prompt.push_str("\n```");

        let content = self.chat(REVIEW_SYSTEM_PROMPT, &prompt).await?;
        Ok(parse_review(&content, &self.config.model))
    }

    async fn rewrite(&self, request: &RewriteRequest) -> Result<AiRewrite, AiError> {
        let mut prompt = String::new();
        if request.findings.is_empty() {
            prompt.push_str("Improve the security and gas efficiency of this contract.\n");
        } else {
            prompt.push_str("Fix these issues:\n");
            prompt.push_str(&findings_list(&request.findings));
        }
        if let Some(extra) = &request.instructions {
            prompt.push_str(&format!("\nAdditional instructions: {extra}\n"));
        }
        prompt.push_str("\n```solidity\n");
        prompt.push_str(&request.source);
        prompt.push_str("\n```");

        let content = self.chat(REWRITE_SYSTEM_PROMPT, &prompt).await?;
        parse_rewrite(&content, &self.config.model)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> AiError {
    if err.is_timeout() {
        AiError::Timeout
    } else {
        AiError::Http {
            reason: err.to_string(),
        }
    }
}

fn findings_list(findings: &[Finding]) -> String {
    findings
        .iter()
        .map(|f| match f.line {
            Some(line) => format!("- [{}] {} (line {line})\n", f.severity, f.title),
            None => format!("- [{}] {}\n", f.severity, f.title),
        })
        .collect()
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_owned(),
    }
}

// ── Response parsing ────────────────────────────────────────────────

/// Turn model output into a review. Never fails: unstructured output
/// becomes the summary.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_review(content: &str, model: &str) -> AiReview {
    let Some(obj) = extract_json_object(content) else {
        return AiReview {
            summary: content.trim().to_owned(),
            risk_score: None,
            findings: Vec::new(),
            model: model.to_owned(),
        };
    };

    let summary = obj
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_owned();

    let risk_score = obj.get("risk_score").and_then(|v| {
        v.as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .map(|n| u32::try_from(n.min(100)).unwrap_or(100))
    });

    let findings = obj
        .get("findings")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(finding_from_json).collect())
        .unwrap_or_default();

    AiReview {
        summary,
        risk_score,
        findings,
        model: model.to_owned(),
    }
}

fn finding_from_json(v: &Value) -> Option<Finding> {
    let text = |key: &str| {
        v.get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_owned())
            .unwrap_or_default()
    };

    let title = text("title");
    if title.is_empty() {
        return None;
    }
    let rule_id = match text("rule_id") {
        id if id.is_empty() => format!("ai-{}", slug(&title)),
        id => id,
    };

    Some(Finding {
        rule_id,
        severity: Severity::parse_lenient(&text("severity")),
        line: v
            .get("line")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .filter(|n| *n > 0),
        description: text("description"),
        recommendation: text("recommendation"),
        title,
        source: FindingSource::Ai,
    })
}

fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_owned()
}

/// The first balanced `{...}` in `text` that parses as a JSON object.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(rel) = text[search_from..].find('{') {
        let start = search_from + rel;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;

        for (i, &b) in bytes.iter().enumerate().skip(start) {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }

        if let Some(end) = end {
            if let Ok(Value::Object(map)) = serde_json::from_str(&text[start..=end]) {
                return Some(map);
            }
        }
        search_from = start + 1;
    }

    None
}

/// Turn model output into a rewrite.
///
/// # Errors
///
/// Returns [`AiError::InvalidResponse`] if no source can be recovered.
pub fn parse_rewrite(content: &str, model: &str) -> Result<AiRewrite, AiError> {
    let (source, notes) = match extract_code_block(content) {
        Some((code, rest)) => (code, rest),
        None => (content.trim().to_owned(), String::new()),
    };
    if source.trim().is_empty() {
        return Err(AiError::InvalidResponse {
            reason: "rewrite contained no source".to_owned(),
        });
    }
    Ok(AiRewrite {
        source,
        notes,
        model: model.to_owned(),
    })
}

/// First fenced block tagged `solidity`/`sol`, else the first fenced block.
/// Returns the code and the surrounding text with that block removed.
#[must_use]
pub fn extract_code_block(text: &str) -> Option<(String, String)> {
    struct Block {
        start: usize,
        end: usize,
        lang: String,
        code: String,
    }

    let mut blocks = Vec::new();
    let mut pos = 0;
    while let Some(rel) = text[pos..].find("```") {
        let open = pos + rel;
        let after_fence = open + 3;
        let line_end = text[after_fence..]
            .find('\n')
            .map_or(text.len(), |i| after_fence + i);
        let lang = text[after_fence..line_end].trim().to_ascii_lowercase();
        let code_start = (line_end + 1).min(text.len());
        let Some(close_rel) = text[code_start..].find("```") else {
            break;
        };
        let close = code_start + close_rel;
        blocks.push(Block {
            start: open,
            end: close + 3,
            lang,
            code: text[code_start..close].trim_end().to_owned(),
        });
        pos = close + 3;
    }

    let block = blocks
        .iter()
        .position(|b| b.lang == "solidity" || b.lang == "sol")
        .or_else(|| (!blocks.is_empty()).then_some(0))
        .map(|i| blocks.swap_remove(i))?;

    let rest = format!("{}{}", &text[..block.start], &text[block.end..]);
    Some((block.code, rest.trim().to_owned()))
}
