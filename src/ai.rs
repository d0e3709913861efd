use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::ScrapeError;

static THINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "deepseek-r1:8b";
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(120);

/// Reply when the text backend is unreachable; callers degrade, never crash.
pub const DEGRADED_REPLY: &str =
    "The assistant is temporarily unavailable; please try again shortly.";

/// Text-in/text-out client for a local Ollama instance.
pub struct TextOracle {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

impl TextOracle {
    pub fn from_env() -> Self {
        let endpoint = std::env::var("OLLAMA_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.into());
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model,
        }
    }

    pub async fn complete(&self, prompt: &str) -> Result<String, ScrapeError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let resp = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .timeout(COMPLETION_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ScrapeError::Oracle(format!("completion request failed: {e}")))?;
        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ScrapeError::Oracle(format!("non-JSON completion response: {e}")))?;
        if let Some(error) = body.error {
            return Err(ScrapeError::Oracle(error));
        }
        Ok(strip_markup(&body.response))
    }
}

/// Model replies carry reasoning blocks and stray tags; strip both.
fn strip_markup(raw: &str) -> String {
    let without_think = THINK_RE.replace_all(raw, "");
    TAG_RE.replace_all(&without_think, "").trim().to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Chat(String),
    NotificationRequest { domain: String, phrase: String },
}

/// Decide whether a free-text message is a chat turn or a notification
/// request. A reply the router cannot parse is treated as a chat turn.
pub async fn classify(oracle: &TextOracle, message: &str) -> Intent {
    let prompt = format!(
        "You route messages for a notification-tracking assistant.\n\n\
         Message: \"{message}\"\n\n\
         If the message asks to find or track a notification (admit card, result, \
         circular, notice) on a website, reply with exactly one line in this form:\n\
         NOTIFY|<domain or url>|<notification name>\n\n\
         For anything else reply with exactly:\n\
         CHAT"
    );
    match oracle.complete(&prompt).await {
        Ok(reply) => {
            if let Some((domain, phrase)) = parse_intent(&reply) {
                return Intent::NotificationRequest { domain, phrase };
            }
            chat(oracle, message).await
        }
        Err(e) => {
            warn!("intent classification failed: {e}");
            chat(oracle, message).await
        }
    }
}

async fn chat(oracle: &TextOracle, message: &str) -> Intent {
    match oracle.complete(message).await {
        Ok(answer) if !answer.is_empty() => Intent::Chat(answer),
        Ok(_) => Intent::Chat(DEGRADED_REPLY.to_string()),
        Err(e) => {
            warn!("chat completion failed: {e}");
            Intent::Chat(DEGRADED_REPLY.to_string())
        }
    }
}

fn parse_intent(reply: &str) -> Option<(String, String)> {
    let line = reply
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("NOTIFY|"))?;
    let mut parts = line.splitn(3, '|');
    parts.next();
    let domain = parts.next()?.trim();
    let phrase = parts.next()?.trim();
    (!domain.is_empty() && !phrase.is_empty()).then(|| (domain.to_string(), phrase.to_string()))
}

/// Summarize a matched excerpt for the end user. The copy stays confident
/// and positive; a miss is always presented as ongoing monitoring.
pub async fn summarize(
    oracle: &TextOracle,
    domain: &str,
    phrase: &str,
    snippet: &str,
) -> Option<String> {
    let prompt = format!(
        "Below is content scraped from {domain} related to the query \"{phrase}\":\n\n\
         \"\"\"\n{snippet}\n\"\"\"\n\n\
         Write a short, clear, human-sounding summary of this update.\n\
         If the content is only partially related, still write a helpful and positive update.\n\
         Never say \"NOT FOUND\". Be confident and mention that updates are being monitored.\n\
         Respond with only the final summary."
    );
    match oracle.complete(&prompt).await {
        Ok(summary) if !summary.is_empty() => Some(summary),
        Ok(_) => None,
        Err(e) => {
            warn!("summary generation failed: {e}");
            None
        }
    }
}

// ── Tests ──
