pub mod gemini;
pub mod openai;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domains::capability::{Capability, HandlerSource};
use crate::error::{IfritError, Result};
use crate::handlers::Handler;
use crate::interfaces::handlers::{HandlerInvoker, Invocation};
use crate::security::redact::scrub_literal;

pub use gemini::GeminiInvoker;
pub use openai::ChatCompletionsInvoker;

pub(crate) const PROVIDER_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    #[serde(rename = "deepseek")]
    DeepSeek,
    Perplexity,
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Gemini,
        ProviderKind::DeepSeek,
        ProviderKind::Perplexity,
        ProviderKind::OpenAi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
            Self::Perplexity => "perplexity",
            Self::OpenAi => "openai",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Gemini => "Google Gemini",
            Self::DeepSeek => "DeepSeek",
            Self::Perplexity => "Perplexity",
            Self::OpenAi => "OpenAI",
        }
    }

    pub fn env_var(self) -> String {
        format!("IFRIT_{}_API_KEY", self.as_str().to_ascii_uppercase())
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::DeepSeek => "https://api.deepseek.com/v1",
            Self::Perplexity => "https://api.perplexity.ai",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.0-flash",
            Self::DeepSeek => "deepseek-chat",
            Self::Perplexity => "sonar",
            Self::OpenAi => "gpt-4.1-mini",
        }
    }

    pub fn capabilities(self) -> &'static [&'static str] {
        match self {
            Self::Gemini => &[
                Capability::GENERATE,
                Capability::RESEARCH,
                Capability::SUMMARIZE,
                Capability::KEYWORDS,
                Capability::TRANSLATE,
            ],
            Self::DeepSeek => &[
                Capability::GENERATE,
                Capability::SUMMARIZE,
                Capability::KEYWORDS,
                Capability::TRANSLATE,
            ],
            Self::Perplexity => &[Capability::RESEARCH, Capability::GENERATE],
            Self::OpenAi => &[
                Capability::GENERATE,
                Capability::SUMMARIZE,
                Capability::KEYWORDS,
                Capability::TRANSLATE,
            ],
        }
    }

    /// Higher runs earlier when no default handler is configured.
    pub fn priority(self) -> i32 {
        match self {
            Self::Gemini => 40,
            Self::Perplexity => 30,
            Self::DeepSeek => 20,
            Self::OpenAi => 10,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = IfritError;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| IfritError::Config(format!("unknown provider '{value}'")))
    }
}

/// Per-provider endpoint overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl ProviderEndpoint {
    pub fn base_url_for(&self, kind: ProviderKind) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(kind.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn model_for(&self, kind: ProviderKind) -> String {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(kind.default_model())
            .to_string()
    }
}

/// Id of the handler built from the `index`-th key of a provider.
pub fn key_handler_id(kind: ProviderKind, index: usize) -> String {
    if index == 0 {
        kind.as_str().to_string()
    } else {
        format!("{}#{}", kind.as_str(), index + 1)
    }
}

pub fn build_provider_invoker(
    kind: ProviderKind,
    api_key: &str,
    endpoint: &ProviderEndpoint,
) -> Arc<dyn HandlerInvoker> {
    let base_url = endpoint.base_url_for(kind);
    let model = endpoint.model_for(kind);
    match kind {
        ProviderKind::Gemini => Arc::new(GeminiInvoker::new(api_key.to_string(), model, base_url)),
        ProviderKind::DeepSeek | ProviderKind::Perplexity | ProviderKind::OpenAi => Arc::new(
            ChatCompletionsInvoker::new(kind, api_key.to_string(), model, base_url),
        ),
    }
}

/// One handler per usable key, grouped under the provider id for stats.
pub fn build_key_handlers<F>(
    keys: &crate::config::ProviderKeys,
    endpoint_for: F,
) -> Result<Vec<Arc<Handler>>>
where
    F: Fn(ProviderKind) -> ProviderEndpoint,
{
    let mut handlers = Vec::new();
    for kind in keys.providers() {
        let endpoint = endpoint_for(kind);
        for (index, key) in keys.keys_for(kind).into_iter().enumerate() {
            let handler = Handler::builder(
                key_handler_id(kind, index),
                build_provider_invoker(kind, key, &endpoint),
            )
            .name(kind.display_name())
            .capabilities(kind.capabilities().iter().copied())
            .source(HandlerSource::AiProvider)
            .provider(kind.as_str())
            .priority(kind.priority())
            .build()?;
            handlers.push(Arc::new(handler));
        }
    }
    Ok(handlers)
}

/// Sends a JSON request, racing the caller's cancel signal. Non-2xx statuses
/// become `Http` errors carrying a truncated body. `api_key` is scrubbed from
/// every error message.
pub(crate) async fn send_json(
    label: &str,
    request: reqwest::RequestBuilder,
    api_key: &str,
    cancel: &crate::interfaces::handlers::CancelSignal,
) -> Result<serde_json::Value> {
    let http_error = |message: String| IfritError::Http(scrub_literal(&message, api_key));
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(IfritError::Cancelled),
        response = request.send() => response
            .map_err(|e| http_error(format!("{label} transport failed: {e}")))?,
    };
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| http_error(format!("{label} read failed: {e}")))?;
    if !status.is_success() {
        let snippet: String = body.chars().take(500).collect();
        return Err(http_error(format!("{label} failed ({status}): {snippet}")));
    }
    serde_json::from_str(&body)
        .map_err(|e| IfritError::Serialization(format!("{label} decode failed: {e}")))
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(PROVIDER_HTTP_TIMEOUT)
        .build()
        .map_err(|e| IfritError::Runtime(e.to_string()))
}

/// System prompt used when the request did not bring one.
pub(crate) fn system_prompt_for(invocation: &Invocation) -> String {
    if let Some(prompt) = invocation
        .system_prompt
        .as_deref()
        .filter(|prompt| !prompt.trim().is_empty())
    {
        return prompt.to_string();
    }
    match invocation.capability.as_str() {
        Capability::RESEARCH => "You are a research assistant. Report current, verifiable findings with sources where possible.",
        Capability::SUMMARIZE => "Summarize the provided content clearly and concisely.",
        Capability::KEYWORDS => "Suggest search keywords for the topic, one per line, without commentary.",
        Capability::TRANSLATE => "Translate the provided content faithfully, preserving formatting.",
        _ => "You are an expert content writer for niche blogs. Write clear, accurate, engaging copy.",
    }
    .to_string()
}
