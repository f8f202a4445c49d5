use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::domains::execution::{HandlerOutput, Usage};
use crate::error::Result;
use crate::interfaces::handlers::{HandlerInvoker, Invocation};
use crate::providers::{http_client, send_json, system_prompt_for};

/// Google Gemini `generateContent`.
#[derive(Clone)]
pub struct GeminiInvoker {
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiInvoker {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn build_payload(invocation: &Invocation) -> Value {
        let mut generation = serde_json::Map::new();
        if let Some(max_tokens) = invocation.max_tokens {
            generation.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if let Some(temperature) = invocation.temperature {
            generation.insert("temperature".to_string(), json!(temperature));
        }

        let mut payload = json!({
            "systemInstruction": {"parts": [{"text": system_prompt_for(invocation)}]},
            "contents": [{"role": "user", "parts": [{"text": invocation.prompt}]}],
        });
        if !generation.is_empty() {
            payload["generationConfig"] = Value::Object(generation);
        }
        payload
    }

    /// Concatenates every text part of the first candidate.
    fn extract_text(response: &Value) -> Option<String> {
        let parts = response
            .get("candidates")
            .and_then(|v| v.get(0))
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(|parts| parts.as_array())?;
        let text: String = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
            .collect();
        Some(text)
    }

    fn extract_usage(response: &Value) -> Option<Usage> {
        let usage = response.get("usageMetadata")?;
        Some(Usage {
            input_tokens: usage
                .get("promptTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            output_tokens: usage
                .get("candidatesTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        })
    }

    fn blocked_reason(response: &Value) -> Option<String> {
        response
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(|reason| reason.as_str())
            .map(|reason| format!("Gemini blocked the prompt: {reason}"))
    }
}

#[async_trait]
impl HandlerInvoker for GeminiInvoker {
    async fn invoke(&self, invocation: &Invocation) -> Result<HandlerOutput> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = http_client()?
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_payload(invocation));
        let response = send_json(
            "gemini generateContent",
            request,
            &self.api_key,
            &invocation.cancel,
        )
        .await?;
        debug!(model = %self.model, "gemini returned");

        if let Some(reason) = Self::blocked_reason(&response) {
            return Ok(HandlerOutput::failure(reason));
        }
        let mut output = HandlerOutput::text(Self::extract_text(&response).unwrap_or_default());
        output.usage = Self::extract_usage(&response);
        Ok(output)
    }

    async fn health_check(&self) -> Result<bool> {
        if self.api_key.trim().is_empty() {
            return Ok(false);
        }
        let response = http_client()?
            .get(format!("{}/models/{}", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::capability::Capability;
    use crate::interfaces::handlers::CancelSignal;

    #[test]
    fn payload_includes_generation_config_only_when_set() {
        let mut invocation = Invocation {
            capability: Capability::generate(),
            prompt: "write about bonsai".to_string(),
            system_prompt: Some("be brief".to_string()),
            input: None,
            max_tokens: None,
            temperature: None,
            cancel: CancelSignal::never(),
        };
        let payload = GeminiInvoker::build_payload(&invocation);
        assert!(payload.get("generationConfig").is_none());
        assert_eq!(
            payload["systemInstruction"]["parts"][0]["text"],
            json!("be brief")
        );

        invocation.max_tokens = Some(100);
        let payload = GeminiInvoker::build_payload(&invocation);
        assert_eq!(payload["generationConfig"]["maxOutputTokens"], json!(100));
    }

    #[test]
    fn joins_text_parts_and_reads_usage() {
        let response = json!({
            "candidates": [{"content": {"parts": [{"text": "Hello, "}, {"text": "world"}]}}],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2}
        });
        assert_eq!(
            GeminiInvoker::extract_text(&response).as_deref(),
            Some("Hello, world")
        );
        assert_eq!(
            GeminiInvoker::extract_usage(&response),
            Some(Usage {
                input_tokens: 4,
                output_tokens: 2
            })
        );
        assert!(GeminiInvoker::blocked_reason(&response).is_none());
    }
}
