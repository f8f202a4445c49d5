use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::domains::execution::{HandlerOutput, Usage};
use crate::error::{IfritError, Result};
use crate::interfaces::handlers::{CancelSignal, HandlerInvoker, Invocation};
use crate::providers::{http_client, send_json, system_prompt_for, ProviderKind};

/// OpenAI-compatible `/chat/completions` endpoint (OpenAI, DeepSeek, Perplexity).
#[derive(Clone)]
pub struct ChatCompletionsInvoker {
    kind: ProviderKind,
    api_key: String,
    model: String,
    base_url: String,
}

impl ChatCompletionsInvoker {
    pub fn new(kind: ProviderKind, api_key: String, model: String, base_url: String) -> Self {
        Self {
            kind,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_system_message(system_prompt: &str) -> Result<Option<ChatCompletionRequestMessage>> {
        if system_prompt.is_empty() {
            return Ok(None);
        }
        let message = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(|e| IfritError::Runtime(e.to_string()))?;
        Ok(Some(ChatCompletionRequestMessage::System(message)))
    }

    fn build_user_text_message(prompt: &str) -> Result<ChatCompletionRequestMessage> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Text(
                prompt.to_string(),
            ))
            .build()
            .map_err(|e| IfritError::Runtime(e.to_string()))?;
        Ok(ChatCompletionRequestMessage::User(message))
    }

    fn build_payload(&self, invocation: &Invocation) -> Result<Value> {
        let mut messages = Vec::new();
        if let Some(system) = Self::build_system_message(&system_prompt_for(invocation))? {
            messages.push(system);
        }
        messages.push(Self::build_user_text_message(&invocation.prompt)?);

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(self.model.clone());
        builder.messages(messages);
        if let Some(temperature) = invocation.temperature {
            builder.temperature(temperature);
        }
        let request = builder
            .build()
            .map_err(|e| IfritError::Runtime(e.to_string()))?;

        let mut payload = serde_json::to_value(&request)?;
        // DeepSeek and Perplexity only understand the classic field.
        if let (Some(max_tokens), Some(object)) = (invocation.max_tokens, payload.as_object_mut()) {
            object.insert("max_tokens".to_string(), json!(max_tokens));
        }
        Ok(payload)
    }

    fn extract_text(response: &Value) -> Option<String> {
        response
            .get("choices")
            .and_then(|v| v.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(|text| text.to_string())
    }

    fn extract_usage(response: &Value) -> Option<Usage> {
        let usage = response.get("usage")?;
        Some(Usage {
            input_tokens: usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
            output_tokens: usage
                .get("completion_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        })
    }

    async fn chat_completion(&self, payload: &Value, cancel: &CancelSignal) -> Result<Value> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = http_client()?
            .post(url)
            .bearer_auth(&self.api_key)
            .json(payload);
        let label = format!("{} chat completion", self.kind);
        send_json(&label, request, &self.api_key, cancel).await
    }
}

#[async_trait]
impl HandlerInvoker for ChatCompletionsInvoker {
    async fn invoke(&self, invocation: &Invocation) -> Result<HandlerOutput> {
        let payload = self.build_payload(invocation)?;
        let response = self.chat_completion(&payload, &invocation.cancel).await?;
        debug!(provider = %self.kind, model = %self.model, "chat completion returned");

        let text = Self::extract_text(&response).unwrap_or_default();
        let mut output = HandlerOutput::text(text);
        output.usage = Self::extract_usage(&response);
        if let Some(citations) = response.get("citations").filter(|c| c.is_array()) {
            output.data = Some(json!({ "citations": citations }));
        }
        Ok(output)
    }

    async fn health_check(&self) -> Result<bool> {
        if self.api_key.trim().is_empty() {
            return Ok(false);
        }
        // Perplexity exposes no model listing endpoint.
        if self.kind == ProviderKind::Perplexity {
            return Ok(true);
        }
        let response = http_client()?
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::capability::Capability;

    fn invocation(capability: &str, prompt: &str) -> Invocation {
        Invocation {
            capability: Capability::new(capability),
            prompt: prompt.to_string(),
            system_prompt: None,
            input: None,
            max_tokens: Some(256),
            temperature: Some(0.2),
            cancel: CancelSignal::never(),
        }
    }

    #[test]
    fn payload_carries_model_messages_and_limits() {
        let invoker = ChatCompletionsInvoker::new(
            ProviderKind::DeepSeek,
            "key".to_string(),
            "deepseek-chat".to_string(),
            "http://localhost/".to_string(),
        );
        let payload = invoker
            .build_payload(&invocation("summarize", "long text"))
            .unwrap();
        assert_eq!(payload["model"], json!("deepseek-chat"));
        assert_eq!(payload["max_tokens"], json!(256));
        let messages = payload["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], json!("system"));
        assert_eq!(messages[1]["role"], json!("user"));
    }

    #[test]
    fn extracts_text_and_usage() {
        let response = json!({
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        });
        assert_eq!(
            ChatCompletionsInvoker::extract_text(&response).as_deref(),
            Some("hello")
        );
        assert_eq!(
            ChatCompletionsInvoker::extract_usage(&response),
            Some(Usage {
                input_tokens: 12,
                output_tokens: 3
            })
        );
        assert!(ChatCompletionsInvoker::extract_usage(&json!({})).is_none());
    }
}
