use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domains::capability::{Capability, HandlerSource};

/// One logical capability call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub capability: Capability,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub use_fallback: Option<bool>,
    #[serde(default)]
    pub preferred_handler: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ExecuteRequest {
    pub fn new(capability: impl Into<Capability>, prompt: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            prompt: prompt.into(),
            system_prompt: None,
            input: None,
            max_retries: None,
            use_fallback: None,
            preferred_handler: None,
            max_tokens: None,
            temperature: None,
            timeout_ms: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_fallback(mut self, use_fallback: bool) -> Self {
        self.use_fallback = Some(use_fallback);
        self
    }

    pub fn with_preferred_handler(mut self, handler_id: impl Into<String>) -> Self {
        self.preferred_handler = Some(handler_id.into());
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Fallback is on unless the caller explicitly turned it off.
    pub fn fallback_enabled(&self) -> bool {
        self.use_fallback.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Raw result produced by a handler, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerOutput {
    pub success: bool,
    pub text: Option<String>,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub usage: Option<Usage>,
}

impl HandlerOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn data(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = Some(Usage {
            input_tokens,
            output_tokens,
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Invocation returned an error (network, non-2xx, decode).
    Transport,
    Timeout,
    /// Handler answered but flagged its own result as failed.
    Handler,
    Validation,
    Cancelled,
    /// Execution never reached a handler.
    Rejected,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::Handler => "handler",
            Self::Validation => "validation",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub handler_id: String,
    /// 1-based attempt number for this handler.
    pub attempt: u32,
    pub latency_ms: u64,
    pub success: bool,
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionDiagnostics {
    pub capability: Option<Capability>,
    pub candidates: Vec<String>,
    pub attempts: Vec<AttemptSummary>,
}

/// Terminal outcome of one `execute` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub success: bool,
    pub text: Option<String>,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub handler_used: Option<String>,
    pub source: Option<HandlerSource>,
    pub latency_ms: u64,
    pub usage: Option<Usage>,
    pub diagnostics: Option<ExecutionDiagnostics>,
    #[serde(default)]
    pub fallbacks_attempted: Vec<String>,
}

impl ExecuteResult {
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            error: Some(if error.trim().is_empty() {
                "Execution failed".to_string()
            } else {
                error
            }),
            ..Self::default()
        }
    }
}
