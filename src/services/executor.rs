use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{CapabilitiesConfig, ExecutorConfig, ExecutorConfigPatch, ProviderKeys};
use crate::domains::capability::Capability;
use crate::domains::execution::{
    AttemptSummary, ExecuteRequest, ExecuteResult, ExecutionDiagnostics, FailureKind,
    HandlerOutput,
};
use crate::error::{IfritError, Result};
use crate::handlers::registry::HandlerRegistry;
use crate::handlers::Handler;
use crate::interfaces::handlers::{CancelSignal, Invocation};
use crate::providers::build_key_handlers;
use crate::security::redact::redact_secrets;
use crate::services::diagnostics::{DiagnosticsLog, DiagnosticsRecord, ProviderStats};
use crate::services::eligibility::{resolve, Eligibility};
use crate::services::validator::ResultValidator;

/// Provider id used for records written when no handler was reached.
pub const EXECUTOR_PROVIDER_ID: &str = "executor";

enum AttemptOutcome {
    Accepted(HandlerOutput),
    Failed {
        kind: FailureKind,
        message: String,
        output: Option<HandlerOutput>,
    },
}

/// Dispatches capability requests to handlers with retry and ordered fallback.
pub struct CapabilityExecutor {
    registry: Arc<HandlerRegistry>,
    validator: ResultValidator,
    diagnostics: Arc<DiagnosticsLog>,
    config: RwLock<ExecutorConfig>,
}

impl Default for CapabilityExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

impl CapabilityExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self::with_registry(Arc::new(HandlerRegistry::new()), config)
    }

    pub fn with_registry(registry: Arc<HandlerRegistry>, config: ExecutorConfig) -> Self {
        let diagnostics = Arc::new(DiagnosticsLog::new());
        diagnostics.set_max_entries(config.max_log_entries);
        Self {
            registry,
            validator: ResultValidator::new(),
            diagnostics,
            config: RwLock::new(config),
        }
    }

    pub fn with_validator(mut self, validator: ResultValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn config(&self) -> ExecutorConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Merges `patch` into the live config; later executions pick it up.
    pub fn update_config(&self, patch: ExecutorConfigPatch) -> ExecutorConfig {
        let updated = {
            let mut config = self
                .config
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            config.apply(patch);
            config.clone()
        };
        self.diagnostics.set_max_entries(updated.max_log_entries);
        info!(
            default_max_retries = updated.default_max_retries,
            attempt_timeout_ms = updated.attempt_timeout_ms,
            "executor config updated"
        );
        updated
    }

    pub fn diagnostics_log(&self) -> Vec<DiagnosticsRecord> {
        self.diagnostics.entries()
    }

    pub fn clear_diagnostics_log(&self) {
        self.diagnostics.clear();
    }

    pub fn provider_stats(&self) -> std::collections::BTreeMap<String, ProviderStats> {
        self.diagnostics.provider_stats()
    }

    pub async fn execute(
        &self,
        request: &ExecuteRequest,
        handlers: &[Arc<Handler>],
        capabilities: &CapabilitiesConfig,
    ) -> Result<ExecuteResult> {
        self.execute_with_cancel(request, handlers, capabilities, CancelSignal::never())
            .await
    }

    /// Runs against the handlers currently in the executor's registry.
    pub async fn execute_registered(
        &self,
        request: &ExecuteRequest,
        capabilities: &CapabilitiesConfig,
    ) -> Result<ExecuteResult> {
        let handlers = self.registry.list_for_capability(&request.capability).await;
        self.execute(request, &handlers, capabilities).await
    }

    /// Builds one handler per key and runs against those only.
    pub async fn execute_with_keys(
        &self,
        request: &ExecuteRequest,
        keys: &ProviderKeys,
        capabilities: &CapabilitiesConfig,
    ) -> Result<ExecuteResult> {
        let config = self.config();
        let handlers = build_key_handlers(keys, |kind| config.endpoint(kind))?;
        debug!(
            capability = %request.capability,
            handlers = handlers.len(),
            "built key handlers"
        );
        self.execute(request, &handlers, capabilities).await
    }

    pub async fn execute_with_cancel(
        &self,
        request: &ExecuteRequest,
        handlers: &[Arc<Handler>],
        capabilities: &CapabilitiesConfig,
        cancel: CancelSignal,
    ) -> Result<ExecuteResult> {
        capabilities.validate()?;
        let started = Instant::now();
        let config = self.config();
        let capability = request.capability.clone();

        let candidates = match resolve(request, handlers, capabilities) {
            Eligibility::Candidates(candidates) => candidates,
            Eligibility::Disabled => {
                let message = format!("Capability '{capability}' is disabled");
                return Ok(self.reject(&config, &capability, message, started));
            }
            Eligibility::NoHandlers => {
                let message = format!("No handlers available for capability '{capability}'");
                return Ok(self.reject(&config, &capability, message, started));
            }
        };

        let max_retries = request.max_retries.unwrap_or(config.default_max_retries);
        let timeout = config.attempt_timeout(request.timeout_ms);
        let invocation = Invocation::from_request(request, cancel.clone());

        let mut diagnostics = ExecutionDiagnostics {
            capability: Some(capability.clone()),
            candidates: candidates.iter().map(|h| h.id().to_string()).collect(),
            attempts: Vec::new(),
        };
        let mut fallbacks_attempted: Vec<String> = Vec::new();
        let mut last_error: Option<String> = None;

        for handler in &candidates {
            for attempt in 1..=max_retries.saturating_add(1) {
                if attempt > 1 {
                    if let Some(backoff) = config.retry_backoff() {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {}
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                }
                if cancel.is_cancelled() {
                    if attempt > 1 {
                        fallbacks_attempted.push(handler.id().to_string());
                    }
                    return Ok(Self::cancelled(
                        diagnostics,
                        fallbacks_attempted,
                        started,
                    ));
                }

                let attempt_started = Instant::now();
                let outcome = self
                    .run_attempt(handler, &invocation, timeout, &cancel)
                    .await;
                let latency_ms = elapsed_ms(attempt_started);

                match outcome {
                    AttemptOutcome::Accepted(output) => {
                        self.record_attempt(&config, handler, &capability, latency_ms, Some(&output), None);
                        diagnostics.attempts.push(AttemptSummary {
                            handler_id: handler.id().to_string(),
                            attempt,
                            latency_ms,
                            success: true,
                            failure: None,
                            error: None,
                        });
                        if config.log_to_console {
                            debug!(
                                capability = %capability,
                                handler = handler.id(),
                                attempt,
                                latency_ms,
                                "attempt succeeded"
                            );
                        }
                        return Ok(ExecuteResult {
                            success: true,
                            text: output.text,
                            data: output.data,
                            error: None,
                            handler_used: Some(handler.id().to_string()),
                            source: Some(handler.source()),
                            latency_ms: elapsed_ms(started),
                            usage: output.usage,
                            diagnostics: Some(diagnostics),
                            fallbacks_attempted,
                        });
                    }
                    AttemptOutcome::Failed {
                        kind,
                        message,
                        output,
                    } => {
                        let message = redact_secrets(&message);
                        self.record_attempt(
                            &config,
                            handler,
                            &capability,
                            latency_ms,
                            output.as_ref(),
                            Some((kind, &message)),
                        );
                        diagnostics.attempts.push(AttemptSummary {
                            handler_id: handler.id().to_string(),
                            attempt,
                            latency_ms,
                            success: false,
                            failure: Some(kind),
                            error: Some(message.clone()),
                        });
                        if config.log_to_console {
                            warn!(
                                capability = %capability,
                                handler = handler.id(),
                                attempt,
                                kind = kind.as_str(),
                                error = %message,
                                "attempt failed"
                            );
                        }
                        if kind == FailureKind::Cancelled {
                            fallbacks_attempted.push(handler.id().to_string());
                            return Ok(Self::cancelled(
                                diagnostics,
                                fallbacks_attempted,
                                started,
                            ));
                        }
                        last_error = Some(message);
                    }
                }
            }
            fallbacks_attempted.push(handler.id().to_string());
        }

        let error = last_error
            .unwrap_or_else(|| format!("All handlers failed for capability '{capability}'"));
        if config.log_to_console {
            warn!(
                capability = %capability,
                tried = ?fallbacks_attempted,
                "all handlers exhausted"
            );
        }
        Ok(ExecuteResult {
            latency_ms: elapsed_ms(started),
            diagnostics: Some(diagnostics),
            fallbacks_attempted,
            ..ExecuteResult::failed(error)
        })
    }

    async fn run_attempt(
        &self,
        handler: &Handler,
        invocation: &Invocation,
        timeout: Option<Duration>,
        cancel: &CancelSignal,
    ) -> AttemptOutcome {
        let guarded = async {
            let call = handler.invoker().invoke(invocation);
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(IfritError::Timeout(limit.as_millis() as u64)),
                },
                None => call.await,
            }
        };
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(IfritError::Cancelled),
            result = guarded => result,
        };

        match result {
            Err(IfritError::Cancelled) => AttemptOutcome::Failed {
                kind: FailureKind::Cancelled,
                message: IfritError::Cancelled.to_string(),
                output: None,
            },
            Err(err @ IfritError::Timeout(_)) => AttemptOutcome::Failed {
                kind: FailureKind::Timeout,
                message: err.to_string(),
                output: None,
            },
            Err(err) => AttemptOutcome::Failed {
                kind: FailureKind::Transport,
                message: err.to_string(),
                output: None,
            },
            Ok(output) if !output.success => AttemptOutcome::Failed {
                kind: FailureKind::Handler,
                message: output
                    .error
                    .clone()
                    .filter(|error| !error.trim().is_empty())
                    .unwrap_or_else(|| "Handler reported failure".to_string()),
                output: Some(output),
            },
            Ok(output) => match self.validator.validate(&invocation.capability, &output) {
                Ok(()) => AttemptOutcome::Accepted(output),
                Err(reason) => AttemptOutcome::Failed {
                    kind: FailureKind::Validation,
                    message: reason,
                    output: Some(output),
                },
            },
        }
    }

    fn record_attempt(
        &self,
        config: &ExecutorConfig,
        handler: &Handler,
        capability: &Capability,
        latency_ms: u64,
        output: Option<&HandlerOutput>,
        failure: Option<(FailureKind, &str)>,
    ) {
        if !config.log_diagnostics {
            return;
        }
        let usage = output.and_then(|output| output.usage).unwrap_or_default();
        self.diagnostics.record(DiagnosticsRecord {
            provider_id: handler.stats_key().to_string(),
            handler_id: Some(handler.id().to_string()),
            capability: capability.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            latency_ms,
            success: failure.is_none(),
            tokens_input: usage.input_tokens,
            tokens_output: usage.output_tokens,
            failure: failure.map(|(kind, _)| kind),
            error: failure.map(|(_, message)| message.to_string()),
        });
    }

    fn reject(
        &self,
        config: &ExecutorConfig,
        capability: &Capability,
        message: String,
        started: Instant,
    ) -> ExecuteResult {
        if config.log_diagnostics {
            self.diagnostics.record(DiagnosticsRecord {
                provider_id: EXECUTOR_PROVIDER_ID.to_string(),
                handler_id: None,
                capability: capability.clone(),
                timestamp: chrono::Utc::now().timestamp_millis(),
                latency_ms: 0,
                success: false,
                tokens_input: 0,
                tokens_output: 0,
                failure: Some(FailureKind::Rejected),
                error: Some(message.clone()),
            });
        }
        if config.log_to_console {
            warn!(capability = %capability, error = %message, "execution rejected");
        }
        ExecuteResult {
            latency_ms: elapsed_ms(started),
            diagnostics: Some(ExecutionDiagnostics {
                capability: Some(capability.clone()),
                ..ExecutionDiagnostics::default()
            }),
            ..ExecuteResult::failed(message)
        }
    }

    fn cancelled(
        diagnostics: ExecutionDiagnostics,
        fallbacks_attempted: Vec<String>,
        started: Instant,
    ) -> ExecuteResult {
        ExecuteResult {
            latency_ms: elapsed_ms(started),
            diagnostics: Some(diagnostics),
            fallbacks_attempted,
            ..ExecuteResult::failed("Execution cancelled")
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::handlers::HandlerInvoker;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl HandlerInvoker for Echo {
        async fn invoke(&self, invocation: &Invocation) -> Result<HandlerOutput> {
            Ok(HandlerOutput::text(invocation.prompt.clone()).with_usage(3, 5))
        }
    }

    fn echo(id: &str) -> Arc<Handler> {
        Arc::new(
            Handler::builder(id, Arc::new(Echo))
                .capability("generate")
                .provider("local-echo")
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn success_records_usage_under_provider_key() {
        let executor = CapabilityExecutor::default();
        let result = executor
            .execute(
                &ExecuteRequest::new("generate", "hello"),
                &[echo("echo")],
                &CapabilitiesConfig::default(),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.text.as_deref(), Some("hello"));

        let log = executor.diagnostics_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].provider_id, "local-echo");
        assert_eq!(log[0].tokens_output, 5);
    }

    #[tokio::test]
    async fn diagnostics_can_be_switched_off() {
        let executor = CapabilityExecutor::default();
        executor.update_config(ExecutorConfigPatch {
            log_diagnostics: Some(false),
            ..ExecutorConfigPatch::default()
        });
        executor
            .execute(
                &ExecuteRequest::new("generate", "hello"),
                &[echo("echo")],
                &CapabilitiesConfig::default(),
            )
            .await
            .unwrap();
        assert!(executor.diagnostics_log().is_empty());
    }

    #[tokio::test]
    async fn malformed_capabilities_config_is_an_error() {
        let executor = CapabilityExecutor::default();
        let config = CapabilitiesConfig::default().with_setting(
            "generate",
            crate::config::CapabilitySetting {
                default_handler_id: Some(" ".to_string()),
                ..Default::default()
            },
        );
        let err = executor
            .execute(&ExecuteRequest::new("generate", "x"), &[echo("echo")], &config)
            .await
            .unwrap_err();
        assert!(matches!(err, IfritError::Config(_)));
    }
}
