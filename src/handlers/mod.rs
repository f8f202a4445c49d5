pub mod registry;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::domains::capability::{Capability, HandlerSource};
use crate::error::{IfritError, Result};
use crate::interfaces::handlers::HandlerInvoker;

/// A registered way of satisfying one or more capabilities.
pub struct Handler {
    id: String,
    name: String,
    capabilities: BTreeSet<Capability>,
    source: HandlerSource,
    provider: Option<String>,
    priority: i32,
    /// Operator switch, only flipped through `set_available`.
    enabled: AtomicBool,
    /// Last health check verdict.
    healthy: AtomicBool,
    invoker: Arc<dyn HandlerInvoker>,
}

impl Handler {
    pub fn builder(id: impl Into<String>, invoker: Arc<dyn HandlerInvoker>) -> HandlerBuilder {
        HandlerBuilder {
            id: id.into(),
            name: None,
            capabilities: BTreeSet::new(),
            source: HandlerSource::AiProvider,
            provider: None,
            priority: 0,
            available: true,
            invoker,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    pub fn supports(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn source(&self) -> HandlerSource {
        self.source
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Key used to group diagnostics: the provider, else the handler id.
    pub fn stats_key(&self) -> &str {
        self.provider.as_deref().unwrap_or(&self.id)
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Selectable only when enabled by the operator and last seen healthy.
    pub fn is_available(&self) -> bool {
        self.is_enabled() && self.is_healthy()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_available(&self, available: bool) {
        self.enabled.store(available, Ordering::Release);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
    }

    pub fn invoker(&self) -> &Arc<dyn HandlerInvoker> {
        &self.invoker
    }

    pub fn summary(&self) -> HandlerSummary {
        HandlerSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            capabilities: self.capabilities.iter().cloned().collect(),
            source: self.source,
            provider: self.provider.clone(),
            priority: self.priority,
            available: self.is_available(),
            enabled: self.is_enabled(),
            healthy: self.is_healthy(),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("source", &self.source)
            .field("provider", &self.provider)
            .field("priority", &self.priority)
            .field("enabled", &self.is_enabled())
            .field("healthy", &self.is_healthy())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HandlerSummary {
    pub id: String,
    pub name: String,
    pub capabilities: Vec<Capability>,
    pub source: HandlerSource,
    pub provider: Option<String>,
    pub priority: i32,
    pub available: bool,
    pub enabled: bool,
    pub healthy: bool,
}

pub struct HandlerBuilder {
    id: String,
    name: Option<String>,
    capabilities: BTreeSet<Capability>,
    source: HandlerSource,
    provider: Option<String>,
    priority: i32,
    available: bool,
    invoker: Arc<dyn HandlerInvoker>,
}

impl HandlerBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn capability(mut self, capability: impl Into<Capability>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn capabilities<I, C>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Capability>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn source(mut self, source: HandlerSource) -> Self {
        self.source = source;
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    pub fn build(mut self) -> Result<Handler> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(IfritError::InvalidHandler(
                "handler id must not be empty".to_string(),
            ));
        }
        self.capabilities.retain(|capability| !capability.is_empty());
        if self.capabilities.is_empty() {
            return Err(IfritError::InvalidHandler(format!(
                "handler '{id}' declares no capabilities"
            )));
        }
        let provider = self
            .provider
            .map(|provider| provider.trim().to_string())
            .filter(|provider| !provider.is_empty());
        Ok(Handler {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            capabilities: self.capabilities,
            source: self.source,
            provider,
            priority: self.priority,
            enabled: AtomicBool::new(self.available),
            healthy: AtomicBool::new(true),
            invoker: self.invoker,
        })
    }
}
