use std::sync::Arc;

use crate::config::CapabilitiesConfig;
use crate::domains::execution::ExecuteRequest;
use crate::handlers::Handler;

#[derive(Debug, Clone)]
pub enum Eligibility {
    /// Ordered candidates; never empty.
    Candidates(Vec<Arc<Handler>>),
    Disabled,
    NoHandlers,
}

impl Eligibility {
    pub fn candidate_ids(&self) -> Vec<String> {
        match self {
            Self::Candidates(handlers) => handlers.iter().map(|h| h.id().to_string()).collect(),
            Self::Disabled | Self::NoHandlers => Vec::new(),
        }
    }
}

/// Orders the handlers able to serve `request`: the preferred (or configured
/// default) handler first, then configured fallbacks, then the rest by
/// descending priority.
pub fn resolve(
    request: &ExecuteRequest,
    handlers: &[Arc<Handler>],
    capabilities: &CapabilitiesConfig,
) -> Eligibility {
    let capability = &request.capability;
    if !capabilities.is_enabled(capability) {
        return Eligibility::Disabled;
    }

    let mut eligible: Vec<Arc<Handler>> = handlers
        .iter()
        .filter(|handler| handler.supports(capability) && handler.is_available())
        .cloned()
        .collect();
    if eligible.is_empty() {
        return Eligibility::NoHandlers;
    }

    // Stable: ties keep the caller's (registration) order.
    eligible.sort_by(|a, b| b.priority().cmp(&a.priority()));

    let setting = capabilities.setting(capability);
    let primary_id = request
        .preferred_handler
        .as_deref()
        .filter(|id| eligible.iter().any(|h| h.id() == *id))
        .or_else(|| {
            setting
                .default_handler_id
                .as_deref()
                .filter(|id| eligible.iter().any(|h| h.id() == *id))
        })
        .map(str::to_string);

    let mut ordered: Vec<Arc<Handler>> = Vec::with_capacity(eligible.len());

    match primary_id {
        Some(id) => {
            if let Some(handler) = eligible.iter().find(|h| h.id() == id) {
                push_unique(handler, &mut ordered);
            }
        }
        None => push_unique(&eligible[0], &mut ordered),
    }

    if !request.fallback_enabled() {
        return Eligibility::Candidates(ordered);
    }

    for fallback_id in &setting.fallback_handler_ids {
        if let Some(handler) = eligible.iter().find(|h| h.id() == fallback_id.as_str()) {
            push_unique(handler, &mut ordered);
        }
    }
    for handler in &eligible {
        push_unique(handler, &mut ordered);
    }

    Eligibility::Candidates(ordered)
}

fn push_unique(handler: &Arc<Handler>, ordered: &mut Vec<Arc<Handler>>) {
    if !ordered.iter().any(|existing| existing.id() == handler.id()) {
        ordered.push(handler.clone());
    }
}
