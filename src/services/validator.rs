use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::domains::capability::Capability;
use crate::domains::execution::HandlerOutput;

/// Returns `Some(reason)` to reject an apparently successful output.
pub type AcceptanceRule = Arc<dyn Fn(&HandlerOutput) -> Option<String> + Send + Sync>;

#[derive(Clone)]
pub struct ResultValidator {
    rules: HashMap<Capability, AcceptanceRule>,
}

impl Default for ResultValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultValidator {
    /// Validator with the built-in content rules.
    pub fn new() -> Self {
        let mut validator = Self::empty();
        for capability in [
            Capability::GENERATE,
            Capability::RESEARCH,
            Capability::SUMMARIZE,
            Capability::TRANSLATE,
        ] {
            validator.register_rule(capability, Arc::new(require_content));
        }
        validator.register_rule(Capability::KEYWORDS, Arc::new(require_keywords));
        validator
    }

    /// Validator that trusts every handler's own success flag.
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    pub fn register_rule(&mut self, capability: impl Into<Capability>, rule: AcceptanceRule) {
        self.rules.insert(capability.into(), rule);
    }

    /// `Err(reason)` when the output must be treated as a failed attempt.
    /// Only called for outputs whose `success` flag is set.
    pub fn validate(
        &self,
        capability: &Capability,
        output: &HandlerOutput,
    ) -> std::result::Result<(), String> {
        match self.rules.get(capability) {
            Some(rule) => match rule(output) {
                Some(reason) => Err(reason),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }
}

fn has_text(output: &HandlerOutput) -> bool {
    output
        .text
        .as_deref()
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false)
}

fn has_data(output: &HandlerOutput) -> bool {
    match &output.data {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

fn require_content(output: &HandlerOutput) -> Option<String> {
    if has_text(output) || has_data(output) {
        None
    } else {
        Some("empty result: handler returned no content".to_string())
    }
}

fn require_keywords(output: &HandlerOutput) -> Option<String> {
    let has_list = matches!(&output.data, Some(Value::Array(items)) if !items.is_empty());
    if has_text(output) || has_list {
        None
    } else {
        Some("empty result: no keywords returned".to_string())
    }
}
