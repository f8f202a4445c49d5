use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domains::capability::Capability;
use crate::error::{IfritError, Result};
use crate::providers::{ProviderEndpoint, ProviderKind};

pub const DEFAULT_MAX_RETRIES: u32 = 1;
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 60_000;

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_attempt_timeout_ms() -> u64 {
    DEFAULT_ATTEMPT_TIMEOUT_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CapabilitySetting {
    #[serde(default)]
    pub default_handler_id: Option<String>,
    #[serde(default)]
    pub fallback_handler_ids: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CapabilitySetting {
    fn default() -> Self {
        Self {
            default_handler_id: None,
            fallback_handler_ids: Vec::new(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CapabilitiesConfig {
    #[serde(default)]
    pub capability_settings: HashMap<Capability, CapabilitySetting>,
}

impl CapabilitiesConfig {
    /// Setting for a capability; absent entries are enabled with no overrides.
    pub fn setting(&self, capability: &Capability) -> CapabilitySetting {
        self.capability_settings
            .get(capability)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_enabled(&self, capability: &Capability) -> bool {
        self.capability_settings
            .get(capability)
            .map(|setting| setting.enabled)
            .unwrap_or(true)
    }

    pub fn with_setting(mut self, capability: impl Into<Capability>, setting: CapabilitySetting) -> Self {
        self.capability_settings.insert(capability.into(), setting);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (capability, setting) in &self.capability_settings {
            if capability.is_empty() {
                return Err(IfritError::Config(
                    "capability settings contain an empty capability id".to_string(),
                ));
            }
            if let Some(default_id) = &setting.default_handler_id {
                if default_id.trim().is_empty() {
                    return Err(IfritError::Config(format!(
                        "capability '{capability}' has an empty default_handler_id"
                    )));
                }
            }
            if setting
                .fallback_handler_ids
                .iter()
                .any(|id| id.trim().is_empty())
            {
                return Err(IfritError::Config(format!(
                    "capability '{capability}' lists an empty fallback handler id"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutorConfig {
    /// Extra attempts per handler after its first failure.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// Deadline for a single handler attempt; 0 disables it.
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    #[serde(default)]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_true")]
    pub log_to_console: bool,
    #[serde(default = "default_true")]
    pub log_diagnostics: bool,
    /// Unbounded unless set.
    #[serde(default)]
    pub max_log_entries: Option<usize>,
    #[serde(default)]
    pub endpoints: BTreeMap<ProviderKind, ProviderEndpoint>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_max_retries: DEFAULT_MAX_RETRIES,
            attempt_timeout_ms: DEFAULT_ATTEMPT_TIMEOUT_MS,
            retry_backoff_ms: 0,
            log_to_console: true,
            log_diagnostics: true,
            max_log_entries: None,
            endpoints: BTreeMap::new(),
        }
    }
}

impl ExecutorConfig {
    pub fn attempt_timeout(&self, override_ms: Option<u64>) -> Option<Duration> {
        match override_ms.unwrap_or(self.attempt_timeout_ms) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn retry_backoff(&self) -> Option<Duration> {
        (self.retry_backoff_ms > 0).then(|| Duration::from_millis(self.retry_backoff_ms))
    }

    pub fn endpoint(&self, kind: ProviderKind) -> ProviderEndpoint {
        self.endpoints.get(&kind).cloned().unwrap_or_default()
    }

    pub fn apply(&mut self, patch: ExecutorConfigPatch) {
        if let Some(value) = patch.default_max_retries {
            self.default_max_retries = value;
        }
        if let Some(value) = patch.attempt_timeout_ms {
            self.attempt_timeout_ms = value;
        }
        if let Some(value) = patch.retry_backoff_ms {
            self.retry_backoff_ms = value;
        }
        if let Some(value) = patch.log_to_console {
            self.log_to_console = value;
        }
        if let Some(value) = patch.log_diagnostics {
            self.log_diagnostics = value;
        }
        if let Some(value) = patch.max_log_entries {
            self.max_log_entries = value;
        }
        if let Some(endpoints) = patch.endpoints {
            self.endpoints.extend(endpoints);
        }
    }
}

/// Partial update for [`ExecutorConfig`]; unset fields are left alone.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExecutorConfigPatch {
    pub default_max_retries: Option<u32>,
    pub attempt_timeout_ms: Option<u64>,
    pub retry_backoff_ms: Option<u64>,
    pub log_to_console: Option<bool>,
    pub log_diagnostics: Option<bool>,
    /// `Some(None)` removes the cap.
    #[serde(default, with = "double_option")]
    pub max_log_entries: Option<Option<usize>>,
    pub endpoints: Option<BTreeMap<ProviderKind, ProviderEndpoint>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<Option<usize>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            None => serializer.serialize_none(),
            Some(inner) => inner.serialize(serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<usize>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<usize>::deserialize(deserializer).map(Some)
    }
}

/// Raw API keys per provider. Several keys for one provider rotate through
/// the fallback chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ProviderKeys(BTreeMap<ProviderKind, Vec<String>>);

impl ProviderKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, kind: ProviderKind, key: impl Into<String>) -> Self {
        self.insert(kind, key);
        self
    }

    pub fn insert(&mut self, kind: ProviderKind, key: impl Into<String>) {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return;
        }
        let keys = self.0.entry(kind).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    /// Distinct non-empty keys for a provider, in insertion order.
    pub fn keys_for(&self, kind: ProviderKind) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for key in self.0.get(&kind).into_iter().flatten() {
            let key = key.trim();
            if !key.is_empty() && !out.contains(&key) {
                out.push(key);
            }
        }
        out
    }

    pub fn providers(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        self.0.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|keys| keys.iter().all(|key| key.trim().is_empty()))
    }
}

fn default_health_interval_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub token: Option<String>,
    /// Period of the handler health check; 0 turns it off.
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            token: None,
            health_interval_secs: default_health_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
    #[serde(default)]
    pub providers: ProviderKeys,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            IfritError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Config =
            serde_json::from_str(raw).map_err(|e| IfritError::Config(e.to_string()))?;
        config.capabilities.validate()?;
        Ok(config)
    }

    /// Defaults used when no config file is given: generation prefers Gemini,
    /// research prefers Perplexity.
    pub fn convention_defaults() -> Self {
        let capabilities = CapabilitiesConfig::default()
            .with_setting(
                Capability::GENERATE,
                CapabilitySetting {
                    default_handler_id: Some(ProviderKind::Gemini.as_str().to_string()),
                    fallback_handler_ids: vec![
                        ProviderKind::DeepSeek.as_str().to_string(),
                        ProviderKind::OpenAi.as_str().to_string(),
                    ],
                    enabled: true,
                },
            )
            .with_setting(
                Capability::RESEARCH,
                CapabilitySetting {
                    default_handler_id: Some(ProviderKind::Perplexity.as_str().to_string()),
                    fallback_handler_ids: vec![ProviderKind::Gemini.as_str().to_string()],
                    enabled: true,
                },
            );
        Self {
            capabilities,
            ..Self::default()
        }
    }

    /// Fills missing keys and the daemon token from `IFRIT_*` variables.
    pub fn resolve_env(self) -> Self {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        for kind in ProviderKind::ALL {
            if !self.providers.keys_for(kind).is_empty() {
                continue;
            }
            if let Some(raw) = lookup(&kind.env_var()) {
                for key in raw.split(',') {
                    self.providers.insert(kind, key);
                }
            }
        }
        let token_missing = self
            .daemon
            .token
            .as_deref()
            .map(|token| token.trim().is_empty())
            .unwrap_or(true);
        if token_missing {
            if let Some(token) = lookup("IFRIT_DAEMON_TOKEN") {
                self.daemon.token = Some(token);
            }
        }
        self
    }
}
