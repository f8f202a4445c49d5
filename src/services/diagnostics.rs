use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::domains::capability::Capability;
use crate::domains::execution::FailureKind;

/// One logged attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsRecord {
    pub provider_id: String,
    pub handler_id: Option<String>,
    pub capability: Capability,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    pub latency_ms: u64,
    pub success: bool,
    pub tokens_input: u64,
    pub tokens_output: u64,
    /// Set on every failed record; `rejected` when no handler ran.
    #[serde(default)]
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStats {
    pub calls: u64,
    pub errors: u64,
    /// 0-100, rounded.
    pub success_rate: u32,
}

/// Append-only attempt log shared by concurrent executions.
#[derive(Debug, Default)]
pub struct DiagnosticsLog {
    entries: Mutex<Vec<DiagnosticsRecord>>,
    max_entries: Mutex<Option<usize>>,
}

impl DiagnosticsLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log that drops its oldest entries beyond `max_entries`.
    pub fn bounded(max_entries: usize) -> Self {
        let log = Self::default();
        log.set_max_entries(Some(max_entries));
        log
    }

    fn lock_entries(&self) -> MutexGuard<'_, Vec<DiagnosticsRecord>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cap(&self) -> Option<usize> {
        *self
            .max_entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_max_entries(&self, max_entries: Option<usize>) {
        *self
            .max_entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = max_entries;
        if let Some(max) = max_entries {
            let mut entries = self.lock_entries();
            Self::trim(&mut entries, max);
        }
    }

    fn trim(entries: &mut Vec<DiagnosticsRecord>, max: usize) {
        if entries.len() > max {
            let excess = entries.len() - max;
            entries.drain(..excess);
        }
    }

    pub fn record(&self, entry: DiagnosticsRecord) {
        let cap = self.cap();
        let mut entries = self.lock_entries();
        entries.push(entry);
        if let Some(max) = cap {
            Self::trim(&mut entries, max);
        }
    }

    /// Records in insertion order.
    pub fn entries(&self) -> Vec<DiagnosticsRecord> {
        self.lock_entries().clone()
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    pub fn provider_stats(&self) -> BTreeMap<String, ProviderStats> {
        let entries = self.lock_entries();
        compute_provider_stats(&entries)
    }
}

pub fn compute_provider_stats(entries: &[DiagnosticsRecord]) -> BTreeMap<String, ProviderStats> {
    let mut counts: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for entry in entries {
        let slot = counts.entry(entry.provider_id.clone()).or_default();
        slot.0 += 1;
        if !entry.success {
            slot.1 += 1;
        }
    }
    counts
        .into_iter()
        .map(|(provider, (calls, errors))| {
            let success_rate = if calls == 0 {
                0
            } else {
                ((calls - errors) as f64 * 100.0 / calls as f64).round() as u32
            };
            (
                provider,
                ProviderStats {
                    calls,
                    errors,
                    success_rate,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(provider: &str, success: bool) -> DiagnosticsRecord {
        DiagnosticsRecord {
            provider_id: provider.to_string(),
            handler_id: Some(provider.to_string()),
            capability: Capability::generate(),
            timestamp: 0,
            latency_ms: 5,
            success,
            tokens_input: 1,
            tokens_output: 1,
            failure: (!success).then_some(FailureKind::Handler),
            error: (!success).then(|| "boom".to_string()),
        }
    }

    #[test]
    fn stats_group_by_provider_and_round() {
        let log = DiagnosticsLog::new();
        log.record(record("gemini", true));
        log.record(record("gemini", false));
        log.record(record("gemini", true));
        log.record(record("deepseek", false));

        let stats = log.provider_stats();
        assert_eq!(
            stats["gemini"],
            ProviderStats {
                calls: 3,
                errors: 1,
                success_rate: 67
            }
        );
        assert_eq!(stats["deepseek"].success_rate, 0);
        assert_eq!(log.provider_stats(), stats);
    }

    #[test]
    fn clear_empties_log() {
        let log = DiagnosticsLog::new();
        log.record(record("a", true));
        assert_eq!(log.len(), 1);
        log.clear();
        assert!(log.is_empty());
        assert!(log.provider_stats().is_empty());
    }

    #[test]
    fn bounded_log_drops_oldest() {
        let log = DiagnosticsLog::bounded(2);
        log.record(record("a", true));
        log.record(record("b", true));
        log.record(record("c", true));
        let providers: Vec<String> = log.entries().into_iter().map(|e| e.provider_id).collect();
        assert_eq!(providers, vec!["b", "c"]);
    }

    #[test]
    fn concurrent_writers_lose_nothing() {
        let log = std::sync::Arc::new(DiagnosticsLog::new());
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        log.record(record(&format!("p{i}"), true));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(log.len(), 400);
    }
}
