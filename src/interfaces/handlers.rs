use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use crate::domains::capability::Capability;
use crate::domains::execution::{ExecuteRequest, HandlerOutput};
use crate::error::Result;

/// What a handler receives for a single attempt.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub capability: Capability,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub input: Option<Value>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub cancel: CancelSignal,
}

impl Invocation {
    pub fn from_request(request: &ExecuteRequest, cancel: CancelSignal) -> Self {
        Self {
            capability: request.capability.clone(),
            prompt: request.prompt.clone(),
            system_prompt: request.system_prompt.clone(),
            input: request.input.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            cancel,
        }
    }
}

#[async_trait]
pub trait HandlerInvoker: Send + Sync {
    async fn invoke(&self, invocation: &Invocation) -> Result<HandlerOutput>;

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Caller side of a cancellation channel.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observed by the executor between and during attempts, and handed to handlers.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolves once cancellation is requested. Pending forever otherwise.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return futures::future::pending::<()>().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Handle dropped without cancelling.
                return futures::future::pending::<()>().await;
            }
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_signal_fires_after_cancel() {
        let (handle, signal) = cancel_pair();
        assert!(!signal.is_cancelled());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancel observed")
            .unwrap();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn never_signal_stays_pending() {
        let signal = CancelSignal::never();
        let outcome = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(outcome.is_err());
    }
}
