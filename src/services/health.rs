use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;
use crate::handlers::registry::HandlerRegistry;
use crate::interfaces::scheduler::ScheduledJob;

/// Health-checks every registered handler and records the verdict. The
/// operator enable switch is left alone.
pub struct HandlerHealthJob {
    registry: Arc<HandlerRegistry>,
    interval: Duration,
}

impl HandlerHealthJob {
    pub fn new(registry: Arc<HandlerRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Runs one health round and returns how many handlers are available.
    pub async fn check_all(&self) -> usize {
        let mut available = 0;
        for handler in self.registry.list().await {
            let healthy = match handler.invoker().health_check().await {
                Ok(healthy) => healthy,
                Err(err) => {
                    warn!(handler = handler.id(), error = %err, "health check failed");
                    false
                }
            };
            if healthy != handler.is_healthy() {
                debug!(handler = handler.id(), healthy, "health changed");
            }
            handler.set_healthy(healthy);
            if handler.is_available() {
                available += 1;
            }
        }
        available
    }
}

#[async_trait]
impl ScheduledJob for HandlerHealthJob {
    fn name(&self) -> &str {
        "handler_health"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> Result<()> {
        let available = self.check_all().await;
        debug!(available, "handler health round finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::execution::HandlerOutput;
    use crate::error::IfritError;
    use crate::handlers::Handler;
    use crate::interfaces::handlers::{HandlerInvoker, Invocation};

    struct Checker(Option<bool>);

    #[async_trait]
    impl HandlerInvoker for Checker {
        async fn invoke(&self, _invocation: &Invocation) -> Result<HandlerOutput> {
            Ok(HandlerOutput::text("ok"))
        }

        async fn health_check(&self) -> Result<bool> {
            self.0
                .ok_or_else(|| IfritError::Http("connection refused".to_string()))
        }
    }

    fn handler(id: &str, health: Option<bool>) -> Arc<Handler> {
        Arc::new(
            Handler::builder(id, Arc::new(Checker(health)))
                .capability("generate")
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn errors_and_unhealthy_mark_unavailable() {
        let registry = Arc::new(HandlerRegistry::new());
        registry
            .register_all([
                handler("ok", Some(true)),
                handler("sick", Some(false)),
                handler("down", None),
            ])
            .await;
        let job = HandlerHealthJob::new(registry.clone(), Duration::from_secs(60));
        job.run().await.unwrap();

        assert!(registry.get("ok").await.unwrap().is_available());
        assert!(!registry.get("sick").await.unwrap().is_available());
        assert!(!registry.get("down").await.unwrap().is_available());
    }

    #[tokio::test]
    async fn recovered_handlers_come_back() {
        let registry = Arc::new(HandlerRegistry::new());
        let recovered = handler("ok", Some(true));
        recovered.set_healthy(false);
        registry.register(recovered).await;
        let job = HandlerHealthJob::new(registry.clone(), Duration::from_secs(60));
        assert_eq!(job.check_all().await, 1);
        assert!(registry.get("ok").await.unwrap().is_available());
    }

    #[tokio::test]
    async fn manually_disabled_handler_stays_disabled_after_health_round() {
        let registry = Arc::new(HandlerRegistry::new());
        registry
            .register_all([handler("a", Some(true)), handler("b", Some(true))])
            .await;
        assert!(registry.set_available("a", false).await);

        let job = HandlerHealthJob::new(registry.clone(), Duration::from_secs(60));
        assert_eq!(job.check_all().await, 1);

        let a = registry.get("a").await.unwrap();
        assert!(a.is_healthy());
        assert!(!a.is_available());
        assert!(registry.get("b").await.unwrap().is_available());
    }
}
