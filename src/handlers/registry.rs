use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::domains::capability::Capability;
use crate::handlers::Handler;

/// Authoritative handler list. Keeps first-registration order; replacing an
/// id keeps its original slot.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<Vec<Arc<Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub async fn register(&self, handler: Arc<Handler>) {
        let mut handlers = self.handlers.write().await;
        if let Some(slot) = handlers.iter_mut().find(|h| h.id() == handler.id()) {
            debug!(handler = handler.id(), "replacing registered handler");
            *slot = handler;
        } else {
            debug!(handler = handler.id(), "registering handler");
            handlers.push(handler);
        }
    }

    pub async fn register_all<I>(&self, handlers: I)
    where
        I: IntoIterator<Item = Arc<Handler>>,
    {
        for handler in handlers {
            self.register(handler).await;
        }
    }

    pub async fn list(&self) -> Vec<Arc<Handler>> {
        self.handlers.read().await.clone()
    }

    pub async fn list_for_capability(&self, capability: &Capability) -> Vec<Arc<Handler>> {
        let handlers = self.handlers.read().await;
        handlers
            .iter()
            .filter(|handler| handler.supports(capability))
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Handler>> {
        let handlers = self.handlers.read().await;
        handlers.iter().find(|handler| handler.id() == id).cloned()
    }

    /// Returns false when no handler has this id.
    pub async fn set_available(&self, id: &str, available: bool) -> bool {
        match self.get(id).await {
            Some(handler) => {
                handler.set_available(available);
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }
}
