#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ifrit::domains::execution::HandlerOutput;
use ifrit::error::{IfritError, Result};
use ifrit::handlers::Handler;
use ifrit::interfaces::handlers::{HandlerInvoker, Invocation};

#[derive(Clone)]
pub enum Step {
    Reply(HandlerOutput),
    Fail(String),
    Hang,
    Slow(Duration, HandlerOutput),
}

/// Plays `steps` in order; the last step repeats once the script runs out.
pub struct ScriptedInvoker {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: AtomicUsize,
}

impl ScriptedInvoker {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn always(step: Step) -> Arc<Self> {
        Self::new(vec![step])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let next = self.steps.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last.clone().unwrap_or(Step::Fail("script exhausted".to_string())),
        }
    }
}

#[async_trait]
impl HandlerInvoker for ScriptedInvoker {
    async fn invoke(&self, _invocation: &Invocation) -> Result<HandlerOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Step::Reply(output) => Ok(output),
            Step::Fail(message) => Err(IfritError::Http(message)),
            Step::Hang => futures::future::pending().await,
            Step::Slow(delay, output) => {
                tokio::time::sleep(delay).await;
                Ok(output)
            }
        }
    }
}

pub fn ok(text: &str) -> Step {
    Step::Reply(HandlerOutput::text(text))
}

pub fn fail(message: &str) -> Step {
    Step::Fail(message.to_string())
}

pub fn handler(
    id: &str,
    capability: &str,
    priority: i32,
    invoker: Arc<ScriptedInvoker>,
) -> Arc<Handler> {
    Arc::new(
        Handler::builder(id, invoker)
            .capability(capability)
            .priority(priority)
            .build()
            .unwrap(),
    )
}

pub fn provider_handler(
    id: &str,
    provider: &str,
    capability: &str,
    invoker: Arc<ScriptedInvoker>,
) -> Arc<Handler> {
    Arc::new(
        Handler::builder(id, invoker)
            .capability(capability)
            .provider(provider)
            .build()
            .unwrap(),
    )
}
