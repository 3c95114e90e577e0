//! Deterministic offline provider.
//!
//! Replies come from a queue of scripted answers first, then from a fallback
//! responder. Every prompt is recorded so callers can inspect what was asked.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::provider::{Provider, ProviderError, Result};

type Responder = dyn Fn(&str, &str) -> Result<String> + Send + Sync;

enum Scripted {
    Reply(String),
    Fail(String),
}

pub struct ScriptedProvider {
    queue: Mutex<VecDeque<Scripted>>,
    prompts: Mutex<Vec<String>>,
    fallback: Box<Responder>,
}

impl ScriptedProvider {
    /// Echo the prompt back once the queue is empty.
    pub fn echo() -> Self {
        Self::with_fallback(|_, prompt| Ok(format!("echo: {}", prompt)))
    }

    pub fn with_fallback<F>(fallback: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            queue: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            fallback: Box::new(fallback),
        }
    }

    /// Queue a reply for the next call.
    pub fn push_reply(&self, reply: impl Into<String>) -> &Self {
        lock(&self.queue).push_back(Scripted::Reply(reply.into()));
        self
    }

    /// Queue a failure for the next call.
    pub fn push_failure(&self, error: impl Into<String>) -> &Self {
        lock(&self.queue).push_back(Scripted::Fail(error.into()));
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn complete(
        &self,
        system_message: &str,
        prompt: &str,
        _model: Option<&str>,
    ) -> Result<String> {
        lock(&self.prompts).push(prompt.to_string());

        let next = lock(&self.queue).pop_front();
        match next {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail(e)) => Err(ProviderError::ApiError(e)),
            None => (self.fallback)(system_message, prompt),
        }
    }

    fn default_model(&self) -> Option<&str> {
        None
    }
}
