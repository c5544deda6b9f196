//! In-memory test doubles.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use crate::client::{ChatMessage, ChatOptions, ModelClient};
use crate::errors::{ErrorKind, TransportError};
use crate::fallback::Sleeper;

/// One call observed by a [`ScriptedClient`].
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Model the call was addressed to.
    pub model: String,
    /// Messages sent.
    pub messages: Vec<ChatMessage>,
    /// Sampling options sent.
    pub options: ChatOptions,
}

impl CallRecord {
    /// Returns the content of the last message.
    #[must_use]
    pub fn last_content(&self) -> &str {
        self.messages.last().map_or("", |m| m.content.as_str())
    }
}

/// A model client driven by per-model scripts.
///
/// For each call the client answers, in order of precedence:
/// 1. the next queued response scripted for the model,
/// 2. a permanent failure registered for the model,
/// 3. the default reply `"<model> output <n>"` where `n` counts all calls.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, TransportError>>>>,
    failures: Mutex<HashMap<String, ErrorKind>>,
    available: Mutex<Option<HashSet<String>>>,
    unreachable: Mutex<bool>,
    calls: Mutex<Vec<CallRecord>>,
}

impl ScriptedClient {
    /// Creates a client where every model answers with the default reply.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call to `model` fail with `kind`.
    #[must_use]
    pub fn always_fail(self, model: impl Into<String>, kind: ErrorKind) -> Self {
        self.failures.lock().insert(model.into(), kind);
        self
    }

    /// Queues responses for `model`, consumed one per call.
    #[must_use]
    pub fn script(
        self,
        model: impl Into<String>,
        responses: Vec<Result<String, TransportError>>,
    ) -> Self {
        self.scripts
            .lock()
            .entry(model.into())
            .or_default()
            .extend(responses);
        self
    }

    /// Restricts the models reported by `list_models`.
    #[must_use]
    pub fn with_available_models<I, S>(self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.available.lock() = Some(models.into_iter().map(Into::into).collect());
        self
    }

    /// Makes every call fail with `ServiceUnavailable`.
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock() = unreachable;
    }

    /// Returns every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().clone()
    }

    /// Returns the number of calls made to `model`.
    #[must_use]
    pub fn calls_for(&self, model: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.model == model).count()
    }

    /// Returns the models called, in order.
    #[must_use]
    pub fn called_models(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.model.clone()).collect()
    }

    /// Returns the total number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn error_for(kind: ErrorKind, model: &str) -> TransportError {
        match kind {
            ErrorKind::ServiceUnavailable => TransportError::unavailable("connection refused"),
            ErrorKind::ModelNotFound => TransportError::model_not_found(model),
            ErrorKind::Timeout => TransportError::Timeout(Duration::from_millis(10)),
            ErrorKind::UpstreamError => TransportError::upstream("scripted upstream failure"),
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn invoke(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<String, TransportError> {
        let call_number = {
            let mut calls = self.calls.lock();
            calls.push(CallRecord {
                model: model.to_string(),
                messages: messages.to_vec(),
                options: *options,
            });
            calls.len()
        };

        if *self.unreachable.lock() {
            return Err(Self::error_for(ErrorKind::ServiceUnavailable, model));
        }

        if let Some(response) = self
            .scripts
            .lock()
            .get_mut(model)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }

        if let Some(kind) = self.failures.lock().get(model).copied() {
            return Err(Self::error_for(kind, model));
        }

        Ok(format!("{model} output {call_number}"))
    }

    async fn list_models(&self) -> Result<Vec<String>, TransportError> {
        if *self.unreachable.lock() {
            return Err(Self::error_for(ErrorKind::ServiceUnavailable, ""));
        }
        let mut models: Vec<String> = self
            .available
            .lock()
            .as_ref()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        models.sort();
        Ok(models)
    }
}

/// A sleeper that returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

/// A sleeper that records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the delays requested so far.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
    }
}
