//! Deterministic [`ChatClient`] that answers from a caller-supplied function.
//! Used to drive the agent and the HTTP layer without a model.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{ Mutex, MutexGuard };

use super::{ ChatClient, Completion, CompletionRequest };
use crate::llm::LlmError;

type Responder = Box<dyn Fn(&CompletionRequest) -> Result<Completion, LlmError> + Send + Sync>;

pub struct ScriptedChatClient {
    responder: Responder,
    requests: Mutex<Vec<CompletionRequest>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedChatClient {
    pub fn new<F>(responder: F) -> Self
        where F: Fn(&CompletionRequest) -> Result<Completion, LlmError> + Send + Sync + 'static
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies with the given results in order, then reports the script as exhausted.
    pub fn sequence(replies: Vec<Result<Completion, LlmError>>) -> Self {
        let queue = Mutex::new(VecDeque::from(replies));
        Self::new(move |_| {
            guard(&queue)
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Malformed("scripted replies exhausted".into())))
        })
    }

    pub fn failing() -> Self {
        Self::new(|_| Err(LlmError::Api { status: 503, body: "service unavailable".into() }))
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        guard(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        guard(&self.requests).len()
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        guard(&self.requests).push(request.clone());
        (self.responder)(request)
    }

    fn get_model(&self) -> String {
        "scripted".to_string()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}
