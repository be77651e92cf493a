//! Single round-trip assessments delegated to the language model: flood
//! risk, waste-photo classification and satellite plastic detection.

mod flood_risk;
mod plastic;
mod waste_photo;

pub use flood_risk::{ flood_risk_schema, FLOOD_RISK_FALLBACK_REASONING };

use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;

use crate::config::prompt::{ PromptConfig, PromptError };
use crate::dataset::Dataset;
use crate::llm::LlmError;
use crate::llm::chat::{ parse_structured_text, ChatClient, Completion, CompletionRequest };

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)] Llm(#[from] LlmError),
    #[error(transparent)] Prompt(#[from] PromptError),
    #[error("Unexpected completion: {0}")] UnexpectedCompletion(String),
    #[error("Output does not match the expected shape: {0}")] InvalidOutput(String),
}

impl AnalysisError {
    /// True when the caller sent something unusable, as opposed to the model failing.
    pub fn is_bad_input(&self) -> bool {
        matches!(self, AnalysisError::Llm(LlmError::InvalidMedia(_)))
    }
}

#[derive(Clone)]
pub struct Analyst {
    chat_client: Arc<dyn ChatClient>,
    prompt_config: Arc<PromptConfig>,
    dataset: Arc<Dataset>,
}

impl Analyst {
    pub fn new(
        chat_client: Arc<dyn ChatClient>,
        prompt_config: Arc<PromptConfig>,
        dataset: Arc<Dataset>
    ) -> Self {
        Self { chat_client, prompt_config, dataset }
    }

    async fn structured<T: DeserializeOwned>(
        &self,
        request: &CompletionRequest
    ) -> Result<T, AnalysisError> {
        let value = match self.chat_client.complete(request).await? {
            Completion::Structured(value) => value,
            Completion::Text(text) => parse_structured_text(&text)?,
            Completion::ToolCalls(calls) => {
                return Err(
                    AnalysisError::UnexpectedCompletion(
                        format!("model requested {} tool call(s) where none were offered", calls.len())
                    )
                );
            }
        };
        serde_json::from_value(value).map_err(|e| AnalysisError::InvalidOutput(e.to_string()))
    }
}
