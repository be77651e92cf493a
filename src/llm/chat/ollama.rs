use async_trait::async_trait;
use log::info;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use serde_json::Value;

use super::{
    build_http_client,
    ensure_success,
    ChatClient,
    Completion,
    CompletionRequest,
    ToolCallRequest,
    ToolDeclaration,
};
use crate::llm::{ LlmConfig, LlmError, LlmType };

const DEFAULT_MODEL: &str = "llama3.1";
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
    completion_model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a Value>,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<&'a str>,
}

#[derive(Serialize)]
struct OllamaTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a ToolDeclaration,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl OllamaClient {
    pub fn new(http: HttpClient, base_url: Option<String>, completion_model: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            completion_model: completion_model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.llm_type != LlmType::Ollama {
            return Err(LlmError::Malformed("Invalid config type for OllamaClient".into()));
        }
        let http = build_http_client(config.timeout)?;
        Ok(Self::new(http, config.base_url.clone(), config.completion_model.clone()))
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.completion_model,
            messages: vec![OllamaMessage {
                role: "user",
                content: &request.prompt,
                images: request.media
                    .iter()
                    .map(|m| m.data.as_str())
                    .collect(),
            }],
            stream: false,
            tools: request.tools
                .iter()
                .map(|t| OllamaTool { tool_type: "function", function: t })
                .collect(),
            format: request.output_schema.as_ref(),
        }
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        info!("OllamaClient::complete() → model={} url={}", self.completion_model, url);

        let resp = self.http.post(&url).json(&self.build_request(request)).send().await?;
        let data: ChatResponse = ensure_success(resp).await?.json().await?;

        let tool_calls = data.message.tool_calls
            .into_iter()
            .map(|call| ToolCallRequest {
                name: call.function.name,
                args: if call.function.arguments.is_null() {
                    Value::Object(Default::default())
                } else {
                    call.function.arguments
                },
            })
            .collect();

        Completion::from_parts(request, data.message.content, tool_calls)
    }

    fn get_model(&self) -> String {
        self.completion_model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
