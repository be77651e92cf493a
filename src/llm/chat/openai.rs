use async_trait::async_trait;
use log::info;
use reqwest::{ Client as HttpClient, header::AUTHORIZATION };
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
use crate::llm::{ LlmConfig, LlmError };

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAIChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAITool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Serialize)]
struct OpenAITool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a ToolDeclaration,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'static str,
    schema: &'a Value,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAIToolCall>,
}

#[derive(Deserialize)]
struct OpenAIToolCall {
    function: OpenAIFunctionCall,
}

#[derive(Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl OpenAIChatClient {
    pub fn new(
        http: HttpClient,
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Self {
        Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(LlmError::MissingApiKey("OpenAI"))?;
        let http = build_http_client(config.timeout)?;

        Ok(Self::new(http, api_key, config.completion_model.clone(), config.base_url.clone()))
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest) -> OpenAIChatRequest<'a> {
        let mut content = vec![ContentPart::Text { text: request.prompt.clone() }];
        content.extend(
            request.media.iter().map(|m| ContentPart::ImageUrl {
                image_url: ImageUrl { url: m.to_data_uri() },
            })
        );

        OpenAIChatRequest {
            model: &self.model,
            messages: vec![OpenAIMessage { role: "user", content }],
            temperature: 0.2,
            tools: request.tools
                .iter()
                .map(|t| OpenAITool { tool_type: "function", function: t })
                .collect(),
            response_format: request.output_schema.as_ref().map(|schema| ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat { name: "output", schema },
            }),
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        info!("OpenAIChatClient::complete() → model={} url={}", self.model, url);

        let resp = self.http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&self.build_request(request))
            .send().await?;
        let parsed: OpenAIResponse = ensure_success(resp).await?.json().await?;

        let message = parsed.choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Malformed("No response from OpenAI API".into()))?
            .message;

        let tool_calls = message.tool_calls
            .into_iter()
            .map(|call| -> Result<ToolCallRequest, LlmError> {
                let args = if call.function.arguments.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&call.function.arguments).map_err(|e|
                        LlmError::Malformed(
                            format!("arguments for '{}' are not JSON: {}", call.function.name, e)
                        )
                    )?
                };
                Ok(ToolCallRequest { name: call.function.name, args })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Completion::from_parts(request, message.content.unwrap_or_default(), tool_calls)
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{ header, method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    fn client(server: &MockServer) -> OpenAIChatClient {
        let http = build_http_client(Duration::from_secs(5)).unwrap();
        OpenAIChatClient::new(http, "test-key".into(), Some("gpt-4o-mini".into()), Some(server.uri()))
    }

    #[tokio::test]
    async fn tool_call_arguments_are_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(
                    json!({
                        "choices": [{
                            "index": 0,
                            "message": {
                                "role": "assistant",
                                "content": null,
                                "tool_calls": [{
                                    "id": "call_1",
                                    "type": "function",
                                    "function": {
                                        "name": "getFloodRisk",
                                        "arguments": "{\"areaName\":\"Clara Town\"}"
                                    }
                                }]
                            },
                            "finish_reason": "tool_calls"
                        }]
                    })
                )
            )
            .mount(&server).await;

        let completion = client(&server).complete(&CompletionRequest::new("flood?")).await.unwrap();
        assert_eq!(
            completion,
            Completion::ToolCalls(
                vec![ToolCallRequest {
                    name: "getFloodRisk".into(),
                    args: json!({ "areaName": "Clara Town" }),
                }]
            )
        );
    }

    #[tokio::test]
    async fn content_is_parsed_when_schema_requested() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(
                    json!({
                        "choices": [{
                            "message": { "role": "assistant", "content": "{\"response\":\"Hello!\"}" }
                        }]
                    })
                )
            )
            .mount(&server).await;

        let request = CompletionRequest::new("hi").with_schema(json!({ "type": "object" }));
        let completion = client(&server).complete(&request).await.unwrap();
        assert_eq!(completion, Completion::Structured(json!({ "response": "Hello!" })));
    }

    #[test]
    fn request_carries_schema_and_tools() {
        let http = build_http_client(Duration::from_secs(5)).unwrap();
        let client = OpenAIChatClient::new(http, "k".into(), None, None);
        let request = CompletionRequest::new("hi")
            .with_schema(json!({ "type": "object" }))
            .with_tools(
                vec![ToolDeclaration {
                    name: "getFloodRisk".into(),
                    description: "risk".into(),
                    parameters: json!({ "type": "object" }),
                }]
            );
        let body = serde_json::to_value(client.build_request(&request)).unwrap();

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["content"][0], json!({ "type": "text", "text": "hi" }));
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "getFloodRisk");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "output");
    }
}
