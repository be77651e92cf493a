use async_trait::async_trait;
use log::{ debug, info };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use url::Url;

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

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTools<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
}

#[derive(Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools<'a> {
    function_declarations: &'a [ToolDeclaration],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: Option<GoogleContent>,
}

#[derive(Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GooglePart {
    text: Option<String>,
    function_call: Option<GoogleFunctionCall>,
}

#[derive(Deserialize)]
struct GoogleFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

pub struct GeminiChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiChatClient {
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
            .ok_or(LlmError::MissingApiKey("Google"))?;
        let http = build_http_client(config.timeout)?;

        Ok(Self::new(http, api_key, config.completion_model.clone(), config.base_url.clone()))
    }

    fn endpoint(&self) -> Result<Url, LlmError> {
        let mut url = Url::parse(
            &format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url.trim_end_matches('/'),
                self.model
            )
        )?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    fn build_request<'a>(&self, request: &'a CompletionRequest) -> GenerateContentRequest<'a> {
        let mut prompt = request.prompt.clone();
        // responseSchema cannot be combined with function calling, so the
        // schema travels in the prompt when tools are offered.
        let generation_config = match (&request.output_schema, request.tools.is_empty()) {
            (Some(schema), true) =>
                Some(GenerationConfig {
                    response_mime_type: "application/json",
                    response_schema: schema,
                }),
            (Some(schema), false) => {
                prompt.push_str(
                    &format!(
                        "\n\nWhen you answer without calling a tool, respond only with a JSON object matching this schema:\n{}",
                        schema
                    )
                );
                None
            }
            (None, _) => None,
        };

        let mut parts = vec![GeminiPart::Text { text: prompt }];
        parts.extend(
            request.media.iter().map(|m| GeminiPart::InlineData {
                inline_data: InlineData {
                    mime_type: m.mime_type.clone(),
                    data: m.data.clone(),
                },
            })
        );

        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![GeminiTools { function_declarations: &request.tools }]
        };

        GenerateContentRequest {
            contents: vec![GeminiContent { role: "user", parts }],
            tools,
            generation_config,
        }
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        info!(
            "GeminiChatClient::complete() → model={} base_url={} tools={} media={}",
            self.model,
            self.base_url,
            request.tools.len(),
            request.media.len()
        );
        let body = self.build_request(request);
        let resp = self.http.post(self.endpoint()?).json(&body).send().await?;
        let parsed: GenerateContentResponse = ensure_success(resp).await?.json().await?;

        let parts = parsed.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .ok_or_else(|| LlmError::Malformed("Gemini returned no candidates".into()))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for part in parts {
            if let Some(t) = part.text {
                text.push_str(&t);
            }
            if let Some(fc) = part.function_call {
                let args = if fc.args.is_null() { Value::Object(Default::default()) } else { fc.args };
                tool_calls.push(ToolCallRequest { name: fc.name, args });
            }
        }
        debug!("Gemini output: {} chars of text, {} tool calls", text.len(), tool_calls.len());

        Completion::from_parts(request, text, tool_calls)
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
    use crate::llm::chat::MediaPart;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{ method, path, query_param };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    fn client(server: &MockServer) -> GeminiChatClient {
        let http = build_http_client(Duration::from_secs(5)).unwrap();
        GeminiChatClient::new(http, "test-key".into(), None, Some(server.uri()))
    }

    fn tool() -> ToolDeclaration {
        ToolDeclaration {
            name: "findDumpSites".into(),
            description: "Find dump sites".into(),
            parameters: json!({ "type": "object" }),
        }
    }

    #[test]
    fn schema_moves_into_prompt_when_tools_are_offered() {
        let http = build_http_client(Duration::from_secs(5)).unwrap();
        let client = GeminiChatClient::new(http, "k".into(), None, None);
        let request = CompletionRequest::new("hello")
            .with_schema(json!({ "type": "object" }))
            .with_tools(vec![tool()]);
        let body = serde_json::to_value(client.build_request(&request)).unwrap();

        assert!(body.get("generationConfig").is_none());
        let text = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("hello"));
        assert!(text.contains("respond only with a JSON object"));
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "findDumpSites");
    }

    #[test]
    fn media_becomes_inline_data() {
        let http = build_http_client(Duration::from_secs(5)).unwrap();
        let client = GeminiChatClient::new(http, "k".into(), None, None);
        let media = MediaPart::from_data_uri("data:image/jpeg;base64,aGVsbG8=").unwrap();
        let request = CompletionRequest::new("look")
            .with_schema(json!({ "type": "object" }))
            .with_media(media);
        let body = serde_json::to_value(client.build_request(&request)).unwrap();

        assert_eq!(
            body["contents"][0]["parts"][1],
            json!({ "inlineData": { "mimeType": "image/jpeg", "data": "aGVsbG8=" } })
        );
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[tokio::test]
    async fn function_call_parts_become_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(
                    json!({
                        "candidates": [{
                            "content": {
                                "role": "model",
                                "parts": [{
                                    "functionCall": {
                                        "name": "findDumpSites",
                                        "args": { "wasteType": "Plastic" }
                                    }
                                }]
                            }
                        }]
                    })
                )
            )
            .mount(&server).await;

        let request = CompletionRequest::new("find plastic sites").with_tools(vec![tool()]);
        let completion = client(&server).complete(&request).await.unwrap();
        assert_eq!(
            completion,
            Completion::ToolCalls(
                vec![ToolCallRequest {
                    name: "findDumpSites".into(),
                    args: json!({ "wasteType": "Plastic" }),
                }]
            )
        );
    }

    #[tokio::test]
    async fn json_text_becomes_structured_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(
                    json!({
                        "candidates": [{
                            "content": {
                                "parts": [{ "text": "{\"riskLevel\": \"High\", \"reasoning\": \"Rain\"}" }]
                            }
                        }]
                    })
                )
            )
            .mount(&server).await;

        let request = CompletionRequest::new("assess").with_schema(json!({ "type": "object" }));
        let completion = client(&server).complete(&request).await.unwrap();
        assert_eq!(completion, Completion::Structured(json!({ "riskLevel": "High", "reasoning": "Rain" })));
    }

    #[tokio::test]
    async fn api_errors_carry_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server).await;

        let err = client(&server).complete(&CompletionRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 429, ref body } if body == "quota"));
    }

    #[test]
    fn missing_key_is_rejected() {
        let config = LlmConfig::default();
        assert!(matches!(GeminiChatClient::from_config(&config), Err(LlmError::MissingApiKey(_))));
    }
}
