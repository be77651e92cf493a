pub mod gemini;
pub mod ollama;
pub mod openai;
#[cfg(test)]
pub mod scripted;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::error;
use reqwest::{ Client as HttpClient, Response };
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::{ LlmConfig, LlmError, LlmType };
use self::gemini::GeminiChatClient;
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;

/// A function the model may ask to have invoked on its behalf.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Inline image attached to a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPart {
    pub mime_type: String,
    pub data: String,
}

impl MediaPart {
    /// Accepts `data:<mime>;base64,<payload>` and checks the payload decodes.
    pub fn from_data_uri(uri: &str) -> Result<Self, LlmError> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| LlmError::InvalidMedia("data URI must start with 'data:'".into()))?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| LlmError::InvalidMedia("data URI has no payload".into()))?;
        let mime_type = meta
            .strip_suffix(";base64")
            .ok_or_else(|| LlmError::InvalidMedia("data URI must be base64 encoded".into()))?;
        if !mime_type.contains('/') {
            return Err(LlmError::InvalidMedia(format!("'{}' is not a MIME type", mime_type)));
        }
        BASE64.decode(payload).map_err(|e|
            LlmError::InvalidMedia(format!("payload is not valid base64: {}", e))
        )?;

        Ok(Self {
            mime_type: mime_type.to_string(),
            data: payload.to_string(),
        })
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionRequest {
    pub prompt: String,
    pub output_schema: Option<Value>,
    pub tools: Vec<ToolDeclaration>,
    pub media: Vec<MediaPart>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Default::default() }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_media(mut self, media: MediaPart) -> Self {
        self.media.push(media);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Text(String),
    Structured(Value),
    ToolCalls(Vec<ToolCallRequest>),
}

impl Completion {
    /// Classifies raw model output against what the request asked for.
    ///
    /// Schema-only requests must produce JSON. When tools were also offered,
    /// prose that is not JSON is kept as plain text.
    pub fn from_parts(
        request: &CompletionRequest,
        text: String,
        tool_calls: Vec<ToolCallRequest>
    ) -> Result<Self, LlmError> {
        if !tool_calls.is_empty() {
            return Ok(Completion::ToolCalls(tool_calls));
        }
        if request.output_schema.is_none() {
            return Ok(Completion::Text(text));
        }
        match parse_structured_text(&text) {
            Ok(value) => Ok(Completion::Structured(value)),
            Err(LlmError::Malformed(_)) if !request.tools.is_empty() && !text.trim().is_empty() => {
                Ok(Completion::Text(text))
            }
            Err(e) => Err(e),
        }
    }
}

/// Parses model text as JSON, tolerating a surrounding markdown code fence.
pub fn parse_structured_text(text: &str) -> Result<Value, LlmError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(LlmError::Malformed("empty output where JSON was expected".into()));
    }
    let body = match trimmed.strip_prefix("```") {
        Some(fenced) => {
            let without_lang = fenced.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
            without_lang.trim_end().trim_end_matches("```").trim()
        }
        None => trimmed,
    };
    serde_json::from_str(body).map_err(|e| LlmError::Malformed(format!("expected JSON output: {}", e)))
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<HttpClient, LlmError> {
    Ok(HttpClient::builder().timeout(timeout).build()?)
}

pub(crate) async fn ensure_success(resp: Response) -> Result<Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_else(|_| "Could not read error response".to_string());
    error!("Completion service error: Status {}, Details: {}", status, body);
    Err(LlmError::Api { status: status.as_u16(), body })
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Gemini => {
            let specific_client = GeminiChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_uri_is_split_into_mime_and_payload() {
        let part = MediaPart::from_data_uri("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(part.mime_type, "image/png");
        assert_eq!(part.data, "aGVsbG8=");
        assert_eq!(part.to_data_uri(), "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn data_uri_errors() {
        for bad in [
            "image/png;base64,aGVsbG8=",
            "data:image/png;base64",
            "data:image/png,aGVsbG8=",
            "data:png;base64,aGVsbG8=",
            "data:image/png;base64,@@not-base64@@",
        ] {
            assert!(
                matches!(MediaPart::from_data_uri(bad), Err(LlmError::InvalidMedia(_))),
                "accepted {}",
                bad
            );
        }
    }

    #[test]
    fn structured_text_strips_code_fences() {
        let fenced = "```json\n{\"response\": \"hi\"}\n```";
        assert_eq!(parse_structured_text(fenced).unwrap(), json!({ "response": "hi" }));
        assert_eq!(parse_structured_text(" {\"a\":1} ").unwrap(), json!({ "a": 1 }));
        assert!(matches!(parse_structured_text("   "), Err(LlmError::Malformed(_))));
        assert!(matches!(parse_structured_text("Sure! Here you go"), Err(LlmError::Malformed(_))));
    }

    #[test]
    fn tool_calls_win_over_text() {
        let request = CompletionRequest::new("p").with_schema(json!({ "type": "object" }));
        let call = ToolCallRequest { name: "findDumpSites".into(), args: json!({}) };
        let completion = Completion::from_parts(&request, "ignored".into(), vec![call.clone()]).unwrap();
        assert_eq!(completion, Completion::ToolCalls(vec![call]));

        let plain = Completion::from_parts(&CompletionRequest::new("p"), "hello".into(), vec![]).unwrap();
        assert_eq!(plain, Completion::Text("hello".into()));
    }

    #[test]
    fn prose_is_text_only_when_tools_were_offered() {
        let tool = ToolDeclaration {
            name: "findDumpSites".into(),
            description: "Find dump sites".into(),
            parameters: json!({ "type": "object" }),
        };
        let schema_only = CompletionRequest::new("p").with_schema(json!({ "type": "object" }));
        let with_tools = schema_only.clone().with_tools(vec![tool]);
        let prose = "Which type of waste do you have?";

        assert!(
            matches!(
                Completion::from_parts(&schema_only, prose.into(), vec![]),
                Err(LlmError::Malformed(_))
            )
        );
        assert_eq!(
            Completion::from_parts(&with_tools, prose.into(), vec![]).unwrap(),
            Completion::Text(prose.into())
        );
        assert_eq!(
            Completion::from_parts(&with_tools, "{\"response\":\"hi\"}".into(), vec![]).unwrap(),
            Completion::Structured(json!({ "response": "hi" }))
        );
        assert!(
            matches!(
                Completion::from_parts(&with_tools, "  ".into(), vec![]),
                Err(LlmError::Malformed(_))
            )
        );
    }
}
