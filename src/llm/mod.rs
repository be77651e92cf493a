pub mod chat;

use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Gemini,
    OpenAI,
    Ollama,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}

impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" | "googleai" => Ok(LlmType::Gemini),
            "openai" => Ok(LlmType::OpenAI),
            "ollama" => Ok(LlmType::Ollama),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LlmType::Gemini => "gemini",
            LlmType::OpenAI => "openai",
            LlmType::Ollama => "ollama",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::Gemini,
            api_key: None,
            completion_model: None,
            base_url: None,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error talking to the completion service: {0}")] Http(#[from] reqwest::Error),
    #[error("Completion service returned status {status}: {body}")] Api {
        status: u16,
        body: String,
    },
    #[error("Malformed completion: {0}")] Malformed(String),
    #[error("{0} API key is required")] MissingApiKey(&'static str),
    #[error("Invalid media: {0}")] InvalidMedia(String),
    #[error("Invalid base URL: {0}")] InvalidUrl(#[from] url::ParseError),
    #[error("JSON error: {0}")] Json(#[from] serde_json::Error),
}

pub fn parse_llm_type(type_str: &str) -> Result<LlmType, String> {
    type_str.parse::<LlmType>().map_err(|_| format!("Unsupported LLM type: {}", type_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_names_case_insensitively() {
        assert_eq!(parse_llm_type("Gemini"), Ok(LlmType::Gemini));
        assert_eq!(parse_llm_type("googleai"), Ok(LlmType::Gemini));
        assert_eq!(parse_llm_type("OPENAI"), Ok(LlmType::OpenAI));
        assert_eq!(parse_llm_type("ollama"), Ok(LlmType::Ollama));
        assert_eq!(parse_llm_type("groq"), Err("Unsupported LLM type: groq".to_string()));
    }
}
