use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use log::info;
use thiserror::Error;

use crate::models::chat::ConversationMessage;
use crate::models::waste::WasteReport;

const BUILTIN_PROMPTS: &str = include_str!("../../json/prompts.json");

const REQUIRED_QUERY_TEMPLATES: [&str; 4] = [
    "chatbot",
    "flood_risk",
    "waste_photo",
    "plastic_accumulation",
];
const REQUIRED_RESPONSE_TEMPLATES: [&str; 1] = ["chatbot_synthesis"];

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt template '{0}' not found")] TemplateNotFound(String),
    #[error("Prompt file IO error: {0}")] IoError(#[from] std::io::Error),
    #[error("Prompt JSON parsing error: {0}")] JsonError(#[from] serde_json::Error),
}

#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    pub query_templates: HashMap<String, String>,
    pub response_templates: HashMap<String, String>,
    #[serde(skip)]
    pub last_loaded: Option<SystemTime>,
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        for key in REQUIRED_QUERY_TEMPLATES {
            if !self.query_templates.contains_key(key) {
                return Err(PromptError::TemplateNotFound(format!("query_templates:{}", key)));
            }
        }
        for key in REQUIRED_RESPONSE_TEMPLATES {
            if !self.response_templates.contains_key(key) {
                return Err(PromptError::TemplateNotFound(format!("response_templates:{}", key)));
            }
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self, PromptError> {
        let config: PromptConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Templates compiled into the binary from `json/prompts.json`.
    pub fn builtin() -> Result<Arc<Self>, PromptError> {
        Ok(Arc::new(Self::from_json(BUILTIN_PROMPTS)?))
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(&path)?;
    let mut config = PromptConfig::from_json(&file_content)?;
    config.last_loaded = Some(SystemTime::now());
    info!("Loaded prompt templates from {}", path.as_ref().display());
    Ok(Arc::new(config))
}

pub fn reload_prompts_if_changed<P: AsRef<Path>>(
    path: P,
    current_config: &Arc<PromptConfig>
) -> Result<Option<Arc<PromptConfig>>, PromptError> {
    let metadata = fs::metadata(&path)?;

    if let Ok(modified) = metadata.modified() {
        match current_config.last_loaded {
            Some(last_loaded) if modified <= last_loaded => {}
            Some(_) => {
                info!("Prompts file changed, reloading...");
                return load_prompts(path).map(Some);
            }
            None => {
                info!("No last_loaded timestamp, reloading prompts...");
                return load_prompts(path).map(Some);
            }
        }
    }
    Ok(None)
}

fn get_query_template<'a>(config: &'a PromptConfig, key: &str) -> Result<&'a str, PromptError> {
    config.query_templates
        .get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| PromptError::TemplateNotFound(format!("query_templates:{}", key)))
}

fn get_response_template<'a>(config: &'a PromptConfig, key: &str) -> Result<&'a str, PromptError> {
    config.response_templates
        .get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| PromptError::TemplateNotFound(format!("response_templates:{}", key)))
}

/// Substitutes `{name}` placeholders in one pass, so substituted values are
/// never rescanned. Unknown placeholders are left as they are.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let replaced = after.find('}').and_then(|end| {
            let name = &after[..end];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });
        match replaced {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn format_history_for_prompt(history: &[ConversationMessage]) -> String {
    if history.is_empty() {
        return "(no previous messages)".to_string();
    }
    history
        .iter()
        .map(|msg| format!("- {}: {}", msg.role.as_str(), msg.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_reports_for_prompt(reports: &[WasteReport]) -> String {
    if reports.is_empty() {
        return "No recent waste reports.".to_string();
    }
    reports
        .iter()
        .map(|r| format!("- {} (Type: {}) at {}", r.description, r.waste_type, r.location_name))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn get_chatbot_prompt(
    config: &PromptConfig,
    history: &[ConversationMessage],
    query: &str,
    waste_types: &[String]
) -> Result<String, PromptError> {
    let template = get_query_template(config, "chatbot")?;
    let history = format_history_for_prompt(history);
    let waste_types = waste_types.join(", ");
    Ok(
        render(
            template,
            &[
                ("history", history.as_str()),
                ("query", query),
                ("waste_types", waste_types.as_str()),
            ]
        )
    )
}

pub fn get_chatbot_synthesis_prompt(
    config: &PromptConfig,
    history: &[ConversationMessage],
    query: &str,
    tool_results: &str
) -> Result<String, PromptError> {
    let template = get_response_template(config, "chatbot_synthesis")?;
    let history = format_history_for_prompt(history);
    Ok(
        render(
            template,
            &[
                ("history", history.as_str()),
                ("query", query),
                ("tool_results", tool_results),
            ]
        )
    )
}

pub fn get_flood_risk_prompt(
    config: &PromptConfig,
    reports: &[WasteReport],
    area_name: &str,
    weather_forecast: &str
) -> Result<String, PromptError> {
    let template = get_query_template(config, "flood_risk")?;
    let reports = format_reports_for_prompt(reports);
    Ok(
        render(
            template,
            &[
                ("area_name", area_name),
                ("weather_forecast", weather_forecast),
                ("reports", reports.as_str()),
            ]
        )
    )
}

pub fn get_waste_photo_prompt(
    config: &PromptConfig,
    waste_types: &[String]
) -> Result<String, PromptError> {
    let template = get_query_template(config, "waste_photo")?;
    let waste_types = waste_types.join(", ");
    Ok(render(template, &[("waste_types", waste_types.as_str())]))
}

pub fn get_plastic_accumulation_prompt(config: &PromptConfig) -> Result<String, PromptError> {
    get_query_template(config, "plastic_accumulation").map(str::to_string)
}
