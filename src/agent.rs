use crate::analysis::Analyst;
use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig, PromptError };
use crate::dataset::Dataset;
use crate::llm::{ parse_llm_type, LlmConfig };
use crate::llm::chat::{
    ChatClient,
    Completion,
    CompletionRequest,
    ToolCallRequest,
    new_client as new_chat_client,
};
use crate::models::chat::{ ChatAction, ChatResponse, ConversationMessage };
use crate::models::waste::FloodRiskAssessment;
use crate::tools::{ ToolOutcome, Toolbox };

use log::{ debug, error, info, warn };
use serde_json::{ json, Value as JsonValue };
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub const FALLBACK_RESPONSE: &str =
    "I'm sorry, I'm having trouble understanding. Could you please rephrase your request?";

const ACTION_VIEW_DUMP_SITES: &str = "VIEW_DUMP_SITES";

#[derive(Clone)]
pub struct GbalaAgent {
    chat_client: Arc<dyn ChatClient>,
    prompt_config: Arc<PromptConfig>,
    dataset: Arc<Dataset>,
    analyst: Analyst,
    toolbox: Toolbox,
    weather_forecast: String,
    dashboard_area: String,
    prompts_path: Option<String>,
}

impl GbalaAgent {
    fn initialize_llm_client(
        args: &Args
    ) -> Result<Arc<dyn ChatClient>, Box<dyn Error + Send + Sync>> {
        let chat_llm_type = parse_llm_type(&args.chat_llm_type)?;
        let chat_api_key = if !args.chat_api_key.is_empty() {
            Some(args.chat_api_key.clone())
        } else {
            None
        };
        let chat_config = LlmConfig {
            llm_type: chat_llm_type,
            base_url: args.chat_base_url.clone(),
            api_key: chat_api_key,
            completion_model: args.chat_model.clone(),
            timeout: Duration::from_secs(args.llm_timeout_secs),
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={}, BaseURL={}",
            chat_config.llm_type,
            chat_client.get_model(),
            chat_client.get_base_url().as_deref().unwrap_or("adapter default")
        );
        Ok(chat_client)
    }

    fn load_configs(
        args: &Args
    ) -> Result<(Arc<PromptConfig>, Arc<Dataset>), Box<dyn Error + Send + Sync>> {
        let prompt_config = match &args.prompts_path {
            Some(path) => prompt::load_prompts(path)?,
            None => {
                info!("PROMPTS_PATH not set, using built-in prompt templates");
                PromptConfig::builtin()?
            }
        };
        let dataset = match &args.dataset_path {
            Some(path) => Dataset::load(path)?,
            None => {
                info!("DATASET_PATH not set, using built-in sample dataset");
                Dataset::sample()
            }
        };
        Ok((prompt_config, Arc::new(dataset)))
    }

    pub fn new(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let chat_client = Self::initialize_llm_client(args)?;
        let (prompt_config, dataset) = Self::load_configs(args)?;
        let mut agent = Self::with_components(
            chat_client,
            prompt_config,
            dataset,
            args.weather_forecast.clone(),
            args.dashboard_area.clone()
        );
        agent.prompts_path = args.prompts_path.clone();
        Ok(agent)
    }

    pub fn with_components(
        chat_client: Arc<dyn ChatClient>,
        prompt_config: Arc<PromptConfig>,
        dataset: Arc<Dataset>,
        weather_forecast: String,
        dashboard_area: String
    ) -> Self {
        let analyst = Analyst::new(
            Arc::clone(&chat_client),
            Arc::clone(&prompt_config),
            Arc::clone(&dataset)
        );
        let toolbox = Toolbox::new(analyst.clone(), Arc::clone(&dataset), weather_forecast.clone());
        Self {
            chat_client,
            prompt_config,
            dataset,
            analyst,
            toolbox,
            weather_forecast,
            dashboard_area,
            prompts_path: None,
        }
    }

    pub fn analyst(&self) -> &Analyst {
        &self.analyst
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn weather_forecast(&self) -> &str {
        &self.weather_forecast
    }

    /// Runs one chatbot turn. Every failure degrades to [`FALLBACK_RESPONSE`].
    pub async fn respond(&self, history: &[ConversationMessage], query: &str) -> ChatResponse {
        match self.run_turn(history, query).await {
            Ok(response) if !response.response.trim().is_empty() => response,
            Ok(_) => {
                warn!("Turn produced an empty response, using fallback");
                ChatResponse::text(FALLBACK_RESPONSE)
            }
            Err(e) => {
                error!("Chat turn failed: {}", e);
                ChatResponse::text(FALLBACK_RESPONSE)
            }
        }
    }

    fn chatbot_output_schema(&self) -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "response": {
                    "type": "string",
                    "description": "The chatbot's answer to the user's query."
                },
                "action": {
                    "type": "object",
                    "description": "An optional action for the frontend to perform.",
                    "properties": {
                        "type": { "type": "string", "enum": [ACTION_VIEW_DUMP_SITES] },
                        "filter": {
                            "type": "string",
                            "enum": self.dataset.waste_types,
                            "description": "The waste type to filter the dump sites by."
                        }
                    },
                    "required": ["type", "filter"]
                }
            },
            "required": ["response"]
        })
    }

    async fn run_turn(
        &self,
        history: &[ConversationMessage],
        query: &str
    ) -> Result<ChatResponse, Box<dyn Error + Send + Sync>> {
        let plan_prompt = prompt::get_chatbot_prompt(
            &self.prompt_config,
            history,
            query,
            &self.dataset.waste_types
        )?;
        let request = CompletionRequest::new(plan_prompt)
            .with_schema(self.chatbot_output_schema())
            .with_tools(self.toolbox.declarations());

        debug!("ANALYZE: {} history message(s)", history.len());
        match self.chat_client.complete(&request).await? {
            Completion::Structured(body) => {
                debug!("DIRECT_ANSWER");
                Ok(self.direct_answer(&body))
            }
            Completion::Text(text) => {
                debug!("DIRECT_ANSWER (plain text)");
                Ok(ChatResponse::text(text.trim()))
            }
            Completion::ToolCalls(calls) => {
                debug!("TOOL_DISPATCH: {} call(s)", calls.len());
                self.dispatch_tools(history, query, &calls).await
            }
        }
    }

    /// Accepts the model's action only when its filter names a known category.
    fn direct_answer(&self, body: &JsonValue) -> ChatResponse {
        let response = body
            .get("response")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();
        let action = body
            .get("action")
            .filter(|a| !a.is_null())
            .and_then(|raw| {
                match serde_json::from_value::<ChatAction>(raw.clone()) {
                    Ok(action) if self.dataset.is_waste_type(action.filter()) => Some(action),
                    Ok(action) => {
                        warn!("Dropping action with unknown filter '{}'", action.filter());
                        None
                    }
                    Err(e) => {
                        warn!("Dropping malformed action {}: {}", raw, e);
                        None
                    }
                }
            });
        ChatResponse { response, action }
    }

    async fn dispatch_tools(
        &self,
        history: &[ConversationMessage],
        query: &str,
        calls: &[ToolCallRequest]
    ) -> Result<ChatResponse, Box<dyn Error + Send + Sync>> {
        let mut summary = Vec::with_capacity(calls.len());

        for call in calls {
            let outcome = self.toolbox.invoke(call).await;
            if let ToolOutcome::DumpSites { waste_type, matches } = &outcome {
                if !matches.is_empty() {
                    info!("Found {} {} dump site(s), skipping synthesis", matches.len(), waste_type);
                    return Ok(ChatResponse {
                        response: format!(
                            "I found {} {} dump sites near you.",
                            matches.len(),
                            waste_type
                        ),
                        action: Some(ChatAction::ViewDumpSites { filter: waste_type.clone() }),
                    });
                }
            }
            summary.push(outcome.summary_line());
        }

        self.synthesize(history, query, &summary.join("\n")).await
    }

    async fn synthesize(
        &self,
        history: &[ConversationMessage],
        query: &str,
        tool_results: &str
    ) -> Result<ChatResponse, Box<dyn Error + Send + Sync>> {
        debug!("SYNTHESIZE");
        let tool_results = if tool_results.is_empty() { "(no results)" } else { tool_results };
        let synthesis_prompt = prompt::get_chatbot_synthesis_prompt(
            &self.prompt_config,
            history,
            query,
            tool_results
        )?;

        let text = match self.chat_client.complete(&CompletionRequest::new(synthesis_prompt)).await? {
            Completion::Text(text) => text,
            Completion::Structured(body) =>
                body
                    .get("response")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string)
                    .ok_or("synthesis returned JSON without a 'response' field")?,
            Completion::ToolCalls(_) => {
                return Err("synthesis step requested more tool calls".into());
            }
        };
        Ok(ChatResponse::text(text.trim()))
    }

    pub async fn dashboard_flood_risk(&self) -> FloodRiskAssessment {
        self.analyst.dashboard_flood_risk(&self.dashboard_area, &self.weather_forecast).await
    }

    pub async fn reload_prompts_if_changed(&mut self) -> Result<bool, PromptError> {
        let Some(prompts_path) = self.prompts_path.clone() else {
            info!("Using built-in prompt templates, nothing to reload");
            return Ok(false);
        };

        match prompt::reload_prompts_if_changed(&prompts_path, &self.prompt_config)? {
            Some(new_config) => {
                *self = Self {
                    prompts_path: Some(prompts_path),
                    ..Self::with_components(
                        Arc::clone(&self.chat_client),
                        new_config,
                        Arc::clone(&self.dataset),
                        self.weather_forecast.clone(),
                        self.dashboard_area.clone()
                    )
                };
                info!("Prompts successfully reloaded");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
