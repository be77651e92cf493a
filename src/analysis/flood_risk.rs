use log::{ error, info };
use serde_json::{ json, Value };

use super::{ AnalysisError, Analyst };
use crate::config::prompt::get_flood_risk_prompt;
use crate::llm::chat::CompletionRequest;
use crate::models::waste::{ FloodRiskAssessment, RiskLevel, WasteReport };

pub const FLOOD_RISK_FALLBACK_REASONING: &str =
    "Could not load live risk assessment. Please be cautious.";

pub fn flood_risk_schema() -> Value {
    let levels: Vec<&str> = RiskLevel::ALL.iter()
        .map(|l| l.as_str())
        .collect();
    json!({
        "type": "object",
        "properties": {
            "riskLevel": {
                "type": "string",
                "enum": levels,
                "description": "The calculated flood risk level."
            },
            "reasoning": {
                "type": "string",
                "description": "A brief, user-friendly explanation for the calculated risk level."
            }
        },
        "required": ["riskLevel", "reasoning"]
    })
}

impl Analyst {
    /// The risk level is whatever label the model picks, constrained to
    /// [`RiskLevel`]; nothing is scored locally.
    pub async fn assess_flood_risk(
        &self,
        reports: &[WasteReport],
        area_name: &str,
        weather_forecast: &str
    ) -> Result<FloodRiskAssessment, AnalysisError> {
        let prompt = get_flood_risk_prompt(&self.prompt_config, reports, area_name, weather_forecast)?;
        let request = CompletionRequest::new(prompt).with_schema(flood_risk_schema());
        let assessment: FloodRiskAssessment = self.structured(&request).await?;
        info!("Flood risk for {}: {}", area_name, assessment.risk_level);
        Ok(assessment)
    }

    /// Assessment shown on dashboard load; never fails.
    pub async fn dashboard_flood_risk(
        &self,
        area_name: &str,
        weather_forecast: &str
    ) -> FloodRiskAssessment {
        match self.assess_flood_risk(&self.dataset.reports, area_name, weather_forecast).await {
            Ok(assessment) => assessment,
            Err(e) => {
                error!("Error fetching flood risk for {}: {}", area_name, e);
                FloodRiskAssessment {
                    risk_level: RiskLevel::Medium,
                    reasoning: FLOOD_RISK_FALLBACK_REASONING.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::prompt::PromptConfig;
    use crate::dataset::Dataset;
    use crate::llm::chat::Completion;
    use crate::llm::chat::scripted::ScriptedChatClient;
    use std::sync::Arc;

    fn analyst(client: Arc<ScriptedChatClient>) -> Analyst {
        Analyst::new(client, PromptConfig::builtin().unwrap(), Arc::new(Dataset::sample()))
    }

    #[tokio::test]
    async fn risk_level_comes_from_the_model() {
        let client = Arc::new(
            ScriptedChatClient::new(|_| {
                Ok(Completion::Structured(json!({ "riskLevel": "Low", "reasoning": "Dry weather." })))
            })
        );
        let result = analyst(client.clone())
            .assess_flood_risk(&[], "Monrovia", "Dry conditions").await
            .unwrap();

        assert!(RiskLevel::ALL.contains(&result.risk_level));
        assert_eq!(result.risk_level, RiskLevel::Low);

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].output_schema, Some(flood_risk_schema()));
        assert!(requests[0].tools.is_empty());
        assert!(requests[0].prompt.contains("No recent waste reports."));
    }

    #[tokio::test]
    async fn labels_outside_the_enum_are_rejected() {
        let client = Arc::new(
            ScriptedChatClient::new(|_| {
                Ok(Completion::Structured(json!({ "riskLevel": "Extreme", "reasoning": "?" })))
            })
        );
        let err = analyst(client)
            .assess_flood_risk(&[], "Monrovia", "Dry conditions").await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidOutput(_)));
    }

    #[tokio::test]
    async fn json_text_is_accepted() {
        let client = Arc::new(
            ScriptedChatClient::new(|_| {
                Ok(Completion::Text("{\"riskLevel\":\"Severe\",\"reasoning\":\"Blocked drains.\"}".into()))
            })
        );
        let result = analyst(client).assess_flood_risk(&[], "Clara Town", "Storm").await.unwrap();
        assert_eq!(result.risk_level, RiskLevel::Severe);
    }

    #[tokio::test]
    async fn dashboard_falls_back_to_medium() {
        let client = Arc::new(ScriptedChatClient::failing());
        let result = analyst(client).dashboard_flood_risk("Monrovia", "Rain").await;
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert_eq!(result.reasoning, FLOOD_RISK_FALLBACK_REASONING);
    }

    #[tokio::test]
    async fn dashboard_uses_every_report() {
        let client = Arc::new(
            ScriptedChatClient::new(|_| {
                Ok(Completion::Structured(json!({ "riskLevel": "High", "reasoning": "Plastic." })))
            })
        );
        let result = analyst(client.clone()).dashboard_flood_risk("Monrovia", "Rain").await;
        assert_eq!(result.risk_level, RiskLevel::High);

        let prompt = &client.requests()[0].prompt;
        for report in Dataset::sample().reports {
            assert!(prompt.contains(&report.description));
        }
    }
}
