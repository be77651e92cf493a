use log::info;
use serde_json::{ json, Value };

use super::{ AnalysisError, Analyst };
use crate::config::prompt::get_plastic_accumulation_prompt;
use crate::llm::chat::{ CompletionRequest, MediaPart };
use crate::models::waste::PlasticAccumulation;

fn plastic_accumulation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "plasticAccumulationZones": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Identified areas with plastic accumulation in the satellite image."
            }
        },
        "required": ["plasticAccumulationZones"]
    })
}

impl Analyst {
    pub async fn analyze_plastic_accumulation(
        &self,
        satellite_image_data_uri: &str
    ) -> Result<PlasticAccumulation, AnalysisError> {
        let media = MediaPart::from_data_uri(satellite_image_data_uri)?;
        let prompt = get_plastic_accumulation_prompt(&self.prompt_config)?;
        let request = CompletionRequest::new(prompt)
            .with_schema(plastic_accumulation_schema())
            .with_media(media);

        let result: PlasticAccumulation = self.structured(&request).await?;
        info!("Found {} plastic accumulation zone(s)", result.plastic_accumulation_zones.len());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::prompt::PromptConfig;
    use crate::dataset::Dataset;
    use crate::llm::LlmError;
    use crate::llm::chat::Completion;
    use crate::llm::chat::scripted::ScriptedChatClient;
    use std::sync::Arc;

    const IMAGE: &str = "data:image/png;base64,iVBORw0KGgo=";

    #[tokio::test]
    async fn zones_are_returned_in_model_order() {
        let client = Arc::new(
            ScriptedChatClient::new(|_| {
                Ok(
                    Completion::Structured(
                        json!({ "plasticAccumulationZones": ["Mesurado River mouth", "West Point shore"] })
                    )
                )
            })
        );
        let analyst = Analyst::new(
            client.clone(),
            PromptConfig::builtin().unwrap(),
            Arc::new(Dataset::sample())
        );
        let result = analyst.analyze_plastic_accumulation(IMAGE).await.unwrap();
        assert_eq!(
            result.plastic_accumulation_zones,
            vec!["Mesurado River mouth".to_string(), "West Point shore".to_string()]
        );
        assert_eq!(client.requests()[0].media[0].mime_type, "image/png");
    }

    #[tokio::test]
    async fn model_failure_is_propagated() {
        let analyst = Analyst::new(
            Arc::new(ScriptedChatClient::failing()),
            PromptConfig::builtin().unwrap(),
            Arc::new(Dataset::sample())
        );
        let err = analyst.analyze_plastic_accumulation(IMAGE).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Llm(LlmError::Api { status: 503, .. })));
    }
}
