use log::info;
use serde_json::{ json, Value };

use super::{ AnalysisError, Analyst };
use crate::config::prompt::get_waste_photo_prompt;
use crate::llm::chat::{ CompletionRequest, MediaPart };
use crate::models::waste::WastePhotoAnalysis;

fn waste_photo_schema(waste_types: &[String]) -> Value {
    json!({
        "type": "object",
        "properties": {
            "wasteType": {
                "type": "string",
                "enum": waste_types,
                "description": "The identified type of waste."
            },
            "reasoning": {
                "type": "string",
                "description": "A brief explanation for the classification."
            }
        },
        "required": ["wasteType", "reasoning"]
    })
}

impl Analyst {
    /// Classifies the waste shown in a `data:<mime>;base64,...` photo into one
    /// of the dataset's categories.
    pub async fn analyze_waste_photo(
        &self,
        photo_data_uri: &str
    ) -> Result<WastePhotoAnalysis, AnalysisError> {
        let media = MediaPart::from_data_uri(photo_data_uri)?;
        let waste_types = &self.dataset.waste_types;
        let prompt = get_waste_photo_prompt(&self.prompt_config, waste_types)?;
        let request = CompletionRequest::new(prompt)
            .with_schema(waste_photo_schema(waste_types))
            .with_media(media);

        let analysis: WastePhotoAnalysis = self.structured(&request).await?;
        if !self.dataset.is_waste_type(&analysis.waste_type) {
            return Err(
                AnalysisError::InvalidOutput(
                    format!("'{}' is not a known waste type", analysis.waste_type)
                )
            );
        }
        info!("Waste photo classified as {}", analysis.waste_type);
        Ok(analysis)
    }
}
