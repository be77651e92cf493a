//! The closed set of functions the chatbot model may call, and their
//! execution against the dataset and the [`Analyst`].

use log::{ info, warn };
use serde::Deserialize;
use serde_json::{ json, Value };
use std::fmt;
use std::sync::Arc;

use crate::analysis::Analyst;
use crate::dataset::Dataset;
use crate::llm::chat::{ ToolCallRequest, ToolDeclaration };
use crate::models::waste::{ DumpSiteMatch, FloodRiskAssessment };

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolName {
    GetFloodRisk,
    FindDumpSites,
}

impl ToolName {
    pub const ALL: [ToolName; 2] = [ToolName::GetFloodRisk, ToolName::FindDumpSites];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::GetFloodRisk => "getFloodRisk",
            ToolName::FindDumpSites => "findDumpSites",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloodRiskInput {
    pub area_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpSiteInput {
    pub waste_type: String,
    /// Accepted for the model's benefit; the lookup is not location aware.
    #[serde(default)]
    pub location: Option<String>,
}

/// Result of one executed tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    FloodRisk {
        area_name: String,
        assessment: FloodRiskAssessment,
    },
    DumpSites {
        waste_type: String,
        matches: Vec<DumpSiteMatch>,
    },
    Failed {
        tool: ToolName,
        message: String,
    },
    Unknown {
        name: String,
        output: Value,
    },
}

impl ToolOutcome {
    /// One line of the summary handed to the synthesis prompt.
    pub fn summary_line(&self) -> String {
        match self {
            ToolOutcome::FloodRisk { area_name, assessment } =>
                format!(
                    "getFloodRisk for {}: risk level {}. {}",
                    area_name,
                    assessment.risk_level,
                    assessment.reasoning
                ),
            ToolOutcome::DumpSites { waste_type, matches } if matches.is_empty() =>
                format!("findDumpSites for {}: no dump sites accept this waste type.", waste_type),
            ToolOutcome::DumpSites { waste_type, matches } => {
                let sites = matches
                    .iter()
                    .map(|m| format!("{} ({})", m.name, m.address))
                    .collect::<Vec<_>>()
                    .join("; ");
                format!("findDumpSites for {}: {}", waste_type, sites)
            }
            ToolOutcome::Failed { tool, message } => format!("{} failed: {}", tool, message),
            ToolOutcome::Unknown { name, output } => format!("{}: {}", name, output),
        }
    }
}

#[derive(Clone)]
pub struct Toolbox {
    analyst: Analyst,
    dataset: Arc<Dataset>,
    weather_forecast: String,
}

impl Toolbox {
    pub fn new(analyst: Analyst, dataset: Arc<Dataset>, weather_forecast: String) -> Self {
        Self { analyst, dataset, weather_forecast }
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        vec![
            ToolDeclaration {
                name: ToolName::GetFloodRisk.as_str().to_string(),
                description: "Get the current flood risk assessment for a specific area.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "areaName": {
                            "type": "string",
                            "description": "The name of the area to check, e.g., 'Monrovia', 'Clara Town'."
                        }
                    },
                    "required": ["areaName"]
                }),
            },
            ToolDeclaration {
                name: ToolName::FindDumpSites.as_str().to_string(),
                description: "Find nearby dump sites or recycling centers that accept a specific type of waste.".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "wasteType": {
                            "type": "string",
                            "enum": self.dataset.waste_types,
                            "description": "The type of waste the user wants to dispose of."
                        },
                        "location": {
                            "type": "string",
                            "description": "The user's current location or area. Defaults to 'near me' if not provided."
                        }
                    },
                    "required": ["wasteType"]
                }),
            }
        ]
    }

    /// Runs one requested call. Never fails: problems are reported in the outcome.
    pub async fn invoke(&self, call: &ToolCallRequest) -> ToolOutcome {
        let Some(tool) = ToolName::from_name(&call.name) else {
            warn!("Model requested unknown tool '{}'", call.name);
            return ToolOutcome::Unknown {
                name: call.name.clone(),
                output: json!({
                    "error": format!("Tool '{}' is not available", call.name),
                    "input": call.args,
                }),
            };
        };
        info!("Executing tool {} with {}", tool, call.args);

        match tool {
            ToolName::GetFloodRisk => self.get_flood_risk(&call.args).await,
            ToolName::FindDumpSites => self.find_dump_sites(&call.args),
        }
    }

    async fn get_flood_risk(&self, args: &Value) -> ToolOutcome {
        let input: FloodRiskInput = match serde_json::from_value(args.clone()) {
            Ok(input) => input,
            Err(e) => return failed(ToolName::GetFloodRisk, format!("invalid arguments: {}", e)),
        };
        match
            self.analyst.assess_flood_risk(
                &self.dataset.reports,
                &input.area_name,
                &self.weather_forecast
            ).await
        {
            Ok(assessment) => ToolOutcome::FloodRisk { area_name: input.area_name, assessment },
            Err(e) => failed(ToolName::GetFloodRisk, e.to_string()),
        }
    }

    fn find_dump_sites(&self, args: &Value) -> ToolOutcome {
        let input: DumpSiteInput = match serde_json::from_value(args.clone()) {
            Ok(input) => input,
            Err(e) => return failed(ToolName::FindDumpSites, format!("invalid arguments: {}", e)),
        };
        if !self.dataset.is_waste_type(&input.waste_type) {
            return failed(
                ToolName::FindDumpSites,
                format!(
                    "'{}' is not a known waste type. Known types: {}",
                    input.waste_type,
                    self.dataset.waste_types.join(", ")
                )
            );
        }
        let matches = self.dataset.find_dump_sites(&input.waste_type);
        info!("{} dump site(s) accept {}", matches.len(), input.waste_type);
        ToolOutcome::DumpSites { waste_type: input.waste_type, matches }
    }
}

fn failed(tool: ToolName, message: String) -> ToolOutcome {
    warn!("Tool {} failed: {}", tool, message);
    ToolOutcome::Failed { tool, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::prompt::PromptConfig;
    use crate::llm::chat::Completion;
    use crate::llm::chat::scripted::ScriptedChatClient;
    use crate::models::waste::RiskLevel;

    fn toolbox(client: Arc<ScriptedChatClient>) -> Toolbox {
        let dataset = Arc::new(Dataset::sample());
        let analyst = Analyst::new(client, PromptConfig::builtin().unwrap(), dataset.clone());
        Toolbox::new(analyst, dataset, "Heavy rainfall expected".into())
    }

    fn call(name: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest { name: name.into(), args }
    }

    #[test]
    fn tool_names_round_trip() {
        for tool in ToolName::ALL {
            assert_eq!(ToolName::from_name(tool.as_str()), Some(tool));
        }
        assert_eq!(ToolName::from_name("FindDumpSites"), None);
    }

    #[test]
    fn declarations_constrain_waste_type() {
        let tools = toolbox(Arc::new(ScriptedChatClient::failing())).declarations();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "getFloodRisk");
        let categories = tools[1].parameters["properties"]["wasteType"]["enum"].as_array().unwrap();
        assert_eq!(categories.len(), 8);
        assert_eq!(tools[1].parameters["required"], json!(["wasteType"]));
    }

    #[tokio::test]
    async fn dump_sites_follow_dataset_order() {
        let outcome = toolbox(Arc::new(ScriptedChatClient::failing())).invoke(
            &call("findDumpSites", json!({ "wasteType": "E-waste", "location": "Sinkor" }))
        ).await;
        assert_eq!(
            outcome,
            ToolOutcome::DumpSites {
                waste_type: "E-waste".into(),
                matches: vec![DumpSiteMatch {
                    name: "Monrovia City Corporation (MCC) Recycling Center".into(),
                    address: "UN Drive, Monrovia".into(),
                }],
            }
        );
    }

    #[tokio::test]
    async fn unknown_category_is_a_failed_lookup() {
        let outcome = toolbox(Arc::new(ScriptedChatClient::failing())).invoke(
            &call("findDumpSites", json!({ "wasteType": "plastic" }))
        ).await;
        assert!(
            matches!(&outcome, ToolOutcome::Failed { tool: ToolName::FindDumpSites, message } if message.contains("'plastic'"))
        );
    }

    #[tokio::test]
    async fn flood_risk_uses_configured_forecast() {
        let client = Arc::new(
            ScriptedChatClient::new(|_| {
                Ok(Completion::Structured(json!({ "riskLevel": "High", "reasoning": "Clogged drains." })))
            })
        );
        let outcome = toolbox(client.clone()).invoke(
            &call("getFloodRisk", json!({ "areaName": "Clara Town" }))
        ).await;

        assert!(client.requests()[0].prompt.contains("Heavy rainfall expected"));
        assert_eq!(
            outcome.summary_line(),
            "getFloodRisk for Clara Town: risk level High. Clogged drains."
        );
        assert!(
            matches!(outcome, ToolOutcome::FloodRisk { assessment, .. } if assessment.risk_level == RiskLevel::High)
        );
    }

    #[tokio::test]
    async fn flood_risk_failure_is_reported() {
        let outcome = toolbox(Arc::new(ScriptedChatClient::failing())).invoke(
            &call("getFloodRisk", json!({ "areaName": "Monrovia" }))
        ).await;
        assert!(matches!(outcome, ToolOutcome::Failed { tool: ToolName::GetFloodRisk, .. }));

        let missing_args = toolbox(Arc::new(ScriptedChatClient::failing())).invoke(
            &call("getFloodRisk", json!({}))
        ).await;
        assert!(
            matches!(missing_args, ToolOutcome::Failed { message, .. } if message.starts_with("invalid arguments"))
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_stringified() {
        let outcome = toolbox(Arc::new(ScriptedChatClient::failing())).invoke(
            &call("reportWaste", json!({ "type": "Plastic" }))
        ).await;
        let line = outcome.summary_line();
        assert!(line.starts_with("reportWaste: "));
        assert!(line.contains("Tool 'reportWaste' is not available"));
    }
}
