use serde::{ Deserialize, Serialize };
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WasteReport {
    pub id: u32,
    #[serde(rename = "type")]
    pub waste_type: String,
    pub description: String,
    pub location: GeoPoint,
    pub location_name: String,
    pub photo: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Severe,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High, RiskLevel::Severe];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Severe => "Severe",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloodZone {
    pub id: u32,
    pub name: String,
    pub risk_level: RiskLevel,
    pub polygon: Vec<GeoPoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpSite {
    pub id: u32,
    pub name: String,
    pub address: String,
    pub location: GeoPoint,
    pub accepted_waste: Vec<String>,
    pub phone: String,
}

impl DumpSite {
    pub fn accepts(&self, waste_type: &str) -> bool {
        self.accepted_waste.iter().any(|w| w == waste_type)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpSiteMatch {
    pub name: String,
    pub address: String,
}

impl From<&DumpSite> for DumpSiteMatch {
    fn from(site: &DumpSite) -> Self {
        Self { name: site.name.clone(), address: site.address.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloodRiskAssessment {
    pub risk_level: RiskLevel,
    pub reasoning: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WastePhotoAnalysis {
    pub waste_type: String,
    pub reasoning: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlasticAccumulation {
    pub plastic_accumulation_zones: Vec<String>,
}
