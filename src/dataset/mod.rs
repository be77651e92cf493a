//! Read-only mock data that stands in for a real backend.

mod sample;

use crate::models::waste::{ DumpSite, DumpSiteMatch, FloodZone, WasteReport };
use log::info;
use serde::{ Deserialize, Serialize };
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset file IO error: {0}")] Io(#[from] std::io::Error),
    #[error("Dataset JSON parsing error: {0}")] Json(#[from] serde_json::Error),
    #[error("Dataset is invalid: {0}")] Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub waste_types: Vec<String>,
    pub reports: Vec<WasteReport>,
    pub flood_zones: Vec<FloodZone>,
    pub dump_sites: Vec<DumpSite>,
}

impl Dataset {
    pub fn sample() -> Self {
        sample::dataset()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let text = fs::read_to_string(&path)?;
        let dataset: Dataset = serde_json::from_str(&text)?;
        dataset.validate()?;
        info!(
            "Loaded dataset from {}: {} waste types, {} reports, {} flood zones, {} dump sites",
            path.as_ref().display(),
            dataset.waste_types.len(),
            dataset.reports.len(),
            dataset.flood_zones.len(),
            dataset.dump_sites.len()
        );
        Ok(dataset)
    }

    fn validate(&self) -> Result<(), DatasetError> {
        if self.waste_types.is_empty() {
            return Err(DatasetError::Invalid("at least one waste type is required".into()));
        }
        for site in &self.dump_sites {
            if let Some(unknown) = site.accepted_waste.iter().find(|w| !self.is_waste_type(w)) {
                return Err(
                    DatasetError::Invalid(
                        format!("dump site '{}' accepts unknown waste type '{}'", site.name, unknown)
                    )
                );
            }
        }
        Ok(())
    }

    /// Case-sensitive membership in the configured categories.
    pub fn is_waste_type(&self, candidate: &str) -> bool {
        self.waste_types.iter().any(|t| t == candidate)
    }

    pub fn dump_sites_accepting<'a>(
        &'a self,
        waste_type: &'a str
    ) -> impl Iterator<Item = &'a DumpSite> + 'a {
        self.dump_sites.iter().filter(move |site| site.accepts(waste_type))
    }

    pub fn find_dump_sites(&self, waste_type: &str) -> Vec<DumpSiteMatch> {
        self.dump_sites_accepting(waste_type).map(DumpSiteMatch::from).collect()
    }
}
