//! Result payloads stored on completed jobs.

use serde::{Deserialize, Serialize};

use crate::events::GenerateReport;

/// Result of a finished job, tagged by the job type that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JobResultData {
    Validation(ValidationSummary),
    Database(DatabaseSummary),
    FullImport(FullImportSummary),
}

impl JobResultData {
    /// One-line description used as the job's completion message.
    pub fn summary_line(&self) -> String {
        match self {
            JobResultData::Validation(v) => format!(
                "Validated {} saints across {} locations, {} problems",
                v.saints, v.locations, v.errors
            ),
            JobResultData::Database(d) => format!(
                "Imported {} saints across {} locations, {} errors",
                d.saints, d.locations, d.errors
            ),
            JobResultData::FullImport(f) => format!(
                "Imported {} saints and generated {} events, {} errors",
                f.import.saints,
                f.events.events_generated,
                f.import.errors + f.events.errors.len() as u64
            ),
        }
    }
}

/// Counts found while checking a workbook without writing anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub locations: u64,
    pub saints: u64,
    pub years: u64,
    pub milestones: u64,
    pub errors: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_details: Vec<String>,
}

/// Per-location import counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationImportSummary {
    pub location: String,
    pub saints: u64,
    pub years: u64,
    pub milestones: u64,
    pub errors: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_details: Vec<String>,
}

/// Totals for a database import plus the per-location breakdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSummary {
    pub locations: u64,
    pub saints: u64,
    pub years: u64,
    pub milestones: u64,
    pub errors: u64,
    #[serde(default)]
    pub by_location: Vec<LocationImportSummary>,
}

impl DatabaseSummary {
    /// Folds one location's counts into the totals.
    pub fn add_location(&mut self, location: LocationImportSummary) {
        self.locations += 1;
        self.saints += location.saints;
        self.years += location.years;
        self.milestones += location.milestones;
        self.errors += location.errors;
        self.by_location.push(location);
    }
}

/// Database import followed by event generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullImportSummary {
    pub import: DatabaseSummary,
    pub events: GenerateReport,
}
