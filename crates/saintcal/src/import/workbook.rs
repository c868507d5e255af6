//! Spreadsheet workbooks and where they come from.
//!
//! A workbook has four sheets: `locations`, `saints`, `historical` (one row
//! per saint and year) and `milestones`. Multi-valued cells such as tap beers
//! are comma-separated, as exported from the source spreadsheets.
//!
//! A spreadsheet is stored either as `<id>.json` or as a directory `<id>/`
//! of `;`-delimited CSV exports (see [`csv_sheets`](super::csv_sheets)).

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ImportError;
use crate::events::model::{MilestoneRecord, YearSnapshot};
use crate::import::csv_sheets;

static RE_SPREADSHEET_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,127}$").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workbook {
    #[serde(default)]
    pub locations: Vec<LocationSheetRow>,
    #[serde(default)]
    pub saints: Vec<SaintSheetRow>,
    #[serde(default)]
    pub historical: Vec<HistoricalSheetRow>,
    #[serde(default)]
    pub milestones: Vec<MilestoneSheetRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationSheetRow {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Address")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaintSheetRow {
    #[serde(alias = "Saint Number")]
    pub saint_number: String,
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Saint Name")]
    pub saint_name: String,
    #[serde(alias = "Saint Date")]
    pub saint_date: String,
    #[serde(alias = "Saint Year")]
    pub saint_year: Option<i32>,
    /// Location name; must appear on the `locations` sheet when set.
    #[serde(alias = "Location")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoricalSheetRow {
    #[serde(alias = "Saint Number")]
    pub saint_number: String,
    #[serde(alias = "Year")]
    pub year: Option<i32>,
    #[serde(alias = "Historical Burger")]
    pub burger: String,
    #[serde(alias = "Historical Tap Beers")]
    pub tap_beers: String,
    #[serde(alias = "Historical Can Beers")]
    pub can_beers: String,
    #[serde(alias = "Historical Facebook Event")]
    pub facebook_event: String,
    #[serde(alias = "Historical Sticker")]
    pub sticker: String,
}

impl HistoricalSheetRow {
    /// Snapshot for storage. Call only after `year` has been validated.
    pub fn to_snapshot(&self) -> YearSnapshot {
        let mut beverages = split_cell(&self.tap_beers);
        beverages.extend(split_cell(&self.can_beers));
        YearSnapshot {
            year: self.year.unwrap_or_default(),
            beverages,
            food: non_blank(&self.burger).into_iter().collect(),
            media_links: non_blank(&self.facebook_event).into_iter().collect(),
            sticker: non_blank(&self.sticker),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MilestoneSheetRow {
    #[serde(alias = "Saint Number")]
    pub saint_number: String,
    #[serde(alias = "Count")]
    pub count: Option<i64>,
    #[serde(alias = "Date")]
    pub date: String,
    #[serde(alias = "Sticker")]
    pub sticker: Option<String>,
}

impl MilestoneSheetRow {
    /// Record for storage. Call only after `count` has been validated.
    pub fn to_record(&self) -> MilestoneRecord {
        MilestoneRecord {
            count: self.count.unwrap_or_default(),
            date: self.date.trim().to_string(),
            sticker: self.sticker.as_deref().and_then(non_blank),
        }
    }
}

fn split_cell(cell: &str) -> Vec<String> {
    cell.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Checks that a spreadsheet id is a plain token, never a path.
pub fn validate_spreadsheet_id(id: &str) -> Result<(), ImportError> {
    if RE_SPREADSHEET_ID.is_match(id) {
        Ok(())
    } else {
        Err(ImportError::InvalidSpreadsheetId(id.to_string()))
    }
}

/// Something that can produce a workbook for a spreadsheet id.
pub trait SpreadsheetSource: Send + Sync {
    fn load(&self, spreadsheet_id: &str) -> Result<Workbook, ImportError>;
}

/// Reads `<dir>/<spreadsheet_id>.json`, falling back to the CSV sheets in
/// `<dir>/<spreadsheet_id>/`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, spreadsheet_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", spreadsheet_id))
    }

    pub fn csv_dir_for(&self, spreadsheet_id: &str) -> PathBuf {
        self.dir.join(spreadsheet_id)
    }
}

impl SpreadsheetSource for DirectorySource {
    fn load(&self, spreadsheet_id: &str) -> Result<Workbook, ImportError> {
        validate_spreadsheet_id(spreadsheet_id)?;
        let path = self.path_for(spreadsheet_id);

        let workbook = match std::fs::read_to_string(&path) {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|source| ImportError::Parse {
                    id: spreadsheet_id.to_string(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let csv_dir = self.csv_dir_for(spreadsheet_id);
                if !csv_dir.is_dir() {
                    return Err(ImportError::NotFound {
                        id: spreadsheet_id.to_string(),
                        path,
                    });
                }
                csv_sheets::read_workbook(spreadsheet_id, &csv_dir)?
            }
            Err(source) => return Err(ImportError::Read { path, source }),
        };

        log::debug!(
            "Loaded workbook '{}': {} locations, {} saints, {} historical rows, {} milestones",
            spreadsheet_id,
            workbook.locations.len(),
            workbook.saints.len(),
            workbook.historical.len(),
            workbook.milestones.len()
        );
        Ok(workbook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_spreadsheet_id_rules() {
        assert!(validate_spreadsheet_id("march-2024_import").is_ok());
        for bad in ["", "../etc/passwd", "a/b", "-leading", "has space"] {
            assert!(
                matches!(
                    validate_spreadsheet_id(bad),
                    Err(ImportError::InvalidSpreadsheetId(_))
                ),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_historical_row_to_snapshot() {
        let row = HistoricalSheetRow {
            saint_number: "7".into(),
            year: Some(2023),
            burger: "The Smoky Outlaw - bacon on a brioche bun".into(),
            tap_beers: "Pliny the Elder, Heady Topper".into(),
            can_beers: " Tecate ,".into(),
            facebook_event: "".into(),
            sticker: "sticker123.png".into(),
        };
        let snapshot = row.to_snapshot();
        assert_eq!(snapshot.year, 2023);
        assert_eq!(
            snapshot.beverages,
            vec!["Pliny the Elder", "Heady Topper", "Tecate"]
        );
        assert_eq!(snapshot.food.len(), 1);
        assert!(snapshot.media_links.is_empty());
        assert_eq!(snapshot.sticker.as_deref(), Some("sticker123.png"));
    }

    #[test]
    fn test_directory_source_loads_and_classifies_errors() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("good.json"),
            r#"{"locations":[{"name":"Austin"}],"saints":[{"saintNumber":"1","name":"Pat","saintName":"St. Pat","saintDate":"03/17/2020","location":"Austin"}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let source = DirectorySource::new(dir.path());
        let workbook = source.load("good").unwrap();
        assert_eq!(workbook.saints[0].location.as_deref(), Some("Austin"));
        assert!(workbook.historical.is_empty());

        let missing = source.load("absent").unwrap_err();
        assert!(matches!(missing, ImportError::NotFound { .. }));
        assert!(missing.is_permanent());

        let broken = source.load("broken").unwrap_err();
        assert!(matches!(broken, ImportError::Parse { .. }));
        assert!(broken.is_permanent());
    }
}
