//! Workbooks exported as one `;`-delimited CSV file per sheet.
//!
//! The historical sheet keeps the spreadsheet's own column titles
//! (`Historical Burger`, `Historical Tap Beers`, ...) behind a leading
//! `Saint Number` and `Year`. Every value may be quoted. A sheet file that is
//! absent reads as an empty sheet.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::ImportError;
use crate::import::workbook::Workbook;

/// Header row expected in `historical.csv`.
pub const HISTORICAL_HEADERS: [&str; 7] = [
    "Saint Number",
    "Year",
    "Historical Burger",
    "Historical Tap Beers",
    "Historical Can Beers",
    "Historical Facebook Event",
    "Historical Sticker",
];

/// Reads `locations.csv`, `saints.csv`, `historical.csv` and
/// `milestones.csv` from `dir`.
pub fn read_workbook(spreadsheet_id: &str, dir: &Path) -> Result<Workbook, ImportError> {
    Ok(Workbook {
        locations: read_sheet(spreadsheet_id, dir, "locations")?,
        saints: read_sheet(spreadsheet_id, dir, "saints")?,
        historical: read_sheet(spreadsheet_id, dir, "historical")?,
        milestones: read_sheet(spreadsheet_id, dir, "milestones")?,
    })
}

fn read_sheet<T: DeserializeOwned>(
    spreadsheet_id: &str,
    dir: &Path,
    sheet: &'static str,
) -> Result<Vec<T>, ImportError> {
    let path = dir.join(format!("{}.csv", sheet));
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("Spreadsheet '{}' has no {} sheet", spreadsheet_id, sheet);
            return Ok(Vec::new());
        }
        Err(source) => return Err(ImportError::Read { path, source }),
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: T = result.map_err(|source| ImportError::Csv {
            id: spreadsheet_id.to_string(),
            sheet,
            source,
        })?;
        rows.push(row);
    }
    Ok(rows)
}
