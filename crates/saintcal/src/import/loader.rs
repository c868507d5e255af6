//! Writes a validated workbook to the database, one transaction per location.

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;

use crate::db::saint_repo::{self, NewSaint};
use crate::db::Database;
use crate::error::ImportError;
use crate::import::validate::{Sheet, WorkbookValidation};
use crate::import::workbook::{LocationSheetRow, Workbook};
use crate::jobs::{DatabaseSummary, LocationImportSummary};
use crate::worker::Aborted;

/// Name used in summaries for saints without a location.
pub const UNASSIGNED: &str = "(unassigned)";

/// What an import wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportOutcome {
    pub summary: DatabaseSummary,
    /// Ids of the locations written, in workbook order.
    pub location_ids: Vec<i64>,
    /// Ids of saints written without a location.
    pub unassigned_saint_ids: Vec<i64>,
}

struct GroupImport {
    summary: LocationImportSummary,
    location_id: Option<i64>,
    saint_ids: Vec<i64>,
}

fn trimmed(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Upserts every accepted row.
///
/// Rows are grouped by location and each group commits on its own, so a
/// failure leaves earlier locations in place. `checkpoint` is called with
/// `(index, total)` before each group and stops the import on error.
pub fn import_workbook<F>(
    db: &Database,
    workbook: &Workbook,
    validation: &WorkbookValidation,
    mut checkpoint: F,
) -> Result<ImportOutcome, ImportError>
where
    F: FnMut(usize, usize) -> Result<(), Aborted>,
{
    let locations: Vec<&LocationSheetRow> = workbook
        .locations
        .iter()
        .enumerate()
        .filter(|(i, _)| validation.is_accepted(Sheet::Locations, *i))
        .map(|(_, row)| row)
        .collect();
    let known: HashSet<&str> = locations.iter().map(|l| l.name.trim()).collect();

    // saint number -> location name
    let saint_group: HashMap<&str, Option<&str>> = workbook
        .saints
        .iter()
        .enumerate()
        .filter(|(i, _)| validation.is_accepted(Sheet::Saints, *i))
        .map(|(_, row)| (row.saint_number.trim(), trimmed(row.location.as_deref())))
        .collect();

    let has_unassigned = saint_group.values().any(Option::is_none)
        || validation
            .issues
            .iter()
            .any(|issue| trimmed(issue.location.as_deref()).map_or(true, |l| !known.contains(l)));

    let mut groups: Vec<Option<&LocationSheetRow>> = locations.into_iter().map(Some).collect();
    if has_unassigned {
        groups.push(None);
    }

    let mut outcome = ImportOutcome::default();
    let total = groups.len();
    for (index, group) in groups.into_iter().enumerate() {
        checkpoint(index, total)?;

        let imported = db.with_tx(|tx| {
            import_group(tx, workbook, validation, &saint_group, &known, group)
        })?;
        log::info!(
            "Imported location '{}': {} saints, {} years, {} milestones, {} errors",
            imported.summary.location,
            imported.summary.saints,
            imported.summary.years,
            imported.summary.milestones,
            imported.summary.errors
        );

        match imported.location_id {
            Some(id) => outcome.location_ids.push(id),
            None => outcome.unassigned_saint_ids.extend(&imported.saint_ids),
        }
        outcome.summary.add_location(imported.summary);
    }

    Ok(outcome)
}

fn import_group(
    conn: &Connection,
    workbook: &Workbook,
    validation: &WorkbookValidation,
    saint_group: &HashMap<&str, Option<&str>>,
    known: &HashSet<&str>,
    group: Option<&LocationSheetRow>,
) -> Result<GroupImport, ImportError> {
    let key = group.map(|l| l.name.trim());
    let location_id = match group {
        Some(location) => Some(saint_repo::upsert_location(
            conn,
            location.name.trim(),
            trimmed(location.address.as_deref()),
        )?),
        None => None,
    };

    let mut summary = LocationImportSummary {
        location: key.unwrap_or(UNASSIGNED).to_string(),
        ..Default::default()
    };

    let mut ids: HashMap<&str, i64> = HashMap::new();
    for (i, row) in workbook.saints.iter().enumerate() {
        let number = row.saint_number.trim();
        if !validation.is_accepted(Sheet::Saints, i)
            || saint_group.get(number).copied().flatten() != key
        {
            continue;
        }
        let id = saint_repo::upsert_saint(
            conn,
            &NewSaint {
                saint_number: number.to_string(),
                name: row.name.trim().to_string(),
                saint_name: row.saint_name.trim().to_string(),
                saint_date: row.saint_date.trim().to_string(),
                saint_year: row.saint_year,
                location_id,
            },
        )?;
        ids.insert(number, id);
        summary.saints += 1;
    }

    for (i, row) in workbook.historical.iter().enumerate() {
        if !validation.is_accepted(Sheet::Historical, i) {
            continue;
        }
        if let Some(&saint_id) = ids.get(row.saint_number.trim()) {
            saint_repo::upsert_year(conn, saint_id, &row.to_snapshot())?;
            summary.years += 1;
        }
    }

    for (i, row) in workbook.milestones.iter().enumerate() {
        if !validation.is_accepted(Sheet::Milestones, i) {
            continue;
        }
        if let Some(&saint_id) = ids.get(row.saint_number.trim()) {
            saint_repo::upsert_milestone(conn, saint_id, &row.to_record())?;
            summary.milestones += 1;
        }
    }

    for issue in &validation.issues {
        let issue_group = trimmed(issue.location.as_deref()).filter(|l| known.contains(l));
        if issue_group == key {
            summary.errors += 1;
            summary.error_details.push(issue.to_string());
        }
    }

    Ok(GroupImport {
        summary,
        location_id,
        saint_ids: ids.into_values().collect(),
    })
}
