//! Row-level workbook validation.
//!
//! Nothing here touches the database. The database import only writes rows
//! this pass accepted.

use std::collections::{HashMap, HashSet};

use crate::dates::parse_date;
use crate::import::workbook::Workbook;
use crate::jobs::ValidationSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sheet {
    Locations,
    Saints,
    Historical,
    Milestones,
}

impl Sheet {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sheet::Locations => "locations",
            Sheet::Saints => "saints",
            Sheet::Historical => "historical",
            Sheet::Milestones => "milestones",
        }
    }
}

/// One rejected row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIssue {
    pub sheet: Sheet,
    /// 1-based, as shown in a spreadsheet.
    pub row: usize,
    /// Location the row belongs to, when known.
    pub location: Option<String>,
    pub message: String,
}

impl std::fmt::Display for RowIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} row {}: {}", self.sheet.as_str(), self.row, self.message)
    }
}

/// Result of validating a workbook.
#[derive(Debug, Clone, Default)]
pub struct WorkbookValidation {
    pub summary: ValidationSummary,
    pub issues: Vec<RowIssue>,
    accepted: HashSet<(Sheet, usize)>,
}

impl WorkbookValidation {
    /// Whether the row at 0-based `index` passed.
    pub fn is_accepted(&self, sheet: Sheet, index: usize) -> bool {
        self.accepted.contains(&(sheet, index))
    }

    fn accept(&mut self, sheet: Sheet, index: usize) {
        self.accepted.insert((sheet, index));
        match sheet {
            Sheet::Locations => self.summary.locations += 1,
            Sheet::Saints => self.summary.saints += 1,
            Sheet::Historical => self.summary.years += 1,
            Sheet::Milestones => self.summary.milestones += 1,
        }
    }

    fn reject(&mut self, sheet: Sheet, index: usize, location: Option<String>, message: String) {
        let issue = RowIssue {
            sheet,
            row: index + 1,
            location,
            message,
        };
        self.summary.errors += 1;
        self.summary.error_details.push(issue.to_string());
        self.issues.push(issue);
    }
}

fn trimmed(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Checks every row and counts what an import would write.
pub fn validate_workbook(workbook: &Workbook) -> WorkbookValidation {
    let mut out = WorkbookValidation::default();

    let mut location_names: HashSet<&str> = HashSet::new();
    for (i, row) in workbook.locations.iter().enumerate() {
        let name = row.name.trim();
        if name.is_empty() {
            out.reject(Sheet::Locations, i, None, "location name is empty".into());
        } else if !location_names.insert(name) {
            out.reject(
                Sheet::Locations,
                i,
                Some(name.to_string()),
                format!("duplicate location '{}'", name),
            );
        } else {
            out.accept(Sheet::Locations, i);
        }
    }

    // saint number -> location name
    let mut saints: HashMap<&str, Option<&str>> = HashMap::new();
    for (i, row) in workbook.saints.iter().enumerate() {
        let number = row.saint_number.trim();
        let location = trimmed(row.location.as_deref());

        let problem = if number.is_empty() {
            Some("saint number is empty".to_string())
        } else if saints.contains_key(number) {
            Some(format!("duplicate saint number '{}'", number))
        } else if row.name.trim().is_empty() {
            Some(format!("saint #{}: name is empty", number))
        } else if row.saint_name.trim().is_empty() {
            Some(format!("saint #{}: saint name is empty", number))
        } else if let Err(e) = parse_date(&row.saint_date) {
            Some(format!("saint #{}: saint date: {}", number, e))
        } else if let Some(unknown) = location.filter(|l| !location_names.contains(l)) {
            Some(format!("saint #{}: unknown location '{}'", number, unknown))
        } else if row.saint_year.is_some_and(|y| y <= 0) {
            Some(format!("saint #{}: saint year must be positive", number))
        } else {
            None
        };

        match problem {
            Some(message) => out.reject(Sheet::Saints, i, location.map(String::from), message),
            None => {
                saints.insert(number, location);
                out.accept(Sheet::Saints, i);
            }
        }
    }

    let location_of = |number: &str| -> Option<String> {
        saints
            .get(number)
            .copied()
            .flatten()
            .map(String::from)
    };

    let mut seen_years: HashSet<(&str, i32)> = HashSet::new();
    for (i, row) in workbook.historical.iter().enumerate() {
        let number = row.saint_number.trim();
        let problem = if !saints.contains_key(number) {
            Some(format!("unknown saint '{}'", number))
        } else {
            match row.year {
                None => Some(format!("saint #{}: year is missing", number)),
                Some(year) if !(1900..=9999).contains(&year) => {
                    Some(format!("saint #{}: year {} is out of range", number, year))
                }
                Some(year) if !seen_years.insert((number, year)) => {
                    Some(format!("saint #{}: duplicate year {}", number, year))
                }
                Some(_) => None,
            }
        };
        match problem {
            Some(message) => out.reject(Sheet::Historical, i, location_of(number), message),
            None => out.accept(Sheet::Historical, i),
        }
    }

    let mut seen_counts: HashSet<(&str, i64)> = HashSet::new();
    let mut seen_dates: HashSet<(&str, i64)> = HashSet::new();
    for (i, row) in workbook.milestones.iter().enumerate() {
        let number = row.saint_number.trim();
        let problem = if !saints.contains_key(number) {
            Some(format!("unknown saint '{}'", number))
        } else {
            match (row.count, parse_date(&row.date)) {
                (None, _) => Some(format!("saint #{}: milestone count is missing", number)),
                (Some(count), _) if count <= 0 => Some(format!(
                    "saint #{}: milestone count must be positive, got {}",
                    number, count
                )),
                (Some(count), Err(e)) => Some(format!(
                    "saint #{}: milestone {} date: {}",
                    number, count, e
                )),
                (Some(count), Ok(parsed)) if parsed.year.is_none() => Some(format!(
                    "saint #{}: milestone {} date '{}' has no year",
                    number, count, row.date
                )),
                (Some(count), Ok(_)) if !seen_counts.insert((number, count)) => Some(format!(
                    "saint #{}: duplicate milestone {}",
                    number, count
                )),
                (Some(count), Ok(parsed))
                    if parsed
                        .event_date()
                        .is_some_and(|date| !seen_dates.insert((number, date))) =>
                {
                    Some(format!(
                        "saint #{}: milestone {} shares date '{}' with another milestone",
                        number, count, row.date
                    ))
                }
                _ => None,
            }
        };
        match problem {
            Some(message) => out.reject(Sheet::Milestones, i, location_of(number), message),
            None => out.accept(Sheet::Milestones, i),
        }
    }

    out
}
