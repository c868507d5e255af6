//! Builders for workbooks used by the import tests.

#![allow(dead_code)]

use saintcal::import::{
    HistoricalSheetRow, LocationSheetRow, MilestoneSheetRow, SaintSheetRow, Workbook,
};

/// Builder for a single `saints` sheet row.
pub struct SaintBuilder {
    row: SaintSheetRow,
}

impl SaintBuilder {
    /// Saint `number` initiated on March 17, 2020 with no location.
    pub fn new(number: &str) -> Self {
        Self {
            row: SaintSheetRow {
                saint_number: number.to_string(),
                name: format!("Person {}", number),
                saint_name: format!("St. {}", number),
                saint_date: "03/17/2020".to_string(),
                saint_year: Some(2020),
                location: None,
            },
        }
    }

    pub fn date(mut self, date: &str) -> Self {
        self.row.saint_date = date.to_string();
        self
    }

    pub fn saint_name(mut self, name: &str) -> Self {
        self.row.saint_name = name.to_string();
        self
    }

    pub fn location(mut self, location: &str) -> Self {
        self.row.location = Some(location.to_string());
        self
    }

    pub fn build(self) -> SaintSheetRow {
        self.row
    }
}

/// Builder for `Workbook` instances.
#[derive(Default)]
pub struct WorkbookBuilder {
    workbook: Workbook,
}

impl WorkbookBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn location(mut self, name: &str) -> Self {
        self.workbook.locations.push(LocationSheetRow {
            name: name.to_string(),
            address: Some(format!("1 Main St, {}", name)),
        });
        self
    }

    pub fn saint(mut self, saint: SaintBuilder) -> Self {
        self.workbook.saints.push(saint.build());
        self
    }

    /// One `historical` row. `tap_beers` is comma-separated like the sheet cell.
    pub fn year(mut self, number: &str, year: i32, tap_beers: &str, burger: &str) -> Self {
        self.workbook.historical.push(HistoricalSheetRow {
            saint_number: number.to_string(),
            year: Some(year),
            burger: burger.to_string(),
            tap_beers: tap_beers.to_string(),
            can_beers: String::new(),
            facebook_event: String::new(),
            sticker: format!("sticker{}.png", year),
        });
        self
    }

    pub fn milestone(mut self, number: &str, count: i64, date: &str) -> Self {
        self.workbook.milestones.push(MilestoneSheetRow {
            saint_number: number.to_string(),
            count: Some(count),
            date: date.to_string(),
            sticker: None,
        });
        self
    }

    pub fn build(self) -> Workbook {
        self.workbook
    }
}

/// Two locations, three saints (one without a location), history and one
/// milestone. Every row is valid.
pub fn sample_workbook() -> Workbook {
    WorkbookBuilder::new()
        .location("Austin")
        .location("Dallas")
        .saint(SaintBuilder::new("1").location("Austin"))
        .saint(SaintBuilder::new("2").date("2021-07-04").location("Dallas"))
        .saint(SaintBuilder::new("3").date("February 29, 2020"))
        .year("1", 2022, "Lager", "Classic")
        .year("1", 2023, "Stout, Pils", "Smoky Outlaw")
        .milestone("1", 1000, "2023-11-05")
        .build()
}
