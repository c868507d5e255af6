pub mod csv_sheets;
pub mod loader;
pub mod runner;
pub mod validate;
pub mod workbook;

pub use csv_sheets::HISTORICAL_HEADERS;
pub use loader::{import_workbook, ImportOutcome, UNASSIGNED};
pub use runner::ImportRunner;
pub use validate::{validate_workbook, RowIssue, Sheet, WorkbookValidation};
pub use workbook::{
    validate_spreadsheet_id, DirectorySource, HistoricalSheetRow, LocationSheetRow,
    MilestoneSheetRow, SaintSheetRow, SpreadsheetSource, Workbook,
};
