//! Executes queued import jobs.

use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::info_span;

use crate::db::Database;
use crate::error::ImportError;
use crate::events::{EventFilter, EventGenerator, GenerateReport};
use crate::import::loader::{import_workbook, ImportOutcome};
use crate::import::validate::{validate_workbook, WorkbookValidation};
use crate::import::workbook::{SpreadsheetSource, Workbook};
use crate::jobs::{FullImportSummary, JobResultData, JobType};
use crate::worker::{Aborted, JobContext, JobExecutor, QueuedJob};

/// Maps `index` of `total` onto the `lo..hi` progress band.
fn scaled(lo: u8, hi: u8, index: usize, total: usize) -> u8 {
    if total == 0 {
        return lo;
    }
    let span = usize::from(hi.saturating_sub(lo));
    lo + (span * index / total) as u8
}

/// Runs validation, database and full imports against a spreadsheet source.
#[derive(Clone)]
pub struct ImportRunner {
    db: Database,
    source: Arc<dyn SpreadsheetSource>,
    default_spreadsheet_id: Option<String>,
    event_year: Option<i32>,
}

impl ImportRunner {
    pub fn new(db: Database, source: Arc<dyn SpreadsheetSource>) -> Self {
        Self {
            db,
            source,
            default_spreadsheet_id: None,
            event_year: None,
        }
    }

    /// Spreadsheet used when a job names none.
    pub fn with_default_spreadsheet(mut self, id: Option<String>) -> Self {
        self.default_spreadsheet_id = id.filter(|s| !s.trim().is_empty());
        self
    }

    /// Pins the saint-day year for full imports; defaults to the current year.
    pub fn with_event_year(mut self, year: i32) -> Self {
        self.event_year = Some(year);
        self
    }

    fn spreadsheet_id<'a>(&'a self, job: &'a QueuedJob) -> Result<&'a str, ImportError> {
        job.spreadsheet_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or(self.default_spreadsheet_id.as_deref())
            .ok_or(ImportError::MissingSpreadsheet)
    }

    fn load_and_validate(
        &self,
        spreadsheet_id: &str,
        ctx: &JobContext,
    ) -> Result<(Workbook, WorkbookValidation), ImportError> {
        ctx.report(5, &format!("Loading spreadsheet {}", spreadsheet_id))?;
        let workbook = self.source.load(spreadsheet_id)?;
        ctx.checkpoint()?;

        ctx.report(15, "Validating rows")?;
        let validation = validate_workbook(&workbook);
        for issue in &validation.issues {
            ctx.logger().warn(&issue.to_string());
        }
        ctx.logger().info(&format!(
            "Validated {} locations, {} saints, {} years, {} milestones with {} errors",
            validation.summary.locations,
            validation.summary.saints,
            validation.summary.years,
            validation.summary.milestones,
            validation.summary.errors
        ));
        Ok((workbook, validation))
    }

    fn import(
        &self,
        workbook: &Workbook,
        validation: &WorkbookValidation,
        ctx: &JobContext,
        band: (u8, u8),
    ) -> Result<ImportOutcome, ImportError> {
        import_workbook(&self.db, workbook, validation, |index, total| {
            ctx.checkpoint()?;
            ctx.report(
                scaled(band.0, band.1, index, total),
                &format!("Importing location {} of {}", index + 1, total),
            )
        })
    }

    fn generate(
        &self,
        outcome: &ImportOutcome,
        ctx: &JobContext,
        band: (u8, u8),
    ) -> Result<GenerateReport, ImportError> {
        let mut generator = EventGenerator::new(self.db.clone());
        if let Some(year) = self.event_year {
            generator = generator.with_year(year);
        }

        let filters: Vec<EventFilter> = outcome
            .location_ids
            .iter()
            .map(|&id| EventFilter::location(id))
            .chain(outcome.unassigned_saint_ids.iter().map(|&id| EventFilter::saint(id)))
            .collect();

        let mut report = GenerateReport::default();
        let total = filters.len();
        for (index, filter) in filters.iter().enumerate() {
            ctx.report(
                scaled(band.0, band.1, index, total),
                &format!("Generating events ({} of {})", index + 1, total),
            )?;

            let mut stopped: Option<Aborted> = None;
            let part = generator.generate_until(filter, true, |_, _| match ctx.checkpoint() {
                Ok(()) => ControlFlow::Continue(()),
                Err(abort) => {
                    stopped = Some(abort);
                    ControlFlow::Break(())
                }
            })?;
            report.merge(part);

            if let Some(abort) = stopped {
                return Err(abort.into());
            }
        }

        for error in &report.errors {
            ctx.logger().warn(error);
        }
        Ok(report)
    }
}

impl JobExecutor for ImportRunner {
    fn execute(&self, job: &QueuedJob, ctx: &JobContext) -> Result<JobResultData, ImportError> {
        let _span = info_span!("import.run", job_id = %job.job_id, job_type = %job.job_type).entered();

        let spreadsheet_id = self.spreadsheet_id(job)?;
        let (workbook, validation) = self.load_and_validate(spreadsheet_id, ctx)?;
        ctx.checkpoint()?;

        match job.job_type {
            JobType::Validation => Ok(JobResultData::Validation(validation.summary)),
            JobType::Database => {
                let outcome = self.import(&workbook, &validation, ctx, (20, 95))?;
                Ok(JobResultData::Database(outcome.summary))
            }
            JobType::FullImport => {
                let outcome = self.import(&workbook, &validation, ctx, (20, 60))?;
                let events = self.generate(&outcome, ctx, (60, 95))?;
                Ok(JobResultData::FullImport(FullImportSummary {
                    import: outcome.summary,
                    events,
                }))
            }
        }
    }
}
