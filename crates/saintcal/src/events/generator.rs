//! Reconciles derived events against storage.

use std::ops::ControlFlow;

use chrono::{Datelike, Utc};
use log::{debug, info, warn};
use tracing::info_span;

use crate::db::{event_repo, saint_repo, Database, DatabaseError};
use crate::error::EventError;
use crate::events::derive::derive_saint_events;
use crate::events::model::{DerivedEvent, EventFilter, GenerateReport, SaintRecord};

/// What happened to one candidate event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconciled {
    Created,
    Updated,
    Skipped,
}

/// Computes saint-day and milestone events and writes them back.
///
/// Holds no state between runs; everything lives in the database.
#[derive(Clone)]
pub struct EventGenerator {
    db: Database,
    year: i32,
}

impl EventGenerator {
    /// Creates a generator targeting the current UTC year.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            year: Utc::now().year(),
        }
    }

    /// Targets saint-day events at `year` instead of the current one.
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = year;
        self
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Incremental generation: creates missing events, updates existing ones
    /// only when `force` is set, and never deletes.
    pub fn generate(&self, filter: &EventFilter, force: bool) -> Result<GenerateReport, EventError> {
        self.generate_until(filter, force, |_, _| ControlFlow::Continue(()))
    }

    /// Like [`generate`](Self::generate), consulting `checkpoint` before each
    /// saint with `(index, total)`. Returning `Break` stops the run and the
    /// partial report is returned.
    pub fn generate_until<F>(
        &self,
        filter: &EventFilter,
        force: bool,
        mut checkpoint: F,
    ) -> Result<GenerateReport, EventError>
    where
        F: FnMut(usize, usize) -> ControlFlow<()>,
    {
        validate_filter(filter)?;
        let _span = info_span!("events.generate", year = self.year, force).entered();

        let saints = self.db.with_conn(|conn| saint_repo::find_saints(conn, filter))?;
        let mut report = GenerateReport::default();

        if saints.is_empty() {
            info!("No saints matched filter {:?}", filter);
            return Ok(report);
        }

        let total = saints.len();
        for (index, saint) in saints.iter().enumerate() {
            if checkpoint(index, total).is_break() {
                info!(
                    "Event generation stopped after {} of {} saints",
                    index, total
                );
                break;
            }
            self.process_saint(saint, force, &mut report);
        }

        info!(
            "Generated {} events ({} created, {} updated, {} skipped) for {} saints, {} errors",
            report.events_generated,
            report.events_created,
            report.events_updated,
            report.events_skipped,
            report.saints_processed,
            report.errors.len()
        );

        Ok(report)
    }

    /// Bulk regeneration: deletes every event, then recomputes all saints.
    ///
    /// Events are absent between the delete and the recompute.
    pub fn regenerate_all(&self) -> Result<GenerateReport, EventError> {
        let deleted = self.db.with_tx(|tx| event_repo::delete_all(tx))?;
        info!("Deleted {} events before full regeneration", deleted);
        self.generate(&EventFilter::default(), true)
    }

    fn process_saint(&self, saint: &SaintRecord, force: bool, report: &mut GenerateReport) {
        report.saints_processed += 1;

        let derived = match derive_saint_events(saint, self.year) {
            Ok(derived) => derived,
            Err(e) => {
                warn!("Skipping {}: {}", saint.label(), e);
                report
                    .errors
                    .push(format!("{}: invalid saint date: {}", saint.label(), e));
                return;
            }
        };
        report.errors.extend(derived.errors);

        for event in &derived.events {
            match self.reconcile(event, force) {
                Ok(Reconciled::Created) => {
                    report.events_created += 1;
                    report.events_generated += 1;
                }
                Ok(Reconciled::Updated) => {
                    report.events_updated += 1;
                    report.events_generated += 1;
                }
                Ok(Reconciled::Skipped) => report.events_skipped += 1,
                Err(e) => {
                    warn!(
                        "Failed to store {} event {} for {}: {}",
                        event.event_kind,
                        event.date,
                        saint.label(),
                        e
                    );
                    report.errors.push(format!(
                        "{}: failed to store {} event for {}: {}",
                        saint.label(),
                        event.event_kind,
                        event.date,
                        e
                    ));
                }
            }
        }
    }

    /// Each event is its own transaction.
    fn reconcile(&self, event: &DerivedEvent, force: bool) -> Result<Reconciled, DatabaseError> {
        self.db.with_tx(|tx| {
            match event_repo::find_by_key(tx, event.saint_id, event.date, event.event_kind)? {
                Some(_) if !force => Ok(Reconciled::Skipped),
                Some(existing) => {
                    let id = existing.id.unwrap_or_default();
                    event_repo::update(tx, id, event)?;
                    debug!("Updated event {} ({} {})", id, event.event_kind, event.date);
                    Ok(Reconciled::Updated)
                }
                None => {
                    let id = event_repo::insert(tx, event)?;
                    debug!("Created event {} ({} {})", id, event.event_kind, event.date);
                    Ok(Reconciled::Created)
                }
            }
        })
    }
}

fn validate_filter(filter: &EventFilter) -> Result<(), EventError> {
    if let Some(id) = filter.location_id {
        if id <= 0 {
            return Err(EventError::InvalidFilter(format!(
                "locationId must be positive, got {}",
                id
            )));
        }
    }
    if let Some(id) = filter.saint_id {
        if id <= 0 {
            return Err(EventError::InvalidFilter(format!(
                "saintId must be positive, got {}",
                id
            )));
        }
    }
    if let Some(ref number) = filter.saint_number {
        if number.trim().is_empty() {
            return Err(EventError::InvalidFilter(
                "saintNumber must not be blank".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::saint_repo::NewSaint;
    use crate::events::model::{EventKind, MilestoneRecord, YearSnapshot};

    fn add_saint(db: &Database, number: &str, date: &str) -> i64 {
        db.with_conn(|conn| {
            saint_repo::upsert_saint(
                conn,
                &NewSaint {
                    saint_number: number.to_string(),
                    name: format!("Person {}", number),
                    saint_name: format!("St. {}", number),
                    saint_date: date.to_string(),
                    saint_year: Some(2020),
                    location_id: None,
                },
            )
        })
        .unwrap()
    }

    fn event_count(db: &Database) -> u64 {
        db.with_conn(|conn| event_repo::count(conn)).unwrap()
    }

    #[test]
    fn test_generate_is_idempotent_without_force() {
        let db = Database::open_in_memory().unwrap();
        let id = add_saint(&db, "1", "2024-03-17");
        let generator = EventGenerator::new(db.clone()).with_year(2025);

        let first = generator.generate(&EventFilter::saint(id), false).unwrap();
        assert_eq!(first.events_generated, 1);
        assert!(first.errors.is_empty());

        let second = generator.generate(&EventFilter::saint(id), false).unwrap();
        assert_eq!(second.events_generated, 0);
        assert_eq!(second.events_skipped, 1);
        assert!(second.errors.is_empty());
        assert_eq!(event_count(&db), 1);
    }

    #[test]
    fn test_force_updates_in_place() {
        let db = Database::open_in_memory().unwrap();
        let id = add_saint(&db, "1", "03/17/2024");
        let generator = EventGenerator::new(db.clone()).with_year(2025);
        generator.generate(&EventFilter::saint(id), false).unwrap();

        db.with_conn(|conn| {
            saint_repo::upsert_year(
                conn,
                id,
                &YearSnapshot {
                    year: 2025,
                    beverages: vec!["Pliny the Elder".to_string()],
                    ..Default::default()
                },
            )
        })
        .unwrap();

        let report = generator.generate(&EventFilter::saint(id), true).unwrap();
        assert_eq!(report.events_updated, 1);
        assert_eq!(report.events_created, 0);
        assert_eq!(event_count(&db), 1);

        let stored = db
            .with_conn(|conn| event_repo::find_by_key(conn, id, 20250317, EventKind::SaintDay))
            .unwrap()
            .unwrap();
        assert_eq!(stored.beverages, vec!["Pliny the Elder"]);
    }

    #[test]
    fn test_mixed_validity_batch() {
        let db = Database::open_in_memory().unwrap();
        add_saint(&db, "1", "2024-03-17");
        add_saint(&db, "2", "not-a-date");
        add_saint(&db, "3", "12/01/2020");
        let generator = EventGenerator::new(db.clone()).with_year(2025);

        let report = generator.generate(&EventFilter::default(), false).unwrap();
        assert_eq!(report.saints_processed, 3);
        assert_eq!(report.events_generated, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("saint #2"));
    }

    #[test]
    fn test_empty_selection_is_not_an_error() {
        let db = Database::open_in_memory().unwrap();
        let generator = EventGenerator::new(db);
        let report = generator
            .generate(&EventFilter::saint_number("404"), false)
            .unwrap();
        assert!(report.is_empty_selection());
        assert_eq!(report.events_generated, 0);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let db = Database::open_in_memory().unwrap();
        let generator = EventGenerator::new(db);
        assert!(matches!(
            generator.generate(&EventFilter::saint(0), false),
            Err(EventError::InvalidFilter(_))
        ));
        assert!(matches!(
            generator.generate(&EventFilter::saint_number("  "), false),
            Err(EventError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_regenerate_all_replaces_events() {
        let db = Database::open_in_memory().unwrap();
        let id = add_saint(&db, "1", "2024-03-17");
        db.with_conn(|conn| {
            saint_repo::upsert_milestone(
                conn,
                id,
                &MilestoneRecord {
                    count: 1000,
                    date: "2023-11-05".to_string(),
                    sticker: None,
                },
            )
        })
        .unwrap();

        let generator = EventGenerator::new(db.clone()).with_year(2025);
        let first = generator.regenerate_all().unwrap();
        assert_eq!(first.events_created, 2);
        let second = generator.regenerate_all().unwrap();
        assert_eq!(second.events_created, 2);
        assert_eq!(event_count(&db), 2);
    }

    #[test]
    fn test_milestones_sharing_a_date_are_reported() {
        let db = Database::open_in_memory().unwrap();
        let id = add_saint(&db, "1", "2024-03-17");
        db.with_conn(|conn| {
            for count in [500, 1000] {
                saint_repo::upsert_milestone(
                    conn,
                    id,
                    &MilestoneRecord {
                        count,
                        date: "2023-11-05".to_string(),
                        sticker: None,
                    },
                )?;
            }
            Ok(())
        })
        .unwrap();
        let generator = EventGenerator::new(db.clone()).with_year(2025);

        let first = generator.generate(&EventFilter::saint(id), false).unwrap();
        assert_eq!(first.events_created, 2);
        assert_eq!(first.events_skipped, 0);
        assert_eq!(first.errors.len(), 1);
        assert!(first.errors[0].contains("milestone 500 skipped"));

        let forced = generator.generate(&EventFilter::saint(id), true).unwrap();
        assert_eq!(forced.events_updated, 2);
        assert_eq!(event_count(&db), 2);

        let stored = db
            .with_conn(|conn| event_repo::find_by_key(conn, id, 20231105, EventKind::Milestone))
            .unwrap()
            .unwrap();
        assert_eq!(stored.milestone_count, Some(1000));
    }

    #[test]
    fn test_checkpoint_stops_between_saints() {
        let db = Database::open_in_memory().unwrap();
        add_saint(&db, "1", "2024-03-17");
        add_saint(&db, "2", "2024-04-17");
        let generator = EventGenerator::new(db.clone()).with_year(2025);

        let report = generator
            .generate_until(&EventFilter::default(), false, |index, _| {
                if index >= 1 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(report.saints_processed, 1);
        assert_eq!(event_count(&db), 1);
    }
}
