//! Event derivation engine.
//!
//! Turns saint records (irregular date strings, per-year history, milestones)
//! into a de-duplicated set of `saint-day` and `milestone` calendar events.

pub mod derive;
pub mod generator;
pub mod model;

pub use derive::{derive_saint_events, SaintEvents};
pub use generator::EventGenerator;
pub use model::{
    DerivedEvent, EventFilter, EventKind, GenerateReport, MilestoneRecord, SaintRecord,
    YearSnapshot,
};
