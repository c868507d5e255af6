//! Saint records (read-only input) and derived calendar events (output).

use serde::{Deserialize, Serialize};

/// A saint's per-calendar-year historical data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSnapshot {
    pub year: i32,
    #[serde(default)]
    pub beverages: Vec<String>,
    #[serde(default)]
    pub food: Vec<String>,
    #[serde(default)]
    pub media_links: Vec<String>,
    #[serde(default)]
    pub sticker: Option<String>,
}

/// A beverage-count threshold reached on a specific date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneRecord {
    pub count: i64,
    /// Unnormalized date string, parsed with the same rules as `saint_date`.
    pub date: String,
    #[serde(default)]
    pub sticker: Option<String>,
}

/// Canonical identity and dates for a saint, with its history attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaintRecord {
    pub id: i64,
    pub saint_number: String,
    /// Display (real) name.
    pub name: String,
    pub saint_name: String,
    /// Unnormalized initiation date in any accepted format.
    pub saint_date: String,
    pub saint_year: Option<i32>,
    pub location_id: Option<i64>,
    pub location_name: Option<String>,
    #[serde(default)]
    pub years: Vec<YearSnapshot>,
    #[serde(default)]
    pub milestones: Vec<MilestoneRecord>,
}

impl SaintRecord {
    /// Snapshot for `year`, falling back to the most recent one available.
    pub fn snapshot_for(&self, year: i32) -> Option<&YearSnapshot> {
        self.years
            .iter()
            .find(|s| s.year == year)
            .or_else(|| self.years.iter().max_by_key(|s| s.year))
    }

    /// Short identifier used in error messages.
    pub fn label(&self) -> String {
        format!("saint #{} ({})", self.saint_number, self.saint_name)
    }
}

/// Kind of calendar occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    SaintDay,
    Milestone,
    /// Written by older releases; read but never produced.
    Generated,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SaintDay => "saint-day",
            EventKind::Milestone => "milestone",
            EventKind::Generated => "generated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "saint-day" => Some(EventKind::SaintDay),
            "milestone" => Some(EventKind::Milestone),
            "generated" => Some(EventKind::Generated),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A computed calendar occurrence, persisted for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedEvent {
    /// Storage id; `None` until persisted.
    pub id: Option<i64>,
    /// `YYYYMMDD`.
    pub date: i64,
    pub title: String,
    pub event_kind: EventKind,
    pub saint_id: i64,
    pub saint_number: String,
    pub saint_name: String,
    pub real_name: String,
    pub saint_year: Option<i32>,
    pub location_id: Option<i64>,
    pub location_name: Option<String>,
    pub beverage_count: i64,
    pub beverages: Vec<String>,
    pub food_count: i64,
    pub food: Vec<String>,
    pub media_links: Vec<String>,
    pub sticker: Option<String>,
    pub milestone_count: Option<i64>,
}

impl DerivedEvent {
    /// Whether two events carry the same content, ignoring storage id.
    pub fn same_content(&self, other: &DerivedEvent) -> bool {
        let mut a = self.clone();
        a.id = other.id;
        &a == other
    }
}

/// Which saints an event generation run covers. Set fields are ANDed; an
/// empty filter selects every saint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    pub location_id: Option<i64>,
    pub saint_id: Option<i64>,
    pub saint_number: Option<String>,
}

impl EventFilter {
    pub fn location(id: i64) -> Self {
        Self {
            location_id: Some(id),
            ..Default::default()
        }
    }

    pub fn saint(id: i64) -> Self {
        Self {
            saint_id: Some(id),
            ..Default::default()
        }
    }

    pub fn saint_number(number: &str) -> Self {
        Self {
            saint_number: Some(number.to_string()),
            ..Default::default()
        }
    }
}

/// Outcome of an event generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReport {
    /// Events created plus events updated in place.
    pub events_generated: u64,
    pub events_created: u64,
    pub events_updated: u64,
    pub events_skipped: u64,
    pub saints_processed: u64,
    pub errors: Vec<String>,
}

impl GenerateReport {
    /// True when the filter matched no saints at all.
    pub fn is_empty_selection(&self) -> bool {
        self.saints_processed == 0
    }

    /// Adds another run's counts and errors to this one.
    pub fn merge(&mut self, other: GenerateReport) {
        self.events_generated += other.events_generated;
        self.events_created += other.events_created;
        self.events_updated += other.events_updated;
        self.events_skipped += other.events_skipped;
        self.saints_processed += other.saints_processed;
        self.errors.extend(other.errors);
    }
}
