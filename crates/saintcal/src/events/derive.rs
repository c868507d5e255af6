//! Pure computation of the canonical events for one saint.

use crate::dates::{encode_event_date, parse_date, DateFormatError};
use crate::events::model::{DerivedEvent, EventKind, MilestoneRecord, SaintRecord, YearSnapshot};

/// Candidate events for one saint plus the milestone problems found on the way.
#[derive(Debug, Clone, Default)]
pub struct SaintEvents {
    pub events: Vec<DerivedEvent>,
    pub errors: Vec<String>,
}

/// Computes the saint-day event for `year` and one event per milestone.
///
/// An unparsable saint date fails the whole saint. An unparsable milestone
/// only drops that milestone and is reported in `errors`.
pub fn derive_saint_events(saint: &SaintRecord, year: i32) -> Result<SaintEvents, DateFormatError> {
    let saint_date = parse_date(&saint.saint_date)?;
    let mut out = SaintEvents::default();

    let snapshot = saint.snapshot_for(year);
    let mut saint_day = base_event(
        saint,
        EventKind::SaintDay,
        encode_event_date(year, saint_date.month_day()),
        snapshot,
    );
    saint_day.title = format!("{} Saint Day", saint.saint_name);
    out.events.push(saint_day);

    for milestone in &saint.milestones {
        let event = match milestone_event(saint, milestone) {
            Ok(event) => event,
            Err(reason) => {
                out.errors.push(format!(
                    "{}: milestone {} skipped: {}",
                    saint.label(),
                    milestone.count,
                    reason
                ));
                continue;
            }
        };

        // One milestone event per date: the highest count keeps the slot.
        let same_date = out
            .events
            .iter_mut()
            .find(|e| e.event_kind == EventKind::Milestone && e.date == event.date);
        match same_date {
            Some(kept) => {
                let (kept_count, dropped_count) = (
                    kept.milestone_count.unwrap_or_default(),
                    event.milestone_count.unwrap_or_default(),
                );
                let dropped = if dropped_count > kept_count {
                    *kept = event;
                    kept_count
                } else {
                    dropped_count
                };
                out.errors.push(format!(
                    "{}: milestone {} skipped: another milestone falls on {}",
                    saint.label(),
                    dropped,
                    kept.date
                ));
            }
            None => out.events.push(event),
        }
    }

    Ok(out)
}

fn milestone_event(saint: &SaintRecord, milestone: &MilestoneRecord) -> Result<DerivedEvent, String> {
    let parsed = parse_date(&milestone.date).map_err(|e| e.to_string())?;
    let (Some(year), Some(date)) = (parsed.year, parsed.event_date()) else {
        return Err(format!("date '{}' has no year", milestone.date));
    };

    let mut event = base_event(saint, EventKind::Milestone, date, saint.snapshot_for(year));
    event.title = format!("{} - {} Beverages", saint.saint_name, milestone.count);
    event.milestone_count = Some(milestone.count);
    event.sticker = milestone.sticker.clone();
    Ok(event)
}

fn base_event(
    saint: &SaintRecord,
    kind: EventKind,
    date: i64,
    snapshot: Option<&YearSnapshot>,
) -> DerivedEvent {
    let (beverages, food, media_links, sticker) = match snapshot {
        Some(s) => (
            s.beverages.clone(),
            s.food.clone(),
            s.media_links.clone(),
            s.sticker.clone(),
        ),
        None => (Vec::new(), Vec::new(), Vec::new(), None),
    };

    DerivedEvent {
        id: None,
        date,
        title: String::new(),
        event_kind: kind,
        saint_id: saint.id,
        saint_number: saint.saint_number.clone(),
        saint_name: saint.saint_name.clone(),
        real_name: saint.name.clone(),
        saint_year: saint.saint_year,
        location_id: saint.location_id,
        location_name: saint.location_name.clone(),
        beverage_count: beverages.len() as i64,
        beverages,
        food_count: food.len() as i64,
        food,
        media_links,
        sticker,
        milestone_count: None,
    }
}
