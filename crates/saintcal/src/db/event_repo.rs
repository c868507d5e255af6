//! Event repository: derived calendar events keyed by
//! `(saint_id, date, event_kind)`.

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};

use super::{decode_list, encode_list, DatabaseError};
use crate::events::model::{DerivedEvent, EventKind};

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn event_from_row(row: &Row<'_>) -> Result<RawEvent, rusqlite::Error> {
    Ok(RawEvent {
        id: row.get("id")?,
        date: row.get("date")?,
        title: row.get("title")?,
        event_kind: row.get("event_kind")?,
        saint_id: row.get("saint_id")?,
        saint_number: row.get("saint_number")?,
        saint_name: row.get("saint_name")?,
        real_name: row.get("real_name")?,
        saint_year: row.get("saint_year")?,
        location_id: row.get("location_id")?,
        location_name: row.get("location_name")?,
        beverage_count: row.get("beverage_count")?,
        beverages: row.get("beverages")?,
        food_count: row.get("food_count")?,
        food: row.get("food")?,
        media_links: row.get("media_links")?,
        sticker: row.get("sticker")?,
        milestone_count: row.get("milestone_count")?,
    })
}

/// Row shape before JSON list columns and the kind are decoded.
struct RawEvent {
    id: i64,
    date: i64,
    title: String,
    event_kind: String,
    saint_id: i64,
    saint_number: String,
    saint_name: String,
    real_name: String,
    saint_year: Option<i32>,
    location_id: Option<i64>,
    location_name: Option<String>,
    beverage_count: i64,
    beverages: String,
    food_count: i64,
    food: String,
    media_links: String,
    sticker: Option<String>,
    milestone_count: Option<i64>,
}

impl RawEvent {
    fn decode(self) -> Result<DerivedEvent, DatabaseError> {
        let event_kind = EventKind::parse(&self.event_kind).unwrap_or_else(|| {
            log::warn!(
                "Unknown event kind '{}' for event {}, treating as generated",
                self.event_kind,
                self.id
            );
            EventKind::Generated
        });
        Ok(DerivedEvent {
            id: Some(self.id),
            date: self.date,
            title: self.title,
            event_kind,
            saint_id: self.saint_id,
            saint_number: self.saint_number,
            saint_name: self.saint_name,
            real_name: self.real_name,
            saint_year: self.saint_year,
            location_id: self.location_id,
            location_name: self.location_name,
            beverage_count: self.beverage_count,
            beverages: decode_list("beverages", &self.beverages)?,
            food_count: self.food_count,
            food: decode_list("food", &self.food)?,
            media_links: decode_list("media_links", &self.media_links)?,
            sticker: self.sticker,
            milestone_count: self.milestone_count,
        })
    }
}

/// Finds the event for a composite key.
pub fn find_by_key(
    conn: &Connection,
    saint_id: i64,
    date: i64,
    kind: EventKind,
) -> Result<Option<DerivedEvent>, DatabaseError> {
    let mut stmt = conn
        .prepare("SELECT * FROM events WHERE saint_id = ?1 AND date = ?2 AND event_kind = ?3")?;
    let mut rows = stmt.query_map(params![saint_id, date, kind.as_str()], event_from_row)?;
    match rows.next() {
        Some(Ok(raw)) => Ok(Some(raw.decode()?)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Inserts a new event, returning its id.
pub fn insert(conn: &Connection, event: &DerivedEvent) -> Result<i64, DatabaseError> {
    let ts = now();
    conn.execute(
        "INSERT INTO events (date, title, event_kind, saint_id, saint_number, saint_name,
         real_name, saint_year, location_id, location_name, beverage_count, beverages,
         food_count, food, media_links, sticker, milestone_count, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
         ?18, ?18)",
        params![
            event.date,
            event.title,
            event.event_kind.as_str(),
            event.saint_id,
            event.saint_number,
            event.saint_name,
            event.real_name,
            event.saint_year,
            event.location_id,
            event.location_name,
            event.beverage_count,
            encode_list("beverages", &event.beverages)?,
            event.food_count,
            encode_list("food", &event.food)?,
            encode_list("media_links", &event.media_links)?,
            event.sticker,
            event.milestone_count,
            ts,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Overwrites the content of an existing event. The key columns are left alone.
pub fn update(conn: &Connection, id: i64, event: &DerivedEvent) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE events SET title=?2, saint_number=?3, saint_name=?4, real_name=?5,
         saint_year=?6, location_id=?7, location_name=?8, beverage_count=?9, beverages=?10,
         food_count=?11, food=?12, media_links=?13, sticker=?14, milestone_count=?15,
         updated_at=?16
         WHERE id=?1",
        params![
            id,
            event.title,
            event.saint_number,
            event.saint_name,
            event.real_name,
            event.saint_year,
            event.location_id,
            event.location_name,
            event.beverage_count,
            encode_list("beverages", &event.beverages)?,
            event.food_count,
            encode_list("food", &event.food)?,
            encode_list("media_links", &event.media_links)?,
            event.sticker,
            event.milestone_count,
            now(),
        ],
    )?;
    Ok(())
}

/// Deletes every event, returning how many rows were removed.
pub fn delete_all(conn: &Connection) -> Result<usize, DatabaseError> {
    Ok(conn.execute("DELETE FROM events", [])?)
}

/// All events for a saint, ordered by date then kind.
pub fn list_for_saint(conn: &Connection, saint_id: i64) -> Result<Vec<DerivedEvent>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM events WHERE saint_id = ?1 ORDER BY date ASC, event_kind ASC")?;
    let raw = stmt
        .query_map(params![saint_id], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    raw.into_iter().map(RawEvent::decode).collect()
}

/// Total number of stored events.
pub fn count(conn: &Connection) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))?;
    Ok(count)
}
