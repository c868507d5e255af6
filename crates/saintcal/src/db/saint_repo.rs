//! Saint repository: locations, saints, year snapshots and milestones.
//!
//! Event derivation only reads through this module; the import jobs are the
//! only writers.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{decode_list, encode_list, DatabaseError};
use crate::events::model::{EventFilter, MilestoneRecord, SaintRecord, YearSnapshot};

/// A location row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRow {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
}

/// Saint fields written by an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSaint {
    pub saint_number: String,
    pub name: String,
    pub saint_name: String,
    pub saint_date: String,
    pub saint_year: Option<i32>,
    pub location_id: Option<i64>,
}

/// Inserts a location or updates its address, returning its id.
pub fn upsert_location(
    conn: &Connection,
    name: &str,
    address: Option<&str>,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO locations (name, address) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET address = COALESCE(excluded.address, locations.address)",
        params![name, address],
    )?;
    let id = conn.query_row(
        "SELECT id FROM locations WHERE name = ?1",
        params![name],
        |r| r.get(0),
    )?;
    Ok(id)
}

/// Finds a location by name.
pub fn find_location_by_name(
    conn: &Connection,
    name: &str,
) -> Result<Option<LocationRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, address FROM locations WHERE name = ?1",
            params![name],
            |r| {
                Ok(LocationRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    address: r.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Inserts a saint or updates it by `saint_number`, returning its id.
pub fn upsert_saint(conn: &Connection, saint: &NewSaint) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO saints (saint_number, name, saint_name, saint_date, saint_year, location_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(saint_number) DO UPDATE SET
            name = excluded.name,
            saint_name = excluded.saint_name,
            saint_date = excluded.saint_date,
            saint_year = excluded.saint_year,
            location_id = excluded.location_id",
        params![
            saint.saint_number,
            saint.name,
            saint.saint_name,
            saint.saint_date,
            saint.saint_year,
            saint.location_id,
        ],
    )?;
    let id = conn.query_row(
        "SELECT id FROM saints WHERE saint_number = ?1",
        params![saint.saint_number],
        |r| r.get(0),
    )?;
    Ok(id)
}

/// Inserts or replaces a saint's snapshot for one year.
pub fn upsert_year(
    conn: &Connection,
    saint_id: i64,
    snapshot: &YearSnapshot,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO saint_years (saint_id, year, beverages, food, media_links, sticker)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(saint_id, year) DO UPDATE SET
            beverages = excluded.beverages,
            food = excluded.food,
            media_links = excluded.media_links,
            sticker = excluded.sticker",
        params![
            saint_id,
            snapshot.year,
            encode_list("beverages", &snapshot.beverages)?,
            encode_list("food", &snapshot.food)?,
            encode_list("media_links", &snapshot.media_links)?,
            snapshot.sticker,
        ],
    )?;
    Ok(())
}

/// Inserts or replaces a saint's milestone for one beverage count.
pub fn upsert_milestone(
    conn: &Connection,
    saint_id: i64,
    milestone: &MilestoneRecord,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO saint_milestones (saint_id, count, date, sticker)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(saint_id, count) DO UPDATE SET
            date = excluded.date,
            sticker = excluded.sticker",
        params![saint_id, milestone.count, milestone.date, milestone.sticker],
    )?;
    Ok(())
}

fn saint_from_row(row: &Row<'_>) -> Result<SaintRecord, rusqlite::Error> {
    Ok(SaintRecord {
        id: row.get("id")?,
        saint_number: row.get("saint_number")?,
        name: row.get("name")?,
        saint_name: row.get("saint_name")?,
        saint_date: row.get("saint_date")?,
        saint_year: row.get("saint_year")?,
        location_id: row.get("location_id")?,
        location_name: row.get("location_name")?,
        years: Vec::new(),
        milestones: Vec::new(),
    })
}

/// Loads the saints matching `filter`, with year snapshots (ascending) and
/// milestones (ascending count) attached. Ordered by saint id.
pub fn find_saints(
    conn: &Connection,
    filter: &EventFilter,
) -> Result<Vec<SaintRecord>, DatabaseError> {
    let mut conditions = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(location_id) = filter.location_id {
        conditions.push(format!("s.location_id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(location_id));
    }
    if let Some(saint_id) = filter.saint_id {
        conditions.push(format!("s.id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(saint_id));
    }
    if let Some(ref number) = filter.saint_number {
        conditions.push(format!("s.saint_number = ?{}", param_values.len() + 1));
        param_values.push(Box::new(number.trim().to_string()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    let sql = format!(
        "SELECT s.*, l.name AS location_name FROM saints s
         LEFT JOIN locations l ON l.id = s.location_id
         {} ORDER BY s.id ASC",
        where_clause
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let mut saints = stmt
        .query_map(params_ref.as_slice(), saint_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    for saint in &mut saints {
        saint.years = years_for_saint(conn, saint.id)?;
        saint.milestones = milestones_for_saint(conn, saint.id)?;
    }

    Ok(saints)
}

/// Year snapshots for one saint, ascending by year.
pub fn years_for_saint(conn: &Connection, saint_id: i64) -> Result<Vec<YearSnapshot>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT year, beverages, food, media_links, sticker FROM saint_years
         WHERE saint_id = ?1 ORDER BY year ASC",
    )?;
    let raw = stmt
        .query_map(params![saint_id], |r| {
            Ok((
                r.get::<_, i32>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(year, beverages, food, media_links, sticker)| {
            Ok(YearSnapshot {
                year,
                beverages: decode_list("beverages", &beverages)?,
                food: decode_list("food", &food)?,
                media_links: decode_list("media_links", &media_links)?,
                sticker,
            })
        })
        .collect()
}

/// Milestones for one saint, ascending by count.
pub fn milestones_for_saint(
    conn: &Connection,
    saint_id: i64,
) -> Result<Vec<MilestoneRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT count, date, sticker FROM saint_milestones
         WHERE saint_id = ?1 ORDER BY count ASC",
    )?;
    let rows = stmt
        .query_map(params![saint_id], |r| {
            Ok(MilestoneRecord {
                count: r.get(0)?,
                date: r.get(1)?,
                sticker: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Total number of saints.
pub fn count_saints(conn: &Connection) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row("SELECT COUNT(*) FROM saints", [], |r| r.get(0))?;
    Ok(count)
}
