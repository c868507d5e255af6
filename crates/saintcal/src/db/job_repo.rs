//! Job repository: CRUD operations for the `jobs` table.
//!
//! Functions take a `&Connection` so callers can compose several of them
//! inside a single `Database::with_conn` / `with_tx` critical section.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;

/// A raw job row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: String,
    pub user_id: String,
    pub job_type: String,
    pub spreadsheet_id: Option<String>,
    pub status: String,
    pub progress: i64,
    pub message: String,
    /// JSON-encoded result payload.
    pub data: Option<String>,
    pub error: Option<String>,
    pub permanent: bool,
    pub attempts: i64,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            job_type: row.get("job_type")?,
            spreadsheet_id: row.get("spreadsheet_id")?,
            status: row.get("status")?,
            progress: row.get("progress")?,
            message: row.get("message")?,
            data: row.get("data")?,
            error: row.get("error")?,
            permanent: row.get("permanent")?,
            attempts: row.get("attempts")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Query filter parameters for listing a user's jobs.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub user_id: String,
    pub status: Option<String>,
    pub job_type: Option<String>,
    pub limit: u64,
}

/// Inserts a new job row.
pub fn insert(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (id, user_id, job_type, spreadsheet_id, status, progress, message,
         data, error, permanent, attempts, created_at, updated_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            job.id,
            job.user_id,
            job.job_type,
            job.spreadsheet_id,
            job.status,
            job.progress,
            job.message,
            job.data,
            job.error,
            job.permanent,
            job.attempts,
            job.created_at,
            job.updated_at,
            job.completed_at,
        ],
    )?;
    Ok(())
}

/// Writes back every mutable column. `id`, `user_id`, `job_type` and
/// `created_at` are never changed after insert.
pub fn update(conn: &Connection, job: &JobRow) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE jobs SET spreadsheet_id=?2, status=?3, progress=?4, message=?5, data=?6,
         error=?7, permanent=?8, attempts=?9, updated_at=?10, completed_at=?11
         WHERE id=?1",
        params![
            job.id,
            job.spreadsheet_id,
            job.status,
            job.progress,
            job.message,
            job.data,
            job.error,
            job.permanent,
            job.attempts,
            job.updated_at,
            job.completed_at,
        ],
    )?;
    Ok(())
}

/// Finds a job by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

/// Lists a user's jobs, most recent first.
pub fn list_for_user(conn: &Connection, filter: &JobFilter) -> Result<Vec<JobRow>, DatabaseError> {
    let mut conditions = vec!["user_id = ?1".to_string()];
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
        vec![Box::new(filter.user_id.clone())];

    if let Some(ref status) = filter.status {
        conditions.push(format!("status = ?{}", param_values.len() + 1));
        param_values.push(Box::new(status.clone()));
    }
    if let Some(ref job_type) = filter.job_type {
        conditions.push(format!("job_type = ?{}", param_values.len() + 1));
        param_values.push(Box::new(job_type.clone()));
    }

    param_values.push(Box::new(filter.limit as i64));
    let sql = format!(
        "SELECT * FROM jobs WHERE {} ORDER BY created_at DESC, rowid DESC LIMIT ?{}",
        conditions.join(" AND "),
        param_values.len()
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_ref.as_slice(), JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Returns all jobs with the given status, oldest first.
pub fn find_by_status(conn: &Connection, status: &str) -> Result<Vec<JobRow>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM jobs WHERE status = ?1 ORDER BY created_at ASC, rowid ASC")?;
    let rows = stmt
        .query_map(params![status], JobRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Counts jobs with the given status.
pub fn count_by_status(conn: &Connection, status: &str) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM jobs WHERE status = ?1",
        params![status],
        |r| r.get(0),
    )?;
    Ok(count)
}
