//! Achievement reference rows
//!
//! One row per content document. The row owns the workflow status and the
//! review fields; every status write is a compare-and-set on the status the
//! caller last read, so two concurrent transitions cannot both succeed.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::db::sql_err;
use crate::error::StoreError;
use crate::types::AchievementStatus;

impl ToSql for AchievementStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AchievementStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Reference row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementReference {
    pub id: String,
    pub student_id: String,
    /// Hex id of the content document this row governs
    pub content_id: String,
    pub status: AchievementStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<String>,
    pub rejection_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AchievementReference {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            student_id: row.get("student_id")?,
            content_id: row.get("content_id")?,
            status: row.get("status")?,
            submitted_at: row.get("submitted_at")?,
            verified_at: row.get("verified_at")?,
            verified_by: row.get("verified_by")?,
            rejection_note: row.get("rejection_note")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, student_id, content_id, status, submitted_at, verified_at, \
     verified_by, rejection_note, created_at, updated_at FROM achievement_references";

/// Insert a new draft reference for a content document
pub fn insert_reference(
    conn: &Connection,
    student_id: &str,
    content_id: &str,
) -> Result<AchievementReference, StoreError> {
    let now = Utc::now();
    let reference = AchievementReference {
        id: Uuid::new_v4().to_string(),
        student_id: student_id.to_string(),
        content_id: content_id.to_string(),
        status: AchievementStatus::Draft,
        submitted_at: None,
        verified_at: None,
        verified_by: None,
        rejection_note: None,
        created_at: now,
        updated_at: now,
    };

    conn.execute(
        "INSERT INTO achievement_references (id, student_id, content_id, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            reference.id,
            reference.student_id,
            reference.content_id,
            reference.status,
            reference.created_at,
            reference.updated_at,
        ],
    )
    .map_err(sql_err("Insert failed"))?;

    debug!(reference_id = %reference.id, content_id, "Inserted reference");
    Ok(reference)
}

/// Get a reference by id
pub fn get_reference(conn: &Connection, id: &str) -> Result<Option<AchievementReference>, StoreError> {
    conn.query_row(
        &format!("{} WHERE id = ?", SELECT_COLUMNS),
        params![id],
        AchievementReference::from_row,
    )
    .optional()
    .map_err(sql_err("Query failed"))
}

/// Get the reference governing a content document
pub fn get_by_content_id(
    conn: &Connection,
    content_id: &str,
) -> Result<Option<AchievementReference>, StoreError> {
    conn.query_row(
        &format!("{} WHERE content_id = ?", SELECT_COLUMNS),
        params![content_id],
        AchievementReference::from_row,
    )
    .optional()
    .map_err(sql_err("Query failed"))
}

/// Compare-and-set a status transition.
///
/// `submitted_at` is written only when given. Zero matched rows means either
/// the id is unknown (`NoMatch`) or another writer moved the status first
/// (`StatusConflict`).
pub fn update_status(
    conn: &Connection,
    id: &str,
    expected: AchievementStatus,
    new_status: AchievementStatus,
    submitted_at: Option<DateTime<Utc>>,
) -> Result<AchievementReference, StoreError> {
    let changed = conn
        .execute(
            "UPDATE achievement_references
             SET status = ?1, submitted_at = COALESCE(?2, submitted_at), updated_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![new_status, submitted_at, Utc::now(), id, expected],
        )
        .map_err(sql_err("Update failed"))?;

    finish_cas(conn, id, expected, changed)
}

/// Refresh `updated_at` only
pub fn touch_reference(conn: &Connection, id: &str) -> Result<(), StoreError> {
    let changed = conn
        .execute(
            "UPDATE achievement_references SET updated_at = ?1 WHERE id = ?2",
            params![Utc::now(), id],
        )
        .map_err(sql_err("Update failed"))?;

    if changed == 0 {
        return Err(StoreError::NoMatch(format!("reference {}", id)));
    }
    Ok(())
}

/// Move a submitted reference to verified
pub fn mark_verified(
    conn: &Connection,
    id: &str,
    verifier_id: &str,
) -> Result<AchievementReference, StoreError> {
    let now = Utc::now();
    let changed = conn
        .execute(
            "UPDATE achievement_references
             SET status = ?1, verified_at = ?2, verified_by = ?3, updated_at = ?2
             WHERE id = ?4 AND status = ?5",
            params![
                AchievementStatus::Verified,
                now,
                verifier_id,
                id,
                AchievementStatus::Submitted
            ],
        )
        .map_err(sql_err("Update failed"))?;

    finish_cas(conn, id, AchievementStatus::Submitted, changed)
}

/// Move a submitted reference to rejected
pub fn mark_rejected(
    conn: &Connection,
    id: &str,
    note: &str,
) -> Result<AchievementReference, StoreError> {
    let changed = conn
        .execute(
            "UPDATE achievement_references
             SET status = ?1, rejection_note = ?2, updated_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                AchievementStatus::Rejected,
                note,
                Utc::now(),
                id,
                AchievementStatus::Submitted
            ],
        )
        .map_err(sql_err("Update failed"))?;

    finish_cas(conn, id, AchievementStatus::Submitted, changed)
}

fn finish_cas(
    conn: &Connection,
    id: &str,
    expected: AchievementStatus,
    changed: usize,
) -> Result<AchievementReference, StoreError> {
    let current = get_reference(conn, id)?;
    match (changed, current) {
        (0, None) => Err(StoreError::NoMatch(format!("reference {}", id))),
        (0, Some(_)) => Err(StoreError::StatusConflict {
            id: id.to_string(),
            expected,
        }),
        (_, Some(row)) => Ok(row),
        (_, None) => Err(StoreError::NoMatch(format!("reference {}", id))),
    }
}

/// List references, newest first. `None` lists every student.
pub fn list_references(
    conn: &Connection,
    student_ids: Option<&[String]>,
) -> Result<Vec<AchievementReference>, StoreError> {
    let mut sql = String::from(SELECT_COLUMNS);
    let mut params: Vec<&dyn ToSql> = vec![];

    if let Some(ids) = student_ids {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        sql.push_str(&format!(" WHERE student_id IN ({})", placeholders(ids.len())));
        params.extend(ids.iter().map(|id| id as &dyn ToSql));
    }

    sql.push_str(" ORDER BY created_at DESC, rowid DESC");

    let mut stmt = conn.prepare(&sql).map_err(sql_err("Prepare failed"))?;
    let rows = stmt
        .query_map(params.as_slice(), AchievementReference::from_row)
        .map_err(sql_err("Query failed"))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(sql_err("Row parse failed"))
}

/// Count non-deleted references per status
pub fn count_by_status(
    conn: &Connection,
    student_ids: Option<&[String]>,
) -> Result<HashMap<AchievementStatus, u64>, StoreError> {
    let mut sql = String::from(
        "SELECT status, COUNT(*) FROM achievement_references WHERE status != 'deleted'",
    );
    let mut params: Vec<&dyn ToSql> = vec![];

    if let Some(ids) = student_ids {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        sql.push_str(&format!(" AND student_id IN ({})", placeholders(ids.len())));
        params.extend(ids.iter().map(|id| id as &dyn ToSql));
    }

    sql.push_str(" GROUP BY status");

    let mut stmt = conn.prepare(&sql).map_err(sql_err("Prepare failed"))?;
    let rows = stmt
        .query_map(params.as_slice(), |row| {
            Ok((row.get::<_, AchievementStatus>(0)?, row.get::<_, i64>(1)?))
        })
        .map_err(sql_err("Query failed"))?;

    let mut counts = HashMap::new();
    for row in rows {
        let (status, count) = row.map_err(sql_err("Row parse failed"))?;
        counts.insert(status, count.max(0) as u64);
    }
    Ok(counts)
}

/// Content ids whose reference is in `status`
pub fn content_ids_by_status(
    conn: &Connection,
    status: AchievementStatus,
    student_ids: Option<&[String]>,
) -> Result<Vec<String>, StoreError> {
    let mut sql = String::from("SELECT content_id FROM achievement_references WHERE status = ?");
    let mut params: Vec<&dyn ToSql> = vec![&status];

    if let Some(ids) = student_ids {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        sql.push_str(&format!(" AND student_id IN ({})", placeholders(ids.len())));
        params.extend(ids.iter().map(|id| id as &dyn ToSql));
    }

    let mut stmt = conn.prepare(&sql).map_err(sql_err("Prepare failed"))?;
    let rows = stmt
        .query_map(params.as_slice(), |row| row.get::<_, String>(0))
        .map_err(sql_err("Query failed"))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(sql_err("Row parse failed"))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
