//! Student and lecturer directory rows

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::sql_err;
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: String,
    pub user_id: String,
    pub student_number: String,
    pub full_name: String,
    pub program_study: String,
    /// Lecturer id of the academic advisor
    pub advisor_id: Option<String>,
}

impl StudentRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            student_number: row.get("student_number")?,
            full_name: row.get("full_name")?,
            program_study: row.get("program_study")?,
            advisor_id: row.get("advisor_id")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LecturerRow {
    pub id: String,
    pub user_id: String,
    pub lecturer_number: String,
    pub full_name: String,
    pub department: String,
}

impl LecturerRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            lecturer_number: row.get("lecturer_number")?,
            full_name: row.get("full_name")?,
            department: row.get("department")?,
        })
    }
}

pub fn get_student(conn: &Connection, id: &str) -> Result<Option<StudentRow>, StoreError> {
    conn.query_row(
        "SELECT * FROM students WHERE id = ?",
        params![id],
        StudentRow::from_row,
    )
    .optional()
    .map_err(sql_err("Query failed"))
}

pub fn get_student_by_user(conn: &Connection, user_id: &str) -> Result<Option<StudentRow>, StoreError> {
    conn.query_row(
        "SELECT * FROM students WHERE user_id = ?",
        params![user_id],
        StudentRow::from_row,
    )
    .optional()
    .map_err(sql_err("Query failed"))
}

pub fn get_lecturer_by_user(conn: &Connection, user_id: &str) -> Result<Option<LecturerRow>, StoreError> {
    conn.query_row(
        "SELECT * FROM lecturers WHERE user_id = ?",
        params![user_id],
        LecturerRow::from_row,
    )
    .optional()
    .map_err(sql_err("Query failed"))
}

/// Ids of the students advised by a lecturer
pub fn advisee_ids(conn: &Connection, lecturer_id: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT id FROM students WHERE advisor_id = ? ORDER BY id")
        .map_err(sql_err("Prepare failed"))?;

    let ids = stmt
        .query_map(params![lecturer_id], |row| row.get(0))
        .map_err(sql_err("Query failed"))?
        .collect::<Result<Vec<String>, _>>()
        .map_err(sql_err("Row parse failed"))?;

    Ok(ids)
}

/// Insert or replace a student profile
pub fn upsert_student(conn: &Connection, student: &StudentRow) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO students (id, user_id, student_number, full_name, program_study, advisor_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            user_id = excluded.user_id,
            student_number = excluded.student_number,
            full_name = excluded.full_name,
            program_study = excluded.program_study,
            advisor_id = excluded.advisor_id",
        params![
            student.id,
            student.user_id,
            student.student_number,
            student.full_name,
            student.program_study,
            student.advisor_id,
        ],
    )
    .map_err(sql_err("Upsert failed"))?;
    Ok(())
}

/// Insert or replace a lecturer profile
pub fn upsert_lecturer(conn: &Connection, lecturer: &LecturerRow) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO lecturers (id, user_id, lecturer_number, full_name, department)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            user_id = excluded.user_id,
            lecturer_number = excluded.lecturer_number,
            full_name = excluded.full_name,
            department = excluded.department",
        params![
            lecturer.id,
            lecturer.user_id,
            lecturer.lecturer_number,
            lecturer.full_name,
            lecturer.department,
        ],
    )
    .map_err(sql_err("Upsert failed"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    fn student(id: &str, advisor: Option<&str>) -> StudentRow {
        StudentRow {
            id: id.into(),
            user_id: format!("user-{}", id),
            student_number: format!("NIM-{}", id),
            full_name: format!("Student {}", id),
            program_study: "Informatics".into(),
            advisor_id: advisor.map(String::from),
        }
    }

    #[test]
    fn test_student_lookup_and_advisees() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        upsert_lecturer(
            &conn,
            &LecturerRow {
                id: "l1".into(),
                user_id: "user-l1".into(),
                lecturer_number: "NIP-1".into(),
                full_name: "Dr. Lecturer".into(),
                department: "CS".into(),
            },
        )
        .unwrap();
        upsert_student(&conn, &student("s2", Some("l1"))).unwrap();
        upsert_student(&conn, &student("s1", Some("l1"))).unwrap();
        upsert_student(&conn, &student("s3", None)).unwrap();

        assert_eq!(get_student(&conn, "s1").unwrap().unwrap().student_number, "NIM-s1");
        assert_eq!(get_student_by_user(&conn, "user-s3").unwrap().unwrap().id, "s3");
        assert_eq!(get_lecturer_by_user(&conn, "user-l1").unwrap().unwrap().id, "l1");
        assert!(get_student(&conn, "nobody").unwrap().is_none());

        assert_eq!(advisee_ids(&conn, "l1").unwrap(), vec!["s1", "s2"]);
    }

    #[test]
    fn test_upsert_replaces_profile() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        upsert_student(&conn, &student("s1", None)).unwrap();
        let mut updated = student("s1", Some("l9"));
        updated.full_name = "Renamed".into();
        upsert_student(&conn, &updated).unwrap();

        assert_eq!(get_student(&conn, "s1").unwrap().unwrap(), updated);
    }
}
