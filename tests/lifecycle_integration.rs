//! End-to-end lifecycle through the HTTP router over a file-backed reference
//! database and the in-memory content store.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use http_body_util::BodyExt;
use hyper::header::{HeaderMap, HeaderValue};
use hyper::{Method, StatusCode};
use serde_json::{json, Value};

use achievement_ledger::db::students::{self, LecturerRow, StudentRow};
use achievement_ledger::db::{references, ReferenceDb};
use achievement_ledger::directory::{CachedDirectory, DirectoryCacheConfig, SqliteDirectory};
use achievement_ledger::server::{dispatch, AppState};
use achievement_ledger::services::{ServiceSettings, Services};
use achievement_ledger::store::{MemoryContentStore, SqliteReferenceStore};
use achievement_ledger::{AchievementStatus, Args};

fn seed_directory(db: &ReferenceDb) {
    db.with_conn(|conn| {
        students::upsert_lecturer(
            conn,
            &LecturerRow {
                id: "l1".into(),
                user_id: "u-l1".into(),
                lecturer_number: "198001".into(),
                full_name: "Dr. Sari".into(),
                department: "Informatics".into(),
            },
        )?;
        students::upsert_student(
            conn,
            &StudentRow {
                id: "s1".into(),
                user_id: "u-s1".into(),
                student_number: "2101001".into(),
                full_name: "Ayu Lestari".into(),
                program_study: "Informatics".into(),
                advisor_id: Some("l1".into()),
            },
        )?;
        students::upsert_student(
            conn,
            &StudentRow {
                id: "s2".into(),
                user_id: "u-s2".into(),
                student_number: "2101002".into(),
                full_name: "Budi Santoso".into(),
                program_study: "Physics".into(),
                advisor_id: None,
            },
        )
    })
    .unwrap();
}

fn app(path: &Path) -> (AppState, Arc<ReferenceDb>) {
    let db = Arc::new(ReferenceDb::open(path).unwrap());
    seed_directory(&db);

    let services = Services::new(
        Arc::new(MemoryContentStore::new()),
        Arc::new(SqliteReferenceStore::new(db.clone())),
        Arc::new(CachedDirectory::new(
            SqliteDirectory::new(db.clone()),
            DirectoryCacheConfig::default(),
        )),
        ServiceSettings::default(),
    );
    (
        AppState::new(Args::parse_from(["achievement-ledger"]), services),
        db,
    )
}

struct Reply {
    status: StatusCode,
    body: Value,
}

async fn call(
    state: &AppState,
    method: Method,
    path: &str,
    user: (&'static str, &'static str),
    body: Option<Value>,
) -> Reply {
    let (path, query) = match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    };

    let mut headers = HeaderMap::new();
    headers.insert("x-user-id", HeaderValue::from_static(user.0));
    headers.insert("x-user-role", HeaderValue::from_static(user.1));

    let body = body
        .map(|v| Bytes::from(v.to_string()))
        .unwrap_or_default();

    let response = dispatch(state, &method, path, query, &headers, body).await;
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    Reply {
        status,
        body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
    }
}

const AYU: (&str, &str) = ("u-s1", "student");
const BUDI: (&str, &str) = ("u-s2", "student");
const ADVISOR: (&str, &str) = ("u-l1", "lecturer");
const ADMIN: (&str, &str) = ("u-admin", "admin");

fn competition() -> Value {
    json!({
        "achievementType": "competition",
        "title": "  National Programming Contest  ",
        "description": "First place",
        "details": {
            "specific": { "type": "competition", "competitionLevel": "national", "rank": 1 },
            "location": "Jakarta"
        },
        "tags": ["contest", " contest ", "algorithms"],
        "points": 100
    })
}

#[tokio::test]
async fn test_full_lifecycle_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let (state, db) = app(&dir.path().join("references.db"));

    // Create
    let created = call(&state, Method::POST, "/api/v1/achievements", AYU, Some(competition())).await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["success"], true);
    let data = &created.body["data"];
    assert_eq!(data["status"], "draft");
    assert_eq!(data["studentId"], "s1");
    assert_eq!(data["title"], "National Programming Contest");
    assert_eq!(data["tags"], json!(["contest", "algorithms"]));
    assert!(data.get("isDeleted").is_none());
    let id = data["id"].as_str().unwrap().to_string();

    // Another student cannot touch it
    let foreign = call(
        &state,
        Method::PUT,
        &format!("/api/v1/achievements/{}", id),
        BUDI,
        Some(json!({ "title": "Mine now" })),
    )
    .await;
    assert_eq!(foreign.status, StatusCode::FORBIDDEN);

    // Owner edits the draft
    let updated = call(
        &state,
        Method::PUT,
        &format!("/api/v1/achievements/{}", id),
        AYU,
        Some(json!({ "points": 120 })),
    )
    .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["data"]["points"], 120);
    assert_eq!(updated.body["data"]["status"], "draft");

    // Attach evidence
    let attached = call(
        &state,
        Method::POST,
        &format!("/api/v1/achievements/{}/attachments", id),
        AYU,
        Some(json!({
            "fileName": "certificate.pdf",
            "fileUrl": "https://files.example.com/certificate.pdf",
            "fileType": "application/pdf"
        })),
    )
    .await;
    assert_eq!(attached.status, StatusCode::OK);

    // Submit, then the draft-only operations are closed
    let submitted = call(
        &state,
        Method::POST,
        &format!("/api/v1/achievements/{}/submit", id),
        AYU,
        None,
    )
    .await;
    assert_eq!(submitted.status, StatusCode::OK);
    assert_eq!(submitted.body["data"]["status"], "submitted");
    assert!(submitted.body["data"]["submittedAt"].is_string());
    assert_eq!(
        submitted.body["data"]["attachments"][0]["fileName"],
        "certificate.pdf"
    );

    let late_edit = call(
        &state,
        Method::PUT,
        &format!("/api/v1/achievements/{}", id),
        AYU,
        Some(json!({ "title": "Too late" })),
    )
    .await;
    assert_eq!(late_edit.status, StatusCode::CONFLICT);
    assert_eq!(late_edit.body["error"]["kind"], "invalid_state");

    // Students cannot verify
    let self_verify = call(
        &state,
        Method::POST,
        &format!("/api/v1/achievements/{}/verify", id),
        AYU,
        Some(json!({ "action": "verify" })),
    )
    .await;
    assert_eq!(self_verify.status, StatusCode::FORBIDDEN);

    // Advisor sees the advisee's submission and verifies it
    let advisee_list = call(&state, Method::GET, "/api/v1/achievements", ADVISOR, None).await;
    assert_eq!(advisee_list.status, StatusCode::OK);
    assert_eq!(advisee_list.body["data"].as_array().unwrap().len(), 1);

    let verified = call(
        &state,
        Method::POST,
        &format!("/api/v1/achievements/{}/verify", id),
        ADVISOR,
        Some(json!({ "action": "verify" })),
    )
    .await;
    assert_eq!(verified.status, StatusCode::OK);
    assert_eq!(verified.body["data"]["status"], "verified");
    assert_eq!(verified.body["data"]["verifiedBy"], "l1");

    // Verified is terminal
    let reverify = call(
        &state,
        Method::POST,
        &format!("/api/v1/achievements/{}/verify", id),
        ADVISOR,
        Some(json!({ "action": "reject", "note": "changed my mind" })),
    )
    .await;
    assert_eq!(reverify.status, StatusCode::CONFLICT);

    // The reference row is on disk
    let row = db
        .with_conn(|conn| references::get_reference(conn, &id))
        .unwrap()
        .unwrap();
    assert_eq!(row.status, AchievementStatus::Verified);
    assert_eq!(row.verified_by.as_deref(), Some("l1"));
}

#[tokio::test]
async fn test_delete_and_reject_paths() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _db) = app(&dir.path().join("references.db"));

    let draft = call(
        &state,
        Method::POST,
        "/api/v1/achievements",
        BUDI,
        Some(json!({ "achievementType": "academic", "title": "Dean's list", "points": 10 })),
    )
    .await;
    let draft_id = draft.body["data"]["id"].as_str().unwrap().to_string();

    let deleted = call(
        &state,
        Method::DELETE,
        &format!("/api/v1/achievements/{}", draft_id),
        BUDI,
        None,
    )
    .await;
    assert_eq!(deleted.status, StatusCode::OK);

    let gone = call(
        &state,
        Method::GET,
        &format!("/api/v1/achievements/{}", draft_id),
        ADMIN,
        None,
    )
    .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);

    let own_list = call(&state, Method::GET, "/api/v1/achievements", BUDI, None).await;
    assert_eq!(own_list.body["data"], json!([]));

    // Rejection needs a note and an admin may act without a lecturer profile
    let submitted = call(
        &state,
        Method::POST,
        "/api/v1/achievements",
        BUDI,
        Some(json!({ "achievementType": "other", "title": "Volunteer work" })),
    )
    .await;
    let id = submitted.body["data"]["id"].as_str().unwrap().to_string();
    call(
        &state,
        Method::POST,
        &format!("/api/v1/achievements/{}/submit", id),
        BUDI,
        None,
    )
    .await;

    let no_note = call(
        &state,
        Method::POST,
        &format!("/api/v1/achievements/{}/verify", id),
        ADMIN,
        Some(json!({ "action": "reject" })),
    )
    .await;
    assert_eq!(no_note.status, StatusCode::BAD_REQUEST);

    let bad_action = call(
        &state,
        Method::POST,
        &format!("/api/v1/achievements/{}/verify", id),
        ADMIN,
        Some(json!({ "action": "approve" })),
    )
    .await;
    assert_eq!(bad_action.status, StatusCode::BAD_REQUEST);

    let rejected = call(
        &state,
        Method::POST,
        &format!("/api/v1/achievements/{}/verify", id),
        ADMIN,
        Some(json!({ "action": "reject", "note": "Missing evidence" })),
    )
    .await;
    assert_eq!(rejected.status, StatusCode::OK);
    assert_eq!(rejected.body["data"]["status"], "rejected");
    assert_eq!(rejected.body["data"]["rejectionNote"], "Missing evidence");
    assert!(rejected.body["data"]["verifiedBy"].is_null());

    // Deleting a rejected achievement is not allowed
    let delete_rejected = call(
        &state,
        Method::DELETE,
        &format!("/api/v1/achievements/{}", id),
        BUDI,
        None,
    )
    .await;
    assert_eq!(delete_rejected.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_reports_are_role_scoped() {
    let dir = tempfile::tempdir().unwrap();
    let (state, _db) = app(&dir.path().join("references.db"));

    for (user, points) in [(AYU, 100), (AYU, 20), (BUDI, 50)] {
        let created = call(
            &state,
            Method::POST,
            "/api/v1/achievements",
            user,
            Some(json!({ "achievementType": "academic", "title": "Award", "points": points })),
        )
        .await;
        assert_eq!(created.status, StatusCode::CREATED);
    }

    let everything = call(&state, Method::GET, "/api/v1/reports/statistics", ADMIN, None).await;
    assert_eq!(everything.status, StatusCode::OK);
    let stats = &everything.body["data"];
    assert_eq!(stats["totalAchievements"], 3);
    assert_eq!(stats["totalPoints"], 170);
    assert_eq!(stats["byStatus"]["draft"], 3);
    assert_eq!(stats["byStatus"]["verified"], 0);
    assert_eq!(stats["topStudents"][0]["studentId"], "s1");
    assert_eq!(stats["topStudents"][0]["studentName"], "Ayu Lestari");

    let advisees = call(&state, Method::GET, "/api/v1/reports/statistics", ADVISOR, None).await;
    assert_eq!(advisees.body["data"]["totalAchievements"], 2);
    assert_eq!(advisees.body["data"]["totalPoints"], 120);

    let own = call(&state, Method::GET, "/api/v1/reports/statistics", BUDI, None).await;
    assert_eq!(own.body["data"]["totalAchievements"], 1);

    let report = call(&state, Method::GET, "/api/v1/reports/students/s1", ADVISOR, None).await;
    assert_eq!(report.status, StatusCode::OK);
    assert_eq!(report.body["data"]["studentNumber"], "2101001");
    assert_eq!(report.body["data"]["totalAchievements"], 2);

    let outside = call(&state, Method::GET, "/api/v1/reports/students/s2", ADVISOR, None).await;
    assert_eq!(outside.status, StatusCode::FORBIDDEN);

    let page = call(
        &state,
        Method::GET,
        "/api/v1/achievements?sortBy=points&sortOrder=asc&limit=2",
        ADMIN,
        None,
    )
    .await;
    assert_eq!(page.status, StatusCode::OK);
    assert_eq!(page.body["data"]["total"], 3);
    assert_eq!(page.body["data"]["totalPages"], 2);
    assert_eq!(page.body["data"]["items"][0]["points"], 20);
    assert_eq!(page.body["data"]["items"][1]["points"], 50);
}

#[tokio::test]
async fn test_references_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("references.db");

    let id = {
        let (state, _db) = app(&path);
        let created = call(
            &state,
            Method::POST,
            "/api/v1/achievements",
            AYU,
            Some(json!({ "achievementType": "academic", "title": "Scholarship" })),
        )
        .await;
        created.body["data"]["id"].as_str().unwrap().to_string()
    };

    let db = ReferenceDb::open(&path).unwrap();
    let row = db
        .with_conn(|conn| references::get_reference(conn, &id))
        .unwrap()
        .unwrap();
    assert_eq!(row.student_id, "s1");
    assert_eq!(row.status, AchievementStatus::Draft);
}
