//! Achievement routes
//!
//! | Method | Path | Role |
//! |---|---|---|
//! | POST | /api/v1/achievements | student |
//! | GET | /api/v1/achievements | any (role-scoped) |
//! | GET | /api/v1/achievements/{id} | any (role-scoped) |
//! | PUT | /api/v1/achievements/{id} | student |
//! | DELETE | /api/v1/achievements/{id} | student |
//! | POST | /api/v1/achievements/{id}/submit | student |
//! | POST | /api/v1/achievements/{id}/verify | lecturer, admin |
//! | POST | /api/v1/achievements/{id}/attachments | student |

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::identity::{self, Scope};
use super::response;
use super::HandlerResult;
use crate::db::schemas::AchievementType;
use crate::error::AchievementError;
use crate::services::{
    AchievementChanges, AttachmentInput, ListCriteria, NewAchievement, Services,
};
use crate::store::ContentSort;
use crate::types::{AchievementStatus, Caller, Role};

fn fail(err: AchievementError) -> hyper::Response<http_body_util::Full<Bytes>> {
    response::error_response(&err)
}

/// Parse a JSON request body
pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, AchievementError> {
    serde_json::from_slice(body)
        .map_err(|e| AchievementError::Validation(format!("invalid request body: {}", e)))
}

// =============================================================================
// Listing query
// =============================================================================

/// Query string of the admin listing
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub status: Option<String>,
    #[serde(rename = "type", alias = "achievementType")]
    pub achievement_type: Option<String>,
    pub student_id: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl ListQuery {
    pub fn parse(query: Option<&str>) -> Result<Self, AchievementError> {
        serde_urlencoded::from_str(query.unwrap_or(""))
            .map_err(|e| AchievementError::Validation(format!("invalid query: {}", e)))
    }

    pub fn into_criteria(self) -> Result<ListCriteria, AchievementError> {
        let invalid = AchievementError::Validation;
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let mut sort = ContentSort::default();
        if let Some(key) = present(self.sort_by) {
            sort.key = key.parse().map_err(invalid)?;
        }
        if let Some(order) = present(self.sort_order) {
            sort.order = order.parse().map_err(invalid)?;
        }

        Ok(ListCriteria {
            status: present(self.status)
                .map(|s| s.parse::<AchievementStatus>())
                .transpose()
                .map_err(invalid)?,
            achievement_type: present(self.achievement_type)
                .map(|s| s.parse::<AchievementType>())
                .transpose()
                .map_err(invalid)?,
            student_id: present(self.student_id),
            date_from: present(self.date_from)
                .map(|s| parse_date(&s, false))
                .transpose()?,
            date_to: present(self.date_to)
                .map(|s| parse_date(&s, true))
                .transpose()?,
            sort,
            page: self.page,
            limit: self.limit,
        })
    }
}

/// RFC 3339 timestamp or a plain `YYYY-MM-DD` date; a plain upper bound
/// covers the whole day
fn parse_date(value: &str, end_of_day: bool) -> Result<DateTime<Utc>, AchievementError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AchievementError::Validation(format!("invalid date '{}'", value)))?;
    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| AchievementError::Validation(format!("invalid date '{}'", value)))
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct VerifyRequest {
    #[serde(default)]
    action: String,
    note: Option<String>,
}

/// POST /api/v1/achievements
pub async fn create(services: &Services, caller: &Caller, body: &Bytes) -> HandlerResult {
    let student_id = identity::require_student(services.directory.as_ref(), caller).await?;
    let input: NewAchievement = parse_json(body).map_err(fail)?;

    let view = services
        .achievements
        .create(&student_id, input)
        .await
        .map_err(fail)?;
    Ok(response::created(&view))
}

/// GET /api/v1/achievements
pub async fn list(services: &Services, caller: &Caller, query: Option<&str>) -> HandlerResult {
    let scope = identity::scope_for(services.directory.as_ref(), caller).await?;

    match scope {
        Scope::Own(student_id) => Ok(response::from_result(
            services.achievements.list_by_student(&student_id).await,
        )),
        Scope::Advisees(ids) => Ok(response::from_result(
            services.achievements.list_by_students(&ids).await,
        )),
        Scope::All => {
            let criteria = ListQuery::parse(query)
                .and_then(ListQuery::into_criteria)
                .map_err(fail)?;
            Ok(response::from_result(
                services.achievements.list_with_filter(criteria).await,
            ))
        }
    }
}

/// GET /api/v1/achievements/{id}
pub async fn get(services: &Services, caller: &Caller, id: &str) -> HandlerResult {
    let scope = identity::scope_for(services.directory.as_ref(), caller).await?;
    let view = services.achievements.get(id).await.map_err(fail)?;

    if !scope.allows(&view.student_id) {
        return Err(response::forbidden("Achievement is outside the caller's scope"));
    }
    Ok(response::ok(&view))
}

/// PUT /api/v1/achievements/{id}
pub async fn update(services: &Services, caller: &Caller, id: &str, body: &Bytes) -> HandlerResult {
    let student_id = identity::require_student(services.directory.as_ref(), caller).await?;
    let changes: AchievementChanges = parse_json(body).map_err(fail)?;

    Ok(response::from_result(
        services.achievements.update(id, &student_id, changes).await,
    ))
}

/// DELETE /api/v1/achievements/{id}
pub async fn delete(services: &Services, caller: &Caller, id: &str) -> HandlerResult {
    let student_id = identity::require_student(services.directory.as_ref(), caller).await?;

    services
        .achievements
        .delete(id, &student_id)
        .await
        .map_err(fail)?;
    Ok(response::message("Achievement deleted"))
}

/// POST /api/v1/achievements/{id}/submit
pub async fn submit(services: &Services, caller: &Caller, id: &str) -> HandlerResult {
    let student_id = identity::require_student(services.directory.as_ref(), caller).await?;

    Ok(response::from_result(
        services.achievements.submit(id, &student_id).await,
    ))
}

/// POST /api/v1/achievements/{id}/verify
pub async fn verify(services: &Services, caller: &Caller, id: &str, body: &Bytes) -> HandlerResult {
    if caller.role == Role::Student {
        return Err(response::forbidden(
            "Only lecturers and admins can verify achievements",
        ));
    }
    let request: VerifyRequest = parse_json(body).map_err(fail)?;
    let verifier_id = identity::require_verifier(services.directory.as_ref(), caller).await?;

    Ok(response::from_result(
        services
            .achievements
            .review(id, &verifier_id, &request.action, request.note.as_deref())
            .await,
    ))
}

/// POST /api/v1/achievements/{id}/attachments
pub async fn add_attachment(
    services: &Services,
    caller: &Caller,
    id: &str,
    body: &Bytes,
) -> HandlerResult {
    let student_id = identity::require_student(services.directory.as_ref(), caller).await?;
    let input: AttachmentInput = parse_json(body).map_err(fail)?;

    services
        .achievements
        .add_attachment(id, &student_id, input)
        .await
        .map_err(fail)?;
    Ok(response::message("Attachment added"))
}
