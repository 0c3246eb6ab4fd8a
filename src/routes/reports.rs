//! Report routes
//!
//! - GET /api/v1/reports/statistics
//! - GET /api/v1/reports/students/{id}

use super::identity;
use super::response;
use super::HandlerResult;
use crate::services::Services;
use crate::types::Caller;

/// Statistics scoped by role: a student sees their own, a lecturer their
/// advisees, an admin everything
pub async fn statistics(services: &Services, caller: &Caller) -> HandlerResult {
    let scope = identity::scope_for(services.directory.as_ref(), caller).await?;
    let student_ids = scope.student_ids();

    Ok(response::from_result(
        services.reports.statistics(student_ids.as_deref()).await,
    ))
}

/// Report for one student, if the caller may see them
pub async fn student_report(services: &Services, caller: &Caller, student_id: &str) -> HandlerResult {
    let scope = identity::scope_for(services.directory.as_ref(), caller).await?;
    if !scope.allows(student_id) {
        return Err(response::forbidden("Student is outside the caller's scope"));
    }

    Ok(response::from_result(
        services.reports.student_report(student_id).await,
    ))
}
