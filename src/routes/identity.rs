//! Caller identity from trusted gateway headers
//!
//! The upstream auth gateway validates tokens and forwards the caller as
//! `X-User-Id` / `X-User-Role`. Handlers resolve the caller's student or
//! lecturer profile through the [`Directory`].

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::HeaderMap;
use hyper::Response;
use tracing::debug;

use super::response;
use crate::directory::Directory;
use crate::error::AchievementError;
use crate::types::{Caller, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

type Rejection = Response<Full<Bytes>>;

/// Extract the caller; missing or malformed identity is a 401
pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, Rejection> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let user_id = header(USER_ID_HEADER)
        .ok_or_else(|| response::unauthenticated("Missing X-User-Id header"))?;
    let role = header(USER_ROLE_HEADER)
        .ok_or_else(|| response::unauthenticated("Missing X-User-Role header"))?
        .parse::<Role>()
        .map_err(|e| response::unauthenticated(&e))?;

    Ok(Caller {
        user_id: user_id.to_string(),
        role,
    })
}

/// Which students a caller may see in listings and statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Own(String),
    Advisees(Vec<String>),
    All,
}

impl Scope {
    pub fn student_ids(&self) -> Option<Vec<String>> {
        match self {
            Self::Own(id) => Some(vec![id.clone()]),
            Self::Advisees(ids) => Some(ids.clone()),
            Self::All => None,
        }
    }

    pub fn allows(&self, student_id: &str) -> bool {
        match self {
            Self::Own(id) => id == student_id,
            Self::Advisees(ids) => ids.iter().any(|id| id == student_id),
            Self::All => true,
        }
    }
}

/// Student id of a student caller
pub async fn require_student(directory: &dyn Directory, caller: &Caller) -> Result<String, Rejection> {
    if caller.role != Role::Student {
        return Err(response::forbidden("Only students can perform this action"));
    }

    match directory.student_for_user(&caller.user_id).await {
        Ok(Some(profile)) => Ok(profile.id),
        Ok(None) => {
            debug!(user_id = %caller.user_id, "No student profile for user");
            Err(response::forbidden("No student profile linked to this user"))
        }
        Err(e) => Err(response::error_response(&AchievementError::persistence(
            "student profile lookup",
            e,
        ))),
    }
}

/// Verifier identity: the lecturer id when a lecturer profile exists,
/// otherwise the user id (admins)
pub async fn require_verifier(
    directory: &dyn Directory,
    caller: &Caller,
) -> Result<String, Rejection> {
    match caller.role {
        Role::Student => Err(response::forbidden(
            "Only lecturers and admins can verify achievements",
        )),
        Role::Lecturer | Role::Admin => match directory.lecturer_for_user(&caller.user_id).await {
            Ok(Some(profile)) => Ok(profile.id),
            Ok(None) if caller.role == Role::Admin => Ok(caller.user_id.clone()),
            Ok(None) => Err(response::forbidden("No lecturer profile linked to this user")),
            Err(e) => Err(response::error_response(&AchievementError::persistence(
                "lecturer profile lookup",
                e,
            ))),
        },
    }
}

/// Listing scope derived from the caller's role
pub async fn scope_for(directory: &dyn Directory, caller: &Caller) -> Result<Scope, Rejection> {
    match caller.role {
        Role::Admin => Ok(Scope::All),
        Role::Student => require_student(directory, caller).await.map(Scope::Own),
        Role::Lecturer => {
            let lecturer = match directory.lecturer_for_user(&caller.user_id).await {
                Ok(Some(profile)) => profile,
                Ok(None) => {
                    return Err(response::forbidden("No lecturer profile linked to this user"))
                }
                Err(e) => {
                    return Err(response::error_response(&AchievementError::persistence(
                        "lecturer profile lookup",
                        e,
                    )))
                }
            };
            directory
                .advisee_ids(&lecturer.id)
                .await
                .map(Scope::Advisees)
                .map_err(|e| {
                    response::error_response(&AchievementError::persistence("advisee lookup", e))
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;
    use hyper::StatusCode;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_caller_from_headers() {
        let caller =
            caller_from_headers(&headers(&[("x-user-id", "u1"), ("x-user-role", "Lecturer")]))
                .unwrap();
        assert_eq!(caller.user_id, "u1");
        assert_eq!(caller.role, Role::Lecturer);
    }

    #[test]
    fn test_missing_identity_is_unauthenticated() {
        let missing = caller_from_headers(&headers(&[("x-user-role", "student")])).unwrap_err();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let bad_role =
            caller_from_headers(&headers(&[("x-user-id", "u1"), ("x-user-role", "guest")]))
                .unwrap_err();
        assert_eq!(bad_role.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_scope_allows() {
        let own = Scope::Own("s1".into());
        assert!(own.allows("s1"));
        assert!(!own.allows("s2"));

        let advisees = Scope::Advisees(vec!["s1".into(), "s3".into()]);
        assert!(advisees.allows("s3"));
        assert!(!advisees.allows("s2"));
        assert_eq!(advisees.student_ids().unwrap().len(), 2);

        assert!(Scope::All.allows("anyone"));
        assert!(Scope::All.student_ids().is_none());
    }
}
