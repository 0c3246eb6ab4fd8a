//! HTTP response building helpers
//!
//! Every body is an envelope: `{"success": true, "data": ...}` or
//! `{"success": false, "error": ...}`.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::AchievementError;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|e| {
        error!("Failed to serialize response body: {}", e);
        r#"{"success":false,"error":"serialization failed"}"#.to_string()
    });

    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// 200 with `data`
pub fn ok<T: Serialize>(data: &T) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({ "success": true, "data": data }),
    )
}

/// 201 with `data`
pub fn created<T: Serialize>(data: &T) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::CREATED,
        &serde_json::json!({ "success": true, "data": data }),
    )
}

/// 200 with a message instead of data
pub fn message(text: &str) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({ "success": true, "message": text }),
    )
}

fn failure(status: StatusCode, kind: &str, message: &str) -> Response<Full<Bytes>> {
    json_response(
        status,
        &serde_json::json!({
            "success": false,
            "error": { "kind": kind, "message": message },
        }),
    )
}

pub fn bad_request(message: &str) -> Response<Full<Bytes>> {
    failure(StatusCode::BAD_REQUEST, "validation", message)
}

pub fn unauthenticated(message: &str) -> Response<Full<Bytes>> {
    failure(StatusCode::UNAUTHORIZED, "unauthenticated", message)
}

pub fn forbidden(message: &str) -> Response<Full<Bytes>> {
    failure(StatusCode::FORBIDDEN, "unauthorized", message)
}

pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    failure(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn method_not_allowed() -> Response<Full<Bytes>> {
    failure(
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        "Method not allowed",
    )
}

/// Map an engine error onto a status code
pub fn error_response(err: &AchievementError) -> Response<Full<Bytes>> {
    let status = match err {
        AchievementError::Validation(_) => StatusCode::BAD_REQUEST,
        AchievementError::Unauthorized(_) => StatusCode::FORBIDDEN,
        AchievementError::NotFound(_) => StatusCode::NOT_FOUND,
        AchievementError::InvalidState { .. } => StatusCode::CONFLICT,
        AchievementError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    failure(status, err.kind(), &err.to_string())
}

/// Wrap a service result into an HTTP response
pub fn from_result<T: Serialize>(result: Result<T, AchievementError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AchievementStatus;
    use http_body_util::BodyExt;

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let response = ok(&serde_json::json!({ "id": "r1" }));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["id"], "r1");
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let cases = [
            (AchievementError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AchievementError::Unauthorized("x".into()), StatusCode::FORBIDDEN),
            (AchievementError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                AchievementError::InvalidState {
                    operation: "submit",
                    status: AchievementStatus::Verified,
                },
                StatusCode::CONFLICT,
            ),
        ];

        for (err, status) in cases {
            let response = error_response(&err);
            assert_eq!(response.status(), status);
            let body = body_json(response).await;
            assert_eq!(body["success"], false);
            assert_eq!(body["error"]["kind"], err.kind());
        }
    }
}
