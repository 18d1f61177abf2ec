use super::state::ReviewState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Header carrying the reviewer identity, set by the fronting proxy.
pub const HEADER_REVIEWER: &str = "x-reviewer";

/// The reviewer making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reviewer(pub String);

#[derive(Debug)]
pub enum ReviewerExtractionError {
    Missing,
}

impl IntoResponse for ReviewerExtractionError {
    fn into_response(self) -> Response {
        match self {
            ReviewerExtractionError::Missing => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

impl FromRequestParts<ReviewState> for Reviewer {
    type Rejection = ReviewerExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &ReviewState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(HEADER_REVIEWER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Reviewer(v.to_string()))
            .ok_or(ReviewerExtractionError::Missing)
    }
}
