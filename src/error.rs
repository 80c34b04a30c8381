use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bson::Uuid;
use mongodb::error::{ErrorKind, WriteFailure};
use serde_json::json;
use thiserror::Error;

/// Failures raised by the review core.
///
/// Every variant maps onto one client-facing response; no retry logic lives
/// here. The guarded decrements in the service and the aggregator are the one
/// designed-in self-correcting path and never surface as an error.
#[derive(Error, Debug)]
pub enum ReviewError {
    /// A published or hidden review by this user already exists for the product.
    #[error("User of UUID: `{user_id}` has already written a review for product of UUID: `{product_id}`.")]
    DuplicateReview {
        user_id: Uuid,
        product_id: Uuid,
        /// Id of the conflicting review, so the caller can offer an edit flow.
        /// Absent only when the conflicting review vanished during the lookup.
        existing_review_id: Option<Uuid>,
    },

    #[error("{0}")]
    Forbidden(String),

    #[error("Review with UUID: `{0}` not found.")]
    ReviewNotFound(Uuid),

    #[error("No review for product of UUID: `{0}` by the current user.")]
    UserReviewNotFound(Uuid),

    #[error("Product with UUID: `{0}` not found.")]
    ProductNotFound(Uuid),

    #[error("{0}")]
    InvalidInput(String),

    #[error("The `Authorized-User` header is missing or malformed.")]
    Unauthenticated,

    #[error("Operation failed in MongoDB: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Serializing rating statistics failed: {0}")]
    Serialization(#[from] bson::ser::Error),
}

impl ReviewError {
    fn status_code(&self) -> StatusCode {
        match self {
            ReviewError::DuplicateReview { .. } => StatusCode::CONFLICT,
            ReviewError::Forbidden(_) => StatusCode::FORBIDDEN,
            ReviewError::ReviewNotFound(_)
            | ReviewError::UserReviewNotFound(_)
            | ReviewError::ProductNotFound(_) => StatusCode::NOT_FOUND,
            ReviewError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ReviewError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ReviewError::Database(_) | ReviewError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable error code of the response body.
    fn code(&self) -> &'static str {
        match self {
            ReviewError::DuplicateReview { .. } => "REVIEW_ALREADY_EXISTS",
            ReviewError::Forbidden(_) => "FORBIDDEN",
            ReviewError::ReviewNotFound(_)
            | ReviewError::UserReviewNotFound(_)
            | ReviewError::ProductNotFound(_) => "NOT_FOUND",
            ReviewError::InvalidInput(_) => "INVALID_INPUT",
            ReviewError::Unauthenticated => "UNAUTHENTICATED",
            ReviewError::Database(_) | ReviewError::Serialization(_) => "INTERNAL",
        }
    }

    /// Response body of the error.
    fn body(&self) -> serde_json::Value {
        let mut body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let ReviewError::DuplicateReview {
            existing_review_id, ..
        } = self
        {
            body["existingReviewId"] = json!(existing_review_id.map(|id| id.to_string()));
        }
        body
    }
}

impl IntoResponse for ReviewError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.body())).into_response()
    }
}

/// Returns true if the MongoDB error is a duplicate key write error.
///
/// The uniqueness constraints (one active review per user per product, one
/// like per user per review) are enforced by unique indexes; the service
/// attempts the insert and reacts to this error instead of checking first.
pub fn is_duplicate_key_error(error: &mongodb::error::Error) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_their_status_codes() {
        let id = Uuid::new();
        assert_eq!(
            ReviewError::ReviewNotFound(id).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ReviewError::Forbidden("nope".to_string()).into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ReviewError::Unauthenticated.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ReviewError::InvalidInput("bad".to_string()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        let conflict = ReviewError::DuplicateReview {
            user_id: id,
            product_id: id,
            existing_review_id: Some(id),
        };
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn conflict_body_carries_code_and_existing_review_id() {
        let existing = Uuid::new();
        let error = ReviewError::DuplicateReview {
            user_id: Uuid::new(),
            product_id: Uuid::new(),
            existing_review_id: Some(existing),
        };
        let body = error.body();
        assert_eq!(body["code"], json!("REVIEW_ALREADY_EXISTS"));
        assert_eq!(body["existingReviewId"], json!(existing.to_string()));

        let without_id = ReviewError::DuplicateReview {
            user_id: Uuid::new(),
            product_id: Uuid::new(),
            existing_review_id: None,
        };
        assert!(without_id.body()["existingReviewId"].is_null());
    }

    #[test]
    fn io_errors_are_not_duplicate_keys() {
        let error = mongodb::error::Error::from(std::io::Error::other("connection reset"));
        assert!(!is_duplicate_key_error(&error));
    }
}
