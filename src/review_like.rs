use bson::datetime::DateTime;
use bson::Uuid;
use serde::{Deserialize, Serialize};

/// The like of a user on a review.
///
/// Likes are stored as independent records instead of an embedded array so
/// that like writes scale independently of the review document. Uniqueness of
/// (review, user) is enforced by a compound index; the collection is the
/// source of truth for `is_liked`, the counter on the review is derived.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ReviewLike {
    /// Like UUID.
    pub _id: Uuid,
    /// Review that was liked.
    pub review_id: Uuid,
    /// User who liked the review.
    pub user_id: Uuid,
    /// Timestamp when the like was created.
    pub created_at: DateTime,
}
