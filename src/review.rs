use bson::datetime::DateTime;
use bson::{Bson, Uuid};
use chrono::Utc;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::ReviewError;

/// Minimum number of characters of a review text after trimming.
pub const MIN_TEXT_LENGTH: usize = 3;
/// Maximum number of characters of a review text after trimming.
pub const MAX_TEXT_LENGTH: usize = 1000;

/// The review of a user.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Review {
    /// Review UUID.
    pub _id: Uuid,
    /// Product that the review is about.
    pub product_id: Uuid,
    /// User who wrote the review.
    pub user_id: Uuid,
    /// Display name of the user at the time the review was written.
    pub user_name: String,
    /// Rating of review in 1-5 stars.
    pub rating: Rating,
    /// Text of review.
    pub text: String,
    /// Visibility status of review.
    pub status: ReviewStatus,
    /// Number of likes the review has received.
    pub likes_count: i64,
    /// Timestamp when review was created.
    pub created_at: DateTime,
    /// Timestamp when review was last updated.
    pub last_updated_at: DateTime,
}

impl Review {
    /// Converts the stored review into its display shape.
    pub fn into_view(self, is_liked: bool) -> ReviewView {
        ReviewView {
            id: self._id.to_string(),
            product_id: self.product_id.to_string(),
            user_id: self.user_id.to_string(),
            user_name: self.user_name,
            rating: self.rating.as_i32(),
            text: self.text,
            likes_count: self.likes_count,
            is_liked,
            created_at: self.created_at.to_chrono(),
            updated_at: self.last_updated_at.to_chrono(),
        }
    }
}

/// Rating of review in 1-5 stars.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Rating {
    OneStars = 1,
    TwoStars = 2,
    ThreeStars = 3,
    FourStars = 4,
    FiveStars = 5,
}

impl Rating {
    pub const ALL: [Rating; 5] = [
        Rating::OneStars,
        Rating::TwoStars,
        Rating::ThreeStars,
        Rating::FourStars,
        Rating::FiveStars,
    ];

    /// Converts enum value to the star count.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Rating {
    type Error = ReviewError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Rating::OneStars),
            2 => Ok(Rating::TwoStars),
            3 => Ok(Rating::ThreeStars),
            4 => Ok(Rating::FourStars),
            5 => Ok(Rating::FiveStars),
            _ => Err(ReviewError::InvalidInput(format!(
                "Rating must be between 1 and 5 stars, got: `{}`.",
                value
            ))),
        }
    }
}

/// Ratings are stored as their star count so the distribution buckets and the
/// aggregation pipeline work on plain integers.
impl Serialize for Rating {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

impl<'de> Deserialize<'de> for Rating {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i32::deserialize(deserializer)?;
        Rating::try_from(value).map_err(serde::de::Error::custom)
    }
}

impl From<Rating> for Bson {
    fn from(value: Rating) -> Self {
        Bson::Int32(value.as_i32())
    }
}

/// Visibility status of a review.
///
/// Only published reviews count toward rating aggregates and are visible to
/// general readers. Hidden is reachable by moderation only; deleted reviews
/// stay in the collection but no longer block a user from writing a new one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Published,
    Hidden,
    Deleted,
}

impl ReviewStatus {
    /// Converts enum value to the stored string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Published => "published",
            ReviewStatus::Hidden => "hidden",
            ReviewStatus::Deleted => "deleted",
        }
    }
}

impl From<ReviewStatus> for Bson {
    fn from(value: ReviewStatus) -> Self {
        Bson::String(value.as_str().to_string())
    }
}

/// Partial patch a review author may apply to their published review.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ReviewPatch {
    /// New rating of review in 1-5 stars.
    pub rating: Option<Rating>,
    /// New text of review.
    pub text: Option<String>,
}

/// Display shape of a review as exposed to API consumers.
///
/// Ids are rendered as their canonical string form, `is_liked` is always
/// present and `false` for anonymous callers.
#[derive(Debug, Serialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub id: String,
    pub product_id: String,
    pub user_id: String,
    pub user_name: String,
    pub rating: i32,
    pub text: String,
    pub likes_count: i64,
    pub is_liked: bool,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

/// Trims a review text and enforces the length bounds.
pub fn normalize_text(text: &str) -> Result<String, ReviewError> {
    let trimmed = text.trim();
    let length = trimmed.chars().count();
    if length < MIN_TEXT_LENGTH || length > MAX_TEXT_LENGTH {
        let message = format!(
            "Review text must be between {} and {} characters, got: `{}`.",
            MIN_TEXT_LENGTH, MAX_TEXT_LENGTH, length
        );
        return Err(ReviewError::InvalidInput(message));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_accepts_one_to_five_stars() {
        for value in 1..=5 {
            assert_eq!(Rating::try_from(value).unwrap().as_i32(), value);
        }
        assert!(Rating::try_from(0).is_err());
        assert!(Rating::try_from(6).is_err());
    }

    #[test]
    fn rating_is_stored_as_integer() {
        assert_eq!(Bson::from(Rating::ThreeStars), Bson::Int32(3));
        assert_eq!(bson::to_bson(&Rating::FiveStars).unwrap(), Bson::Int32(5));
        let parsed: Rating = bson::from_bson(Bson::Int32(4)).unwrap();
        assert_eq!(parsed, Rating::FourStars);
        assert!(bson::from_bson::<Rating>(Bson::Int32(7)).is_err());
    }

    #[test]
    fn status_is_stored_as_lowercase_string() {
        assert_eq!(
            Bson::from(ReviewStatus::Published),
            Bson::String("published".to_string())
        );
        assert_eq!(
            bson::to_bson(&ReviewStatus::Deleted).unwrap(),
            Bson::String("deleted".to_string())
        );
        let parsed: ReviewStatus = bson::from_bson(Bson::String("hidden".to_string())).unwrap();
        assert_eq!(parsed, ReviewStatus::Hidden);
    }

    #[test]
    fn normalize_text_trims_and_checks_bounds() {
        assert_eq!(normalize_text("  solid blender  ").unwrap(), "solid blender");
        assert_eq!(normalize_text("abc").unwrap(), "abc");
        assert!(normalize_text("ab").is_err());
        assert!(normalize_text("   a   ").is_err());
        let longest = "x".repeat(MAX_TEXT_LENGTH);
        assert_eq!(normalize_text(&longest).unwrap().chars().count(), MAX_TEXT_LENGTH);
        let too_long = "x".repeat(MAX_TEXT_LENGTH + 1);
        assert!(normalize_text(&too_long).is_err());
    }

    #[test]
    fn view_uses_the_display_contract_field_names() {
        let review = Review {
            _id: Uuid::new(),
            product_id: Uuid::new(),
            user_id: Uuid::new(),
            user_name: "ada".to_string(),
            rating: Rating::FourStars,
            text: "does what it says".to_string(),
            status: ReviewStatus::Published,
            likes_count: 2,
            created_at: DateTime::now(),
            last_updated_at: DateTime::now(),
        };
        let view = review.into_view(true);
        assert_eq!(view.rating, 4);
        assert!(view.is_liked);

        let value = serde_json::to_value(&view).unwrap();
        for field in [
            "id",
            "productId",
            "userId",
            "userName",
            "rating",
            "text",
            "likesCount",
            "isLiked",
            "createdAt",
            "updatedAt",
        ] {
            assert!(value.get(field).is_some(), "missing field `{}`", field);
        }
    }
}
