use std::collections::HashSet;

use bson::datetime::DateTime;
use bson::{Bson, Document, Uuid, doc};
use futures::TryStreamExt;
use log::info;
use mongodb::options::{FindOptions, IndexOptions};
use mongodb::{Collection, Database, IndexModel};

use crate::error::{ReviewError, is_duplicate_key_error};
use crate::order_datatypes::ReviewSort;
use crate::rating_aggregator::RatingAggregator;
use crate::review::{Rating, Review, ReviewPatch, ReviewStatus, ReviewView, normalize_text};
use crate::review_like::ReviewLike;
use crate::review_page::{ReviewPage, ReviewSummary, normalize_page, normalize_page_size};

/// Orchestrates the review lifecycle and the like toggles.
///
/// Every state transition that affects published rating totals is forwarded
/// to the rating aggregator. A review mutation and its aggregate delta are two
/// separate writes without rollback coupling; drift is repaired offline by the
/// recompute job.
#[derive(Clone)]
pub struct ReviewService {
    review_collection: Collection<Review>,
    like_collection: Collection<ReviewLike>,
    aggregator: RatingAggregator,
}

impl ReviewService {
    pub fn new(db_client: &Database) -> Self {
        Self {
            review_collection: db_client.collection::<Review>("reviews"),
            like_collection: db_client.collection::<ReviewLike>("review_likes"),
            aggregator: RatingAggregator::new(db_client),
        }
    }

    /// Creates the MongoDB indexes backing the uniqueness constraints and the
    /// list queries.
    ///
    /// The partial unique index on (product, user) only covers published and
    /// hidden reviews, so a user can write a new review after deleting the
    /// old one.
    pub async fn ensure_indexes(db_client: &Database) -> Result<(), ReviewError> {
        let review_collection = db_client.collection::<Review>("reviews");
        let like_collection = db_client.collection::<ReviewLike>("review_likes");

        let active_review_index = IndexModel::builder()
            .keys(doc! {"product_id": 1, "user_id": 1})
            .options(
                IndexOptions::builder()
                    .unique(true)
                    .partial_filter_expression(doc! {
                        "status": {"$in": [ReviewStatus::Published, ReviewStatus::Hidden]},
                    })
                    .build(),
            )
            .build();
        review_collection
            .create_index(active_review_index, None)
            .await?;

        let listing_index = IndexModel::builder()
            .keys(doc! {"product_id": 1, "status": 1, "created_at": -1})
            .build();
        review_collection.create_index(listing_index, None).await?;

        let like_index = IndexModel::builder()
            .keys(doc! {"review_id": 1, "user_id": 1})
            .options(IndexOptions::builder().unique(true).build())
            .build();
        like_collection.create_index(like_index, None).await?;

        info!("MongoDB indexes are in place.");
        Ok(())
    }

    /// Registers a product announced by the catalog.
    pub async fn register_product(&self, product_id: Uuid) -> Result<(), ReviewError> {
        self.aggregator.register_product(product_id).await
    }

    /// Creates a published review of a user for a product.
    ///
    /// The one-active-review-per-user constraint is enforced by the partial
    /// unique index; a duplicate key error is translated into a conflict that
    /// carries the id of the existing review so the caller can offer an edit
    /// flow instead of a hard failure.
    pub async fn create(
        &self,
        user_id: Uuid,
        user_name: &str,
        product_id: Uuid,
        rating: Rating,
        text: &str,
    ) -> Result<ReviewView, ReviewError> {
        let text = normalize_text(text)?;
        let current_timestamp = DateTime::now();
        let review = Review {
            _id: Uuid::new(),
            product_id,
            user_id,
            user_name: user_name.to_string(),
            rating,
            text,
            status: ReviewStatus::Published,
            likes_count: 0,
            created_at: current_timestamp,
            last_updated_at: current_timestamp,
        };
        if let Err(error) = self.review_collection.insert_one(&review, None).await {
            if is_duplicate_key_error(&error) {
                let existing = self.find_active_review(product_id, user_id).await?;
                return Err(ReviewError::DuplicateReview {
                    user_id,
                    product_id,
                    existing_review_id: existing.map(|existing_review| existing_review._id),
                });
            }
            return Err(error.into());
        }
        self.aggregator.on_review_created(product_id, rating).await?;
        Ok(review.into_view(false))
    }

    /// Applies a partial patch to a published review of its author.
    pub async fn update(
        &self,
        review_id: Uuid,
        user_id: Uuid,
        patch: ReviewPatch,
    ) -> Result<ReviewView, ReviewError> {
        let review = self.query_review(review_id).await?;
        if review.user_id != user_id {
            return Err(ReviewError::Forbidden(
                "Only the author of a review may edit it.".to_string(),
            ));
        }
        match review.status {
            ReviewStatus::Published => {}
            ReviewStatus::Hidden => {
                return Err(ReviewError::Forbidden(
                    "Hidden reviews cannot be edited.".to_string(),
                ));
            }
            ReviewStatus::Deleted => {
                return Err(ReviewError::Forbidden(
                    "Deleted reviews cannot be edited.".to_string(),
                ));
            }
        }
        let current_timestamp = DateTime::now();
        if let Some(update) = patch_document(&patch, &current_timestamp)? {
            self.review_collection
                .update_one(doc! {"_id": review_id}, update, None)
                .await?;
        }
        if let Some(new_rating) = patch.rating {
            self.aggregator
                .on_review_rating_changed(review.product_id, review.rating, new_rating)
                .await?;
        }
        let updated = self.query_review(review_id).await?;
        let is_liked = self.is_liked_by(review_id, Some(user_id)).await?;
        Ok(updated.into_view(is_liked))
    }

    /// Soft-deletes a review on behalf of its author or an administrator.
    ///
    /// The review is never removed physically; its status transitions to
    /// deleted and it stops blocking the author from writing a new review.
    pub async fn remove(
        &self,
        review_id: Uuid,
        user_id: Uuid,
        is_admin: bool,
    ) -> Result<ReviewView, ReviewError> {
        let review = self.query_review(review_id).await?;
        if review.user_id != user_id && !is_admin {
            return Err(ReviewError::Forbidden(
                "Only the author or an administrator may delete a review.".to_string(),
            ));
        }
        let was_published = review.status == ReviewStatus::Published;
        self.review_collection
            .update_one(
                doc! {"_id": review_id},
                doc! {"$set": {
                    "status": ReviewStatus::Deleted,
                    "last_updated_at": DateTime::now(),
                }},
                None,
            )
            .await?;
        if was_published {
            self.aggregator
                .on_review_unpublished(review.product_id, review.rating)
                .await?;
        }
        let deleted = self.query_review(review_id).await?;
        let is_liked = self.is_liked_by(review_id, Some(user_id)).await?;
        Ok(deleted.into_view(is_liked))
    }

    /// Toggles the like of a user on a published review.
    ///
    /// The like record is the source of truth: the insert either succeeds or
    /// hits the unique index, and the counter on the review is adjusted with
    /// an atomic increment afterwards. The decrement filter keeps the counter
    /// from going negative. `likes_count` is read back after the mutation so
    /// concurrent toggles do not compound drift in the response.
    pub async fn toggle_like(
        &self,
        review_id: Uuid,
        user_id: Uuid,
    ) -> Result<ReviewView, ReviewError> {
        let review = self.query_review(review_id).await?;
        if review.status != ReviewStatus::Published {
            return Err(ReviewError::Forbidden(
                "Hidden or deleted reviews cannot be liked.".to_string(),
            ));
        }
        let like = ReviewLike {
            _id: Uuid::new(),
            review_id,
            user_id,
            created_at: DateTime::now(),
        };
        let is_liked = match self.like_collection.insert_one(&like, None).await {
            Ok(_) => {
                self.review_collection
                    .update_one(
                        doc! {"_id": review_id},
                        doc! {"$inc": {"likes_count": 1}},
                        None,
                    )
                    .await?;
                true
            }
            Err(error) if is_duplicate_key_error(&error) => {
                self.like_collection
                    .delete_one(doc! {"review_id": review_id, "user_id": user_id}, None)
                    .await?;
                self.review_collection
                    .update_one(
                        doc! {"_id": review_id, "likes_count": {"$gt": 0}},
                        doc! {"$inc": {"likes_count": -1}},
                        None,
                    )
                    .await?;
                false
            }
            Err(error) => return Err(error.into()),
        };
        let refreshed = self.query_review(review_id).await?;
        Ok(refreshed.into_view(is_liked))
    }

    /// Retrieves a published review of a specific id.
    ///
    /// Hidden and deleted reviews are indistinguishable from reviews that
    /// never existed.
    pub async fn get_public_review(
        &self,
        review_id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<ReviewView, ReviewError> {
        let review = self
            .review_collection
            .find_one(
                doc! {"_id": review_id, "status": ReviewStatus::Published},
                None,
            )
            .await?
            .ok_or(ReviewError::ReviewNotFound(review_id))?;
        let is_liked = self.is_liked_by(review_id, viewer).await?;
        Ok(review.into_view(is_liked))
    }

    /// Retrieves the caller's active (published or hidden) review for a product.
    pub async fn get_user_review_for_product(
        &self,
        product_id: Uuid,
        user_id: Uuid,
    ) -> Result<ReviewView, ReviewError> {
        let review = self
            .find_active_review(product_id, user_id)
            .await?
            .ok_or(ReviewError::UserReviewNotFound(product_id))?;
        let review_id = review._id;
        let is_liked = self.is_liked_by(review_id, Some(user_id)).await?;
        Ok(review.into_view(is_liked))
    }

    /// Retrieves one page of a product's published reviews.
    ///
    /// The summary in the response is aggregated live from the review
    /// collection, never read from the snapshot on the product.
    pub async fn find_by_product_with_pagination(
        &self,
        product_id: Uuid,
        page: Option<u64>,
        page_size: Option<u64>,
        sort_by: ReviewSort,
        rating_filter: Option<Rating>,
        viewer: Option<Uuid>,
    ) -> Result<ReviewPage, ReviewError> {
        let page = normalize_page(page);
        let page_size = normalize_page_size(page_size);
        let mut filter = doc! {"product_id": product_id, "status": ReviewStatus::Published};
        if let Some(rating) = rating_filter {
            filter.insert("rating", rating.as_i32());
        }
        let total = self
            .review_collection
            .count_documents(filter.clone(), None)
            .await?;
        let find_options = FindOptions::builder()
            .skip((page - 1) * page_size)
            .limit(page_size as i64)
            .sort(sort_by.sort_document())
            .build();
        let cursor = self.review_collection.find(filter, find_options).await?;
        let reviews: Vec<Review> = cursor.try_collect().await?;
        let liked = self.liked_review_ids(&reviews, viewer).await?;
        let items = reviews
            .into_iter()
            .map(|review| {
                let is_liked = liked.contains(&review._id);
                review.into_view(is_liked)
            })
            .collect();
        let summary = self.get_reviews_summary(product_id).await?;
        Ok(ReviewPage {
            items,
            page,
            page_size,
            total,
            summary,
        })
    }

    /// Aggregates all published reviews of a product into a live summary.
    ///
    /// This is the authoritative computation that the incremental deltas on
    /// the product snapshot approximate.
    pub async fn get_reviews_summary(
        &self,
        product_id: Uuid,
    ) -> Result<ReviewSummary, ReviewError> {
        let counts = rating_counts(&self.review_collection, product_id).await?;
        Ok(ReviewSummary::from_rating_counts(&counts))
    }

    /// Queries a review of any status.
    async fn query_review(&self, review_id: Uuid) -> Result<Review, ReviewError> {
        self.review_collection
            .find_one(doc! {"_id": review_id}, None)
            .await?
            .ok_or(ReviewError::ReviewNotFound(review_id))
    }

    /// Queries the published or hidden review of a user for a product, if any.
    async fn find_active_review(
        &self,
        product_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Review>, ReviewError> {
        let filter = doc! {
            "product_id": product_id,
            "user_id": user_id,
            "status": {"$in": [ReviewStatus::Published, ReviewStatus::Hidden]},
        };
        Ok(self.review_collection.find_one(filter, None).await?)
    }

    /// Whether the given user has liked the review. Anonymous viewers never have.
    async fn is_liked_by(
        &self,
        review_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<bool, ReviewError> {
        let Some(user_id) = user_id else {
            return Ok(false);
        };
        let like = self
            .like_collection
            .find_one(doc! {"review_id": review_id, "user_id": user_id}, None)
            .await?;
        Ok(like.is_some())
    }

    /// Ids of the reviews in the batch that the viewer has liked.
    async fn liked_review_ids(
        &self,
        reviews: &[Review],
        viewer: Option<Uuid>,
    ) -> Result<HashSet<Uuid>, ReviewError> {
        let Some(user_id) = viewer else {
            return Ok(HashSet::new());
        };
        if reviews.is_empty() {
            return Ok(HashSet::new());
        }
        let review_ids: Vec<Uuid> = reviews.iter().map(|review| review._id).collect();
        let cursor = self
            .like_collection
            .find(
                doc! {"user_id": user_id, "review_id": {"$in": review_ids}},
                None,
            )
            .await?;
        let likes: Vec<ReviewLike> = cursor.try_collect().await?;
        Ok(likes.into_iter().map(|like| like.review_id).collect())
    }
}

/// Counts the published reviews of a product grouped by rating value.
///
/// Shared between the live summary and the recompute job so both derive their
/// numbers from the same aggregation.
pub(crate) async fn rating_counts(
    collection: &Collection<Review>,
    product_id: Uuid,
) -> Result<Vec<(i32, i64)>, ReviewError> {
    let pipeline = vec![
        doc! {"$match": {"product_id": product_id, "status": ReviewStatus::Published}},
        doc! {"$group": {"_id": "$rating", "count": {"$sum": 1}}},
    ];
    let mut cursor = collection.aggregate(pipeline, None).await?;
    let mut counts = Vec::new();
    while let Some(group) = cursor.try_next().await? {
        let rating = match group.get("_id") {
            Some(Bson::Int32(value)) => *value,
            Some(Bson::Int64(value)) => *value as i32,
            _ => continue,
        };
        let count = match group.get("count") {
            Some(Bson::Int32(value)) => i64::from(*value),
            Some(Bson::Int64(value)) => *value,
            _ => 0,
        };
        counts.push((rating, count));
    }
    Ok(counts)
}

/// Builds the `$set` document for a partial review patch.
///
/// Returns `None` when the patch carries no fields, in which case nothing is
/// written and the stored review stays untouched.
fn patch_document(
    patch: &ReviewPatch,
    current_timestamp: &DateTime,
) -> Result<Option<Document>, ReviewError> {
    let mut fields = Document::new();
    if let Some(rating) = patch.rating {
        fields.insert("rating", rating.as_i32());
    }
    if let Some(text) = &patch.text {
        fields.insert("text", normalize_text(text)?);
    }
    if fields.is_empty() {
        return Ok(None);
    }
    fields.insert("last_updated_at", *current_timestamp);
    Ok(Some(doc! {"$set": fields}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_writes_nothing() {
        let patch = ReviewPatch::default();
        assert!(patch_document(&patch, &DateTime::now()).unwrap().is_none());
    }

    #[test]
    fn patch_sets_the_given_fields_and_the_timestamp() {
        let now = DateTime::now();
        let patch = ReviewPatch {
            rating: Some(Rating::TwoStars),
            text: Some("  changed my mind  ".to_string()),
        };
        let update = patch_document(&patch, &now).unwrap().unwrap();
        let fields = update.get_document("$set").unwrap();
        assert_eq!(fields.get_i32("rating").unwrap(), 2);
        assert_eq!(fields.get_str("text").unwrap(), "changed my mind");
        assert_eq!(fields.get_datetime("last_updated_at").unwrap(), &now);
    }

    #[test]
    fn rating_only_patch_leaves_the_text_alone() {
        let patch = ReviewPatch {
            rating: Some(Rating::FiveStars),
            text: None,
        };
        let update = patch_document(&patch, &DateTime::now()).unwrap().unwrap();
        let fields = update.get_document("$set").unwrap();
        assert!(fields.get("text").is_none());
        assert_eq!(fields.get_i32("rating").unwrap(), 5);
    }

    #[test]
    fn patch_rejects_an_invalid_text() {
        let patch = ReviewPatch {
            rating: None,
            text: Some("  x ".to_string()),
        };
        assert!(patch_document(&patch, &DateTime::now()).is_err());
    }
}
