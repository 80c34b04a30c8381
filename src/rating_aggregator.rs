use bson::datetime::DateTime;
use bson::{Document, Uuid, doc};
use mongodb::{Collection, Database};

use crate::error::{ReviewError, is_duplicate_key_error};
use crate::product::{Product, RatingStats};
use crate::review::Rating;

/// Maintains the denormalized rating snapshot embedded in each product.
///
/// Deltas are applied with atomic `$inc` operators, so concurrent review
/// events cannot lose updates. The average is recomputed in a second write
/// because it is a read-modify-write over the just-updated sum and count; it
/// can momentarily lag a concurrent delta, which is acceptable because the
/// average is display-only and never used as a correctness gate.
#[derive(Clone)]
pub struct RatingAggregator {
    product_collection: Collection<Product>,
}

impl RatingAggregator {
    pub fn new(db_client: &Database) -> Self {
        Self {
            product_collection: db_client.collection::<Product>("products"),
        }
    }

    /// Registers a product announced by the catalog with an all-zero snapshot.
    ///
    /// Registering the same product twice is a no-op.
    pub async fn register_product(&self, product_id: Uuid) -> Result<(), ReviewError> {
        let product = Product {
            _id: product_id,
            rating_stats: RatingStats::empty(DateTime::now()),
        };
        match self.product_collection.insert_one(product, None).await {
            Ok(_) => Ok(()),
            Err(error) if is_duplicate_key_error(&error) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    /// Applies the delta for a newly published review.
    pub async fn on_review_created(
        &self,
        product_id: Uuid,
        rating: Rating,
    ) -> Result<(), ReviewError> {
        let result = self
            .product_collection
            .update_one(
                doc! {"_id": product_id},
                doc! {"$inc": created_increments(rating)},
                None,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(ReviewError::ProductNotFound(product_id));
        }
        self.refresh_average(product_id).await
    }

    /// Applies the delta for a published review whose rating changed.
    pub async fn on_review_rating_changed(
        &self,
        product_id: Uuid,
        old_rating: Rating,
        new_rating: Rating,
    ) -> Result<(), ReviewError> {
        if old_rating == new_rating {
            return Ok(());
        }
        let result = self
            .product_collection
            .update_one(
                doc! {"_id": product_id},
                doc! {"$inc": rating_changed_increments(old_rating, new_rating)},
                None,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(ReviewError::ProductNotFound(product_id));
        }
        self.refresh_average(product_id).await
    }

    /// Applies the delta for a review leaving the published state.
    ///
    /// The `count > 0` precondition is part of the update filter, not a
    /// separate read, so concurrent unpublishes cannot drive the counters
    /// negative.
    pub async fn on_review_unpublished(
        &self,
        product_id: Uuid,
        rating: Rating,
    ) -> Result<(), ReviewError> {
        let result = self
            .product_collection
            .update_one(
                doc! {"_id": product_id, "rating_stats.count": {"$gt": 0}},
                doc! {"$inc": unpublished_increments(rating)},
                None,
            )
            .await?;
        if result.matched_count == 0 {
            // Either the product is unknown or the counter is already zero.
            return match self
                .product_collection
                .find_one(doc! {"_id": product_id}, None)
                .await?
            {
                Some(_) => Ok(()),
                None => Err(ReviewError::ProductNotFound(product_id)),
            };
        }
        self.refresh_average(product_id).await
    }

    /// Unconditionally overwrites the rating snapshot of a product.
    ///
    /// Used by the recompute job to repair drift.
    pub async fn set_rating_snapshot(
        &self,
        product_id: Uuid,
        snapshot: &RatingStats,
    ) -> Result<(), ReviewError> {
        let result = self
            .product_collection
            .update_one(
                doc! {"_id": product_id},
                doc! {"$set": {"rating_stats": bson::to_bson(snapshot)?}},
                None,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(ReviewError::ProductNotFound(product_id));
        }
        Ok(())
    }

    /// Recomputes the advisory average from the just-updated sum and count.
    async fn refresh_average(&self, product_id: Uuid) -> Result<(), ReviewError> {
        let product = self
            .product_collection
            .find_one(doc! {"_id": product_id}, None)
            .await?
            .ok_or(ReviewError::ProductNotFound(product_id))?;
        let average = RatingStats::average(product.rating_stats.sum, product.rating_stats.count);
        self.product_collection
            .update_one(
                doc! {"_id": product_id},
                doc! {"$set": {
                    "rating_stats.avg": average,
                    "rating_stats.updated_at": DateTime::now(),
                }},
                None,
            )
            .await?;
        Ok(())
    }
}

/// Dotted update path of the distribution bucket for a rating.
fn distribution_key(rating: Rating) -> String {
    format!("rating_stats.distribution.{}", rating.as_i32())
}

/// `$inc` document for a newly published review.
fn created_increments(rating: Rating) -> Document {
    let mut increments = doc! {
        "rating_stats.sum": rating.as_i32(),
        "rating_stats.count": 1,
    };
    increments.insert(distribution_key(rating), 1);
    increments
}

/// `$inc` document for a rating change, callers skip equal ratings.
fn rating_changed_increments(old_rating: Rating, new_rating: Rating) -> Document {
    let mut increments = doc! {
        "rating_stats.sum": new_rating.as_i32() - old_rating.as_i32(),
    };
    increments.insert(distribution_key(old_rating), -1);
    increments.insert(distribution_key(new_rating), 1);
    increments
}

/// `$inc` document for a review leaving the published state.
fn unpublished_increments(rating: Rating) -> Document {
    let mut increments = doc! {
        "rating_stats.sum": -rating.as_i32(),
        "rating_stats.count": -1,
    };
    increments.insert(distribution_key(rating), -1);
    increments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_keys_address_the_star_buckets() {
        assert_eq!(
            distribution_key(Rating::OneStars),
            "rating_stats.distribution.1"
        );
        assert_eq!(
            distribution_key(Rating::FiveStars),
            "rating_stats.distribution.5"
        );
    }

    #[test]
    fn created_delta_adds_the_rating_everywhere() {
        let increments = created_increments(Rating::FourStars);
        assert_eq!(increments.get_i32("rating_stats.sum").unwrap(), 4);
        assert_eq!(increments.get_i32("rating_stats.count").unwrap(), 1);
        assert_eq!(
            increments.get_i32("rating_stats.distribution.4").unwrap(),
            1
        );
    }

    #[test]
    fn rating_change_delta_moves_between_buckets() {
        let increments = rating_changed_increments(Rating::FiveStars, Rating::ThreeStars);
        assert_eq!(increments.get_i32("rating_stats.sum").unwrap(), -2);
        assert_eq!(
            increments.get_i32("rating_stats.distribution.5").unwrap(),
            -1
        );
        assert_eq!(
            increments.get_i32("rating_stats.distribution.3").unwrap(),
            1
        );
        assert!(increments.get("rating_stats.count").is_none());
    }

    #[test]
    fn unpublished_delta_is_the_inverse_of_created() {
        let created = created_increments(Rating::TwoStars);
        let unpublished = unpublished_increments(Rating::TwoStars);
        for key in ["rating_stats.sum", "rating_stats.count", "rating_stats.distribution.2"] {
            let applied = created.get_i32(key).unwrap() + unpublished.get_i32(key).unwrap();
            assert_eq!(applied, 0, "delta `{}` does not cancel out", key);
        }
    }
}
