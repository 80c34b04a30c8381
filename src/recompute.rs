//! Offline rebuild of the denormalized counters.
//!
//! The incremental deltas accept drift (non-atomic average step, aggregate
//! writes without rollback coupling, manual database edits); these jobs are
//! the compensating repair mechanism. They are idempotent and safe to run
//! while the service is taking traffic, every per-document overwrite is a
//! single independent write.

use bson::datetime::DateTime;
use bson::doc;
use futures::TryStreamExt;
use log::info;
use mongodb::Database;

use crate::error::ReviewError;
use crate::product::{Product, RatingStats};
use crate::rating_aggregator::RatingAggregator;
use crate::review::Review;
use crate::review_like::ReviewLike;
use crate::review_page::ReviewSummary;
use crate::review_service::rating_counts;

/// Rebuilds the rating snapshot of every product from its published reviews.
///
/// Returns the number of products that were recomputed.
pub async fn recompute_rating_snapshots(db_client: &Database) -> Result<u64, ReviewError> {
    let product_collection = db_client.collection::<Product>("products");
    let review_collection = db_client.collection::<Review>("reviews");
    let aggregator = RatingAggregator::new(db_client);
    let mut cursor = product_collection.find(None, None).await?;
    let mut recomputed = 0;
    while let Some(product) = cursor.try_next().await? {
        let counts = rating_counts(&review_collection, product._id).await?;
        let summary = ReviewSummary::from_rating_counts(&counts);
        let snapshot = RatingStats::from_summary(&summary, DateTime::now());
        aggregator.set_rating_snapshot(product._id, &snapshot).await?;
        recomputed += 1;
    }
    info!("Recomputed the rating snapshot of {} products.", recomputed);
    Ok(recomputed)
}

/// Rebuilds `likes_count` on every review from the like records.
///
/// The like collection is the source of truth; the counter on the review can
/// drift because the two writes of a toggle are not coupled. Returns the
/// number of reviews whose counter was corrected.
pub async fn recompute_like_counts(db_client: &Database) -> Result<u64, ReviewError> {
    let review_collection = db_client.collection::<Review>("reviews");
    let like_collection = db_client.collection::<ReviewLike>("review_likes");
    let mut cursor = review_collection.find(None, None).await?;
    let mut repaired = 0;
    while let Some(review) = cursor.try_next().await? {
        let likes = like_collection
            .count_documents(doc! {"review_id": review._id}, None)
            .await? as i64;
        if likes != review.likes_count {
            review_collection
                .update_one(
                    doc! {"_id": review._id},
                    doc! {"$set": {"likes_count": likes}},
                    None,
                )
                .await?;
            repaired += 1;
        }
    }
    info!("Repaired the like counter of {} reviews.", repaired);
    Ok(repaired)
}
