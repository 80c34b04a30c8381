use std::collections::BTreeMap;

use bson::datetime::DateTime;
use bson::Uuid;
use serde::{Deserialize, Serialize};

use crate::review::Rating;
use crate::review_page::ReviewSummary;

/// Product known to the review service.
///
/// The catalog owns the product itself; this collection only carries the
/// denormalized rating snapshot the catalog reads for display.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Product {
    /// Product UUID.
    pub _id: Uuid,
    /// Denormalized rating snapshot of the product.
    pub rating_stats: RatingStats,
}

/// Denormalized rating snapshot embedded in a product.
///
/// Updated by incremental deltas, so it can drift from the live aggregate of
/// published reviews and must stay rebuildable by the recompute job.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct RatingStats {
    /// Total of all counted ratings.
    pub sum: i64,
    /// Number of counted reviews.
    pub count: i64,
    /// Number of counted reviews per star value, keyed "1" through "5".
    pub distribution: BTreeMap<String, i64>,
    /// Average rating rounded to one decimal, 0 when no review is counted.
    pub avg: f64,
    /// Timestamp of the last snapshot write.
    pub updated_at: DateTime,
}

impl RatingStats {
    /// All-zero snapshot with every distribution bucket present.
    pub fn empty(updated_at: DateTime) -> Self {
        Self {
            sum: 0,
            count: 0,
            distribution: zero_distribution(),
            avg: 0.0,
            updated_at,
        }
    }

    /// Average rating rounded to one decimal, 0 when nothing is counted.
    pub fn average(sum: i64, count: i64) -> f64 {
        if count <= 0 {
            return 0.0;
        }
        (sum as f64 / count as f64 * 10.0).round() / 10.0
    }

    /// Builds the snapshot equivalent of a live review summary.
    ///
    /// Used by the recompute job to overwrite whatever the incremental deltas
    /// have accumulated.
    pub fn from_summary(summary: &ReviewSummary, updated_at: DateTime) -> Self {
        let sum = summary
            .distribution
            .iter()
            .map(|(stars, count)| stars.parse::<i64>().unwrap_or(0) * count)
            .sum();
        Self {
            sum,
            count: summary.count,
            distribution: summary.distribution.clone(),
            avg: Self::average(sum, summary.count),
            updated_at,
        }
    }
}

/// Distribution map with every star bucket present and zero.
pub fn zero_distribution() -> BTreeMap<String, i64> {
    Rating::ALL
        .iter()
        .map(|rating| (rating.as_i32().to_string(), 0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_has_all_buckets_and_zero_average() {
        let stats = RatingStats::empty(DateTime::now());
        assert_eq!(stats.sum, 0);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.avg, 0.0);
        assert_eq!(stats.distribution.len(), 5);
        assert_eq!(stats.distribution.values().sum::<i64>(), stats.count);
    }

    #[test]
    fn average_rounds_to_one_decimal() {
        assert_eq!(RatingStats::average(0, 0), 0.0);
        assert_eq!(RatingStats::average(5, 1), 5.0);
        assert_eq!(RatingStats::average(9, 2), 4.5);
        assert_eq!(RatingStats::average(14, 3), 4.7);
        assert_eq!(RatingStats::average(7, 3), 2.3);
    }

    #[test]
    fn snapshot_from_summary_matches_the_live_aggregate() {
        let summary = ReviewSummary::from_rating_counts(&[(5, 2), (3, 1)]);
        let stats = RatingStats::from_summary(&summary, DateTime::now());
        assert_eq!(stats.sum, 13);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.avg, 4.3);
        assert_eq!(stats.distribution.values().sum::<i64>(), stats.count);
        assert_eq!(stats.distribution["5"], 2);
        assert_eq!(stats.distribution["3"], 1);
        assert_eq!(stats.distribution["1"], 0);
    }

    #[test]
    fn recomputing_twice_yields_the_same_snapshot() {
        let now = DateTime::now();
        let summary = ReviewSummary::from_rating_counts(&[(4, 7), (1, 2)]);
        let first = RatingStats::from_summary(&summary, now);
        let second = RatingStats::from_summary(&summary, now);
        assert_eq!(first, second);
    }
}
