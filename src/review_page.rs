use std::collections::BTreeMap;

use serde::Serialize;

use crate::product::{RatingStats, zero_distribution};
use crate::review::ReviewView;

/// Maximum page size a caller may request.
pub const MAX_PAGE_SIZE: u64 = 50;
/// Page size used when the caller does not request one.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// A page of reviews.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPage {
    /// The resulting reviews in display shape.
    pub items: Vec<ReviewView>,
    /// 1-based page number.
    pub page: u64,
    /// Number of reviews per page.
    pub page_size: u64,
    /// The total amount of matching reviews.
    pub total: u64,
    /// Live aggregate over all published reviews of the product.
    pub summary: ReviewSummary,
}

/// Live rating aggregate of a product's published reviews.
///
/// Computed from the review collection on every request, never read from the
/// snapshot on the product, so a listing and its own stated average stay
/// consistent even when the snapshot has drifted.
#[derive(Debug, Serialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    /// Average rating rounded to one decimal, 0 when no review is published.
    pub avg: f64,
    /// Number of published reviews.
    pub count: i64,
    /// Number of published reviews per star value, keyed "1" through "5".
    pub distribution: BTreeMap<String, i64>,
}

impl ReviewSummary {
    /// Builds the summary from per-rating group counts.
    ///
    /// Every star bucket is present in the result, zero when unused.
    pub fn from_rating_counts(counts: &[(i32, i64)]) -> Self {
        let mut distribution = zero_distribution();
        let mut count = 0;
        let mut sum = 0;
        for (stars, group_count) in counts {
            distribution.insert(stars.to_string(), *group_count);
            count += group_count;
            sum += i64::from(*stars) * group_count;
        }
        Self {
            avg: RatingStats::average(sum, count),
            count,
            distribution,
        }
    }
}

/// Clamps a requested page number to at least 1.
pub fn normalize_page(page: Option<u64>) -> u64 {
    page.unwrap_or(1).max(1)
}

/// Clamps a requested page size into `1..=MAX_PAGE_SIZE`.
pub fn normalize_page_size(page_size: Option<u64>) -> u64 {
    page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_no_reviews_is_all_zero() {
        let summary = ReviewSummary::from_rating_counts(&[]);
        assert_eq!(summary.avg, 0.0);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.distribution.len(), 5);
        assert!(summary.distribution.values().all(|count| *count == 0));
    }

    #[test]
    fn summary_defaults_unused_buckets_to_zero() {
        let summary = ReviewSummary::from_rating_counts(&[(5, 1), (2, 3)]);
        assert_eq!(summary.count, 4);
        assert_eq!(summary.avg, 2.8);
        assert_eq!(summary.distribution["5"], 1);
        assert_eq!(summary.distribution["2"], 3);
        assert_eq!(summary.distribution["1"], 0);
        assert_eq!(summary.distribution["3"], 0);
        assert_eq!(summary.distribution["4"], 0);
        assert_eq!(summary.distribution.values().sum::<i64>(), summary.count);
    }

    #[test]
    fn page_defaults_and_clamping() {
        assert_eq!(normalize_page(None), 1);
        assert_eq!(normalize_page(Some(0)), 1);
        assert_eq!(normalize_page(Some(7)), 7);
        assert_eq!(normalize_page_size(None), DEFAULT_PAGE_SIZE);
        assert_eq!(normalize_page_size(Some(0)), 1);
        assert_eq!(normalize_page_size(Some(200)), MAX_PAGE_SIZE);
        assert_eq!(normalize_page_size(Some(25)), 25);
    }
}
