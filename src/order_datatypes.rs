use bson::{Document, doc};
use serde::Deserialize;

/// Order direction for MongoDB document sorting.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OrderDirection {
    /// Ascending order direction.
    Asc,
    /// Descending order direction.
    Desc,
}

/// Implements conversion to `i32` for MongoDB document sorting.
impl From<OrderDirection> for i32 {
    fn from(value: OrderDirection) -> Self {
        match value {
            OrderDirection::Asc => 1,
            OrderDirection::Desc => -1,
        }
    }
}

/// Sort orders offered for product review listings.
#[derive(Debug, Deserialize, Copy, Clone, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSort {
    /// Orders by creation time, newest first.
    #[default]
    Newest,
    /// Orders by creation time, oldest first.
    Oldest,
    /// Orders by rating, best first.
    RatingDesc,
    /// Orders by rating, worst first.
    RatingAsc,
    /// Orders by like count, most liked first.
    MostLiked,
}

impl ReviewSort {
    /// Primary sort field and direction.
    fn primary(&self) -> (&'static str, OrderDirection) {
        match self {
            ReviewSort::Newest => ("created_at", OrderDirection::Desc),
            ReviewSort::Oldest => ("created_at", OrderDirection::Asc),
            ReviewSort::RatingDesc => ("rating", OrderDirection::Desc),
            ReviewSort::RatingAsc => ("rating", OrderDirection::Asc),
            ReviewSort::MostLiked => ("likes_count", OrderDirection::Desc),
        }
    }

    /// Sort document for the MongoDB find options.
    ///
    /// Whenever the primary field can carry duplicates, `created_at` (newest
    /// first) is appended as a tie-breaker so pagination stays stable across
    /// requests.
    pub fn sort_document(&self) -> Document {
        let (field, direction) = self.primary();
        let mut sort = doc! { field: i32::from(direction) };
        if field != "created_at" {
            sort.insert("created_at", i32::from(OrderDirection::Desc));
        }
        sort
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_orders_sort_by_creation_time_only() {
        assert_eq!(ReviewSort::Newest.sort_document(), doc! {"created_at": -1});
        assert_eq!(ReviewSort::Oldest.sort_document(), doc! {"created_at": 1});
    }

    #[test]
    fn value_orders_carry_the_tie_breaker() {
        assert_eq!(
            ReviewSort::RatingDesc.sort_document(),
            doc! {"rating": -1, "created_at": -1}
        );
        assert_eq!(
            ReviewSort::RatingAsc.sort_document(),
            doc! {"rating": 1, "created_at": -1}
        );
        assert_eq!(
            ReviewSort::MostLiked.sort_document(),
            doc! {"likes_count": -1, "created_at": -1}
        );
    }

    #[test]
    fn tie_breaker_comes_after_the_primary_key() {
        let sort = ReviewSort::MostLiked.sort_document();
        let keys: Vec<&str> = sort.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["likes_count", "created_at"]);
    }

    #[test]
    fn sort_parses_from_query_values() {
        let parsed: ReviewSort = serde_json::from_value(serde_json::json!("rating_desc")).unwrap();
        assert_eq!(parsed, ReviewSort::RatingDesc);
        assert_eq!(ReviewSort::default(), ReviewSort::Newest);
    }
}
