use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router, debug_handler};
use axum::extract::{Path, Query, State};
use bson::Uuid;
use serde::Deserialize;

use crate::authentication::AuthorizedUserHeader;
use crate::error::ReviewError;
use crate::order_datatypes::ReviewSort;
use crate::review::{Rating, ReviewPatch};
use crate::review_service::ReviewService;

/// Service state shared by the REST handlers.
#[derive(Clone)]
pub struct ApiState {
    pub service: ReviewService,
}

/// Builds the REST router of the review service.
pub fn router(service: ReviewService) -> Router {
    Router::new()
        .route("/products", post(register_product))
        .route(
            "/products/{product_id}/reviews",
            post(create_review).get(list_reviews),
        )
        .route("/products/{product_id}/reviews/summary", get(reviews_summary))
        .route("/products/{product_id}/reviews/mine", get(my_review))
        .route(
            "/reviews/{review_id}",
            get(get_review).patch(update_review).delete(delete_review),
        )
        .route("/reviews/{review_id}/like", post(toggle_like))
        .with_state(ApiState { service })
}

/// Payload to register a product announced by the catalog.
#[derive(Deserialize, Debug)]
pub struct RegisterProductBody {
    /// Product UUID.
    pub id: String,
}

/// Payload to create a review.
#[derive(Deserialize, Debug)]
pub struct CreateReviewBody {
    /// Rating of review in 1-5 stars.
    pub rating: Rating,
    /// Text of review.
    pub text: String,
}

/// Query parameters of the paginated review listing.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListReviewsQuery {
    /// 1-based page number, defaults to the first page.
    pub page: Option<u64>,
    /// Number of reviews per page, capped at 50.
    pub page_size: Option<u64>,
    /// Sort order, defaults to newest first.
    #[serde(default)]
    pub sort_by: ReviewSort,
    /// Restricts the listing to one exact star value.
    pub rating: Option<Rating>,
}

/// Parses a UUID carried in a path segment or payload field.
fn parse_uuid(value: &str) -> Result<Uuid, ReviewError> {
    Uuid::parse_str(value)
        .map_err(|_| ReviewError::InvalidInput(format!("`{}` is not a valid UUID.", value)))
}

/// HTTP endpoint for the catalog to register a newly created product.
#[debug_handler(state = ApiState)]
async fn register_product(
    State(state): State<ApiState>,
    Json(body): Json<RegisterProductBody>,
) -> Result<StatusCode, ReviewError> {
    let product_id = parse_uuid(&body.id)?;
    state.service.register_product(product_id).await?;
    Ok(StatusCode::CREATED)
}

/// HTTP endpoint to create a review for a product.
#[debug_handler(state = ApiState)]
async fn create_review(
    State(state): State<ApiState>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<CreateReviewBody>,
) -> Result<impl IntoResponse, ReviewError> {
    let product_id = parse_uuid(&product_id)?;
    let user = AuthorizedUserHeader::try_from(&headers)?;
    let review = state
        .service
        .create(user.id, &user.username, product_id, body.rating, &body.text)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// HTTP endpoint to list a product's published reviews with pagination and a
/// live summary.
#[debug_handler(state = ApiState)]
async fn list_reviews(
    State(state): State<ApiState>,
    Path(product_id): Path<String>,
    Query(query): Query<ListReviewsQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ReviewError> {
    let product_id = parse_uuid(&product_id)?;
    let viewer = AuthorizedUserHeader::try_from(&headers)
        .ok()
        .map(|user| user.id);
    let page = state
        .service
        .find_by_product_with_pagination(
            product_id,
            query.page,
            query.page_size,
            query.sort_by,
            query.rating,
            viewer,
        )
        .await?;
    Ok(Json(page))
}

/// HTTP endpoint for the live rating summary of a product.
#[debug_handler(state = ApiState)]
async fn reviews_summary(
    State(state): State<ApiState>,
    Path(product_id): Path<String>,
) -> Result<impl IntoResponse, ReviewError> {
    let summary = state.service.get_reviews_summary(parse_uuid(&product_id)?).await?;
    Ok(Json(summary))
}

/// HTTP endpoint for the caller's own active review of a product.
#[debug_handler(state = ApiState)]
async fn my_review(
    State(state): State<ApiState>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ReviewError> {
    let product_id = parse_uuid(&product_id)?;
    let user = AuthorizedUserHeader::try_from(&headers)?;
    let review = state
        .service
        .get_user_review_for_product(product_id, user.id)
        .await?;
    Ok(Json(review))
}

/// HTTP endpoint to retrieve a published review.
#[debug_handler(state = ApiState)]
async fn get_review(
    State(state): State<ApiState>,
    Path(review_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ReviewError> {
    let review_id = parse_uuid(&review_id)?;
    let viewer = AuthorizedUserHeader::try_from(&headers)
        .ok()
        .map(|user| user.id);
    let review = state.service.get_public_review(review_id, viewer).await?;
    Ok(Json(review))
}

/// HTTP endpoint for a review author to edit their review.
#[debug_handler(state = ApiState)]
async fn update_review(
    State(state): State<ApiState>,
    Path(review_id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<ReviewPatch>,
) -> Result<impl IntoResponse, ReviewError> {
    let review_id = parse_uuid(&review_id)?;
    let user = AuthorizedUserHeader::try_from(&headers)?;
    let review = state.service.update(review_id, user.id, patch).await?;
    Ok(Json(review))
}

/// HTTP endpoint to soft-delete a review.
#[debug_handler(state = ApiState)]
async fn delete_review(
    State(state): State<ApiState>,
    Path(review_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ReviewError> {
    let review_id = parse_uuid(&review_id)?;
    let user = AuthorizedUserHeader::try_from(&headers)?;
    let review = state
        .service
        .remove(review_id, user.id, user.is_admin())
        .await?;
    Ok(Json(review))
}

/// HTTP endpoint to toggle the caller's like on a review.
#[debug_handler(state = ApiState)]
async fn toggle_like(
    State(state): State<ApiState>,
    Path(review_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ReviewError> {
    let review_id = parse_uuid(&review_id)?;
    let user = AuthorizedUserHeader::try_from(&headers)?;
    let review = state.service.toggle_like(review_id, user.id).await?;
    Ok(Json(review))
}
