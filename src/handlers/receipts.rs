use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tracing::info;
use uuid::Uuid;

use super::common::success_response;
use super::CurrentActor;
use crate::errors::ServiceError;
use crate::AppState;

/// Receipts whose stock has not been fully applied yet
#[utoipa::path(
    get,
    path = "/api/v1/receipts/pending",
    responses(
        (status = 200, description = "Receipts waiting for a stock retry", body = [crate::models::ProductReceipt])
    ),
    tag = "receipts"
)]
pub async fn list_pending_receipts(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let receipts = state.services.receiving.list_pending_receipts().await?;
    Ok(success_response(receipts))
}

#[utoipa::path(
    get,
    path = "/api/v1/receipts/{id}",
    params(("id" = Uuid, Path, description = "Receipt ID")),
    responses(
        (status = 200, description = "Receipt fetched", body = crate::models::ProductReceipt),
        (status = 404, description = "Receipt not found", body = crate::errors::ErrorResponse)
    ),
    tag = "receipts"
)]
pub async fn get_receipt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let receipt = state.services.receiving.get_receipt(id).await?;
    Ok(success_response(receipt))
}

/// Apply the stock for lines that failed earlier. Already applied lines are skipped.
#[utoipa::path(
    post,
    path = "/api/v1/receipts/{id}/retry-stock",
    params(("id" = Uuid, Path, description = "Receipt ID")),
    responses(
        (status = 200, description = "Stock applied and order received", body = crate::models::ProductReceipt),
        (status = 404, description = "Receipt not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Inventory still failing", body = crate::errors::ErrorResponse)
    ),
    tag = "receipts"
)]
pub async fn retry_stock_update(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let receipt = state
        .services
        .receiving
        .retry_stock_update(&actor, id)
        .await?;
    info!("Stock retry for receipt {} finished: {}", id, receipt.stock_status);
    Ok(success_response(receipt))
}

pub fn receipt_routes() -> Router<AppState> {
    Router::new()
        .route("/pending", get(list_pending_receipts))
        .route("/:id", get(get_receipt))
        .route("/:id/retry-stock", post(retry_stock_update))
}
