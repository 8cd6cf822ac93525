use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, non_empty, success_response, validate_input};
use super::CurrentActor;
use crate::errors::ServiceError;
use crate::models::{PurchaseOrderFilter, PurchaseOrderStatus};
use crate::services::{NewPurchaseOrder, ReceiveShipment};
use crate::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PurchaseOrderListQuery {
    pub status: Option<PurchaseOrderStatus>,
    /// Matches the order number or supplier name
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct CancelPurchaseOrderRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// List purchase orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders",
    params(PurchaseOrderListQuery),
    responses(
        (status = 200, description = "Purchase orders", body = [crate::models::PurchaseOrder])
    ),
    tag = "purchase-orders"
)]
pub async fn list_purchase_orders(
    State(state): State<AppState>,
    Query(query): Query<PurchaseOrderListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let filter = PurchaseOrderFilter {
        status: query.status,
        search_text: non_empty(query.search),
    };
    let listing = state.services.purchase_orders.list_orders(&filter).await?;
    Ok(success_response(listing.to_vec()))
}

/// Create a new purchase order in draft
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders",
    request_body = NewPurchaseOrder,
    responses(
        (status = 201, description = "Purchase order created", body = crate::models::PurchaseOrder),
        (status = 400, description = "Invalid input or unknown supplier", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not allowed", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn create_purchase_order(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(payload): Json<NewPurchaseOrder>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let order = state
        .services
        .purchase_orders
        .create_order(&actor, payload)
        .await?;
    info!("Purchase order created: {}", order.order_number);
    Ok(created_response(order))
}

/// Get a purchase order by ID
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order fetched", body = crate::models::PurchaseOrder),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn get_purchase_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.purchase_orders.get_order(id).await?;
    Ok(success_response(order))
}

/// Send a draft purchase order to its supplier
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/send",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order sent", body = crate::models::PurchaseOrder),
        (status = 403, description = "Not allowed", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is not a draft", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn send_purchase_order(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.purchase_orders.send_order(&actor, id).await?;
    info!("Purchase order sent: {}", order.order_number);
    Ok(success_response(order))
}

/// Cancel a draft or sent purchase order
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    request_body = CancelPurchaseOrderRequest,
    responses(
        (status = 200, description = "Purchase order cancelled", body = crate::models::PurchaseOrder),
        (status = 403, description = "Not allowed", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already received or cancelled", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn cancel_purchase_order(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelPurchaseOrderRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(payload) = payload.unwrap_or_default();
    validate_input(&payload)?;
    let reason = non_empty(payload.reason);
    let order = state
        .services
        .purchase_orders
        .cancel_order(&actor, id, reason)
        .await?;
    info!("Purchase order cancelled: {}", order.order_number);
    Ok(success_response(order))
}

/// Record the goods that arrived for a sent order
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/receive",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    request_body = ReceiveShipment,
    responses(
        (status = 201, description = "Receipt filed and stock applied", body = crate::models::ProductReceipt),
        (status = 400, description = "Invalid lines", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order cannot be received", body = crate::errors::ErrorResponse),
        (status = 502, description = "Inventory update failed; retry through the receipt", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn receive_purchase_order(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReceiveShipment>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let receipt = state.services.receiving.receive(&actor, id, payload).await?;
    info!("Purchase order {} received as {}", id, receipt.receipt_number);
    Ok(created_response(receipt))
}

/// The receipt filed for an order, if any
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/{id}/receipt",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Receipt fetched", body = crate::models::ProductReceipt),
        (status = 404, description = "No receipt for this order", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn get_purchase_order_receipt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let receipt = state
        .services
        .receiving
        .receipt_for_order(id)
        .await?
        .ok_or_else(|| ServiceError::not_found("receipt for purchase order", id))?;
    Ok(success_response(receipt))
}

pub fn purchase_order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_purchase_orders).post(create_purchase_order))
        .route("/:id", get(get_purchase_order))
        .route("/:id/send", post(send_purchase_order))
        .route("/:id/cancel", post(cancel_purchase_order))
        .route("/:id/receive", post(receive_purchase_order))
        .route("/:id/receipt", get(get_purchase_order_receipt))
}
