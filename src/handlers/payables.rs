use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{success_response, validate_input};
use super::CurrentActor;
use crate::errors::ServiceError;
use crate::models::{NewPayment, PayableFilter, PayableStatus};
use crate::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PayableListQuery {
    pub status: Option<PayableStatus>,
    pub supplier_id: Option<Uuid>,
    /// Only unpaid accounts past their due date
    #[serde(default)]
    pub overdue_only: bool,
}

/// List payable accounts, earliest due date first
#[utoipa::path(
    get,
    path = "/api/v1/payables",
    params(PayableListQuery),
    responses(
        (status = 200, description = "Payable accounts", body = [crate::models::PayableAccount])
    ),
    tag = "payables"
)]
pub async fn list_payables(
    State(state): State<AppState>,
    Query(query): Query<PayableListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let filter = PayableFilter {
        status: query.status,
        supplier_id: query.supplier_id,
        overdue_only: query.overdue_only,
    };
    let accounts = state.services.payables.list_payables(&filter).await?;
    Ok(success_response(accounts))
}

/// Outstanding totals across every payable
#[utoipa::path(
    get,
    path = "/api/v1/payables/summary",
    responses(
        (status = 200, description = "Payables summary", body = crate::models::PayablesSummary)
    ),
    tag = "payables"
)]
pub async fn payables_summary(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let summary = state.services.payables.summary().await?;
    Ok(success_response(summary))
}

#[utoipa::path(
    get,
    path = "/api/v1/payables/{id}",
    params(("id" = Uuid, Path, description = "Payable account ID")),
    responses(
        (status = 200, description = "Payable fetched", body = crate::models::PayableAccount),
        (status = 404, description = "Payable not found", body = crate::errors::ErrorResponse)
    ),
    tag = "payables"
)]
pub async fn get_payable(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let account = state.services.payables.get_payable(id).await?;
    Ok(success_response(account))
}

/// Record a payment against a payable account
#[utoipa::path(
    post,
    path = "/api/v1/payables/{id}/payments",
    params(("id" = Uuid, Path, description = "Payable account ID")),
    request_body = NewPayment,
    responses(
        (status = 200, description = "Payment applied; a repeated reference returns the account unchanged", body = crate::models::PayableAccount),
        (status = 400, description = "Amount must be positive", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
        (status = 422, description = "Payment exceeds the balance", body = crate::errors::ErrorResponse)
    ),
    tag = "payables"
)]
pub async fn record_payment(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<NewPayment>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let account = state
        .services
        .payables
        .record_payment(&actor, id, payload)
        .await?;
    info!(
        "Payment recorded on {}: balance {} ({})",
        account.id, account.balance, account.status
    );
    Ok(success_response(account))
}

pub fn payable_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_payables))
        .route("/summary", get(payables_summary))
        .route("/:id", get(get_payable))
        .route("/:id/payments", post(record_payment))
}
