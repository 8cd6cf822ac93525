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

use super::common::{created_response, non_empty, success_response, validate_input};
use super::CurrentActor;
use crate::errors::ServiceError;
use crate::models::{InvoiceDisplayStatus, InvoiceFilter, NewInvoice, PayableAccount, SupplierInvoice};
use crate::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InvoiceListQuery {
    /// `overdue` is derived from the due date, not stored
    pub status: Option<InvoiceDisplayStatus>,
    pub supplier_id: Option<Uuid>,
    /// Matches the invoice number or supplier name
    pub search: Option<String>,
}

/// A registered invoice together with the payable opened for it.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisteredInvoice {
    pub invoice: SupplierInvoice,
    pub payable: PayableAccount,
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices",
    params(InvoiceListQuery),
    responses(
        (status = 200, description = "Invoices, newest issue date first", body = [SupplierInvoice])
    ),
    tag = "invoices"
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<InvoiceListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let filter = InvoiceFilter {
        status: query.status,
        supplier_id: query.supplier_id,
        search_text: non_empty(query.search),
    };
    let invoices = state.services.invoices.list_invoices(&filter).await?;
    Ok(success_response(invoices))
}

/// Register a supplier invoice and open its payable account
#[utoipa::path(
    post,
    path = "/api/v1/invoices",
    request_body = NewInvoice,
    responses(
        (status = 201, description = "Invoice registered", body = RegisteredInvoice),
        (status = 400, description = "Invalid input or unknown supplier", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invoice number already registered for this supplier", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn register_invoice(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(payload): Json<NewInvoice>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let (invoice, payable) = state
        .services
        .invoices
        .register_invoice(&actor, payload)
        .await?;
    info!(
        "Invoice {} registered, due {}",
        invoice.invoice_number, invoice.due_date
    );
    Ok(created_response(RegisteredInvoice { invoice, payable }))
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice fetched", body = SupplierInvoice),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let invoice = state.services.invoices.get_invoice(id).await?;
    Ok(success_response(invoice))
}

/// The payable account opened for an invoice
#[utoipa::path(
    get,
    path = "/api/v1/invoices/{id}/payable",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Payable fetched", body = PayableAccount),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn get_invoice_payable(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let payable = state.services.payables.payable_for_invoice(id).await?;
    Ok(success_response(payable))
}

/// Flag an invoice as paid once its payable balance is zero
#[utoipa::path(
    post,
    path = "/api/v1/invoices/{id}/mark-paid",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice paid", body = SupplierInvoice),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Payable still has a balance", body = crate::errors::ErrorResponse)
    ),
    tag = "invoices"
)]
pub async fn mark_invoice_paid(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let invoice = state.services.invoices.mark_invoice_paid(&actor, id).await?;
    Ok(success_response(invoice))
}

pub fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_invoices).post(register_invoice))
        .route("/:id", get(get_invoice))
        .route("/:id/payable", get(get_invoice_payable))
        .route("/:id/mark-paid", post(mark_invoice_paid))
}
