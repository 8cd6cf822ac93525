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

use super::common::{created_response, no_content_response, non_empty, success_response, validate_input};
use super::CurrentActor;
use crate::errors::ServiceError;
use crate::models::{NewSupplier, SupplierUpdate};
use crate::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SupplierListQuery {
    /// Case-insensitive match on the supplier name
    pub search: Option<String>,
    /// Only suppliers that can take new orders
    #[serde(default)]
    pub active_only: bool,
}

/// List suppliers
#[utoipa::path(
    get,
    path = "/api/v1/suppliers",
    params(SupplierListQuery),
    responses(
        (status = 200, description = "Suppliers sorted by name", body = [crate::models::Supplier])
    ),
    tag = "suppliers"
)]
pub async fn list_suppliers(
    State(state): State<AppState>,
    Query(query): Query<SupplierListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let directory = &state.services.suppliers;
    let suppliers = if query.active_only {
        directory.list_active_suppliers().await?
    } else {
        let search = non_empty(query.search);
        directory.list_suppliers(search.as_deref()).await?
    };
    Ok(success_response(suppliers))
}

/// Create a supplier
#[utoipa::path(
    post,
    path = "/api/v1/suppliers",
    request_body = NewSupplier,
    responses(
        (status = 201, description = "Supplier created", body = crate::models::Supplier),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not allowed", body = crate::errors::ErrorResponse)
    ),
    tag = "suppliers"
)]
pub async fn create_supplier(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(payload): Json<NewSupplier>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let supplier = state.services.suppliers.create_supplier(&actor, payload).await?;
    info!("Supplier created: {}", supplier.id);
    Ok(created_response(supplier))
}

/// Get a supplier by ID
#[utoipa::path(
    get,
    path = "/api/v1/suppliers/{id}",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Supplier fetched", body = crate::models::Supplier),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse)
    ),
    tag = "suppliers"
)]
pub async fn get_supplier(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let supplier = state.services.suppliers.get_supplier(id).await?;
    Ok(success_response(supplier))
}

/// Edit supplier details
#[utoipa::path(
    put,
    path = "/api/v1/suppliers/{id}",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    request_body = SupplierUpdate,
    responses(
        (status = 200, description = "Supplier updated", body = crate::models::Supplier),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse)
    ),
    tag = "suppliers"
)]
pub async fn update_supplier(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
    Json(payload): Json<SupplierUpdate>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let supplier = state
        .services
        .suppliers
        .update_supplier(&actor, id, payload)
        .await?;
    Ok(success_response(supplier))
}

/// Delete a supplier. Orders and invoices that reference it stay readable.
#[utoipa::path(
    delete,
    path = "/api/v1/suppliers/{id}",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 204, description = "Supplier deleted"),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse)
    ),
    tag = "suppliers"
)]
pub async fn delete_supplier(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.suppliers.delete_supplier(&actor, id).await?;
    info!("Supplier deleted: {}", id);
    Ok(no_content_response())
}

#[utoipa::path(
    post,
    path = "/api/v1/suppliers/{id}/activate",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Supplier activated", body = crate::models::Supplier),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse)
    ),
    tag = "suppliers"
)]
pub async fn activate_supplier(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let supplier = state.services.suppliers.activate_supplier(&actor, id).await?;
    Ok(success_response(supplier))
}

#[utoipa::path(
    post,
    path = "/api/v1/suppliers/{id}/deactivate",
    params(("id" = Uuid, Path, description = "Supplier ID")),
    responses(
        (status = 200, description = "Supplier deactivated", body = crate::models::Supplier),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse)
    ),
    tag = "suppliers"
)]
pub async fn deactivate_supplier(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let supplier = state
        .services
        .suppliers
        .deactivate_supplier(&actor, id)
        .await?;
    Ok(success_response(supplier))
}

pub fn supplier_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_suppliers).post(create_supplier))
        .route(
            "/:id",
            get(get_supplier).put(update_supplier).delete(delete_supplier),
        )
        .route("/:id/activate", post(activate_supplier))
        .route("/:id/deactivate", post(deactivate_supplier))
}
