use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Conflict",
    "code": "invalid_transition",
    "message": "cannot cancel purchase order 550e8400-e29b-41d4-a716-446655440000 while it is received",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category
    pub error: String,
    /// Machine-readable error code
    pub code: String,
    /// Human-readable description
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("cannot {action} {entity} {id} while it is {current}")]
    InvalidTransition {
        entity: &'static str,
        id: Uuid,
        action: &'static str,
        current: String,
    },

    #[error("purchase order {order_id} cannot be received while it is {status}")]
    OrderNotReceivable { order_id: Uuid, status: String },

    #[error("product {product_id} is not on purchase order {order_id}")]
    UnknownProduct { order_id: Uuid, product_id: Uuid },

    #[error("unknown supplier {0}")]
    UnknownSupplier(Uuid),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("payment of {amount} exceeds balance {balance} on payable {payable_id}")]
    Overpayment {
        payable_id: Uuid,
        amount: Decimal,
        balance: Decimal,
    },

    #[error("amount must be greater than zero, got {0}")]
    InvalidAmount(Decimal),

    #[error("stock update for product {product_id} on receipt {receipt_id} failed: {reason}")]
    InventoryUpdateFailed {
        receipt_id: Uuid,
        product_id: Uuid,
        reason: String,
    },

    #[error("actor {actor} is not allowed to {action}")]
    Unauthorized { actor: String, action: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Stable snake_case code for clients; mirrors the variant name.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationError(_) => "validation_error",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::OrderNotReceivable { .. } => "order_not_receivable",
            Self::UnknownProduct { .. } => "unknown_product",
            Self::UnknownSupplier(_) => "unknown_supplier",
            Self::NotFound { .. } => "not_found",
            Self::Overpayment { .. } => "overpayment",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InventoryUpdateFailed { .. } => "inventory_update_failed",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Conflict(_) => "conflict",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::DatabaseError(_) => "database_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_)
            | Self::UnknownProduct { .. }
            | Self::UnknownSupplier(_)
            | Self::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unauthorized { .. } => StatusCode::FORBIDDEN,
            Self::InvalidTransition { .. }
            | Self::OrderNotReceivable { .. }
            | Self::Conflict(_)
            | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::Overpayment { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InventoryUpdateFailed { .. } => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::not_found("invoice", id).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::InvalidTransition {
                entity: "purchase order",
                id,
                action: "send",
                current: "cancelled".into(),
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::Overpayment {
                payable_id: id,
                amount: dec!(2),
                balance: dec!(1),
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::Unauthorized {
                actor: "u".into(),
                action: "purchaseorders:send".into(),
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn transition_message_carries_context() {
        let id = Uuid::new_v4();
        let err = ServiceError::InvalidTransition {
            entity: "purchase order",
            id,
            action: "cancel",
            current: "received".into(),
        };
        let msg = err.response_message();
        assert!(msg.contains("cancel"));
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains("received"));
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = ServiceError::DatabaseError(DbErr::Custom("password=hunter2".into()));
        assert_eq!(err.response_message(), "Database error");
        let err = ServiceError::InternalError("stack".into());
        assert_eq!(err.response_message(), "Internal server error");
    }
}
