//! REST adapter over [`ProcurementServices`](crate::services::ProcurementServices).
//!
//! The gateway in front of this service authenticates callers and forwards
//! their identity in `X-Actor-Id`, `X-Actor-Name` and `X-Actor-Roles`
//! (comma separated). Mutating endpoints require `X-Actor-Id`.

pub mod common;
pub mod health;
pub mod invoices;
pub mod payables;
pub mod purchase_orders;
pub mod receipts;
pub mod suppliers;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::context::Actor;
use crate::errors::ErrorResponse;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
pub const ACTOR_ROLES_HEADER: &str = "x-actor-roles";

/// The caller, as announced by the gateway headers.
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

impl CurrentActor {
    fn from_headers(headers: &HeaderMap) -> Option<Actor> {
        let mut actor = Actor::new(header_value(headers, ACTOR_ID_HEADER)?);
        if let Some(name) = header_value(headers, ACTOR_NAME_HEADER) {
            actor = actor.with_name(name);
        }
        if let Some(roles) = header_value(headers, ACTOR_ROLES_HEADER) {
            actor = actor.with_roles(
                roles
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty()),
            );
        }
        Some(actor)
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[derive(Debug)]
pub struct MissingActor;

impl IntoResponse for MissingActor {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: "Unauthorized".to_string(),
            code: "missing_actor".to_string(),
            message: format!("the {} header is required", ACTOR_ID_HEADER),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = MissingActor;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
            .map(CurrentActor)
            .ok_or(MissingActor)
    }
}
