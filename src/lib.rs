//! POS procurement core
//!
//! Purchase orders, receiving, supplier invoices and payable accounts for a
//! retail point of sale, served over a small REST API.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod circuit_breaker;
pub mod config;
pub mod context;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod inventory;
pub mod logging;
pub mod metrics;
pub mod migrator;
pub mod models;
pub mod numbering;
pub mod openapi;
pub mod repositories;
pub mod services;

use axum::{routing::get, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{AllowAll, Authorizer, RoleAuthorizer};
use crate::config::{AppConfig, StorageMode};
use crate::context::SystemClock;
use crate::db::DbConfig;
use crate::events::EventSender;
use crate::inventory::{HttpInventoryClient, InMemoryInventory, InventoryClient};
use crate::numbering::TimestampNumberGenerator;
use crate::repositories::{InMemoryStore, SeaOrmStore};
use crate::services::{ProcurementServices, ProcurementSettings, ServiceDeps};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub services: ProcurementServices,
    pub storage: StorageMode,
    /// Present only with `storage = "database"`; pinged by the health check.
    pub db: Option<Arc<DatabaseConnection>>,
}

impl AppState {
    pub fn in_memory(deps: ServiceDeps, settings: ProcurementSettings) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            services: ProcurementServices::new(store, deps, settings),
            storage: StorageMode::Memory,
            db: None,
        }
    }

    pub fn with_database(
        db: Arc<DatabaseConnection>,
        deps: ServiceDeps,
        settings: ProcurementSettings,
    ) -> Self {
        let store = Arc::new(SeaOrmStore::new(db.clone()));
        Self {
            services: ProcurementServices::new(store, deps, settings),
            storage: StorageMode::Database,
            db: Some(db),
        }
    }

    /// Wires storage and collaborators as configured. Events go to `events`.
    pub async fn from_config(cfg: &AppConfig, events: EventSender) -> anyhow::Result<Self> {
        let authorizer: Arc<dyn Authorizer> = if cfg.enforce_roles {
            info!("Enforcing role permissions from X-Actor-Roles");
            Arc::new(RoleAuthorizer::with_defaults())
        } else {
            Arc::new(AllowAll)
        };

        let inventory: Arc<dyn InventoryClient> = match &cfg.inventory.base_url {
            Some(url) => {
                info!("Inventory service at {}", url);
                Arc::new(HttpInventoryClient::new(
                    url.clone(),
                    cfg.inventory.timeout(),
                    cfg.inventory.circuit_breaker(),
                )?)
            }
            None => {
                warn!("No inventory service configured; stock levels are kept in process");
                Arc::new(InMemoryInventory::new())
            }
        };

        let deps = ServiceDeps {
            authorizer,
            inventory,
            numbers: Arc::new(TimestampNumberGenerator),
            clock: Arc::new(SystemClock),
            events: Arc::new(events),
        };
        let settings = cfg.procurement_settings();

        match cfg.storage {
            StorageMode::Memory => {
                warn!("Using in-memory storage; data is lost on restart");
                Ok(Self::in_memory(deps, settings))
            }
            StorageMode::Database => {
                let db = db::establish_connection(&DbConfig::from(cfg)).await?;
                if cfg.auto_migrate {
                    db::run_migrations(&db).await?;
                    info!("Database migrations applied");
                }
                Ok(Self::with_database(Arc::new(db), deps, settings))
            }
        }
    }
}

/// Every versioned endpoint, relative to `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/suppliers", handlers::suppliers::supplier_routes())
        .nest(
            "/purchase-orders",
            handlers::purchase_orders::purchase_order_routes(),
        )
        .nest("/receipts", handlers::receipts::receipt_routes())
        .nest("/invoices", handlers::invoices::invoice_routes())
        .nest("/payables", handlers::payables::payable_routes())
}

/// Health, metrics, the v1 API and its OpenAPI document.
pub fn build_router(state: AppState) -> Router {
    metrics::register_metrics();
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics_handler))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
