#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use pos_procurement::{
    auth::AllowAll,
    build_router,
    context::{Actor, FixedClock},
    db,
    events::{self, EventSender},
    handlers::{ACTOR_ID_HEADER, ACTOR_ROLES_HEADER},
    inventory::{InMemoryInventory, InventoryClient},
    models::{NewSupplier, OrderUnit, PurchaseOrder, Supplier},
    numbering::TimestampNumberGenerator,
    services::{NewOrderItem, NewPurchaseOrder, ProcurementSettings, ServiceDeps},
    AppState,
};

/// Application state over in-memory or SQLite storage with a settable clock
/// and an in-process inventory.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub inventory: Arc<InMemoryInventory>,
    pub clock: FixedClock,
    _event_task: tokio::task::JoinHandle<()>,
}

fn start_clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap())
}

fn deps(
    inventory: Arc<dyn InventoryClient>,
    clock: &FixedClock,
    events: EventSender,
) -> ServiceDeps {
    ServiceDeps {
        authorizer: Arc::new(AllowAll),
        inventory,
        numbers: Arc::new(TimestampNumberGenerator),
        clock: Arc::new(clock.clone()),
        events: Arc::new(events),
    }
}

impl TestApp {
    /// In-memory storage.
    pub fn new() -> Self {
        Self::with_inventory(Arc::new(InMemoryInventory::new()))
    }

    /// In-memory storage over the given inventory, e.g. a strict one.
    pub fn with_inventory(inventory: Arc<InMemoryInventory>) -> Self {
        Self::build(inventory, |deps| {
            AppState::in_memory(deps, ProcurementSettings::default())
        })
    }

    /// SQLite in memory with the full schema applied.
    pub async fn with_sqlite() -> Self {
        let pool = db::in_memory_sqlite()
            .await
            .expect("failed to create test database");
        let pool = Arc::new(pool);
        Self::build(Arc::new(InMemoryInventory::new()), move |deps| {
            AppState::with_database(pool, deps, ProcurementSettings::default())
        })
    }

    fn build(
        inventory: Arc<InMemoryInventory>,
        make_state: impl FnOnce(ServiceDeps) -> AppState,
    ) -> Self {
        let (event_sender, event_rx) = events::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let clock = start_clock();
        let state = make_state(deps(inventory.clone(), &clock, event_sender));
        let router = build_router(state.clone());
        Self {
            router,
            state,
            inventory,
            clock,
            _event_task: event_task,
        }
    }

    /// Send a request against the router, optionally as `actor`.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        actor: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder
                .header(ACTOR_ID_HEADER, actor)
                .header(ACTOR_ROLES_HEADER, "admin");
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Request as the default test actor.
    pub async fn request_as_clerk(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some("clerk-1")).await
    }

    pub async fn supplier(&self, name: &str, payment_terms_days: u32) -> Supplier {
        self.state
            .services
            .suppliers
            .create_supplier(
                &clerk(),
                NewSupplier {
                    name: name.to_string(),
                    contact: None,
                    tax_id: None,
                    payment_terms_days,
                    active: Some(true),
                },
            )
            .await
            .expect("supplier created")
    }

    /// A draft order for `supplier` with one line per `(quantity, unit)`.
    pub async fn draft_order(&self, supplier: &Supplier, lines: &[(u32, OrderUnit)]) -> PurchaseOrder {
        let items = lines
            .iter()
            .enumerate()
            .map(|(i, (quantity, unit))| NewOrderItem {
                product_id: Uuid::new_v4(),
                product_name: format!("Product {}", i + 1),
                quantity: *quantity,
                unit: *unit,
                unit_equivalence: None,
                equivalence_unit: None,
                unit_cost: None,
            })
            .collect();
        self.state
            .services
            .purchase_orders
            .create_order(
                &clerk(),
                NewPurchaseOrder {
                    supplier_id: supplier.id,
                    items,
                    notes: None,
                },
            )
            .await
            .expect("order created")
    }
}

pub fn clerk() -> Actor {
    Actor::new("clerk-1").with_name("Front Desk").with_roles(["admin"])
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Decimals are serialized as strings.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        other => other.to_string().parse().expect("decimal number"),
    }
}
