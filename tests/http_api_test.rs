mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use common::{body_json, decimal, TestApp};

async fn create_supplier(app: &TestApp, name: &str, terms: u32) -> Uuid {
    let response = app
        .request_as_clerk(
            Method::POST,
            "/api/v1/suppliers",
            Some(json!({ "name": name, "payment_terms_days": terms })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    body["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn health_and_metrics_are_exposed() {
    let app = TestApp::new();

    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["storage"], "memory");

    let response = app.request(Method::GET, "/metrics", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn mutations_require_an_actor() {
    let app = TestApp::new();
    let response = app
        .request(
            Method::POST,
            "/api/v1/suppliers",
            Some(json!({ "name": "Nobody's supplier" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "missing_actor");
}

#[tokio::test]
async fn order_lifecycle_over_http() {
    let app = TestApp::new();
    let supplier_id = create_supplier(&app, "Abarrotes Uno", 30).await;
    let product_a = Uuid::new_v4();
    let product_b = Uuid::new_v4();

    let response = app
        .request_as_clerk(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({
                "supplier_id": supplier_id,
                "items": [
                    { "product_id": product_a, "product_name": "Rice 1kg", "quantity": 10, "unit": "piece" },
                    { "product_id": product_b, "product_name": "Oil 12x1L", "quantity": 5, "unit": "box",
                      "unit_equivalence": 12, "equivalence_unit": "bottle", "unit_cost": "18.40" }
                ]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = body_json(response).await;
    assert_eq!(order["status"], "draft");
    assert!(order["order_number"].as_str().unwrap().starts_with("PO-"));
    assert_eq!(order["created_by"], "clerk-1");
    let order_id = order["id"].as_str().unwrap().to_string();

    let response = app
        .request_as_clerk(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/send", order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "sent");

    let response = app
        .request_as_clerk(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/receive", order_id),
            Some(json!({
                "lines": [
                    { "product_id": product_a, "received_quantity": 10, "unit_cost": "2.50" },
                    { "product_id": product_b, "received_quantity": 3, "unit_cost": "9.00" }
                ]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let receipt = body_json(response).await;
    assert_eq!(receipt["stock_status"], "applied");
    assert_eq!(receipt["items"][1]["is_complete"], false);
    assert_eq!(app.inventory.level(product_a), 10);
    assert_eq!(app.inventory.level(product_b), 3);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/purchase-orders/{}/receipt", order_id),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], receipt["id"]);

    let response = app
        .request_as_clerk(
            Method::POST,
            &format!("/api/v1/purchase-orders/{}/cancel", order_id),
            Some(json!({ "reason": "too late" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["code"], "invalid_transition");

    let response = app
        .request(Method::GET, "/api/v1/purchase-orders?status=received", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new();
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/purchase-orders/{}", Uuid::new_v4()),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "not_found");
}

#[tokio::test]
async fn order_for_unknown_supplier_is_rejected() {
    let app = TestApp::new();
    let response = app
        .request_as_clerk(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({
                "supplier_id": Uuid::new_v4(),
                "items": [
                    { "product_id": Uuid::new_v4(), "product_name": "Soap", "quantity": 1, "unit": "piece" }
                ]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "unknown_supplier");
}

#[tokio::test]
async fn invoice_and_payments_over_http() {
    let app = TestApp::new();
    let supplier_id = create_supplier(&app, "Carnes Selectas", 30).await;

    let response = app
        .request_as_clerk(
            Method::POST,
            "/api/v1/invoices",
            Some(json!({
                "invoice_number": "CS-500",
                "supplier_id": supplier_id,
                "amount": "1000",
                "issue_date": "2024-01-01"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let registered = body_json(response).await;
    assert_eq!(registered["invoice"]["due_date"], "2024-01-31");
    assert_eq!(registered["payable"]["status"], "pending");
    let invoice_id = registered["invoice"]["id"].as_str().unwrap().to_string();
    let payable_id = registered["payable"]["id"].as_str().unwrap().to_string();

    let pay = |amount: &str| json!({ "amount": amount, "method": "transfer" });
    let payments_uri = format!("/api/v1/payables/{}/payments", payable_id);

    let response = app
        .request_as_clerk(Method::POST, &payments_uri, Some(pay("400")))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let account = body_json(response).await;
    assert_eq!(account["status"], "partial");
    assert_eq!(decimal(&account["balance"]), dec!(600));

    let response = app
        .request_as_clerk(
            Method::POST,
            &format!("/api/v1/invoices/{}/mark-paid", invoice_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .request_as_clerk(Method::POST, &payments_uri, Some(pay("700")))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["code"], "overpayment");

    let response = app
        .request_as_clerk(Method::POST, &payments_uri, Some(pay("0")))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "invalid_amount");

    let response = app
        .request_as_clerk(Method::POST, &payments_uri, Some(pay("600")))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let account = body_json(response).await;
    assert_eq!(account["status"], "paid");
    assert_eq!(decimal(&account["balance"]), dec!(0));

    let response = app
        .request(Method::GET, &format!("/api/v1/invoices/{}", invoice_id), None, None)
        .await;
    assert_eq!(body_json(response).await["status"], "paid");

    let response = app
        .request(Method::GET, "/api/v1/payables/summary", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    assert_eq!(summary["open_count"], 0);
    assert_eq!(decimal(&summary["total_outstanding"]), dec!(0));
}

#[tokio::test]
async fn supplier_admin_over_http() {
    let app = TestApp::new();
    let supplier_id = create_supplier(&app, "Papeleria Norte", 0).await;

    let response = app
        .request_as_clerk(
            Method::POST,
            &format!("/api/v1/suppliers/{}/deactivate", supplier_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["active"], false);

    let response = app
        .request(Method::GET, "/api/v1/suppliers?active_only=true", None, None)
        .await;
    assert!(body_json(response).await.as_array().unwrap().is_empty());

    let response = app
        .request(Method::GET, "/api/v1/suppliers?search=papel", None, None)
        .await;
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

    let response = app
        .request_as_clerk(
            Method::PUT,
            &format!("/api/v1/suppliers/{}", supplier_id),
            Some(json!({ "payment_terms_days": 45 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["payment_terms_days"], 45);

    let response = app
        .request_as_clerk(
            Method::DELETE,
            &format!("/api/v1/suppliers/{}", supplier_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .request(Method::GET, &format!("/api/v1/suppliers/{}", supplier_id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
