mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, expect_error, read_json, TestApp};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
struct Created {
    id: Uuid,
}

#[derive(Deserialize)]
struct Item {
    id: Uuid,
    quantity: f64,
    status: String,
}

#[derive(Deserialize)]
struct Order {
    id: Uuid,
    order_number: String,
    status: String,
    dispatch_date: Option<String>,
    actual_delivery_date: Option<String>,
    items: Option<Vec<Item>>,
}

struct Fixture {
    app: TestApp,
    token: String,
    customer: Uuid,
    product: Uuid,
}

async fn fixture() -> Result<Option<Fixture>> {
    let Some(app) = TestApp::new().await? else {
        return Ok(None);
    };
    let (_, _, token) = app.admin_session("Acme").await?;

    let response = app
        .post_json("/api/customers", &json!({ "name": "Initech" }), Some(&token))
        .await?;
    let customer = read_json::<Created>(response).await?.id;
    let response = app
        .post_json(
            "/api/products",
            &json!({ "name": "Solar inverter", "unit": "pcs" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let product = read_json::<Created>(response).await?.id;

    Ok(Some(Fixture {
        app,
        token,
        customer,
        product,
    }))
}

async fn create_order(fx: &Fixture, quantity: f64) -> Result<Order> {
    let response = fx
        .app
        .post_json(
            "/api/dispatch/orders",
            &json!({
                "customer_id": fx.customer,
                "delivery_address": "1 Main St",
                "items": [{ "product_id": fx.product, "quantity": quantity, "unit": "pcs" }]
            }),
            Some(&fx.token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    read_json(response).await
}

#[tokio::test]
async fn order_is_numbered_and_moves_through_delivery() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(fx) = fixture().await? else {
        return Ok(());
    };

    let order = create_order(&fx, 2.0).await?;
    assert!(order.order_number.starts_with("DO/"));
    assert!(order.order_number.ends_with("/00001"));
    assert_eq!(order.status, "pending");
    assert!(order.dispatch_date.is_none());
    let items = order.items.expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, "pending");

    let second = create_order(&fx, 1.0).await?;
    assert!(second.order_number.ends_with("/00002"));

    let path = format!("/api/dispatch/orders/{}", order.id);
    let response = fx
        .app
        .put_json(&path, &json!({ "status": "in_transit", "tracking_number": "TRK-1" }), Some(&fx.token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let in_transit: Order = read_json(response).await?;
    assert_eq!(in_transit.status, "in_transit");
    let dispatched_at = in_transit.dispatch_date.clone().expect("dispatch date stamped");

    let response = fx
        .app
        .put_json(&path, &json!({ "status": "delivered" }), Some(&fx.token))
        .await?;
    let delivered: Order = read_json(response).await?;
    assert_eq!(delivered.status, "delivered");
    assert!(delivered.actual_delivery_date.is_some());
    assert_eq!(delivered.dispatch_date.as_deref(), Some(dispatched_at.as_str()));

    let response = fx
        .app
        .put_json(&path, &json!({ "status": "pending" }), Some(&fx.token))
        .await?;
    expect_error(response, StatusCode::BAD_REQUEST).await?;

    let response = fx
        .app
        .get("/api/dispatch/orders?status=delivered", Some(&fx.token))
        .await?;
    let delivered_only: Vec<Order> = read_json(response).await?;
    assert_eq!(delivered_only.len(), 1);
    assert_eq!(delivered_only[0].id, order.id);

    fx.app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn order_validation_errors() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(fx) = fixture().await? else {
        return Ok(());
    };

    let response = fx
        .app
        .post_json(
            "/api/dispatch/orders",
            &json!({ "customer_id": fx.customer, "delivery_address": "1 Main St", "items": [] }),
            Some(&fx.token),
        )
        .await?;
    assert_eq!(
        expect_error(response, StatusCode::BAD_REQUEST).await?,
        "At least one item is required"
    );

    let response = fx
        .app
        .post_json(
            "/api/dispatch/orders",
            &json!({
                "customer_id": fx.customer,
                "delivery_address": "1 Main St",
                "items": [{ "product_id": fx.product, "quantity": 0.0, "unit": "pcs" }]
            }),
            Some(&fx.token),
        )
        .await?;
    assert_eq!(
        expect_error(response, StatusCode::BAD_REQUEST).await?,
        "Item quantity must be greater than 0"
    );

    let response = fx
        .app
        .post_json(
            "/api/dispatch/orders",
            &json!({
                "customer_id": fx.customer,
                "delivery_address": "1 Main St",
                "items": [{ "product_id": Uuid::new_v4(), "quantity": 1.0, "unit": "pcs" }]
            }),
            Some(&fx.token),
        )
        .await?;
    assert_eq!(
        expect_error(response, StatusCode::NOT_FOUND).await?,
        "Product not found"
    );

    let response = fx
        .app
        .get(&format!("/api/dispatch/orders/{}", Uuid::new_v4()), Some(&fx.token))
        .await?;
    assert_eq!(
        expect_error(response, StatusCode::NOT_FOUND).await?,
        "Dispatch order not found"
    );

    fx.app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn items_move_forward_and_quantities_lock_after_dispatch() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(fx) = fixture().await? else {
        return Ok(());
    };

    let order = create_order(&fx, 3.0).await?;
    let item_id = order.items.expect("items")[0].id;
    let item_path = format!("/api/dispatch/orders/{}/items/{item_id}", order.id);

    let response = fx
        .app
        .put_json(&item_path, &json!({ "quantity": 5.0, "status": "packed" }), Some(&fx.token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let item: Item = read_json(response).await?;
    assert_eq!(item.quantity, 5.0);
    assert_eq!(item.status, "packed");

    let response = fx
        .app
        .put_json(&item_path, &json!({ "status": "pending" }), Some(&fx.token))
        .await?;
    expect_error(response, StatusCode::BAD_REQUEST).await?;

    fx.app
        .put_json(
            &format!("/api/dispatch/orders/{}", order.id),
            &json!({ "status": "in_transit" }),
            Some(&fx.token),
        )
        .await?;

    let response = fx
        .app
        .put_json(&item_path, &json!({ "quantity": 1.0 }), Some(&fx.token))
        .await?;
    assert_eq!(
        expect_error(response, StatusCode::BAD_REQUEST).await?,
        "Item quantity can only change while the order is pending"
    );

    fx.app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn only_pending_orders_without_jobs_can_be_deleted() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(fx) = fixture().await? else {
        return Ok(());
    };

    let shipped = create_order(&fx, 1.0).await?;
    fx.app
        .put_json(
            &format!("/api/dispatch/orders/{}", shipped.id),
            &json!({ "status": "in_transit" }),
            Some(&fx.token),
        )
        .await?;
    let response = fx
        .app
        .delete(&format!("/api/dispatch/orders/{}", shipped.id), Some(&fx.token))
        .await?;
    assert_eq!(
        expect_error(response, StatusCode::BAD_REQUEST).await?,
        "Can only delete dispatch orders in pending status"
    );

    let with_job = create_order(&fx, 1.0).await?;
    let response = fx
        .app
        .post_json(
            "/api/dispatch/installation-jobs",
            &json!({
                "dispatch_order_id": with_job.id,
                "customer_id": fx.customer,
                "installation_address": "1 Main St"
            }),
            Some(&fx.token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let response = fx
        .app
        .delete(&format!("/api/dispatch/orders/{}", with_job.id), Some(&fx.token))
        .await?;
    assert_eq!(
        expect_error(response, StatusCode::BAD_REQUEST).await?,
        "Cannot delete a dispatch order that has installation jobs"
    );

    let plain = create_order(&fx, 1.0).await?;
    let response = fx
        .app
        .delete(&format!("/api/dispatch/orders/{}", plain.id), Some(&fx.token))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = fx
        .app
        .get(&format!("/api/dispatch/orders/{}", plain.id), Some(&fx.token))
        .await?;
    expect_error(response, StatusCode::NOT_FOUND).await?;

    fx.app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn orders_of_another_organization_are_not_found() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let (_, _, rival) = fx.app.admin_session("Rival").await?;

    let order = create_order(&fx, 2.0).await?;
    let item_id = order.items.expect("items")[0].id;
    let path = format!("/api/dispatch/orders/{}", order.id);

    let response = fx.app.get(&path, Some(&rival)).await?;
    assert_eq!(
        expect_error(response, StatusCode::NOT_FOUND).await?,
        "Dispatch order not found"
    );
    let response = fx
        .app
        .put_json(&path, &json!({ "status": "in_transit" }), Some(&rival))
        .await?;
    assert_eq!(
        expect_error(response, StatusCode::NOT_FOUND).await?,
        "Dispatch order not found"
    );
    let response = fx
        .app
        .put_json(
            &format!("{path}/items/{item_id}"),
            &json!({ "quantity": 9.0 }),
            Some(&rival),
        )
        .await?;
    assert_eq!(
        expect_error(response, StatusCode::NOT_FOUND).await?,
        "Dispatch order not found"
    );
    let response = fx.app.delete(&path, Some(&rival)).await?;
    assert_eq!(
        expect_error(response, StatusCode::NOT_FOUND).await?,
        "Dispatch order not found"
    );

    let response = fx.app.get("/api/dispatch/orders", Some(&rival)).await?;
    let listed: Vec<Order> = read_json(response).await?;
    assert!(listed.is_empty());

    // Someone else's customer cannot be shipped to either.
    let response = fx
        .app
        .post_json(
            "/api/dispatch/orders",
            &json!({
                "customer_id": fx.customer,
                "delivery_address": "2 Side St",
                "items": [{ "product_id": fx.product, "quantity": 1.0, "unit": "pcs" }]
            }),
            Some(&rival),
        )
        .await?;
    assert_eq!(
        expect_error(response, StatusCode::NOT_FOUND).await?,
        "Customer not found"
    );

    // The owner still sees the order untouched.
    let response = fx.app.get(&path, Some(&fx.token)).await?;
    let unchanged: Order = read_json(response).await?;
    assert_eq!(unchanged.status, "pending");
    let items = unchanged.items.expect("items");
    assert_eq!(items[0].quantity, 2.0);

    fx.app.cleanup().await?;
    Ok(())
}
