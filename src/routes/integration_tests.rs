//! End-to-end flows against a real Postgres. Run with `cargo test -- --ignored`
//! and DATABASE_URL pointing at a server sqlx can create test databases on.

use axum::body::Body;
use axum::Router;
use http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;
use super::build_app;
use crate::auth::jwt::sign_token;
use crate::auth::roles::Role;
use crate::config::Config;
use crate::state::AppState;

const SECRET: &str = "integration-secret";

struct TestApp {
    app: Router,
    pool: PgPool,
    token: String,
}

impl TestApp {
    async fn new(pool: PgPool) -> Self {
        let user_id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, password_hash, role) VALUES ('owner', 'x', 'admin') RETURNING id",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://unused".to_string()),
            "JWT_SECRET" => Some(SECRET.to_string()),
            _ => None,
        })
        .unwrap();

        Self {
            app: build_app(AppState::new(pool.clone(), config)),
            token: sign_token(user_id, Role::Admin, "owner", SECRET).unwrap(),
            pool,
        }
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call_as(&self.token, method, uri, body).await
    }

    async fn call_as(&self, token: &str, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        let request = match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }

    async fn product(&self, sku: &str, price: f64, stock: i32) -> i64 {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/products",
                Some(json!({ "name": format!("Item {sku}"), "sku": sku, "salePrice": price, "stock": stock, "size": "M" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_i64().unwrap()
    }

    /// Inserts an active user and returns its id plus a token minted for it.
    async fn user(&self, username: &str, role: Role) -> (i64, String) {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, password_hash, role) VALUES ($1, 'x', $2) RETURNING id",
        )
        .bind(username)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .unwrap();
        (id, sign_token(id, role, username, SECRET).unwrap())
    }

    async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    async fn stock(&self, id: i64) -> i32 {
        sqlx::query_scalar("SELECT stock_cached FROM products WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn sale_takes_units_out_of_stock(pool: PgPool) {
    let t = TestApp::new(pool).await;
    let id = t.product("BL-01", 150.0, 5).await;

    let (status, body) = t
        .call(Method::POST, "/api/sales", Some(json!({ "items": [{ "productId": id, "quantity": 2 }] })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["folio"], body["sale"]["id"]);
    assert_eq!(t.stock(id).await, 3);

    let movement: i32 = sqlx::query_scalar(
        "SELECT quantity FROM stock_movements WHERE product_id = $1 AND movement_type = 'sale_out'",
    )
    .bind(id)
    .fetch_one(&t.pool)
    .await
    .unwrap();
    assert_eq!(movement, -2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn insufficient_stock_rolls_back_the_whole_sale(pool: PgPool) {
    let t = TestApp::new(pool).await;
    let plenty = t.product("FA-01", 80.0, 10).await;
    let scarce = t.product("FA-02", 90.0, 1).await;

    let (status, body) = t
        .call(
            Method::POST,
            "/api/sales",
            Some(json!({ "items": [
                { "productId": plenty, "quantity": 4 },
                { "productId": scarce, "quantity": 2 }
            ] })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");

    assert_eq!(t.stock(plenty).await, 10);
    assert_eq!(t.stock(scarce).await, 1);
    assert_eq!(t.count("sales").await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn receipt_example_is_persisted(pool: PgPool) {
    let t = TestApp::new(pool).await;
    let blouse = t.product("RC-01", 150.0, 3).await;
    let skirt = t.product("RC-02", 120.0, 3).await;

    let (status, body) = t
        .call(
            Method::POST,
            "/api/sales",
            Some(json!({
                "items": [
                    { "productId": blouse, "quantity": 1, "price": 150.0, "discount": 0 },
                    { "productId": skirt, "quantity": 1, "price": 120.0, "discount": 0 }
                ],
                "taxIncluded": true,
                "taxRate": 0.19
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (subtotal, tax, total): (i64, i64, i64) =
        sqlx::query_as("SELECT subtotal, tax_amount, total FROM sales WHERE id = $1")
            .bind(body["folio"].as_i64().unwrap())
            .fetch_one(&t.pool)
            .await
            .unwrap();
    assert_eq!((subtotal, tax, total), (22_689, 4_311, 27_000));
    assert_eq!(body["sale"]["taxAmount"], 43.11);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn delete_removes_fresh_products_and_deactivates_sold_ones(pool: PgPool) {
    let t = TestApp::new(pool).await;
    let fresh = t.product("DL-01", 50.0, 2).await;
    let sold = t.product("DL-02", 60.0, 2).await;

    let (_, check) = t.call(Method::GET, &format!("/api/products/{fresh}/deletability"), None).await;
    assert_eq!(check["canBeDeleted"], true);

    let (status, body) = t.call(Method::DELETE, &format!("/api/products/{fresh}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "deleted");
    let (status, _) = t.call(Method::GET, &format!("/api/products/{fresh}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    t.call(Method::POST, "/api/sales", Some(json!({ "items": [{ "productId": sold, "quantity": 1 }] })))
        .await;
    let (_, check) = t.call(Method::GET, &format!("/api/products/{sold}/deletability"), None).await;
    assert_eq!(check["canBeDeleted"], false);
    assert_eq!(check["details"]["sales"], 1);

    let (_, before) = t.call(Method::GET, &format!("/api/products/{sold}"), None).await;
    let (status, body) = t.call(Method::DELETE, &format!("/api/products/{sold}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "deactivated");

    let (_, after) = t.call(Method::GET, &format!("/api/products/{sold}"), None).await;
    assert_eq!(after["isActive"], false);
    for field in ["name", "sku", "size", "salePrice", "stockCached", "stockMin"] {
        assert_eq!(before[field], after[field], "{field} changed on deactivate");
    }

    let (_, listed) = t.call(Method::GET, "/api/products", None).await;
    assert!(listed.as_array().unwrap().iter().all(|p| p["id"] != sold));
    let (_, listed) = t.call(Method::GET, "/api/products?includeInactive=true", None).await;
    assert!(listed.as_array().unwrap().iter().any(|p| p["id"] == sold));

    let (status, body) = t.call(Method::PATCH, &format!("/api/products/{sold}/reactivate"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isActive"], true);
    assert_eq!(body["sku"], before["sku"]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn purchase_adds_stock_and_blocks_deletion(pool: PgPool) {
    let t = TestApp::new(pool).await;
    let id = t.product("PU-01", 99.0, 0).await;

    let (status, body) = t
        .call(
            Method::POST,
            "/api/purchases",
            Some(json!({ "notes": "Spring order", "items": [{ "productId": id, "quantity": 6, "unitCost": 40.5 }] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["totalCost"], 243.0);
    assert_eq!(t.stock(id).await, 6);

    let (_, check) = t.call(Method::GET, &format!("/api/products/{id}/deletability"), None).await;
    assert_eq!(check["details"]["purchases"], 1);
    assert_eq!(check["canBeDeleted"], false);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn repeated_lines_of_one_product_share_its_stock(pool: PgPool) {
    let t = TestApp::new(pool).await;
    let id = t.product("RP-01", 70.0, 2).await;

    let two_lines = json!({ "items": [
        { "productId": id, "quantity": 1 },
        { "productId": id, "quantity": 1 }
    ] });
    let (status, body) = t.call(Method::POST, "/api/sales", Some(two_lines)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(t.stock(id).await, 0);

    let last = t.product("RP-02", 70.0, 1).await;
    let (status, _) = t
        .call(
            Method::POST,
            "/api/sales",
            Some(json!({ "items": [
                { "productId": last, "quantity": 1 },
                { "productId": last, "quantity": 1 }
            ] })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(t.stock(last).await, 1);
    assert_eq!(t.count("sales").await, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn invalid_carts_are_rejected_before_any_write(pool: PgPool) {
    let t = TestApp::new(pool).await;
    let id = t.product("IC-01", 40.0, 3).await;

    let (status, body) = t.call(Method::POST, "/api/sales", Some(json!({ "items": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let (status, _) = t
        .call(Method::POST, "/api/sales", Some(json!({ "items": [{ "productId": id, "quantity": 0 }] })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(t.count("sales").await, 0);
    assert_eq!(t.stock(id).await, 3);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn cashier_cannot_manage_products_or_users(pool: PgPool) {
    let t = TestApp::new(pool).await;
    let (_, cashier) = t.user("caja1", Role::Cashier).await;

    let (status, body) = t
        .call_as(&cashier, Method::POST, "/api/products", Some(json!({ "name": "X", "sku": "X-1", "salePrice": 1.0 })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, _) = t.call_as(&cashier, Method::GET, "/api/users", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.call_as(&cashier, Method::GET, "/api/products", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn deactivated_user_token_stops_working(pool: PgPool) {
    let t = TestApp::new(pool).await;
    let (id, token) = t.user("temporal", Role::Cashier).await;

    let (status, _) = t.call_as(&token, Method::GET, "/api/auth/me", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.call(Method::PATCH, &format!("/api/users/{id}"), Some(json!({ "isActive": false }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = t.call_as(&token, Method::GET, "/api/sales", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn demoted_admin_loses_admin_routes(pool: PgPool) {
    let t = TestApp::new(pool).await;
    let (id, token) = t.user("ex-admin", Role::Admin).await;

    let (status, _) = t.call_as(&token, Method::GET, "/api/users", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.call(Method::PATCH, &format!("/api/users/{id}"), Some(json!({ "role": "cashier" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.call_as(&token, Method::GET, "/api/users", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, me) = t.call_as(&token, Method::GET, "/api/auth/me", None).await;
    assert_eq!(me["role"], "cashier");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn purchase_with_unknown_product_changes_nothing(pool: PgPool) {
    let t = TestApp::new(pool).await;
    let id = t.product("PX-01", 30.0, 4).await;

    let (status, _) = t
        .call(
            Method::POST,
            "/api/purchases",
            Some(json!({ "items": [
                { "productId": id, "quantity": 5, "unitCost": 10.0 },
                { "productId": id + 1000, "quantity": 1, "unitCost": 10.0 }
            ] })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(t.stock(id).await, 4);
    assert_eq!(t.count("purchases").await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn adjustment_corrects_stock_and_records_reason(pool: PgPool) {
    let t = TestApp::new(pool).await;
    let id = t.product("AJ-01", 55.0, 3).await;
    let uri = format!("/api/products/{id}/adjustments");

    let (status, body) = t.call(Method::POST, &uri, Some(json!({ "quantity": -2, "notes": "Conteo fisico" }))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["stockCached"], 1);

    let (status, _) = t.call(Method::POST, &uri, Some(json!({ "quantity": -2, "notes": "Otra merma" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(t.stock(id).await, 1);

    let (status, _) = t.call(Method::POST, &uri, Some(json!({ "quantity": 1, "notes": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, movements) = t.call(Method::GET, &format!("/api/products/{id}/movements"), None).await;
    let movements = movements.as_array().unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0]["movementType"], "adjustment");
    assert_eq!(movements[0]["quantity"], -2);
    assert_eq!(movements[0]["notes"], "Conteo fisico");

    let (_, log) = t.call(Method::GET, "/api/activity?action=ADJUST_STOCK", None).await;
    assert_eq!(log.as_array().unwrap().len(), 1);

    let (status, _) = t.call(Method::POST, "/api/products/999999/adjustments", Some(json!({ "quantity": 1, "notes": "x" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn update_with_null_clears_optional_fields(pool: PgPool) {
    let t = TestApp::new(pool).await;
    let id = t.product("NL-01", 20.0, 1).await;
    let (_, brand) = t.call(Method::POST, "/api/catalog/brands", Some(json!({ "name": "Lunar" }))).await;
    let uri = format!("/api/products/{id}");

    let (status, body) = t
        .call(Method::PUT, &uri, Some(json!({ "brandId": brand["id"], "description": "Lino" })))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["brandName"], "Lunar");

    let (_, body) = t.call(Method::PUT, &uri, Some(json!({ "salePrice": 25.0 }))).await;
    assert_eq!(body["description"], "Lino");
    assert_eq!(body["size"], "M");

    let (_, body) = t.call(Method::PUT, &uri, Some(json!({ "brandId": null, "description": null }))).await;
    assert_eq!(body["brandId"], Value::Null);
    assert_eq!(body["description"], Value::Null);
    assert_eq!(body["size"], "M");
    assert_eq!(body["salePrice"], 25.0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn unparseable_tax_setting_is_refused(pool: PgPool) {
    let t = TestApp::new(pool).await;

    let (status, body) = t.call(Method::PUT, "/api/config/tax.rate", Some(json!({ "value": "diecinueve" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let (status, _) = t
        .call(Method::POST, "/api/config", Some(json!([{ "key": "tax.included", "value": "quizas" }])))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t.call(Method::PUT, "/api/config/tax.rate", Some(json!({ "value": "0.16" }))).await;
    assert_eq!(status, StatusCode::OK);
}
