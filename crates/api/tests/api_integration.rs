//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::cookies::SessionCookies;
use api::state::AppState;
use auth::TokenService;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use common::UserId;
use domain::{InMemoryEventPublisher, Marketplace, OrderEventKind};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{InMemoryStore, UserStore};
use tower::ServiceExt;

const PRIVATE_KEY: &[u8] = include_bytes!("../../auth/tests/fixtures/jwt-private.pem");
const PUBLIC_KEY: &[u8] = include_bytes!("../../auth/tests/fixtures/jwt-public.pem");

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    router: Router,
    store: InMemoryStore,
    events: InMemoryEventPublisher,
}

fn setup() -> TestApp {
    let store = InMemoryStore::new();
    let events = InMemoryEventPublisher::new();
    let tokens = Arc::new(TokenService::from_pem(PRIVATE_KEY, PUBLIC_KEY).unwrap());
    let market = Marketplace::new(store.clone(), tokens, Arc::new(events.clone()));
    let state = Arc::new(AppState::new(market, SessionCookies::new(false)));

    TestApp {
        router: api::create_app(state, get_metrics_handle()),
        store,
        events,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    async fn signup(&self, phone: &str) -> Response<Body> {
        self.call(
            "POST",
            "/api/auth/signup",
            None,
            Some(json!({
                "phone": phone,
                "password": "secret1",
                "full_name": "Test User",
            })),
        )
        .await
    }

    /// Registers and logs in, returning the session cookie header and user id.
    async fn user(&self, phone: &str) -> (String, i64) {
        let response = self.signup(phone).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["id"].as_i64().unwrap();

        let response = self
            .call(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "username": phone, "password": "secret1" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        (cookie_header(&response), id)
    }

    async fn product(&self, cookie: &str, stock: i32, price_cents: i64) -> i64 {
        let response = self
            .call(
                "POST",
                "/api/products",
                Some(cookie),
                Some(json!({
                    "title": "Lamp",
                    "description": "Desk lamp",
                    "price_cents": price_cents,
                    "category": "Home",
                    "stock": stock,
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_i64().unwrap()
    }

    async fn stock(&self, cookie: &str, product_id: i64) -> i64 {
        let response = self
            .call("GET", &format!("/api/products/{product_id}"), Some(cookie), None)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await["stock"].as_i64().unwrap()
    }
}

async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Turns `Set-Cookie` headers into a `Cookie` request header.
fn cookie_header(response: &Response<Body>) -> String {
    set_cookies(response)
        .iter()
        .filter_map(|c| c.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

fn only_cookie(header: &str, name: &str) -> String {
    header
        .split("; ")
        .find(|c| c.starts_with(&format!("{name}=")))
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let response = app.call("GET", "/health", None, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_metrics_is_public() {
    let app = setup();

    let response = app.call("GET", "/metrics", None, None).await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_marketplace_order_flow() {
    let app = setup();
    let (seller, _) = app.user("+1111111111").await;
    let product_id = app.product(&seller, 10, 2_500).await;
    let (buyer, buyer_id) = app.user("+2222222222").await;

    // Buyer orders three
    let response = app
        .call(
            "POST",
            "/api/orders",
            Some(&buyer),
            Some(json!({ "product_id": product_id, "quantity": 3, "message": "Before 6pm" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = body_json(response).await;
    let order_id = order["id"].as_i64().unwrap();
    assert_eq!(order["status"], "pending");
    assert_eq!(order["total_price_cents"], 7_500);
    assert_eq!(order["buyer_id"], buyer_id);
    assert_eq!(app.stock(&seller, product_id).await, 7);

    // Seller confirms
    let response = app
        .call(
            "PATCH",
            &format!("/api/orders/{order_id}/status"),
            Some(&seller),
            Some(json!({ "new_status": "confirmed" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "confirmed");

    let kinds: Vec<_> = app.events.events().iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![OrderEventKind::OrderCreated, OrderEventKind::OrderStatusChanged]
    );

    // Buyer deletes the confirmed order and the stock comes back
    let response = app
        .call("DELETE", &format!("/api/orders/{order_id}"), Some(&buyer), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.stock(&seller, product_id).await, 10);

    let response = app
        .call("GET", &format!("/api/orders/{order_id}"), Some(&buyer), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_phone_is_rejected() {
    let app = setup();
    assert_eq!(app.signup("+1111111111").await.status(), StatusCode::CREATED);

    let response = app.signup("+1111111111").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Bad Request");
    assert_eq!(json["message"], "Phone already registered");

    let users = body_json(app.call("GET", "/api/users/all", None, None).await).await;
    assert_eq!(users.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_short_password_is_rejected() {
    let app = setup();

    let response = app
        .call(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "phone": "+1", "password": "123", "full_name": "Short" })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(
        body_json(response).await["message"]
            .as_str()
            .unwrap()
            .contains("at least 6")
    );
}

#[tokio::test]
async fn test_login_sets_session_cookies() {
    let app = setup();
    app.signup("+1111111111").await;

    let response = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": "+1111111111", "password": "secret1" })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    for cookie in &cookies {
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
    }
    let json = body_json(response).await;
    assert_eq!(json["token_type"], "bearer");
    assert!(json["access_token"].as_str().is_some());
    assert!(json["refresh_token"].as_str().is_some());
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let app = setup();
    app.signup("+1111111111").await;

    let response = app
        .call(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "username": "+1111111111", "password": "wrong-one" })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_accepts_form_body() {
    let app = setup();
    app.signup("+1111111111").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("username=%2B1111111111&password=secret1"))
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(set_cookies(&response).len(), 2);
    assert_eq!(body_json(response).await["token_type"], "bearer");
}

#[tokio::test]
async fn test_malformed_inputs_get_bad_request_body() {
    let app = setup();
    let (session, _) = app.user("+1111111111").await;
    let product_id = app.product(&session, 5, 1_000).await;

    let cases = [
        (
            "PATCH",
            "/api/orders/1/status".to_string(),
            Some(json!({ "new_status": "shipped" })),
        ),
        (
            "PATCH",
            format!("/api/products/{product_id}/status"),
            Some(json!({ "new_status": "archived" })),
        ),
        ("GET", "/api/orders/abc".to_string(), None),
        ("GET", "/api/products/abc".to_string(), None),
        ("GET", "/api/orders?limit=abc".to_string(), None),
        ("GET", "/api/products?status=bogus".to_string(), None),
    ];

    for (method, uri, body) in cases {
        let response = app.call(method, &uri, Some(&session), body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{method} {uri}");
        let json = body_json(response).await;
        assert_eq!(json["error"], "Bad Request", "{method} {uri}");
        assert!(json["message"].as_str().is_some(), "{method} {uri}");
    }
}

#[tokio::test]
async fn test_protected_route_requires_session() {
    let app = setup();

    let response = app.call("GET", "/api/orders", None, None).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_json(response).await["error"].as_str().is_some());
}

#[tokio::test]
async fn test_garbage_access_token_without_refresh_is_unauthorized() {
    let app = setup();

    let response = app
        .call("GET", "/api/users/me/get", Some("access_token=garbage"), None)
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bearer_header_authenticates() {
    let app = setup();
    let (session, id) = app.user("+1111111111").await;
    let access = only_cookie(&session, "access_token");
    let token = access.trim_start_matches("access_token=");

    let response = app
        .send(
            Request::builder()
                .uri("/api/users/me/get")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], id);
}

#[tokio::test]
async fn test_refresh_cookie_silently_renews_session() {
    let app = setup();
    let (session, id) = app.user("+1111111111").await;
    let refresh = only_cookie(&session, "refresh_token");

    let response = app
        .call("GET", "/api/users/me/get", Some(&refresh), None)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with("access_token=")));
    assert!(cookies.iter().any(|c| c.starts_with("refresh_token=")));
    assert_eq!(body_json(response).await["id"], id);
}

#[tokio::test]
async fn test_refresh_for_deleted_user_is_forbidden() {
    let app = setup();
    let (session, id) = app.user("+1111111111").await;
    app.store.delete_user(UserId::new(id)).await.unwrap();
    let refresh = only_cookie(&session, "refresh_token");

    let response = app
        .call("GET", "/api/users/me/get", Some(&refresh), None)
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_delete_with_refresh_only_session_stays_logged_out() {
    let app = setup();
    let (session, _) = app.user("+1111111111").await;
    let refresh = only_cookie(&session, "refresh_token");

    let response = app
        .call("DELETE", "/api/users/me/delete", Some(&refresh), None)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    assert!(cookies.iter().all(|c| !c.contains("eyJ")));
}

#[tokio::test]
async fn test_refresh_token_in_access_slot_is_rejected() {
    let app = setup();
    let (session, _) = app.user("+1111111111").await;
    let refresh = only_cookie(&session, "refresh_token");
    let token = refresh.trim_start_matches("refresh_token=");

    let response = app
        .call(
            "GET",
            "/api/users/me/get",
            Some(&format!("access_token={token}")),
            None,
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_clears_cookies() {
    let app = setup();
    let (session, _) = app.user("+1111111111").await;

    let response = app
        .call("POST", "/api/auth/logout", Some(&session), None)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
}

#[tokio::test]
async fn test_order_rejections() {
    let app = setup();
    let (seller, _) = app.user("+1111111111").await;
    let product_id = app.product(&seller, 2, 1_000).await;
    let (buyer, _) = app.user("+2222222222").await;

    let too_many = app
        .call(
            "POST",
            "/api/orders",
            Some(&buyer),
            Some(json!({ "product_id": product_id, "quantity": 3 })),
        )
        .await;
    assert_eq!(too_many.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stock(&seller, product_id).await, 2);

    let missing = app
        .call(
            "POST",
            "/api/orders",
            Some(&buyer),
            Some(json!({ "product_id": 9_999, "quantity": 1 })),
        )
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let zero = app
        .call(
            "POST",
            "/api/orders",
            Some(&buyer),
            Some(json!({ "product_id": product_id, "quantity": 0 })),
        )
        .await;
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);
    assert!(app.events.events().is_empty());
}

#[tokio::test]
async fn test_order_permissions_and_transitions() {
    let app = setup();
    let (seller, _) = app.user("+1111111111").await;
    let product_id = app.product(&seller, 5, 1_000).await;
    let (buyer, _) = app.user("+2222222222").await;
    let (stranger, _) = app.user("+3333333333").await;

    let order = body_json(
        app.call(
            "POST",
            "/api/orders",
            Some(&buyer),
            Some(json!({ "product_id": product_id, "quantity": 1 })),
        )
        .await,
    )
    .await;
    let status_uri = format!("/api/orders/{}/status", order["id"]);
    let order_uri = format!("/api/orders/{}", order["id"]);

    for cookie in [&buyer, &stranger] {
        let response = app
            .call(
                "PATCH",
                &status_uri,
                Some(cookie),
                Some(json!({ "new_status": "confirmed" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    let response = app.call("GET", &order_uri, Some(&stranger), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app.call("DELETE", &order_uri, Some(&seller), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .call(
            "PATCH",
            &status_uri,
            Some(&seller),
            Some(json!({ "new_status": "completed" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .call(
            "PUT",
            &order_uri,
            Some(&buyer),
            Some(json!({ "quantity": 4, "message": "Four please" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["quantity"], 4);
    assert_eq!(updated["total_price_cents"], 4_000);
    assert_eq!(app.stock(&seller, product_id).await, 1);

    let response = app
        .call(
            "PATCH",
            &status_uri,
            Some(&seller),
            Some(json!({ "new_status": "cancelled" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.stock(&seller, product_id).await, 5);
}

#[tokio::test]
async fn test_order_listings() {
    let app = setup();
    let (seller, _) = app.user("+1111111111").await;
    let product_id = app.product(&seller, 10, 500).await;
    let (buyer, _) = app.user("+2222222222").await;

    for _ in 0..3 {
        app.call(
            "POST",
            "/api/orders",
            Some(&buyer),
            Some(json!({ "product_id": product_id, "quantity": 1 })),
        )
        .await;
    }

    let mine = body_json(app.call("GET", "/api/orders?limit=2", Some(&buyer), None).await).await;
    assert_eq!(mine.as_array().unwrap().len(), 2);

    let pending = body_json(
        app.call("GET", "/api/orders/status/pending", Some(&buyer), None)
            .await,
    )
    .await;
    assert_eq!(pending.as_array().unwrap().len(), 3);

    let bogus = app
        .call("GET", "/api/orders/status/shipped", Some(&buyer), None)
        .await;
    assert_eq!(bogus.status(), StatusCode::BAD_REQUEST);

    let incoming = body_json(app.call("GET", "/api/orders/seller", Some(&seller), None).await).await;
    assert_eq!(incoming.as_array().unwrap().len(), 3);

    let product_uri = format!("/api/orders/product/{product_id}");
    let response = app.call("GET", &product_uri, Some(&buyer), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app.call("GET", &product_uri, Some(&seller), None).await;
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_product_owner_rules() {
    let app = setup();
    let (seller, _) = app.user("+1111111111").await;
    let (other, _) = app.user("+2222222222").await;
    let product_id = app.product(&seller, 1, 100).await;
    let uri = format!("/api/products/{product_id}");

    let response = app
        .call("PUT", &uri, Some(&other), Some(json!({ "title": "Mine now" })))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .call(
            "PATCH",
            &format!("{uri}/status"),
            Some(&seller),
            Some(json!({ "new_status": "inactive" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "inactive");

    let response = app.call("PUT", &uri, Some(&seller), Some(json!({}))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.call("DELETE", &uri, Some(&other), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app.call("DELETE", &uri, Some(&seller), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app.call("GET", &uri, Some(&seller), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_profile_update_and_delete() {
    let app = setup();
    let (session, _) = app.user("+1111111111").await;
    app.signup("+2222222222").await;

    let response = app
        .call("PATCH", "/api/users/me/update", Some(&session), Some(json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .call(
            "PATCH",
            "/api/users/me/update",
            Some(&session),
            Some(json!({ "phone": "+2222222222" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .call(
            "PATCH",
            "/api/users/me/update",
            Some(&session),
            Some(json!({ "about": "Collector" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["about"], "Collector");

    let response = app
        .call("DELETE", "/api/users/me/delete", Some(&session), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).iter().all(|c| c.contains("Max-Age=0")));

    let users = body_json(app.call("GET", "/api/users/all", None, None).await).await;
    assert_eq!(users.as_array().unwrap().len(), 1);
}
