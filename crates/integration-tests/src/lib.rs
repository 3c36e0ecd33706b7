//! Integration tests for the Ink Cartridges clients.
//!
//! [`MockBackend`] serves the REST API and the auth provider endpoints on an
//! ephemeral local port. Switches on it reproduce the situations the clients
//! must cope with: expired access tokens, rejected refresh tokens, rate
//! limiting, stock errors and unverified email addresses.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p inkcartridges-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `api_client` - envelope decoding, refresh-and-retry, rate limits
//! - `cart_sync` - guest cart, business errors, sign-in migration
//! - `admin` - admin endpoints and exports

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use inkcartridges_storefront::Storefront;
use inkcartridges_storefront::config::StorefrontConfig;
use inkcartridges_storefront::notify::{Notifier, ToastLog};
use inkcartridges_storefront::state::StorefrontError;
use inkcartridges_storefront::storage::{MemoryStorage, Storage};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

/// Account the mock auth provider accepts.
pub const TEST_EMAIL: &str = "shopper@example.co.nz";
pub const TEST_PASSWORD: &str = "correct-horse-battery";
pub const TEST_USER_ID: &str = "user-1";

/// Password for [`TEST_EMAIL`].
#[must_use]
pub fn test_password() -> SecretString {
    SecretString::from(TEST_PASSWORD)
}

/// A product the mock backend sells.
#[derive(Debug, Clone)]
pub struct MockProduct {
    pub id: &'static str,
    pub sku: &'static str,
    pub name: &'static str,
    pub price: Decimal,
    pub stock: u32,
}

fn catalog() -> Vec<MockProduct> {
    vec![
        MockProduct {
            id: "ink-black",
            sku: "HP65-BK",
            name: "HP 65 Black",
            price: Decimal::new(2500, 2),
            stock: 20,
        },
        MockProduct {
            id: "ink-cyan",
            sku: "HP65-C",
            name: "HP 65 Cyan",
            price: Decimal::new(1999, 2),
            stock: 3,
        },
        MockProduct {
            id: "toner",
            sku: "BR-TN2450",
            name: "Brother TN-2450 Toner",
            price: Decimal::new(9500, 2),
            stock: 8,
        },
    ]
}

/// A request as seen by the mock backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
}

type Lines = Vec<(String, u32)>;

#[derive(Debug, Default)]
struct MockState {
    products: Vec<MockProduct>,
    /// One anonymous guest cart; the real backend keys these by cookie.
    guest_cart: Lines,
    user_carts: HashMap<String, Lines>,
    /// Access token -> user id.
    access_tokens: HashMap<String, String>,
    /// Refresh token -> user id. Each refresh token is single-use.
    refresh_tokens: HashMap<String, String>,
    issued: u32,
    refresh_grants: u32,
    merges: u32,
    requests: Vec<RecordedRequest>,
    rate_limited: u32,
    retry_after: u64,
    reject_tokens: bool,
    email_unverified: bool,
}

enum Caller {
    Guest,
    User(String),
}

impl MockState {
    fn product(&self, id: &str) -> Option<&MockProduct> {
        self.products.iter().find(|p| p.id == id)
    }

    fn lines(&mut self, caller: &Caller) -> &mut Lines {
        match caller {
            Caller::Guest => &mut self.guest_cart,
            Caller::User(user) => self.user_carts.entry(user.clone()).or_default(),
        }
    }

    fn identify(&self, headers: &HeaderMap) -> Result<Caller, Response> {
        let Some(token) = bearer(headers) else {
            return Ok(Caller::Guest);
        };
        match self.access_tokens.get(&token) {
            Some(user) if !self.reject_tokens => Ok(Caller::User(user.clone())),
            _ => Err(fail(
                StatusCode::UNAUTHORIZED,
                "Invalid or expired token",
                None,
            )),
        }
    }

    fn cart_json(&self, lines: &[(String, u32)]) -> Value {
        let mut subtotal = Decimal::ZERO;
        let items: Vec<Value> = lines
            .iter()
            .filter_map(|(id, quantity)| {
                let product = self.product(id)?;
                subtotal += product.price * Decimal::from(*quantity);
                Some(json!({
                    "product_id": product.id,
                    "name": product.name,
                    "unit_price": product.price.to_string(),
                    "quantity": quantity,
                    "sku": product.sku,
                    "in_stock": product.stock > 0,
                    "stock_quantity": product.stock,
                }))
            })
            .collect();
        if items.is_empty() {
            return json!({ "items": [] });
        }

        let shipping = if subtotal >= Decimal::ONE_HUNDRED {
            Decimal::ZERO
        } else {
            Decimal::new(599, 2)
        };
        json!({
            "items": items,
            "summary": {
                "subtotal": subtotal.to_string(),
                "shipping": shipping.to_string(),
                "discount": "0",
                "total": (subtotal + shipping).to_string(),
            },
        })
    }

    fn issue_tokens(&mut self, user: &str) -> Value {
        self.issued += 1;
        let access = format!("access-{}", self.issued);
        let refresh = format!("refresh-{}", self.issued);
        self.access_tokens.insert(access.clone(), user.to_string());
        self.refresh_tokens.insert(refresh.clone(), user.to_string());
        json!({
            "access_token": access,
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": refresh,
            "user": {
                "id": user,
                "email": TEST_EMAIL,
                "email_confirmed_at": "2026-01-05T10:00:00Z",
            },
        })
    }
}

type Shared = Arc<Mutex<MockState>>;

fn lock(state: &Shared) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// MockBackend
// =============================================================================

/// Backend and auth provider on `127.0.0.1:<ephemeral>`. Stops on drop.
pub struct MockBackend {
    state: Shared,
    base_url: Url,
    server: JoinHandle<()>,
}

impl MockBackend {
    /// Bind and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if no local port can be bound.
    pub async fn start() -> std::io::Result<Self> {
        let state: Shared = Arc::new(Mutex::new(MockState {
            products: catalog(),
            retry_after: 1,
            ..MockState::default()
        }));

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;
        let app = router(Arc::clone(&state));
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Mock backend stopped");
            }
        });
        let base_url = Url::parse(&format!("http://{addr}/")).map_err(std::io::Error::other)?;

        Ok(Self {
            state,
            base_url,
            server,
        })
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Storefront configuration using this backend for both API and auth.
    #[must_use]
    pub fn config(&self) -> StorefrontConfig {
        StorefrontConfig::for_backend(self.base_url.clone(), self.base_url.clone())
    }

    /// A storefront over in-memory storage that records its toasts.
    ///
    /// # Errors
    ///
    /// Returns an error if the storefront cannot be built.
    pub fn storefront(&self) -> Result<TestStorefront, StorefrontError> {
        let storage = Arc::new(MemoryStorage::new());
        let toasts = Arc::new(ToastLog::new());
        let notifier: Arc<dyn Notifier> = toasts.clone();
        let shared: Arc<dyn Storage> = storage.clone();
        let storefront = Storefront::new(self.config(), shared, Some(notifier), None)?;
        Ok(TestStorefront {
            storefront,
            storage,
            toasts,
        })
    }

    /// Forget every issued access token; refresh tokens stay valid.
    pub fn expire_access_tokens(&self) {
        lock(&self.state).access_tokens.clear();
    }

    /// Answer 401 to every bearer token, even freshly issued ones.
    pub fn reject_all_tokens(&self) {
        lock(&self.state).reject_tokens = true;
    }

    /// Make every refresh grant fail.
    pub fn revoke_refresh_tokens(&self) {
        lock(&self.state).refresh_tokens.clear();
    }

    /// Answer the next `count` product listings with 429.
    pub fn rate_limit_products(&self, count: u32, retry_after: u64) {
        let mut state = lock(&self.state);
        state.rate_limited = count;
        state.retry_after = retry_after;
    }

    /// Fail account sync with `EMAIL_NOT_VERIFIED`.
    pub fn require_email_verification(&self) {
        lock(&self.state).email_unverified = true;
    }

    #[must_use]
    pub fn refresh_grants(&self) -> u32 {
        lock(&self.state).refresh_grants
    }

    #[must_use]
    pub fn merges(&self) -> u32 {
        lock(&self.state).merges
    }

    /// Requests received for `method` and `path`, in order.
    #[must_use]
    pub fn requests_to(&self, method: &Method, path: &str) -> Vec<RecordedRequest> {
        lock(&self.state)
            .requests
            .iter()
            .filter(|r| r.method == *method && r.path == path)
            .cloned()
            .collect()
    }

    /// Server-side lines of a signed-in user's cart.
    #[must_use]
    pub fn user_cart(&self, user: &str) -> Vec<(String, u32)> {
        lock(&self.state)
            .user_carts
            .get(user)
            .cloned()
            .unwrap_or_default()
    }

    /// Server-side lines of the guest cart.
    #[must_use]
    pub fn guest_cart(&self) -> Vec<(String, u32)> {
        lock(&self.state).guest_cart.clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Storefront wired to a [`MockBackend`], with its storage and toasts exposed.
pub struct TestStorefront {
    pub storefront: Storefront,
    pub storage: Arc<MemoryStorage>,
    pub toasts: Arc<ToastLog>,
}

// =============================================================================
// Routes
// =============================================================================

fn router(state: Shared) -> Router {
    Router::new()
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/logout", post(logout))
        .route("/api/cart", get(fetch_cart).delete(clear_cart))
        .route("/api/cart/items", post(add_item))
        .route("/api/cart/items/{id}", put(update_item).delete(remove_item))
        .route("/api/cart/merge", post(merge_cart))
        .route("/api/cart/validate", post(validate_cart))
        .route("/api/account/sync", post(sync_account))
        .route("/api/user/favourites", get(favourites))
        .route("/api/user/favourites/sync", post(favourites))
        .route("/api/products", get(list_products))
        .route("/api/products/{sku}", get(product_by_sku))
        .route("/api/admin/orders", get(admin_orders))
        .route("/api/admin/orders/{id}/status", put(admin_order_status))
        .route("/api/admin/products", get(admin_products))
        .route("/api/admin/customers", get(admin_customers))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), record))
        .with_state(state)
}

async fn record(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let entry = RecordedRequest {
        method: request.method().clone(),
        path: request.uri().path().to_string(),
        bearer: bearer(request.headers()),
    };
    lock(&state).requests.push(entry);
    next.run(request).await
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn ok(data: Value) -> Response {
    Json(json!({ "success": true, "data": data })).into_response()
}

fn fail(status: StatusCode, message: &str, code: Option<&str>) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": message, "code": code })),
    )
        .into_response()
}

fn stock_error(stock: u32) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "success": false,
            "error": format!("Only {stock} available"),
            "code": "INSUFFICIENT_STOCK",
            "details": { "available_quantity": stock },
        })),
    )
        .into_response()
}

fn quantity_of(body: &Value) -> u32 {
    body.get("quantity")
        .and_then(Value::as_u64)
        .and_then(|q| u32::try_from(q).ok())
        .unwrap_or(1)
}

fn provider_error(description: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "invalid_grant", "error_description": description })),
    )
        .into_response()
}

async fn token(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let field = |name: &str| body.get(name).and_then(Value::as_str).unwrap_or_default();
    let mut state = lock(&state);
    match query.get("grant_type").map(String::as_str) {
        Some("password") => {
            if field("email") != TEST_EMAIL || field("password") != TEST_PASSWORD {
                return provider_error("Invalid login credentials");
            }
            Json(state.issue_tokens(TEST_USER_ID)).into_response()
        }
        Some("refresh_token") => {
            let Some(user) = state.refresh_tokens.remove(field("refresh_token")) else {
                return provider_error("Invalid Refresh Token: Refresh Token Not Found");
            };
            state.refresh_grants += 1;
            Json(state.issue_tokens(&user)).into_response()
        }
        _ => provider_error("Unsupported grant type"),
    }
}

async fn logout() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn fetch_cart(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = lock(&state);
    let caller = match state.identify(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    let lines = state.lines(&caller).clone();
    ok(state.cart_json(&lines))
}

async fn clear_cart(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = lock(&state);
    let caller = match state.identify(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    state.lines(&caller).clear();
    ok(json!({}))
}

async fn add_item(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = lock(&state);
    let caller = match state.identify(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    let Some(id) = body.get("product_id").and_then(Value::as_str) else {
        return fail(
            StatusCode::BAD_REQUEST,
            "product_id is required",
            Some("VALIDATION_ERROR"),
        );
    };
    let Some(stock) = state.product(id).map(|p| p.stock) else {
        return fail(StatusCode::NOT_FOUND, "Product not found", Some("NOT_FOUND"));
    };
    let quantity = quantity_of(&body);

    let lines = state.lines(&caller);
    let current = lines.iter().find(|(line, _)| line == id).map_or(0, |(_, q)| *q);
    if current + quantity > stock {
        return stock_error(stock);
    }
    match lines.iter_mut().find(|(line, _)| line == id) {
        Some(line) => line.1 += quantity,
        None => lines.push((id.to_string(), quantity)),
    }
    ok(json!({}))
}

async fn update_item(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = lock(&state);
    let caller = match state.identify(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    let stock = state.product(&id).map_or(0, |p| p.stock);
    let quantity = quantity_of(&body);
    if quantity > stock {
        return stock_error(stock);
    }
    let lines = state.lines(&caller);
    match lines.iter_mut().find(|(line, _)| *line == id) {
        Some(line) => line.1 = quantity,
        None => return fail(StatusCode::NOT_FOUND, "Item not in cart", Some("NOT_FOUND")),
    }
    ok(json!({}))
}

async fn remove_item(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let mut state = lock(&state);
    let caller = match state.identify(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };
    state.lines(&caller).retain(|(line, _)| *line != id);
    ok(json!({}))
}

/// Fold the guest cart into the caller's account cart.
async fn merge_cart(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let mut state = lock(&state);
    let caller = match state.identify(&headers) {
        Ok(Caller::User(user)) => Caller::User(user),
        Ok(Caller::Guest) => return fail(StatusCode::UNAUTHORIZED, "Sign in required", None),
        Err(response) => return response,
    };
    let guest = std::mem::take(&mut state.guest_cart);
    let lines = state.lines(&caller);
    for (id, quantity) in guest {
        match lines.iter_mut().find(|(line, _)| *line == id) {
            Some(line) => line.1 += quantity,
            None => lines.push((id, quantity)),
        }
    }
    state.merges += 1;
    ok(json!({}))
}

async fn validate_cart() -> Response {
    ok(json!({ "valid": true, "issues": [] }))
}

async fn sync_account(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let state = lock(&state);
    if let Err(response) = state.identify(&headers) {
        return response;
    }
    if state.email_unverified {
        return fail(
            StatusCode::FORBIDDEN,
            "Please verify your email address",
            Some("EMAIL_NOT_VERIFIED"),
        );
    }
    ok(json!({}))
}

async fn favourites() -> Response {
    ok(json!([]))
}

fn product_json(product: &MockProduct) -> Value {
    json!({
        "id": product.id,
        "sku": product.sku,
        "name": product.name,
        "brand": product.name.split_whitespace().next(),
        "price": product.price.to_string(),
        "in_stock": product.stock > 0,
    })
}

async fn list_products(State(state): State<Shared>) -> Response {
    let mut state = lock(&state);
    if state.rate_limited > 0 {
        state.rate_limited -= 1;
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, HeaderValue::from(state.retry_after))],
            Json(json!({ "success": false, "error": "Too many requests" })),
        )
            .into_response();
    }
    let products: Vec<Value> = state.products.iter().map(product_json).collect();
    let total = products.len();
    ok(json!({
        "products": products,
        "total": total,
        "page": 1,
        "per_page": 24,
    }))
}

async fn product_by_sku(State(state): State<Shared>, Path(sku): Path<String>) -> Response {
    let state = lock(&state);
    match state.products.iter().find(|p| p.sku == sku) {
        Some(product) => ok(product_json(product)),
        None => fail(StatusCode::NOT_FOUND, "Product not found", Some("NOT_FOUND")),
    }
}

fn require_admin(state: &Shared, headers: &HeaderMap) -> Option<Response> {
    match lock(state).identify(headers) {
        Ok(Caller::User(_)) => None,
        Ok(Caller::Guest) => Some(fail(StatusCode::UNAUTHORIZED, "Sign in required", None)),
        Err(response) => Some(response),
    }
}

async fn admin_orders(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Some(denied) = require_admin(&state, &headers) {
        return denied;
    }
    ok(json!({
        "items": [
            {
                "id": "o-1001",
                "order_number": "INK-1001",
                "customer_name": "Aroha Smith",
                "email": "aroha@example.co.nz",
                "status": "processing",
                "total": "123.45",
                "item_count": 3,
                "created_at": "2026-03-01T09:30:00Z",
            },
            {
                "id": "o-1002",
                "order_number": "INK-1002",
                "customer_name": "Lee, Sam",
                "status": "shipped",
                "total": "19.99",
                "item_count": 1,
                "created_at": "2026-03-02T14:05:00Z",
            },
        ],
        "total": 2,
        "page": 1,
    }))
}

async fn admin_order_status(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Some(denied) = require_admin(&state, &headers) {
        return denied;
    }
    ok(json!({}))
}

async fn admin_products(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Some(denied) = require_admin(&state, &headers) {
        return denied;
    }
    let products: Vec<Value> = lock(&state)
        .products
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "sku": p.sku,
                "name": p.name,
                "price": p.price.to_string(),
                "stock_quantity": p.stock,
                "active": true,
            })
        })
        .collect();
    ok(Value::Array(products))
}

async fn admin_customers(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Some(denied) = require_admin(&state, &headers) {
        return denied;
    }
    ok(json!([
        {
            "id": "c-1",
            "email": "aroha@example.co.nz",
            "name": "Aroha Smith",
            "order_count": 4,
            "total_spent": "412.80",
            "created_at": "2025-11-20T08:00:00Z",
        },
    ]))
}
