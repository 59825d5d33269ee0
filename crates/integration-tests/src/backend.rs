//! In-memory commerce backend served by `axum`.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use marigold_core::{
    AddressId, CartItemId, CategoryId, CurrencyCode, Money, OrderId, OrderStatus, PaymentMethod,
    PaymentStatus, ProductId, SkuId, UserId, WishlistItemId,
};
use marigold_storefront::Storefront;
use marigold_storefront::config::StorefrontConfig;
use marigold_storefront::models::{
    Address, AppliedCoupon, Cart, CartItem, Category, Order, OrderItem, OrderSummary, Page,
    Product, ProductSummary, Sku, User, WishlistItem,
};
use marigold_storefront::storage::{LocalStore, MemoryStore};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Email of the seeded customer.
pub const EMAIL: &str = "ada@example.com";
/// Password of the seeded customer.
pub const PASSWORD: &str = "correct horse battery";
/// The only coupon the backend accepts (10% off).
pub const COUPON: &str = "SAVE10";

const ACCESS_TTL_SECS: i64 = 900;
const MAX_LINE_QUANTITY: u32 = 99;

// =============================================================================
// State
// =============================================================================

struct Account {
    user: User,
    password: String,
}

struct CartLine {
    id: CartItemId,
    sku_id: SkuId,
    quantity: u32,
}

#[derive(Default)]
struct ServerCart {
    lines: Vec<CartLine>,
    coupon: Option<String>,
}

/// A canned error response.
struct Fault {
    status: StatusCode,
    retry_after: Option<String>,
    body: Value,
}

impl IntoResponse for Fault {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(value) = self.retry_after.and_then(|v| HeaderValue::from_str(&v).ok()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

struct Behaviour {
    fail_merge: bool,
    lose_merge_response: bool,
    catalog_fault: Option<Fault>,
    reject_refresh: bool,
    issue_refresh_tokens: bool,
    rotate_refresh_tokens: bool,
    access_ttl_secs: i64,
    refresh_delay: Duration,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            fail_merge: false,
            lose_merge_response: false,
            catalog_fault: None,
            reject_refresh: false,
            issue_refresh_tokens: true,
            rotate_refresh_tokens: false,
            access_ttl_secs: ACCESS_TTL_SECS,
            refresh_delay: Duration::from_millis(50),
        }
    }
}

#[derive(Default, Clone)]
struct Stats {
    refresh_calls: usize,
    rejected_requests: usize,
    merge_calls: usize,
    product_requests: usize,
    cancel_calls: usize,
    logout_calls: usize,
    last_merge: Option<Value>,
    merge_keys: Vec<Option<String>>,
    order_coupons: Vec<Option<String>>,
    idempotency_keys: Vec<String>,
}

struct Inner {
    behaviour: Behaviour,
    stats: Stats,
    next_id: i64,
    accounts: Vec<Account>,
    access_tokens: HashMap<String, UserId>,
    refresh_tokens: HashMap<String, UserId>,
    products: Vec<Product>,
    categories: Vec<Category>,
    carts: HashMap<UserId, ServerCart>,
    wishlists: HashMap<UserId, Vec<WishlistItem>>,
    addresses: HashMap<UserId, Vec<Address>>,
    orders: Vec<(UserId, Order)>,
    idempotent_orders: HashMap<String, OrderId>,
    applied_merges: HashMap<String, UserId>,
}

type Shared = Arc<Mutex<Inner>>;

fn lock(state: &Shared) -> MutexGuard<'_, Inner> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn usd(minor: i64) -> Money {
    Money::from_minor(minor, CurrencyCode::USD)
}

fn category(id: i64, slug: &str, name: &str) -> Category {
    Category {
        id: CategoryId::new(id),
        slug: slug.to_string(),
        name: name.to_string(),
        parent_id: None,
        product_count: None,
    }
}

fn sku(id: i64, label: &str, price_minor: i64, stock: Option<u32>) -> Sku {
    Sku {
        id: SkuId::new(id),
        code: format!("MG-{id}"),
        label: label.to_string(),
        options: BTreeMap::new(),
        price: usd(price_minor),
        compare_at_price: None,
        stock,
    }
}

fn product(id: i64, slug: &str, name: &str, category: &Category, skus: Vec<Sku>) -> Product {
    Product {
        id: ProductId::new(id),
        slug: slug.to_string(),
        name: name.to_string(),
        description: format!("{name} from the Marigold test catalog."),
        brand: Some("Marigold".to_string()),
        category: Some(category.clone()),
        images: vec![format!("https://cdn.example.com/{slug}.jpg")],
        tags: vec![],
        rating: Some(4.5),
        review_count: 0,
        skus,
    }
}

impl Inner {
    fn seeded() -> Self {
        let shirts = category(1, "shirts", "Shirts");
        let accessories = category(2, "accessories", "Accessories");

        let mut shirt_skus = vec![
            sku(11, "Medium", 4500, Some(10)),
            sku(12, "Large", 4500, Some(0)),
        ];
        if let Some(first) = shirt_skus.first_mut() {
            first.compare_at_price = Some(usd(6000));
        }

        let products = vec![
            product(1, "linen-shirt", "Linen Shirt", &shirts, shirt_skus),
            product(
                2,
                "canvas-tote",
                "Canvas Tote",
                &accessories,
                vec![sku(21, "Natural", 2000, None)],
            ),
            product(
                3,
                "wool-socks",
                "Wool Socks",
                &accessories,
                vec![sku(31, "One size", 1250, Some(3))],
            ),
            product(
                4,
                "sold-out-scarf",
                "Sold Out Scarf",
                &accessories,
                vec![sku(41, "One size", 3000, Some(0))],
            ),
        ];

        let customer = Account {
            user: User {
                id: UserId::new(1),
                email: EMAIL.to_string(),
                first_name: Some("Ada".to_string()),
                last_name: Some("Lovelace".to_string()),
                phone: None,
                accepts_marketing: false,
                created_at: Some(Utc::now()),
            },
            password: PASSWORD.to_string(),
        };

        Self {
            behaviour: Behaviour::default(),
            stats: Stats::default(),
            next_id: 100,
            accounts: vec![customer],
            access_tokens: HashMap::new(),
            refresh_tokens: HashMap::new(),
            products,
            categories: vec![shirts, accessories],
            carts: HashMap::new(),
            wishlists: HashMap::new(),
            addresses: HashMap::new(),
            orders: Vec::new(),
            idempotent_orders: HashMap::new(),
            applied_merges: HashMap::new(),
        }
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn issue_access_token(&mut self, user: UserId) -> String {
        let token = format!("access-{}", self.next_id());
        self.access_tokens.insert(token.clone(), user);
        token
    }

    fn issue_refresh_token(&mut self, user: UserId) -> String {
        let token = format!("refresh-{}", self.next_id());
        self.refresh_tokens.insert(token.clone(), user);
        token
    }

    fn sign_in(&mut self, user: UserId) -> Value {
        let access_token = self.issue_access_token(user);
        let mut body = json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": self.behaviour.access_ttl_secs,
        });
        if self.behaviour.issue_refresh_tokens {
            body["refresh_token"] = Value::String(self.issue_refresh_token(user));
        }
        body
    }

    fn authorize(&mut self, headers: &HeaderMap) -> Result<UserId, Response> {
        let user = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .and_then(|token| self.access_tokens.get(token).copied());

        user.ok_or_else(|| {
            self.stats.rejected_requests += 1;
            error(StatusCode::UNAUTHORIZED, "Invalid or expired access token")
        })
    }

    fn account(&self, user: UserId) -> Result<&Account, Response> {
        self.accounts
            .iter()
            .find(|account| account.user.id == user)
            .ok_or_else(|| error(StatusCode::NOT_FOUND, "Account not found"))
    }

    fn find_sku(&self, sku_id: SkuId) -> Option<(&Product, &Sku)> {
        self.products.iter().find_map(|product| {
            product
                .skus
                .iter()
                .find(|sku| sku.id == sku_id)
                .map(|sku| (product, sku))
        })
    }

    fn summary(product: &Product) -> ProductSummary {
        let cheapest = product.skus.iter().min_by_key(|sku| sku.price.amount);
        ProductSummary {
            id: product.id,
            slug: product.slug.clone(),
            name: product.name.clone(),
            price: cheapest.map_or_else(|| usd(0), |sku| sku.price),
            compare_at_price: cheapest.and_then(|sku| sku.compare_at_price),
            image: product.images.first().cloned(),
            in_stock: product.is_available(),
            rating: product.rating,
        }
    }

    /// Quantity allowed for `sku_id`, or a 409 when the stock is too low.
    fn check_stock(&self, sku_id: SkuId, quantity: u32) -> Result<u32, Response> {
        let (_, sku) = self
            .find_sku(sku_id)
            .ok_or_else(|| error(StatusCode::NOT_FOUND, "SKU not found"))?;
        if let Some(stock) = sku.stock
            && quantity > stock
        {
            return Err(error(
                StatusCode::CONFLICT,
                &format!("Only {stock} of {} left in stock", sku.label),
            ));
        }
        Ok(quantity.min(MAX_LINE_QUANTITY))
    }

    fn cart(&self, user: UserId) -> Cart {
        let mut cart = Cart::empty(CurrencyCode::USD);
        let Some(server) = self.carts.get(&user) else {
            return cart;
        };

        let mut subtotal = Decimal::ZERO;
        for line in &server.lines {
            let Some((product, sku)) = self.find_sku(line.sku_id) else {
                continue;
            };
            let line_total = sku.price.amount * Decimal::from(line.quantity);
            subtotal += line_total;
            cart.item_count += line.quantity;
            cart.items.push(CartItem {
                id: line.id,
                product_id: product.id,
                sku_id: sku.id,
                name: product.name.clone(),
                sku_label: sku.label.clone(),
                image: product.images.first().cloned(),
                quantity: line.quantity,
                unit_price: sku.price,
                line_total: Money::new(line_total, CurrencyCode::USD),
                max_quantity: sku.stock,
            });
        }

        let discount = server
            .coupon
            .as_ref()
            .map(|_| (subtotal / Decimal::TEN).round_dp(2))
            .unwrap_or_default();

        cart.coupon = server.coupon.as_ref().map(|code| AppliedCoupon {
            code: code.clone(),
            description: Some("10% off".to_string()),
            discount: Money::new(discount, CurrencyCode::USD),
        });
        cart.subtotal = Money::new(subtotal, CurrencyCode::USD);
        cart.discount = cart.coupon.as_ref().map(|coupon| coupon.discount);
        cart.total = Money::new(subtotal - discount, CurrencyCode::USD);
        cart
    }

    fn add_to_cart(&mut self, user: UserId, sku_id: SkuId, quantity: u32) {
        let id = CartItemId::new(self.next_id());
        let server = self.carts.entry(user).or_default();
        if let Some(line) = server.lines.iter_mut().find(|line| line.sku_id == sku_id) {
            line.quantity = (line.quantity + quantity).min(MAX_LINE_QUANTITY);
        } else {
            server.lines.push(CartLine {
                id,
                sku_id,
                quantity: quantity.min(MAX_LINE_QUANTITY),
            });
        }
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn ok<T: serde::Serialize>(value: &T) -> Response {
    Json(value).into_response()
}

/// Wrap in the `{"data": ...}` envelope some endpoints use.
fn enveloped<T: serde::Serialize>(value: &T) -> Response {
    Json(json!({ "data": value })).into_response()
}

type Reply = Result<Response, Response>;

// =============================================================================
// FakeBackend
// =============================================================================

/// A running fake backend. The server stops when this is dropped.
pub struct FakeBackend {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl FakeBackend {
    /// Start a backend with the seeded catalog and customer.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(Inner::seeded()));
        let app = Router::new().nest("/api/v1", routes()).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake backend");
        let addr = listener.local_addr().expect("fake backend address");
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// Base URL of the API.
    #[must_use]
    pub fn api_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }

    /// Client configuration pointing at this backend.
    ///
    /// # Panics
    ///
    /// Panics if the URL is rejected.
    #[must_use]
    pub fn config(&self) -> StorefrontConfig {
        let mut config = StorefrontConfig::new(&self.api_url()).expect("valid fake backend URL");
        config.http_timeout = Duration::from_secs(5);
        config
    }

    /// A storefront over a fresh in-memory store.
    ///
    /// # Panics
    ///
    /// Panics if the storefront cannot be built.
    #[must_use]
    pub fn storefront(&self) -> (Storefront, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let storefront = self.storefront_with(store.clone());
        (storefront, store)
    }

    /// A storefront over an existing store.
    ///
    /// # Panics
    ///
    /// Panics if the storefront cannot be built.
    #[must_use]
    pub fn storefront_with(&self, store: Arc<dyn LocalStore>) -> Storefront {
        Storefront::with_store(self.config(), store).expect("build storefront")
    }

    // -------------------------------------------------------------------------
    // Knobs
    // -------------------------------------------------------------------------

    /// Make `POST cart/merge` fail with 500.
    pub fn set_fail_merge(&self, fail: bool) {
        lock(&self.state).behaviour.fail_merge = fail;
    }

    /// Apply the next `POST cart/merge`, then answer 504 as if the response
    /// was lost on the way back.
    pub fn lose_next_merge_response(&self) {
        lock(&self.state).behaviour.lose_merge_response = true;
    }

    /// Answer the next `GET products` with `status` and `body`, plus a
    /// `Retry-After` header when given.
    pub fn fail_next_catalog_request(&self, status: u16, retry_after: Option<&str>, body: Value) {
        lock(&self.state).behaviour.catalog_fault = Some(Fault {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            retry_after: retry_after.map(str::to_string),
            body,
        });
    }

    /// How long `POST auth/refresh` takes to answer.
    pub fn set_refresh_delay(&self, delay: Duration) {
        lock(&self.state).behaviour.refresh_delay = delay;
    }

    /// Make `POST auth/refresh` reject every token.
    pub fn set_reject_refresh(&self, reject: bool) {
        lock(&self.state).behaviour.reject_refresh = reject;
    }

    /// Whether sign in returns a refresh token.
    pub fn set_issue_refresh_tokens(&self, issue: bool) {
        lock(&self.state).behaviour.issue_refresh_tokens = issue;
    }

    /// Whether `auth/refresh` returns a new refresh token.
    pub fn set_rotate_refresh_tokens(&self, rotate: bool) {
        lock(&self.state).behaviour.rotate_refresh_tokens = rotate;
    }

    /// `expires_in` reported for new access tokens.
    pub fn set_access_ttl_secs(&self, secs: i64) {
        lock(&self.state).behaviour.access_ttl_secs = secs;
    }

    /// Invalidate every access token (refresh tokens stay valid).
    pub fn expire_access_tokens(&self) {
        lock(&self.state).access_tokens.clear();
    }

    /// Put items in the seeded customer's server cart.
    pub fn seed_server_cart(&self, sku_id: SkuId, quantity: u32) {
        lock(&self.state).add_to_cart(UserId::new(1), sku_id, quantity);
    }

    /// Move an order along its lifecycle.
    pub fn set_order_status(&self, order_id: OrderId, status: OrderStatus) {
        let mut inner = lock(&self.state);
        if let Some((_, order)) = inner.orders.iter_mut().find(|(_, o)| o.id == order_id) {
            order.status = status;
        }
    }

    // -------------------------------------------------------------------------
    // Observations
    // -------------------------------------------------------------------------

    /// Calls to `auth/refresh`.
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        lock(&self.state).stats.refresh_calls
    }

    /// Requests rejected with 401 for a bad access token.
    #[must_use]
    pub fn rejected_requests(&self) -> usize {
        lock(&self.state).stats.rejected_requests
    }

    /// Calls to `cart/merge`.
    #[must_use]
    pub fn merge_calls(&self) -> usize {
        lock(&self.state).stats.merge_calls
    }

    /// Body of the last `cart/merge` call.
    #[must_use]
    pub fn last_merge(&self) -> Option<Value> {
        lock(&self.state).stats.last_merge.clone()
    }

    /// `Idempotency-Key` headers seen on `POST cart/merge`, per call.
    #[must_use]
    pub fn merge_keys(&self) -> Vec<Option<String>> {
        lock(&self.state).stats.merge_keys.clone()
    }

    /// `coupon_code` sent with each `POST orders`.
    #[must_use]
    pub fn order_coupons(&self) -> Vec<Option<String>> {
        lock(&self.state).stats.order_coupons.clone()
    }

    /// Calls to `products/{slug}`.
    #[must_use]
    pub fn product_requests(&self) -> usize {
        lock(&self.state).stats.product_requests
    }

    /// Calls to `orders/{id}/cancel`.
    #[must_use]
    pub fn cancel_calls(&self) -> usize {
        lock(&self.state).stats.cancel_calls
    }

    /// Calls to `auth/logout`.
    #[must_use]
    pub fn logout_calls(&self) -> usize {
        lock(&self.state).stats.logout_calls
    }

    /// `Idempotency-Key` headers seen on `POST orders`.
    #[must_use]
    pub fn idempotency_keys(&self) -> Vec<String> {
        lock(&self.state).stats.idempotency_keys.clone()
    }

    /// Units in the seeded customer's server cart, per SKU.
    #[must_use]
    pub fn server_cart_quantities(&self) -> Vec<(SkuId, u32)> {
        lock(&self.state)
            .carts
            .get(&UserId::new(1))
            .map(|cart| {
                cart.lines
                    .iter()
                    .map(|line| (line.sku_id, line.quantity))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Coupon on the seeded customer's server cart.
    #[must_use]
    pub fn server_cart_coupon(&self) -> Option<String> {
        lock(&self.state)
            .carts
            .get(&UserId::new(1))
            .and_then(|cart| cart.coupon.clone())
    }
}

// =============================================================================
// Routes
// =============================================================================

fn routes() -> Router<Shared> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me).put(update_me))
        .route("/auth/change-password", post(change_password))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/products", get(list_products))
        .route("/products/{key}", get(get_product))
        .route("/products/{key}/related", get(related_products))
        .route("/products/{key}/reviews", get(product_reviews))
        .route("/categories", get(list_categories))
        .route("/cart", get(get_cart).delete(clear_cart))
        .route("/cart/items", post(add_cart_item))
        .route(
            "/cart/items/{id}",
            axum::routing::patch(update_cart_item).delete(remove_cart_item),
        )
        .route("/cart/merge", post(merge_cart))
        .route("/cart/coupon", post(apply_coupon).delete(remove_coupon))
        .route("/wishlist", get(list_wishlist).post(add_wishlist))
        .route("/wishlist/{id}", delete(remove_wishlist))
        .route("/addresses", get(list_addresses).post(create_address))
        .route(
            "/addresses/{id}",
            axum::routing::put(update_address).delete(delete_address),
        )
        .route("/addresses/{id}/default", post(default_address))
        .route("/orders", get(list_orders).post(place_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/cancel", post(cancel_order))
}

// -----------------------------------------------------------------------------
// Auth
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

async fn login(State(state): State<Shared>, Json(body): Json<Credentials>) -> Reply {
    let mut inner = lock(&state);
    let account = inner
        .accounts
        .iter()
        .find(|a| a.user.email.eq_ignore_ascii_case(&body.email) && a.password == body.password)
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Invalid email or password"))?;

    let user = account.user.clone();
    let mut response = inner.sign_in(user.id);
    response["user"] = json!(user);
    Ok(ok(&response))
}

#[derive(Deserialize)]
struct Registration {
    email: String,
    password: String,
    first_name: Option<String>,
    last_name: Option<String>,
    #[serde(default)]
    accepts_marketing: bool,
}

async fn register(State(state): State<Shared>, Json(body): Json<Registration>) -> Reply {
    let mut inner = lock(&state);
    if inner
        .accounts
        .iter()
        .any(|a| a.user.email.eq_ignore_ascii_case(&body.email))
    {
        return Err(error(
            StatusCode::CONFLICT,
            "An account with this email already exists",
        ));
    }

    let user = User {
        id: UserId::new(inner.next_id()),
        email: body.email,
        first_name: body.first_name,
        last_name: body.last_name,
        phone: None,
        accepts_marketing: body.accepts_marketing,
        created_at: Some(Utc::now()),
    };
    inner.accounts.push(Account {
        user: user.clone(),
        password: body.password,
    });

    let mut response = inner.sign_in(user.id);
    response["user"] = json!(user);
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh_token: String,
}

async fn refresh(State(state): State<Shared>, Json(body): Json<RefreshBody>) -> Reply {
    let delay = {
        let mut inner = lock(&state);
        inner.stats.refresh_calls += 1;
        inner.behaviour.refresh_delay
    };
    // Widen the window in which concurrent 401s pile up
    tokio::time::sleep(delay).await;

    let mut inner = lock(&state);
    if inner.behaviour.reject_refresh {
        return Err(error(StatusCode::UNAUTHORIZED, "Refresh token revoked"));
    }
    let user = *inner
        .refresh_tokens
        .get(&body.refresh_token)
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Unknown refresh token"))?;

    let access_token = inner.issue_access_token(user);
    let mut response = json!({
        "access_token": access_token,
        "expires_in": inner.behaviour.access_ttl_secs,
    });
    if inner.behaviour.rotate_refresh_tokens {
        inner.refresh_tokens.remove(&body.refresh_token);
        response["refresh_token"] = Value::String(inner.issue_refresh_token(user));
    }
    Ok(ok(&response))
}

async fn logout(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let mut inner = lock(&state);
    inner.stats.logout_calls += 1;
    let user = inner.authorize(&headers)?;
    inner.access_tokens.retain(|_, owner| *owner != user);
    inner.refresh_tokens.retain(|_, owner| *owner != user);
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn me(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    Ok(enveloped(&inner.account(user)?.user))
}

#[derive(Deserialize)]
struct ProfileBody {
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
    accepts_marketing: Option<bool>,
}

async fn update_me(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<ProfileBody>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    let account = inner
        .accounts
        .iter_mut()
        .find(|a| a.user.id == user)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Account not found"))?;

    if body.first_name.is_some() {
        account.user.first_name = body.first_name;
    }
    if body.last_name.is_some() {
        account.user.last_name = body.last_name;
    }
    if body.phone.is_some() {
        account.user.phone = body.phone;
    }
    if let Some(accepts) = body.accepts_marketing {
        account.user.accepts_marketing = accepts;
    }
    Ok(ok(&account.user))
}

#[derive(Deserialize)]
struct ChangePasswordBody {
    current_password: String,
    new_password: String,
}

async fn change_password(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordBody>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    let account = inner
        .accounts
        .iter_mut()
        .find(|a| a.user.id == user)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Account not found"))?;

    if account.password != body.current_password {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "message": "Password not changed",
                "errors": { "current_password": "is incorrect" }
            })),
        )
            .into_response());
    }
    account.password = body.new_password;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn forgot_password(Json(_body): Json<Value>) -> Response {
    StatusCode::ACCEPTED.into_response()
}

#[derive(Deserialize)]
struct ResetBody {
    token: String,
}

async fn reset_password(Json(body): Json<ResetBody>) -> Reply {
    if body.token == "valid-reset-token" {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(error(StatusCode::BAD_REQUEST, "Reset link is invalid or expired"))
    }
}

// -----------------------------------------------------------------------------
// Catalog
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
struct ListParams {
    page: Option<u32>,
    per_page: Option<u32>,
    category: Option<String>,
    search: Option<String>,
    in_stock: Option<bool>,
}

async fn list_products(State(state): State<Shared>, Query(params): Query<ListParams>) -> Response {
    let mut inner = lock(&state);
    if let Some(fault) = inner.behaviour.catalog_fault.take() {
        return fault.into_response();
    }
    let search = params.search.map(|s| s.to_lowercase());

    let matching: Vec<ProductSummary> = inner
        .products
        .iter()
        .filter(|p| {
            params.category.as_ref().is_none_or(|slug| {
                p.category.as_ref().is_some_and(|c| &c.slug == slug)
            })
        })
        .filter(|p| {
            search
                .as_ref()
                .is_none_or(|s| p.name.to_lowercase().contains(s))
        })
        .filter(|p| !params.in_stock.unwrap_or(false) || p.is_available())
        .map(Inner::summary)
        .collect();

    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).max(1);
    let skip = usize::try_from((page - 1) * per_page).unwrap_or(usize::MAX);
    let take = usize::try_from(per_page).unwrap_or(usize::MAX);

    ok(&Page {
        total: matching.len() as u64,
        items: matching.into_iter().skip(skip).take(take).collect(),
        page,
        per_page,
    })
}

async fn get_product(State(state): State<Shared>, Path(slug): Path<String>) -> Reply {
    let mut inner = lock(&state);
    inner.stats.product_requests += 1;
    inner
        .products
        .iter()
        .find(|p| p.slug == slug)
        .map(ok)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Product not found"))
}

async fn related_products(State(state): State<Shared>, Path(id): Path<ProductId>) -> Response {
    let inner = lock(&state);
    let related: Vec<ProductSummary> = inner
        .products
        .iter()
        .filter(|p| p.id != id)
        .take(2)
        .map(Inner::summary)
        .collect();
    ok(&related)
}

async fn product_reviews(Path(_id): Path<ProductId>) -> Response {
    ok(&json!({ "items": [], "page": 1, "per_page": 20, "total": 0 }))
}

async fn list_categories(State(state): State<Shared>) -> Response {
    enveloped(&lock(&state).categories)
}

// -----------------------------------------------------------------------------
// Cart
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
struct AddItemBody {
    sku_id: SkuId,
    quantity: u32,
}

#[derive(Deserialize)]
struct QuantityBody {
    quantity: u32,
}

#[derive(Deserialize)]
struct CouponBody {
    code: String,
}

#[derive(Deserialize)]
struct MergeBody {
    items: Vec<AddItemBody>,
    coupon_code: Option<String>,
}

async fn get_cart(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    Ok(ok(&inner.cart(user)))
}

async fn add_cart_item(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<AddItemBody>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;

    let existing = inner
        .carts
        .get(&user)
        .and_then(|c| c.lines.iter().find(|l| l.sku_id == body.sku_id))
        .map_or(0, |l| l.quantity);
    inner.check_stock(body.sku_id, existing + body.quantity)?;

    inner.add_to_cart(user, body.sku_id, body.quantity);
    Ok(ok(&inner.cart(user)))
}

async fn update_cart_item(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<CartItemId>,
    Json(body): Json<QuantityBody>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;

    let sku_id = inner
        .carts
        .get(&user)
        .and_then(|c| c.lines.iter().find(|l| l.id == id))
        .map(|l| l.sku_id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Cart item not found"))?;
    let quantity = inner.check_stock(sku_id, body.quantity)?;

    if let Some(line) = inner
        .carts
        .get_mut(&user)
        .and_then(|c| c.lines.iter_mut().find(|l| l.id == id))
    {
        line.quantity = quantity;
    }
    Ok(ok(&inner.cart(user)))
}

async fn remove_cart_item(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<CartItemId>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    let cart = inner.carts.entry(user).or_default();
    let before = cart.lines.len();
    cart.lines.retain(|l| l.id != id);
    if cart.lines.len() == before {
        return Err(error(StatusCode::NOT_FOUND, "Cart item not found"));
    }
    Ok(ok(&inner.cart(user)))
}

async fn clear_cart(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    inner.carts.remove(&user);
    Ok(ok(&inner.cart(user)))
}

async fn merge_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    let key = headers
        .get("Idempotency-Key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    inner.stats.merge_calls += 1;
    inner.stats.last_merge = Some(body.clone());
    inner.stats.merge_keys.push(key.clone());

    if inner.behaviour.fail_merge {
        return Err(error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Cart service temporarily unavailable",
        ));
    }

    if let Some(key) = &key
        && inner.applied_merges.get(key) == Some(&user)
    {
        return Ok(ok(&inner.cart(user)));
    }

    let merge: MergeBody = serde_json::from_value(body)
        .map_err(|e| error(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()))?;

    for line in merge.items {
        let Some((_, sku)) = inner.find_sku(line.sku_id) else {
            continue;
        };
        let stock = sku.stock.unwrap_or(MAX_LINE_QUANTITY);
        let existing = inner
            .carts
            .get(&user)
            .and_then(|c| c.lines.iter().find(|l| l.sku_id == line.sku_id))
            .map_or(0, |l| l.quantity);
        let addable = stock.saturating_sub(existing).min(line.quantity);
        if addable > 0 {
            inner.add_to_cart(user, line.sku_id, addable);
        }
    }

    if let Some(code) = merge.coupon_code
        && code == COUPON
    {
        inner.carts.entry(user).or_default().coupon = Some(code);
    }

    if let Some(key) = key {
        inner.applied_merges.insert(key, user);
    }
    if std::mem::take(&mut inner.behaviour.lose_merge_response) {
        return Err(error(StatusCode::GATEWAY_TIMEOUT, "Upstream timed out"));
    }

    Ok(ok(&inner.cart(user)))
}

async fn apply_coupon(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<CouponBody>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;

    if body.code != COUPON {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "message": "Coupon could not be applied",
                "errors": { "code": ["is not a valid coupon"] }
            })),
        )
            .into_response());
    }

    inner.carts.entry(user).or_default().coupon = Some(body.code);
    Ok(ok(&inner.cart(user)))
}

async fn remove_coupon(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    inner.carts.entry(user).or_default().coupon = None;
    Ok(ok(&inner.cart(user)))
}

// -----------------------------------------------------------------------------
// Wishlist
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
struct WishlistBody {
    product_id: ProductId,
}

async fn list_wishlist(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    Ok(ok(&inner.wishlists.get(&user).cloned().unwrap_or_default()))
}

async fn add_wishlist(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<WishlistBody>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;

    let summary = inner
        .products
        .iter()
        .find(|p| p.id == body.product_id)
        .map(Inner::summary)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Product not found"))?;

    if let Some(existing) = inner
        .wishlists
        .get(&user)
        .and_then(|items| items.iter().find(|i| i.product.id == body.product_id))
    {
        return Ok(ok(existing));
    }

    let item = WishlistItem {
        id: WishlistItemId::new(inner.next_id()),
        product: summary,
        added_at: Some(Utc::now()),
    };
    inner.wishlists.entry(user).or_default().push(item.clone());
    Ok((StatusCode::CREATED, Json(item)).into_response())
}

async fn remove_wishlist(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(product_id): Path<ProductId>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    if let Some(items) = inner.wishlists.get_mut(&user) {
        items.retain(|i| i.product.id != product_id);
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

// -----------------------------------------------------------------------------
// Addresses
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
struct AddressBody {
    full_name: String,
    line1: String,
    line2: Option<String>,
    city: String,
    state: Option<String>,
    postal_code: String,
    country: String,
    phone: Option<String>,
    #[serde(default)]
    is_default: bool,
}

impl AddressBody {
    fn into_address(self, id: AddressId) -> Address {
        Address {
            id,
            full_name: self.full_name,
            line1: self.line1,
            line2: self.line2,
            city: self.city,
            state: self.state,
            postal_code: self.postal_code,
            country: self.country,
            phone: self.phone,
            is_default: self.is_default,
        }
    }
}

fn make_default(addresses: &mut [Address], id: AddressId) {
    for address in addresses {
        address.is_default = address.id == id;
    }
}

async fn list_addresses(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    Ok(ok(&inner.addresses.get(&user).cloned().unwrap_or_default()))
}

async fn create_address(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<AddressBody>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    let id = AddressId::new(inner.next_id());

    let addresses = inner.addresses.entry(user).or_default();
    let mut address = body.into_address(id);
    address.is_default = address.is_default || addresses.is_empty();
    addresses.push(address.clone());
    if address.is_default {
        make_default(addresses, id);
    }
    Ok((StatusCode::CREATED, Json(address)).into_response())
}

async fn update_address(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<AddressId>,
    Json(body): Json<AddressBody>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    let addresses = inner.addresses.entry(user).or_default();
    let slot = addresses
        .iter_mut()
        .find(|a| a.id == id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Address not found"))?;
    *slot = body.into_address(id);
    let address = slot.clone();
    if address.is_default {
        make_default(addresses, id);
    }
    Ok(ok(&address))
}

async fn delete_address(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<AddressId>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    if let Some(addresses) = inner.addresses.get_mut(&user) {
        addresses.retain(|a| a.id != id);
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn default_address(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<AddressId>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    let addresses = inner.addresses.entry(user).or_default();
    if !addresses.iter().any(|a| a.id == id) {
        return Err(error(StatusCode::NOT_FOUND, "Address not found"));
    }
    make_default(addresses, id);
    addresses
        .iter()
        .find(|a| a.id == id)
        .map(ok)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Address not found"))
}

// -----------------------------------------------------------------------------
// Orders
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
struct PlaceOrderBody {
    address_id: AddressId,
    payment_method: PaymentMethod,
    coupon_code: Option<String>,
}

#[derive(Deserialize)]
struct PageParams {
    page: Option<u32>,
}

async fn place_order(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<PlaceOrderBody>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;

    let key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Some(key) = &key {
        inner.stats.idempotency_keys.push(key.clone());
        if let Some(order_id) = inner.idempotent_orders.get(key)
            && let Some((_, order)) = inner.orders.iter().find(|(_, o)| o.id == *order_id)
        {
            return Ok(ok(order));
        }
    }

    let address = inner
        .addresses
        .get(&user)
        .and_then(|list| list.iter().find(|a| a.id == body.address_id))
        .cloned()
        .ok_or_else(|| error(StatusCode::UNPROCESSABLE_ENTITY, "Unknown shipping address"))?;

    inner.stats.order_coupons.push(body.coupon_code.clone());
    if let Some(code) = body.coupon_code {
        inner.carts.entry(user).or_default().coupon = Some(code);
    }
    let cart = inner.cart(user);
    if cart.is_empty() {
        return Err(error(StatusCode::CONFLICT, "Cart is empty"));
    }

    let id = OrderId::new(inner.next_id());
    let order = Order {
        id,
        number: format!("MG-{}", 1000 + id.as_i64()),
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        payment_method: body.payment_method,
        items: cart
            .items
            .iter()
            .map(|item| OrderItem {
                product_id: item.product_id,
                sku_id: item.sku_id,
                name: item.name.clone(),
                sku_label: item.sku_label.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total,
            })
            .collect(),
        shipping_address: Some(address),
        coupon_code: cart.coupon.as_ref().map(|c| c.code.clone()),
        subtotal: cart.subtotal,
        discount: cart.discount,
        shipping: None,
        tax: None,
        total: cart.total,
        placed_at: Utc::now(),
    };

    inner.orders.push((user, order.clone()));
    inner.carts.remove(&user);
    if let Some(key) = key {
        inner.idempotent_orders.insert(key, id);
    }
    Ok((StatusCode::CREATED, Json(order)).into_response())
}

async fn list_orders(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    let items: Vec<OrderSummary> = inner
        .orders
        .iter()
        .rev()
        .filter(|(owner, _)| *owner == user)
        .map(|(_, o)| OrderSummary {
            id: o.id,
            number: o.number.clone(),
            status: o.status,
            total: o.total,
            item_count: o.items.iter().map(|i| i.quantity).sum(),
            placed_at: o.placed_at,
        })
        .collect();

    Ok(ok(&Page {
        total: items.len() as u64,
        items,
        page: params.page.unwrap_or(1),
        per_page: 20,
    }))
}

async fn get_order(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<OrderId>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    inner
        .orders
        .iter()
        .find(|(owner, o)| *owner == user && o.id == id)
        .map(|(_, o)| ok(o))
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Order not found"))
}

async fn cancel_order(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<OrderId>,
) -> Reply {
    let mut inner = lock(&state);
    let user = inner.authorize(&headers)?;
    inner.stats.cancel_calls += 1;

    let order = inner
        .orders
        .iter_mut()
        .find(|(owner, o)| *owner == user && o.id == id)
        .map(|(_, o)| o)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Order not found"))?;

    if !order.status.is_cancellable() {
        return Err(error(StatusCode::CONFLICT, "Order can no longer be cancelled"));
    }
    order.status = OrderStatus::Cancelled;
    Ok(ok(order))
}
