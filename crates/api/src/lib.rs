//! HTTP surface of the order platform.
//!
//! Exposes checkout, order reads, shop status updates and the staging
//! endpoints for carts and stock, with structured logging (tracing)
//! and Prometheus metrics. Identity arrives as gateway headers; this
//! crate wires the saga, the bus consumers and the shared state the
//! handlers run against.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use consumers::{ApprovalWatcher, CartClearer, ShopOrderMirror, StockReducer};
use domain::{
    CartService, InMemoryCartService, InMemoryOrderStore, InMemoryStockLedger, OrderStore,
    StockLedger,
};
use event_bus::{EventBus, InMemoryEventBus, Publisher};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{OrderSagaCoordinator, SagaTimeouts};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<C, L, O>(
    state: Arc<AppState<C, L, O>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    C: CartService + Clone + 'static,
    L: StockLedger + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<C, L, O>))
        .route("/orders", get(routes::orders::list::<C, L, O>))
        .route("/orders/{id}", get(routes::orders::get::<C, L, O>))
        .route(
            "/order-items/{id}/status",
            post(routes::order_items::update_status::<C, L, O>),
        )
        .route(
            "/shops/{shop_id}/order-items",
            get(routes::shops::order_items::<C, L, O>),
        )
        .route("/carts/lines", put(routes::carts::upsert_line::<C, L, O>))
        .route(
            "/stock/{variation_id}",
            put(routes::stock::upsert::<C, L, O>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the in-memory platform: bus, stores, saga and every consumer.
///
/// Returns the shared state the HTTP handlers run against, plus the
/// bus handle for observing published traffic and parked messages.
pub async fn create_default_state(
    timeouts: SagaTimeouts,
) -> event_bus::Result<(
    Arc<AppState<InMemoryCartService, InMemoryStockLedger, InMemoryOrderStore>>,
    Arc<InMemoryEventBus>,
)> {
    let bus = Arc::new(InMemoryEventBus::new());
    let publisher = Publisher::new(bus.clone());

    let cart = InMemoryCartService::new();
    let stock = InMemoryStockLedger::new();
    let orders = InMemoryOrderStore::new();
    let shop_mirror = ShopOrderMirror::new();

    bus.subscribe(
        StockReducer::<InMemoryStockLedger>::binding()?,
        Arc::new(StockReducer::new(stock.clone())),
    )
    .await?;
    bus.subscribe(
        CartClearer::<InMemoryCartService>::binding()?,
        Arc::new(CartClearer::new(cart.clone())),
    )
    .await?;
    bus.subscribe(ShopOrderMirror::binding()?, Arc::new(shop_mirror.clone()))
        .await?;
    bus.subscribe(
        ApprovalWatcher::<InMemoryOrderStore>::binding()?,
        Arc::new(ApprovalWatcher::new(orders.clone(), publisher.clone())),
    )
    .await?;

    let saga = OrderSagaCoordinator::with_timeouts(
        cart.clone(),
        stock.clone(),
        orders.clone(),
        publisher.clone(),
        timeouts,
    );

    let state = Arc::new(AppState {
        saga,
        cart,
        stock,
        orders,
        shop_mirror,
        publisher,
    });

    Ok((state, bus))
}
