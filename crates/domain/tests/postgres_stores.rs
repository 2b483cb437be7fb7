//! PostgreSQL integration tests for the order store and stock ledger.
//!
//! These tests share one PostgreSQL container and isolate themselves by
//! truncating tables, so they are marked `#[serial]`. Run with:
//!
//! ```bash
//! cargo test -p domain --test postgres_stores
//! ```

use std::sync::Arc;

use common::{ProductId, ShopId, UserId, VariationId};
use domain::{
    DomainError, DraftLine, Money, OrderDraft, OrderItemStatus, OrderStore, PostgresOrderStore,
    PostgresStockLedger, StockError, StockLedger, StockUnit,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create the schema once; the per-test helpers only truncate.
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresOrderStore::new(temp_pool.clone())
                .ensure_schema()
                .await
                .unwrap();
            PostgresStockLedger::new(temp_pool.clone())
                .ensure_schema()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_pool() -> PgPool {
    let info = get_container_info().await;
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap()
}

/// Get a fresh order store with cleared tables
async fn get_order_store() -> PostgresOrderStore {
    let pool = get_pool().await;
    sqlx::query("TRUNCATE TABLE order_items, orders")
        .execute(&pool)
        .await
        .unwrap();
    PostgresOrderStore::new(pool)
}

/// Get a fresh stock ledger with a cleared table
async fn get_stock_ledger() -> PostgresStockLedger {
    let pool = get_pool().await;
    sqlx::query("TRUNCATE TABLE stock_units")
        .execute(&pool)
        .await
        .unwrap();
    PostgresStockLedger::new(pool)
}

fn draft_line(quantity: u32, cents: i64) -> DraftLine {
    DraftLine {
        variation_id: VariationId::new(),
        product_id: ProductId::new(),
        shop_id: ShopId::new(),
        quantity,
        unit_price: Money::from_cents(cents),
    }
}

fn stock_unit(amount: u32, amount_limit: u32) -> StockUnit {
    StockUnit {
        variation_id: VariationId::new(),
        product_id: ProductId::new(),
        shop_id: ShopId::new(),
        amount,
        amount_limit,
        is_active: true,
        unit_price: Money::from_cents(999),
    }
}

mod order_store {
    use super::*;

    #[tokio::test]
    #[serial]
    async fn insert_and_fetch_order() {
        let store = get_order_store().await;

        let draft = OrderDraft {
            user_id: UserId::new(),
            cart_id: common::CartId::new(),
            lines: vec![draft_line(2, 1000), draft_line(1, 550)],
        };
        let user_id = draft.user_id;

        let order = store.insert_order(draft).await.unwrap();
        assert_eq!(order.items.len(), 2);
        assert!(!order.approved);
        assert!(
            order
                .items
                .iter()
                .all(|i| i.status == OrderItemStatus::Processing)
        );
        assert_eq!(order.total().cents(), 2550);

        let fetched = store.get_order(order.order_id).await.unwrap().unwrap();
        assert_eq!(fetched, order);
        assert_eq!(fetched.user_id, user_id);
        // Line order survives the round trip.
        assert_eq!(fetched.items[0].quantity, 2);
        assert_eq!(fetched.items[1].quantity, 1);
    }

    #[tokio::test]
    #[serial]
    async fn insert_rejects_empty_draft() {
        let store = get_order_store().await;

        let draft = OrderDraft {
            user_id: UserId::new(),
            cart_id: common::CartId::new(),
            lines: Vec::new(),
        };

        let err = store.insert_order(draft).await.unwrap_err();
        assert!(matches!(err, DomainError::NoItems));
    }

    #[tokio::test]
    #[serial]
    async fn get_order_for_item_resolves_parent() {
        let store = get_order_store().await;

        let order = store
            .insert_order(OrderDraft {
                user_id: UserId::new(),
                cart_id: common::CartId::new(),
                lines: vec![draft_line(1, 100)],
            })
            .await
            .unwrap();
        let item_id = order.items[0].order_item_id;

        let found = store.get_order_for_item(item_id).await.unwrap().unwrap();
        assert_eq!(found.order_id, order.order_id);

        let missing = store
            .get_order_for_item(common::OrderItemId::new())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    #[serial]
    async fn status_updates_move_forward_only() {
        let store = get_order_store().await;

        let order = store
            .insert_order(OrderDraft {
                user_id: UserId::new(),
                cart_id: common::CartId::new(),
                lines: vec![draft_line(1, 100)],
            })
            .await
            .unwrap();
        let item_id = order.items[0].order_item_id;

        let update = store
            .update_item_status(item_id, OrderItemStatus::Shipped)
            .await
            .unwrap();
        assert!(update.changed);
        assert_eq!(update.order.items[0].status, OrderItemStatus::Shipped);

        // Re-applying the same status is a no-op, not an error.
        let update = store
            .update_item_status(item_id, OrderItemStatus::Shipped)
            .await
            .unwrap();
        assert!(!update.changed);

        let err = store
            .update_item_status(item_id, OrderItemStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStatusTransition { .. }));

        // The rejected update left the row alone.
        let fetched = store.get_order(order.order_id).await.unwrap().unwrap();
        assert_eq!(fetched.items[0].status, OrderItemStatus::Shipped);
    }

    #[tokio::test]
    #[serial]
    async fn set_approved_is_one_way() {
        let store = get_order_store().await;

        let order = store
            .insert_order(OrderDraft {
                user_id: UserId::new(),
                cart_id: common::CartId::new(),
                lines: vec![draft_line(1, 100)],
            })
            .await
            .unwrap();

        assert!(store.set_approved(order.order_id).await.unwrap());
        assert!(!store.set_approved(order.order_id).await.unwrap());
        assert!(store.get_order(order.order_id).await.unwrap().unwrap().approved);

        let err = store.set_approved(common::OrderId::new()).await.unwrap_err();
        assert!(matches!(err, DomainError::OrderNotFound(_)));
    }

    #[tokio::test]
    #[serial]
    async fn orders_for_user_newest_first() {
        let store = get_order_store().await;
        let user_id = UserId::new();

        let first = store
            .insert_order(OrderDraft {
                user_id,
                cart_id: common::CartId::new(),
                lines: vec![draft_line(1, 100)],
            })
            .await
            .unwrap();
        let second = store
            .insert_order(OrderDraft {
                user_id,
                cart_id: common::CartId::new(),
                lines: vec![draft_line(2, 200)],
            })
            .await
            .unwrap();
        // Another user's order must not leak in.
        store
            .insert_order(OrderDraft {
                user_id: UserId::new(),
                cart_id: common::CartId::new(),
                lines: vec![draft_line(3, 300)],
            })
            .await
            .unwrap();

        let orders = store.orders_for_user(user_id).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].order_id, second.order_id);
        assert_eq!(orders[1].order_id, first.order_id);
        assert_eq!(orders[1].items.len(), 1);
    }
}

mod stock_ledger {
    use super::*;

    #[tokio::test]
    #[serial]
    async fn upsert_and_read_unit() {
        let ledger = get_stock_ledger().await;
        let mut unit = stock_unit(7, 2);

        ledger.upsert_unit(unit).await.unwrap();
        let stored = ledger
            .variation_stock(unit.variation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, unit);

        unit.amount = 3;
        unit.is_active = false;
        ledger.upsert_unit(unit).await.unwrap();
        let stored = ledger
            .variation_stock(unit.variation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.amount, 3);
        assert!(!stored.is_active);
    }

    #[tokio::test]
    #[serial]
    async fn strict_decrement_refuses_oversell() {
        let ledger = get_stock_ledger().await;
        let unit = stock_unit(5, 0);
        ledger.upsert_unit(unit).await.unwrap();

        assert_eq!(ledger.decrement(unit.variation_id, 3).await.unwrap(), 2);

        let err = ledger.decrement(unit.variation_id, 3).await.unwrap_err();
        match err {
            StockError::Insufficient {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 3);
                assert_eq!(available, 2);
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }

        let err = ledger.decrement(VariationId::new(), 1).await.unwrap_err();
        assert!(matches!(err, StockError::UnknownVariation(_)));
    }

    #[tokio::test]
    #[serial]
    async fn clamped_decrement_floors_at_zero() {
        let ledger = get_stock_ledger().await;
        let unit = stock_unit(2, 0);
        ledger.upsert_unit(unit).await.unwrap();

        let outcome = ledger
            .decrement_clamped(unit.variation_id, 5)
            .await
            .unwrap();
        assert_eq!(outcome.new_amount, 0);
        assert_eq!(outcome.shortfall, 3);

        let stored = ledger
            .variation_stock(unit.variation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.amount, 0);
    }

    #[tokio::test]
    #[serial]
    async fn concurrent_decrements_never_lose_updates() {
        let ledger = get_stock_ledger().await;
        let unit = stock_unit(10, 0);
        ledger.upsert_unit(unit).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let ledger = ledger.clone();
            let variation_id = unit.variation_id;
            handles.push(tokio::spawn(async move {
                ledger.decrement(variation_id, 1).await.is_ok()
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 10);
        let stored = ledger
            .variation_stock(unit.variation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.amount, 0);
    }

    #[tokio::test]
    #[serial]
    async fn low_stock_scan_reports_depleted_active_units() {
        let ledger = get_stock_ledger().await;

        let low = stock_unit(1, 3);
        let healthy = stock_unit(10, 3);
        let inactive = StockUnit {
            is_active: false,
            ..stock_unit(0, 3)
        };
        ledger.upsert_unit(low).await.unwrap();
        ledger.upsert_unit(healthy).await.unwrap();
        ledger.upsert_unit(inactive).await.unwrap();

        let alerts = ledger.scan_low_stock().await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].variation_id, low.variation_id);
        assert_eq!(alerts[0].amount_limit, 3);
    }
}
