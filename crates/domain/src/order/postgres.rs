//! PostgreSQL-backed order store.

use async_trait::async_trait;
use chrono::Utc;
use common::{CartId, OrderId, OrderItemId, ProductId, ShopId, UserId, VariationId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::order::{Money, Order, OrderDraft, OrderItem, OrderItemStatus, OrderStore, StatusUpdate};
use crate::{DomainError, Result};

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the order tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id UUID PRIMARY KEY,
                user_id UUID NOT NULL,
                cart_id UUID NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                approved BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS order_items (
                id UUID PRIMARY KEY,
                order_id UUID NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
                variation_id UUID NOT NULL,
                product_id UUID NOT NULL,
                shop_id UUID NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                unit_price_cents BIGINT NOT NULL,
                status TEXT NOT NULL,
                position INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items (order_id, position)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_orders_user ON orders (user_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("order schema ensured");
        Ok(())
    }

    fn row_to_item(row: &PgRow) -> Result<OrderItem> {
        let status_raw: String = row.try_get("status")?;
        let status = OrderItemStatus::parse(&status_raw)
            .ok_or_else(|| DomainError::InvalidStatus(status_raw))?;

        Ok(OrderItem {
            order_item_id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            variation_id: VariationId::from_uuid(row.try_get::<Uuid, _>("variation_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            shop_id: ShopId::from_uuid(row.try_get::<Uuid, _>("shop_id")?),
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            unit_price: Money::from_cents(row.try_get::<i64, _>("unit_price_cents")?),
            status,
        })
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        Ok(Order {
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
            created_at: row.try_get("created_at")?,
            approved: row.try_get("approved")?,
            items,
        })
    }

    async fn items_for_order(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, variation_id, product_id, shop_id,
                   quantity, unit_price_cents, status, position
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert_order(&self, draft: OrderDraft) -> Result<Order> {
        if draft.lines.is_empty() {
            return Err(DomainError::NoItems);
        }

        let order_id = OrderId::new();
        let created_at = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, cart_id, created_at, approved)
            VALUES ($1, $2, $3, $4, FALSE)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(draft.user_id.as_uuid())
        .bind(draft.cart_id.as_uuid())
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(draft.lines.len());
        for (position, line) in draft.lines.into_iter().enumerate() {
            let item = OrderItem {
                order_item_id: OrderItemId::new(),
                order_id,
                variation_id: line.variation_id,
                product_id: line.product_id,
                shop_id: line.shop_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                status: OrderItemStatus::Processing,
            };

            sqlx::query(
                r#"
                INSERT INTO order_items
                    (id, order_id, variation_id, product_id, shop_id,
                     quantity, unit_price_cents, status, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.order_item_id.as_uuid())
            .bind(order_id.as_uuid())
            .bind(item.variation_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(item.shop_id.as_uuid())
            .bind(item.quantity as i32)
            .bind(item.unit_price.cents())
            .bind(item.status.as_str())
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;

            items.push(item);
        }

        tx.commit().await?;
        metrics::counter!("orders_persisted").increment(1);

        Ok(Order {
            order_id,
            user_id: draft.user_id,
            cart_id: draft.cart_id,
            created_at,
            approved: false,
            items,
        })
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, user_id, cart_id, created_at, approved FROM orders WHERE id = $1",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let items = self.items_for_order(order_id).await?;
                Ok(Some(Self::row_to_order(&row, items)?))
            }
            None => Ok(None),
        }
    }

    async fn get_order_for_item(&self, order_item_id: OrderItemId) -> Result<Option<Order>> {
        let order_id: Option<Uuid> =
            sqlx::query_scalar("SELECT order_id FROM order_items WHERE id = $1")
                .bind(order_item_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match order_id {
            Some(order_id) => self.get_order(OrderId::from_uuid(order_id)).await,
            None => Ok(None),
        }
    }

    async fn update_item_status(
        &self,
        order_item_id: OrderItemId,
        status: OrderItemStatus,
    ) -> Result<StatusUpdate> {
        let mut tx = self.pool.begin().await?;

        // Lock the row so concurrent updates serialize on the current
        // status instead of racing past the state machine.
        let row = sqlx::query("SELECT order_id, status FROM order_items WHERE id = $1 FOR UPDATE")
            .bind(order_item_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DomainError::OrderItemNotFound(order_item_id))?;

        let order_id = OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?);
        let current_raw: String = row.try_get("status")?;
        let current = OrderItemStatus::parse(&current_raw)
            .ok_or_else(|| DomainError::InvalidStatus(current_raw))?;

        if current == status {
            tx.commit().await?;
            let order = self
                .get_order(order_id)
                .await?
                .ok_or(DomainError::OrderNotFound(order_id))?;
            return Ok(StatusUpdate {
                order,
                changed: false,
            });
        }

        if !current.can_transition_to(status) {
            return Err(DomainError::InvalidStatusTransition {
                order_item_id,
                from: current,
                to: status,
            });
        }

        sqlx::query("UPDATE order_items SET status = $2 WHERE id = $1")
            .bind(order_item_id.as_uuid())
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let order = self
            .get_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;
        Ok(StatusUpdate {
            order,
            changed: true,
        })
    }

    async fn set_approved(&self, order_id: OrderId) -> Result<bool> {
        let result =
            sqlx::query("UPDATE orders SET approved = TRUE WHERE id = $1 AND approved = FALSE")
                .bind(order_id.as_uuid())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)")
            .bind(order_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(false)
        } else {
            Err(DomainError::OrderNotFound(order_id))
        }
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let order_rows = sqlx::query(
            r#"
            SELECT id, user_id, cart_id, created_at, approved
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let order_ids: Vec<Uuid> = order_rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()?;

        let item_rows = sqlx::query(
            r#"
            SELECT id, order_id, variation_id, product_id, shop_id,
                   quantity, unit_price_cents, status, position
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY position ASC
            "#,
        )
        .bind(&order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items_by_order: std::collections::HashMap<OrderId, Vec<OrderItem>> =
            std::collections::HashMap::new();
        for row in &item_rows {
            let item = Self::row_to_item(row)?;
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        order_rows
            .iter()
            .map(|row| {
                let order_id = OrderId::from_uuid(row.try_get::<Uuid, _>("id")?);
                let items = items_by_order.remove(&order_id).unwrap_or_default();
                Self::row_to_order(row, items)
            })
            .collect()
    }
}
