//! PostgreSQL-backed stock ledger.

use async_trait::async_trait;
use common::{ProductId, ShopId, VariationId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::order::Money;
use crate::stock::{Decremented, LowStockAlert, StockError, StockLedger, StockResult, StockUnit};

/// PostgreSQL-backed stock ledger implementation.
#[derive(Clone)]
pub struct PostgresStockLedger {
    pool: PgPool,
}

impl PostgresStockLedger {
    /// Creates a new PostgreSQL stock ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the stock table if it does not exist yet.
    pub async fn ensure_schema(&self) -> StockResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stock_units (
                variation_id UUID PRIMARY KEY,
                product_id UUID NOT NULL,
                shop_id UUID NOT NULL,
                amount INTEGER NOT NULL CHECK (amount >= 0),
                amount_limit INTEGER NOT NULL,
                is_active BOOLEAN NOT NULL,
                unit_price_cents BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("stock schema ensured");
        Ok(())
    }

    fn row_to_unit(row: &PgRow) -> StockResult<StockUnit> {
        Ok(StockUnit {
            variation_id: VariationId::from_uuid(row.try_get::<Uuid, _>("variation_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            shop_id: ShopId::from_uuid(row.try_get::<Uuid, _>("shop_id")?),
            amount: row.try_get::<i32, _>("amount")? as u32,
            amount_limit: row.try_get::<i32, _>("amount_limit")? as u32,
            is_active: row.try_get("is_active")?,
            unit_price: Money::from_cents(row.try_get::<i64, _>("unit_price_cents")?),
        })
    }
}

#[async_trait]
impl StockLedger for PostgresStockLedger {
    async fn variation_stock(&self, variation_id: VariationId) -> StockResult<Option<StockUnit>> {
        let row = sqlx::query(
            r#"
            SELECT variation_id, product_id, shop_id, amount, amount_limit,
                   is_active, unit_price_cents
            FROM stock_units
            WHERE variation_id = $1
            "#,
        )
        .bind(variation_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_unit).transpose()
    }

    async fn upsert_unit(&self, unit: StockUnit) -> StockResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_units
                (variation_id, product_id, shop_id, amount, amount_limit,
                 is_active, unit_price_cents)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (variation_id) DO UPDATE SET
                product_id = EXCLUDED.product_id,
                shop_id = EXCLUDED.shop_id,
                amount = EXCLUDED.amount,
                amount_limit = EXCLUDED.amount_limit,
                is_active = EXCLUDED.is_active,
                unit_price_cents = EXCLUDED.unit_price_cents
            "#,
        )
        .bind(unit.variation_id.as_uuid())
        .bind(unit.product_id.as_uuid())
        .bind(unit.shop_id.as_uuid())
        .bind(unit.amount as i32)
        .bind(unit.amount_limit as i32)
        .bind(unit.is_active)
        .bind(unit.unit_price.cents())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn decrement(&self, variation_id: VariationId, quantity: u32) -> StockResult<u32> {
        // Conditional update keeps the check and the subtraction in one
        // atomic statement.
        let new_amount: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE stock_units
            SET amount = amount - $2
            WHERE variation_id = $1 AND amount >= $2
            RETURNING amount
            "#,
        )
        .bind(variation_id.as_uuid())
        .bind(quantity as i32)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(new_amount) = new_amount {
            return Ok(new_amount as u32);
        }

        // No row matched: either the variation is unknown or the amount
        // was too small. A follow-up read tells the two apart.
        let available: Option<i32> =
            sqlx::query_scalar("SELECT amount FROM stock_units WHERE variation_id = $1")
                .bind(variation_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match available {
            Some(available) => Err(StockError::Insufficient {
                variation_id,
                requested: quantity,
                available: available as u32,
            }),
            None => Err(StockError::UnknownVariation(variation_id)),
        }
    }

    async fn decrement_clamped(
        &self,
        variation_id: VariationId,
        quantity: u32,
    ) -> StockResult<Decremented> {
        let mut tx = self.pool.begin().await?;

        let available: Option<i32> =
            sqlx::query_scalar("SELECT amount FROM stock_units WHERE variation_id = $1 FOR UPDATE")
                .bind(variation_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let available = available.ok_or(StockError::UnknownVariation(variation_id))? as u32;

        let shortfall = quantity.saturating_sub(available);
        let new_amount = available.saturating_sub(quantity);

        sqlx::query("UPDATE stock_units SET amount = $2 WHERE variation_id = $1")
            .bind(variation_id.as_uuid())
            .bind(new_amount as i32)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Decremented {
            new_amount,
            shortfall,
        })
    }

    async fn scan_low_stock(&self) -> StockResult<Vec<LowStockAlert>> {
        let rows = sqlx::query(
            r#"
            SELECT variation_id, product_id, shop_id, amount, amount_limit,
                   is_active, unit_price_cents
            FROM stock_units
            WHERE is_active AND amount <= amount_limit
            ORDER BY amount ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let unit = Self::row_to_unit(row)?;
                Ok(LowStockAlert {
                    variation_id: unit.variation_id,
                    product_id: unit.product_id,
                    shop_id: unit.shop_id,
                    amount: unit.amount,
                    amount_limit: unit.amount_limit,
                })
            })
            .collect()
    }
}
