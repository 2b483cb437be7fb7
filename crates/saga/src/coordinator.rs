//! Cart-to-order saga coordinator.

use std::future::Future;
use std::time::Duration;

use common::{OrderId, UserId};
use domain::{
    CartError, CartLine, CartService, CartSnapshot, DraftLine, IntegrationEvent, Order,
    OrderCreatedEvent, OrderDraft, OrderItemCreatedEvent, OrderStore, StockError, StockLedger,
    StockUnit, exchanges,
};
use event_bus::Publisher;
use futures_util::future::join_all;

use crate::error::{CartAdjustment, CartFix, RemovalReason, Result, SagaError};

/// Upper bounds on collaborator calls.
///
/// The stock budget covers the whole read batch for a cart, not each
/// individual variation lookup.
#[derive(Debug, Clone, Copy)]
pub struct SagaTimeouts {
    pub cart: Duration,
    pub stock: Duration,
}

impl Default for SagaTimeouts {
    fn default() -> Self {
        Self {
            cart: Duration::from_secs(2),
            stock: Duration::from_secs(2),
        }
    }
}

/// What the saga decided to do with one cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinePlan {
    /// Orderable as-is, priced from the ledger.
    Keep { line: CartLine, unit: StockUnit },

    /// Cannot be fulfilled at all.
    Remove {
        line: CartLine,
        reason: RemovalReason,
    },

    /// Orderable only at a lower quantity.
    Reduce { line: CartLine, to: u32 },
}

fn plan_line(line: CartLine, unit: Option<StockUnit>) -> LinePlan {
    match unit {
        None => LinePlan::Remove {
            line,
            reason: RemovalReason::UnknownVariation,
        },
        Some(unit) if !unit.is_active => LinePlan::Remove {
            line,
            reason: RemovalReason::Inactive,
        },
        Some(unit) if unit.amount == 0 => LinePlan::Remove {
            line,
            reason: RemovalReason::OutOfStock,
        },
        Some(unit) if unit.amount < line.quantity => LinePlan::Reduce {
            line,
            to: unit.amount,
        },
        Some(unit) => LinePlan::Keep { line, unit },
    }
}

fn plan_lines(lines: &[CartLine], units: &[Option<StockUnit>]) -> Vec<LinePlan> {
    lines
        .iter()
        .zip(units)
        .map(|(line, unit)| plan_line(*line, *unit))
        .collect()
}

fn map_cart_error(err: CartError) -> SagaError {
    match err {
        CartError::VersionConflict {
            expected, actual, ..
        } => SagaError::CartChanged { expected, actual },
        CartError::Unavailable(reason) => SagaError::DependencyUnavailable {
            dependency: "cart",
            reason,
        },
        other => SagaError::DependencyUnavailable {
            dependency: "cart",
            reason: other.to_string(),
        },
    }
}

fn map_stock_error(err: StockError) -> SagaError {
    SagaError::DependencyUnavailable {
        dependency: "stock",
        reason: err.to_string(),
    }
}

/// Drives a cart through validation, fixing, commit and announcement.
///
/// The coordinator never under-fulfills: when stock cannot cover the
/// cart it corrects the cart and refuses the order, so the buyer always
/// confirms exactly what will be charged. The commit itself is a single
/// atomic store call; event publication happens after and never rolls
/// the order back.
pub struct OrderSagaCoordinator<C, L, O>
where
    C: CartService,
    L: StockLedger,
    O: OrderStore,
{
    cart: C,
    stock: L,
    orders: O,
    publisher: Publisher,
    timeouts: SagaTimeouts,
}

impl<C, L, O> OrderSagaCoordinator<C, L, O>
where
    C: CartService,
    L: StockLedger,
    O: OrderStore,
{
    /// Creates a coordinator with default timeouts.
    pub fn new(cart: C, stock: L, orders: O, publisher: Publisher) -> Self {
        Self::with_timeouts(cart, stock, orders, publisher, SagaTimeouts::default())
    }

    /// Creates a coordinator with explicit timeouts.
    pub fn with_timeouts(
        cart: C,
        stock: L,
        orders: O,
        publisher: Publisher,
        timeouts: SagaTimeouts,
    ) -> Self {
        Self {
            cart,
            stock,
            orders,
            publisher,
            timeouts,
        }
    }

    /// Turns the user's current cart into a committed order.
    #[tracing::instrument(skip(self))]
    pub async fn create_order_from_cart(&self, user_id: UserId) -> Result<Order> {
        metrics::counter!("saga_orders_total").increment(1);
        let saga_start = std::time::Instant::now();

        // 1. Snapshot the cart.
        let snapshot = self
            .bounded(
                "cart",
                self.timeouts.cart,
                self.cart.snapshot_for_user(user_id),
            )
            .await?
            .map_err(map_cart_error)?;
        let Some(snapshot) = snapshot else {
            return Err(SagaError::EmptyCart);
        };
        if snapshot.is_empty() {
            return Err(SagaError::EmptyCart);
        }

        // 2. Read stock for every line, concurrently, under one budget.
        let reads = join_all(
            snapshot
                .lines
                .iter()
                .map(|line| self.stock.variation_stock(line.variation_id)),
        );
        let units = self
            .bounded("stock", self.timeouts.stock, reads)
            .await?
            .into_iter()
            .collect::<std::result::Result<Vec<Option<StockUnit>>, StockError>>()
            .map_err(map_stock_error)?;

        let plans = plan_lines(&snapshot.lines, &units);

        // 3. Fix the cart, then refuse the order if anything changed.
        let adjustments = self.apply_fixes(&snapshot, &plans).await?;
        if !adjustments.is_empty() {
            metrics::counter!("saga_stock_conflicts").increment(1);
            tracing::info!(
                cart_id = %snapshot.cart_id,
                adjusted = adjustments.len(),
                "cart adjusted to available stock, order refused"
            );
            metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
            return Err(SagaError::StockConflict { adjustments });
        }

        // 4. Claim the snapshot version immediately before persist. Of
        //    any number of checkouts racing on one cart, exactly one
        //    claim succeeds; a mid-flight cart edit loses here too.
        let claim = self
            .bounded(
                "cart",
                self.timeouts.cart,
                self.cart.claim_version(snapshot.cart_id, snapshot.version),
            )
            .await?
            .map_err(map_cart_error);
        if let Err(err) = claim {
            if matches!(err, SagaError::CartChanged { .. }) {
                metrics::counter!("saga_cart_conflicts").increment(1);
                tracing::info!(
                    cart_id = %snapshot.cart_id,
                    "cart changed since snapshot, order refused"
                );
            }
            metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
            return Err(err);
        }

        // 5. Persist the order in a single atomic commit.
        let lines: Vec<DraftLine> = plans
            .into_iter()
            .filter_map(|plan| match plan {
                LinePlan::Keep { line, unit } => Some(DraftLine {
                    variation_id: line.variation_id,
                    product_id: unit.product_id,
                    shop_id: unit.shop_id,
                    quantity: line.quantity,
                    unit_price: unit.unit_price,
                }),
                _ => None,
            })
            .collect();
        let order = self
            .orders
            .insert_order(OrderDraft {
                user_id,
                cart_id: snapshot.cart_id,
                lines,
            })
            .await?;

        // 6. Announce the order. The commit is the source of truth, so
        //    a publish failure is logged and swallowed.
        self.publish_order_events(&order).await;

        let duration = saga_start.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);
        metrics::counter!("saga_orders_created").increment(1);
        tracing::info!(
            order_id = %order.order_id,
            items = order.items.len(),
            duration,
            "order created from cart"
        );

        Ok(order)
    }

    /// Applies removals and quantity reductions to the cart, chaining
    /// the bumped version across fixes. A version conflict here means
    /// the user edited the cart mid-flight; it aborts the fix pass.
    async fn apply_fixes(
        &self,
        snapshot: &CartSnapshot,
        plans: &[LinePlan],
    ) -> Result<Vec<CartAdjustment>> {
        let mut adjustments = Vec::new();
        let mut version = snapshot.version;

        for plan in plans {
            match *plan {
                LinePlan::Keep { .. } => {}
                LinePlan::Remove { line, reason } => {
                    version = self
                        .bounded(
                            "cart",
                            self.timeouts.cart,
                            self.cart
                                .remove_line(snapshot.cart_id, line.variation_id, version),
                        )
                        .await?
                        .map_err(map_cart_error)?;
                    tracing::debug!(
                        cart_id = %snapshot.cart_id,
                        variation_id = %line.variation_id,
                        %reason,
                        "cart line removed"
                    );
                    adjustments.push(CartAdjustment {
                        variation_id: line.variation_id,
                        fix: CartFix::Removed { reason },
                    });
                }
                LinePlan::Reduce { line, to } => {
                    version = self
                        .bounded(
                            "cart",
                            self.timeouts.cart,
                            self.cart.update_line_quantity(
                                snapshot.cart_id,
                                line.variation_id,
                                to,
                                version,
                            ),
                        )
                        .await?
                        .map_err(map_cart_error)?;
                    tracing::debug!(
                        cart_id = %snapshot.cart_id,
                        variation_id = %line.variation_id,
                        from = line.quantity,
                        to,
                        "cart line quantity reduced"
                    );
                    adjustments.push(CartAdjustment {
                        variation_id: line.variation_id,
                        fix: CartFix::QuantityReduced {
                            from: line.quantity,
                            to,
                        },
                    });
                }
            }
        }

        Ok(adjustments)
    }

    async fn publish_order_events(&self, order: &Order) {
        self.publish_event(order.order_id, &OrderCreatedEvent::from_order(order))
            .await;
        for item in &order.items {
            self.publish_event(
                order.order_id,
                &OrderItemCreatedEvent::from_item(order, item),
            )
            .await;
        }
    }

    async fn publish_event<E: IntegrationEvent>(&self, order_id: OrderId, event: &E) {
        match event.to_message() {
            Ok(message) => {
                if let Err(err) = self.publisher.publish(exchanges::ORDERS, message).await {
                    metrics::counter!("saga_publish_failures").increment(1);
                    tracing::warn!(
                        %order_id,
                        routing_key = event.routing_key(),
                        error = %err,
                        "event publish failed after commit"
                    );
                }
            }
            Err(err) => {
                metrics::counter!("saga_publish_failures").increment(1);
                tracing::warn!(
                    %order_id,
                    routing_key = event.routing_key(),
                    error = %err,
                    "event encode failed after commit"
                );
            }
        }
    }

    async fn bounded<T>(
        &self,
        dependency: &'static str,
        limit: Duration,
        fut: impl Future<Output = T>,
    ) -> Result<T> {
        tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| SagaError::DependencyUnavailable {
                dependency,
                reason: format!("timed out after {}ms", limit.as_millis()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ProductId, ShopId, VariationId};
    use domain::Money;

    fn line(quantity: u32) -> CartLine {
        CartLine {
            variation_id: VariationId::new(),
            quantity,
        }
    }

    fn unit_for(line: &CartLine, amount: u32, is_active: bool) -> StockUnit {
        StockUnit {
            variation_id: line.variation_id,
            product_id: ProductId::new(),
            shop_id: ShopId::new(),
            amount,
            amount_limit: 0,
            is_active,
            unit_price: Money::from_cents(700),
        }
    }

    #[test]
    fn missing_variation_is_removable() {
        let line = line(2);
        assert!(matches!(
            plan_line(line, None),
            LinePlan::Remove {
                reason: RemovalReason::UnknownVariation,
                ..
            }
        ));
    }

    #[test]
    fn inactive_product_is_removable() {
        let line = line(2);
        let unit = unit_for(&line, 10, false);
        assert!(matches!(
            plan_line(line, Some(unit)),
            LinePlan::Remove {
                reason: RemovalReason::Inactive,
                ..
            }
        ));
    }

    #[test]
    fn depleted_stock_is_removable_not_adjustable() {
        let line = line(2);
        let unit = unit_for(&line, 0, true);
        assert!(matches!(
            plan_line(line, Some(unit)),
            LinePlan::Remove {
                reason: RemovalReason::OutOfStock,
                ..
            }
        ));
    }

    #[test]
    fn short_stock_reduces_to_available_amount() {
        let line = line(5);
        let unit = unit_for(&line, 3, true);
        assert!(matches!(
            plan_line(line, Some(unit)),
            LinePlan::Reduce { to: 3, .. }
        ));
    }

    #[test]
    fn sufficient_stock_keeps_line_priced() {
        let line = line(3);
        let unit = unit_for(&line, 3, true);
        match plan_line(line, Some(unit)) {
            LinePlan::Keep { line: kept, unit } => {
                assert_eq!(kept.quantity, 3);
                assert_eq!(unit.unit_price.cents(), 700);
            }
            other => panic!("expected keep, got {other:?}"),
        }
    }

    #[test]
    fn plans_line_up_with_cart_order() {
        let lines = vec![line(1), line(2)];
        let units = vec![Some(unit_for(&lines[0], 5, true)), None];

        let plans = plan_lines(&lines, &units);
        assert!(matches!(plans[0], LinePlan::Keep { .. }));
        assert!(matches!(plans[1], LinePlan::Remove { .. }));
    }
}
