//! Empties ordered lines out of the buyer's cart.

use async_trait::async_trait;
use domain::{CartError, CartService, OrderCreatedEvent, exchanges, routing_keys};
use event_bus::{BindingPattern, Delivery, HandlerError, MessageHandler, QueueBinding};

/// Consumes `order.created` and removes each ordered line from the cart.
///
/// Removal is delete-if-exists keyed by the cart line, so redelivery
/// converges on the same end state without a dedup record. Lines the
/// user added after checkout are left alone.
pub struct CartClearer<C: CartService> {
    cart: C,
}

impl<C: CartService> CartClearer<C> {
    /// Creates a clearer over the given cart collaborator.
    pub fn new(cart: C) -> Self {
        Self { cart }
    }

    /// The queue binding this consumer is subscribed with.
    pub fn binding() -> event_bus::Result<QueueBinding> {
        Ok(QueueBinding::new(
            exchanges::ORDERS,
            "cart-clearer",
            BindingPattern::parse(routing_keys::ORDER_CREATED)?,
        ))
    }
}

#[async_trait]
impl<C: CartService> MessageHandler for CartClearer<C> {
    fn name(&self) -> &'static str {
        "cart-clearer"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let event: OrderCreatedEvent = delivery.payload_as().map_err(HandlerError::fatal)?;

        let mut cleared = 0;
        for item in &event.items {
            match self
                .cart
                .clear_line(event.cart_id, item.product_variation_id)
                .await
            {
                Ok(true) => {
                    cleared += 1;
                    metrics::counter!("cart_lines_cleared").increment(1);
                }
                Ok(false) => {}
                Err(CartError::Unavailable(reason)) => {
                    return Err(HandlerError::Retryable(reason));
                }
                Err(err) => return Err(HandlerError::retryable(err)),
            }
        }

        tracing::debug!(
            order_id = %event.order_id,
            cart_id = %event.cart_id,
            cleared,
            "cart cleared after order"
        );
        Ok(())
    }
}
