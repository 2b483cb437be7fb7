//! In-memory cart service.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{CartId, UserId, VariationId};

use crate::cart::{CartError, CartLine, CartResult, CartService, CartSnapshot, CartVersion};

#[derive(Debug, Default)]
struct InMemoryCartState {
    carts: HashMap<CartId, CartSnapshot>,
    user_index: HashMap<UserId, CartId>,
    outage: bool,
}

/// In-memory cart service for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartService {
    state: Arc<RwLock<InMemoryCartState>>,
}

impl InMemoryCartService {
    /// Creates a new empty in-memory cart service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the cart service being unreachable.
    pub fn set_outage(&self, outage: bool) {
        self.state.write().unwrap().outage = outage;
    }

    /// Seeds a fresh cart for a user, replacing any existing one.
    pub fn seed(&self, user_id: UserId, lines: Vec<CartLine>) -> CartSnapshot {
        let mut state = self.state.write().unwrap();
        if let Some(old) = state.user_index.remove(&user_id) {
            state.carts.remove(&old);
        }
        let snapshot = CartSnapshot {
            cart_id: CartId::new(),
            user_id,
            version: CartVersion::initial(),
            lines,
        };
        state.user_index.insert(user_id, snapshot.cart_id);
        state.carts.insert(snapshot.cart_id, snapshot.clone());
        snapshot
    }

    fn check_outage(state: &InMemoryCartState) -> CartResult<()> {
        if state.outage {
            return Err(CartError::Unavailable(
                "simulated cart service outage".to_string(),
            ));
        }
        Ok(())
    }

    fn checked_cart<'a>(
        state: &'a mut InMemoryCartState,
        cart_id: CartId,
        expected: CartVersion,
    ) -> CartResult<&'a mut CartSnapshot> {
        let cart = state
            .carts
            .get_mut(&cart_id)
            .ok_or(CartError::NotFound(cart_id))?;
        if cart.version != expected {
            return Err(CartError::VersionConflict {
                cart_id,
                expected,
                actual: cart.version,
            });
        }
        Ok(cart)
    }
}

#[async_trait]
impl CartService for InMemoryCartService {
    async fn snapshot_for_user(&self, user_id: UserId) -> CartResult<Option<CartSnapshot>> {
        let state = self.state.read().unwrap();
        Self::check_outage(&state)?;
        Ok(state
            .user_index
            .get(&user_id)
            .and_then(|cart_id| state.carts.get(cart_id))
            .cloned())
    }

    async fn upsert_line(
        &self,
        user_id: UserId,
        variation_id: VariationId,
        quantity: u32,
    ) -> CartResult<CartSnapshot> {
        let mut state = self.state.write().unwrap();
        Self::check_outage(&state)?;

        let cart_id = match state.user_index.get(&user_id) {
            Some(cart_id) => *cart_id,
            None => {
                let cart_id = CartId::new();
                state.user_index.insert(user_id, cart_id);
                state.carts.insert(
                    cart_id,
                    CartSnapshot {
                        cart_id,
                        user_id,
                        version: CartVersion::initial(),
                        lines: Vec::new(),
                    },
                );
                cart_id
            }
        };

        let cart = state
            .carts
            .get_mut(&cart_id)
            .ok_or(CartError::NotFound(cart_id))?;

        if quantity == 0 {
            cart.lines.retain(|l| l.variation_id != variation_id);
        } else if let Some(line) = cart.lines.iter_mut().find(|l| l.variation_id == variation_id) {
            line.quantity = quantity;
        } else {
            cart.lines.push(CartLine {
                variation_id,
                quantity,
            });
        }
        cart.version = cart.version.next();
        tracing::debug!(
            cart_id = %cart_id,
            variation_id = %variation_id,
            quantity,
            version = %cart.version,
            "cart line upserted"
        );
        Ok(cart.clone())
    }

    async fn update_line_quantity(
        &self,
        cart_id: CartId,
        variation_id: VariationId,
        quantity: u32,
        expected: CartVersion,
    ) -> CartResult<CartVersion> {
        let mut state = self.state.write().unwrap();
        Self::check_outage(&state)?;

        let cart = Self::checked_cart(&mut state, cart_id, expected)?;
        if cart.line(variation_id).is_none() {
            return Err(CartError::LineNotFound {
                cart_id,
                variation_id,
            });
        }

        if quantity == 0 {
            cart.lines.retain(|l| l.variation_id != variation_id);
        } else if let Some(line) = cart.lines.iter_mut().find(|l| l.variation_id == variation_id) {
            line.quantity = quantity;
        }
        cart.version = cart.version.next();
        Ok(cart.version)
    }

    async fn remove_line(
        &self,
        cart_id: CartId,
        variation_id: VariationId,
        expected: CartVersion,
    ) -> CartResult<CartVersion> {
        let mut state = self.state.write().unwrap();
        Self::check_outage(&state)?;

        let cart = Self::checked_cart(&mut state, cart_id, expected)?;
        if cart.line(variation_id).is_none() {
            return Err(CartError::LineNotFound {
                cart_id,
                variation_id,
            });
        }

        cart.lines.retain(|l| l.variation_id != variation_id);
        cart.version = cart.version.next();
        Ok(cart.version)
    }

    async fn claim_version(
        &self,
        cart_id: CartId,
        expected: CartVersion,
    ) -> CartResult<CartVersion> {
        let mut state = self.state.write().unwrap();
        Self::check_outage(&state)?;

        let cart = Self::checked_cart(&mut state, cart_id, expected)?;
        cart.version = cart.version.next();
        Ok(cart.version)
    }

    async fn clear_line(&self, cart_id: CartId, variation_id: VariationId) -> CartResult<bool> {
        let mut state = self.state.write().unwrap();
        Self::check_outage(&state)?;

        let Some(cart) = state.carts.get_mut(&cart_id) else {
            return Ok(false);
        };
        if cart.line(variation_id).is_none() {
            return Ok(false);
        }

        cart.lines.retain(|l| l.variation_id != variation_id);
        cart.version = cart.version.next();
        tracing::debug!(
            cart_id = %cart_id,
            variation_id = %variation_id,
            "cart line cleared"
        );
        Ok(true)
    }
}
