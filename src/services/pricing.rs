use crate::{
    errors::{CheckoutError, ServiceError},
    models::money,
    services::catalog::Catalog,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("Product {0} not found")]
    ProductNotFound(i32),

    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: i32, quantity: i32 },

    #[error("Product {product_id} has an invalid catalog price")]
    InvalidPrice { product_id: i32 },

    #[error("No lines to price")]
    Empty,

    #[error("Order total is out of range")]
    Overflow,

    #[error("Catalog lookup failed: {0}")]
    Catalog(#[from] ServiceError),
}

impl From<PricingError> for CheckoutError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::Catalog(ServiceError::DatabaseError(db)) => CheckoutError::DatabaseError(db),
            PricingError::Catalog(other) => CheckoutError::InvalidCart(other.to_string()),
            other => CheckoutError::InvalidCart(other.to_string()),
        }
    }
}

/// A `(product, quantity)` pair to be priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: i32,
    pub quantity: i32,
}

/// A line priced from the catalog at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLine {
    pub product_id: i32,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl ResolvedLine {
    pub fn unit_price_minor(&self) -> Option<i64> {
        money::to_minor_units(self.unit_price)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedCart {
    pub lines: Vec<ResolvedLine>,
    pub total: Decimal,
    pub total_minor: i64,
}

/// Merges lines for the same product, keeping first-seen order.
pub fn merge_lines(lines: &[LineRequest]) -> Result<Vec<LineRequest>, PricingError> {
    let mut merged: Vec<LineRequest> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity < 1 {
            return Err(PricingError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            });
        }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(line.quantity).ok_or(
                    PricingError::InvalidQuantity {
                        product_id: line.product_id,
                        quantity: line.quantity,
                    },
                )?;
            }
            None => merged.push(*line),
        }
    }
    Ok(merged)
}

/// Sum of already-rounded line totals.
pub fn order_total(lines: &[ResolvedLine]) -> Result<Decimal, PricingError> {
    lines.iter().try_fold(Decimal::ZERO, |acc, line| {
        acc.checked_add(line.line_total).ok_or(PricingError::Overflow)
    })
}

/// Prices lines against the catalog. Client-supplied prices never reach it.
#[derive(Clone)]
pub struct PricingResolver {
    catalog: Arc<dyn Catalog>,
}

impl PricingResolver {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Resolves authoritative prices for `lines` and computes the total.
    ///
    /// Unit prices are rounded to the minor unit (midpoint to even) and every
    /// line total is rounded again before summation, so the total always
    /// equals the sum of `unit_price * quantity` over the stored lines.
    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    pub async fn resolve(&self, lines: &[LineRequest]) -> Result<PricedCart, PricingError> {
        let merged = merge_lines(lines)?;
        if merged.is_empty() {
            return Err(PricingError::Empty);
        }

        let mut resolved = Vec::with_capacity(merged.len());
        for line in merged {
            let product = self
                .catalog
                .get_product(line.product_id)
                .await?
                .ok_or(PricingError::ProductNotFound(line.product_id))?;

            if product.unit_price.is_sign_negative() {
                return Err(PricingError::InvalidPrice {
                    product_id: line.product_id,
                });
            }

            let unit_price = money::round_to_minor(product.unit_price);
            let line_total = unit_price
                .checked_mul(Decimal::from(line.quantity))
                .map(money::round_to_minor)
                .ok_or(PricingError::Overflow)?;

            resolved.push(ResolvedLine {
                product_id: line.product_id,
                name: product.name,
                quantity: line.quantity,
                unit_price,
                line_total,
            });
        }

        let total = order_total(&resolved)?;
        let total_minor = money::to_minor_units(total).ok_or(PricingError::Overflow)?;
        debug!(%total, total_minor, "Priced lines");

        Ok(PricedCart {
            lines: resolved,
            total,
            total_minor,
        })
    }
}
