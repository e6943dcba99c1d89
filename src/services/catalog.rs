use crate::{entities::product, errors::ServiceError, models::money};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Current catalog data for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: i32,
    pub name: String,
    pub unit_price: Decimal,
}

/// Read-only access to the product catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Returns the product with its current price, or `None` if it does not
    /// exist or is no longer sold.
    async fn get_product(&self, product_id: i32) -> Result<Option<CatalogProduct>, ServiceError>;
}

/// Catalog backed by the `products` table.
#[derive(Clone)]
pub struct DbCatalog {
    db: Arc<DatabaseConnection>,
}

impl DbCatalog {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Catalog for DbCatalog {
    async fn get_product(&self, product_id: i32) -> Result<Option<CatalogProduct>, ServiceError> {
        let found = product::Entity::find_by_id(product_id)
            .filter(product::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?;

        Ok(found.map(|p| CatalogProduct {
            id: p.id,
            unit_price: money::from_minor_units(p.price_minor),
            name: p.name,
        }))
    }
}

/// Fixed in-memory catalog.
#[derive(Clone, Default)]
pub struct StaticCatalog {
    products: HashMap<i32, CatalogProduct>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_product(mut self, id: i32, name: &str, unit_price: Decimal) -> Self {
        self.products.insert(
            id,
            CatalogProduct {
                id,
                name: name.to_string(),
                unit_price,
            },
        );
        self
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn get_product(&self, product_id: i32) -> Result<Option<CatalogProduct>, ServiceError> {
        Ok(self.products.get(&product_id).cloned())
    }
}
