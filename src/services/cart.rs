use crate::{
    entities::cart_line,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{money, Identity},
    services::catalog::Catalog,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument};

/// Per-identity mutual exclusion for cart mutation and checkout.
///
/// Different identities never contend; two operations on the same identity
/// run one after the other. An entry lives only while someone holds or
/// waits on it.
#[derive(Clone, Default)]
pub struct IdentityLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held lock on one key. Releasing the last holder removes the map entry.
pub struct IdentityGuard {
    key: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own reference left: nobody holds or waits.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, identity: &Identity) -> IdentityGuard {
        self.lock_key(&identity.owner_key()).await
    }

    pub async fn lock_key(&self, key: &str) -> IdentityGuard {
        let mutex = self
            .inner
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        IdentityGuard {
            key: key.to_string(),
            locks: self.inner.clone(),
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Cart store keyed by [`Identity`].
///
/// Invariant: at most one line per `(identity, product)`; adding an existing
/// product increments its quantity. Backed by a unique index so concurrent
/// writers outside this process surface as `Conflict`.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    catalog: Arc<dyn Catalog>,
    locks: IdentityLocks,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        catalog: Arc<dyn Catalog>,
        locks: IdentityLocks,
    ) -> Self {
        Self {
            db,
            event_sender,
            catalog,
            locks,
        }
    }

    /// Adds `quantity` of a product, merging into an existing line.
    ///
    /// The current catalog price is captured on the line for display only;
    /// checkout always re-prices.
    #[instrument(skip(self, identity), fields(identity = %identity))]
    pub async fn add(
        &self,
        identity: &Identity,
        product_id: i32,
        quantity: i32,
    ) -> Result<cart_line::Model, ServiceError> {
        check_quantity(quantity)?;
        identity.validate().map_err(ServiceError::ValidationError)?;

        let product = self
            .catalog
            .get_product(product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        let unit_price_minor = money::to_minor_units(product.unit_price).ok_or_else(|| {
            ServiceError::InvalidInput(format!("Product {} has an invalid price", product_id))
        })?;

        let _guard = self.locks.lock(identity).await;
        let owner_key = identity.owner_key();
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let existing = cart_line::Entity::find()
            .filter(cart_line::Column::OwnerKey.eq(owner_key.as_str()))
            .filter(cart_line::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        let line = match existing {
            Some(line) => {
                let new_quantity = line
                    .quantity
                    .checked_add(quantity)
                    .ok_or(ServiceError::InvalidQuantity(quantity))?;
                let mut line: cart_line::ActiveModel = line.into();
                line.quantity = Set(new_quantity);
                line.unit_price_minor = Set(unit_price_minor);
                line.updated_at = Set(now);
                line.update(&txn).await?
            }
            None => cart_line::ActiveModel {
                owner_key: Set(owner_key.clone()),
                user_id: Set(identity.user_id()),
                guest_token: Set(identity.guest_token().map(str::to_string)),
                product_id: Set(product_id),
                quantity: Set(quantity),
                unit_price_minor: Set(unit_price_minor),
                added_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(|e| conflict(e, &owner_key, product_id))?,
        };

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartLineAdded {
                owner_key,
                product_id,
                quantity,
            })
            .await;

        info!(product_id, quantity = line.quantity, "Added to cart");
        Ok(line)
    }

    /// Replaces the quantity of an existing line.
    #[instrument(skip(self, identity), fields(identity = %identity))]
    pub async fn set_quantity(
        &self,
        identity: &Identity,
        product_id: i32,
        quantity: i32,
    ) -> Result<cart_line::Model, ServiceError> {
        check_quantity(quantity)?;

        let _guard = self.locks.lock(identity).await;
        let owner_key = identity.owner_key();

        let line = cart_line::Entity::find()
            .filter(cart_line::Column::OwnerKey.eq(owner_key.as_str()))
            .filter(cart_line::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| not_in_cart(product_id))?;

        let mut line: cart_line::ActiveModel = line.into();
        line.quantity = Set(quantity);
        line.updated_at = Set(Utc::now());
        let line = line.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartLineUpdated {
                owner_key,
                product_id,
                quantity,
            })
            .await;

        info!(product_id, quantity, "Updated cart line");
        Ok(line)
    }

    #[instrument(skip(self, identity), fields(identity = %identity))]
    pub async fn remove(&self, identity: &Identity, product_id: i32) -> Result<(), ServiceError> {
        let _guard = self.locks.lock(identity).await;
        let owner_key = identity.owner_key();

        let result = cart_line::Entity::delete_many()
            .filter(cart_line::Column::OwnerKey.eq(owner_key.as_str()))
            .filter(cart_line::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(not_in_cart(product_id));
        }

        self.event_sender
            .send_or_log(Event::CartLineRemoved {
                owner_key,
                product_id,
            })
            .await;

        info!(product_id, "Removed cart line");
        Ok(())
    }

    /// Lines in the order they were first added.
    pub async fn list(&self, identity: &Identity) -> Result<Vec<cart_line::Model>, ServiceError> {
        Ok(lines_of(&*self.db, identity).await?)
    }

    /// Removes every line of `identity` in a single statement.
    #[instrument(skip(self, identity), fields(identity = %identity))]
    pub async fn clear(&self, identity: &Identity) -> Result<u64, ServiceError> {
        let _guard = self.locks.lock(identity).await;
        let removed = clear_lines(&*self.db, identity).await?;

        self.event_sender
            .send_or_log(Event::CartCleared {
                owner_key: identity.owner_key(),
                lines_removed: removed,
            })
            .await;

        info!(removed, "Cleared cart");
        Ok(removed)
    }

    /// Deletes cart lines not touched since `older_than`.
    #[instrument(skip(self))]
    pub async fn purge_stale(&self, older_than: DateTime<Utc>) -> Result<u64, ServiceError> {
        let result = cart_line::Entity::delete_many()
            .filter(cart_line::Column::UpdatedAt.lt(older_than))
            .exec(&*self.db)
            .await?;

        info!(removed = result.rows_affected, "Purged stale cart lines");
        Ok(result.rows_affected)
    }
}

/// Lines of `identity` in insertion order.
pub async fn lines_of<C: ConnectionTrait>(
    conn: &C,
    identity: &Identity,
) -> Result<Vec<cart_line::Model>, DbErr> {
    cart_line::Entity::find()
        .filter(cart_line::Column::OwnerKey.eq(identity.owner_key()))
        .order_by_asc(cart_line::Column::AddedAt)
        .order_by_asc(cart_line::Column::Id)
        .all(conn)
        .await
}

/// Deletes all lines of `identity` on `conn`, which may be an open transaction.
pub async fn clear_lines<C: ConnectionTrait>(conn: &C, identity: &Identity) -> Result<u64, DbErr> {
    let result = cart_line::Entity::delete_many()
        .filter(cart_line::Column::OwnerKey.eq(identity.owner_key()))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

fn check_quantity(quantity: i32) -> Result<(), ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::InvalidQuantity(quantity));
    }
    Ok(())
}

fn not_in_cart(product_id: i32) -> ServiceError {
    ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
}

fn conflict(err: DbErr, owner_key: &str, product_id: i32) -> ServiceError {
    ServiceError::from_db_conflict(
        err,
        format!(
            "Cart line for product {} changed concurrently ({}); refetch and retry",
            product_id, owner_key
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_identity_is_serialized() {
        let locks = IdentityLocks::new();
        let identity = Identity::registered(1);
        let guard = locks.lock(&identity).await;

        let contender = {
            let locks = locks.clone();
            let identity = identity.clone();
            tokio::spawn(async move {
                let _g = locks.lock(&identity).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_identities_do_not_contend() {
        let locks = IdentityLocks::new();
        let _a = locks.lock(&Identity::registered(1)).await;
        let b = tokio::time::timeout(
            Duration::from_millis(50),
            locks.lock(&Identity::guest("tok")),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn released_locks_leave_no_entry() {
        let locks = IdentityLocks::new();
        let held = locks.lock(&Identity::registered(1)).await;
        drop(locks.lock(&Identity::registered(2)).await);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn entry_survives_while_a_waiter_is_queued() {
        let locks = IdentityLocks::new();
        let identity = Identity::guest("sess");
        let first = locks.lock(&identity).await;

        let waiter = {
            let locks = locks.clone();
            let identity = identity.clone();
            tokio::spawn(async move {
                let _g = locks.lock(&identity).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
