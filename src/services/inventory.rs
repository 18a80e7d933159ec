use crate::{
    db::DbPool,
    entities::product::{self, Entity as Products},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A requested line at checkout time.
#[derive(Debug, Clone)]
pub struct RequestedLine {
    pub product_id: Uuid,
    pub quantity: u32,
}

/// A line that passed availability checks, with the catalog price frozen in.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub name: String,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub weight_kg: Option<Decimal>,
    pub hsn_code: Option<String>,
}

/// Service owning stock levels and availability flags.
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Read-only availability check for a single product.
    #[instrument(skip(self))]
    pub async fn check_availability(
        &self,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<bool, ServiceError> {
        let product = Products::find_by_id(product_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        Ok(product.is_available && product.stock >= quantity as i32)
    }

    /// Validates every requested line and returns priced lines for all of
    /// them, or fails without pricing anything. A failure names the first
    /// offending product so the storefront can surface it.
    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    pub async fn reserve_and_price_all(
        &self,
        lines: &[RequestedLine],
    ) -> Result<Vec<PricedLine>, ServiceError> {
        let mut priced = Vec::with_capacity(lines.len());

        for line in lines {
            let product = Products::find_by_id(line.product_id)
                .one(&*self.db_pool)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", line.product_id))
                })?;

            if !product.is_available {
                return Err(ServiceError::ProductUnavailable(format!(
                    "{} is currently unavailable",
                    product.name
                )));
            }
            if product.stock < line.quantity as i32 {
                return Err(ServiceError::InsufficientStock(format!(
                    "Only {} unit(s) of {} left",
                    product.stock, product.name
                )));
            }

            priced.push(PricedLine {
                product_id: product.id,
                name: product.name,
                sku: product.sku,
                unit_price: product.price,
                quantity: line.quantity,
                weight_kg: product.weight_kg,
                hsn_code: product.hsn_code,
            });
        }

        Ok(priced)
    }

    /// Applies the stock decrement for a confirmed order.
    ///
    /// Each line is one atomic UPDATE that clamps stock at zero and turns
    /// off availability when stock runs out. A concurrent order that lost
    /// the race oversells; the clamp keeps the ledger non-negative and the
    /// event stream records that it happened.
    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    pub async fn commit_decrement(
        &self,
        lines: &[(Uuid, u32)],
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let backend = db.get_database_backend();

        for (product_id, quantity) in lines {
            let qty = *quantity as i32;

            let before = Products::find_by_id(*product_id).one(db).await?;
            let clamped = match &before {
                Some(p) => p.stock < qty,
                None => {
                    warn!(product_id = %product_id, "Decrement for unknown product skipped");
                    continue;
                }
            };

            let mut update = Query::update();
            update
                .table(product::Entity)
                .value(
                    product::Column::Stock,
                    Expr::cust_with_values(
                        r#"CASE WHEN "stock" > ? THEN "stock" - ? ELSE 0 END"#,
                        [qty, qty],
                    ),
                )
                .value(
                    product::Column::SoldCount,
                    Expr::col(product::Column::SoldCount).add(qty),
                )
                .value(
                    product::Column::IsAvailable,
                    Expr::cust_with_values(r#"("stock" > ?) AND "is_available""#, [qty]),
                )
                .value(product::Column::UpdatedAt, Utc::now())
                .and_where(Expr::col(product::Column::Id).eq(*product_id));

            db.execute(backend.build(&update)).await?;

            self.event_sender
                .send_or_log(Event::StockDecremented {
                    product_id: *product_id,
                    quantity: qty,
                    clamped,
                })
                .await;
        }

        Ok(())
    }

    /// Admin restock. Flips availability back on when stock becomes positive.
    #[instrument(skip(self))]
    pub async fn restock(&self, product_id: Uuid, delta: u32) -> Result<product::Model, ServiceError> {
        if delta == 0 {
            return Err(ServiceError::InvalidInput(
                "Restock quantity must be positive".into(),
            ));
        }

        let product = Products::find_by_id(product_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let new_stock = product.stock + delta as i32;
        let mut active: product::ActiveModel = product.into();
        active.stock = Set(new_stock);
        active.is_available = Set(new_stock > 0);
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(&*self.db_pool).await?;

        info!(product_id = %product_id, new_stock = new_stock, "Product restocked");
        self.event_sender
            .send_or_log(Event::ProductRestocked {
                product_id,
                new_stock,
            })
            .await;

        Ok(updated)
    }

    /// Catalog listing for the storefront; available products only.
    #[instrument(skip(self))]
    pub async fn list_available(&self) -> Result<Vec<product::Model>, ServiceError> {
        Ok(Products::find()
            .filter(product::Column::IsAvailable.eq(true))
            .all(&*self.db_pool)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        Products::find_by_id(product_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }
}
