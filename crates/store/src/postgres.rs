use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CouponId, MemberId, OrderId, ProductId};
use domain::{
    Coupon, CouponStatus, DiscountType, IdempotencyKey, Member, MemberRole, Money, Order,
    Product, ProductStatus,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::outbox::{NewOutboxEvent, OutboxEvent};
use crate::store::{
    CouponRepository, MemberRepository, OrderRepository, OutboxStore, ProductRepository,
    Transactional,
};
use crate::unit_of_work::{StagedOrder, UnitOfWork};
use crate::{Result, StoreError};

const OUTBOX_COLUMNS: &str = "id, aggregate_type, aggregate_id, event_type, payload, created_at, processed_at, retry_count, last_error";

const COUPON_COLUMNS: &str = "id, code, name, discount_type, discount_value, min_purchase_amount, max_discount_amount, valid_from, valid_until, total_quantity, remaining_quantity, status, created_at, updated_at";

/// PostgreSQL-backed shop store.
#[derive(Clone)]
pub struct PostgresShopStore {
    pool: PgPool,
}

impl PostgresShopStore {
    /// Creates a new PostgreSQL shop store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn write_order(tx: &mut Transaction<'_, Postgres>, staged: &StagedOrder) -> Result<()> {
        let order = &staged.order;
        let data = serde_json::to_value(order)?;
        let key = order.idempotency_key().map(IdempotencyKey::as_str);

        if staged.expected_version == 0 {
            sqlx::query(
                r#"
                INSERT INTO orders (id, order_number, member_id, status, idempotency_key, version, data, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(order.id().as_uuid())
            .bind(order.order_number().as_str())
            .bind(order.member_id().as_uuid())
            .bind(order.status().as_str())
            .bind(key)
            .bind(order.version())
            .bind(&data)
            .bind(order.created_at())
            .bind(order.updated_at())
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                // A second insert of the same id lost a creation race.
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("orders_pkey")
                {
                    return StoreError::ConcurrencyConflict {
                        entity: "order",
                        id: order.id().to_string(),
                        expected: 0,
                    };
                }
                map_write_error(e)
            })?;
            return Ok(());
        }

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, idempotency_key = $3, version = $4, data = $5, updated_at = $6
            WHERE id = $1 AND version = $7
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(key)
        .bind(order.version())
        .bind(&data)
        .bind(order.updated_at())
        .bind(staged.expected_version)
        .execute(&mut **tx)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ConcurrencyConflict {
                entity: "order",
                id: order.id().to_string(),
                expected: staged.expected_version,
            });
        }
        Ok(())
    }

    async fn write_outbox(tx: &mut Transaction<'_, Postgres>, event: &NewOutboxEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (aggregate_type, aggregate_id, event_type, payload)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&event.aggregate_type)
        .bind(&event.aggregate_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let data: serde_json::Value = row.try_get("data")?;
        Ok(serde_json::from_value(data)?)
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let status: String = row.try_get("status")?;
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: Money::new(row.try_get("price")?),
            stock_quantity: to_u32(row.try_get("stock_quantity")?, "stock_quantity")?,
            category: row.try_get("category")?,
            status: ProductStatus::parse(&status)
                .ok_or_else(|| StoreError::Corrupt(format!("product status {status}")))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_coupon(row: PgRow) -> Result<Coupon> {
        let discount_type: String = row.try_get("discount_type")?;
        let status: String = row.try_get("status")?;
        let total: Option<i64> = row.try_get("total_quantity")?;
        let remaining: Option<i64> = row.try_get("remaining_quantity")?;
        let max_discount: Option<i64> = row.try_get("max_discount_amount")?;

        Ok(Coupon {
            id: CouponId::from_uuid(row.try_get::<Uuid, _>("id")?),
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            discount_type: DiscountType::parse(&discount_type)
                .ok_or_else(|| StoreError::Corrupt(format!("discount type {discount_type}")))?,
            discount_value: row.try_get("discount_value")?,
            min_purchase_amount: Money::new(row.try_get("min_purchase_amount")?),
            max_discount_amount: max_discount.map(Money::new),
            valid_from: row.try_get("valid_from")?,
            valid_until: row.try_get("valid_until")?,
            total_quantity: total.map(|q| to_u32(q, "total_quantity")).transpose()?,
            remaining_quantity: remaining
                .map(|q| to_u32(q, "remaining_quantity"))
                .transpose()?,
            status: CouponStatus::parse(&status)
                .ok_or_else(|| StoreError::Corrupt(format!("coupon status {status}")))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_member(row: PgRow) -> Result<Member> {
        let role: String = row.try_get("role")?;
        Ok(Member {
            id: MemberId::from_uuid(row.try_get::<Uuid, _>("id")?),
            email: row.try_get("email")?,
            nickname: row.try_get("nickname")?,
            role: MemberRole::parse(&role)
                .ok_or_else(|| StoreError::Corrupt(format!("member role {role}")))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_outbox(row: PgRow) -> Result<OutboxEvent> {
        Ok(OutboxEvent {
            id: row.try_get("id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            aggregate_id: row.try_get("aggregate_id")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            processed_at: row.try_get("processed_at")?,
            retry_count: row.try_get("retry_count")?,
            last_error: row.try_get("last_error")?,
        })
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

/// Maps unique violations to [`StoreError::UniqueViolation`], keeping the constraint name.
fn map_write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
        && let Some(constraint) = db_err.constraint()
    {
        return StoreError::UniqueViolation {
            constraint: constraint.to_string(),
        };
    }
    StoreError::Database(e)
}

#[async_trait]
impl Transactional for PostgresShopStore {
    async fn commit(&self, uow: UnitOfWork) -> Result<()> {
        if uow.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for staged in uow.orders() {
            Self::write_order(&mut tx, staged).await?;
        }
        for event in uow.outbox_events() {
            Self::write_outbox(&mut tx, event).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PostgresShopStore {
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT data FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn find_order_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT data FROM orders WHERE idempotency_key = $1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }
}

#[async_trait]
impl ProductRepository for PostgresShopStore {
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT * FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_product).transpose()
    }

    async fn find_products_by_category(&self, category: &str) -> Result<Vec<Product>> {
        let rows =
            sqlx::query("SELECT * FROM products WHERE category = $1 ORDER BY created_at ASC")
                .bind(category)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn all_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query("SELECT * FROM products ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn save_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, stock_quantity, category, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                price = EXCLUDED.price,
                stock_quantity = EXCLUDED.stock_quantity,
                category = EXCLUDED.category,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(i64::from(product.stock_quantity))
        .bind(&product.category)
        .bind(product.status.as_str())
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }
}

#[async_trait]
impl CouponRepository for PostgresShopStore {
    async fn find_coupon(&self, id: CouponId) -> Result<Option<Coupon>> {
        let row = sqlx::query(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_coupon).transpose()
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_coupon).transpose()
    }

    async fn active_coupons(&self, now: DateTime<Utc>) -> Result<Vec<Coupon>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COUPON_COLUMNS} FROM coupons
            WHERE status = 'ACTIVE' AND valid_from <= $1 AND valid_until >= $1
            ORDER BY valid_until ASC
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_coupon).collect()
    }

    async fn save_coupon(&self, coupon: &Coupon) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO coupons (id, code, name, discount_type, discount_value, min_purchase_amount, max_discount_amount,
                                 valid_from, valid_until, total_quantity, remaining_quantity, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                name = EXCLUDED.name,
                discount_type = EXCLUDED.discount_type,
                discount_value = EXCLUDED.discount_value,
                min_purchase_amount = EXCLUDED.min_purchase_amount,
                max_discount_amount = EXCLUDED.max_discount_amount,
                valid_from = EXCLUDED.valid_from,
                valid_until = EXCLUDED.valid_until,
                total_quantity = EXCLUDED.total_quantity,
                remaining_quantity = EXCLUDED.remaining_quantity,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(coupon.id.as_uuid())
        .bind(&coupon.code)
        .bind(&coupon.name)
        .bind(coupon.discount_type.as_str())
        .bind(coupon.discount_value)
        .bind(coupon.min_purchase_amount.amount())
        .bind(coupon.max_discount_amount.map(|m| m.amount()))
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.total_quantity.map(i64::from))
        .bind(coupon.remaining_quantity.map(i64::from))
        .bind(coupon.status.as_str())
        .bind(coupon.created_at)
        .bind(coupon.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }
}

#[async_trait]
impl MemberRepository for PostgresShopStore {
    async fn find_member(&self, id: MemberId) -> Result<Option<Member>> {
        let row = sqlx::query("SELECT * FROM members WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_member).transpose()
    }

    async fn find_member_by_email(&self, email: &str) -> Result<Option<Member>> {
        let row = sqlx::query("SELECT * FROM members WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_member).transpose()
    }

    async fn save_member(&self, member: &Member) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO members (id, email, nickname, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                email = EXCLUDED.email,
                nickname = EXCLUDED.nickname,
                role = EXCLUDED.role,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(member.id.as_uuid())
        .bind(&member.email)
        .bind(&member.nickname)
        .bind(member.role.as_str())
        .bind(member.created_at)
        .bind(member.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for PostgresShopStore {
    async fn fetch_unprocessed(
        &self,
        limit: usize,
        max_attempts: i32,
    ) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {OUTBOX_COLUMNS} FROM outbox_events
            WHERE processed_at IS NULL AND retry_count < $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2
            "#
        ))
        .bind(max_attempts)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_outbox).collect()
    }

    async fn mark_processed(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET processed_at = COALESCE(processed_at, NOW()), retry_count = 0, last_error = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "outbox event",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE outbox_events SET retry_count = retry_count + 1, last_error = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "outbox event",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn events_for_aggregate(&self, aggregate_id: &str) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox_events WHERE aggregate_id = $1 ORDER BY id ASC"
        ))
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_outbox).collect()
    }
}
