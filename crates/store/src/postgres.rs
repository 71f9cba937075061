use async_trait::async_trait;
use common::{Money, OrderId, OrderStatus, Page, ProductId, UserId};
use sqlx::{
    PgPool, Postgres, QueryBuilder, Row,
    postgres::{PgPoolOptions, PgRow},
    types::Json,
};

use crate::model::{adjusted_stock, check_quantity};
use crate::{
    Entity, NewOrder, NewProduct, NewUser, Order, OrderChanges, OrderQuery, OrderStore, Product,
    ProductChanges, ProductQuery, ProductStore, Result, StoreError, User, UserChanges, UserStore,
};

const USER_COLUMNS: &str =
    "id, phone, hashed_password, full_name, about, avatar, birth_date, rating, is_superuser";

const PRODUCT_COLUMNS: &str = "id, seller_id, title, description, price_cents, category, stock, images, status, time_posted";

const ORDER_COLUMNS: &str =
    "id, product_id, buyer_id, quantity, total_price_cents, status, order_date, message";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool against `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
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

    fn row_to_user(row: PgRow) -> Result<User> {
        Ok(User {
            id: UserId::new(row.try_get("id")?),
            phone: row.try_get("phone")?,
            hashed_password: row.try_get("hashed_password")?,
            full_name: row.try_get("full_name")?,
            about: row.try_get("about")?,
            avatar: row.try_get("avatar")?,
            birth_date: row.try_get("birth_date")?,
            rating: row.try_get("rating")?,
            is_superuser: row.try_get("is_superuser")?,
        })
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let status: String = row.try_get("status")?;
        let images: Json<Vec<String>> = row.try_get("images")?;

        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            seller_id: UserId::new(row.try_get("seller_id")?),
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            category: row.try_get("category")?,
            stock: row.try_get("stock")?,
            images: images.0,
            status: status
                .parse()
                .map_err(|e| StoreError::CorruptRow(format!("products.status: {e}")))?,
            time_posted: row.try_get("time_posted")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;

        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            buyer_id: UserId::new(row.try_get("buyer_id")?),
            quantity: row.try_get("quantity")?,
            total_price: Money::from_cents(row.try_get("total_price_cents")?),
            status: status
                .parse()
                .map_err(|e| StoreError::CorruptRow(format!("orders.status: {e}")))?,
            order_date: row.try_get("order_date")?,
            message: row.try_get("message")?,
        })
    }
}

/// SQLSTATE for `numeric_value_out_of_range`.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// Maps unique, check and integer range violations to their typed store errors.
fn map_write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(db_err.message().to_string());
        }
        if db_err.is_check_violation()
            || db_err.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE)
        {
            return StoreError::Constraint(db_err.message().to_string());
        }
    }
    StoreError::Database(e)
}

fn push_page(builder: &mut QueryBuilder<'_, Postgres>, page: Page) {
    builder
        .push(" LIMIT ")
        .push_bind(i64::from(page.limit))
        .push(" OFFSET ")
        .push_bind(i64::from(page.skip));
}

#[async_trait]
impl UserStore for PostgresStore {
    #[tracing::instrument(skip(self, user))]
    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (phone, hashed_password, full_name, about, avatar, birth_date, rating)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.phone)
        .bind(&user.hashed_password)
        .bind(&user.full_name)
        .bind(&user.about)
        .bind(&user.avatar)
        .bind(user.birth_date)
        .bind(user.rating)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        Self::row_to_user(row)
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>> {
        sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_user)
            .transpose()
    }

    async fn user_by_phone(&self, phone: &str) -> Result<Option<User>> {
        sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE phone = $1"))
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_user)
            .transpose()
    }

    async fn list_users(&self, page: Page) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id ASC LIMIT $1 OFFSET $2"
        ))
        .bind(i64::from(page.limit))
        .bind(i64::from(page.skip))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_user).collect()
    }

    #[tracing::instrument(skip(self, changes))]
    async fn update_user(&self, id: UserId, changes: UserChanges) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users SET
                phone = COALESCE($2, phone),
                hashed_password = COALESCE($3, hashed_password),
                full_name = COALESCE($4, full_name),
                about = COALESCE($5, about),
                avatar = COALESCE($6, avatar),
                birth_date = COALESCE($7, birth_date)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id.as_i64())
        .bind(changes.phone)
        .bind(changes.hashed_password)
        .bind(changes.full_name)
        .bind(changes.about)
        .bind(changes.avatar)
        .bind(changes.birth_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?;

        row.map(Self::row_to_user).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn delete_user(&self, id: UserId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(id.as_i64())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE products p
            SET stock = p.stock + held.quantity
            FROM (
                SELECT product_id, SUM(quantity)::INTEGER AS quantity
                FROM orders
                WHERE buyer_id = $1 AND status IN ('pending', 'confirmed')
                GROUP BY product_id
            ) held
            WHERE p.id = held.product_id
            "#,
        )
        .bind(id.as_i64())
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;

        sqlx::query("DELETE FROM orders WHERE buyer_id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;

        // Orders on the user's products go with them through the foreign key cascade.
        sqlx::query("DELETE FROM products WHERE seller_id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl ProductStore for PostgresStore {
    #[tracing::instrument(skip(self, product), fields(seller_id = %product.seller_id))]
    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        product.check()?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (seller_id, title, description, price_cents, category, stock, images, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(product.seller_id.as_i64())
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(&product.category)
        .bind(product.stock)
        .bind(Json(&product.images))
        .bind(product.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                StoreError::not_found(Entity::User, product.seller_id)
            }
            e => map_write_error(e),
        })?;

        Self::row_to_product(row)
    }

    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>> {
        sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_product)
        .transpose()
    }

    async fn list_products(&self, query: ProductQuery) -> Result<Vec<Product>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE TRUE"
        ));
        if let Some(seller_id) = query.seller_id {
            builder.push(" AND seller_id = ").push_bind(seller_id.as_i64());
        }
        if let Some(category) = query.category {
            builder.push(" AND category = ").push_bind(category);
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        builder.push(" ORDER BY time_posted DESC, id DESC");
        push_page(&mut builder, query.page);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    #[tracing::instrument(skip(self, changes))]
    async fn update_product(
        &self,
        id: ProductId,
        changes: ProductChanges,
    ) -> Result<Option<Product>> {
        changes.check()?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE products SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                price_cents = COALESCE($4, price_cents),
                category = COALESCE($5, category),
                stock = COALESCE($6, stock),
                images = COALESCE($7, images),
                status = COALESCE($8, status)
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id.as_i64())
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.price.map(|p| p.cents()))
        .bind(changes.category)
        .bind(changes.stock)
        .bind(changes.images.map(Json))
        .bind(changes.status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?;

        row.map(Self::row_to_product).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    #[tracing::instrument(skip(self, order), fields(product_id = %order.product_id, buyer_id = %order.buyer_id))]
    async fn place_order(&self, order: NewOrder) -> Result<Order> {
        check_quantity(order.quantity)?;

        let mut tx = self.pool.begin().await?;

        let buyer: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
            .bind(order.buyer_id.as_i64())
            .fetch_optional(&mut *tx)
            .await?;
        if buyer.is_none() {
            return Err(StoreError::not_found(Entity::User, order.buyer_id));
        }

        // Row lock serializes concurrent orders on the same product.
        let product = sqlx::query("SELECT price_cents, stock FROM products WHERE id = $1 FOR UPDATE")
            .bind(order.product_id.as_i64())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found(Entity::Product, order.product_id))?;

        let price = Money::from_cents(product.try_get("price_cents")?);
        let stock: i32 = product.try_get("stock")?;

        if stock < order.quantity {
            return Err(StoreError::InsufficientStock {
                product_id: order.product_id,
                requested: order.quantity,
                available: stock,
            });
        }
        let total_price = price
            .checked_multiply(order.quantity)
            .ok_or_else(|| StoreError::Constraint("order total overflows".to_string()))?;

        sqlx::query("UPDATE products SET stock = stock - $2 WHERE id = $1")
            .bind(order.product_id.as_i64())
            .bind(order.quantity)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (product_id, buyer_id, quantity, total_price_cents, status, message)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.product_id.as_i64())
        .bind(order.buyer_id.as_i64())
        .bind(order.quantity)
        .bind(total_price.cents())
        .bind(OrderStatus::Pending.as_str())
        .bind(&order.message)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        let placed = Self::row_to_order(row)?;
        tx.commit().await?;
        Ok(placed)
    }

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_order)
            .transpose()
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let columns = ORDER_COLUMNS
            .split(", ")
            .map(|c| format!("o.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {columns} FROM orders o JOIN products p ON p.id = o.product_id WHERE TRUE"
        ));
        if let Some(buyer_id) = query.buyer_id {
            builder.push(" AND o.buyer_id = ").push_bind(buyer_id.as_i64());
        }
        if let Some(seller_id) = query.seller_id {
            builder.push(" AND p.seller_id = ").push_bind(seller_id.as_i64());
        }
        if let Some(product_id) = query.product_id {
            builder.push(" AND o.product_id = ").push_bind(product_id.as_i64());
        }
        if let Some(status) = query.status {
            builder.push(" AND o.status = ").push_bind(status.as_str());
        }
        builder.push(" ORDER BY o.order_date DESC, o.id DESC");
        push_page(&mut builder, query.page);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn transition_order(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_i64())
        .fetch_optional(&mut *tx)
        .await?
        .map(Self::row_to_order)
        .transpose()?
        .ok_or_else(|| StoreError::not_found(Entity::Order, id))?;

        if current.status != from {
            return Err(StoreError::StatusConflict {
                order_id: id,
                expected: from,
                actual: current.status,
            });
        }

        if to == OrderStatus::Cancelled && from.reserves_stock() {
            sqlx::query("UPDATE products SET stock = stock + $2 WHERE id = $1")
                .bind(current.product_id.as_i64())
                .bind(current.quantity)
                .execute(&mut *tx)
                .await
                .map_err(map_write_error)?;
        }

        let row = sqlx::query(&format!(
            "UPDATE orders SET status = $2 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id.as_i64())
        .bind(to.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let updated = Self::row_to_order(row)?;
        tx.commit().await?;
        Ok(updated)
    }

    #[tracing::instrument(skip(self, changes))]
    async fn update_order(
        &self,
        id: OrderId,
        expected: OrderStatus,
        changes: OrderChanges,
    ) -> Result<Order> {
        if let Some(quantity) = changes.quantity {
            check_quantity(quantity)?;
        }

        let mut tx = self.pool.begin().await?;

        let current = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_i64())
        .fetch_optional(&mut *tx)
        .await?
        .map(Self::row_to_order)
        .transpose()?
        .ok_or_else(|| StoreError::not_found(Entity::Order, id))?;

        if current.status != expected {
            return Err(StoreError::StatusConflict {
                order_id: id,
                expected,
                actual: current.status,
            });
        }

        let mut quantity = current.quantity;
        let mut total_price = current.total_price;
        if let Some(requested) = changes.quantity
            && requested != current.quantity
        {
            total_price = current.repriced(requested)?;
            quantity = requested;
        }

        let returned = changes.stock_returned(&current);
        if returned != 0 {
            let stock: i32 =
                sqlx::query_scalar("SELECT stock FROM products WHERE id = $1 FOR UPDATE")
                    .bind(current.product_id.as_i64())
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| StoreError::not_found(Entity::Product, current.product_id))?;
            let level = adjusted_stock(current.product_id, stock, returned)?;

            sqlx::query("UPDATE products SET stock = $2 WHERE id = $1")
                .bind(current.product_id.as_i64())
                .bind(level)
                .execute(&mut *tx)
                .await
                .map_err(map_write_error)?;
        }

        let status = changes.status.unwrap_or(current.status);
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders SET
                quantity = $2,
                total_price_cents = $3,
                message = COALESCE($4, message),
                status = $5
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.as_i64())
        .bind(quantity)
        .bind(total_price.cents())
        .bind(changes.message)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        let updated = Self::row_to_order(row)?;
        tx.commit().await?;
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    async fn remove_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = sqlx::query(&format!(
            "DELETE FROM orders WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id.as_i64())
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };
        let removed = Self::row_to_order(row)?;

        if removed.status.reserves_stock() {
            sqlx::query("UPDATE products SET stock = stock + $2 WHERE id = $1")
                .bind(removed.product_id.as_i64())
                .bind(removed.quantity)
                .execute(&mut *tx)
                .await
                .map_err(map_write_error)?;
        }

        tx.commit().await?;
        Ok(Some(removed))
    }
}
