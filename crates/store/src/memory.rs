use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, OrderStatus, Page, ProductId, UserId};
use tokio::sync::RwLock;

use crate::model::{adjusted_stock, check_quantity};
use crate::{
    Entity, NewOrder, NewProduct, NewUser, Order, OrderChanges, OrderQuery, OrderStore, Product,
    ProductChanges, ProductQuery, ProductStore, Result, StoreError, User, UserChanges, UserStore,
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    last_user_id: i64,
    last_product_id: i64,
    last_order_id: i64,
}

impl Tables {
    fn product_mut(&mut self, id: ProductId) -> Result<&mut Product> {
        self.products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(Entity::Product, id))
    }

    /// Returns the quantity held by each stock-holding order to its product.
    ///
    /// Every new level is computed before any is written, so an overflow
    /// leaves the tables untouched. Orders on deleted products are skipped.
    fn restock<'a>(&mut self, orders: impl IntoIterator<Item = &'a Order>) -> Result<()> {
        let mut levels: BTreeMap<ProductId, i32> = BTreeMap::new();
        for order in orders.into_iter().filter(|o| o.status.reserves_stock()) {
            let Some(product) = self.products.get(&order.product_id) else {
                continue;
            };
            let stock = levels.get(&product.id).copied().unwrap_or(product.stock);
            levels.insert(product.id, adjusted_stock(product.id, stock, order.quantity)?);
        }
        for (id, level) in levels {
            if let Some(product) = self.products.get_mut(&id) {
                product.stock = level;
            }
        }
        Ok(())
    }

    fn phone_taken(&self, phone: &str, except: Option<UserId>) -> bool {
        self.users
            .values()
            .any(|u| u.phone == phone && Some(u.id) != except)
    }
}

/// In-memory store implementation for development and testing.
///
/// One lock guards all three tables, so every operation is atomic with
/// respect to every other one.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Clears all tables.
    pub async fn clear(&self) {
        *self.tables.write().await = Tables::default();
    }
}

fn paginate<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.skip())
        .take(page.limit())
        .collect()
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;

        if tables.phone_taken(&user.phone, None) {
            return Err(StoreError::Conflict(format!(
                "phone {} is already registered",
                user.phone
            )));
        }

        tables.last_user_id += 1;
        let user = User {
            id: UserId::new(tables.last_user_id),
            phone: user.phone,
            hashed_password: user.hashed_password,
            full_name: user.full_name,
            about: user.about,
            avatar: user.avatar,
            birth_date: user.birth_date,
            rating: user.rating,
            is_superuser: false,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn user_by_phone(&self, phone: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.phone == phone).cloned())
    }

    async fn list_users(&self, page: Page) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(paginate(tables.users.values().cloned().collect(), page))
    }

    async fn update_user(&self, id: UserId, changes: UserChanges) -> Result<Option<User>> {
        let mut tables = self.tables.write().await;

        if let Some(ref phone) = changes.phone
            && tables.phone_taken(phone, Some(id))
        {
            return Err(StoreError::Conflict(format!(
                "phone {phone} is already registered"
            )));
        }

        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply(user);
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: UserId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&id) {
            return Ok(false);
        }

        let bought: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.buyer_id == id)
            .cloned()
            .collect();
        tables.restock(&bought)?;
        for order in &bought {
            tables.orders.remove(&order.id);
        }

        let owned: Vec<ProductId> = tables
            .products
            .values()
            .filter(|p| p.seller_id == id)
            .map(|p| p.id)
            .collect();
        tables.orders.retain(|_, o| !owned.contains(&o.product_id));
        tables.products.retain(|_, p| p.seller_id != id);
        tables.users.remove(&id);

        Ok(true)
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn insert_product(&self, product: NewProduct) -> Result<Product> {
        product.check()?;
        let mut tables = self.tables.write().await;

        if !tables.users.contains_key(&product.seller_id) {
            return Err(StoreError::not_found(Entity::User, product.seller_id));
        }

        tables.last_product_id += 1;
        let product = Product {
            id: ProductId::new(tables.last_product_id),
            seller_id: product.seller_id,
            title: product.title,
            description: product.description,
            price: product.price,
            category: product.category,
            stock: product.stock,
            images: product.images,
            status: product.status,
            time_posted: Utc::now(),
        };
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn list_products(&self, query: ProductQuery) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        let mut products: Vec<Product> = tables
            .products
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| b.time_posted.cmp(&a.time_posted).then(b.id.cmp(&a.id)));
        Ok(paginate(products, query.page))
    }

    async fn update_product(
        &self,
        id: ProductId,
        changes: ProductChanges,
    ) -> Result<Option<Product>> {
        changes.check()?;
        let mut tables = self.tables.write().await;
        let Some(product) = tables.products.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply(product);
        Ok(Some(product.clone()))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.products.remove(&id).is_none() {
            return Ok(false);
        }
        tables.orders.retain(|_, o| o.product_id != id);
        Ok(true)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn place_order(&self, order: NewOrder) -> Result<Order> {
        check_quantity(order.quantity)?;
        let mut tables = self.tables.write().await;

        if !tables.users.contains_key(&order.buyer_id) {
            return Err(StoreError::not_found(Entity::User, order.buyer_id));
        }

        let product = tables.product_mut(order.product_id)?;
        if product.stock < order.quantity {
            return Err(StoreError::InsufficientStock {
                product_id: product.id,
                requested: order.quantity,
                available: product.stock,
            });
        }
        let total_price = product
            .price
            .checked_multiply(order.quantity)
            .ok_or_else(|| StoreError::Constraint("order total overflows".to_string()))?;
        product.stock -= order.quantity;

        tables.last_order_id += 1;
        let order = Order {
            id: OrderId::new(tables.last_order_id),
            product_id: order.product_id,
            buyer_id: order.buyer_id,
            quantity: order.quantity,
            total_price,
            status: OrderStatus::Pending,
            order_date: Utc::now(),
            message: order.message,
        };
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| {
                query.buyer_id.is_none_or(|id| o.buyer_id == id)
                    && query.product_id.is_none_or(|id| o.product_id == id)
                    && query.status.is_none_or(|status| o.status == status)
                    && query.seller_id.is_none_or(|seller| {
                        tables
                            .products
                            .get(&o.product_id)
                            .is_some_and(|p| p.seller_id == seller)
                    })
            })
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.order_date.cmp(&a.order_date).then(b.id.cmp(&a.id)));
        Ok(paginate(orders, query.page))
    }

    async fn transition_order(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<Order> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(Entity::Order, id))?;

        if order.status != from {
            return Err(StoreError::StatusConflict {
                order_id: id,
                expected: from,
                actual: order.status,
            });
        }

        if to == OrderStatus::Cancelled {
            tables.restock([&order])?;
        }

        let stored = tables
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(Entity::Order, id))?;
        stored.status = to;
        Ok(stored.clone())
    }

    async fn update_order(
        &self,
        id: OrderId,
        expected: OrderStatus,
        changes: OrderChanges,
    ) -> Result<Order> {
        if let Some(quantity) = changes.quantity {
            check_quantity(quantity)?;
        }
        let mut tables = self.tables.write().await;
        let current = tables
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(Entity::Order, id))?;

        if current.status != expected {
            return Err(StoreError::StatusConflict {
                order_id: id,
                expected,
                actual: current.status,
            });
        }

        let mut order = current.clone();
        if let Some(quantity) = changes.quantity
            && quantity != order.quantity
        {
            order.total_price = current.repriced(quantity)?;
            order.quantity = quantity;
        }
        if let Some(message) = changes.message.clone() {
            order.message = Some(message);
        }
        if let Some(status) = changes.status {
            order.status = status;
        }

        let returned = changes.stock_returned(&current);
        if returned != 0 {
            let product = tables.product_mut(order.product_id)?;
            product.stock = adjusted_stock(product.id, product.stock, returned)?;
        }

        tables.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn remove_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut tables = self.tables.write().await;
        let Some(order) = tables.orders.get(&id).cloned() else {
            return Ok(None);
        };
        tables.restock([&order])?;
        tables.orders.remove(&id);
        Ok(Some(order))
    }
}
