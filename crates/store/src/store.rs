use async_trait::async_trait;
use common::{OrderId, OrderStatus, Page, ProductId, UserId};

use crate::{
    NewOrder, NewProduct, NewUser, Order, OrderChanges, OrderQuery, Product, ProductChanges,
    ProductQuery, Result, User, UserChanges,
};

/// Persistence for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a user. Fails with `Conflict` if the phone is already registered.
    async fn insert_user(&self, user: NewUser) -> Result<User>;

    async fn user_by_id(&self, id: UserId) -> Result<Option<User>>;

    async fn user_by_phone(&self, phone: &str) -> Result<Option<User>>;

    /// Lists users in registration order.
    async fn list_users(&self, page: Page) -> Result<Vec<User>>;

    /// Applies the present fields. Returns None if the user doesn't exist.
    async fn update_user(&self, id: UserId, changes: UserChanges) -> Result<Option<User>>;

    /// Deletes a user together with everything they own.
    ///
    /// In one transaction: stock held by the user's open orders is returned,
    /// those orders are removed, then the user's products (and any orders on
    /// them) and finally the user row. Returns false if the user didn't exist.
    async fn delete_user(&self, id: UserId) -> Result<bool>;
}

/// Persistence for product listings.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Inserts a product. Fails with `Constraint` on a non-positive price or
    /// negative stock.
    async fn insert_product(&self, product: NewProduct) -> Result<Product>;

    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>>;

    async fn list_products(&self, query: ProductQuery) -> Result<Vec<Product>>;

    /// Applies the present fields. Returns None if the product doesn't exist.
    async fn update_product(
        &self,
        id: ProductId,
        changes: ProductChanges,
    ) -> Result<Option<Product>>;

    /// Deletes a product and every order placed on it.
    async fn delete_product(&self, id: ProductId) -> Result<bool>;
}

/// Persistence for orders. Every method that touches stock runs the stock
/// adjustment and the order row change as one atomic unit.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Places a `pending` order.
    ///
    /// Loads the product, fails with `NotFound` if it is absent or
    /// `InsufficientStock` if `stock < quantity`, snapshots
    /// `total_price = price * quantity`, decrements the stock and inserts the
    /// order. Nothing is written on failure.
    async fn place_order(&self, order: NewOrder) -> Result<Order>;

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>>;

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<Order>>;

    /// Moves an order from `from` to `to`.
    ///
    /// Fails with `StatusConflict` if the stored status is no longer `from`.
    /// Entering `cancelled` from a stock-holding status returns the quantity
    /// to the product in the same transaction.
    async fn transition_order(&self, id: OrderId, from: OrderStatus, to: OrderStatus)
    -> Result<Order>;

    /// Applies a patch to an order whose stored status is still `expected`.
    ///
    /// Fails with `StatusConflict` if the status moved, writing nothing. A
    /// quantity change reprices the order at its original unit price and, on
    /// a stock-holding order, moves the difference between the order and the
    /// product stock (`InsufficientStock` when the product cannot cover an
    /// increase). A status change to `cancelled` returns the held quantity.
    /// Every field and the stock move commit together or not at all.
    async fn update_order(
        &self,
        id: OrderId,
        expected: OrderStatus,
        changes: OrderChanges,
    ) -> Result<Order>;

    /// Removes an order, returning its quantity to stock first if the order
    /// still holds stock. Returns the removed row, or None if it didn't exist.
    /// Fails with `Constraint`, removing nothing, if the returned quantity
    /// would overflow the product stock.
    async fn remove_order(&self, id: OrderId) -> Result<Option<Order>>;
}

/// Everything the services need from a backing store.
pub trait MarketStore: UserStore + ProductStore + OrderStore + Clone + 'static {}

impl<T: UserStore + ProductStore + OrderStore + Clone + 'static> MarketStore for T {}
