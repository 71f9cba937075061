pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use common::{Money, OrderId, OrderStatus, Page, ProductId, ProductStatus, UserId};
pub use error::{Entity, Result, StoreError};
pub use memory::InMemoryStore;
pub use model::{
    NewOrder, NewProduct, NewUser, Order, OrderChanges, OrderQuery, Product, ProductChanges,
    ProductQuery, User, UserChanges,
};
pub use postgres::PostgresStore;
pub use store::{MarketStore, OrderStore, ProductStore, UserStore};
