// Entity Models
// Category and Stock records held by the catalog store.

pub mod category;
pub mod stock;

pub use category::Category;
pub use stock::{MarketCap, NewStock, Stock, StockFilter};
