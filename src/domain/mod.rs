//! Storefront domain: catalog, categories, orders and carts.
pub mod aggregates;
pub mod events;
pub mod value_objects;
