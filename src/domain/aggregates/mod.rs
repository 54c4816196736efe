//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod category;

pub use product::{Product, ProductError, ProductParts, ProductStatus, Variant, NewVariant, variant_matrix};
pub use order::{Order, OrderError, OrderStatus, PaymentStatus, LineItem, OrderTotals, OrderHistoryEntry, ShippingPolicy, StatusChange};
pub use cart::{Cart, CartError, CartItem, CartSummary};
pub use category::{Category, CategoryError, CategoryNode, CategoryTree};
