//! Modehaus storefront and back-office
//!
//! Multilingual (German/English/Arabic) fashion shop backend.
//!
//! ## Features
//! - Product catalog with size/color variants and per-variant stock
//! - Category hierarchy
//! - Order lifecycle with a validated status state machine and history log
//! - Customer management
//! - Newsletter subscriptions
//! - Product image upload and resizing
//! - Site settings
//! - Storefront JSON API for cart, wishlist, search and newsletter widgets

pub mod api;
pub mod bus;
pub mod config;
pub mod db;
pub mod domain;
pub mod i18n;
pub mod media;
pub mod settings;
pub mod web;

use thiserror::Error;

use crate::db::orders::OrderWriteError;
use crate::domain::aggregates::{CartError, CategoryError, OrderError, OrderStatus, ProductError};
use crate::media::MediaError;
use crate::settings::SettingsError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Product not found")]
    ProductNotFound,

    #[error("Variant not found")]
    VariantNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Category not found")]
    CategoryNotFound,

    #[error("Customer not found")]
    CustomerNotFound,

    #[error("Cart item not found")]
    CartItemNotFound,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("{sku} is no longer available")]
    ProductUnavailable { sku: String },

    #[error("Insufficient stock: {available} available")]
    InsufficientStock { available: u32 },

    #[error("Invalid quantity")]
    InvalidQuantity,

    #[error("Cannot change order status from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("A category cannot be moved below itself")]
    CategoryCycle,

    #[error("Category still has subcategories or products")]
    CategoryNotEmpty,

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Image exceeds {limit} bytes")]
    ImageTooLarge { limit: usize },

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Db(#[from] db::DbError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<ProductError> for StoreError {
    fn from(e: ProductError) -> Self {
        match e {
            ProductError::VariantNotFound => Self::VariantNotFound,
            ProductError::InsufficientInventory => Self::InsufficientStock { available: 0 },
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<OrderError> for StoreError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::InvalidTransition { from, to } => Self::InvalidStatusTransition { from, to },
            OrderError::InvalidQuantity => Self::InvalidQuantity,
            OrderError::NoItems | OrderError::PaymentOnClosedOrder { .. } => {
                Self::Validation(e.to_string())
            }
        }
    }
}

impl From<CartError> for StoreError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound => Self::CartItemNotFound,
            CartError::InvalidQuantity => Self::InvalidQuantity,
            CartError::InsufficientStock { available } => Self::InsufficientStock { available },
        }
    }
}

impl From<CategoryError> for StoreError {
    fn from(e: CategoryError) -> Self {
        match e {
            CategoryError::ParentNotFound => Self::CategoryNotFound,
            CategoryError::Cycle => Self::CategoryCycle,
        }
    }
}

impl From<OrderWriteError> for StoreError {
    fn from(e: OrderWriteError) -> Self {
        match e {
            OrderWriteError::EmptyCart => Self::EmptyCart,
            OrderWriteError::Unavailable { sku } => Self::ProductUnavailable { sku },
            OrderWriteError::InsufficientStock { available, .. } => Self::InsufficientStock { available },
            OrderWriteError::NotFound => Self::OrderNotFound,
            OrderWriteError::Order(e) => e.into(),
            OrderWriteError::Db(e) => Self::Db(e),
        }
    }
}

impl From<MediaError> for StoreError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::TooLarge { limit } => Self::ImageTooLarge { limit },
            MediaError::Unsupported | MediaError::Decode(_) => Self::InvalidImage(e.to_string()),
            MediaError::Io(e) => Self::Io(e),
            MediaError::Task => Self::Io(std::io::Error::other(e.to_string())),
        }
    }
}

impl From<SettingsError> for StoreError {
    fn from(e: SettingsError) -> Self {
        Self::Validation(e.to_string())
    }
}
