// Back Office - Core Library
// Exposes the domain for the CLI, the API server and the tests

pub mod config;
pub mod dashboard;
pub mod db;
pub mod entities;
pub mod error;
pub mod import;
pub mod logging;
pub mod pagination;
pub mod permissions;
pub mod pricing;
pub mod validation;

#[cfg(feature = "server")]
pub mod http;

// Re-export commonly used types
pub use config::{CliArgs, Config};
pub use db::{get_events_for_entity, open_database, record_event, setup_database, Event};
pub use entities::{
    BudgetPlan, BudgetSummary, Category, CategoryKind, Offer, OfferStatus, Product, ProductPrice, SplitBill,
    Subscription, SubscriptionStatus, TransactionKind, User, Wallet, WalletSummary, WalletTransaction,
};
pub use error::{AppError, AppResult};
pub use import::{import_transactions, ImportReport};
pub use pagination::{PageRequest, Paginated};
pub use permissions::{Permission, Role};
pub use validation::ValidationErrors;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
