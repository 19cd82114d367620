// Entity Models
//
// Each entity module owns its table(s): resource struct, input structs,
// validation and the SQL for its operations. Functions take `&Connection`
// so the same code serves the HTTP API, the CLI and the tests.

pub mod budget;
pub mod category;
pub mod offer;
pub mod product;
pub mod split_bill;
pub mod subscription;
pub mod transaction;
pub mod user;
pub mod wallet;

pub use budget::{BudgetItem, BudgetPlan, BudgetSummary};
pub use category::{Category, CategoryKind};
pub use offer::{Offer, OfferStatus};
pub use product::{Product, ProductPrice};
pub use split_bill::{Breakdown, SplitBill};
pub use subscription::{Subscription, SubscriptionStatus};
pub use transaction::{TransactionKind, WalletTransaction, WalletSummary};
pub use user::{CreatedUser, User};
pub use wallet::{Wallet, WalletMember, WalletRole};
