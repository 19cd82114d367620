// Route handlers grouped by area

pub mod budgets;
pub mod catalog;
pub mod offers;
pub mod split_bills;
pub mod subscriptions;
pub mod system;
pub mod users;
pub mod wallets;
