// Dashboard - headline numbers for managers

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::entities::offer::{self, OfferStatus};
use crate::entities::subscription::{self, SubscriptionStatus};
use crate::entities::user;
use crate::error::AppResult;
use crate::permissions::Role;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DashboardStats {
    pub as_of: NaiveDate,
    pub leads: i64,
    pub customers: i64,
    pub pending_offers: i64,
    pub pending_subscriptions: i64,
    pub approved_subscriptions: i64,
    /// Discounted monthly price of approved subscriptions running on `as_of`
    pub monthly_recurring_revenue: Decimal,
}

pub fn dashboard_stats(conn: &Connection, today: NaiveDate) -> AppResult<DashboardStats> {
    Ok(DashboardStats {
        as_of: today,
        leads: user::count_by_role(conn, Role::Lead)?,
        customers: user::count_by_role(conn, Role::Customer)?,
        pending_offers: offer::count_by_status(conn, OfferStatus::Pending)?,
        pending_subscriptions: subscription::count_by_status(conn, SubscriptionStatus::Pending)?,
        approved_subscriptions: subscription::count_by_status(conn, SubscriptionStatus::Approved)?,
        monthly_recurring_revenue: subscription::monthly_recurring_revenue(conn, today)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;
    use crate::entities::product::create_test_price;
    use crate::entities::subscription::{approve_subscription, create_subscription, DecisionInput, SubscriptionInput};
    use crate::entities::user::create_test_user;
    use rust_decimal_macros::dec;

    #[test]
    fn test_counts_and_mrr() {
        let conn = test_connection();
        let admin = create_test_user(&conn, "Admin", Role::Admin);
        let lead = create_test_user(&conn, "Lead", Role::Lead);
        create_test_user(&conn, "Other Lead", Role::Lead);
        let price = create_test_price(&conn, dec!(200000), dec!(0), 1);
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let sub = create_subscription(
            &conn,
            &SubscriptionInput {
                customer_id: Some(lead.id.clone()),
                product_price_id: Some(price.id.clone()),
                start_date: Some(today),
                months: Some(12),
                discount_percent: Some(dec!(10)),
                notes: None,
            },
            &admin,
        )
        .unwrap();

        let before = dashboard_stats(&conn, today).unwrap();
        assert_eq!(before.leads, 2);
        assert_eq!(before.pending_subscriptions, 1);
        assert_eq!(before.monthly_recurring_revenue, Decimal::ZERO);

        approve_subscription(&conn, &sub.id, &admin, &DecisionInput::default()).unwrap();

        let after = dashboard_stats(&conn, today).unwrap();
        assert_eq!(after.leads, 1);
        assert_eq!(after.customers, 1);
        assert_eq!(after.approved_subscriptions, 1);
        assert_eq!(after.monthly_recurring_revenue, dec!(180000));
    }
}
