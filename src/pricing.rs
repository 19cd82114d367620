// Pricing arithmetic for offers and subscriptions
//
// contract value = monthly price × months × (1 − discount%) + setup fee

use chrono::{Local, Months, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};

/// Business "today" in the server's local time zone
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Round to cents, half away from zero
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Monthly price after the percentage discount
pub fn discounted_monthly(monthly_price: Decimal, discount_percent: Decimal) -> Decimal {
    let factor = Decimal::ONE - discount_percent / Decimal::ONE_HUNDRED;
    round_money(monthly_price * factor)
}

/// Total value of a contract over its whole term. Saturates at
/// `Decimal::MAX` instead of overflowing.
pub fn contract_value(
    monthly_price: Decimal,
    months: u32,
    setup_fee: Decimal,
    discount_percent: Decimal,
) -> Decimal {
    let factor = Decimal::ONE - discount_percent / Decimal::ONE_HUNDRED;
    let term = monthly_price
        .saturating_mul(Decimal::from(months))
        .saturating_mul(factor);
    round_money(term.saturating_add(setup_fee))
}

/// Last covered day boundary: `start + months` calendar months.
/// Month-end starts clamp (Jan 31 + 1 month = Feb 28/29).
pub fn end_date(start: NaiveDate, months: u32) -> Option<NaiveDate> {
    start.checked_add_months(Months::new(months))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_contract_value_without_discount() {
        // price × months + fee
        assert_eq!(contract_value(dec!(150000), 12, dec!(250000), dec!(0)), dec!(2050000));
    }

    #[test]
    fn test_contract_value_with_discount() {
        // 99.99 × 6 × 0.9 + 10 = 549.946 → 549.95
        assert_eq!(contract_value(dec!(99.99), 6, dec!(10), dec!(10)), dec!(549.95));
    }

    #[test]
    fn test_contract_value_saturates() {
        assert_eq!(contract_value(Decimal::MAX, 120, Decimal::MAX, dec!(0)), Decimal::MAX);
    }

    #[test]
    fn test_discounted_monthly() {
        assert_eq!(discounted_monthly(dec!(200000), dec!(15)), dec!(170000));
        assert_eq!(discounted_monthly(dec!(10.005), dec!(0)), dec!(10.01));
    }

    #[test]
    fn test_end_date_clamps_month_end() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(end_date(start, 1), NaiveDate::from_ymd_opt(2024, 2, 29));
        let start = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(end_date(start, 12), NaiveDate::from_ymd_opt(2025, 3, 15));
    }
}
