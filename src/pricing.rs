//! Booking price computation.
use crate::model::PaymentOption;
use serde::Serialize;

/// Share of the total charged up front for an advance booking.
pub const ADVANCE_RATIO: f64 = 0.30;
/// Discount figure displayed next to full payment. Never subtracted.
pub const FULL_PAYMENT_DISCOUNT_RATIO: f64 = 0.05;

/// Amounts owed for one booking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quote {
    pub daily_rate: f64,
    pub duration_days: u32,
    pub payment_option: PaymentOption,
    pub total_amount: f64,
    pub advance_amount: f64,
    pub payable_amount: f64,
    /// Display-only figure shown alongside full payment.
    pub displayed_discount: f64,
}

impl Quote {
    pub fn new(daily_rate: f64, duration_days: u32, payment_option: PaymentOption) -> Self {
        let duration_days = duration_days.max(1);
        let total_amount = daily_rate * f64::from(duration_days);
        let advance_amount = (total_amount * ADVANCE_RATIO).round();
        let payable_amount = match payment_option {
            PaymentOption::Advance => advance_amount,
            PaymentOption::Full => total_amount,
        };
        Self {
            daily_rate,
            duration_days,
            payment_option,
            total_amount,
            advance_amount,
            payable_amount,
            displayed_discount: (total_amount * FULL_PAYMENT_DISCOUNT_RATIO).round(),
        }
    }

    /// Quote from the raw duration text of a form.
    pub fn from_input(daily_rate: f64, duration: &str, payment_option: PaymentOption) -> Self {
        Self::new(daily_rate, parse_duration(duration), payment_option)
    }

    /// Amount still owed on delivery.
    pub fn balance_due(&self) -> f64 {
        self.total_amount - self.payable_amount
    }
}

/// Parse a duration in whole days; anything that is not a positive integer becomes 1.
pub fn parse_duration(input: &str) -> u32 {
    match input.trim().parse::<u32>() {
        Ok(days) if days >= 1 => days,
        _ => 1,
    }
}

/// Parse a duration only when it is a positive integer.
pub fn parse_duration_strict(input: &str) -> Option<u32> {
    input.trim().parse::<u32>().ok().filter(|days| *days >= 1)
}
