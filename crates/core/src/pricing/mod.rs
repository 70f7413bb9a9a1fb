pub mod financial;

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};

pub use financial::{price_combined, price_location, CombinedPricing, LocationPricing, PricingPolicy};

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-?\d[\d,]*(?:\.\d+)?").expect("amount pattern compiles")
});

/// Parses free-text money such as `AED 50,000`, `50000` or `50,000.50`.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let matched = AMOUNT.find(text)?;
    let digits: String = matched.as_str().chars().filter(|ch| *ch != ',').collect();
    Decimal::from_str(&digits).ok()
}

/// Formats as `<CUR> 12,345.00`.
pub fn format_amount(currency: &str, amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (position, digit) in whole.chars().enumerate() {
        if position > 0 && (whole.len() - position) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if negative { "-" } else { "" };
    format!("{currency} {sign}{grouped}.{fraction}")
}
