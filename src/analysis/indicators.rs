use crate::domain::errors::{AnalysisError, AnalysisResult};
use rust_decimal::{Decimal, RoundingStrategy};

/// Simple Moving Average over the most recent `period` prices.
pub fn calculate_sma<'a, I>(prices: I, period: usize) -> AnalysisResult<Decimal>
where
    I: IntoIterator<Item = &'a Decimal>,
    I::IntoIter: DoubleEndedIterator + ExactSizeIterator,
{
    if period == 0 {
        return Err(AnalysisError::IndicatorCalculation(
            "SMA period must be positive".to_string(),
        ));
    }

    let prices = prices.into_iter();
    if prices.len() < period {
        return Err(AnalysisError::InsufficientData(format!(
            "Not enough data for SMA calculation. Need at least {} points, got {}",
            period,
            prices.len()
        )));
    }

    let sum: Decimal = prices.rev().take(period).sum();
    Ok(sum / Decimal::from(period as u64))
}

/// Percentage change from `entry_price` to `current_price`.
/// A zero entry price yields zero.
pub fn profit_loss_percent(entry_price: Decimal, current_price: Decimal) -> Decimal {
    if entry_price.is_zero() {
        return Decimal::ZERO;
    }
    (current_price - entry_price) / entry_price * Decimal::ONE_HUNDRED
}

pub fn format_decimal(value: Decimal, places: u32) -> String {
    let rounded = value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", places as usize, rounded)
}

pub fn format_price(price: Decimal) -> String {
    format_decimal(price, 2)
}

pub fn format_quantity(quantity: Decimal) -> String {
    format_decimal(quantity, 6)
}
