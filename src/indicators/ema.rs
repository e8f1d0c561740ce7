//! Exponential moving average over a complete price series.
//!
//! The first value is seeded with the simple moving average of the first
//! `period` prices; every following value applies the usual smoothing factor
//! `alpha = 2 / (period + 1)`:
//!
//! ```text
//! ema[k] = price[period + k] * alpha + ema[k - 1] * (1 - alpha)
//! ```

use tracing::trace;

/// Computes the EMA series of `prices` for `period`.
///
/// The output has `prices.len() - period + 1` values, the first one sitting on
/// price index `period - 1`. Returns an empty `Vec` when there are fewer than
/// `period` prices or when `period` is zero.
pub fn compute_ema(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        trace!(len = prices.len(), period, "not enough prices for EMA");
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = prices[..period].iter().sum::<f64>() / period as f64;

    let mut values = Vec::with_capacity(prices.len() - period + 1);
    values.push(seed);

    let mut previous = seed;
    for &price in &prices[period..] {
        let ema = price * alpha + previous * (1.0 - alpha);
        values.push(ema);
        previous = ema;
    }

    values
}
