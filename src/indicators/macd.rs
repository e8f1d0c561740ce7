//! Moving Average Convergence/Divergence.
//!
//! - **MACD line**: short EMA minus long EMA, both right-aligned so they end
//!   on the most recent price.
//! - **Signal line**: EMA of the MACD line.
//! - **Histogram**: MACD line minus signal line, aligned to the signal line.
//!
//! Insufficient input is not an error path: [`compute_macd`] always returns a
//! [`MacdResult`], and a too-short series is reported through
//! [`MacdResult::error`] with all three lines empty.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use super::{
    crossover::{detect_signals, SignalEvent},
    ema::compute_ema,
};

/// Histogram value used when an aligned index has no MACD or signal operand.
pub const HISTOGRAM_GAP_VALUE: f64 = 0.0;

/// The three periods a MACD computation runs with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MacdParameters {
    pub short_period: usize,
    pub long_period: usize,
    pub signal_period: usize,
}

impl MacdParameters {
    pub fn new(short_period: usize, long_period: usize, signal_period: usize) -> Self {
        Self {
            short_period,
            long_period,
            signal_period,
        }
    }
}

impl Default for MacdParameters {
    fn default() -> Self {
        Self::new(12, 26, 9)
    }
}

/// Marker for a price series shorter than the long EMA period.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("Not enough data to calculate MACD (minimum: {required} data points)")]
pub struct InsufficientData {
    pub required: usize,
    pub actual: usize,
}

/// Outcome of a MACD computation.
///
/// Values are read-only once returned. `histogram[i]` and `signal_line[i]`
/// share a time position, which is `macd_line[i + signal_offset()]`.
#[derive(Debug, Clone, Serialize)]
pub struct MacdResult {
    macd_line: Vec<f64>,
    signal_line: Vec<f64>,
    histogram: Vec<f64>,
    parameters: MacdParameters,
    signals: Vec<SignalEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<InsufficientData>,
}

impl MacdResult {
    fn insufficient(parameters: MacdParameters, actual: usize) -> Self {
        Self {
            macd_line: Vec::new(),
            signal_line: Vec::new(),
            histogram: Vec::new(),
            parameters,
            signals: Vec::new(),
            error: Some(InsufficientData {
                required: parameters.long_period,
                actual,
            }),
        }
    }

    pub fn macd_line(&self) -> &[f64] {
        &self.macd_line
    }

    pub fn signal_line(&self) -> &[f64] {
        &self.signal_line
    }

    pub fn histogram(&self) -> &[f64] {
        &self.histogram
    }

    pub fn parameters(&self) -> MacdParameters {
        self.parameters
    }

    /// Crossovers detected over the aligned series, oldest first.
    pub fn signals(&self) -> &[SignalEvent] {
        &self.signals
    }

    pub fn error(&self) -> Option<&InsufficientData> {
        self.error.as_ref()
    }

    pub fn is_insufficient(&self) -> bool {
        self.error.is_some()
    }

    /// Number of leading MACD values that have no signal counterpart.
    pub fn signal_offset(&self) -> usize {
        self.macd_line.len().saturating_sub(self.signal_line.len())
    }
}

/// Computes MACD with the conventional 12/26/9 periods.
pub fn compute_macd_default(prices: &[f64]) -> MacdResult {
    compute_macd(prices, MacdParameters::default())
}

/// Computes the MACD line, signal line, histogram and crossovers of `prices`.
///
/// Returns a result carrying [`InsufficientData`] when `prices` is shorter
/// than `params.long_period`; no other input validation is done.
pub fn compute_macd(prices: &[f64], params: MacdParameters) -> MacdResult {
    if prices.len() < params.long_period {
        trace!(
            len = prices.len(),
            required = params.long_period,
            "not enough prices for MACD"
        );
        return MacdResult::insufficient(params, prices.len());
    }

    let ema_short = compute_ema(prices, params.short_period);
    let ema_long = compute_ema(prices, params.long_period);

    // Right-align: both tails end on the last price.
    let len = ema_short.len().min(ema_long.len());
    let short_tail = &ema_short[ema_short.len() - len..];
    let long_tail = &ema_long[ema_long.len() - len..];

    let macd_line: Vec<f64> = short_tail
        .iter()
        .zip(long_tail)
        .map(|(short, long)| short - long)
        .collect();

    let signal_line = compute_ema(&macd_line, params.signal_period);
    let offset = macd_line.len() - signal_line.len();

    let histogram: Vec<f64> = (0..signal_line.len())
        .map(|i| match (macd_line.get(i + offset), signal_line.get(i)) {
            (Some(macd), Some(signal)) => macd - signal,
            _ => HISTOGRAM_GAP_VALUE,
        })
        .collect();

    let signals = detect_signals(&macd_line[offset..], &signal_line, &histogram);

    trace!(
        macd = macd_line.len(),
        signal = signal_line.len(),
        signals = signals.len(),
        "computed MACD"
    );

    MacdResult {
        macd_line,
        signal_line,
        histogram,
        parameters: params,
        signals,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::crossover::SignalKind;

    /// Deterministic wavy series with a drift, long enough for 12/26/9.
    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                100.0 + t * 0.1 + (t / 4.0).sin() * 5.0
            })
            .collect()
    }

    fn bits(values: &[f64]) -> Vec<u64> {
        values.iter().map(|v| v.to_bits()).collect()
    }

    #[test]
    fn default_parameters_are_12_26_9() {
        assert_eq!(MacdParameters::default(), MacdParameters::new(12, 26, 9));
    }

    #[test]
    fn insufficient_data_is_marked() {
        let prices: Vec<f64> = (1..=10).map(f64::from).collect();
        let result = compute_macd_default(&prices);

        assert!(result.is_insufficient());
        assert!(result.macd_line().is_empty());
        assert!(result.signal_line().is_empty());
        assert!(result.histogram().is_empty());
        assert!(result.signals().is_empty());

        let error = result.error().unwrap();
        assert_eq!(error.required, 26);
        assert_eq!(error.actual, 10);
        assert_eq!(
            error.to_string(),
            "Not enough data to calculate MACD (minimum: 26 data points)"
        );
    }

    #[test]
    fn exactly_long_period_is_enough() {
        let result = compute_macd_default(&wave(26));
        assert!(!result.is_insufficient());
        assert_eq!(result.macd_line().len(), 1);
        assert!(result.signal_line().is_empty());
        assert!(result.histogram().is_empty());
        assert!(result.signals().is_empty());
    }

    #[test]
    fn macd_line_is_right_aligned_difference() {
        let prices = wave(60);
        let result = compute_macd_default(&prices);

        let short = compute_ema(&prices, 12);
        let long = compute_ema(&prices, 26);
        assert_eq!(result.macd_line().len(), long.len());

        let trim = short.len() - long.len();
        for (i, value) in result.macd_line().iter().enumerate() {
            assert_eq!(*value, short[i + trim] - long[i]);
        }
    }

    #[test]
    fn lines_stay_aligned() {
        for n in [26, 30, 33, 34, 35, 50, 200] {
            let result = compute_macd_default(&wave(n));
            assert_eq!(result.histogram().len(), result.signal_line().len());
            assert!(result.signal_line().len() <= result.macd_line().len());

            let offset = result.signal_offset();
            for (i, h) in result.histogram().iter().enumerate() {
                assert_eq!(*h, result.macd_line()[i + offset] - result.signal_line()[i]);
            }
        }
    }

    #[test]
    fn signal_offset_never_underflows() {
        let result = MacdResult {
            macd_line: vec![1.0],
            signal_line: vec![1.0, 2.0, 3.0],
            histogram: vec![0.0; 3],
            parameters: MacdParameters::default(),
            signals: Vec::new(),
            error: None,
        };
        assert_eq!(result.signal_offset(), 0);
        assert_eq!(compute_macd_default(&[1.0]).signal_offset(), 0);
    }

    #[test]
    fn signal_line_is_ema_of_macd_line() {
        let result = compute_macd_default(&wave(80));
        assert_eq!(result.signal_line(), compute_ema(result.macd_line(), 9));
        assert_eq!(result.signal_offset(), 8);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let prices = wave(150);
        let first = compute_macd_default(&prices);
        let second = compute_macd_default(&prices);

        assert_eq!(bits(first.macd_line()), bits(second.macd_line()));
        assert_eq!(bits(first.signal_line()), bits(second.signal_line()));
        assert_eq!(bits(first.histogram()), bits(second.histogram()));
        assert_eq!(first.signals(), second.signals());
    }

    #[test]
    fn signals_match_detector_over_aligned_slices() {
        let result = compute_macd_default(&wave(200));
        let offset = result.signal_offset();
        let expected = detect_signals(
            &result.macd_line()[offset..],
            result.signal_line(),
            result.histogram(),
        );
        assert!(!expected.is_empty());
        assert_eq!(result.signals(), expected.as_slice());
    }

    #[test]
    fn oscillating_prices_produce_both_directions() {
        let result = compute_macd_default(&wave(200));
        let kinds: Vec<SignalKind> = result.signals().iter().map(|s| s.kind).collect();
        assert!(kinds.contains(&SignalKind::Buy));
        assert!(kinds.contains(&SignalKind::Sell));
        for pair in kinds.windows(2) {
            assert_ne!(pair[0], pair[1], "crossings must alternate");
        }
    }

    #[test]
    fn rising_prices_have_positive_macd() {
        let prices: Vec<f64> = (1..=60).map(f64::from).collect();
        let result = compute_macd_default(&prices);
        assert!(result.macd_line().iter().all(|v| *v > 0.0));
    }

    #[test]
    fn parameters_are_recorded() {
        let params = MacdParameters::new(5, 10, 3);
        let result = compute_macd(&wave(40), params);
        assert_eq!(result.parameters(), params);
        assert_eq!(result.macd_line().len(), 31);
        assert_eq!(result.signal_line().len(), 29);
    }

    #[test]
    fn inverted_periods_still_end_on_last_price() {
        let prices = wave(40);
        let result = compute_macd(&prices, MacdParameters::new(10, 5, 3));

        let ten = compute_ema(&prices, 10);
        let five = compute_ema(&prices, 5);
        assert_eq!(result.macd_line().len(), ten.len());
        assert_eq!(
            *result.macd_line().last().unwrap(),
            ten.last().unwrap() - five.last().unwrap()
        );
    }

    #[test]
    fn insufficient_result_serializes_error() {
        let json = serde_json::to_value(compute_macd_default(&[1.0, 2.0])).unwrap();
        assert_eq!(json["error"]["required"], 26);
        assert_eq!(json["macd_line"].as_array().unwrap().len(), 0);

        let ok = serde_json::to_value(compute_macd_default(&wave(40))).unwrap();
        assert!(ok.get("error").is_none());
        assert_eq!(ok["parameters"]["signal_period"], 9);
    }
}
