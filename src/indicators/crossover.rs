//! Buy/sell crossover detection between the MACD and signal lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a crossover.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// MACD moved from at-or-below the signal line to strictly above it.
    Buy,
    /// MACD moved from at-or-above the signal line to strictly below it.
    Sell,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Buy => "buy",
            SignalKind::Sell => "sell",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single detected crossover.
///
/// `position` indexes the aligned series (signal line / histogram). The
/// `detected_at` timestamp is wall-clock capture time and takes no part in
/// equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    pub kind: SignalKind,
    pub position: usize,
    pub macd_value: f64,
    pub signal_value: f64,
    pub histogram_value: f64,
    pub detected_at: DateTime<Utc>,
}

impl PartialEq for SignalEvent {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.position == other.position
            && self.macd_value == other.macd_value
            && self.signal_value == other.signal_value
            && self.histogram_value == other.histogram_value
    }
}

/// Scans aligned MACD, signal and histogram slices for crossovers.
///
/// The slices are expected to have equal length; if they don't, only the
/// common prefix is scanned. Index 0 has no predecessor and never produces an
/// event. Every crossing is reported, consecutive ones included.
pub fn detect_signals(macd: &[f64], signal: &[f64], histogram: &[f64]) -> Vec<SignalEvent> {
    let len = macd.len().min(signal.len()).min(histogram.len());
    let detected_at = Utc::now();

    let mut events = Vec::new();
    for i in 1..len {
        let (prev_macd, prev_signal) = (macd[i - 1], signal[i - 1]);
        let (cur_macd, cur_signal) = (macd[i], signal[i]);

        let kind = if prev_macd <= prev_signal && cur_macd > cur_signal {
            SignalKind::Buy
        } else if prev_macd >= prev_signal && cur_macd < cur_signal {
            SignalKind::Sell
        } else {
            continue;
        };

        events.push(SignalEvent {
            kind,
            position: i,
            macd_value: cur_macd,
            signal_value: cur_signal,
            histogram_value: histogram[i],
            detected_at,
        });
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram(macd: &[f64], signal: &[f64]) -> Vec<f64> {
        macd.iter().zip(signal).map(|(m, s)| m - s).collect()
    }

    fn kinds(events: &[SignalEvent]) -> Vec<(SignalKind, usize)> {
        events.iter().map(|e| (e.kind, e.position)).collect()
    }

    #[test]
    fn single_upward_cross_is_one_buy() {
        let macd = [-3.0, -2.5, -2.0, -1.5, -1.0, 0.5, 1.0, 1.5];
        let signal = [0.0; 8];
        let hist = histogram(&macd, &signal);

        let events = detect_signals(&macd, &signal, &hist);
        assert_eq!(kinds(&events), vec![(SignalKind::Buy, 5)]);

        let buy = &events[0];
        assert_eq!(buy.macd_value, 0.5);
        assert_eq!(buy.signal_value, 0.0);
        assert_eq!(buy.histogram_value, 0.5);
    }

    #[test]
    fn staying_above_yields_nothing() {
        let macd = [2.0, 3.0, 2.5, 4.0, 3.5];
        let signal = [1.0, 1.5, 2.0, 2.5, 3.0];
        let hist = histogram(&macd, &signal);
        assert!(detect_signals(&macd, &signal, &hist).is_empty());
    }

    #[test]
    fn staying_below_yields_nothing() {
        let macd = [-2.0, -3.0, -2.5];
        let signal = [1.0, 1.5, 2.0];
        let hist = histogram(&macd, &signal);
        assert!(detect_signals(&macd, &signal, &hist).is_empty());
    }

    #[test]
    fn tie_then_rise_is_a_buy() {
        let macd = [1.0, 2.0];
        let signal = [1.0, 1.0];
        let hist = histogram(&macd, &signal);
        assert_eq!(
            kinds(&detect_signals(&macd, &signal, &hist)),
            vec![(SignalKind::Buy, 1)]
        );
    }

    #[test]
    fn tie_then_fall_is_a_sell() {
        let macd = [1.0, 0.0];
        let signal = [1.0, 1.0];
        let hist = histogram(&macd, &signal);
        assert_eq!(
            kinds(&detect_signals(&macd, &signal, &hist)),
            vec![(SignalKind::Sell, 1)]
        );
    }

    #[test]
    fn downward_cross_is_a_sell() {
        let macd = [3.0, 2.0, 1.0, -1.0, -2.0];
        let signal = [0.0; 5];
        let hist = histogram(&macd, &signal);
        assert_eq!(
            kinds(&detect_signals(&macd, &signal, &hist)),
            vec![(SignalKind::Sell, 3)]
        );
    }

    #[test]
    fn plateau_at_equality_emits_nothing() {
        let macd = [1.0, 1.0, 1.0, 1.0];
        let signal = [1.0, 1.0, 1.0, 1.0];
        let hist = histogram(&macd, &signal);
        assert!(detect_signals(&macd, &signal, &hist).is_empty());
    }

    #[test]
    fn consecutive_crossings_are_each_reported() {
        let macd = [-1.0, 1.0, -1.0, 1.0, -1.0];
        let signal = [0.0; 5];
        let hist = histogram(&macd, &signal);
        assert_eq!(
            kinds(&detect_signals(&macd, &signal, &hist)),
            vec![
                (SignalKind::Buy, 1),
                (SignalKind::Sell, 2),
                (SignalKind::Buy, 3),
                (SignalKind::Sell, 4),
            ]
        );
    }

    #[test]
    fn short_inputs_yield_nothing() {
        assert!(detect_signals(&[], &[], &[]).is_empty());
        assert!(detect_signals(&[1.0], &[0.0], &[1.0]).is_empty());
    }

    #[test]
    fn mismatched_lengths_scan_common_prefix() {
        let macd = [-1.0, 1.0, -1.0, 1.0];
        let signal = [0.0, 0.0];
        let hist = [-1.0, 1.0, -1.0];
        assert_eq!(
            kinds(&detect_signals(&macd, &signal, &hist)),
            vec![(SignalKind::Buy, 1)]
        );
    }

    #[test]
    fn equality_ignores_timestamp() {
        let macd = [-1.0, 1.0];
        let signal = [0.0, 0.0];
        let hist = histogram(&macd, &signal);
        let first = detect_signals(&macd, &signal, &hist);
        let mut second = detect_signals(&macd, &signal, &hist);
        second[0].detected_at = DateTime::<Utc>::UNIX_EPOCH;
        assert_eq!(first, second);
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&SignalKind::Sell).unwrap(), "\"sell\"");
        assert_eq!(SignalKind::Buy.to_string(), "buy");
    }
}
