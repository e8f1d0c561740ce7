//! MACD indicator engine with crossover signal detection, served to Kapacitor
//! as a batch UDF.
//!
//! The [`indicators`] module is a pure computation core and can be used on its
//! own:
//!
//! ```
//! use kapacitor_macd_batch_udf::indicators::{compute_macd, MacdParameters};
//!
//! let prices: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 / 3.0).sin()).collect();
//! let result = compute_macd(&prices, MacdParameters::default());
//!
//! assert!(!result.is_insufficient());
//! assert_eq!(result.histogram().len(), result.signal_line().len());
//! ```

pub mod handler;
pub mod indicators;
