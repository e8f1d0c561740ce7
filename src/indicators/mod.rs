//! Technical indicator engine: EMA, MACD and crossover signals.
//!
//! Every function here is pure. Results depend only on the input slice and the
//! periods passed in, so independent calls can run concurrently.

pub mod crossover;
pub mod ema;
pub mod macd;

pub use crossover::{detect_signals, SignalEvent, SignalKind};
pub use ema::compute_ema;
pub use macd::{compute_macd, compute_macd_default, InsufficientData, MacdParameters, MacdResult};
