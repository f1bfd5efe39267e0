// Trading strategy module: EMA crossover with one-candle confirmation
pub mod confirmation;
pub mod crossover;

pub use confirmation::{Confirmation, PendingSignal};
pub use crossover::{EmaPair, SignalDetector};
