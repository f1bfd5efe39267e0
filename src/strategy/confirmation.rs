use chrono::{DateTime, Utc};

use super::EmaPair;

/// Crossover waiting for the next candle to confirm it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSignal {
    pub signal_candle_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Latest candle is still the crossover candle
    Waiting,
    Confirmed,
    Invalidated,
}

impl PendingSignal {
    pub fn new(signal_candle_timestamp: DateTime<Utc>) -> Self {
        Self {
            signal_candle_timestamp,
        }
    }

    /// Judge the signal against the latest candle
    ///
    /// Only a candle with a different timestamp is a confirmation candle.
    /// Any outcome other than `Waiting` is final.
    pub fn evaluate(&self, latest_timestamp: DateTime<Utc>, emas: &EmaPair) -> Confirmation {
        if latest_timestamp == self.signal_candle_timestamp {
            return Confirmation::Waiting;
        }

        if emas.short_above_long() {
            Confirmation::Confirmed
        } else {
            Confirmation::Invalidated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn emas(short: f64, long: f64) -> EmaPair {
        EmaPair {
            short: vec![short],
            long: vec![long],
        }
    }

    #[test]
    fn test_same_candle_keeps_waiting() {
        let pending = PendingSignal::new(t0());
        assert_eq!(pending.evaluate(t0(), &emas(11.0, 10.0)), Confirmation::Waiting);
    }

    #[test]
    fn test_new_candle_confirms_when_short_still_above() {
        let pending = PendingSignal::new(t0());
        let next = t0() + Duration::minutes(15);
        assert_eq!(pending.evaluate(next, &emas(11.0, 10.0)), Confirmation::Confirmed);
    }

    #[test]
    fn test_new_candle_invalidates_when_cross_reverts() {
        let pending = PendingSignal::new(t0());
        let next = t0() + Duration::minutes(15);
        assert_eq!(pending.evaluate(next, &emas(9.0, 10.0)), Confirmation::Invalidated);
        // A tie is not a confirmation either
        assert_eq!(pending.evaluate(next, &emas(10.0, 10.0)), Confirmation::Invalidated);
    }
}
