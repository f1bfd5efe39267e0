use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Last-emission time per message key, kept for the process lifetime only.
///
/// Keys older than the longest cooldown seen so far can no longer block
/// anything and are dropped on insert, so free-form keys do not accumulate.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_sent: HashMap<String, Instant>,
    max_cooldown: Duration,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` at `now` if its cooldown has elapsed (or it was never used)
    pub fn try_acquire_at(&mut self, key: &str, cooldown: Duration, now: Instant) -> bool {
        if let Some(&last) = self.last_sent.get(key) {
            if now.saturating_duration_since(last) < cooldown {
                return false;
            }
        }

        if cooldown > self.max_cooldown {
            self.max_cooldown = cooldown;
        }
        let horizon = self.max_cooldown;
        self.last_sent
            .retain(|_, last| now.saturating_duration_since(*last) < horizon);

        self.last_sent.insert(key.to_string(), now);
        true
    }

    pub fn try_acquire(&mut self, key: &str, cooldown: Duration) -> bool {
        self.try_acquire_at(key, cooldown, Instant::now())
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_use_is_allowed() {
        let mut tracker = CooldownTracker::new();
        assert!(tracker.try_acquire("loop_error", Duration::from_secs(300)));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_repeat_within_cooldown_is_suppressed() {
        let mut tracker = CooldownTracker::new();
        let t0 = Instant::now();
        let cooldown = Duration::from_secs(180);

        assert!(tracker.try_acquire_at("key", cooldown, t0));
        assert!(!tracker.try_acquire_at("key", cooldown, t0 + Duration::from_secs(179)));
        assert!(tracker.try_acquire_at("key", cooldown, t0 + Duration::from_secs(180)));
    }

    #[test]
    fn test_suppressed_attempt_does_not_extend_window() {
        let mut tracker = CooldownTracker::new();
        let t0 = Instant::now();
        let cooldown = Duration::from_secs(60);

        assert!(tracker.try_acquire_at("key", cooldown, t0));
        assert!(!tracker.try_acquire_at("key", cooldown, t0 + Duration::from_secs(50)));
        assert!(tracker.try_acquire_at("key", cooldown, t0 + Duration::from_secs(61)));
    }

    #[test]
    fn test_expired_keys_are_dropped() {
        let mut tracker = CooldownTracker::new();
        let t0 = Instant::now();
        let cooldown = Duration::from_secs(180);

        for i in 0..50 {
            let key = format!("Bought {}.0 AVAX", i);
            assert!(tracker.try_acquire_at(&key, cooldown, t0));
        }
        assert_eq!(tracker.len(), 50);

        // Every earlier key is past the longest cooldown, only the new one remains
        let later = t0 + Duration::from_secs(181);
        assert!(tracker.try_acquire_at("Sold 10.12 AVAX", cooldown, later));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_pruning_respects_longest_cooldown() {
        let mut tracker = CooldownTracker::new();
        let t0 = Instant::now();

        assert!(tracker.try_acquire_at("slow", Duration::from_secs(300), t0));
        // A short-cooldown insert must not evict the still-active long one
        let t1 = t0 + Duration::from_secs(200);
        assert!(tracker.try_acquire_at("fast", Duration::from_secs(60), t1));
        assert_eq!(tracker.len(), 2);
        assert!(!tracker.try_acquire_at("slow", Duration::from_secs(300), t1));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut tracker = CooldownTracker::new();
        let t0 = Instant::now();
        let cooldown = Duration::from_secs(60);

        assert!(tracker.try_acquire_at("a", cooldown, t0));
        assert!(tracker.try_acquire_at("b", cooldown, t0));
        assert!(!tracker.try_acquire_at("a", cooldown, t0));
    }
}
