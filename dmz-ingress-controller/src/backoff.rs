use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use dmz_k8s_utils::ObjectKey;

/// Exponential backoff bounded by `min` and `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub min: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    /// Delay before the next attempt after `failures` previous failures.
    pub fn delay(&self, failures: u32) -> Duration {
        1u32.checked_shl(failures)
            .and_then(|factor| self.min.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Consecutive failures per Ingress. An entry lives from the first failure
/// until the next success, or until the Ingress is gone.
#[derive(Default)]
pub(crate) struct Failures {
    counts: Mutex<HashMap<ObjectKey, u32>>,
}

impl Failures {
    /// Records a failure and returns how many came before it. Entries of
    /// objects missing from `live` are dropped.
    pub fn record(&self, key: &ObjectKey, live: &HashSet<String>) -> u32 {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.retain(|k, _| k == key || live.contains(&k.to_string()));
        let failures = counts.entry(key.clone()).or_default();
        let previous = *failures;
        *failures = failures.saturating_add(1);
        previous
    }

    pub fn clear(&self, key: &ObjectKey) {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn get(&self, key: &ObjectKey) -> u32 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay() {
        let backoff = Backoff::new(Duration::from_secs(15), Duration::from_secs(60));
        let delays: Vec<u64> = (0..5).map(|n| backoff.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![15, 30, 60, 60, 60]);
        assert_eq!(backoff.delay(64), Duration::from_secs(60));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_max_below_min() {
        let backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(backoff.delay(0), Duration::from_secs(10));
        assert_eq!(backoff.delay(3), Duration::from_secs(10));
    }

    #[test]
    fn test_failures_count_until_cleared() {
        let failures = Failures::default();
        let key = ObjectKey::new(Some("dmz"), "web");
        let live = HashSet::from(["dmz/web".to_string()]);

        assert_eq!(failures.record(&key, &live), 0);
        assert_eq!(failures.record(&key, &live), 1);
        assert_eq!(failures.get(&key), 2);

        failures.clear(&key);
        assert_eq!(failures.get(&key), 0);
        assert_eq!(failures.len(), 0);
    }

    #[test]
    fn test_failures_of_deleted_objects_are_dropped() {
        let failures = Failures::default();
        let live = HashSet::new();
        for i in 0..1000 {
            failures.record(&ObjectKey::new(Some("dmz"), &format!("web-{i}")), &live);
        }
        assert_eq!(failures.len(), 1);

        let kept = ObjectKey::new(Some("dmz"), "kept");
        let live = HashSet::from(["dmz/kept".to_string()]);
        failures.record(&kept, &live);
        failures.record(&ObjectKey::new(Some("dmz"), "other"), &live);
        assert_eq!(failures.get(&kept), 1);
        assert_eq!(failures.len(), 2);
    }
}
