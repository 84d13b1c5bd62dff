//! Single-slot value cache with a time-to-live.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct TtlCache<T> {
    value: Option<T>,
    fetched_at: Option<Instant>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            value: None,
            fetched_at: None,
            ttl,
        }
    }

    /// The cached value, if one was stored less than `ttl` ago.
    pub fn get(&self) -> Option<T> {
        self.get_at(Instant::now())
    }

    pub fn get_at(&self, now: Instant) -> Option<T> {
        let fetched_at = self.fetched_at?;
        if now.saturating_duration_since(fetched_at) >= self.ttl {
            return None;
        }
        self.value.clone()
    }

    pub fn set(&mut self, value: T) {
        self.set_at(value, Instant::now());
    }

    pub fn set_at(&mut self, value: T, now: Instant) {
        self.value = Some(value);
        self.fetched_at = Some(now);
    }

    pub fn invalidate(&mut self) {
        self.value = None;
        self.fetched_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cache_misses() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn fresh_value_hits_then_expires() {
        let start = Instant::now();
        let mut cache = TtlCache::new(Duration::from_secs(30));
        cache.set_at(vec![1, 2], start);
        assert_eq!(cache.get_at(start + Duration::from_secs(29)), Some(vec![1, 2]));
        assert_eq!(cache.get_at(start + Duration::from_secs(30)), None);
    }

    #[test]
    fn invalidate_clears() {
        let mut cache = TtlCache::new(Duration::from_secs(30));
        cache.set("x");
        cache.invalidate();
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn zero_ttl_never_hits() {
        let mut cache = TtlCache::new(Duration::ZERO);
        cache.set(5);
        assert_eq!(cache.get(), None);
    }
}
