use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Sliding-window request counter keyed by client address.
#[derive(Debug, Clone)]
pub struct IpRateLimiter {
    inner: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    window: Duration,
    max_requests: usize,
}

impl IpRateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_requests: max_requests.max(1),
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut guard = self.inner.lock();
        let window = self.window;
        let queue = guard.entry(key.to_string()).or_default();

        while let Some(front) = queue.front() {
            if now.duration_since(*front) > window {
                queue.pop_front();
            } else {
                break;
            }
        }

        if queue.len() >= self.max_requests {
            return false;
        }

        queue.push_back(now);

        // Idle clients would otherwise accumulate forever.
        if guard.len() > 4_096 {
            guard.retain(|_, hits| {
                hits.back()
                    .is_some_and(|last| now.duration_since(*last) <= window)
            });
        }
        true
    }
}
