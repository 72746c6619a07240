use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// In-memory fixed-window rate limiter keyed by an arbitrary string.
///
/// Used for login attempts, where no database row exists to count against.
/// Windows are per-key and reset `window` after the first hit; counts are
/// per-process, which is acceptable for a single-binary deployment.
///
/// Keys are attacker-controlled (usernames), so expired windows are swept
/// out of the map instead of lingering until the next hit on the same key.
pub struct FixedWindowLimiter {
    max_hits: u32,
    window: Duration,
    hits: DashMap<String, (Instant, u32)>,
    last_sweep: Mutex<Instant>,
}

impl FixedWindowLimiter {
    pub fn new(max_hits: u32, window: Duration) -> Self {
        Self {
            max_hits,
            window,
            hits: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Record a hit for `key`. Returns `Err(retry_after_secs)` when the key
    /// has exhausted its window. A `max_hits` of 0 disables limiting.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        if self.max_hits == 0 {
            return Ok(());
        }

        let now = Instant::now();
        self.sweep(now);

        let mut entry = self
            .hits
            .entry(key.to_string())
            .or_insert_with(|| (now, 0));

        let (window_start, count) = *entry;
        if now.duration_since(window_start) >= self.window {
            *entry = (now, 1);
            return Ok(());
        }

        if count >= self.max_hits {
            let retry_after = self
                .window
                .saturating_sub(now.duration_since(window_start))
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        *entry = (window_start, count + 1);
        Ok(())
    }

    /// Drop every expired entry, at most once per window.
    fn sweep(&self, now: Instant) {
        {
            let Ok(mut last) = self.last_sweep.lock() else {
                return;
            };
            if now.duration_since(*last) < self.window {
                return;
            }
            *last = now;
        }

        self.hits
            .retain(|_, (start, _)| now.duration_since(*start) < self.window);
    }
}
