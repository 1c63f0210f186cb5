//! Sliding-window rate limiting.
//!
//! A single [`RateLimiter`] instance is shared by the dispatcher across all
//! tool invocations. The evict-then-append sequence runs under one mutex so
//! concurrent checks cannot overshoot the window.

use crate::error::{ServerError, ServerResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Point-in-time view of the limiter, for observability.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RateLimiterStats {
    pub enabled: bool,
    pub current_requests: usize,
    pub max_requests: u32,
    pub window_ms: u64,
}

/// In-memory sliding-window request counter.
#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    max_requests: u32,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(enabled: bool, max_requests: u32, window: Duration) -> Self {
        Self {
            enabled,
            max_requests,
            window,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Disabled limiter that admits every request.
    pub fn disabled() -> Self {
        Self::new(false, 0, Duration::ZERO)
    }

    /// Admit or reject one request.
    ///
    /// Evicts timestamps older than the window, then either records `now`
    /// and succeeds, or fails with a retry-after hint computed from the
    /// oldest surviving timestamp.
    pub fn check_limit(&self) -> ServerResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();
        while let Some(oldest) = timestamps.front() {
            if now.duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
        if timestamps.len() >= self.max_requests as usize {
            // Front is the oldest in-window entry; the window frees up when
            // it expires.
            let retry_after_ms = timestamps
                .front()
                .map(|oldest| {
                    let elapsed = now.duration_since(*oldest);
                    self.window.saturating_sub(elapsed).as_millis() as u64
                })
                .unwrap_or(0);
            return Err(ServerError::rate_limited(retry_after_ms.div_ceil(1000).max(1)));
        }
        timestamps.push_back(now);
        Ok(())
    }

    /// Clear all recorded timestamps.
    pub fn reset(&self) {
        self.timestamps.lock().clear();
    }

    /// Current in-window count plus the static limits.
    pub fn stats(&self) -> RateLimiterStats {
        let now = Instant::now();
        let timestamps = self.timestamps.lock();
        let current = timestamps
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count();
        RateLimiterStats {
            enabled: self.enabled,
            current_requests: current,
            max_requests: self.max_requests,
            window_ms: self.window.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_limiter_always_admits() {
        let limiter = RateLimiter::disabled();
        for _ in 0..1000 {
            assert!(limiter.check_limit().is_ok());
        }
    }

    #[test]
    fn test_exactly_max_requests_admitted() {
        let limiter = RateLimiter::new(true, 5, Duration::from_secs(60));
        for i in 0..5 {
            assert!(limiter.check_limit().is_ok(), "request {i}");
        }
        let err = limiter.check_limit().unwrap_err();
        match err {
            ServerError::RateLimited { retry_after_secs } => {
                assert!(retry_after_secs >= 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_window_expiry_readmits() {
        let limiter = RateLimiter::new(true, 2, Duration::from_millis(50));
        assert!(limiter.check_limit().is_ok());
        assert!(limiter.check_limit().is_ok());
        assert!(limiter.check_limit().is_err());
        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.check_limit().is_ok());
    }

    #[test]
    fn test_reset_clears_window() {
        let limiter = RateLimiter::new(true, 1, Duration::from_secs(60));
        assert!(limiter.check_limit().is_ok());
        assert!(limiter.check_limit().is_err());
        limiter.reset();
        assert!(limiter.check_limit().is_ok());
    }

    #[test]
    fn test_stats_reflect_in_window_count() {
        let limiter = RateLimiter::new(true, 10, Duration::from_secs(60));
        limiter.check_limit().ok();
        limiter.check_limit().ok();
        limiter.check_limit().ok();
        let stats = limiter.stats();
        assert!(stats.enabled);
        assert_eq!(stats.current_requests, 3);
        assert_eq!(stats.max_requests, 10);
        assert_eq!(stats.window_ms, 60_000);
    }

    #[test]
    fn test_rejection_does_not_consume_capacity() {
        let limiter = RateLimiter::new(true, 2, Duration::from_millis(50));
        assert!(limiter.check_limit().is_ok());
        assert!(limiter.check_limit().is_ok());
        // Rejected calls record nothing, so expiry of the two admitted
        // requests is what frees the window.
        for _ in 0..10 {
            assert!(limiter.check_limit().is_err());
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.check_limit().is_ok());
    }

    #[test]
    fn test_concurrent_checks_never_exceed_max() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let limiter = Arc::new(RateLimiter::new(true, 50, Duration::from_secs(60)));
        let admitted = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        if limiter.check_limit().is_ok() {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread");
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 50);
    }
}
