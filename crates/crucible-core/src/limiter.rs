use crate::errors::AdmissionTimeout;
use crate::model::ProviderKind;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Admission key: one window per (provider, credential) pair, shared across
/// all runs that use the same credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimiterKey {
    pub provider: ProviderKind,
    pub credential: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
}

/// Permission to issue exactly one request against a provider/key.
#[derive(Debug)]
pub struct AdmissionToken {
    pub admitted_at: Instant,
}

#[derive(Debug)]
struct Window {
    minute_start: Instant,
    minute_count: u32,
    hour_start: Instant,
    hour_count: u32,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self {
            minute_start: now,
            minute_count: 0,
            hour_start: now,
            hour_count: 0,
        }
    }

    fn roll(&mut self, now: Instant, minute: Duration, hour: Duration) {
        if now.saturating_duration_since(self.minute_start) >= minute {
            self.minute_start = now;
            self.minute_count = 0;
        }
        if now.saturating_duration_since(self.hour_start) >= hour {
            self.hour_start = now;
            self.hour_count = 0;
        }
    }
}

/// Fixed-window token admission keyed by (provider, credential).
///
/// Counts reset at the minute/hour boundaries. This permits brief bursts at
/// window edges (up to twice the per-minute limit across one boundary);
/// callers that need smooth pacing must shape traffic upstream.
pub struct RateLimiter {
    limits: RateLimits,
    minute: Duration,
    hour: Duration,
    windows: Mutex<HashMap<LimiterKey, Window>>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self::with_windows(limits, Duration::from_secs(60), Duration::from_secs(3600))
    }

    pub(crate) fn with_windows(limits: RateLimits, minute: Duration, hour: Duration) -> Self {
        Self {
            limits,
            minute,
            hour,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Suspends until a slot is free within both the per-minute and per-hour
    /// windows. Fails fast with `AdmissionTimeout` when the required wait
    /// cannot complete before `deadline`.
    pub async fn acquire(
        &self,
        key: &LimiterKey,
        deadline: Duration,
    ) -> Result<AdmissionToken, AdmissionTimeout> {
        let started = Instant::now();
        loop {
            let wait = {
                let mut windows = self.windows.lock().unwrap();
                let now = Instant::now();
                let w = windows
                    .entry(key.clone())
                    .or_insert_with(|| Window::new(now));
                w.roll(now, self.minute, self.hour);

                if w.minute_count < self.limits.per_minute && w.hour_count < self.limits.per_hour {
                    w.minute_count += 1;
                    w.hour_count += 1;
                    return Ok(AdmissionToken { admitted_at: now });
                }

                // earliest instant at which both windows have capacity again
                let mut next = now;
                if w.minute_count >= self.limits.per_minute {
                    next = next.max(w.minute_start + self.minute);
                }
                if w.hour_count >= self.limits.per_hour {
                    next = next.max(w.hour_start + self.hour);
                }
                next.saturating_duration_since(now)
            };

            if started.elapsed() + wait > deadline {
                let waited_ms = started.elapsed().as_millis() as u64;
                tracing::debug!(waited_ms, "rate limiter admission deadline exceeded");
                return Err(AdmissionTimeout { waited_ms });
            }
            sleep(wait).await;
        }
    }
}
