use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

struct Window {
    max: usize,
    interval: Duration,
    history: VecDeque<Instant>,
}

/// Request-pacing gate built from one or more `(max, interval)` sliding
/// windows evaluated conjunctively: a caller proceeds only once every window
/// has capacity. Callers are delayed, never rejected.
pub struct RateLimiter {
    windows: Mutex<Vec<Window>>,
}

impl RateLimiter {
    pub fn new(constraints: &[(usize, Duration)]) -> Self {
        let windows = constraints
            .iter()
            .map(|&(max, interval)| Window {
                max,
                interval,
                history: VecDeque::with_capacity(max),
            })
            .collect();
        Self {
            windows: Mutex::new(windows),
        }
    }

    pub fn per_interval(max: usize, interval: Duration) -> Self {
        Self::new(&[(max, interval)])
    }

    /// Waits until every window permits another request, then records it.
    /// The lock is never held across the sleep, so concurrent callers queue
    /// up on the windows rather than on each other.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let now = Instant::now();
                let mut windows = self.windows.lock().await;
                let mut wait = Duration::ZERO;
                for w in windows.iter_mut() {
                    while let Some(&front) = w.history.front() {
                        if now.duration_since(front) >= w.interval {
                            w.history.pop_front();
                        } else {
                            break;
                        }
                    }
                    if w.history.len() >= w.max {
                        let ready = *w.history.front().unwrap() + w.interval;
                        wait = wait.max(ready.saturating_duration_since(now));
                    }
                }
                if wait.is_zero() {
                    for w in windows.iter_mut() {
                        w.history.push_back(now);
                    }
                    return;
                }
                wait
            };
            tokio::time::sleep(wait).await;
        }
    }
}
