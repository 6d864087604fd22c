//! Application state and rate limiting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use caseflow_engine::{InMemoryEventSource, InMemoryProgressStore, WorkflowEngine};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::RATE_LIMIT_WINDOW_SECS;

/// Requests seen from one client in the current window.
#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    requests: u64,
}

/// Fixed-window request budget per client IP.
pub(crate) struct RateLimiter {
    windows: Mutex<HashMap<IpAddr, Window>>,
    budget: u64,
    length: Duration,
}

impl RateLimiter {
    pub(crate) fn new(budget: u64) -> Self {
        Self::with_window(budget, Duration::from_secs(RATE_LIMIT_WINDOW_SECS))
    }

    fn with_window(budget: u64, length: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            budget,
            length,
        }
    }

    /// Charge one request to `ip`.
    ///
    /// Fails with the seconds left in the window once the budget is spent.
    /// Expired windows of other clients are dropped whenever a new client
    /// shows up.
    pub(crate) async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        if !windows.contains_key(&ip) {
            let before = windows.len();
            windows.retain(|_, w| now.duration_since(w.opened) < self.length);
            if windows.len() < before {
                debug!(dropped = before - windows.len(), "Expired rate windows dropped");
            }
        }

        let window = windows.entry(ip).or_insert(Window {
            opened: now,
            requests: 0,
        });
        let age = now.duration_since(window.opened);
        if age >= self.length {
            trace!(%ip, served = window.requests, "Rate window rolled over");
            *window = Window {
                opened: now,
                requests: 0,
            };
        }

        if window.requests >= self.budget {
            let left = self.length.saturating_sub(now.duration_since(window.opened));
            return Err(left.as_secs().max(1));
        }
        window.requests += 1;
        Ok(())
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.windows.lock().await.len()
    }
}

/// Application state shared across request handlers.
pub(crate) struct AppState {
    pub(crate) engine: WorkflowEngine<InMemoryProgressStore>,
    /// Also registered with the engine as event source and rollback observer.
    pub(crate) events: Arc<InMemoryEventSource>,
    pub(crate) rate_limiter: RateLimiter,
    /// None = no auth required.
    pub(crate) api_key: Option<String>,
}
