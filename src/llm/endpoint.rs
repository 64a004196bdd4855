//! Dual (or N-way) endpoint health tracking and selection for the LLM client.
//!
//! Grounded in the teacher's shared-client-pool pattern (one pooled `reqwest::Client` for
//! the whole process) generalized to track per-endpoint health the teacher didn't need,
//! since it only ever spoke to a single configured base URL per wrapper.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Selection policy across a pool's configured endpoints (spec §6: `llm.mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointMode {
    /// Spread requests across every healthy endpoint, breaking ties round-robin.
    ActiveActive,
    /// Always prefer the first configured endpoint; only fail over to the next one in
    /// priority order when the preferred endpoint is unreachable or unhealthy.
    PrimarySecondary,
}

impl Default for EndpointMode {
    fn default() -> Self {
        EndpointMode::ActiveActive
    }
}

/// How an endpoint is currently regarded by the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health bookkeeping for a single configured LLM endpoint.
#[derive(Debug, Clone)]
pub struct EndpointHealth {
    pub url: String,
    pub status: EndpointStatus,
    pub consecutive_failures: u32,
    pub avg_response_ms: f64,
    pub last_check: DateTime<Utc>,
}

impl EndpointHealth {
    fn new(url: String) -> Self {
        Self {
            url,
            status: EndpointStatus::Healthy,
            consecutive_failures: 0,
            avg_response_ms: 0.0,
            last_check: Utc::now(),
        }
    }

    /// A lower score is better. Unhealthy endpoints are filtered out before scoring, not
    /// scored against healthy ones.
    fn score(&self) -> f64 {
        let status_penalty = match self.status {
            EndpointStatus::Healthy => 0.0,
            EndpointStatus::Degraded => 1000.0,
            EndpointStatus::Unhealthy => f64::INFINITY,
        };
        status_penalty + self.avg_response_ms
    }

    fn record_success(&mut self, elapsed_ms: f64) {
        self.consecutive_failures = 0;
        self.status = EndpointStatus::Healthy;
        self.avg_response_ms = if self.avg_response_ms == 0.0 {
            elapsed_ms
        } else {
            0.7 * self.avg_response_ms + 0.3 * elapsed_ms
        };
        self.last_check = Utc::now();
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.status = match self.status {
            EndpointStatus::Healthy => EndpointStatus::Degraded,
            EndpointStatus::Degraded if self.consecutive_failures >= 3 => {
                EndpointStatus::Unhealthy
            }
            other => other,
        };
        self.last_check = Utc::now();
    }
}

/// Tracks health across every configured endpoint and selects which one to try next.
///
/// Selection picks the best-scoring healthy (or, failing that, degraded) endpoint, with
/// ties broken round-robin via an internal cursor so load spreads across equally-good
/// endpoints instead of pinning to the first in the list.
pub struct EndpointPool {
    endpoints: Mutex<Vec<EndpointHealth>>,
    cursor: Mutex<usize>,
    mode: EndpointMode,
}

impl EndpointPool {
    pub fn new(urls: Vec<String>) -> Self {
        Self::with_mode(urls, EndpointMode::ActiveActive)
    }

    pub fn with_mode(urls: Vec<String>, mode: EndpointMode) -> Self {
        assert!(!urls.is_empty(), "EndpointPool requires at least one endpoint");
        Self {
            endpoints: Mutex::new(urls.into_iter().map(EndpointHealth::new).collect()),
            cursor: Mutex::new(0),
            mode,
        }
    }

    pub fn snapshot(&self) -> Vec<EndpointHealth> {
        self.endpoints.lock().unwrap().clone()
    }

    /// Selects the next endpoint to try, skipping endpoints already excluded by the
    /// caller's retry loop (e.g. ones already attempted for the current request).
    ///
    /// In `PrimarySecondary` mode, candidates are walked in configured order and the first
    /// reachable one wins — no round-robin tie-break, since the whole point is to pin to
    /// the preferred endpoint whenever it's usable.
    pub fn select(&self, exclude: &[String]) -> Option<String> {
        let endpoints = self.endpoints.lock().unwrap();
        let candidates: Vec<&EndpointHealth> = endpoints
            .iter()
            .filter(|e| e.status != EndpointStatus::Unhealthy && !exclude.contains(&e.url))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        if self.mode == EndpointMode::PrimarySecondary {
            return Some(candidates[0].url.clone());
        }

        let mut candidates = candidates;
        candidates.sort_by(|a, b| a.score().partial_cmp(&b.score()).unwrap());
        let best_score = candidates[0].score();
        let tied: Vec<&&EndpointHealth> = candidates
            .iter()
            .take_while(|e| (e.score() - best_score).abs() < f64::EPSILON)
            .collect();

        let mut cursor = self.cursor.lock().unwrap();
        let choice = tied[*cursor % tied.len()];
        *cursor = cursor.wrapping_add(1);
        Some(choice.url.clone())
    }

    /// All endpoints currently reachable (healthy or degraded).
    pub fn any_reachable(&self) -> bool {
        self.endpoints
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.status != EndpointStatus::Unhealthy)
    }

    pub fn record_success(&self, url: &str, elapsed_ms: f64) {
        let mut endpoints = self.endpoints.lock().unwrap();
        if let Some(e) = endpoints.iter_mut().find(|e| e.url == url) {
            e.record_success(elapsed_ms);
        }
    }

    pub fn record_failure(&self, url: &str) {
        let mut endpoints = self.endpoints.lock().unwrap();
        if let Some(e) = endpoints.iter_mut().find(|e| e.url == url) {
            e.record_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_failure_degrades_not_unhealthy() {
        let pool = EndpointPool::new(vec!["http://a".into()]);
        pool.record_failure("http://a");
        assert_eq!(pool.snapshot()[0].status, EndpointStatus::Degraded);
    }

    #[test]
    fn three_consecutive_failures_mark_unhealthy() {
        let pool = EndpointPool::new(vec!["http://a".into()]);
        pool.record_failure("http://a");
        pool.record_failure("http://a");
        pool.record_failure("http://a");
        assert_eq!(pool.snapshot()[0].status, EndpointStatus::Unhealthy);
        assert!(!pool.any_reachable());
    }

    #[test]
    fn success_resets_to_healthy() {
        let pool = EndpointPool::new(vec!["http://a".into()]);
        pool.record_failure("http://a");
        pool.record_failure("http://a");
        pool.record_success("http://a", 10.0);
        assert_eq!(pool.snapshot()[0].status, EndpointStatus::Healthy);
        assert_eq!(pool.snapshot()[0].consecutive_failures, 0);
    }

    #[test]
    fn selection_skips_unhealthy_endpoints() {
        let pool = EndpointPool::new(vec!["http://a".into(), "http://b".into()]);
        for _ in 0..3 {
            pool.record_failure("http://a");
        }
        assert_eq!(pool.select(&[]).as_deref(), Some("http://b"));
    }

    #[test]
    fn all_unhealthy_returns_none() {
        let pool = EndpointPool::new(vec!["http://a".into()]);
        for _ in 0..3 {
            pool.record_failure("http://a");
        }
        assert!(pool.select(&[]).is_none());
    }

    #[test]
    fn primary_secondary_mode_always_prefers_the_first_endpoint() {
        let pool = EndpointPool::with_mode(
            vec!["http://primary".into(), "http://secondary".into()],
            EndpointMode::PrimarySecondary,
        );
        pool.record_success("http://secondary", 5.0);
        assert_eq!(pool.select(&[]).as_deref(), Some("http://primary"));
    }

    #[test]
    fn primary_secondary_mode_fails_over_when_primary_unhealthy() {
        let pool = EndpointPool::with_mode(
            vec!["http://primary".into(), "http://secondary".into()],
            EndpointMode::PrimarySecondary,
        );
        for _ in 0..3 {
            pool.record_failure("http://primary");
        }
        assert_eq!(pool.select(&[]).as_deref(), Some("http://secondary"));
    }
}
