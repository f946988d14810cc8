use crate::core::WaitPolicy;
use crate::errors::{PipelineError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const QUIET_WINDOW: Duration = Duration::from_millis(500);

const SNAPSHOT_SCRIPT: &str = r#"
    (function() {
        const pending = performance.getEntriesByType('resource')
            .filter(e => e.responseEnd === 0).length;
        return {
            readyState: document.readyState,
            resources: performance.getEntriesByType('resource').length,
            pending: pending
        };
    })()
"#;

/// Anything that can evaluate a script in the page and hand back its JSON value.
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    async fn evaluate(&self, script: &str) -> Result<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    fn parse(raw: &str) -> Self {
        match raw {
            "complete" => ReadyState::Complete,
            "interactive" => ReadyState::Interactive,
            _ => ReadyState::Loading,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkSnapshot {
    pub ready_state: ReadyState,
    pub resources: u64,
    pub pending: u64,
}

impl NetworkSnapshot {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            ready_state: ReadyState::parse(obj.get("readyState")?.as_str()?),
            resources: obj.get("resources").and_then(|v| v.as_u64()).unwrap_or(0),
            pending: obj.get("pending").and_then(|v| v.as_u64()).unwrap_or(0),
        })
    }
}

/// Tracks resource counts between polls. The page counts as idle once it is
/// fully loaded, nothing is pending and the count has not moved for the quiet window.
#[derive(Debug)]
pub struct IdleTracker {
    quiet: Duration,
    last_resources: Option<u64>,
    stable_since: Instant,
}

impl IdleTracker {
    pub fn new(quiet: Duration, now: Instant) -> Self {
        Self {
            quiet,
            last_resources: None,
            stable_since: now,
        }
    }

    pub fn observe(&mut self, snapshot: NetworkSnapshot, now: Instant) -> bool {
        if self.last_resources != Some(snapshot.resources) || snapshot.pending > 0 {
            self.last_resources = Some(snapshot.resources);
            self.stable_since = now;
            return false;
        }
        snapshot.ready_state == ReadyState::Complete
            && now.duration_since(self.stable_since) >= self.quiet
    }
}

pub struct NavigationManager;

impl NavigationManager {
    pub async fn wait_for_policy<E: ScriptEvaluator + ?Sized>(
        page: &E,
        policy: WaitPolicy,
        timeout: Duration,
    ) -> Result<()> {
        match policy {
            WaitPolicy::DomContentLoaded => {
                Self::wait_for_ready_state(page, ReadyState::Interactive, timeout).await
            }
            WaitPolicy::Load => Self::wait_for_ready_state(page, ReadyState::Complete, timeout).await,
            WaitPolicy::NetworkIdle => Self::wait_for_network_idle(page, timeout).await,
        }
    }

    pub async fn wait_for_ready_state<E: ScriptEvaluator + ?Sized>(
        page: &E,
        target: ReadyState,
        timeout: Duration,
    ) -> Result<()> {
        let start_time = Instant::now();

        while start_time.elapsed() < timeout {
            // Evaluation fails while the old document is being torn down; keep polling
            if let Ok(snapshot) = Self::snapshot(page).await {
                if snapshot.ready_state >= target {
                    return Ok(());
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        Err(PipelineError::timeout(
            format!("document ready state {:?}", target),
            timeout.as_millis() as u64,
        ))
    }

    pub async fn wait_for_network_idle<E: ScriptEvaluator + ?Sized>(
        page: &E,
        timeout: Duration,
    ) -> Result<()> {
        let start_time = Instant::now();
        let mut tracker = IdleTracker::new(QUIET_WINDOW, start_time);

        while start_time.elapsed() < timeout {
            if let Ok(snapshot) = Self::snapshot(page).await {
                if tracker.observe(snapshot, Instant::now()) {
                    return Ok(());
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        Err(PipelineError::timeout(
            "network idle",
            timeout.as_millis() as u64,
        ))
    }

    async fn snapshot<E: ScriptEvaluator + ?Sized>(page: &E) -> Result<NetworkSnapshot> {
        let value = page.evaluate(SNAPSHOT_SCRIPT).await?;
        NetworkSnapshot::from_value(&value).ok_or_else(|| {
            PipelineError::Unexpected(format!("unexpected readiness payload: {}", value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn snap(ready: ReadyState, resources: u64, pending: u64) -> NetworkSnapshot {
        NetworkSnapshot {
            ready_state: ready,
            resources,
            pending,
        }
    }

    #[test]
    fn test_snapshot_parsing() {
        let parsed = NetworkSnapshot::from_value(
            &json!({"readyState": "interactive", "resources": 12, "pending": 3}),
        )
        .unwrap();
        assert_eq!(parsed, snap(ReadyState::Interactive, 12, 3));
        assert!(NetworkSnapshot::from_value(&json!("complete")).is_none());
    }

    #[test]
    fn test_idle_requires_quiet_window() {
        let t0 = Instant::now();
        let mut tracker = IdleTracker::new(Duration::from_millis(500), t0);

        assert!(!tracker.observe(snap(ReadyState::Complete, 10, 0), t0));
        assert!(!tracker.observe(
            snap(ReadyState::Complete, 10, 0),
            t0 + Duration::from_millis(200)
        ));
        // a new request resets the window
        assert!(!tracker.observe(
            snap(ReadyState::Complete, 11, 0),
            t0 + Duration::from_millis(400)
        ));
        assert!(!tracker.observe(
            snap(ReadyState::Complete, 11, 0),
            t0 + Duration::from_millis(800)
        ));
        assert!(tracker.observe(
            snap(ReadyState::Complete, 11, 0),
            t0 + Duration::from_millis(950)
        ));
    }

    #[test]
    fn test_not_idle_while_loading() {
        let t0 = Instant::now();
        let mut tracker = IdleTracker::new(Duration::from_millis(100), t0);
        tracker.observe(snap(ReadyState::Interactive, 4, 0), t0);
        assert!(!tracker.observe(
            snap(ReadyState::Interactive, 4, 0),
            t0 + Duration::from_secs(1)
        ));
    }

    struct Replay(Mutex<Vec<Value>>);

    #[async_trait]
    impl ScriptEvaluator for Replay {
        async fn evaluate(&self, _script: &str) -> Result<Value> {
            let mut values = self.0.lock().unwrap();
            if values.len() > 1 {
                Ok(values.remove(0))
            } else {
                Ok(values[0].clone())
            }
        }
    }

    #[tokio::test]
    async fn test_ready_state_wait_resolves() {
        let page = Replay(Mutex::new(vec![
            json!({"readyState": "loading", "resources": 0, "pending": 0}),
            json!({"readyState": "interactive", "resources": 2, "pending": 1}),
        ]));
        tokio_test::assert_ok!(
            NavigationManager::wait_for_policy(
                &page,
                WaitPolicy::DomContentLoaded,
                Duration::from_secs(2)
            )
            .await
        );
    }

    #[tokio::test]
    async fn test_network_idle_times_out_when_busy() {
        let page = Replay(Mutex::new(vec![
            json!({"readyState": "complete", "resources": 5, "pending": 2}),
        ]));
        let err = NavigationManager::wait_for_network_idle(&page, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::errors::FailureKind::Timeout);
    }
}
