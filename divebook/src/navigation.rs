//! Page-transition tracking for the global loading indicator.
//!
//! Page routes run behind [`track_navigation`], which opens a
//! [`NavigationGuard`] before the handler and closes it with the response
//! status. While any navigation is open the loading flag is `true`. Every
//! start arms a fallback timer; when a timer fires it abandons each open
//! navigation older than the timeout, so a stuck handler cannot pin the
//! indicator no matter how much other traffic arrives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationPhase {
    Started,
    Finished,
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct NavigationEvent {
    pub id: u64,
    pub phase: NavigationPhase,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    open: HashMap<u64, OpenNavigation>,
}

#[derive(Debug)]
struct OpenNavigation {
    path: String,
    started: Instant,
}

#[derive(Debug, Clone)]
pub struct NavigationTracker {
    inner: Arc<Mutex<Inner>>,
    loading: Arc<watch::Sender<bool>>,
    events: broadcast::Sender<NavigationEvent>,
    timeout: Duration,
}

impl NavigationTracker {
    pub fn new(timeout: Duration) -> Self {
        let (loading, _) = watch::channel(false);
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            loading: Arc::new(loading),
            events,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn watch_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NavigationEvent> {
        self.events.subscribe()
    }

    /// Open a navigation. Must be called inside a tokio runtime.
    pub fn begin(&self, path: impl Into<String>) -> NavigationGuard {
        let path = path.into();
        let id = {
            let mut inner = self.lock();
            inner.next_id += 1;
            let id = inner.next_id;
            inner.open.insert(
                id,
                OpenNavigation {
                    path: path.clone(),
                    started: Instant::now(),
                },
            );
            id
        };

        self.loading.send_replace(true);
        self.publish(id, NavigationPhase::Started, &path, None);
        self.arm_fallback();

        NavigationGuard {
            tracker: self.clone(),
            id,
            path,
            done: false,
        }
    }

    fn finish(&self, id: u64, path: &str, status: Option<u16>) {
        let (was_open, idle) = {
            let mut inner = self.lock();
            let was_open = inner.open.remove(&id).is_some();
            (was_open, inner.open.is_empty())
        };
        if !was_open {
            // Already abandoned by the fallback timer.
            return;
        }
        if idle {
            self.loading.send_replace(false);
        }
        self.publish(id, NavigationPhase::Finished, path, status);
    }

    fn arm_fallback(&self) {
        let tracker = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(tracker.timeout).await;
            tracker.expire();
        });
    }

    /// Abandon every open navigation that has outlived the timeout.
    fn expire(&self) {
        let (abandoned, idle) = {
            let mut inner = self.lock();
            let now = Instant::now();
            let stale: Vec<u64> = inner
                .open
                .iter()
                .filter(|(_, open)| now.duration_since(open.started) >= self.timeout)
                .map(|(id, _)| *id)
                .collect();
            let abandoned: Vec<(u64, String)> = stale
                .into_iter()
                .filter_map(|id| inner.open.remove(&id).map(|open| (id, open.path)))
                .collect();
            (abandoned, inner.open.is_empty())
        };
        if abandoned.is_empty() {
            return;
        }

        warn!(
            abandoned = abandoned.len(),
            timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            "navigation did not finish in time; clearing loading flag"
        );
        if idle {
            self.loading.send_replace(false);
        }
        for (id, path) in abandoned {
            self.publish(id, NavigationPhase::TimedOut, &path, None);
        }
    }

    fn publish(&self, id: u64, phase: NavigationPhase, path: &str, status: Option<u16>) {
        debug!(id, ?phase, path, "navigation event");
        let _ = self.events.send(NavigationEvent {
            id,
            phase,
            path: path.to_string(),
            status,
        });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Closes its navigation when finished or dropped.
#[derive(Debug)]
pub struct NavigationGuard {
    tracker: NavigationTracker,
    id: u64,
    path: String,
    done: bool,
}

impl NavigationGuard {
    pub fn finish(mut self, status: StatusCode) {
        self.done = true;
        self.tracker
            .finish(self.id, &self.path, Some(status.as_u16()));
    }
}

impl Drop for NavigationGuard {
    fn drop(&mut self) {
        if !self.done {
            self.tracker.finish(self.id, &self.path, None);
        }
    }
}

/// Middleware wrapping page routes.
pub async fn track_navigation(
    State(tracker): State<NavigationTracker>,
    request: Request,
    next: Next,
) -> Response {
    let guard = tracker.begin(request.uri().path());
    let response = next.run(request).await;
    guard.finish(response.status());
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;

    use super::{NavigationPhase, NavigationTracker};

    #[tokio::test]
    async fn loading_follows_open_navigations() {
        let tracker = NavigationTracker::new(Duration::from_secs(30));
        let mut events = tracker.subscribe();

        let first = tracker.begin("/courses");
        let second = tracker.begin("/trips");
        assert!(tracker.is_loading());

        first.finish(StatusCode::OK);
        assert!(tracker.is_loading());
        second.finish(StatusCode::NOT_FOUND);
        assert!(!tracker.is_loading());

        let phases: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|event| (event.phase, event.path, event.status))
            .collect();
        assert_eq!(
            phases,
            vec![
                (NavigationPhase::Started, "/courses".to_string(), None),
                (NavigationPhase::Started, "/trips".to_string(), None),
                (NavigationPhase::Finished, "/courses".to_string(), Some(200)),
                (NavigationPhase::Finished, "/trips".to_string(), Some(404)),
            ]
        );
    }

    #[tokio::test]
    async fn dropped_guard_closes_navigation() {
        let tracker = NavigationTracker::new(Duration::from_secs(30));
        {
            let _guard = tracker.begin("/gallery");
            assert!(tracker.is_loading());
        }
        assert!(!tracker.is_loading());
    }

    #[tokio::test]
    async fn fallback_timeout_clears_stuck_indicator() {
        let tracker = NavigationTracker::new(Duration::from_millis(30));
        let mut loading = tracker.watch_loading();
        let mut events = tracker.subscribe();

        let stuck = tracker.begin("/blog");
        assert!(*loading.borrow_and_update());

        tokio::time::timeout(Duration::from_secs(2), loading.changed())
            .await
            .expect("fallback should fire")
            .unwrap();
        assert!(!tracker.is_loading());

        let phases: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|event| event.phase)
            .collect();
        assert_eq!(
            phases,
            vec![NavigationPhase::Started, NavigationPhase::TimedOut]
        );

        let later = tracker.begin("/courses");
        stuck.finish(StatusCode::OK);
        assert!(tracker.is_loading(), "late finish must not close other navigations");
        later.finish(StatusCode::OK);
        assert!(!tracker.is_loading());
    }

    #[tokio::test]
    async fn steady_traffic_does_not_keep_stuck_navigation_alive() {
        let tracker = NavigationTracker::new(Duration::from_millis(100));
        let mut events = tracker.subscribe();
        let _stuck = tracker.begin("/stuck");

        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tracker.begin("/courses").finish(StatusCode::OK);
        }
        assert!(!tracker.is_loading());

        let timed_out: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|event| event.phase == NavigationPhase::TimedOut)
            .map(|event| event.path)
            .collect();
        assert_eq!(timed_out, vec!["/stuck".to_string()]);
    }
}
