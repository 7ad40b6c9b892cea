//! Last-known current activity of the hub

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

use super::transport::HubSession;
use crate::error::HubError;
use crate::models::ActivityId;

pub const CURRENT_ACTIVITY_CMD: &str =
    "vnd.logitech.harmony/vnd.logitech.harmony.engine?getCurrentActivity";

/// A known current activity younger than this is served without asking the hub
pub const FRESHNESS_WINDOW: Duration = Duration::from_millis(1500);

#[derive(Debug, Default)]
struct CacheState {
    /// `None` means unknown, which is different from the off activity (-1)
    current: Option<ActivityId>,
    last_update: Option<Instant>,
}

impl CacheState {
    fn is_fresh(&self, window: Duration) -> bool {
        match (self.current, self.last_update) {
            (Some(_), Some(at)) => at.elapsed() < window,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStatus {
    pub current_activity: Option<ActivityId>,
    pub last_update_at: Option<DateTime<Utc>>,
}

pub struct ActivityStateCache {
    session: Arc<HubSession>,
    state: Mutex<CacheState>,
    /// Last published state, readable while an exchange holds `state`
    status: watch::Sender<CacheStatus>,
    window: Duration,
}

impl ActivityStateCache {
    pub fn new(session: Arc<HubSession>) -> Self {
        Self::with_window(session, FRESHNESS_WINDOW)
    }

    pub fn with_window(session: Arc<HubSession>, window: Duration) -> Self {
        Self {
            session,
            state: Mutex::new(CacheState::default()),
            status: watch::channel(CacheStatus::default()).0,
            window,
        }
    }

    /// Return the current activity, asking the hub only when the cached value is
    /// unknown or stale. Any failure leaves the cache unknown.
    ///
    /// The state lock is held across the exchange, so concurrent callers wait for
    /// the in-flight query and then take the fast path.
    pub async fn refresh(&self) -> Option<ActivityId> {
        let mut state = self.state.lock().await;

        if state.is_fresh(self.window) {
            tracing::debug!(
                "[State] No refresh needed, current activity {:?} is fresh",
                state.current
            );
            return state.current;
        }

        tracing::debug!(
            "[State] Refresh needed, current activity {:?} is stale or unknown",
            state.current
        );

        match self.query_current().await {
            Ok(id) => {
                state.current = Some(id);
                state.last_update = Some(Instant::now());
                self.status.send_modify(|status| {
                    status.current_activity = Some(id);
                    status.last_update_at = Some(Utc::now());
                });
            }
            Err(e) => {
                tracing::warn!("[State] Could not refresh current activity: {}", e);
                state.current = None;
                self.status.send_modify(|status| status.current_activity = None);
            }
        }
        state.current
    }

    async fn query_current(&self) -> Result<ActivityId, HubError> {
        let response = self
            .session
            .exchange(CURRENT_ACTIVITY_CMD, json!({"verb": "get", "format": "json"}))
            .await?;

        response.current_activity().ok_or_else(|| {
            HubError::Protocol(format!(
                "unexpected current activity reply: code {:?} data {:?}",
                response.code(),
                response.data
            ))
        })
    }

    /// Record a hub-confirmed activity change. The freshness timestamp is left alone.
    pub async fn record(&self, id: ActivityId) {
        self.state.lock().await.current = Some(id);
        self.status.send_modify(|status| status.current_activity = Some(id));
    }

    /// Never waits on a refresh in flight
    pub fn status(&self) -> CacheStatus {
        self.status.borrow().clone()
    }
}
