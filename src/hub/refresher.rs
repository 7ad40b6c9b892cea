//! Background refresh of the switch states
//!
//! Periodically refreshes the activity cache and applies it to every switch.
//! Commands pause the loop while they are in flight so state reads never race
//! an activity change; resuming restarts the period.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::state::ActivityStateCache;
use super::switches::ActivitySwitchSet;

pub struct BackgroundRefresher {
    period: Option<Duration>,
    cache: Arc<ActivityStateCache>,
    switches: Arc<ActivitySwitchSet>,
    paused: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundRefresher {
    /// `period: None` disables the loop; pause/resume still track command state
    pub fn new(
        period: Option<Duration>,
        cache: Arc<ActivityStateCache>,
        switches: Arc<ActivitySwitchSet>,
    ) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            period,
            cache,
            switches,
            paused,
            task: Mutex::new(None),
        }
    }

    /// Spawn the refresh loop (no-op if disabled or already running)
    pub async fn start(self: &Arc<Self>) {
        let Some(period) = self.period else {
            tracing::debug!("[Refresh] Background refresh disabled");
            return;
        };

        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }

        tracing::info!(
            "[Refresh] Starting background refresh (interval: {}s)",
            period.as_secs_f64()
        );

        let this = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            this.run(period).await;
        }));
    }

    async fn run(&self, period: Duration) {
        let mut paused = self.paused.subscribe();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *paused.borrow_and_update() {
                if paused.wait_for(|p| !*p).await.is_err() {
                    break;
                }
                ticker.reset();
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = paused.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            self.refresh_once().await;
        }
    }

    /// Refresh the cache and push it onto every switch
    pub async fn refresh_once(&self) {
        let current = self.cache.refresh().await;
        self.switches.apply_current(current).await;
    }

    pub fn pause(&self) {
        if !self.paused.send_replace(true) {
            tracing::debug!("[Refresh] Paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.send_replace(false) {
            tracing::debug!("[Refresh] Resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
            tracing::info!("[Refresh] Background refresh stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::testing::ScriptedTransport;
    use crate::hub::transport::HubSession;
    use crate::models::Activity;
    use serde_json::json;

    fn refresher(
        transport: &Arc<ScriptedTransport>,
        period: Option<Duration>,
    ) -> Arc<BackgroundRefresher> {
        let session = Arc::new(HubSession::new("hub-1", transport.clone()));
        let cache = Arc::new(ActivityStateCache::new(session));
        let switches = Arc::new(ActivitySwitchSet::new(
            &[Activity::new(-1, "Off"), Activity::new(1, "Watch TV")],
            false,
        ));
        Arc::new(BackgroundRefresher::new(period, cache, switches))
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_refresh_updates_switches() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_replies(json!({"code": 200, "data": {"result": "1"}}), 10);
        let refresher = refresher(&transport, Some(Duration::from_secs(5)));

        refresher.start().await;
        time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(transport.sent_count(), 0);

        time::sleep(Duration::from_millis(5_200)).await;
        assert_eq!(transport.sent_count(), 2);
        assert_eq!(refresher.switches.value("Watch TV").await, Some(true));
        assert_eq!(refresher.switches.value("Off").await, Some(false));
        assert!(refresher.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_replies(json!({"code": 200, "data": {"result": "-1"}}), 10);
        let refresher = refresher(&transport, Some(Duration::from_secs(5)));
        refresher.start().await;

        refresher.pause();
        assert!(refresher.is_paused());
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.sent_count(), 0);

        refresher.resume();
        assert!(!refresher.is_paused());
        time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(transport.sent_count(), 1);
        assert_eq!(refresher.switches.value("Off").await, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_refresher_never_runs() {
        let transport = Arc::new(ScriptedTransport::new());
        let refresher = refresher(&transport, None);

        refresher.start().await;
        time::sleep(Duration::from_secs(60)).await;

        assert!(!refresher.is_running().await);
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop() {
        let transport = Arc::new(ScriptedTransport::new());
        let refresher = refresher(&transport, Some(Duration::from_secs(5)));
        refresher.start().await;

        refresher.stop().await;
        time::sleep(Duration::from_secs(20)).await;

        assert!(!refresher.is_running().await);
        assert_eq!(transport.sent_count(), 0);
    }
}
