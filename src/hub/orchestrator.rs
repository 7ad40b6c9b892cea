//! Activity commands
//!
//! Sends `runactivity` to the hub, retries while the hub reports busy and
//! reconciles every switch once the hub confirms. The background refresh is
//! paused for the whole lifetime of a command.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use super::refresher::BackgroundRefresher;
use super::state::ActivityStateCache;
use super::switches::ActivitySwitchSet;
use super::transport::HubSession;
use crate::models::{ActivityId, ResponseStatus};

pub const RUN_ACTIVITY_CMD: &str = "harmony.activityengine?runactivity";

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Exchanges allowed for one command while the hub stays busy
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            retry_delay: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCommand {
    pub target: ActivityId,
    pub attempt_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Hub confirmed, switches reconciled
    Activated,
    /// Hub stayed busy past the retry budget
    Abandoned,
    /// Transport failure or unexpected reply, switches untouched
    Failed,
    /// A newer command took over during a retry delay
    Superseded,
}

pub fn run_activity_params(activity_id: ActivityId) -> Value {
    json!({
        "async": "true",
        "timestamp": 0,
        "args": {"rule": "start"},
        "activityId": activity_id.to_string(),
    })
}

pub struct CommandOrchestrator {
    session: Arc<HubSession>,
    cache: Arc<ActivityStateCache>,
    switches: Arc<ActivitySwitchSet>,
    refresher: Arc<BackgroundRefresher>,
    policy: RetryPolicy,
    generation: AtomicU64,
}

impl CommandOrchestrator {
    pub fn new(
        session: Arc<HubSession>,
        cache: Arc<ActivityStateCache>,
        switches: Arc<ActivitySwitchSet>,
        refresher: Arc<BackgroundRefresher>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            session,
            cache,
            switches,
            refresher,
            policy,
            generation: AtomicU64::new(0),
        }
    }

    /// Release the refresh pause, unless a newer command is still outstanding
    fn finish(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.refresher.resume();
        } else {
            tracing::debug!("[Command] Newer command outstanding, refresh stays paused");
        }
    }

    /// Drive the hub to `target`. Busy retries go straight back to the hub and
    /// do not pass through the skip-if-same-state check again.
    pub async fn command(&self, target: ActivityId) -> CommandOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.refresher.pause();

        let mut pending = PendingCommand {
            target,
            attempt_count: 0,
        };

        loop {
            let response = match self
                .session
                .exchange(RUN_ACTIVITY_CMD, run_activity_params(target))
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!("[Command] Could not send activity {}: {}", target, e);
                    self.finish(generation);
                    return CommandOutcome::Failed;
                }
            };

            match response.status() {
                ResponseStatus::Success => {
                    pending.attempt_count = 0;
                    self.switches.reconcile(target).await;
                    self.cache.record(target).await;
                    self.finish(generation);
                    return CommandOutcome::Activated;
                }
                ResponseStatus::Busy => {
                    pending.attempt_count += 1;
                    tracing::warn!(
                        "[Command] Hub busy for activity {} (code {:?}, attempt {}/{})",
                        target,
                        response.code(),
                        pending.attempt_count,
                        self.policy.max_attempts
                    );

                    tokio::time::sleep(self.policy.retry_delay).await;

                    if self.generation.load(Ordering::SeqCst) != generation {
                        tracing::debug!(
                            "[Command] Activity {} superseded by a newer command",
                            target
                        );
                        return CommandOutcome::Superseded;
                    }

                    if pending.attempt_count < self.policy.max_attempts {
                        tracing::debug!("[Command] Retrying activity {}", target);
                        continue;
                    }

                    match self.switches.find_by_activity(target).await {
                        Some(switch) => {
                            tracing::error!(
                                "[Command] Could not set {}, no more retries",
                                switch.name
                            );
                            self.switches.update_activity_value(target, false).await;
                        }
                        None => tracing::error!(
                            "[Command] Could not set activity {}, no more retries",
                            target
                        ),
                    }
                    self.finish(generation);
                    return CommandOutcome::Abandoned;
                }
                ResponseStatus::Error => {
                    tracing::error!(
                        "[Command] Could not set activity {}: code {:?} msg {:?}",
                        target,
                        response.code(),
                        response.msg
                    );
                    self.finish(generation);
                    return CommandOutcome::Failed;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HubError;
    use crate::hub::testing::ScriptedTransport;
    use crate::models::{Activity, OFF_ACTIVITY_ID};

    struct Fixture {
        transport: Arc<ScriptedTransport>,
        cache: Arc<ActivityStateCache>,
        switches: Arc<ActivitySwitchSet>,
        refresher: Arc<BackgroundRefresher>,
        orchestrator: Arc<CommandOrchestrator>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(ScriptedTransport::new());
        let session = Arc::new(HubSession::new("hub-1", transport.clone()));
        let cache = Arc::new(ActivityStateCache::new(session.clone()));
        let switches = Arc::new(ActivitySwitchSet::new(
            &[
                Activity::new(-1, "Off"),
                Activity::new(1, "Watch TV"),
                Activity::new(2, "Listen Music"),
            ],
            false,
        ));
        let refresher = Arc::new(BackgroundRefresher::new(
            None,
            cache.clone(),
            switches.clone(),
        ));
        let orchestrator = Arc::new(CommandOrchestrator::new(
            session,
            cache.clone(),
            switches.clone(),
            refresher.clone(),
            RetryPolicy::default(),
        ));
        Fixture {
            transport,
            cache,
            switches,
            refresher,
            orchestrator,
        }
    }

    async fn states(switches: &ActivitySwitchSet) -> Vec<(ActivityId, bool)> {
        switches
            .snapshot()
            .await
            .into_iter()
            .map(|s| (s.activity_id, s.on))
            .collect()
    }

    fn ok() -> Value {
        json!({"code": 200, "msg": "OK"})
    }

    #[test]
    fn test_run_activity_params() {
        assert_eq!(
            run_activity_params(31337),
            json!({
                "async": "true",
                "timestamp": 0,
                "args": {"rule": "start"},
                "activityId": "31337"
            })
        );
    }

    #[tokio::test]
    async fn test_success_then_off() {
        let f = fixture();
        f.transport.push_replies(ok(), 2);

        assert_eq!(f.orchestrator.command(1).await, CommandOutcome::Activated);
        assert_eq!(states(&f.switches).await, vec![(-1, false), (1, true), (2, false)]);
        assert_eq!(f.cache.status().current_activity, Some(1));

        assert_eq!(
            f.orchestrator.command(OFF_ACTIVITY_ID).await,
            CommandOutcome::Activated
        );
        assert_eq!(states(&f.switches).await, vec![(-1, true), (1, false), (2, false)]);
        assert_eq!(f.cache.status().current_activity, Some(-1));

        let sent = f.transport.sent();
        assert_eq!(sent[0].hbus.cmd, RUN_ACTIVITY_CMD);
        assert_eq!(sent[0].hbus.params["activityId"], "1");
        assert_eq!(sent[1].hbus.params["activityId"], "-1");
        assert!(!f.refresher.is_paused());
    }

    #[tokio::test]
    async fn test_switching_between_activities() {
        let f = fixture();
        f.transport.push_replies(ok(), 2);

        f.orchestrator.command(1).await;
        f.orchestrator.command(2).await;

        assert_eq!(states(&f.switches).await, vec![(-1, false), (1, false), (2, true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_until_ceiling_abandons() {
        let f = fixture();
        f.transport.push_replies(json!({"code": 100, "msg": "In progress"}), 12);
        f.switches.update_value("Watch TV", true).await;

        let start = tokio::time::Instant::now();
        let outcome = f.orchestrator.command(1).await;

        assert_eq!(outcome, CommandOutcome::Abandoned);
        assert_eq!(f.transport.sent_count(), 12);
        assert!(start.elapsed() >= Duration::from_secs(24));
        assert_eq!(f.switches.value("Watch TV").await, Some(false));
        assert_eq!(f.cache.status().current_activity, None);
        assert!(!f.refresher.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_then_success() {
        let f = fixture();
        f.transport.push_replies(json!({"code": 202}), 3);
        f.transport.push_reply(ok());

        assert_eq!(f.orchestrator.command(2).await, CommandOutcome::Activated);
        assert_eq!(f.transport.sent_count(), 4);
        assert_eq!(states(&f.switches).await, vec![(-1, false), (1, false), (2, true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresher_paused_while_command_in_flight() {
        let f = fixture();
        f.transport.push_reply(json!({"code": 202}));
        f.transport.push_reply(ok());

        let orchestrator = f.orchestrator.clone();
        let task = tokio::spawn(async move { orchestrator.command(1).await });

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(f.refresher.is_paused());

        assert_eq!(task.await.unwrap(), CommandOutcome::Activated);
        assert!(!f.refresher.is_paused());
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_switches() {
        let f = fixture();
        f.transport.push_reply(ok());
        f.orchestrator.command(1).await;

        f.transport.push_failure(HubError::Transport("closed".to_string()));
        assert_eq!(f.orchestrator.command(2).await, CommandOutcome::Failed);

        assert_eq!(states(&f.switches).await, vec![(-1, false), (1, true), (2, false)]);
        assert!(!f.refresher.is_paused());
    }

    #[tokio::test]
    async fn test_error_code_leaves_switches() {
        let f = fixture();
        f.transport.push_reply(json!({"code": 500, "msg": "Internal"}));

        assert_eq!(f.orchestrator.command(2).await, CommandOutcome::Failed);
        assert!(states(&f.switches).await.iter().all(|(_, on)| !on));
        assert_eq!(f.transport.sent_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_stays_paused_until_last_command_ends() {
        let f = fixture();
        f.transport.set_reply_delay(Duration::from_millis(1000));
        f.transport.push_replies(ok(), 2);

        let orchestrator = f.orchestrator.clone();
        let first = tokio::spawn(async move { orchestrator.command(1).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        let orchestrator = f.orchestrator.clone();
        let second = tokio::spawn(async move { orchestrator.command(2).await });

        // First reply lands at 1000ms, the second command waits on the hub until 2000ms
        tokio::time::sleep(Duration::from_millis(1400)).await;
        assert!(first.is_finished());
        assert!(!second.is_finished());
        assert!(f.refresher.is_paused());

        assert_eq!(first.await.unwrap(), CommandOutcome::Activated);
        assert_eq!(second.await.unwrap(), CommandOutcome::Activated);
        assert!(!f.refresher.is_paused());
        assert_eq!(states(&f.switches).await, vec![(-1, false), (1, false), (2, true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_command_supersedes_retry() {
        let f = fixture();
        f.transport.push_reply(json!({"code": 202}));
        f.transport.push_reply(ok());

        let orchestrator = f.orchestrator.clone();
        let first = tokio::spawn(async move { orchestrator.command(1).await });
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(f.orchestrator.command(2).await, CommandOutcome::Activated);
        assert_eq!(first.await.unwrap(), CommandOutcome::Superseded);

        assert_eq!(f.transport.sent_count(), 2);
        assert_eq!(states(&f.switches).await, vec![(-1, false), (1, false), (2, true)]);
    }
}
