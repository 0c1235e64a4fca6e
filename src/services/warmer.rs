//! Periodic cache warming for every entity kind.
//!
//! One loop drives all kinds, each on its own interval. The time of each kind's
//! last complete warm is persisted in `app_kv` so a restart only waits out the
//! remaining cooldown instead of re-warming everything.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::cache::WarmTarget;
use crate::data::kv;
use crate::services::Service;
use crate::state::{ServiceStatus, ServiceStatusRegistry};

/// How often the loop checks whether any kind is due.
const TICK: Duration = Duration::from_secs(30);

/// Grace period for in-progress warms after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Time left before a kind last warmed at `persisted` is due again.
fn remaining_cooldown(persisted: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> Duration {
    let Some(ts) = persisted else {
        return Duration::ZERO;
    };
    // A timestamp in the future (clock skew) counts as "just warmed".
    let elapsed = (now - ts).to_std().unwrap_or(Duration::ZERO);
    interval.saturating_sub(elapsed)
}

struct Scheduled {
    target: Arc<dyn WarmTarget>,
    due: Instant,
    /// This kind's in-progress warm, if one was started.
    running: Option<JoinHandle<()>>,
}

impl Scheduled {
    fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// Indices of targets due at `now` whose previous warm has finished, with
/// their next due time pushed out by one interval.
///
/// A due kind that is still warming stays due, so it starts on the first tick
/// after it finishes. Other kinds are never held back by it.
fn take_due(schedule: &mut [Scheduled], now: Instant) -> Vec<usize> {
    schedule
        .iter_mut()
        .enumerate()
        .filter_map(|(i, s)| {
            if s.due > now {
                return None;
            }
            if s.is_running() {
                trace!(kind = %s.target.kind(), "Previous warm still running, skipping");
                return None;
            }
            s.due = now + s.target.interval();
            Some(i)
        })
        .collect()
}

pub struct WarmerService {
    targets: Vec<Arc<dyn WarmTarget>>,
    pool: Option<PgPool>,
    statuses: ServiceStatusRegistry,
}

impl WarmerService {
    pub fn new(targets: Vec<Arc<dyn WarmTarget>>, pool: Option<PgPool>, statuses: ServiceStatusRegistry) -> Self {
        Self {
            targets,
            pool,
            statuses,
        }
    }

    async fn load_schedule(&self) -> Vec<Scheduled> {
        let persisted = match &self.pool {
            Some(pool) => kv::warm_timestamps(pool).await.unwrap_or_else(|e| {
                warn!(error = ?e, "Failed to load warm timestamps, warming everything now");
                HashMap::new()
            }),
            None => HashMap::new(),
        };

        let now = Utc::now();
        self.targets
            .iter()
            .map(|target| {
                let last = persisted.get(target.kind().as_str()).copied();
                let cooldown = remaining_cooldown(last, now, target.interval());
                if last.is_some() {
                    debug!(kind = %target.kind(), last_warm = ?last, cooldown = ?cooldown, "Loaded persisted warm timestamp");
                }
                Scheduled {
                    target: target.clone(),
                    due: Instant::now() + cooldown,
                    running: None,
                }
            })
            .collect()
    }

    /// Warm one kind, persisting the timestamp if the run completed.
    async fn warm_one(target: Arc<dyn WarmTarget>, pool: Option<PgPool>) {
        let report = target.warm().await;
        if !report.is_complete() {
            if let Some(e) = &report.error {
                warn!(kind = %report.kind, upserted = report.upserted, error = %e, "Warm stopped early");
            }
            return;
        }
        if let Some(pool) = &pool
            && let Err(e) = kv::set_warm_timestamp(pool, report.kind, Utc::now()).await
        {
            warn!(kind = %report.kind, error = ?e, "Failed to persist warm timestamp");
        }
    }
}

#[async_trait]
impl Service for WarmerService {
    fn name(&self) -> &'static str {
        "warmer"
    }

    async fn run(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), anyhow::Error> {
        info!(kinds = self.targets.len(), "Warmer service started");
        self.statuses.set(self.name(), ServiceStatus::Active);

        let mut schedule = self.load_schedule().await;
        let cancel_token = CancellationToken::new();
        let mut next_run = Instant::now();

        loop {
            tokio::select! {
                _ = time::sleep_until(next_run) => {
                    next_run = Instant::now() + TICK;

                    for i in take_due(&mut schedule, Instant::now()) {
                        let slot = &mut schedule[i];
                        let kind = slot.target.kind();
                        debug!(kind = %kind, "Starting warm");

                        let target = slot.target.clone();
                        let pool = self.pool.clone();
                        let cancel_token = cancel_token.clone();
                        slot.running = Some(tokio::spawn(async move {
                            tokio::select! {
                                _ = Self::warm_one(target, pool) => {}
                                _ = cancel_token.cancelled() => {
                                    trace!(kind = %kind, "Warm cancelled");
                                }
                            }
                        }));
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Warmer received shutdown signal");
                    cancel_token.cancel();

                    let running: Vec<JoinHandle<()>> = schedule.iter_mut().filter_map(|s| s.running.take()).collect();
                    if !running.is_empty()
                        && time::timeout(SHUTDOWN_GRACE, futures::future::join_all(running)).await.is_err()
                    {
                        warn!("Warms did not stop within grace period, abandoning");
                    }

                    info!("Warmer exiting gracefully");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{EntityKind, WarmReport};

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn never_warmed_is_due_now() {
        assert_eq!(remaining_cooldown(None, Utc::now(), DAY), Duration::ZERO);
    }

    #[test]
    fn recent_warm_keeps_remaining_cooldown() {
        let now = Utc::now();
        let persisted = now - chrono::Duration::hours(6);
        assert_eq!(remaining_cooldown(Some(persisted), now, DAY), Duration::from_secs(18 * 60 * 60));
    }

    #[test]
    fn old_warm_is_due_now() {
        let now = Utc::now();
        let persisted = now - chrono::Duration::days(3);
        assert_eq!(remaining_cooldown(Some(persisted), now, DAY), Duration::ZERO);
    }

    #[test]
    fn future_timestamp_waits_full_interval() {
        let now = Utc::now();
        let persisted = now + chrono::Duration::minutes(5);
        assert_eq!(remaining_cooldown(Some(persisted), now, DAY), DAY);
    }

    struct Idle {
        kind: EntityKind,
        interval: Duration,
    }

    #[async_trait]
    impl WarmTarget for Idle {
        fn kind(&self) -> EntityKind {
            self.kind
        }

        fn interval(&self) -> Duration {
            self.interval
        }

        async fn warm(&self) -> WarmReport {
            WarmReport {
                kind: self.kind,
                pages: 0,
                upserted: 0,
                error: None,
            }
        }
    }

    fn slot(kind: EntityKind, interval: Duration, due: Instant) -> Scheduled {
        Scheduled {
            target: Arc::new(Idle { kind, interval }),
            due,
            running: None,
        }
    }

    #[tokio::test]
    async fn slow_kind_does_not_hold_back_others() {
        let now = Instant::now();
        let mut schedule = vec![
            slot(EntityKind::Item, DAY, now),
            slot(EntityKind::Server, Duration::from_secs(150), now),
        ];
        schedule[0].running = Some(tokio::spawn(time::sleep(Duration::from_secs(3600))));

        assert_eq!(take_due(&mut schedule, now), vec![1]);
        // The busy kind stays due; the started one moves out by its interval.
        assert_eq!(schedule[0].due, now);
        assert_eq!(schedule[1].due, now + Duration::from_secs(150));

        let later = now + Duration::from_secs(200);
        assert_eq!(take_due(&mut schedule, later), vec![1]);

        if let Some(handle) = schedule[0].running.take() {
            handle.abort();
            let _ = handle.await;
        }
        assert_eq!(take_due(&mut schedule, later), vec![0]);
        assert_eq!(schedule[0].due, later + DAY);
    }

    #[tokio::test]
    async fn finished_warm_does_not_block_next_run() {
        let now = Instant::now();
        let mut schedule = vec![slot(EntityKind::Commodity, DAY, now)];
        let handle = tokio::spawn(async {});
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        schedule[0].running = Some(handle);

        assert_eq!(take_due(&mut schedule, now), vec![0]);
    }

    #[tokio::test]
    async fn nothing_due_before_its_time() {
        let now = Instant::now();
        let mut schedule = vec![slot(EntityKind::Mob, DAY, now + Duration::from_secs(60))];
        assert!(take_due(&mut schedule, now).is_empty());
    }
}
