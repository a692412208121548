//! Poll cycle: refresh every followed repository, report branches that moved
//! and persist their new tips.
//!
//! A sweep visits repositories one at a time. Each one is polled on the
//! blocking pool under its registry lock and bounded by `repo_timeout`; a
//! failure or timeout skips that repository for this sweep and leaves its
//! stored state untouched. Notification happens once per sweep, after every
//! lock has been released.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::error::{AppError, Result};
use crate::git::VcsGateway;
use crate::models::{ChangeReport, RepoId};
use crate::notify::{self, NotificationSink};
use crate::registry::Registry;
use crate::report;

const PENDING: u8 = 0;
const COMMITTED: u8 = 1;
const CANCELLED: u8 = 2;

/// Decides, once, whether a poll's result is kept or thrown away.
///
/// The worker commits right before persisting; the sweep cancels when the
/// timeout fires. Whichever side wins, state is written only if the report
/// computed from it is delivered too.
struct CommitGate(AtomicU8);

impl CommitGate {
    fn new() -> Self {
        Self(AtomicU8::new(PENDING))
    }

    fn try_commit(&self) -> bool {
        self.0
            .compare_exchange(PENDING, COMMITTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire) == CANCELLED
    }

    fn cancel(&self) -> bool {
        self.0
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub reports: Vec<ChangeReport>,
    pub failures: Vec<(RepoId, String)>,
    /// Rendered notice, when any repository had new commits
    pub notice: Option<String>,
}

pub struct ChangeDetector {
    registry: Arc<Registry>,
    gateway: Arc<dyn VcsGateway>,
    sink: Arc<dyn NotificationSink>,
    destinations: Vec<String>,
    repo_timeout: Duration,
}

impl ChangeDetector {
    pub fn new(
        registry: Arc<Registry>,
        gateway: Arc<dyn VcsGateway>,
        sink: Arc<dyn NotificationSink>,
        destinations: Vec<String>,
        repo_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            gateway,
            sink,
            destinations,
            repo_timeout,
        }
    }

    /// One full pass over every followed repository.
    pub async fn sweep(self: &Arc<Self>) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();

        let ids = match self.registry.list() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("Could not list followed repositories: {}", e);
                return outcome;
            }
        };
        tracing::debug!("Polling {} repositories", ids.len());

        for id in ids {
            match self.poll_with_timeout(&id).await {
                Ok(Some(report)) => {
                    tracing::info!("{}: {} new commit(s)", id, report.commit_count());
                    outcome.reports.push(report);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Skipping {} this cycle: {}", id, e);
                    outcome.failures.push((id, e.to_string()));
                }
            }
        }

        if !outcome.reports.is_empty() {
            let notice = report::render(&outcome.reports);
            notify::broadcast(self.sink.as_ref(), &self.destinations, &notice);
            outcome.notice = Some(notice);
        }

        outcome
    }

    async fn poll_with_timeout(self: &Arc<Self>, id: &RepoId) -> Result<Option<ChangeReport>> {
        let gate = Arc::new(CommitGate::new());

        let detector = Arc::clone(self);
        let task_id = id.clone();
        let task_gate = Arc::clone(&gate);
        let mut handle =
            tokio::task::spawn_blocking(move || detector.poll_repo(&task_id, &task_gate));

        let finished = tokio::time::timeout(self.repo_timeout, &mut handle).await;
        match finished {
            Ok(joined) => joined.map_err(|e| AppError::Internal(format!("poll task failed: {}", e)))?,
            Err(_) if gate.cancel() => Err(AppError::Timeout(format!(
                "polling {} took longer than {:?}",
                id, self.repo_timeout
            ))),
            // The worker already persisted; its report must not be lost.
            Err(_) => handle
                .await
                .map_err(|e| AppError::Internal(format!("poll task failed: {}", e)))?,
        }
    }

    fn poll_repo(&self, id: &RepoId, gate: &CommitGate) -> Result<Option<ChangeReport>> {
        self.registry.with_repo_lock(id, || {
            // The sweep may have given up while this worker waited for the lock.
            if gate.is_cancelled() {
                return Err(abandoned(id));
            }

            let Some(before) = self.registry.get_or_discard(id)? else {
                tracing::debug!("{} is no longer followed", id);
                return Ok(None);
            };

            tracing::debug!("Fetching all heads of {}", id);
            self.gateway.fetch_all_heads(id, &|| gate.is_cancelled())?;
            if gate.is_cancelled() {
                return Err(abandoned(id));
            }
            let heads = self.gateway.list_head_revisions(id)?;

            for branch in before.stale_branches(&heads) {
                tracing::info!("{}: branch {} is gone upstream, dropping it", id, branch);
            }

            let moved = before.moved_branches(&heads);
            let mut report = ChangeReport::new(id.clone());

            if !moved.is_empty() {
                let mut log = self.gateway.log_since(id, &before)?;
                for branch in moved {
                    if let (Some(old), Some(new)) = (before.get(&branch), heads.get(&branch)) {
                        tracing::debug!("{} {}: {} -> {}", id, branch, old.short(), new.short());
                    }
                    match log.remove(&branch) {
                        Some(commits) if !commits.is_empty() => report.push(branch, commits),
                        _ => tracing::info!("{} {}: moved without new commits", id, branch),
                    }
                }
            }

            let after = before.advanced_to(&heads);

            if !gate.try_commit() {
                return Err(abandoned(id));
            }
            if after != before {
                self.registry.set(id, &after)?;
            }

            Ok((!report.is_empty()).then_some(report))
        })
    }

    /// Sweep forever on a fixed interval. Sweeps never overlap: a tick that
    /// comes due while one is still running is skipped.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        tracing::info!("Poller started, interval {:?}", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let outcome = self.sweep().await;
            tracing::debug!(
                "Sweep done: {} report(s), {} failure(s)",
                outcome.reports.len(),
                outcome.failures.len()
            );
        }
    }
}

fn abandoned(id: &RepoId) -> AppError {
    AppError::Timeout(format!("poll of {} was abandoned", id))
}
