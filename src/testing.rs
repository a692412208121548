//! In-memory gateway and sink used by the follow and poller tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{AppError, Result};
use crate::git::{BranchLog, VcsGateway};
use crate::models::state::rev;
use crate::models::{Branch, FollowedState, HeadState, RepoId, Revision};
use crate::notify::NotificationSink;

#[derive(Default)]
struct FakeRemote {
    heads: BTreeMap<Branch, Revision>,
    log: BTreeMap<Branch, Vec<String>>,
    failing: bool,
    delay: Option<Duration>,
}

#[derive(Default)]
pub struct FakeGateway {
    remotes: Mutex<HashMap<RepoId, FakeRemote>>,
    removed: Mutex<Vec<RepoId>>,
    clones: Mutex<Vec<String>>,
    fetches: Mutex<Vec<RepoId>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reachable remote; heads are `(branch, revision char)`.
    pub fn add_remote(&self, url: &str, heads: &[(&str, char)]) -> RepoId {
        let id = RepoId::from_url(url).unwrap();
        let remote = FakeRemote {
            heads: heads.iter().map(|(b, c)| (Branch::from(*b), rev(*c))).collect(),
            ..Default::default()
        };
        self.remotes.lock().unwrap().insert(id.clone(), remote);
        id
    }

    fn with_remote<F: FnOnce(&mut FakeRemote)>(&self, id: &RepoId, f: F) {
        let mut remotes = self.remotes.lock().unwrap();
        f(remotes.get_mut(id).expect("unknown fake remote"));
    }

    /// Move `branch` to a new tip, with `commits` as the log since the old one.
    pub fn push(&self, id: &RepoId, branch: &str, tip: char, commits: &[&str]) {
        self.with_remote(id, |remote| {
            remote.heads.insert(Branch::from(branch), rev(tip));
            remote.log.insert(
                Branch::from(branch),
                commits.iter().map(|c| c.to_string()).collect(),
            );
        });
    }

    pub fn delete_head(&self, id: &RepoId, branch: &str) {
        self.with_remote(id, |remote| {
            remote.heads.remove(&Branch::from(branch));
        });
    }

    pub fn set_failing(&self, id: &RepoId, failing: bool) {
        self.with_remote(id, |remote| remote.failing = failing);
    }

    pub fn set_delay(&self, id: &RepoId, delay: Duration) {
        self.with_remote(id, |remote| remote.delay = Some(delay));
    }

    pub fn removed(&self) -> Vec<RepoId> {
        self.removed.lock().unwrap().clone()
    }

    pub fn clones(&self) -> Vec<String> {
        self.clones.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<RepoId> {
        self.fetches.lock().unwrap().clone()
    }

    fn check(&self, id: &RepoId) -> Result<()> {
        let remotes = self.remotes.lock().unwrap();
        match remotes.get(id) {
            Some(remote) if !remote.failing => Ok(()),
            _ => Err(AppError::GatewayUnavailable(format!("{}: connection refused", id))),
        }
    }
}

impl VcsGateway for FakeGateway {
    fn clone_repo(&self, url: &str) -> Result<RepoId> {
        let id = RepoId::from_url(url)?;
        self.check(&id)?;
        self.clones.lock().unwrap().push(url.to_string());
        Ok(id)
    }

    fn fetch_all_heads(&self, repo: &RepoId, interrupted: &dyn Fn() -> bool) -> Result<()> {
        let delay = self.remotes.lock().unwrap().get(repo).and_then(|r| r.delay);
        if let Some(delay) = delay {
            let deadline = Instant::now() + delay;
            while Instant::now() < deadline {
                if interrupted() {
                    return Err(AppError::GatewayUnavailable(format!("{}: fetch interrupted", repo)));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        self.check(repo)?;
        self.fetches.lock().unwrap().push(repo.clone());
        Ok(())
    }

    fn list_head_revisions(&self, repo: &RepoId) -> Result<HeadState> {
        self.check(repo)?;
        let remotes = self.remotes.lock().unwrap();
        Ok(remotes[repo]
            .heads
            .iter()
            .map(|(b, r)| (b.clone(), r.clone()))
            .collect())
    }

    fn log_since(&self, repo: &RepoId, prior: &FollowedState) -> Result<BranchLog> {
        self.check(repo)?;
        let remotes = self.remotes.lock().unwrap();
        let remote = &remotes[repo];

        let mut log = BTreeMap::new();
        for (branch, since) in prior.iter() {
            let Some(tip) = remote.heads.get(branch) else {
                continue;
            };
            let commits = if tip == since {
                Vec::new()
            } else {
                remote.log.get(branch).cloned().unwrap_or_default()
            };
            log.insert(branch.clone(), commits);
        }
        Ok(log)
    }

    fn remove(&self, repo: &RepoId) -> Result<()> {
        self.removed.lock().unwrap().push(repo.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<(String, String)>>,
    refuse: Option<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that fails every delivery to `destination`.
    pub fn refusing(destination: &str) -> Self {
        Self {
            refuse: Some(destination.to_string()),
            ..Default::default()
        }
    }

    pub fn delivered(&self) -> Vec<(String, String)> {
        self.delivered.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, destination: &str, text: &str) -> Result<()> {
        if self.refuse.as_deref() == Some(destination) {
            return Err(AppError::Internal(format!("{} is unreachable", destination)));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((destination.to_string(), text.to_string()));
        Ok(())
    }
}
