//! Version-control boundary consumed by the follow manager and the poller.
//!
//! Every call may hit the network and may fail; callers treat any error as a
//! failure of that one repository.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{Branch, FollowedState, HeadState, RepoId};

/// Commit summaries per branch, in the order the gateway walked them.
pub type BranchLog = BTreeMap<Branch, Vec<String>>;

pub trait VcsGateway: Send + Sync {
    /// Clone `url` (or reuse an existing clone) and return its id.
    fn clone_repo(&self, url: &str) -> Result<RepoId>;

    /// Refresh every remote head. The transfer is aborted with an error as
    /// soon as `interrupted` returns true.
    fn fetch_all_heads(&self, repo: &RepoId, interrupted: &dyn Fn() -> bool) -> Result<()>;

    fn list_head_revisions(&self, repo: &RepoId) -> Result<HeadState>;

    /// For each branch of `prior` that still exists, the commits reachable
    /// from its current tip but not from the revision stored in `prior`.
    fn log_since(&self, repo: &RepoId, prior: &FollowedState) -> Result<BranchLog>;

    /// Delete the local clone data.
    fn remove(&self, repo: &RepoId) -> Result<()>;
}
