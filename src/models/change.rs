use std::collections::BTreeMap;

use crate::models::{Branch, RepoId};

/// New commits for one repository, per branch, in the order the gateway
/// returned them. Branches without commits are never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeReport {
    pub repo: RepoId,
    pub branches: BTreeMap<Branch, Vec<String>>,
}

impl ChangeReport {
    pub fn new(repo: RepoId) -> Self {
        Self {
            repo,
            branches: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, branch: Branch, commits: Vec<String>) {
        if !commits.is_empty() {
            self.branches.insert(branch, commits);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn commit_count(&self) -> usize {
        self.branches.values().map(Vec::len).sum()
    }
}
