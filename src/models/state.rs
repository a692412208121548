//! Repository state model.
//!
//! - `RepoId`: human-readable key derived from a repository URL
//! - `Branch` / `Revision`: a head name and the commit hash at its tip
//! - `HeadState`: every head the remote currently reports
//! - `FollowedState`: the heads persisted for a repository, with the last
//!   revision seen for each

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{AppError, Result};

/// Stable identifier of a followed repository, e.g. `errbotio/err-git`.
///
/// Also names the clone directory, so every `/`-separated segment must be a
/// plain path component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId(String);

impl RepoId {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && !name.contains('\\')
            && name
                .split('/')
                .all(|segment| !segment.is_empty() && segment != "." && segment != "..");

        if valid {
            Ok(Self(name))
        } else {
            Err(AppError::InvalidRepoId(name))
        }
    }

    /// Humanize a git URL: drop the `.git` suffix and keep the last two path
    /// segments, so `https://github.com/errbotio/err-git.git` and
    /// `git@github.com:errbotio/err-git` both become `errbotio/err-git`.
    pub fn from_url(url: &str) -> Result<Self> {
        let trimmed = url.trim().trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

        let segments: Vec<&str> = trimmed
            .split(['/', ':'])
            .filter(|s| !s.is_empty())
            .collect();
        let tail = &segments[segments.len().saturating_sub(2)..];

        Self::new(tail.join("/")).map_err(|_| AppError::UnresolvedSource(url.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RepoId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RepoId> for String {
    fn from(id: RepoId) -> Self {
        id.0
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Branch(String);

impl Branch {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Branch {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for Branch {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical lowercase hex object id (40 chars for SHA-1, 64 for SHA-256).
/// Revisions are only ever compared by exact equality of this form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision(String);

impl Revision {
    pub fn parse(hex: &str) -> Result<Self> {
        let valid_len = hex.len() == 40 || hex.len() == 64;
        if valid_len && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(hex.to_ascii_lowercase()))
        } else {
            Err(AppError::InvalidRevision(hex.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..7]
    }
}

impl TryFrom<String> for Revision {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Revision> for String {
    fn from(rev: Revision) -> Self {
        rev.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Heads reported by the remote after a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadState(BTreeMap<Branch, Revision>);

impl HeadState {
    pub fn get(&self, branch: &Branch) -> Option<&Revision> {
        self.0.get(branch)
    }

    pub fn contains(&self, branch: &Branch) -> bool {
        self.0.contains_key(branch)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Branch, &Revision)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(Branch, Revision)> for HeadState {
    fn from_iter<I: IntoIterator<Item = (Branch, Revision)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Branches persisted for one repository with the last revision seen on each.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FollowedState(BTreeMap<Branch, Revision>);

impl FollowedState {
    /// Re-select followed heads from `heads`: everything when `requested` is
    /// empty, otherwise the requested heads plus the ones already followed.
    /// Every selected head is stored at its current tip. Requested names
    /// missing from `heads` are ignored.
    pub fn refollow(&self, heads: &HeadState, requested: &[Branch]) -> Self {
        heads
            .iter()
            .filter(|(branch, _)| {
                requested.is_empty() || requested.contains(*branch) || self.contains(branch)
            })
            .map(|(branch, tip)| (branch.clone(), tip.clone()))
            .collect()
    }

    /// Followed branches that still exist in `heads`, moved to their new tips.
    /// Never adds a branch.
    pub fn advanced_to(&self, heads: &HeadState) -> Self {
        self.0
            .keys()
            .filter_map(|branch| heads.get(branch).map(|rev| (branch.clone(), rev.clone())))
            .collect()
    }

    /// Followed branches whose tip in `heads` differs from the stored one.
    pub fn moved_branches(&self, heads: &HeadState) -> Vec<Branch> {
        self.0
            .iter()
            .filter(|(branch, old)| heads.get(branch).is_some_and(|new| new != *old))
            .map(|(branch, _)| branch.clone())
            .collect()
    }

    /// Followed branches that no longer exist in `heads`.
    pub fn stale_branches(&self, heads: &HeadState) -> Vec<Branch> {
        self.0
            .keys()
            .filter(|branch| !heads.contains(branch))
            .cloned()
            .collect()
    }

    /// Drop `branches`, returning the state left behind and the names that
    /// were actually followed.
    pub fn without(&self, branches: &[Branch]) -> (Self, Vec<Branch>) {
        let mut kept = self.0.clone();
        let removed = branches
            .iter()
            .filter(|branch| kept.remove(*branch).is_some())
            .cloned()
            .collect();
        (Self(kept), removed)
    }

    pub fn get(&self, branch: &Branch) -> Option<&Revision> {
        self.0.get(branch)
    }

    pub fn contains(&self, branch: &Branch) -> bool {
        self.0.contains_key(branch)
    }

    pub fn branches(&self) -> impl Iterator<Item = &Branch> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Branch, &Revision)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Branch, Revision)> for FollowedState {
    fn from_iter<I: IntoIterator<Item = (Branch, Revision)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
pub(crate) fn rev(c: char) -> Revision {
    Revision::parse(&c.to_string().repeat(40)).unwrap()
}
