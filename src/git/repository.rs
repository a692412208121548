//! git2-backed gateway.
//!
//! Each followed repository is a bare clone under `<clones_dir>/<RepoId>`.
//! Remote heads are mirrored into `refs/remotes/origin/*` with pruning, so a
//! branch deleted upstream disappears from the head listing on the next fetch.

use git2::build::RepoBuilder;
use git2::{AutotagOption, FetchOptions, FetchPrune, Oid, RemoteCallbacks, Repository};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::git::gateway::{BranchLog, VcsGateway};
use crate::git::history::commits_between;
use crate::models::{Branch, FollowedState, HeadState, RepoId, Revision};

const REMOTE: &str = "origin";
const HEADS_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";
const REMOTE_PREFIX: &str = "refs/remotes/origin/";

/// Bound connects and reads of every libgit2 network transport, so a remote
/// that stops answering fails instead of parking a worker forever.
pub fn set_network_timeout(timeout: Duration) -> Result<()> {
    let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    // SAFETY: called once from main before any git operation starts.
    unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(millis)?;
        git2::opts::set_server_timeout_in_milliseconds(millis)?;
    }
    Ok(())
}

pub struct Git2Gateway {
    clones_dir: PathBuf,
}

impl Git2Gateway {
    pub fn new(clones_dir: impl Into<PathBuf>) -> Self {
        Self {
            clones_dir: clones_dir.into(),
        }
    }

    fn path_for(&self, repo: &RepoId) -> PathBuf {
        self.clones_dir.join(repo.as_str())
    }

    fn open(&self, repo: &RepoId) -> Result<Repository> {
        let path = self.path_for(repo);
        Repository::open(&path).map_err(|e| unavailable(repo, e))
    }

    fn remote_heads(&self, repo: &Repository) -> Result<HashMap<String, Oid>> {
        let mut heads = HashMap::new();

        for reference in repo.references_glob(&format!("{}*", REMOTE_PREFIX))? {
            let reference = reference?;
            let (Some(name), Some(oid)) = (reference.name(), reference.target()) else {
                continue;
            };

            let branch = name.trim_start_matches(REMOTE_PREFIX);
            if branch != "HEAD" {
                heads.insert(branch.to_string(), oid);
            }
        }

        Ok(heads)
    }
}

impl VcsGateway for Git2Gateway {
    fn clone_repo(&self, url: &str) -> Result<RepoId> {
        let id = RepoId::from_url(url)?;
        let path = self.path_for(&id);

        if path.exists() {
            tracing::debug!("Reusing existing clone of {} at {}", id, path.display());
            self.open(&id)?;
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }

            tracing::info!("Cloning {} into {}", url, path.display());
            if let Err(e) = RepoBuilder::new().bare(true).clone(url, &path) {
                let _ = fs::remove_dir_all(&path);
                return Err(AppError::GatewayUnavailable(format!(
                    "clone of {} failed: {}",
                    url,
                    e.message()
                )));
            }
        }

        self.fetch_all_heads(&id, &|| false)?;
        Ok(id)
    }

    fn fetch_all_heads(&self, repo: &RepoId, interrupted: &dyn Fn() -> bool) -> Result<()> {
        let git = self.open(repo)?;
        let mut remote = git.find_remote(REMOTE).map_err(|e| unavailable(repo, e))?;

        // Returning false from a progress callback makes libgit2 abort.
        let mut callbacks = RemoteCallbacks::new();
        callbacks.transfer_progress(|_| !interrupted());
        callbacks.sideband_progress(|_| !interrupted());

        let mut opts = FetchOptions::new();
        opts.remote_callbacks(callbacks);
        opts.prune(FetchPrune::On);
        opts.download_tags(AutotagOption::None);

        remote
            .fetch(&[HEADS_REFSPEC], Some(&mut opts), None)
            .map_err(|e| unavailable(repo, e))
    }

    fn list_head_revisions(&self, repo: &RepoId) -> Result<HeadState> {
        let git = self.open(repo)?;

        self.remote_heads(&git)?
            .into_iter()
            .map(|(branch, oid)| Ok((Branch::from(branch), revision_of(oid)?)))
            .collect()
    }

    fn log_since(&self, repo: &RepoId, prior: &FollowedState) -> Result<BranchLog> {
        let git = self.open(repo)?;
        let heads = self.remote_heads(&git)?;

        let mut log = BTreeMap::new();
        for (branch, since) in prior.iter() {
            let Some(&tip) = heads.get(branch.as_str()) else {
                continue;
            };
            let since = Oid::from_str(since.as_str())?;
            log.insert(branch.clone(), commits_between(&git, since, tip)?);
        }

        Ok(log)
    }

    fn remove(&self, repo: &RepoId) -> Result<()> {
        let path = self.path_for(repo);
        if path.exists() {
            tracing::info!("Removing clone {}", path.display());
            fs::remove_dir_all(&path)?;
        }

        // Drop the owner directory once its last clone is gone.
        if let Some(parent) = path.parent() {
            if parent != self.clones_dir {
                let _ = fs::remove_dir(parent);
            }
        }

        Ok(())
    }
}

fn revision_of(oid: Oid) -> Result<Revision> {
    Revision::parse(&oid.to_string())
}

fn unavailable(repo: &RepoId, e: git2::Error) -> AppError {
    AppError::GatewayUnavailable(format!("{}: {}", repo, e.message()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{BranchType, Signature};
    use tempfile::TempDir;

    struct Origin {
        _dir: TempDir,
        repo: Repository,
        url: String,
    }

    impl Origin {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("upstream");
            let repo = Repository::init(&path).unwrap();
            let url = path.to_str().unwrap().to_string();
            Self { _dir: dir, repo, url }
        }

        fn commit(&self, branch: &str, message: &str) -> Oid {
            let sig = Signature::now("Alice", "alice@example.com").unwrap();
            let tree_id = self.repo.treebuilder(None).unwrap().write().unwrap();
            let tree = self.repo.find_tree(tree_id).unwrap();

            let refname = format!("refs/heads/{}", branch);
            let parent = self
                .repo
                .find_reference(&refname)
                .ok()
                .and_then(|r| r.peel_to_commit().ok());
            let parents: Vec<&git2::Commit> = parent.iter().collect();

            self.repo
                .commit(Some(&refname), &sig, &sig, message, &tree, &parents)
                .unwrap()
        }

        fn delete_branch(&self, branch: &str) {
            self.repo
                .find_branch(branch, BranchType::Local)
                .unwrap()
                .delete()
                .unwrap();
        }
    }

    fn rev_of(oid: Oid) -> Revision {
        revision_of(oid).unwrap()
    }

    #[test]
    fn test_clone_lists_remote_heads() {
        let origin = Origin::new();
        let first = origin.commit("main", "initial import");
        origin.repo.set_head("refs/heads/main").unwrap();
        let dev = origin.commit("dev", "dev work");

        let clones = tempfile::tempdir().unwrap();
        let gateway = Git2Gateway::new(clones.path());

        let id = gateway.clone_repo(&origin.url).unwrap();
        assert_eq!(id, RepoId::from_url(&origin.url).unwrap());

        let heads = gateway.list_head_revisions(&id).unwrap();
        assert_eq!(heads.len(), 2);
        assert_eq!(heads.get(&Branch::from("main")), Some(&rev_of(first)));
        assert_eq!(heads.get(&Branch::from("dev")), Some(&rev_of(dev)));

        // A second clone call reuses the existing directory.
        assert_eq!(gateway.clone_repo(&origin.url).unwrap(), id);
    }

    #[test]
    fn test_fetch_and_log_since() {
        let origin = Origin::new();
        let first = origin.commit("main", "initial import");
        origin.repo.set_head("refs/heads/main").unwrap();

        let clones = tempfile::tempdir().unwrap();
        let gateway = Git2Gateway::new(clones.path());
        let id = gateway.clone_repo(&origin.url).unwrap();

        let prior: FollowedState = [(Branch::from("main"), rev_of(first))].into_iter().collect();

        origin.commit("main", "add parser");
        let tip = origin.commit("main", "fix parser");
        origin.commit("other", "unrelated");

        gateway.fetch_all_heads(&id, &|| false).unwrap();
        let heads = gateway.list_head_revisions(&id).unwrap();
        assert_eq!(heads.get(&Branch::from("main")), Some(&rev_of(tip)));

        let log = gateway.log_since(&id, &prior).unwrap();
        assert_eq!(log.len(), 1);

        let main = &log[&Branch::from("main")];
        assert_eq!(main.len(), 2);
        assert!(main[0].contains("fix parser"), "newest first: {:?}", main);
        assert!(main[1].contains("add parser"));
        assert!(main[0].contains("Alice"));
    }

    #[test]
    fn test_unchanged_branch_has_empty_log() {
        let origin = Origin::new();
        let first = origin.commit("main", "initial import");
        origin.repo.set_head("refs/heads/main").unwrap();

        let clones = tempfile::tempdir().unwrap();
        let gateway = Git2Gateway::new(clones.path());
        let id = gateway.clone_repo(&origin.url).unwrap();

        let prior: FollowedState = [(Branch::from("main"), rev_of(first))].into_iter().collect();
        let log = gateway.log_since(&id, &prior).unwrap();

        assert_eq!(log[&Branch::from("main")], Vec::<String>::new());
    }

    #[test]
    fn test_deleted_branch_is_pruned() {
        let origin = Origin::new();
        origin.commit("main", "initial import");
        origin.repo.set_head("refs/heads/main").unwrap();
        origin.commit("topic", "short lived");

        let clones = tempfile::tempdir().unwrap();
        let gateway = Git2Gateway::new(clones.path());
        let id = gateway.clone_repo(&origin.url).unwrap();
        assert!(gateway.list_head_revisions(&id).unwrap().contains(&Branch::from("topic")));

        origin.delete_branch("topic");
        gateway.fetch_all_heads(&id, &|| false).unwrap();

        let heads = gateway.list_head_revisions(&id).unwrap();
        assert!(!heads.contains(&Branch::from("topic")));
        assert!(heads.contains(&Branch::from("main")));
    }

    #[test]
    fn test_interrupted_fetch_keeps_old_heads() {
        let origin = Origin::new();
        let first = origin.commit("main", "initial import");
        origin.repo.set_head("refs/heads/main").unwrap();

        let clones = tempfile::tempdir().unwrap();
        let gateway = Git2Gateway::new(clones.path());
        let id = gateway.clone_repo(&origin.url).unwrap();

        origin.commit("main", "never fetched");
        let result = gateway.fetch_all_heads(&id, &|| true);

        assert!(matches!(result, Err(AppError::GatewayUnavailable(_))));
        let heads = gateway.list_head_revisions(&id).unwrap();
        assert_eq!(heads.get(&Branch::from("main")), Some(&rev_of(first)));
    }

    #[test]
    fn test_remove_deletes_clone() {
        let origin = Origin::new();
        origin.commit("main", "initial import");
        origin.repo.set_head("refs/heads/main").unwrap();

        let clones = tempfile::tempdir().unwrap();
        let gateway = Git2Gateway::new(clones.path());
        let id = gateway.clone_repo(&origin.url).unwrap();
        assert!(clones.path().join(id.as_str()).exists());

        gateway.remove(&id).unwrap();
        assert!(!clones.path().join(id.as_str()).exists());
        assert!(matches!(
            gateway.fetch_all_heads(&id, &|| false),
            Err(AppError::GatewayUnavailable(_))
        ));
    }

    #[test]
    fn test_clone_of_missing_source_fails() {
        let clones = tempfile::tempdir().unwrap();
        let gateway = Git2Gateway::new(clones.path());
        let elsewhere = tempfile::tempdir().unwrap();
        let missing = elsewhere.path().join("gone/project");

        let result = gateway.clone_repo(missing.to_str().unwrap());

        assert!(matches!(result, Err(AppError::GatewayUnavailable(_))));
        assert!(!clones.path().join("gone/project").exists());
    }
}
