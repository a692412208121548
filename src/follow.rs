//! Follow, unfollow and list commands.
//!
//! Sources are either a git URL or a symbolic alias resolved through an
//! `AliasResolver`; one keyword fans out to every known alias. Each command
//! returns the text shown to the user.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::git::VcsGateway;
use crate::models::{Branch, FollowedState, RepoId};
use crate::registry::Registry;

pub const NO_ENTRY: &str = "You have no entry, please use follow to add some";

pub trait AliasResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<String>;
    fn known_aliases(&self) -> BTreeMap<String, String>;
}

/// Aliases taken from the `aliases` table of the config file.
pub struct ConfigAliases {
    aliases: BTreeMap<String, String>,
}

impl ConfigAliases {
    pub fn new(aliases: BTreeMap<String, String>) -> Self {
        Self { aliases }
    }
}

impl AliasResolver for ConfigAliases {
    fn resolve(&self, name: &str) -> Option<String> {
        self.aliases.get(name).cloned()
    }

    fn known_aliases(&self) -> BTreeMap<String, String> {
        self.aliases.clone()
    }
}

enum Followed {
    Following(RepoId),
    /// Newly seen repository with no branch to follow; nothing was kept.
    Nothing(RepoId),
}

pub struct FollowManager {
    registry: Arc<Registry>,
    gateway: Arc<dyn VcsGateway>,
    aliases: Arc<dyn AliasResolver>,
    all_keyword: String,
}

impl FollowManager {
    pub fn new(
        registry: Arc<Registry>,
        gateway: Arc<dyn VcsGateway>,
        aliases: Arc<dyn AliasResolver>,
        all_keyword: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            gateway,
            aliases,
            all_keyword: all_keyword.into(),
        }
    }

    /// Follow `source`, restricted to `branches` when any are given.
    pub fn follow(&self, source: &str, branches: &[Branch]) -> Result<String> {
        if source == self.all_keyword {
            return self.follow_all();
        }

        let url = self.aliases.resolve(source);
        let outcome = self.follow_url(url.as_deref().unwrap_or(source), branches)?;

        match outcome {
            Followed::Following(_) => self.following(),
            Followed::Nothing(id) if branches.is_empty() => Ok(format!(
                "{} has no branches, nothing was followed\n\n{}",
                id,
                self.following()?
            )),
            Followed::Nothing(id) => Ok(format!(
                "None of {} exist on {}, nothing was followed\n\n{}",
                join(branches),
                id,
                self.following()?
            )),
        }
    }

    /// Follow every branch of every known alias. A failing alias is reported
    /// in the result and does not stop the others.
    fn follow_all(&self) -> Result<String> {
        let aliases = self.aliases.known_aliases();
        if aliases.is_empty() {
            return Ok(format!("There are no known aliases to follow\n\n{}", self.following()?));
        }

        let mut lines = Vec::new();
        for (name, url) in &aliases {
            match self.follow_url(url, &[]) {
                Ok(Followed::Following(id)) => lines.push(format!("Following {} as {}", name, id)),
                Ok(Followed::Nothing(id)) => {
                    lines.push(format!("Nothing to follow in {} ({})", name, id))
                }
                Err(e) => {
                    tracing::warn!("Could not follow alias {} ({}): {}", name, url, e);
                    lines.push(format!("Could not follow {}: {}", name, e));
                }
            }
        }

        Ok(format!("{}\n\n{}", lines.join("\n"), self.following()?))
    }

    fn follow_url(&self, url: &str, branches: &[Branch]) -> Result<Followed> {
        let id = RepoId::from_url(url)?;

        self.registry.with_repo_lock(&id, || {
            let (id, prior) = match self.registry.get_or_discard(&id)? {
                Some(prior) => {
                    self.gateway.fetch_all_heads(&id, &|| false)?;
                    (id.clone(), Some(prior))
                }
                None => {
                    let id = self.gateway.clone_repo(url).map_err(|e| match e {
                        AppError::GatewayUnavailable(reason) => {
                            AppError::UnresolvedSource(format!("{} ({})", url, reason))
                        }
                        other => other,
                    })?;
                    (id, None)
                }
            };

            let heads = self.gateway.list_head_revisions(&id)?;
            for branch in branches.iter().filter(|b| !heads.contains(b)) {
                tracing::warn!("{} has no branch {}, ignoring it", id, branch);
            }

            let next = prior
                .as_ref()
                .unwrap_or(&FollowedState::default())
                .refollow(&heads, branches);
            if next.is_empty() && prior.is_none() {
                tracing::info!("Nothing to follow on {}, dropping the clone", id);
                if let Err(e) = self.gateway.remove(&id) {
                    tracing::warn!("Could not delete local data of {}: {}", id, e);
                }
                return Ok(Followed::Nothing(id));
            }

            self.registry.set(&id, &next)?;
            tracing::info!("Following {} on {} of {} branch(es)", id, next.len(), heads.len());
            Ok(Followed::Following(id))
        })
    }

    /// Stop following `branches` of `name`, or the whole repository when no
    /// branches are given. Dropping the last branch drops the repository.
    pub fn unfollow(&self, name: &str, branches: &[Branch]) -> Result<String> {
        let id = RepoId::new(name).map_err(|_| AppError::NotFollowing(name.to_string()))?;

        let message = self.registry.with_repo_lock(&id, || {
            let Some(prior) = self.registry.get_or_discard(&id)? else {
                return Err(AppError::NotFollowing(id.to_string()));
            };

            if branches.is_empty() {
                self.drop_repo(&id)?;
                return Ok(format!("{} has been removed.", id));
            }

            let (kept, removed) = prior.without(branches);
            if removed.is_empty() {
                return Ok(format!("None of {} are followed on {}", join(branches), id));
            }

            let mut message = format!("Heads {} have been removed from {}", join(&removed), id);
            if kept.is_empty() {
                self.drop_repo(&id)?;
                message.push_str(&format!("\n{} has been removed.", id));
            } else {
                self.registry.set(&id, &kept)?;
            }
            Ok(message)
        })?;

        Ok(format!("{}\n\n{}", message, self.following()?))
    }

    fn drop_repo(&self, id: &RepoId) -> Result<()> {
        if let Err(e) = self.gateway.remove(id) {
            tracing::warn!("Could not delete local data of {}: {}", id, e);
        }
        self.registry.delete(id)?;
        tracing::info!("Unfollowed {}", id);
        Ok(())
    }

    /// Every followed repository with its branches.
    pub fn following(&self) -> Result<String> {
        let ids = self.registry.list()?;
        if ids.is_empty() {
            return Ok(NO_ENTRY.to_string());
        }

        let mut listing = String::from("You are currently following those repos:\n");
        for id in ids {
            let state = match self.registry.get(&id) {
                Ok(Some(state)) => state,
                Ok(None) => continue,
                Err(AppError::RegistryCorruption(_)) => {
                    listing.push_str(&format!("\n{}: unreadable, follow it again\n", id));
                    continue;
                }
                Err(e) => return Err(e),
            };
            listing.push_str(&format!("\n{}:\n", id));
            for branch in state.branches() {
                listing.push_str(&format!("  {}\n", branch));
            }
        }
        Ok(listing)
    }
}

fn join(branches: &[Branch]) -> String {
    branches
        .iter()
        .map(Branch::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
