use git2::{Oid, Repository, Sort};

use crate::error::Result;

/// Summaries of the commits reachable from `tip` but not from `since`,
/// newest first.
///
/// If `since` is no longer in the object database only the tip is reported,
/// since there is no base left to walk from.
pub fn commits_between(repo: &Repository, since: Oid, tip: Oid) -> Result<Vec<String>> {
    if since == tip {
        return Ok(Vec::new());
    }

    if repo.find_commit(since).is_err() {
        tracing::warn!("Base revision {} is missing, reporting the tip only", since);
        let commit = repo.find_commit(tip)?;
        return Ok(vec![commit_summary(&commit)]);
    }

    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
    revwalk.push(tip)?;
    revwalk.hide(since)?;

    let mut summaries = Vec::new();
    for oid in revwalk {
        let commit = repo.find_commit(oid?)?;
        summaries.push(commit_summary(&commit));
    }

    Ok(summaries)
}

/// One-line rendering: `<short id> <subject> (<author>, <relative time>)`.
pub fn commit_summary(commit: &git2::Commit) -> String {
    let id = commit.id().to_string();
    format!(
        "{} {} ({}, {})",
        &id[..7],
        commit.summary().unwrap_or("").trim(),
        commit.author().name().unwrap_or("Unknown"),
        format_relative_time(commit.time().seconds()),
    )
}

pub fn format_relative_time(timestamp: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let diff = now - timestamp;

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        let mins = diff / 60;
        format!("{} minute{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if diff < 86400 {
        let hours = diff / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if diff < 2592000 {
        let days = diff / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else if diff < 31536000 {
        let months = diff / 2592000;
        format!("{} month{} ago", months, if months == 1 { "" } else { "s" })
    } else {
        let years = diff / 31536000;
        format!("{} year{} ago", years, if years == 1 { "" } else { "s" })
    }
}
