use crate::models::ChangeReport;

pub const NEWS_HEADER: &str = "About to give you the latest git repo news ...";

/// Render a poll's reports as one notice: a block per repository (sorted by
/// RepoId), each branch followed by its commits, indented, in gateway order.
pub fn render(reports: &[ChangeReport]) -> String {
    let mut sorted: Vec<&ChangeReport> = reports.iter().filter(|r| !r.is_empty()).collect();
    sorted.sort_by(|a, b| a.repo.cmp(&b.repo));

    let mut notice = String::from(NEWS_HEADER);
    notice.push('\n');

    for report in sorted {
        notice.push_str(&format!("\n{}:\n", report.repo));
        for (branch, commits) in &report.branches {
            notice.push_str(&format!("  Branch {}:\n", branch));
            for commit in commits {
                notice.push_str(&format!("    {}\n", commit));
            }
        }
    }

    notice
}
