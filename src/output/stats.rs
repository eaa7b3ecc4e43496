//! Issue summary of a project's last crawl
//!
//! This module extracts the per-kind issue counts of a crawl from storage and
//! prints them grouped by priority.

use crate::issues::{IssueKind, Priority};
use crate::state::{CrawlRun, Project};
use crate::storage::{Storage, StorageResult};

/// Issue counts of one crawl
#[derive(Debug, Clone, PartialEq)]
pub struct IssueSummary {
    pub project_url: String,
    pub crawl: CrawlRun,

    /// Observations stored for the crawl
    pub pages: u64,

    /// Kinds with their counts, most severe tier first, most frequent first
    /// within a tier
    pub by_priority: Vec<(Priority, Vec<(IssueKind, u64)>)>,
}

impl IssueSummary {
    pub fn total(&self) -> u64 {
        self.by_priority
            .iter()
            .flat_map(|(_, kinds)| kinds.iter().map(|(_, count)| count))
            .sum()
    }
}

/// Loads the summary of the project's last crawl
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `project` - A saved project (its id is used)
///
/// # Returns
///
/// * `Ok(Some(IssueSummary))` - The last crawl and its issue counts
/// * `Ok(None)` - The project was never crawled
pub fn load_issue_summary<S: Storage + ?Sized>(
    storage: &S,
    project: &Project,
) -> StorageResult<Option<IssueSummary>> {
    let Some(crawl) = storage.get_last_crawl(project.id)? else {
        return Ok(None);
    };

    let pages = storage.count_page_reports(crawl.id)?;
    let counts = storage.count_issues_by_kind(crawl.id)?;

    let by_priority = [Priority::Critical, Priority::Alert, Priority::Warning]
        .into_iter()
        .map(|priority| {
            let kinds: Vec<(IssueKind, u64)> = counts
                .iter()
                .filter(|(kind, _)| kind.default_priority() == priority)
                .copied()
                .collect();
            (priority, kinds)
        })
        .filter(|(_, kinds)| !kinds.is_empty())
        .collect();

    Ok(Some(IssueSummary {
        project_url: project.url.clone(),
        crawl,
        pages,
        by_priority,
    }))
}

/// Prints the summary to stdout in a formatted manner
pub fn print_issue_summary(summary: &IssueSummary) {
    let crawl = &summary.crawl;

    println!("=== Issues of {} ===\n", summary.project_url);

    println!("Crawl {} ({})", crawl.id, crawl.phase);
    println!("  Started: {}", crawl.start.to_rfc3339());
    if let Some(end) = crawl.end {
        println!("  Ended: {}", end.to_rfc3339());
    }
    println!("  URLs: {} ({} stored)", crawl.total_urls, summary.pages);
    println!("  Blocked by robots.txt: {}", crawl.blocked_by_robots);
    println!("  Noindex: {}", crawl.noindex);
    println!(
        "  robots.txt: {}, sitemap: {}{}",
        yes_no(crawl.robots_txt_exists),
        yes_no(crawl.sitemap_exists),
        if crawl.sitemap_is_blocked { " (blocked)" } else { "" }
    );
    println!();

    if !crawl.phase.is_terminal() {
        println!("This crawl did not finish; its counts are partial.\n");
    } else if !crawl.is_final() {
        println!("Crawl-wide issues were not computed for this crawl.\n");
    }

    for (priority, kinds) in &summary.by_priority {
        let count: u64 = kinds.iter().map(|(_, c)| c).sum();
        println!("{} ({}):", priority, count);
        for (kind, count) in kinds {
            println!("  {:<32} {}", kind.as_str(), count);
        }
        println!();
    }

    println!("Total issues: {}", summary.total());
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::IssueRecord;
    use crate::page::PageReport;
    use crate::storage::SqliteStorage;

    #[test]
    fn test_never_crawled() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let project = storage
            .upsert_project(&Project::with_url("https://example.com/"))
            .unwrap();
        assert_eq!(load_issue_summary(&storage, &project).unwrap(), None);
    }

    #[test]
    fn test_grouped_by_priority() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let project = storage
            .upsert_project(&Project::with_url("https://example.com/"))
            .unwrap();
        let crawl = storage.create_crawl(&CrawlRun::new(project.id)).unwrap();
        let page = storage
            .save_page_report(
                &PageReport {
                    url: "https://example.com/".to_string(),
                    ..PageReport::default()
                },
                crawl.id,
            )
            .unwrap();
        storage
            .save_issues(&[
                IssueRecord::new(page.id, crawl.id, IssueKind::NoH1),
                IssueRecord::new(page.id, crawl.id, IssueKind::Error40x),
                IssueRecord::new(page.id, crawl.id, IssueKind::ShortTitle),
                IssueRecord::new(page.id, crawl.id, IssueKind::LongUrl),
            ])
            .unwrap();

        let summary = load_issue_summary(&storage, &project).unwrap().unwrap();
        assert_eq!(summary.pages, 1);
        assert_eq!(summary.total(), 4);
        let tiers: Vec<Priority> = summary.by_priority.iter().map(|(p, _)| *p).collect();
        assert_eq!(tiers, vec![Priority::Critical, Priority::Alert, Priority::Warning]);
        assert_eq!(summary.by_priority[0].1, vec![(IssueKind::Error40x, 1)]);
        assert_eq!(summary.by_priority[2].1.len(), 2);
    }
}
