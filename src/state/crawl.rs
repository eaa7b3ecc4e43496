/// Crawl run lifecycle and counters
use chrono::{DateTime, Utc};
use std::fmt;

/// Lifecycle of one crawl
///
/// `Starting -> Running -> Finalizing -> Done`, or `Stopped` when the crawl
/// is cancelled before the fetch stream is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    /// Crawl record created, seed not yet submitted
    Starting,

    /// Fetch responses are being processed
    Running,

    /// Fetch stream exhausted, crawl-wide rules running
    Finalizing,

    /// Crawl-wide rules finished and totals committed
    Done,

    /// Cancelled before completion
    Stopped,
}

impl CrawlPhase {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Stopped)
    }

    /// Converts the phase to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Stopped => "stopped",
        }
    }

    /// Parses a phase from its database string representation
    ///
    /// Returns None if the string doesn't match any known phase.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "starting" => Some(Self::Starting),
            "running" => Some(Self::Running),
            "finalizing" => Some(Self::Finalizing),
            "done" => Some(Self::Done),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// One crawl execution of a project
///
/// Counters only grow while the crawl is active. `end` is set when the fetch
/// stream is exhausted (or the crawl is stopped) and `issues_end` once the
/// crawl-wide rules have run; only then is the run final.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlRun {
    pub id: i64,
    pub project_id: i64,
    pub phase: CrawlPhase,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub issues_end: Option<DateTime<Utc>>,

    /// Observations recorded, including synthetic blocked ones
    pub total_urls: u64,
    pub total_issues: u64,
    pub critical_issues: u64,
    pub alert_issues: u64,
    pub warning_issues: u64,

    pub blocked_by_robots: u64,
    pub noindex: u64,
    pub internal_follow_links: u64,
    pub internal_nofollow_links: u64,
    pub external_follow_links: u64,
    pub external_nofollow_links: u64,
    pub sponsored_links: u64,
    pub ugc_links: u64,

    pub robots_txt_exists: bool,
    pub sitemap_exists: bool,
    pub sitemap_is_blocked: bool,
}

impl CrawlRun {
    /// Creates an unsaved crawl for a project (id is assigned by storage)
    pub fn new(project_id: i64) -> Self {
        Self {
            id: 0,
            project_id,
            phase: CrawlPhase::Starting,
            start: Utc::now(),
            end: None,
            issues_end: None,
            total_urls: 0,
            total_issues: 0,
            critical_issues: 0,
            alert_issues: 0,
            warning_issues: 0,
            blocked_by_robots: 0,
            noindex: 0,
            internal_follow_links: 0,
            internal_nofollow_links: 0,
            external_follow_links: 0,
            external_nofollow_links: 0,
            sponsored_links: 0,
            ugc_links: 0,
            robots_txt_exists: false,
            sitemap_exists: false,
            sitemap_is_blocked: false,
        }
    }

    /// Returns true once the crawl-wide issues have been computed
    pub fn is_final(&self) -> bool {
        self.issues_end.is_some()
    }
}
