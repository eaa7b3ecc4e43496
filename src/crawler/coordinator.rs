//! Crawl coordinator - main crawl orchestration logic
//!
//! Drives one crawl of a project through its phases:
//! - Creating the crawl record and seeding the fetcher
//! - Turning each fetch response into a stored, evaluated observation
//! - Submitting everything found on a page back to the fetcher
//! - Running the crawl-wide rules and committing the totals
//! - Discarding the page data of earlier crawls of the project

use crate::config::Config;
use crate::crawler::{
    build_http_client, FetchResponse, Fetcher, FetcherConfig, HeadChecker, HttpFetcher,
    LinkChecker, RequestMeta, SubmitError,
};
use crate::issues::{Priority, ReportManager};
use crate::page::{HtmlObservationBuilder, ObservationBuilder, PageReport};
use crate::progress::{crawl_topic, Broker, PageProgress, ProgressMessage};
use crate::state::{CrawlPhase, CrawlRun, Project};
use crate::storage::{self, SharedStorage, Storage, StorageResult};
use crate::url::normalize_url;
use crate::{AuditError, UrlError};
use chrono::Utc;
use reqwest::header::HeaderMap;
use scraper::Html;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// What woke the crawl loop
enum Event {
    Response(Option<FetchResponse>),
    StopSignal(bool),
}

/// Runs one crawl of a project
pub struct Coordinator<S> {
    storage: SharedStorage<S>,
    reports: ReportManager<S>,
    broker: Arc<Broker>,
    fetcher: Box<dyn Fetcher>,
    builder: Box<dyn ObservationBuilder>,
    checker: Option<Box<dyn LinkChecker>>,
    project: Project,
    topic: String,
    /// HEAD check results per external URL, 0 when unreachable
    external_status: HashMap<String, u16>,
}

impl<S: Storage + 'static> Coordinator<S> {
    /// Creates a coordinator for an unsaved or saved project
    ///
    /// # Arguments
    ///
    /// * `storage` - Shared storage the crawl is persisted to
    /// * `fetcher` - Fetch layer, already started for the project's seed
    /// * `builder` - Turns responses into observations
    /// * `broker` - Receives progress messages on the project's crawl topic
    /// * `project` - The audited site and its policies
    pub fn new(
        storage: SharedStorage<S>,
        fetcher: Box<dyn Fetcher>,
        builder: Box<dyn ObservationBuilder>,
        broker: Arc<Broker>,
        project: Project,
    ) -> Self {
        Self {
            reports: ReportManager::new(storage.clone()),
            storage,
            broker,
            fetcher,
            builder,
            checker: None,
            topic: crawl_topic(project.id),
            project,
            external_status: HashMap::new(),
        }
    }

    /// Enables HEAD checks of external links when the project asks for them
    pub fn with_link_checker(mut self, checker: Box<dyn LinkChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.reports = self.reports.with_batch_size(batch_size);
        self
    }

    fn with_storage<T>(&self, op: impl FnOnce(&mut S) -> StorageResult<T>) -> StorageResult<T> {
        let mut guard = storage::lock(&self.storage)?;
        op(&mut guard)
    }

    fn publish(&self, message: ProgressMessage) {
        self.broker.publish(&self.topic, &message);
    }

    /// Runs the crawl until the fetch stream is exhausted or `stop` turns true
    ///
    /// Only failing to create the crawl record, or a seed the fetcher
    /// rejects, is an error. Later storage failures are logged and the crawl
    /// still ends as `Done` or `Stopped`.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Result<CrawlRun, AuditError> {
        let project = self.with_storage(|s| s.upsert_project(&self.project))?;
        self.topic = crawl_topic(project.id);
        self.project = project;
        let seed = normalize_url(&self.project.url)?;

        let mut crawl = self.with_storage(|s| s.create_crawl(&CrawlRun::new(self.project.id)))?;
        crawl.phase = CrawlPhase::Running;
        self.commit(&crawl);
        info!("Starting crawl {} of {}", crawl.id, seed);

        let start_time = Instant::now();

        match self.submit(&mut crawl, seed.as_str(), RequestMeta::new(-1)).await {
            Ok(()) | Err(SubmitError::BlockedByRobots) => {}
            Err(source) => {
                self.fetcher.stop();
                self.finish_stopped(&mut crawl);
                return Err(AuditError::Submit {
                    url: seed.to_string(),
                    source,
                });
            }
        }
        for url in self.fetcher.sitemap_urls() {
            if let Err(e) = self.submit(&mut crawl, &url, RequestMeta::new(0)).await {
                debug!("Sitemap URL {} not queued: {}", url, e);
            }
        }
        if self.fetcher.status().discovered == 0 {
            info!("Nothing to fetch for {}", seed);
            self.fetcher.stop();
        }

        let mut stop_open = true;
        let mut stopped = *stop.borrow();
        while !stopped {
            let event = tokio::select! {
                response = self.fetcher.next() => Event::Response(response),
                changed = stop.changed(), if stop_open => Event::StopSignal(changed.is_ok()),
            };

            match event {
                Event::Response(Some(response)) => self.handle_response(&mut crawl, response).await,
                Event::Response(None) => break,
                Event::StopSignal(true) => stopped = *stop.borrow(),
                // Sender gone: nobody can stop this crawl any more
                Event::StopSignal(false) => stop_open = false,
            }
        }

        if stopped {
            info!("Crawl {} stopped after {} URLs", crawl.id, crawl.total_urls);
            self.fetcher.stop();
            self.finish_stopped(&mut crawl);
            return Ok(crawl);
        }

        self.finalize(&mut crawl).await;
        self.discard_superseded(&crawl);

        info!(
            "Crawl {} completed: {} URLs, {} issues in {:?}",
            crawl.id,
            crawl.total_urls,
            crawl.total_issues,
            start_time.elapsed()
        );
        Ok(crawl)
    }

    /// Offers a URL to the fetcher, recording robots-blocked URLs
    async fn submit(
        &self,
        crawl: &mut CrawlRun,
        url: &str,
        meta: RequestMeta,
    ) -> Result<(), SubmitError> {
        let result = self.fetcher.submit(url, meta).await;
        if result == Err(SubmitError::BlockedByRobots) {
            self.record_blocked(crawl, url, meta.depth + 1).await;
        }
        result
    }

    async fn record_blocked(&self, crawl: &mut CrawlRun, url: &str, depth: i32) {
        let Ok(parsed) = normalize_url(url) else {
            return;
        };
        let mut page = PageReport::blocked(&parsed, depth);
        page.in_sitemap = self.fetcher.in_sitemap(&page.url);
        debug!("Blocked by robots.txt: {}", page.url);

        crawl.blocked_by_robots += 1;
        crawl.total_urls += 1;
        if let Some(page) = self
            .persist(crawl, page, &Html::new_document(), &HeaderMap::new())
            .await
        {
            self.publish_page(&page);
        }
    }

    /// Saves an observation and evaluates it, returning the saved copy
    async fn persist(
        &self,
        crawl: &CrawlRun,
        page: PageReport,
        document: &Html,
        headers: &HeaderMap,
    ) -> Option<PageReport> {
        let page = match self.with_storage(|s| s.save_page_report(&page, crawl.id)) {
            Ok(saved) => saved,
            Err(e) => {
                error!("Failed to save observation of {}: {}", page.url, e);
                return None;
            }
        };

        let issues = self.reports.evaluate_page(&page, document, headers, crawl).await;
        debug!("{} {} ({} issues)", page.status_code, page.url, issues);
        Some(page)
    }

    async fn handle_response(&mut self, crawl: &mut CrawlRun, response: FetchResponse) {
        let FetchResponse {
            raw,
            meta,
            in_sitemap,
            ack,
        } = response;

        let (mut page, document) = match self.builder.build(&raw) {
            Ok(built) => built,
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };

        page.depth = meta.depth + 1;
        page.in_sitemap = in_sitemap || self.fetcher.in_sitemap(&page.url);
        page.crawlable = !page.blocked_by_robots && (!page.noindex || self.project.include_noindex);

        self.submit_found(crawl, &page).await;
        self.check_external_links(&mut page).await;
        tally_links(crawl, &page);
        if page.noindex {
            crawl.noindex += 1;
        }
        crawl.total_urls += 1;

        if let Some(page) = self.persist(crawl, page, &document, &raw.headers).await {
            self.publish_page(&page);
        }

        // The page stops counting as active work only now
        drop(ack);
    }

    /// Submits the links, indirect targets and resources of a page
    async fn submit_found(&self, crawl: &mut CrawlRun, page: &PageReport) {
        let follow_all = self.project.follow_nofollow;

        if follow_all || !page.nofollow {
            for link in page.links.iter().filter(|l| follow_all || !l.nofollow) {
                let _ = self.submit(crawl, &link.url, RequestMeta::new(page.depth)).await;
            }
        }
        for url in page.indirect_links() {
            let _ = self.submit(crawl, url, RequestMeta::new(page.depth)).await;
        }
        for url in page.resources() {
            let _ = self.submit(crawl, url, RequestMeta::resource(page.depth)).await;
        }
    }

    async fn check_external_links(&mut self, page: &mut PageReport) {
        if !self.project.check_external_links {
            return;
        }
        let Some(checker) = self.checker.as_ref() else {
            return;
        };

        for link in page.external_links.iter_mut() {
            let status = match self.external_status.get(&link.url) {
                Some(status) => *status,
                None => {
                    let status = checker.check(&link.url).await.unwrap_or(0);
                    self.external_status.insert(link.url.clone(), status);
                    status
                }
            };
            link.status_code = Some(status);
        }
    }

    fn publish_page(&self, page: &PageReport) {
        let status = self.fetcher.status();
        self.publish(ProgressMessage::PageReport(PageProgress {
            status_code: page.status_code,
            url: page.url.clone(),
            crawled_count: status.crawled,
            discovered_count: status.discovered,
            crawling: status.crawling,
        }));
    }

    /// Writes the crawl record, logging a failure
    fn commit(&self, crawl: &CrawlRun) {
        if let Err(e) = self.with_storage(|s| s.update_crawl(crawl)) {
            error!("Failed to update crawl {} ({}): {}", crawl.id, crawl.phase, e);
        }
    }

    fn finish_stopped(&self, crawl: &mut CrawlRun) {
        crawl.phase = CrawlPhase::Stopped;
        crawl.end = Some(Utc::now());
        self.commit(crawl);
    }

    async fn finalize(&self, crawl: &mut CrawlRun) {
        crawl.end = Some(Utc::now());
        crawl.robots_txt_exists = self.fetcher.robots_present();
        crawl.sitemap_exists = self.fetcher.sitemap_present();
        crawl.sitemap_is_blocked = self.fetcher.sitemap_blocked();
        crawl.phase = CrawlPhase::Finalizing;
        self.commit(crawl);

        self.publish(ProgressMessage::IssuesInit);
        let written = self.reports.finalize_crawl(crawl).await;
        debug!("Crawl-wide rules wrote {} issues", written);

        let crawl_id = crawl.id;
        let count = |priority: Priority| {
            self.with_storage(|s| s.count_issues_by_priority(crawl_id, priority))
                .unwrap_or_else(|e| {
                    warn!("Failed to count {} issues of crawl {}: {}", priority, crawl_id, e);
                    0
                })
        };
        let (critical, alert, warning) = (
            count(Priority::Critical),
            count(Priority::Alert),
            count(Priority::Warning),
        );
        crawl.critical_issues = critical;
        crawl.alert_issues = alert;
        crawl.warning_issues = warning;
        crawl.total_issues = critical + alert + warning;

        crawl.issues_end = Some(Utc::now());
        crawl.phase = CrawlPhase::Done;
        self.commit(crawl);

        self.publish(ProgressMessage::CrawlEnd(crawl.total_urls));
    }

    /// Drops the page data of every earlier crawl of the project
    fn discard_superseded(&self, crawl: &CrawlRun) {
        let listed = self.with_storage(|s| s.superseded_crawl_ids(crawl.project_id, crawl.id));
        let superseded = match listed {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Failed to list crawls superseded by {}: {}", crawl.id, e);
                return;
            }
        };
        for id in superseded {
            match self.with_storage(|s| s.delete_crawl_data(id)) {
                Ok(()) => debug!("Discarded data of crawl {}", id),
                Err(e) => warn!("Failed to discard crawl {}: {}", id, e),
            }
        }
    }
}

fn tally_links(crawl: &mut CrawlRun, page: &PageReport) {
    for link in &page.links {
        if link.nofollow {
            crawl.internal_nofollow_links += 1;
        } else {
            crawl.internal_follow_links += 1;
        }
    }
    for link in &page.external_links {
        if link.nofollow {
            crawl.external_nofollow_links += 1;
        } else {
            crawl.external_follow_links += 1;
        }
    }
    for link in page.links.iter().chain(&page.external_links) {
        if link.sponsored {
            crawl.sponsored_links += 1;
        }
        if link.ugc {
            crawl.ugc_links += 1;
        }
    }
}

/// Runs a complete crawl of the configured project
///
/// Starts an `HttpFetcher` for the project URL, wires the HTML builder and,
/// when enabled, the external link checker, then drives the crawl to its end.
///
/// # Example
///
/// ```no_run
/// use sumi_audit::config::load_config;
/// use sumi_audit::crawler::run_crawl;
/// use sumi_audit::progress::Broker;
/// use sumi_audit::storage::{open_storage, shared};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("config.toml"))?;
/// let storage = shared(open_storage(Path::new(&config.output.database_path))?);
/// let (_stop, stop_rx) = tokio::sync::watch::channel(false);
/// let crawl = run_crawl(&config, storage, Arc::new(Broker::new()), stop_rx).await?;
/// println!("{} issues", crawl.total_issues);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl<S: Storage + 'static>(
    config: &Config,
    storage: SharedStorage<S>,
    broker: Arc<Broker>,
    stop: watch::Receiver<bool>,
) -> Result<CrawlRun, AuditError> {
    let project = Project::from_config(&config.project);
    let seed = normalize_url(&project.url)?;
    let host = project.host().ok_or(UrlError::MissingDomain)?;

    let fetcher = HttpFetcher::start(FetcherConfig::new(config, &project), &seed).await?;
    let builder = HtmlObservationBuilder::new(&host, project.allow_subdomains);
    let check_links = project.check_external_links;

    let mut coordinator = Coordinator::new(
        storage,
        Box::new(fetcher),
        Box::new(builder),
        broker,
        project,
    )
    .with_batch_size(config.crawler.batch_size);

    if check_links {
        let client = build_http_client(
            &config.user_agent.header_value(),
            Duration::from_secs(config.crawler.request_timeout),
        )?;
        coordinator = coordinator.with_link_checker(Box::new(HeadChecker::new(client)));
    }

    coordinator.run(stop).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{AckGuard, FetcherStatus};
    use crate::issues::IssueKind;
    use crate::page::RawResponse;
    use crate::issues::IssueRecord;
    use crate::storage::{open_in_memory, shared, SqliteStorage, StorageError};
    use async_trait::async_trait;
    use reqwest::header::{HeaderValue, CONTENT_TYPE};
    use std::collections::{HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const SEED: &str = "https://example.com/";

    /// Serves a fixed site from memory, one response per accepted URL
    #[derive(Default)]
    struct ScriptedFetcher {
        pages: HashMap<String, (u16, String)>,
        blocked: HashSet<String>,
        sitemap: Vec<String>,
        seen: Mutex<HashSet<String>>,
        queue: Mutex<VecDeque<(String, RequestMeta)>>,
    }

    impl ScriptedFetcher {
        fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), (200, body.to_string()));
            self
        }

        fn status(mut self, url: &str, status: u16) -> Self {
            self.pages.insert(url.to_string(), (status, String::new()));
            self
        }

        fn blocked(mut self, url: &str) -> Self {
            self.blocked.insert(url.to_string());
            self
        }

        fn response(&self, url: &str) -> RawResponse {
            let (status, body) = self.pages.get(url).cloned().unwrap_or((404, String::new()));
            let mut headers = HeaderMap::new();
            if !body.is_empty() {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
            }
            RawResponse {
                url: url.to_string(),
                status,
                headers,
                body: body.into_bytes(),
                ttfb: Duration::from_millis(5),
                failure: None,
            }
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn next(&self) -> Option<FetchResponse> {
            let (url, meta) = self.queue.lock().unwrap().pop_front()?;
            Some(FetchResponse {
                raw: self.response(&url),
                meta,
                in_sitemap: self.sitemap.contains(&url),
                ack: AckGuard::detached(),
            })
        }

        async fn submit(&self, url: &str, meta: RequestMeta) -> Result<(), SubmitError> {
            let url = normalize_url(url)
                .map_err(|e| SubmitError::Invalid(e.to_string()))?
                .to_string();
            if !url.starts_with(SEED) && !meta.ignore_domain {
                return Err(SubmitError::OutOfScope);
            }
            if !self.seen.lock().unwrap().insert(url.clone()) {
                return Err(SubmitError::Duplicate);
            }
            if self.blocked.contains(&url) {
                return Err(SubmitError::BlockedByRobots);
            }
            self.queue.lock().unwrap().push_back((url, meta));
            Ok(())
        }

        fn stop(&self) {
            self.queue.lock().unwrap().clear();
        }

        fn status(&self) -> FetcherStatus {
            FetcherStatus {
                crawled: 0,
                discovered: self.seen.lock().unwrap().len() as u64,
                crawling: 0,
            }
        }

        fn robots_present(&self) -> bool {
            !self.blocked.is_empty()
        }

        fn sitemap_present(&self) -> bool {
            !self.sitemap.is_empty()
        }

        fn sitemap_blocked(&self) -> bool {
            false
        }

        fn sitemap_urls(&self) -> Vec<String> {
            self.sitemap.clone()
        }

        fn in_sitemap(&self, url: &str) -> bool {
            self.sitemap.iter().any(|u| u == url)
        }
    }

    /// SQLite storage whose issue counts always fail
    struct FailingCounts(SqliteStorage);

    impl Storage for FailingCounts {
        fn upsert_project(&mut self, project: &Project) -> StorageResult<Project> {
            self.0.upsert_project(project)
        }
        fn create_crawl(&mut self, crawl: &CrawlRun) -> StorageResult<CrawlRun> {
            self.0.create_crawl(crawl)
        }
        fn update_crawl(&mut self, crawl: &CrawlRun) -> StorageResult<()> {
            self.0.update_crawl(crawl)
        }
        fn get_crawl(&self, crawl_id: i64) -> StorageResult<CrawlRun> {
            self.0.get_crawl(crawl_id)
        }
        fn get_last_crawl(&self, project_id: i64) -> StorageResult<Option<CrawlRun>> {
            self.0.get_last_crawl(project_id)
        }
        fn superseded_crawl_ids(&self, project_id: i64, crawl_id: i64) -> StorageResult<Vec<i64>> {
            self.0.superseded_crawl_ids(project_id, crawl_id)
        }
        fn delete_crawl_data(&mut self, crawl_id: i64) -> StorageResult<()> {
            self.0.delete_crawl_data(crawl_id)
        }
        fn save_page_report(&mut self, page: &PageReport, crawl_id: i64) -> StorageResult<PageReport> {
            self.0.save_page_report(page, crawl_id)
        }
        fn find_page_report(&self, crawl_id: i64, url: &str) -> StorageResult<Option<PageReport>> {
            self.0.find_page_report(crawl_id, url)
        }
        fn count_page_reports(&self, crawl_id: i64) -> StorageResult<u64> {
            self.0.count_page_reports(crawl_id)
        }
        fn select_page_ids(
            &self,
            sql: &str,
            crawl_id: i64,
            after: i64,
            limit: usize,
        ) -> StorageResult<Vec<i64>> {
            self.0.select_page_ids(sql, crawl_id, after, limit)
        }
        fn save_issues(&mut self, issues: &[IssueRecord]) -> StorageResult<()> {
            self.0.save_issues(issues)
        }
        fn count_issues_by_priority(&self, _crawl_id: i64, _priority: Priority) -> StorageResult<u64> {
            Err(StorageError::Database("disk I/O error".to_string()))
        }
        fn count_issues_by_kind(&self, crawl_id: i64) -> StorageResult<Vec<(IssueKind, u64)>> {
            self.0.count_issues_by_kind(crawl_id)
        }
        fn get_issues(&self, crawl_id: i64) -> StorageResult<Vec<IssueRecord>> {
            self.0.get_issues(crawl_id)
        }
    }

    struct CountingChecker {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LinkChecker for CountingChecker {
        async fn check(&self, _url: &str) -> Option<u16> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(404)
        }
    }

    fn coordinator(
        storage: &SharedStorage<SqliteStorage>,
        fetcher: ScriptedFetcher,
        project: Project,
    ) -> Coordinator<SqliteStorage> {
        Coordinator::new(
            storage.clone(),
            Box::new(fetcher),
            Box::new(HtmlObservationBuilder::new("example.com", false)),
            Arc::new(Broker::new()),
            project,
        )
    }

    fn not_stopped() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    fn html(body: &str) -> String {
        format!(
            "<!DOCTYPE html><html lang=\"en\"><head><title>Page</title></head><body>{}</body></html>",
            body
        )
    }

    #[tokio::test]
    async fn test_single_not_found_page() {
        let storage = shared(open_in_memory().unwrap());
        let fetcher = ScriptedFetcher::default().status(SEED, 404);
        let broker = Arc::new(Broker::new());
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = messages.clone();
        broker.subscribe(&crawl_topic(1), move |m| {
            sink.lock().unwrap().push(m.clone());
            Ok(())
        });

        let crawl = Coordinator::new(
            storage.clone(),
            Box::new(fetcher),
            Box::new(HtmlObservationBuilder::new("example.com", false)),
            broker,
            Project::with_url(SEED),
        )
        .run(not_stopped())
        .await
        .unwrap();

        assert_eq!(crawl.phase, CrawlPhase::Done);
        assert_eq!(crawl.total_urls, 1);
        assert_eq!(crawl.total_issues, 1);
        assert_eq!(crawl.critical_issues, 1);
        assert!(crawl.is_final());

        let guard = storage.lock().unwrap();
        let issues = guard.get_issues(crawl.id).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::Error40x);
        assert_eq!(guard.get_crawl(crawl.id).unwrap().phase, CrawlPhase::Done);

        let messages = messages.lock().unwrap();
        assert!(matches!(messages.first(), Some(ProgressMessage::PageReport(p)) if p.status_code == 404));
        assert_eq!(messages.last(), Some(&ProgressMessage::CrawlEnd(1)));
        assert!(messages.contains(&ProgressMessage::IssuesInit));
    }

    #[tokio::test]
    async fn test_links_depth_and_blocked() {
        let storage = shared(open_in_memory().unwrap());
        let fetcher = ScriptedFetcher::default()
            .page(
                SEED,
                &html(r#"<a href="/a">A</a> <a href="/private">P</a> <a href="/skip" rel="nofollow">S</a>"#),
            )
            .page("https://example.com/a", &html(r#"<a href="/">Home</a>"#))
            .blocked("https://example.com/private");

        let crawl = coordinator(&storage, fetcher, Project::with_url(SEED))
            .run(not_stopped())
            .await
            .unwrap();

        assert_eq!(crawl.total_urls, 3);
        assert_eq!(crawl.blocked_by_robots, 1);
        assert_eq!(crawl.internal_follow_links, 3);
        assert_eq!(crawl.internal_nofollow_links, 1);
        assert!(crawl.robots_txt_exists);

        let guard = storage.lock().unwrap();
        let seed = guard.find_page_report(crawl.id, SEED).unwrap().unwrap();
        assert_eq!(seed.depth, 0);
        assert!(seed.crawlable);
        let a = guard
            .find_page_report(crawl.id, "https://example.com/a")
            .unwrap()
            .unwrap();
        assert_eq!(a.depth, 1);
        let private = guard
            .find_page_report(crawl.id, "https://example.com/private")
            .unwrap()
            .unwrap();
        assert!(private.blocked_by_robots);
        assert!(!private.crawlable);
        assert_eq!(private.depth, 1);
        assert!(guard
            .find_page_report(crawl.id, "https://example.com/skip")
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_follow_nofollow_policy() {
        let storage = shared(open_in_memory().unwrap());
        let fetcher = ScriptedFetcher::default()
            .page(SEED, &html(r#"<a href="/skip" rel="nofollow">S</a>"#))
            .page("https://example.com/skip", &html(""));
        let project = Project {
            follow_nofollow: true,
            ..Project::with_url(SEED)
        };

        let crawl = coordinator(&storage, fetcher, project)
            .run(not_stopped())
            .await
            .unwrap();
        assert_eq!(crawl.total_urls, 2);
    }

    #[tokio::test]
    async fn test_sitemap_urls_are_submitted() {
        let storage = shared(open_in_memory().unwrap());
        let mut fetcher = ScriptedFetcher::default()
            .page(SEED, &html(""))
            .page("https://example.com/listed", &html(""));
        fetcher.sitemap = vec!["https://example.com/listed".to_string()];

        let crawl = coordinator(&storage, fetcher, Project::with_url(SEED))
            .run(not_stopped())
            .await
            .unwrap();

        assert_eq!(crawl.total_urls, 2);
        assert!(crawl.sitemap_exists);
        let guard = storage.lock().unwrap();
        let listed = guard
            .find_page_report(crawl.id, "https://example.com/listed")
            .unwrap()
            .unwrap();
        assert!(listed.in_sitemap);
        assert_eq!(listed.depth, 1);
    }

    #[tokio::test]
    async fn test_external_checks_are_memoized() {
        let storage = shared(open_in_memory().unwrap());
        let fetcher = ScriptedFetcher::default()
            .page(
                SEED,
                &html(r#"<a href="/a">A</a> <a href="https://other.org/x">X</a>"#),
            )
            .page("https://example.com/a", &html(r#"<a href="https://other.org/x">X</a>"#));
        let calls = Arc::new(AtomicUsize::new(0));
        let project = Project {
            check_external_links: true,
            ..Project::with_url(SEED)
        };

        let crawl = coordinator(&storage, fetcher, project)
            .with_link_checker(Box::new(CountingChecker {
                calls: calls.clone(),
            }))
            .run(not_stopped())
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let guard = storage.lock().unwrap();
        let seed = guard.find_page_report(crawl.id, SEED).unwrap().unwrap();
        assert_eq!(seed.external_links[0].status_code, Some(404));
        let kinds: Vec<_> = guard
            .get_issues(crawl.id)
            .unwrap()
            .into_iter()
            .filter(|i| i.kind == IssueKind::ExternalLinkBroken)
            .collect();
        assert_eq!(kinds.len(), 2);
    }

    #[tokio::test]
    async fn test_new_crawl_supersedes_previous() {
        let storage = shared(open_in_memory().unwrap());

        let first = coordinator(
            &storage,
            ScriptedFetcher::default().status(SEED, 404),
            Project::with_url(SEED),
        )
        .run(not_stopped())
        .await
        .unwrap();
        let second = coordinator(
            &storage,
            ScriptedFetcher::default().status(SEED, 404),
            Project::with_url(SEED),
        )
        .run(not_stopped())
        .await
        .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.project_id, second.project_id);
        let guard = storage.lock().unwrap();
        assert_eq!(guard.count_page_reports(first.id).unwrap(), 0);
        assert!(guard.get_issues(first.id).unwrap().is_empty());
        assert_eq!(guard.count_page_reports(second.id).unwrap(), 1);
        assert_eq!(
            guard.get_last_crawl(second.project_id).unwrap().map(|c| c.id),
            Some(second.id)
        );
    }

    #[tokio::test]
    async fn test_completed_crawl_discards_every_earlier_crawl() {
        let storage = shared(open_in_memory().unwrap());
        let run = |storage: &SharedStorage<SqliteStorage>| {
            coordinator(
                storage,
                ScriptedFetcher::default().page(SEED, &html("<p>Home</p>")),
                Project::with_url(SEED),
            )
            .run(not_stopped())
        };

        let first = run(&storage).await.unwrap();

        // An interrupted crawl that stored a page before stopping
        let interrupted = {
            let mut guard = storage.lock().unwrap();
            let mut crawl = guard.create_crawl(&CrawlRun::new(first.project_id)).unwrap();
            crawl.phase = CrawlPhase::Stopped;
            guard.update_crawl(&crawl).unwrap();
            let page = PageReport {
                url: SEED.to_string(),
                ..PageReport::default()
            };
            guard.save_page_report(&page, crawl.id).unwrap();
            crawl
        };

        let third = run(&storage).await.unwrap();

        assert_eq!(third.phase, CrawlPhase::Done);
        let guard = storage.lock().unwrap();
        assert_eq!(guard.count_page_reports(first.id).unwrap(), 0);
        assert_eq!(guard.count_page_reports(interrupted.id).unwrap(), 0);
        assert!(guard.get_issues(first.id).unwrap().is_empty());
        assert_eq!(guard.count_page_reports(third.id).unwrap(), 1);
        assert_eq!(guard.get_crawl(interrupted.id).unwrap().phase, CrawlPhase::Stopped);
    }

    #[tokio::test]
    async fn test_failed_issue_counts_still_finish_the_crawl() {
        let storage = shared(FailingCounts(open_in_memory().unwrap()));
        let crawl = Coordinator::new(
            storage.clone(),
            Box::new(ScriptedFetcher::default().status(SEED, 404)),
            Box::new(HtmlObservationBuilder::new("example.com", false)),
            Arc::new(Broker::new()),
            Project::with_url(SEED),
        )
        .run(not_stopped())
        .await
        .unwrap();

        assert_eq!(crawl.phase, CrawlPhase::Done);
        assert!(crawl.is_final());
        assert_eq!(crawl.total_issues, 0);
        let guard = storage.lock().unwrap();
        let stored = guard.get_crawl(crawl.id).unwrap();
        assert_eq!(stored.phase, CrawlPhase::Done);
        assert!(stored.issues_end.is_some());
        assert!(!guard.get_issues(crawl.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identical_bodies_are_duplicated_content() {
        let storage = shared(open_in_memory().unwrap());
        let copy = format!("{}copy", SEED);
        let body = html(r#"<p>Same words on two URLs</p><a href="/copy">Copy</a>"#);
        let fetcher = ScriptedFetcher::default()
            .page(SEED, &body)
            .page(&copy, &body);

        let crawl = coordinator(&storage, fetcher, Project::with_url(SEED))
            .run(not_stopped())
            .await
            .unwrap();

        assert_eq!(crawl.total_urls, 2);
        let guard = storage.lock().unwrap();
        let home = guard.find_page_report(crawl.id, SEED).unwrap().unwrap();
        let copied = guard.find_page_report(crawl.id, &copy).unwrap().unwrap();
        assert_eq!(home.body_hash, copied.body_hash);
        let flagged: HashSet<i64> = guard
            .get_issues(crawl.id)
            .unwrap()
            .into_iter()
            .filter(|i| i.kind == IssueKind::DuplicatedContent)
            .map(|i| i.page_id)
            .collect();
        assert_eq!(flagged, HashSet::from([home.id, copied.id]));
    }

    #[tokio::test]
    async fn test_stopped_crawl_is_not_finalized() {
        let storage = shared(open_in_memory().unwrap());
        let first = coordinator(
            &storage,
            ScriptedFetcher::default().status(SEED, 404),
            Project::with_url(SEED),
        )
        .run(not_stopped())
        .await
        .unwrap();

        let (_stop, stop_rx) = watch::channel(true);
        let crawl = coordinator(
            &storage,
            ScriptedFetcher::default().status(SEED, 404),
            Project::with_url(SEED),
        )
        .run(stop_rx)
        .await
        .unwrap();

        assert_eq!(crawl.phase, CrawlPhase::Stopped);
        assert!(crawl.end.is_some());
        assert!(!crawl.is_final());
        let guard = storage.lock().unwrap();
        assert_eq!(guard.count_page_reports(first.id).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blocked_seed_completes() {
        let storage = shared(open_in_memory().unwrap());
        let fetcher = ScriptedFetcher::default().blocked(SEED);

        let crawl = coordinator(&storage, fetcher, Project::with_url(SEED))
            .run(not_stopped())
            .await
            .unwrap();

        assert_eq!(crawl.phase, CrawlPhase::Done);
        assert_eq!(crawl.total_urls, 1);
        assert_eq!(crawl.blocked_by_robots, 1);
        let guard = storage.lock().unwrap();
        let kinds: Vec<_> = guard
            .get_issues(crawl.id)
            .unwrap()
            .into_iter()
            .map(|i| i.kind)
            .collect();
        assert!(kinds.contains(&IssueKind::BlockedByRobots));
    }

    #[tokio::test]
    async fn test_out_of_scope_seed_is_an_error() {
        let storage = shared(open_in_memory().unwrap());
        let result = coordinator(
            &storage,
            ScriptedFetcher::default(),
            Project::with_url("https://elsewhere.org/"),
        )
        .run(not_stopped())
        .await;

        assert!(matches!(
            result,
            Err(AuditError::Submit {
                source: SubmitError::OutOfScope,
                ..
            })
        ));
    }
}
