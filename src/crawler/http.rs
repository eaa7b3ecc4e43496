//! HTTP fetcher
//!
//! Owns the frontier, the seen-set and a pool of workers that fetch URLs in
//! push order. Redirects are not followed: a 3xx is an observation like any
//! other and its target is submitted by the orchestrator.

use crate::config::Config;
use crate::crawler::fetcher::{
    AckGuard, FetchResponse, Fetcher, FetcherStatus, RequestMeta, SubmitError,
};
use crate::crawler::sitemap::{self, SitemapInfo};
use crate::crawler::Frontier;
use crate::page::{FetchFailure, RawResponse};
use crate::robots::{fetch_robots, RobotsRules};
use crate::state::Project;
use crate::url::{extract_domain, is_in_scope, normalize_url};
use crate::{AuditError, UrlError};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace};
use url::Url;

/// How often the monitor checks whether the frontier has drained
const MONITOR_INTERVAL: Duration = Duration::from_millis(50);

/// Longest robots.txt crawl delay honoured
const MAX_ROBOTS_DELAY_SECS: f64 = 60.0;

/// Settings of one `HttpFetcher`
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    /// Product token matched against robots.txt groups
    pub robots_token: String,
    pub workers: usize,
    /// Pause of a worker between two requests
    pub crawl_delay: Duration,
    pub request_timeout: Duration,
    pub max_urls: u64,
    pub ignore_robots_txt: bool,
    pub allow_subdomains: bool,
    pub crawl_sitemap: bool,
}

impl FetcherConfig {
    pub fn new(config: &Config, project: &Project) -> Self {
        Self {
            user_agent: config.user_agent.header_value(),
            robots_token: config.user_agent.robots_token().to_string(),
            workers: config.crawler.workers.max(1) as usize,
            crawl_delay: Duration::from_millis(config.crawler.crawl_delay),
            request_timeout: Duration::from_secs(config.crawler.request_timeout),
            max_urls: u64::from(config.crawler.max_urls),
            ignore_robots_txt: project.ignore_robots_txt,
            allow_subdomains: project.allow_subdomains,
            crawl_sitemap: project.crawl_sitemap,
        }
    }
}

/// Builds the HTTP client used for a crawl
///
/// Format of the user agent: CrawlerName/Version (+ContactURL; ContactEmail)
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

fn classify(error: &reqwest::Error) -> FetchFailure {
    if error.is_timeout() {
        FetchFailure::Timeout
    } else {
        FetchFailure::Network
    }
}

/// State shared by the fetcher handle, its workers and its monitor
struct Inner {
    client: Client,
    config: FetcherConfig,
    seed_host: String,
    crawl_delay: Duration,
    frontier: Frontier,
    cancel: watch::Sender<bool>,
    /// Every accepted or robots-blocked URL with its request metadata
    seen: Mutex<HashMap<String, RequestMeta>>,
    /// Robots rules per origin
    robots: tokio::sync::Mutex<HashMap<String, RobotsRules>>,
    sitemap: HashSet<String>,
    discovered: AtomicU64,
    crawled: AtomicU64,
    crawling: AtomicU64,
}

impl Inner {
    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn meta_of(&self, url: &str) -> RequestMeta {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .copied()
            .unwrap_or_default()
    }

    async fn robots_allows(&self, url: &Url) -> bool {
        if self.config.ignore_robots_txt {
            return true;
        }

        let origin = url.origin().ascii_serialization();
        let mut cache = self.robots.lock().await;
        if !cache.contains_key(&origin) {
            let fetched = fetch_robots(&self.client, url).await;
            cache.insert(origin.clone(), fetched.rules);
        }
        cache
            .get(&origin)
            .map_or(true, |rules| rules.is_allowed(url.as_str(), &self.config.robots_token))
    }

    /// Records the URL as seen and queues it when allowed
    ///
    /// The frontier push happens before `discovered` grows, so the monitor
    /// never sees a positive count ahead of the queued URL.
    fn admit(&self, url: &str, meta: RequestMeta, allowed: bool) -> Result<(), SubmitError> {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.contains_key(url) {
            return Err(SubmitError::Duplicate);
        }
        if allowed && self.discovered.load(Ordering::SeqCst) >= self.config.max_urls {
            return Err(SubmitError::LimitReached);
        }
        seen.insert(url.to_string(), meta);

        if !allowed {
            return Err(SubmitError::BlockedByRobots);
        }
        self.frontier.push(url).map_err(|_| SubmitError::Closed)?;
        self.discovered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch(&self, url: &str) -> RawResponse {
        let started = Instant::now();
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("GET {} failed (connect: {}): {}", url, e.is_connect(), e);
                return RawResponse::failed(url, classify(&e));
            }
        };
        let ttfb = started.elapsed();
        let status = response.status().as_u16();
        let headers = response.headers().clone();

        match response.bytes().await {
            Ok(body) => RawResponse {
                url: url.to_string(),
                status,
                headers,
                body: body.to_vec(),
                ttfb,
                failure: None,
            },
            Err(e) => {
                debug!("Reading {} failed: {}", url, e);
                RawResponse::failed(url, classify(&e))
            }
        }
    }
}

async fn worker(id: usize, inner: Arc<Inner>, responses: mpsc::Sender<FetchResponse>) {
    let mut cancel = inner.cancel.subscribe();

    while let Some(url) = inner.frontier.poll().await {
        let ack = AckGuard::new(inner.frontier.clone(), &url);

        inner.crawling.fetch_add(1, Ordering::SeqCst);
        let raw = inner.fetch(&url).await;
        inner.crawling.fetch_sub(1, Ordering::SeqCst);
        inner.crawled.fetch_add(1, Ordering::SeqCst);
        trace!(worker = id, status = raw.status, "Fetched {}", url);

        let response = FetchResponse {
            meta: inner.meta_of(&url),
            in_sitemap: inner.sitemap.contains(&url),
            raw,
            ack,
        };
        if responses.send(response).await.is_err() {
            break;
        }

        if !inner.crawl_delay.is_zero() {
            tokio::select! {
                _ = cancel.changed() => break,
                _ = tokio::time::sleep(inner.crawl_delay) => {}
            }
        }
    }

    trace!(worker = id, "Worker finished");
}

/// Cancels the crawl once something was queued and nothing is left to do
async fn monitor(inner: Arc<Inner>) {
    let mut cancel = inner.cancel.subscribe();

    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            _ = tokio::time::sleep(MONITOR_INTERVAL) => {}
        }
        if inner.is_cancelled() {
            break;
        }
        if inner.discovered.load(Ordering::SeqCst) > 0 && !inner.frontier.active().await {
            debug!("Frontier drained, stopping workers");
            inner.cancel.send_replace(true);
            break;
        }
    }
}

/// Production `Fetcher` over HTTP
pub struct HttpFetcher {
    inner: Arc<Inner>,
    responses: tokio::sync::Mutex<mpsc::Receiver<FetchResponse>>,
    robots_present: bool,
    sitemap: SitemapInfo,
}

impl HttpFetcher {
    /// Reads robots.txt and the sitemap of the seed host, then starts the
    /// workers
    ///
    /// Nothing is fetched until the first `submit`.
    pub async fn start(config: FetcherConfig, seed: &Url) -> Result<Self, AuditError> {
        let client = build_http_client(&config.user_agent, config.request_timeout)?;
        let seed_host = extract_domain(seed).ok_or(UrlError::MissingDomain)?;

        let robots = fetch_robots(&client, seed).await;
        let mut crawl_delay = config.crawl_delay;
        if let Some(secs) = robots.rules.crawl_delay(&config.robots_token) {
            if secs.is_finite() && secs > 0.0 {
                crawl_delay = crawl_delay.max(Duration::from_secs_f64(secs.min(MAX_ROBOTS_DELAY_SECS)));
            }
        }

        let locations = sitemap::sitemap_locations(seed, &robots.rules);
        let mut sitemap = sitemap::discover(
            &client,
            &locations,
            &robots.rules,
            &config.robots_token,
            config.crawl_sitemap,
        )
        .await;
        sitemap.urls = sitemap
            .urls
            .iter()
            .filter_map(|u| normalize_url(u).ok())
            .map(|u| u.to_string())
            .collect();

        info!(
            "Crawling {} with {} workers (robots.txt: {}, sitemap: {})",
            seed, config.workers, robots.present, sitemap.present
        );

        let mut robots_cache = HashMap::new();
        robots_cache.insert(seed.origin().ascii_serialization(), robots.rules);

        let (cancel, cancel_rx) = watch::channel(false);
        let frontier = Frontier::spawn(cancel_rx);
        let workers = config.workers.max(1);

        let inner = Arc::new(Inner {
            client,
            seed_host,
            crawl_delay,
            frontier,
            cancel,
            seen: Mutex::new(HashMap::new()),
            robots: tokio::sync::Mutex::new(robots_cache),
            sitemap: sitemap.urls.iter().cloned().collect(),
            discovered: AtomicU64::new(0),
            crawled: AtomicU64::new(0),
            crawling: AtomicU64::new(0),
            config,
        });

        let (tx, rx) = mpsc::channel(workers * 2);
        for id in 0..workers {
            tokio::spawn(worker(id, Arc::clone(&inner), tx.clone()));
        }
        tokio::spawn(monitor(Arc::clone(&inner)));

        Ok(Self {
            inner,
            responses: tokio::sync::Mutex::new(rx),
            robots_present: robots.present,
            sitemap,
        })
    }
}

impl Drop for HttpFetcher {
    fn drop(&mut self) {
        // Workers and the monitor hold `inner`, so they only exit on cancel
        self.inner.cancel.send_replace(true);
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn next(&self) -> Option<FetchResponse> {
        self.responses.lock().await.recv().await
    }

    async fn submit(&self, url: &str, meta: RequestMeta) -> Result<(), SubmitError> {
        if self.inner.is_cancelled() {
            return Err(SubmitError::Closed);
        }

        let url = normalize_url(url).map_err(|e| SubmitError::Invalid(e.to_string()))?;
        let host = extract_domain(&url).ok_or_else(|| SubmitError::Invalid(url.to_string()))?;
        if !meta.ignore_domain
            && !is_in_scope(&self.inner.seed_host, &host, self.inner.config.allow_subdomains)
        {
            return Err(SubmitError::OutOfScope);
        }

        let allowed = self.inner.robots_allows(&url).await;
        self.inner.admit(url.as_str(), meta, allowed)
    }

    fn stop(&self) {
        self.inner.cancel.send_replace(true);
    }

    fn status(&self) -> FetcherStatus {
        FetcherStatus {
            crawled: self.inner.crawled.load(Ordering::SeqCst),
            discovered: self.inner.discovered.load(Ordering::SeqCst),
            crawling: self.inner.crawling.load(Ordering::SeqCst),
        }
    }

    fn robots_present(&self) -> bool {
        self.robots_present
    }

    fn sitemap_present(&self) -> bool {
        self.sitemap.present
    }

    fn sitemap_blocked(&self) -> bool {
        self.sitemap.blocked
    }

    fn sitemap_urls(&self) -> Vec<String> {
        self.sitemap.urls.clone()
    }

    fn in_sitemap(&self, url: &str) -> bool {
        normalize_url(url).map_or(false, |u| self.inner.sitemap.contains(u.as_str()))
    }
}
