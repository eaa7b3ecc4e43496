//! Report manager
//!
//! Runs the rule catalogs and funnels every match through one channel into a
//! blocking writer task that saves issues in batches.

use crate::issues::{crawl_rules, page_rules, CrawlRule, IssueRecord, PageRule};
use crate::page::PageReport;
use crate::state::CrawlRun;
use crate::storage::{self, SharedStorage, Storage};
use futures::StreamExt;
use reqwest::header::HeaderMap;
use scraper::Html;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

/// Default number of issues written per transaction
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Collects issues and writes them in batches
///
/// A failed batch is logged and dropped so the crawl keeps going.
struct IssueWriter<S> {
    storage: SharedStorage<S>,
    batch_size: usize,
    buffer: Vec<IssueRecord>,
    written: u64,
}

impl<S: Storage> IssueWriter<S> {
    fn new(storage: SharedStorage<S>, batch_size: usize) -> Self {
        Self {
            storage,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            written: 0,
        }
    }

    fn add(&mut self, record: IssueRecord) {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let count = self.buffer.len();
        trace!("Flushing batch of {} issues", count);

        let result =
            storage::lock(&self.storage).and_then(|mut guard| guard.save_issues(&self.buffer));
        match result {
            Ok(()) => self.written += count as u64,
            Err(e) => error!("Failed to save batch of {} issues: {}", count, e),
        }
        self.buffer.clear();
    }
}

/// Turns observations and finished crawls into stored issues
pub struct ReportManager<S> {
    storage: SharedStorage<S>,
    batch_size: usize,
}

impl<S: Storage + 'static> ReportManager<S> {
    pub fn new(storage: SharedStorage<S>) -> Self {
        Self {
            storage,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Sets the number of issues written per transaction (at least 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn spawn_writer(&self) -> (mpsc::Sender<IssueRecord>, JoinHandle<u64>) {
        let (tx, mut rx) = mpsc::channel::<IssueRecord>(self.batch_size);
        let mut writer = IssueWriter::new(self.storage.clone(), self.batch_size);

        let handle = tokio::task::spawn_blocking(move || {
            while let Some(record) = rx.blocking_recv() {
                writer.add(record);
            }
            writer.flush();
            writer.written
        });

        (tx, handle)
    }

    async fn drain(handle: JoinHandle<u64>) -> u64 {
        match handle.await {
            Ok(written) => written,
            Err(e) => {
                error!("Issue writer task failed: {}", e);
                0
            }
        }
    }

    /// Runs every page rule against one observation
    ///
    /// Returns once all matches are stored, with the number of issues
    /// written.
    pub async fn evaluate_page(
        &self,
        page: &PageReport,
        document: &Html,
        headers: &HeaderMap,
        crawl: &CrawlRun,
    ) -> u64 {
        self.evaluate_with(page_rules(), page, document, headers, crawl)
            .await
    }

    pub(crate) async fn evaluate_with(
        &self,
        rules: &[PageRule],
        page: &PageReport,
        document: &Html,
        headers: &HeaderMap,
        crawl: &CrawlRun,
    ) -> u64 {
        let matches: Vec<IssueRecord> = rules
            .iter()
            .filter(|rule| {
                match catch_unwind(AssertUnwindSafe(|| (rule.check)(page, document, headers))) {
                    Ok(matched) => matched,
                    Err(_) => {
                        error!("Rule {} panicked on {}", rule.kind, page.url);
                        false
                    }
                }
            })
            .map(|rule| IssueRecord::new(page.id, crawl.id, rule.kind))
            .collect();

        let (tx, handle) = self.spawn_writer();
        for record in matches {
            trace!("{}: {}", record.kind, page.url);
            if tx.send(record).await.is_err() {
                break;
            }
        }
        drop(tx);

        Self::drain(handle).await
    }

    /// Runs the crawl-wide rules one after another for a finished crawl
    ///
    /// A rule whose query fails is logged and skipped. Returns the number of
    /// issues written.
    pub async fn finalize_crawl(&self, crawl: &CrawlRun) -> u64 {
        self.finalize_with(crawl_rules(), crawl).await
    }

    pub(crate) async fn finalize_with(&self, rules: &[CrawlRule], crawl: &CrawlRun) -> u64 {
        let (tx, handle) = self.spawn_writer();

        'rules: for rule in rules {
            let mut found = 0u64;
            let mut ids = rule.page_ids(self.storage.clone(), crawl);
            while let Some(item) = ids.next().await {
                match item {
                    Ok(page_id) => {
                        found += 1;
                        if tx.send(IssueRecord::new(page_id, crawl.id, rule.kind)).await.is_err() {
                            error!("Issue writer stopped during {}", rule.kind);
                            break 'rules;
                        }
                    }
                    Err(e) => {
                        warn!("Crawl rule {} failed: {}", rule.kind, e);
                        break;
                    }
                }
            }
            debug!("Crawl rule {} matched {} pages", rule.kind, found);
        }
        drop(tx);

        Self::drain(handle).await
    }
}
