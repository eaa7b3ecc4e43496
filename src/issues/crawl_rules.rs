//! Crawl-wide rule catalog
//!
//! These rules need the whole crawl: they are relational queries over the
//! persisted observations and only run after the fetch stream is exhausted.
//! Every query takes the crawl id as `?1` and selects page ids.

use crate::issues::IssueKind;
use crate::state::CrawlRun;
use crate::storage::{self, SharedStorage, Storage, StorageError, StorageResult};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

/// One crawl-wide defect query
#[derive(Debug, Clone, Copy)]
pub struct CrawlRule {
    pub kind: IssueKind,
    pub sql: &'static str,
}

/// Page ids fetched per query round trip
const PAGE_SIZE: usize = 256;

impl CrawlRule {
    /// Lazily runs the query for a finished crawl
    ///
    /// Nothing touches the database until the stream is first polled. Ids are
    /// fetched `PAGE_SIZE` at a time, each page on a blocking task, and the
    /// next page is only queried once the previous one is consumed. A failed
    /// query ends the stream with a single error.
    pub fn page_ids<S>(
        &self,
        storage: SharedStorage<S>,
        crawl: &CrawlRun,
    ) -> BoxStream<'static, StorageResult<i64>>
    where
        S: Storage + 'static,
    {
        let sql = self.sql;
        let crawl_id = crawl.id;

        stream::try_unfold(Some(0), move |after| {
            let storage = storage.clone();
            async move {
                let Some(after) = after else {
                    return Ok(None);
                };
                let query = tokio::task::spawn_blocking(move || {
                    let guard = storage::lock(&storage)?;
                    guard.select_page_ids(sql, crawl_id, after, PAGE_SIZE)
                });
                let ids = match query.await {
                    Ok(result) => result?,
                    Err(e) => {
                        return Err(StorageError::Database(format!("query task failed: {}", e)))
                    }
                };
                let Some(&last) = ids.last() else {
                    return Ok(None);
                };
                let next = (ids.len() == PAGE_SIZE).then_some(last);
                Ok(Some((stream::iter(ids.into_iter().map(Ok::<i64, StorageError>)), next)))
            }
        })
        .try_flatten()
        .boxed()
    }
}

const DUPLICATED_TITLE: &str = "
SELECT p.id FROM pagereports p
JOIN (
    SELECT title FROM pagereports
    WHERE crawl_id = ?1 AND media_type = 'text/html' AND status_code BETWEEN 200 AND 299
      AND crawlable = 1 AND (canonical = '' OR canonical = url) AND title != ''
    GROUP BY title HAVING COUNT(*) > 1
) d ON d.title = p.title
WHERE p.crawl_id = ?1 AND p.media_type = 'text/html' AND p.status_code BETWEEN 200 AND 299
  AND p.crawlable = 1 AND (p.canonical = '' OR p.canonical = p.url)";

const DUPLICATED_DESCRIPTION: &str = "
SELECT p.id FROM pagereports p
JOIN (
    SELECT description FROM pagereports
    WHERE crawl_id = ?1 AND media_type = 'text/html' AND status_code BETWEEN 200 AND 299
      AND crawlable = 1 AND (canonical = '' OR canonical = url) AND description != ''
    GROUP BY description HAVING COUNT(*) > 1
) d ON d.description = p.description
WHERE p.crawl_id = ?1 AND p.media_type = 'text/html' AND p.status_code BETWEEN 200 AND 299
  AND p.crawlable = 1 AND (p.canonical = '' OR p.canonical = p.url)";

const DUPLICATED_CONTENT: &str = "
SELECT p.id FROM pagereports p
JOIN (
    SELECT body_hash FROM pagereports
    WHERE crawl_id = ?1 AND media_type = 'text/html' AND status_code BETWEEN 200 AND 299
      AND crawlable = 1 AND (canonical = '' OR canonical = url) AND body_hash != ''
    GROUP BY body_hash HAVING COUNT(*) > 1
) d ON d.body_hash = p.body_hash
WHERE p.crawl_id = ?1 AND p.media_type = 'text/html' AND p.status_code BETWEEN 200 AND 299
  AND p.crawlable = 1 AND (p.canonical = '' OR p.canonical = p.url)";

// The seed (depth 0) is never an orphan.
const ORPHAN: &str = "
SELECT p.id FROM pagereports p
WHERE p.crawl_id = ?1 AND p.depth > 0 AND p.media_type = 'text/html'
  AND p.status_code BETWEEN 200 AND 299 AND p.crawlable = 1
  AND NOT EXISTS (
      SELECT 1 FROM links l
      WHERE l.crawl_id = ?1 AND l.url = p.url AND l.pagereport_id != p.id)
  AND NOT EXISTS (
      SELECT 1 FROM pagereports r
      WHERE r.crawl_id = ?1 AND r.id != p.id
        AND (r.redirect_url = p.url OR r.refresh = p.url OR r.canonical = p.url))";

const REDIRECT_CHAIN: &str = "
SELECT DISTINCT a.id FROM pagereports a
JOIN pagereports b ON b.crawl_id = a.crawl_id AND b.url = a.redirect_url
WHERE a.crawl_id = ?1 AND a.status_code BETWEEN 300 AND 399
  AND b.status_code BETWEEN 300 AND 399 AND b.redirect_url != a.url";

const REDIRECT_LOOP: &str = "
SELECT DISTINCT a.id FROM pagereports a
JOIN pagereports b ON b.crawl_id = a.crawl_id AND b.url = a.redirect_url
WHERE a.crawl_id = ?1 AND a.status_code BETWEEN 300 AND 399
  AND b.status_code BETWEEN 300 AND 399 AND b.redirect_url = a.url";

const CANONICAL_TO_NON_CANONICAL: &str = "
SELECT DISTINCT p.id FROM pagereports p
JOIN pagereports t ON t.crawl_id = p.crawl_id AND t.url = p.canonical
WHERE p.crawl_id = ?1 AND p.canonical != '' AND p.canonical != p.url
  AND t.canonical != '' AND t.canonical != t.url";

const CANONICAL_TO_NOINDEX: &str = "
SELECT DISTINCT p.id FROM pagereports p
JOIN pagereports t ON t.crawl_id = p.crawl_id AND t.url = p.canonical
WHERE p.crawl_id = ?1 AND p.canonical != '' AND p.canonical != p.url AND t.noindex = 1";

const CANONICAL_TO_REDIRECT: &str = "
SELECT DISTINCT p.id FROM pagereports p
JOIN pagereports t ON t.crawl_id = p.crawl_id AND t.url = p.canonical
WHERE p.crawl_id = ?1 AND p.canonical != '' AND p.canonical != p.url
  AND t.status_code BETWEEN 300 AND 399";

const CANONICAL_TO_ERROR: &str = "
SELECT DISTINCT p.id FROM pagereports p
JOIN pagereports t ON t.crawl_id = p.crawl_id AND t.url = p.canonical
WHERE p.crawl_id = ?1 AND p.canonical != '' AND p.canonical != p.url
  AND (t.status_code >= 400 OR t.timeout = 1)";

const HREFLANG_TO_NON_CANONICAL: &str = "
SELECT DISTINCT h.pagereport_id FROM hreflangs h
JOIN pagereports t ON t.crawl_id = h.crawl_id AND t.url = h.url
WHERE h.crawl_id = ?1 AND t.canonical != '' AND t.canonical != t.url";

const HREFLANG_NO_RETURN: &str = "
SELECT DISTINCT h.pagereport_id FROM hreflangs h
JOIN pagereports p ON p.id = h.pagereport_id
JOIN pagereports t ON t.crawl_id = h.crawl_id AND t.url = h.url
WHERE h.crawl_id = ?1 AND t.id != p.id AND t.media_type = 'text/html'
  AND t.status_code BETWEEN 200 AND 299
  AND NOT EXISTS (
      SELECT 1 FROM hreflangs r WHERE r.pagereport_id = t.id AND r.url = p.url)";

const HREFLANG_TO_NOINDEX: &str = "
SELECT DISTINCT h.pagereport_id FROM hreflangs h
JOIN pagereports t ON t.crawl_id = h.crawl_id AND t.url = h.url
WHERE h.crawl_id = ?1 AND t.noindex = 1";

const FOLLOW_AND_NOFOLLOW_INCOMING: &str = "
SELECT p.id FROM pagereports p
WHERE p.crawl_id = ?1
  AND EXISTS (SELECT 1 FROM links l WHERE l.crawl_id = ?1 AND l.url = p.url AND l.nofollow = 1)
  AND EXISTS (SELECT 1 FROM links l WHERE l.crawl_id = ?1 AND l.url = p.url AND l.nofollow = 0)";

const NON_CANONICAL_IN_SITEMAP: &str = "
SELECT id FROM pagereports
WHERE crawl_id = ?1 AND in_sitemap = 1 AND canonical != '' AND canonical != url";

const NOINDEX_IN_SITEMAP: &str = "
SELECT id FROM pagereports WHERE crawl_id = ?1 AND in_sitemap = 1 AND noindex = 1";

const BLOCKED_IN_SITEMAP: &str = "
SELECT id FROM pagereports WHERE crawl_id = ?1 AND in_sitemap = 1 AND blocked_by_robots = 1";

const LINK_TO_REDIRECT: &str = "
SELECT DISTINCT l.pagereport_id FROM links l
JOIN pagereports t ON t.crawl_id = l.crawl_id AND t.url = l.url
WHERE l.crawl_id = ?1 AND t.status_code BETWEEN 300 AND 399";

const LINK_TO_BROKEN: &str = "
SELECT DISTINCT l.pagereport_id FROM links l
JOIN pagereports t ON t.crawl_id = l.crawl_id AND t.url = l.url
WHERE l.crawl_id = ?1 AND (t.status_code >= 400 OR t.timeout = 1)";

static CRAWL_RULES: &[CrawlRule] = &[
    CrawlRule { kind: IssueKind::DuplicatedTitle, sql: DUPLICATED_TITLE },
    CrawlRule { kind: IssueKind::DuplicatedDescription, sql: DUPLICATED_DESCRIPTION },
    CrawlRule { kind: IssueKind::DuplicatedContent, sql: DUPLICATED_CONTENT },
    CrawlRule { kind: IssueKind::Orphan, sql: ORPHAN },
    CrawlRule { kind: IssueKind::RedirectChain, sql: REDIRECT_CHAIN },
    CrawlRule { kind: IssueKind::RedirectLoop, sql: REDIRECT_LOOP },
    CrawlRule { kind: IssueKind::CanonicalToNonCanonical, sql: CANONICAL_TO_NON_CANONICAL },
    CrawlRule { kind: IssueKind::CanonicalToNoindex, sql: CANONICAL_TO_NOINDEX },
    CrawlRule { kind: IssueKind::CanonicalToRedirect, sql: CANONICAL_TO_REDIRECT },
    CrawlRule { kind: IssueKind::CanonicalToError, sql: CANONICAL_TO_ERROR },
    CrawlRule { kind: IssueKind::HreflangToNonCanonical, sql: HREFLANG_TO_NON_CANONICAL },
    CrawlRule { kind: IssueKind::HreflangNoReturn, sql: HREFLANG_NO_RETURN },
    CrawlRule { kind: IssueKind::HreflangToNoindex, sql: HREFLANG_TO_NOINDEX },
    CrawlRule { kind: IssueKind::FollowAndNofollowIncoming, sql: FOLLOW_AND_NOFOLLOW_INCOMING },
    CrawlRule { kind: IssueKind::NonCanonicalInSitemap, sql: NON_CANONICAL_IN_SITEMAP },
    CrawlRule { kind: IssueKind::NoindexInSitemap, sql: NOINDEX_IN_SITEMAP },
    CrawlRule { kind: IssueKind::BlockedInSitemap, sql: BLOCKED_IN_SITEMAP },
    CrawlRule { kind: IssueKind::LinkToRedirect, sql: LINK_TO_REDIRECT },
    CrawlRule { kind: IssueKind::LinkToBroken, sql: LINK_TO_BROKEN },
];

/// The registered crawl-wide rules, in evaluation order
pub fn crawl_rules() -> &'static [CrawlRule] {
    CRAWL_RULES
}
