//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::issues::{IssueKind, IssueRecord, Priority};
use crate::page::{Hreflang, Image, Link, PageReport};
use crate::state::{CrawlPhase, CrawlRun, Project};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::AuditError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use url::Url;

const CRAWL_COLUMNS: &str = "id, project_id, phase, started_at, ended_at, issues_ended_at,
    total_urls, total_issues, critical_issues, alert_issues, warning_issues,
    blocked_by_robots, noindex, internal_follow_links, internal_nofollow_links,
    external_follow_links, external_nofollow_links, sponsored_links, ugc_links,
    robots_txt_exists, sitemap_exists, sitemap_is_blocked";

const PAGE_COLUMNS: &str = "id, url, redirect_url, refresh, status_code, content_type,
    media_type, lang, title, description, robots, noindex, nofollow, canonical, h1, h2,
    words, size, body_hash, ttfb_ms, depth, timeout, blocked_by_robots, crawlable, in_sitemap";

/// Counters are unsigned in memory and INTEGER in SQLite
fn int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn uint(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn parse_time(value: &str) -> StorageResult<DateTime<Utc>> {
    value
        .parse::<DateTime<Utc>>()
        .map_err(|e| StorageError::InvalidValue(format!("timestamp {}: {}", value, e)))
}

fn parse_optional_time(value: Option<String>) -> StorageResult<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_time).transpose()
}

/// Raw crawl columns, converted outside the row closure so conversion errors
/// surface as storage errors
struct CrawlRow {
    run: CrawlRun,
    phase: String,
    started_at: String,
    ended_at: Option<String>,
    issues_ended_at: Option<String>,
}

impl CrawlRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mut run = CrawlRun::new(row.get(1)?);
        run.id = row.get(0)?;
        run.total_urls = uint(row.get(6)?);
        run.total_issues = uint(row.get(7)?);
        run.critical_issues = uint(row.get(8)?);
        run.alert_issues = uint(row.get(9)?);
        run.warning_issues = uint(row.get(10)?);
        run.blocked_by_robots = uint(row.get(11)?);
        run.noindex = uint(row.get(12)?);
        run.internal_follow_links = uint(row.get(13)?);
        run.internal_nofollow_links = uint(row.get(14)?);
        run.external_follow_links = uint(row.get(15)?);
        run.external_nofollow_links = uint(row.get(16)?);
        run.sponsored_links = uint(row.get(17)?);
        run.ugc_links = uint(row.get(18)?);
        run.robots_txt_exists = row.get(19)?;
        run.sitemap_exists = row.get(20)?;
        run.sitemap_is_blocked = row.get(21)?;

        Ok(Self {
            run,
            phase: row.get(2)?,
            started_at: row.get(3)?,
            ended_at: row.get(4)?,
            issues_ended_at: row.get(5)?,
        })
    }

    fn into_crawl(self) -> StorageResult<CrawlRun> {
        let mut run = self.run;
        run.phase = CrawlPhase::from_db_string(&self.phase)
            .ok_or_else(|| StorageError::InvalidValue(format!("crawl phase {}", self.phase)))?;
        run.start = parse_time(&self.started_at)?;
        run.end = parse_optional_time(self.ended_at)?;
        run.issues_end = parse_optional_time(self.issues_ended_at)?;
        Ok(run)
    }
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageReport> {
    let url: String = row.get(1)?;
    Ok(PageReport {
        id: row.get(0)?,
        parsed_url: Url::parse(&url).ok(),
        url,
        redirect_url: row.get(2)?,
        refresh: row.get(3)?,
        status_code: row.get(4)?,
        content_type: row.get(5)?,
        media_type: row.get(6)?,
        lang: row.get(7)?,
        title: row.get(8)?,
        description: row.get(9)?,
        robots: row.get(10)?,
        noindex: row.get(11)?,
        nofollow: row.get(12)?,
        canonical: row.get(13)?,
        h1: row.get(14)?,
        h2: row.get(15)?,
        words: row.get(16)?,
        size: uint(row.get(17)?),
        body_hash: row.get(18)?,
        ttfb_ms: uint(row.get(19)?),
        depth: row.get(20)?,
        timeout: row.get(21)?,
        blocked_by_robots: row.get(22)?,
        crawlable: row.get(23)?,
        in_sitemap: row.get(24)?,
        ..PageReport::default()
    })
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(AuditError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, AuditError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn insert_links(
        tx: &Transaction<'_>,
        table: &str,
        page_id: i64,
        crawl_id: i64,
        links: &[Link],
    ) -> StorageResult<()> {
        let sql = format!(
            "INSERT INTO {} (pagereport_id, crawl_id, url, text, nofollow, sponsored, ugc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            table
        );
        let mut stmt = tx.prepare_cached(&sql)?;
        for link in links {
            stmt.execute(params![
                page_id,
                crawl_id,
                link.url,
                link.text,
                link.nofollow,
                link.sponsored,
                link.ugc,
            ])?;
        }
        Ok(())
    }

    fn load_links(&self, table: &str, page_id: i64) -> StorageResult<Vec<Link>> {
        let status_column = if table == "external_links" {
            "status_code"
        } else {
            "NULL"
        };
        let sql = format!(
            "SELECT url, text, nofollow, sponsored, ugc, {} FROM {} WHERE pagereport_id = ?1 ORDER BY id",
            status_column, table
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let links = stmt
            .query_map(params![page_id], |row| {
                Ok(Link {
                    url: row.get(0)?,
                    text: row.get(1)?,
                    nofollow: row.get(2)?,
                    sponsored: row.get(3)?,
                    ugc: row.get(4)?,
                    status_code: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    fn load_children(&self, page: &mut PageReport) -> StorageResult<()> {
        page.links = self.load_links("links", page.id)?;
        page.external_links = self.load_links("external_links", page.id)?;

        let mut stmt = self
            .conn
            .prepare("SELECT lang, url FROM hreflangs WHERE pagereport_id = ?1 ORDER BY id")?;
        page.hreflangs = stmt
            .query_map(params![page.id], |row| {
                Ok(Hreflang {
                    lang: row.get(0)?,
                    url: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT url, alt FROM images WHERE pagereport_id = ?1 ORDER BY id")?;
        page.images = stmt
            .query_map(params![page.id], |row| {
                Ok(Image {
                    url: row.get(0)?,
                    alt: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT kind, url FROM resources WHERE pagereport_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![page.id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (kind, url) = row?;
            match kind.as_str() {
                "script" => page.scripts.push(url),
                "style" => page.styles.push(url),
                "iframe" => page.iframes.push(url),
                "audio" => page.audios.push(url),
                "video" => page.videos.push(url),
                other => {
                    return Err(StorageError::InvalidValue(format!("resource kind {}", other)))
                }
            }
        }

        Ok(())
    }
}

impl Storage for SqliteStorage {
    // ===== Projects =====

    fn upsert_project(&mut self, project: &Project) -> StorageResult<Project> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO projects
             (url, ignore_robots_txt, follow_nofollow, include_noindex, crawl_sitemap,
              allow_subdomains, check_external_links, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(url) DO UPDATE SET
                ignore_robots_txt = excluded.ignore_robots_txt,
                follow_nofollow = excluded.follow_nofollow,
                include_noindex = excluded.include_noindex,
                crawl_sitemap = excluded.crawl_sitemap,
                allow_subdomains = excluded.allow_subdomains,
                check_external_links = excluded.check_external_links",
            params![
                project.url,
                project.ignore_robots_txt,
                project.follow_nofollow,
                project.include_noindex,
                project.crawl_sitemap,
                project.allow_subdomains,
                project.check_external_links,
                now,
            ],
        )?;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM projects WHERE url = ?1",
            params![project.url],
            |row| row.get(0),
        )?;

        Ok(Project {
            id,
            ..project.clone()
        })
    }

    // ===== Crawls =====

    fn create_crawl(&mut self, crawl: &CrawlRun) -> StorageResult<CrawlRun> {
        self.conn.execute(
            "INSERT INTO crawls (project_id, phase, started_at) VALUES (?1, ?2, ?3)",
            params![
                crawl.project_id,
                crawl.phase.to_db_string(),
                crawl.start.to_rfc3339()
            ],
        )?;
        let mut created = crawl.clone();
        created.id = self.conn.last_insert_rowid();
        self.update_crawl(&created)?;
        Ok(created)
    }

    fn update_crawl(&mut self, crawl: &CrawlRun) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE crawls SET
                phase = ?2, started_at = ?3, ended_at = ?4, issues_ended_at = ?5,
                total_urls = ?6, total_issues = ?7, critical_issues = ?8,
                alert_issues = ?9, warning_issues = ?10, blocked_by_robots = ?11,
                noindex = ?12, internal_follow_links = ?13, internal_nofollow_links = ?14,
                external_follow_links = ?15, external_nofollow_links = ?16,
                sponsored_links = ?17, ugc_links = ?18, robots_txt_exists = ?19,
                sitemap_exists = ?20, sitemap_is_blocked = ?21
             WHERE id = ?1",
            params![
                crawl.id,
                crawl.phase.to_db_string(),
                crawl.start.to_rfc3339(),
                crawl.end.map(|t| t.to_rfc3339()),
                crawl.issues_end.map(|t| t.to_rfc3339()),
                int(crawl.total_urls),
                int(crawl.total_issues),
                int(crawl.critical_issues),
                int(crawl.alert_issues),
                int(crawl.warning_issues),
                int(crawl.blocked_by_robots),
                int(crawl.noindex),
                int(crawl.internal_follow_links),
                int(crawl.internal_nofollow_links),
                int(crawl.external_follow_links),
                int(crawl.external_nofollow_links),
                int(crawl.sponsored_links),
                int(crawl.ugc_links),
                crawl.robots_txt_exists,
                crawl.sitemap_exists,
                crawl.sitemap_is_blocked,
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::CrawlNotFound(crawl.id));
        }
        Ok(())
    }

    fn get_crawl(&self, crawl_id: i64) -> StorageResult<CrawlRun> {
        let sql = format!("SELECT {} FROM crawls WHERE id = ?1", CRAWL_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![crawl_id], CrawlRow::from_row)
            .optional()?
            .ok_or(StorageError::CrawlNotFound(crawl_id))?;
        row.into_crawl()
    }

    fn get_last_crawl(&self, project_id: i64) -> StorageResult<Option<CrawlRun>> {
        let sql = format!(
            "SELECT {} FROM crawls WHERE project_id = ?1 ORDER BY id DESC LIMIT 1",
            CRAWL_COLUMNS
        );
        self.conn
            .query_row(&sql, params![project_id], CrawlRow::from_row)
            .optional()?
            .map(CrawlRow::into_crawl)
            .transpose()
    }

    fn superseded_crawl_ids(&self, project_id: i64, crawl_id: i64) -> StorageResult<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id FROM crawls c
             WHERE c.project_id = ?1 AND c.id < ?2
               AND (EXISTS (SELECT 1 FROM pagereports p WHERE p.crawl_id = c.id)
                    OR EXISTS (SELECT 1 FROM issues i WHERE i.crawl_id = c.id))
             ORDER BY c.id",
        )?;
        let ids = stmt
            .query_map(params![project_id, crawl_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn delete_crawl_data(&mut self, crawl_id: i64) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        for table in [
            "issues",
            "links",
            "external_links",
            "hreflangs",
            "images",
            "resources",
            "pagereports",
        ] {
            tx.execute(
                &format!("DELETE FROM {} WHERE crawl_id = ?1", table),
                params![crawl_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ===== Page reports =====

    fn save_page_report(
        &mut self,
        page: &PageReport,
        crawl_id: i64,
    ) -> StorageResult<PageReport> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO pagereports
             (crawl_id, url, scheme, redirect_url, refresh, status_code, content_type,
              media_type, lang, title, description, robots, noindex, nofollow, canonical,
              h1, h2, words, size, body_hash, ttfb_ms, depth, timeout, blocked_by_robots,
              crawlable, in_sitemap)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
            params![
                crawl_id,
                page.url,
                page.scheme(),
                page.redirect_url,
                page.refresh,
                page.status_code,
                page.content_type,
                page.media_type,
                page.lang,
                page.title,
                page.description,
                page.robots,
                page.noindex,
                page.nofollow,
                page.canonical,
                page.h1,
                page.h2,
                page.words,
                int(page.size),
                page.body_hash,
                int(page.ttfb_ms),
                page.depth,
                page.timeout,
                page.blocked_by_robots,
                page.crawlable,
                page.in_sitemap,
            ],
        )?;
        let page_id = tx.last_insert_rowid();

        Self::insert_links(&tx, "links", page_id, crawl_id, &page.links)?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO external_links
                 (pagereport_id, crawl_id, url, text, nofollow, sponsored, ugc, status_code)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for link in &page.external_links {
                stmt.execute(params![
                    page_id,
                    crawl_id,
                    link.url,
                    link.text,
                    link.nofollow,
                    link.sponsored,
                    link.ugc,
                    link.status_code,
                ])?;
            }

            let mut stmt = tx.prepare_cached(
                "INSERT INTO hreflangs (pagereport_id, crawl_id, lang, url) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for hreflang in &page.hreflangs {
                stmt.execute(params![page_id, crawl_id, hreflang.lang, hreflang.url])?;
            }

            let mut stmt = tx.prepare_cached(
                "INSERT INTO images (pagereport_id, crawl_id, url, alt) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for image in &page.images {
                stmt.execute(params![page_id, crawl_id, image.url, image.alt])?;
            }

            let mut stmt = tx.prepare_cached(
                "INSERT INTO resources (pagereport_id, crawl_id, kind, url) VALUES (?1, ?2, ?3, ?4)",
            )?;
            let resources = [
                ("script", &page.scripts),
                ("style", &page.styles),
                ("iframe", &page.iframes),
                ("audio", &page.audios),
                ("video", &page.videos),
            ];
            for (kind, urls) in resources {
                for url in urls {
                    stmt.execute(params![page_id, crawl_id, kind, url])?;
                }
            }
        }
        tx.commit()?;

        Ok(PageReport {
            id: page_id,
            ..page.clone()
        })
    }

    fn find_page_report(&self, crawl_id: i64, url: &str) -> StorageResult<Option<PageReport>> {
        let sql = format!(
            "SELECT {} FROM pagereports WHERE crawl_id = ?1 AND url = ?2 ORDER BY id LIMIT 1",
            PAGE_COLUMNS
        );
        let page = self
            .conn
            .query_row(&sql, params![crawl_id, url], page_from_row)
            .optional()?;

        match page {
            Some(mut page) => {
                self.load_children(&mut page)?;
                Ok(Some(page))
            }
            None => Ok(None),
        }
    }

    fn count_page_reports(&self, crawl_id: i64) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pagereports WHERE crawl_id = ?1",
            params![crawl_id],
            |row| row.get(0),
        )?;
        Ok(uint(count))
    }

    fn select_page_ids(
        &self,
        sql: &str,
        crawl_id: i64,
        after: i64,
        limit: usize,
    ) -> StorageResult<Vec<i64>> {
        let paged = format!(
            "WITH rule(page_id) AS ({})
             SELECT DISTINCT page_id FROM rule WHERE page_id > ?2 ORDER BY page_id LIMIT ?3",
            sql
        );
        let mut stmt = self.conn.prepare(&paged)?;
        let ids = stmt
            .query_map(params![crawl_id, after, limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    // ===== Issues =====

    fn save_issues(&mut self, issues: &[IssueRecord]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO issues (pagereport_id, crawl_id, issue_type_id) VALUES (?1, ?2, ?3)",
            )?;
            for issue in issues {
                stmt.execute(params![issue.page_id, issue.crawl_id, issue.kind.id()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn count_issues_by_priority(&self, crawl_id: i64, priority: Priority) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM issues
             JOIN issue_types ON issue_types.id = issues.issue_type_id
             WHERE issues.crawl_id = ?1 AND issue_types.priority = ?2",
            params![crawl_id, priority.to_db_value()],
            |row| row.get(0),
        )?;
        Ok(uint(count))
    }

    fn count_issues_by_kind(&self, crawl_id: i64) -> StorageResult<Vec<(IssueKind, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT issue_type_id, COUNT(*) AS count FROM issues
             WHERE crawl_id = ?1
             GROUP BY issue_type_id
             ORDER BY count DESC, issue_type_id",
        )?;
        let rows = stmt.query_map(params![crawl_id], |row| {
            Ok((row.get::<_, u16>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (id, count) = row?;
            let kind = IssueKind::from_id(id)
                .ok_or_else(|| StorageError::InvalidValue(format!("issue type {}", id)))?;
            counts.push((kind, uint(count)));
        }
        Ok(counts)
    }

    fn get_issues(&self, crawl_id: i64) -> StorageResult<Vec<IssueRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT pagereport_id, issue_type_id FROM issues WHERE crawl_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![crawl_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, u16>(1)?))
        })?;

        let mut issues = Vec::new();
        for row in rows {
            let (page_id, id) = row?;
            let kind = IssueKind::from_id(id)
                .ok_or_else(|| StorageError::InvalidValue(format!("issue type {}", id)))?;
            issues.push(IssueRecord {
                page_id,
                crawl_id,
                kind,
            });
        }
        Ok(issues)
    }
}
