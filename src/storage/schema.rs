//! Database schema definitions
//!
//! Page-level tables are keyed by `crawl_id` so a whole crawl can be
//! discarded once a newer crawl of the same project has completed.

use crate::issues::IssueKind;
use rusqlite::{params, Connection};

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Audited sites and their crawl policies
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    ignore_robots_txt INTEGER NOT NULL DEFAULT 0,
    follow_nofollow INTEGER NOT NULL DEFAULT 0,
    include_noindex INTEGER NOT NULL DEFAULT 0,
    crawl_sitemap INTEGER NOT NULL DEFAULT 0,
    allow_subdomains INTEGER NOT NULL DEFAULT 0,
    check_external_links INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

-- One row per crawl execution, kept as history
CREATE TABLE IF NOT EXISTS crawls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id),
    phase TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    issues_ended_at TEXT,
    total_urls INTEGER NOT NULL DEFAULT 0,
    total_issues INTEGER NOT NULL DEFAULT 0,
    critical_issues INTEGER NOT NULL DEFAULT 0,
    alert_issues INTEGER NOT NULL DEFAULT 0,
    warning_issues INTEGER NOT NULL DEFAULT 0,
    blocked_by_robots INTEGER NOT NULL DEFAULT 0,
    noindex INTEGER NOT NULL DEFAULT 0,
    internal_follow_links INTEGER NOT NULL DEFAULT 0,
    internal_nofollow_links INTEGER NOT NULL DEFAULT 0,
    external_follow_links INTEGER NOT NULL DEFAULT 0,
    external_nofollow_links INTEGER NOT NULL DEFAULT 0,
    sponsored_links INTEGER NOT NULL DEFAULT 0,
    ugc_links INTEGER NOT NULL DEFAULT 0,
    robots_txt_exists INTEGER NOT NULL DEFAULT 0,
    sitemap_exists INTEGER NOT NULL DEFAULT 0,
    sitemap_is_blocked INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_crawls_project ON crawls(project_id);

-- One observation per URL per crawl
CREATE TABLE IF NOT EXISTS pagereports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    url TEXT NOT NULL,
    scheme TEXT NOT NULL DEFAULT '',
    redirect_url TEXT NOT NULL DEFAULT '',
    refresh TEXT NOT NULL DEFAULT '',
    status_code INTEGER NOT NULL DEFAULT 0,
    content_type TEXT NOT NULL DEFAULT '',
    media_type TEXT NOT NULL DEFAULT '',
    lang TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    robots TEXT NOT NULL DEFAULT '',
    noindex INTEGER NOT NULL DEFAULT 0,
    nofollow INTEGER NOT NULL DEFAULT 0,
    canonical TEXT NOT NULL DEFAULT '',
    h1 TEXT NOT NULL DEFAULT '',
    h2 TEXT NOT NULL DEFAULT '',
    words INTEGER NOT NULL DEFAULT 0,
    size INTEGER NOT NULL DEFAULT 0,
    body_hash TEXT NOT NULL DEFAULT '',
    ttfb_ms INTEGER NOT NULL DEFAULT 0,
    depth INTEGER NOT NULL DEFAULT 0,
    timeout INTEGER NOT NULL DEFAULT 0,
    blocked_by_robots INTEGER NOT NULL DEFAULT 0,
    crawlable INTEGER NOT NULL DEFAULT 0,
    in_sitemap INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_pagereports_crawl_url ON pagereports(crawl_id, url);
CREATE INDEX IF NOT EXISTS idx_pagereports_crawl_hash ON pagereports(crawl_id, body_hash);
CREATE INDEX IF NOT EXISTS idx_pagereports_crawl_title ON pagereports(crawl_id, title);

-- Anchors pointing inside the audited site
CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pagereport_id INTEGER NOT NULL REFERENCES pagereports(id),
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    url TEXT NOT NULL,
    text TEXT NOT NULL DEFAULT '',
    nofollow INTEGER NOT NULL DEFAULT 0,
    sponsored INTEGER NOT NULL DEFAULT 0,
    ugc INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_links_crawl_url ON links(crawl_id, url);
CREATE INDEX IF NOT EXISTS idx_links_page ON links(pagereport_id);

-- Anchors leaving the audited site
CREATE TABLE IF NOT EXISTS external_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pagereport_id INTEGER NOT NULL REFERENCES pagereports(id),
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    url TEXT NOT NULL,
    text TEXT NOT NULL DEFAULT '',
    nofollow INTEGER NOT NULL DEFAULT 0,
    sponsored INTEGER NOT NULL DEFAULT 0,
    ugc INTEGER NOT NULL DEFAULT 0,
    status_code INTEGER
);

CREATE INDEX IF NOT EXISTS idx_external_links_page ON external_links(pagereport_id);

CREATE TABLE IF NOT EXISTS hreflangs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pagereport_id INTEGER NOT NULL REFERENCES pagereports(id),
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    lang TEXT NOT NULL,
    url TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_hreflangs_page ON hreflangs(pagereport_id);
CREATE INDEX IF NOT EXISTS idx_hreflangs_crawl_url ON hreflangs(crawl_id, url);

CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pagereport_id INTEGER NOT NULL REFERENCES pagereports(id),
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    url TEXT NOT NULL,
    alt TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_images_page ON images(pagereport_id);

-- Scripts, stylesheets, iframes and media sources
CREATE TABLE IF NOT EXISTS resources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pagereport_id INTEGER NOT NULL REFERENCES pagereports(id),
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    kind TEXT NOT NULL,
    url TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_resources_page ON resources(pagereport_id);

-- Issue kind lookup, holds the priority of each kind
CREATE TABLE IF NOT EXISTS issue_types (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    priority INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS issues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pagereport_id INTEGER NOT NULL REFERENCES pagereports(id),
    crawl_id INTEGER NOT NULL REFERENCES crawls(id),
    issue_type_id INTEGER NOT NULL REFERENCES issue_types(id)
);

CREATE INDEX IF NOT EXISTS idx_issues_crawl ON issues(crawl_id);
CREATE INDEX IF NOT EXISTS idx_issues_page ON issues(pagereport_id);
"#;

/// Initializes the database schema and seeds the issue type lookup
///
/// Existing priorities are left untouched so they can be tuned in the
/// database; kinds added since the database was created are inserted.
pub fn initialize_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;

    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO issue_types (id, name, priority) VALUES (?1, ?2, ?3)")?;
    for kind in IssueKind::ALL {
        stmt.execute(params![
            kind.id(),
            kind.as_str(),
            kind.default_priority().to_db_value()
        ])?;
    }

    Ok(())
}
