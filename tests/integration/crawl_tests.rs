//! End-to-end crawls through `HttpFetcher`

use std::sync::{Arc, Mutex};
use sumi_audit::config::{Config, CrawlerConfig, OutputConfig, ProjectConfig, UserAgentConfig};
use sumi_audit::crawler::run_crawl;
use sumi_audit::progress::{crawl_topic, Broker, ProgressMessage};
use sumi_audit::storage::{open_storage, shared, SharedStorage, SqliteStorage, Storage};
use sumi_audit::{CrawlPhase, IssueKind, Project};
use tempfile::TempDir;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_config(url: &str, db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            workers: 2,
            crawl_delay: 0,
            request_timeout: 5,
            max_urls: 100,
            batch_size: 10,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestAudit".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
        project: ProjectConfig {
            url: url.to_string(),
            ignore_robots_txt: false,
            follow_nofollow: false,
            include_noindex: false,
            crawl_sitemap: true,
            allow_subdomains: false,
            check_external_links: false,
        },
    }
}

fn html(title: &str, body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(format!(
            "<!DOCTYPE html><html lang=\"en\"><head><title>{}</title></head><body>{}</body></html>",
            title, body
        ))
}

/// Site with a robots-blocked section and a sitemap listing one unlinked page
async fn mock_site() -> MockServer {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "User-agent: *\nDisallow: /private\n\nSitemap: {}/sitemap.xml\n",
            base
        )))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/xml")
                .set_body_string(format!(
                    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
                     <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\
                     <url><loc>{0}/</loc></url>\
                     <url><loc>{0}/listed</loc></url>\
                     </urlset>",
                    base
                )),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            "Home",
            r#"<a href="/about">About</a> <a href="/private/report">Report</a> <a href="/about#team">Team</a>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(html("About", r#"<a href="/">Home</a> <a href="/missing">Old</a>"#))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/listed"))
        .respond_with(html("Listed", "<p>Only in the sitemap</p>"))
        .mount(&server)
        .await;

    server
}

async fn crawl(config: &Config, storage: &SharedStorage<SqliteStorage>) -> sumi_audit::CrawlRun {
    let (_stop, stop_rx) = watch::channel(false);
    run_crawl(config, storage.clone(), Arc::new(Broker::new()), stop_rx)
        .await
        .expect("crawl failed")
}

#[tokio::test]
async fn test_full_crawl_with_robots_and_sitemap() {
    let server = mock_site().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("audit.db");
    let seed = format!("{}/", server.uri());
    let config = create_test_config(&seed, db_path.to_str().unwrap());
    let storage = shared(open_storage(&db_path).unwrap());

    let crawl = crawl(&config, &storage).await;

    assert_eq!(crawl.phase, CrawlPhase::Done);
    assert!(crawl.is_final());
    assert!(crawl.robots_txt_exists);
    assert!(crawl.sitemap_exists);
    assert!(!crawl.sitemap_is_blocked);
    // /, /about, /missing, /listed and the blocked /private/report
    assert_eq!(crawl.total_urls, 5);
    assert_eq!(crawl.blocked_by_robots, 1);

    let guard = storage.lock().unwrap();
    assert_eq!(guard.count_page_reports(crawl.id).unwrap(), 5);

    let home = guard.find_page_report(crawl.id, &seed).unwrap().unwrap();
    assert_eq!(home.depth, 0);
    assert!(home.in_sitemap);
    assert_eq!(home.status_code, 200);

    let blocked = guard
        .find_page_report(crawl.id, &format!("{}/private/report", server.uri()))
        .unwrap()
        .unwrap();
    assert!(blocked.blocked_by_robots);
    assert!(!blocked.crawlable);
    assert_eq!(blocked.depth, 1);

    let listed = guard
        .find_page_report(crawl.id, &format!("{}/listed", server.uri()))
        .unwrap()
        .unwrap();
    assert!(listed.in_sitemap);

    let missing = guard
        .find_page_report(crawl.id, &format!("{}/missing", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(missing.status_code, 404);
    assert_eq!(missing.depth, 2);

    let issues = guard.get_issues(crawl.id).unwrap();
    let has = |kind: IssueKind, page_id: i64| {
        issues
            .iter()
            .any(|i| i.kind == kind && i.page_id == page_id)
    };
    assert!(has(IssueKind::BlockedByRobots, blocked.id));
    assert!(has(IssueKind::Error40x, missing.id));
    assert!(has(IssueKind::Orphan, listed.id));
    assert!(!has(IssueKind::Orphan, home.id));
    assert_eq!(
        crawl.total_issues,
        crawl.critical_issues + crawl.alert_issues + crawl.warning_issues
    );
    assert_eq!(crawl.total_issues, issues.len() as u64);
}

#[tokio::test]
async fn test_progress_messages() {
    let server = mock_site().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("audit.db");
    let config = create_test_config(&format!("{}/", server.uri()), db_path.to_str().unwrap());

    let mut storage = open_storage(&db_path).unwrap();
    let project = storage
        .upsert_project(&Project::from_config(&config.project))
        .unwrap();
    let storage = shared(storage);

    let broker = Arc::new(Broker::new());
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    broker.subscribe(&crawl_topic(project.id), move |m| {
        sink.lock().unwrap().push(m.clone());
        Ok(())
    });

    let (_stop, stop_rx) = watch::channel(false);
    let crawl = run_crawl(&config, storage, broker, stop_rx).await.unwrap();

    let messages = messages.lock().unwrap();
    let pages = messages
        .iter()
        .filter(|m| matches!(m, ProgressMessage::PageReport(_)))
        .count();
    assert_eq!(pages as u64, crawl.total_urls);
    let init = messages
        .iter()
        .position(|m| *m == ProgressMessage::IssuesInit)
        .unwrap();
    assert!(messages[..init]
        .iter()
        .all(|m| matches!(m, ProgressMessage::PageReport(_))));
    assert_eq!(
        messages.last(),
        Some(&ProgressMessage::CrawlEnd(crawl.total_urls))
    );
}

#[tokio::test]
async fn test_only_latest_crawl_is_retained() {
    let server = mock_site().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("audit.db");
    let config = create_test_config(&format!("{}/", server.uri()), db_path.to_str().unwrap());
    let storage = shared(open_storage(&db_path).unwrap());

    let first = crawl(&config, &storage).await;
    let second = crawl(&config, &storage).await;

    assert_ne!(first.id, second.id);
    let guard = storage.lock().unwrap();
    assert_eq!(guard.count_page_reports(first.id).unwrap(), 0);
    assert!(guard.get_issues(first.id).unwrap().is_empty());
    assert_eq!(
        guard.count_page_reports(second.id).unwrap(),
        second.total_urls
    );
    assert_eq!(guard.get_crawl(first.id).unwrap().phase, CrawlPhase::Done);
}

#[tokio::test]
async fn test_ignore_robots_and_sitemap_off() {
    let server = mock_site().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("audit.db");
    let mut config = create_test_config(&format!("{}/", server.uri()), db_path.to_str().unwrap());
    config.project.ignore_robots_txt = true;
    config.project.crawl_sitemap = false;
    let storage = shared(open_storage(&db_path).unwrap());

    let crawl = crawl(&config, &storage).await;

    assert_eq!(crawl.blocked_by_robots, 0);
    assert!(crawl.sitemap_exists);
    // /listed is no longer submitted, /private/report is fetched (404)
    assert_eq!(crawl.total_urls, 4);
    let guard = storage.lock().unwrap();
    let report = guard
        .find_page_report(crawl.id, &format!("{}/private/report", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(report.status_code, 404);
    assert!(!report.blocked_by_robots);
}

#[tokio::test]
async fn test_stop_before_start() {
    let server = mock_site().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("audit.db");
    let config = create_test_config(&format!("{}/", server.uri()), db_path.to_str().unwrap());
    let storage = shared(open_storage(&db_path).unwrap());

    let (_stop, stop_rx) = watch::channel(true);
    let crawl = run_crawl(&config, storage.clone(), Arc::new(Broker::new()), stop_rx)
        .await
        .unwrap();

    assert_eq!(crawl.phase, CrawlPhase::Stopped);
    assert!(crawl.end.is_some());
    assert!(crawl.issues_end.is_none());
}

#[tokio::test]
async fn test_slow_pages_keep_the_crawl_alive() {
    let server = MockServer::start().await;
    let delay = std::time::Duration::from_millis(300);

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("Home", r#"<a href="/a">A</a>"#).set_delay(delay))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html("A", r#"<a href="/b">B</a>"#).set_delay(delay))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("B", "<p>Leaf</p>"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("audit.db");
    let config = create_test_config(&format!("{}/", server.uri()), db_path.to_str().unwrap());
    let storage = shared(open_storage(&db_path).unwrap());

    let crawl = crawl(&config, &storage).await;

    assert_eq!(crawl.phase, CrawlPhase::Done);
    assert_eq!(crawl.total_urls, 3);
    let guard = storage.lock().unwrap();
    let leaf = guard
        .find_page_report(crawl.id, &format!("{}/b", server.uri()))
        .unwrap()
        .unwrap();
    assert_eq!(leaf.status_code, 200);
    assert_eq!(leaf.depth, 2);
}
