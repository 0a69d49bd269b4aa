//! End-to-end scenarios for the three stages.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use repo_harvester::config::HttpConfig;
use repo_harvester::github::GitHubSearchClient;
use repo_harvester::harvest::{
    CorpusAssembler, ExtensionFilter, FixedInterval, ManualClock, QueryHarvester,
    RepositoryFetcher, ResultSet,
};
use repo_harvester::{CloneError, RepoCloner, RepoId, SearchResultRecord, COMPLETION_MARKER};
use serde_json::json;
use walkdir::WalkDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn items(count: usize, offset: usize) -> Vec<serde_json::Value> {
    (0..count)
        .map(|i| {
            json!({
                "id": offset + i,
                "name": format!("repo-{}", offset + i),
                "full_name": format!("owner/repo-{}", offset + i),
                "owner": { "login": "owner" },
                "stargazers_count": 1000 - (offset + i),
                "license": { "key": "mit", "spdx_id": "MIT", "name": "MIT License" }
            })
        })
        .collect()
}

fn record(owner: &str, name: &str, stars: u64) -> SearchResultRecord {
    serde_json::from_value(json!({
        "name": name,
        "owner": { "login": owner },
        "stargazers_count": stars
    }))
    .unwrap()
}

fn limiter(clock: &Arc<ManualClock>, secs: u64) -> Arc<FixedInterval> {
    Arc::new(FixedInterval::new(Duration::from_secs(secs), clock.clone()))
}

// ============================================================================
// Query Harvester
// ============================================================================

async fn mount_two_pages(server: &MockServer) {
    let next = format!(
        "<{}/search/repositories?q=topic%3Aq&page=2>; rel=\"next\", <{}/search/repositories?q=topic%3Aq&page=2>; rel=\"last\"",
        server.uri(),
        server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", next.as_str())
                .insert_header("x-ratelimit-remaining", "29")
                .set_body_json(json!({ "total_count": 137, "items": items(100, 0) })),
        )
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "total_count": 137, "items": items(37, 100) })),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_harvest_two_pages_returns_all_records() {
    let server = MockServer::start().await;
    mount_two_pages(&server).await;

    let client = GitHubSearchClient::new(
        format!("{}/search/repositories", server.uri()),
        &HttpConfig::default(),
    )
    .unwrap();
    let clock = Arc::new(ManualClock::new());
    let harvester = QueryHarvester::new(client, limiter(&clock, 5));

    let outcome = harvester
        .harvest("topic:q topic:kdb", "license:mit license:apache-2.0")
        .await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.records.len(), 137);
    assert_eq!(outcome.pages, 2);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let pages: Vec<String> = requests
        .iter()
        .map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "page")
                .map(|(_, v)| v.into_owned())
                .unwrap()
        })
        .collect();
    assert_eq!(pages, vec!["1", "2"]);

    let first = &requests[0];
    let param = |name: &str| {
        first
            .url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };
    assert_eq!(
        param("q").as_deref(),
        Some("topic:q topic:kdb license:mit license:apache-2.0")
    );
    assert_eq!(param("sort").as_deref(), Some("stars"));
    assert_eq!(param("order").as_deref(), Some("desc"));
    assert_eq!(param("per_page").as_deref(), Some("100"));
}

#[tokio::test]
async fn test_harvest_stops_on_error_status_and_keeps_first_page() {
    let server = MockServer::start().await;
    let next = format!(
        "<{}/search/repositories?page=2>; rel=\"next\"",
        server.uri()
    );

    Mock::given(method("GET"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", next.as_str())
                .set_body_json(json!({ "items": items(100, 0) })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(403).set_body_string("API rate limit exceeded"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = GitHubSearchClient::new(
        format!("{}/search/repositories", server.uri()),
        &HttpConfig::default(),
    )
    .unwrap();
    let clock = Arc::new(ManualClock::new());
    let harvester = QueryHarvester::new(client, limiter(&clock, 5));

    let (outcome, saved) = harvester
        .harvest_and_save(dir.path(), "partial", "topic:q", "")
        .await
        .unwrap();

    assert!(!outcome.is_complete());
    assert_eq!(outcome.records.len(), 100);
    assert_eq!(ResultSet::load(&saved).unwrap().len(), 100);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_harvest_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(wiremock::matchers::header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": items(1, 0) })))
        .expect(1)
        .mount(&server)
        .await;

    let config = HttpConfig {
        token: Some("secret".to_string()),
        ..HttpConfig::default()
    };
    let client = GitHubSearchClient::new(server.uri(), &config).unwrap();
    let clock = Arc::new(ManualClock::new());
    let outcome = QueryHarvester::new(client, limiter(&clock, 5))
        .harvest("topic:q", "")
        .await;

    assert_eq!(outcome.records.len(), 1);
}

// ============================================================================
// Repository Fetcher
// ============================================================================

#[derive(Default)]
struct RecordingCloner {
    calls: Mutex<Vec<(String, std::path::PathBuf)>>,
}

#[async_trait]
impl RepoCloner for RecordingCloner {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), CloneError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), dest.to_path_buf()));
        std::fs::create_dir_all(dest)?;
        Ok(())
    }
}

#[tokio::test]
async fn test_fetch_skips_existing_clone() {
    let repos = tempfile::tempdir().unwrap();
    let existing = RepoId::new("beta", "two").unwrap().local_path(repos.path());
    std::fs::create_dir_all(&existing).unwrap();
    std::fs::write(existing.join(COMPLETION_MARKER), b"").unwrap();

    let results = ResultSet::new(vec![
        record("alpha", "one", 30),
        record("beta", "two", 20),
        record("gamma", "three", 10),
    ]);

    let clock = Arc::new(ManualClock::new());
    let fetcher =
        RepositoryFetcher::new(RecordingCloner::default(), repos.path(), limiter(&clock, 150));

    let report = fetcher.fetch_all(&results, None).await;

    assert_eq!(report.cloned, 2);
    assert_eq!(report.skipped, 1);
    let urls: Vec<String> = fetcher
        .cloner()
        .calls
        .lock()
        .unwrap()
        .iter()
        .map(|(url, _)| url.clone())
        .collect();
    assert_eq!(
        urls,
        vec![
            "https://github.com/alpha/one.git",
            "https://github.com/gamma/three.git"
        ]
    );
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(150); 2]);
}

#[tokio::test]
async fn test_fetch_twice_is_idempotent() {
    let repos = tempfile::tempdir().unwrap();
    let results = ResultSet::new(vec![record("a", "x", 2), record("b", "y", 1)]);

    let clock = Arc::new(ManualClock::new());
    let fetcher =
        RepositoryFetcher::new(RecordingCloner::default(), repos.path(), limiter(&clock, 150));

    let first = fetcher.fetch_all(&results, None).await;
    let second = fetcher.fetch_all(&results, None).await;

    assert_eq!(first.cloned, 2);
    assert_eq!(second.cloned, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(fetcher.cloner().calls.lock().unwrap().len(), 2);
    assert_eq!(clock.sleeps().len(), 2);

    // Clone destinations follow the (owner, name) layout
    let calls = fetcher.cloner().calls.lock().unwrap().clone();
    assert_eq!(calls[0].1, repos.path().join("a").join("x"));
    assert_eq!(calls[1].1, repos.path().join("b").join("y"));
}

// ============================================================================
// Corpus Assembler
// ============================================================================

#[test]
fn test_assembler_copies_only_visible_allow_listed_files() {
    let repos = tempfile::tempdir().unwrap();
    let corpus = tempfile::tempdir().unwrap();
    let clone = repos.path().join("o").join("a");
    for (file, body) in [
        (".git/config", "[core]"),
        ("readme.md", "# a"),
        ("src/.hidden/x.q", "hidden"),
        ("src/main.q", "1+1"),
    ] {
        let path = clone.join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    let assembler = CorpusAssembler::new(
        repos.path(),
        corpus.path(),
        ExtensionFilter::new([".q", ".md"]),
    );
    let report = assembler
        .assemble(&ResultSet::new(vec![record("o", "a", 7)]))
        .unwrap();

    let mut copied: Vec<String> = WalkDir::new(corpus.path())
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(corpus.path())
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    copied.sort();

    assert_eq!(copied, vec!["o/a/readme.md", "o/a/src/main.q"]);
    assert_eq!(report.files_copied, 2);
    assert_eq!(report.repositories, 1);
    assert_eq!(
        std::fs::read_to_string(corpus.path().join("o/a/src/main.q")).unwrap(),
        "1+1"
    );
}
