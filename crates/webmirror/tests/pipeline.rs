//! End-to-end runs against a stub origin.

use std::path::{Path, PathBuf};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use webmirror::config::MirrorConfig;
use webmirror::pipeline::{RunOptions, RunOutcome, Stage, WebClientPipeline};
use webmirror::publish::{DirectoryPublisher, MirrorPublisher};
use webmirror::sanitize::SENTINEL;
use webmirror::{HttpFetcher, MirrorError};

// ─────────────────────── helpers ───────────────────────

const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

fn entry_document(uri: &str) -> String {
    format!(
        r#"<!DOCTYPE html><html><head>
<meta name="twitter-site-verification" content="per-session-token">
<script nonce="n0nce">window.__SCRIPTS_LOADED__ = {{}};</script>
<link rel="preload" as="script" href="{uri}/assets/client-web/main.a1b2c3d4.js">
</head><body><div id="react-root"></div></body></html>"#
    )
}

fn manifest(uri: &str) -> String {
    format!(
        "importScripts(\"{uri}/assets/client-serviceworker/core.12345678.js\");\
         self.ASSETS=['{uri}/assets/client-web/vendor~~react.core.0a0b0c0d.js','{uri}/assets/client-web/main.a1b2c3d4.js',];\
         self.__META={{sha:\"{SHA}\"}};"
    )
}

async fn mount(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn stub_origin() -> MockServer {
    let server = MockServer::start().await;
    let uri = server.uri();
    mount(&server, "/", entry_document(&uri)).await;
    mount(&server, "/sw.js", manifest(&uri)).await;
    mount(
        &server,
        "/assets/client-web/main.a1b2c3d4.js",
        "function main(){return render()}".into(),
    )
    .await;
    mount(
        &server,
        "/assets/client-web/vendor~~react.core.0a0b0c0d.js",
        "var React={createElement:function(){}}".into(),
    )
    .await;
    mount(
        &server,
        "/assets/client-serviceworker/core.12345678.js",
        "self.addEventListener('fetch',function(e){})".into(),
    )
    .await;
    server
}

fn config(server: &MockServer, work: &Path) -> MirrorConfig {
    let mut config = MirrorConfig::default();
    config.origin.root_url = server.uri();
    config.origin.request_timeout_secs = 5;
    config.assets.prefix = format!("{}/assets/", server.uri());
    config.staging.path = work.join("stage");
    config.publish.target_dir = work.join("out");
    config.acquisition.max_attempts = Some(5);
    config
}

fn pipeline(config: &MirrorConfig) -> WebClientPipeline<HttpFetcher> {
    let fetcher = HttpFetcher::new(&config.origin).unwrap();
    WebClientPipeline::new(config.clone(), fetcher).unwrap()
}

fn read(root: &Path, relative: &str) -> String {
    std::fs::read_to_string(root.join(relative))
        .unwrap_or_else(|e| panic!("{}: {e}", root.join(relative).display()))
}

// ─────────────────────── tests ───────────────────────

#[tokio::test]
async fn full_run_publishes_sanitized_mirror() {
    let server = stub_origin().await;
    let work = tempfile::tempdir().unwrap();
    let config = config(&server, work.path());
    let directory = DirectoryPublisher::new(&config.publish.target_dir);
    let publisher: &dyn MirrorPublisher = &directory;

    let report = pipeline(&config)
        .execute(Some(publisher), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(report.attempts, 1);
    assert_eq!(report.assets, 3);
    assert_eq!(report.release.as_deref(), Some(SHA));
    assert_eq!(report.label, "Web build: 0123456");
    assert_eq!(report.sanitize.nonce_count, 1);
    assert!(report.sanitize.verification_cleared);
    assert_eq!(report.outcome, RunOutcome::Published { revision: None });

    let out: PathBuf = config.publish.target_dir.clone();
    let index = read(&out, "index.html");
    assert!(index.contains(SENTINEL));
    assert!(!index.contains("n0nce"));
    assert!(!index.contains("per-session-token"));
    assert!(read(&out, "sw.js").contains("self.ASSETS = ["));
    assert_eq!(
        read(&out, "responsive-web/client-web/main.js"),
        "function main() {\n    return render()\n}\n"
    );
    assert!(out.join("responsive-web/client-web/vendor/react/core.js").is_file());
    assert!(out.join("responsive-web/client-serviceworker/core.js").is_file());

    assert!(!config.staging.path.exists(), "staging directory must be removed");
}

#[tokio::test]
async fn second_run_exits_early_unless_forced() {
    let server = stub_origin().await;
    let work = tempfile::tempdir().unwrap();
    let config = config(&server, work.path());
    let directory = DirectoryPublisher::new(&config.publish.target_dir);
    let publisher: &dyn MirrorPublisher = &directory;
    let pipeline = pipeline(&config);

    pipeline
        .execute(Some(publisher), &RunOptions::default())
        .await
        .unwrap();
    let asset_requests = |requests: &[wiremock::Request]| {
        requests
            .iter()
            .filter(|r| r.url.path().starts_with("/assets/"))
            .count()
    };
    let before = asset_requests(&server.received_requests().await.unwrap());

    let early = pipeline
        .execute(Some(publisher), &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(early.outcome, RunOutcome::CoreUnchanged);
    assert_eq!(early.assets, 0);
    assert_eq!(
        asset_requests(&server.received_requests().await.unwrap()),
        before,
        "no assets are fetched after an early exit"
    );

    let forced = pipeline
        .execute(Some(publisher), &RunOptions { force: true })
        .await
        .unwrap();
    assert_eq!(forced.assets, 3);
    assert_eq!(forced.outcome, RunOutcome::Unchanged);
    assert!(!config.staging.path.exists());
}

#[tokio::test]
async fn rolling_deploy_is_retried_until_stable() {
    let server = MockServer::start().await;
    // The first entry request sees the old release, every later one the new.
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>old</body></html>"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount(&server, "/", "<html><body>new</body></html>".into()).await;
    mount(&server, "/sw.js", "self.ASSETS=[];".into()).await;

    let work = tempfile::tempdir().unwrap();
    let config = config(&server, work.path());
    let report = pipeline(&config)
        .execute(None, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(report.assets, 0);
    assert_eq!(report.outcome, RunOutcome::NotPublished);
    assert_eq!(report.label, "Web build");

    let core_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| matches!(r.url.path(), "/" | "/sw.js"))
        .count();
    assert_eq!(core_requests, 8, "two samples of two documents per attempt");
}

#[tokio::test]
async fn manifest_without_asset_table_fails_in_resolve() {
    let server = MockServer::start().await;
    let uri = server.uri();
    mount(&server, "/", entry_document(&uri)).await;
    mount(&server, "/sw.js", "importScripts('x.js');".into()).await;

    let work = tempfile::tempdir().unwrap();
    let config = config(&server, work.path());
    let failure = pipeline(&config)
        .execute(None, &RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Resolve);
    assert!(matches!(failure.error, MirrorError::Manifest(_)));
    assert!(!config.staging.path.exists());
}

#[tokio::test]
async fn missing_asset_fails_the_download_stage() {
    let server = MockServer::start().await;
    let uri = server.uri();
    mount(&server, "/", entry_document(&uri)).await;
    mount(&server, "/sw.js", manifest(&uri)).await;

    let work = tempfile::tempdir().unwrap();
    let config = config(&server, work.path());
    let directory = DirectoryPublisher::new(&config.publish.target_dir);
    let publisher: &dyn MirrorPublisher = &directory;
    let failure = pipeline(&config)
        .execute(Some(publisher), &RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Download);
    assert!(matches!(failure.error, MirrorError::Fetch(ref e) if e.url.contains("/assets/")));
    assert!(!config.staging.path.exists());
    assert!(!config.publish.target_dir.join("index.html").exists());
}

#[tokio::test]
async fn origin_outage_fails_the_acquire_stage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let work = tempfile::tempdir().unwrap();
    let failure = pipeline(&config(&server, work.path()))
        .execute(None, &RunOptions::default())
        .await
        .unwrap_err();
    assert_eq!(failure.stage, Stage::Acquire);
    assert!(failure.to_string().contains("HTTP status 503"));
}
