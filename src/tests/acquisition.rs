use std::{sync::Arc, time::Duration};

use super::fakes::*;
use crate::{
    scrape::{failure::FetchFailure, CookieJar, ABOUT_PLACEHOLDER, UNSUPPORTED_CONTENT_PLACEHOLDER},
    search::{MatchKind, SearchEngine},
    storage::{ArchiveReader, StoreError},
};

const A: &str = "https://x.test/ok";
const B: &str = "https://x.test/404";
const C: &str = "https://x.test/ok2";

#[tokio::test]
async fn test_end_to_end_with_one_missing_page() {
    let dir = tempfile::tempdir().unwrap();
    let store = writer(&dir);

    let transport = ScriptedTransport::new()
        .script(A, vec![ok("<p>A</p>")])
        .script(B, vec![status(404)])
        .script(C, vec![ok("<p>C</p>")]);
    let rig = Rig::new(transport, store.clone());

    let mut bmarks = bookmarks(&[A, B, C]);
    let summary = rig.run(&mut bmarks).await.unwrap();

    assert_settled(&bmarks);
    assert_eq!(summary.archived, 2);
    assert_eq!(summary.erroneous, 1);

    let a_id = bmarks[0].content_id.unwrap();
    let c_id = bmarks[2].content_id.unwrap();
    assert_eq!(store.load_contents(a_id).unwrap(), "rendered: <p>A</p>");
    assert_eq!(store.load_contents(c_id).unwrap(), "rendered: <p>C</p>");

    assert!(bmarks[1].is_erroneous());
    assert_eq!(bmarks[1].content_id, None);

    // not found is permanent: one attempt, one entry
    assert_eq!(rig.transport.calls(B), 1);
    assert_eq!(errors_for(&summary, B), 1);
    assert_eq!(errors_for(&summary, A), 0);
    assert_eq!(errors_for(&summary, C), 0);
    assert!(summary.errors[0].fatal);

    store.save_bookmarks(&bmarks).unwrap();
    store.commit().unwrap();

    let reader = ArchiveReader::open(store.path()).unwrap();
    assert_eq!(reader.bookmarks().len(), 3);

    let engine = SearchEngine::new(reader.bookmarks(), |id| reader.load_contents(id));
    let results = engine.search("<p>C").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].url, C);
    assert_eq!(results[0].match_kind, MatchKind::Content);

    let results = engine.search("err:").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].url, B);
}

#[tokio::test]
async fn test_succeeds_on_third_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let url = "https://flaky.test/";

    let transport = ScriptedTransport::new().script(
        url,
        vec![
            Err(FetchFailure::Transport("connection reset".into())),
            status(503),
            ok("finally"),
        ],
    );
    let rig = Rig::new(transport, writer(&dir));

    let mut bmarks = bookmarks(&[url]);
    let summary = rig.run(&mut bmarks).await.unwrap();

    assert_settled(&bmarks);
    assert!(bmarks[0].content_id.is_some());
    assert!(!bmarks[0].is_erroneous());
    assert_eq!(rig.transport.calls(url), 3);

    assert_eq!(errors_for(&summary, url), 2);
    assert!(summary.errors.iter().all(|e| !e.fatal));
}

#[tokio::test]
async fn test_gives_up_after_retry_budget() {
    let dir = tempfile::tempdir().unwrap();
    let url = "https://down.test/";

    let transport = ScriptedTransport::new().script(url, vec![status(500)]);
    let rig = Rig::new(transport, writer(&dir));

    let mut bmarks = bookmarks(&[url]);
    let summary = rig.run(&mut bmarks).await.unwrap();

    assert_settled(&bmarks);
    assert!(bmarks[0].is_erroneous());
    assert_eq!(rig.transport.calls(url), 3);

    let attempts: Vec<_> = summary.errors.iter().map(|e| (e.attempt, e.fatal)).collect();
    assert_eq!(
        attempts,
        vec![
            (Some((1, 3)), false),
            (Some((2, 3)), false),
            (Some((3, 3)), true),
        ]
    );
}

#[tokio::test]
async fn test_follows_relative_redirect() {
    let dir = tempfile::tempdir().unwrap();
    let store = writer(&dir);
    let old = "https://x.test/old";
    let new = "https://x.test/new";

    let transport = ScriptedTransport::new()
        .script(old, vec![redirect(301, Some("/new"))])
        .script(new, vec![ok("moved here")]);
    let rig = Rig::new(transport, store.clone());

    let mut bmarks = bookmarks(&[old]);
    let summary = rig.run(&mut bmarks).await.unwrap();

    assert!(summary.errors.is_empty());
    assert_eq!(rig.transport.calls(new), 1);
    assert_eq!(bmarks[0].url, old);

    let id = bmarks[0].content_id.unwrap();
    assert_eq!(store.load_contents(id).unwrap(), "rendered: moved here");
}

#[tokio::test]
async fn test_redirect_without_location_spends_an_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let url = "https://x.test/nowhere";

    let transport = ScriptedTransport::new().script(url, vec![redirect(302, None), ok("ok")]);
    let rig = Rig::new(transport, writer(&dir));

    let mut bmarks = bookmarks(&[url]);
    let summary = rig.run(&mut bmarks).await.unwrap();

    assert!(bmarks[0].content_id.is_some());
    assert_eq!(errors_for(&summary, url), 1);
    assert!(summary.errors[0].reason.contains("absent location"));
}

#[tokio::test]
async fn test_endless_redirects_exhaust_the_budget() {
    let dir = tempfile::tempdir().unwrap();
    let url = "https://x.test/loop";

    let transport = ScriptedTransport::new().script(url, vec![redirect(302, Some(url))]);
    let rig = Rig::new(transport, writer(&dir));

    let mut bmarks = bookmarks(&[url]);
    let summary = rig.run(&mut bmarks).await.unwrap();

    assert_settled(&bmarks);
    assert!(bmarks[0].is_erroneous());
    assert_eq!(rig.transport.calls(url), 3);
    assert_eq!(errors_for(&summary, url), 1);
    assert!(summary.errors[0].fatal);
}

#[tokio::test]
async fn test_secure_channel_failure_escalates_to_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let store = writer(&dir);
    let url = "https://tls.test/";

    let transport = ScriptedTransport::new().script(
        url,
        vec![Err(FetchFailure::SecureChannel("handshake failure".into()))],
    );
    let rig = Rig::new(transport, store.clone()).with_fallback(&[]);

    let mut bmarks = bookmarks(&[url]);
    let summary = rig.run(&mut bmarks).await.unwrap();

    assert_eq!(rig.transport.calls(url), 1);
    assert_eq!(rig.fallback_calls(), 1);
    assert_eq!(errors_for(&summary, url), 1);

    // fallback output is stored as is, without the renderer
    let id = bmarks[0].content_id.unwrap();
    assert_eq!(store.load_contents(id).unwrap(), "fallback: https://tls.test/");
}

#[tokio::test]
async fn test_connect_failure_does_not_escalate() {
    let dir = tempfile::tempdir().unwrap();
    let url = "https://refused.test/";

    let transport = ScriptedTransport::new().script(
        url,
        vec![Err(FetchFailure::Connect("connection refused".into())), ok("up again")],
    );
    let rig = Rig::new(transport, writer(&dir)).with_fallback(&[]);

    let mut bmarks = bookmarks(&[url]);
    rig.run(&mut bmarks).await.unwrap();

    assert!(bmarks[0].content_id.is_some());
    assert_eq!(rig.transport.calls(url), 2);
    assert_eq!(rig.fallback_calls(), 0);
}

#[tokio::test]
async fn test_exceptional_urls_skip_http() {
    let dir = tempfile::tempdir().unwrap();
    let hostile = "https://hostile.test/page";
    let normal = "https://x.test/ok";

    let transport = ScriptedTransport::new().script(normal, vec![ok("plain")]);
    let rig = Rig::new(transport, writer(&dir)).with_fallback(&["https://hostile.test/"]);

    let mut bmarks = bookmarks(&[hostile, normal]);
    rig.run(&mut bmarks).await.unwrap();

    assert_settled(&bmarks);
    assert_eq!(rig.transport.calls(hostile), 0);
    assert_eq!(rig.transport.calls(normal), 1);
    assert_eq!(rig.fallback_calls(), 1);
}

#[tokio::test]
async fn test_wildcard_always_falls_back() {
    let dir = tempfile::tempdir().unwrap();

    let rig = Rig::new(ScriptedTransport::new(), writer(&dir)).with_fallback(&["*"]);

    let mut bmarks = bookmarks(&["https://a.test", "https://b.test"]);
    rig.run(&mut bmarks).await.unwrap();

    assert!(bmarks.iter().all(|b| b.content_id.is_some()));
    assert_eq!(rig.transport.total_calls(), 0);
    assert_eq!(rig.fallback_calls(), 2);
}

#[tokio::test]
async fn test_unsupported_content_type_stores_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let store = writer(&dir);
    let url = "https://x.test/paper.pdf";

    let transport = ScriptedTransport::new().script(url, vec![typed("application/pdf")]);
    let rig = Rig::new(transport, store.clone());

    let mut bmarks = bookmarks(&[url]);
    let summary = rig.run(&mut bmarks).await.unwrap();

    assert_settled(&bmarks);
    assert!(summary.errors.is_empty());
    assert_eq!(rig.transport.calls(url), 1);

    let id = bmarks[0].content_id.unwrap();
    assert_eq!(store.load_contents(id).unwrap(), UNSUPPORTED_CONTENT_PLACEHOLDER);
}

#[tokio::test]
async fn test_about_urls_are_not_fetched() {
    let dir = tempfile::tempdir().unwrap();
    let store = writer(&dir);

    let rig = Rig::new(ScriptedTransport::new(), store.clone());

    let mut bmarks = bookmarks(&["about:config"]);
    rig.run(&mut bmarks).await.unwrap();

    assert_eq!(rig.transport.total_calls(), 0);
    let id = bmarks[0].content_id.unwrap();
    assert_eq!(store.load_contents(id).unwrap(), ABOUT_PLACEHOLDER);
}

#[tokio::test]
async fn test_protocol_relative_url_is_fetched_over_https() {
    let dir = tempfile::tempdir().unwrap();

    let transport = ScriptedTransport::new().script("https://x.test/rel", vec![ok("rel")]);
    let rig = Rig::new(transport, writer(&dir));

    let mut bmarks = bookmarks(&["//x.test/rel"]);
    rig.run(&mut bmarks).await.unwrap();

    assert!(bmarks[0].content_id.is_some());
    assert_eq!(rig.transport.calls("https://x.test/rel"), 1);
}

#[tokio::test]
async fn test_renderer_failure_marks_erroneous() {
    let dir = tempfile::tempdir().unwrap();
    let url = "https://x.test/ok";

    let transport = ScriptedTransport::new().script(url, vec![ok("<p>fine</p>")]);
    let rig = Rig::new(transport, writer(&dir)).with_renderer(Arc::new(FailingRenderer));

    let mut bmarks = bookmarks(&[url]);
    let summary = rig.run(&mut bmarks).await.unwrap();

    assert_settled(&bmarks);
    assert!(bmarks[0].is_erroneous());
    // rendering is not retried
    assert_eq!(rig.transport.calls(url), 1);
    assert_eq!(errors_for(&summary, url), 1);
    assert!(summary.errors[0].fatal);
    assert!(summary.errors[0].reason.starts_with("render failed"));
}

#[tokio::test]
async fn test_panicking_task_marks_erroneous() {
    let dir = tempfile::tempdir().unwrap();
    let url = "https://x.test/ok";

    let transport = ScriptedTransport::new().script(url, vec![ok("boom")]);
    let rig = Rig::new(transport, writer(&dir)).with_renderer(Arc::new(PanickingRenderer));

    let mut bmarks = bookmarks(&[url]);
    let summary = rig.run(&mut bmarks).await.unwrap();

    assert_settled(&bmarks);
    assert!(bmarks[0].is_erroneous());
    assert_eq!(summary.erroneous, 1);
    assert_eq!(errors_for(&summary, url), 1);
    assert!(summary.errors[0].fatal);
}

#[tokio::test]
async fn test_store_failure_aborts_the_run() {
    let transport = ScriptedTransport::new().script("https://x.test/ok", vec![ok("x")]);
    let rig = Rig::new(transport, Arc::new(FailingStore));

    let mut bmarks = bookmarks(&["https://x.test/ok"]);
    let result = rig.run(&mut bmarks).await;

    assert!(matches!(result, Err(StoreError::Poisoned)));
    assert!(rig.progress.is_finished());
}

#[tokio::test]
async fn test_cookies_are_sent_to_matching_urls() {
    let dir = tempfile::tempdir().unwrap();
    let news = "https://news.test/article";
    let other = "https://other.test/";

    let mut jar = CookieJar::default();
    jar.insert("https://news.test/", "sid=abc; consent=1");

    let transport = ScriptedTransport::new()
        .script(news, vec![ok("news")])
        .script(other, vec![ok("other")]);
    let rig = Rig::new(transport, writer(&dir)).with_cookies(jar);

    let mut bmarks = bookmarks(&[news, other]);
    rig.run(&mut bmarks).await.unwrap();

    assert_eq!(rig.transport.cookie_for(news).as_deref(), Some("sid=abc; consent=1"));
    assert_eq!(rig.transport.cookie_for(other), None);
}

#[tokio::test]
async fn test_throttle_bounds_concurrent_fetches() {
    let dir = tempfile::tempdir().unwrap();

    let urls: Vec<String> = (0..12).map(|i| format!("https://x.test/{i}")).collect();
    let mut transport = ScriptedTransport::new().delay(Duration::from_millis(20));
    for url in &urls {
        transport = transport.script(url, vec![ok("page")]);
    }
    let rig = Rig::new(transport, writer(&dir)).with_throttle(3);

    let refs: Vec<&str> = urls.iter().map(|u| u.as_str()).collect();
    let mut bmarks = bookmarks(&refs);
    let summary = rig.run(&mut bmarks).await.unwrap();

    assert_eq!(summary.archived, 12);
    assert!(rig.transport.max_in_flight() <= 3);
    assert!(rig.transport.max_in_flight() >= 2);
}

#[tokio::test]
async fn test_content_ids_are_unique_under_concurrency() {
    let dir = tempfile::tempdir().unwrap();

    let urls: Vec<String> = (0..20).map(|i| format!("https://x.test/{i}")).collect();
    let mut transport = ScriptedTransport::new();
    for url in &urls {
        transport = transport.script(url, vec![ok(url)]);
    }
    let rig = Rig::new(transport, writer(&dir)).with_throttle(8);

    let refs: Vec<&str> = urls.iter().map(|u| u.as_str()).collect();
    let mut bmarks = bookmarks(&refs);
    rig.run(&mut bmarks).await.unwrap();

    let mut ids: Vec<i64> = bmarks.iter().filter_map(|b| b.content_id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 20);
}
