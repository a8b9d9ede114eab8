mod support;

use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fetch_core::InventorySet;
use fetch_engine::{
    DownloadEngine, DownloadOutcome, EngineEvent, ItemOutcome, NullProgressSink, ReqwestFetcher,
    RunContext, Stage,
};
use pretty_assertions::assert_eq;
use support::{asset, file_names, raw_server, test_settings, RawBody, TestSink};
use tempfile::TempDir;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine(dir: &TempDir, workers: usize) -> DownloadEngine {
    let settings = test_settings();
    let fetcher = Arc::new(ReqwestFetcher::new(settings.clone()).unwrap());
    DownloadEngine::new(fetcher, dir.path().to_path_buf(), settings, workers)
}

#[tokio::test]
async fn publishes_complete_download_and_records_it() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/maps/arena_x.bsp"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ctx = RunContext::new();
    let sink = TestSink::new();
    let item = asset(&format!("{}/maps/arena_x.bsp", server.uri()));

    engine(&dir, 2).run(vec![item], &ctx, &sink).await;

    let published = dir.path().join("arena_x.bsp");
    assert_eq!(fs::read(&published).unwrap(), vec![7u8; 4096]);
    assert_eq!(file_names(dir.path()), vec!["arena_x.bsp".to_string()]);
    assert!(ctx.inventory().contains("arena_x"));

    let result = ctx.snapshot();
    assert_eq!(result.downloaded, vec!["arena_x.bsp".to_string()]);
    assert!(result.failed.is_empty());

    let (transfers, events): (Vec<_>, Vec<_>) = sink.take().into_iter().partition(|event| {
        matches!(
            event,
            EngineEvent::TransferStarted { .. } | EngineEvent::TransferProgress { .. }
        )
    });
    assert_eq!(
        transfers.first(),
        Some(&EngineEvent::TransferStarted {
            name: "arena_x.bsp".to_string(),
            total: Some(4096),
        })
    );
    let streamed: u64 = transfers
        .iter()
        .map(|event| match event {
            EngineEvent::TransferProgress { bytes, .. } => *bytes,
            _ => 0,
        })
        .sum();
    assert_eq!(streamed, 4096);
    assert_eq!(
        events,
        vec![
            EngineEvent::StageStarted {
                stage: Stage::Downloading,
                total: 1
            },
            EngineEvent::ItemFinished {
                stage: Stage::Downloading,
                name: "arena_x.bsp".to_string(),
                outcome: ItemOutcome::Downloaded,
            },
        ]
    );
}

#[tokio::test]
async fn known_stems_are_skipped_without_any_request() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"never".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ctx = RunContext::with_inventory(InventorySet::from_stems(["arena_x"]));
    let items = vec![
        asset(&format!("{}/maps/arena_x.bsp", server.uri())),
        asset(&format!("{}/maps/ARENA_X.bsp.bz2", server.uri())),
    ];

    engine(&dir, 2).run(items, &ctx, &NullProgressSink).await;

    let result = ctx.snapshot();
    assert_eq!(result.skipped.len(), 2);
    assert!(result.downloaded.is_empty());
    assert!(file_names(dir.path()).is_empty());
}

#[tokio::test]
async fn second_reference_to_a_fetched_stem_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a/dm_duel.bsp.bz2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"compressed".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b/dm_duel.bsp"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"plain".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ctx = RunContext::new();
    let items = vec![
        asset(&format!("{}/a/dm_duel.bsp.bz2", server.uri())),
        asset(&format!("{}/b/dm_duel.bsp", server.uri())),
    ];

    engine(&dir, 2).run(items, &ctx, &NullProgressSink).await;

    let result = ctx.snapshot();
    assert_eq!(result.downloaded, vec!["dm_duel.bsp.bz2".to_string()]);
    assert_eq!(result.skipped, vec!["dm_duel.bsp".to_string()]);
}

#[tokio::test]
async fn same_stem_is_fetched_from_the_next_reference_when_the_first_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a/dm_duel.bsp.bz2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b/dm_duel.bsp"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"plain".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ctx = RunContext::new();
    let items = vec![
        asset(&format!("{}/a/dm_duel.bsp.bz2", server.uri())),
        asset(&format!("{}/b/dm_duel.bsp", server.uri())),
    ];

    engine(&dir, 2).run(items, &ctx, &NullProgressSink).await;

    let result = ctx.snapshot();
    assert_eq!(result.downloaded, vec!["dm_duel.bsp".to_string()]);
    assert!(result.skipped.is_empty());
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].name, "dm_duel.bsp.bz2");
    assert_eq!(fs::read(dir.path().join("dm_duel.bsp")).unwrap(), b"plain");
    assert!(ctx.inventory().contains("dm_duel"));
}

#[tokio::test]
async fn waiting_duplicate_is_abandoned_on_cancellation() {
    let server = raw_server(RawBody::Stalled {
        declared: 1000,
        sent: 100,
    })
    .await;
    let dir = TempDir::new().unwrap();
    let ctx = RunContext::new();
    let items = vec![
        asset(server.url("a/big.bsp.bz2").as_str()),
        asset(server.url("b/big.bsp").as_str()),
    ];
    let engine = engine(&dir, 2);

    let watcher = async {
        let deadline = Instant::now() + Duration::from_secs(5);
        while server.requests() == 0 {
            assert!(Instant::now() < deadline, "no request was made");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        ctx.cancel();
    };
    tokio::join!(engine.run(items, &ctx, &NullProgressSink), watcher);

    assert_eq!(server.requests(), 1);
    assert_eq!(ctx.snapshot(), fetch_core::RunResult::default());
    assert!(file_names(dir.path()).is_empty());
}

#[tokio::test]
async fn transient_failure_is_recovered_by_a_later_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/maps/flaky.bsp"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/maps/flaky.bsp"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ctx = RunContext::new();
    let item = asset(&format!("{}/maps/flaky.bsp", server.uri()));

    let outcome = engine(&dir, 1).download_one(&item, &ctx, &NullProgressSink).await;

    assert_eq!(outcome, DownloadOutcome::Published(dir.path().join("flaky.bsp")));
    assert_eq!(fs::read(dir.path().join("flaky.bsp")).unwrap(), b"payload");
}

#[tokio::test]
async fn http_errors_exhaust_exactly_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/maps/gone.bsp"))
        .respond_with(ResponseTemplate::new(404))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ctx = RunContext::new();
    let item = asset(&format!("{}/maps/gone.bsp", server.uri()));

    engine(&dir, 1).run(vec![item], &ctx, &NullProgressSink).await;

    let result = ctx.snapshot();
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].name, "gone.bsp");
    assert!(result.failed[0].reason.contains("404"), "{}", result.failed[0].reason);
    assert!(!ctx.inventory().contains("gone"));
}

#[tokio::test]
async fn truncated_body_fails_with_size_mismatch_after_three_attempts() {
    let server = raw_server(RawBody::Truncated {
        declared: 1000,
        sent: 900,
    })
    .await;
    let dir = TempDir::new().unwrap();
    let ctx = RunContext::new();
    let item = asset(server.url("maps/broken.bsp").as_str());

    engine(&dir, 1).run(vec![item], &ctx, &NullProgressSink).await;

    assert_eq!(server.requests(), 3);
    let result = ctx.snapshot();
    assert!(result.downloaded.is_empty());
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].name, "broken.bsp");
    assert!(
        result.failed[0].reason.contains("size mismatch"),
        "unexpected reason: {}",
        result.failed[0].reason
    );
    assert!(file_names(dir.path()).is_empty());
}

#[tokio::test]
async fn cancellation_abandons_in_flight_download_without_publishing() {
    let server = raw_server(RawBody::Stalled {
        declared: 1000,
        sent: 100,
    })
    .await;
    let dir = TempDir::new().unwrap();
    let ctx = RunContext::new();
    let item = asset(server.url("maps/big.bsp").as_str());
    let engine = engine(&dir, 1);
    let final_path = dir.path().join("big.bsp");

    let watcher = async {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let staged = file_names(dir.path())
                .iter()
                .any(|name| name.starts_with("big.bsp.") && name.ends_with(".part"));
            if staged {
                break;
            }
            assert!(Instant::now() < deadline, "staging file never appeared");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!final_path.exists());
        ctx.cancel();
    };
    tokio::join!(engine.run(vec![item], &ctx, &NullProgressSink), watcher);

    assert!(!final_path.exists());
    assert!(file_names(dir.path()).is_empty());
    let result = ctx.snapshot();
    assert!(result.downloaded.is_empty());
    assert!(result.failed.is_empty());
    assert!(!ctx.inventory().contains("big"));
}

#[tokio::test]
async fn nothing_starts_once_cancelled() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ctx = RunContext::new();
    ctx.cancel();
    let items = vec![
        asset(&format!("{}/maps/one.bsp", server.uri())),
        asset(&format!("{}/maps/two.bsp", server.uri())),
    ];

    engine(&dir, 2).run(items, &ctx, &NullProgressSink).await;

    assert_eq!(ctx.snapshot(), fetch_core::RunResult::default());
}
