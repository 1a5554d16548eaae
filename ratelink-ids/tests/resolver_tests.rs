//! Resolution facade tests over an in-memory database and a fixed registry

mod helpers;

use helpers::*;
use ratelink_common::{Competition, IdResolver};
use ratelink_ids::db::fetch_runs::FetchRunStatus;
use std::sync::Arc;

async fn match_row_count(pool: &sqlx::SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM match_results")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_resolve_mixed_batch_after_fetch() {
    let t = test_service(populated_source()).await;
    let outcome = t.service.fetcher().run_cycle().await.unwrap().unwrap();
    assert_eq!(outcome.status, FetchRunStatus::Completed);
    assert_eq!(outcome.lists_fetched, 3);

    let items = vec![
        item("000001", vec![app("Math", 1, 1, &[], Competition::Bvi)]),
        item(
            "000002",
            vec![
                app("Math", 1, 1, &[70, 80, 90], Competition::Regular),
                app("Physics", 2, 2, &[70, 80, 90], Competition::Regular),
            ],
        ),
        item("000003", vec![app("Physics", 1, 1, &[75], Competition::Regular)]),
        item("000004", vec![app("Chemistry", 1, 1, &[99], Competition::Regular)]),
        item("000005", vec![app("Math", 1, 1, &[90, 80, 70], Competition::DedicatedQuota)]),
    ];

    let results = t.service.resolve(&items).await;
    let ids: Vec<(&str, &str, f64)> = results
        .iter()
        .map(|r| (r.internal_id.as_str(), r.canonical_id.as_str(), r.confidence))
        .collect();

    assert_eq!(
        ids,
        vec![
            ("000001", "9001", 1.0),
            ("000002", "1001", 1.0),
            ("000003", "2001", 1.0),
            ("000004", "MSU-000004", 0.0),
            ("000005", "1001", 1.0),
        ]
    );
}

#[tokio::test]
async fn test_repeated_internal_id_gets_one_answer_per_occurrence() {
    let t = test_service(populated_source()).await;
    t.service.fetcher().run_cycle().await.unwrap();

    let items = vec![
        item("000002", vec![app("Physics", 2, 2, &[70, 80, 90], Competition::Regular)]),
        item("000002", vec![app("Math", 1, 1, &[70, 80, 90], Competition::Regular)]),
    ];

    let results = t.service.resolve(&items).await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0].canonical_id, "1001");
}

#[tokio::test]
async fn test_results_are_cached_until_next_fetch() {
    let t = test_service(populated_source()).await;
    t.service.fetcher().run_cycle().await.unwrap();

    let items = vec![
        item("000001", vec![app("Math", 1, 1, &[], Competition::Bvi)]),
        item("000004", vec![app("Chemistry", 1, 1, &[], Competition::Regular)]),
    ];
    let first = t.service.resolve(&items).await;
    assert_eq!(match_row_count(&t.pool).await, 2);

    let second = t.service.resolve(&items).await;
    assert_eq!(first, second);

    t.service.fetcher().run_cycle().await.unwrap();
    assert_eq!(match_row_count(&t.pool).await, 0);
}

#[tokio::test]
async fn test_no_roster_data_means_fallback_and_not_ready() {
    let t = test_service(failing_source()).await;
    let outcome = t.service.fetcher().run_cycle().await.unwrap().unwrap();
    assert_eq!(outcome.status, FetchRunStatus::Partial);
    assert_eq!(outcome.errors.len(), 3);

    let results = t
        .service
        .resolve(&[item("123456", vec![app("Math", 1, 1, &[90], Competition::Regular)])])
        .await;
    assert_eq!(results[0].canonical_id, "MSU-123456");
    assert_eq!(results[0].confidence, 0.0);

    // Fallbacks computed without rosters are not cached
    assert_eq!(match_row_count(&t.pool).await, 0);
    assert!(!t.service.is_ready().await);
    wait_for_finished_run(&t.service).await;
}

#[tokio::test]
async fn test_readiness_triggers_first_fetch() {
    let t = test_service(populated_source()).await;

    assert!(!t.service.is_ready().await);
    wait_for_finished_run(&t.service).await;

    assert!(t.service.is_ready().await);
    assert_eq!(t.source.calls("101"), 1);
}

#[tokio::test]
async fn test_service_is_an_id_resolver() {
    let t = test_service(populated_source()).await;
    t.service.fetcher().run_cycle().await.unwrap();

    let resolver: Arc<dyn IdResolver> = t.service.clone();
    let results = resolver
        .resolve_batch(vec![item("000003", vec![app("Physics", 1, 1, &[75], Competition::Regular)])])
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].canonical_id, "2001");
}

#[tokio::test]
async fn test_canonical_id_stays_unique_across_batches() {
    let t = test_service(populated_source()).await;
    t.service.fetcher().run_cycle().await.unwrap();

    let first = t
        .service
        .resolve(&[item("000010", vec![app("Physics", 1, 1, &[50], Competition::Regular)])])
        .await;
    assert_eq!(first[0].canonical_id, "2001");
    assert_eq!(first[0].confidence, 0.5);

    // Physics has a single registry row, already handed to 000010
    let second = t
        .service
        .resolve(&[item("000020", vec![app("Physics", 1, 1, &[50], Competition::Regular)])])
        .await;
    assert_eq!(second[0].canonical_id, "MSU-000020");
    assert_eq!(second[0].confidence, 0.0);

    // The earlier holder keeps its answer
    let again = t
        .service
        .resolve(&[item("000010", vec![app("Physics", 1, 1, &[50], Competition::Regular)])])
        .await;
    assert_eq!(again[0].canonical_id, "2001");
}

#[tokio::test]
async fn test_roster_refresh_waits_for_inflight_match_writes() {
    let t = test_service(populated_source()).await;
    let fetcher = t.service.fetcher().clone();
    fetcher.run_cycle().await.unwrap();

    t.service
        .resolve(&[item("000003", vec![app("Physics", 1, 1, &[75], Competition::Regular)])])
        .await;
    assert_eq!(match_row_count(&t.pool).await, 1);

    let gate = fetcher.match_gate().await;
    let refresh = tokio::spawn({
        let fetcher = fetcher.clone();
        async move { fetcher.run_cycle().await }
    });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!refresh.is_finished());
    assert_eq!(match_row_count(&t.pool).await, 1);

    drop(gate);
    let outcome = refresh.await.unwrap().unwrap();
    assert!(outcome.is_some());
    assert_eq!(match_row_count(&t.pool).await, 0);
}
