use super::*;
use crate::test_support::{items, pending, settings, stored_items, ScriptedFetcher, Step};

fn categories(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_owned()).collect()
}

// ---------------------------------------------------------------------------
// page_count
// ---------------------------------------------------------------------------

#[test]
fn page_count_rounds_up() {
    assert_eq!(page_count(237, 100), 3);
    assert_eq!(page_count(200, 100), 2);
    assert_eq!(page_count(1, 100), 1);
}

#[test]
fn page_count_is_never_zero() {
    assert_eq!(page_count(0, 100), 1);
    assert_eq!(page_count(5, 0), 5);
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn derives_remaining_pages_from_total_count(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new()
        .page("bebidas", 1, items("bebidas", 0..100), 237)
        .page("bebidas", 2, items("bebidas", 100..200), 237)
        .page("bebidas", 3, items("bebidas", 200..237), 237);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());

    let summary = harvester
        .run(&categories(&["bebidas"]), &CancellationToken::new())
        .await
        .unwrap();

    let mut fetched = harvester.fetcher.pages_fetched("bebidas");
    fetched.sort_unstable();
    assert_eq!(fetched, vec![1, 2, 3]);
    assert_eq!(summary.categories, 1);
    assert_eq!(summary.pages_attempted, 3);
    assert_eq!(summary.pages_failed, 0);
    assert_eq!(summary.items_inserted, 237);
    assert_eq!(stored_items(&pool).await, 237);
}

#[sqlx::test(migrations = "../../migrations")]
async fn isolated_page_failure_is_recorded_and_siblings_persist(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new()
        .page("bebidas", 1, items("bebidas", 0..100), 237)
        .fails("bebidas", 2, Step::NotFound)
        .page("bebidas", 3, items("bebidas", 200..237), 237);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());

    let summary = harvester
        .run(&categories(&["bebidas"]), &CancellationToken::new())
        .await
        .expect("a failed page does not fail the run");

    assert_eq!(summary.pages_failed, 1);
    assert_eq!(stored_items(&pool).await, 137);

    let failures = pending(&pool, FailureKind::ProductPageFailed).await;
    assert_eq!(failures.len(), 1);
    assert_eq!(
        RetryToken::decode(&failures[0].retry_token).unwrap(),
        RetryToken::listing_page("bebidas", 2)
    );
    assert!(pending(&pool, FailureKind::CategoryPageFailed).await.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn unreadable_price_fails_only_that_page(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new()
        .page("mercearia", 1, items("mercearia", 0..10), 30)
        .fails("mercearia", 2, Step::BadPrice("Indisponível"))
        .page("mercearia", 3, items("mercearia", 20..30), 30);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());

    harvester
        .run(&categories(&["mercearia"]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stored_items(&pool).await, 20);
    let failures = pending(&pool, FailureKind::ProductPageFailed).await;
    assert_eq!(failures.len(), 1);
    assert!(
        failures[0].message.contains("no digits"),
        "unexpected message: {}",
        failures[0].message
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn empty_category_records_nothing(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new().page("jardinagem", 1, Vec::new(), 0);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());

    let summary = harvester
        .run(&categories(&["jardinagem"]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.categories_empty, 1);
    assert_eq!(harvester.fetcher.pages_fetched("jardinagem"), vec![1]);
    assert_eq!(stored_items(&pool).await, 0);
    for kind in FailureKind::ALL {
        assert!(pending(&pool, kind).await.is_empty(), "unexpected {kind} record");
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn first_page_failure_abandons_only_that_category(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new()
        .fails("bebidas", 1, Step::NotFound)
        .page("limpeza", 1, items("limpeza", 0..5), 5);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());

    let summary = harvester
        .run(&categories(&["bebidas", "limpeza"]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.categories, 2);
    assert_eq!(summary.categories_failed, 1);
    assert_eq!(harvester.fetcher.pages_fetched("bebidas"), vec![1]);
    assert_eq!(stored_items(&pool).await, 5);

    let failures = pending(&pool, FailureKind::CategoryPageFailed).await;
    assert_eq!(failures.len(), 1);
    assert_eq!(
        RetryToken::decode(&failures[0].retry_token).unwrap(),
        RetryToken::listing_page("bebidas", 1)
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn exhausted_total_count_polling_records_category_failure(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new().page("frios", 1, items("frios", 0..20), 0);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());

    let summary = harvester
        .run(&categories(&["frios"]), &CancellationToken::new())
        .await
        .unwrap();

    // One initial fetch plus two polls.
    assert_eq!(harvester.fetcher.pages_fetched("frios"), vec![1, 1, 1]);
    assert_eq!(summary.categories_failed, 1);
    assert_eq!(stored_items(&pool).await, 0);

    let failures = pending(&pool, FailureKind::CategoryPageFailed).await;
    assert_eq!(failures.len(), 1);
    assert!(failures[0].message.contains("still unavailable after 2 attempts"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn polling_picks_up_a_late_total_count(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new()
        .steps(
            "padaria",
            1,
            vec![
                Step::Page {
                    items: items("padaria", 0..2),
                    total: 0,
                },
                Step::Page {
                    items: items("padaria", 0..2),
                    total: 4,
                },
            ],
        )
        .page("padaria", 2, items("padaria", 2..4), 4);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());

    harvester
        .run(&categories(&["padaria"]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(harvester.fetcher.pages_fetched("padaria"), vec![1, 1, 2]);
    assert_eq!(stored_items(&pool).await, 4);
}

#[sqlx::test(migrations = "../../migrations")]
async fn page_count_is_clamped_to_the_ceiling(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new()
        .page("bebidas", 1, items("bebidas", 0..10), 1_000)
        .page("bebidas", 2, items("bebidas", 10..20), 1_000)
        .page("bebidas", 3, items("bebidas", 20..30), 1_000);
    let mut limited = settings();
    limited.max_pages_per_category = 3;
    let harvester = Harvester::new(fetcher, pool.clone(), limited);

    harvester
        .run(&categories(&["bebidas"]), &CancellationToken::new())
        .await
        .unwrap();

    let mut fetched = harvester.fetcher.pages_fetched("bebidas");
    fetched.sort_unstable();
    assert_eq!(fetched, vec![1, 2, 3]);
    assert_eq!(stored_items(&pool).await, 30);
}

#[sqlx::test(migrations = "../../migrations")]
async fn panicking_page_is_recorded_like_any_failure(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new()
        .page("bebidas", 1, items("bebidas", 0..10), 20)
        .fails("bebidas", 2, Step::Panic);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());

    let summary = harvester
        .run(&categories(&["bebidas"]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.pages_failed, 1);
    let failures = pending(&pool, FailureKind::ProductPageFailed).await;
    assert_eq!(failures.len(), 1);
    assert!(failures[0].message.starts_with("worker panicked: scripted panic"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn rerunning_the_same_catalog_inserts_nothing_new(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new()
        .page("bebidas", 1, items("bebidas", 0..50), 80)
        .page("bebidas", 2, items("bebidas", 50..80), 80);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());
    let cancel = CancellationToken::new();

    let first = harvester.run(&categories(&["bebidas"]), &cancel).await.unwrap();
    let second = harvester.run(&categories(&["bebidas"]), &cancel).await.unwrap();

    assert_eq!(first.items_inserted, 80);
    assert_eq!(second.items_seen, 80);
    assert_eq!(second.items_inserted, 0);
    assert_eq!(stored_items(&pool).await, 80);
}

// ---------------------------------------------------------------------------
// cancellation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn cancelled_run_dispatches_nothing(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new().page("bebidas", 1, items("bebidas", 0..10), 10);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = harvester
        .run(&categories(&["bebidas", "limpeza"]), &cancel)
        .await;

    assert!(matches!(result, Err(HarvestError::Cancelled)));
    assert_eq!(harvester.fetcher.call_count(), 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn cancellation_interrupts_hung_pages_without_recording_them(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new()
        .page("bebidas", 1, items("bebidas", 0..100), 300)
        .fails("bebidas", 2, Step::Hang)
        .fails("bebidas", 3, Step::Hang);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        harvester.run(&categories(&["bebidas"]), &cancel),
    )
    .await
    .expect("run should return promptly after cancellation");

    assert!(matches!(result, Err(HarvestError::Cancelled)));
    assert_eq!(stored_items(&pool).await, 100, "page 1 stays persisted");
    assert!(pending(&pool, FailureKind::ProductPageFailed).await.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn interrupted_pages_count_as_skipped_not_attempted(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new()
        .page("bebidas", 1, items("bebidas", 0..100), 400)
        .page("bebidas", 2, items("bebidas", 100..200), 400)
        .fails("bebidas", 3, Step::Hang)
        .fails("bebidas", 4, Step::Hang);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        harvester.harvest_category("bebidas".to_owned(), &cancel),
    )
    .await
    .expect("category should return promptly after cancellation");

    assert_eq!(summary.pages_attempted, 2, "page 1 and page 2 only");
    assert_eq!(summary.pages_failed, 0);
    assert_eq!(summary.units_skipped, 2);
    assert_eq!(summary.items_inserted, 200);
}
