use sqlx::SqlitePool;

use super::*;
use crate::test_support::{items, pending, settings, stored_items, ScriptedFetcher, Step};

fn categories(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_owned()).collect()
}

#[sqlx::test(migrations = "../../migrations")]
async fn collects_every_page_then_saves_once(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new()
        .page("bebidas", 1, items("bebidas", 0..10), 25)
        .page("bebidas", 2, items("bebidas", 10..20), 25)
        .page("bebidas", 3, items("bebidas", 20..25), 25)
        .page("limpeza", 1, items("limpeza", 0..4), 4)
        .page("jardinagem", 1, Vec::new(), 0);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());

    let summary = harvester
        .collect_listing(
            &categories(&["bebidas", "limpeza", "jardinagem"]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.categories, 3);
    assert_eq!(summary.pages, 4);
    assert_eq!(summary.items_seen, 29);
    assert_eq!(summary.items_inserted, 29);
    assert_eq!(stored_items(&pool).await, 29);
}

#[sqlx::test(migrations = "../../migrations")]
async fn listing_failure_records_one_record_and_saves_nothing(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new()
        .page("bebidas", 1, items("bebidas", 0..10), 30)
        .fails("bebidas", 2, Step::NotFound)
        .page("bebidas", 3, items("bebidas", 20..30), 30);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());

    let result = harvester
        .collect_listing(&categories(&["bebidas"]), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(HarvestError::Fetch(_))), "got {result:?}");
    assert_eq!(stored_items(&pool).await, 0);

    let failures = pending(&pool, FailureKind::ListingFailed).await;
    assert_eq!(failures.len(), 1);
    assert_eq!(
        RetryToken::decode(&failures[0].retry_token).unwrap(),
        RetryToken::listing_page("bebidas", 2)
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn cancelled_listing_saves_nothing(pool: SqlitePool) {
    let fetcher = ScriptedFetcher::new().page("bebidas", 1, items("bebidas", 0..10), 10);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = harvester
        .collect_listing(&categories(&["bebidas"]), &cancel)
        .await;

    assert!(matches!(result, Err(HarvestError::Cancelled)));
    assert_eq!(stored_items(&pool).await, 0);
    assert!(pending(&pool, FailureKind::ListingFailed).await.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn failed_save_records_every_listed_page(pool: SqlitePool) {
    sqlx::query(
        "CREATE TRIGGER items_read_only BEFORE INSERT ON items \
         BEGIN SELECT RAISE(ABORT, 'items are read-only'); END",
    )
    .execute(&pool)
    .await
    .unwrap();

    let fetcher = ScriptedFetcher::new()
        .page("bebidas", 1, items("bebidas", 0..10), 20)
        .page("bebidas", 2, items("bebidas", 10..20), 20)
        .page("limpeza", 1, items("limpeza", 0..4), 4)
        .page("jardinagem", 1, Vec::new(), 0);
    let harvester = Harvester::new(fetcher, pool.clone(), settings());

    let result = harvester
        .collect_listing(
            &categories(&["bebidas", "limpeza", "jardinagem"]),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(HarvestError::Db(_))), "got {result:?}");
    assert_eq!(stored_items(&pool).await, 0);
    assert!(pending(&pool, FailureKind::ListingFailed).await.is_empty());

    let mut tokens: Vec<RetryToken> = pending(&pool, FailureKind::SavingFailed)
        .await
        .iter()
        .map(|row| RetryToken::decode(&row.retry_token).unwrap())
        .collect();
    tokens.sort_by_key(ToString::to_string);
    assert_eq!(
        tokens,
        vec![
            RetryToken::listing_page("bebidas", 1),
            RetryToken::listing_page("bebidas", 2),
            RetryToken::listing_page("limpeza", 1),
        ]
    );
}
