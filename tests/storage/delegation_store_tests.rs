//! DelegationStore interface tests.
//!
//! These tests verify the contract of the DelegationStore trait.
//! Every function expects an empty store.

use chrono::{DateTime, TimeZone, Utc};
use xtz_delegations::storage::{DelegationStore, NewDelegation, Watermark};

fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

fn delegation(tzkt_id: i64, timestamp: DateTime<Utc>, level: i64) -> NewDelegation {
    NewDelegation {
        tzkt_id,
        timestamp,
        amount: tzkt_id * 1_000,
        delegator: format!("tz1contract{}", tzkt_id),
        level,
    }
}

// =============================================================================
// DelegationStore::watermark tests
// =============================================================================

pub async fn test_empty_watermark<S: DelegationStore>(store: &S) {
    let watermark = store.watermark().await.expect("watermark should succeed");
    assert_eq!(watermark, Watermark::empty(), "empty store has the sentinel watermark");
    assert!(watermark.is_empty());
}

pub async fn test_watermark_is_max_timestamp<S: DelegationStore>(store: &S) {
    let t1 = at(2019, 1, 1, 0);
    let t2 = at(2019, 6, 1, 0);
    let t3 = at(2020, 3, 1, 0);

    // Written out of order on purpose.
    store
        .bulk_write(&[delegation(2, t3, 300), delegation(1, t1, 100)])
        .await
        .expect("bulk_write should succeed");
    store
        .bulk_write(&[delegation(3, t2, 200)])
        .await
        .expect("bulk_write should succeed");

    let watermark = store.watermark().await.unwrap();
    assert_eq!(watermark.timestamp, t3);
    assert_eq!(watermark.level, 300);
}

// =============================================================================
// DelegationStore::bulk_write tests
// =============================================================================

pub async fn test_bulk_write_is_idempotent<S: DelegationStore>(store: &S) {
    let batch = vec![
        delegation(10, at(2019, 2, 1, 0), 10),
        delegation(11, at(2019, 2, 2, 0), 11),
    ];

    store.bulk_write(&batch).await.expect("first write");
    store.bulk_write(&batch).await.expect("replayed write");

    let rows = store.page(None, 50, 0).await.unwrap();
    assert_eq!(rows.len(), 2, "replayed batch must not duplicate rows");
}

pub async fn test_bulk_write_skips_known_ids_in_mixed_batch<S: DelegationStore>(store: &S) {
    store
        .bulk_write(&[delegation(20, at(2019, 3, 1, 0), 20)])
        .await
        .unwrap();

    let mut changed = delegation(20, at(2019, 3, 1, 0), 20);
    changed.delegator = "tz1somebodyelse".to_string();
    store
        .bulk_write(&[changed, delegation(21, at(2019, 3, 2, 0), 21)])
        .await
        .expect("mixed batch should succeed");

    let rows = store.page(None, 50, 0).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(
        rows.iter().any(|r| r.delegator == "tz1contract20"),
        "existing row must be left untouched"
    );
}

pub async fn test_empty_batch_is_noop<S: DelegationStore>(store: &S) {
    store.bulk_write(&[]).await.expect("empty batch should succeed");

    assert!(store.page(None, 50, 0).await.unwrap().is_empty());
    assert!(store.watermark().await.unwrap().is_empty());
}

pub async fn test_preserves_fields<S: DelegationStore>(store: &S) {
    let written = NewDelegation {
        tzkt_id: 42,
        timestamp: Utc.with_ymd_and_hms(2021, 11, 5, 7, 8, 9).unwrap(),
        amount: 9_007_199_254_740_993,
        delegator: "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb".to_string(),
        level: 1_876_543,
    };
    store.bulk_write(std::slice::from_ref(&written)).await.unwrap();

    let rows = store.page(None, 50, 0).await.unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.timestamp, written.timestamp);
    assert_eq!(row.amount, written.amount);
    assert_eq!(row.delegator, written.delegator);
    assert_eq!(row.level, written.level);
}

// =============================================================================
// DelegationStore::page tests
// =============================================================================

pub async fn test_page_newest_first_with_id_tiebreak<S: DelegationStore>(store: &S) {
    let same_block = at(2020, 5, 5, 5);

    store
        .bulk_write(&[
            delegation(30, at(2020, 1, 1, 0), 30),
            delegation(31, same_block, 31),
            delegation(32, same_block, 31),
        ])
        .await
        .unwrap();

    let rows = store.page(None, 50, 0).await.unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].timestamp, same_block);
    assert_eq!(rows[1].timestamp, same_block);
    assert!(ids[0] > ids[1], "equal timestamps are ordered by id descending");
    assert_eq!(rows[2].delegator, "tz1contract30");
}

pub async fn test_page_year_filter<S: DelegationStore>(store: &S) {
    store
        .bulk_write(&[
            delegation(40, at(2018, 12, 31, 23), 40),
            delegation(41, at(2019, 1, 1, 0), 41),
            delegation(42, at(2019, 12, 31, 23), 42),
            delegation(43, at(2020, 1, 1, 0), 43),
        ])
        .await
        .unwrap();

    let y2018 = store.page(Some(2018), 50, 0).await.unwrap();
    let y2019 = store.page(Some(2019), 50, 0).await.unwrap();
    let y2020 = store.page(Some(2020), 50, 0).await.unwrap();
    let y2021 = store.page(Some(2021), 50, 0).await.unwrap();

    assert_eq!(y2018.len(), 1);
    assert_eq!(y2019.len(), 2);
    assert_eq!(y2019[0].delegator, "tz1contract42");
    assert_eq!(y2019[1].delegator, "tz1contract41");
    assert_eq!(y2020.len(), 1);
    assert!(y2021.is_empty());
}

pub async fn test_page_limit_and_offset<S: DelegationStore>(store: &S) {
    let rows: Vec<NewDelegation> = (1..=7)
        .map(|i| delegation(100 + i, at(2021, 1, i as u32, 0), i))
        .collect();
    store.bulk_write(&rows).await.unwrap();

    let first = store.page(None, 3, 0).await.unwrap();
    let second = store.page(None, 3, 3).await.unwrap();
    let last = store.page(None, 3, 6).await.unwrap();
    let beyond = store.page(None, 3, 9).await.unwrap();

    let levels = |page: &[xtz_delegations::storage::Delegation]| -> Vec<i64> {
        page.iter().map(|r| r.level).collect()
    };
    assert_eq!(levels(&first), vec![7, 6, 5]);
    assert_eq!(levels(&second), vec![4, 3, 2]);
    assert_eq!(levels(&last), vec![1]);
    assert!(beyond.is_empty());
}

pub async fn test_ping<S: DelegationStore>(store: &S) {
    store.ping().await.expect("ping should succeed");
    assert!(store.open_connections() >= 1);
}

/// Run all DelegationStore interface tests.
///
/// `$store` is evaluated once per test, so it must produce a fresh, empty
/// store each time.
#[macro_export]
macro_rules! run_delegation_store_tests {
    ($store:expr) => {
        use $crate::storage::delegation_store_tests::*;

        test_empty_watermark(&$store).await;
        println!("  test_empty_watermark: PASSED");

        test_watermark_is_max_timestamp(&$store).await;
        println!("  test_watermark_is_max_timestamp: PASSED");

        test_bulk_write_is_idempotent(&$store).await;
        println!("  test_bulk_write_is_idempotent: PASSED");

        test_bulk_write_skips_known_ids_in_mixed_batch(&$store).await;
        println!("  test_bulk_write_skips_known_ids_in_mixed_batch: PASSED");

        test_empty_batch_is_noop(&$store).await;
        println!("  test_empty_batch_is_noop: PASSED");

        test_preserves_fields(&$store).await;
        println!("  test_preserves_fields: PASSED");

        test_page_newest_first_with_id_tiebreak(&$store).await;
        println!("  test_page_newest_first_with_id_tiebreak: PASSED");

        test_page_year_filter(&$store).await;
        println!("  test_page_year_filter: PASSED");

        test_page_limit_and_offset(&$store).await;
        println!("  test_page_limit_and_offset: PASSED");

        test_ping(&$store).await;
        println!("  test_ping: PASSED");
    };
}
