//! Test suite for the lock table.
//!
//! Covers bounded acquisition, expiry-based self-healing, idempotent
//! release, and independence of distinct resources.

use std::time::{Duration, Instant};

use foreman::{ForemanError, LockTable};

#[tokio::test]
async fn acquire_and_release_round_trip() {
    let table = LockTable::new();

    let guard = table
        .acquire("test.txt", Duration::from_secs(1), None)
        .await
        .unwrap();
    assert!(table.is_locked("test.txt"));

    drop(guard);
    assert!(!table.is_locked("test.txt"));
}

#[tokio::test]
async fn second_acquire_times_out_while_held() {
    let table = LockTable::new();
    let _held = table
        .acquire("contended.txt", Duration::from_secs(1), None)
        .await
        .unwrap();

    let started = Instant::now();
    let err = table
        .acquire("contended.txt", Duration::from_millis(100), None)
        .await
        .unwrap_err();
    let waited = started.elapsed();

    match err {
        ForemanError::LockTimeout { key, timeout } => {
            assert!(key.ends_with("contended.txt"));
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("expected LockTimeout, got {other}"),
    }
    assert!(waited >= Duration::from_millis(100));
    assert!(waited < Duration::from_secs(1));
}

#[tokio::test]
async fn acquire_succeeds_after_release() {
    let table = LockTable::new();

    let first = table
        .acquire("handoff.txt", Duration::from_secs(1), None)
        .await
        .unwrap();
    drop(first);

    let second = table
        .acquire("handoff.txt", Duration::from_millis(200), None)
        .await;
    assert!(second.is_ok());
}

#[tokio::test]
async fn release_waker_unblocks_waiter_before_timeout() {
    let table = LockTable::new();
    let guard = table
        .acquire("waited.txt", Duration::from_secs(1), None)
        .await
        .unwrap();

    let contender = {
        let table = table.clone();
        tokio::spawn(async move {
            table
                .acquire("waited.txt", Duration::from_secs(2), None)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let started = Instant::now();
    drop(guard);

    let acquired = contender.await.unwrap();
    assert!(acquired.is_ok());
    // Far less than the 2s timeout: the release woke the waiter.
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn expired_lock_is_taken_over_without_full_wait() {
    let table = LockTable::new();

    // Held with a short lease and never released.
    let stale = table
        .acquire("leased.txt", Duration::from_millis(500), Some(Duration::from_millis(100)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let started = Instant::now();
    let fresh = table
        .acquire("leased.txt", Duration::from_secs(5), None)
        .await;
    assert!(fresh.is_ok());
    assert!(started.elapsed() < Duration::from_millis(500));

    // The stale guard dropping later must not release the new holder's lock.
    drop(stale);
    assert!(table.is_locked("leased.txt"));
}

#[tokio::test]
async fn expired_lock_reads_as_unlocked() {
    let table = LockTable::new();
    let _guard = table
        .acquire("fleeting.txt", Duration::from_millis(500), Some(Duration::from_millis(50)))
        .await
        .unwrap();

    assert!(table.is_locked("fleeting.txt"));
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!table.is_locked("fleeting.txt"));
}

#[tokio::test]
async fn double_release_is_a_no_op() {
    let table = LockTable::new();
    let guard = table
        .acquire("twice.txt", Duration::from_secs(1), None)
        .await
        .unwrap();

    table.release("twice.txt");
    table.release("twice.txt"); // warn-logged no-op, must not panic
    assert!(!table.is_locked("twice.txt"));
    drop(guard); // guard drop after explicit release is equally harmless
}

#[tokio::test]
async fn distinct_resources_never_block_each_other() {
    let table = LockTable::new();

    let first = {
        let table = table.clone();
        tokio::spawn(async move { table.acquire("f1.txt", Duration::from_millis(200), None).await })
    };
    let second = {
        let table = table.clone();
        tokio::spawn(async move { table.acquire("f2.txt", Duration::from_millis(200), None).await })
    };

    let (first, second) = tokio::join!(first, second);
    assert!(first.unwrap().is_ok());
    assert!(second.unwrap().is_ok());
}

#[tokio::test]
async fn contended_writers_all_eventually_acquire() {
    let table = LockTable::new();
    let mut handles = Vec::new();

    for _ in 0..3 {
        let table = table.clone();
        handles.push(tokio::spawn(async move {
            let guard = table
                .acquire("shared.txt", Duration::from_secs(2), None)
                .await?;
            tokio::time::sleep(Duration::from_millis(30)).await;
            drop(guard);
            Ok::<(), ForemanError>(())
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert!(!table.is_locked("shared.txt"));
}

#[tokio::test]
async fn normalized_keys_contend_for_the_same_lock() {
    let table = LockTable::new();
    let _guard = table
        .acquire("./same.txt", Duration::from_secs(1), None)
        .await
        .unwrap();

    assert!(table.is_locked("same.txt"));
    let err = table
        .acquire("same.txt", Duration::from_millis(50), None)
        .await;
    assert!(matches!(err, Err(ForemanError::LockTimeout { .. })));
}

#[tokio::test]
async fn cleanup_expired_sweeps_only_stale_records() {
    let table = LockTable::new();
    let _live = table
        .acquire("live.txt", Duration::from_secs(1), None)
        .await
        .unwrap();
    let _stale = table
        .acquire("stale.txt", Duration::from_secs(1), Some(Duration::from_millis(30)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(table.cleanup_expired(), 1);
    assert!(table.is_locked("live.txt"));
    assert!(!table.is_locked("stale.txt"));
}
