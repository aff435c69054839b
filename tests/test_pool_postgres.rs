#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use portfolio_store::postgres::config::STARTUP_TIMEOUT;
use portfolio_store::postgres::{AfterConnect, PoolConfig, PoolSettings};
use portfolio_store::prelude::*;
use portfolio_store::test_utils::postgres::start_embedded_postgres;
use tokio_postgres::Client;
use tokio_postgres::error::SqlState;

#[derive(Default)]
struct CountingHook {
    calls: AtomicUsize,
}

#[async_trait]
impl AfterConnect for CountingHook {
    async fn after_connect(&self, _client: &Client) -> Result<(), tokio_postgres::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn open_leaves_one_verified_idle_connection() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pg = start_embedded_postgres("pool_open", "public").await?;
    let store = PgStore::open(&pg.credentials).await?;

    let status = store.state();
    assert_eq!(status.connections, 1);
    assert_eq!(status.idle_connections, status.connections);
    assert_eq!(store.settings().max_connections, 10);
    assert_eq!(store.settings().max_lifetime, Duration::from_secs(3600));
    assert_eq!(store.settings().max_idle_time, Duration::from_secs(1800));
    assert_eq!(store.settings().health_check_period, Duration::from_secs(60));

    store.close().await;
    assert_eq!(store.state(), PoolStatus::default());
    let err = store
        .query(&Context::background(), "SELECT 1", &[])
        .await
        .expect_err("closed store must refuse work");
    assert!(matches!(err, StoreError::PoolClosed));

    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn hook_runs_once_per_physical_connection() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pg = start_embedded_postgres("pool_hook", "public").await?;
    let hook = Arc::new(CountingHook::default());
    let settings = PoolSettings::default().with_after_connect(hook.clone());
    let config = PoolConfig::from_url(&pg.credentials.connection_url())?.with_settings(settings);
    let store = PgStore::open_with_config(config, STARTUP_TIMEOUT).await?;

    let ctx = Context::background();
    for _ in 0..20 {
        let row = store.query_row(&ctx, "SELECT 1::int8 AS one", &[]).await?;
        assert_eq!(row.get("one").and_then(RowValues::as_int), Some(1));
    }

    let status = store.state();
    assert_eq!(hook.calls.load(Ordering::SeqCst), status.connections as usize);
    assert_eq!(status.connections, 1);

    store.close().await;
    pg.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn saturated_pool_bounds_the_next_caller_by_its_deadline()
-> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pg = start_embedded_postgres("pool_saturated", "public").await?;
    let store = PgStore::open(&pg.credentials).await?;
    let ctx = Context::background();

    let mut held = Vec::new();
    for _ in 0..10 {
        held.push(store.begin(&ctx).await?);
    }
    assert_eq!(store.state().connections, 10);
    assert_eq!(store.state().idle_connections, 0);

    let short = ctx.with_timeout(Duration::from_millis(300));
    let err = store
        .query(&short, "SELECT 1", &[])
        .await
        .expect_err("no connection can be handed out");
    assert!(err.is_cancellation(), "got {err:?}");

    for tx in held {
        tx.rollback(&ctx).await?;
    }
    store.query(&ctx, "SELECT 1", &[]).await?;

    store.close().await;
    pg.stop().await;
    Ok(())
}

async fn active_count(store: &PgStore, sql: &str) -> Result<i64, StoreError> {
    let row = store
        .query_row(
            &Context::background(),
            "SELECT count(*) AS n FROM pg_stat_activity WHERE query = $1 AND state = 'active'",
            &[RowValues::from(sql)],
        )
        .await?;
    Ok(row.get("n").and_then(RowValues::as_int).unwrap_or(-1))
}

async fn wait_for_active_count(store: &PgStore, sql: &str, want: i64) -> Result<i64, StoreError> {
    let mut seen = active_count(store, sql).await?;
    for _ in 0..20 {
        if seen == want {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        seen = active_count(store, sql).await?;
    }
    Ok(seen)
}

#[tokio::test]
async fn cancelled_statement_stops_on_the_server() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pg = start_embedded_postgres("pool_cancel", "public").await?;
    let store = PgStore::open(&pg.credentials).await?;
    let sleeper = "SELECT pg_sleep(5)";

    let ctx = Context::background().with_cancel();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let started = std::time::Instant::now();
    let err = store
        .execute(&ctx, sleeper, &[])
        .await
        .expect_err("cancelled before the sleep finishes");
    assert!(matches!(err, StoreError::Cancelled), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(3));

    assert_eq!(wait_for_active_count(&store, sleeper, 0).await?, 0);

    // The connection is usable again right away.
    let quick = Context::background().with_timeout(Duration::from_secs(2));
    store.query(&quick, "SELECT 1", &[]).await?;

    store.close().await;
    pg.stop().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocked_caller_proceeds_once_a_connection_frees()
-> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pg = start_embedded_postgres("pool_waiter", "public").await?;
    let store = PgStore::open(&pg.credentials).await?;
    let ctx = Context::background();

    let mut held = Vec::new();
    for _ in 0..10 {
        held.push(store.begin(&ctx).await?);
    }

    let waiter_store = store.clone();
    let waiter = tokio::spawn(async move {
        let ctx = Context::background().with_timeout(Duration::from_secs(10));
        waiter_store.query_row(&ctx, "SELECT 1::int8 AS one", &[]).await
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!waiter.is_finished(), "waiter must block while the pool is saturated");

    let freed = held.pop().expect("ten transactions held");
    freed.rollback(&ctx).await?;

    let row = waiter.await??;
    assert_eq!(row.get("one").and_then(RowValues::as_int), Some(1));

    for tx in held {
        tx.rollback(&ctx).await?;
    }
    store.close().await;
    pg.stop().await;
    Ok(())
}

/// Leaves every new connection inside an aborted transaction, so the startup ping fails.
struct AbortedTransactionHook;

#[async_trait]
impl AfterConnect for AbortedTransactionHook {
    async fn after_connect(&self, client: &Client) -> Result<(), tokio_postgres::Error> {
        let _ = client.simple_query("BEGIN; SELECT 1/0").await;
        Ok(())
    }
}

#[tokio::test]
async fn failed_startup_ping_closes_the_connection() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pg = start_embedded_postgres("pool_ping", "public").await?;
    let settings = PoolSettings::default().with_after_connect(Arc::new(AbortedTransactionHook));
    let config = PoolConfig::from_url(&pg.credentials.connection_url())?.with_settings(settings);

    let err = PgStore::open_with_config(config, STARTUP_TIMEOUT)
        .await
        .expect_err("ping inside an aborted transaction fails");
    assert!(matches!(err, StoreError::ConnectionError(_)), "got {err:?}");

    let observer = PgStore::open(&pg.credentials).await?;
    let ctx = Context::background();
    let others = "SELECT count(*) AS n FROM pg_stat_activity
        WHERE datname = current_database() AND pid <> pg_backend_pid()
        AND backend_type = 'client backend'";
    let mut remaining = -1;
    for _ in 0..20 {
        let row = observer.query_row(&ctx, others, &[]).await?;
        remaining = row.get("n").and_then(RowValues::as_int).unwrap_or(-1);
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(remaining, 0, "the rejected connection must not linger");

    observer.close().await;
    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn begin_honours_a_cancelled_context() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pg = start_embedded_postgres("pool_begin_cancel", "public").await?;
    let store = PgStore::open(&pg.credentials).await?;

    let ctx = Context::background().with_cancel();
    ctx.cancel();
    let err = match store.begin(&ctx).await {
        Ok(_) => panic!("begin must not start under a cancelled context"),
        Err(err) => err,
    };
    assert!(matches!(err, StoreError::Cancelled), "got {err:?}");

    let status = store.state();
    assert_eq!(status.idle_connections, status.connections);

    let tx = store.begin(&Context::background()).await?;
    tx.commit(&Context::background()).await?;

    store.close().await;
    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn interrupted_statement_poisons_the_transaction()
-> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pg = start_embedded_postgres("pool_tx_interrupt", "public").await?;
    let store = PgStore::open(&pg.credentials).await?;
    let ctx = Context::background();

    store
        .execute(&ctx, "CREATE TABLE notes (id BIGSERIAL PRIMARY KEY, body TEXT NOT NULL)", &[])
        .await?;

    let mut tx = store.begin(&ctx).await?;
    tx.execute(&ctx, "INSERT INTO notes (body) VALUES ($1)", &[RowValues::from("lost")])
        .await?;
    let short = ctx.with_timeout(Duration::from_millis(200));
    let err = tx
        .execute(&short, "SELECT pg_sleep(5)", &[])
        .await
        .expect_err("deadline fires during the sleep");
    assert!(matches!(err, StoreError::DeadlineExceeded), "got {err:?}");

    let err = tx
        .commit(&ctx)
        .await
        .expect_err("an interrupted transaction cannot commit");
    assert!(matches!(err, StoreError::Cancelled), "got {err:?}");

    let row = store
        .query_row(&ctx, "SELECT count(*) AS n FROM notes", &[])
        .await?;
    assert_eq!(row.get("n").and_then(RowValues::as_int), Some(0));

    store.close().await;
    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn commit_failure_keeps_the_sqlstate() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pg = start_embedded_postgres("pool_tx_sqlstate", "public").await?;
    let store = PgStore::open(&pg.credentials).await?;
    let ctx = Context::background();

    store
        .execute(
            &ctx,
            "CREATE TABLE codes (code TEXT NOT NULL, UNIQUE (code) DEFERRABLE INITIALLY DEFERRED)",
            &[],
        )
        .await?;

    let mut tx = store.begin(&ctx).await?;
    for _ in 0..2 {
        tx.execute(&ctx, "INSERT INTO codes (code) VALUES ($1)", &[RowValues::from("a")])
            .await?;
    }
    let err = tx
        .commit(&ctx)
        .await
        .expect_err("deferred unique check fails at commit");
    match err.root() {
        StoreError::PostgresError(e) => {
            assert_eq!(e.code(), Some(&SqlState::UNIQUE_VIOLATION));
        }
        other => panic!("expected a postgres error, got {other:?}"),
    }

    // The connection went back clean.
    let row = store
        .query_row(&ctx, "SELECT count(*) AS n FROM codes", &[])
        .await?;
    assert_eq!(row.get("n").and_then(RowValues::as_int), Some(0));

    store.close().await;
    pg.stop().await;
    Ok(())
}

#[tokio::test]
async fn transaction_commit_and_rollback() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let pg = start_embedded_postgres("pool_tx", "public").await?;
    let store = PgStore::open(&pg.credentials).await?;
    let ctx = Context::background();

    store
        .execute(&ctx, "CREATE TABLE notes (id BIGSERIAL PRIMARY KEY, body TEXT NOT NULL)", &[])
        .await?;

    let mut tx = store.begin(&ctx).await?;
    let summary = tx
        .execute(&ctx, "INSERT INTO notes (body) VALUES ($1)", &[RowValues::from("kept")])
        .await?;
    assert_eq!(summary.rows_affected, 1);
    tx.commit(&ctx).await?;

    let mut tx = store.begin(&ctx).await?;
    tx.execute(&ctx, "INSERT INTO notes (body) VALUES ($1)", &[RowValues::from("discarded")])
        .await?;
    tx.rollback(&ctx).await?;

    let rs = store.query(&ctx, "SELECT body FROM notes ORDER BY id", &[]).await?;
    let bodies: Vec<_> = rs
        .results
        .iter()
        .filter_map(|row| row.get("body").and_then(RowValues::as_text).map(str::to_owned))
        .collect();
    assert_eq!(bodies, vec!["kept".to_string()]);

    store.close().await;
    pg.stop().await;
    Ok(())
}
