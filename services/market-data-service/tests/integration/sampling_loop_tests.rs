//! Sampling cycles against scripted upstreams and a recording store

use anyhow::Result;
use market_data_service::{Backoff, CandleAggregator, SampleSource, SamplingLoop, ServiceMetrics};
use rstest::*;
use services_common::{CandleStore, QuoteClient, Timeframe};
use std::sync::Arc;
use std::time::Duration;
use test_utils::{
    QuoteStep, RecordingStore, ScriptedQuoteClient, flaky_client, init_test_logging, store,
    with_timeout,
};
use tokio::sync::{broadcast, watch};

const POLL: Duration = Duration::from_millis(500);

struct Harness {
    sampler: SamplingLoop,
    symbol_tx: watch::Sender<String>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    metrics: Arc<ServiceMetrics>,
}

fn harness(
    client: Arc<ScriptedQuoteClient>,
    store: Arc<RecordingStore>,
    timeframes: Vec<Timeframe>,
    fetch_timeout: Duration,
) -> Harness {
    init_test_logging();
    let metrics = Arc::new(ServiceMetrics::default());
    let (closed_tx, _) = broadcast::channel(16);
    let (symbol_tx, symbol_rx) = watch::channel("NIFTY".to_string());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let store: Arc<dyn CandleStore> = store;
    let aggregator = CandleAggregator::new(timeframes, Arc::clone(&store), closed_tx, Arc::clone(&metrics));
    let sampler = SamplingLoop::new(
        SampleSource::new(client as Arc<dyn QuoteClient>, fetch_timeout),
        store,
        aggregator,
        symbol_rx,
        POLL,
        Backoff::new(Duration::from_secs(1), Duration::from_secs(60)),
        Arc::clone(&metrics),
    );
    Harness {
        sampler,
        symbol_tx,
        shutdown_tx,
        shutdown_rx,
        metrics,
    }
}

async fn open(store: &Arc<RecordingStore>) -> Result<()> {
    store.init_pool().await
}

#[rstest]
#[tokio::test]
async fn test_failures_back_off_then_reset(
    flaky_client: Arc<ScriptedQuoteClient>,
    store: Arc<RecordingStore>,
) -> Result<()> {
    open(&store).await?;
    flaky_client.push([QuoteStep::Price(22_000.0), QuoteStep::fail("timeout")]);
    let mut h = harness(flaky_client, Arc::clone(&store), vec![Timeframe::M1], Duration::from_secs(5));

    let mut delays = Vec::new();
    for _ in 0..3 {
        delays.push(h.sampler.run_cycle(&mut h.shutdown_rx).await);
    }
    let expected: Vec<_> = [1, 2, 4].map(|s| Some(Duration::from_secs(s))).into();
    assert_eq!(delays, expected);
    assert_eq!(store.tick_count(), 0);
    assert_eq!(store.upsert_calls(), 0);
    assert_eq!(h.sampler.backoff().failures(), 3);

    assert_eq!(h.sampler.run_cycle(&mut h.shutdown_rx).await, Some(POLL));
    assert_eq!(h.sampler.backoff().failures(), 0);
    assert_eq!(store.tick_count(), 1);

    // Next failure doubles from the base again
    assert_eq!(
        h.sampler.run_cycle(&mut h.shutdown_rx).await,
        Some(Duration::from_secs(1))
    );

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.cycles, 5);
    assert_eq!(snapshot.fetch_failures, 4);
    assert_eq!(snapshot.ticks_recorded, 1);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_absent_quote_skips_writes_without_backoff(store: Arc<RecordingStore>) -> Result<()> {
    open(&store).await?;
    let client = Arc::new(ScriptedQuoteClient::new([
        QuoteStep::fail("reset"),
        QuoteStep::Absent,
        QuoteStep::Price(0.0),
        QuoteStep::Price(-5.0),
    ]));
    let mut h = harness(client, Arc::clone(&store), vec![Timeframe::M1], Duration::from_secs(5));

    assert_eq!(h.sampler.run_cycle(&mut h.shutdown_rx).await, Some(Duration::from_secs(1)));
    for _ in 0..3 {
        assert_eq!(h.sampler.run_cycle(&mut h.shutdown_rx).await, Some(POLL));
        assert_eq!(h.sampler.backoff().failures(), 0);
    }

    assert_eq!(store.tick_count(), 0);
    assert_eq!(store.upsert_calls(), 0);
    assert_eq!(h.metrics.snapshot().quotes_absent, 3);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_successful_cycle_records_tick_and_candles(store: Arc<RecordingStore>) -> Result<()> {
    open(&store).await?;
    let client = Arc::new(ScriptedQuoteClient::constant(22_150.5));
    let timeframes = vec![Timeframe::S5, Timeframe::M1, Timeframe::M5];
    let mut h = harness(client, Arc::clone(&store), timeframes.clone(), Duration::from_secs(5));

    assert_eq!(h.sampler.run_cycle(&mut h.shutdown_rx).await, Some(POLL));

    let ticks = store.ticks();
    assert_eq!(ticks.len(), 1);
    assert_eq!(ticks[0].symbol, "NIFTY");
    assert_eq!(ticks[0].price, 22_150.5);
    for tf in timeframes {
        let candles = store.candles_for("NIFTY", tf);
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].open_time, tf.bucket_start(ticks[0].ts));
    }
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_candle_failure_leaves_backoff_alone(store: Arc<RecordingStore>) -> Result<()> {
    open(&store).await?;
    store.fail_timeframe(Timeframe::M5);
    let client = Arc::new(ScriptedQuoteClient::constant(22_000.0));
    let mut h = harness(
        client,
        Arc::clone(&store),
        vec![Timeframe::M1, Timeframe::M5],
        Duration::from_secs(5),
    );

    assert_eq!(h.sampler.run_cycle(&mut h.shutdown_rx).await, Some(POLL));
    assert_eq!(h.sampler.run_cycle(&mut h.shutdown_rx).await, Some(POLL));

    assert_eq!(store.candles_for("NIFTY", Timeframe::M1).len(), 1);
    assert!(store.candles_for("NIFTY", Timeframe::M5).is_empty());
    assert_eq!(store.tick_count(), 2);
    assert_eq!(h.sampler.backoff().failures(), 0);
    assert_eq!(h.metrics.snapshot().candle_upsert_failures, 2);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_tick_failure_still_aggregates(store: Arc<RecordingStore>) -> Result<()> {
    open(&store).await?;
    store.set_fail_ticks(true);
    let client = Arc::new(ScriptedQuoteClient::constant(22_000.0));
    let mut h = harness(client, Arc::clone(&store), vec![Timeframe::M1], Duration::from_secs(5));

    assert_eq!(h.sampler.run_cycle(&mut h.shutdown_rx).await, Some(POLL));

    assert_eq!(store.tick_count(), 0);
    assert_eq!(store.candles_for("NIFTY", Timeframe::M1).len(), 1);
    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.tick_write_failures, 1);
    assert_eq!(snapshot.ticks_recorded, 0);
    assert_eq!(h.sampler.backoff().failures(), 0);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_symbol_switch_applies_next_cycle(store: Arc<RecordingStore>) -> Result<()> {
    open(&store).await?;
    let client = Arc::new(ScriptedQuoteClient::constant(100.0));
    let mut h = harness(Arc::clone(&client), Arc::clone(&store), vec![Timeframe::M1], Duration::from_secs(5));

    h.sampler.run_cycle(&mut h.shutdown_rx).await;
    h.symbol_tx.send_replace("BANKNIFTY".to_string());
    h.sampler.run_cycle(&mut h.shutdown_rx).await;

    assert_eq!(client.requested_symbols(), vec!["NIFTY", "BANKNIFTY"]);
    let mut symbols: Vec<&str> = h.sampler.aggregator().symbols().collect();
    symbols.sort_unstable();
    assert_eq!(symbols, vec!["BANKNIFTY", "NIFTY"]);
    assert_eq!(store.candles_for("BANKNIFTY", Timeframe::M1).len(), 1);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_slow_fetch_times_out_as_failure(store: Arc<RecordingStore>) -> Result<()> {
    open(&store).await?;
    let client = Arc::new(ScriptedQuoteClient::constant(100.0).with_delay(Duration::from_millis(300)));
    let mut h = harness(client, Arc::clone(&store), vec![Timeframe::M1], Duration::from_millis(50));

    let delay = h.sampler.run_cycle(&mut h.shutdown_rx).await;

    assert_eq!(delay, Some(Duration::from_secs(1)));
    assert_eq!(h.metrics.snapshot().fetch_failures, 1);
    assert_eq!(store.tick_count(), 0);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn test_shutdown_during_fetch_is_not_a_failure(store: Arc<RecordingStore>) -> Result<()> {
    open(&store).await?;
    let client = Arc::new(ScriptedQuoteClient::constant(100.0).with_delay(Duration::from_millis(400)));
    let mut h = harness(client, Arc::clone(&store), vec![Timeframe::M1], Duration::from_secs(5));
    let shutdown_tx = &h.shutdown_tx;

    let (delay, ()) = tokio::join!(h.sampler.run_cycle(&mut h.shutdown_rx), async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = shutdown_tx.send(true);
    });

    assert_eq!(delay, None);
    assert_eq!(h.sampler.backoff().failures(), 0);
    assert_eq!(h.metrics.snapshot().fetch_failures, 0);
    assert_eq!(store.tick_count(), 0);
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn test_run_exits_when_shutdown_sender_dropped(store: Arc<RecordingStore>) -> Result<()> {
    open(&store).await?;
    let client = Arc::new(ScriptedQuoteClient::constant(100.0));
    let h = harness(client, Arc::clone(&store), vec![Timeframe::M1], Duration::from_secs(5));
    let Harness {
        sampler,
        shutdown_tx,
        shutdown_rx,
        ..
    } = h;

    let task = tokio::spawn(sampler.run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(shutdown_tx);

    with_timeout(Duration::from_secs(2), task).await??;
    assert_eq!(store.tick_count(), 1);
    Ok(())
}
