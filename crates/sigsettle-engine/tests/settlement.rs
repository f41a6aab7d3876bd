//! End-to-end settlement flows over the public engine API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use sigsettle_chain::{ChainError, ChainResult, TokenTransfer, TradeExtractor, TransferSource};
use sigsettle_core::{
    CloseReason, CloseSignalInput, CreateSignalInput, ManualClock, Price, PriceQuote, SignalAction,
    SignalStatus, Subscription, SubscriptionFilter,
};
use sigsettle_engine::{
    EngineError, EvaluateOutcome, SettlementConfig, SettlementEngine, SkipReason,
};
use sigsettle_notify::{
    spawn_dispatcher, DeliveryRunner, EventType, NotifyConfig, NotifyResult, NullSink,
    WebhookPayload, WebhookTransport,
};
use sigsettle_oracle::{AssetRef, PriceLookup};
use sigsettle_store::{InMemorySignalStore, InMemorySubscriptionStore, SubscriptionStore};

const TRADER: &str = "0x00000000000000000000000000000000000000aa";
const POOL: &str = "0x00000000000000000000000000000000000000bb";

// =============================================================================
// Fakes
// =============================================================================

#[derive(Default)]
struct Prices(Mutex<HashMap<String, Decimal>>);

impl Prices {
    fn set(&self, symbol: &str, price: Decimal) {
        self.0.lock().insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl PriceLookup for Prices {
    async fn quote(&self, asset: &AssetRef) -> Option<PriceQuote> {
        let price = *self.0.lock().get(&asset.symbol)?;
        Some(PriceQuote {
            symbol: asset.symbol.clone(),
            price: Price::new(price),
            change_24h_pct: None,
            source: "test".to_string(),
            fetched_at: Utc::now(),
            ttl: Duration::from_secs(30),
        })
    }
}

struct Transfers(HashMap<String, Vec<TokenTransfer>>);

#[async_trait]
impl TransferSource for Transfers {
    async fn token_transfers(&self, _chain: &str, tx_id: &str) -> ChainResult<Vec<TokenTransfer>> {
        self.0
            .get(tx_id)
            .cloned()
            .ok_or_else(|| ChainError::TransactionNotFound(tx_id.to_string()))
    }
}

#[derive(Default)]
struct RecordingTransport {
    delivered: Mutex<Vec<WebhookPayload>>,
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn deliver(&self, _endpoint: &str, payload: &WebhookPayload) -> NotifyResult<()> {
        self.delivered.lock().push(payload.clone());
        Ok(())
    }
}

struct Harness {
    engine: Arc<SettlementEngine>,
    prices: Arc<Prices>,
    clock: ManualClock,
}

fn harness() -> Harness {
    let prices = Arc::new(Prices::default());
    let clock = ManualClock::new(Utc::now());
    let engine = SettlementEngine::new(
        Arc::new(InMemorySignalStore::new()),
        prices.clone(),
        Arc::new(NullSink),
        Arc::new(clock.clone()),
        SettlementConfig::default(),
    );
    Harness {
        engine: Arc::new(engine),
        prices,
        clock,
    }
}

fn create(action: &str, price: Decimal, leverage: Decimal, tx: &str) -> CreateSignalInput {
    CreateSignalInput {
        provider: TRADER.to_string(),
        action: action.to_string(),
        token: "ETH".to_string(),
        collateral_usd: dec!(100),
        tx_id: tx.to_string(),
        entry_price: Some(price),
        leverage: Some(leverage),
        ..Default::default()
    }
}

fn close(id: &str, price: Decimal) -> CloseSignalInput {
    CloseSignalInput {
        signal_id: id.to_string(),
        exit_price: price,
        exit_tx_id: Some("0xexit".to_string()),
        pnl_override: None,
        attested_price: None,
    }
}

fn transfer(symbol: &str, token: &str, from: &str, to: &str, amount: Decimal) -> TokenTransfer {
    TokenTransfer {
        token_address: token.to_string(),
        symbol: symbol.to_string(),
        decimals: 18,
        from: from.to_string(),
        to: to.to_string(),
        amount,
    }
}

// =============================================================================
// PnL through close
// =============================================================================

#[tokio::test]
async fn test_long_close_round_trip() {
    let h = harness();
    let id = h
        .engine
        .create(create("LONG", dec!(2000), dec!(5), "0x1"))
        .await
        .unwrap()
        .signal
        .id;

    h.engine.close(close(id.as_str(), dec!(2200))).await.unwrap();

    let stored = h.engine.get(&id).await.unwrap();
    assert_eq!(stored.status(), SignalStatus::Closed);
    let settlement = stored.settlement().unwrap();
    assert_eq!(settlement.exit_price, Price::new(dec!(2200)));
    assert_eq!(settlement.realized_pnl_pct, dec!(50));
    assert_eq!(settlement.realized_pnl_usd, dec!(50));
    assert_eq!(settlement.reason, CloseReason::Manual);
    assert_eq!(settlement.exit_tx_id.as_deref(), Some("0xexit"));
}

#[tokio::test]
async fn test_short_close_profits_on_decline() {
    let h = harness();
    let id = h
        .engine
        .create(create("SHORT", dec!(100), dec!(2), "0x1"))
        .await
        .unwrap()
        .signal
        .id;

    let closed = h.engine.close(close(id.as_str(), dec!(90))).await.unwrap();
    assert_eq!(closed.settlement().unwrap().realized_pnl_pct, dec!(20));
}

#[tokio::test]
async fn test_pnl_sign_follows_direction() {
    let h = harness();
    for (i, (action, exit, positive)) in [
        ("BUY", dec!(110), true),
        ("LONG", dec!(90), false),
        ("SELL", dec!(90), true),
        ("SHORT", dec!(110), false),
    ]
    .into_iter()
    .enumerate()
    {
        let mut input = create(action, dec!(100), dec!(3), &format!("0xsign{i}"));
        // Distinct tokens keep auto-pairing out of the way.
        input.token = format!("TKN{i}");
        let id = h.engine.create(input).await.unwrap().signal.id;
        let closed = h.engine.close(close(id.as_str(), exit)).await.unwrap();
        let pnl = closed.settlement().unwrap().realized_pnl_pct;
        assert_eq!(pnl > Decimal::ZERO, positive, "{action} exiting at {exit}");
    }
}

#[tokio::test]
async fn test_close_unknown_is_not_found() {
    let h = harness();
    let err = h.engine.close(close("sig_missing", dec!(1))).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn test_close_rejects_attested_price_mismatch() {
    let h = harness();
    let id = h
        .engine
        .create(create("LONG", dec!(2000), dec!(1), "0x1"))
        .await
        .unwrap()
        .signal
        .id;

    let mut input = close(id.as_str(), dec!(2200));
    input.attested_price = Some(dec!(2210));
    let err = h.engine.close(input).await.unwrap_err();
    assert_eq!(err.code(), "validation_error");
    assert!(h.engine.get(&id).await.unwrap().is_open());
}

// =============================================================================
// Auto-pairing
// =============================================================================

#[tokio::test]
async fn test_sell_auto_closes_open_long() {
    let h = harness();
    let long = h
        .engine
        .create(create("LONG", dec!(2000), dec!(5), "0xlong"))
        .await
        .unwrap()
        .signal;
    h.clock.advance(chrono::Duration::minutes(10));

    let sell = h
        .engine
        .create(create("SELL", dec!(2200), dec!(1), "0xsell"))
        .await
        .unwrap();
    let closed = h.engine.get(&long.id).await.unwrap();
    assert_eq!(closed.status(), SignalStatus::Closed);
    let settlement = closed.settlement().unwrap();
    assert_eq!(settlement.exit_price, Price::new(dec!(2200)));
    assert_eq!(settlement.realized_pnl_pct, dec!(50));
    assert_eq!(settlement.reason, CloseReason::AutoPair);
    assert_eq!(settlement.exit_tx_id.as_deref(), Some("0xsell"));
    assert_eq!(settlement.holding_duration_secs, 600);
    assert_eq!(sell.signal.parent_signal_id, Some(long.id.clone()));

    // A later SELL finds nothing left to close.
    h.clock.advance(chrono::Duration::minutes(1));
    let later = h
        .engine
        .create(create("SELL", dec!(1800), dec!(1), "0xsell2"))
        .await
        .unwrap();
    assert!(later.auto_closed.is_none());
    assert_eq!(h.engine.get(&long.id).await.unwrap(), closed);
}

#[tokio::test]
async fn test_pairing_is_fifo_and_respects_lookback() {
    let h = harness();
    let stale = h
        .engine
        .create(create("LONG", dec!(100), dec!(1), "0xa"))
        .await
        .unwrap()
        .signal;
    h.clock.advance(chrono::Duration::days(8));
    let older = h
        .engine
        .create(create("BUY", dec!(100), dec!(1), "0xb"))
        .await
        .unwrap()
        .signal;
    h.clock.advance(chrono::Duration::hours(1));
    let newer = h
        .engine
        .create(create("LONG", dec!(100), dec!(1), "0xc"))
        .await
        .unwrap()
        .signal;
    h.clock.advance(chrono::Duration::hours(1));

    let first = h
        .engine
        .create(create("SELL", dec!(105), dec!(1), "0xd"))
        .await
        .unwrap();
    assert_eq!(first.auto_closed.map(|s| s.id), Some(older.id));

    h.clock.advance(chrono::Duration::hours(1));
    let second = h
        .engine
        .create(create("SELL", dec!(105), dec!(1), "0xe"))
        .await
        .unwrap();
    assert_eq!(second.auto_closed.map(|s| s.id), Some(newer.id));

    // Outside the 7 day window.
    assert!(h.engine.get(&stale.id).await.unwrap().is_open());
}

#[tokio::test]
async fn test_other_provider_is_never_paired() {
    let h = harness();
    h.engine
        .create(create("LONG", dec!(100), dec!(1), "0xa"))
        .await
        .unwrap();
    let mut other = create("SELL", dec!(100), dec!(1), "0xb");
    other.provider = "0x00000000000000000000000000000000000000ff".to_string();
    assert!(h.engine.create(other).await.unwrap().auto_closed.is_none());
}

// =============================================================================
// Rules
// =============================================================================

#[tokio::test]
async fn test_stop_loss_wins_over_passed_expiry() {
    let h = harness();
    let mut input = create("LONG", dec!(100), dec!(1), "0x1");
    input.stop_loss_pct = Some(dec!(10));
    input.expires_at = Some(h.clock_now() + chrono::Duration::hours(1));
    let id = h.engine.create(input).await.unwrap().signal.id;

    h.clock.advance(chrono::Duration::hours(2));
    let outcome = h
        .engine
        .evaluate(&id, Some(Price::new(dec!(88))))
        .await
        .unwrap();
    let EvaluateOutcome::Settled(signal) = outcome else {
        panic!("expected settlement, got {outcome:?}");
    };
    assert_eq!(signal.status(), SignalStatus::Stopped);
    assert_eq!(signal.settlement().unwrap().reason, CloseReason::StopLoss);
}

#[tokio::test]
async fn test_expiry_settles_at_current_price() {
    let h = harness();
    let mut input = create("LONG", dec!(100), dec!(1), "0x1");
    input.expires_at = Some(h.clock_now() + chrono::Duration::hours(1));
    let id = h.engine.create(input).await.unwrap().signal.id;

    h.clock.advance(chrono::Duration::hours(1));
    h.prices.set("ETH", dec!(103));
    let outcome = h.engine.evaluate(&id, None).await.unwrap();
    let EvaluateOutcome::Settled(signal) = outcome else {
        panic!("expected settlement, got {outcome:?}");
    };
    assert_eq!(signal.status(), SignalStatus::Expired);
    assert_eq!(signal.settlement().unwrap().exit_price, Price::new(dec!(103)));
    assert_eq!(signal.settlement().unwrap().realized_pnl_pct, dec!(3));
}

#[tokio::test]
async fn test_drawdown_floor_stops_position() {
    let h = harness();
    let id = h
        .engine
        .create(create("LONG", dec!(100), dec!(10), "0x1"))
        .await
        .unwrap()
        .signal
        .id;

    // -20% levered: holds.
    let held = h.engine.evaluate(&id, Some(Price::new(dec!(98)))).await.unwrap();
    assert!(matches!(held, EvaluateOutcome::Marked(_)));

    // -30% levered: breaches the -25% floor.
    let EvaluateOutcome::Settled(signal) =
        h.engine.evaluate(&id, Some(Price::new(dec!(97)))).await.unwrap()
    else {
        panic!("expected settlement");
    };
    assert_eq!(signal.status(), SignalStatus::Stopped);
    assert_eq!(signal.settlement().unwrap().reason, CloseReason::MaxDrawdown);
    assert_eq!(signal.max_drawdown_pct, dec!(-30));
}

#[tokio::test]
async fn test_settlement_records_triggering_drawdown() {
    let h = harness();
    let mut input = create("LONG", dec!(100), dec!(1), "0x1");
    input.stop_loss_pct = Some(dec!(20));
    let id = h.engine.create(input).await.unwrap().signal.id;

    let EvaluateOutcome::Settled(signal) =
        h.engine.evaluate(&id, Some(Price::new(dec!(70)))).await.unwrap()
    else {
        panic!("expected settlement");
    };
    assert_eq!(signal.settlement().unwrap().reason, CloseReason::StopLoss);
    assert_eq!(signal.max_drawdown_pct, dec!(-30));
    assert_eq!(h.engine.get(&id).await.unwrap().max_drawdown_pct, dec!(-30));
}

#[tokio::test]
async fn test_manual_close_at_a_loss_records_drawdown() {
    let h = harness();
    let id = h
        .engine
        .create(create("SHORT", dec!(100), dec!(2), "0x1"))
        .await
        .unwrap()
        .signal
        .id;

    let closed = h.engine.close(close(id.as_str(), dec!(105))).await.unwrap();
    assert_eq!(closed.max_drawdown_pct, dec!(-10));
}

#[tokio::test]
async fn test_evaluating_terminal_signal_is_noop() {
    let h = harness();
    let id = h
        .engine
        .create(create("LONG", dec!(100), dec!(1), "0x1"))
        .await
        .unwrap()
        .signal
        .id;
    let closed = h.engine.close(close(id.as_str(), dec!(120))).await.unwrap();

    let outcome = h.engine.evaluate(&id, Some(Price::new(dec!(1)))).await.unwrap();
    assert_eq!(outcome, EvaluateOutcome::Skipped(SkipReason::NotOpen));
    assert_eq!(h.engine.get(&id).await.unwrap(), closed);
}

#[tokio::test]
async fn test_evaluate_open_batch() {
    let h = harness();
    let mut tp = create("LONG", dec!(100), dec!(1), "0x1");
    tp.take_profit_pct = Some(dec!(5));
    let tp_id = h.engine.create(tp).await.unwrap().signal.id;

    let mut held = create("LONG", dec!(100), dec!(1), "0x2");
    held.token = "BTC".to_string();
    let held_id = h.engine.create(held).await.unwrap().signal.id;

    let mut unpriced = create("LONG", dec!(100), dec!(1), "0x3");
    unpriced.token = "NOPRICE".to_string();
    h.engine.create(unpriced).await.unwrap();

    h.prices.set("ETH", dec!(110));
    h.prices.set("BTC", dec!(101));

    let summary = h.engine.evaluate_open(4).await.unwrap();
    assert_eq!(summary.evaluated, 2);
    assert_eq!(summary.transitioned, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);

    assert_eq!(h.engine.get(&tp_id).await.unwrap().status(), SignalStatus::Closed);
    let held = h.engine.get(&held_id).await.unwrap();
    assert_eq!(held.open_position().unwrap().unrealized_pnl_pct, Some(dec!(1)));
}

// =============================================================================
// Extreme magnitudes
// =============================================================================

#[tokio::test]
async fn test_out_of_range_create_is_rejected() {
    let h = harness();
    let mut input = create("LONG", dec!(0.0000000001), dec!(100), "0x1");
    input.collateral_usd = dec!(1000000000000000);
    let err = h.engine.create(input).await.unwrap_err();
    assert_eq!(err.code(), "validation_error");

    let input = create("LONG", dec!(0.00000000000001), dec!(1), "0x2");
    let err = h.engine.create(input).await.unwrap_err();
    assert_eq!(err.code(), "validation_error");
    assert!(h.engine.query(&Default::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unrepresentable_pnl_fails_without_settling() {
    let h = harness();
    let mut input = create("LONG", dec!(0.000000000001), dec!(125), "0x1");
    input.collateral_usd = dec!(1000000000000);
    let id = h.engine.create(input).await.unwrap().signal.id;

    let err = h
        .engine
        .close(close(id.as_str(), dec!(1000000000000)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "validation_error");

    let err = h
        .engine
        .evaluate(&id, Some(Price::new(dec!(1000000000000))))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "validation_error");

    let stored = h.engine.get(&id).await.unwrap();
    assert!(stored.is_open());
    assert_eq!(stored.max_drawdown_pct, Decimal::ZERO);

    // Ordinary moves still settle.
    let closed = h.engine.close(close(id.as_str(), dec!(0.000000000002))).await.unwrap();
    assert_eq!(closed.settlement().unwrap().realized_pnl_pct, dec!(12500));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_closers_settle_once() {
    let h = harness();
    let mut input = create("LONG", dec!(100), dec!(1), "0x1");
    input.take_profit_pct = Some(dec!(1));
    let id = h.engine.create(input).await.unwrap().signal.id;

    let mut handles = Vec::new();
    for i in 0..16u32 {
        let engine = h.engine.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                engine
                    .close(close(id.as_str(), Decimal::from(100 + i)))
                    .await
                    .is_ok()
            } else {
                matches!(
                    engine.evaluate(&id, Some(Price::new(dec!(150)))).await,
                    Ok(EvaluateOutcome::Settled(_))
                )
            }
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert!(!h.engine.get(&id).await.unwrap().is_open());
}

// =============================================================================
// Extraction
// =============================================================================

fn extracting_harness(transfers: HashMap<String, Vec<TokenTransfer>>) -> Harness {
    let prices = Arc::new(Prices::default());
    let clock = ManualClock::new(Utc::now());
    let extractor = TradeExtractor::new(
        Arc::new(Transfers(transfers)),
        prices.clone(),
        Duration::from_secs(5),
    );
    let engine = SettlementEngine::new(
        Arc::new(InMemorySignalStore::new()),
        prices.clone(),
        Arc::new(NullSink),
        Arc::new(clock.clone()),
        SettlementConfig::default(),
    )
    .with_extractor(Arc::new(extractor));
    Harness {
        engine: Arc::new(engine),
        prices,
        clock,
    }
}

#[tokio::test]
async fn test_extracted_trade_overrides_submission() {
    let h = extracting_harness(
        [(
            "0xswap".to_string(),
            vec![
                transfer("USDC", "0xusdc", TRADER, POOL, dec!(500)),
                transfer("PEPE", "0xpepe", POOL, TRADER, dec!(1000)),
            ],
        )]
        .into_iter()
        .collect(),
    );
    let mut input = create("BUY", dec!(0.7), dec!(1), "0xswap");
    input.token = "PEPE".to_string();

    let signal = h.engine.create(input).await.unwrap().signal;
    assert_eq!(signal.entry_price, Price::new(dec!(0.5)));
    assert_eq!(signal.collateral_usd, dec!(500));
    assert_eq!(signal.token_address.as_deref(), Some("0xpepe"));
}

#[tokio::test]
async fn test_extraction_mismatch_is_rejected() {
    let h = extracting_harness(
        [(
            "0xswap".to_string(),
            vec![
                transfer("USDC", "0xusdc", TRADER, POOL, dec!(500)),
                transfer("DOGE", "0xdoge", POOL, TRADER, dec!(1000)),
            ],
        )]
        .into_iter()
        .collect(),
    );
    let mut input = create("BUY", dec!(0.5), dec!(1), "0xswap");
    input.token = "PEPE".to_string();

    let err = h.engine.create(input).await.unwrap_err();
    assert_eq!(err.code(), "validation_error");
}

#[tokio::test]
async fn test_unknown_tx_falls_back_to_submitted_price() {
    let h = extracting_harness(HashMap::new());
    let signal = h
        .engine
        .create(create("LONG", dec!(2000), dec!(1), "0xunknown"))
        .await
        .unwrap()
        .signal;
    assert_eq!(signal.entry_price, Price::new(dec!(2000)));
    assert_eq!(signal.collateral_usd, dec!(100));
}

#[tokio::test]
async fn test_no_price_anywhere_is_rejected() {
    let h = extracting_harness(HashMap::new());
    let mut input = create("LONG", dec!(1), dec!(1), "0xunknown");
    input.entry_price = None;
    let err = h.engine.create(input).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(v) if v.field == "entryPrice"));
}

// =============================================================================
// Notifications
// =============================================================================

#[tokio::test]
async fn test_transitions_reach_subscribers() {
    let subscriptions = Arc::new(InMemorySubscriptionStore::new());
    let filter = SubscriptionFilter {
        token: Some("ETH".to_string()),
        ..SubscriptionFilter::default()
    };
    subscriptions
        .insert(Subscription::new("http://hook.example", filter))
        .await
        .unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let clock = ManualClock::new(Utc::now());
    let runner = DeliveryRunner::new(
        subscriptions,
        transport.clone(),
        Arc::new(clock.clone()),
        NotifyConfig::default(),
    );
    let (dispatcher, _task) = spawn_dispatcher(runner);

    let engine = SettlementEngine::new(
        Arc::new(InMemorySignalStore::new()),
        Arc::new(Prices::default()),
        Arc::new(dispatcher),
        Arc::new(clock),
        SettlementConfig::default(),
    );
    let id = engine
        .create(create("LONG", dec!(2000), dec!(1), "0x1"))
        .await
        .unwrap()
        .signal
        .id;
    engine.close(close(id.as_str(), dec!(2100))).await.unwrap();

    let mut delivered = Vec::new();
    for _ in 0..100 {
        delivered = transport
            .delivered
            .lock()
            .iter()
            .map(|p| p.event_type)
            .collect();
        if delivered.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    delivered.sort_by_key(|t| t.as_str());
    assert_eq!(delivered, vec![EventType::NewSignal, EventType::PositionClosed]);
}

impl Harness {
    fn clock_now(&self) -> chrono::DateTime<Utc> {
        use sigsettle_core::Clock;
        self.clock.now()
    }
}

#[test]
fn test_pairing_table() {
    assert_eq!(SignalAction::Sell.closes(), [SignalAction::Buy, SignalAction::Long].as_slice());
    assert_eq!(SignalAction::Short.closes(), [SignalAction::Long].as_slice());
    assert_eq!(SignalAction::Buy.closes(), [SignalAction::Short, SignalAction::Sell].as_slice());
    assert_eq!(SignalAction::Long.closes(), [SignalAction::Short].as_slice());
}
