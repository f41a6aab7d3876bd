//! Settlement engine: the signal state machine.
//!
//! # Transitions
//!
//! ```text
//! create ──► OPEN ──evaluate──► STOPPED (stop_loss | max_drawdown)
//!             │    ──evaluate──► CLOSED  (take_profit)
//!             │    ──evaluate──► EXPIRED (expired)
//!             │    ──close─────► CLOSED  (manual)
//!             └────pair────────► CLOSED  (auto_pair)
//! ```
//!
//! Every transition out of OPEN holds the signal's lock across
//! read, check and write, so exactly one of any set of concurrent closers
//! succeeds. Events are published only after the store accepted the write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use sigsettle_chain::{ExtractedTrade, TradeExtractor};
use sigsettle_core::{
    price_in_range, usd_amount_in_range, AssetClass, Clock, CloseReason, CloseSignalInput,
    CoreError, CreateSignalInput, OpenPosition, Price, Settlement, Signal, SignalId, SignalState,
    ValidCreateInput, ValidationError,
};
use sigsettle_notify::{EventSink, SignalEvent};
use sigsettle_oracle::PriceLookup;
use sigsettle_store::{SignalQuery, SignalStore};
use sigsettle_telemetry::Metrics;

use crate::book::OpenBook;
use crate::config::SettlementConfig;
use crate::error::{EngineError, EngineResult};
use crate::locks::SignalLocks;
use crate::pnl::{self, Pnl, PnlError};
use crate::rules::triggered_exit;

fn pnl_error(field: &'static str, e: PnlError) -> EngineError {
    ValidationError::new(field, e.to_string()).into()
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(v) => Self::Validation(v),
            CoreError::InvalidTransition { id, from } => Self::StateConflict { id, status: from },
            other => Self::Validation(ValidationError::new("input", other.to_string())),
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutcome {
    /// The new OPEN signal, linked to the signal it auto-closed if any.
    pub signal: Signal,
    /// The earlier opposing signal this one closed.
    pub auto_closed: Option<Signal>,
}

/// Why an evaluation left the signal untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotOpen,
    NoPrice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluateOutcome {
    /// Still OPEN; unrealized metrics refreshed.
    Marked(Signal),
    /// A rule fired and the signal is now terminal.
    Settled(Signal),
    Skipped(SkipReason),
}

/// Batch re-evaluation summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationSummary {
    pub evaluated: usize,
    pub transitioned: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Terminal transition parameters.
struct Exit {
    price: Price,
    pnl: Pnl,
    reason: CloseReason,
    tx_id: Option<String>,
    closed_by: Option<SignalId>,
}

// =============================================================================
// SettlementEngine
// =============================================================================

pub struct SettlementEngine {
    signals: Arc<dyn SignalStore>,
    prices: Arc<dyn PriceLookup>,
    extractor: Option<Arc<TradeExtractor>>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    config: SettlementConfig,
    locks: SignalLocks,
    book: OpenBook,
    /// Entry transaction (lowercased) -> signal that claimed it.
    entry_txs: DashMap<String, SignalId>,
}

impl SettlementEngine {
    #[must_use]
    pub fn new(
        signals: Arc<dyn SignalStore>,
        prices: Arc<dyn PriceLookup>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        config: SettlementConfig,
    ) -> Self {
        Self {
            signals,
            prices,
            extractor: None,
            events,
            clock,
            config,
            locks: SignalLocks::new(),
            book: OpenBook::new(),
            entry_txs: DashMap::new(),
        }
    }

    /// Derive entry economics from the entry transaction when possible.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<TradeExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Rebuild the in-memory indexes from the store. Call once at startup.
    pub async fn restore(&self) -> EngineResult<usize> {
        let all = self.signals.query(&SignalQuery::default()).await?;
        for signal in &all {
            self.entry_txs
                .insert(signal.entry_tx_id.to_ascii_lowercase(), signal.id.clone());
            if signal.is_open() {
                self.book.insert(signal);
            }
        }
        self.refresh_open_gauge();
        info!(
            signals = all.len(),
            open = self.book.len(),
            "Settlement engine restored"
        );
        Ok(self.book.len())
    }

    pub async fn get(&self, id: &SignalId) -> EngineResult<Signal> {
        self.signals
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(id.clone()))
    }

    pub async fn query(&self, query: &SignalQuery) -> EngineResult<Vec<Signal>> {
        Ok(self.signals.query(query).await?)
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Validate a submission, derive its entry economics and open the signal.
    ///
    /// An opposing open signal of the same provider and token is then
    /// auto-closed (see [`Self::pair_auto_close`]).
    pub async fn create(&self, input: CreateSignalInput) -> EngineResult<CreateOutcome> {
        let now = self.clock.now();
        let valid = input.validate(now)?;

        if let Some(existing) = self.entry_txs.get(&valid.tx_id.to_ascii_lowercase()) {
            return Err(ValidationError::new(
                "txId",
                format!("already used by signal {}", existing.value()),
            )
            .into());
        }

        let trade = self.extract(&valid).await?;
        let (entry_price, collateral_usd, token_address) = match &trade {
            Some(t) => (
                Some(t.entry_price),
                t.collateral_usd,
                valid
                    .token_address
                    .clone()
                    .or_else(|| Some(t.token_address.clone())),
            ),
            None => (
                valid.entry_price,
                valid.collateral_usd,
                valid.token_address.clone(),
            ),
        };

        let entry_price = entry_price.filter(Price::is_positive).ok_or_else(|| {
            ValidationError::new(
                "entryPrice",
                "no positive entry price could be determined from the transaction or the submission",
            )
        })?;
        if !price_in_range(entry_price) {
            return Err(ValidationError::new(
                "entryPrice",
                format!("{entry_price} is outside the accepted price range"),
            )
            .into());
        }
        if collateral_usd <= Decimal::ZERO {
            return Err(ValidationError::new("collateralUsd", "must be positive").into());
        }
        if !usd_amount_in_range(collateral_usd) {
            return Err(ValidationError::new(
                "collateralUsd",
                format!("{collateral_usd} is outside the accepted range"),
            )
            .into());
        }
        self.check_sanity_band(&valid.token, token_address.as_deref(), entry_price)
            .await?;

        let signal = Signal {
            id: SignalId::new(),
            provider: valid.provider,
            token: valid.token,
            token_address,
            chain: valid.chain,
            action: valid.action,
            entry_price,
            collateral_usd,
            leverage: valid.leverage,
            stop_loss_pct: valid.stop_loss_pct,
            take_profit_pct: valid.take_profit_pct,
            fees_usd: valid.fees_usd,
            slippage_pct: valid.slippage_pct,
            entry_tx_id: valid.tx_id,
            category: valid.category,
            risk_level: valid.risk_level,
            confidence: valid.confidence,
            created_at: now,
            expires_at: valid.expires_at,
            parent_signal_id: None,
            max_drawdown_pct: Decimal::ZERO,
            state: SignalState::Open(OpenPosition::default()),
        };

        match self.entry_txs.entry(signal.entry_tx_id.to_ascii_lowercase()) {
            Entry::Occupied(existing) => {
                return Err(ValidationError::new(
                    "txId",
                    format!("already used by signal {}", existing.get()),
                )
                .into());
            }
            Entry::Vacant(slot) => {
                slot.insert(signal.id.clone());
            }
        }
        if let Err(e) = self.signals.insert(signal.clone()).await {
            self.entry_txs.remove(&signal.entry_tx_id.to_ascii_lowercase());
            return Err(e.into());
        }
        self.book.insert(&signal);
        Metrics::signal_created(signal.action.as_str());
        self.refresh_open_gauge();
        info!(
            signal_id = %signal.id,
            provider = %signal.provider,
            token = %signal.token,
            action = %signal.action,
            entry_price = %signal.entry_price,
            collateral_usd = %signal.collateral_usd,
            leverage = %signal.leverage,
            extracted = trade.is_some(),
            "Signal opened"
        );

        let auto_closed = match self.pair_auto_close(&signal).await {
            Ok(closed) => closed,
            Err(e) => {
                warn!(signal_id = %signal.id, error = %e, "Auto-pairing failed, signal stays open");
                None
            }
        };
        let signal = match &auto_closed {
            Some(_) => self.get(&signal.id).await?,
            None => signal,
        };

        self.events
            .publish(SignalEvent::new_signal(signal.clone(), now));
        Ok(CreateOutcome {
            signal,
            auto_closed,
        })
    }

    async fn extract(&self, valid: &ValidCreateInput) -> EngineResult<Option<ExtractedTrade>> {
        let Some(extractor) = &self.extractor else {
            return Ok(None);
        };
        match extractor
            .extract(
                &valid.chain,
                &valid.tx_id,
                &valid.token,
                Some(valid.trader_address.as_str()),
            )
            .await
        {
            Ok(trade) => Ok(trade),
            Err(e) if e.is_validation() => Err(ValidationError::new("token", e.to_string()).into()),
            Err(e) => {
                warn!(
                    tx_id = %valid.tx_id,
                    chain = %valid.chain,
                    error = %e,
                    "Trade extraction failed, falling back to submitted values"
                );
                Ok(None)
            }
        }
    }

    /// Reject entry prices too far from the market. Skipped without a market price.
    async fn check_sanity_band(
        &self,
        token: &str,
        token_address: Option<&str>,
        entry_price: Price,
    ) -> EngineResult<()> {
        let Some(quote) = self.prices.get_price(token, token_address).await else {
            debug!(token, "No market price for sanity check, skipping");
            return Ok(());
        };
        let class = AssetClass::classify(token);
        let band = self.config.sanity_bands.for_class(class);
        let Some(deviation) = entry_price.deviation_from(quote.price) else {
            return Ok(());
        };
        let within = deviation
            .checked_mul(Decimal::ONE_HUNDRED)
            .filter(|pct| *pct <= band);
        if within.is_none() {
            return Err(ValidationError::new(
                "entryPrice",
                format!(
                    "{entry_price} deviates more than {band}% from market price {} ({class})",
                    quote.price
                ),
            )
            .into());
        }
        Ok(())
    }

    // =========================================================================
    // Evaluate
    // =========================================================================

    /// Apply the exit rules to one signal at `price`, or at the oracle price
    /// when `price` is `None`.
    ///
    /// Never fails for a missing price; that is reported as
    /// `Skipped(NoPrice)` with the signal unchanged.
    pub async fn evaluate(
        &self,
        id: &SignalId,
        price: Option<Price>,
    ) -> EngineResult<EvaluateOutcome> {
        let _guard = self.locks.acquire(id).await;
        let mut signal = self.get(id).await?;
        if !signal.is_open() {
            return Ok(EvaluateOutcome::Skipped(SkipReason::NotOpen));
        }

        let price = match price {
            Some(p) => Some(p),
            None => self
                .prices
                .get_price(&signal.token, signal.token_address.as_deref())
                .await
                .map(|q| q.price),
        };
        let Some(price) = price.filter(Price::is_positive) else {
            debug!(signal_id = %id, token = %signal.token, "No price available, evaluation skipped");
            return Ok(EvaluateOutcome::Skipped(SkipReason::NoPrice));
        };
        let mark = pnl::unrealized(&signal, price).map_err(|e| pnl_error("price", e))?;

        let now = self.clock.now();
        if let Some(reason) = triggered_exit(&signal, mark.pct, now, self.config.max_drawdown_floor_pct)
        {
            let realized = pnl::realized(&signal, price, None).map_err(|e| pnl_error("price", e))?;
            let settled = self
                .settle(
                    signal,
                    Exit {
                        price,
                        pnl: realized,
                        reason,
                        tx_id: None,
                        closed_by: None,
                    },
                    now,
                )
                .await?;
            return Ok(EvaluateOutcome::Settled(settled));
        }

        signal.mark(price, mark.pct, mark.usd, now)?;
        self.signals.update(signal.clone()).await?;
        debug!(
            signal_id = %id,
            price = %price,
            unrealized_pnl_pct = %mark.pct,
            max_drawdown_pct = %signal.max_drawdown_pct,
            "Signal marked"
        );
        Ok(EvaluateOutcome::Marked(signal))
    }

    /// Re-evaluate every open signal against one batch of oracle prices.
    ///
    /// Signals are processed `concurrency` at a time; one signal's failure
    /// is counted and logged without affecting the rest.
    pub async fn evaluate_open(&self, concurrency: usize) -> EngineResult<EvaluationSummary> {
        let open = self.signals.open_signals().await?;
        if open.is_empty() {
            return Ok(EvaluationSummary::default());
        }

        let symbols: Vec<String> = open.iter().map(|s| s.token.clone()).collect();
        let quotes = self.prices.get_prices(&symbols).await;
        let quotes = &quotes;

        let outcomes: Vec<(SignalId, EngineResult<EvaluateOutcome>)> = stream::iter(open)
            .map(move |signal| async move {
                let outcome = match quotes.get(&signal.token) {
                    Some(q) => self.evaluate(&signal.id, Some(q.price)).await,
                    // Address-keyed lookups can still resolve tokens the symbol batch missed.
                    None if signal.token_address.is_some() => self.evaluate(&signal.id, None).await,
                    None => Ok(EvaluateOutcome::Skipped(SkipReason::NoPrice)),
                };
                (signal.id, outcome)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut summary = EvaluationSummary::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(EvaluateOutcome::Marked(_)) => summary.evaluated += 1,
                Ok(EvaluateOutcome::Settled(_)) => {
                    summary.evaluated += 1;
                    summary.transitioned += 1;
                }
                Ok(EvaluateOutcome::Skipped(_)) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(signal_id = %id, error = %e, "Signal evaluation failed");
                }
            }
        }

        info!(
            evaluated = summary.evaluated,
            transitioned = summary.transitioned,
            skipped = summary.skipped,
            failed = summary.failed,
            "Open signals evaluated"
        );
        Ok(summary)
    }

    // =========================================================================
    // Close
    // =========================================================================

    /// Explicitly close an open signal at the given exit price.
    pub async fn close(&self, input: CloseSignalInput) -> EngineResult<Signal> {
        let valid = input.validate(self.clock.now())?;
        let _guard = self.locks.acquire(&valid.signal_id).await;
        let signal = self.get(&valid.signal_id).await?;
        if !signal.is_open() {
            let status = signal.status();
            return Err(EngineError::StateConflict {
                id: signal.id,
                status,
            });
        }

        let pnl = pnl::realized(&signal, valid.exit_price, valid.pnl_override)
            .map_err(|e| pnl_error("exitPrice", e))?;
        let closed = self
            .settle(
                signal,
                Exit {
                    price: valid.exit_price,
                    pnl,
                    reason: CloseReason::Manual,
                    tx_id: valid.exit_tx_id,
                    closed_by: None,
                },
                self.clock.now(),
            )
            .await?;
        Ok(closed)
    }

    // =========================================================================
    // Auto-pairing
    // =========================================================================

    /// Close the oldest open signal that `new` logically closes.
    ///
    /// Candidates share `new`'s provider and token, carry an action in
    /// `new.action.closes()`, and were opened within the lookback window.
    /// At most one signal is closed per call. The closed signal exits at
    /// `new`'s entry price and `new` records it as its parent.
    pub async fn pair_auto_close(&self, new: &Signal) -> EngineResult<Option<Signal>> {
        let since = new.created_at - self.config.pair_lookback();

        loop {
            let Some(candidate_id) = self.book.oldest_opposing(
                &new.provider,
                &new.token,
                new.action.closes(),
                since,
            ) else {
                return Ok(None);
            };

            let guard = self.locks.acquire(&candidate_id).await;
            let candidate = match self.signals.get(&candidate_id).await? {
                Some(s) if s.is_open() => s,
                Some(s) => {
                    // Settled by someone else between lookup and lock.
                    if !self.book.remove(&s) {
                        return Ok(None);
                    }
                    continue;
                }
                None => {
                    warn!(signal_id = %candidate_id, "Open book references a missing signal");
                    return Ok(None);
                }
            };

            let pnl = pnl::realized(&candidate, new.entry_price, None)
                .map_err(|e| pnl_error("entryPrice", e))?;
            let closed = self
                .settle(
                    candidate,
                    Exit {
                        price: new.entry_price,
                        pnl,
                        reason: CloseReason::AutoPair,
                        tx_id: Some(new.entry_tx_id.clone()),
                        closed_by: Some(new.id.clone()),
                    },
                    self.clock.now(),
                )
                .await?;
            drop(guard);

            let _guard = self.locks.acquire(&new.id).await;
            if let Some(mut linked) = self.signals.get(&new.id).await? {
                linked.parent_signal_id = Some(closed.id.clone());
                self.signals.update(linked).await?;
            }
            return Ok(Some(closed));
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Commit a terminal transition. The caller holds the signal's lock.
    ///
    /// The exit mark is folded into the running drawdown before the state
    /// leaves OPEN.
    async fn settle(&self, mut signal: Signal, exit: Exit, now: DateTime<Utc>) -> EngineResult<Signal> {
        if let Ok(mark) = pnl::unrealized(&signal, exit.price) {
            signal.max_drawdown_pct = signal.max_drawdown_pct.min(mark.pct);
        }
        let settlement = Settlement {
            exit_price: exit.price,
            exit_timestamp: now,
            exit_tx_id: exit.tx_id,
            realized_pnl_pct: exit.pnl.pct,
            realized_pnl_usd: exit.pnl.usd,
            holding_duration_secs: (now - signal.created_at).num_seconds().max(0),
            reason: exit.reason,
            closed_by_signal_id: exit.closed_by,
        };
        signal.settle(exit.reason.terminal_status(), settlement)?;
        self.signals.update(signal.clone()).await?;
        self.book.remove(&signal);

        let status = signal.status();
        Metrics::signal_transition(status.as_str(), exit.reason.as_str());
        self.refresh_open_gauge();
        info!(
            signal_id = %signal.id,
            status = %status,
            reason = %exit.reason,
            exit_price = %exit.price,
            pnl_pct = %exit.pnl.pct,
            pnl_usd = %exit.pnl.usd,
            "Signal settled"
        );

        self.events
            .publish(SignalEvent::position_closed(signal.clone(), now));
        Ok(signal)
    }

    fn refresh_open_gauge(&self) {
        Metrics::open_signals_set(i64::try_from(self.book.len()).unwrap_or(i64::MAX));
    }
}
