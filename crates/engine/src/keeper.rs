//! The scheduling loop. Each tick reads every watched instrument's price
//! and every watched trader's open positions, evaluates triggers, and
//! drives index resolution plus settlement with per-position backoff.
//!
//! ```text
//! KeeperLoop ──► PositionRegistry / OracleReader   (reads, concurrent)
//!            ──► TriggerEvaluator                  (pure decision)
//!            ──► IndexResolver                     (probed, memoized)
//!            ──► SettlementSubmitter               (simulate, then commit)
//!            ◄── backoff / removal bookkeeping
//! ```

use crate::registry::PositionRegistry;
use crate::resolver::{IndexResolver, ResolveError};
use crate::submitter::{permissive_price_bound, SettleError, SettlementSubmitter};
use crate::watch::{BackoffPolicy, WatchSet};
use anyhow::Result;
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use synth_keeper_core::convert::{feed_to_display, feed_to_ledger};
use synth_keeper_core::trigger::{self, TriggerPolicy};
use synth_keeper_core::{
    KeeperConfig, LedgerClient, OracleClient, OracleError, Position, PriceQuote, RevertClass,
    TriggerDecision, WatchTarget,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct TickStats {
    triggered: u32,
    settled: u32,
}

pub struct Keeper {
    poll_interval: Duration,
    freshness_budget_secs: i64,
    trigger_policy: TriggerPolicy,
    cross_check_tolerance_bps: Option<u32>,
    quote_currency: String,
    targets: Vec<WatchTarget>,
    ledger: Arc<dyn LedgerClient>,
    oracle: Arc<dyn OracleClient>,
    registry: PositionRegistry,
    resolver: IndexResolver,
    submitter: SettlementSubmitter,
    watch_set: WatchSet,
    backoff: BackoffPolicy,
    /// Instruments whose missing feed was already surfaced, to keep the
    /// fatal log from repeating every tick.
    reported_missing_feeds: HashSet<String>,
}

impl Keeper {
    #[must_use]
    pub fn new(
        config: &KeeperConfig,
        ledger: Arc<dyn LedgerClient>,
        oracle: Arc<dyn OracleClient>,
    ) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.keeper.poll_interval_secs),
            freshness_budget_secs: config.keeper.freshness_budget_secs as i64,
            trigger_policy: config.trigger,
            cross_check_tolerance_bps: config.keeper.cross_check_tolerance_bps,
            quote_currency: config.ledger.quote_currency.clone(),
            targets: config.watch.clone(),
            registry: PositionRegistry::new(Arc::clone(&ledger)),
            resolver: IndexResolver::new(Arc::clone(&ledger)),
            submitter: SettlementSubmitter::new(Arc::clone(&ledger)),
            ledger,
            oracle,
            watch_set: WatchSet::new(),
            backoff: BackoffPolicy::new(
                config.keeper.backoff_initial_ms,
                config.keeper.backoff_cap_ms,
            ),
            reported_missing_feeds: HashSet::new(),
        }
    }

    /// Runs the tick loop until the stop signal flips to true. In-flight
    /// settlement attempts run to completion before the loop exits, so no
    /// transaction's outcome goes unobserved.
    ///
    /// # Errors
    /// Currently never fails; kept fallible for the callers' supervision.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            targets = self.targets.len(),
            poll_interval_secs = self.poll_interval.as_secs(),
            "keeper loop starting"
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("keeper loop stopped");
        Ok(())
    }

    /// One poll iteration. Public so one-shot embedding and tests can drive
    /// the loop without the timer.
    pub async fn tick(&mut self) {
        let now = Utc::now();
        let now_secs = now.timestamp();
        let now_ms = now.timestamp_millis() as u64;

        let quotes = self.read_quotes().await;
        self.refresh_watch_set(now_ms).await;

        if self.cross_check_tolerance_bps.is_some() {
            self.cross_check_prices(&quotes).await;
        }

        let mut stats = TickStats::default();
        for position in self.watch_set.eligible(now_ms) {
            let Some(quote) = quotes.get(&position.instrument) else {
                continue;
            };
            let age = quote.age_seconds(now_secs);
            if age > self.freshness_budget_secs {
                debug!(
                    instrument = %position.instrument,
                    age_seconds = age,
                    budget_seconds = self.freshness_budget_secs,
                    "stale quote; skipping evaluation this tick"
                );
                continue;
            }
            let decision = trigger::evaluate(&position, quote.raw_answer, self.trigger_policy);
            if decision == TriggerDecision::None {
                continue;
            }
            stats.triggered += 1;
            info!(
                position = %position.key(),
                ?decision,
                price = %feed_to_display(quote.raw_answer, quote.decimals),
                "trigger observed"
            );
            self.attempt_settlement(&position, now_ms, &mut stats).await;
        }

        debug!(
            watched = self.watch_set.len(),
            backing_off = self.watch_set.backing_off(now_ms),
            triggered = stats.triggered,
            settled = stats.settled,
            "tick complete"
        );
    }

    /// Reads all watched instruments' quotes concurrently; reads are
    /// independent and idempotent.
    async fn read_quotes(&mut self) -> HashMap<String, PriceQuote> {
        let instruments: BTreeSet<String> = self
            .targets
            .iter()
            .flat_map(|target| target.instruments.iter().cloned())
            .collect();

        let reads = instruments.into_iter().map(|instrument| {
            let oracle = Arc::clone(&self.oracle);
            async move {
                let result = oracle.read_quote(&instrument).await;
                (instrument, result)
            }
        });

        let mut quotes = HashMap::new();
        for (instrument, result) in join_all(reads).await {
            match result {
                Ok(quote) => {
                    quotes.insert(instrument, quote);
                }
                Err(OracleError::FeedUnavailable(_)) => {
                    // Configuration problem; surface once, not every tick.
                    if self.reported_missing_feeds.insert(instrument.clone()) {
                        error!(%instrument, "no price feed configured; instrument cannot be watched");
                    }
                }
                Err(err) if err.is_transient() => {
                    warn!(%instrument, %err, "quote read failed; retrying next tick");
                }
                Err(err) => {
                    warn!(%instrument, %err, "quote unusable this tick");
                }
            }
        }
        quotes
    }

    async fn refresh_watch_set(&mut self, now_ms: u64) {
        let targets = self.targets.clone();
        for target in &targets {
            for instrument in &target.instruments {
                match self.registry.list_open(&target.trader, instrument).await {
                    Ok(open) => {
                        let (added, removed) =
                            self.watch_set.sync(&target.trader, instrument, open, now_ms);
                        if added > 0 {
                            info!(trader = %target.trader, %instrument, added, "watching new positions");
                        }
                        for key in removed {
                            info!(position = %key, "position closed; removed from watch set");
                            self.resolver.forget(&key);
                        }
                    }
                    Err(err) => {
                        // Transient by contract: never treated as "no
                        // positions".
                        warn!(
                            trader = %target.trader,
                            %instrument,
                            %err,
                            "registry read failed; keeping current watch set"
                        );
                    }
                }
            }
        }
    }

    /// Compares each oracle quote against the ledger's derived price and
    /// warns on divergence. Log-only: never a trigger input.
    async fn cross_check_prices(&self, quotes: &HashMap<String, PriceQuote>) {
        let Some(tolerance_bps) = self.cross_check_tolerance_bps else {
            return;
        };
        for (instrument, quote) in quotes {
            let Ok(oracle_ledger_units) = feed_to_ledger(quote.raw_answer, quote.decimals) else {
                continue;
            };
            match self
                .ledger
                .get_derived_price(instrument, &self.quote_currency)
                .await
            {
                Ok(derived) if derived > 0 => {
                    let diff = oracle_ledger_units.abs_diff(derived);
                    let bps = diff.saturating_mul(10_000) / derived;
                    if bps > u128::from(tolerance_bps) {
                        warn!(
                            %instrument,
                            divergence_bps = bps as u64,
                            "oracle and ledger derived price diverge"
                        );
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    debug!(%instrument, %err, "derived-price cross-check unavailable");
                }
            }
        }
    }

    async fn attempt_settlement(
        &mut self,
        position: &Position,
        now_ms: u64,
        stats: &mut TickStats,
    ) {
        let key = position.key();
        let bound = permissive_price_bound(position.direction);

        let index = match self.resolver.resolve(position, bound).await {
            Ok(index) => index,
            Err(ResolveError::Unresolved { .. }) => {
                error!(
                    position = %key,
                    "settlement index unresolved after probing all candidates; removing from watch set"
                );
                self.watch_set.retire(&key);
                return;
            }
            Err(ResolveError::Ledger(err)) if err.is_transient() => {
                warn!(position = %key, %err, "index probing failed; backing off");
                self.watch_set.record_failure(&key, &self.backoff, now_ms);
                return;
            }
            Err(ResolveError::Ledger(err)) => {
                error!(position = %key, %err, "index probing failed fatally; removing from watch set");
                self.watch_set.retire(&key);
                return;
            }
        };

        match self.submitter.settle(position, index).await {
            Ok(receipt) => {
                stats.settled += 1;
                info!(
                    position = %key,
                    tx = %receipt.tx_hash,
                    "position settled and removed from watch set"
                );
                self.watch_set.retire(&key);
            }
            Err(SettleError::NotTriggered) => {
                // The ledger's own evaluation disagrees; expected when our
                // quote leads the feed the contract reads. No action.
                debug!(position = %key, "ledger reports condition not yet met");
            }
            Err(SettleError::AlreadyClosed) => {
                info!(position = %key, "position already closed on ledger");
                self.watch_set.retire(&key);
            }
            Err(SettleError::Rejected(RevertClass::InvalidIndex)) => {
                // The memoized index went stale (history grew); re-probe
                // next attempt.
                warn!(position = %key, "cached settlement index rejected; will re-probe");
                self.resolver.forget(&key);
                self.watch_set.record_failure(&key, &self.backoff, now_ms);
            }
            Err(SettleError::Rejected(RevertClass::Unauthorized)) => {
                error!(position = %key, "signing identity unauthorized for settlement");
                self.watch_set.retire(&key);
            }
            Err(SettleError::Rejected(class)) => {
                warn!(position = %key, %class, "settlement rejected; backing off");
                self.watch_set.record_failure(&key, &self.backoff, now_ms);
            }
            Err(SettleError::Ledger(err)) if err.is_transient() => {
                warn!(position = %key, %err, "settlement attempt failed; backing off");
                self.watch_set.record_failure(&key, &self.backoff, now_ms);
            }
            Err(SettleError::Ledger(err)) => {
                error!(position = %key, %err, "settlement failed fatally; removing from watch set");
                self.watch_set.retire(&key);
            }
        }
    }
}
