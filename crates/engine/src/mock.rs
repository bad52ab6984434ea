//! In-memory stand-ins for the ledger and oracle clients. They implement
//! the production traits against a mutable state snapshot, mirroring a
//! ledger that checks addressing, open state, trigger condition, and the
//! direction-sensitive price bound in that order.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use synth_keeper_core::convert::feed_to_ledger;
use synth_keeper_core::trigger::{self, TriggerPolicy};
use synth_keeper_core::{
    Direction, LedgerClient, LedgerError, OracleClient, OracleError, Position, PriceQuote,
    RevertClass, SettlementReceipt, SimulationOutcome, TriggerDecision,
};

/// Which index value the mock's settlement endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSpace {
    Local,
    Global,
}

#[derive(Debug)]
pub struct MockLedgerState {
    pub positions: Vec<Position>,
    /// Authoritative open set per (trader, instrument); values are local
    /// indices.
    pub open_ids: HashMap<(String, String), Vec<u64>>,
    pub index_space: IndexSpace,
    /// Current feed price per instrument, used when evaluating settlement
    /// calls server-side.
    pub feed_prices: HashMap<String, u128>,
    pub feed_decimals: u8,
    pub check_and_settle: bool,
    pub fail_reads: bool,
    pub simulate_calls: u32,
    pub submit_calls: u32,
    pub submitted_bounds: Vec<u128>,
    next_block: u64,
}

impl Default for MockLedgerState {
    fn default() -> Self {
        Self {
            positions: Vec::new(),
            open_ids: HashMap::new(),
            index_space: IndexSpace::Local,
            feed_prices: HashMap::new(),
            feed_decimals: 8,
            check_and_settle: false,
            fail_reads: false,
            simulate_calls: 0,
            submit_calls: 0,
            submitted_bounds: Vec::new(),
            next_block: 1,
        }
    }
}

impl MockLedgerState {
    fn find(&self, index: u64) -> Option<usize> {
        self.positions.iter().position(|p| match self.index_space {
            IndexSpace::Local => p.local_index == index,
            IndexSpace::Global => p.global_id == index,
        })
    }

    /// Ledger-side settlement evaluation: addressing, open state, trigger
    /// condition, then the bound check (floor for a long close, ceiling for
    /// a short close).
    fn evaluate(&self, index: u64, price_bound: Option<u128>) -> SimulationOutcome {
        let Some(slot) = self.find(index) else {
            return SimulationOutcome::Revert(RevertClass::InvalidIndex);
        };
        let position = &self.positions[slot];
        if !position.is_open {
            return SimulationOutcome::Revert(RevertClass::AlreadyClosed);
        }
        let Some(&price) = self.feed_prices.get(&position.instrument) else {
            return SimulationOutcome::Revert(RevertClass::Other("no price".to_string()));
        };
        if trigger::evaluate(position, price, TriggerPolicy::Inequality) == TriggerDecision::None {
            return SimulationOutcome::Revert(RevertClass::NotTriggered);
        }
        if let Some(bound) = price_bound {
            let Ok(realized) = feed_to_ledger(price, self.feed_decimals) else {
                return SimulationOutcome::Revert(RevertClass::Other("price overflow".to_string()));
            };
            let bound_ok = match position.direction {
                Direction::Long => realized >= bound,
                Direction::Short => realized <= bound,
            };
            if !bound_ok {
                return SimulationOutcome::Revert(RevertClass::Other(
                    "price bound rejected".to_string(),
                ));
            }
        }
        SimulationOutcome::Ok
    }

    fn close(&mut self, index: u64) {
        if let Some(slot) = self.find(index) {
            let (trader, instrument, local_index) = {
                let position = &mut self.positions[slot];
                position.is_open = false;
                (
                    position.trader.clone(),
                    position.instrument.clone(),
                    position.local_index,
                )
            };
            if let Some(ids) = self.open_ids.get_mut(&(trader, instrument)) {
                ids.retain(|&id| id != local_index);
            }
        }
    }
}

pub struct MockLedger {
    state: Mutex<MockLedgerState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockLedgerState::default()),
        }
    }

    /// Runs `f` against the mutable mock state.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut MockLedgerState) -> R) -> R {
        let mut state = self.state.lock().expect("mock ledger state poisoned");
        f(&mut state)
    }

    /// Registers a position and marks it open in the authoritative set.
    pub fn add_open_position(&self, position: Position) {
        self.with_state(|state| {
            state
                .open_ids
                .entry((position.trader.clone(), position.instrument.clone()))
                .or_default()
                .push(position.local_index);
            state.positions.push(position);
        });
    }

    pub fn set_price(&self, instrument: &str, feed_price: u128) {
        self.with_state(|state| {
            state.feed_prices.insert(instrument.to_string(), feed_price);
        });
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn list_all_positions(&self, trader: &str) -> Result<Vec<Position>, LedgerError> {
        self.with_state(|state| {
            if state.fail_reads {
                return Err(LedgerError::RegistryUnavailable("mock outage".to_string()));
            }
            Ok(state
                .positions
                .iter()
                .filter(|p| p.trader == trader)
                .cloned()
                .collect())
        })
    }

    async fn list_open_position_ids(
        &self,
        trader: &str,
        instrument: &str,
    ) -> Result<Vec<u64>, LedgerError> {
        self.with_state(|state| {
            if state.fail_reads {
                return Err(LedgerError::RegistryUnavailable("mock outage".to_string()));
            }
            Ok(state
                .open_ids
                .get(&(trader.to_string(), instrument.to_string()))
                .cloned()
                .unwrap_or_default())
        })
    }

    async fn get_derived_price(&self, base: &str, _quote: &str) -> Result<u128, LedgerError> {
        self.with_state(|state| {
            let price = state
                .feed_prices
                .get(base)
                .copied()
                .ok_or_else(|| LedgerError::Transport("no derived price".to_string()))?;
            feed_to_ledger(price, state.feed_decimals)
                .map_err(|e| LedgerError::Malformed(e.to_string()))
        })
    }

    async fn supports_check_and_settle(&self) -> Result<bool, LedgerError> {
        Ok(self.with_state(|state| state.check_and_settle))
    }

    async fn simulate_settle(
        &self,
        index: u64,
        price_bound: u128,
    ) -> Result<SimulationOutcome, LedgerError> {
        self.with_state(|state| {
            state.simulate_calls += 1;
            Ok(state.evaluate(index, Some(price_bound)))
        })
    }

    async fn submit_settle(
        &self,
        index: u64,
        price_bound: u128,
    ) -> Result<SettlementReceipt, LedgerError> {
        self.with_state(|state| {
            state.submit_calls += 1;
            state.submitted_bounds.push(price_bound);
            match state.evaluate(index, Some(price_bound)) {
                SimulationOutcome::Ok => {
                    state.close(index);
                    let block = state.next_block;
                    state.next_block += 1;
                    Ok(SettlementReceipt {
                        tx_hash: format!("0xmock{index:04x}{block:04x}"),
                        block_number: block,
                    })
                }
                SimulationOutcome::Revert(class) => {
                    Err(LedgerError::Submission(class.to_string()))
                }
            }
        })
    }

    async fn simulate_check_and_settle(
        &self,
        index: u64,
    ) -> Result<SimulationOutcome, LedgerError> {
        self.with_state(|state| {
            state.simulate_calls += 1;
            if !state.check_and_settle {
                return Ok(SimulationOutcome::Revert(RevertClass::Other(
                    "unspecified revert".to_string(),
                )));
            }
            Ok(state.evaluate(index, None))
        })
    }

    async fn submit_check_and_settle(&self, index: u64) -> Result<SettlementReceipt, LedgerError> {
        self.with_state(|state| {
            if !state.check_and_settle {
                return Err(LedgerError::Submission("unknown entry point".to_string()));
            }
            state.submit_calls += 1;
            match state.evaluate(index, None) {
                SimulationOutcome::Ok => {
                    state.close(index);
                    let block = state.next_block;
                    state.next_block += 1;
                    Ok(SettlementReceipt {
                        tx_hash: format!("0xmock{index:04x}{block:04x}"),
                        block_number: block,
                    })
                }
                SimulationOutcome::Revert(class) => {
                    Err(LedgerError::Submission(class.to_string()))
                }
            }
        })
    }
}

/// In-memory oracle; quotes are set by tests between ticks.
pub struct MockOracle {
    quotes: Mutex<HashMap<String, PriceQuote>>,
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOracle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            quotes: Mutex::new(HashMap::new()),
        }
    }

    /// Sets a fresh quote observed "now".
    pub fn set_price(&self, instrument: &str, raw_answer: u128, decimals: u8) {
        self.set_quote(PriceQuote {
            instrument: instrument.to_string(),
            raw_answer,
            decimals,
            observed_at: Utc::now().timestamp(),
        });
    }

    pub fn set_quote(&self, quote: PriceQuote) {
        self.quotes
            .lock()
            .expect("mock oracle state poisoned")
            .insert(quote.instrument.clone(), quote);
    }
}

#[async_trait]
impl OracleClient for MockOracle {
    async fn read_quote(&self, instrument: &str) -> Result<PriceQuote, OracleError> {
        self.quotes
            .lock()
            .expect("mock oracle state poisoned")
            .get(instrument)
            .cloned()
            .ok_or_else(|| OracleError::FeedUnavailable(instrument.to_string()))
    }
}
