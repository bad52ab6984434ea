//! Client seams the keeper is written against. Concrete implementations
//! (EVM contract clients, in-memory mocks) are injected at construction;
//! nothing in the engine holds global contract state.

use crate::errors::{LedgerError, OracleError, SimulationOutcome};
use crate::position::{Position, PriceQuote, SettlementReceipt};
use async_trait::async_trait;

/// Read/write access to the ledger contract's external surface.
///
/// `price_bound` arguments are 1e18 ledger-domain values; `u128::MAX` means
/// "the highest value the endpoint accepts" and implementations widen it to
/// their native word size.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Full, possibly-stale position history for a trader.
    async fn list_all_positions(&self, trader: &str) -> Result<Vec<Position>, LedgerError>;

    /// Authoritative currently-open index set for a trader and instrument.
    async fn list_open_position_ids(
        &self,
        trader: &str,
        instrument: &str,
    ) -> Result<Vec<u64>, LedgerError>;

    /// Ledger-side derived price, 1e18 domain. Cross-check input only,
    /// never a primary trigger input.
    async fn get_derived_price(&self, base: &str, quote: &str) -> Result<u128, LedgerError>;

    /// Whether the ledger exposes the self-evaluating settlement entry
    /// point. Probed once and cached by implementations.
    async fn supports_check_and_settle(&self) -> Result<bool, LedgerError>;

    /// Non-mutating dry-run of `settle(index, priceBound)`.
    async fn simulate_settle(
        &self,
        index: u64,
        price_bound: u128,
    ) -> Result<SimulationOutcome, LedgerError>;

    /// Mutating `settle(index, priceBound)`; resolves only after the
    /// transaction is confirmed.
    async fn submit_settle(
        &self,
        index: u64,
        price_bound: u128,
    ) -> Result<SettlementReceipt, LedgerError>;

    /// Non-mutating dry-run of `checkAndSettleIfTriggered(index)`.
    async fn simulate_check_and_settle(&self, index: u64)
        -> Result<SimulationOutcome, LedgerError>;

    /// Mutating `checkAndSettleIfTriggered(index)`; confirmation-awaited.
    async fn submit_check_and_settle(&self, index: u64)
        -> Result<SettlementReceipt, LedgerError>;
}

/// Read-only access to an instrument's price feed.
#[async_trait]
pub trait OracleClient: Send + Sync {
    /// Current quote for the instrument. No internal retries; retry policy
    /// belongs to the caller.
    async fn read_quote(&self, instrument: &str) -> Result<PriceQuote, OracleError>;
}
