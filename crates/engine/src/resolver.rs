//! Settlement-index disambiguation. The endpoint may expect the per-trader
//! local index or the ledger-global identifier; no fixed rule is assumed.
//! Candidates are dry-run probed in order and the accepted index is
//! memoized per position identity.

use std::collections::HashMap;
use std::sync::Arc;
use synth_keeper_core::{
    IndexSource, LedgerClient, LedgerError, Position, PositionKey, RevertClass, SettlementIndex,
    SimulationOutcome,
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ResolveError {
    /// Every candidate was rejected as an invalid index. Surfaced for
    /// operator attention; the position is not settled on a guess.
    #[error("all settlement index candidates exhausted for {position}")]
    Unresolved { position: PositionKey },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub struct IndexResolver {
    ledger: Arc<dyn LedgerClient>,
    resolved: HashMap<PositionKey, SettlementIndex>,
}

impl IndexResolver {
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            ledger,
            resolved: HashMap::new(),
        }
    }

    /// Discovers which index value the settlement endpoint accepts for this
    /// position, probing with non-mutating simulations.
    ///
    /// The local index is accepted when its dry-run succeeds or reverts in a
    /// way that proves the address is valid (condition not met, already
    /// closed). The global identifier is then accepted unless it reverts as
    /// an invalid index. Transport failures propagate without consuming a
    /// candidate.
    ///
    /// # Errors
    /// `Unresolved` when every candidate is rejected; `Ledger` on transport
    /// or authorization failure.
    pub async fn resolve(
        &mut self,
        position: &Position,
        price_bound: u128,
    ) -> Result<SettlementIndex, ResolveError> {
        let key = position.key();
        if let Some(index) = self.resolved.get(&key) {
            return Ok(*index);
        }

        let mut candidates = vec![SettlementIndex {
            value: position.local_index,
            source: IndexSource::Local,
        }];
        if position.global_id != position.local_index {
            candidates.push(SettlementIndex {
                value: position.global_id,
                source: IndexSource::Global,
            });
        }

        for candidate in candidates {
            let outcome = self.ledger.simulate_settle(candidate.value, price_bound).await?;
            let accepted = match outcome {
                SimulationOutcome::Ok => true,
                SimulationOutcome::Revert(RevertClass::NotTriggered)
                | SimulationOutcome::Revert(RevertClass::AlreadyClosed) => true,
                SimulationOutcome::Revert(RevertClass::InvalidIndex) => {
                    debug!(position = %key, index = %candidate, "candidate rejected as invalid index");
                    false
                }
                SimulationOutcome::Revert(RevertClass::Unauthorized) => {
                    return Err(ResolveError::Ledger(LedgerError::Unauthorized(format!(
                        "settlement simulation for {key}"
                    ))));
                }
                SimulationOutcome::Revert(RevertClass::Other(ref reason)) => {
                    // An unrecognized revert does not prove the primary
                    // (local) guess right; for the fallback it is accepted
                    // as "not an invalid index".
                    debug!(position = %key, index = %candidate, reason, "ambiguous revert during probe");
                    candidate.source == IndexSource::Global
                }
            };
            if accepted {
                info!(position = %key, index = %candidate, "settlement index resolved");
                self.resolved.insert(key, candidate);
                return Ok(candidate);
            }
        }

        Err(ResolveError::Unresolved { position: key })
    }

    /// Drops a memoized index, e.g. after the ledger rejects it because the
    /// trader's history grew and local indices shifted.
    pub fn forget(&mut self, key: &PositionKey) {
        self.resolved.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{IndexSpace, MockLedger};
    use synth_keeper_core::Direction;

    fn position() -> Position {
        Position {
            trader: "0xabc".to_string(),
            instrument: "GBP".to_string(),
            direction: Direction::Long,
            entry_price: 136_000_000,
            take_profit_price: 136_200_000,
            stop_loss_price: 0,
            size: 10_u128.pow(18),
            margin: 10_u128.pow(17),
            leverage: 10 * 10_u128.pow(18),
            is_open: true,
            local_index: 0,
            global_id: 7,
        }
    }

    #[tokio::test]
    async fn local_index_accepted_when_condition_not_met() {
        let ledger = Arc::new(MockLedger::new());
        ledger.add_open_position(position());
        ledger.set_price("GBP", 136_100_000); // below TP: simulation reverts NotTriggered

        let mut resolver = IndexResolver::new(ledger);
        let index = resolver.resolve(&position(), 0).await.unwrap();
        assert_eq!(index.value, 0);
        assert_eq!(index.source, IndexSource::Local);
    }

    #[tokio::test]
    async fn falls_through_to_global_id() {
        let ledger = Arc::new(MockLedger::new());
        ledger.add_open_position(position());
        ledger.set_price("GBP", 136_100_000);
        ledger.with_state(|state| state.index_space = IndexSpace::Global);

        let mut resolver = IndexResolver::new(ledger);
        let index = resolver.resolve(&position(), 0).await.unwrap();
        assert_eq!(index.value, 7);
        assert_eq!(index.source, IndexSource::Global);
    }

    #[tokio::test]
    async fn unresolved_when_all_candidates_rejected() {
        let ledger = Arc::new(MockLedger::new());
        // No positions registered: every index is invalid.
        let mut resolver = IndexResolver::new(ledger);
        let err = resolver.resolve(&position(), 0).await.unwrap_err();
        assert!(matches!(err, ResolveError::Unresolved { .. }));
    }

    #[tokio::test]
    async fn resolution_is_memoized() {
        let ledger = Arc::new(MockLedger::new());
        ledger.add_open_position(position());
        ledger.set_price("GBP", 136_100_000);

        let mut resolver = IndexResolver::new(Arc::clone(&ledger) as Arc<dyn LedgerClient>);
        resolver.resolve(&position(), 0).await.unwrap();
        let probes_after_first = ledger.with_state(|state| state.simulate_calls);
        resolver.resolve(&position(), 0).await.unwrap();
        let probes_after_second = ledger.with_state(|state| state.simulate_calls);
        assert_eq!(probes_after_first, probes_after_second);
    }
}
