//! Settlement submission: simulate first, commit only on simulated success,
//! and report success only after confirmation. The ledger's self-evaluating
//! entry point is preferred when the deployment exposes it.

use std::sync::Arc;
use synth_keeper_core::{
    Direction, LedgerClient, LedgerError, Position, RevertClass, SettlementIndex,
    SettlementReceipt, SimulationOutcome,
};
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

/// The direction-sensitive guard argument of the settlement call: a long
/// close is an implicit sell guarded by a floor, so the lowest legal value
/// is the most permissive; a short close is an implicit buy guarded by a
/// ceiling, so the highest. This mapping is a hard contract of the
/// settlement endpoint and must not be reversed.
#[must_use]
pub const fn permissive_price_bound(direction: Direction) -> u128 {
    match direction {
        Direction::Long => 0,
        Direction::Short => u128::MAX,
    }
}

#[derive(Debug, Error)]
pub enum SettleError {
    /// The ledger disagrees that the condition is met. Expected most ticks;
    /// not an error condition, just no action.
    #[error("condition not yet met")]
    NotTriggered,
    /// The position is already settled on the ledger.
    #[error("position already closed")]
    AlreadyClosed,
    /// The dry-run reverted for a decisive reason.
    #[error("settlement rejected: {0}")]
    Rejected(RevertClass),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub struct SettlementSubmitter {
    ledger: Arc<dyn LedgerClient>,
    /// One in-flight mutating call per signing identity; the submitter is
    /// constructed per identity, so this mutex is that identity's lock.
    submission_lock: Mutex<()>,
    prefer_self_check: OnceCell<bool>,
}

impl SettlementSubmitter {
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            ledger,
            submission_lock: Mutex::new(()),
            prefer_self_check: OnceCell::new(),
        }
    }

    async fn use_self_check(&self) -> Result<bool, LedgerError> {
        self.prefer_self_check
            .get_or_try_init(|| async {
                let supported = self.ledger.supports_check_and_settle().await?;
                if supported {
                    info!("ledger exposes checkAndSettleIfTriggered; using self-evaluating settlement");
                }
                Ok(supported)
            })
            .await
            .copied()
    }

    /// Simulates and, on simulated success, submits the settlement for a
    /// position, waiting for confirmation.
    ///
    /// # Errors
    /// `NotTriggered` and `AlreadyClosed` are expected outcomes, not
    /// failures; `Rejected` carries the decisive revert class; `Ledger`
    /// wraps transport and submission failures.
    pub async fn settle(
        &self,
        position: &Position,
        index: SettlementIndex,
    ) -> Result<SettlementReceipt, SettleError> {
        // Never resubmit once the position has been observed closed.
        if !position.is_open {
            return Err(SettleError::AlreadyClosed);
        }

        let self_check = self.use_self_check().await?;
        let bound = permissive_price_bound(position.direction);

        let outcome = if self_check {
            self.ledger.simulate_check_and_settle(index.value).await?
        } else {
            self.ledger.simulate_settle(index.value, bound).await?
        };
        match outcome {
            SimulationOutcome::Ok => {}
            SimulationOutcome::Revert(RevertClass::NotTriggered) => {
                return Err(SettleError::NotTriggered)
            }
            SimulationOutcome::Revert(RevertClass::AlreadyClosed) => {
                return Err(SettleError::AlreadyClosed)
            }
            SimulationOutcome::Revert(class) => return Err(SettleError::Rejected(class)),
        }

        debug!(position = %position.key(), %index, "simulation succeeded; submitting");
        let _guard = self.submission_lock.lock().await;
        let receipt = if self_check {
            self.ledger.submit_check_and_settle(index.value).await?
        } else {
            self.ledger.submit_settle(index.value, bound).await?
        };
        info!(
            position = %position.key(),
            tx = %receipt.tx_hash,
            block = receipt.block_number,
            "settlement confirmed"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLedger;
    use synth_keeper_core::IndexSource;

    fn position(direction: Direction) -> Position {
        let (tp, sl) = match direction {
            Direction::Long => (136_200_000, 0),
            Direction::Short => (135_800_000, 0),
        };
        Position {
            trader: "0xabc".to_string(),
            instrument: "GBP".to_string(),
            direction,
            entry_price: 136_000_000,
            take_profit_price: tp,
            stop_loss_price: sl,
            size: 10_u128.pow(18),
            margin: 10_u128.pow(17),
            leverage: 10 * 10_u128.pow(18),
            is_open: true,
            local_index: 0,
            global_id: 7,
        }
    }

    const LOCAL: SettlementIndex = SettlementIndex {
        value: 0,
        source: IndexSource::Local,
    };

    #[tokio::test]
    async fn permissive_bounds_follow_direction() {
        assert_eq!(permissive_price_bound(Direction::Long), 0);
        assert_eq!(permissive_price_bound(Direction::Short), u128::MAX);

        // The mock ledger enforces the floor/ceiling semantics; a triggered
        // settlement must not be rejected because of the bound we chose.
        for direction in [Direction::Long, Direction::Short] {
            let ledger = Arc::new(MockLedger::new());
            let position = position(direction);
            ledger.add_open_position(position.clone());
            let trigger_price = match direction {
                Direction::Long => 136_250_000,
                Direction::Short => 135_750_000,
            };
            ledger.set_price("GBP", trigger_price);

            let submitter = SettlementSubmitter::new(Arc::clone(&ledger) as Arc<dyn LedgerClient>);
            submitter.settle(&position, LOCAL).await.unwrap();
            assert_eq!(ledger.with_state(|state| state.submit_calls), 1);
        }
    }

    #[tokio::test]
    async fn no_submission_without_simulated_success() {
        let ledger = Arc::new(MockLedger::new());
        let position = position(Direction::Long);
        ledger.add_open_position(position.clone());
        ledger.set_price("GBP", 136_100_000); // below TP

        let submitter = SettlementSubmitter::new(Arc::clone(&ledger) as Arc<dyn LedgerClient>);
        let err = submitter.settle(&position, LOCAL).await.unwrap_err();
        assert!(matches!(err, SettleError::NotTriggered));
        assert_eq!(ledger.with_state(|state| state.submit_calls), 0);
    }

    #[tokio::test]
    async fn closed_position_is_never_resubmitted() {
        let ledger = Arc::new(MockLedger::new());
        let mut position = position(Direction::Long);
        ledger.add_open_position(position.clone());
        ledger.set_price("GBP", 136_250_000);
        position.is_open = false;

        let submitter = SettlementSubmitter::new(Arc::clone(&ledger) as Arc<dyn LedgerClient>);
        let err = submitter.settle(&position, LOCAL).await.unwrap_err();
        assert!(matches!(err, SettleError::AlreadyClosed));
        assert_eq!(ledger.with_state(|state| state.simulate_calls), 0);
        assert_eq!(ledger.with_state(|state| state.submit_calls), 0);
    }

    #[tokio::test]
    async fn self_evaluating_entry_point_preferred_when_available() {
        let ledger = Arc::new(MockLedger::new());
        let position = position(Direction::Long);
        ledger.add_open_position(position.clone());
        ledger.set_price("GBP", 136_250_000);
        ledger.with_state(|state| state.check_and_settle = true);

        let submitter = SettlementSubmitter::new(Arc::clone(&ledger) as Arc<dyn LedgerClient>);
        submitter.settle(&position, LOCAL).await.unwrap();
        // No bound is passed through the self-evaluating entry point.
        assert!(ledger.with_state(|state| state.submitted_bounds.is_empty()));
    }
}
