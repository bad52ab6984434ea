//! Open-position enumeration. Two upstream views are combined: the full
//! per-trader history and the authoritative open-id set. A position is
//! reported only when both views agree it is open, which keeps a
//! just-closed position from reappearing while the history view lags.

use std::collections::HashSet;
use std::sync::Arc;
use synth_keeper_core::{LedgerClient, LedgerError, Position};
use tracing::debug;

pub struct PositionRegistry {
    ledger: Arc<dyn LedgerClient>,
}

impl PositionRegistry {
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// Open positions for a trader and instrument, present in both views.
    ///
    /// # Errors
    /// `RegistryUnavailable` on upstream read failure; callers treat it as
    /// transient and retry next tick, never as "no positions".
    pub async fn list_open(
        &self,
        trader: &str,
        instrument: &str,
    ) -> Result<Vec<Position>, LedgerError> {
        let all = self.ledger.list_all_positions(trader).await?;
        let open_ids: HashSet<u64> = self
            .ledger
            .list_open_position_ids(trader, instrument)
            .await?
            .into_iter()
            .collect();

        let mut open = Vec::new();
        for position in all {
            if position.instrument != instrument {
                continue;
            }
            // The open-id set's addressing scheme is ambiguous (local vs.
            // global), so membership of either id counts.
            let in_open_set =
                open_ids.contains(&position.local_index) || open_ids.contains(&position.global_id);
            if position.is_open && in_open_set {
                open.push(position);
            } else if position.is_open != in_open_set {
                debug!(
                    position = %position.key(),
                    history_open = position.is_open,
                    in_open_set,
                    "views disagree; dropping position this tick"
                );
            }
        }
        Ok(open)
    }
}
