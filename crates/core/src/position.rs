use serde::{Deserialize, Serialize};

/// Trade direction of a leveraged synthetic position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Read-only mirror of a position record owned by the ledger contract.
///
/// Price fields (`entry_price`, `take_profit_price`, `stop_loss_price`) are
/// feed-unit integers scaled by the oracle's decimal count for the
/// instrument; zero means "unset". `size`, `margin` and `leverage` are
/// 1e18-scaled ledger units and are opaque to trigger logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub trader: String,
    pub instrument: String,
    pub direction: Direction,
    pub entry_price: u128,
    pub take_profit_price: u128,
    pub stop_loss_price: u128,
    pub size: u128,
    pub margin: u128,
    pub leverage: u128,
    /// Terminal once false. The keeper treats the true -> false transition
    /// as authoritative and never acts on the position again.
    pub is_open: bool,
    /// Index of this record in the per-trader enumeration. Stable only
    /// until the trader's history grows.
    pub local_index: u64,
    /// Ledger-global identifier carried on the record; candidate for
    /// settlement addressing when the local index is rejected.
    pub global_id: u64,
}

impl Position {
    #[must_use]
    pub fn key(&self) -> PositionKey {
        PositionKey {
            trader: self.trader.clone(),
            instrument: self.instrument.clone(),
            local_index: self.local_index,
            global_id: self.global_id,
        }
    }
}

/// Identity of a position for watch-set and memoization maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub trader: String,
    pub instrument: String,
    pub local_index: u64,
    pub global_id: u64,
}

impl std::fmt::Display for PositionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}#{} (global {})",
            self.trader, self.instrument, self.local_index, self.global_id
        )
    }
}

/// One oracle observation, recomputed each poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub instrument: String,
    /// Feed-unit integer price.
    pub raw_answer: u128,
    pub decimals: u8,
    /// Epoch seconds at which the feed last updated.
    pub observed_at: i64,
}

impl PriceQuote {
    /// Seconds elapsed since the feed last updated, clamped at zero.
    #[must_use]
    pub fn age_seconds(&self, now_epoch_seconds: i64) -> i64 {
        (now_epoch_seconds - self.observed_at).max(0)
    }
}

/// Outcome of evaluating a position against a current price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerDecision {
    None,
    TakeProfit,
    StopLoss,
}

/// Which addressing scheme a resolved settlement index came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexSource {
    Local,
    Global,
}

/// Index value accepted by the settlement endpoint for one position,
/// discovered by dry-run probing and memoized once confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementIndex {
    pub value: u64,
    pub source: IndexSource,
}

impl std::fmt::Display for SettlementIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.source {
            IndexSource::Local => write!(f, "{} (local)", self.value),
            IndexSource::Global => write!(f, "{} (global)", self.value),
        }
    }
}

/// Receipt of a confirmed settlement transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub tx_hash: String,
    pub block_number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_age_is_clamped_at_zero() {
        let quote = PriceQuote {
            instrument: "GBP".to_string(),
            raw_answer: 136_000_000,
            decimals: 8,
            observed_at: 1_700_000_100,
        };
        assert_eq!(quote.age_seconds(1_700_000_130), 30);
        assert_eq!(quote.age_seconds(1_700_000_000), 0);
    }

    #[test]
    fn position_key_identity_includes_both_indices() {
        let mut position = Position {
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
        };
        let key_a = position.key();
        position.global_id = 8;
        assert_ne!(key_a, position.key());
    }
}
