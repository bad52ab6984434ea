//! Pure trigger evaluation. Prices are compared as feed-unit integers of the
//! same instrument and decimal count; callers convert before calling in.

use crate::position::{Direction, Position, TriggerDecision};
use serde::{Deserialize, Serialize};

/// Comparison policy for threshold checks.
///
/// `Inequality` is the default and the monotonically-correct choice.
/// `BufferedEquality` widens each threshold by a fixed number of feed-unit
/// ticks for endpoints that require a near-exact match; it must be chosen
/// explicitly in configuration, never silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TriggerPolicy {
    Inequality,
    BufferedEquality { tick_buffer: u128 },
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self::Inequality
    }
}

impl TriggerPolicy {
    const fn buffer(self) -> u128 {
        match self {
            Self::Inequality => 0,
            Self::BufferedEquality { tick_buffer } => tick_buffer,
        }
    }
}

/// Decides whether `current_feed_price` crosses the position's thresholds.
///
/// An unset threshold (zero sentinel) never triggers. When a gapped move
/// satisfies both thresholds at once, take-profit wins: the trader's stated
/// intent to lock in profit takes precedence over loss mitigation.
#[must_use]
pub fn evaluate(
    position: &Position,
    current_feed_price: u128,
    policy: TriggerPolicy,
) -> TriggerDecision {
    let tp = position.take_profit_price;
    let sl = position.stop_loss_price;
    let buffer = policy.buffer();

    match position.direction {
        Direction::Long => {
            if tp != 0 && current_feed_price >= tp.saturating_sub(buffer) {
                return TriggerDecision::TakeProfit;
            }
            if sl != 0 && current_feed_price <= sl.saturating_add(buffer) {
                return TriggerDecision::StopLoss;
            }
        }
        Direction::Short => {
            if tp != 0 && current_feed_price <= tp.saturating_add(buffer) {
                return TriggerDecision::TakeProfit;
            }
            if sl != 0 && current_feed_price >= sl.saturating_sub(buffer) {
                return TriggerDecision::StopLoss;
            }
        }
    }
    TriggerDecision::None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_position() -> Position {
        Position {
            trader: "0xabc".to_string(),
            instrument: "EUR".to_string(),
            direction: Direction::Long,
            entry_price: 108_500_000,  // 1.0850 at 8 decimals
            take_profit_price: 109_000_000, // 1.0900
            stop_loss_price: 108_000_000,   // 1.0800
            size: 10_u128.pow(18),
            margin: 10_u128.pow(17),
            leverage: 10 * 10_u128.pow(18),
            is_open: true,
            local_index: 0,
            global_id: 1,
        }
    }

    fn short_position() -> Position {
        let mut position = long_position();
        position.direction = Direction::Short;
        position.take_profit_price = 108_000_000;
        position.stop_loss_price = 109_000_000;
        position
    }

    #[test]
    fn long_take_profit_on_price_above_threshold() {
        let decision = evaluate(&long_position(), 109_010_000, TriggerPolicy::Inequality);
        assert_eq!(decision, TriggerDecision::TakeProfit);
    }

    #[test]
    fn long_stop_loss_on_price_below_threshold() {
        let decision = evaluate(&long_position(), 107_990_000, TriggerPolicy::Inequality);
        assert_eq!(decision, TriggerDecision::StopLoss);
    }

    #[test]
    fn long_no_trigger_between_thresholds() {
        let decision = evaluate(&long_position(), 108_500_000, TriggerPolicy::Inequality);
        assert_eq!(decision, TriggerDecision::None);
    }

    #[test]
    fn thresholds_trigger_on_exact_touch() {
        assert_eq!(
            evaluate(&long_position(), 109_000_000, TriggerPolicy::Inequality),
            TriggerDecision::TakeProfit
        );
        assert_eq!(
            evaluate(&long_position(), 108_000_000, TriggerPolicy::Inequality),
            TriggerDecision::StopLoss
        );
    }

    #[test]
    fn short_case_mirrors_long() {
        let position = short_position();
        assert_eq!(
            evaluate(&position, 107_990_000, TriggerPolicy::Inequality),
            TriggerDecision::TakeProfit
        );
        assert_eq!(
            evaluate(&position, 109_010_000, TriggerPolicy::Inequality),
            TriggerDecision::StopLoss
        );
        assert_eq!(
            evaluate(&position, 108_500_000, TriggerPolicy::Inequality),
            TriggerDecision::None
        );
    }

    #[test]
    fn unset_thresholds_never_trigger() {
        let mut position = long_position();
        position.take_profit_price = 0;
        position.stop_loss_price = 0;
        assert_eq!(
            evaluate(&position, u128::MAX, TriggerPolicy::Inequality),
            TriggerDecision::None
        );
        assert_eq!(evaluate(&position, 1, TriggerPolicy::Inequality), TriggerDecision::None);
    }

    #[test]
    fn take_profit_wins_when_both_sides_satisfied() {
        // Degenerate gapped-move setup: thresholds inverted so one price
        // satisfies both. TP must take priority.
        let mut position = long_position();
        position.take_profit_price = 108_000_000;
        position.stop_loss_price = 109_000_000;
        assert_eq!(
            evaluate(&position, 108_500_000, TriggerPolicy::Inequality),
            TriggerDecision::TakeProfit
        );
    }

    #[test]
    fn buffered_equality_widens_thresholds() {
        let policy = TriggerPolicy::BufferedEquality { tick_buffer: 10_000 };
        // 1.08991: inside the buffer below TP
        assert_eq!(
            evaluate(&long_position(), 108_991_000, policy),
            TriggerDecision::TakeProfit
        );
        // Still below the buffered threshold
        assert_eq!(
            evaluate(&long_position(), 108_980_000, policy),
            TriggerDecision::None
        );
    }
}
