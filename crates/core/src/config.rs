use crate::trigger::TriggerPolicy;
use serde::{Deserialize, Serialize};

/// Static configuration supplied at process start. No persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperConfig {
    pub rpc: RpcConfig,
    pub ledger: LedgerConfig,
    pub oracle: OracleConfig,
    pub keeper: LoopConfig,
    #[serde(default)]
    pub trigger: TriggerPolicy,
    /// Traders and instruments to watch.
    #[serde(default)]
    pub watch: Vec<WatchTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    pub chain_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Hex address of the ledger contract.
    pub address: String,
    /// Quote currency all instruments are priced in (derived-price cross
    /// checks use it as the quote leg).
    pub quote_currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Ceiling on aggregator reads per second across all instruments.
    pub max_reads_per_second: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    pub poll_interval_secs: u64,
    /// Quotes older than this are skipped for the tick.
    pub freshness_budget_secs: u64,
    pub backoff_initial_ms: u64,
    pub backoff_cap_ms: u64,
    /// Warn when the oracle price and the ledger's derived price diverge by
    /// more than this many basis points. None disables the cross-check.
    pub cross_check_tolerance_bps: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchTarget {
    pub trader: String,
    pub instruments: Vec<String>,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                url: "http://127.0.0.1:8545".to_string(),
                chain_id: None,
            },
            ledger: LedgerConfig {
                address: "0x0000000000000000000000000000000000000000".to_string(),
                quote_currency: "USD".to_string(),
            },
            oracle: OracleConfig {
                max_reads_per_second: 10,
            },
            keeper: LoopConfig {
                poll_interval_secs: 10,
                freshness_budget_secs: 120,
                backoff_initial_ms: 2_000,
                backoff_cap_ms: 60_000,
                cross_check_tolerance_bps: Some(50),
            },
            trigger: TriggerPolicy::default(),
            watch: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_trigger_policy_is_inequality() {
        let config = KeeperConfig::default();
        assert_eq!(config.trigger, TriggerPolicy::Inequality);
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = KeeperConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: KeeperConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.keeper.poll_interval_secs, 10);
        assert_eq!(back.ledger.quote_currency, "USD");
    }
}
