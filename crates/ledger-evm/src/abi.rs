//! Static ABI fragments for the ledger contract and the Chainlink-style
//! aggregator feeds, plus the raw tuple shape positions decode into.

use ethers::contract::EthAbiType;
use ethers::types::{Address, U256};

/// External surface of the ledger contract consumed by the keeper.
pub const LEDGER_ABI: &str = r#"[
  {
    "type": "function",
    "name": "listAllPositions",
    "stateMutability": "view",
    "inputs": [{ "name": "trader", "type": "address" }],
    "outputs": [
      {
        "name": "",
        "type": "tuple[]",
        "components": [
          { "name": "trader", "type": "address" },
          { "name": "instrument", "type": "string" },
          { "name": "isLong", "type": "bool" },
          { "name": "entryPrice", "type": "uint256" },
          { "name": "takeProfitPrice", "type": "uint256" },
          { "name": "stopLossPrice", "type": "uint256" },
          { "name": "size", "type": "uint256" },
          { "name": "margin", "type": "uint256" },
          { "name": "leverage", "type": "uint256" },
          { "name": "isOpen", "type": "bool" },
          { "name": "globalId", "type": "uint256" }
        ]
      }
    ]
  },
  {
    "type": "function",
    "name": "listOpenPositionIds",
    "stateMutability": "view",
    "inputs": [
      { "name": "trader", "type": "address" },
      { "name": "instrument", "type": "string" }
    ],
    "outputs": [{ "name": "", "type": "uint256[]" }]
  },
  {
    "type": "function",
    "name": "getDerivedPrice",
    "stateMutability": "view",
    "inputs": [
      { "name": "base", "type": "string" },
      { "name": "quote", "type": "string" }
    ],
    "outputs": [{ "name": "", "type": "uint256" }]
  },
  {
    "type": "function",
    "name": "getInstrumentPriceFeedAddress",
    "stateMutability": "view",
    "inputs": [{ "name": "instrument", "type": "string" }],
    "outputs": [{ "name": "", "type": "address" }]
  },
  {
    "type": "function",
    "name": "settle",
    "stateMutability": "nonpayable",
    "inputs": [
      { "name": "index", "type": "uint256" },
      { "name": "priceBound", "type": "uint256" }
    ],
    "outputs": []
  },
  {
    "type": "function",
    "name": "checkAndSettleIfTriggered",
    "stateMutability": "nonpayable",
    "inputs": [{ "name": "index", "type": "uint256" }],
    "outputs": []
  }
]"#;

/// Chainlink AggregatorV3-compatible read surface.
pub const AGGREGATOR_ABI: &str = r#"[
  {
    "type": "function",
    "name": "decimals",
    "stateMutability": "view",
    "inputs": [],
    "outputs": [{ "name": "", "type": "uint8" }]
  },
  {
    "type": "function",
    "name": "latestRoundData",
    "stateMutability": "view",
    "inputs": [],
    "outputs": [
      { "name": "roundId", "type": "uint80" },
      { "name": "answer", "type": "int256" },
      { "name": "startedAt", "type": "uint256" },
      { "name": "updatedAt", "type": "uint256" },
      { "name": "answeredInRound", "type": "uint80" }
    ]
  }
]"#;

/// Position tuple as the ledger returns it. Field order must match the
/// `listAllPositions` output components.
#[derive(Clone, Debug, EthAbiType)]
pub struct RawPosition {
    pub trader: Address,
    pub instrument: String,
    pub is_long: bool,
    pub entry_price: U256,
    pub take_profit_price: U256,
    pub stop_loss_price: U256,
    pub size: U256,
    pub margin: U256,
    pub leverage: U256,
    pub is_open: bool,
    pub global_id: U256,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::Abi;

    #[test]
    fn abi_fragments_parse() {
        let ledger: Abi = serde_json::from_str(LEDGER_ABI).unwrap();
        assert!(ledger.function("listAllPositions").is_ok());
        assert!(ledger.function("settle").is_ok());
        assert!(ledger.function("checkAndSettleIfTriggered").is_ok());

        let aggregator: Abi = serde_json::from_str(AGGREGATOR_ABI).unwrap();
        assert!(aggregator.function("latestRoundData").is_ok());
    }
}
