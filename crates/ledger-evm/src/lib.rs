pub mod abi;
pub mod client;
pub mod oracle;
pub mod revert;
pub mod wallet;

pub use client::EvmLedgerClient;
pub use oracle::ChainlinkOracleClient;
pub use revert::classify_reason;
