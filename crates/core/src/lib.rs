pub mod config;
pub mod config_loader;
pub mod convert;
pub mod errors;
pub mod position;
pub mod traits;
pub mod trigger;

pub use config::{KeeperConfig, LedgerConfig, LoopConfig, OracleConfig, RpcConfig, WatchTarget};
pub use config_loader::ConfigLoader;
pub use errors::{LedgerError, OracleError, RevertClass, SimulationOutcome};
pub use position::{
    Direction, IndexSource, Position, PositionKey, PriceQuote, SettlementIndex,
    SettlementReceipt, TriggerDecision,
};
pub use traits::{LedgerClient, OracleClient};
pub use trigger::TriggerPolicy;
