pub mod keeper;
pub mod mock;
pub mod registry;
pub mod resolver;
pub mod submitter;
pub mod watch;

pub use keeper::Keeper;
pub use registry::PositionRegistry;
pub use resolver::{IndexResolver, ResolveError};
pub use submitter::{permissive_price_bound, SettleError, SettlementSubmitter};
pub use watch::{BackoffPolicy, WatchEntry, WatchSet};
