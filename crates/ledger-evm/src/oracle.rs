//! Chainlink-style feed reader. Feed addresses are discovered through the
//! ledger contract and cached together with each feed's decimal count;
//! only `latestRoundData` is re-read every poll.

use crate::abi::{AGGREGATOR_ABI, LEDGER_ABI};
use anyhow::{Context, Result};
use ethers::abi::Abi;
use ethers::contract::Contract;
use ethers::providers::{Http, Provider};
use ethers::types::{Address, I256, U256};
use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use synth_keeper_core::config::{LedgerConfig, OracleConfig, RpcConfig};
use synth_keeper_core::{OracleClient, OracleError, PriceQuote};
use tokio::sync::RwLock;

#[derive(Clone, Copy)]
struct FeedHandle {
    address: Address,
    decimals: u8,
}

/// Read-only oracle client over the configured RPC endpoint.
pub struct ChainlinkOracleClient {
    ledger: Contract<Provider<Http>>,
    provider: Arc<Provider<Http>>,
    aggregator_abi: Abi,
    feeds: RwLock<HashMap<String, FeedHandle>>,
    rate_limiter:
        Arc<RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>>,
}

impl ChainlinkOracleClient {
    /// Connects the feed reader to the RPC endpoint and the ledger's feed
    /// directory.
    ///
    /// # Errors
    /// Returns an error on a malformed RPC URL, ledger address, or a zero
    /// rate limit.
    pub fn connect(rpc: &RpcConfig, ledger: &LedgerConfig, oracle: &OracleConfig) -> Result<Self> {
        let provider = Arc::new(
            Provider::<Http>::try_from(rpc.url.as_str()).context("invalid RPC endpoint URL")?,
        );
        let ledger_abi: Abi =
            serde_json::from_str(LEDGER_ABI).context("failed to parse ledger ABI")?;
        let aggregator_abi: Abi =
            serde_json::from_str(AGGREGATOR_ABI).context("failed to parse aggregator ABI")?;
        let address: Address = ledger
            .address
            .parse()
            .context("invalid ledger contract address")?;
        let per_second = NonZeroU32::new(oracle.max_reads_per_second)
            .context("oracle.max_reads_per_second must be nonzero")?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            ledger: Contract::new(address, ledger_abi, Arc::clone(&provider)),
            provider,
            aggregator_abi,
            feeds: RwLock::new(HashMap::new()),
            rate_limiter,
        })
    }

    async fn feed_handle(&self, instrument: &str) -> Result<FeedHandle, OracleError> {
        if let Some(handle) = self.feeds.read().await.get(instrument) {
            return Ok(*handle);
        }

        let address: Address = self
            .ledger
            .method::<_, Address>("getInstrumentPriceFeedAddress", instrument.to_string())
            .map_err(|e| OracleError::Transport(e.to_string()))?
            .call()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        if address == Address::zero() {
            return Err(OracleError::FeedUnavailable(instrument.to_string()));
        }

        let aggregator = Contract::new(
            address,
            self.aggregator_abi.clone(),
            Arc::clone(&self.provider),
        );
        let decimals: u8 = aggregator
            .method::<_, u8>("decimals", ())
            .map_err(|e| OracleError::Transport(e.to_string()))?
            .call()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let handle = FeedHandle { address, decimals };
        self.feeds
            .write()
            .await
            .insert(instrument.to_string(), handle);
        tracing::debug!(instrument, feed = ?address, decimals, "resolved price feed");
        Ok(handle)
    }
}

#[async_trait::async_trait]
impl OracleClient for ChainlinkOracleClient {
    async fn read_quote(&self, instrument: &str) -> Result<PriceQuote, OracleError> {
        self.rate_limiter.until_ready().await;
        let handle = self.feed_handle(instrument).await?;

        let aggregator = Contract::new(
            handle.address,
            self.aggregator_abi.clone(),
            Arc::clone(&self.provider),
        );
        let (_round_id, answer, _started_at, updated_at, _answered_in): (
            U256,
            I256,
            U256,
            U256,
            U256,
        ) = aggregator
            .method::<_, (U256, I256, U256, U256, U256)>("latestRoundData", ())
            .map_err(|e| OracleError::Transport(e.to_string()))?
            .call()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        if answer.is_negative() {
            return Err(OracleError::MalformedAnswer {
                instrument: instrument.to_string(),
                detail: format!("negative answer {answer}"),
            });
        }
        let raw = answer.into_raw();
        if raw.bits() > 128 {
            return Err(OracleError::MalformedAnswer {
                instrument: instrument.to_string(),
                detail: "answer exceeds u128".to_string(),
            });
        }
        if updated_at > U256::from(i64::MAX as u64) {
            return Err(OracleError::MalformedAnswer {
                instrument: instrument.to_string(),
                detail: "updatedAt out of range".to_string(),
            });
        }

        Ok(PriceQuote {
            instrument: instrument.to_string(),
            raw_answer: raw.as_u128(),
            decimals: handle.decimals,
            observed_at: updated_at.as_u64() as i64,
        })
    }
}
