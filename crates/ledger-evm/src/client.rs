//! Ledger contract client. Read calls go straight to the contract; mutating
//! calls are always available as a dry-run (`eth_call`) first, and real
//! submissions resolve only after the transaction is confirmed.

use crate::abi::{RawPosition, LEDGER_ABI};
use crate::revert::classify_reason;
use anyhow::{Context, Result};
use ethers::contract::{Contract, ContractError};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256, U64};
use std::sync::Arc;
use synth_keeper_core::{
    Direction, LedgerClient, LedgerError, Position, RevertClass, SettlementReceipt,
    SimulationOutcome,
};
use synth_keeper_core::config::{LedgerConfig, RpcConfig};
use tokio::sync::OnceCell;

type LedgerMiddleware = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Signing client for the ledger contract.
pub struct EvmLedgerClient {
    contract: Contract<LedgerMiddleware>,
    sender: Address,
    /// Whether the deployment exposes `checkAndSettleIfTriggered`; probed
    /// once on first use.
    check_and_settle: OnceCell<bool>,
}

impl EvmLedgerClient {
    /// Connects to the RPC endpoint and binds the ledger contract.
    ///
    /// # Errors
    /// Returns an error if the RPC endpoint is unreachable, the chain id
    /// cannot be determined, or the ledger address is malformed.
    pub async fn connect(
        rpc: &RpcConfig,
        ledger: &LedgerConfig,
        wallet: LocalWallet,
    ) -> Result<Self> {
        let provider =
            Provider::<Http>::try_from(rpc.url.as_str()).context("invalid RPC endpoint URL")?;
        let chain_id = match rpc.chain_id {
            Some(id) => id,
            None => provider
                .get_chainid()
                .await
                .context("failed to query chain id")?
                .as_u64(),
        };
        let wallet = wallet.with_chain_id(chain_id);
        let sender = wallet.address();
        let middleware = Arc::new(SignerMiddleware::new(provider, wallet));

        let abi: ethers::abi::Abi =
            serde_json::from_str(LEDGER_ABI).context("failed to parse ledger ABI")?;
        let address: Address = ledger
            .address
            .parse()
            .context("invalid ledger contract address")?;

        Ok(Self {
            contract: Contract::new(address, abi, middleware),
            sender,
            check_and_settle: OnceCell::new(),
        })
    }

    /// Address of the signing identity.
    #[must_use]
    pub const fn sender(&self) -> Address {
        self.sender
    }

    fn method<T, D>(
        &self,
        name: &str,
        args: T,
    ) -> Result<ethers::contract::FunctionCall<Arc<LedgerMiddleware>, LedgerMiddleware, D>, LedgerError>
    where
        T: ethers::abi::Tokenize,
        D: ethers::abi::Detokenize,
    {
        self.contract
            .method::<T, D>(name, args)
            .map_err(|e| LedgerError::Malformed(format!("{name}: {e}")))
    }

    async fn simulate<T>(&self, name: &str, args: T) -> Result<SimulationOutcome, LedgerError>
    where
        T: ethers::abi::Tokenize + Send,
    {
        let call = self.method::<_, ()>(name, args)?.from(self.sender);
        match call.call().await {
            Ok(()) => Ok(SimulationOutcome::Ok),
            Err(err) => classify_contract_error(&err).map(SimulationOutcome::Revert),
        }
    }

    async fn submit<T>(&self, name: &str, args: T) -> Result<SettlementReceipt, LedgerError>
    where
        T: ethers::abi::Tokenize + Send,
    {
        let call = self.method::<_, ()>(name, args)?;
        let pending = call.send().await.map_err(|err| {
            match classify_contract_error(&err) {
                Ok(RevertClass::Unauthorized) => LedgerError::Unauthorized(err.to_string()),
                Ok(class) => LedgerError::Submission(format!("rejected pre-flight: {class}")),
                Err(transport) => transport,
            }
        })?;
        let receipt = pending
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?
            .ok_or_else(|| LedgerError::Submission("transaction dropped from mempool".to_string()))?;
        if receipt.status != Some(U64::from(1)) {
            return Err(LedgerError::Submission(format!(
                "transaction {:#x} reverted on-chain",
                receipt.transaction_hash
            )));
        }
        Ok(SettlementReceipt {
            tx_hash: format!("{:#x}", receipt.transaction_hash),
            block_number: receipt.block_number.map_or(0, |b| b.as_u64()),
        })
    }
}

/// Splits a contract error into a classified revert (decisive) or a
/// transport failure (transient).
fn classify_contract_error(
    err: &ContractError<LedgerMiddleware>,
) -> Result<RevertClass, LedgerError> {
    match err {
        ContractError::Revert(raw) => match err.decode_revert::<String>() {
            Some(reason) => Ok(classify_reason(&reason)),
            None if raw.is_empty() => Ok(RevertClass::Other("unspecified revert".to_string())),
            None => Ok(RevertClass::Other(format!("0x{}", hex::encode(raw)))),
        },
        other => Err(LedgerError::Transport(other.to_string())),
    }
}

/// The settlement endpoint takes a uint256 bound; `u128::MAX` from the
/// engine means "most permissive ceiling" and widens to the full word.
fn widen_bound(price_bound: u128) -> U256 {
    if price_bound == u128::MAX {
        U256::MAX
    } else {
        U256::from(price_bound)
    }
}

fn narrow_u128(value: U256, what: &str) -> Result<u128, LedgerError> {
    if value.bits() <= 128 {
        Ok(value.as_u128())
    } else {
        Err(LedgerError::Malformed(format!("{what} exceeds u128")))
    }
}

fn narrow_u64(value: U256, what: &str) -> Result<u64, LedgerError> {
    if value.bits() <= 64 {
        Ok(value.as_u64())
    } else {
        Err(LedgerError::Malformed(format!("{what} exceeds u64")))
    }
}

fn parse_trader(trader: &str) -> Result<Address, LedgerError> {
    trader
        .parse()
        .map_err(|_| LedgerError::Malformed(format!("bad trader address {trader}")))
}

fn raw_to_position(trader: &str, local_index: u64, raw: RawPosition) -> Result<Position, LedgerError> {
    Ok(Position {
        trader: trader.to_string(),
        instrument: raw.instrument,
        direction: if raw.is_long {
            Direction::Long
        } else {
            Direction::Short
        },
        entry_price: narrow_u128(raw.entry_price, "entryPrice")?,
        take_profit_price: narrow_u128(raw.take_profit_price, "takeProfitPrice")?,
        stop_loss_price: narrow_u128(raw.stop_loss_price, "stopLossPrice")?,
        size: narrow_u128(raw.size, "size")?,
        margin: narrow_u128(raw.margin, "margin")?,
        leverage: narrow_u128(raw.leverage, "leverage")?,
        is_open: raw.is_open,
        local_index,
        global_id: narrow_u64(raw.global_id, "globalId")?,
    })
}

#[async_trait::async_trait]
impl LedgerClient for EvmLedgerClient {
    async fn list_all_positions(&self, trader: &str) -> Result<Vec<Position>, LedgerError> {
        let trader_addr = parse_trader(trader)?;
        let raw: Vec<RawPosition> = self
            .method::<_, Vec<RawPosition>>("listAllPositions", trader_addr)?
            .call()
            .await
            .map_err(|e| LedgerError::RegistryUnavailable(e.to_string()))?;
        raw.into_iter()
            .enumerate()
            .map(|(i, p)| raw_to_position(trader, i as u64, p))
            .collect()
    }

    async fn list_open_position_ids(
        &self,
        trader: &str,
        instrument: &str,
    ) -> Result<Vec<u64>, LedgerError> {
        let trader_addr = parse_trader(trader)?;
        let ids: Vec<U256> = self
            .method::<_, Vec<U256>>(
                "listOpenPositionIds",
                (trader_addr, instrument.to_string()),
            )?
            .call()
            .await
            .map_err(|e| LedgerError::RegistryUnavailable(e.to_string()))?;
        ids.into_iter()
            .map(|id| narrow_u64(id, "open position id"))
            .collect()
    }

    async fn get_derived_price(&self, base: &str, quote: &str) -> Result<u128, LedgerError> {
        let price: U256 = self
            .method::<_, U256>("getDerivedPrice", (base.to_string(), quote.to_string()))?
            .call()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        narrow_u128(price, "derived price")
    }

    async fn supports_check_and_settle(&self) -> Result<bool, LedgerError> {
        self.check_and_settle
            .get_or_try_init(|| async {
                let call = self
                    .method::<_, ()>("checkAndSettleIfTriggered", U256::zero())?
                    .from(self.sender);
                match call.call().await {
                    // A decodable revert means the entry point exists and
                    // evaluated; an empty revert means no such function.
                    Ok(()) => Ok(true),
                    Err(err) => match classify_contract_error(&err) {
                        Ok(RevertClass::Other(reason)) if reason == "unspecified revert" => {
                            Ok(false)
                        }
                        Ok(_) => Ok(true),
                        Err(transport) => Err(transport),
                    },
                }
            })
            .await
            .copied()
    }

    async fn simulate_settle(
        &self,
        index: u64,
        price_bound: u128,
    ) -> Result<SimulationOutcome, LedgerError> {
        self.simulate("settle", (U256::from(index), widen_bound(price_bound)))
            .await
    }

    async fn submit_settle(
        &self,
        index: u64,
        price_bound: u128,
    ) -> Result<SettlementReceipt, LedgerError> {
        self.submit("settle", (U256::from(index), widen_bound(price_bound)))
            .await
    }

    async fn simulate_check_and_settle(
        &self,
        index: u64,
    ) -> Result<SimulationOutcome, LedgerError> {
        self.simulate("checkAndSettleIfTriggered", U256::from(index))
            .await
    }

    async fn submit_check_and_settle(
        &self,
        index: u64,
    ) -> Result<SettlementReceipt, LedgerError> {
        self.submit("checkAndSettleIfTriggered", U256::from(index))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_widening_maps_sentinel_to_full_word() {
        assert_eq!(widen_bound(0), U256::zero());
        assert_eq!(widen_bound(42), U256::from(42u64));
        assert_eq!(widen_bound(u128::MAX), U256::MAX);
    }

    #[test]
    fn narrowing_rejects_oversized_words() {
        assert!(narrow_u128(U256::MAX, "x").is_err());
        assert_eq!(narrow_u128(U256::from(7u64), "x").unwrap(), 7);
        assert!(narrow_u64(U256::from(u128::MAX), "x").is_err());
    }
}
