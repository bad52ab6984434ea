use anyhow::{Context, Result};
use ethers::signers::LocalWallet;
use std::str::FromStr;

/// Environment variable holding the keeper's signing key. Keys are never
/// read from configuration files.
pub const PRIVATE_KEY_ENV: &str = "KEEPER_PRIVATE_KEY";

/// Create the signing wallet from a hex private key (with or without 0x)
///
/// # Errors
/// Returns error if the private key format is invalid
pub fn create_wallet_from_private_key(private_key: &str) -> Result<LocalWallet> {
    let key = private_key.strip_prefix("0x").unwrap_or(private_key);

    LocalWallet::from_str(key).context("Failed to create wallet from private key")
}

/// Load the signing wallet from `KEEPER_PRIVATE_KEY`
///
/// # Errors
/// Returns error if the environment variable is missing or invalid
pub fn load_wallet_from_env() -> Result<LocalWallet> {
    let private_key =
        std::env::var(PRIVATE_KEY_ENV).with_context(|| format!("Missing {PRIVATE_KEY_ENV} env var"))?;

    create_wallet_from_private_key(&private_key)
}
