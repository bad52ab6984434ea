use anyhow::{ensure, Context, Result};
use chrono::Utc;
use std::sync::Arc;
use synth_keeper_core::convert::feed_to_display;
use synth_keeper_core::{ConfigLoader, KeeperConfig, OracleClient};
use synth_keeper_engine::{Keeper, PositionRegistry};
use synth_keeper_ledger_evm::{wallet, ChainlinkOracleClient, EvmLedgerClient};

fn load_config(path: &str, profile: Option<&str>) -> Result<KeeperConfig> {
    match profile {
        Some(profile) => ConfigLoader::load_with_profile(path, profile),
        None => ConfigLoader::load_from(path),
    }
    .with_context(|| format!("loading config from {path}"))
}

/// Runs the keeper loop until Ctrl-C. In-flight settlement attempts finish
/// before exit.
pub async fn run(config_path: &str, profile: Option<&str>) -> Result<()> {
    let config = load_config(config_path, profile)?;
    ensure!(
        !config.watch.is_empty(),
        "no watch targets configured; add [[watch]] entries to {config_path}"
    );

    let signer = wallet::load_wallet_from_env()?;
    let ledger = Arc::new(EvmLedgerClient::connect(&config.rpc, &config.ledger, signer).await?);
    let oracle = Arc::new(ChainlinkOracleClient::connect(
        &config.rpc,
        &config.ledger,
        &config.oracle,
    )?);
    let keeper = Keeper::new(&config, ledger, oracle);

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("stop signal received; finishing in-flight work");
            let _ = stop_tx.send(true);
        }
    });

    keeper.run(stop_rx).await
}

/// One-shot listing of a trader's open positions for an instrument.
pub async fn positions(config_path: &str, trader: &str, instrument: &str) -> Result<()> {
    let config = load_config(config_path, None)?;
    let signer = wallet::load_wallet_from_env()?;
    let ledger = Arc::new(EvmLedgerClient::connect(&config.rpc, &config.ledger, signer).await?);
    let oracle = ChainlinkOracleClient::connect(&config.rpc, &config.ledger, &config.oracle)?;

    let decimals = oracle
        .read_quote(instrument)
        .await
        .map(|quote| quote.decimals)
        .ok();
    let display = |value: u128| match (value, decimals) {
        (0, _) => "-".to_string(),
        (v, Some(d)) => feed_to_display(v, d),
        (v, None) => v.to_string(),
    };

    let registry = PositionRegistry::new(ledger);
    let open = registry.list_open(trader, instrument).await?;
    if open.is_empty() {
        println!("no open {instrument} positions for {trader}");
        return Ok(());
    }
    for position in open {
        println!(
            "#{} {} {} entry {} tp {} sl {} (global id {})",
            position.local_index,
            position.instrument,
            position.direction,
            display(position.entry_price),
            display(position.take_profit_price),
            display(position.stop_loss_price),
            position.global_id,
        );
    }
    Ok(())
}

/// One-shot oracle read.
pub async fn price(config_path: &str, instrument: &str) -> Result<()> {
    let config = load_config(config_path, None)?;
    let oracle = ChainlinkOracleClient::connect(&config.rpc, &config.ledger, &config.oracle)?;

    let quote = oracle.read_quote(instrument).await?;
    let age = quote.age_seconds(Utc::now().timestamp());
    println!(
        "{instrument}: {} ({} decimals, updated {age}s ago)",
        feed_to_display(quote.raw_answer, quote.decimals),
        quote.decimals,
    );
    Ok(())
}
