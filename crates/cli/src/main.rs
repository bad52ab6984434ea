use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "synth-keeper")]
#[command(about = "Trigger-and-settlement keeper for leveraged synthetic positions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the keeper loop
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Keeper.toml")]
        config: String,
        /// Config profile overlay (e.g. "staging" reads Keeper.staging.toml)
        #[arg(long)]
        profile: Option<String>,
    },
    /// List a trader's open positions for an instrument
    Positions {
        /// Config file path
        #[arg(short, long, default_value = "config/Keeper.toml")]
        config: String,
        /// Trader account (hex address)
        #[arg(long)]
        trader: String,
        /// Instrument symbol (e.g. "GBP")
        #[arg(long)]
        instrument: String,
    },
    /// Read the current oracle quote for an instrument
    Price {
        /// Config file path
        #[arg(short, long, default_value = "config/Keeper.toml")]
        config: String,
        /// Instrument symbol (e.g. "GBP")
        #[arg(long)]
        instrument: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, profile } => commands::run(&config, profile.as_deref()).await,
        Commands::Positions {
            config,
            trader,
            instrument,
        } => commands::positions(&config, &trader, &instrument).await,
        Commands::Price { config, instrument } => commands::price(&config, &instrument).await,
    }
}
