//! FretCoach service binary

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use fretcoach::query::{PlanStore, StatsReader};
use fretcoach::{Coach, CoachConfig, ModelGateway, QueryExecutor};

#[derive(Parser)]
#[command(name = "fretcoach")]
#[command(version, about = "AI guitar practice coach")]
#[command(
    long_about = "Runs the FretCoach coaching service: a tool-using agent that \
answers questions about recorded practice sessions and generates practice \
plans, backed by Postgres and two interchangeable model providers."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Server {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
    /// Print build information
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt::init();
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Server { host, port } => {
            let config = CoachConfig::from_env().context("configuration")?;
            let executor =
                QueryExecutor::connect(&config.database_url).context("database pool")?;
            let plans = PlanStore::new(executor.pool().clone());
            let stats = StatsReader::new(executor.pool().clone());
            let gateway = ModelGateway::from_config(&config);
            let coach = Coach::new(gateway, Arc::new(executor))
                .with_max_cycles(config.max_cycles);

            let state = fretcoach::server::AppState::new(Arc::new(coach), plans, stats);
            fretcoach::server::run_server(state, &host, port)
                .await
                .context("server")?;
        }
        Commands::Info => {
            println!("fretcoach {}", env!("CARGO_PKG_VERSION"));
            println!("features: server={}", cfg!(feature = "server"));
        }
    }
    Ok(())
}
