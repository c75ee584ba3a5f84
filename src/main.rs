mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wyvern_actions::ActionRegistry;
use wyvern_core::config::{StoreBackend, WyvernConfig};
use wyvern_core::types::SoarId;
use wyvern_engine::Wyvern;

#[derive(Parser)]
#[command(name = "wyvern", version, about = "DAG workflow engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "wyvern.toml", env = "WYVERN_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the named soars and run them until they finish
    Run {
        #[arg(required = true)]
        soars: Vec<String>,
    },
    /// Build every configured soar and report problems
    Validate,
    /// List configured soars
    List,
    /// Rebuild a soar from the sqlite store and run it to the end
    Resume {
        /// ID of a previously started soar
        soar_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wyvern=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = WyvernConfig::load(&cli.config)?;
    let registry = ActionRegistry::with_builtins();

    match cli.command {
        Commands::List => {
            for soar in &config.soars {
                println!("{} ({} flaps)", soar.name, soar.flaps.len());
            }
        }
        Commands::Validate => {
            let failed = validate::run_validate(&config, &registry);
            if failed > 0 {
                bail!("{} soar(s) failed validation", failed);
            }
        }
        Commands::Run { soars } => {
            let store = wyvern_store::open(&config.store)?;
            let wyvern = Arc::new(Wyvern::new(registry, store));
            let mut ids = Vec::with_capacity(soars.len());
            for name in &soars {
                ids.push(wyvern.load_from_config(&config, name).await?);
            }
            drive(wyvern, ids).await?;
        }
        Commands::Resume { soar_id } => {
            if config.store.backend != StoreBackend::Sqlite {
                bail!("resume needs the sqlite store backend ([store] backend = \"sqlite\")");
            }
            let store = wyvern_store::open(&config.store)?;
            let wyvern = Arc::new(Wyvern::new(registry, store));
            let id = wyvern
                .rebuild(&SoarId::from(soar_id), config.scheduler.interval())
                .await?;
            drive(wyvern, vec![id]).await?;
        }
    }

    Ok(())
}

/// Start every soar, then wait for all of them or for Ctrl-C.
async fn drive(wyvern: Arc<Wyvern>, ids: Vec<SoarId>) -> anyhow::Result<()> {
    for id in &ids {
        wyvern.run(id).await?;
        info!(soar_id = %id, "Running");
    }

    let waiter = {
        let wyvern = Arc::clone(&wyvern);
        let ids = ids.clone();
        async move {
            for id in &ids {
                wyvern.wait(id).await?;
            }
            Ok::<_, wyvern_core::WyvernError>(())
        }
    };

    tokio::select! {
        result = waiter => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            wyvern.shutdown().await;
        }
    }

    let mut unfinished = Vec::new();
    for id in &ids {
        let done = match wyvern.soar(id).await {
            Some(soar) => soar.is_completed().await?,
            None => false,
        };
        if !done {
            warn!(soar_id = %id, "Soar did not complete");
            unfinished.push(id.to_string());
        }
    }

    if !unfinished.is_empty() {
        bail!("unfinished soars: {}", unfinished.join(", "));
    }
    Ok(())
}
