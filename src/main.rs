use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chess_scout::{
    config::Config,
    engine::EnginePool,
    scout::{estimate, reduce, ConfidenceInputs, GoalRequest, ScanOutcome, ScanPolicy},
    ScoutContext,
};

/// Investigate a chess position: dual-depth scan, optional goal search,
/// JSON evidence on stdout.
#[derive(Debug, Parser)]
#[command(name = "chess-scout", version, about)]
struct Cli {
    /// Position to investigate, as FEN
    fen: String,

    /// Scan policy overrides, as JSON (unset fields keep their defaults)
    #[arg(long)]
    policy: Option<String>,

    /// Goal request, as JSON (predicate plus optional policy and stop budgets)
    #[arg(long)]
    goal: Option<String>,

    /// Also emit the reduced evidence bundle and confidence signals
    #[arg(long)]
    evidence: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Chess Scout starting..."
    );

    // Initialize the engine pool (all-or-nothing)
    let pool = match EnginePool::initialize(&config.engine).await {
        Ok(p) => {
            info!(
                binary = %config.engine.binary.display(),
                instances = p.size(),
                "Engine pool ready"
            );
            Arc::new(p)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize engine pool");
            return Err(e.into());
        }
    };

    let context = ScoutContext::new(config, Arc::clone(&pool));

    let mut policy = ScanPolicy::from(&context.config.scan);
    if let Some(raw) = &cli.policy {
        policy = serde_json::from_str(raw)
            .map_err(|e| anyhow::anyhow!("invalid --policy JSON: {}", e))?;
    }
    let goal: Option<GoalRequest> = cli
        .goal
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid --goal JSON: {}", e))?;

    let investigator = chess_scout::Investigator::new(Arc::clone(&pool), policy);

    let outcome = match &goal {
        Some(request) => match investigator.investigate_with_goal(&cli.fen, request).await {
            Ok(result) => ScanOutcome::Completed(Box::new(result)),
            Err(e) => ScanOutcome::Error {
                error: e.to_string(),
            },
        },
        None => investigator.scan(&cli.fen).await,
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if cli.evidence {
        if let ScanOutcome::Completed(result) = &outcome {
            let bundle = reduce(result);
            let mut inputs = ConfidenceInputs::from(result.as_ref());
            inputs.shallow_depth = Some(investigator.policy().shallow_depth);
            let signals = estimate(&inputs);
            println!("{}", serde_json::to_string_pretty(&bundle)?);
            println!("{}", serde_json::to_string_pretty(&signals)?);
        }
    }

    // Tear the pool down once the context no longer holds it.
    drop(context);
    drop(investigator);
    if let Ok(pool) = Arc::try_unwrap(pool) {
        pool.shutdown().await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        chess_scout::config::LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        chess_scout::config::LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
