mod harvest;

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use gondola_core::{Environment, FailureKind};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "gondola")]
#[command(about = "Wholesale storefront catalog harvester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Harvest every page of the configured categories
    Run {
        /// Harvest only this category; repeat for several
        #[arg(long = "category")]
        categories: Vec<String>,
        /// List every page first and save the merged listing once
        #[arg(long)]
        bulk: bool,
    },
    /// Re-run pending failures of one kind
    Retry {
        #[arg(long, value_enum, default_value_t = KindArg::ProductPageFailed)]
        kind: KindArg,
        /// Retries in flight at once (defaults to `GONDOLA_RETRY_CONCURRENCY`)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Show pending failures of one kind, newest first
    ///
    /// Does not apply migrations; run `gondola db migrate` first on a new
    /// database.
    Failures {
        #[arg(long, value_enum, default_value_t = KindArg::ProductPageFailed)]
        kind: KindArg,
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Database management
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
}

/// Failure kinds as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Unknown,
    CategoryPageFailed,
    ProductPageFailed,
    ListingFailed,
    SavingFailed,
}

impl From<KindArg> for FailureKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Unknown => FailureKind::Unknown,
            KindArg::CategoryPageFailed => FailureKind::CategoryPageFailed,
            KindArg::ProductPageFailed => FailureKind::ProductPageFailed,
            KindArg::ListingFailed => FailureKind::ListingFailed,
            KindArg::SavingFailed => FailureKind::SavingFailed,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = gondola_core::load_app_config();
    let (log_level, env) = config.as_ref().map_or(("info", Environment::Development), |c| {
        (c.log_level.as_str(), c.env.clone())
    });
    if let Err(e) = init_tracing(log_level, &env) {
        eprintln!("error: failed to initialise logging: {e:#}");
        return ExitCode::FAILURE;
    }

    let result = match config {
        Ok(config) => execute(cli.command, config).await,
        Err(e) => Err(anyhow::Error::new(e).context("failed to load configuration")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, chain = %format!("{e:#}"), "gondola failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_level: &str, env: &Environment) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(colored_logs(env))
        .init();
    Ok(())
}

/// Production output goes to log collectors, which do not render ANSI colour.
fn colored_logs(env: &Environment) -> bool {
    !matches!(env, Environment::Production)
}

/// `failures` only reads the ledger; every other command may write the
/// schema.
fn applies_migrations(command: &Commands) -> bool {
    !matches!(command, Commands::Failures { .. })
}

async fn execute(command: Commands, config: gondola_core::AppConfig) -> anyhow::Result<()> {
    let pool_config = gondola_db::PoolConfig::from_app_config(&config);
    let pool = gondola_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = if applies_migrations(&command) {
        gondola_db::run_migrations(&pool).await?
    } else {
        0
    };

    let job = match command {
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            println!("applied {applied} migration(s)");
            return Ok(());
        }
        Commands::Failures { kind, limit } => {
            return harvest::print_failures(pool, kind.into(), limit).await;
        }
        Commands::Run { categories, bulk } => harvest::Job::Run {
            categories: harvest::select_categories(&config, &categories)?,
            mode: if bulk {
                harvest::Mode::Bulk
            } else {
                harvest::Mode::Paged
            },
        },
        Commands::Retry { kind, concurrency } => harvest::Job::Retry {
            kind: kind.into(),
            concurrency: concurrency.unwrap_or(config.retry_concurrency).max(1),
        },
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    harvest::execute(&config, pool, job, &cancel).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, draining in-flight work");
}
