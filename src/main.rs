//! Thin operator CLI over the registry database core. All logic lives in
//! the library; this binary only wires configuration, logging, and
//! subcommand dispatch.

use anyhow::Result;
use clap::{Parser, Subcommand};
use endpoint_registry::analytics::{system_health_score, AnalyticsRepository};
use endpoint_registry::db::{MigrationRunner, RegistryPool, ViewLifecycleReport, ViewRegistry};
use endpoint_registry::maintenance::MaintenanceRunner;
use endpoint_registry::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "endpoint-registry")]
#[command(about = "Database health and performance tooling for the endpoint registry")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check database health and view readiness
    Health {
        /// Show the full health report as JSON
        #[arg(long)]
        detailed: bool,
    },
    /// Compute the system health score (machine-readable JSON)
    SystemHealth,
    /// Structural database management
    Database {
        #[command(subcommand)]
        command: DatabaseCommands,
    },
    /// Monitoring view lifecycle
    Views {
        #[command(subcommand)]
        command: ViewCommands,
    },
    /// On-demand maintenance operations
    Maintenance {
        #[command(subcommand)]
        command: MaintenanceCommands,
    },
}

#[derive(Subcommand)]
enum DatabaseCommands {
    /// Run pending migrations over a dedicated connection
    Migrate,
    /// Run migrations, then create the monitoring views
    Setup,
}

#[derive(Subcommand)]
enum ViewCommands {
    /// Create all views in catalog order
    Create,
    /// Drop all views in reverse catalog order
    Drop,
    /// Refresh the materialized views
    Refresh,
}

#[derive(Subcommand)]
enum MaintenanceCommands {
    /// Refresh planner statistics on the critical tables
    Analyze,
    /// Classify index usage and report unused indexes
    UnusedIndexes,
    /// Report the slowest queries by mean execution time
    SlowQueries {
        /// Maximum number of queries to report
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Report connection counts and long-running transactions
    Connections,
    /// Report database and relation sizes
    Size,
    /// Statistics refresh plus materialized-view refresh
    Optimize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "endpoint_registry=info,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = RegistryPool::connect(&config).await?;
    let result = run(cli.command, &config, &pool).await;
    pool.close().await;
    result
}

async fn run(command: Commands, config: &Config, pool: &RegistryPool) -> Result<()> {
    match command {
        Commands::Health { detailed } => {
            let runner = MaintenanceRunner::new(pool.pool().clone());
            let health = runner.health_check().await;
            if detailed {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("{}", health.status_summary());
            }
            if !health.is_healthy() {
                std::process::exit(1);
            }
        }
        Commands::SystemHealth => {
            let repo = AnalyticsRepository::new(pool.pool().clone());
            let score = system_health_score(&repo).await;
            println!("{}", serde_json::to_string_pretty(&score)?);
        }
        Commands::Database { command } => match command {
            DatabaseCommands::Migrate => {
                let runner = MigrationRunner::new(config.database_url.clone());
                let report = runner.run_migrations().await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            DatabaseCommands::Setup => {
                let runner = MigrationRunner::new(config.database_url.clone());
                let migrations = runner.run_migrations().await?;
                println!("{}", serde_json::to_string_pretty(&migrations)?);
                let views = ViewRegistry::new(pool.pool()).create().await;
                print_report(&views)?;
            }
        },
        Commands::Views { command } => {
            let registry = ViewRegistry::new(pool.pool());
            let report = match command {
                ViewCommands::Create => registry.create().await,
                ViewCommands::Drop => registry.drop().await,
                ViewCommands::Refresh => registry.refresh().await,
            };
            print_report(&report)?;
        }
        Commands::Maintenance { command } => {
            let runner = MaintenanceRunner::new(pool.pool().clone());
            match command {
                MaintenanceCommands::Analyze => {
                    let report = runner.analyze_tables().await;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                MaintenanceCommands::UnusedIndexes => {
                    let report = runner.find_unused_indexes().await?;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                MaintenanceCommands::SlowQueries { limit } => {
                    let report = runner.slow_queries(limit).await?;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                MaintenanceCommands::Connections => {
                    let local_pool = pool.monitor_saturation();
                    let server = runner.connection_report().await?;
                    let report = serde_json::json!({
                        "local_pool": local_pool,
                        "server": server,
                    });
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                MaintenanceCommands::Size => {
                    let report = runner.database_size_report().await?;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                MaintenanceCommands::Optimize => {
                    let report = runner.optimize().await;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
        }
    }

    Ok(())
}

fn print_report(report: &ViewLifecycleReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    if !report.success {
        std::process::exit(1);
    }
    Ok(())
}
