use std::sync::Arc;

use balance_service::{
    BalanceHistoryRequest, BalanceService, BalanceServiceConfig, BatchModifyBalanceRequest,
    ModifyBalanceRequest, MutationGateway, NegativeBalancePolicy,
};
use clap::{Parser, Subcommand};
use common::model::account::{BalanceOperation, UserId};
use common::model::audit::TimeRange;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Balance Service CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Set the log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Database URL (overrides DATABASE_URL)
    #[arg(short, long, global = true)]
    database_url: Option<String>,

    /// Database pool size (overrides DB_POOL_SIZE)
    #[arg(short, long, global = true)]
    pool_size: Option<u32>,

    /// Negative balance policy: allow or reject (overrides NEGATIVE_BALANCE_POLICY)
    #[arg(long, global = true)]
    negative_balances: Option<NegativeBalancePolicy>,

    /// Commands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set one account's balance
    Set {
        /// Acting user ID
        #[arg(short, long)]
        user: UserId,
        /// Account ID
        #[arg(short, long)]
        account: String,
        /// New balance in minor units
        #[arg(short, long, allow_negative_numbers = true)]
        balance: i64,
    },
    /// Add or subtract an amount on several accounts
    Adjust {
        /// Acting user ID
        #[arg(short, long)]
        user: UserId,
        /// add or subtract
        #[arg(short, long)]
        operation: BalanceOperation,
        /// Positive amount in minor units
        #[arg(short = 'm', long)]
        amount: i64,
        /// Account IDs
        #[arg(required = true)]
        accounts: Vec<String>,
    },
    /// Show an account's balance history
    History {
        /// Acting user ID
        #[arg(short, long)]
        user: UserId,
        /// Account ID
        #[arg(short, long)]
        account: String,
    },
}

fn print_result<T: Serialize, E: Serialize>(result: Result<T, E>) -> Result<bool, serde_json::Error> {
    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(true)
        }
        Err(err) => {
            eprintln!("{}", serde_json::to_string_pretty(&err)?);
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "balance_service={level},audit={level}",
            level = cli.log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = BalanceServiceConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    if let Some(pool_size) = cli.pool_size {
        config.db_pool_size = pool_size;
    }
    if let Some(policy) = cli.negative_balances {
        config.negative_balance_policy = policy;
    }

    info!(
        "Starting balance service with database pool size: {}, audit logging: {}, negative balances: {}",
        config.db_pool_size, config.audit_logging, config.negative_balance_policy
    );

    let (service, forwarder) = BalanceService::with_config(&config).await?;
    let gateway = MutationGateway::new(Arc::new(service));

    let succeeded = match cli.command {
        Commands::Set { user, account, balance } => print_result(
            gateway
                .modify_single(user, ModifyBalanceRequest { id: account, balance })
                .await,
        )?,
        Commands::Adjust { user, operation, amount, accounts } => print_result(
            gateway
                .modify_batch(
                    user,
                    BatchModifyBalanceRequest {
                        account_ids: accounts,
                        operation,
                        amount,
                    },
                )
                .await,
        )?,
        Commands::History { user, account } => print_result(
            gateway
                .balance_history(
                    user,
                    BalanceHistoryRequest {
                        account_id: account,
                        range: TimeRange::default(),
                    },
                )
                .await,
        )?,
    };

    // Closing the queue lets the forwarder drain pending audit records
    drop(gateway);
    if let Some(handle) = forwarder {
        handle.await?;
    }

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
