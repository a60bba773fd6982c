//! Reality Cheque CLI - migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! rc-cli migrate
//!
//! # Create an admin account
//! rc-cli admin create -u ops_lead -e ops@example.com -p 'long enough secret'
//!
//! # Seed the AI catalog (built-in or from a file)
//! rc-cli seed catalog
//! rc-cli seed catalog -f crates/api/seed/catalog.yaml
//!
//! # Create a voucher
//! rc-cli voucher create -t credits -v 10 --days 14
//! ```
//!
//! All commands read `DATABASE_URL` (a `.env` file is honored).

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use reality_cheque_core::VoucherType;

mod commands;

#[derive(Parser)]
#[command(name = "rc-cli")]
#[command(author, version, about = "Reality Cheque CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage admin accounts
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Seed reference data
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Manage vouchers
    Voucher {
        #[command(subcommand)]
        action: VoucherAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a new admin account
    Create {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        password: String,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Upsert the AI catalog (categories, features, models)
    Catalog {
        /// YAML file; the built-in catalog when omitted
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum VoucherAction {
    /// Create a voucher
    Create {
        /// Code to use; generated when omitted
        #[arg(short, long)]
        code: Option<String>,

        /// `percentage` or `credits`
        #[arg(short = 't', long = "type")]
        voucher_type: VoucherType,

        /// Percent off, or credits granted
        #[arg(short, long)]
        value: Decimal,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(long, default_value_t = 1)]
        max_uses: i32,

        /// Days until the voucher expires
        #[arg(long, default_value_t = 30)]
        days: i64,

        /// Restrict to these plans (repeatable); all plans when omitted
        #[arg(long = "plan")]
        plans: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Admin { action } => match action {
            AdminAction::Create {
                username,
                email,
                password,
            } => {
                commands::admin::create(&username, &email, &password).await?;
            }
        },
        Commands::Seed { target } => match target {
            SeedTarget::Catalog { file } => commands::seed::catalog(file.as_deref()).await?,
        },
        Commands::Voucher { action } => match action {
            VoucherAction::Create {
                code,
                voucher_type,
                value,
                description,
                max_uses,
                days,
                plans,
            } => {
                commands::voucher::create(commands::voucher::CreateOptions {
                    code,
                    voucher_type,
                    value,
                    description,
                    max_uses,
                    days,
                    plans,
                })
                .await?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_voucher_create_parses() {
        let cli = Cli::try_parse_from([
            "rc-cli", "voucher", "create", "-t", "percentage", "-v", "25", "--plan", "tier2",
        ])
        .expect("parse");
        let Commands::Voucher {
            action: VoucherAction::Create {
                voucher_type,
                value,
                plans,
                days,
                ..
            },
        } = cli.command
        else {
            panic!("expected voucher create");
        };
        assert_eq!(voucher_type, VoucherType::Percentage);
        assert_eq!(value, Decimal::from(25));
        assert_eq!(plans, vec!["tier2".to_string()]);
        assert_eq!(days, 30);
    }
}
