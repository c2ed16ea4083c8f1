//! Artisan Market CLI - Catalog seeding and store lookups.
//!
//! # Usage
//!
//! ```bash
//! # Validate a catalog file without writing anything
//! am-cli seed data/products.yaml --dry-run
//!
//! # Import the catalog
//! am-cli seed data/products.yaml
//!
//! # Browse the catalog
//! am-cli products list --category ceramics
//! am-cli products search "tea bowl"
//!
//! # Add one product
//! am-cli products add --name "Indigo Scarf" --price 320000 --category weaving --quantity 4
//!
//! # Order history for an account (password read from AM_PASSWORD)
//! AM_PASSWORD=... am-cli orders list --email lan@example.com
//!
//! # Any command against a throwaway in-memory backend
//! am-cli --offline seed data/products.yaml
//! ```
//!
//! # Environment Variables
//!
//! See `StorefrontConfig::from_env`; a `.env` file is loaded when present.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::process::ExitCode;

use artisan_market_core::{Category, CategoryFilter};
use artisan_market_storefront::config::{LogFormat, StorefrontConfig};
use artisan_market_storefront::{AppError, Storefront, telemetry};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use thiserror::Error;

mod commands;

#[derive(Parser)]
#[command(name = "am-cli")]
#[command(author, version, about = "Artisan Market CLI tools")]
struct Cli {
    /// Use a fresh in-memory backend instead of Firebase
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import products from a YAML file
    Seed {
        /// Path to the YAML file
        file: PathBuf,

        /// Validate and report without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Browse and edit the catalog
    Products {
        #[command(subcommand)]
        action: ProductsAction,
    },
    /// Look up orders
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
}

#[derive(Subcommand)]
enum ProductsAction {
    /// List products
    List {
        /// Category key, or `all`
        #[arg(short, long, default_value = "all")]
        category: CategoryFilter,
    },
    /// Find products by name or description
    Search {
        term: String,

        /// Category key, or `all`
        #[arg(short, long, default_value = "all")]
        category: CategoryFilter,
    },
    /// Add a product
    Add {
        #[arg(long)]
        name: String,

        /// Price in VND
        #[arg(long)]
        price: Decimal,

        /// `ceramics`, `weaving`, `painting` or `jewelry`
        #[arg(long)]
        category: Category,

        /// Units in stock
        #[arg(long, default_value_t = 0)]
        quantity: u32,

        #[arg(long, default_value_t = 0.0)]
        rating: f64,

        #[arg(long, default_value = "")]
        image_url: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        material: Option<String>,

        #[arg(long)]
        icon: Option<String>,
    },
}

#[derive(Subcommand)]
enum OrdersAction {
    /// List the orders of an account, newest first
    List {
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(long, env = "AM_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

/// Errors that end a CLI run.
#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid catalog file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    App(#[from] AppError),
}

impl CliError {
    fn report(&self) {
        match self {
            Self::App(e) => {
                e.report();
                tracing::error!("{}", e.user_message());
            }
            other => tracing::error!("Command failed: {other}"),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = if cli.offline {
        Ok(StorefrontConfig::offline())
    } else {
        StorefrontConfig::from_env()
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let sentry_guard = config.as_ref().ok().and_then(telemetry::init_sentry);
    let format = config.as_ref().map_or(LogFormat::Pretty, |c| c.log_format);
    if let Err(e) = telemetry::init_tracing(format, "artisan_market_storefront=info,am_cli=info") {
        report_logging_failure(&e);
        return ExitCode::FAILURE;
    }
    if sentry_guard.is_some() {
        tracing::info!("Sentry initialized");
    }

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(AppError::from(e).into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            e.report();
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::print_stderr)]
fn report_logging_failure(error: &dyn std::error::Error) {
    eprintln!("failed to initialize logging: {error}");
}

async fn run(cli: Cli, config: StorefrontConfig) -> Result<(), CliError> {
    let storefront = if cli.offline {
        Storefront::offline()
    } else {
        Storefront::connect(config).map_err(AppError::from)?
    };

    match cli.command {
        Commands::Seed { file, dry_run } => {
            commands::seed::products(&storefront, &file, dry_run).await?;
        }
        Commands::Products { action } => match action {
            ProductsAction::List { category } => {
                commands::products::list(&storefront, category).await?;
            }
            ProductsAction::Search { term, category } => {
                commands::products::search(&storefront, &term, category).await?;
            }
            ProductsAction::Add {
                name,
                price,
                category,
                quantity,
                rating,
                image_url,
                description,
                material,
                icon,
            } => {
                let product = artisan_market_storefront::models::NewProduct {
                    name,
                    price,
                    category,
                    image_url,
                    rating,
                    quantity,
                    description,
                    material,
                    icon,
                };
                commands::products::add(&storefront, &product).await?;
            }
        },
        Commands::Orders { action } => match action {
            OrdersAction::List { email, password } => {
                commands::orders::list(&storefront, &email, password.into()).await?;
            }
        },
    }
    Ok(())
}
