//! Marigold CLI - a command-line storefront.
//!
//! # Usage
//!
//! ```bash
//! # Browse the catalog
//! marigold products list --category shirts --sort price_asc
//! marigold products show linen-shirt
//!
//! # Fill the cart as a guest
//! marigold cart add linen-shirt --quantity 2
//! marigold cart coupon WELCOME10
//!
//! # Sign in (merges the guest cart) and check out
//! MARIGOLD_PASSWORD=... marigold auth login --email ada@example.com
//! marigold checkout --payment card
//! ```
//!
//! # Configuration
//!
//! Read from the environment (or `.env`); see
//! [`StorefrontConfig::from_env`]. The guest cart and session live in
//! `$MARIGOLD_DATA_DIR/storage.json`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::io::Write;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use marigold_storefront::config::StorefrontConfig;
use marigold_storefront::{AppError, Storefront};
use sentry::integrations::tracing as sentry_tracing;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod render;

use commands::{account, cart, catalog, orders};

#[derive(Parser)]
#[command(name = "marigold")]
#[command(author, version, about = "Marigold storefront")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse products
    Products {
        #[command(subcommand)]
        action: catalog::ProductAction,
    },
    /// List categories
    Categories,
    /// Manage the cart
    Cart {
        #[command(subcommand)]
        action: cart::CartAction,
    },
    /// Manage the wishlist
    Wishlist {
        #[command(subcommand)]
        action: cart::WishlistAction,
    },
    /// Sign in, sign out and manage passwords
    Auth {
        #[command(subcommand)]
        action: account::AuthAction,
    },
    /// Update the customer profile
    Profile {
        #[command(subcommand)]
        action: account::ProfileAction,
    },
    /// Manage saved addresses
    Address {
        #[command(subcommand)]
        action: account::AddressAction,
    },
    /// Place an order for the cart
    Checkout(orders::CheckoutArgs),
    /// Order history
    Orders {
        #[command(subcommand)]
        action: orders::OrderAction,
    },
}

/// Errors surfaced by a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// The storefront rejected the operation.
    #[error(transparent)]
    App(#[from] AppError),

    /// Writing output failed.
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    fn user_message(&self) -> String {
        match self {
            Self::App(err) => err.user_message(),
            Self::Io(err) => err.to_string(),
        }
    }
}

/// Result type for commands.
pub type CliResult = Result<(), CliError>;

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match StorefrontConfig::from_env() {
        Ok(config) => config,
        Err(e) => return fail(&CliError::App(e.into())),
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Logs go to stderr so command output on stdout stays clean
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "marigold_storefront=info,marigold_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let CliError::App(err) = &e {
                err.capture();
            }
            fail(&e)
        }
    }
}

fn fail(error: &CliError) -> ExitCode {
    tracing::debug!(error = %error, "Command failed");
    let _ = writeln!(std::io::stderr(), "error: {}", error.user_message());
    ExitCode::FAILURE
}

async fn run(cli: Cli, config: StorefrontConfig) -> CliResult {
    let storefront = Storefront::open(config)?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Products { action } => catalog::products(&storefront, action, &mut out).await,
        Commands::Categories => catalog::categories(&storefront, &mut out).await,
        Commands::Cart { action } => cart::cart(&storefront, action, &mut out).await,
        Commands::Wishlist { action } => cart::wishlist(&storefront, action, &mut out).await,
        Commands::Auth { action } => account::auth(&storefront, action, &mut out).await,
        Commands::Profile { action } => account::profile(&storefront, action, &mut out).await,
        Commands::Address { action } => account::address(&storefront, action, &mut out).await,
        Commands::Checkout(args) => orders::checkout(&storefront, args, &mut out).await,
        Commands::Orders { action } => orders::orders(&storefront, action, &mut out).await,
    }
}
