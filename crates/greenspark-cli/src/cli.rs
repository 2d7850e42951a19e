//! CLI argument definitions using clap
//!
//! The command implementations live in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// GreenSpark - electricity bill insights
#[derive(Parser)]
#[command(name = "greenspark")]
#[command(about = "Electricity bill parsing, appliance estimates and insights", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "greenspark.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set GREENSPARK_DB_KEY with your passphrase.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and seed the appliance catalog
    Init,

    /// Start the API server with in-process job workers
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Manage the appliance catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },

    /// Manage user accounts
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// Work with bills
    Bills {
        #[command(subcommand)]
        action: BillsAction,
    },

    /// Show database and backend status
    Status,
}

#[derive(Subcommand)]
pub enum CatalogAction {
    /// Insert the default catalog entries (existing ones are kept)
    Seed,
    /// List catalog entries
    List {
        /// Filter by label or category id
        #[arg(short, long)]
        search: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UsersAction {
    /// List accounts
    List {
        /// Only this role (user, admin)
        #[arg(long)]
        role: Option<String>,

        /// Maximum number of rows
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
    /// Create a verified administrator account
    CreateAdmin {
        #[arg(long)]
        email: String,

        #[arg(long)]
        username: String,

        #[arg(long, default_value = "Admin")]
        first_name: String,

        #[arg(long, default_value = "User")]
        last_name: String,

        /// Password (falls back to GREENSPARK_ADMIN_PASSWORD)
        #[arg(long)]
        password: Option<String>,
    },
    /// Change the role of an account
    SetRole {
        /// Username or email
        login: String,

        /// New role (user, admin)
        role: String,
    },
}

#[derive(Subcommand)]
pub enum BillsAction {
    /// Recompute the appliance breakdown of a bill now
    Estimate {
        /// Bill id
        bill_id: Uuid,
    },
}
