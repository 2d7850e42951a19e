//! GreenSpark CLI
//!
//! Usage:
//!   greenspark init                    Initialize database, seed catalog
//!   greenspark serve --port 8000       Start API server and job workers
//!   greenspark users create-admin ...  Bootstrap an administrator
//!   greenspark bills estimate <ID>     Recompute a bill breakdown

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Serve { port, host } => {
            commands::cmd_serve(&cli.db, &host, port, cli.no_encrypt).await
        }
        Commands::Catalog { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                CatalogAction::Seed => commands::cmd_catalog_seed(&db),
                CatalogAction::List { search } => {
                    commands::cmd_catalog_list(&db, search.as_deref())
                }
            }
        }
        Commands::Users { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                UsersAction::List { role, limit } => {
                    commands::cmd_users_list(&db, role.as_deref(), limit)
                }
                UsersAction::CreateAdmin {
                    email,
                    username,
                    first_name,
                    last_name,
                    password,
                } => {
                    let password = match password {
                        Some(p) => p,
                        None => std::env::var("GREENSPARK_ADMIN_PASSWORD").map_err(|_| {
                            anyhow::anyhow!("Pass --password or set GREENSPARK_ADMIN_PASSWORD")
                        })?,
                    };
                    commands::cmd_users_create_admin(
                        &db,
                        commands::AdminAccount {
                            email,
                            username,
                            first_name,
                            last_name,
                            password,
                        },
                    )
                    .map(|_| ())
                }
                UsersAction::SetRole { login, role } => {
                    commands::cmd_users_set_role(&db, &login, &role)
                }
            }
        }
        Commands::Bills { action } => match action {
            BillsAction::Estimate { bill_id } => {
                let db = commands::open_db(&cli.db, cli.no_encrypt)?;
                let settings = greenspark_core::Settings::from_env();
                let ctx = commands::task_context(db, &settings).await?;
                commands::cmd_bills_estimate(&ctx, bill_id).await.map(|_| ())
            }
        },
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt),
    }
}
