use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};

use userbase::{Application, Config};

const DEFAULT_CONFIG: &str = "config.toml";

/// Operator commands for a userbase database.
#[derive(Parser, Debug)]
#[command(name = "userbase", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
    /// Configuration file.
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG)]
    config: String,
    /// Print a JSON report instead of plain lines.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Delete users whose activation window has passed.
    CleanExpired,
    /// Remind users whose activation key is about to expire.
    NotifyExpiring,
    /// Restore missing default object permissions.
    CheckPermissions,
    /// Delete messages every party has trashed.
    PurgeMessages,
    /// Apply pending database migrations.
    Migrate,
}

#[derive(Serialize)]
struct Report<T: Serialize> {
    command: &'static str,
    count: usize,
    items: Vec<T>,
}

fn print_report<T: Serialize>(
    json: bool,
    command: &'static str,
    items: Vec<T>,
    line: impl Fn(&T) -> String,
) {
    if json {
        let report = Report {
            command,
            count: items.len(),
            items,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Failed to encode report: {e}"),
        }
    } else {
        for item in &items {
            println!("{}", line(item));
        }
        println!("{command}: {} affected", items.len());
    }
}

async fn run(args: &Args, app: &Application) -> userbase::Result<()> {
    match args.command {
        Command::CleanExpired => {
            let deleted = app.accounts().delete_expired_users().await?;
            print_report(args.json, "clean-expired", deleted, |u| {
                format!("deleted {} <{}>", u.username, u.email)
            });
        }
        Command::NotifyExpiring => {
            let notified = app.accounts().notify_almost_expired().await?;
            print_report(args.json, "notify-expiring", notified, |u| {
                format!("notified {} <{}>", u.username, u.email)
            });
        }
        Command::CheckPermissions => {
            let fixes = app.permissions().check_permissions().await?;
            print_report(args.json, "check-permissions", fixes, |f| {
                format!("restored {} for {}", f.permission, f.username)
            });
        }
        Command::PurgeMessages => {
            let purged = app.messages().purge_deleted().await?;
            print_report(args.json, "purge-messages", vec![purged], |n| {
                format!("purged {n} messages")
            });
        }
        Command::Migrate => {
            let version = app.db().schema_version().await?;
            info!(version, "Database schema is up to date");
            if args.json {
                println!("{}", serde_json::json!({ "command": "migrate", "version": version }));
            } else {
                println!("schema version {version}");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load_with_env(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", args.config);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = userbase::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        userbase::logging::init_console_only(&config.logging.level);
    }

    // Opening the database applies pending migrations.
    let app = match Application::open(config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "Failed to open application");
            return ExitCode::FAILURE;
        }
    };

    let result = run(&args, &app).await;
    app.db().close().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, command = ?args.command, "Command failed");
            ExitCode::FAILURE
        }
    }
}
