//! TaskVault operator CLI.
//!
//! # Responsibility
//! - Load configuration from the environment and fail fast when incomplete.
//! - Initialize logging and open the configured database, applying migrations.
//! - Print deterministic status lines for deployment sanity checks.
//! - Provision users out-of-band; the HTTP surface never creates them.

mod provision;

use clap::{Parser, Subcommand};
use log::{error, info};
use provision::{parse_role, provision_user, seed_demo_users};
use std::process::ExitCode;
use taskvault_core::db::migrations::latest_version;
use taskvault_core::db::{open_db, schema_version, DbResult};
use taskvault_core::{
    core_version, init_logging, ping, AppConfig, NewUser, RepoError, SqliteUserRepository,
    UserRole,
};

#[derive(Parser)]
#[command(name = "taskvault")]
#[command(about = "TaskVault operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Open the database and print boot status (default)
    Check,
    /// Link an identity-provider account to a new internal user
    ProvisionUser {
        /// Subject or preferred username issued by the identity provider
        #[arg(long)]
        external_identity: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "user", value_parser = parse_role)]
        role: UserRole,
    },
    /// Provision the two local development accounts
    SeedDemoUsers,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("taskvault config error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = init_logging(&config.log_level, config.log_dir.as_deref()) {
        eprintln!("taskvault logging error: {err}");
        return ExitCode::FAILURE;
    }

    let conn = match open_db(&config.db_path) {
        Ok(conn) => conn,
        Err(err) => {
            error!("event=db_open module=cli status=error error={err}");
            eprintln!("taskvault db error: {err}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command.unwrap_or(Command::Check) {
        Command::Check => check(&config, schema_version(&conn)),
        Command::ProvisionUser {
            external_identity,
            email,
            role,
        } => {
            let users = SqliteUserRepository::new(&conn);
            match provision_user(&users, &NewUser::new(external_identity, email, role)) {
                Ok(user) => {
                    println!(
                        "provisioned owner_id={} external_identity={} role={}",
                        user.id,
                        user.external_identity,
                        user.role.as_str()
                    );
                    ExitCode::SUCCESS
                }
                Err(RepoError::Conflict(message)) => {
                    eprintln!("taskvault provision conflict: {message}");
                    ExitCode::FAILURE
                }
                Err(err) => {
                    eprintln!("taskvault provision error: {err}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::SeedDemoUsers => match seed_demo_users(&SqliteUserRepository::new(&conn)) {
            Ok(report) => {
                for user in &report.created {
                    println!("provisioned external_identity={}", user.external_identity);
                }
                for external_identity in &report.skipped {
                    println!("already provisioned external_identity={external_identity}");
                }
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("taskvault seed error: {err}");
                ExitCode::FAILURE
            }
        },
    }
}

fn check(config: &AppConfig, schema: DbResult<u32>) -> ExitCode {
    let schema = match schema {
        Ok(schema) => schema,
        Err(err) => {
            error!("event=boot_probe module=cli status=error error={err}");
            eprintln!("taskvault db error: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("taskvault_core ping={}", ping());
    println!("taskvault_core version={}", core_version());
    info!(
        "event=boot_probe module=cli status=ok schema_version={schema} issuer={}",
        config.identity_provider.issuer()
    );
    println!("taskvault_core schema={schema}/{}", latest_version());
    println!("taskvault_core issuer={}", config.identity_provider.issuer());
    ExitCode::SUCCESS
}
