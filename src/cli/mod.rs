//! CLI module for the nhatky command-line interface.
//!
//! Without a subcommand the binary starts the API server. The other
//! subcommands work directly against the configured database:
//! - `create-user` - Create a regular user
//! - `create-superuser` - Create a staff superuser
//! - `config check` - Validate configuration file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::api::auth::{create_superuser, create_user};
use crate::config::Config;
use crate::db;

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "nhatky")]
#[command(author, version, about = "Event log and incident handling API", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "NHATKY_CONFIG", default_value = "nhatky.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the API server (the default)
    Serve,

    /// Create a regular user
    CreateUser(UserArgs),

    /// Create a staff superuser
    CreateSuperuser(UserArgs),

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(clap::Args, Debug)]
pub struct UserArgs {
    /// Login email
    #[arg(long)]
    pub email: String,

    /// Password (can also be set via NHATKY_PASSWORD env var)
    #[arg(long, env = "NHATKY_PASSWORD")]
    pub password: String,

    /// Display name
    #[arg(long, default_value = "")]
    pub name: String,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

impl Cli {
    /// Whether this invocation should start the server
    pub fn is_serve(&self) -> bool {
        matches!(self.command, None | Some(Commands::Serve))
    }
}

/// Run a non-server CLI command
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::CreateUser(args)) => cmd_create_user(cli, args, false).await,
        Some(Commands::CreateSuperuser(args)) => cmd_create_user(cli, args, true).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        // Serving is handled in main.rs
        None | Some(Commands::Serve) => Ok(()),
    }
}

async fn cmd_create_user(cli: &Cli, args: &UserArgs, superuser: bool) -> Result<()> {
    let config = Config::load(&cli.config)?;
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory: {}",
            config.server.data_dir.display()
        )
    })?;
    let pool = db::init(&config.server.data_dir).await?;

    let user = if superuser {
        create_superuser(&pool, &args.email, &args.password, &args.name).await?
    } else {
        create_user(&pool, &args.email, &args.password, &args.name).await?
    };

    println!(
        "[OK] Created {} {} (id {})",
        if superuser { "superuser" } else { "user" },
        user.email,
        user.id
    );
    Ok(())
}

/// Validate configuration file
fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!("A default configuration will be used when starting the server.");
        return Ok(());
    }

    match Config::load(config_path) {
        Ok(config) => {
            println!("[OK] Configuration file is valid!");
            println!();
            println!("=== Configuration Summary ===");
            println!();
            println!("Server:");
            println!("  Host:         {}", config.server.host);
            println!("  Port:         {}", config.server.port);
            println!("  Data Dir:     {}", config.server.data_dir.display());
            println!();
            println!("Auth:");
            println!("  Token TTL:    {}h", config.auth.token_ttl_hours);
            println!(
                "  Admin User:   {}",
                config.auth.admin_email.as_deref().unwrap_or("(not configured)")
            );
            println!();
            println!("Logging:");
            println!("  Level:        {}", config.logging.level);
            Ok(())
        }
        Err(e) => {
            println!("[!!] Configuration file is invalid:");
            println!("     {:#}", e);
            Err(e)
        }
    }
}
