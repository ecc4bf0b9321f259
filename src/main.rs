// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! authyntic - Session login server for the operator console
//!
//! Usage:
//!   authyntic                     Start the server (default)
//!   authyntic serve --port 9000   Start the server on another port
//!   authyntic hash-password       Print the peppered digest of a password read from stdin

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use authyntic::config::{Config, ENV_PEPPER};
use authyntic::security::hash_with_pepper;
use authyntic::server::Server;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes following sysexits.h conventions
mod exit_codes {
    pub const ERROR: i32 = 1;
    /// Configuration error - config file unreadable or invalid
    pub const CONFIG: i32 = 78;
}

#[derive(Parser)]
#[command(name = "authyntic")]
#[command(version = VERSION)]
#[command(about = "Session login server for the operator console.")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    serve: ServeArgs,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve(ServeArgs),

    /// Print the peppered SHA-256 digest of a password read from stdin
    ///
    /// Example:
    ///   echo -n 'secret' | authyntic hash-password
    HashPassword {
        /// Pepper to hash with (defaults to the configured pepper)
        #[arg(long, env = ENV_PEPPER)]
        pepper: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Clone, Default)]
struct ServeArgs {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind to (0.0.0.0 exposes the server to the network)
    #[arg(long)]
    bind: Option<String>,

    /// Config file path (defaults to ~/.authyntic/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve static site files from this directory
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Mark the session cookie Secure (required behind TLS)
    #[arg(long)]
    cookie_secure: bool,
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose {
        "authyntic=debug,tower_http=debug"
    } else {
        "authyntic=info,tower_http=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &ServeArgs) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref())?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = &args.bind {
        config.server.bind_address = bind.clone();
    }
    if let Some(dir) = &args.static_dir {
        config.server.static_dir = Some(dir.clone());
    }
    if args.cookie_secure {
        config.auth.cookie_secure = true;
    }

    config.auth.validate()?;
    Ok(config)
}

fn serve(args: &ServeArgs) -> Result<()> {
    let config = match load_config(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[!] {:#}", e);
            std::process::exit(exit_codes::CONFIG);
        }
    };
    tracing::debug!(?config, "configuration loaded");

    if let Some(dir) = &config.server.static_dir {
        if !dir.is_dir() {
            bail!("static directory {} does not exist", dir.display());
        }
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let server = Server::new(config.server, config.auth);
    runtime.block_on(server.start())
}

fn hash_password(pepper: Option<String>, config: Option<PathBuf>) -> Result<()> {
    let pepper = match pepper {
        Some(pepper) => pepper,
        None => Config::load(config.as_deref())?.auth.pepper,
    };

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("password must not be empty");
    }

    println!("{}", hash_with_pepper(&pepper, password));
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let result = match cli.command {
        Some(Commands::Serve(args)) => serve(&args),
        Some(Commands::HashPassword { pepper, config }) => hash_password(pepper, config),
        None => serve(&cli.serve),
    };

    if let Err(e) = result {
        tracing::error!("{:#}", e);
        eprintln!("[!] {:#}", e);
        std::process::exit(exit_codes::ERROR);
    }
}
