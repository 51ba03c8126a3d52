//! entrypoint - boots one cluster role per container.
//!
//! The scheduler supplies the role as the single argument; this process
//! performs guarded one-time initialization, waits for the role's upstream
//! dependencies, launches the role's daemon as its only child, and stays in
//! the foreground so the scheduler tracks the daemon's fate through it.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use entrypoint_core::{dispatch, Config, Recipe, Role, EXIT_BOOT_FAILURE};

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("boot failed: {e:#}");
            EXIT_BOOT_FAILURE
        }
    };

    std::process::exit(code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("entrypoint=info,entrypoint_core=info"));

    // Containerized deployments ship logs to a collector; ENTRYPOINT_LOG_FORMAT=json
    // switches to structured output
    let json = std::env::var("ENTRYPOINT_LOG_FORMAT").is_ok_and(|v| v == "json");
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let config = Config::load().context("failed to load configuration")?;

    match Role::parse(&cli.role) {
        Some(role) => {
            if cli.explain {
                let recipe = Recipe::for_role(role, &config);
                println!("{}", serde_json::to_string_pretty(&recipe)?);
                return Ok(0);
            }

            info!(
                role = %role,
                host = %node_hostname(),
                version = env!("CARGO_PKG_VERSION"),
                "booting role"
            );
            Ok(dispatch::run_role(role, &config).await?)
        }
        None => {
            let mut argv = Vec::with_capacity(cli.args.len() + 1);
            argv.push(cli.role.clone());
            argv.extend(cli.args.iter().cloned());

            warn!(command = %argv.join(" "), "unknown role, executing command directly");
            Ok(dispatch::run_fallback(&argv, &config).await?)
        }
    }
}

fn node_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}
