//! git-herald - watch git repositories and announce new commits
//!
//! # Usage
//! ```bash
//! git-herald follow https://github.com/errbotio/err-git   # follow every branch
//! git-herald follow err-git main dev                      # alias, two branches only
//! git-herald unfollow errbotio/err-git dev                # stop following one branch
//! git-herald following                                    # list what is followed
//! git-herald poll                                         # one sweep, print the news
//! git-herald serve --port 3002                            # poll forever + HTTP commands
//! ```

mod config;
mod error;
mod follow;
mod git;
mod models;
mod notify;
mod poller;
mod registry;
mod report;
mod routes;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::{Parser, Subcommand};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use follow::{ConfigAliases, FollowManager};
use git::Git2Gateway;
use models::Branch;
use notify::ConsoleSink;
use poller::ChangeDetector;
use registry::{JsonFileStore, Registry};
use routes::AppState;

/// Watch git repositories and announce new commits
#[derive(Parser)]
#[command(name = "git-herald")]
#[command(about = "Watch git repositories and announce new commits", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the registry and the clones (overrides the config file)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow a git URL or alias, optionally only some of its branches
    Follow {
        source: String,
        branches: Vec<String>,
    },
    /// Stop following a repository, or only some of its branches
    Unfollow {
        name: String,
        branches: Vec<String>,
    },
    /// List followed repositories and branches
    Following,
    /// Run a single poll sweep
    Poll,
    /// Poll on an interval and serve the HTTP command surface
    Serve {
        /// Port to run the server on
        #[arg(short, long, default_value = "3002")]
        port: u16,

        /// Seconds between sweeps (overrides the config file)
        #[arg(short, long)]
        interval: Option<u64>,
    },
}

fn to_branches(names: Vec<String>) -> Vec<Branch> {
    names.into_iter().map(Branch::from).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    git::set_network_timeout(config.repo_timeout())?;

    let registry = Arc::new(Registry::new(JsonFileStore::open(config.registry_path())?));
    let gateway = Arc::new(Git2Gateway::new(config.clones_dir()));
    let aliases = Arc::new(ConfigAliases::new(config.aliases.clone()));

    let follow = FollowManager::new(
        registry.clone(),
        gateway.clone(),
        aliases,
        config.all_aliases_keyword.clone(),
    );
    let detector = Arc::new(ChangeDetector::new(
        registry,
        gateway,
        Arc::new(ConsoleSink),
        config.destinations.clone(),
        config.repo_timeout(),
    ));

    // Command errors are shown to the user, not propagated as a crash.
    let command_result = match cli.command {
        Commands::Follow { source, branches } => Some(follow.follow(&source, &to_branches(branches))),
        Commands::Unfollow { name, branches } => Some(follow.unfollow(&name, &to_branches(branches))),
        Commands::Following => Some(follow.following()),
        Commands::Poll => {
            let outcome = detector.sweep().await;
            for (repo, reason) in &outcome.failures {
                eprintln!("✗ Could not poll {}: {}", repo, reason);
            }
            match outcome.notice {
                // Without destinations the sink never prints it.
                Some(notice) if config.destinations.is_empty() => println!("{}", notice),
                Some(_) => {}
                None => println!("No new commits"),
            }
            None
        }
        Commands::Serve { port, interval } => {
            if let Some(secs) = interval {
                config.poll_interval_secs = secs;
            }
            serve(AppState { follow, detector }, port, &config).await?;
            None
        }
    };

    if let Some(result) = command_result {
        match result {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("✗ {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn serve(state: AppState, port: u16, config: &Config) -> anyhow::Result<()> {
    let state = Arc::new(state);

    let poller = tokio::spawn(state.detector.clone().run(config.poll_interval()));

    let app = Router::new()
        .merge(routes::create_router(state))
        .layer(TraceLayer::new_for_http());

    let addr = format!("127.0.0.1:{}", port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("✗ Failed to bind to port {}: {}", port, e);
            eprintln!("  Try a different port with --port <PORT>");
            std::process::exit(1);
        }
    };

    println!();
    println!("  git-herald");
    println!();
    println!("  Data:     {}", config.data_dir.display());
    println!("  Interval: {}s", config.poll_interval().as_secs());
    println!("  Commands: http://{}", addr);
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
        println!("\n  Shutting down...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    poller.abort();
    Ok(())
}
