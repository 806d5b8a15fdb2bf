//! cppcia CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "cppcia")]
#[command(about = "Change impact analysis for C++ codebases", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the dependency graph up to date and exit
    Index,
    /// Index, then report what the changes impact
    Impact {
        /// Files changed with no declaration-level detail (root-relative)
        #[arg(long = "changed", value_name = "FILE")]
        changed: Vec<PathBuf>,

        /// Changed declarations, as FILE=QUALIFIED_NAME[#DISCRIMINATOR]
        #[arg(long = "decl", value_name = "FILE=NAME")]
        decls: Vec<String>,

        /// Treat --decl edits as body-only
        #[arg(long)]
        body_only: bool,

        /// Maximum propagation hops (overrides cppcia.toml)
        #[arg(long)]
        max_depth: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear the persisted graph state
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Reports go to stdout, logs to stderr
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("cppcia={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("cppcia v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Repository root: {}", cli.root.display());

    match cli.command {
        Commands::Index => commands::index(cli.root).await,
        Commands::Impact {
            changed,
            decls,
            body_only,
            max_depth,
            json,
        } => {
            let args = commands::ImpactArgs {
                changed,
                decls,
                body_only,
                max_depth,
                json,
            };
            commands::impact(cli.root, args).await
        }
        Commands::Clear => commands::clear(cli.root),
        Commands::Version => {
            println!("cppcia v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
