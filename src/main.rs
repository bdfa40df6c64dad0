use anyhow::Result;
use clap::{Parser, Subcommand};
use graph_signin::transport::cli;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "graph-signin")]
#[command(
    author,
    version = env!("GRAPH_SIGNIN_LONG_VERSION"),
    about = "Sign in to a directory tenant and look up the signed-in user",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in through the browser, then look up the signed-in user
    Signin,

    /// Show whether a cached sign-in is available (never prompts)
    Status,

    /// Look up the signed-in user with a cached token
    Me,

    /// Clear cached tokens and end the browser session
    Signout,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Initialize logging
    let filter = if args.verbose {
        "graph_signin=debug"
    } else {
        "graph_signin=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_file = cli::config_path(args.config.as_deref())?;
    tracing::debug!("Using config {}", config_file.display());

    match args.command {
        Commands::Signin => cli::run_signin(&config_file).await?,
        Commands::Status => cli::run_status(&config_file).await?,
        Commands::Me => cli::run_me(&config_file).await?,
        Commands::Signout => cli::run_signout(&config_file).await?,
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => cli::run_config_init(&config_file, force)?,
            ConfigAction::Show => cli::run_config_show(&config_file)?,
        },
    }

    Ok(())
}
