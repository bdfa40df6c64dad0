//! CLI command handlers
//!
//! Each handler runs one core operation and renders its typed outcome.
//! Benign results (cancelled sign-in, nothing cached) print a notice and
//! succeed; everything else propagates as an error.

use crate::auth::AuthError;
use crate::config::Config;
use crate::graph::ApiCallError;
use crate::session::{credential_store, SessionError, SessionState, SignInOutcome, SignInSession};
use anyhow::Result;
use colored::Colorize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Resolve the config file: explicit path or the default location
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::config_path(),
    }
}

fn load_session(config_file: &Path) -> Result<SignInSession> {
    let config = Config::load_from(config_file)?;
    SignInSession::from_config(&config)
}

fn print_directory(result: &Value) {
    match serde_json::to_string_pretty(result) {
        Ok(pretty) => println!("{}", pretty),
        Err(_) => println!("{}", result),
    }
}

fn print_api_error(err: &ApiCallError) {
    println!("{} {}", "Directory lookup failed:".red().bold(), err);
}

/// Interactive sign-in, followed by the directory lookup when enabled
pub async fn run_signin(config_file: &Path) -> Result<()> {
    let mut session = load_session(config_file)?;

    match session.sign_in().await? {
        SignInOutcome::Cancelled => {
            println!("{}", "Sign-in cancelled.".yellow());
        }
        SignInOutcome::SignedIn {
            credential,
            directory,
        } => {
            println!(
                "{} {}",
                "Signed in as".green().bold(),
                credential.display_name()
            );
            match directory {
                Some(Ok(result)) => {
                    println!();
                    println!("{}", "Directory result:".bold());
                    print_directory(&result);
                }
                Some(Err(e)) => print_api_error(&e),
                None => {}
            }
        }
    }
    Ok(())
}

/// Silent probe of the cached sign-in
pub async fn run_status(config_file: &Path) -> Result<()> {
    let mut session = load_session(config_file)?;

    match session.probe().await? {
        SessionState::SignedIn { display_id, .. } => {
            println!("{} {}", "Signed in as".green().bold(), display_id);
        }
        SessionState::SignedOut => {
            println!("{}", "Not signed in.".yellow());
            println!("Run `graph-signin signin` to sign in.");
        }
    }
    Ok(())
}

/// Directory lookup with a silently acquired token
pub async fn run_me(config_file: &Path) -> Result<()> {
    let mut session = load_session(config_file)?;

    match session.directory_lookup().await {
        Ok(result) => print_directory(&result),
        Err(SessionError::Auth(AuthError::InteractionRequired)) => {
            println!("{}", "Not signed in.".yellow());
            println!("Run `graph-signin signin` to sign in.");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Clear the token cache and the browser session
///
/// An incomplete `[auth]` section only skips the browser session reset; the
/// cache is still cleared.
pub async fn run_signout(config_file: &Path) -> Result<()> {
    let config = Config::load_from(config_file)?;
    match SignInSession::from_config(&config) {
        Ok(mut session) => session.sign_out().await,
        Err(e) => {
            tracing::warn!("Skipping browser session reset: {:#}", e);
            credential_store(&config.cache)?.clear();
        }
    }
    println!("{}", "Signed out.".green());
    Ok(())
}

/// Write a default config file
pub fn run_config_init(config_file: &Path, force: bool) -> Result<()> {
    if config_file.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_file.display()
        );
    }
    Config::default().save_to(config_file)?;
    println!("Wrote {}", config_file.display());
    println!("Set auth.tenant and auth.client_id before signing in.");
    Ok(())
}

/// Print the effective configuration
pub fn run_config_show(config_file: &Path) -> Result<()> {
    let config = Config::load_from(config_file)?;
    println!("# {}", config_file.display());
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
