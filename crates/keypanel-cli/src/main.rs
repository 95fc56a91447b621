//! keypanel - command line access to the key panel API.
//!
//! Logs in, keeps the session on disk (or in the OS keychain), and issues
//! authenticated requests that refresh an expired access token on their own.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keypanel_core::auth::{foreground_channel, SessionListener};
use keypanel_core::{Config, SessionClient, SessionContext, SessionExpiredNotifier};

/// Environment variable holding the password for non-interactive login
const PASSWORD_ENV: &str = "KEYPANEL_PASSWORD";

#[derive(Parser)]
#[command(name = "keypanel", version, about = "Key panel API client")]
struct Cli {
    /// Panel base URL (overrides config and KEYPANEL_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Show the stored session without contacting the server
    Status,
    /// Fetch the profile of the signed-in user
    Profile,
    /// GET an API path and print the JSON envelope
    Get { path: String },
    /// Sign out and forget the stored session
    Logout,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };
    if let Some(url) = cli.url {
        config.base_url = url;
    }

    // Expiry notices are queued here and printed by the main task
    let (handle, mut foreground) = foreground_channel();
    let notifier = Arc::new(SessionExpiredNotifier::with_foreground(handle));
    let on_expired: SessionListener = Arc::new(|| {
        eprintln!("Your session has expired. Run `keypanel login` to sign in again.");
    });
    notifier.add_listener(&on_expired);

    let store = config.open_store()?;
    let session = Arc::new(SessionContext::restore(store, Arc::clone(&notifier)));
    let client = SessionClient::from_config(&config, session)?;

    let result = run(cli.command, &client, &mut config).await;

    foreground.run_pending();
    notifier.remove_listener(&on_expired);
    result
}

async fn run(command: Command, client: &SessionClient, config: &mut Config) -> Result<()> {
    match command {
        Command::Login { username } => login(client, config, username).await,
        Command::Status => {
            status(client);
            Ok(())
        }
        Command::Profile => {
            let user = client.profile().await.context("Failed to fetch profile")?;
            println!("{}", serde_json::to_string_pretty(&user)?);
            Ok(())
        }
        Command::Get { path } => {
            let envelope = client
                .get_json::<serde_json::Value>(&path)
                .await
                .with_context(|| format!("GET {} failed", path))?;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }
        Command::Logout => {
            if let Err(e) = client.logout().await {
                warn!(error = %e, "Server did not acknowledge logout");
            }
            println!("Logged out.");
            Ok(())
        }
    }
}

async fn login(client: &SessionClient, config: &mut Config, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) if !name.is_empty() => name,
        _ => prompt_username()?,
    };
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => password,
        _ => rpassword::prompt_password("Password: ")?,
    };

    if username.is_empty() || password.is_empty() {
        return Err(anyhow::anyhow!("Username and password required"));
    }

    let user = match client.login(&username, &password).await {
        Ok(user) => user,
        Err(e) if e.is_unauthorized() => {
            return Err(anyhow::anyhow!("Login failed: invalid username or password"))
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Login failed")),
    };

    config.last_username = Some(username);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    info!(user_id = user.user_id, "Logged in");
    println!("Logged in as {}.", user.display_name());
    Ok(())
}

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    Ok(username.trim().to_string())
}

fn status(client: &SessionClient) {
    let session = client.session();
    match session.identity() {
        Some(record) => {
            println!("User:       {} (id {})", record.username, record.user_id);
            if !record.fullname.is_empty() {
                println!("Name:       {}", record.fullname);
            }
            println!("Logged in:  {}", record.logged_in_at.format("%Y-%m-%d %H:%M UTC"));
            println!(
                "Token:      {}",
                if session.is_authenticated() { "present" } else { "missing" }
            );
        }
        None => println!("Not logged in."),
    }
}
