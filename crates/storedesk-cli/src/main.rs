//! storedesk - terminal front-end for the store administration API.
//!
//! Composes the core session layer with the OS keychain and the config file
//! and exposes a handful of commands for signing in and poking the API.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use storedesk_core::api::{ApiBaseUrl, RequestOptions, ReqwestTransport, TimeoutPolicy};
use storedesk_core::auth::{KeyringCredentialStore, LoginRedirect, Navigator};
use storedesk_core::config::{Config, FileSettings};
use storedesk_core::{ApiClient, SessionManager};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE: &str = "storedesk.log";

const USAGE: &str = "\
Usage: storedesk <command> [args]

Commands:
  login [username]        Sign in (password is prompted)
  logout                  Sign out and clear stored credentials
  status                  Show the current session
  whoami                  Re-fetch and show the profile
  verify-admin            Ask the server whether you are an admin
  get <path> [key=value]  GET an API path and print the JSON
  set-url <url>           Change the API base URL
  ping [url]              Check connectivity to the API";

/// Prints the expired-session notice; there is no login screen to jump to.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn to_login(&self, redirect: LoginRedirect) {
        if redirect.expired {
            eprintln!("Your session has expired. Run `storedesk login` to sign in again.");
        }
        if let Some(path) = redirect.return_to {
            eprintln!("(request was: {})", path);
        }
    }
}

/// Initialize the tracing subscriber for logging.
/// Logs go to stderr and, when a cache directory exists, to a log file.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match Config::cache_dir() {
        Ok(dir) if std::fs::create_dir_all(&dir).is_ok() => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn build_session() -> Result<SessionManager> {
    let config = Config::load()?;
    let settings = Arc::new(FileSettings::open_default()?);
    let store = Arc::new(KeyringCredentialStore::new(Config::user_data_path()?));
    let transport = Arc::new(ReqwestTransport::new().context("Failed to build HTTP client")?);

    let api = ApiClient::new(
        transport,
        store,
        Arc::new(ApiBaseUrl::default()),
        TimeoutPolicy::from_settings(&config.timeouts),
    );
    api.set_navigator(Arc::new(TerminalNavigator));

    Ok(SessionManager::new(api, settings))
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

async fn login(session: &SessionManager, username: Option<&String>) -> Result<()> {
    let username = match username {
        Some(name) => name.clone(),
        None => match session.last_username().await {
            Some(last) => {
                let input = prompt(&format!("Username [{}]: ", last))?;
                if input.is_empty() {
                    last
                } else {
                    input
                }
            }
            None => prompt("Username: ")?,
        },
    };
    if username.is_empty() {
        bail!("Username required");
    }

    let password = rpassword::prompt_password("Password: ")?;
    let user = session.login(&username, &password).await?;
    println!("Signed in as {}", user.display_name());
    Ok(())
}

fn print_status(session: &SessionManager) {
    println!("API:      {}", session.api().base_url().get());
    match session.current_user() {
        Some(user) => {
            println!("User:     {} ({})", user.display_name(), user.username);
            println!("Admin:    {}", if session.is_admin() { "yes" } else { "no" });
        }
        None => println!("User:     not signed in"),
    }
}

async fn get(session: &SessionManager, path: &str, params: &[String]) -> Result<()> {
    let mut options = RequestOptions::default();
    for param in params {
        let (key, value) = param
            .split_once('=')
            .with_context(|| format!("Expected key=value, got '{}'", param))?;
        options = options.query(key, value);
    }

    let value: serde_json::Value = session.api().get_with(path, options).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

async fn run(args: &[String]) -> Result<()> {
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let session = build_session()?;
    session.initialize().await;

    match command.as_str() {
        "login" => login(&session, args.get(1)).await?,
        "logout" => {
            session.logout().await;
            println!("Signed out");
        }
        "status" => print_status(&session),
        "whoami" => {
            if !session.is_authenticated() {
                bail!("Not signed in");
            }
            session.refresh_profile().await;
            print_status(&session);
        }
        "verify-admin" => {
            let admin = session.verify_admin().await;
            println!("{}", if admin { "admin" } else { "not admin" });
        }
        "get" => {
            let path = args.get(1).context("Missing path")?;
            get(&session, path, &args[2..]).await?;
        }
        "set-url" => {
            let url = args.get(1).context("Missing URL")?;
            let clean = session.update_base_url(url).await?;
            println!("API URL set to {}", clean);
        }
        "ping" => {
            let result = session
                .api()
                .check_connection(args.get(1).map(String::as_str))
                .await;
            if !result.connected {
                bail!("{}", result.message);
            }
            println!("{}", result.message);
        }
        _ => {
            eprintln!("{}", USAGE);
            bail!("Unknown command: {}", command);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();
    info!("storedesk starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    run(&args).await
}
