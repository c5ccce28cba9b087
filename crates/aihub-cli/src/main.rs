//! aihub - terminal front end for the aihub inference services.
//!
//! Logs in against the aihub backend, keeps the session across runs, and
//! sends authenticated requests to the chat, image, speech, and translation
//! endpoints.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use reqwest::{header, Method, Request};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aihub_core::api::{AccountClient, ApiClient, AuthApi};
use aihub_core::auth::{CredentialProvider, Session, SessionError};
use aihub_core::Config;

const USAGE: &str = "\
Usage: aihub <command> [args]

Commands:
  login [email]                  Log in and remember the session
  register <email> <username>    Create an account and log in
  logout                         Forget the stored session
  whoami                         Show the logged-in user
  fetch <method> <path> [json]   Send an authenticated request, e.g. `fetch POST chat '{\"message\":\"hi\"}'`
  change-password                Change the account password
  delete-account                 Delete the account and log out
  check-password                 Check a password against the backend policy";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let mut config = Config::load()?;
    let api = ApiClient::new(config.base_url())?;
    let provider = CredentialProvider::start(config.token_store()?, Arc::new(api)).await;
    info!(command = %command, state = provider.session().name(), "aihub starting");

    match command.as_str() {
        "login" => {
            let email = match args.get(1) {
                Some(email) => email.clone(),
                None => prompt("Email", config.last_email.as_deref())?,
            };
            let password = rpassword::prompt_password("Password: ")?;
            let identity = report(provider.login(&email, &password).await)?;
            config.last_email = Some(email);
            config.save()?;
            println!("Logged in as {} ({})", identity.username, identity.role);
        }
        "register" => {
            let (Some(email), Some(username)) = (args.get(1), args.get(2)) else {
                bail!("register needs <email> <username>\n\n{}", USAGE);
            };
            let password = rpassword::prompt_password("Password: ")?;
            let identity = report(provider.register(email, username, &password).await)?;
            println!("Registered and logged in as {}", identity.username);
        }
        "logout" => {
            provider.logout();
            println!("Logged out");
        }
        "whoami" => whoami(&provider),
        "fetch" => {
            let (Some(method), Some(path)) = (args.get(1), args.get(2)) else {
                bail!("fetch needs <method> <path>\n\n{}", USAGE);
            };
            fetch(&provider, method, path, args.get(3).map(String::as_str)).await?;
        }
        "change-password" => {
            let current = rpassword::prompt_password("Current password: ")?;
            let new = rpassword::prompt_password("New password: ")?;
            let confirm = rpassword::prompt_password("Confirm new password: ")?;
            report(
                AccountClient::new(provider)
                    .change_password(&current, &new, &confirm)
                    .await,
            )?;
            println!("Password changed successfully");
        }
        "delete-account" => {
            let answer = prompt("Type DELETE to permanently remove your account", None)?;
            if answer != "DELETE" {
                println!("Cancelled");
                return Ok(());
            }
            let password = rpassword::prompt_password("Password: ")?;
            report(AccountClient::new(provider).delete_account(&password).await)?;
            println!("Account deleted. You have been logged out.");
        }
        "check-password" => {
            let password = rpassword::prompt_password("Password: ")?;
            let strength = report(AccountClient::new(provider).validate_password(&password).await)?;
            if strength.is_valid {
                println!("Password meets the policy");
            } else {
                for error in &strength.errors {
                    println!("- {}", error);
                }
            }
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }

    Ok(())
}

fn whoami(provider: &CredentialProvider) {
    match provider.session() {
        Session::Authenticated { identity, .. } => {
            let now = provider.session_manager().now();
            println!("{} <{}>", identity.username, identity.email);
            println!("  id:   {}", identity.subject_id);
            println!("  role: {}", identity.role);
            if identity.is_expired(now) {
                println!("  access token expired; it will be renewed on the next request");
            } else {
                println!(
                    "  access token expires in {}s",
                    identity.seconds_until_expiry(now)
                );
            }
        }
        Session::Invalid => println!("Your saved session has expired. Run `aihub login`."),
        _ => println!("Not logged in"),
    }
}

async fn fetch(
    provider: &CredentialProvider,
    method: &str,
    path: &str,
    body: Option<&str>,
) -> Result<()> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", method))?;
    let url = provider.api().endpoint(path)?;
    let mut request = Request::new(method, url);
    if let Some(body) = body {
        let json: serde_json::Value = serde_json::from_str(body).context("Body must be JSON")?;
        request.headers_mut().insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        *request.body_mut() = Some(serde_json::to_vec(&json)?.into());
    }

    let response = match provider.authorized_fetch(request).await {
        Ok(response) => response,
        Err(SessionError::SessionExpired { response }) => {
            eprintln!("Session expired - run `aihub login` to sign in again.");
            match response {
                Some(response) => *response,
                None => return Ok(()),
            }
        }
        Err(e) => bail!("{}", e),
    };

    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    println!("{}", status);
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}

/// Turn a session error into the message shown to the user.
// SessionExpired may hold a response body, so errors are flattened to text.
fn report<T>(result: Result<T, SessionError>) -> Result<T> {
    result.map_err(|e| match e {
        SessionError::SessionExpired { .. } => {
            anyhow::anyhow!("Session expired - run `aihub login` to sign in again")
        }
        other => anyhow::anyhow!("{}", other),
    })
}

fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(default) => print!("{} [{}]: ", label, default),
        None => print!("{}: ", label),
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim();
    if line.is_empty() {
        if let Some(default) = default {
            return Ok(default.to_string());
        }
    }
    Ok(line.to_string())
}
