//! portal-auth - command-line access to the research portal API.
//!
//! Logs in once, keeps the session persisted between runs, and sends
//! authorized requests through the same refresh-and-retry path the portal
//! front end uses.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use portal_auth_core::{
    ApiClient, ApiRequest, AuthError, AuthSessionManager, Config, Credentials,
    RequestInterceptor, Session,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: portal-auth <command>

Commands:
  login [email]        Log in and persist the session
  logout               End the session and clear stored tokens
  status               Show the current session
  refresh              Renew the access token now
  get <path>           Send an authorized GET and print the response body
  delete <path>        Send an authorized DELETE
  post <path> <json>   Send an authorized POST with a JSON body";

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

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let config = Config::load().context("Failed to load configuration")?;
    info!(base_url = %config.base_url, profile = %config.profile, "portal-auth starting");

    let client = Arc::new(ApiClient::from_config(&config)?);
    let manager = AuthSessionManager::new(
        client.clone(),
        config.token_store()?,
        config.session_settings(),
    );
    let api = RequestInterceptor::new(manager.clone(), client);

    match command.as_str() {
        "login" => login(&manager, args.get(1).cloned()).await,
        "logout" => {
            manager.logout().await;
            println!("Logged out.");
            Ok(())
        }
        "status" => {
            print_status(&manager.current_session());
            Ok(())
        }
        "refresh" => {
            let held = manager.current_session();
            let session = manager
                .ensure_fresh_token(held.access_token())
                .await
                .map_err(session_error)?;
            print_status(&session);
            Ok(())
        }
        "get" => send(&api, ApiRequest::get(path_arg(&args)?)).await,
        "delete" => send(&api, ApiRequest::delete(path_arg(&args)?)).await,
        "post" => {
            let body: serde_json::Value = serde_json::from_str(
                args.get(2).map(String::as_str).unwrap_or("{}"),
            )
            .context("Request body must be valid JSON")?;
            send(&api, ApiRequest::post(path_arg(&args)?).json(&body)?).await
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

fn path_arg(args: &[String]) -> Result<String> {
    args.get(1)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Missing request path\n\n{}", USAGE))
}

async fn login(manager: &AuthSessionManager, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| std::env::var("PORTAL_EMAIL").ok()) {
        Some(email) => email,
        None => prompt_email()?,
    };
    let password = match std::env::var("PORTAL_PASSWORD") {
        Ok(password) if !password.is_empty() => password,
        _ => rpassword::prompt_password("Password: ")?,
    };

    println!("\nAuthenticating...");
    let session = manager
        .login(&Credentials::new(email, password))
        .await
        .map_err(|e| match e {
            AuthError::InvalidCredentials => anyhow::anyhow!("Invalid email or password"),
            AuthError::NetworkError(reason) => {
                anyhow::anyhow!("Unable to reach the portal: {}", reason)
            }
            other => other.into(),
        })?;

    println!("Login successful!\n");
    print_status(&session);
    Ok(())
}

fn prompt_email() -> Result<String> {
    print!("Email: ");
    io::stdout().flush()?;

    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    Ok(email.trim().to_string())
}

async fn send(api: &RequestInterceptor, request: ApiRequest) -> Result<()> {
    let response = api.execute(&request).await.map_err(session_error)?;
    let status = response.status();
    if status.is_success() {
        println!("{}", response.text());
        Ok(())
    } else {
        eprintln!("{} {}", status, response.text());
        std::process::exit(1);
    }
}

/// Terminal session errors tell the user to log in again.
fn session_error(e: AuthError) -> anyhow::Error {
    if e.is_terminal() {
        anyhow::anyhow!("{}\nRun `portal-auth login` to start a new session.", e)
    } else {
        e.into()
    }
}

fn print_status(session: &Session) {
    println!("State:    {}", session.state());
    if let Some(identity) = session.identity() {
        println!("User:     {} <{}>", identity.display_name, identity.email);
        println!("Role:     {}", identity.role);
    }
    if let Some(expires_at) = session.expires_at() {
        println!(
            "Expires:  {} ({} min left)",
            expires_at.to_rfc3339(),
            session.minutes_until_expiry(Utc::now())
        );
    }
}
