//! MatesEvents terminal client.
//!
//! Restores the session at startup, then offers a small prompt for signing
//! in, registering and signing out. Every session transition is echoed as it
//! happens, the same way the mobile UI re-renders from the session state.

mod commands;
mod credentials;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mates_core::{
    AuthError, Config, IdentityBackend, Session, SessionManager, SessionStatus, SimulatedBackend,
};

use commands::{Command, ParseError, HELP};
use credentials::CredentialStore;

/// File name prefix for daily log files
const LOG_FILE_PREFIX: &str = "mates.log";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr unless a log directory is configured. The returned guard
/// must live until exit so buffered file logs are flushed.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match config.log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load()?;
    if let Some(auto_login) = env_flag("MATES_AUTO_LOGIN") {
        config.auto_login_for_development = auto_login;
    }

    let _log_guard = init_tracing(&config);
    info!("MatesEvents client starting");

    let backend: Arc<dyn IdentityBackend> =
        Arc::new(SimulatedBackend::with_latency(config.simulated_latency()));
    let manager = SessionManager::new(config.session_config(), backend, config.session_store()?);

    tokio::spawn(echo_transitions(manager.subscribe()));

    match manager.restore_session().await {
        Ok(status) => info!(?status, "Startup restore finished"),
        Err(e) => {
            warn!(error = %e, "Startup restore failed");
            println!("{}", e.user_message());
        }
    }

    if manager.status() == SessionStatus::Unauthenticated {
        offer_remembered_login(&manager, &config).await?;
    }

    println!("Type `help` for commands.");
    let result = run_prompt(&manager, &mut config).await;

    info!("MatesEvents client shutting down");
    result
}

/// Print every session transition, like a UI re-render
async fn echo_transitions(mut rx: watch::Receiver<Session>) {
    let mut last = rx.borrow_and_update().status();
    while rx.changed().await.is_ok() {
        let session = rx.borrow_and_update().clone();
        if session.status() == last {
            continue;
        }
        last = session.status();
        match session.current_user() {
            Some(user) => println!("\n[session] signed in as {} ({})", user.display_name, user.masked_email()),
            None => println!("\n[session] {}", status_label(last)),
        }
    }
}

fn status_label(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Unknown => "unknown",
        SessionStatus::Checking => "checking saved session...",
        SessionStatus::Authenticated => "signed in",
        SessionStatus::Unauthenticated => "signed out",
    }
}

/// Sign in with the keychain password of the last account, if the user agrees
async fn offer_remembered_login(manager: &SessionManager, config: &Config) -> Result<()> {
    let Some(ref email) = config.last_email else {
        return Ok(());
    };
    if !CredentialStore::has_credentials(email) {
        return Ok(());
    }

    let answer = prompt(&format!("Sign in as {} with stored password? [Y/n]: ", email))?;
    if answer.to_lowercase() == "n" {
        return Ok(());
    }

    let password = CredentialStore::get_password(email)?;
    if let Err(e) = manager.login(email, &password).await {
        report(&e);
    }
    Ok(())
}

async fn run_prompt(manager: &SessionManager, config: &mut Config) -> Result<()> {
    loop {
        let line = match read_line("mates> ")? {
            Some(line) => line,
            // EOF
            None => return Ok(()),
        };

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(ParseError::Empty) => continue,
            Err(ParseError::Unknown(word)) => {
                println!("Unknown command: {} (try `help`)", word);
                continue;
            }
            Err(ParseError::MissingArgument(arg)) => {
                println!("Missing argument: <{}>", arg);
                continue;
            }
        };

        match command {
            Command::Login(email) => {
                let email = resolve_email(email, config)?;
                let password = read_password("Password: ")?;
                match manager.login(&email, &password).await {
                    Ok(_) => remember(config, &email, &password)?,
                    Err(e) => report(&e),
                }
            }
            Command::Register(email) => {
                let email = resolve_email(email, config)?;
                let password = read_password("Password: ")?;
                let confirm = rpassword::prompt_password("Confirm password: ")?;
                if password != confirm {
                    println!("Passwords do not match");
                    continue;
                }
                match manager.register(&email, &password).await {
                    Ok(_) => remember(config, &email, &password)?,
                    Err(e) => report(&e),
                }
            }
            Command::Logout => {
                let answer = prompt("Are you sure you want to sign out? [y/N]: ")?;
                if answer.to_lowercase() == "y" {
                    manager.logout();
                }
            }
            Command::Status => print_status(&manager.snapshot()),
            Command::Rename(name) => match manager.update_display_name(&name).await {
                Ok(user) => println!("Display name changed to {}", user.display_name),
                Err(e) => report(&e),
            },
            Command::Reset(email) => {
                let email = match (email, manager.current_user()) {
                    (Some(email), _) => email,
                    (None, Some(user)) => user.email,
                    (None, None) => resolve_email(None, config)?,
                };
                match manager.request_password_reset(&email).await {
                    Ok(()) => println!("Check {} for a link to reset your password", email),
                    Err(e) => report(&e),
                }
            }
            Command::Forget => {
                if let Some(ref email) = config.last_email {
                    match CredentialStore::delete(email) {
                        Ok(()) => println!("Forgot stored password for {}", email),
                        Err(e) => println!("Nothing to forget: {}", e),
                    }
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(()),
        }
    }
}

fn print_status(session: &Session) {
    match session.current_user() {
        Some(user) => {
            println!("Signed in as {}", user.display_name);
            println!("  email: {}", user.masked_email());
            println!("  id:    {}", user.id);
        }
        None => println!("Status: {}", status_label(session.status())),
    }
    if session.busy {
        println!("  (an operation is in progress)");
    }
}

fn report(err: &AuthError) {
    warn!(error = %err, "Session operation failed");
    println!("{}", err.user_message());
}

/// Remember the email in config and offer to keep the password in the keychain
fn remember(config: &mut Config, email: &str, password: &str) -> Result<()> {
    config.last_email = Some(email.trim().to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    let answer = prompt("Remember password on this device? [y/N]: ")?;
    if answer.to_lowercase() == "y" {
        if let Err(e) = CredentialStore::store(email.trim(), password) {
            warn!(error = %e, "Failed to store credentials");
            println!("Could not save password to the keychain");
        }
    }
    Ok(())
}

/// Email from the command, `MATES_EMAIL`, or a prompt defaulting to the last one used
fn resolve_email(email: Option<String>, config: &Config) -> Result<String> {
    if let Some(email) = email.or_else(|| std::env::var("MATES_EMAIL").ok()) {
        return Ok(email);
    }
    match config.last_email {
        Some(ref last) => {
            let input = prompt(&format!("Email [{}]: ", last))?;
            Ok(if input.is_empty() { last.clone() } else { input })
        }
        None => prompt("Email: "),
    }
}

fn read_password(label: &str) -> Result<String> {
    match std::env::var("MATES_PASSWORD") {
        Ok(password) => Ok(password),
        Err(_) => Ok(rpassword::prompt_password(label)?),
    }
}

fn prompt(label: &str) -> Result<String> {
    Ok(read_line(label)?.unwrap_or_default())
}

/// Read one trimmed line; `None` at end of input
fn read_line(label: &str) -> Result<Option<String>> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}
