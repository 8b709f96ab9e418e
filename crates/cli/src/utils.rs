use eyre::{Result, WrapErr};
use kestrel_wallets::SessionSecret;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initializes a tracing subscriber for logging, filtered by `RUST_LOG`.
pub fn subscriber() {
    let _ = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Reads and deserializes the JSON file at `path`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).wrap_err_with(|| format!("failed to parse {}", path.display()))
}

/// Writes `value` as pretty JSON to stdout.
pub fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Returns the session secret passed on the command line or prompts for it.
pub fn session_secret(secret: Option<String>) -> Result<SessionSecret> {
    let secret = match secret {
        Some(secret) => secret,
        None => rpassword::prompt_password("Session secret: ")
            .wrap_err("failed to read session secret")?,
    };
    Ok(SessionSecret::new(secret))
}
