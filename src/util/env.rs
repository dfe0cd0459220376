//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Every getter calls `init_env()` itself, so binaries and tests need no setup.
use std::str::FromStr;
use std::sync::Once;

use anyhow::{anyhow, Context, Result};
use tracing::info;
use url::Url;

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        let _ = dotenv::dotenv();
    });
}

/// Get required env var; error if missing.
pub fn env_req(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| anyhow!("missing env var {key}"))
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_parse_opt(key).unwrap_or(default)
}

/// Optional parsed value; unparsable input counts as unset.
pub fn env_parse_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    env_opt(key).and_then(|s| s.trim().parse().ok())
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    match env_opt(key) {
        Some(raw) => matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "on" | "yes"
        ),
        None => default,
    }
}

/// Target warehouse DSN.
pub fn warehouse_db_url() -> Result<String> {
    env_req("DATABASE_URL")
}

/// Staging database DSN: `SOURCE_DATABASE_URL`, else composed from the
/// `LOCAL_*` variables.
pub fn source_db_url() -> Result<String> {
    if let Some(url) = env_opt("SOURCE_DATABASE_URL") {
        return Ok(url);
    }
    let user = env_req("LOCAL_USER")?;
    let database = env_req("LOCAL_DB")?;
    let url = compose_local_url(
        &user,
        env_opt("LOCAL_PASSWORD").as_deref(),
        &env_opt("LOCAL_HOST").unwrap_or_else(|| "localhost".into()),
        env_parse("LOCAL_PORT", 5432u16),
        &database,
    )?;
    info!(target = "env", dsn = %redact_url(&url), "using composed LOCAL_* source DSN");
    Ok(url)
}

/// Builds a `postgresql://` DSN. `Url` percent-encodes user and password,
/// so reserved characters in the password survive.
pub fn compose_local_url(
    user: &str,
    password: Option<&str>,
    host: &str,
    port: u16,
    database: &str,
) -> Result<String> {
    let mut out = Url::parse("postgresql://localhost")?;
    out.set_host(Some(&normalize_ipv6_host(host)))
        .with_context(|| format!("invalid LOCAL_HOST {host:?}"))?;
    out.set_username(user).map_err(|_| anyhow!("cannot set user on source DSN"))?;
    out.set_password(password).map_err(|_| anyhow!("cannot set password on source DSN"))?;
    out.set_port(Some(port)).map_err(|_| anyhow!("cannot set port on source DSN"))?;
    out.set_path(&format!("/{database}"));
    Ok(out.to_string())
}

fn normalize_ipv6_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches(|c| c == '[' || c == ']');
    if trimmed.contains(':') {
        format!("[{trimmed}]")
    } else {
        trimmed.to_string()
    }
}

/// Masks the credentials of a DSN for logging. Host, port, path and query
/// are kept; anything that does not parse is hidden entirely.
pub fn redact_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url.trim()) else {
        return "***".to_string();
    };
    if !parsed.username().is_empty() {
        let _ = parsed.set_username("***");
    }
    if parsed.password().is_some() {
        let _ = parsed.set_password(Some("***"));
    }
    parsed.to_string()
}
