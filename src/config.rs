//! Locally stored settings and their resolution order:
//! command-line flag, then environment, then the `app_config` table, then a default.

use crate::error::{Error, Result};
use crate::storage::{repository, Database};

pub const TOKEN_KEY: &str = "token";
pub const TEAM_KEY: &str = "team_id";
pub const LOOKBACK_KEY: &str = "lookback_days";
pub const ENDPOINT_KEY: &str = "endpoint";

/// Environment variable holding the API credential.
pub const TOKEN_ENV: &str = "LINEAR_API_KEY";

pub const DEFAULT_LOOKBACK_DAYS: u32 = 14;

/// Keys `config set` accepts.
pub const KNOWN_KEYS: &[&str] = &[TOKEN_KEY, TEAM_KEY, LOOKBACK_KEY, ENDPOINT_KEY];

pub async fn get(db: &Database, key: &str) -> Result<Option<String>> {
    let key = key.to_string();
    let value = db
        .reader()
        .call(move |conn| repository::get_config(conn, &key))
        .await?;
    Ok(value)
}

pub async fn set(db: &Database, key: &str, value: &str) -> Result<()> {
    validate(key, value)?;
    db.writer()
        .call({
            let key = key.to_string();
            let value = value.trim().to_string();
            move |conn| repository::set_config(conn, &key, &value)
        })
        .await?;
    Ok(())
}

pub async fn unset(db: &Database, key: &str) -> Result<bool> {
    let key = key.to_string();
    let removed = db
        .writer()
        .call(move |conn| repository::delete_config(conn, &key))
        .await?;
    Ok(removed)
}

pub async fn list(db: &Database) -> Result<Vec<(String, String)>> {
    let all = db.reader().call(|conn| repository::list_config(conn)).await?;
    Ok(all)
}

fn validate(key: &str, value: &str) -> Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        return Err(Error::Config(format!(
            "unknown key '{key}' (expected one of: {})",
            KNOWN_KEYS.join(", ")
        )));
    }
    if value.trim().is_empty() {
        return Err(Error::Config(format!("{key} cannot be empty")));
    }
    if key == LOOKBACK_KEY {
        parse_lookback(value)?;
    }
    Ok(())
}

fn parse_lookback(value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{LOOKBACK_KEY} must be a whole number of days, got '{value}'")))
}

/// First non-blank candidate in precedence order.
pub fn first_present<I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

pub async fn resolve_token(db: &Database, flag: Option<&str>) -> Result<String> {
    let stored = get(db, TOKEN_KEY).await?;
    first_present([
        flag.map(str::to_string),
        std::env::var(TOKEN_ENV).ok(),
        stored,
    ])
    .ok_or_else(|| {
        Error::Config(format!(
            "no API token. Pass --token, set {TOKEN_ENV}, or run: linealyzer config set {TOKEN_KEY} <TOKEN>"
        ))
    })
}

pub async fn resolve_team(db: &Database, flag: Option<&str>) -> Result<String> {
    let stored = get(db, TEAM_KEY).await?;
    first_present([flag.map(str::to_string), stored]).ok_or_else(|| {
        Error::Config("no team selected. Pass --team or run: linealyzer teams".into())
    })
}

pub async fn resolve_lookback_days(db: &Database, flag: Option<u32>) -> Result<u32> {
    if let Some(days) = flag {
        return Ok(days);
    }
    match get(db, LOOKBACK_KEY).await? {
        Some(v) => parse_lookback(&v),
        None => Ok(DEFAULT_LOOKBACK_DAYS),
    }
}

pub async fn resolve_endpoint(db: &Database, flag: Option<&str>) -> Result<String> {
    let stored = get(db, ENDPOINT_KEY).await?;
    Ok(first_present([flag.map(str::to_string), stored])
        .unwrap_or_else(|| crate::api::DEFAULT_ENDPOINT.to_string()))
}

/// Show only the last four characters of a secret.
pub fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".into();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}
