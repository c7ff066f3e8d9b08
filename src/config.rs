// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Runtime settings. Each value resolves as environment variable, then the
//! `settings` table, then the built-in default.

use anyhow::{Context, Result, anyhow};
use chrono::Duration;
use log::warn;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

pub const SESSION_TTL_HOURS: &str = "session_ttl_hours";
pub const SESSION_UPDATE_AGE_HOURS: &str = "session_update_age_hours";
pub const VERIFICATION_TTL_MINUTES: &str = "verification_ttl_minutes";

/// (key, default, env var)
const KNOWN: &[(&str, i64, &str)] = &[
    (SESSION_TTL_HOURS, 24 * 7, "STOCKFOLIO_SESSION_TTL_HOURS"),
    (SESSION_UPDATE_AGE_HOURS, 24, "STOCKFOLIO_SESSION_UPDATE_AGE_HOURS"),
    (VERIFICATION_TTL_MINUTES, 60, "STOCKFOLIO_VERIFICATION_TTL_MINUTES"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub session_ttl: Duration,
    pub session_update_age: Duration,
    pub verification_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            session_ttl: Duration::hours(24 * 7),
            session_update_age: Duration::hours(24),
            verification_ttl: Duration::minutes(60),
        }
    }
}

impl Config {
    pub fn load(conn: &Connection) -> Result<Config> {
        Ok(Config {
            session_ttl: Duration::hours(resolve(conn, SESSION_TTL_HOURS)?),
            session_update_age: Duration::hours(resolve(conn, SESSION_UPDATE_AGE_HOURS)?),
            verification_ttl: Duration::minutes(resolve(conn, VERIFICATION_TTL_MINUTES)?),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct SettingRow {
    pub key: String,
    pub value: i64,
    pub source: &'static str,
}

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let v: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key=?1",
            params![key],
            |r| r.get(0),
        )
        .optional()?;
    Ok(v)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    if !KNOWN.iter().any(|(k, _, _)| *k == key) {
        return Err(anyhow!("Unknown setting '{}'", key));
    }
    let n: i64 = value
        .trim()
        .parse()
        .with_context(|| format!("Setting '{}' expects a whole number, got '{}'", key, value))?;
    if n <= 0 {
        return Err(anyhow!("Setting '{}' must be positive", key));
    }
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, n.to_string()],
    )?;
    Ok(())
}

pub fn describe(conn: &Connection) -> Result<Vec<SettingRow>> {
    let mut rows = Vec::with_capacity(KNOWN.len());
    for (key, default, env) in KNOWN {
        let (value, source) = if let Some(v) = env_value(env) {
            (v, "env")
        } else if let Some(v) = stored_value(conn, key)? {
            (v, "settings")
        } else {
            (*default, "default")
        };
        rows.push(SettingRow {
            key: key.to_string(),
            value,
            source,
        });
    }
    Ok(rows)
}

fn resolve(conn: &Connection, key: &str) -> Result<i64> {
    let (_, default, env) = KNOWN
        .iter()
        .find(|(k, _, _)| *k == key)
        .ok_or_else(|| anyhow!("Unknown setting '{}'", key))?;
    if let Some(v) = env_value(env) {
        return Ok(v);
    }
    Ok(stored_value(conn, key)?.unwrap_or(*default))
}

fn env_value(var: &str) -> Option<i64> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<i64>() {
        Ok(v) if v > 0 => Some(v),
        _ => {
            warn!("ignoring invalid {}='{}'", var, raw);
            None
        }
    }
}

fn stored_value(conn: &Connection, key: &str) -> Result<Option<i64>> {
    match get_setting(conn, key)? {
        Some(raw) => match raw.parse::<i64>() {
            Ok(v) if v > 0 => Ok(Some(v)),
            _ => {
                warn!("ignoring invalid stored setting {}='{}'", key, raw);
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE settings(key TEXT PRIMARY KEY, value TEXT NOT NULL);")
            .unwrap();
        conn
    }

    #[test]
    fn defaults_apply_without_settings() {
        let conn = setup();
        let cfg = Config::load(&conn).unwrap();
        assert_eq!(cfg.verification_ttl, Duration::minutes(60));
        assert_eq!(cfg.session_update_age, Duration::hours(24));
    }

    #[test]
    fn stored_settings_override_defaults() {
        let conn = setup();
        set_setting(&conn, VERIFICATION_TTL_MINUTES, " 15 ").unwrap();
        let cfg = Config::load(&conn).unwrap();
        assert_eq!(cfg.verification_ttl, Duration::minutes(15));
    }

    #[test]
    fn set_setting_rejects_unknown_and_invalid_values() {
        let conn = setup();
        assert!(set_setting(&conn, "base_currency", "USD").is_err());
        assert!(set_setting(&conn, SESSION_TTL_HOURS, "abc").is_err());
        assert!(set_setting(&conn, SESSION_TTL_HOURS, "0").is_err());
        assert_eq!(get_setting(&conn, SESSION_TTL_HOURS).unwrap(), None);
    }
}
