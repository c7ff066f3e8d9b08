// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Single-use verification values (email confirmation, password reset).

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{Connection, params};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::models::{Verification, fmt_ts};
use crate::query::{self, Dir, Filter, FindMany};

use super::random_token;

const VALUE_LEN: usize = 24;

/// Issues a fresh value for `identifier`, replacing any outstanding one.
pub fn issue(
    conn: &mut Connection,
    cfg: &Config,
    identifier: &str,
    now: DateTime<Utc>,
) -> Result<Verification> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(StoreError::Validation("Identifier must not be empty".into()));
    }
    let value = random_token(VALUE_LEN);
    let now_s = fmt_ts(&now);
    let tx = conn.transaction()?;
    query::delete_many::<Verification>(&tx, &Filter::new().eq("identifier", identifier))?;
    tx.execute(
        "INSERT INTO verifications(identifier, value, expires_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![identifier, value, fmt_ts(&(now + cfg.verification_ttl)), now_s],
    )?;
    let id = tx.last_insert_rowid();
    let v = query::get(&tx, id)?;
    tx.commit()?;
    info!("issued verification for {}", identifier);
    Ok(v)
}

pub fn latest(conn: &Connection, identifier: &str) -> Result<Option<Verification>> {
    query::find_first(
        conn,
        &FindMany::new(Filter::new().eq("identifier", identifier.trim()))
            .order_by("created_at", Dir::Desc),
    )
}

/// Returns true when `value` matches a live verification for `identifier`.
/// A matching row is deleted, so each value works once.
pub fn consume(
    conn: &Connection,
    identifier: &str,
    value: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let filter = Filter::new()
        .eq("identifier", identifier.trim())
        .eq("value", value.trim());
    let Some(v) = query::find_first::<Verification>(conn, &FindMany::new(filter))? else {
        return Ok(false);
    };
    query::delete::<Verification>(conn, v.id)?;
    if v.expires_at <= now {
        debug!("verification for {} expired", v.identifier);
        return Ok(false);
    }
    Ok(true)
}

pub fn purge_expired(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    let n = query::delete_many::<Verification>(conn, &Filter::new().lte("expires_at", now))?;
    info!("purged {} expired verification(s)", n);
    Ok(n)
}
