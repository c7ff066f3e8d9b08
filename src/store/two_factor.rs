// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use log::{info, warn};
use rusqlite::{Connection, params};

use crate::error::{Result, StoreError};
use crate::models::{TwoFactor, User};
use crate::query::{self, Filter, FindMany, Update};

use super::random_token;

const BACKUP_CODES: usize = 10;
const CODE_LEN: usize = 10;

fn fresh_codes() -> Vec<String> {
    (0..BACKUP_CODES)
        .map(|_| random_token(CODE_LEN).to_uppercase())
        .collect()
}

pub fn find_for_user(conn: &Connection, user_id: i64) -> Result<Option<TwoFactor>> {
    query::find_first(conn, &FindMany::new(Filter::new().eq("user_id", user_id)))
}

/// Stores the shared secret, flags the user, and returns the plain backup codes.
pub fn enable(conn: &mut Connection, user_id: i64, secret: &str) -> Result<Vec<String>> {
    let secret = secret.trim();
    if secret.is_empty() {
        return Err(StoreError::Validation("Secret must not be empty".into()));
    }
    let codes = fresh_codes();
    let encoded = serde_json::to_string(&codes)?;
    let tx = conn.transaction()?;
    query::get::<User>(&tx, user_id)?;
    query::delete_many::<TwoFactor>(&tx, &Filter::new().eq("user_id", user_id))?;
    tx.execute(
        "INSERT INTO two_factors(user_id, secret, backup_codes) VALUES (?1, ?2, ?3)",
        params![user_id, secret, encoded],
    )?;
    set_flag(&tx, user_id, true)?;
    tx.commit()?;
    info!("enabled two-factor for user {}", user_id);
    Ok(codes)
}

pub fn disable(conn: &mut Connection, user_id: i64) -> Result<()> {
    let tx = conn.transaction()?;
    query::get::<User>(&tx, user_id)?;
    query::delete_many::<TwoFactor>(&tx, &Filter::new().eq("user_id", user_id))?;
    set_flag(&tx, user_id, false)?;
    tx.commit()?;
    info!("disabled two-factor for user {}", user_id);
    Ok(())
}

/// Consumes one backup code. Returns false if the code is unknown or already used.
pub fn redeem_backup_code(conn: &Connection, user_id: i64, code: &str) -> Result<bool> {
    let Some(tf) = find_for_user(conn, user_id)? else {
        return Ok(false);
    };
    let mut codes = tf.codes()?;
    let wanted = code.trim().to_uppercase();
    let Some(pos) = codes.iter().position(|c| *c == wanted) else {
        warn!("rejected backup code for user {}", user_id);
        return Ok(false);
    };
    codes.remove(pos);
    store_codes(conn, tf.id, &codes)?;
    info!("user {} redeemed a backup code ({} left)", user_id, codes.len());
    Ok(true)
}

pub fn regenerate_codes(conn: &Connection, user_id: i64) -> Result<Vec<String>> {
    let tf = find_for_user(conn, user_id)?
        .ok_or_else(|| StoreError::not_found("two-factor", user_id))?;
    let codes = fresh_codes();
    store_codes(conn, tf.id, &codes)?;
    info!("regenerated backup codes for user {}", user_id);
    Ok(codes)
}

fn store_codes(conn: &Connection, id: i64, codes: &[String]) -> Result<()> {
    let encoded = serde_json::to_string(codes)?;
    query::update_many::<TwoFactor>(
        conn,
        &Filter::id(id),
        &[("backup_codes", Update::Set(encoded.into()))],
    )?;
    Ok(())
}

fn set_flag(conn: &Connection, user_id: i64, on: bool) -> Result<()> {
    query::update_many::<User>(
        conn,
        &Filter::id(user_id),
        &[
            ("two_factor_enabled", Update::Set(on.into())),
            ("updated_at", Update::Set(chrono::Utc::now().into())),
        ],
    )?;
    Ok(())
}
