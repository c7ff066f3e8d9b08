// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{Connection, params};

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::models::{Session, User, fmt_ts};
use crate::query::{self, Dir, Filter, FindMany, Update};

use super::random_token;

const TOKEN_LEN: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct Client<'a> {
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub impersonated_by: Option<i64>,
}

pub fn create(
    conn: &Connection,
    cfg: &Config,
    user_id: i64,
    client: &Client<'_>,
    now: DateTime<Utc>,
) -> Result<Session> {
    let user: User = query::get(conn, user_id)?;
    if user.is_banned_at(now) {
        return Err(StoreError::Validation(format!(
            "User {} is banned",
            user.email
        )));
    }
    let token = random_token(TOKEN_LEN);
    let expires = now + cfg.session_ttl;
    let now_s = fmt_ts(&now);
    conn.execute(
        "INSERT INTO sessions(user_id, token, expires_at, ip_address, user_agent, impersonated_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            user_id,
            token,
            fmt_ts(&expires),
            client.ip_address,
            client.user_agent,
            client.impersonated_by,
            now_s
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!("created session {} for user {}", id, user_id);
    query::get(conn, id)
}

pub fn find_by_token(conn: &Connection, token: &str) -> Result<Option<Session>> {
    query::find_first(conn, &FindMany::new(Filter::new().eq("token", token)))
}

/// Resolves a token to its live session and user.
///
/// An expired session is deleted on sight. A session whose user is banned
/// resolves to `None` but is kept so it can be inspected.
pub fn validate(
    conn: &Connection,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<(Session, User)>> {
    let Some(session) = find_by_token(conn, token)? else {
        return Ok(None);
    };
    if session.expires_at <= now {
        query::delete::<Session>(conn, session.id)?;
        debug!("dropped expired session {}", session.id);
        return Ok(None);
    }
    let user: User = query::get(conn, session.user_id)?;
    if user.is_banned_at(now) {
        return Ok(None);
    }
    Ok(Some((session, user)))
}

/// Sliding expiry: once a session was last refreshed more than the update age
/// ago its expiry is pushed out to a full TTL from `now`. Returns the (possibly
/// refreshed) session.
pub fn refresh(conn: &Connection, cfg: &Config, token: &str, now: DateTime<Utc>) -> Result<Option<Session>> {
    let Some((session, _)) = validate(conn, token, now)? else {
        return Ok(None);
    };
    if now - session.updated_at < cfg.session_update_age {
        return Ok(Some(session));
    }
    query::update_many::<Session>(
        conn,
        &Filter::id(session.id),
        &[
            ("expires_at", Update::Set((now + cfg.session_ttl).into())),
            ("updated_at", Update::Set(now.into())),
        ],
    )?;
    debug!("refreshed session {}", session.id);
    query::find_unique(conn, session.id)
}

pub fn list_for_user(conn: &Connection, user_id: i64) -> Result<Vec<Session>> {
    query::find_many(
        conn,
        &FindMany::new(Filter::new().eq("user_id", user_id)).order_by("created_at", Dir::Desc),
    )
}

pub fn revoke(conn: &Connection, token: &str) -> Result<bool> {
    let n = query::delete_many::<Session>(conn, &Filter::new().eq("token", token))?;
    if n > 0 {
        info!("revoked session");
    }
    Ok(n > 0)
}

pub fn revoke_all(conn: &Connection, user_id: i64) -> Result<usize> {
    let n = query::delete_many::<Session>(conn, &Filter::new().eq("user_id", user_id))?;
    info!("revoked {} session(s) for user {}", n, user_id);
    Ok(n)
}

pub fn purge_expired(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    let n = query::delete_many::<Session>(conn, &Filter::new().lte("expires_at", now))?;
    info!("purged {} expired session(s)", n);
    Ok(n)
}
