// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Provider accounts linked to a user (credentials or OAuth).

use chrono::Utc;
use log::info;
use rusqlite::{Connection, params};

use crate::error::{Result, StoreError, on_conflict};
use crate::models::{Account, AccountTokens, NewAccount, User, fmt_ts};
use crate::query::{self, Dir, Filter, FindMany, Update};

pub const CREDENTIAL_PROVIDER: &str = "credential";

pub fn link(conn: &Connection, new: &NewAccount) -> Result<Account> {
    let provider = new.provider_id.trim();
    let account_id = new.account_id.trim();
    if provider.is_empty() || account_id.is_empty() {
        return Err(StoreError::Validation(
            "Provider and account id are required".into(),
        ));
    }
    query::get::<User>(conn, new.user_id)?;
    let now = fmt_ts(&Utc::now());
    conn.execute(
        "INSERT INTO accounts(user_id, account_id, provider_id, access_token, refresh_token, id_token,
                              access_token_expires_at, refresh_token_expires_at, scope, password,
                              created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            new.user_id,
            account_id,
            provider,
            new.access_token,
            new.refresh_token,
            new.id_token,
            new.access_token_expires_at.as_ref().map(fmt_ts),
            new.refresh_token_expires_at.as_ref().map(fmt_ts),
            new.scope,
            new.password,
            now
        ],
    )
    .map_err(on_conflict("account", format!("{}:{}", provider, account_id)))?;
    let id = conn.last_insert_rowid();
    info!("linked {} account for user {}", provider, new.user_id);
    query::get(conn, id)
}

pub fn list_for_user(conn: &Connection, user_id: i64) -> Result<Vec<Account>> {
    query::find_many(
        conn,
        &FindMany::new(Filter::new().eq("user_id", user_id)).order_by("provider_id", Dir::Asc),
    )
}

pub fn find_by_provider(
    conn: &Connection,
    provider_id: &str,
    account_id: &str,
) -> Result<Option<Account>> {
    query::find_first(
        conn,
        &FindMany::new(
            Filter::new()
                .eq("provider_id", provider_id.trim())
                .eq("account_id", account_id.trim()),
        ),
    )
}

pub fn update_tokens(conn: &Connection, id: i64, tokens: &AccountTokens) -> Result<Account> {
    let n = query::update_many::<Account>(
        conn,
        &Filter::id(id),
        &[
            ("access_token", Update::Set(tokens.access_token.clone().into())),
            ("refresh_token", Update::Set(tokens.refresh_token.clone().into())),
            ("id_token", Update::Set(tokens.id_token.clone().into())),
            (
                "access_token_expires_at",
                Update::Set(tokens.access_token_expires_at.into()),
            ),
            (
                "refresh_token_expires_at",
                Update::Set(tokens.refresh_token_expires_at.into()),
            ),
            ("scope", Update::Set(tokens.scope.clone().into())),
            ("updated_at", Update::Set(Utc::now().into())),
        ],
    )?;
    if n == 0 {
        return Err(StoreError::not_found("account", id));
    }
    query::get(conn, id)
}

/// Removes a provider link. A user always keeps at least one way to sign in.
pub fn unlink(conn: &Connection, user_id: i64, provider_id: &str) -> Result<()> {
    let by_user = Filter::new().eq("user_id", user_id);
    let total = query::count::<Account>(conn, &by_user)?;
    let matching = by_user.eq("provider_id", provider_id.trim());
    let hits = query::count::<Account>(conn, &matching)?;
    if hits == 0 {
        return Err(StoreError::not_found("account", provider_id.trim()));
    }
    if total - hits < 1 {
        return Err(StoreError::LastAccount(user_id));
    }
    query::delete_many::<Account>(conn, &matching)?;
    info!("unlinked {} from user {}", provider_id.trim(), user_id);
    Ok(())
}
