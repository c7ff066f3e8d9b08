// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::Utc;
use log::info;
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::error::{Result, StoreError, on_conflict};
use crate::models::{Favorite, Portfolio, Position, Transaction, User, fmt_ts};
use crate::query::{self, Dir, Filter, FindMany, Update};

pub const DEFAULT_NAME: &str = "My Portfolio";

pub fn create(conn: &Connection, user_id: i64, name: Option<&str>) -> Result<Portfolio> {
    query::get::<User>(conn, user_id)?;
    let name = name
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_NAME);
    let now = fmt_ts(&Utc::now());
    conn.execute(
        "INSERT INTO portfolios(user_id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![user_id, name, now],
    )
    .map_err(on_conflict("portfolio", format!("user {}", user_id)))?;
    let id = conn.last_insert_rowid();
    info!("created portfolio {} for user {}", id, user_id);
    query::get(conn, id)
}

pub fn for_user(conn: &Connection, user_id: i64) -> Result<Option<Portfolio>> {
    query::find_first(conn, &FindMany::new(Filter::new().eq("user_id", user_id)))
}

pub fn get_or_create(conn: &Connection, user_id: i64) -> Result<Portfolio> {
    match for_user(conn, user_id)? {
        Some(p) => Ok(p),
        None => create(conn, user_id, None),
    }
}

pub fn rename(conn: &Connection, id: i64, name: &str) -> Result<Portfolio> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("Portfolio name must not be empty".into()));
    }
    let n = query::update_many::<Portfolio>(
        conn,
        &Filter::id(id),
        &[
            ("name", Update::Set(name.into())),
            ("updated_at", Update::Set(Utc::now().into())),
        ],
    )?;
    if n == 0 {
        return Err(StoreError::not_found("portfolio", id));
    }
    query::get(conn, id)
}

#[derive(Debug, Serialize)]
pub struct PortfolioDetail {
    pub portfolio: Portfolio,
    pub positions: Vec<Position>,
    pub transactions: Vec<Transaction>,
    pub favorites: Vec<Favorite>,
}

/// Loads a portfolio with its positions, trade history (newest first) and favorites.
pub fn detail(conn: &Connection, id: i64) -> Result<PortfolioDetail> {
    let portfolio: Portfolio = query::get(conn, id)?;
    let owned = Filter::new().eq("portfolio_id", id);
    let positions = query::find_many(
        conn,
        &FindMany::new(owned.clone()).order_by("symbol", Dir::Asc),
    )?;
    let transactions = query::find_many(
        conn,
        &FindMany::new(owned.clone())
            .order_by("date", Dir::Desc)
            .order_by("id", Dir::Desc),
    )?;
    let favorites = query::find_many(
        conn,
        &FindMany::new(owned).order_by("symbol", Dir::Asc),
    )?;
    Ok(PortfolioDetail {
        portfolio,
        positions,
        transactions,
        favorites,
    })
}
