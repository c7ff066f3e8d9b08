// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Position rows. Normally written only by [`crate::ledger`].

use chrono::Utc;
use log::debug;
use rusqlite::{Connection, params};

use crate::error::Result;
use crate::models::{Position, fmt_ts};
use crate::query::{self, Dir, Filter, FindMany};

pub fn find(conn: &Connection, portfolio_id: i64, symbol: &str) -> Result<Option<Position>> {
    query::find_first(
        conn,
        &FindMany::new(
            Filter::new()
                .eq("portfolio_id", portfolio_id)
                .eq("symbol", symbol),
        ),
    )
}

pub fn list(conn: &Connection, portfolio_id: i64) -> Result<Vec<Position>> {
    query::find_many(
        conn,
        &FindMany::new(Filter::new().eq("portfolio_id", portfolio_id)).order_by("symbol", Dir::Asc),
    )
}

/// Inserts or replaces the totals for `(portfolio_id, symbol)`.
pub fn upsert(
    conn: &Connection,
    portfolio_id: i64,
    symbol: &str,
    total_quantity: f64,
    total_invested: f64,
    avg_price: f64,
) -> Result<()> {
    let now = fmt_ts(&Utc::now());
    conn.execute(
        "INSERT INTO positions(portfolio_id, symbol, total_quantity, total_invested, avg_price, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(portfolio_id, symbol) DO UPDATE SET
             total_quantity=excluded.total_quantity,
             total_invested=excluded.total_invested,
             avg_price=excluded.avg_price,
             updated_at=excluded.updated_at",
        params![portfolio_id, symbol, total_quantity, total_invested, avg_price, now],
    )?;
    debug!(
        "position {}/{} -> qty {} invested {} avg {}",
        portfolio_id, symbol, total_quantity, total_invested, avg_price
    );
    Ok(())
}

pub fn remove(conn: &Connection, portfolio_id: i64, symbol: &str) -> Result<bool> {
    let n = query::delete_many::<Position>(
        conn,
        &Filter::new()
            .eq("portfolio_id", portfolio_id)
            .eq("symbol", symbol),
    )?;
    Ok(n > 0)
}
