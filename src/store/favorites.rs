// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Watch-list symbols of a portfolio.

use chrono::Utc;
use log::debug;
use rusqlite::{Connection, params};

use crate::error::{Result, StoreError};
use crate::models::{Favorite, Portfolio, fmt_ts};
use crate::query::{self, Dir, Filter, FindMany};

use super::normalize_symbol;

/// Adding an existing favorite returns the stored row unchanged.
pub fn add(conn: &Connection, portfolio_id: i64, symbol: &str) -> Result<Favorite> {
    let symbol = normalize_symbol(symbol)?;
    query::get::<Portfolio>(conn, portfolio_id)?;
    conn.execute(
        "INSERT INTO favorites(portfolio_id, symbol, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(portfolio_id, symbol) DO NOTHING",
        params![portfolio_id, symbol, fmt_ts(&Utc::now())],
    )?;
    debug!("favorite {}/{}", portfolio_id, symbol);
    find(conn, portfolio_id, &symbol)?
        .ok_or_else(|| StoreError::not_found("favorite", symbol))
}

pub fn find(conn: &Connection, portfolio_id: i64, symbol: &str) -> Result<Option<Favorite>> {
    query::find_first(
        conn,
        &FindMany::new(
            Filter::new()
                .eq("portfolio_id", portfolio_id)
                .eq("symbol", symbol.trim().to_uppercase()),
        ),
    )
}

pub fn remove(conn: &Connection, portfolio_id: i64, symbol: &str) -> Result<bool> {
    let n = query::delete_many::<Favorite>(
        conn,
        &Filter::new()
            .eq("portfolio_id", portfolio_id)
            .eq("symbol", symbol.trim().to_uppercase()),
    )?;
    Ok(n > 0)
}

/// Returns true when the symbol is a favorite afterwards.
pub fn toggle(conn: &Connection, portfolio_id: i64, symbol: &str) -> Result<bool> {
    if remove(conn, portfolio_id, symbol)? {
        Ok(false)
    } else {
        add(conn, portfolio_id, symbol)?;
        Ok(true)
    }
}

pub fn list(conn: &Connection, portfolio_id: i64) -> Result<Vec<Favorite>> {
    query::find_many(
        conn,
        &FindMany::new(Filter::new().eq("portfolio_id", portfolio_id)).order_by("symbol", Dir::Asc),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{portfolios, testutil};

    #[test]
    fn add_is_idempotent_and_toggle_flips() {
        let conn = testutil::conn();
        let u = testutil::user(&conn, "f@example.com");
        let p = portfolios::get_or_create(&conn, u.id).unwrap();

        let a = add(&conn, p.id, " msft ").unwrap();
        let b = add(&conn, p.id, "MSFT").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.symbol, "MSFT");

        assert!(!toggle(&conn, p.id, "msft").unwrap());
        assert!(list(&conn, p.id).unwrap().is_empty());
        assert!(toggle(&conn, p.id, "msft").unwrap());
        assert_eq!(list(&conn, p.id).unwrap().len(), 1);
    }

    #[test]
    fn add_rejects_bad_symbols_and_missing_portfolios() {
        let conn = testutil::conn();
        assert!(matches!(
            add(&conn, 1, "not a symbol").unwrap_err(),
            StoreError::Validation(_)
        ));
        assert!(matches!(
            add(&conn, 77, "AAPL").unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }
}
