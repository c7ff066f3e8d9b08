// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::Utc;
use rusqlite::{Connection, params};

use crate::error::Result;
use crate::models::{NewTransaction, Transaction, TransactionType, fmt_ts};
use crate::query::{self, Dir, Filter, FindMany};

#[derive(Debug, Clone, Default)]
pub struct TxQuery {
    pub symbol: Option<String>,
    pub r#type: Option<TransactionType>,
    /// `YYYY-MM`
    pub month: Option<String>,
    pub limit: Option<u64>,
}

impl TxQuery {
    pub fn filter(&self, portfolio_id: i64) -> Filter {
        let mut f = Filter::new().eq("portfolio_id", portfolio_id);
        if let Some(sym) = &self.symbol {
            f = f.eq("symbol", sym.trim().to_uppercase());
        }
        if let Some(t) = self.r#type {
            f = f.eq("type", t);
        }
        if let Some(month) = &self.month {
            f = f.starts_with("date", month.trim());
        }
        f
    }
}

/// Writes the row as given; validation and position updates live in the ledger.
pub(crate) fn insert(conn: &Connection, portfolio_id: i64, t: &NewTransaction) -> Result<Transaction> {
    conn.execute(
        "INSERT INTO transactions(portfolio_id, symbol, type, quantity, price, amount, fee, date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            portfolio_id,
            t.symbol,
            t.r#type,
            t.quantity,
            t.price,
            t.quantity * t.price,
            t.fee,
            fmt_ts(&t.date),
            fmt_ts(&Utc::now())
        ],
    )?;
    query::get(conn, conn.last_insert_rowid())
}

/// Newest first.
pub fn list(conn: &Connection, portfolio_id: i64, q: &TxQuery) -> Result<Vec<Transaction>> {
    let mut fm = FindMany::new(q.filter(portfolio_id))
        .order_by("date", Dir::Desc)
        .order_by("id", Dir::Desc);
    fm.take = q.limit;
    query::find_many(conn, &fm)
}

/// Trades for one symbol in replay order.
pub fn history(conn: &Connection, portfolio_id: i64, symbol: &str) -> Result<Vec<Transaction>> {
    query::find_many(
        conn,
        &FindMany::new(
            Filter::new()
                .eq("portfolio_id", portfolio_id)
                .eq("symbol", symbol),
        )
        .order_by("date", Dir::Asc)
        .order_by("id", Dir::Asc),
    )
}

/// Every trade of the portfolio in replay order.
pub fn all_in_order(conn: &Connection, portfolio_id: i64) -> Result<Vec<Transaction>> {
    query::find_many(
        conn,
        &FindMany::new(Filter::new().eq("portfolio_id", portfolio_id))
            .order_by("date", Dir::Asc)
            .order_by("id", Dir::Asc),
    )
}
