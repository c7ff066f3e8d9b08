// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Trades drive positions. Each position holds the average-cost totals that
//! result from replaying the portfolio's BUY/SELL history for one symbol.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use rusqlite::Connection;
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::models::{NewTransaction, Portfolio, Position, Transaction, TransactionType};
use crate::query::{self, Dir, Filter, FindMany};
use crate::store::{normalize_symbol, positions, transactions};

/// Quantities at or below this are treated as zero.
pub const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Holding {
    pub quantity: f64,
    pub invested: f64,
}

impl Holding {
    pub fn from_position(p: &Position) -> Self {
        Holding {
            quantity: p.total_quantity,
            invested: p.total_invested,
        }
    }

    pub fn avg_price(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.invested / self.quantity
        }
    }

    pub fn is_empty(&self) -> bool {
        self.quantity <= EPSILON
    }

    /// Applies one trade and returns the realized P/L (zero for buys).
    pub fn apply(
        &mut self,
        symbol: &str,
        kind: TransactionType,
        quantity: f64,
        price: f64,
        fee: f64,
    ) -> Result<f64> {
        match kind {
            TransactionType::Buy => {
                self.quantity += quantity;
                self.invested += quantity * price + fee;
                Ok(0.0)
            }
            TransactionType::Sell => {
                if quantity > self.quantity + EPSILON {
                    return Err(StoreError::InsufficientQuantity {
                        symbol: symbol.to_string(),
                        requested: quantity,
                        held: self.quantity.max(0.0),
                    });
                }
                let cost = self.avg_price() * quantity;
                self.quantity -= quantity;
                self.invested -= cost;
                if self.is_empty() {
                    *self = Holding::default();
                }
                Ok(quantity * price - fee - cost)
            }
        }
    }
}

fn validate(t: &NewTransaction) -> Result<NewTransaction> {
    let symbol = normalize_symbol(&t.symbol)?;
    let finite = t.quantity.is_finite() && t.price.is_finite() && t.fee.is_finite();
    if !finite {
        return Err(StoreError::Validation("Trade values must be finite numbers".into()));
    }
    if t.quantity <= 0.0 {
        return Err(StoreError::Validation(format!(
            "Quantity must be positive, got {}",
            t.quantity
        )));
    }
    if t.price <= 0.0 {
        return Err(StoreError::Validation(format!(
            "Price must be positive, got {}",
            t.price
        )));
    }
    if t.fee < 0.0 {
        return Err(StoreError::Validation(format!(
            "Fee must not be negative, got {}",
            t.fee
        )));
    }
    Ok(NewTransaction {
        symbol,
        ..t.clone()
    })
}

#[derive(Debug, Serialize)]
pub struct TradeOutcome {
    pub transaction: Transaction,
    /// `None` once the position is fully closed.
    pub position: Option<Position>,
    /// Set for sells.
    pub realized_pl: Option<f64>,
}

/// Records a trade and updates the matching position in one transaction.
///
/// A trade dated before the symbol's latest trade is inserted and the whole
/// symbol history is replayed, so a backdated sell that was never covered is
/// rejected just like a live one.
pub fn record_trade(
    conn: &mut Connection,
    portfolio_id: i64,
    trade: &NewTransaction,
) -> Result<TradeOutcome> {
    let trade = validate(trade)?;
    let tx = conn.transaction()?;
    query::get::<Portfolio>(&tx, portfolio_id)?;

    let latest: Option<Transaction> = query::find_first(
        &tx,
        &FindMany::new(
            Filter::new()
                .eq("portfolio_id", portfolio_id)
                .eq("symbol", trade.symbol.as_str()),
        )
        .order_by("date", Dir::Desc),
    )?;
    let backdated = latest.is_some_and(|l| trade.date < l.date);

    let (transaction, realized) = if backdated {
        let transaction = transactions::insert(&tx, portfolio_id, &trade)?;
        let realized = replay_symbol(&tx, portfolio_id, &trade.symbol, Some(transaction.id))?;
        debug!("replayed {} after backdated trade {}", trade.symbol, transaction.id);
        (transaction, realized)
    } else {
        let mut holding = positions::find(&tx, portfolio_id, &trade.symbol)?
            .map(|p| Holding::from_position(&p))
            .unwrap_or_default();
        let realized = holding.apply(
            &trade.symbol,
            trade.r#type,
            trade.quantity,
            trade.price,
            trade.fee,
        )?;
        let transaction = transactions::insert(&tx, portfolio_id, &trade)?;
        write_holding(&tx, portfolio_id, &trade.symbol, &holding)?;
        (transaction, Some(realized))
    };

    let position = positions::find(&tx, portfolio_id, &trade.symbol)?;
    tx.commit()?;
    info!(
        "{} {} {} @ {} in portfolio {}",
        trade.r#type, trade.quantity, trade.symbol, trade.price, portfolio_id
    );
    let realized_pl = match trade.r#type {
        TransactionType::Sell => realized,
        TransactionType::Buy => None,
    };
    Ok(TradeOutcome {
        transaction,
        position,
        realized_pl,
    })
}

fn write_holding(conn: &Connection, portfolio_id: i64, symbol: &str, h: &Holding) -> Result<()> {
    if h.is_empty() {
        positions::remove(conn, portfolio_id, symbol)?;
    } else {
        positions::upsert(conn, portfolio_id, symbol, h.quantity, h.invested, h.avg_price())?;
    }
    Ok(())
}

/// Recomputes one symbol's position from its history. When `realized_for` names
/// a transaction, its realized P/L is returned.
fn replay_symbol(
    conn: &Connection,
    portfolio_id: i64,
    symbol: &str,
    realized_for: Option<i64>,
) -> Result<Option<f64>> {
    let history = transactions::history(conn, portfolio_id, symbol)?;
    let mut holding = Holding::default();
    let mut realized = None;
    for t in &history {
        let pl = holding.apply(symbol, t.r#type, t.quantity, t.price, t.fee)?;
        if Some(t.id) == realized_for {
            realized = Some(pl);
        }
    }
    write_holding(conn, portfolio_id, symbol, &holding)?;
    Ok(realized)
}

/// Replays a full trade list, grouped per symbol.
pub fn replay(history: &[Transaction]) -> Result<BTreeMap<String, Holding>> {
    let mut out: BTreeMap<String, Holding> = BTreeMap::new();
    for t in history {
        out.entry(t.symbol.clone())
            .or_default()
            .apply(&t.symbol, t.r#type, t.quantity, t.price, t.fee)?;
    }
    out.retain(|_, h| !h.is_empty());
    Ok(out)
}

/// Deletes a trade and rebuilds the affected position. Fails (and keeps the
/// trade) if the remaining history would sell more than it holds.
pub fn delete_transaction(conn: &mut Connection, id: i64) -> Result<Transaction> {
    let tx = conn.transaction()?;
    let t: Transaction = query::get(&tx, id)?;
    query::delete::<Transaction>(&tx, id)?;
    replay_symbol(&tx, t.portfolio_id, &t.symbol, None)?;
    tx.commit()?;
    info!("deleted transaction {} ({} {})", id, t.r#type, t.symbol);
    Ok(t)
}

/// Rewrites every position of the portfolio from its history.
pub fn rebuild_portfolio(conn: &mut Connection, portfolio_id: i64) -> Result<usize> {
    let tx = conn.transaction()?;
    query::get::<Portfolio>(&tx, portfolio_id)?;
    let history = transactions::all_in_order(&tx, portfolio_id)?;
    let holdings = replay(&history)?;
    query::delete_many::<Position>(&tx, &Filter::new().eq("portfolio_id", portfolio_id))?;
    for (symbol, h) in &holdings {
        write_holding(&tx, portfolio_id, symbol, h)?;
    }
    tx.commit()?;
    info!(
        "rebuilt {} position(s) for portfolio {}",
        holdings.len(),
        portfolio_id
    );
    Ok(holdings.len())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Drift {
    pub symbol: String,
    pub stored: Option<Holding>,
    pub expected: Option<Holding>,
}

/// Compares stored positions with a replay of the history.
pub fn check_portfolio(conn: &Connection, portfolio_id: i64) -> Result<Vec<Drift>> {
    const TOLERANCE: f64 = 1e-6;
    let history = transactions::all_in_order(conn, portfolio_id)?;
    let expected = replay(&history)?;
    let stored: BTreeMap<String, Holding> = positions::list(conn, portfolio_id)?
        .iter()
        .map(|p| (p.symbol.clone(), Holding::from_position(p)))
        .collect();

    let mut symbols: Vec<&String> = expected.keys().chain(stored.keys()).collect();
    symbols.sort();
    symbols.dedup();

    let mut drift = Vec::new();
    for symbol in symbols {
        let s = stored.get(symbol).copied();
        let e = expected.get(symbol).copied();
        let same = match (s, e) {
            (Some(a), Some(b)) => {
                (a.quantity - b.quantity).abs() <= TOLERANCE
                    && (a.invested - b.invested).abs() <= TOLERANCE
            }
            (None, None) => true,
            _ => false,
        };
        if !same {
            warn!("position drift for {} in portfolio {}", symbol, portfolio_id);
            drift.push(Drift {
                symbol: symbol.clone(),
                stored: s,
                expected: e,
            });
        }
    }
    Ok(drift)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{portfolios, testutil};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, 15, 0, 0).unwrap()
    }

    fn trade(symbol: &str, kind: TransactionType, q: f64, p: f64, fee: f64, date: DateTime<Utc>) -> NewTransaction {
        NewTransaction {
            symbol: symbol.into(),
            r#type: kind,
            quantity: q,
            price: p,
            fee,
            date,
        }
    }

    fn setup() -> (Connection, i64) {
        let conn = testutil::conn();
        let u = testutil::user(&conn, "ledger@example.com");
        let p = portfolios::get_or_create(&conn, u.id).unwrap();
        (conn, p.id)
    }

    #[test]
    fn buys_average_in_fees() {
        let (mut conn, pid) = setup();
        record_trade(&mut conn, pid, &trade("aapl", TransactionType::Buy, 10.0, 100.0, 2.0, day(1))).unwrap();
        let out = record_trade(&mut conn, pid, &trade("AAPL", TransactionType::Buy, 10.0, 120.0, 0.0, day(2))).unwrap();
        let pos = out.position.unwrap();
        assert_eq!(pos.symbol, "AAPL");
        assert_eq!(pos.total_quantity, 20.0);
        assert_eq!(pos.total_invested, 2202.0);
        assert!((pos.avg_price - 110.1).abs() < 1e-9);
        assert_eq!(out.transaction.amount, 1200.0);
        assert!(out.realized_pl.is_none());
    }

    #[test]
    fn sell_keeps_average_and_reports_realized() {
        let (mut conn, pid) = setup();
        record_trade(&mut conn, pid, &trade("MSFT", TransactionType::Buy, 10.0, 100.0, 0.0, day(1))).unwrap();
        let out = record_trade(&mut conn, pid, &trade("MSFT", TransactionType::Sell, 4.0, 150.0, 1.0, day(2))).unwrap();
        let pos = out.position.unwrap();
        assert_eq!(pos.total_quantity, 6.0);
        assert_eq!(pos.total_invested, 600.0);
        assert_eq!(pos.avg_price, 100.0);
        assert_eq!(out.realized_pl, Some(199.0));
    }

    #[test]
    fn oversell_is_rejected_without_side_effects() {
        let (mut conn, pid) = setup();
        record_trade(&mut conn, pid, &trade("NVDA", TransactionType::Buy, 1.0, 10.0, 0.0, day(1))).unwrap();
        let err = record_trade(&mut conn, pid, &trade("NVDA", TransactionType::Sell, 2.0, 10.0, 0.0, day(2))).unwrap_err();
        assert!(matches!(err, StoreError::InsufficientQuantity { held, .. } if held == 1.0));
        assert_eq!(transactions::all_in_order(&conn, pid).unwrap().len(), 1);

        let err = record_trade(&mut conn, pid, &trade("TSLA", TransactionType::Sell, 1.0, 10.0, 0.0, day(2))).unwrap_err();
        assert!(matches!(err, StoreError::InsufficientQuantity { .. }));
    }

    #[test]
    fn closing_a_position_removes_it() {
        let (mut conn, pid) = setup();
        record_trade(&mut conn, pid, &trade("AMD", TransactionType::Buy, 0.3, 10.0, 0.0, day(1))).unwrap();
        record_trade(&mut conn, pid, &trade("AMD", TransactionType::Buy, 0.6, 10.0, 0.0, day(2))).unwrap();
        let out = record_trade(&mut conn, pid, &trade("AMD", TransactionType::Sell, 0.9, 12.0, 0.0, day(3))).unwrap();
        assert!(out.position.is_none());
        assert!(positions::find(&conn, pid, "AMD").unwrap().is_none());
    }

    #[test]
    fn invalid_trades_are_rejected() {
        let (mut conn, pid) = setup();
        for bad in [
            trade("AAPL", TransactionType::Buy, 0.0, 1.0, 0.0, day(1)),
            trade("AAPL", TransactionType::Buy, 1.0, -1.0, 0.0, day(1)),
            trade("AAPL", TransactionType::Buy, 1.0, 1.0, -0.1, day(1)),
            trade("AAPL", TransactionType::Buy, f64::NAN, 1.0, 0.0, day(1)),
            trade("bad symbol", TransactionType::Buy, 1.0, 1.0, 0.0, day(1)),
        ] {
            assert!(matches!(
                record_trade(&mut conn, pid, &bad).unwrap_err(),
                StoreError::Validation(_)
            ));
        }
    }

    #[test]
    fn backdated_sell_before_any_buy_is_rejected() {
        let (mut conn, pid) = setup();
        record_trade(&mut conn, pid, &trade("META", TransactionType::Buy, 5.0, 10.0, 0.0, day(10))).unwrap();
        let err = record_trade(&mut conn, pid, &trade("META", TransactionType::Sell, 1.0, 10.0, 0.0, day(5))).unwrap_err();
        assert!(matches!(err, StoreError::InsufficientQuantity { .. }));
        assert_eq!(transactions::all_in_order(&conn, pid).unwrap().len(), 1);

        let out = record_trade(&mut conn, pid, &trade("META", TransactionType::Buy, 5.0, 20.0, 0.0, day(5))).unwrap();
        let pos = out.position.unwrap();
        assert_eq!(pos.total_quantity, 10.0);
        assert_eq!(pos.total_invested, 150.0);
    }

    #[test]
    fn deleting_a_buy_that_covers_a_sell_is_refused() {
        let (mut conn, pid) = setup();
        let buy = record_trade(&mut conn, pid, &trade("GOOG", TransactionType::Buy, 5.0, 10.0, 0.0, day(1))).unwrap();
        record_trade(&mut conn, pid, &trade("GOOG", TransactionType::Sell, 3.0, 12.0, 0.0, day(2))).unwrap();
        let err = delete_transaction(&mut conn, buy.transaction.id).unwrap_err();
        assert!(matches!(err, StoreError::InsufficientQuantity { .. }));
        assert_eq!(transactions::all_in_order(&conn, pid).unwrap().len(), 2);
    }

    #[test]
    fn deleting_a_sell_restores_the_position() {
        let (mut conn, pid) = setup();
        record_trade(&mut conn, pid, &trade("GOOG", TransactionType::Buy, 5.0, 10.0, 0.0, day(1))).unwrap();
        let sell = record_trade(&mut conn, pid, &trade("GOOG", TransactionType::Sell, 5.0, 12.0, 0.0, day(2))).unwrap();
        assert!(sell.position.is_none());
        delete_transaction(&mut conn, sell.transaction.id).unwrap();
        let pos = positions::find(&conn, pid, "GOOG").unwrap().unwrap();
        assert_eq!(pos.total_quantity, 5.0);
        assert_eq!(pos.total_invested, 50.0);
    }

    #[test]
    fn rebuild_repairs_drift() {
        let (mut conn, pid) = setup();
        record_trade(&mut conn, pid, &trade("IBM", TransactionType::Buy, 2.0, 50.0, 0.0, day(1))).unwrap();
        record_trade(&mut conn, pid, &trade("SAP", TransactionType::Buy, 1.0, 80.0, 0.0, day(1))).unwrap();
        positions::upsert(&conn, pid, "IBM", 7.0, 1.0, 1.0).unwrap();
        positions::upsert(&conn, pid, "ORCL", 1.0, 1.0, 1.0).unwrap();

        let drift = check_portfolio(&conn, pid).unwrap();
        let symbols: Vec<&str> = drift.iter().map(|d| d.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["IBM", "ORCL"]);

        assert_eq!(rebuild_portfolio(&mut conn, pid).unwrap(), 2);
        assert!(check_portfolio(&conn, pid).unwrap().is_empty());
        assert!(positions::find(&conn, pid, "ORCL").unwrap().is_none());
    }

    #[test]
    fn replay_matches_incremental_updates() {
        let (mut conn, pid) = setup();
        let t0 = day(1);
        for (i, (kind, q, p)) in [
            (TransactionType::Buy, 3.0, 10.0),
            (TransactionType::Buy, 2.0, 12.5),
            (TransactionType::Sell, 4.0, 11.0),
            (TransactionType::Buy, 1.5, 9.0),
        ]
        .into_iter()
        .enumerate()
        {
            record_trade(&mut conn, pid, &trade("V", kind, q, p, 0.25, t0 + Duration::hours(i as i64))).unwrap();
        }
        assert!(check_portfolio(&conn, pid).unwrap().is_empty());
    }
}
