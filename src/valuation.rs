// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::error::Result;
use crate::ledger::Holding;
use crate::models::{Position, Transaction, TransactionType};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingValue {
    pub symbol: String,
    pub quantity: f64,
    pub avg_price: f64,
    pub invested: f64,
    pub last_price: Option<f64>,
    pub market_value: Option<f64>,
    pub unrealized_pl: Option<f64>,
    pub unrealized_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub invested: f64,
    /// Invested amount of the holdings that have a price.
    pub priced_invested: f64,
    pub market_value: f64,
    pub unrealized_pl: f64,
    pub unrealized_pct: Option<f64>,
    pub unpriced: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Valuation {
    pub holdings: Vec<HoldingValue>,
    pub totals: Totals,
}

fn pct(pl: f64, base: f64) -> Option<f64> {
    (base > 0.0).then(|| pl / base * 100.0)
}

pub fn value_position(p: &Position, price: Option<f64>) -> HoldingValue {
    let market_value = price.map(|px| px * p.total_quantity);
    let unrealized_pl = market_value.map(|mv| mv - p.total_invested);
    HoldingValue {
        symbol: p.symbol.clone(),
        quantity: p.total_quantity,
        avg_price: p.avg_price,
        invested: p.total_invested,
        last_price: price,
        market_value,
        unrealized_pl,
        unrealized_pct: unrealized_pl.and_then(|pl| pct(pl, p.total_invested)),
    }
}

/// Values positions against `prices` (keyed by upper-case symbol). Holdings
/// without a price are listed but only count toward `invested`.
pub fn summarize(positions: &[Position], prices: &HashMap<String, f64>) -> Valuation {
    let mut totals = Totals::default();
    let holdings: Vec<HoldingValue> = positions
        .iter()
        .map(|p| {
            let price = prices
                .get(&p.symbol)
                .copied()
                .filter(|px| px.is_finite() && *px > 0.0);
            value_position(p, price)
        })
        .collect();

    for h in &holdings {
        totals.invested += h.invested;
        match h.market_value {
            Some(mv) => {
                totals.priced_invested += h.invested;
                totals.market_value += mv;
            }
            None => totals.unpriced += 1,
        }
    }
    totals.unrealized_pl = totals.market_value - totals.priced_invested;
    totals.unrealized_pct = pct(totals.unrealized_pl, totals.priced_invested);
    Valuation { holdings, totals }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RealizedRow {
    pub symbol: String,
    pub sells: usize,
    pub proceeds: f64,
    pub cost: f64,
    pub fees: f64,
    pub realized_pl: f64,
}

/// Realized P/L per symbol from an ordered history, at average cost.
/// When `year` is set only sells dated in that year are reported, but every
/// earlier trade still shapes the cost basis.
pub fn realized(history: &[Transaction], year: Option<i32>) -> Result<Vec<RealizedRow>> {
    use chrono::Datelike;

    let mut holdings: HashMap<&str, Holding> = HashMap::new();
    let mut rows: BTreeMap<&str, RealizedRow> = BTreeMap::new();
    for t in history {
        let h = holdings.entry(t.symbol.as_str()).or_default();
        let avg = h.avg_price();
        let pl = h.apply(&t.symbol, t.r#type, t.quantity, t.price, t.fee)?;
        if t.r#type != TransactionType::Sell {
            continue;
        }
        if year.is_some_and(|y| t.date.year() != y) {
            continue;
        }
        let row = rows.entry(t.symbol.as_str()).or_insert_with(|| RealizedRow {
            symbol: t.symbol.clone(),
            ..Default::default()
        });
        row.sells += 1;
        row.proceeds += t.amount;
        row.cost += avg * t.quantity;
        row.fees += t.fee;
        row.realized_pl += pl;
    }
    Ok(rows.into_values().collect())
}
