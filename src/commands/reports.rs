// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::Transaction;
use crate::query::{self, AggregateResult, Aggregates, GroupRow, Param};
use crate::store::transactions::{self, TxQuery};
use crate::utils::{fmt_money, maybe_print_json, parse_month, portfolio_for_email, pretty_table, required};
use crate::valuation;
use anyhow::{Context, Result};
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("summary", sub)) => summary(conn, sub)?,
        Some(("realized", sub)) => realized(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn trade_aggregates() -> Aggregates {
    Aggregates::new()
        .sum("quantity")
        .sum("amount")
        .sum("fee")
        .avg("price")
        .min("date")
        .max("date")
}

fn param_text(p: Option<&Param>) -> String {
    match p {
        Some(Param::Text(s)) => s.clone(),
        Some(Param::Int(i)) => i.to_string(),
        Some(Param::Real(r)) => r.to_string(),
        Some(Param::Null) | None => "-".to_string(),
    }
}

fn money(v: Option<&Option<f64>>) -> String {
    v.copied().flatten().map(fmt_money).unwrap_or_else(|| "-".into())
}

fn agg_cells(a: &AggregateResult) -> Vec<String> {
    vec![
        a.count.to_string(),
        a.sum
            .get("quantity")
            .copied()
            .flatten()
            .map(|q| format!("{:.4}", q))
            .unwrap_or_else(|| "-".into()),
        money(a.sum.get("amount")),
        money(a.sum.get("fee")),
        money(a.avg.get("price")),
        param_text(a.min.get("date")),
        param_text(a.max.get("date")),
    ]
}

/// Trade counts and totals, optionally grouped by `symbol` and/or `type`.
pub fn summarize(
    conn: &Connection,
    portfolio_id: i64,
    by: &[&str],
    month: Option<String>,
) -> Result<Vec<GroupRow>> {
    let filter = TxQuery {
        month,
        ..Default::default()
    }
    .filter(portfolio_id);
    let aggs = trade_aggregates();
    if by.is_empty() {
        let total = query::aggregate::<Transaction>(conn, &filter, &aggs)?;
        return Ok(vec![GroupRow {
            keys: Default::default(),
            aggregates: total,
        }]);
    }
    Ok(query::group_by::<Transaction>(conn, by, &filter, &aggs)?)
}

fn summary(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let p = portfolio_for_email(conn, required(sub, "email")?)?;
    let by: Vec<&str> = sub
        .get_one::<String>("by")
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let month = sub
        .get_one::<String>("month")
        .map(|s| parse_month(s))
        .transpose()?;
    let data = summarize(conn, p.id, &by, month)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        return Ok(());
    }

    let mut headers: Vec<&str> = by.clone();
    headers.extend(["Trades", "Quantity", "Amount", "Fees", "Avg Price", "First", "Last"]);
    let rows = data
        .iter()
        .map(|g| {
            let mut row: Vec<String> = by.iter().map(|k| param_text(g.keys.get(*k))).collect();
            row.extend(agg_cells(&g.aggregates));
            row
        })
        .collect();
    println!("{}", pretty_table(&headers, rows));
    Ok(())
}

fn realized(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let p = portfolio_for_email(conn, required(sub, "email")?)?;
    let year = sub
        .get_one::<String>("year")
        .map(|s| s.trim().parse::<i32>().with_context(|| format!("Invalid year '{}'", s)))
        .transpose()?;
    let history = transactions::all_in_order(conn, p.id)?;
    let data = valuation::realized(&history, year)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        return Ok(());
    }
    let total: f64 = data.iter().map(|r| r.realized_pl).sum();
    let rows = data
        .iter()
        .map(|r| {
            vec![
                r.symbol.clone(),
                r.sells.to_string(),
                fmt_money(r.proceeds),
                fmt_money(r.cost),
                fmt_money(r.fees),
                fmt_money(r.realized_pl),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Symbol", "Sells", "Proceeds", "Cost", "Fees", "Realized"], rows)
    );
    println!("Total realized {}", fmt_money(total));
    Ok(())
}
