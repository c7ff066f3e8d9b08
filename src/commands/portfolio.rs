// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use log::warn;
use rusqlite::Connection;

use crate::ledger;
use crate::models::fmt_ts;
use crate::quotes;
use crate::store::{normalize_symbol, portfolios, positions};
use crate::utils::{
    fmt_money, fmt_opt, maybe_print_json, parse_f64, portfolio_for_email, pretty_table, required,
    user_for_email,
};
use crate::valuation::{self, Valuation};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("create", sub)) => {
            let user = user_for_email(conn, required(sub, "email")?)?;
            let name = sub.get_one::<String>("name").map(|s| s.as_str());
            let p = portfolios::create(conn, user.id, name)?;
            println!("Created portfolio #{} '{}' for {}", p.id, p.name, user.email);
        }
        Some(("rename", sub)) => {
            let p = portfolio_for_email(conn, required(sub, "email")?)?;
            let p = portfolios::rename(conn, p.id, required(sub, "name")?)?;
            println!("Portfolio #{} is now '{}'", p.id, p.name);
        }
        Some(("show", sub)) => show(conn, sub)?,
        Some(("value", sub)) => value(conn, sub)?,
        Some(("rebuild", sub)) => {
            let p = portfolio_for_email(conn, required(sub, "email")?)?;
            let n = ledger::rebuild_portfolio(conn, p.id)?;
            println!("Rebuilt {} position(s) for '{}'", n, p.name);
        }
        Some(("check", sub)) => {
            let p = portfolio_for_email(conn, required(sub, "email")?)?;
            let drift = ledger::check_portfolio(conn, p.id)?;
            if drift.is_empty() {
                println!("Positions match the trade history");
            } else {
                let rows = drift
                    .iter()
                    .map(|d| {
                        vec![
                            d.symbol.clone(),
                            fmt_opt(d.stored.map(|h| h.quantity)),
                            fmt_opt(d.expected.map(|h| h.quantity)),
                            fmt_opt(d.stored.map(|h| fmt_money(h.invested))),
                            fmt_opt(d.expected.map(|h| fmt_money(h.invested))),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(
                        &["Symbol", "Stored Qty", "Expected Qty", "Stored Invested", "Expected Invested"],
                        rows
                    )
                );
                println!("Run `portfolio rebuild` to repair");
            }
        }
        _ => {}
    }
    Ok(())
}

fn show(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let p = portfolio_for_email(conn, required(sub, "email")?)?;
    let detail = portfolios::detail(conn, p.id)?;
    if maybe_print_json(sub.get_flag("json"), false, &detail)? {
        return Ok(());
    }
    println!(
        "Portfolio #{} '{}' (created {})",
        detail.portfolio.id,
        detail.portfolio.name,
        fmt_ts(&detail.portfolio.created_at)
    );
    let rows = detail
        .positions
        .iter()
        .map(|pos| {
            vec![
                pos.symbol.clone(),
                format!("{:.4}", pos.total_quantity),
                format!("{:.4}", pos.avg_price),
                fmt_money(pos.total_invested),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Symbol", "Qty", "Avg Price", "Invested"], rows)
    );
    println!("{} trade(s)", detail.transactions.len());
    if !detail.favorites.is_empty() {
        let favs: Vec<&str> = detail.favorites.iter().map(|f| f.symbol.as_str()).collect();
        println!("Watching: {}", favs.join(", "));
    }
    Ok(())
}

/// `SYMBOL=PRICE` pairs given on the command line.
pub fn parse_manual_prices<'a>(
    raw: impl IntoIterator<Item = &'a String>,
) -> Result<HashMap<String, f64>> {
    let mut out = HashMap::new();
    for item in raw {
        let (sym, px) = item
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid price '{}', expected SYMBOL=PRICE", item))?;
        let px = parse_f64(px)?;
        if px <= 0.0 {
            return Err(anyhow!("Price for {} must be positive", sym.trim()));
        }
        out.insert(normalize_symbol(sym)?, px);
    }
    Ok(out)
}

fn value(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let p = portfolio_for_email(conn, required(sub, "email")?)?;
    let held = positions::list(conn, p.id)?;

    let mut prices = HashMap::new();
    if sub.get_flag("live") {
        let symbols: Vec<String> = held.iter().map(|pos| pos.symbol.clone()).collect();
        match quotes::fetch(&symbols).context("Fetching live prices") {
            Ok(live) => prices.extend(live),
            Err(e) => warn!("{:#}", e),
        }
    }
    if let Some(manual) = sub.get_many::<String>("price") {
        prices.extend(parse_manual_prices(manual)?);
    }

    let v = valuation::summarize(&held, &prices);
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &v)? {
        return Ok(());
    }
    print_valuation(&v);
    Ok(())
}

fn print_valuation(v: &Valuation) {
    let rows = v
        .holdings
        .iter()
        .map(|h| {
            vec![
                h.symbol.clone(),
                format!("{:.4}", h.quantity),
                format!("{:.4}", h.avg_price),
                fmt_money(h.invested),
                fmt_opt(h.last_price.map(fmt_money)),
                fmt_opt(h.market_value.map(fmt_money)),
                fmt_opt(h.unrealized_pl.map(fmt_money)),
                fmt_opt(h.unrealized_pct.map(|p| format!("{:.2}%", p))),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["Symbol", "Qty", "Avg", "Invested", "Price", "Value", "P/L", "P/L %"],
            rows
        )
    );
    let t = &v.totals;
    println!(
        "Invested {}  Value {}  P/L {} ({})",
        fmt_money(t.invested),
        fmt_money(t.market_value),
        fmt_money(t.unrealized_pl),
        fmt_opt(t.unrealized_pct.map(|p| format!("{:.2}%", p)))
    );
    if t.unpriced > 0 {
        println!("{} holding(s) without a price", t.unpriced);
    }
}
