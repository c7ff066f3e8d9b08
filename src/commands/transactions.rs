// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger;
use crate::models::{NewTransaction, TransactionType, fmt_ts};
use crate::store::transactions::{self, TxQuery};
use crate::utils::{
    fmt_money, maybe_print_json, parse_date, parse_f64, parse_id, parse_month, portfolio_for_email,
    pretty_table, required,
};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("buy", sub)) => trade(conn, sub, TransactionType::Buy)?,
        Some(("sell", sub)) => trade(conn, sub, TransactionType::Sell)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("rm", sub)) => {
            let t = ledger::delete_transaction(conn, parse_id(sub, "id")?)?;
            println!(
                "Removed {} {} {} @ {} from {}",
                t.r#type,
                t.quantity,
                t.symbol,
                t.price,
                fmt_ts(&t.date)
            );
        }
        _ => {}
    }
    Ok(())
}

fn trade(conn: &mut Connection, sub: &clap::ArgMatches, side: TransactionType) -> Result<()> {
    let portfolio = portfolio_for_email(conn, required(sub, "email")?)?;
    let date = match sub.get_one::<String>("date") {
        Some(raw) => parse_date(raw)?,
        None => Utc::now(),
    };
    let fee = match sub.get_one::<String>("fee") {
        Some(raw) => parse_f64(raw)?,
        None => 0.0,
    };
    let new = NewTransaction {
        symbol: required(sub, "symbol")?.to_string(),
        r#type: side,
        quantity: parse_f64(required(sub, "qty")?)?,
        price: parse_f64(required(sub, "price")?)?,
        fee,
        date,
    };
    let out = ledger::record_trade(conn, portfolio.id, &new)?;
    if maybe_print_json(sub.get_flag("json"), false, &out)? {
        return Ok(());
    }
    let t = &out.transaction;
    println!(
        "Recorded {} {} x {} @ {} (fee {})",
        t.r#type, t.quantity, t.symbol, t.price, t.fee
    );
    match &out.position {
        Some(p) => println!(
            "Position {}: {:.4} @ avg {:.4}, invested {}",
            p.symbol,
            p.total_quantity,
            p.avg_price,
            fmt_money(p.total_invested)
        ),
        None => println!("Position {} closed", t.symbol),
    }
    if let Some(pl) = out.realized_pl {
        println!("Realized P/L {}", fmt_money(pl));
    }
    Ok(())
}

pub fn query_from_args(sub: &clap::ArgMatches) -> Result<TxQuery> {
    let r#type = sub
        .get_one::<String>("type")
        .map(|s| s.parse::<TransactionType>())
        .transpose()?;
    let month = sub
        .get_one::<String>("month")
        .map(|s| parse_month(s))
        .transpose()?;
    let limit = sub
        .get_one::<String>("limit")
        .map(|s| s.trim().parse::<u64>().with_context(|| format!("Invalid limit '{}'", s)))
        .transpose()?;
    Ok(TxQuery {
        symbol: sub.get_one::<String>("symbol").cloned(),
        r#type,
        month,
        limit,
    })
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let portfolio = portfolio_for_email(conn, required(sub, "email")?)?;
    let data = transactions::list(conn, portfolio.id, &query_from_args(sub)?)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        return Ok(());
    }
    let rows = data
        .iter()
        .map(|t| {
            vec![
                t.id.to_string(),
                fmt_ts(&t.date),
                t.r#type.to_string(),
                t.symbol.clone(),
                format!("{:.4}", t.quantity),
                format!("{:.4}", t.price),
                fmt_money(t.amount),
                fmt_money(t.fee),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["ID", "Date", "Type", "Symbol", "Qty", "Price", "Amount", "Fee"],
            rows
        )
    );
    Ok(())
}
