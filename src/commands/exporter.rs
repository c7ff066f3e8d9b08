// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Result, bail};
use log::info;
use rusqlite::Connection;
use serde_json::json;

use crate::models::fmt_ts;
use crate::store::transactions;
use crate::utils::{portfolio_for_email, required};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("transactions", sub)) => export_transactions(conn, sub),
        _ => Ok(()),
    }
}

fn export_transactions(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let fmt = required(sub, "format")?.trim().to_lowercase();
    let out = required(sub, "out")?;
    if fmt != "csv" && fmt != "json" {
        bail!("Unknown format: {} (use csv|json)", fmt);
    }

    let portfolio = portfolio_for_email(conn, required(sub, "email")?)?;
    let rows = transactions::all_in_order(conn, portfolio.id)?;

    match fmt.as_str() {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record([
                "id", "date", "symbol", "type", "quantity", "price", "amount", "fee",
            ])?;
            for t in &rows {
                wtr.write_record([
                    t.id.to_string(),
                    fmt_ts(&t.date),
                    t.symbol.clone(),
                    t.r#type.to_string(),
                    t.quantity.to_string(),
                    t.price.to_string(),
                    t.amount.to_string(),
                    t.fee.to_string(),
                ])?;
            }
            wtr.flush()?;
        }
        _ => {
            let items: Vec<_> = rows
                .iter()
                .map(|t| {
                    json!({
                        "id": t.id,
                        "date": fmt_ts(&t.date),
                        "symbol": t.symbol,
                        "type": t.r#type,
                        "quantity": t.quantity,
                        "price": t.price,
                        "amount": t.amount,
                        "fee": t.fee,
                    })
                })
                .collect();
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
    }
    info!("exported {} transaction(s) as {}", rows.len(), fmt);
    println!("Exported {} transaction(s) to {}", rows.len(), out);
    Ok(())
}
