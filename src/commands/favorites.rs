// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::models::fmt_ts;
use crate::store::favorites;
use crate::utils::{maybe_print_json, portfolio_for_email, pretty_table, required};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let p = portfolio_for_email(conn, required(sub, "email")?)?;
            let f = favorites::add(conn, p.id, required(sub, "symbol")?)?;
            println!("Watching {}", f.symbol);
        }
        Some(("rm", sub)) => {
            let p = portfolio_for_email(conn, required(sub, "email")?)?;
            let symbol = required(sub, "symbol")?;
            if favorites::remove(conn, p.id, symbol)? {
                println!("Stopped watching {}", symbol.trim().to_uppercase());
            } else {
                println!("{} was not on the watch list", symbol.trim().to_uppercase());
            }
        }
        Some(("toggle", sub)) => {
            let p = portfolio_for_email(conn, required(sub, "email")?)?;
            let symbol = required(sub, "symbol")?;
            let on = favorites::toggle(conn, p.id, symbol)?;
            println!(
                "{} {}",
                symbol.trim().to_uppercase(),
                if on { "added" } else { "removed" }
            );
        }
        Some(("list", sub)) => {
            let p = portfolio_for_email(conn, required(sub, "email")?)?;
            let data = favorites::list(conn, p.id)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
                let rows = data
                    .iter()
                    .map(|f| vec![f.symbol.clone(), fmt_ts(&f.created_at)])
                    .collect();
                println!("{}", pretty_table(&["Symbol", "Added"], rows));
            }
        }
        _ => {}
    }
    Ok(())
}
