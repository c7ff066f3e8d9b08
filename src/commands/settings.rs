// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use rusqlite::Connection;

use crate::config;
use crate::utils::{maybe_print_json, pretty_table, required};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("show", sub)) => {
            let data = config::describe(conn)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
                let rows = data
                    .iter()
                    .map(|r| vec![r.key.clone(), r.value.to_string(), r.source.to_string()])
                    .collect();
                println!("{}", pretty_table(&["Key", "Value", "Source"], rows));
            }
        }
        Some(("set", sub)) => {
            let key = required(sub, "key")?.trim();
            let value = required(sub, "value")?.trim();
            config::set_setting(conn, key, value)?;
            println!("{} = {}", key, value);
        }
        _ => {}
    }
    Ok(())
}
