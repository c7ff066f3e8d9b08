// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Result, bail};
use chrono::Utc;
use rusqlite::Connection;

use crate::config::Config;
use crate::models::fmt_ts;
use crate::store::verifications;
use crate::utils::required;

pub fn handle(conn: &mut Connection, cfg: &Config, m: &clap::ArgMatches) -> Result<()> {
    let now = Utc::now();
    match m.subcommand() {
        Some(("issue", sub)) => {
            let v = verifications::issue(conn, cfg, required(sub, "identifier")?, now)?;
            println!("{}", v.value);
            println!("expires {}", fmt_ts(&v.expires_at));
        }
        Some(("consume", sub)) => {
            let identifier = required(sub, "identifier")?;
            if !verifications::consume(conn, identifier, required(sub, "value")?, now)? {
                bail!("Verification for '{}' is invalid or expired", identifier);
            }
            println!("Verified {}", identifier);
        }
        Some(("purge", _)) => {
            let n = verifications::purge_expired(conn, now)?;
            println!("Purged {} expired verification(s)", n);
        }
        _ => {}
    }
    Ok(())
}
