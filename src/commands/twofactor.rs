// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Result, bail};
use rusqlite::Connection;

use crate::store::two_factor;
use crate::utils::{required, user_for_email};

fn print_codes(codes: &[String]) {
    println!("Backup codes (each works once):");
    for c in codes {
        println!("  {}", c);
    }
}

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("enable", sub)) => {
            let user = user_for_email(conn, required(sub, "email")?)?;
            let codes = two_factor::enable(conn, user.id, required(sub, "secret")?)?;
            println!("Two-factor enabled for {}", user.email);
            print_codes(&codes);
        }
        Some(("disable", sub)) => {
            let user = user_for_email(conn, required(sub, "email")?)?;
            two_factor::disable(conn, user.id)?;
            println!("Two-factor disabled for {}", user.email);
        }
        Some(("redeem", sub)) => {
            let user = user_for_email(conn, required(sub, "email")?)?;
            if !two_factor::redeem_backup_code(conn, user.id, required(sub, "code")?)? {
                bail!("Backup code not accepted");
            }
            println!("Backup code accepted");
        }
        Some(("regen", sub)) => {
            let user = user_for_email(conn, required(sub, "email")?)?;
            let codes = two_factor::regenerate_codes(conn, user.id)?;
            print_codes(&codes);
        }
        _ => {}
    }
    Ok(())
}
