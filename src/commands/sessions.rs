// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;

use crate::config::Config;
use crate::models::fmt_ts;
use crate::store::sessions::{self, Client};
use crate::utils::{fmt_opt, maybe_print_json, pretty_table, required, user_for_email};

pub fn handle(conn: &Connection, cfg: &Config, m: &clap::ArgMatches) -> Result<()> {
    let now = Utc::now();
    match m.subcommand() {
        Some(("create", sub)) => {
            let user = user_for_email(conn, required(sub, "email")?)?;
            let client = Client {
                ip_address: sub.get_one::<String>("ip").map(|s| s.as_str()),
                user_agent: sub.get_one::<String>("agent").map(|s| s.as_str()),
                impersonated_by: None,
            };
            let s = sessions::create(conn, cfg, user.id, &client, now)?;
            println!("{}", s.token);
            println!("expires {}", fmt_ts(&s.expires_at));
        }
        Some(("check", sub)) => match sessions::validate(conn, required(sub, "token")?, now)? {
            Some((s, user)) => println!(
                "valid: {} ({}), expires {}",
                user.email,
                user.role,
                fmt_ts(&s.expires_at)
            ),
            None => println!("invalid or expired"),
        },
        Some(("refresh", sub)) => {
            match sessions::refresh(conn, cfg, required(sub, "token")?, now)? {
                Some(s) => println!("expires {}", fmt_ts(&s.expires_at)),
                None => println!("invalid or expired"),
            }
        }
        Some(("list", sub)) => {
            let user = user_for_email(conn, required(sub, "email")?)?;
            let data = sessions::list_for_user(conn, user.id)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
                let rows = data
                    .iter()
                    .map(|s| {
                        vec![
                            s.id.to_string(),
                            fmt_ts(&s.created_at),
                            fmt_ts(&s.expires_at),
                            fmt_opt(s.ip_address.as_deref()),
                            fmt_opt(s.user_agent.as_deref()),
                            if s.expires_at <= now { "expired" } else { "live" }.to_string(),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["ID", "Created", "Expires", "IP", "Agent", "State"], rows)
                );
            }
        }
        Some(("revoke", sub)) => {
            if sessions::revoke(conn, required(sub, "token")?)? {
                println!("Session revoked");
            } else {
                println!("No such session");
            }
        }
        Some(("revoke-all", sub)) => {
            let user = user_for_email(conn, required(sub, "email")?)?;
            let n = sessions::revoke_all(conn, user.id)?;
            println!("Revoked {} session(s) for {}", n, user.email);
        }
        Some(("purge", _)) => {
            let n = sessions::purge_expired(conn, now)?;
            println!("Purged {} expired session(s)", n);
        }
        _ => {}
    }
    Ok(())
}
