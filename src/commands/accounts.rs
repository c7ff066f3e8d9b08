// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::{NewAccount, fmt_ts};
use crate::store::accounts;
use crate::utils::{fmt_opt, maybe_print_json, pretty_table, required, user_for_email};
use anyhow::Result;
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("link", sub)) => {
            let user = user_for_email(conn, required(sub, "email")?)?;
            let provider = required(sub, "provider")?.trim().to_lowercase();
            let account_id = sub
                .get_one::<String>("account-id")
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| user.id.to_string());
            let new = NewAccount {
                user_id: user.id,
                account_id,
                provider_id: provider,
                scope: sub.get_one::<String>("scope").cloned(),
                password: sub.get_one::<String>("password").cloned(),
                ..Default::default()
            };
            let acct = accounts::link(conn, &new)?;
            println!(
                "Linked {} account '{}' to {}",
                acct.provider_id, acct.account_id, user.email
            );
        }
        Some(("list", sub)) => {
            let user = user_for_email(conn, required(sub, "email")?)?;
            let data = accounts::list_for_user(conn, user.id)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
                let rows = data
                    .iter()
                    .map(|a| {
                        vec![
                            a.provider_id.clone(),
                            a.account_id.clone(),
                            fmt_opt(a.scope.as_deref()),
                            a.password.is_some().to_string(),
                            fmt_ts(&a.created_at),
                        ]
                    })
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["Provider", "Account", "Scope", "Password", "Created"], rows)
                );
            }
        }
        Some(("unlink", sub)) => {
            let user = user_for_email(conn, required(sub, "email")?)?;
            let provider = required(sub, "provider")?.trim().to_lowercase();
            accounts::unlink(conn, user.id, &provider)?;
            println!("Unlinked {} from {}", provider, user.email);
        }
        _ => {}
    }
    Ok(())
}
