// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Result, anyhow};
use rusqlite::Connection;

use crate::models::{NewUser, Role, UserPatch, fmt_ts};
use crate::store::users;
use crate::utils::{fmt_opt, maybe_print_json, parse_date, pretty_table, required, user_for_email};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("create", sub)) => create(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("show", sub)) => show(conn, sub)?,
        Some(("update", sub)) => update(conn, sub)?,
        Some(("role", sub)) => {
            let user = user_for_email(conn, required(sub, "email")?)?;
            let role: Role = required(sub, "role")?.parse()?;
            let user = users::set_role(conn, user.id, role)?;
            println!("{} is now {}", user.email, user.role);
        }
        Some(("ban", sub)) => {
            let user = user_for_email(conn, required(sub, "email")?)?;
            let until = sub
                .get_one::<String>("until")
                .map(|s| parse_date(s))
                .transpose()?;
            let reason = sub.get_one::<String>("reason").map(|s| s.as_str());
            let user = users::ban(conn, user.id, reason, until)?;
            println!(
                "Banned {} until {}",
                user.email,
                fmt_opt(user.ban_expires.as_ref().map(fmt_ts))
            );
        }
        Some(("unban", sub)) => {
            let user = user_for_email(conn, required(sub, "email")?)?;
            let user = users::unban(conn, user.id)?;
            println!("Unbanned {}", user.email);
        }
        Some(("delete", sub)) => {
            let user = user_for_email(conn, required(sub, "email")?)?;
            users::delete(conn, user.id)?;
            println!("Deleted user {} and everything it owned", user.email);
        }
        _ => {}
    }
    Ok(())
}

fn create(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let new = NewUser {
        name: required(sub, "name")?.trim().to_string(),
        email: required(sub, "email")?.to_string(),
        email_verified: sub.get_flag("verified"),
        image: sub.get_one::<String>("image").cloned(),
        role: if sub.get_flag("admin") {
            Role::Admin
        } else {
            Role::User
        },
    };
    let user = users::create(conn, &new)?;
    println!("Created user #{} {} <{}>", user.id, user.name, user.email);
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let data = users::list(conn)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        return Ok(());
    }
    let rows = data
        .iter()
        .map(|u| {
            vec![
                u.id.to_string(),
                u.email.clone(),
                u.name.clone(),
                u.role.to_string(),
                u.email_verified.to_string(),
                u.two_factor_enabled.to_string(),
                u.banned.to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["ID", "Email", "Name", "Role", "Verified", "2FA", "Banned"],
            rows
        )
    );
    Ok(())
}

fn show(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let user = user_for_email(conn, required(sub, "email")?)?;
    let profile = users::profile(conn, user.id)?;
    if maybe_print_json(sub.get_flag("json"), false, &profile)? {
        return Ok(());
    }
    let u = &profile.user;
    let rows = vec![
        vec!["ID".into(), u.id.to_string()],
        vec!["Name".into(), u.name.clone()],
        vec!["Email".into(), u.email.clone()],
        vec!["Verified".into(), u.email_verified.to_string()],
        vec!["Role".into(), u.role.to_string()],
        vec!["2FA".into(), u.two_factor_enabled.to_string()],
        vec![
            "Banned".into(),
            if u.banned {
                format!("yes ({})", fmt_opt(u.ban_reason.as_deref()))
            } else {
                "no".into()
            },
        ],
        vec![
            "Portfolio".into(),
            fmt_opt(profile.portfolio.as_ref().map(|p| p.name.as_str())),
        ],
        vec!["Sessions".into(), profile.sessions.len().to_string()],
        vec![
            "Accounts".into(),
            profile
                .accounts
                .iter()
                .map(|a| a.provider_id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        ],
        vec!["Created".into(), fmt_ts(&u.created_at)],
    ];
    println!("{}", pretty_table(&["Field", "Value"], rows));
    Ok(())
}

/// Empty strings clear nullable fields.
fn nullable(sub: &clap::ArgMatches, name: &str) -> Option<Option<String>> {
    sub.get_one::<String>(name).map(|s| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    })
}

fn update(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let user = user_for_email(conn, required(sub, "email")?)?;
    let email_verified = match sub.get_one::<String>("verified").map(|s| s.trim()) {
        None => None,
        Some("true") | Some("yes") => Some(true),
        Some("false") | Some("no") => Some(false),
        Some(other) => return Err(anyhow!("Invalid --verified '{}', use true|false", other)),
    };
    let patch = UserPatch {
        name: sub.get_one::<String>("name").map(|s| s.trim().to_string()),
        email: sub.get_one::<String>("new-email").cloned(),
        email_verified,
        image: nullable(sub, "image"),
        stripe_customer_id: nullable(sub, "customer"),
    };
    let user = users::update(conn, user.id, &patch)?;
    println!("Updated user #{} <{}>", user.id, user.email);
    Ok(())
}
