// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::Connection;

use crate::models::{NewSubscription, Subscription, fmt_ts};
use crate::store::subscriptions;
use crate::utils::{fmt_opt, maybe_print_json, parse_date, parse_id, pretty_table, required};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("create", sub)) => {
            let seats = sub
                .get_one::<String>("seats")
                .map(|s| s.trim().parse::<i64>().with_context(|| format!("Invalid seats '{}'", s)))
                .transpose()?;
            let new = NewSubscription {
                plan: required(sub, "plan")?.to_string(),
                reference_id: required(sub, "reference")?.trim().to_string(),
                stripe_customer_id: sub.get_one::<String>("customer").cloned(),
                stripe_subscription_id: None,
                seats,
            };
            report(&subscriptions::create(conn, &new)?);
        }
        Some(("list", sub)) => list(conn, sub)?,
        Some(("trial", sub)) => {
            let days: i64 = required(sub, "days")?
                .trim()
                .parse()
                .context("Invalid --days")?;
            report(&subscriptions::start_trial(conn, parse_id(sub, "id")?, days, Utc::now())?);
        }
        Some(("activate", sub)) => {
            let (start, end) = (
                parse_date(required(sub, "start")?)?,
                parse_date(required(sub, "end")?)?,
            );
            report(&subscriptions::activate(conn, parse_id(sub, "id")?, start, end)?);
        }
        Some(("renew", sub)) => {
            let (start, end) = (
                parse_date(required(sub, "start")?)?,
                parse_date(required(sub, "end")?)?,
            );
            report(&subscriptions::renew(conn, parse_id(sub, "id")?, start, end)?);
        }
        Some(("cancel", sub)) => {
            let id = parse_id(sub, "id")?;
            let s = if sub.get_flag("at-period-end") {
                subscriptions::cancel_at_period_end(conn, id, true)?
            } else if sub.get_flag("resume") {
                subscriptions::cancel_at_period_end(conn, id, false)?
            } else {
                subscriptions::cancel_now(conn, id)?
            };
            report(&s);
        }
        Some(("past-due", sub)) => report(&subscriptions::mark_past_due(conn, parse_id(sub, "id")?)?),
        Some(("unpaid", sub)) => report(&subscriptions::mark_unpaid(conn, parse_id(sub, "id")?)?),
        Some(("pause", sub)) => report(&subscriptions::pause(conn, parse_id(sub, "id")?)?),
        Some(("sweep", _)) => {
            let r = subscriptions::sweep(conn, Utc::now())?;
            println!(
                "Canceled {} subscription(s), expired {} trial(s)",
                r.canceled, r.expired_trials
            );
        }
        _ => {}
    }
    Ok(())
}

fn report(s: &Subscription) {
    let mut line = format!("Subscription #{} ({}) is {}", s.id, s.plan, s.status);
    if s.cancel_at_period_end {
        line.push_str(", cancels at period end");
    }
    println!("{}", line);
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let data = match sub.get_one::<String>("reference") {
        Some(r) => subscriptions::list_for_reference(conn, r.trim())?,
        None => subscriptions::list(conn)?,
    };
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &data)? {
        return Ok(());
    }
    let rows = data
        .iter()
        .map(|s| {
            vec![
                s.id.to_string(),
                s.plan.clone(),
                s.reference_id.clone(),
                s.status.to_string(),
                fmt_opt(s.period_end.as_ref().map(fmt_ts)),
                fmt_opt(s.trial_end.as_ref().map(fmt_ts)),
                s.cancel_at_period_end.to_string(),
                fmt_opt(s.seats),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["ID", "Plan", "Reference", "Status", "Period End", "Trial End", "Cancel@End", "Seats"],
            rows
        )
    );
    Ok(())
}
