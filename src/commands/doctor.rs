// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger;
use crate::models::{Portfolio, Session, Subscription, SubscriptionStatus, User, Verification};
use crate::query::{self, Filter, FindMany};
use crate::utils::pretty_table;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

/// Issues worth a look, as `(kind, detail)` rows.
pub fn diagnose(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();

    // 1) Positions that disagree with the trade history
    let portfolios: Vec<Portfolio> = query::find_many(conn, &FindMany::new(Filter::new()))?;
    for p in &portfolios {
        match ledger::check_portfolio(conn, p.id) {
            Ok(drift) => {
                for d in drift {
                    rows.push(vec![
                        "position_drift".into(),
                        format!("portfolio {} {}", p.id, d.symbol),
                    ]);
                }
            }
            Err(e) => rows.push(vec![
                "invalid_history".into(),
                format!("portfolio {}: {}", p.id, e),
            ]),
        }
    }

    // 2) Expired rows nobody purged
    let sessions = query::count::<Session>(conn, &Filter::new().lte("expires_at", now))?;
    if sessions > 0 {
        rows.push(vec!["expired_sessions".into(), sessions.to_string()]);
    }
    let verifications = query::count::<Verification>(conn, &Filter::new().lte("expires_at", now))?;
    if verifications > 0 {
        rows.push(vec!["expired_verifications".into(), verifications.to_string()]);
    }

    // 3) Subscriptions a sweep would change
    let due = Filter::new()
        .any(vec![
            Filter::new()
                .eq("cancel_at_period_end", true)
                .is_in(
                    "status",
                    [
                        SubscriptionStatus::Active,
                        SubscriptionStatus::Trialing,
                        SubscriptionStatus::PastDue,
                    ],
                )
                .lte("period_end", now),
            Filter::new()
                .eq("status", SubscriptionStatus::Trialing)
                .lte("trial_end", now),
        ]);
    let subs: Vec<Subscription> = query::find_many(conn, &FindMany::new(due))?;
    for s in subs {
        rows.push(vec![
            "subscription_sweep_due".into(),
            format!("#{} {} ({})", s.id, s.plan, s.status),
        ]);
    }

    // 4) Bans that have run out but are still flagged
    let stale_bans: Vec<User> = query::find_many(
        conn,
        &FindMany::new(Filter::new().eq("banned", true).lte("ban_expires", now)),
    )?;
    for u in stale_bans {
        rows.push(vec!["ban_expired".into(), u.email]);
    }

    Ok(rows)
}

pub fn handle(conn: &Connection) -> Result<()> {
    let rows = diagnose(conn, Utc::now())?;
    if rows.is_empty() {
        println!("✅ doctor: no issues found");
    } else {
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(())
}
