// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Subscription rows and their status lifecycle.

use chrono::{DateTime, Duration, Utc};
use log::info;
use rusqlite::{Connection, params};

use crate::error::{Result, StoreError};
use crate::models::{NewSubscription, Subscription, SubscriptionStatus, fmt_ts};
use crate::query::{self, Dir, Filter, FindMany, Param, Update};

use SubscriptionStatus::*;

pub fn can_transition(from: SubscriptionStatus, to: SubscriptionStatus) -> bool {
    match from {
        Incomplete => matches!(to, Active | Trialing | IncompleteExpired),
        Trialing => matches!(to, Active | Canceled | IncompleteExpired | PastDue),
        Active => matches!(to, PastDue | Canceled | Paused | Unpaid),
        PastDue => matches!(to, Active | Canceled | Unpaid),
        Unpaid => matches!(to, Active | Canceled),
        Paused => matches!(to, Active | Canceled),
        Canceled | IncompleteExpired => false,
    }
}

pub fn create(conn: &Connection, new: &NewSubscription) -> Result<Subscription> {
    let plan = new.plan.trim().to_lowercase();
    let reference = new.reference_id.trim();
    if plan.is_empty() || reference.is_empty() {
        return Err(StoreError::Validation(
            "Plan and reference id are required".into(),
        ));
    }
    if new.seats.is_some_and(|s| s < 1) {
        return Err(StoreError::Validation("Seats must be at least 1".into()));
    }
    let now = fmt_ts(&Utc::now());
    conn.execute(
        "INSERT INTO subscriptions(plan, reference_id, stripe_customer_id, stripe_subscription_id, status, seats, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            plan,
            reference,
            new.stripe_customer_id,
            new.stripe_subscription_id,
            Incomplete,
            new.seats,
            now
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!("created {} subscription {} for {}", plan, id, reference);
    query::get(conn, id)
}

pub fn list_for_reference(conn: &Connection, reference_id: &str) -> Result<Vec<Subscription>> {
    query::find_many(
        conn,
        &FindMany::new(Filter::new().eq("reference_id", reference_id.trim()))
            .order_by("created_at", Dir::Desc),
    )
}

pub fn list(conn: &Connection) -> Result<Vec<Subscription>> {
    query::find_many(conn, &FindMany::default().order_by("id", Dir::Asc))
}

/// The current subscription granting access, if any.
pub fn active_for_reference(conn: &Connection, reference_id: &str) -> Result<Option<Subscription>> {
    query::find_first(
        conn,
        &FindMany::new(
            Filter::new()
                .eq("reference_id", reference_id.trim())
                .is_in("status", [Active, Trialing]),
        )
        .order_by("created_at", Dir::Desc),
    )
}

fn transition(
    conn: &Connection,
    id: i64,
    to: SubscriptionStatus,
    mut extra: Vec<(&str, Update)>,
) -> Result<Subscription> {
    let sub: Subscription = query::get(conn, id)?;
    if !can_transition(sub.status, to) {
        return Err(StoreError::InvalidTransition {
            id,
            from: sub.status.to_string(),
            to: to.to_string(),
        });
    }
    extra.push(("status", Update::Set(to.into())));
    extra.push(("updated_at", Update::Set(Utc::now().into())));
    query::update_many::<Subscription>(conn, &Filter::id(id), &extra)?;
    info!("subscription {}: {} -> {}", id, sub.status, to);
    query::get(conn, id)
}

pub fn start_trial(conn: &Connection, id: i64, days: i64, now: DateTime<Utc>) -> Result<Subscription> {
    if days < 1 {
        return Err(StoreError::Validation("Trial must last at least one day".into()));
    }
    transition(
        conn,
        id,
        Trialing,
        vec![
            ("trial_start", Update::Set(now.into())),
            ("trial_end", Update::Set((now + Duration::days(days)).into())),
        ],
    )
}

pub fn activate(
    conn: &Connection,
    id: i64,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<Subscription> {
    check_period(period_start, period_end)?;
    transition(
        conn,
        id,
        Active,
        vec![
            ("period_start", Update::Set(period_start.into())),
            ("period_end", Update::Set(period_end.into())),
        ],
    )
}

/// Starts a new billing period. An active subscription keeps its status;
/// a lapsed (past due / unpaid) one becomes active again.
pub fn renew(
    conn: &Connection,
    id: i64,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<Subscription> {
    let sub: Subscription = query::get(conn, id)?;
    if sub.status != Active {
        return activate(conn, id, period_start, period_end);
    }
    check_period(period_start, period_end)?;
    query::update_many::<Subscription>(
        conn,
        &Filter::id(id),
        &[
            ("period_start", Update::Set(period_start.into())),
            ("period_end", Update::Set(period_end.into())),
            ("updated_at", Update::Set(Utc::now().into())),
        ],
    )?;
    info!("subscription {} renewed until {}", id, fmt_ts(&period_end));
    query::get(conn, id)
}

pub fn cancel_at_period_end(conn: &Connection, id: i64, cancel: bool) -> Result<Subscription> {
    let sub: Subscription = query::get(conn, id)?;
    if !sub.is_active() {
        return Err(StoreError::Validation(format!(
            "Subscription {} is {} and cannot be scheduled for cancellation",
            id, sub.status
        )));
    }
    query::update_many::<Subscription>(
        conn,
        &Filter::id(id),
        &[
            ("cancel_at_period_end", Update::Set(cancel.into())),
            ("updated_at", Update::Set(Utc::now().into())),
        ],
    )?;
    info!(
        "subscription {} {}",
        id,
        if cancel { "scheduled for cancellation" } else { "resumed" }
    );
    query::get(conn, id)
}

pub fn cancel_now(conn: &Connection, id: i64) -> Result<Subscription> {
    transition(
        conn,
        id,
        Canceled,
        vec![("cancel_at_period_end", Update::Set(false.into()))],
    )
}

pub fn mark_past_due(conn: &Connection, id: i64) -> Result<Subscription> {
    transition(conn, id, PastDue, Vec::new())
}

pub fn mark_unpaid(conn: &Connection, id: i64) -> Result<Subscription> {
    transition(conn, id, Unpaid, Vec::new())
}

pub fn pause(conn: &Connection, id: i64) -> Result<Subscription> {
    transition(conn, id, Paused, Vec::new())
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub canceled: usize,
    pub expired_trials: usize,
}

/// Applies time-based transitions: scheduled cancellations whose period has
/// ended, and trials that ran out without being activated.
pub fn sweep(conn: &Connection, now: DateTime<Utc>) -> Result<SweepReport> {
    let canceled = query::update_many::<Subscription>(
        conn,
        &Filter::new()
            .is_in("status", [Active, Trialing, PastDue])
            .eq("cancel_at_period_end", true)
            .not_null("period_end")
            .lte("period_end", now),
        &[
            ("status", Update::Set(Canceled.into())),
            ("cancel_at_period_end", Update::Set(false.into())),
            ("updated_at", Update::Set(now.into())),
        ],
    )?;
    let expired_trials = query::update_many::<Subscription>(
        conn,
        &Filter::new()
            .eq("status", Trialing)
            .not_null("trial_end")
            .lte("trial_end", now),
        &[
            ("status", Update::Set(IncompleteExpired.into())),
            ("updated_at", Update::Set(Param::from(now))),
        ],
    )?;
    info!(
        "subscription sweep: {} canceled, {} trial(s) expired",
        canceled, expired_trials
    );
    Ok(SweepReport {
        canceled,
        expired_trials,
    })
}

fn check_period(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if end <= start {
        return Err(StoreError::Validation(format!(
            "Period end {} must be after start {}",
            fmt_ts(&end),
            fmt_ts(&start)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testutil;

    fn new_sub(conn: &Connection) -> Subscription {
        create(
            conn,
            &NewSubscription {
                plan: " Pro ".into(),
                reference_id: "user-1".into(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    const ALL: [SubscriptionStatus; 8] = [
        Incomplete,
        IncompleteExpired,
        Trialing,
        Active,
        PastDue,
        Canceled,
        Unpaid,
        Paused,
    ];

    #[test]
    fn transition_table_matches_lifecycle() {
        let allowed = [
            (Incomplete, Active),
            (Incomplete, Trialing),
            (Incomplete, IncompleteExpired),
            (Trialing, Active),
            (Trialing, Canceled),
            (Trialing, IncompleteExpired),
            (Trialing, PastDue),
            (Active, PastDue),
            (Active, Canceled),
            (Active, Paused),
            (Active, Unpaid),
            (PastDue, Active),
            (PastDue, Canceled),
            (PastDue, Unpaid),
            (Unpaid, Active),
            (Unpaid, Canceled),
            (Paused, Active),
            (Paused, Canceled),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    can_transition(from, to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn repeating_a_transition_is_rejected() {
        let conn = testutil::conn();
        let now = Utc::now();

        let trial = new_sub(&conn);
        let first = start_trial(&conn, trial.id, 7, now).unwrap();
        let err = start_trial(&conn, trial.id, 7, now + Duration::days(6)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        let kept = query::get::<Subscription>(&conn, trial.id).unwrap();
        assert_eq!(kept.trial_end, first.trial_end);

        let paused = new_sub(&conn);
        activate(&conn, paused.id, now, now + Duration::days(30)).unwrap();
        assert_eq!(pause(&conn, paused.id).unwrap().status, Paused);
        assert!(matches!(
            pause(&conn, paused.id).unwrap_err(),
            StoreError::InvalidTransition { .. }
        ));

        cancel_now(&conn, paused.id).unwrap();
        assert!(matches!(
            cancel_now(&conn, paused.id).unwrap_err(),
            StoreError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn renew_extends_active_and_revives_lapsed() {
        let conn = testutil::conn();
        let now = Utc::now();
        let s = new_sub(&conn);
        activate(&conn, s.id, now, now + Duration::days(30)).unwrap();

        let next_end = now + Duration::days(60);
        let renewed = renew(&conn, s.id, now + Duration::days(30), next_end).unwrap();
        assert_eq!(renewed.status, Active);
        assert_eq!(renewed.period_end.map(|t| fmt_ts(&t)), Some(fmt_ts(&next_end)));

        assert_eq!(mark_unpaid(&conn, s.id).unwrap().status, Unpaid);
        assert!(matches!(
            mark_past_due(&conn, s.id).unwrap_err(),
            StoreError::InvalidTransition { .. }
        ));
        let revived = renew(&conn, s.id, now + Duration::days(60), now + Duration::days(90)).unwrap();
        assert_eq!(revived.status, Active);

        cancel_now(&conn, s.id).unwrap();
        assert!(matches!(
            renew(&conn, s.id, now, now + Duration::days(30)).unwrap_err(),
            StoreError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn lifecycle_from_trial_to_cancel() {
        let conn = testutil::conn();
        let now = Utc::now();
        let s = new_sub(&conn);
        assert_eq!(s.plan, "pro");
        assert_eq!(s.status, Incomplete);

        let s = start_trial(&conn, s.id, 14, now).unwrap();
        assert_eq!(s.status, Trialing);
        assert!(s.is_active());

        let s = activate(&conn, s.id, now, now + Duration::days(30)).unwrap();
        assert_eq!(s.status, Active);
        assert_eq!(
            active_for_reference(&conn, "user-1").unwrap().map(|a| a.id),
            Some(s.id)
        );

        let s = cancel_now(&conn, s.id).unwrap();
        assert_eq!(s.status, Canceled);
        let err = activate(&conn, s.id, now, now + Duration::days(30)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn sweep_applies_scheduled_cancellations_and_trial_expiry() {
        let conn = testutil::conn();
        let now = Utc::now();

        let paid = new_sub(&conn);
        activate(&conn, paid.id, now - Duration::days(30), now - Duration::days(1)).unwrap();
        cancel_at_period_end(&conn, paid.id, true).unwrap();

        let trial = new_sub(&conn);
        start_trial(&conn, trial.id, 7, now - Duration::days(8)).unwrap();

        let keep = new_sub(&conn);
        activate(&conn, keep.id, now, now + Duration::days(30)).unwrap();
        cancel_at_period_end(&conn, keep.id, true).unwrap();

        let report = sweep(&conn, now).unwrap();
        assert_eq!(
            report,
            SweepReport {
                canceled: 1,
                expired_trials: 1
            }
        );
        assert_eq!(query::get::<Subscription>(&conn, paid.id).unwrap().status, Canceled);
        assert_eq!(
            query::get::<Subscription>(&conn, trial.id).unwrap().status,
            IncompleteExpired
        );
        let keep = query::get::<Subscription>(&conn, keep.id).unwrap();
        assert_eq!(keep.status, Active);
        assert!(keep.cancel_at_period_end);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let conn = testutil::conn();
        let now = Utc::now();
        let s = new_sub(&conn);
        assert!(matches!(
            activate(&conn, s.id, now, now).unwrap_err(),
            StoreError::Validation(_)
        ));
        assert!(matches!(
            cancel_at_period_end(&conn, s.id, true).unwrap_err(),
            StoreError::Validation(_)
        ));
        assert!(matches!(
            create(
                &conn,
                &NewSubscription {
                    plan: "team".into(),
                    reference_id: "org".into(),
                    seats: Some(0),
                    ..Default::default()
                }
            )
            .unwrap_err(),
            StoreError::Validation(_)
        ));
    }
}
