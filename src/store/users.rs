// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, Utc};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::error::{Result, StoreError, on_conflict};
use crate::models::{Account, NewUser, Portfolio, Role, Session, User, UserPatch, fmt_ts};
use crate::query::{self, Dir, Filter, FindMany, Param, Update};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

pub fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    if EMAIL_RE.is_match(&email) {
        Ok(email)
    } else {
        Err(StoreError::Validation(format!("Invalid email '{}'", raw.trim())))
    }
}

pub fn create(conn: &Connection, new: &NewUser) -> Result<User> {
    let email = normalize_email(&new.email)?;
    let name = new.name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("User name must not be empty".into()));
    }
    let now = fmt_ts(&Utc::now());
    conn.execute(
        "INSERT INTO users(name, email, email_verified, image, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![name, email, new.email_verified, new.image, new.role, now],
    )
    .map_err(on_conflict("user", &email))?;
    let id = conn.last_insert_rowid();
    info!("created user {} <{}>", id, email);
    query::get(conn, id)
}

pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let email = email.trim().to_lowercase();
    query::find_first(conn, &FindMany::new(Filter::new().eq("email", email)))
}

pub fn by_email(conn: &Connection, email: &str) -> Result<User> {
    find_by_email(conn, email)?.ok_or_else(|| StoreError::not_found("user", email.trim()))
}

pub fn list(conn: &Connection) -> Result<Vec<User>> {
    query::find_many(conn, &FindMany::default().order_by("email", Dir::Asc))
}

pub fn update(conn: &Connection, id: i64, patch: &UserPatch) -> Result<User> {
    let mut changes: Vec<(&str, Update)> = Vec::new();
    let email = match &patch.email {
        Some(raw) => Some(normalize_email(raw)?),
        None => None,
    };
    if let Some(name) = &patch.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("User name must not be empty".into()));
        }
        changes.push(("name", Update::Set(name.into())));
    }
    if let Some(email) = &email {
        changes.push(("email", Update::Set(email.as_str().into())));
        // a changed address has not been verified yet
        changes.push(("email_verified", Update::Set(false.into())));
    }
    if let Some(v) = patch.email_verified {
        changes.push(("email_verified", Update::Set(v.into())));
    }
    if let Some(image) = &patch.image {
        changes.push(("image", Update::Set(image.clone().into())));
    }
    if let Some(cust) = &patch.stripe_customer_id {
        changes.push(("stripe_customer_id", Update::Set(cust.clone().into())));
    }
    touch(conn, id, changes, email.as_deref())
}

pub fn set_role(conn: &Connection, id: i64, role: Role) -> Result<User> {
    info!("setting role of user {} to {}", id, role);
    touch(conn, id, vec![("role", Update::Set(role.into()))], None)
}

pub fn ban(
    conn: &Connection,
    id: i64,
    reason: Option<&str>,
    expires: Option<DateTime<Utc>>,
) -> Result<User> {
    let user = touch(
        conn,
        id,
        vec![
            ("banned", Update::Set(true.into())),
            ("ban_reason", Update::Set(reason.map(str::to_string).into())),
            ("ban_expires", Update::Set(expires.into())),
        ],
        None,
    )?;
    // a ban ends every live session
    let revoked = query::delete_many::<Session>(conn, &Filter::new().eq("user_id", id))?;
    info!("banned user {} ({} session(s) revoked)", id, revoked);
    Ok(user)
}

pub fn unban(conn: &Connection, id: i64) -> Result<User> {
    info!("unbanning user {}", id);
    touch(
        conn,
        id,
        vec![
            ("banned", Update::Set(false.into())),
            ("ban_reason", Update::Set(Param::Null)),
            ("ban_expires", Update::Set(Param::Null)),
        ],
        None,
    )
}

/// Deletes the user; sessions, accounts, two-factor rows and the portfolio cascade.
pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    if !query::delete::<User>(conn, id)? {
        return Err(StoreError::not_found("user", id));
    }
    info!("deleted user {}", id);
    Ok(())
}

fn touch(
    conn: &Connection,
    id: i64,
    mut changes: Vec<(&str, Update)>,
    email: Option<&str>,
) -> Result<User> {
    if changes.is_empty() {
        return query::get(conn, id);
    }
    changes.push(("updated_at", Update::Set(Utc::now().into())));
    let n = query::update_many::<User>(conn, &Filter::id(id), &changes).map_err(|e| {
        if e.is_unique_violation() {
            StoreError::already_exists("user", email.unwrap_or_default())
        } else {
            e
        }
    })?;
    if n == 0 {
        return Err(StoreError::not_found("user", id));
    }
    debug!("updated user {}", id);
    query::get(conn, id)
}

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub user: User,
    pub portfolio: Option<Portfolio>,
    pub sessions: Vec<Session>,
    pub accounts: Vec<Account>,
}

/// Loads a user together with its related rows.
pub fn profile(conn: &Connection, id: i64) -> Result<UserProfile> {
    let user: User = query::get(conn, id)?;
    let by_user = Filter::new().eq("user_id", id);
    let portfolio = query::find_first(conn, &FindMany::new(by_user.clone()))?;
    let sessions = query::find_many(
        conn,
        &FindMany::new(by_user.clone()).order_by("created_at", Dir::Desc),
    )?;
    let accounts = query::find_many(
        conn,
        &FindMany::new(by_user).order_by("provider_id", Dir::Asc),
    )?;
    Ok(UserProfile {
        user,
        portfolio,
        sessions,
        accounts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewAccount;
    use crate::store::{accounts, portfolios, sessions, testutil};
    use chrono::Duration;

    #[test]
    fn create_normalizes_email_and_rejects_duplicates() {
        let conn = testutil::conn();
        let u = create(
            &conn,
            &NewUser {
                name: " Ada ".into(),
                email: " Ada@Example.COM ".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(u.email, "ada@example.com");
        assert_eq!(u.name, "Ada");
        assert_eq!(u.role, Role::User);
        assert!(!u.two_factor_enabled);

        let err = create(
            &conn,
            &NewUser {
                name: "Other".into(),
                email: "ADA@example.com".into(),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[test]
    fn create_rejects_bad_email() {
        let conn = testutil::conn();
        let err = create(
            &conn,
            &NewUser {
                name: "X".into(),
                email: "not-an-email".into(),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn changing_email_resets_verification() {
        let conn = testutil::conn();
        let u = testutil::user(&conn, "grace@example.com");
        update(
            &conn,
            u.id,
            &UserPatch {
                email_verified: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        let u = update(
            &conn,
            u.id,
            &UserPatch {
                email: Some("Grace@New.io".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(u.email, "grace@new.io");
        assert!(!u.email_verified);
    }

    #[test]
    fn update_to_taken_email_is_conflict() {
        let conn = testutil::conn();
        testutil::user(&conn, "a@example.com");
        let b = testutil::user(&conn, "b@example.com");
        let err = update(
            &conn,
            b.id,
            &UserPatch {
                email: Some("a@example.com".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[test]
    fn ban_expiry_is_honored() {
        let conn = testutil::conn();
        let u = testutil::user(&conn, "b@example.com");
        let now = Utc::now();
        let u = ban(&conn, u.id, Some("spam"), Some(now + Duration::days(1))).unwrap();
        assert!(u.is_banned_at(now));
        assert!(!u.is_banned_at(now + Duration::days(2)));
        assert_eq!(u.ban_reason.as_deref(), Some("spam"));

        let u = unban(&conn, u.id).unwrap();
        assert!(!u.banned);
        assert!(u.ban_reason.is_none());
        assert!(u.ban_expires.is_none());
    }

    #[test]
    fn profile_loads_related_rows() {
        let conn = testutil::conn();
        let cfg = crate::config::Config::default();
        let u = testutil::user(&conn, "prof@example.com");
        let bare = profile(&conn, u.id).unwrap();
        assert!(bare.portfolio.is_none());
        assert!(bare.sessions.is_empty());

        let p = portfolios::get_or_create(&conn, u.id).unwrap();
        let s = sessions::create(&conn, &cfg, u.id, &Default::default(), Utc::now()).unwrap();
        for (provider, account_id) in [("google", "g-1"), ("credential", "c-1")] {
            accounts::link(
                &conn,
                &NewAccount {
                    user_id: u.id,
                    account_id: account_id.into(),
                    provider_id: provider.into(),
                    ..Default::default()
                },
            )
            .unwrap();
        }
        let other = testutil::user(&conn, "else@example.com");
        sessions::create(&conn, &cfg, other.id, &Default::default(), Utc::now()).unwrap();

        let full = profile(&conn, u.id).unwrap();
        assert_eq!(full.user.id, u.id);
        assert_eq!(full.portfolio.map(|p| p.id), Some(p.id));
        assert_eq!(full.sessions.len(), 1);
        assert_eq!(full.sessions[0].token, s.token);
        let providers: Vec<&str> = full.accounts.iter().map(|a| a.provider_id.as_str()).collect();
        assert_eq!(providers, ["credential", "google"]);

        assert!(matches!(
            profile(&conn, 999).unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }

    #[test]
    fn delete_missing_user_is_not_found() {
        let conn = testutil::conn();
        assert!(matches!(
            delete(&conn, 42).unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }
}
