// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{Duration, Utc};
use clap::ArgMatches;
use rusqlite::Connection;
use stockfolio::config::Config;
use stockfolio::models::Role;
use stockfolio::store::{accounts, portfolios, sessions, two_factor, users};
use stockfolio::{cli, commands, db};

fn matches(args: &[&str]) -> ArgMatches {
    let mut argv = vec!["stockfolio"];
    argv.extend_from_slice(args);
    cli::build_cli().get_matches_from(argv)
}

fn user_cmd(conn: &Connection, args: &[&str]) -> anyhow::Result<()> {
    let mut argv = vec!["user"];
    argv.extend_from_slice(args);
    match matches(&argv).subcommand() {
        Some(("user", m)) => commands::users::handle(conn, m),
        _ => panic!("no user subcommand"),
    }
}

fn account_cmd(conn: &Connection, args: &[&str]) -> anyhow::Result<()> {
    let mut argv = vec!["account"];
    argv.extend_from_slice(args);
    match matches(&argv).subcommand() {
        Some(("account", m)) => commands::accounts::handle(conn, m),
        _ => panic!("no account subcommand"),
    }
}

#[test]
fn create_update_and_delete_user() {
    let conn = db::open_in_memory().unwrap();
    user_cmd(
        &conn,
        &["create", "--email", " Ada@Example.com ", "--name", "Ada", "--admin"],
    )
    .unwrap();
    let u = users::by_email(&conn, "ada@example.com").unwrap();
    assert_eq!(u.role, Role::Admin);
    assert!(!u.email_verified);

    assert!(
        user_cmd(&conn, &["create", "--email", "ada@example.com", "--name", "Dup"]).is_err()
    );

    user_cmd(
        &conn,
        &["update", "--email", "ada@example.com", "--verified", "true", "--image", "https://img/a.png"],
    )
    .unwrap();
    let u = users::by_email(&conn, "ada@example.com").unwrap();
    assert!(u.email_verified);
    assert_eq!(u.image.as_deref(), Some("https://img/a.png"));

    user_cmd(&conn, &["update", "--email", "ada@example.com", "--image", ""]).unwrap();
    assert!(users::by_email(&conn, "ada@example.com").unwrap().image.is_none());

    user_cmd(&conn, &["role", "--email", "ada@example.com", "--role", "user"]).unwrap();
    assert_eq!(users::by_email(&conn, "ada@example.com").unwrap().role, Role::User);

    portfolios::get_or_create(&conn, u.id).unwrap();
    user_cmd(&conn, &["delete", "--email", "ada@example.com"]).unwrap();
    assert!(users::find_by_email(&conn, "ada@example.com").unwrap().is_none());
    assert!(portfolios::for_user(&conn, u.id).unwrap().is_none());
}

#[test]
fn ban_blocks_sessions_until_unbanned() {
    let conn = db::open_in_memory().unwrap();
    let cfg = Config::default();
    user_cmd(&conn, &["create", "--email", "bob@example.com", "--name", "Bob"]).unwrap();
    let bob = users::by_email(&conn, "bob@example.com").unwrap();
    let now = Utc::now();
    let s = sessions::create(&conn, &cfg, bob.id, &Default::default(), now).unwrap();
    assert!(sessions::validate(&conn, &s.token, now).unwrap().is_some());

    user_cmd(&conn, &["ban", "--email", "bob@example.com", "--reason", "spam"]).unwrap();
    assert!(sessions::validate(&conn, &s.token, now).unwrap().is_none());
    assert!(sessions::create(&conn, &cfg, bob.id, &Default::default(), now).is_err());

    user_cmd(&conn, &["unban", "--email", "bob@example.com"]).unwrap();
    let s = sessions::create(&conn, &cfg, bob.id, &Default::default(), now).unwrap();
    assert!(sessions::validate(&conn, &s.token, now).unwrap().is_some());
    assert!(
        sessions::validate(&conn, &s.token, now + cfg.session_ttl + Duration::seconds(1))
            .unwrap()
            .is_none()
    );
    assert!(sessions::find_by_token(&conn, &s.token).unwrap().is_none());
}

#[test]
fn last_account_cannot_be_unlinked() {
    let conn = db::open_in_memory().unwrap();
    user_cmd(&conn, &["create", "--email", "cy@example.com", "--name", "Cy"]).unwrap();
    account_cmd(
        &conn,
        &["link", "--email", "cy@example.com", "--provider", "credential", "--password", "hash"],
    )
    .unwrap();
    account_cmd(
        &conn,
        &["link", "--email", "cy@example.com", "--provider", "GitHub", "--account-id", "42"],
    )
    .unwrap();
    let cy = users::by_email(&conn, "cy@example.com").unwrap();
    assert_eq!(accounts::list_for_user(&conn, cy.id).unwrap().len(), 2);

    account_cmd(&conn, &["unlink", "--email", "cy@example.com", "--provider", "github"]).unwrap();
    let err = account_cmd(
        &conn,
        &["unlink", "--email", "cy@example.com", "--provider", "credential"],
    )
    .unwrap_err();
    assert!(err.to_string().contains("last account"));
}

#[test]
fn two_factor_codes_are_single_use() {
    let mut conn = db::open_in_memory().unwrap();
    user_cmd(&conn, &["create", "--email", "dee@example.com", "--name", "Dee"]).unwrap();
    let dee = users::by_email(&conn, "dee@example.com").unwrap();
    let codes = two_factor::enable(&mut conn, dee.id, "JBSWY3DPEHPK3PXP").unwrap();
    assert!(users::by_email(&conn, "dee@example.com").unwrap().two_factor_enabled);

    let m = matches(&["twofactor", "redeem", "--email", "dee@example.com", "--code", codes[0].as_str()]);
    let Some(("twofactor", tf)) = m.subcommand() else {
        panic!("no twofactor subcommand");
    };
    commands::twofactor::handle(&mut conn, tf).unwrap();
    assert!(commands::twofactor::handle(&mut conn, tf).is_err());

    let m = matches(&["twofactor", "disable", "--email", "dee@example.com"]);
    let Some(("twofactor", tf)) = m.subcommand() else {
        panic!("no twofactor subcommand");
    };
    commands::twofactor::handle(&mut conn, tf).unwrap();
    assert!(!users::by_email(&conn, "dee@example.com").unwrap().two_factor_enabled);
    assert!(two_factor::find_for_user(&conn, dee.id).unwrap().is_none());
}
