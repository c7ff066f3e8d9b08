// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use rusqlite::Connection;
use stockfolio::ledger;
use stockfolio::models::{NewTransaction, NewUser, TransactionType};
use stockfolio::query::Param;
use stockfolio::store::{favorites, portfolios, positions, transactions, users};
use stockfolio::{cli, commands, db, valuation};

const EMAIL: &str = "pf@example.com";

fn setup() -> (Connection, i64) {
    let mut conn = db::open_in_memory().unwrap();
    let user = users::create(
        &conn,
        &NewUser {
            name: "Pat".into(),
            email: EMAIL.into(),
            ..Default::default()
        },
    )
    .unwrap();
    let pid = portfolios::get_or_create(&conn, user.id).unwrap().id;
    for (sym, kind, q, p, fee, month) in [
        ("AAPL", TransactionType::Buy, 10.0, 100.0, 0.0, 1),
        ("AAPL", TransactionType::Sell, 5.0, 120.0, 1.0, 2),
        ("MSFT", TransactionType::Buy, 2.0, 300.0, 0.0, 2),
    ] {
        ledger::record_trade(
            &mut conn,
            pid,
            &NewTransaction {
                symbol: sym.into(),
                r#type: kind,
                quantity: q,
                price: p,
                fee,
                date: Utc.with_ymd_and_hms(2025, month, 10, 0, 0, 0).unwrap(),
            },
        )
        .unwrap();
    }
    (conn, pid)
}

#[test]
fn valuation_with_manual_prices() {
    let (conn, pid) = setup();
    let held = positions::list(&conn, pid).unwrap();
    let v = valuation::summarize(&held, &HashMap::from([("AAPL".to_string(), 130.0)]));
    assert_eq!(v.holdings.len(), 2);
    assert_eq!(v.totals.invested, 1100.0);
    assert_eq!(v.totals.market_value, 650.0);
    assert_eq!(v.totals.unrealized_pl, 150.0);
    assert_eq!(v.totals.unpriced, 1);

    let matches = cli::build_cli().get_matches_from([
        "stockfolio", "portfolio", "value", "--email", EMAIL, "--price", "aapl=130", "--price",
        "MSFT=310", "--json",
    ]);
    let Some(("portfolio", m)) = matches.subcommand() else {
        panic!("no portfolio subcommand");
    };
    let Some(("value", value_m)) = m.subcommand() else {
        panic!("no value subcommand");
    };
    let prices = commands::portfolio::parse_manual_prices(value_m.get_many::<String>("price").unwrap()).unwrap();
    assert_eq!(prices.len(), 2);
    assert_eq!(valuation::summarize(&held, &prices).totals.unpriced, 0);
}

#[test]
fn summary_groups_by_symbol_and_type() {
    let (conn, pid) = setup();
    let rows = commands::reports::summarize(&conn, pid, &["symbol", "type"], None).unwrap();
    assert_eq!(rows.len(), 3);
    let aapl_buy = &rows[0];
    assert_eq!(aapl_buy.keys["symbol"], Param::Text("AAPL".into()));
    assert_eq!(aapl_buy.keys["type"], Param::Text("BUY".into()));
    assert_eq!(aapl_buy.aggregates.count, 1);
    assert_eq!(aapl_buy.aggregates.sum["amount"], Some(1000.0));

    let feb = commands::reports::summarize(&conn, pid, &[], Some("2025-02".into())).unwrap();
    assert_eq!(feb.len(), 1);
    assert_eq!(feb[0].aggregates.count, 2);
    assert_eq!(feb[0].aggregates.sum["fee"], Some(1.0));

    assert!(commands::reports::summarize(&conn, pid, &["password"], None).is_err());
}

#[test]
fn realized_report_matches_ledger() {
    let (conn, pid) = setup();
    let history = transactions::all_in_order(&conn, pid).unwrap();
    let rows = valuation::realized(&history, Some(2025)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].symbol, "AAPL");
    assert_eq!(rows[0].realized_pl, 99.0);
    assert!(valuation::realized(&history, Some(2024)).unwrap().is_empty());
}

#[test]
fn doctor_reports_drift_until_rebuild() {
    let (mut conn, pid) = setup();
    assert!(commands::doctor::diagnose(&conn, Utc::now()).unwrap().is_empty());

    positions::upsert(&conn, pid, "AAPL", 1.0, 1.0, 1.0).unwrap();
    let issues = commands::doctor::diagnose(&conn, Utc::now()).unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0][0], "position_drift");

    let matches = cli::build_cli().get_matches_from(["stockfolio", "portfolio", "rebuild", "--email", EMAIL]);
    let Some(("portfolio", m)) = matches.subcommand() else {
        panic!("no portfolio subcommand");
    };
    commands::portfolio::handle(&mut conn, m).unwrap();
    assert!(commands::doctor::diagnose(&conn, Utc::now()).unwrap().is_empty());
}

#[test]
fn favorites_via_cli() {
    let (conn, pid) = setup();
    for args in [
        ["stockfolio", "fav", "add", "--email", EMAIL, "--symbol", "tsla"],
        ["stockfolio", "fav", "add", "--email", EMAIL, "--symbol", "TSLA"],
        ["stockfolio", "fav", "toggle", "--email", EMAIL, "--symbol", "nvda"],
    ] {
        let matches = cli::build_cli().get_matches_from(args);
        let Some(("fav", m)) = matches.subcommand() else {
            panic!("no fav subcommand");
        };
        commands::favorites::handle(&conn, m).unwrap();
    }
    let symbols: Vec<String> = favorites::list(&conn, pid)
        .unwrap()
        .into_iter()
        .map(|f| f.symbol)
        .collect();
    assert_eq!(symbols, vec!["NVDA", "TSLA"]);

    let detail = portfolios::detail(&conn, pid).unwrap();
    assert_eq!(detail.favorites.len(), 2);
    assert_eq!(detail.transactions.len(), 3);
    assert_eq!(detail.positions.len(), 2);
}
