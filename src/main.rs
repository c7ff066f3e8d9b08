// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use env_logger::Builder;
use log::LevelFilter;

use stockfolio::{cli, commands, config::Config, db};

fn main() -> Result<()> {
    Builder::new()
        .filter_level(LevelFilter::Warn)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    let cli = cli::build_cli();
    let matches = cli.get_matches();

    let mut conn = db::open_or_init()?;
    let cfg = Config::load(&conn)?;

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database initialized at {}", db::db_path()?.display());
        }
        Some(("user", sub)) => commands::users::handle(&conn, sub)?,
        Some(("session", sub)) => commands::sessions::handle(&conn, &cfg, sub)?,
        Some(("verify", sub)) => commands::verify::handle(&mut conn, &cfg, sub)?,
        Some(("account", sub)) => commands::accounts::handle(&conn, sub)?,
        Some(("twofactor", sub)) => commands::twofactor::handle(&mut conn, sub)?,
        Some(("sub", sub)) => commands::subscriptions::handle(&conn, sub)?,
        Some(("portfolio", sub)) => commands::portfolio::handle(&mut conn, sub)?,
        Some(("tx", sub)) => commands::transactions::handle(&mut conn, sub)?,
        Some(("fav", sub)) => commands::favorites::handle(&conn, sub)?,
        Some(("report", sub)) => commands::reports::handle(&conn, sub)?,
        Some(("export", sub)) => commands::exporter::handle(&conn, sub)?,
        Some(("doctor", _)) => commands::doctor::handle(&conn)?,
        Some(("config", sub)) => commands::settings::handle(&conn, sub)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
