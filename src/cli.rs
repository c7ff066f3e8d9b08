// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command};

fn opt(name: &'static str) -> Arg {
    Arg::new(name).long(name)
}

fn req(name: &'static str) -> Arg {
    opt(name).required(true)
}

fn flag(name: &'static str) -> Arg {
    Arg::new(name).long(name).action(ArgAction::SetTrue)
}

fn email() -> Arg {
    req("email").help("User email")
}

fn json_flags(cmd: Command) -> Command {
    cmd.arg(flag("json").help("Print as pretty JSON"))
        .arg(
            flag("jsonl")
                .conflicts_with("json")
                .help("Print one JSON object per line"),
        )
}

fn trade(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .about(about)
        .arg(email())
        .arg(req("symbol"))
        .arg(req("qty").help("Quantity"))
        .arg(req("price").help("Price per unit"))
        .arg(opt("fee").help("Fee (default 0)"))
        .arg(opt("date").help("YYYY-MM-DD or RFC 3339 (default now)"))
        .arg(flag("json"))
}

fn sub_id(name: &'static str, about: &'static str) -> Command {
    Command::new(name).about(about).arg(req("id"))
}

pub fn build_cli() -> Command {
    Command::new("stockfolio")
        .about("Users, sessions, subscriptions and stock portfolios in one SQLite file")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand(Command::new("init").about("Create the database"))
        .subcommand(
            Command::new("user")
                .about("Manage users")
                .subcommand(
                    Command::new("create")
                        .arg(email())
                        .arg(req("name"))
                        .arg(flag("admin"))
                        .arg(flag("verified"))
                        .arg(opt("image")),
                )
                .subcommand(json_flags(Command::new("list")))
                .subcommand(Command::new("show").arg(email()).arg(flag("json")))
                .subcommand(
                    Command::new("update")
                        .arg(email())
                        .arg(opt("name"))
                        .arg(opt("new-email"))
                        .arg(opt("image").help("Empty string clears the image"))
                        .arg(opt("verified").help("true|false"))
                        .arg(opt("customer").help("Billing customer id; empty clears it")),
                )
                .subcommand(Command::new("role").arg(email()).arg(req("role").help("user|admin")))
                .subcommand(
                    Command::new("ban")
                        .arg(email())
                        .arg(opt("reason"))
                        .arg(opt("until").help("Ban expiry, YYYY-MM-DD or RFC 3339")),
                )
                .subcommand(Command::new("unban").arg(email()))
                .subcommand(Command::new("delete").arg(email())),
        )
        .subcommand(
            Command::new("session")
                .about("Login sessions")
                .subcommand(
                    Command::new("create")
                        .arg(email())
                        .arg(opt("ip"))
                        .arg(opt("agent")),
                )
                .subcommand(Command::new("check").arg(req("token")))
                .subcommand(Command::new("refresh").arg(req("token")))
                .subcommand(json_flags(Command::new("list").arg(email())))
                .subcommand(Command::new("revoke").arg(req("token")))
                .subcommand(Command::new("revoke-all").arg(email()))
                .subcommand(Command::new("purge").about("Delete expired sessions")),
        )
        .subcommand(
            Command::new("verify")
                .about("One-time verification values")
                .subcommand(Command::new("issue").arg(req("identifier")))
                .subcommand(
                    Command::new("consume")
                        .arg(req("identifier"))
                        .arg(req("value")),
                )
                .subcommand(Command::new("purge")),
        )
        .subcommand(
            Command::new("account")
                .about("Linked sign-in accounts")
                .subcommand(
                    Command::new("link")
                        .arg(email())
                        .arg(req("provider"))
                        .arg(opt("account-id").help("Provider account id (default: user id)"))
                        .arg(opt("password"))
                        .arg(opt("scope")),
                )
                .subcommand(json_flags(Command::new("list").arg(email())))
                .subcommand(Command::new("unlink").arg(email()).arg(req("provider"))),
        )
        .subcommand(
            Command::new("twofactor")
                .about("Two-factor authentication")
                .subcommand(Command::new("enable").arg(email()).arg(req("secret")))
                .subcommand(Command::new("disable").arg(email()))
                .subcommand(Command::new("redeem").arg(email()).arg(req("code")))
                .subcommand(Command::new("regen").arg(email())),
        )
        .subcommand(
            Command::new("sub")
                .about("Subscriptions")
                .subcommand(
                    Command::new("create")
                        .arg(req("plan"))
                        .arg(req("reference").help("Owner reference, usually a user id"))
                        .arg(opt("seats"))
                        .arg(opt("customer")),
                )
                .subcommand(json_flags(Command::new("list").arg(opt("reference"))))
                .subcommand(sub_id("trial", "Start a trial").arg(req("days")))
                .subcommand(
                    sub_id("activate", "Activate for a billing period")
                        .arg(req("start"))
                        .arg(req("end")),
                )
                .subcommand(
                    sub_id("renew", "Start the next billing period")
                        .arg(req("start"))
                        .arg(req("end")),
                )
                .subcommand(
                    sub_id("cancel", "Cancel now or at period end")
                        .arg(flag("at-period-end"))
                        .arg(flag("resume").conflicts_with("at-period-end")),
                )
                .subcommand(sub_id("past-due", "Mark a failed payment"))
                .subcommand(sub_id("unpaid", "Mark as unpaid"))
                .subcommand(sub_id("pause", "Pause billing"))
                .subcommand(Command::new("sweep").about("Apply period-end cancellations and trial expiry")),
        )
        .subcommand(
            Command::new("portfolio")
                .about("Portfolio and positions")
                .subcommand(Command::new("create").arg(email()).arg(opt("name")))
                .subcommand(Command::new("rename").arg(email()).arg(req("name")))
                .subcommand(Command::new("show").arg(email()).arg(flag("json")))
                .subcommand(json_flags(
                    Command::new("value")
                        .arg(email())
                        .arg(flag("live").help("Fetch prices from Yahoo"))
                        .arg(
                            opt("price")
                                .action(ArgAction::Append)
                                .help("Manual price SYMBOL=PRICE (repeatable)"),
                        ),
                ))
                .subcommand(Command::new("rebuild").arg(email()))
                .subcommand(Command::new("check").arg(email())),
        )
        .subcommand(
            Command::new("tx")
                .about("Trades")
                .subcommand(trade("buy", "Record a purchase"))
                .subcommand(trade("sell", "Record a sale"))
                .subcommand(json_flags(
                    Command::new("list")
                        .arg(email())
                        .arg(opt("symbol"))
                        .arg(opt("type").help("buy|sell"))
                        .arg(opt("month").help("YYYY-MM"))
                        .arg(opt("limit")),
                ))
                .subcommand(Command::new("rm").arg(req("id"))),
        )
        .subcommand(
            Command::new("fav")
                .about("Watch list")
                .subcommand(Command::new("add").arg(email()).arg(req("symbol")))
                .subcommand(Command::new("rm").arg(email()).arg(req("symbol")))
                .subcommand(Command::new("toggle").arg(email()).arg(req("symbol")))
                .subcommand(json_flags(Command::new("list").arg(email()))),
        )
        .subcommand(
            Command::new("report")
                .about("Trade statistics")
                .subcommand(json_flags(
                    Command::new("summary")
                        .arg(email())
                        .arg(opt("by").help("Comma separated: symbol,type"))
                        .arg(opt("month").help("YYYY-MM")),
                ))
                .subcommand(json_flags(
                    Command::new("realized")
                        .arg(email())
                        .arg(opt("year")),
                )),
        )
        .subcommand(
            Command::new("export").about("Export data").subcommand(
                Command::new("transactions")
                    .arg(email())
                    .arg(req("format").help("csv|json"))
                    .arg(req("out")),
            ),
        )
        .subcommand(Command::new("doctor").about("Check data consistency"))
        .subcommand(
            Command::new("config")
                .about("Settings")
                .subcommand(json_flags(Command::new("show")))
                .subcommand(Command::new("set").arg(req("key")).arg(req("value"))),
        )
}
