// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::Entity;

#[derive(Debug, Error)]
#[error("Invalid {kind} '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

macro_rules! sql_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $(v if v.eq_ignore_ascii_case($text) => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

sql_enum!(Role, "role", { User => "USER", Admin => "ADMIN" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Buy,
    Sell,
}

sql_enum!(TransactionType, "transaction type", { Buy => "BUY", Sell => "SELL" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Incomplete,
    IncompleteExpired,
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
    Paused,
}

sql_enum!(SubscriptionStatus, "subscription status", {
    Incomplete => "incomplete",
    IncompleteExpired => "incomplete_expired",
    Trialing => "trialing",
    Active => "active",
    PastDue => "past_due",
    Canceled => "canceled",
    Unpaid => "unpaid",
    Paused => "paused",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub image: Option<String>,
    pub role: Role,
    pub two_factor_enabled: bool,
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub ban_expires: Option<DateTime<Utc>>,
    pub stripe_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A ban whose expiry has passed no longer applies.
    pub fn is_banned_at(&self, now: DateTime<Utc>) -> bool {
        self.banned && self.ban_expires.is_none_or(|until| until > now)
    }
}

impl Entity for User {
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "email",
        "email_verified",
        "image",
        "role",
        "two_factor_enabled",
        "banned",
        "ban_reason",
        "ban_expires",
        "stripe_customer_id",
        "created_at",
        "updated_at",
    ];
    const NUMERIC: &'static [&'static str] = &["id"];

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            id: r.get("id")?,
            name: r.get("name")?,
            email: r.get("email")?,
            email_verified: r.get("email_verified")?,
            image: r.get("image")?,
            role: r.get("role")?,
            two_factor_enabled: r.get("two_factor_enabled")?,
            banned: r.get("banned")?,
            ban_reason: r.get("ban_reason")?,
            ban_expires: read_opt_ts(r, "ban_expires")?,
            stripe_customer_id: r.get("stripe_customer_id")?,
            created_at: read_ts(r, "created_at")?,
            updated_at: read_ts(r, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub image: Option<String>,
    pub role: Role,
}

/// Fields left as `None` are not touched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub image: Option<Option<String>>,
    pub stripe_customer_id: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub impersonated_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Session {
    const TABLE: &'static str = "sessions";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "token",
        "expires_at",
        "ip_address",
        "user_agent",
        "impersonated_by",
        "created_at",
        "updated_at",
    ];
    const NUMERIC: &'static [&'static str] = &["id", "user_id"];

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Session {
            id: r.get("id")?,
            user_id: r.get("user_id")?,
            token: r.get("token")?,
            expires_at: read_ts(r, "expires_at")?,
            ip_address: r.get("ip_address")?,
            user_agent: r.get("user_agent")?,
            impersonated_by: r.get("impersonated_by")?,
            created_at: read_ts(r, "created_at")?,
            updated_at: read_ts(r, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub account_id: String,
    pub provider_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Account {
    const TABLE: &'static str = "accounts";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "user_id",
        "account_id",
        "provider_id",
        "access_token",
        "refresh_token",
        "id_token",
        "access_token_expires_at",
        "refresh_token_expires_at",
        "scope",
        "password",
        "created_at",
        "updated_at",
    ];
    const NUMERIC: &'static [&'static str] = &["id", "user_id"];

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Account {
            id: r.get("id")?,
            user_id: r.get("user_id")?,
            account_id: r.get("account_id")?,
            provider_id: r.get("provider_id")?,
            access_token: r.get("access_token")?,
            refresh_token: r.get("refresh_token")?,
            id_token: r.get("id_token")?,
            access_token_expires_at: read_opt_ts(r, "access_token_expires_at")?,
            refresh_token_expires_at: read_opt_ts(r, "refresh_token_expires_at")?,
            scope: r.get("scope")?,
            password: r.get("password")?,
            created_at: read_ts(r, "created_at")?,
            updated_at: read_ts(r, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub user_id: i64,
    pub account_id: String,
    pub provider_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AccountTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub id: i64,
    pub identifier: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Verification {
    const TABLE: &'static str = "verifications";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "identifier",
        "value",
        "expires_at",
        "created_at",
        "updated_at",
    ];
    const NUMERIC: &'static [&'static str] = &["id"];

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Verification {
            id: r.get("id")?,
            identifier: r.get("identifier")?,
            value: r.get("value")?,
            expires_at: read_ts(r, "expires_at")?,
            created_at: read_ts(r, "created_at")?,
            updated_at: read_ts(r, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub plan: String,
    pub reference_id: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub status: SubscriptionStatus,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub seats: Option<i64>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        )
    }
}

impl Entity for Subscription {
    const TABLE: &'static str = "subscriptions";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "plan",
        "reference_id",
        "stripe_customer_id",
        "stripe_subscription_id",
        "status",
        "period_start",
        "period_end",
        "cancel_at_period_end",
        "seats",
        "trial_start",
        "trial_end",
        "created_at",
        "updated_at",
    ];
    const NUMERIC: &'static [&'static str] = &["id", "seats"];

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Subscription {
            id: r.get("id")?,
            plan: r.get("plan")?,
            reference_id: r.get("reference_id")?,
            stripe_customer_id: r.get("stripe_customer_id")?,
            stripe_subscription_id: r.get("stripe_subscription_id")?,
            status: r.get("status")?,
            period_start: read_opt_ts(r, "period_start")?,
            period_end: read_opt_ts(r, "period_end")?,
            cancel_at_period_end: r.get("cancel_at_period_end")?,
            seats: r.get("seats")?,
            trial_start: read_opt_ts(r, "trial_start")?,
            trial_end: read_opt_ts(r, "trial_end")?,
            created_at: read_ts(r, "created_at")?,
            updated_at: read_ts(r, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewSubscription {
    pub plan: String,
    pub reference_id: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub seats: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoFactor {
    pub id: i64,
    pub user_id: i64,
    #[serde(skip_serializing)]
    pub secret: String,
    #[serde(skip_serializing)]
    pub backup_codes: String,
}

impl TwoFactor {
    pub fn codes(&self) -> serde_json::Result<Vec<String>> {
        serde_json::from_str(&self.backup_codes)
    }
}

impl Entity for TwoFactor {
    const TABLE: &'static str = "two_factors";
    const COLUMNS: &'static [&'static str] = &["id", "user_id", "secret", "backup_codes"];
    const NUMERIC: &'static [&'static str] = &["id", "user_id"];

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(TwoFactor {
            id: r.get("id")?,
            user_id: r.get("user_id")?,
            secret: r.get("secret")?,
            backup_codes: r.get("backup_codes")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Portfolio {
    const TABLE: &'static str = "portfolios";
    const COLUMNS: &'static [&'static str] = &["id", "user_id", "name", "created_at", "updated_at"];
    const NUMERIC: &'static [&'static str] = &["id", "user_id"];

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Portfolio {
            id: r.get("id")?,
            user_id: r.get("user_id")?,
            name: r.get("name")?,
            created_at: read_ts(r, "created_at")?,
            updated_at: read_ts(r, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub portfolio_id: i64,
    pub symbol: String,
    pub total_quantity: f64,
    pub total_invested: f64,
    pub avg_price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Position {
    const TABLE: &'static str = "positions";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "portfolio_id",
        "symbol",
        "total_quantity",
        "total_invested",
        "avg_price",
        "created_at",
        "updated_at",
    ];
    const NUMERIC: &'static [&'static str] = &[
        "id",
        "portfolio_id",
        "total_quantity",
        "total_invested",
        "avg_price",
    ];

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Position {
            id: r.get("id")?,
            portfolio_id: r.get("portfolio_id")?,
            symbol: r.get("symbol")?,
            total_quantity: r.get("total_quantity")?,
            total_invested: r.get("total_invested")?,
            avg_price: r.get("avg_price")?,
            created_at: read_ts(r, "created_at")?,
            updated_at: read_ts(r, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub portfolio_id: i64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub r#type: TransactionType,
    pub quantity: f64,
    pub price: f64,
    pub amount: f64,
    pub fee: f64,
    pub date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Transaction {
    const TABLE: &'static str = "transactions";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "portfolio_id",
        "symbol",
        "type",
        "quantity",
        "price",
        "amount",
        "fee",
        "date",
        "created_at",
    ];
    const NUMERIC: &'static [&'static str] =
        &["id", "portfolio_id", "quantity", "price", "amount", "fee"];

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Transaction {
            id: r.get("id")?,
            portfolio_id: r.get("portfolio_id")?,
            symbol: r.get("symbol")?,
            r#type: r.get("type")?,
            quantity: r.get("quantity")?,
            price: r.get("price")?,
            amount: r.get("amount")?,
            fee: r.get("fee")?,
            date: read_ts(r, "date")?,
            created_at: read_ts(r, "created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub symbol: String,
    pub r#type: TransactionType,
    pub quantity: f64,
    pub price: f64,
    pub fee: f64,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Favorite {
    pub id: i64,
    pub portfolio_id: i64,
    pub symbol: String,
    pub created_at: DateTime<Utc>,
}

impl Entity for Favorite {
    const TABLE: &'static str = "favorites";
    const COLUMNS: &'static [&'static str] = &["id", "portfolio_id", "symbol", "created_at"];
    const NUMERIC: &'static [&'static str] = &["id", "portfolio_id"];

    fn from_row(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Favorite {
            id: r.get("id")?,
            portfolio_id: r.get("portfolio_id")?,
            symbol: r.get("symbol")?,
            created_at: read_ts(r, "created_at")?,
        })
    }
}

/// Timestamps are stored as fixed-width RFC 3339 text so string order is time order.
pub fn fmt_ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc))
}

pub(crate) fn read_ts(r: &Row<'_>, col: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = r.get(col)?;
    parse_ts(&raw).map_err(|e| ts_error(r, col, e))
}

pub(crate) fn read_opt_ts(r: &Row<'_>, col: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = r.get(col)?;
    raw.map(|s| parse_ts(&s).map_err(|e| ts_error(r, col, e)))
        .transpose()
}

fn ts_error(r: &Row<'_>, col: &str, e: chrono::ParseError) -> rusqlite::Error {
    let idx = r.as_ref().column_index(col).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}
