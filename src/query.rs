// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Typed query surface shared by every table.
//!
//! Each model implements [`Entity`]; the free functions in this module then
//! provide the per-model find/count/update/delete/aggregate/group-by
//! operations. Column names are checked against [`Entity::COLUMNS`] before
//! they reach SQL and every value is a bound parameter.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::types::{ToSql, ToSqlOutput, Value};
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::models::{Role, SubscriptionStatus, TransactionType, fmt_ts};

pub trait Entity: Sized {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];
    /// Columns accepted by `avg` and `sum`.
    const NUMERIC: &'static [&'static str];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// A bound SQL value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Param {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl ToSql for Param {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Param::Null => ToSqlOutput::Owned(Value::Null),
            Param::Int(i) => ToSqlOutput::from(*i),
            Param::Real(f) => ToSqlOutput::from(*f),
            Param::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl From<Value> for Param {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Param::Null,
            Value::Integer(i) => Param::Int(i),
            Value::Real(f) => Param::Real(f),
            Value::Text(s) => Param::Text(s),
            Value::Blob(b) => Param::Text(String::from_utf8_lossy(&b).into_owned()),
        }
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Int(v)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Real(v)
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Param::Int(v as i64)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl From<DateTime<Utc>> for Param {
    fn from(v: DateTime<Utc>) -> Self {
        Param::Text(fmt_ts(&v))
    }
}

impl From<Role> for Param {
    fn from(v: Role) -> Self {
        Param::Text(v.as_str().to_string())
    }
}

impl From<TransactionType> for Param {
    fn from(v: TransactionType) -> Self {
        Param::Text(v.as_str().to_string())
    }
}

impl From<SubscriptionStatus> for Param {
    fn from(v: SubscriptionStatus) -> Self {
        Param::Text(v.as_str().to_string())
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or(Param::Null, Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Op {
    fn sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "<>",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Gt => ">",
            Op::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pattern {
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, PartialEq)]
enum Cond {
    Cmp(String, Op, Param),
    In(String, Vec<Param>),
    NotIn(String, Vec<Param>),
    Like(String, Pattern, String),
    IsNull(String),
    NotNull(String),
    And(Vec<Cond>),
    Or(Vec<Cond>),
    Not(Box<Cond>),
}

impl Cond {
    fn render(
        &self,
        table: &'static str,
        columns: &[&str],
        sql: &mut String,
        params: &mut Vec<Param>,
    ) -> Result<()> {
        match self {
            Cond::Cmp(col, op, value) => {
                let col = checked(table, columns, col)?;
                if *value == Param::Null {
                    // `= NULL` never matches in SQL
                    match op {
                        Op::Eq => sql.push_str(&format!("{col} IS NULL")),
                        Op::Ne => sql.push_str(&format!("{col} IS NOT NULL")),
                        _ => sql.push_str("0"),
                    }
                } else {
                    sql.push_str(&format!("{col} {} ?", op.sql()));
                    params.push(value.clone());
                }
            }
            Cond::In(col, values) | Cond::NotIn(col, values) => {
                let col = checked(table, columns, col)?;
                let negate = matches!(self, Cond::NotIn(..));
                if values.is_empty() {
                    sql.push_str(if negate { "1" } else { "0" });
                } else {
                    let marks = vec!["?"; values.len()].join(", ");
                    let kw = if negate { "NOT IN" } else { "IN" };
                    sql.push_str(&format!("{col} {kw} ({marks})"));
                    params.extend(values.iter().cloned());
                }
            }
            Cond::Like(col, pattern, needle) => {
                let col = checked(table, columns, col)?;
                let escaped = escape_like(needle);
                let value = match pattern {
                    Pattern::Contains => format!("%{escaped}%"),
                    Pattern::StartsWith => format!("{escaped}%"),
                    Pattern::EndsWith => format!("%{escaped}"),
                };
                sql.push_str(&format!("{col} LIKE ? ESCAPE '\\'"));
                params.push(Param::Text(value));
            }
            Cond::IsNull(col) => {
                let col = checked(table, columns, col)?;
                sql.push_str(&format!("{col} IS NULL"));
            }
            Cond::NotNull(col) => {
                let col = checked(table, columns, col)?;
                sql.push_str(&format!("{col} IS NOT NULL"));
            }
            Cond::And(items) | Cond::Or(items) => {
                let (joiner, empty) = if matches!(self, Cond::And(_)) {
                    (" AND ", "1")
                } else {
                    (" OR ", "0")
                };
                if items.is_empty() {
                    sql.push_str(empty);
                    return Ok(());
                }
                sql.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(joiner);
                    }
                    item.render(table, columns, sql, params)?;
                }
                sql.push(')');
            }
            Cond::Not(inner) => {
                sql.push_str("NOT (");
                inner.render(table, columns, sql, params)?;
                sql.push(')');
            }
        }
        Ok(())
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn checked<'a>(table: &'static str, columns: &[&str], col: &'a str) -> Result<&'a str> {
    if columns.contains(&col) {
        Ok(col)
    } else {
        Err(StoreError::UnknownColumn {
            table,
            column: col.to_string(),
        })
    }
}

/// Conjunction of conditions. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conds: Vec<Cond>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(id: i64) -> Self {
        Self::new().eq("id", id)
    }

    pub fn is_empty(&self) -> bool {
        self.conds.is_empty()
    }

    fn cmp(mut self, col: &str, op: Op, value: impl Into<Param>) -> Self {
        self.conds.push(Cond::Cmp(col.to_string(), op, value.into()));
        self
    }

    pub fn eq(self, col: &str, value: impl Into<Param>) -> Self {
        self.cmp(col, Op::Eq, value)
    }

    pub fn ne(self, col: &str, value: impl Into<Param>) -> Self {
        self.cmp(col, Op::Ne, value)
    }

    pub fn lt(self, col: &str, value: impl Into<Param>) -> Self {
        self.cmp(col, Op::Lt, value)
    }

    pub fn lte(self, col: &str, value: impl Into<Param>) -> Self {
        self.cmp(col, Op::Lte, value)
    }

    pub fn gt(self, col: &str, value: impl Into<Param>) -> Self {
        self.cmp(col, Op::Gt, value)
    }

    pub fn gte(self, col: &str, value: impl Into<Param>) -> Self {
        self.cmp(col, Op::Gte, value)
    }

    pub fn is_in<V: Into<Param>>(mut self, col: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conds.push(Cond::In(col.to_string(), values));
        self
    }

    pub fn not_in<V: Into<Param>>(mut self, col: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conds.push(Cond::NotIn(col.to_string(), values));
        self
    }

    pub fn contains(mut self, col: &str, needle: &str) -> Self {
        self.conds
            .push(Cond::Like(col.to_string(), Pattern::Contains, needle.to_string()));
        self
    }

    pub fn starts_with(mut self, col: &str, needle: &str) -> Self {
        self.conds
            .push(Cond::Like(col.to_string(), Pattern::StartsWith, needle.to_string()));
        self
    }

    pub fn ends_with(mut self, col: &str, needle: &str) -> Self {
        self.conds
            .push(Cond::Like(col.to_string(), Pattern::EndsWith, needle.to_string()));
        self
    }

    pub fn is_null(mut self, col: &str) -> Self {
        self.conds.push(Cond::IsNull(col.to_string()));
        self
    }

    pub fn not_null(mut self, col: &str) -> Self {
        self.conds.push(Cond::NotNull(col.to_string()));
        self
    }

    /// Adds `(a OR b OR ...)` over the conditions of each alternative.
    pub fn any(mut self, alternatives: Vec<Filter>) -> Self {
        let alts = alternatives
            .into_iter()
            .map(|f| Cond::And(f.conds))
            .collect();
        self.conds.push(Cond::Or(alts));
        self
    }

    pub fn not(mut self, inner: Filter) -> Self {
        self.conds.push(Cond::Not(Box::new(Cond::And(inner.conds))));
        self
    }

    pub fn and(mut self, other: Filter) -> Self {
        self.conds.extend(other.conds);
        self
    }

    /// Renders the `WHERE` clause (with a leading space) or nothing for an empty filter.
    pub fn to_sql<E: Entity>(&self) -> Result<(String, Vec<Param>)> {
        let mut sql = String::new();
        let mut params = Vec::new();
        if self.conds.is_empty() {
            return Ok((sql, params));
        }
        sql.push_str(" WHERE ");
        for (i, cond) in self.conds.iter().enumerate() {
            if i > 0 {
                sql.push_str(" AND ");
            }
            cond.render(E::TABLE, E::COLUMNS, &mut sql, &mut params)?;
        }
        Ok((sql, params))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dir {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct FindMany {
    pub filter: Filter,
    pub order: Vec<(String, Dir)>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl FindMany {
    pub fn new(filter: Filter) -> Self {
        FindMany {
            filter,
            ..Default::default()
        }
    }

    pub fn order_by(mut self, col: &str, dir: Dir) -> Self {
        self.order.push((col.to_string(), dir));
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn take(mut self, n: u64) -> Self {
        self.take = Some(n);
        self
    }

    fn to_sql<E: Entity>(&self) -> Result<(String, Vec<Param>)> {
        let (where_sql, mut params) = self.filter.to_sql::<E>()?;
        let mut sql = format!("SELECT {} FROM {}{}", E::COLUMNS.join(", "), E::TABLE, where_sql);
        if !self.order.is_empty() {
            let parts = self
                .order
                .iter()
                .map(|(col, dir)| {
                    let col = checked(E::TABLE, E::COLUMNS, col)?;
                    Ok(match dir {
                        Dir::Asc => format!("{col} ASC"),
                        Dir::Desc => format!("{col} DESC"),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }
        if self.take.is_some() || self.skip.is_some() {
            // SQLite needs a LIMIT before OFFSET; -1 means unbounded
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(Param::Int(
                self.take.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX)),
            ));
            params.push(Param::Int(
                self.skip.map_or(0, |n| i64::try_from(n).unwrap_or(i64::MAX)),
            ));
        }
        Ok((sql, params))
    }
}

pub fn find_unique<E: Entity>(conn: &Connection, id: i64) -> Result<Option<E>> {
    find_first(conn, &FindMany::new(Filter::id(id)))
}

/// Like [`find_unique`] but a missing row is an error.
pub fn get<E: Entity>(conn: &Connection, id: i64) -> Result<E> {
    find_unique(conn, id)?.ok_or_else(|| StoreError::not_found(E::TABLE, id))
}

pub fn find_first<E: Entity>(conn: &Connection, q: &FindMany) -> Result<Option<E>> {
    let mut q = q.clone();
    q.take = Some(1);
    let (sql, params) = q.to_sql::<E>()?;
    let mut stmt = conn.prepare_cached(&sql)?;
    let row = stmt
        .query_row(params_from_iter(params.iter()), E::from_row)
        .optional()?;
    Ok(row)
}

pub fn find_many<E: Entity>(conn: &Connection, q: &FindMany) -> Result<Vec<E>> {
    let (sql, params) = q.to_sql::<E>()?;
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), E::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn count<E: Entity>(conn: &Connection, filter: &Filter) -> Result<i64> {
    let (where_sql, params) = filter.to_sql::<E>()?;
    let sql = format!("SELECT COUNT(*) FROM {}{}", E::TABLE, where_sql);
    let n = conn.query_row(&sql, params_from_iter(params.iter()), |r| r.get(0))?;
    Ok(n)
}

pub fn exists<E: Entity>(conn: &Connection, filter: &Filter) -> Result<bool> {
    let (where_sql, params) = filter.to_sql::<E>()?;
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {}{})", E::TABLE, where_sql);
    let found = conn.query_row(&sql, params_from_iter(params.iter()), |r| r.get(0))?;
    Ok(found)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Set(Param),
    Increment(f64),
    Decrement(f64),
    Multiply(f64),
    Divide(f64),
}

pub fn update_many<E: Entity>(
    conn: &Connection,
    filter: &Filter,
    changes: &[(&str, Update)],
) -> Result<usize> {
    if changes.is_empty() {
        return Ok(0);
    }
    let mut sets = Vec::with_capacity(changes.len());
    let mut params = Vec::with_capacity(changes.len());
    for (col, change) in changes {
        let col = checked(E::TABLE, E::COLUMNS, col)?;
        if col == "id" {
            return Err(StoreError::Validation("id cannot be updated".into()));
        }
        let (expr, value) = match change {
            Update::Set(v) => (format!("{col} = ?"), v.clone()),
            Update::Increment(n) => (format!("{col} = {col} + ?"), Param::Real(*n)),
            Update::Decrement(n) => (format!("{col} = {col} - ?"), Param::Real(*n)),
            Update::Multiply(n) => (format!("{col} = {col} * ?"), Param::Real(*n)),
            Update::Divide(n) => (format!("{col} = {col} / ?"), Param::Real(*n)),
        };
        sets.push(expr);
        params.push(value);
    }
    let (where_sql, where_params) = filter.to_sql::<E>()?;
    params.extend(where_params);
    let sql = format!("UPDATE {} SET {}{}", E::TABLE, sets.join(", "), where_sql);
    let n = conn.execute(&sql, params_from_iter(params.iter()))?;
    debug!("updated {} row(s) in {}", n, E::TABLE);
    Ok(n)
}

pub fn delete_many<E: Entity>(conn: &Connection, filter: &Filter) -> Result<usize> {
    let (where_sql, params) = filter.to_sql::<E>()?;
    let sql = format!("DELETE FROM {}{}", E::TABLE, where_sql);
    let n = conn.execute(&sql, params_from_iter(params.iter()))?;
    debug!("deleted {} row(s) from {}", n, E::TABLE);
    Ok(n)
}

pub fn delete<E: Entity>(conn: &Connection, id: i64) -> Result<bool> {
    Ok(delete_many::<E>(conn, &Filter::id(id))? > 0)
}

/// Which aggregates to compute. `COUNT(*)` is always included.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    pub avg: Vec<String>,
    pub sum: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
}

impl Aggregates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn avg(mut self, col: &str) -> Self {
        self.avg.push(col.to_string());
        self
    }

    pub fn sum(mut self, col: &str) -> Self {
        self.sum.push(col.to_string());
        self
    }

    pub fn min(mut self, col: &str) -> Self {
        self.min.push(col.to_string());
        self
    }

    pub fn max(mut self, col: &str) -> Self {
        self.max.push(col.to_string());
        self
    }

    /// SELECT expressions in the order `count, avg.., sum.., min.., max..`.
    fn exprs<E: Entity>(&self) -> Result<Vec<String>> {
        let mut out = vec!["COUNT(*)".to_string()];
        for (func, cols, numeric_only) in [
            ("AVG", &self.avg, true),
            ("SUM", &self.sum, true),
            ("MIN", &self.min, false),
            ("MAX", &self.max, false),
        ] {
            for col in cols {
                let allowed = if numeric_only { E::NUMERIC } else { E::COLUMNS };
                let col = checked(E::TABLE, allowed, col)?;
                out.push(format!("{func}({col})"));
            }
        }
        Ok(out)
    }

    fn read(&self, row: &Row<'_>, offset: usize) -> rusqlite::Result<AggregateResult> {
        let mut idx = offset;
        let count = row.get(idx)?;
        idx += 1;
        let mut res = AggregateResult {
            count,
            ..Default::default()
        };
        for col in &self.avg {
            res.avg.insert(col.clone(), row.get(idx)?);
            idx += 1;
        }
        for col in &self.sum {
            res.sum.insert(col.clone(), row.get(idx)?);
            idx += 1;
        }
        for col in &self.min {
            res.min.insert(col.clone(), row.get::<_, Value>(idx)?.into());
            idx += 1;
        }
        for col in &self.max {
            res.max.insert(col.clone(), row.get::<_, Value>(idx)?.into());
            idx += 1;
        }
        Ok(res)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateResult {
    pub count: i64,
    pub avg: BTreeMap<String, Option<f64>>,
    pub sum: BTreeMap<String, Option<f64>>,
    pub min: BTreeMap<String, Param>,
    pub max: BTreeMap<String, Param>,
}

pub fn aggregate<E: Entity>(
    conn: &Connection,
    filter: &Filter,
    aggs: &Aggregates,
) -> Result<AggregateResult> {
    let exprs = aggs.exprs::<E>()?;
    let (where_sql, params) = filter.to_sql::<E>()?;
    let sql = format!("SELECT {} FROM {}{}", exprs.join(", "), E::TABLE, where_sql);
    let res = conn.query_row(&sql, params_from_iter(params.iter()), |r| aggs.read(r, 0))?;
    Ok(res)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRow {
    pub keys: BTreeMap<String, Param>,
    #[serde(flatten)]
    pub aggregates: AggregateResult,
}

pub fn group_by<E: Entity>(
    conn: &Connection,
    by: &[&str],
    filter: &Filter,
    aggs: &Aggregates,
) -> Result<Vec<GroupRow>> {
    if by.is_empty() {
        return Err(StoreError::Validation(
            "group_by needs at least one column".into(),
        ));
    }
    let keys = by
        .iter()
        .map(|c| checked(E::TABLE, E::COLUMNS, c))
        .collect::<Result<Vec<_>>>()?;
    let mut select = keys.iter().map(|k| k.to_string()).collect::<Vec<_>>();
    select.extend(aggs.exprs::<E>()?);
    let (where_sql, params) = filter.to_sql::<E>()?;
    let key_list = keys.join(", ");
    let sql = format!(
        "SELECT {} FROM {}{} GROUP BY {} ORDER BY {}",
        select.join(", "),
        E::TABLE,
        where_sql,
        key_list,
        key_list
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), |r| {
        let mut map = BTreeMap::new();
        for (i, k) in keys.iter().enumerate() {
            map.insert(k.to_string(), Param::from(r.get::<_, Value>(i)?));
        }
        Ok(GroupRow {
            keys: map,
            aggregates: aggs.read(r, keys.len())?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Favorite, Transaction};

    fn setup() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        db::init_schema(&mut conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO users(id, name, email, created_at, updated_at)
                VALUES (1, 'Ada', 'ada@example.com', '2025-01-01T00:00:00.000Z', '2025-01-01T00:00:00.000Z');
            INSERT INTO portfolios(id, user_id, name, created_at, updated_at)
                VALUES (1, 1, 'Main', '2025-01-01T00:00:00.000Z', '2025-01-01T00:00:00.000Z');
            INSERT INTO transactions(portfolio_id, symbol, type, quantity, price, amount, fee, date, created_at) VALUES
                (1, 'AAPL', 'BUY', 10, 100, 1000, 1, '2025-01-02T00:00:00.000Z', '2025-01-02T00:00:00.000Z'),
                (1, 'AAPL', 'SELL', 4, 120, 480, 1, '2025-02-02T00:00:00.000Z', '2025-02-02T00:00:00.000Z'),
                (1, 'MSFT', 'BUY', 5, 300, 1500, 0, '2025-01-15T00:00:00.000Z', '2025-01-15T00:00:00.000Z'),
                (1, 'NVDA', 'BUY', 2, 50, 100, 0.5, '2025-03-01T00:00:00.000Z', '2025-03-01T00:00:00.000Z');
            "#,
        )
        .unwrap();
        conn
    }

    #[test]
    fn filter_renders_nested_conditions() {
        let f = Filter::new()
            .eq("symbol", "AAPL")
            .any(vec![
                Filter::new().gt("quantity", 5.0),
                Filter::new().is_null("fee"),
            ])
            .not(Filter::new().eq("type", TransactionType::Sell));
        let (sql, params) = f.to_sql::<Transaction>().unwrap();
        assert_eq!(
            sql,
            " WHERE symbol = ? AND ((quantity > ?) OR (fee IS NULL)) AND NOT ((type = ?))"
        );
        assert_eq!(
            params,
            vec![
                Param::Text("AAPL".into()),
                Param::Real(5.0),
                Param::Text("SELL".into())
            ]
        );
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let conn = setup();
        let err = find_many::<Transaction>(
            &conn,
            &FindMany::new(Filter::new().eq("symbol; DROP TABLE users", "x")),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));

        let err = aggregate::<Transaction>(&conn, &Filter::new(), &Aggregates::new().sum("symbol"))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }

    #[test]
    fn find_many_orders_and_pages() {
        let conn = setup();
        let q = FindMany::new(Filter::new().eq("type", TransactionType::Buy))
            .order_by("date", Dir::Desc)
            .skip(1)
            .take(1);
        let rows: Vec<Transaction> = find_many(&conn, &q).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symbol, "MSFT");

        let skipped: Vec<Transaction> =
            find_many(&conn, &FindMany::new(Filter::new()).order_by("id", Dir::Asc).skip(3))
                .unwrap();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].symbol, "NVDA");

        // huge limits clamp instead of wrapping negative
        let all: Vec<Transaction> =
            find_many(&conn, &FindMany::new(Filter::new()).take(u64::MAX)).unwrap();
        assert_eq!(all.len(), 4);
        let none: Vec<Transaction> =
            find_many(&conn, &FindMany::new(Filter::new()).skip(u64::MAX)).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn like_patterns_escape_wildcards() {
        let conn = setup();
        conn.execute(
            "INSERT INTO favorites(portfolio_id, symbol, created_at) VALUES (1, 'BRK_B', '2025-01-01T00:00:00.000Z'), (1, 'BRKXB', '2025-01-01T00:00:00.000Z')",
            [],
        )
        .unwrap();
        let hits: Vec<Favorite> =
            find_many(&conn, &FindMany::new(Filter::new().contains("symbol", "K_B"))).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol, "BRK_B");
        assert_eq!(
            count::<Favorite>(&conn, &Filter::new().starts_with("symbol", "BRK")).unwrap(),
            2
        );
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let conn = setup();
        let none = count::<Transaction>(&conn, &Filter::new().is_in::<&str>("symbol", [])).unwrap();
        assert_eq!(none, 0);
        let all = count::<Transaction>(&conn, &Filter::new().not_in::<&str>("symbol", [])).unwrap();
        assert_eq!(all, 4);
    }

    #[test]
    fn aggregate_computes_numeric_summaries() {
        let conn = setup();
        let res = aggregate::<Transaction>(
            &conn,
            &Filter::new().eq("type", TransactionType::Buy),
            &Aggregates::new()
                .sum("amount")
                .avg("price")
                .min("date")
                .max("quantity"),
        )
        .unwrap();
        assert_eq!(res.count, 3);
        assert_eq!(res.sum["amount"], Some(2600.0));
        assert_eq!(res.avg["price"], Some(150.0));
        assert_eq!(res.min["date"], Param::Text("2025-01-02T00:00:00.000Z".into()));
        assert_eq!(res.max["quantity"], Param::Real(10.0));
    }

    #[test]
    fn aggregate_over_no_rows_yields_nulls() {
        let conn = setup();
        let res = aggregate::<Transaction>(
            &conn,
            &Filter::new().eq("symbol", "TSLA"),
            &Aggregates::new().sum("amount").min("price"),
        )
        .unwrap();
        assert_eq!(res.count, 0);
        assert_eq!(res.sum["amount"], None);
        assert_eq!(res.min["price"], Param::Null);
    }

    #[test]
    fn group_by_returns_one_row_per_key() {
        let conn = setup();
        let rows = group_by::<Transaction>(
            &conn,
            &["symbol", "type"],
            &Filter::new(),
            &Aggregates::new().sum("quantity"),
        )
        .unwrap();
        let keys: Vec<(String, String)> = rows
            .iter()
            .map(|r| match (&r.keys["symbol"], &r.keys["type"]) {
                (Param::Text(s), Param::Text(t)) => (s.clone(), t.clone()),
                other => panic!("unexpected keys {:?}", other),
            })
            .collect();
        assert_eq!(
            keys,
            vec![
                ("AAPL".to_string(), "BUY".to_string()),
                ("AAPL".to_string(), "SELL".to_string()),
                ("MSFT".to_string(), "BUY".to_string()),
                ("NVDA".to_string(), "BUY".to_string()),
            ]
        );
        assert_eq!(rows[1].aggregates.sum["quantity"], Some(4.0));
    }

    #[test]
    fn update_many_applies_arithmetic_updates() {
        let conn = setup();
        let n = update_many::<Transaction>(
            &conn,
            &Filter::new().eq("symbol", "AAPL"),
            &[("fee", Update::Increment(0.5)), ("price", Update::Multiply(2.0))],
        )
        .unwrap();
        assert_eq!(n, 2);
        let res = aggregate::<Transaction>(
            &conn,
            &Filter::new().eq("symbol", "AAPL"),
            &Aggregates::new().sum("fee").sum("price"),
        )
        .unwrap();
        assert_eq!(res.sum["fee"], Some(3.0));
        assert_eq!(res.sum["price"], Some(440.0));

        let err = update_many::<Transaction>(&conn, &Filter::new(), &[("id", Update::Set(Param::Int(9)))])
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn null_equality_renders_is_null() {
        let (sql, params) = Filter::new()
            .eq("ban_reason", Option::<String>::None)
            .to_sql::<crate::models::User>()
            .unwrap();
        assert_eq!(sql, " WHERE ban_reason IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn delete_many_and_exists() {
        let conn = setup();
        assert!(exists::<Transaction>(&conn, &Filter::new().eq("symbol", "NVDA")).unwrap());
        assert_eq!(
            delete_many::<Transaction>(&conn, &Filter::new().eq("symbol", "NVDA")).unwrap(),
            1
        );
        assert!(!exists::<Transaction>(&conn, &Filter::new().eq("symbol", "NVDA")).unwrap());
        assert!(find_unique::<Transaction>(&conn, 999).unwrap().is_none());
        assert!(matches!(
            get::<Transaction>(&conn, 999).unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }
}
