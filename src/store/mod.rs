// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! One repository per table. Generic reads go through [`crate::query`];
//! these modules add the typed writes and lookups each model needs.

pub mod accounts;
pub mod favorites;
pub mod portfolios;
pub mod positions;
pub mod sessions;
pub mod subscriptions;
pub mod transactions;
pub mod two_factor;
pub mod users;
pub mod verifications;

use once_cell::sync::Lazy;
use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::Regex;

use crate::error::{Result, StoreError};

static SYMBOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9.\-^=]{0,14}$").expect("valid symbol regex"));

/// Trims and upper-cases a ticker symbol, rejecting anything that is not ticker-shaped.
pub fn normalize_symbol(raw: &str) -> Result<String> {
    let s = raw.trim().to_uppercase();
    if SYMBOL_RE.is_match(&s) {
        Ok(s)
    } else {
        Err(StoreError::Validation(format!("Invalid symbol '{}'", raw.trim())))
    }
}

pub(crate) fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
