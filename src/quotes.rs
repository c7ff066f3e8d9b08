// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Live prices from the Yahoo quote endpoint.

use std::collections::HashMap;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Deserialize;

use crate::utils::http_client;

const QUOTE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";

#[derive(Debug, Deserialize)]
struct YahooResponse {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    result: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    symbol: Option<String>,
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
}

/// Extracts `symbol -> price` from a quote response body. Entries without a
/// symbol or a positive price are skipped.
pub fn parse_quotes(body: &str) -> Result<HashMap<String, f64>> {
    let yr: YahooResponse =
        serde_json::from_str(body).context("Unexpected Yahoo quote response")?;
    let mut out = HashMap::with_capacity(yr.quote_response.result.len());
    for q in yr.quote_response.result {
        match (q.symbol, q.regular_market_price) {
            (Some(sym), Some(px)) if px.is_finite() && px > 0.0 => {
                out.insert(sym.to_uppercase(), px);
            }
            (sym, _) => debug!("no usable price for {:?}", sym),
        }
    }
    Ok(out)
}

/// Fetches regular market prices. Symbols Yahoo does not know are absent from
/// the result.
pub fn fetch(symbols: &[String]) -> Result<HashMap<String, f64>> {
    if symbols.is_empty() {
        return Ok(HashMap::new());
    }
    let client = http_client()?;
    let resp = client
        .get(QUOTE_URL)
        .query(&[("symbols", symbols.join(","))])
        .send()
        .context("Quote request failed")?
        .error_for_status()?;
    let body = resp.text()?;
    let prices = parse_quotes(&body)?;
    if prices.len() < symbols.len() {
        warn!(
            "received {} of {} requested prices",
            prices.len(),
            symbols.len()
        );
    }
    Ok(prices)
}
