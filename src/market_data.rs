//! FX rate client
//!
//! Fetches latest currency rates and reports each rate's percentage move
//! since the previous fetch made by the same client.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::config::MarketDataConfig;
use crate::error::{JournalError, JournalResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    /// `<CCY>/<BASE>`
    pub symbol: String,
    pub name: String,
    pub price: f64,
    /// Percent change against the previous fetch, 0 on first sight
    pub change: f64,
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    data: BTreeMap<String, f64>,
}

pub fn currency_name(code: &str) -> &str {
    match code {
        "EUR" => "Euro",
        "GBP" => "British Pound",
        "JPY" => "Japanese Yen",
        "AUD" => "Australian Dollar",
        "CAD" => "Canadian Dollar",
        "CHF" => "Swiss Franc",
        "CNY" => "Chinese Yuan",
        "NZD" => "New Zealand Dollar",
        other => other,
    }
}

/// Turn a rate map into quotes, measuring change against `previous`
pub fn build_quotes(
    current: &BTreeMap<String, f64>,
    previous: &HashMap<String, f64>,
    base_currency: &str,
) -> Vec<RateQuote> {
    current
        .iter()
        .map(|(currency, &price)| {
            let change = match previous.get(currency) {
                Some(&last) if last != 0.0 => (price - last) / last * 100.0,
                _ => 0.0,
            };
            RateQuote {
                symbol: format!("{}/{}", currency, base_currency),
                name: currency_name(currency).to_string(),
                price,
                change,
            }
        })
        .collect()
}

#[derive(Debug)]
pub struct MarketDataClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    last_rates: Mutex<HashMap<String, f64>>,
}

impl MarketDataClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        MarketDataClient {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            last_rates: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &MarketDataConfig) -> JournalResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| JournalError::Config("market_data.api_key is not set".to_string()))?;
        Ok(Self::new(config.base_url.clone(), api_key))
    }

    pub async fn latest_rates(&self, base_currency: &str) -> JournalResult<Vec<RateQuote>> {
        let url = format!("{}/latest", self.base_url);
        debug!("Fetching rates from {} (base {})", url, base_currency);

        let response = self
            .client
            .get(&url)
            .query(&[("apikey", self.api_key.as_str()), ("base_currency", base_currency)])
            .send()
            .await?
            .error_for_status()?;

        let body: LatestResponse = response.json().await?;

        let mut last = self
            .last_rates
            .lock()
            .map_err(|_| JournalError::MarketData("rate cache lock poisoned".to_string()))?;
        let quotes = build_quotes(&body.data, &last, base_currency);
        *last = body.data.into_iter().collect();

        info!("Fetched {} rates against {}", quotes.len(), base_currency);
        Ok(quotes)
    }
}
