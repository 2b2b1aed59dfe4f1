// Upstream exchange rate providers

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::RateProviderConfig;
use crate::model::Currency;

#[derive(Error, Debug)]
pub enum RateProviderError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Provider responded with status {0}")]
    BadStatus(u16),

    #[error("Malformed rate payload: {0}")]
    Decode(String),

    #[error("No rates published for {0}")]
    NoRates(Currency),
}

/// Source of the latest conversion rates for one base currency.
#[async_trait]
pub trait RateProvider: Send + Sync + 'static {
    async fn latest_rates(
        &self,
        base: Currency,
    ) -> Result<HashMap<Currency, Decimal>, RateProviderError>;
}

// Body of `GET {base_url}/{BASE}`; codes we do not price in are skipped
#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    rates: HashMap<String, f64>,
}

pub struct HttpRateProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRateProvider {
    pub fn new(config: &RateProviderConfig) -> Result<Self, RateProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RateProviderError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn parse_rates(body: LatestRatesResponse) -> HashMap<Currency, Decimal> {
        body.rates
            .into_iter()
            .filter_map(|(code, rate)| {
                let currency = code.parse::<Currency>().ok()?;
                let rate = Decimal::from_f64(rate)?;
                Some((currency, rate))
            })
            .collect()
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn latest_rates(
        &self,
        base: Currency,
    ) -> Result<HashMap<Currency, Decimal>, RateProviderError> {
        let url = format!("{}/{}", self.base_url, base.code());
        debug!(%url, "fetching exchange rates");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RateProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RateProviderError::BadStatus(status.as_u16()));
        }

        let body: LatestRatesResponse = response
            .json()
            .await
            .map_err(|e| RateProviderError::Decode(e.to_string()))?;

        let rates = Self::parse_rates(body);
        if rates.is_empty() {
            return Err(RateProviderError::NoRates(base));
        }
        Ok(rates)
    }
}

/// Provider backed by a fixed table, for offline runs and benchmarks.
#[derive(Debug, Default)]
pub struct FixedRateProvider {
    rates: RwLock<HashMap<(Currency, Currency), Decimal>>,
    calls: AtomicUsize,
}

impl FixedRateProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(self, base: Currency, target: Currency, rate: Decimal) -> Self {
        self.set_rate(base, target, rate);
        self
    }

    pub fn set_rate(&self, base: Currency, target: Currency, rate: Decimal) {
        self.rates.write().insert((base, target), rate);
    }

    // Number of latest_rates calls served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RateProvider for FixedRateProvider {
    async fn latest_rates(
        &self,
        base: Currency,
    ) -> Result<HashMap<Currency, Decimal>, RateProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let rates: HashMap<Currency, Decimal> = self
            .rates
            .read()
            .iter()
            .filter(|((from, _), _)| *from == base)
            .map(|((_, to), rate)| (*to, *rate))
            .collect();

        if rates.is_empty() {
            return Err(RateProviderError::NoRates(base));
        }
        Ok(rates)
    }
}
