//! Ticker lookups against Yahoo Finance search.
//!
//! The resolvers only depend on [`QuoteSearch`]; [`YahooClient`] is the HTTP
//! implementation used by the binary.

use super::{TickerResolution, TickerResolver};
use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

const SEARCH_URL: &str = "https://query2.finance.yahoo.com/v1/finance/search";
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Exchanges preferred for name matches (Nasdaq GS, NYSE, Nasdaq GM).
const PREFERRED_EXCHANGES: &[&str] = &["NMS", "NYQ", "NGM"];

/// Names the search engine handles badly on their own.
const NAME_REWRITES: &[(&str, &str)] = &[("alphabet", "Alphabet Inc")];

/// Companies whose share classes trade under unrelated symbols.
const SHARE_CLASS_SYMBOLS: &[(&str, &str, &str)] =
    &[("alphabet", "C", "GOOG"), ("alphabet", "A", "GOOGL")];

static CLASS_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+Class\s+([A-Z])$").unwrap());
static LETTER_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([A-Z])$").unwrap());

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("request failed")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("search backend failed: {0}")]
    Backend(String),
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuoteCandidate {
    #[serde(default)]
    pub symbol: String,
    pub quote_type: Option<String>,
    pub exchange: Option<String>,
    #[serde(alias = "longName")]
    pub longname: Option<String>,
    #[serde(alias = "shortName")]
    pub shortname: Option<String>,
    pub currency: Option<String>,
}

impl QuoteCandidate {
    /// Equities and ETFs, as opposed to options, futures, indices and the like.
    pub fn is_security(&self) -> bool {
        matches!(self.quote_type.as_deref(), Some("EQUITY") | Some("ETF"))
    }

    fn on_preferred_exchange(&self) -> bool {
        self.exchange
            .as_deref()
            .map_or(false, |exchange| PREFERRED_EXCHANGES.contains(&exchange))
    }

    fn display_name(&self) -> &str {
        self.longname
            .as_deref()
            .or(self.shortname.as_deref())
            .unwrap_or_default()
    }
}

/// Free-text security search plus a follow-up currency lookup.
#[async_trait]
pub trait QuoteSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<QuoteCandidate>, SearchError>;

    async fn quote_currency(&self, symbol: &str) -> Result<Option<String>, SearchError>;
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    quotes: Vec<QuoteCandidate>,
}

pub struct YahooClient {
    client: reqwest::Client,
    search_url: String,
    chart_url: String,
}

impl YahooClient {
    pub fn new() -> Result<Self, SearchError> {
        Self::with_base_urls(SEARCH_URL, CHART_URL)
    }

    pub fn with_base_urls(
        search_url: impl Into<String>,
        chart_url: impl Into<String>,
    ) -> Result<Self, SearchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"),
        );
        Ok(Self {
            client: reqwest::Client::builder().default_headers(headers).build()?,
            search_url: search_url.into(),
            chart_url: chart_url.into(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, SearchError> {
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                status,
                url: url.to_owned(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl QuoteSearch for YahooClient {
    async fn search(&self, query: &str) -> Result<Vec<QuoteCandidate>, SearchError> {
        let url = format!(
            "{}?q={}&quotesCount=10&newsCount=0",
            self.search_url,
            urlencoding::encode(query)
        );
        let response: SearchResponse = self.get_json(&url).await?;
        Ok(response
            .quotes
            .into_iter()
            .filter(|quote| !quote.symbol.is_empty())
            .collect())
    }

    async fn quote_currency(&self, symbol: &str) -> Result<Option<String>, SearchError> {
        let url = format!(
            "{}/{}?interval=1d&range=1d",
            self.chart_url,
            urlencoding::encode(symbol)
        );
        let data: serde_json::Value = self.get_json(&url).await?;
        Ok(data
            .get("chart")
            .and_then(|chart| chart.get("result"))
            .and_then(|result| result.get(0))
            .and_then(|result| result.get("meta"))
            .and_then(|meta| meta.get("currency"))
            .and_then(|currency| currency.as_str())
            .map(str::to_owned))
    }
}

async fn currency_or_lookup(
    search: &dyn QuoteSearch,
    candidate: &QuoteCandidate,
) -> Option<String> {
    if let Some(currency) = &candidate.currency {
        return Some(currency.clone());
    }
    match search.quote_currency(&candidate.symbol).await {
        Ok(currency) => currency,
        Err(error) => {
            log::debug!("Currency lookup failed for {}: {}", candidate.symbol, error);
            None
        }
    }
}

/// Looks the ISIN up directly. Does not fall back to the name.
pub struct YahooIsinResolver {
    search: Arc<dyn QuoteSearch>,
}

impl YahooIsinResolver {
    pub fn new(search: Arc<dyn QuoteSearch>) -> Self {
        Self { search }
    }

    async fn lookup(&self, isin: &str) -> Result<TickerResolution, SearchError> {
        let quotes = self.search.search(isin).await?;
        let chosen = match quotes.iter().find(|quote| quote.is_security()).or_else(|| quotes.first()) {
            Some(chosen) => chosen,
            None => return Ok(TickerResolution::none()),
        };
        let currency = currency_or_lookup(self.search.as_ref(), chosen).await;
        Ok(TickerResolution::found(chosen.symbol.clone(), currency))
    }
}

#[async_trait]
impl TickerResolver for YahooIsinResolver {
    fn name(&self) -> &str {
        "Yahoo ISIN"
    }

    async fn resolve(&self, isin: &str, name: &str) -> Result<TickerResolution> {
        if isin.is_empty() {
            return Ok(TickerResolution::none());
        }
        Ok(self.lookup(isin).await.unwrap_or_else(|error| {
            log::warn!("Yahoo ISIN failed for {}: {}", name, error);
            TickerResolution::none()
        }))
    }
}

/// Searches by security name, with share-class aware ranking.
pub struct YahooNameResolver {
    search: Arc<dyn QuoteSearch>,
}

/// A security name with any trailing share-class marker split off.
#[derive(Debug, PartialEq)]
struct NameQuery {
    name: String,
    share_class: Option<String>,
}

impl NameQuery {
    fn new(raw: &str) -> Self {
        let raw = raw.trim();
        let suffix = CLASS_SUFFIX
            .captures(raw)
            .or_else(|| LETTER_SUFFIX.captures(raw));
        let (name, share_class) = match suffix {
            Some(captures) => {
                let start = captures.get(0).map_or(raw.len(), |m| m.start());
                (
                    raw[..start].trim().to_owned(),
                    captures.get(1).map(|class| class.as_str().to_uppercase()),
                )
            }
            None => (raw.to_owned(), None),
        };
        let name = NAME_REWRITES
            .iter()
            .find(|(from, _)| name.eq_ignore_ascii_case(from))
            .map_or(name, |(_, to)| (*to).to_owned());
        Self { name, share_class }
    }

    fn share_class_symbol(&self) -> Option<&'static str> {
        let lower = self.name.to_lowercase();
        let class = self.share_class.as_deref()?;
        SHARE_CLASS_SYMBOLS
            .iter()
            .find(|(company, share_class, _)| lower.contains(company) && *share_class == class)
            .map(|(_, _, symbol)| *symbol)
    }

    /// Picks the best candidate and the currency to default to when the
    /// candidate has none.
    fn pick<'q>(&self, quotes: &'q [QuoteCandidate]) -> Option<(&'q QuoteCandidate, Option<&'static str>)> {
        let preferred: Vec<&QuoteCandidate> = quotes
            .iter()
            .filter(|quote| quote.on_preferred_exchange() && quote.is_security())
            .collect();

        if let Some(symbol) = self.share_class_symbol() {
            if let Some(found) = preferred.iter().find(|quote| quote.symbol == symbol) {
                return Some((*found, Some("USD")));
            }
        }

        let lower = self.name.to_lowercase();
        let by_name = preferred
            .iter()
            .filter(|quote| quote.display_name().to_lowercase().starts_with(&lower))
            .min_by_key(|quote| quote.display_name().len());

        by_name
            .or_else(|| preferred.first())
            .copied()
            .or_else(|| quotes.iter().find(|quote| quote.is_security()))
            .or_else(|| quotes.first())
            .map(|quote| (quote, None))
    }
}

impl YahooNameResolver {
    pub fn new(search: Arc<dyn QuoteSearch>) -> Self {
        Self { search }
    }

    async fn lookup(&self, name: &str) -> Result<TickerResolution, SearchError> {
        let query = NameQuery::new(name);
        let quotes = self.search.search(&query.name).await?;
        let (chosen, default_currency) = match query.pick(&quotes) {
            Some(pick) => pick,
            None => return Ok(TickerResolution::none()),
        };
        let currency = match (&chosen.currency, default_currency) {
            (None, Some(default)) => Some(default.to_owned()),
            _ => currency_or_lookup(self.search.as_ref(), chosen).await,
        };
        Ok(TickerResolution::found(chosen.symbol.clone(), currency))
    }
}

#[async_trait]
impl TickerResolver for YahooNameResolver {
    fn name(&self) -> &str {
        "Yahoo Name"
    }

    async fn resolve(&self, _isin: &str, name: &str) -> Result<TickerResolution> {
        if name.trim().is_empty() {
            return Ok(TickerResolution::none());
        }
        Ok(self.lookup(name).await.unwrap_or_else(|error| {
            log::warn!("Yahoo Name failed for {}: {}", name, error);
            TickerResolution::none()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct ScriptedSearch {
        results: HashMap<String, Vec<QuoteCandidate>>,
        currencies: HashMap<String, String>,
        failing: bool,
        queries: Mutex<Vec<String>>,
        currency_lookups: Mutex<Vec<String>>,
    }

    impl ScriptedSearch {
        fn with(mut self, query: &str, quotes: Vec<QuoteCandidate>) -> Self {
            self.results.insert(query.to_owned(), quotes);
            self
        }

        fn with_currency(mut self, symbol: &str, currency: &str) -> Self {
            self.currencies.insert(symbol.to_owned(), currency.to_owned());
            self
        }
    }

    #[async_trait]
    impl QuoteSearch for ScriptedSearch {
        async fn search(&self, query: &str) -> Result<Vec<QuoteCandidate>, SearchError> {
            self.queries.lock().push(query.to_owned());
            if self.failing {
                return Err(SearchError::Backend("scripted outage".into()));
            }
            Ok(self.results.get(query).cloned().unwrap_or_default())
        }

        async fn quote_currency(&self, symbol: &str) -> Result<Option<String>, SearchError> {
            self.currency_lookups.lock().push(symbol.to_owned());
            Ok(self.currencies.get(symbol).cloned())
        }
    }

    fn quote(symbol: &str, quote_type: &str, exchange: &str, name: &str) -> QuoteCandidate {
        QuoteCandidate {
            symbol: symbol.to_owned(),
            quote_type: Some(quote_type.to_owned()),
            exchange: Some(exchange.to_owned()),
            longname: Some(name.to_owned()),
            shortname: None,
            currency: None,
        }
    }

    #[test]
    fn splits_share_class() {
        assert_eq!(
            NameQuery {
                name: "Meta Platforms".into(),
                share_class: Some("A".into())
            },
            NameQuery::new("Meta Platforms A")
        );
        assert_eq!(
            NameQuery {
                name: "Alphabet Inc".into(),
                share_class: Some("C".into())
            },
            NameQuery::new("Alphabet class c")
        );
        assert_eq!(None, NameQuery::new("Netflix").share_class);
        assert_eq!(None, NameQuery::new("Volvo b").share_class);
    }

    #[tokio::test]
    async fn isin_prefers_equity_and_backfills_currency() {
        let search = ScriptedSearch::default()
            .with(
                "US0378331005",
                vec![
                    quote("AAPL240119C00100000", "OPTION", "OPR", "Apple call"),
                    quote("AAPL", "EQUITY", "NMS", "Apple Inc."),
                ],
            )
            .with_currency("AAPL", "USD");
        let search = Arc::new(search);
        let resolver = YahooIsinResolver::new(search.clone());
        let resolution = resolver.resolve("US0378331005", "Apple").await.unwrap();
        assert_eq!(TickerResolution::found("AAPL", Some("USD".into())), resolution);
        assert_eq!(vec!["AAPL".to_owned()], *search.currency_lookups.lock());
    }

    #[tokio::test]
    async fn isin_resolver_never_searches_names() {
        let search = Arc::new(ScriptedSearch::default());
        let resolver = YahooIsinResolver::new(search.clone());
        assert!(!resolver.resolve("", "Apple").await.unwrap().is_match());
        assert!(!resolver.resolve("SE0000000000", "Apple").await.unwrap().is_match());
        assert_eq!(vec!["SE0000000000".to_owned()], *search.queries.lock());
    }

    #[tokio::test]
    async fn failures_become_misses() {
        let search = Arc::new(ScriptedSearch {
            failing: true,
            ..Default::default()
        });
        let isin = YahooIsinResolver::new(search.clone());
        let name = YahooNameResolver::new(search);
        assert_eq!(TickerResolution::none(), isin.resolve("US0378331005", "Apple").await.unwrap());
        assert_eq!(TickerResolution::none(), name.resolve("", "Apple").await.unwrap());
    }

    #[tokio::test]
    async fn alphabet_class_picks_symbol() {
        let quotes = vec![
            quote("GOOGL", "EQUITY", "NMS", "Alphabet Inc."),
            quote("GOOG", "EQUITY", "NMS", "Alphabet Inc."),
        ];
        let search = Arc::new(ScriptedSearch::default().with("Alphabet Inc", quotes));
        let resolver = YahooNameResolver::new(search.clone());
        let class_c = resolver.resolve("", "Alphabet C").await.unwrap();
        assert_eq!(TickerResolution::found("GOOG", Some("USD".into())), class_c);
        let class_a = resolver.resolve("", "Alphabet A").await.unwrap();
        assert_eq!(Some("GOOGL"), class_a.ticker.as_deref());
        assert!(search.currency_lookups.lock().is_empty());
    }

    #[tokio::test]
    async fn shortest_matching_name_on_preferred_exchange() {
        let mut with_currency = quote("NFLX", "EQUITY", "NMS", "Netflix, Inc.");
        with_currency.currency = Some("USD".into());
        let quotes = vec![
            quote("NFLX.MX", "EQUITY", "MEX", "Netflix, Inc."),
            quote("NFLXL", "ETF", "NGM", "Netflix Leveraged Daily ETF"),
            with_currency,
        ];
        let search = Arc::new(ScriptedSearch::default().with("Netflix", quotes));
        let resolver = YahooNameResolver::new(search);
        let resolution = resolver.resolve("", "Netflix").await.unwrap();
        assert_eq!(TickerResolution::found("NFLX", Some("USD".into())), resolution);
    }

    #[tokio::test]
    async fn falls_back_through_ranking() {
        let first_preferred = vec![
            quote("XYZ.DE", "EQUITY", "GER", "Xyz AG"),
            quote("ABCD", "EQUITY", "NYQ", "Other Name Corp"),
        ];
        let any_security = vec![
            quote("^XYZ", "INDEX", "SNP", "Xyz index"),
            quote("XYZ.ST", "EQUITY", "STO", "Xyz AB"),
        ];
        let anything = vec![quote("XYZ=F", "FUTURE", "CME", "Xyz future")];
        let search = Arc::new(
            ScriptedSearch::default()
                .with("Xyz", first_preferred)
                .with("Xyz Nordic", any_security)
                .with("Xyz Futures", anything)
                .with_currency("XYZ.ST", "SEK"),
        );
        let resolver = YahooNameResolver::new(search);
        assert_eq!(Some("ABCD"), resolver.resolve("", "Xyz").await.unwrap().ticker.as_deref());
        assert_eq!(
            TickerResolution::found("XYZ.ST", Some("SEK".into())),
            resolver.resolve("", "Xyz Nordic").await.unwrap()
        );
        assert_eq!(
            TickerResolution::found("XYZ=F", None),
            resolver.resolve("", "Xyz Futures").await.unwrap()
        );
        assert!(!resolver.resolve("", "Nothing").await.unwrap().is_match());
    }
}
