mod file;
mod yahoo;

pub use file::FileTickerResolver;
pub use yahoo::{
    QuoteCandidate, QuoteSearch, SearchError, YahooClient, YahooIsinResolver, YahooNameResolver,
};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of one lookup. A `None` ticker means "no match".
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TickerResolution {
    pub ticker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl TickerResolution {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn found(ticker: impl Into<String>, currency: Option<String>) -> Self {
        Self {
            ticker: Some(ticker.into()),
            currency,
        }
    }

    pub fn is_match(&self) -> bool {
        self.ticker.as_deref().map_or(false, |ticker| !ticker.is_empty())
    }
}

/// Maps an ISIN and/or a free-text security name to a ticker.
///
/// Implementations in this crate swallow their own failures and return
/// [`TickerResolution::none`]; callers still treat an `Err` as a miss.
#[async_trait]
pub trait TickerResolver: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(&self, isin: &str, name: &str) -> Result<TickerResolution>;
}
