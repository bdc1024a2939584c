use crate::{
    cache::TickerCache,
    resolver::{TickerResolution, TickerResolver},
    transaction::Transaction,
};
use std::sync::Arc;

pub struct EnrichmentOptions<'a> {
    /// Consulted in order; earlier resolvers have priority.
    pub resolvers: &'a [Arc<dyn TickerResolver>],
    pub cache: Option<&'a dyn TickerCache>,
    /// Leave transactions that already carry a ticker untouched.
    pub skip_if_present: bool,
    /// Stop at the first resolver that finds a ticker. When false every
    /// resolver still runs, but the first match keeps priority.
    pub stop_on_first_match: bool,
}

impl<'a> EnrichmentOptions<'a> {
    pub fn new(resolvers: &'a [Arc<dyn TickerResolver>]) -> Self {
        Self {
            resolvers,
            cache: None,
            skip_if_present: true,
            stop_on_first_match: true,
        }
    }

    pub fn with_cache(mut self, cache: &'a dyn TickerCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn skip_if_present(mut self, skip_if_present: bool) -> Self {
        self.skip_if_present = skip_if_present;
        self
    }

    pub fn stop_on_first_match(mut self, stop_on_first_match: bool) -> Self {
        self.stop_on_first_match = stop_on_first_match;
        self
    }
}

/// Fills in `ticker` for each transaction, one at a time and in input order.
///
/// The cache is consulted first; a cached ticker means no resolver runs.
/// Resolver errors are logged and treated as misses. New matches are written
/// back to the cache under the transaction's identity key. An unresolved
/// transaction keeps whatever ticker it had.
pub async fn enrich_transactions(
    transactions: Vec<Transaction>,
    options: &EnrichmentOptions<'_>,
) -> Vec<Transaction> {
    let mut enriched = Vec::with_capacity(transactions.len());
    for mut transaction in transactions {
        let has_ticker = transaction
            .ticker
            .as_deref()
            .map_or(false, |ticker| !ticker.is_empty());
        if options.skip_if_present && has_ticker {
            enriched.push(transaction);
            continue;
        }
        let key = match transaction.identity_key() {
            Some(key) => key.to_owned(),
            None => {
                enriched.push(transaction);
                continue;
            }
        };
        if let Some(TickerResolution {
            ticker: Some(ticker),
            ..
        }) = resolve(&transaction, &key, options).await
        {
            transaction.ticker = Some(ticker);
        }
        enriched.push(transaction);
    }
    enriched
}

async fn resolve(
    transaction: &Transaction,
    key: &str,
    options: &EnrichmentOptions<'_>,
) -> Option<TickerResolution> {
    if let Some(cache) = options.cache {
        if let Some(hit) = cache.get(key).await.filter(TickerResolution::is_match) {
            log::debug!("Cache hit for {}", key);
            return Some(hit);
        }
    }

    let isin = transaction.isin.as_deref().unwrap_or_default();
    let mut found: Option<TickerResolution> = None;
    for resolver in options.resolvers {
        match resolver.resolve(isin, &transaction.symbol).await {
            Ok(resolution) if resolution.is_match() => {
                log::debug!(
                    "{} resolved {} to {:?}",
                    resolver.name(),
                    key,
                    resolution.ticker
                );
                found.get_or_insert(resolution);
                if options.stop_on_first_match {
                    break;
                }
            }
            Ok(_) => {}
            Err(error) => log::warn!("Resolver {} failed for {}: {:#}", resolver.name(), key, error),
        }
    }

    if let (Some(cache), Some(resolution)) = (options.cache, &found) {
        cache.set(key, resolution.clone()).await;
    }
    found
}
