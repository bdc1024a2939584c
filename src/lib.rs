#![forbid(unsafe_code)]

mod cache;
mod enricher;
mod input_output;
mod normalize;
mod parsers;
mod resolver;
mod transaction;

pub use cache::{CacheConfig, CacheError, FileTickerCache, MemoryTickerCache, TickerCache};
pub use enricher::{enrich_transactions, EnrichmentOptions};
pub use input_output::{read_rows, InputError, RawRow, YahooRecord};
pub use normalize::{normalize_type, parse_date, parse_number, RawNumber};
pub use parsers::{
    parse_transaction, Broker, BrokerFormat, RowConversionError, UnknownFormatError,
    REGISTERED_BROKERS,
};
pub use resolver::{
    FileTickerResolver, QuoteCandidate, QuoteSearch, SearchError, TickerResolution,
    TickerResolver, YahooClient, YahooIsinResolver, YahooNameResolver,
};
pub use transaction::{Transaction, TransactionType};

use anyhow::{Context, Result};
use derive_more::Display;
use std::{collections::HashMap, io::Read, str::FromStr};
use thiserror::Error;

/// Reads a broker export and keeps the rows that parse as transactions.
pub fn parse_transactions(input: &mut impl Read, format: BrokerFormat) -> Result<Vec<Transaction>> {
    let rows = read_rows(input).context("reading broker export")?;
    let row_count = rows.len();
    let transactions: Vec<Transaction> = rows
        .iter()
        .filter_map(|row| parse_transaction(row, format))
        .collect();
    log::info!(
        "Parsed {} of {} rows as transactions",
        transactions.len(),
        row_count
    );
    Ok(transactions)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub id: String,
    pub name: String,
    pub count: usize,
}

/// Counts parseable transactions per account id, in order of first appearance.
pub fn identify_accounts(rows: &[RawRow]) -> Vec<AccountSummary> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut accounts: Vec<AccountSummary> = vec![];
    for account_id in rows
        .iter()
        .filter_map(|row| parse_transaction(row, BrokerFormat::Auto))
        .filter_map(|transaction| transaction.account_id)
    {
        match positions.get(&account_id) {
            Some(position) => accounts[*position].count += 1,
            None => {
                positions.insert(account_id.clone(), accounts.len());
                accounts.push(AccountSummary {
                    id: account_id.clone(),
                    name: account_id,
                    count: 1,
                });
            }
        }
    }
    accounts
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    pub filename: String,
    pub content: String,
    pub mime_type: String,
}

#[derive(Display, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExportFormat {
    #[display(fmt = "yahoo")]
    Yahoo,
}

impl FromStr for ExportFormat {
    type Err = UnknownExporterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("yahoo") {
            Ok(ExportFormat::Yahoo)
        } else {
            Err(UnknownExporterError(s.to_owned()))
        }
    }
}

#[derive(Error, Debug)]
#[error("unknown exporter {0:?}, expected yahoo")]
pub struct UnknownExporterError(String);

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("error writing CSV record")]
    Csv(#[from] csv::Error),

    #[error("error flushing CSV output")]
    Io(#[from] std::io::Error),

    #[error("exported CSV is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl ExportFormat {
    pub fn export(&self, transactions: &[Transaction]) -> Result<ExportResult, ExportError> {
        match self {
            ExportFormat::Yahoo => export_yahoo(transactions),
        }
    }
}

/// Yahoo Finance portfolio import CSV. Only buys and sells are written.
pub fn export_yahoo(transactions: &[Transaction]) -> Result<ExportResult, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(vec![]);
    writer.write_record(&[
        "Symbol",
        "Trade Date",
        "Purchase Price",
        "Quantity",
        "Commission",
        "Comment",
    ])?;
    for transaction in transactions
        .iter()
        .filter(|transaction| transaction.transaction_type.is_trade())
    {
        let record: YahooRecord = transaction.into();
        writer.serialize(record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|error| ExportError::Io(error.into_error()))?;
    Ok(ExportResult {
        filename: "yahoo_finance_import.csv".to_owned(),
        content: String::from_utf8(bytes)?,
        mime_type: "text/csv".to_owned(),
    })
}
