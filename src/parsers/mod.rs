mod avanza;
mod nordnet;

use crate::{
    input_output::RawRow,
    transaction::{Transaction, TransactionType},
};
use derive_more::Display;
use std::str::FromStr;
use thiserror::Error;

/// Every supported export format, in auto-detection order.
pub const REGISTERED_BROKERS: [Broker; 2] = [Broker::Avanza, Broker::Nordnet];

#[derive(Display, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Broker {
    Avanza,
    Nordnet,
}

impl Broker {
    pub fn name(&self) -> &'static str {
        match self {
            Broker::Avanza => "Avanza",
            Broker::Nordnet => "Nordnet",
        }
    }

    /// Whether the row carries the columns this format needs.
    pub fn can_parse(&self, row: &RawRow) -> bool {
        match self {
            Broker::Avanza => avanza::can_parse(row),
            Broker::Nordnet => nordnet::can_parse(row),
        }
    }

    pub fn parse(&self, row: &RawRow) -> Result<Transaction, RowConversionError> {
        match self {
            Broker::Avanza => avanza::parse(row),
            Broker::Nordnet => nordnet::parse(row),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BrokerFormat {
    Auto,
    Broker(Broker),
}

impl Default for BrokerFormat {
    fn default() -> Self {
        BrokerFormat::Auto
    }
}

impl FromStr for BrokerFormat {
    type Err = UnknownFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(BrokerFormat::Auto);
        }
        REGISTERED_BROKERS
            .iter()
            .find(|broker| broker.name().eq_ignore_ascii_case(s))
            .map(|broker| BrokerFormat::Broker(*broker))
            .ok_or_else(|| UnknownFormatError(s.to_owned()))
    }
}

#[derive(Error, Debug)]
#[error("unknown broker format {0:?}, expected auto, avanza or nordnet")]
pub struct UnknownFormatError(String);

#[derive(Error, Debug, PartialEq)]
pub enum RowConversionError {
    #[error("missing or invalid date {0:?}")]
    InvalidDate(String),
}

/// Projects a raw row through the requested format, or through the first
/// registered format that recognizes it when `format` is `Auto`.
///
/// Returns `None` for rows no format accepts and for rows that parse to an
/// empty symbol or an invalid date. The chosen parser is never second-guessed
/// by trying another one.
pub fn parse_transaction(row: &RawRow, format: BrokerFormat) -> Option<Transaction> {
    let broker = match format {
        BrokerFormat::Broker(broker) => Some(broker).filter(|broker| broker.can_parse(row)),
        BrokerFormat::Auto => REGISTERED_BROKERS
            .iter()
            .copied()
            .find(|broker| broker.can_parse(row)),
    }?;
    match broker.parse(row) {
        Ok(transaction) if !transaction.symbol.trim().is_empty() => Some(transaction),
        Ok(_) => {
            log::debug!("Dropping {} row without symbol", broker);
            None
        }
        Err(error) => {
            log::debug!("Dropping {} row: {}", broker, error);
            None
        }
    }
}

/// Direction for a row whose label carries none, taken from the raw quantity sign.
pub(crate) fn direction_from_quantity(quantity: f64, fallback: TransactionType) -> TransactionType {
    if quantity > 0.0 {
        TransactionType::Buy
    } else if quantity < 0.0 {
        TransactionType::Sell
    } else {
        fallback
    }
}

/// Account-currency units per native unit, when the row lets us work it out.
pub(crate) fn derive_exchange_rate(price_in_account_currency: f64, native_price: f64) -> Option<f64> {
    if price_in_account_currency != 0.0 && native_price != 0.0 {
        Some(price_in_account_currency / native_price)
    } else {
        None
    }
}
