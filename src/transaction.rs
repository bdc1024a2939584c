use chrono::NaiveDate;
use derive_more::Display;
use serde::{Deserialize, Serialize};

#[derive(Display, Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    #[display(fmt = "BUY")]
    Buy,
    #[display(fmt = "SELL")]
    Sell,
    #[display(fmt = "DIVIDEND")]
    Dividend,
    #[display(fmt = "DEPOSIT")]
    Deposit,
    #[display(fmt = "WITHDRAW")]
    Withdraw,
    #[display(fmt = "INTEREST")]
    Interest,
    #[display(fmt = "TAX")]
    Tax,
    #[display(fmt = "OTHER")]
    Other,
}

impl TransactionType {
    pub fn is_trade(&self) -> bool {
        matches!(self, TransactionType::Buy | TransactionType::Sell)
    }
}

/// A broker row projected onto the common shape.
///
/// `quantity` and `fee` are magnitudes; direction lives in `transaction_type`.
/// `total` keeps the sign the broker reported.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
    pub currency: String,
    pub fee: f64,
    pub total: f64,
    pub original_source: Option<String>,
    pub ticker: Option<String>,
    pub account_id: Option<String>,
    pub account_currency: Option<String>,
    pub price_in_account_currency: Option<f64>,
    pub native_price: Option<f64>,
    pub native_currency: Option<String>,
    pub isin: Option<String>,
    pub exchange_rate: f64,
}

impl Transaction {
    /// Key used for cache lookups: the ISIN when present, else the symbol.
    /// Returns `None` when both are empty.
    pub fn identity_key(&self) -> Option<&str> {
        self.isin
            .as_deref()
            .filter(|isin| !isin.is_empty())
            .or_else(|| Some(self.symbol.as_str()).filter(|symbol| !symbol.is_empty()))
    }
}

#[cfg(test)]
pub(crate) fn sample(symbol: &str, isin: Option<&str>) -> Transaction {
    Transaction {
        date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        transaction_type: TransactionType::Buy,
        symbol: symbol.to_owned(),
        quantity: 1.0,
        price: 10.0,
        currency: "SEK".to_owned(),
        fee: 0.0,
        total: -10.0,
        original_source: Some("Avanza".to_owned()),
        ticker: None,
        account_id: None,
        account_currency: Some("SEK".to_owned()),
        price_in_account_currency: Some(10.0),
        native_price: Some(10.0),
        native_currency: Some("SEK".to_owned()),
        isin: isin.map(str::to_owned),
        exchange_rate: 1.0,
    }
}
