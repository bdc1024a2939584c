use crate::transaction::{Transaction, TransactionType};
use csv::{ReaderBuilder, Trim};
use serde::Serialize;
use std::{io::Read, sync::Arc};
use thiserror::Error;

/// One CSV record, addressable by header name and by column position.
///
/// Some broker exports repeat a header (Nordnet has three `Valuta` columns),
/// so lookups by name alone are ambiguous. `get` returns the first occurrence,
/// `get_nth` any later one.
#[derive(Debug, Clone)]
pub struct RawRow {
    headers: Arc<Vec<String>>,
    values: Vec<String>,
}

impl RawRow {
    pub fn new(headers: Arc<Vec<String>>, values: Vec<String>) -> Self {
        Self { headers, values }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (headers, values): (Vec<String>, Vec<String>) = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .unzip();
        Self::new(Arc::new(headers), values)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Value of the first column named `name`; blank values count as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_nth(name, 0)
    }

    /// Value of the `occurrence`-th (zero based) column named `name`.
    pub fn get_nth(&self, name: &str, occurrence: usize) -> Option<&str> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(_, header)| header.as_str() == name)
            .nth(occurrence)
            .and_then(|(position, _)| self.value_at(position))
    }

    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case(name))
            .and_then(|position| self.value_at(position))
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn value_at(&self, position: usize) -> Option<&str> {
        self.values
            .get(position)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("error reading input")]
    Io(#[from] std::io::Error),

    #[error("input is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("input is not valid UTF-16")]
    InvalidUtf16(#[from] std::string::FromUtf16Error),

    #[error("malformed CSV")]
    Csv(#[from] csv::Error),
}

/// Reads a whole broker export into memory as raw rows.
pub fn read_rows(input: &mut impl Read) -> Result<Vec<RawRow>, InputError> {
    let mut bytes = vec![];
    input.read_to_end(&mut bytes)?;
    let text = decode(bytes)?;
    let delimiter = sniff_delimiter(text.lines().next().unwrap_or_default());
    log::debug!("Using delimiter {:?}", delimiter as char);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Arc<Vec<String>> = Arc::new(reader.headers()?.iter().map(str::to_owned).collect());
    let mut rows = vec![];
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(RawRow::new(
            headers.clone(),
            record.iter().map(str::to_owned).collect(),
        ));
    }
    Ok(rows)
}

fn decode(bytes: Vec<u8>) -> Result<String, InputError> {
    fn utf16(bytes: &[u8], to_u16: fn([u8; 2]) -> u16) -> Result<String, InputError> {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| to_u16([pair[0], pair[1]]))
            .collect();
        Ok(String::from_utf16(&units)?)
    }

    match bytes.as_slice() {
        [0xFF, 0xFE, rest @ ..] => utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => utf16(rest, u16::from_be_bytes),
        [0xEF, 0xBB, 0xBF, rest @ ..] => Ok(String::from_utf8(rest.to_vec())?),
        _ => Ok(String::from_utf8(bytes)?),
    }
}

/// Picks the most frequent candidate delimiter in the header line, `,` on ties.
fn sniff_delimiter(header_line: &str) -> u8 {
    let mut best = (b',', 0);
    for candidate in [b',', b';', b'\t', b'|'] {
        let count = header_line.bytes().filter(|byte| *byte == candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

#[derive(Serialize)]
pub struct YahooRecord {
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Trade Date")]
    pub trade_date: String,
    #[serde(rename = "Purchase Price")]
    pub purchase_price: String,
    #[serde(rename = "Quantity")]
    pub quantity: String,
    #[serde(rename = "Commission")]
    pub commission: String,
    #[serde(rename = "Comment")]
    pub comment: String,
}

impl From<&Transaction> for YahooRecord {
    fn from(transaction: &Transaction) -> Self {
        let quantity = match transaction.transaction_type {
            TransactionType::Sell if transaction.quantity != 0.0 => -transaction.quantity.abs(),
            _ => transaction.quantity.abs(),
        };
        Self {
            symbol: transaction
                .ticker
                .clone()
                .unwrap_or_else(|| transaction.symbol.clone()),
            trade_date: transaction.date.format("%Y%m%d").to_string(),
            purchase_price: format!("{:.4}", transaction.price),
            quantity: quantity.to_string(),
            commission: format!("{:.4}", transaction.fee),
            comment: format!(
                "Imported from {}",
                transaction.original_source.as_deref().unwrap_or("Broker")
            ),
        }
    }
}
