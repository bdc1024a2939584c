use super::{TickerResolution, TickerResolver};
use anyhow::Result;
use async_trait::async_trait;
use csv::{ReaderBuilder, Trim};
use serde_json::Value;
use std::{collections::HashMap, fs, path::Path};
use thiserror::Error;

#[derive(Error, Debug)]
enum MappingFileError {
    #[error("error reading ticker file")]
    Io(#[from] std::io::Error),

    #[error("error parsing JSON ticker file")]
    Json(#[from] serde_json::Error),

    #[error("error parsing CSV ticker file")]
    Csv(#[from] csv::Error),

    #[error("unsupported ticker file extension {0:?}, expected .json or .csv")]
    UnsupportedExtension(String),
}

/// Static ISIN/name to ticker table loaded once from a JSON or CSV file.
///
/// Accepted layouts:
/// - JSON object `{"<isin or name>": "<ticker>"}`
/// - JSON array `[{"isin": .., "name": .., "ticker": ..}]`
/// - CSV with `isin`, `name` and `ticker` columns (headers case-insensitive)
///
/// Later entries overwrite earlier ones with the same key. A missing or
/// malformed file leaves the table empty.
#[derive(Debug, Default)]
pub struct FileTickerResolver {
    mappings: HashMap<String, String>,
}

impl FileTickerResolver {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mappings = if !path.exists() {
            log::warn!("Ticker file not found: {}", path.display());
            HashMap::new()
        } else {
            load(path).unwrap_or_else(|error| {
                log::warn!("Ignoring ticker file {}: {:#}", path.display(), anyhow::Error::from(error));
                HashMap::new()
            })
        };
        log::debug!("Loaded {} ticker mappings from {}", mappings.len(), path.display());
        Self { mappings }
    }

    pub fn from_mappings(mappings: HashMap<String, String>) -> Self {
        Self { mappings }
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    fn lookup(&self, isin: &str, name: &str) -> Option<&String> {
        self.mappings
            .get(isin)
            .filter(|_| !isin.is_empty())
            .or_else(|| self.mappings.get(name).filter(|_| !name.is_empty()))
    }
}

fn load(path: &Path) -> Result<HashMap<String, String>, MappingFileError> {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .unwrap_or_default()
        .to_lowercase();
    let content = fs::read_to_string(path)?;
    match extension.as_str() {
        "json" => load_json(&content),
        "csv" => load_csv(&content),
        _ => Err(MappingFileError::UnsupportedExtension(extension)),
    }
}

fn load_json(content: &str) -> Result<HashMap<String, String>, MappingFileError> {
    let mut mappings = HashMap::new();
    match serde_json::from_str::<Value>(content)? {
        Value::Array(items) => {
            for item in items {
                let text = |field: &str| {
                    item.get(field)
                        .and_then(Value::as_str)
                        .filter(|value| !value.is_empty())
                        .map(str::to_owned)
                };
                if let (Some(key), Some(ticker)) = (text("isin").or_else(|| text("name")), text("ticker")) {
                    mappings.insert(key, ticker);
                }
            }
        }
        Value::Object(entries) => {
            for (key, value) in entries {
                if let Value::String(ticker) = value {
                    mappings.insert(key, ticker);
                }
            }
        }
        other => log::warn!("Ticker file JSON must be an object or array, got {}", other),
    }
    Ok(mappings)
}

fn load_csv(content: &str) -> Result<HashMap<String, String>, MappingFileError> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|header| header.eq_ignore_ascii_case(name));
    let (isin_column, name_column, ticker_column) = (column("isin"), column("name"), column("ticker"));

    let mut mappings = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let field = |position: Option<usize>| {
            position
                .and_then(|position| record.get(position))
                .filter(|value| !value.is_empty())
        };
        if let (Some(key), Some(ticker)) = (
            field(isin_column).or_else(|| field(name_column)),
            field(ticker_column),
        ) {
            mappings.insert(key.to_owned(), ticker.to_owned());
        }
    }
    Ok(mappings)
}

#[async_trait]
impl TickerResolver for FileTickerResolver {
    fn name(&self) -> &str {
        "File Resolver"
    }

    async fn resolve(&self, isin: &str, name: &str) -> Result<TickerResolution> {
        Ok(self
            .lookup(isin, name)
            .map(|ticker| TickerResolution::found(ticker.clone(), None))
            .unwrap_or_default())
    }
}
