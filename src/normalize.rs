use crate::transaction::TransactionType;
use chrono::NaiveDate;

/// Input accepted by [`parse_number`]: an already numeric value, text in the
/// Swedish export convention, or nothing at all.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum RawNumber<'a> {
    Number(f64),
    Text(&'a str),
    Missing,
}

impl From<f64> for RawNumber<'_> {
    fn from(value: f64) -> Self {
        RawNumber::Number(value)
    }
}

impl<'a> From<&'a str> for RawNumber<'a> {
    fn from(value: &'a str) -> Self {
        RawNumber::Text(value)
    }
}

impl<'a> From<Option<&'a str>> for RawNumber<'a> {
    fn from(value: Option<&'a str>) -> Self {
        value.map_or(RawNumber::Missing, RawNumber::Text)
    }
}

/// Parses numbers written as `1 234,50`: whitespace is thousands grouping and
/// the first comma is the decimal marker. Missing, empty and unparsable input
/// all yield `0`.
pub fn parse_number<'a>(raw: impl Into<RawNumber<'a>>) -> f64 {
    match raw.into() {
        RawNumber::Number(value) => value,
        RawNumber::Missing => 0.0,
        RawNumber::Text(text) => {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            if compact.is_empty() {
                return 0.0;
            }
            compact
                .replacen(',', ".", 1)
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .unwrap_or(0.0)
        }
    }
}

// Order matters: the first category with a matching keyword wins.
const TYPE_KEYWORDS: &[(TransactionType, &[&str])] = &[
    (TransactionType::Buy, &["KÖP", "KÖPT", "BUY", "INBOKNING"]),
    (
        TransactionType::Sell,
        &[
            "SÄLJ",
            "SÅLT",
            "SELL",
            "INLÖSEN",
            "REDEMPTION",
            "UTBOKNING",
            "FUSION",
            "MERGER",
            "MAKULERING",
        ],
    ),
    (TransactionType::Dividend, &["UTDELNING", "DIVIDEND"]),
    (
        TransactionType::Deposit,
        &["INSÄTTNING", "DEPOSIT", "INS. KREDIT", "REALTIDSINSÄTTNING"],
    ),
    (TransactionType::Withdraw, &["UTTAG", "WITHDRAW"]),
    (
        TransactionType::Interest,
        &["RÄNTA", "INTEREST", "AVKASTNINGSSKATT"],
    ),
    (TransactionType::Tax, &["SKATT", "TAX"]),
];

/// Classifies a broker's transaction label by case-insensitive keyword
/// containment. Unknown or empty labels are `Other`.
pub fn normalize_type(raw: &str) -> TransactionType {
    let label = raw.trim().to_uppercase();
    if label.is_empty() {
        return TransactionType::Other;
    }
    TYPE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| label.contains(keyword)))
        .map(|(transaction_type, _)| *transaction_type)
        .unwrap_or(TransactionType::Other)
}

/// Parses `YYYY-MM-DD`, ignoring any trailing time part.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let day = match raw.get(..10) {
        Some(prefix) if raw.len() == 10 || raw[10..].starts_with(&[' ', 'T'][..]) => prefix,
        _ => raw,
    };
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
