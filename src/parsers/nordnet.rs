//! Nordnet transaction export.
//!
//! The export repeats the `Valuta` header once per amount column group:
//! `Total Avgift | Valuta | Belopp | Valuta | Inköpsvärde | Valuta`. The
//! second occurrence is the account currency, the third the instrument's.

use super::{derive_exchange_rate, RowConversionError};
use crate::{
    input_output::RawRow,
    normalize::{normalize_type, parse_date, parse_number},
    transaction::{Transaction, TransactionType},
};

const CURRENCY: &str = "Valuta";
const ACCOUNT_CURRENCY_OCCURRENCE: usize = 1;
const NATIVE_CURRENCY_OCCURRENCE: usize = 2;

pub(super) fn can_parse(row: &RawRow) -> bool {
    row.has("Transaktionstyp")
        && (row.has("Instrument") || row.has("Värdepapper"))
        && row.has("Bokföringsdag")
}

fn currency(row: &RawRow, occurrence: usize) -> String {
    row.get_nth(CURRENCY, occurrence)
        .or_else(|| row.get(&format!("{}_{}", CURRENCY, occurrence)))
        .or_else(|| row.get(CURRENCY))
        .unwrap_or("SEK")
        .to_owned()
}

pub(super) fn parse(row: &RawRow) -> Result<Transaction, RowConversionError> {
    let raw_date = row
        .get("Transaktionsdag")
        .or_else(|| row.get("Bokföringsdag"))
        .unwrap_or_default();
    let date =
        parse_date(raw_date).ok_or_else(|| RowConversionError::InvalidDate(raw_date.to_owned()))?;
    let quantity = parse_number(row.get("Antal"));
    let total = parse_number(row.get("Belopp"));
    let fee = parse_number(row.get("Total Avgift").or_else(|| row.get("Courtage")));
    let price = parse_number(row.get("Kurs"));
    let transaction_type = normalize_type(row.get("Transaktionstyp").unwrap_or_default());

    let account_currency = currency(row, ACCOUNT_CURRENCY_OCCURRENCE);
    let native_currency = currency(row, NATIVE_CURRENCY_OCCURRENCE);

    // Belopp is -(price * quantity * rate + fee) for a buy, so the fee has to
    // come back out before dividing.
    let price_in_account_currency = if quantity != 0.0 && total != 0.0 {
        let signed_fee = if transaction_type == TransactionType::Buy {
            fee
        } else {
            -fee
        };
        ((total + signed_fee) / quantity).abs()
    } else {
        0.0
    };
    let mut exchange_rate = parse_number(row.get("Växlingskurs"));
    if exchange_rate == 0.0 {
        exchange_rate = if account_currency == native_currency {
            1.0
        } else {
            derive_exchange_rate(price_in_account_currency, price).unwrap_or(1.0)
        };
    }

    Ok(Transaction {
        date,
        transaction_type,
        symbol: row
            .get("Instrument")
            .or_else(|| row.get("Värdepapper"))
            .unwrap_or_default()
            .to_owned(),
        quantity: quantity.abs(),
        price,
        currency: account_currency.clone(),
        fee,
        total,
        original_source: Some("Nordnet".to_owned()),
        ticker: None,
        account_id: row
            .get("Depå")
            .or_else(|| row.get("Konto"))
            .or_else(|| row.get("Kontonummer"))
            .map(str::to_owned),
        account_currency: Some(account_currency),
        price_in_account_currency: Some(price_in_account_currency),
        native_price: Some(price),
        native_currency: Some(native_currency),
        isin: row.get("ISIN").map(str::to_owned),
        exchange_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_with_repeated_currency_columns() {
        let row = RawRow::from_pairs(vec![
            ("Depå", "12345678"),
            ("Bokföringsdag", "2025-12-04"),
            ("Transaktionstyp", "KÖPT"),
            ("Instrument", "Netflix"),
            ("ISIN", "US64110L1061"),
            ("Antal", "50"),
            ("Kurs", "102,98"),
            ("Total Avgift", "121,43"),
            ("Valuta", "SEK"),
            ("Belopp", "-48694,8"),
            ("Valuta", "SEK"),
            ("Inköpsvärde", "5161,87"),
            ("Valuta", "USD"),
            ("Växlingskurs", "9,4335"),
        ]);
        let tx = parse(&row).expect("parsing buy");
        assert_eq!("Netflix", tx.symbol);
        assert_eq!(TransactionType::Buy, tx.transaction_type);
        assert_eq!(50.0, tx.quantity);
        assert_eq!(102.98, tx.price);
        assert_eq!(-48694.8, tx.total);
        assert_eq!(121.43, tx.fee);
        assert_eq!("SEK", tx.currency);
        assert_eq!(Some("USD"), tx.native_currency.as_deref());
        assert_eq!(9.4335, tx.exchange_rate);
        assert_eq!(Some("12345678"), tx.account_id.as_deref());
        let expected = (-48694.8_f64 + 121.43) / 50.0;
        assert!((tx.price_in_account_currency.unwrap() - expected.abs()).abs() < 1e-9);
    }

    #[test]
    fn sell_with_single_currency_column() {
        let row = RawRow::from_pairs(vec![
            ("Bokföringsdag", "2025-12-05"),
            ("Transaktionstyp", "SÅLT"),
            ("Instrument", "Netflix"),
            ("Antal", "-10"),
            ("Kurs", "105"),
            ("Belopp", "10000"),
            ("Valuta", "SEK"),
        ]);
        let tx = parse(&row).expect("parsing sell");
        assert_eq!(TransactionType::Sell, tx.transaction_type);
        assert_eq!(10.0, tx.quantity);
        assert_eq!("SEK", tx.currency);
        assert_eq!(Some("SEK"), tx.native_currency.as_deref());
        assert_eq!(1.0, tx.exchange_rate);
        assert_eq!(Some(1000.0), tx.price_in_account_currency);
    }

    #[test]
    fn derives_rate_when_missing() {
        let row = RawRow::from_pairs(vec![
            ("Bokföringsdag", "2025-12-05"),
            ("Transaktionstyp", "SÅLT"),
            ("Instrument", "Netflix"),
            ("Antal", "-10"),
            ("Kurs", "100"),
            ("Total Avgift", "50"),
            ("Valuta", "SEK"),
            ("Belopp", "10050"),
            ("Valuta", "SEK"),
            ("Inköpsvärde", "900"),
            ("Valuta", "USD"),
        ]);
        let tx = parse(&row).expect("parsing sell");
        assert_eq!(Some(1000.0), tx.price_in_account_currency);
        assert_eq!(10.0, tx.exchange_rate);
    }

    #[test]
    fn legacy_headers() {
        let row = RawRow::from_pairs(vec![
            ("Bokföringsdag", "2023-01-01"),
            ("Transaktionstyp", "KÖPT"),
            ("Värdepapper", "Legacy Nordnet"),
            ("Courtage", "10"),
            ("Transaktionsdag", "2023-01-02"),
        ]);
        assert!(can_parse(&row));
        let tx = parse(&row).expect("parsing legacy");
        assert_eq!("Legacy Nordnet", tx.symbol);
        assert_eq!(10.0, tx.fee);
        assert_eq!(chrono::NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(), tx.date);
    }
}
