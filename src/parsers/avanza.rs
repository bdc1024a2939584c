//! Avanza "transaktioner" export, semicolon separated, one currency pair per row.

use super::{derive_exchange_rate, direction_from_quantity, RowConversionError};
use crate::{
    input_output::RawRow,
    normalize::{normalize_type, parse_date, parse_number},
    transaction::Transaction,
};

const TYPE: &str = "Typ av transaktion";
const SECURITY: &str = "Värdepapper/beskrivning";
const SECURITY_LEGACY: &str = "Värdepapper";

pub(super) fn can_parse(row: &RawRow) -> bool {
    row.has(TYPE) && (row.has(SECURITY) || row.has(SECURITY_LEGACY))
}

pub(super) fn parse(row: &RawRow) -> Result<Transaction, RowConversionError> {
    let raw_date = row.get("Datum").unwrap_or_default();
    let date =
        parse_date(raw_date).ok_or_else(|| RowConversionError::InvalidDate(raw_date.to_owned()))?;
    let quantity = parse_number(row.get("Antal"));
    let total = parse_number(row.get("Belopp"));
    let fee = parse_number(row.get("Courtage"));
    let price = parse_number(row.get("Kurs"));

    let raw_type = row.get(TYPE).unwrap_or_default();
    let mut transaction_type = normalize_type(raw_type);
    // "Byte" is a fund switch; only the quantity sign tells in from out.
    if raw_type.eq_ignore_ascii_case("byte") {
        transaction_type = direction_from_quantity(quantity, transaction_type);
    }

    let account_currency = row.get("Transaktionsvaluta").unwrap_or("SEK").to_owned();
    let native_currency = row
        .get("Instrumentvaluta")
        .map_or_else(|| account_currency.clone(), str::to_owned);

    let price_in_account_currency = if quantity != 0.0 && total != 0.0 {
        (total / quantity).abs()
    } else {
        price
    };
    let mut exchange_rate = parse_number(row.get("Valutakurs"));
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
            .get(SECURITY)
            .or_else(|| row.get(SECURITY_LEGACY))
            .unwrap_or_default()
            .to_owned(),
        quantity: quantity.abs(),
        price,
        currency: account_currency.clone(),
        fee,
        total,
        original_source: Some("Avanza".to_owned()),
        ticker: None,
        account_id: row.get("Konto").map(str::to_owned),
        account_currency: Some(account_currency),
        price_in_account_currency: Some(price_in_account_currency),
        native_price: Some(price),
        native_currency: Some(native_currency),
        isin: row.get_ignore_case("ISIN").map(str::to_owned),
        exchange_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionType;

    #[test]
    fn buy_in_foreign_currency() {
        let row = RawRow::from_pairs(vec![
            ("Datum", "2025-12-26"),
            ("Konto", "Pension"),
            ("Typ av transaktion", "Köp"),
            ("Värdepapper/beskrivning", "Meta Platforms A"),
            ("Antal", "1"),
            ("Kurs", "666,89"),
            ("Belopp", "-6129,85"),
            ("Transaktionsvaluta", "SEK"),
            ("Courtage", "15,31"),
            ("Valutakurs", "9,168745"),
            ("Instrumentvaluta", "USD"),
            ("ISIN", "US30303M1027"),
        ]);
        let tx = parse(&row).expect("parsing buy");
        assert_eq!("Meta Platforms A", tx.symbol);
        assert_eq!(TransactionType::Buy, tx.transaction_type);
        assert_eq!(1.0, tx.quantity);
        assert_eq!(666.89, tx.price);
        assert_eq!(-6129.85, tx.total);
        assert_eq!(15.31, tx.fee);
        assert_eq!("SEK", tx.currency);
        assert_eq!(Some("USD"), tx.native_currency.as_deref());
        assert_eq!(9.168745, tx.exchange_rate);
        assert_eq!(Some(6129.85), tx.price_in_account_currency);
        assert_eq!(Some("US30303M1027"), tx.isin.as_deref());
        assert_eq!(Some("Pension"), tx.account_id.as_deref());
    }

    #[test]
    fn dividend_derives_rate() {
        let row = RawRow::from_pairs(vec![
            ("Datum", "2025-12-29"),
            ("Typ av transaktion", "Utdelning"),
            ("Värdepapper/beskrivning", "Meta Platforms A"),
            ("Antal", "10"),
            ("Kurs", "0,5"),
            ("Belopp", "48"),
            ("Transaktionsvaluta", "SEK"),
            ("Instrumentvaluta", "USD"),
        ]);
        let tx = parse(&row).expect("parsing dividend");
        assert_eq!(TransactionType::Dividend, tx.transaction_type);
        assert_eq!(48.0, tx.total);
        assert!((tx.exchange_rate - 9.6).abs() < 1e-9);
    }

    #[test]
    fn sell_has_absolute_quantity() {
        let row = RawRow::from_pairs(vec![
            ("Datum", "2025-12-30"),
            ("Typ av transaktion", "Sälj"),
            ("Värdepapper/beskrivning", "Meta Platforms A"),
            ("Antal", "-5"),
            ("Kurs", "700"),
            ("Belopp", "35000"),
            ("Transaktionsvaluta", "SEK"),
            ("Courtage", "15"),
            ("Valutakurs", "10"),
        ]);
        let tx = parse(&row).expect("parsing sell");
        assert_eq!(TransactionType::Sell, tx.transaction_type);
        assert_eq!(5.0, tx.quantity);
        assert_eq!(10.0, tx.exchange_rate);
    }

    #[test]
    fn fund_switch_direction_follows_quantity_sign() {
        let switch = |name: &str, quantity: &str, isin: &str| {
            RawRow::from_pairs(vec![
                ("Datum", "2023-03-10"),
                ("Konto", "Pension"),
                ("Typ av transaktion", "Byte"),
                ("Värdepapper/beskrivning", name),
                ("Antal", quantity),
                ("ISIN", isin),
            ])
        };
        let incoming = parse(&switch("DNB Fund Technology A SEK Acc", "0,1649", "LU2553959045"))
            .expect("parsing incoming switch");
        let outgoing = parse(&switch("DNB TECHNOLOGY", "-0,1649", "LU0302296495"))
            .expect("parsing outgoing switch");
        assert_eq!(TransactionType::Buy, incoming.transaction_type);
        assert_eq!(TransactionType::Sell, outgoing.transaction_type);
        assert_eq!(0.1649, incoming.quantity);
        assert_eq!(incoming.quantity, outgoing.quantity);
        assert_eq!(1.0, incoming.exchange_rate);
    }

    #[test]
    fn legacy_security_header() {
        let row = RawRow::from_pairs(vec![
            ("Datum", "2023-01-01"),
            ("Typ av transaktion", "Köp"),
            ("Värdepapper", "Legacy Stock"),
            ("Antal", "1"),
        ]);
        assert!(can_parse(&row));
        assert_eq!("Legacy Stock", parse(&row).expect("parsing legacy").symbol);
    }
}
