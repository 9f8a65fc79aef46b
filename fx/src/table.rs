//! Reference-anchored rate tables.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use ratefeed_common::Currency;
use tracing::warn;

use crate::error::{FxError, FxResult};
use crate::feed::RawRate;
use crate::rate::{ConversionContext, ExchangeRate, RateKind};

/// Rates of one day, keyed by term currency. Every rate has the table's
/// reference currency as base.
#[derive(Debug, Clone, Default)]
pub struct DayRates {
    rates: HashMap<Currency, ExchangeRate>,
}

impl DayRates {
    pub fn get(&self, term: &Currency) -> Option<&ExchangeRate> {
        self.rates.get(term)
    }

    pub fn contains(&self, term: &Currency) -> bool {
        self.rates.contains_key(term)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Quoted currencies, sorted.
    pub fn currencies(&self) -> Vec<Currency> {
        let mut currencies: Vec<Currency> = self.rates.keys().cloned().collect();
        currencies.sort();
        currencies
    }
}

/// All rates of one provider, by day.
#[derive(Debug, Clone)]
pub struct RateTable {
    reference: Currency,
    days: BTreeMap<NaiveDate, DayRates>,
}

impl RateTable {
    /// Create an empty table.
    pub fn new(reference: Currency) -> Self {
        Self {
            reference,
            days: BTreeMap::new(),
        }
    }

    /// Build a table from parsed feed rows.
    ///
    /// Rows quoting the reference currency itself are skipped, later rows
    /// for the same day and currency replace earlier ones.
    pub fn from_raw(
        reference: Currency,
        provider: &str,
        kind: RateKind,
        loaded_at: Option<DateTime<Utc>>,
        rows: &[RawRate],
    ) -> FxResult<Self> {
        let mut table = Self::new(reference);
        for row in rows {
            if row.currency == table.reference {
                continue;
            }
            let mut context = ConversionContext::new(provider, kind).with_date(row.date);
            if let Some(at) = loaded_at {
                context = context.with_timestamp(at);
            }
            let rate = ExchangeRate::builder()
                .base(table.reference.clone())
                .term(row.currency.clone())
                .factor(row.rate)
                .context(context)
                .build();
            match rate {
                Ok(rate) => table.insert(row.date, rate)?,
                Err(e) => {
                    warn!(
                        provider,
                        date = %row.date,
                        currency = %row.currency,
                        error = %e,
                        "Skipping invalid feed row"
                    );
                }
            }
        }
        Ok(table)
    }

    /// Add a `reference -> term` rate for `date`.
    pub fn insert(&mut self, date: NaiveDate, rate: ExchangeRate) -> FxResult<()> {
        if rate.base() != &self.reference {
            return Err(FxError::InvalidRate(format!(
                "table rates must have base {}, got {}",
                self.reference,
                rate.base()
            )));
        }
        self.days
            .entry(date)
            .or_default()
            .rates
            .insert(rate.term().clone(), rate);
        Ok(())
    }

    pub fn reference(&self) -> &Currency {
        &self.reference
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DayRates> {
        self.days.get(&date)
    }

    /// The `reference -> term` rate on `date`.
    pub fn rate(&self, date: NaiveDate, term: &Currency) -> Option<&ExchangeRate> {
        self.days.get(&date)?.get(term)
    }

    /// Most recent day with data.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.days.keys().next_back().copied()
    }

    /// Days with data, oldest first.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days.keys().copied()
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.days.contains_key(&date)
    }

    /// Number of days.
    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn row(d: u32, currency: &str, rate: rust_decimal::Decimal) -> RawRate {
        RawRate {
            date: day(d),
            currency: Currency::new(currency),
            rate,
        }
    }

    #[test]
    fn test_from_raw() {
        let rows = vec![
            row(2, "USD", dec!(1.10)),
            row(2, "GBP", dec!(0.85)),
            row(3, "USD", dec!(1.12)),
            row(3, "EUR", dec!(1)),
        ];

        let table = RateTable::from_raw(Currency::eur(), "ECB", RateKind::Historic, None, &rows).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.latest_date(), Some(day(3)));
        assert_eq!(table.rate(day(2), &Currency::gbp()).unwrap().factor(), dec!(0.85));
        assert_eq!(table.day(day(3)).unwrap().currencies(), vec![Currency::usd()]);
        assert_eq!(table.rate(day(2), &Currency::usd()).unwrap().context().date, Some(day(2)));
    }

    #[test]
    fn test_invalid_rows_are_skipped() {
        let rows = vec![row(2, "USD", dec!(0)), row(2, "GBP", dec!(0.85))];

        let table = RateTable::from_raw(Currency::eur(), "ECB", RateKind::Historic, None, &rows).unwrap();

        assert!(table.rate(day(2), &Currency::usd()).is_none());
        assert_eq!(table.day(day(2)).unwrap().len(), 1);
    }

    #[test]
    fn test_insert_checks_reference() {
        let mut table = RateTable::new(Currency::eur());
        let rate = ExchangeRate::builder()
            .base(Currency::usd())
            .term(Currency::gbp())
            .factor(dec!(0.78))
            .context(ConversionContext::new("ECB", RateKind::Historic))
            .build()
            .unwrap();

        assert!(matches!(table.insert(day(2), rate), Err(FxError::InvalidRate(_))));
        assert!(table.is_empty());
        assert_eq!(table.latest_date(), None);
    }
}
