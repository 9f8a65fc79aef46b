//! Rate queries.

use chrono::{Days, NaiveDate};
use ratefeed_common::{Currency, CurrencyPair};
use serde::{Deserialize, Serialize};

/// A request for the `base -> term` rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuery {
    pub base: Currency,
    pub term: Currency,
    /// Preferred value date. `None` with no candidates means latest.
    pub as_of: Option<NaiveDate>,
    /// Dates tried in order after `as_of`.
    pub candidate_dates: Vec<NaiveDate>,
    /// Provider names to consult, in order. Empty means all.
    pub providers: Vec<String>,
    /// Stop at the first provider failure.
    pub fail_fast: bool,
}

impl RateQuery {
    pub fn new(base: Currency, term: Currency) -> Self {
        Self {
            base,
            term,
            as_of: None,
            candidate_dates: Vec::new(),
            providers: Vec::new(),
            fail_fast: false,
        }
    }

    /// Query for a currency pair.
    pub fn for_pair(pair: &CurrencyPair) -> Self {
        Self::new(pair.base.clone(), pair.term.clone())
    }

    pub fn as_of(mut self, date: NaiveDate) -> Self {
        self.as_of = Some(date);
        self
    }

    pub fn with_candidates(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.candidate_dates.extend(dates);
        self
    }

    /// Also try the `days` calendar days before `as_of`, nearest first.
    ///
    /// Without `as_of` this has no effect: the latest date is used anyway.
    pub fn with_lookback(mut self, days: u32) -> Self {
        if let Some(start) = self.as_of {
            let earlier = (1..=u64::from(days)).filter_map(|n| start.checked_sub_days(Days::new(n)));
            self.candidate_dates.extend(earlier);
        }
        self
    }

    pub fn with_provider(mut self, name: impl Into<String>) -> Self {
        self.providers.push(name.into());
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.base.clone(), self.term.clone())
    }

    /// Dates to try, in order. Empty means "latest available".
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.as_of
            .iter()
            .copied()
            .chain(self.candidate_dates.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_dates_order() {
        let query = RateQuery::new(Currency::usd(), Currency::gbp())
            .as_of(day(7))
            .with_candidates([day(5), day(6)]);

        assert_eq!(query.dates(), vec![day(7), day(5), day(6)]);
    }

    #[test]
    fn test_lookback() {
        let query = RateQuery::new(Currency::usd(), Currency::gbp())
            .as_of(day(7))
            .with_lookback(3);

        assert_eq!(query.dates(), vec![day(7), day(6), day(5), day(4)]);
    }

    #[test]
    fn test_lookback_without_date() {
        let query = RateQuery::new(Currency::usd(), Currency::gbp()).with_lookback(3);

        assert!(query.dates().is_empty());
    }

    #[test]
    fn test_builder() {
        let query = RateQuery::new(Currency::usd(), Currency::gbp())
            .with_provider("ECB")
            .with_provider("IMF")
            .fail_fast(true);

        assert_eq!(query.providers, vec!["ECB", "IMF"]);
        assert!(query.fail_fast);
        assert_eq!(query.pair().to_string(), "USD/GBP");
    }
}
