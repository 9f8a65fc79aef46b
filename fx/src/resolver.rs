//! Rate resolution over a reference-anchored table.
//!
//! Every table rate is `reference -> X`. Any `base -> term` rate is found by
//! at most two lookups:
//!
//! 1. `ref -> ref`: identity
//! 2. `X -> ref`: reversal of `ref -> X`
//! 3. `ref -> X`: direct
//! 4. `X -> Y`: reversal of `ref -> X` followed by `ref -> Y`

use chrono::NaiveDate;
use ratefeed_common::{Currency, CurrencyPair};
use tracing::trace;

use crate::error::{FxError, FxResult};
use crate::query::RateQuery;
use crate::rate::{ConversionContext, ExchangeRate, RateKind};
use crate::table::{DayRates, RateTable};

/// Resolves queries against the tables of one provider.
#[derive(Debug, Clone)]
pub struct RateResolver {
    provider: String,
    kind: RateKind,
}

impl RateResolver {
    pub fn new(provider: impl Into<String>, kind: RateKind) -> Self {
        Self {
            provider: provider.into(),
            kind,
        }
    }

    /// Resolve `query` against `table`.
    pub fn resolve(&self, table: &RateTable, query: &RateQuery) -> FxResult<ExchangeRate> {
        let date = select_date(table, query)?;
        self.resolve_on(table, date, &query.base, &query.term)
    }

    /// Resolve `base -> term` using the rates of `date`.
    pub fn resolve_on(
        &self,
        table: &RateTable,
        date: NaiveDate,
        base: &Currency,
        term: &Currency,
    ) -> FxResult<ExchangeRate> {
        let reference = table.reference();
        let day = table
            .day(date)
            .ok_or_else(|| FxError::not_found(base, term, Some(date), Vec::new()))?;
        let context = ConversionContext::new(self.provider.clone(), self.kind).with_date(date);

        if base == term && (base == reference || day.contains(base)) {
            return Ok(ExchangeRate::identity(base, context));
        }
        if term == reference {
            if let Some(rate) = day.get(base) {
                return rate.reversed();
            }
        }
        if base == reference {
            if let Some(rate) = day.get(term) {
                return Ok(rate.clone());
            }
        }

        trace!(base = %base, term = %term, via = %reference, "Triangulating");
        triangulate(reference, day, date, base, term, context)
    }
}

/// Pick the date a query is answered for.
///
/// Without explicit dates the latest day wins. Otherwise the first listed
/// date the table has.
pub fn select_date(table: &RateTable, query: &RateQuery) -> FxResult<NaiveDate> {
    let dates = query.dates();
    if dates.is_empty() {
        return table
            .latest_date()
            .ok_or_else(|| FxError::not_found(&query.base, &query.term, None, Vec::new()));
    }

    dates
        .iter()
        .copied()
        .find(|date| table.contains_date(*date))
        .ok_or_else(|| FxError::not_found(&query.base, &query.term, dates.first().copied(), Vec::new()))
}

fn triangulate(
    reference: &Currency,
    day: &DayRates,
    date: NaiveDate,
    base: &Currency,
    term: &Currency,
    context: ConversionContext,
) -> FxResult<ExchangeRate> {
    let to_reference = day.get(base).map(|r| r.reversed()).transpose()?;
    let from_reference = day.get(term).cloned();

    let (first, second) = match (to_reference, from_reference) {
        (Some(first), Some(second)) if base != reference && term != reference => (first, second),
        _ => {
            return Err(FxError::not_found(
                base,
                term,
                Some(date),
                vec![
                    CurrencyPair::new(base.clone(), reference.clone()),
                    CurrencyPair::new(reference.clone(), term.clone()),
                ],
            ))
        }
    };

    let factor = first.factor().checked_mul(second.factor()).ok_or_else(|| {
        FxError::Arithmetic(format!("{} * {} overflows", first.factor(), second.factor()))
    })?;

    ExchangeRate::builder()
        .base(base.clone())
        .term(term.clone())
        .factor(factor)
        .context(context)
        .chain(vec![first, second])
        .build()
}
