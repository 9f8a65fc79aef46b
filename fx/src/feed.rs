//! Raw feed parsing.
//!
//! A feed is a list of `(date, currency, rate)` rows, each meaning
//! "one unit of the reference currency buys `rate` units of `currency`
//! on `date`".

use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use ratefeed_common::Currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FxError, FxResult};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One parsed feed row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRate {
    pub date: NaiveDate,
    pub currency: Currency,
    pub rate: Decimal,
}

/// Turns loaded bytes into feed rows.
pub trait FeedParser: Send + Sync {
    fn parse(&self, data: &[u8]) -> FxResult<Vec<RawRate>>;
}

/// Parser for delimited text with `date, currency, rate` columns.
///
/// Lines starting with `#` are comments. Rows whose rate is not a number
/// (feeds use `N/A` for holidays) are skipped.
#[derive(Debug, Clone)]
pub struct DelimitedFeedParser {
    delimiter: u8,
    has_headers: bool,
}

impl DelimitedFeedParser {
    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            has_headers: false,
        }
    }

    pub fn csv() -> Self {
        Self {
            delimiter: b',',
            has_headers: false,
        }
    }

    /// Skip the first row.
    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }
}

impl Default for DelimitedFeedParser {
    fn default() -> Self {
        Self::tsv()
    }
}

impl FeedParser for DelimitedFeedParser {
    fn parse(&self, data: &[u8]) -> FxResult<Vec<RawRate>> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_headers)
            .comment(Some(b'#'))
            .trim(Trim::All)
            .flexible(true)
            .from_reader(data);

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| FxError::Feed(e.to_string()))?;
            let line = index + 1;
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }
            if record.len() < 3 {
                return Err(FxError::Feed(format!(
                    "row {}: expected 3 columns, got {}",
                    line,
                    record.len()
                )));
            }

            let date = parse_date(&record[0], line)?;
            let currency = Currency::parse(&record[1])
                .map_err(|e| FxError::Feed(format!("row {}: {}", line, e)))?;
            let rate = match record[2].parse::<Decimal>() {
                Ok(rate) => rate,
                Err(_) => {
                    warn!(row = line, value = &record[2], "Skipping row without a rate");
                    continue;
                }
            };

            rows.push(RawRate { date, currency, rate });
        }

        debug!(rows = rows.len(), "Parsed delimited feed");
        Ok(rows)
    }
}

/// Parser for a JSON array of `{"date", "currency", "rate"}` objects.
#[derive(Debug, Clone, Default)]
pub struct JsonFeedParser;

impl FeedParser for JsonFeedParser {
    fn parse(&self, data: &[u8]) -> FxResult<Vec<RawRate>> {
        let parsed: Vec<RawRate> =
            serde_json::from_slice(data).map_err(|e| FxError::Feed(e.to_string()))?;

        let rows = parsed
            .into_iter()
            .enumerate()
            .map(|(index, mut row)| {
                row.currency = Currency::parse(row.currency.code())
                    .map_err(|e| FxError::Feed(format!("row {}: {}", index + 1, e)))?;
                Ok(row)
            })
            .collect::<FxResult<Vec<_>>>()?;

        debug!(rows = rows.len(), "Parsed JSON feed");
        Ok(rows)
    }
}

fn parse_date(value: &str, line: usize) -> FxResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| FxError::Feed(format!("row {}: bad date {:?}: {}", line, value, e)))
}
