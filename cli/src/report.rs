//! Rendering of query results.

use std::fmt::Write;

use clap::ValueEnum;
use ratefeed_fx::{Conversion, ExchangeRate};
use serde_json::json;

/// Output format of the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Render a resolved rate.
pub fn render_rate(rate: &ExchangeRate, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Text => Ok(rate_text(rate)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(rate)?),
    }
}

/// Render a conversion together with the rate behind it.
pub fn render_conversion(conversion: &Conversion, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Text => Ok(format!(
            "{} {} = {} {}\n{}",
            conversion.input.value,
            conversion.input.currency,
            conversion.output.value,
            conversion.output.currency,
            rate_text(&conversion.rate)
        )),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({
            "input": conversion.input,
            "output": conversion.output,
            "effective_rate": conversion.effective_rate(),
            "rate": conversion.rate,
            "executed_at": conversion.executed_at,
        }))?),
    }
}

fn rate_text(rate: &ExchangeRate) -> String {
    let context = rate.context();
    let mut out = format!("{} {} {} {}", rate.pair(), rate.factor(), context.provider, context.kind);
    if let Some(date) = context.date {
        let _ = write!(out, " {}", date);
    }
    for leg in rate.legs() {
        let _ = write!(out, "\n  via {} {}", leg.pair(), leg.factor());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ratefeed_common::{Currency, Money};
    use ratefeed_fx::{ConversionContext, RateKind};
    use rust_decimal_macros::dec;

    fn context() -> ConversionContext {
        ConversionContext::new("ECB", RateKind::Historic)
            .with_date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
    }

    fn leg(base: Currency, term: Currency, factor: rust_decimal::Decimal) -> ExchangeRate {
        ExchangeRate::builder()
            .base(base)
            .term(term)
            .factor(factor)
            .context(context())
            .build()
            .unwrap()
    }

    #[test]
    fn test_direct_rate_text() {
        let rate = leg(Currency::eur(), Currency::usd(), dec!(1.10));

        let text = render_rate(&rate, OutputFormat::Text).unwrap();

        assert_eq!(text, "EUR/USD 1.10 ECB HISTORIC 2024-01-02");
    }

    #[test]
    fn test_derived_rate_text_lists_legs() {
        let rate = ExchangeRate::builder()
            .base(Currency::usd())
            .term(Currency::gbp())
            .factor(dec!(0.75))
            .context(context())
            .chain(vec![
                leg(Currency::usd(), Currency::eur(), dec!(0.9)),
                leg(Currency::eur(), Currency::gbp(), dec!(0.8333)),
            ])
            .build()
            .unwrap();

        let text = render_rate(&rate, OutputFormat::Text).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "  via USD/EUR 0.9");
        assert_eq!(lines[2], "  via EUR/GBP 0.8333");
    }

    #[test]
    fn test_conversion_json() {
        let conversion = Conversion::execute(
            Money::new(dec!(100), Currency::eur()),
            leg(Currency::eur(), Currency::usd(), dec!(1.10)),
        )
        .unwrap();

        let rendered = render_conversion(&conversion, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

        assert!(value.get("output").is_some());
        assert!(value.get("rate").is_some());
        assert!(value.get("effective_rate").is_some());
    }
}
