//! Ratefeed CLI
//!
//! Resolves an exchange rate, or converts an amount, over one or more feeds.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::Parser;
use ratefeed_common::{Currency, Money};
use ratefeed_fx::{FeedProviderConfig, FxEngine, IdentityRateProvider, RateKind, RateQuery};
use ratefeed_loader::{LoaderConfig, LoaderRegistry, Schedule, UpdatePolicy};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod feeds;
mod report;

use feeds::FeedArg;
use report::OutputFormat;

/// Ratefeed CLI
#[derive(Parser, Debug)]
#[command(name = "ratefeed")]
#[command(about = "Resolve exchange rates from reference-anchored feeds")]
struct Args {
    /// Base currency
    base: String,

    /// Term currency
    term: String,

    /// Feed as NAME[@REF]=FALLBACK[,REMOTE...]; feeds are tried in order
    #[arg(short, long = "feed", required = true)]
    feeds: Vec<FeedArg>,

    /// Amount of base currency to convert
    #[arg(short, long)]
    amount: Option<String>,

    /// Value date (YYYY-MM-DD)
    #[arg(short, long)]
    date: Option<NaiveDate>,

    /// Also try up to this many days before --date
    #[arg(long, default_value = "0")]
    lookback: u32,

    /// Only consult these providers, in this order
    #[arg(short, long = "provider")]
    providers: Vec<String>,

    /// Stop at the first provider failure
    #[arg(long)]
    fail_fast: bool,

    /// Default reference currency of the feeds
    #[arg(long, default_value = "EUR")]
    reference: String,

    /// Feed update policy (never, onstartup, scheduled, lazy)
    #[arg(long, default_value = "onstartup")]
    policy: UpdatePolicy,

    /// Reload period of scheduled feeds (HH[:MM[:SS[:mmm]]])
    #[arg(long)]
    period: Option<String>,

    /// Delay before the first periodic reload (HH[:MM[:SS[:mmm]]])
    #[arg(long)]
    delay: Option<String>,

    /// Daily reload times of scheduled feeds, comma separated, UTC
    #[arg(long)]
    at: Option<String>,

    /// Kind stamped on the rates
    #[arg(long, default_value = "historic")]
    kind: RateKind,

    /// Disk cache directory for downloaded feeds
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Seconds to wait for the first feed data
    #[arg(long)]
    timeout: Option<u64>,

    /// Resolve same-currency queries even when no feed lists the currency
    #[arg(long)]
    identity: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Log as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    /// Resource properties for the schedule arguments.
    fn schedule_properties(&self) -> anyhow::Result<HashMap<String, String>> {
        let properties: HashMap<String, String> = [
            ("period", &self.period),
            ("delay", &self.delay),
            ("at", &self.at),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.clone().map(|v| (key.to_string(), v)))
        .collect();

        if self.policy != UpdatePolicy::Scheduled {
            if !properties.is_empty() {
                bail!("--period, --delay and --at need --policy scheduled");
            }
            return Ok(properties);
        }
        if self.period.is_none() && self.at.is_none() {
            bail!("--policy scheduled needs --period or --at");
        }
        Schedule::from_properties(&properties)?;
        Ok(properties)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the result.
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let mut config = LoaderConfig::from_env();
    if let Some(dir) = &args.cache_dir {
        config = config.with_cache_dir(dir);
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let schedule = args.schedule_properties()?;

    let registry = Arc::new(LoaderRegistry::new(config)?);
    let mut engine = FxEngine::new(registry);
    let reference = Currency::parse(&args.reference)?;

    for feed in &args.feeds {
        let mut provider = FeedProviderConfig::new(
            feed.name.clone(),
            feed.name.clone(),
            feed.reference.clone().unwrap_or_else(|| reference.clone()),
        )
        .from_env()
        .with_kind(args.kind);
        if let Some(secs) = args.timeout {
            provider = provider.with_first_load_timeout(Duration::from_secs(secs));
        }
        provider
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid feed {}: {}", feed.name, e))?;

        engine
            .add_feed(feed.resource_spec(args.policy, &schedule), provider, feed.format().parser())
            .await
            .with_context(|| format!("cannot add feed {}", feed.name))?;
    }
    if args.identity {
        engine.add_provider(Arc::new(IdentityRateProvider::new()));
    }

    info!(providers = ?engine.provider_names(), "Feeds ready");

    let result = run(&engine, &args).await;

    engine.shutdown().await;
    let rendered = result?;
    println!("{}", rendered);

    Ok(())
}

async fn run(engine: &FxEngine, args: &Args) -> anyhow::Result<String> {
    let base = Currency::parse(&args.base)?;
    let term = Currency::parse(&args.term)?;

    let mut query = RateQuery::new(base.clone(), term).fail_fast(args.fail_fast);
    match args.date {
        Some(date) => query = query.as_of(date).with_lookback(args.lookback),
        None if args.lookback > 0 => warn!("--lookback has no effect without --date"),
        None => {}
    }
    for name in &args.providers {
        query = query.with_provider(name.clone());
    }

    match &args.amount {
        Some(amount) => {
            let amount = Money::parse(amount, base)?;
            let conversion = engine.convert(&amount, &query).await?;
            report::render_conversion(&conversion, args.output)
        }
        None => {
            let rate = engine.get_rate(&query).await?;
            report::render_rate(&rate, args.output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let args = Args::try_parse_from([
            "ratefeed",
            "usd",
            "gbp",
            "--feed",
            "ECB=file:///data/ecb.tsv",
            "--feed",
            "IMF@USD=file:///data/imf.json",
            "--date",
            "2024-01-03",
            "--lookback",
            "3",
            "--policy",
            "lazy",
            "--output",
            "json",
        ])
        .unwrap();

        assert_eq!(args.feeds.len(), 2);
        assert_eq!(args.feeds[1].reference, Some(Currency::usd()));
        assert_eq!(args.date, NaiveDate::from_ymd_opt(2024, 1, 3));
        assert_eq!(args.policy, UpdatePolicy::Lazy);
        assert_eq!(args.kind, RateKind::Historic);
        assert_eq!(args.output, OutputFormat::Json);
    }

    #[test]
    fn test_schedule_arguments() {
        let parse = |extra: &[&str]| {
            let mut argv = vec!["ratefeed", "EUR", "USD", "--feed", "ECB=file:///data/ecb.tsv"];
            argv.extend_from_slice(extra);
            Args::try_parse_from(argv).unwrap()
        };

        let scheduled = parse(&["--policy", "scheduled", "--period", "01:30", "--at", "16:00"]);
        let properties = scheduled.schedule_properties().unwrap();
        assert_eq!(properties.get("period").map(String::as_str), Some("01:30"));
        assert_eq!(properties.get("at").map(String::as_str), Some("16:00"));
        assert!(!properties.contains_key("delay"));

        assert!(parse(&["--policy", "scheduled"]).schedule_properties().is_err());
        assert!(parse(&["--policy", "scheduled", "--period", "soon"]).schedule_properties().is_err());
        assert!(parse(&["--period", "01"]).schedule_properties().is_err());
        assert!(parse(&[]).schedule_properties().unwrap().is_empty());
    }

    #[test]
    fn test_feed_required() {
        assert!(Args::try_parse_from(["ratefeed", "USD", "GBP"]).is_err());
    }
}
