//! Ratefeed FX Engine
//!
//! Exchange rate resolution over reference-anchored feeds.
//!
//! # Features
//!
//! - Direct, reversed and triangulated rates with their derivation chain
//! - Feed-backed providers kept fresh by the resource loader
//! - Failover chains of named providers, optionally fail-fast
//! - Historic lookups with candidate dates
//!
//! # Example
//!
//! ```rust,ignore
//! use ratefeed_fx::{FxEngine, FeedProviderConfig, DelimitedFeedParser, RateQuery};
//! use ratefeed_common::{Currency, Money};
//!
//! let mut engine = FxEngine::new(registry);
//! engine.add_feed(spec, FeedProviderConfig::new("ECB", "ECB", Currency::eur()),
//!     Arc::new(DelimitedFeedParser::tsv())).await?;
//!
//! let rate = engine.get_rate(&RateQuery::new(Currency::usd(), Currency::gbp())).await?;
//! let gbp = engine.convert(&Money::new(dec!(100), Currency::usd()), &query).await?;
//! ```

pub mod compound;
pub mod config;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod feed;
pub mod feed_provider;
pub mod provider;
pub mod query;
pub mod rate;
pub mod resolver;
pub mod table;

pub use compound::CompoundRateProvider;
pub use config::FeedProviderConfig;
pub use conversion::Conversion;
pub use engine::FxEngine;
pub use error::{FxError, FxResult, ProviderFailure};
pub use feed::{DelimitedFeedParser, FeedParser, JsonFeedParser, RawRate};
pub use feed_provider::{FeedRateProvider, RateSnapshot};
pub use provider::{IdentityRateProvider, RateProvider};
pub use query::RateQuery;
pub use rate::{ConversionContext, ExchangeRate, ExchangeRateBuilder, RateKind};
pub use resolver::RateResolver;
pub use table::{DayRates, RateTable};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
