//! Feed registration through rate resolution, over real file and HTTP fetches.

use std::sync::Arc;

use chrono::NaiveDate;
use ratefeed_common::{Currency, Money};
use ratefeed_fx::{DelimitedFeedParser, FeedProviderConfig, FxEngine, FxError, RateQuery};
use ratefeed_loader::{DataOrigin, LoaderConfig, LoaderRegistry, ResourceSpec, UpdatePolicy};
use rust_decimal_macros::dec;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUNDLED: &str = "2024-01-02\tUSD\t1.10\n2024-01-02\tGBP\t0.85\n";
const REMOTE: &str = "2024-01-02\tUSD\t1.10\n2024-01-02\tGBP\t0.85\n2024-01-03\tUSD\t1.20\n2024-01-03\tGBP\t0.80\n";

fn bundled_file(dir: &tempfile::TempDir) -> Url {
    let path = dir.path().join("ecb.tsv");
    std::fs::write(&path, BUNDLED).unwrap();
    Url::from_file_path(path).unwrap()
}

async fn remote(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ecb.tsv"))
        .respond_with(ResponseTemplate::new(status).set_body_string(REMOTE))
        .mount(&server)
        .await;
    server
}

async fn engine(config: LoaderConfig, fallback: Url, server: &MockServer) -> FxEngine {
    let registry = Arc::new(LoaderRegistry::new(config).unwrap());
    let mut engine = FxEngine::new(registry);
    let spec = ResourceSpec::new("ECB", fallback)
        .with_remote(Url::parse(&format!("{}/ecb.tsv", server.uri())).unwrap())
        .with_policy(UpdatePolicy::OnStartup);

    engine
        .add_feed(
            spec,
            FeedProviderConfig::new("ECB", "ECB", Currency::eur()),
            Arc::new(DelimitedFeedParser::tsv()),
        )
        .await
        .unwrap();
    engine
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

#[tokio::test]
async fn test_unreachable_remote_falls_back_to_bundled_data() {
    let dir = tempfile::tempdir().unwrap();
    let server = remote(503).await;
    let engine = engine(LoaderConfig::default(), bundled_file(&dir), &server).await;

    let rate = engine
        .get_rate(&RateQuery::new(Currency::usd(), Currency::gbp()).as_of(day(2)))
        .await
        .unwrap();

    assert!(rate.is_derived());
    let chain = rate.chain();
    assert_eq!(chain[0].base(), &Currency::usd());
    assert_eq!(chain[1].term(), &Currency::gbp());
    assert!((rate.factor() - dec!(0.7727272727)).abs() < dec!(0.0000000001));

    let resource = engine.registry().resource("ECB").unwrap();
    assert_eq!(resource.load_count(), 0);
    assert!(matches!(
        engine.get_rate(&RateQuery::new(Currency::usd(), Currency::gbp()).as_of(day(3))).await,
        Err(FxError::CurrencyConversion { .. })
    ));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_remote_data_and_disk_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    let fallback = bundled_file(&dir);

    let online = remote(200).await;
    let first = engine(LoaderConfig::default().with_cache_dir(&cache_dir), fallback.clone(), &online).await;
    let latest = first
        .get_rate(&RateQuery::new(Currency::eur(), Currency::usd()))
        .await
        .unwrap();
    tokio_test::assert_ok!(first.registry().get_data("ECB").await);
    first.shutdown().await;

    // Latest day only exists remotely, so this proves the remote load won.
    assert_eq!(latest.factor(), dec!(1.20));

    let offline = remote(503).await;
    let second = engine(LoaderConfig::default().with_cache_dir(&cache_dir), fallback, &offline).await;
    let amount = Money::new(dec!(100), Currency::eur());
    let conversion = second
        .convert(&amount, &RateQuery::new(Currency::eur(), Currency::gbp()))
        .await
        .unwrap();

    assert_eq!(conversion.output, Money::new(dec!(80), Currency::gbp()));
    assert_eq!(second.feeds()[0].snapshot().unwrap().origin, DataOrigin::Cache);
    second.shutdown().await;
}
