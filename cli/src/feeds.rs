//! Feed arguments.
//!
//! A feed is given as `NAME[@REF]=FALLBACK[,REMOTE...]`. Locations are URLs
//! or local paths; the feed format follows the fallback's extension.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use ratefeed_common::Currency;
use ratefeed_fx::{DelimitedFeedParser, FeedParser, JsonFeedParser};
use ratefeed_loader::{ResourceSpec, UpdatePolicy};
use url::Url;

/// Raw feed payload format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Tsv,
    Csv,
    Json,
}

impl FeedFormat {
    /// Guess the format from a location's extension; TSV by default.
    pub fn detect(location: &Url) -> Self {
        let path = location.path().to_ascii_lowercase();
        if path.ends_with(".json") {
            FeedFormat::Json
        } else if path.ends_with(".csv") {
            FeedFormat::Csv
        } else {
            FeedFormat::Tsv
        }
    }

    pub fn parser(&self) -> Arc<dyn FeedParser> {
        match self {
            FeedFormat::Tsv => Arc::new(DelimitedFeedParser::tsv()),
            FeedFormat::Csv => Arc::new(DelimitedFeedParser::csv()),
            FeedFormat::Json => Arc::new(JsonFeedParser),
        }
    }
}

/// One `--feed` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedArg {
    pub name: String,
    /// Overrides `--reference` for this feed.
    pub reference: Option<Currency>,
    pub fallback: Url,
    pub remotes: Vec<Url>,
}

impl FeedArg {
    pub fn format(&self) -> FeedFormat {
        FeedFormat::detect(&self.fallback)
    }

    /// Resource registration for this feed.
    pub fn resource_spec(&self, policy: UpdatePolicy, properties: &HashMap<String, String>) -> ResourceSpec {
        let spec = properties.iter().fold(
            ResourceSpec::new(self.name.clone(), self.fallback.clone()).with_policy(policy),
            |spec, (key, value)| spec.with_property(key.clone(), value.clone()),
        );
        self.remotes
            .iter()
            .cloned()
            .fold(spec, |spec, remote| spec.with_remote(remote))
    }
}

impl FromStr for FeedArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, locations) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected NAME[@REF]=FALLBACK[,REMOTE...], got {:?}", s))?;

        let (name, reference) = match head.split_once('@') {
            Some((name, reference)) => (name, Some(Currency::parse(reference)?)),
            None => (head, None),
        };
        let name = name.trim();
        if name.is_empty() {
            bail!("feed name is empty in {:?}", s);
        }

        let mut locations = locations.split(',').map(str::trim).filter(|l| !l.is_empty());
        let fallback = locations
            .next()
            .ok_or_else(|| anyhow!("feed {} has no fallback location", name))
            .and_then(parse_location)?;
        let remotes = locations.map(parse_location).collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            reference,
            fallback,
            remotes,
        })
    }
}

/// Parse a URL, or a local path turned into a `file` URL.
pub fn parse_location(value: &str) -> anyhow::Result<Url> {
    if let Ok(url) = Url::parse(value) {
        // Single letter schemes are drive letters.
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }

    let path = Path::new(value);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot resolve relative feed path")?
            .join(path)
    };
    Url::from_file_path(&absolute).map_err(|_| anyhow!("invalid feed path {:?}", value))
}
