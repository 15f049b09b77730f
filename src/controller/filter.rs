use crate::config::Config;
use crate::types::Market;

/// Decides which open markets are worth analysing.
///
/// A market is a target when any keyword occurs (case-insensitively) in its
/// title, series ticker, category or subtitle, or when its series ticker
/// starts with one of the configured series prefixes.
#[derive(Debug, Clone)]
pub struct TargetFilter {
    keywords: Vec<String>,
    series: Vec<String>,
}

impl TargetFilter {
    pub fn new<K, S>(keywords: K, series: S) -> Self
    where
        K: IntoIterator,
        K::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        Self {
            keywords: keywords.into_iter().map(|k| k.as_ref().to_lowercase()).collect(),
            series: series.into_iter().map(|s| s.as_ref().to_lowercase()).collect(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(&cfg.target_keywords, &cfg.target_series)
    }

    pub fn is_target(&self, market: &Market) -> bool {
        let series = market.series_ticker.to_lowercase();
        if self.series.iter().any(|prefix| series.starts_with(prefix.as_str())) {
            return true;
        }

        let fields = [
            market.title.to_lowercase(),
            series,
            market.category.to_lowercase(),
            market.subtitle.to_lowercase(),
        ];
        self.keywords
            .iter()
            .any(|kw| fields.iter().any(|field| field.contains(kw.as_str())))
    }

    pub fn select<'a>(&self, markets: &'a [Market]) -> Vec<&'a Market> {
        markets.iter().filter(|m| self.is_target(m)).collect()
    }
}
