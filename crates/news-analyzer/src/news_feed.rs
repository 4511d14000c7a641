use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// A single news item as returned by the external feed.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub external_id: String,
    pub headline: String,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct FinnhubNewsItem {
    id: i64,
    headline: String,
    summary: Option<String>,
    url: Option<String>,
    datetime: i64,
}

/// Fetches the newest general-category news items from Finnhub's
/// `/news` endpoint.
pub struct NewsFeedClient {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl NewsFeedClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("building http client"),
            api_key,
        }
    }

    pub async fn fetch_latest(&self, limit: usize) -> anyhow::Result<Vec<FeedItem>> {
        let Some(api_key) = &self.api_key else {
            anyhow::bail!("FINNHUB_API_KEY not configured, cannot fetch news");
        };

        let url = format!("https://finnhub.io/api/v1/news?category=general&token={api_key}");
        let items: Vec<FinnhubNewsItem> = self.client.get(&url).send().await?.json().await?;

        Ok(items
            .into_iter()
            .take(limit)
            .filter_map(|item| {
                let published_at = Utc.timestamp_opt(item.datetime, 0).single()?;
                Some(FeedItem {
                    external_id: item.id.to_string(),
                    headline: item.headline,
                    summary: item.summary.filter(|s| !s.is_empty()),
                    url: item.url,
                    published_at,
                })
            })
            .collect())
    }
}
