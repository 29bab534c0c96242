use crate::config::HistorySettings;
use crate::error::ScreenerError;
use crate::models::{ReferenceBook, ReferenceLevels};
use chrono::NaiveDate;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;

type HistoryRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Source of prior-session high/low levels
pub trait ReferenceSource: Send + Sync {
    /// Levels for the session before `session`; `Ok(None)` when the source has no data
    fn prior_session(
        &self,
        instrument: &str,
        session: NaiveDate,
    ) -> impl Future<Output = crate::Result<Option<ReferenceLevels>>> + Send;
}

/// Response from /data/history
#[derive(Debug, Deserialize)]
struct HistoryResponse {
    s: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    candles: Option<Vec<Vec<f64>>>, // [epoch, open, high, low, close, volume]
}

/// Daily-candle client for the broker's historical-data endpoint
///
/// Cloneable; clones share the rate limiter. Requests are not retried.
#[derive(Clone)]
pub struct HistoryClient {
    client: Client,
    base_url: String,
    exchange: String,
    authorization: String,
    rate_limiter: Arc<HistoryRateLimiter>,
}

impl HistoryClient {
    pub fn new(
        settings: &HistorySettings,
        exchange: &str,
        client_id: &str,
        access_token: &str,
    ) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()?;

        let rps = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            exchange: exchange.to_string(),
            authorization: format!("{}:{}", client_id, access_token),
            rate_limiter,
        })
    }

    /// Fetch the daily candle for `day` and return its high/low
    pub async fn daily_levels(
        &self,
        instrument: &str,
        day: NaiveDate,
    ) -> crate::Result<Option<ReferenceLevels>> {
        self.rate_limiter.until_ready().await;

        let symbol = format!("{}:{}", self.exchange, instrument);
        let day = day.format("%Y-%m-%d").to_string();
        let url = format!("{}/data/history", self.base_url);

        tracing::debug!("Fetching daily candle for {} on {}", symbol, day);

        let response = self
            .client
            .get(&url)
            .header("Authorization", &self.authorization)
            .query(&[
                ("symbol", symbol.as_str()),
                ("resolution", "D"),
                ("date_format", "1"),
                ("range_from", day.as_str()),
                ("range_to", day.as_str()),
                ("cont_flag", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ScreenerError::HistoryApi {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let data: HistoryResponse = response.json().await?;
        if data.s != "ok" {
            return Err(ScreenerError::HistoryApi {
                status: status.as_u16(),
                body: data.message.unwrap_or(data.s),
            }
            .into());
        }

        let levels = data
            .candles
            .unwrap_or_default()
            .first()
            .filter(|candle| candle.len() >= 4)
            .map(|candle| ReferenceLevels {
                high: candle[2],
                low: candle[3],
            });

        Ok(levels)
    }
}

impl ReferenceSource for HistoryClient {
    async fn prior_session(
        &self,
        instrument: &str,
        session: NaiveDate,
    ) -> crate::Result<Option<ReferenceLevels>> {
        // Literal previous calendar day; weekends and holidays come back empty
        let Some(previous) = session.pred_opt() else {
            return Ok(None);
        };
        self.daily_levels(instrument, previous).await
    }
}

/// Levels supplied up front, e.g. from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticReferenceSource {
    levels: ReferenceBook,
}

impl StaticReferenceSource {
    pub fn new(levels: ReferenceBook) -> Self {
        Self { levels }
    }
}

impl ReferenceSource for StaticReferenceSource {
    async fn prior_session(
        &self,
        instrument: &str,
        _session: NaiveDate,
    ) -> crate::Result<Option<ReferenceLevels>> {
        Ok(self.levels.get(instrument).copied())
    }
}

/// Query every instrument once and collect the levels that came back
///
/// Failures are logged and leave the instrument absent from the book.
pub async fn load_reference_levels<S: ReferenceSource>(
    source: &S,
    universe: &[String],
    session: NaiveDate,
) -> ReferenceBook {
    let mut book = ReferenceBook::new();

    for instrument in universe {
        match source.prior_session(instrument, session).await {
            Ok(Some(levels)) => {
                book.insert(instrument.clone(), levels);
            }
            Ok(None) => {
                tracing::warn!("⚠️  No prior-session data for {}", instrument);
            }
            Err(e) => {
                tracing::warn!("⚠️  Failed to load reference levels for {}: {}", instrument, e);
            }
        }
    }

    tracing::info!(
        "📚 Loaded reference levels for {}/{} instruments",
        book.len(),
        universe.len()
    );

    book
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn create_test_client(base_url: &str) -> HistoryClient {
        let settings = HistorySettings {
            base_url: base_url.to_string(),
            requests_per_second: 100,
            timeout_secs: 5,
        };
        HistoryClient::new(&settings, "NSE", "client", "token").unwrap()
    }

    fn session() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 7).unwrap()
    }

    #[tokio::test]
    async fn test_prior_session_levels() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/data/history")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "NSE:SBIN-EQ".into()),
                Matcher::UrlEncoded("resolution".into(), "D".into()),
                Matcher::UrlEncoded("date_format".into(), "1".into()),
                Matcher::UrlEncoded("range_from".into(), "2025-01-06".into()),
                Matcher::UrlEncoded("range_to".into(), "2025-01-06".into()),
                Matcher::UrlEncoded("cont_flag".into(), "1".into()),
            ]))
            .match_header("authorization", "client:token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"s":"ok","candles":[[1736121600,790.0,812.5,785.25,805.0,1200000]]}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let levels = client.prior_session("SBIN-EQ", session()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            levels,
            Some(ReferenceLevels {
                high: 812.5,
                low: 785.25
            })
        );
    }

    #[tokio::test]
    async fn test_empty_candles_is_absent() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/data/history")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"s":"no_data","candles":[]}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        // Non-ok status string is an API error
        assert!(client.prior_session("SBIN-EQ", session()).await.is_err());

        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/data/history")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"s":"ok","candles":[]}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        assert_eq!(client.prior_session("SBIN-EQ", session()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_http_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/data/history")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("upstream down")
            .expect(1)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let err = client.prior_session("SBIN-EQ", session()).await.unwrap_err();

        mock.assert_async().await;
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("upstream down"));
    }

    #[tokio::test]
    async fn test_load_reference_levels_isolates_failures() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/data/history")
            .match_query(Matcher::UrlEncoded("symbol".into(), "NSE:TCS-EQ".into()))
            .with_status(200)
            .with_body(r#"{"s":"ok","candles":[[1736121600,4000,4100,3950,4050,10]]}"#)
            .create_async()
            .await;
        let _fail = server
            .mock("GET", "/data/history")
            .match_query(Matcher::UrlEncoded("symbol".into(), "NSE:INFY-EQ".into()))
            .with_status(401)
            .with_body(r#"{"s":"error","message":"invalid token"}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let universe = vec!["TCS-EQ".to_string(), "INFY-EQ".to_string()];
        let book = load_reference_levels(&client, &universe, session()).await;

        assert_eq!(book.len(), 1);
        assert_eq!(book["TCS-EQ"].high, 4100.0);
        assert!(!book.contains_key("INFY-EQ"));
    }

    #[test]
    fn test_static_source() {
        let source = StaticReferenceSource::new(ReferenceBook::from([(
            "SBIN-EQ".to_string(),
            ReferenceLevels {
                high: 810.0,
                low: 795.0,
            },
        )]));
        let universe = vec!["SBIN-EQ".to_string(), "TCS-EQ".to_string()];

        let book = tokio_test::block_on(load_reference_levels(&source, &universe, session()));

        assert_eq!(book.len(), 1);
        assert_eq!(book["SBIN-EQ"].low, 795.0);
    }
}
