mod models;

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::Serialize;

pub use self::models::{Estimate, ForecastPeriod, Site, Usage};
use self::models::{ForecastsResponse, SitesResponse};
use crate::prelude::*;

/// Solcast hobbyist API client.
///
/// API docs: <https://docs.solcast.com.au/#rooftop-sites>.
pub struct Api {
    client: Client,
    host: Url,
}

impl Api {
    pub fn new(host: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("solcast-coordinator/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, host })
    }

    /// Fetch the rooftop sites registered under the API key.
    #[instrument(skip_all)]
    pub async fn get_sites(&self, api_key: &str) -> Result<Vec<Site>> {
        #[derive(Serialize)]
        struct Query<'a> {
            format: &'static str,
            api_key: &'a str,
        }

        info!("fetching the rooftop sites…");
        let response = self
            .client
            .get(self.url(&["rooftop_sites"])?)
            .query(&Query { format: "json", api_key })
            .send()
            .await
            .context("failed to request the rooftop sites")?;
        let status = response.status();
        ensure!(status == StatusCode::OK, "HTTP {status} while gathering the rooftop sites");
        let sites = response.json::<SitesResponse>().await?.sites;
        info!(n_sites = sites.len(), "fetched");
        Ok(sites.into_iter().map(|site| site.with_api_key(api_key)).collect())
    }

    /// Fetch the daily API allowance and how much of it is consumed.
    #[instrument(skip_all)]
    pub async fn get_usage(&self, api_key: &str) -> Result<Usage> {
        #[derive(Serialize)]
        struct Query<'a> {
            api_key: &'a str,
        }

        debug!("fetching the API usage…");
        let response = self
            .client
            .get(self.url(&["json", "reply", "GetUserUsageAllowance"])?)
            .query(&Query { api_key })
            .send()
            .await
            .context("failed to request the API usage")?;
        let status = response.status();
        ensure!(status == StatusCode::OK, "HTTP {status} while gathering the API usage");
        response.json().await.context("failed to deserialize the API usage")
    }

    #[instrument(skip_all, fields(site_id = site_id, hours = hours))]
    pub async fn get_forecasts(
        &self,
        site_id: &str,
        api_key: &str,
        hours: u32,
    ) -> Result<Vec<ForecastPeriod>> {
        #[derive(Serialize)]
        struct Query<'a> {
            format: &'static str,
            api_key: &'a str,
            hours: u32,
        }

        info!("fetching the forecasts…");
        let response = self
            .client
            .get(self.url(&["rooftop_sites", site_id, "forecasts"])?)
            .query(&Query { format: "json", api_key, hours })
            .send()
            .await
            .context("failed to request the forecasts")?;
        match response.status() {
            StatusCode::OK => {
                let forecasts = response.json::<ForecastsResponse>().await?.forecasts;
                debug!(n_periods = forecasts.len(), "fetched");
                Ok(forecasts)
            }
            StatusCode::TOO_MANY_REQUESTS => bail!("exceeded the Solcast API polling limit"),
            StatusCode::BAD_REQUEST => bail!(
                "the rooftop site `{site_id}` is missing capacity, specify it or provide historic data for tuning",
            ),
            StatusCode::NOT_FOUND => {
                bail!("the rooftop site `{site_id}` cannot be found or is not accessible")
            }
            status => bail!("HTTP {status} while fetching the forecasts"),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.host.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("invalid Solcast host"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use mockito::{Matcher, Server};

    use super::*;

    #[tokio::test]
    async fn test_get_sites_ok() -> Result {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/rooftop_sites")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("format".into(), "json".into()),
                Matcher::UrlEncoded("api_key".into(), "key-1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            // language=JSON
            .with_body(
                r#"{
                    "sites": [
                        {
                            "name": "Garage",
                            "resource_id": "aaaa-bbbb",
                            "capacity": 5.5,
                            "capacity_dc": 6.1,
                            "longitude": 4.89,
                            "latitude": 52.37,
                            "azimuth": 180,
                            "tilt": 35,
                            "install_date": "2021-04-01T00:00:00.0000000Z",
                            "loss_factor": 0.9,
                            "tags": ["home"]
                        }
                    ],
                    "page_count": 1,
                    "current_page": 1,
                    "total_records": 1
                }"#,
            )
            .create_async()
            .await;

        let sites = Api::new(server.url().parse()?)?.get_sites("key-1").await?;
        mock.assert_async().await;
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].resource_id, "aaaa-bbbb");
        assert_eq!(sites[0].api_key, "key-1");
        assert_eq!(sites[0].name.as_deref(), Some("Garage"));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_sites_unauthorized() -> Result {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/rooftop_sites")
            .match_query(Matcher::Any)
            .with_status(401)
            .create_async()
            .await;
        assert!(Api::new(server.url().parse()?)?.get_sites("bad").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_get_usage_ok() -> Result {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/json/reply/GetUserUsageAllowance")
            .match_query(Matcher::UrlEncoded("api_key".into(), "key-1".into()))
            .with_status(200)
            .with_body(r#"{"daily_limit": 10, "daily_limit_consumed": 3, "daily_limit_exceeded": false}"#)
            .create_async()
            .await;
        let usage = Api::new(server.url().parse()?)?.get_usage("key-1").await?;
        assert_eq!(usage.daily_limit, 10);
        assert_eq!(usage.daily_limit_consumed, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_usage_missing_limit() -> Result {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/json/reply/GetUserUsageAllowance")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"response_status": {"error_code": "Unauthorized"}}"#)
            .create_async()
            .await;
        assert!(Api::new(server.url().parse()?)?.get_usage("key-1").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_get_forecasts_ok() -> Result {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/rooftop_sites/aaaa-bbbb/forecasts")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("format".into(), "json".into()),
                Matcher::UrlEncoded("api_key".into(), "key-1".into()),
                Matcher::UrlEncoded("hours".into(), "168".into()),
            ]))
            .with_status(200)
            // language=JSON
            .with_body(
                r#"{
                    "forecasts": [
                        {
                            "pv_estimate": 1.2345,
                            "pv_estimate10": 0.5,
                            "pv_estimate90": 1.9,
                            "period_end": "2025-06-01T10:30:00.0000000Z",
                            "period": "PT30M"
                        },
                        {
                            "pv_estimate": "garbage",
                            "period_end": "2025-06-01T11:00:00.0000000Z",
                            "period": "PT30M"
                        }
                    ]
                }"#,
            )
            .create_async()
            .await;

        let forecasts =
            Api::new(server.url().parse()?)?.get_forecasts("aaaa-bbbb", "key-1", 168).await?;
        mock.assert_async().await;
        assert_eq!(forecasts.len(), 1);
        assert_abs_diff_eq!(forecasts[0].estimate.median.0, 1.2345);
        assert_abs_diff_eq!(forecasts[0].estimate.p10.0, 0.5);
        assert_abs_diff_eq!(forecasts[0].estimate.p90.0, 1.9);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_forecasts_rate_limited() -> Result {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/rooftop_sites/aaaa-bbbb/forecasts")
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;
        let error = Api::new(server.url().parse()?)?
            .get_forecasts("aaaa-bbbb", "key-1", 168)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("polling limit"));
        Ok(())
    }
}
