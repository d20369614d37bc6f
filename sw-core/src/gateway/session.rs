//! HTTP implementation of [`Gateway`] against the Copernicus Data Space
//! Sentinel Hub APIs and the Open-Meteo archive.

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;

use super::{Gateway, ImageRequest, WeatherArchive, WeatherRequest, WeatherSeries};
use crate::error::GatewayError;
use crate::statistics::{StatisticsRequest, StatisticsResponse};
use crate::token::{IssuedToken, TokenCache};
use sw_utils::dates::format_date;

pub const DEFAULT_TOKEN_URL: &str =
    "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token";
pub const DEFAULT_STATS_URL: &str = "https://sh.dataspace.copernicus.eu/api/v1/statistics";
pub const DEFAULT_PROCESS_URL: &str = "https://sh.dataspace.copernicus.eu/api/v1/process";
pub const DEFAULT_WEATHER_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

const MAX_TRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(1000);
const NO_DATA_MARKER: &str = "No data found";

/// OAuth client credentials for the token endpoint.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"****")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub token_url: String,
    pub stats_url: String,
    pub process_url: String,
    pub weather_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            stats_url: DEFAULT_STATS_URL.to_string(),
            process_url: DEFAULT_PROCESS_URL.to_string(),
            weather_url: DEFAULT_WEATHER_URL.to_string(),
        }
    }
}

/// Owns the HTTP client and the memoized access token. Construct one per
/// process and share it by reference across concurrent cell fetches.
pub struct GatewaySession {
    client: Client,
    credentials: Option<Credentials>,
    endpoints: Endpoints,
    token: TokenCache,
    retry_backoff: Duration,
}

impl GatewaySession {
    pub fn new(client: Client, credentials: Option<Credentials>, endpoints: Endpoints) -> Self {
        GatewaySession {
            client,
            credentials,
            endpoints,
            token: TokenCache::default(),
            retry_backoff: INITIAL_BACKOFF,
        }
    }

    /// First pause of the retry loop; later pauses double it.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    async fn token(&self) -> Result<String, GatewayError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(GatewayError::MissingCredentials)?;
        self.token
            .get_or_fetch(|| self.request_token(credentials))
            .await
    }

    async fn request_token(&self, credentials: &Credentials) -> Result<IssuedToken, GatewayError> {
        info!("Requesting Copernicus access token");
        let response = self
            .client
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Auth(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Auth(format!("{status} - {body}")));
        }
        response
            .json::<IssuedToken>()
            .await
            .map_err(|e| GatewayError::Auth(format!("unreadable token response: {e}")))
    }

    /// Send a request, retrying transport errors, 429 and 5xx with
    /// exponential backoff. Other non-success statuses fail at once.
    async fn send_with_retry<F>(&self, label: &str, build: F) -> Result<Response, GatewayError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut backoff = self.retry_backoff;
        let mut attempt = 1;
        loop {
            let last_attempt = attempt >= MAX_TRIES;
            match build().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !retryable || last_attempt {
                        let body = response.text().await.unwrap_or_default();
                        return Err(GatewayError::Status {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    warn!(
                        "Attempt {}/{}: bad response status for {}: {}",
                        attempt, MAX_TRIES, label, status
                    );
                }
                Err(e) => {
                    if last_attempt {
                        return Err(GatewayError::Http(e));
                    }
                    warn!("Attempt {}/{}: request failed for {}: {}", attempt, MAX_TRIES, label, e);
                }
            }
            debug!("Sleeping {} ms before retrying {}", backoff.as_millis(), label);
            tokio::time::sleep(backoff).await;
            backoff *= 2;
            attempt += 1;
        }
    }

    async fn on_unauthorized(&self, err: &GatewayError) {
        if let GatewayError::Status { status: 401, .. } = err {
            warn!("Data endpoint rejected the access token; dropping it");
            self.token.invalidate().await;
        }
    }
}

#[async_trait]
impl Gateway for GatewaySession {
    async fn authenticate(&self) -> Result<(), GatewayError> {
        self.token().await.map(|_| ())
    }

    async fn fetch_statistics(
        &self,
        request: &StatisticsRequest,
    ) -> Result<StatisticsResponse, GatewayError> {
        let token = self.token().await?;
        let body = request.to_body();
        let label = format!("{} statistics", request.index.name());
        let result = self
            .send_with_retry(&label, || {
                self.client
                    .post(&self.endpoints.stats_url)
                    .bearer_auth(&token)
                    .header(header::ACCEPT, "application/json")
                    .json(&body)
            })
            .await;
        let response = match result {
            Ok(r) => r,
            Err(e) => {
                self.on_unauthorized(&e).await;
                return Err(e);
            }
        };
        response
            .json::<StatisticsResponse>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn fetch_weather(&self, request: &WeatherRequest) -> Result<WeatherSeries, GatewayError> {
        let query = [
            ("latitude", request.location.lat.to_string()),
            ("longitude", request.location.lng.to_string()),
            ("start_date", format_date(&request.start)),
            ("end_date", format_date(&request.end)),
            ("daily", "temperature_2m_mean".to_string()),
        ];
        let response = self
            .send_with_retry("weather archive", || {
                self.client.get(&self.endpoints.weather_url).query(&query)
            })
            .await?;
        let archive = response
            .json::<WeatherArchive>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(archive.to_series())
    }

    async fn fetch_image(&self, request: &ImageRequest) -> Result<Vec<u8>, GatewayError> {
        let token = self.token().await?;
        let body = request.to_body();
        let result = self
            .send_with_retry("true colour image", || {
                self.client
                    .post(&self.endpoints.process_url)
                    .bearer_auth(&token)
                    .header(header::ACCEPT, "image/png")
                    .json(&body)
            })
            .await;
        let response = match result {
            Ok(r) => r,
            Err(GatewayError::Status { body, .. }) if body.contains(NO_DATA_MARKER) => {
                return Err(GatewayError::NoData)
            }
            Err(e) => {
                self.on_unauthorized(&e).await;
                return Err(e);
            }
        };
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.starts_with("image/png") {
            let text = response.text().await.unwrap_or_default();
            if text.contains(NO_DATA_MARKER) {
                return Err(GatewayError::NoData);
            }
            return Err(GatewayError::Decode(format!(
                "unexpected content type '{content_type}': {text}"
            )));
        }
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::BoundingBox;
    use crate::project::IndexKind;
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn session_for(server: &MockServer) -> GatewaySession {
        let base = server.uri();
        let endpoints = Endpoints {
            token_url: format!("{base}/token"),
            stats_url: format!("{base}/stats"),
            process_url: format!("{base}/process"),
            weather_url: format!("{base}/weather"),
        };
        let credentials = Credentials {
            client_id: "client".into(),
            client_secret: "secret".into(),
        };
        GatewaySession::new(Client::new(), Some(credentials), endpoints)
            .with_retry_backoff(Duration::from_millis(1))
    }

    async fn mount_token(server: &MockServer, times: u64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"access_token": "abc", "expires_in": 3600})),
            )
            .expect(times)
            .mount(server)
            .await;
    }

    /// Paths of every request the server saw, in order.
    async fn request_log(server: &MockServer) -> Vec<String> {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|r| format!("{} {}", r.method, r.url.path()))
            .collect()
    }

    fn stats_request() -> StatisticsRequest {
        StatisticsRequest {
            bbox: BoundingBox::new(7.7, 45.9, 7.8, 46.0),
            from: day(1),
            to: day(30),
            index: IndexKind::Ndsi,
        }
    }

    fn image_request() -> ImageRequest {
        ImageRequest {
            bbox: BoundingBox::new(7.7, 45.9, 7.8, 46.0),
            from: day(1),
            to: day(30),
            max_cloud_coverage: 20,
            width: 512,
            height: 512,
        }
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/stats"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/stats"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let session = session_for(&server);
        let response = session.fetch_statistics(&stats_request()).await.unwrap();
        assert!(response.to_observations(IndexKind::Ndsi).is_empty());
        assert_eq!(
            request_log(&server).await,
            vec!["POST /token", "POST /stats", "POST /stats", "POST /stats"]
        );
    }

    #[tokio::test]
    async fn test_retries_give_up_after_max_tries() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/stats"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(u64::from(MAX_TRIES))
            .mount(&server)
            .await;

        let err = session_for(&server)
            .fetch_statistics(&stats_request())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Status { status: 502, ref body } if body == "bad gateway"));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/stats"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid evalscript"))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server);
        let err = session.fetch_statistics(&stats_request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Status { status: 400, .. }));

        // the token survives a 400
        session.authenticate().await.unwrap();
        assert_eq!(request_log(&server).await, vec!["POST /token", "POST /stats"]);
    }

    #[tokio::test]
    async fn test_unauthorized_drops_token() {
        let server = MockServer::start().await;
        mount_token(&server, 2).await;
        Mock::given(method("POST"))
            .and(path("/stats"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let session = session_for(&server);
        let first = session.fetch_statistics(&stats_request()).await;
        assert!(matches!(first, Err(GatewayError::Status { status: 401, .. })));
        session.fetch_statistics(&stats_request()).await.unwrap();
        assert_eq!(
            request_log(&server).await,
            vec!["POST /token", "POST /stats", "POST /token", "POST /stats"]
        );
    }

    #[tokio::test]
    async fn test_no_data_error_body_maps_to_no_data() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/process"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string("No data found for the requested period"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = session_for(&server).fetch_image(&image_request()).await;
        assert!(matches!(result, Err(GatewayError::NoData)));
    }

    #[tokio::test]
    async fn test_non_png_body_maps_to_no_data() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/process"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(r#"{"error": "No data found"}"#, "application/json"),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/process"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html/>", "text/html"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/process"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
            .mount(&server)
            .await;

        let session = session_for(&server);
        let no_data = session.fetch_image(&image_request()).await;
        assert!(matches!(no_data, Err(GatewayError::NoData)));
        let html = session.fetch_image(&image_request()).await;
        assert!(matches!(html, Err(GatewayError::Decode(_))));
        let png = session.fetch_image(&image_request()).await.unwrap();
        assert_eq!(png, vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(0)
            .mount(&server)
            .await;

        let session = session_for(&server);
        let err = session.authenticate().await.unwrap_err();
        assert!(matches!(err, GatewayError::Auth(ref msg) if msg.contains("invalid_client")));
        assert!(err.is_fatal());
        let err = session.fetch_statistics(&stats_request()).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let server = MockServer::start().await;
        let session = GatewaySession::new(Client::new(), None, Endpoints::default());
        let err = session.authenticate().await.unwrap_err();
        assert!(matches!(err, GatewayError::MissingCredentials));
        assert!(err.is_fatal());
        assert!(request_log(&server).await.is_empty());
    }
}
