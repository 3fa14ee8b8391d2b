//! REST client for the TCIS backend.
//!
//! Uses reqwest with a fixed per-request timeout. Every path is relative to
//! the configured base URL (`http://127.0.0.1:8000/api` by default). When an
//! API key is configured it is sent as `X-TCIS-API-Key` on every request.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::types::{
    AutomationPack, Client, ClientHierarchy, Config, ConversionResult, EntityKind, FunnelMetrics,
    GeoSummary, Lead, ScoreHistory, ScoringConfig, TicketStats,
};
use crate::validation::{validate_config_update, ClientForm, ConversionForm, LeadForm, LeadUpdate};

pub const API_KEY_HEADER: &str = "X-TCIS-API-Key";
pub const DEFAULT_HISTORY_LIMIT: u32 = 20;

/// Optional parameters for `/scoring/leads/ranked`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadQuery {
    pub limit: Option<u32>,
    /// Geographic state drill-down from the growth-zones map.
    pub state: Option<String>,
    pub min_score: Option<f64>,
    pub status_filter: Option<String>,
}

impl LeadQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(state) = &self.state {
            params.push(("state", state.clone()));
        }
        if let Some(min_score) = self.min_score {
            params.push(("min_score", min_score.to_string()));
        }
        if let Some(status) = &self.status_filter {
            params.push(("status_filter", status.clone()));
        }
        params
    }
}

pub struct TcisClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl TcisClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        url::Url::parse(&base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            timeout_secs: config.request_timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<url::Url, ApiError> {
        let full = format!("{}{}", self.base_url, path);
        url::Url::parse(&full).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", full, e)))
    }

    /// Endpoint whose last path segment is caller-supplied text, escaped so
    /// it cannot step into another route.
    fn endpoint_with_segment(&self, path: &str, segment: &str) -> Result<url::Url, ApiError> {
        let mut url = self.endpoint(path)?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        self.request_url(method, url, params, body).await
    }

    async fn request_url<T: DeserializeOwned>(
        &self,
        method: Method,
        url: url::Url,
        params: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let path = url.path().to_string();
        log::debug!("[API Request] {} {}", method, path);

        let mut req = self
            .client
            .request(method.clone(), url)
            .header("Content-Type", "application/json");
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await.map_err(|e| {
            let err = if e.is_timeout() {
                ApiError::Timeout(self.timeout_secs)
            } else {
                ApiError::Network(e.to_string())
            };
            log::error!("API Error [NETWORK] {} {}: {}", method, path, err);
            err
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            match status {
                StatusCode::UNAUTHORIZED => {
                    log::error!("Unauthorized: {} {} rejected the API key", method, path)
                }
                s if s.is_server_error() => {
                    log::error!("Server error {} on {} {}", s.as_u16(), method, path)
                }
                s => log::warn!("API Error [{}] {} {}", s.as_u16(), method, path),
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(ApiError::RateLimited);
            }
            return Err(ApiError::Server {
                status: status.as_u16(),
                body: text,
            });
        }

        log::debug!("[API Response] {} {}", status.as_u16(), path);
        resp.json::<T>()
            .await
            .map_err(|e| ApiError::Decode(format!("{} {}: {}", method, path, e)))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.request(Method::GET, path, params, None).await
    }

    async fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::Decode(format!("Failed to encode request: {}", e)))?;
        self.request(method, path, &[], Some(body)).await
    }

    // -- Leads --------------------------------------------------------------

    pub async fn get_ranked_leads(&self, query: &LeadQuery) -> Result<Vec<Lead>, ApiError> {
        self.get("/scoring/leads/ranked", &query.params()).await
    }

    pub async fn get_lead(&self, id: i64) -> Result<Lead, ApiError> {
        self.get(&format!("/leads/{}", id), &[]).await
    }

    /// Validate and create a lead. Invalid forms never reach the backend.
    pub async fn create_lead(&self, form: &LeadForm) -> Result<Lead, ApiError> {
        form.validate()?;
        self.send_json(Method::POST, "/leads/", form).await
    }

    pub async fn update_lead(&self, id: i64, update: &LeadUpdate) -> Result<Lead, ApiError> {
        update.validate()?;
        self.send_json(Method::PATCH, &format!("/leads/{}", id), update)
            .await
    }

    pub async fn convert_lead(
        &self,
        id: i64,
        form: &ConversionForm,
    ) -> Result<ConversionResult, ApiError> {
        form.validate()?;
        self.send_json(Method::POST, &format!("/leads/{}/convert", id), form)
            .await
    }

    /// Submit a lead the way the public website's contact form does. This
    /// channel is authenticated, so an API key must be configured.
    pub async fn submit_external_lead(&self, form: &LeadForm) -> Result<Lead, ApiError> {
        if self.api_key.is_none() {
            return Err(ApiError::MissingApiKey("external lead submission"));
        }
        form.validate()?;
        self.send_json(Method::POST, "/leads/", form).await
    }

    // -- Clients ------------------------------------------------------------

    pub async fn get_ranked_clients(&self) -> Result<Vec<Client>, ApiError> {
        self.get("/scoring/clients/ranked", &[]).await
    }

    pub async fn get_client(&self, id: i64) -> Result<Client, ApiError> {
        self.get(&format!("/clients/{}", id), &[]).await
    }

    pub async fn get_client_hierarchy(&self, id: i64) -> Result<ClientHierarchy, ApiError> {
        self.get(&format!("/clients/{}/hierarchy", id), &[]).await
    }

    pub async fn create_client(&self, form: &ClientForm) -> Result<Client, ApiError> {
        form.validate()?;
        self.send_json(Method::POST, "/clients/", form).await
    }

    // -- Analytics ----------------------------------------------------------

    pub async fn get_potential_packs(&self) -> Result<Vec<AutomationPack>, ApiError> {
        self.get("/scoring/packs/potential", &[]).await
    }

    pub async fn get_ticket_stats(&self) -> Result<TicketStats, ApiError> {
        self.get("/tickets/stats", &[]).await
    }

    pub async fn get_geo_summary(&self, sector: Option<&str>) -> Result<GeoSummary, ApiError> {
        let params: Vec<(&str, String)> = sector
            .map(|s| vec![("sector", s.to_string())])
            .unwrap_or_default();
        self.get("/scoring/geo/summary", &params).await
    }

    pub async fn get_funnel(&self) -> Result<FunnelMetrics, ApiError> {
        self.get("/scoring/funnel", &[]).await
    }

    pub async fn get_score_history(
        &self,
        kind: EntityKind,
        id: i64,
        limit: u32,
        days: Option<u32>,
    ) -> Result<Vec<ScoreHistory>, ApiError> {
        let mut params = vec![("limit", limit.to_string())];
        if let Some(days) = days {
            params.push(("days", days.to_string()));
        }
        self.get(&format!("/scoring/history/{}/{}", kind.as_str(), id), &params)
            .await
    }

    // -- Scoring config -----------------------------------------------------

    pub async fn get_scoring_configs(&self) -> Result<Vec<ScoringConfig>, ApiError> {
        self.get("/scoring/config", &[]).await
    }

    pub async fn update_scoring_config(
        &self,
        key: &str,
        value: f64,
    ) -> Result<ScoringConfig, ApiError> {
        validate_config_update(key, value)?;
        let url = self.endpoint_with_segment("/scoring/config", key)?;
        let body = serde_json::json!({ "value": value });
        self.request_url(Method::PATCH, url, &[], Some(body)).await
    }
}

#[async_trait::async_trait]
impl crate::poller::LeadSource for TcisClient {
    async fn fetch_leads(&self) -> Result<Vec<Lead>, ApiError> {
        self.get_ranked_leads(&LeadQuery::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{TestResponse, TestServer};

    fn client_for(server: &TestServer, api_key: Option<&str>) -> TcisClient {
        let config = Config {
            api_base_url: server.base_url.clone(),
            api_key: api_key.map(str::to_string),
            ..Config::default()
        };
        TcisClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_ranked_leads_are_decoded() {
        let server = TestServer::spawn(vec![TestResponse::json(
            200,
            r#"[{"id":1,"name":"Asha","company":"Acme","sector":"trading","lead_score":77.5,"status":"new"}]"#,
        )]);
        let client = client_for(&server, None);

        let query = LeadQuery {
            limit: Some(50),
            state: Some("Gujarat".into()),
            ..LeadQuery::default()
        };
        let leads = client.get_ranked_leads(&query).await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].company, "Acme");

        let requests = server.requests();
        assert!(requests[0].starts_with("GET /api/scoring/leads/ranked?limit=50&state=Gujarat "));
    }

    #[tokio::test]
    async fn test_non_success_surfaces_server_error() {
        let server = TestServer::spawn(vec![TestResponse::json(500, r#"{"detail":"boom"}"#)]);
        let client = client_for(&server, None);

        let err = client.get_ticket_stats().await.unwrap_err();
        match err {
            ApiError::Server { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_retryable() {
        let server = TestServer::spawn(vec![TestResponse::json(429, "{}")]);
        let client = client_for(&server, None);
        let err = client.get_funnel().await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_api_key_header_and_body_sent() {
        let server = TestServer::spawn(vec![TestResponse::json(
            200,
            r#"{"key":"weight_size","value":15.0,"category":"lead","label":"Size"}"#,
        )]);
        let client = client_for(&server, Some("sim-key"));

        let updated = client.update_scoring_config("weight_size", 15.0).await.unwrap();
        assert_eq!(updated.value, 15.0);

        let request = &server.requests()[0];
        assert!(request.starts_with("PATCH /api/scoring/config/weight_size "));
        assert!(request.to_lowercase().contains("x-tcis-api-key: sim-key"));
        assert!(request.ends_with(r#"{"value":15.0}"#));
    }

    #[tokio::test]
    async fn test_config_key_cannot_leave_its_route() {
        let server = TestServer::spawn(vec![]);
        let client = client_for(&server, None);

        let err = client
            .update_scoring_config("../../leads/7", 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(server.requests().is_empty());

        let url = client
            .endpoint_with_segment("/scoring/config", "../../leads/7")
            .unwrap();
        assert_eq!(url.path(), "/api/scoring/config/..%2F..%2Fleads%2F7");
    }

    #[tokio::test]
    async fn test_invalid_form_never_reaches_backend() {
        let config = Config {
            // nothing listens here; a request would fail as a network error
            api_base_url: "http://127.0.0.1:9/api".into(),
            ..Config::default()
        };
        let client = TcisClient::new(&config).unwrap();
        let err = client.create_lead(&LeadForm::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_external_lead_requires_api_key() {
        let client = TcisClient::new(&Config::default()).unwrap();
        let form = LeadForm {
            company: "Acme".into(),
            name: "Asha".into(),
            ..LeadForm::default()
        };
        let err = client.submit_external_lead(&form).await.unwrap_err();
        assert!(matches!(err, ApiError::MissingApiKey(_)));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_decode_error() {
        let server = TestServer::spawn(vec![TestResponse::json(200, "not json")]);
        let client = client_for(&server, None);
        let err = client.get_potential_packs().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = Config {
            api_base_url: "not a url".into(),
            ..Config::default()
        };
        assert!(matches!(TcisClient::new(&config), Err(ApiError::InvalidUrl(_))));
    }
}
