// Dashboard service: every read goes through the query cache, every write
// invalidates the cached queries it makes stale.

use std::sync::Arc;

use crate::api::cache::{QueryCache, QueryKey};
use crate::api::client::{LeadQuery, TcisClient, DEFAULT_HISTORY_LIMIT};
use crate::error::ApiError;
use crate::types::{
    AutomationPack, Client, ClientHierarchy, ConversionResult, EntityKind, FunnelMetrics,
    GeoSummary, Lead, ScoreHistory, ScoringConfig, TicketStats,
};
use crate::validation::{ClientForm, ConversionForm, LeadForm, LeadUpdate};

pub const LEADS: &str = "leads";
pub const LEAD: &str = "lead";
pub const CLIENTS: &str = "clients";
pub const CLIENT: &str = "client";
pub const SCORING_CONFIG: &str = "scoring-config";

pub struct Dashboard {
    client: Arc<TcisClient>,
    cache: Arc<QueryCache>,
}

impl Dashboard {
    pub fn new(client: Arc<TcisClient>, cache: Arc<QueryCache>) -> Self {
        Self { client, cache }
    }

    pub fn client(&self) -> &Arc<TcisClient> {
        &self.client
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    // -- Reads --------------------------------------------------------------

    pub async fn ranked_leads(&self, query: &LeadQuery) -> Result<Arc<Vec<Lead>>, ApiError> {
        let key = QueryKey::new([
            LEADS.to_string(),
            "ranked".to_string(),
            query.limit.map(|l| l.to_string()).unwrap_or_default(),
            query.state.clone().unwrap_or_default(),
            query.min_score.map(|s| s.to_string()).unwrap_or_default(),
            query.status_filter.clone().unwrap_or_default(),
        ]);
        self.cache
            .fetch(key, || self.client.get_ranked_leads(query))
            .await
    }

    pub async fn lead(&self, id: i64) -> Result<Arc<Lead>, ApiError> {
        self.cache
            .fetch(QueryKey::new([LEAD.to_string(), id.to_string()]), || {
                self.client.get_lead(id)
            })
            .await
    }

    pub async fn score_history(
        &self,
        kind: EntityKind,
        id: i64,
        limit: Option<u32>,
        days: Option<u32>,
    ) -> Result<Arc<Vec<ScoreHistory>>, ApiError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let key = QueryKey::new([
            kind.as_str().to_string(),
            id.to_string(),
            "history".to_string(),
            limit.to_string(),
            days.map(|d| d.to_string()).unwrap_or_default(),
        ]);
        self.cache
            .fetch(key, || self.client.get_score_history(kind, id, limit, days))
            .await
    }

    pub async fn ranked_clients(&self) -> Result<Arc<Vec<Client>>, ApiError> {
        self.cache
            .fetch(QueryKey::new([CLIENTS, "ranked"]), || {
                self.client.get_ranked_clients()
            })
            .await
    }

    pub async fn client_record(&self, id: i64) -> Result<Arc<Client>, ApiError> {
        self.cache
            .fetch(QueryKey::new([CLIENT.to_string(), id.to_string()]), || {
                self.client.get_client(id)
            })
            .await
    }

    pub async fn client_hierarchy(&self, id: i64) -> Result<Arc<ClientHierarchy>, ApiError> {
        let key = QueryKey::new([CLIENT.to_string(), id.to_string(), "hierarchy".to_string()]);
        self.cache
            .fetch(key, || self.client.get_client_hierarchy(id))
            .await
    }

    pub async fn potential_packs(&self) -> Result<Arc<Vec<AutomationPack>>, ApiError> {
        self.cache
            .fetch(QueryKey::new(["packs", "potential"]), || {
                self.client.get_potential_packs()
            })
            .await
    }

    pub async fn ticket_stats(&self) -> Result<Arc<TicketStats>, ApiError> {
        self.cache
            .fetch(QueryKey::new(["tickets", "stats"]), || {
                self.client.get_ticket_stats()
            })
            .await
    }

    pub async fn geo_summary(&self, sector: Option<&str>) -> Result<Arc<GeoSummary>, ApiError> {
        let key = QueryKey::new(["geo", "summary", sector.unwrap_or("")]);
        self.cache
            .fetch(key, || self.client.get_geo_summary(sector))
            .await
    }

    pub async fn funnel(&self) -> Result<Arc<FunnelMetrics>, ApiError> {
        self.cache
            .fetch(QueryKey::new(["funnel"]), || self.client.get_funnel())
            .await
    }

    pub async fn scoring_configs(&self) -> Result<Arc<Vec<ScoringConfig>>, ApiError> {
        self.cache
            .fetch(QueryKey::new([SCORING_CONFIG]), || {
                self.client.get_scoring_configs()
            })
            .await
    }

    // -- Writes -------------------------------------------------------------

    pub async fn create_lead(&self, form: &LeadForm) -> Result<Lead, ApiError> {
        let lead = self.client.create_lead(form).await?;
        self.cache.invalidate(&QueryKey::new([LEADS]));
        log::info!("Created lead {} ({})", lead.id, lead.company);
        Ok(lead)
    }

    pub async fn update_lead(&self, id: i64, update: &LeadUpdate) -> Result<Lead, ApiError> {
        let lead = self.client.update_lead(id, update).await?;
        self.cache.invalidate(&QueryKey::new([LEADS]));
        self.cache
            .invalidate(&QueryKey::new([LEAD.to_string(), id.to_string()]));
        Ok(lead)
    }

    pub async fn convert_lead(
        &self,
        id: i64,
        form: &ConversionForm,
    ) -> Result<ConversionResult, ApiError> {
        let result = self.client.convert_lead(id, form).await?;
        self.cache.invalidate(&QueryKey::new([LEADS]));
        self.cache.invalidate(&QueryKey::new([CLIENTS]));
        log::info!(
            "Converted lead {} to client {}",
            id,
            result
                .client_id
                .map(|c| c.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
        Ok(result)
    }

    pub async fn create_client(&self, form: &ClientForm) -> Result<Client, ApiError> {
        let client = self.client.create_client(form).await?;
        self.cache.invalidate(&QueryKey::new([CLIENTS]));
        Ok(client)
    }

    pub async fn update_scoring_config(
        &self,
        key: &str,
        value: f64,
    ) -> Result<ScoringConfig, ApiError> {
        let updated = self.client.update_scoring_config(key, value).await?;
        self.cache.invalidate(&QueryKey::new([SCORING_CONFIG]));
        Ok(updated)
    }

    /// Post a lead through the authenticated external channel. The new lead
    /// shows up in ranked lists on their next refetch.
    pub async fn submit_external_lead(&self, form: &LeadForm) -> Result<Lead, ApiError> {
        let lead = self.client.submit_external_lead(form).await?;
        self.cache.invalidate(&QueryKey::new([LEADS]));
        Ok(lead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::cache::QueryState;
    use crate::api::testing::{TestResponse, TestServer};
    use crate::types::Config;
    use std::time::Duration;

    const LEADS_BODY: &str =
        r#"[{"id":1,"name":"Asha","company":"Acme","sector":"trading","lead_score":77.5}]"#;

    fn dashboard_for(server: &TestServer) -> Dashboard {
        let config = Config {
            api_base_url: server.base_url.clone(),
            ..Config::default()
        };
        Dashboard::new(
            Arc::new(TcisClient::new(&config).unwrap()),
            Arc::new(QueryCache::new(Duration::from_secs(30))),
        )
    }

    #[tokio::test]
    async fn test_reads_are_cached() {
        let server = TestServer::spawn(vec![TestResponse::json(200, LEADS_BODY)]);
        let dashboard = dashboard_for(&server);

        let first = dashboard.ranked_leads(&LeadQuery::default()).await.unwrap();
        let second = dashboard.ranked_leads(&LeadQuery::default()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_create_lead_invalidates_lead_lists() {
        let server = TestServer::spawn(vec![
            TestResponse::json(200, LEADS_BODY),
            TestResponse::json(
                200,
                r#"{"id":2,"name":"Ravi","company":"Shree","sector":"services"}"#,
            ),
            TestResponse::json(200, LEADS_BODY),
        ]);
        let dashboard = dashboard_for(&server);

        dashboard.ranked_leads(&LeadQuery::default()).await.unwrap();
        let form = LeadForm {
            company: "Shree".into(),
            name: "Ravi".into(),
            ..LeadForm::default()
        };
        let created = dashboard.create_lead(&form).await.unwrap();
        assert_eq!(created.id, 2);

        dashboard.ranked_leads(&LeadQuery::default()).await.unwrap();
        let requests = server.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[1].starts_with("POST /api/leads/ "));
        assert!(requests[2].starts_with("GET /api/scoring/leads/ranked "));
    }

    #[tokio::test]
    async fn test_convert_invalidates_leads_and_clients_only() {
        let server = TestServer::spawn(vec![TestResponse::json(200, r#"{"client_id":11}"#)]);
        let dashboard = dashboard_for(&server);
        let cache = dashboard.cache();

        for parts in [
            &["leads", "ranked"][..],
            &["clients", "ranked"][..],
            &["funnel"][..],
        ] {
            cache
                .fetch(QueryKey::new(parts.iter().copied()), || async {
                    Ok::<_, ApiError>(0_u8)
                })
                .await
                .unwrap();
        }

        let result = dashboard
            .convert_lead(4, &ConversionForm::default())
            .await
            .unwrap();
        assert_eq!(result.client_id, Some(11));
        assert!(cache.peek::<u8>(&QueryKey::new(["leads", "ranked"])).is_none());
        assert!(cache.peek::<u8>(&QueryKey::new(["clients", "ranked"])).is_none());
        assert!(matches!(
            cache.peek::<u8>(&QueryKey::new(["funnel"])),
            Some(QueryState::Ready { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_mutation_keeps_cache() {
        let server = TestServer::spawn(vec![TestResponse::json(500, r#"{"detail":"boom"}"#)]);
        let dashboard = dashboard_for(&server);
        dashboard
            .cache()
            .fetch(QueryKey::new(["scoring-config"]), || async {
                Ok::<_, ApiError>(0_u8)
            })
            .await
            .unwrap();

        let err = dashboard
            .update_scoring_config("weight_size", 12.0)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Server { status: 500, .. }));
        assert_eq!(dashboard.cache().len(), 1);
    }
}
