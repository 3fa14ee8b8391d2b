use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default backend location, matching the development server.
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_NOTIFICATION_DISPLAY_SECS: u64 = 5;
pub const DEFAULT_CACHE_STALE_SECS: u64 = 30;
pub const DEFAULT_SHARE_BASE_URL: &str = "http://localhost:5173/leads";

/// Client configuration stored in ~/.tcis/config.json.
///
/// Every field has a default so a missing file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_notification_display_secs")]
    pub notification_display_secs: u64,
    #[serde(default = "default_cache_stale_secs")]
    pub cache_stale_secs: u64,
    /// Directory for CSV/JSON exports. Current directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_dir: Option<String>,
    #[serde(default = "default_share_base_url")]
    pub share_base_url: String,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_notification_display_secs() -> u64 {
    DEFAULT_NOTIFICATION_DISPLAY_SECS
}

fn default_cache_stale_secs() -> u64 {
    DEFAULT_CACHE_STALE_SECS
}

fn default_share_base_url() -> String {
    DEFAULT_SHARE_BASE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            notification_display_secs: default_notification_display_secs(),
            cache_stale_secs: default_cache_stale_secs(),
            export_dir: None,
            share_base_url: default_share_base_url(),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend records
// ---------------------------------------------------------------------------

/// A prospect with its computed quality score, as returned by
/// `/scoring/leads/ranked`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub name: String,
    pub company: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub sector: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub lead_score: f64,
    #[serde(default)]
    pub suggested_next_action: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_breakdown: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_source: Option<String>,
}

/// A converted account with upsell and support-risk scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    pub sector: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub upsell_score: f64,
    #[serde(default)]
    pub recommended_packs: Vec<String>,
    #[serde(default)]
    pub risk_score: f64,
    #[serde(default)]
    pub risk_flag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_breakdown: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_lead_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationPack {
    pub id: i64,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price_band: Option<String>,
    #[serde(default)]
    pub installation_count: i64,
    #[serde(default)]
    pub potential_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub ticket_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityCount {
    pub severity: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientTicketCount {
    pub company: String,
    pub ticket_count: i64,
}

/// Aggregates from `/tickets/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketStats {
    #[serde(default)]
    pub by_type: Vec<TypeCount>,
    #[serde(default)]
    pub by_severity: Vec<SeverityCount>,
    #[serde(default)]
    pub by_status: Vec<StatusCount>,
    #[serde(default)]
    pub top_clients: Vec<ClientTicketCount>,
}

impl TicketStats {
    /// Total ticket volume across all types.
    pub fn total(&self) -> i64 {
        self.by_type.iter().map(|t| t.count).sum()
    }

    /// Count for a given status, zero when the backend did not report it.
    pub fn status_count(&self, status: &str) -> i64 {
        self.by_status
            .iter()
            .filter(|s| s.status.eq_ignore_ascii_case(status))
            .map(|s| s.count)
            .sum()
    }
}

/// A tunable scoring weight exposed by `/scoring/config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub key: String,
    pub value: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreHistory {
    pub id: i64,
    pub entity_id: i64,
    pub entity_type: String,
    pub score: f64,
    pub recorded_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCity {
    pub name: String,
    pub count: i64,
    pub avg_quality: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalMetrics {
    pub name: String,
    pub region: String,
    #[serde(default)]
    pub lead_count: i64,
    #[serde(default)]
    pub client_count: i64,
    #[serde(default)]
    pub avg_lead_score: f64,
    #[serde(default)]
    pub opportunity_density: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub recommended_action: String,
    #[serde(default)]
    pub top_cities: Vec<TopCity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoFilters {
    #[serde(default)]
    pub sector: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Unmapped {
    pub count: i64,
}

/// Per-state rollup from `/scoring/geo/summary`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoSummary {
    #[serde(default)]
    pub filters: GeoFilters,
    #[serde(default)]
    pub states: BTreeMap<String, RegionalMetrics>,
    #[serde(default)]
    pub unmapped: Unmapped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStage {
    pub stage: String,
    pub count: i64,
}

/// Pipeline funnel from `/scoring/funnel`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunnelMetrics {
    #[serde(default)]
    pub total_leads: i64,
    #[serde(default)]
    pub won_count: i64,
    #[serde(default)]
    pub conversion_efficiency: f64,
    #[serde(default)]
    pub stages: Vec<FunnelStage>,
    #[serde(default)]
    pub yield_trend: Vec<serde_json::Value>,
}

impl FunnelMetrics {
    /// Leads still moving through the first three stages.
    pub fn active_leads(&self) -> i64 {
        self.stages.iter().take(3).map(|s| s.count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyBranch {
    pub id: i64,
    pub company: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub is_current: bool,
    #[serde(default)]
    pub sub_branches: Vec<HierarchyBranch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentRef {
    pub id: i64,
    pub company: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiblingRef {
    pub id: i64,
    pub company: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMetrics {
    #[serde(default)]
    pub total_branches: i64,
    #[serde(default)]
    pub primary_region: String,
}

/// Parent/sibling/branch view of a client group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientHierarchy {
    pub focus_client_id: i64,
    #[serde(default)]
    pub parent: Option<ParentRef>,
    #[serde(default)]
    pub siblings: Vec<SiblingRef>,
    pub tree: HierarchyBranch,
    #[serde(default)]
    pub group_metrics: GroupMetrics,
}

/// Backend answer to a lead conversion. The shape is owned by the backend,
/// so anything beyond the new client id is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    #[serde(default)]
    pub client_id: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Which entity a score history belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Lead,
    Client,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Client => "client",
        }
    }
}
