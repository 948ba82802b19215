use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vendsync_core::models::{DiffItem, DiffReport, DiffStatus, HarvestedLine, PriceChange, ScrapeTarget};

// ---------------------------------------------------------------------------
// Harvests
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct HarvestRequest {
    pub target_id: i64,
    /// Progress channel to publish into; generated when omitted. Subscribe to
    /// it before triggering to see every message.
    pub run_id: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HarvestAccepted {
    pub run_id: String,
    pub target_id: i64,
}

// ---------------------------------------------------------------------------
// Targets and staging
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TargetResponse {
    pub id: i64,
    pub vendor_id: i64,
    pub url: String,
    pub source: String,
    pub last_parsed_at: Option<DateTime<Utc>>,
    pub default_reward_range_id: Option<i64>,
}

impl From<ScrapeTarget> for TargetResponse {
    fn from(t: ScrapeTarget) -> Self {
        Self {
            id: t.id,
            vendor_id: t.vendor_id,
            url: t.url,
            source: t.source,
            last_parsed_at: t.last_parsed_at,
            default_reward_range_id: t.default_reward_range_id,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TargetListResponse {
    pub targets: Vec<TargetResponse>,
    pub total: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StagedLineResponse {
    pub origin: i64,
    pub title: String,
    pub link: String,
    pub shipment: Option<String>,
    pub warranty: Option<String>,
    pub input_price: f64,
    pub output_price: Option<f64>,
    pub pics: Vec<String>,
    pub preview: Option<String>,
    pub optional: Option<String>,
    /// Already listed in the hub.
    pub published: bool,
}

impl From<HarvestedLine> for StagedLineResponse {
    fn from(l: HarvestedLine) -> Self {
        Self {
            origin: l.origin,
            title: l.title,
            link: l.link,
            shipment: l.shipment,
            warranty: l.warranty,
            input_price: l.input_price,
            output_price: l.output_price,
            pics: l.pics,
            preview: l.preview,
            optional: l.optional,
            published: l.published,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StagedResponse {
    pub target_id: i64,
    pub lines: Vec<StagedLineResponse>,
    pub total: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SourceListResponse {
    pub sources: Vec<String>,
}

// ---------------------------------------------------------------------------
// Diff and commit
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct DiffRequest {
    pub path_ids: Vec<i64>,
    /// Restrict the reports to these product origins.
    pub origins: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DiffItemDto {
    pub origin: i64,
    pub title: String,
    /// One of `equal`, `hub_higher`, `parsing_higher`, `only_hub`, `only_parsing`.
    #[schema(value_type = String)]
    pub status: DiffStatus,
    pub target_id: Option<i64>,
    pub parsing_input_price: Option<f64>,
    pub parsing_output_price: Option<f64>,
    pub hub_input_price: Option<f64>,
    pub hub_output_price: Option<f64>,
    pub parsed_at: Option<DateTime<Utc>>,
    pub hub_updated_at: Option<DateTime<Utc>>,
}

impl From<DiffItem> for DiffItemDto {
    fn from(i: DiffItem) -> Self {
        Self {
            origin: i.origin,
            title: i.title,
            status: i.status,
            target_id: i.target_id,
            parsing_input_price: i.parsing_input_price,
            parsing_output_price: i.parsing_output_price,
            hub_input_price: i.hub_input_price,
            hub_output_price: i.hub_output_price,
            parsed_at: i.parsed_at,
            hub_updated_at: i.hub_updated_at,
        }
    }
}

impl From<DiffItemDto> for DiffItem {
    fn from(i: DiffItemDto) -> Self {
        Self {
            origin: i.origin,
            title: i.title,
            status: i.status,
            target_id: i.target_id,
            parsing_input_price: i.parsing_input_price,
            parsing_output_price: i.parsing_output_price,
            hub_input_price: i.hub_input_price,
            hub_output_price: i.hub_output_price,
            parsed_at: i.parsed_at,
            hub_updated_at: i.hub_updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DiffReportDto {
    pub path_id: i64,
    pub items: Vec<DiffItemDto>,
}

impl From<DiffReport> for DiffReportDto {
    fn from(r: DiffReport) -> Self {
        Self {
            path_id: r.path_id,
            items: r.items.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<DiffReportDto> for DiffReport {
    fn from(r: DiffReportDto) -> Self {
        Self {
            path_id: r.path_id,
            items: r.items.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PriceChangeDto {
    pub origin: i64,
    pub input_price: f64,
    pub output_price: f64,
    #[serde(default)]
    pub warranty: Option<String>,
}

impl From<PriceChangeDto> for PriceChange {
    fn from(c: PriceChangeDto) -> Self {
        Self {
            origin: c.origin,
            input_price: c.input_price,
            output_price: c.output_price,
            warranty: c.warranty,
        }
    }
}

/// Either whole diff reports, committed as-is, or explicit price changes.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(untagged)]
pub enum CommitRequest {
    Reports { reports: Vec<DiffReportDto> },
    Changes { changes: Vec<PriceChangeDto> },
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CommitResponse {
    /// Whether any hub entry changed.
    pub updated: bool,
    /// The committed input, echoed back.
    #[serde(flatten)]
    pub committed: CommitRequest,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
