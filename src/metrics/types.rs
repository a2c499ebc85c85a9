use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::insights::Insight;
use crate::metrics::advanced::AdvancedMetrics;
use crate::model::{ClientStatus, Stage, TaskStatus};

/// Opportunity count for one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageCount {
    pub stage: Stage,
    pub label: &'static str,
    pub count: u64,
}

/// Task count for one workflow status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatusCount {
    pub status: TaskStatus,
    pub label: &'static str,
    pub count: u64,
}

/// Client count for one lifecycle status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStatusCount {
    pub status: ClientStatus,
    pub label: &'static str,
    pub count: u64,
}

/// Aggregated dashboard metrics for one tenant and period window.
///
/// `total_clients`, `total_opportunities`, and the task counts cover records
/// created inside the window; `active_clients`, `won_opportunities`, and the
/// stage/client breakdowns reflect current state across the whole collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsRecord {
    pub total_clients: u64,
    pub active_clients: u64,
    pub total_opportunities: u64,
    pub won_opportunities: u64,
    /// Value of deals won in the window plus the monthly value of currently
    /// active clients. The recurring part is not prorated to window length.
    pub total_revenue: f64,
    pub pending_tasks: u64,
    pub completed_tasks: u64,
    /// Won / created opportunities, as a percentage. Zero when nothing was
    /// created in the window.
    pub conversion_rate: f64,
    pub opportunities_by_stage: Vec<StageCount>,
    pub tasks_by_status: Vec<TaskStatusCount>,
    pub clients_by_status: Vec<ClientStatusCount>,
}

/// What kind of event an activity feed entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    ClientAdded,
    OpportunityWon,
    TaskCompleted,
}

/// One entry in the recent-activity feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityItem {
    pub kind: ActivityKind,
    pub title: String,
    pub detail: String,
    pub occurred_at: DateTime<Utc>,
}

/// Everything the dashboard renders for one tenant and period, computed in
/// a single pass and discarded after render.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub tenant_id: Option<String>,
    pub period_key: String,
    pub metrics: MetricsRecord,
    pub recent_activity: Vec<ActivityItem>,
    pub advanced: AdvancedMetrics,
    pub insights: Vec<Insight>,
}
