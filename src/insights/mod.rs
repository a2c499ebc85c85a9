//! Heuristic strategy generators.
//!
//! Each generator is a pure function over the entity collections and the
//! advanced metrics: it either emits one recommendation or returns `None`
//! when its trigger condition is not met. No generator errors and none is
//! required to fire; the ranked output is recomputed on every request.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::metrics::advanced::AdvancedMetrics;
use crate::metrics::format_money;
use crate::model::{Client, ClientStatus, Opportunity, Stage, Task, TaskStatus};

/// An open opportunity untouched for longer than this counts as stalled.
pub const STALL_DAYS: i64 = 7;

/// Seasonal impact at or above this (multiplier ≥ 1.1) triggers the
/// seasonal-growth generator.
const HIGH_SEASON_IMPACT: f64 = 110.0;

/// Open pipeline should cover at least this many months of recurring revenue.
const PIPELINE_COVER_MONTHS: f64 = 2.0;

/// Maximum recommendations surfaced after ranking.
const MAX_INSIGHTS: usize = 5;

/// Which generator produced a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    PipelineReactivation,
    CashFlowRisk,
    ClientRetention,
    TaskProductivity,
    SeasonalGrowth,
    CompetitivePositioning,
}

impl InsightKind {
    pub fn id(&self) -> &'static str {
        match self {
            InsightKind::PipelineReactivation => "pipeline-reactivation",
            InsightKind::CashFlowRisk => "cash-flow-risk",
            InsightKind::ClientRetention => "client-retention",
            InsightKind::TaskProductivity => "task-productivity",
            InsightKind::SeasonalGrowth => "seasonal-growth",
            InsightKind::CompetitivePositioning => "competitive-positioning",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    fn from_urgency(urgency: f64) -> Self {
        if urgency >= 75.0 {
            Priority::High
        } else if urgency >= 50.0 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

/// A ranked recommendation card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub id: &'static str,
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub impact: String,
    pub action_items: Vec<String>,
    /// How reliable the trigger signal is (0.0–1.0), fixed per generator.
    pub confidence: f64,
    /// 0–100; drives priority and ranking.
    pub urgency_score: f64,
    /// Revenue the recommendation could recover or unlock, when estimable.
    pub potential_revenue: f64,
}

/// Shared urgency heuristic: a flat base plus fixed bonuses when the
/// type-specific thresholds are crossed. Always in 0–100.
pub fn urgency_score(m: &AdvancedMetrics, kind: InsightKind) -> f64 {
    let mut score: f64 = 40.0;
    match kind {
        InsightKind::PipelineReactivation => {
            if m.pipeline_velocity < 0.5 {
                score += 25.0;
            }
            if m.growth_trend < 0.0 {
                score += 20.0;
            }
        }
        InsightKind::CashFlowRisk => {
            if m.churn_risk > 30.0 {
                score += 30.0;
            }
            if m.client_health_score < 50.0 {
                score += 20.0;
            }
        }
        InsightKind::ClientRetention => {
            if m.churn_risk > 20.0 {
                score += 25.0;
            }
            if m.client_health_score < 60.0 {
                score += 20.0;
            }
        }
        InsightKind::TaskProductivity => {
            if m.client_health_score < 70.0 {
                score += 15.0;
            }
            if m.growth_trend < 0.0 {
                score += 10.0;
            }
        }
        InsightKind::SeasonalGrowth => {
            if m.seasonal_impact >= 120.0 {
                score += 25.0;
            } else if m.seasonal_impact >= HIGH_SEASON_IMPACT {
                score += 15.0;
            }
            if m.growth_trend > 0.0 {
                score += 10.0;
            }
        }
        InsightKind::CompetitivePositioning => {
            if m.competitive_position < 40.0 {
                score += 30.0;
            } else if m.competitive_position < 60.0 {
                score += 15.0;
            }
        }
    }
    score.clamp(0.0, 100.0)
}

/// Open deals that have not moved in over [`STALL_DAYS`] days. The urgency
/// grows with the stalled count (capped), so more stalled deals never rank
/// lower.
pub fn pipeline_reactivation(
    opportunities: &[Opportunity],
    advanced: &AdvancedMetrics,
    now: DateTime<Utc>,
) -> Option<Insight> {
    let cutoff = now - Duration::days(STALL_DAYS);
    let stalled: Vec<&Opportunity> = opportunities
        .iter()
        .filter(|o| o.stage.is_open() && o.last_activity_at() < cutoff)
        .collect();
    if stalled.is_empty() {
        return None;
    }

    let stalled_value: f64 = stalled.iter().map(|o| o.value.unwrap_or(0.0)).sum();
    let urgency = (urgency_score(advanced, InsightKind::PipelineReactivation)
        + (stalled.len() as f64 * 2.0).min(20.0))
    .min(100.0);

    Some(Insight {
        id: InsightKind::PipelineReactivation.id(),
        kind: InsightKind::PipelineReactivation,
        title: "Reactivate stalled opportunities".to_string(),
        description: format!(
            "{} open {} not moved in over {} days, holding {} in pipeline value.",
            stalled.len(),
            if stalled.len() == 1 { "opportunity has" } else { "opportunities have" },
            STALL_DAYS,
            format_money(stalled_value),
        ),
        priority: Priority::from_urgency(urgency),
        impact: format!("Up to {} recoverable", format_money(stalled_value)),
        action_items: vec![
            format!("Review the {} stalled deals and set a next step for each", stalled.len()),
            "Schedule follow-up calls for deals in negotiation".to_string(),
            "Close out opportunities that are no longer viable".to_string(),
        ],
        confidence: 0.85,
        urgency_score: urgency,
        potential_revenue: stalled_value,
    })
}

/// Open pipeline value below [`PIPELINE_COVER_MONTHS`] months of recurring
/// revenue means churn cannot be absorbed by new business.
pub fn cash_flow_risk(
    clients: &[Client],
    opportunities: &[Opportunity],
    advanced: &AdvancedMetrics,
) -> Option<Insight> {
    let recurring: f64 = clients
        .iter()
        .filter(|c| c.status == ClientStatus::Active)
        .map(|c| c.monthly_value.unwrap_or(0.0))
        .sum();
    if recurring <= 0.0 {
        return None;
    }

    let open_value: f64 = opportunities
        .iter()
        .filter(|o| o.stage.is_open())
        .map(|o| o.value.unwrap_or(0.0))
        .sum();
    let target = recurring * PIPELINE_COVER_MONTHS;
    if open_value >= target {
        return None;
    }

    let gap = target - open_value;
    let urgency = urgency_score(advanced, InsightKind::CashFlowRisk);

    Some(Insight {
        id: InsightKind::CashFlowRisk.id(),
        kind: InsightKind::CashFlowRisk,
        title: "Pipeline too thin for recurring revenue".to_string(),
        description: format!(
            "Open pipeline ({}) covers less than {:.0} months of recurring revenue ({}/month).",
            format_money(open_value),
            PIPELINE_COVER_MONTHS,
            format_money(recurring),
        ),
        priority: Priority::from_urgency(urgency),
        impact: format!("{} pipeline gap to close", format_money(gap)),
        action_items: vec![
            "Ramp up prospecting to refill the top of the pipeline".to_string(),
            "Offer expansions to active clients with growing accounts".to_string(),
            "Revisit proposals that went quiet in the last quarter".to_string(),
        ],
        confidence: 0.7,
        urgency_score: urgency,
        potential_revenue: gap,
    })
}

/// Any inactive clients on the roster are reactivation candidates.
pub fn client_retention(clients: &[Client], advanced: &AdvancedMetrics) -> Option<Insight> {
    let inactive: Vec<&Client> = clients
        .iter()
        .filter(|c| c.status == ClientStatus::Inactive)
        .collect();
    if inactive.is_empty() {
        return None;
    }

    let at_risk_value: f64 = inactive.iter().map(|c| c.monthly_value.unwrap_or(0.0)).sum();
    let urgency = urgency_score(advanced, InsightKind::ClientRetention);

    Some(Insight {
        id: InsightKind::ClientRetention.id(),
        kind: InsightKind::ClientRetention,
        title: "Win back inactive clients".to_string(),
        description: format!(
            "{} {} inactive ({:.0}% of the roster).",
            inactive.len(),
            if inactive.len() == 1 { "client is" } else { "clients are" },
            advanced.churn_risk,
        ),
        priority: Priority::from_urgency(urgency),
        impact: format!("{} in monthly value at stake", format_money(at_risk_value)),
        action_items: vec![
            "Run a reactivation campaign for dormant accounts".to_string(),
            "Ask departed clients why they left".to_string(),
            "Prepare a win-back offer for the highest-value accounts".to_string(),
        ],
        confidence: 0.75,
        urgency_score: urgency,
        potential_revenue: at_risk_value,
    })
}

/// Overdue work or a low completion rate across the windowed tasks.
pub fn task_productivity(
    tasks: &[Task],
    advanced: &AdvancedMetrics,
    now: DateTime<Utc>,
) -> Option<Insight> {
    if tasks.is_empty() {
        return None;
    }

    let overdue = tasks
        .iter()
        .filter(|t| t.status != TaskStatus::Completed && t.due_date.is_some_and(|d| d < now))
        .count();
    let completed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    let completion_rate = completed as f64 / tasks.len() as f64 * 100.0;

    if overdue == 0 && (tasks.len() < 5 || completion_rate >= 50.0) {
        return None;
    }

    let urgency = urgency_score(advanced, InsightKind::TaskProductivity);

    Some(Insight {
        id: InsightKind::TaskProductivity.id(),
        kind: InsightKind::TaskProductivity,
        title: "Clear the task backlog".to_string(),
        description: format!(
            "{overdue} overdue {}; completion rate is {completion_rate:.0}%.",
            if overdue == 1 { "task" } else { "tasks" },
        ),
        priority: Priority::from_urgency(urgency),
        impact: "Delivery delays erode client confidence".to_string(),
        action_items: vec![
            "Triage overdue tasks and reassign what is blocked".to_string(),
            "Break large tasks into steps that can close this week".to_string(),
            "Review recurring bottlenecks in the approval queue".to_string(),
        ],
        confidence: 0.8,
        urgency_score: urgency,
        potential_revenue: 0.0,
    })
}

/// High-season months warrant a demand-capture push.
pub fn seasonal_growth(
    clients: &[Client],
    advanced: &AdvancedMetrics,
    now: DateTime<Utc>,
) -> Option<Insight> {
    if clients.is_empty() || advanced.seasonal_impact < HIGH_SEASON_IMPACT {
        return None;
    }

    let recurring: f64 = clients
        .iter()
        .filter(|c| c.status == ClientStatus::Active)
        .map(|c| c.monthly_value.unwrap_or(0.0))
        .sum();
    let multiplier = advanced.seasonal_impact / 100.0;
    let upside = recurring * (multiplier - 1.0);
    let urgency = urgency_score(advanced, InsightKind::SeasonalGrowth);

    Some(Insight {
        id: InsightKind::SeasonalGrowth.id(),
        kind: InsightKind::SeasonalGrowth,
        title: "Capture the seasonal peak".to_string(),
        description: format!(
            "Demand in {} runs {:.0}% above baseline.",
            now.format("%B"),
            advanced.seasonal_impact - 100.0,
        ),
        priority: Priority::from_urgency(urgency),
        impact: format!("Roughly {} in seasonal upside", format_money(upside)),
        action_items: vec![
            "Launch a seasonal campaign before the peak passes".to_string(),
            "Front-load outreach to prospects with seasonal budgets".to_string(),
            "Confirm delivery capacity for the extra volume".to_string(),
        ],
        confidence: 0.6,
        urgency_score: urgency,
        potential_revenue: upside,
    })
}

/// Win rate below half of closed deals signals a positioning problem.
pub fn competitive_positioning(
    opportunities: &[Opportunity],
    advanced: &AdvancedMetrics,
) -> Option<Insight> {
    let won = opportunities
        .iter()
        .filter(|o| o.stage == Stage::ClosedWon)
        .count();
    let lost = opportunities
        .iter()
        .filter(|o| o.stage == Stage::ClosedLost)
        .count();
    if won + lost == 0 || advanced.competitive_position >= 50.0 {
        return None;
    }

    let lost_value: f64 = opportunities
        .iter()
        .filter(|o| o.stage == Stage::ClosedLost)
        .map(|o| o.value.unwrap_or(0.0))
        .sum();
    let urgency = urgency_score(advanced, InsightKind::CompetitivePositioning);

    Some(Insight {
        id: InsightKind::CompetitivePositioning.id(),
        kind: InsightKind::CompetitivePositioning,
        title: "Losing more deals than you win".to_string(),
        description: format!(
            "Win rate is {:.0}% ({won} won, {lost} lost).",
            advanced.competitive_position,
        ),
        priority: Priority::from_urgency(urgency),
        impact: format!("{} lost to competitors so far", format_money(lost_value)),
        action_items: vec![
            "Run loss reviews on the last five lost deals".to_string(),
            "Sharpen proposals around outcomes, not deliverables".to_string(),
            "Benchmark pricing against the competitors you lose to".to_string(),
        ],
        confidence: 0.7,
        urgency_score: urgency,
        potential_revenue: lost_value,
    })
}

/// Run every generator and rank the results by urgency plus a revenue
/// nudge (`potential_revenue / 10_000`), keeping the top [`MAX_INSIGHTS`].
pub fn generate_insights(
    clients: &[Client],
    opportunities: &[Opportunity],
    tasks: &[Task],
    advanced: &AdvancedMetrics,
    now: DateTime<Utc>,
) -> Vec<Insight> {
    let mut insights: Vec<Insight> = [
        pipeline_reactivation(opportunities, advanced, now),
        cash_flow_risk(clients, opportunities, advanced),
        client_retention(clients, advanced),
        task_productivity(tasks, advanced, now),
        seasonal_growth(clients, advanced, now),
        competitive_positioning(opportunities, advanced),
    ]
    .into_iter()
    .flatten()
    .collect();

    insights.sort_by(|a, b| {
        ranking_key(b)
            .partial_cmp(&ranking_key(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    insights.truncate(MAX_INSIGHTS);
    insights
}

fn ranking_key(insight: &Insight) -> f64 {
    insight.urgency_score + insight.potential_revenue / 10_000.0
}
