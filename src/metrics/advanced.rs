use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;

use crate::model::{Client, ClientStatus, Opportunity, Stage};

/// Per-calendar-month demand multipliers, January first. Agency demand sags
/// in the mid-year and January troughs and peaks toward the December close.
pub const SEASONAL_MULTIPLIERS: [f64; 12] = [
    0.80, 0.90, 1.00, 1.00, 1.05, 0.95, 0.80, 0.90, 1.00, 1.10, 1.20, 1.40,
];

/// Secondary scores derived from the full (unwindowed) collections. All
/// percentages are 0–100; `pipeline_velocity` is opportunities per day.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdvancedMetrics {
    /// Share of clients currently active.
    pub client_health_score: f64,
    /// Opportunities created per day over the trailing 30 days.
    pub pipeline_velocity: f64,
    /// Share of clients currently inactive.
    pub churn_risk: f64,
    /// Percent change in opportunity creation, trailing 30 days vs the 30
    /// before. Zero when the prior period had none.
    pub growth_trend: f64,
    /// Seasonal multiplier for the current month, times 100.
    pub seasonal_impact: f64,
    /// Win share of closed opportunities. 50 when nothing has closed yet.
    pub competitive_position: f64,
}

pub fn compute_advanced_metrics(
    clients: &[Client],
    opportunities: &[Opportunity],
    now: DateTime<Utc>,
) -> AdvancedMetrics {
    let total_clients = clients.len() as f64;
    let active = clients
        .iter()
        .filter(|c| c.status == ClientStatus::Active)
        .count() as f64;
    let inactive = clients
        .iter()
        .filter(|c| c.status == ClientStatus::Inactive)
        .count() as f64;

    let client_health_score = if total_clients > 0.0 {
        active / total_clients * 100.0
    } else {
        0.0
    };
    let churn_risk = if total_clients > 0.0 {
        inactive / total_clients * 100.0
    } else {
        0.0
    };

    let t30 = now - Duration::days(30);
    let t60 = now - Duration::days(60);
    let last_30 = opportunities
        .iter()
        .filter(|o| o.created_at > t30 && o.created_at <= now)
        .count() as f64;
    let prior_30 = opportunities
        .iter()
        .filter(|o| o.created_at > t60 && o.created_at <= t30)
        .count() as f64;

    let pipeline_velocity = last_30 / 30.0;
    let growth_trend = if prior_30 > 0.0 {
        (last_30 - prior_30) / prior_30 * 100.0
    } else {
        0.0
    };

    let seasonal_impact = SEASONAL_MULTIPLIERS[now.month0() as usize] * 100.0;

    let won = opportunities
        .iter()
        .filter(|o| o.stage == Stage::ClosedWon)
        .count() as f64;
    let lost = opportunities
        .iter()
        .filter(|o| o.stage == Stage::ClosedLost)
        .count() as f64;
    let competitive_position = if won + lost > 0.0 {
        won / (won + lost) * 100.0
    } else {
        50.0
    };

    AdvancedMetrics {
        client_health_score,
        pipeline_velocity,
        churn_risk,
        growth_trend,
        seasonal_impact,
        competitive_position,
    }
}
