pub mod advanced;
pub mod types;

pub use types::*;

use crate::date_util::format_ts;
use crate::error::{Error, Result};
use crate::model::{Client, ClientStatus, Opportunity, Stage, Task, TaskStatus};
use crate::query::period::PeriodWindow;
use crate::storage::{repository, Database};

/// The entity collections one dashboard computation runs over.
///
/// The `*_in_window` collections hold records created inside the period;
/// the `all_*` collections are date-unfiltered because status-dependent
/// figures (active clients, won deals, stage breakdowns) must reflect
/// current state regardless of when the record was created.
#[derive(Debug, Clone, Default)]
pub struct RawData {
    pub clients_in_window: Vec<Client>,
    pub all_clients: Vec<Client>,
    pub opportunities_in_window: Vec<Opportunity>,
    pub all_opportunities: Vec<Opportunity>,
    pub tasks_in_window: Vec<Task>,
}

/// Load the collections for a tenant and window in one reader pass.
///
/// No tenant selected is not a failure: the dashboard simply renders empty.
/// A failing read is fatal for the current computation and surfaces as
/// [`Error::DataAccess`]; there is no retry and no partial result.
pub async fn fetch_raw_data(
    db: &Database,
    tenant: Option<&str>,
    window: &PeriodWindow,
) -> Result<RawData> {
    let Some(org_id) = tenant else {
        log::debug!("no tenant selected; returning empty collections");
        return Ok(RawData::default());
    };

    let org_id = org_id.to_string();
    let start = format_ts(window.start);
    let end = format_ts(window.end);

    db.reader()
        .call(move |conn| {
            let range = (start.as_str(), end.as_str());
            Ok::<RawData, rusqlite::Error>(RawData {
                clients_in_window: repository::list_clients(conn, &org_id, Some(range))?,
                all_clients: repository::list_clients(conn, &org_id, None)?,
                opportunities_in_window: repository::list_opportunities(conn, &org_id, Some(range))?,
                all_opportunities: repository::list_opportunities(conn, &org_id, None)?,
                tasks_in_window: repository::list_tasks(conn, &org_id, Some(range))?,
            })
        })
        .await
        .map_err(|e| Error::DataAccess(e.to_string()))
}

/// Compute the dashboard metrics record. Pure and total: empty collections
/// produce a zeroed record, absent numeric fields count as zero.
pub fn compute_metrics(raw: &RawData, window: &PeriodWindow) -> MetricsRecord {
    let total_clients = raw.clients_in_window.len() as u64;
    let active_clients = raw
        .all_clients
        .iter()
        .filter(|c| c.status == ClientStatus::Active)
        .count() as u64;
    let total_opportunities = raw.opportunities_in_window.len() as u64;

    // Deliberate asymmetry: wins are counted over the full collection, so a
    // deal opened before the window but closed inside it still counts.
    let won_in_window =
        |o: &&Opportunity| o.stage == Stage::ClosedWon && window.contains(o.last_activity_at());
    let won_opportunities = raw.all_opportunities.iter().filter(won_in_window).count() as u64;

    let won_revenue: f64 = raw
        .all_opportunities
        .iter()
        .filter(won_in_window)
        .map(|o| o.value.unwrap_or(0.0))
        .sum();
    let recurring_revenue: f64 = raw
        .all_clients
        .iter()
        .filter(|c| c.status == ClientStatus::Active)
        .map(|c| c.monthly_value.unwrap_or(0.0))
        .sum();

    let pending_tasks = raw
        .tasks_in_window
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .count() as u64;
    let completed_tasks = raw
        .tasks_in_window
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count() as u64;

    let conversion_rate = if total_opportunities > 0 {
        won_opportunities as f64 / total_opportunities as f64 * 100.0
    } else {
        0.0
    };

    let opportunities_by_stage = Stage::ALL
        .iter()
        .map(|&stage| StageCount {
            stage,
            label: stage.label(),
            count: raw
                .all_opportunities
                .iter()
                .filter(|o| o.stage == stage)
                .count() as u64,
        })
        .collect();

    let tasks_by_status = TaskStatus::ALL
        .iter()
        .map(|&status| TaskStatusCount {
            status,
            label: status.label(),
            count: raw
                .tasks_in_window
                .iter()
                .filter(|t| t.status == status)
                .count() as u64,
        })
        .collect();

    let clients_by_status = ClientStatus::ALL
        .iter()
        .map(|&status| ClientStatusCount {
            status,
            label: status.label(),
            count: raw
                .all_clients
                .iter()
                .filter(|c| c.status == status)
                .count() as u64,
        })
        .collect();

    MetricsRecord {
        total_clients,
        active_clients,
        total_opportunities,
        won_opportunities,
        total_revenue: won_revenue + recurring_revenue,
        pending_tasks,
        completed_tasks,
        conversion_rate,
        opportunities_by_stage,
        tasks_by_status,
        clients_by_status,
    }
}

/// Maximum entries in the recent-activity feed.
const ACTIVITY_CAP: usize = 4;

/// Build the recent-activity feed: the two newest clients, at most one deal
/// won inside the window, at most one completed task from the windowed set.
///
/// Categories are concatenated in that fixed order rather than merged
/// chronologically; the dashboard renders the feed this way.
pub fn build_recent_activity(raw: &RawData, window: &PeriodWindow) -> Vec<ActivityItem> {
    let mut items = Vec::new();

    let skip = raw.all_clients.len().saturating_sub(2);
    for client in &raw.all_clients[skip..] {
        items.push(ActivityItem {
            kind: ActivityKind::ClientAdded,
            title: format!("New client: {}", client.name),
            detail: format!("Status: {}", client.status.label()),
            occurred_at: client.created_at,
        });
    }

    if let Some(opp) = raw
        .all_opportunities
        .iter()
        .rev()
        .find(|o| o.stage == Stage::ClosedWon && window.contains(o.last_activity_at()))
    {
        let detail = match opp.value {
            Some(v) => format!("Closed for {}", format_money(v)),
            None => "Closed with no recorded value".to_string(),
        };
        items.push(ActivityItem {
            kind: ActivityKind::OpportunityWon,
            title: format!("Opportunity won: {}", opp.title),
            detail,
            occurred_at: opp.last_activity_at(),
        });
    }

    if let Some(task) = raw
        .tasks_in_window
        .iter()
        .rev()
        .find(|t| t.status == TaskStatus::Completed)
    {
        items.push(ActivityItem {
            kind: ActivityKind::TaskCompleted,
            title: format!("Task completed: {}", task.title),
            detail: String::new(),
            occurred_at: task.updated_at.unwrap_or(task.created_at),
        });
    }

    items.truncate(ACTIVITY_CAP);
    items
}

pub(crate) fn format_money(v: f64) -> String {
    format!("${v:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Client, Task};
    use crate::query::period::Period;
    use chrono::{DateTime, Utc};

    fn ts(s: &str) -> DateTime<Utc> {
        crate::date_util::parse_ts(s).unwrap()
    }

    fn client(id: &str, status: ClientStatus, monthly: Option<f64>, created: &str) -> Client {
        Client {
            id: id.to_string(),
            org_id: "org1".to_string(),
            name: format!("Client {id}"),
            status,
            monthly_value: monthly,
            created_at: ts(created),
        }
    }

    fn opp(id: &str, stage: Stage, value: Option<f64>, created: &str, updated: Option<&str>) -> Opportunity {
        Opportunity {
            id: id.to_string(),
            org_id: "org1".to_string(),
            client_id: None,
            title: format!("Deal {id}"),
            value,
            stage,
            created_at: ts(created),
            updated_at: updated.map(ts),
        }
    }

    fn task(id: &str, status: TaskStatus, created: &str) -> Task {
        Task {
            id: id.to_string(),
            org_id: "org1".to_string(),
            client_id: None,
            title: format!("Task {id}"),
            status,
            due_date: None,
            created_at: ts(created),
            updated_at: None,
        }
    }

    fn march_window() -> PeriodWindow {
        Period::CurrentMonth.resolve(ts("2024-03-15T12:00:00Z"))
    }

    #[test]
    fn test_empty_raw_produces_zeroed_record() {
        let m = compute_metrics(&RawData::default(), &march_window());
        assert_eq!(m.total_clients, 0);
        assert_eq!(m.active_clients, 0);
        assert_eq!(m.total_opportunities, 0);
        assert_eq!(m.won_opportunities, 0);
        assert_eq!(m.total_revenue, 0.0);
        assert_eq!(m.conversion_rate, 0.0);
        // Breakdown tables keep their fixed buckets even when empty.
        assert_eq!(m.opportunities_by_stage.len(), 6);
        assert_eq!(m.tasks_by_status.len(), 4);
        assert_eq!(m.clients_by_status.len(), 3);
        assert!(m.opportunities_by_stage.iter().all(|s| s.count == 0));
    }

    #[test]
    fn test_compute_metrics_is_idempotent() {
        let raw = RawData {
            clients_in_window: vec![client("c1", ClientStatus::Active, Some(500.0), "2024-03-02T09:00:00Z")],
            all_clients: vec![
                client("c1", ClientStatus::Active, Some(500.0), "2024-03-02T09:00:00Z"),
                client("c2", ClientStatus::Inactive, None, "2024-01-02T09:00:00Z"),
            ],
            opportunities_in_window: vec![opp("o1", Stage::Proposal, Some(1000.0), "2024-03-05T09:00:00Z", None)],
            all_opportunities: vec![
                opp("o1", Stage::Proposal, Some(1000.0), "2024-03-05T09:00:00Z", None),
                opp("o2", Stage::ClosedWon, Some(2000.0), "2024-02-01T09:00:00Z", Some("2024-03-10T09:00:00Z")),
            ],
            tasks_in_window: vec![task("t1", TaskStatus::Pending, "2024-03-06T09:00:00Z")],
        };
        let w = march_window();
        assert_eq!(compute_metrics(&raw, &w), compute_metrics(&raw, &w));
    }

    #[test]
    fn test_breakdown_totals_cover_collections() {
        let raw = RawData {
            all_clients: vec![
                client("c1", ClientStatus::Active, None, "2024-01-01T00:00:00Z"),
                client("c2", ClientStatus::Prospect, None, "2024-01-02T00:00:00Z"),
                client("c3", ClientStatus::Inactive, None, "2024-01-03T00:00:00Z"),
                client("c4", ClientStatus::Active, None, "2024-01-04T00:00:00Z"),
            ],
            all_opportunities: vec![
                opp("o1", Stage::Prospection, None, "2024-01-01T00:00:00Z", None),
                opp("o2", Stage::Negotiation, None, "2024-01-02T00:00:00Z", None),
                opp("o3", Stage::ClosedLost, None, "2024-01-03T00:00:00Z", None),
            ],
            ..RawData::default()
        };
        let m = compute_metrics(&raw, &march_window());

        let stage_total: u64 = m.opportunities_by_stage.iter().map(|s| s.count).sum();
        assert_eq!(stage_total, raw.all_opportunities.len() as u64);

        let client_total: u64 = m.clients_by_status.iter().map(|s| s.count).sum();
        assert_eq!(client_total, raw.all_clients.len() as u64);
    }

    #[test]
    fn test_conversion_rate_bounds() {
        let raw = RawData {
            opportunities_in_window: vec![
                opp("o1", Stage::ClosedWon, None, "2024-03-05T09:00:00Z", Some("2024-03-06T09:00:00Z")),
                opp("o2", Stage::Proposal, None, "2024-03-05T10:00:00Z", None),
            ],
            all_opportunities: vec![
                opp("o1", Stage::ClosedWon, None, "2024-03-05T09:00:00Z", Some("2024-03-06T09:00:00Z")),
                opp("o2", Stage::Proposal, None, "2024-03-05T10:00:00Z", None),
            ],
            ..RawData::default()
        };
        let m = compute_metrics(&raw, &march_window());
        assert!(m.conversion_rate >= 0.0 && m.conversion_rate <= 100.0);
        assert_eq!(m.conversion_rate, 50.0);
    }

    #[test]
    fn test_missing_values_contribute_zero_not_nan() {
        let raw = RawData {
            all_clients: vec![
                client("c1", ClientStatus::Active, None, "2024-01-01T00:00:00Z"),
                client("c2", ClientStatus::Active, Some(300.0), "2024-01-02T00:00:00Z"),
            ],
            all_opportunities: vec![opp(
                "o1",
                Stage::ClosedWon,
                None,
                "2024-03-05T09:00:00Z",
                Some("2024-03-06T09:00:00Z"),
            )],
            ..RawData::default()
        };
        let m = compute_metrics(&raw, &march_window());
        assert!(m.total_revenue.is_finite());
        assert_eq!(m.total_revenue, 300.0);
    }

    #[test]
    fn test_won_counts_deals_created_before_window() {
        // Created in January, closed in March: counts toward a March window.
        let won = opp(
            "o1",
            Stage::ClosedWon,
            Some(1500.0),
            "2024-01-10T09:00:00Z",
            Some("2024-03-10T09:00:00Z"),
        );
        let raw = RawData {
            all_opportunities: vec![won],
            ..RawData::default()
        };
        let m = compute_metrics(&raw, &march_window());
        assert_eq!(m.total_opportunities, 0);
        assert_eq!(m.won_opportunities, 1);
        assert_eq!(m.total_revenue, 1500.0);
        // Nothing created in the window, so the rate stays zero.
        assert_eq!(m.conversion_rate, 0.0);
    }

    #[test]
    fn test_won_falls_back_to_created_at() {
        // Never updated after creation: created_at decides window membership.
        let won = opp("o1", Stage::ClosedWon, Some(700.0), "2024-03-04T09:00:00Z", None);
        let raw = RawData {
            all_opportunities: vec![won],
            ..RawData::default()
        };
        let m = compute_metrics(&raw, &march_window());
        assert_eq!(m.won_opportunities, 1);
    }

    #[test]
    fn test_won_outside_window_not_counted() {
        let won = opp(
            "o1",
            Stage::ClosedWon,
            Some(700.0),
            "2024-01-04T09:00:00Z",
            Some("2024-02-20T09:00:00Z"),
        );
        let raw = RawData {
            all_opportunities: vec![won],
            ..RawData::default()
        };
        let m = compute_metrics(&raw, &march_window());
        assert_eq!(m.won_opportunities, 0);
        assert_eq!(m.total_revenue, 0.0);
    }

    #[test]
    fn test_client_status_breakdown_scenario() {
        // 10 clients: 7 active, 2 inactive, 1 prospect.
        let mut all = Vec::new();
        for i in 0..7 {
            all.push(client(&format!("a{i}"), ClientStatus::Active, None, "2024-01-01T00:00:00Z"));
        }
        for i in 0..2 {
            all.push(client(&format!("i{i}"), ClientStatus::Inactive, None, "2024-01-01T00:00:00Z"));
        }
        all.push(client("p0", ClientStatus::Prospect, None, "2024-01-01T00:00:00Z"));

        let raw = RawData {
            all_clients: all,
            ..RawData::default()
        };
        let m = compute_metrics(&raw, &march_window());
        assert_eq!(m.active_clients, 7);
        let counts: Vec<u64> = m.clients_by_status.iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![7, 2, 1]);
    }

    #[test]
    fn test_won_and_lost_today() {
        let now = ts("2024-03-15T18:00:00Z");
        let w = Period::Today.resolve(now);
        let opps = vec![
            opp("o1", Stage::ClosedWon, Some(1000.0), "2024-03-15T09:00:00Z", Some("2024-03-15T10:00:00Z")),
            opp("o2", Stage::ClosedLost, Some(500.0), "2024-03-15T09:30:00Z", Some("2024-03-15T11:00:00Z")),
        ];
        let raw = RawData {
            opportunities_in_window: opps.clone(),
            all_opportunities: opps,
            ..RawData::default()
        };
        let m = compute_metrics(&raw, &w);
        assert_eq!(m.total_opportunities, 2);
        assert_eq!(m.won_opportunities, 1);
        assert_eq!(m.conversion_rate, 50.0);
        assert_eq!(m.total_revenue, 1000.0);
    }

    #[tokio::test]
    async fn test_fetch_without_tenant_is_empty_not_error() {
        let db = Database::open_memory().await.unwrap();
        let w = march_window();
        let raw = fetch_raw_data(&db, None, &w).await.unwrap();
        assert!(raw.all_clients.is_empty());
        assert!(raw.all_opportunities.is_empty());
        assert!(raw.tasks_in_window.is_empty());

        let m = compute_metrics(&raw, &w);
        assert_eq!(m, compute_metrics(&RawData::default(), &w));
    }

    #[tokio::test]
    async fn test_fetch_splits_window_and_full_collections() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                repository::upsert_client(
                    conn,
                    &Client {
                        id: "c1".into(),
                        org_id: "org1".into(),
                        name: "Old Client".into(),
                        status: ClientStatus::Active,
                        monthly_value: Some(400.0),
                        created_at: crate::date_util::parse_ts("2023-11-01T09:00:00Z").unwrap(),
                    },
                )?;
                repository::upsert_client(
                    conn,
                    &Client {
                        id: "c2".into(),
                        org_id: "org1".into(),
                        name: "New Client".into(),
                        status: ClientStatus::Prospect,
                        monthly_value: None,
                        created_at: crate::date_util::parse_ts("2024-03-05T09:00:00Z").unwrap(),
                    },
                )?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let raw = fetch_raw_data(&db, Some("org1"), &march_window()).await.unwrap();
        assert_eq!(raw.all_clients.len(), 2);
        assert_eq!(raw.clients_in_window.len(), 1);
        assert_eq!(raw.clients_in_window[0].id, "c2");
    }

    #[test]
    fn test_activity_feed_order_and_cap() {
        let w = march_window();
        let raw = RawData {
            all_clients: vec![
                client("c1", ClientStatus::Active, None, "2024-01-01T00:00:00Z"),
                client("c2", ClientStatus::Active, None, "2024-02-01T00:00:00Z"),
                client("c3", ClientStatus::Prospect, None, "2024-03-01T00:00:00Z"),
            ],
            all_opportunities: vec![opp(
                "o1",
                Stage::ClosedWon,
                Some(900.0),
                "2024-02-15T00:00:00Z",
                Some("2024-03-10T00:00:00Z"),
            )],
            tasks_in_window: vec![{
                let mut t = task("t1", TaskStatus::Completed, "2024-03-08T00:00:00Z");
                t.updated_at = Some(ts("2024-03-09T00:00:00Z"));
                t
            }],
            ..RawData::default()
        };

        let feed = build_recent_activity(&raw, &w);
        assert_eq!(feed.len(), 4);
        // Fixed category order: clients, then the win, then the task. The
        // feed is intentionally not merged chronologically.
        assert_eq!(feed[0].kind, ActivityKind::ClientAdded);
        assert_eq!(feed[0].title, "New client: Client c2");
        assert_eq!(feed[1].title, "New client: Client c3");
        assert_eq!(feed[2].kind, ActivityKind::OpportunityWon);
        assert_eq!(feed[2].detail, "Closed for $900.00");
        assert_eq!(feed[3].kind, ActivityKind::TaskCompleted);
        assert_eq!(feed[3].occurred_at, ts("2024-03-09T00:00:00Z"));
    }

    #[test]
    fn test_activity_feed_skips_absent_categories() {
        let w = march_window();
        let raw = RawData {
            all_clients: vec![client("c1", ClientStatus::Active, None, "2024-01-01T00:00:00Z")],
            ..RawData::default()
        };
        let feed = build_recent_activity(&raw, &w);
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].kind, ActivityKind::ClientAdded);
    }
}
