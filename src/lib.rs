pub mod date_util;
pub mod error;
pub mod import;
pub mod insights;
pub mod metrics;
pub mod model;
pub mod query;
pub mod storage;

pub use error::{Error, Result};
pub use import::{ImportBundle, ImportReport};
pub use insights::{Insight, InsightKind, Priority};
pub use metrics::advanced::AdvancedMetrics;
pub use metrics::{
    ActivityItem, ActivityKind, DashboardSnapshot, MetricsRecord, RawData,
};
pub use model::{Client, ClientStatus, Opportunity, Stage, Task, TaskStatus};
pub use query::builder::QueryBuilder;
pub use query::period::{Period, PeriodShape, PeriodWindow};
pub use storage::Database;

use chrono::{DateTime, Utc};

use storage::repository;

/// Main entry point for the CRM warehouse.
pub struct CrmDw {
    db: Database,
}

impl CrmDw {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    // ── Tenant resolution ──────────────────────────────────────────

    /// Resolve the tenant to compute for. Precedence: explicit argument,
    /// cached `tenant_id` config, then auto-detection. With exactly one
    /// tenant in the warehouse it is cached and used; with none the result
    /// is `None` (dashboards render empty); with several the caller must
    /// choose one.
    pub async fn resolve_tenant(&self, explicit: Option<&str>) -> Result<Option<String>> {
        if let Some(tenant) = explicit {
            return Ok(Some(tenant.to_string()));
        }

        let cached: Option<String> = self
            .db
            .reader()
            .call(|conn| repository::get_config(conn, "tenant_id"))
            .await?;
        if cached.is_some() {
            return Ok(cached);
        }

        let orgs: Vec<String> = self
            .db
            .reader()
            .call(|conn| repository::list_org_ids(conn))
            .await?;
        match orgs.as_slice() {
            [] => Ok(None),
            [only] => {
                let org = only.clone();
                self.db
                    .writer()
                    .call({
                        let org = org.clone();
                        move |conn| {
                            repository::set_config(conn, "tenant_id", &org)?;
                            Ok::<(), rusqlite::Error>(())
                        }
                    })
                    .await?;
                Ok(Some(org))
            }
            _ => {
                let names: Vec<String> = orgs.iter().map(|o| format!("  {o}")).collect();
                Err(Error::Config(format!(
                    "multiple tenants found. Run: crmdw config set tenant_id <ORG_ID>\n{}",
                    names.join("\n")
                )))
            }
        }
    }

    // ── Dashboard pipeline ─────────────────────────────────────────

    /// Compute the full dashboard snapshot for a tenant and period.
    pub async fn dashboard(
        &self,
        tenant: Option<&str>,
        period: &Period,
    ) -> Result<DashboardSnapshot> {
        self.dashboard_at(tenant, period, Utc::now()).await
    }

    /// [`Self::dashboard`] with an explicit clock, so callers (and tests)
    /// control the reference instant.
    pub async fn dashboard_at(
        &self,
        tenant: Option<&str>,
        period: &Period,
        now: DateTime<Utc>,
    ) -> Result<DashboardSnapshot> {
        let window = period.resolve(now);
        let raw = metrics::fetch_raw_data(&self.db, tenant, &window).await?;

        let record = metrics::compute_metrics(&raw, &window);
        let recent_activity = metrics::build_recent_activity(&raw, &window);
        let advanced = metrics::advanced::compute_advanced_metrics(
            &raw.all_clients,
            &raw.all_opportunities,
            now,
        );
        let insights = insights::generate_insights(
            &raw.all_clients,
            &raw.all_opportunities,
            &raw.tasks_in_window,
            &advanced,
            now,
        );

        Ok(DashboardSnapshot {
            tenant_id: tenant.map(str::to_string),
            period_key: period.to_key(),
            metrics: record,
            recent_activity,
            advanced,
            insights,
        })
    }

    /// Metrics record only.
    pub async fn metrics(
        &self,
        tenant: Option<&str>,
        period: &Period,
    ) -> Result<MetricsRecord> {
        let window = period.resolve(Utc::now());
        let raw = metrics::fetch_raw_data(&self.db, tenant, &window).await?;
        Ok(metrics::compute_metrics(&raw, &window))
    }

    /// Recent-activity feed only.
    pub async fn recent_activity(
        &self,
        tenant: Option<&str>,
        period: &Period,
    ) -> Result<Vec<ActivityItem>> {
        let window = period.resolve(Utc::now());
        let raw = metrics::fetch_raw_data(&self.db, tenant, &window).await?;
        Ok(metrics::build_recent_activity(&raw, &window))
    }

    /// Ranked insights only.
    pub async fn insights(
        &self,
        tenant: Option<&str>,
        period: &Period,
    ) -> Result<Vec<Insight>> {
        let now = Utc::now();
        let window = period.resolve(now);
        let raw = metrics::fetch_raw_data(&self.db, tenant, &window).await?;
        let advanced = metrics::advanced::compute_advanced_metrics(
            &raw.all_clients,
            &raw.all_opportunities,
            now,
        );
        Ok(insights::generate_insights(
            &raw.all_clients,
            &raw.all_opportunities,
            &raw.tasks_in_window,
            &advanced,
            now,
        ))
    }

    // ── Import ─────────────────────────────────────────────────────

    /// Import a JSON bundle file into the warehouse.
    pub async fn import_file(&self, path: impl AsRef<std::path::Path>) -> Result<ImportReport> {
        let json = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Import(format!("{}: {e}", path.as_ref().display())))?;
        let bundle = import::parse_bundle(&json)?;
        import::import_bundle(&self.db, bundle).await
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::DataAccess(e.to_string()))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::DataAccess(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::DataAccess(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        date_util::parse_ts(s).unwrap()
    }

    async fn seeded() -> CrmDw {
        let dw = CrmDw::new(Database::open_memory().await.unwrap());
        let bundle = import::parse_bundle(
            r#"{
                "clients": [
                    {"id": "c1", "org_id": "org1", "name": "Acme", "status": "active",
                     "monthly_value": 2000.0, "created_at": "2024-01-05T12:00:00Z"},
                    {"id": "c2", "org_id": "org1", "name": "Globex", "status": "inactive",
                     "monthly_value": 800.0, "created_at": "2024-02-05T12:00:00Z"},
                    {"id": "c3", "org_id": "org1", "name": "Initech", "status": "prospect",
                     "created_at": "2024-03-05T12:00:00Z"}
                ],
                "opportunities": [
                    {"id": "o1", "org_id": "org1", "client_id": "c1", "title": "Rebrand",
                     "value": 5000.0, "stage": "closed_won",
                     "created_at": "2024-01-20T09:00:00Z", "updated_at": "2024-03-10T09:00:00Z"},
                    {"id": "o2", "org_id": "org1", "title": "SEO retainer",
                     "value": 1500.0, "stage": "proposal",
                     "created_at": "2024-03-02T09:00:00Z", "updated_at": "2024-03-02T09:00:00Z"}
                ],
                "tasks": [
                    {"id": "t1", "org_id": "org1", "title": "Draft moodboard",
                     "status": "completed", "created_at": "2024-03-04T09:00:00Z",
                     "updated_at": "2024-03-06T09:00:00Z"},
                    {"id": "t2", "org_id": "org1", "title": "Kickoff call",
                     "status": "pending", "created_at": "2024-03-08T09:00:00Z"}
                ]
            }"#,
        )
        .unwrap();
        import::import_bundle(dw.db(), bundle).await.unwrap();
        dw
    }

    #[tokio::test]
    async fn test_dashboard_snapshot_end_to_end() {
        let dw = seeded().await;
        let now = ts("2024-03-15T12:00:00Z");
        let snapshot = dw
            .dashboard_at(Some("org1"), &Period::CurrentMonth, now)
            .await
            .unwrap();

        assert_eq!(snapshot.period_key, "current_month");
        assert_eq!(snapshot.metrics.total_clients, 1); // c3 created in March
        assert_eq!(snapshot.metrics.active_clients, 1);
        assert_eq!(snapshot.metrics.total_opportunities, 1); // o2
        // o1 was created in January but won in March: counted.
        assert_eq!(snapshot.metrics.won_opportunities, 1);
        assert_eq!(snapshot.metrics.total_revenue, 5000.0 + 2000.0);
        assert_eq!(snapshot.metrics.completed_tasks, 1);
        assert_eq!(snapshot.metrics.pending_tasks, 1);

        assert!(!snapshot.recent_activity.is_empty());
        assert!(snapshot.recent_activity.len() <= 4);

        // One inactive client out of three puts churn risk at ~33%.
        assert!((snapshot.advanced.churn_risk - 100.0 / 3.0).abs() < 1e-9);
        // o2 stalled (last touched Mar 2, >7 days before the 15th).
        assert!(snapshot
            .insights
            .iter()
            .any(|i| i.kind == InsightKind::PipelineReactivation));
    }

    #[tokio::test]
    async fn test_dashboard_without_tenant_is_zeroed() {
        let dw = seeded().await;
        let snapshot = dw
            .dashboard_at(None, &Period::CurrentMonth, ts("2024-03-15T12:00:00Z"))
            .await
            .unwrap();
        assert_eq!(snapshot.tenant_id, None);
        assert_eq!(snapshot.metrics.total_clients, 0);
        assert_eq!(snapshot.metrics.total_revenue, 0.0);
        assert!(snapshot.recent_activity.is_empty());
        assert!(snapshot.insights.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_tenant_auto_detects_single_org() {
        let dw = seeded().await;
        assert_eq!(
            dw.resolve_tenant(None).await.unwrap().as_deref(),
            Some("org1")
        );
        // Cached for the next call.
        assert_eq!(
            dw.config_get("tenant_id").await.unwrap().as_deref(),
            Some("org1")
        );
        // Explicit flag still wins.
        assert_eq!(
            dw.resolve_tenant(Some("org9")).await.unwrap().as_deref(),
            Some("org9")
        );
    }

    #[tokio::test]
    async fn test_resolve_tenant_empty_warehouse() {
        let dw = CrmDw::new(Database::open_memory().await.unwrap());
        assert_eq!(dw.resolve_tenant(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resolve_tenant_multiple_orgs_errors() {
        let dw = seeded().await;
        let bundle = import::parse_bundle(
            r#"{"clients": [{"id": "x1", "org_id": "org2", "name": "Other",
                "created_at": "2024-01-01T00:00:00Z"}]}"#,
        )
        .unwrap();
        import::import_bundle(dw.db(), bundle).await.unwrap();

        match dw.resolve_tenant(None).await {
            Err(Error::Config(msg)) => assert!(msg.contains("org2")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }
}
