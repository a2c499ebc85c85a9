use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Client, Opportunity, Task};
use crate::storage::{repository, Database};

/// A JSON export from the hosted backend: any subset of the three
/// collections. Records carry their own `org_id`, so one bundle may span
/// tenants.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportBundle {
    #[serde(default)]
    pub clients: Vec<Client>,
    #[serde(default)]
    pub opportunities: Vec<Opportunity>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Report returned after an import completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub clients: u64,
    pub opportunities: u64,
    pub tasks: u64,
}

impl ImportReport {
    pub fn total(&self) -> u64 {
        self.clients + self.opportunities + self.tasks
    }
}

/// Parse a bundle from JSON text.
pub fn parse_bundle(json: &str) -> Result<ImportBundle> {
    serde_json::from_str(json).map_err(|e| Error::Import(e.to_string()))
}

/// Upsert every record in the bundle. Re-importing the same bundle is
/// idempotent: rows are keyed by id.
pub async fn import_bundle(db: &Database, bundle: ImportBundle) -> Result<ImportReport> {
    let report = ImportReport {
        clients: bundle.clients.len() as u64,
        opportunities: bundle.opportunities.len() as u64,
        tasks: bundle.tasks.len() as u64,
    };

    db.writer()
        .call(move |conn| {
            let tx = conn.transaction()?;
            for client in &bundle.clients {
                repository::upsert_client(&tx, client)?;
            }
            for opportunity in &bundle.opportunities {
                repository::upsert_opportunity(&tx, opportunity)?;
            }
            for task in &bundle.tasks {
                repository::upsert_task(&tx, task)?;
            }
            repository::set_config(&tx, "last_import_at", &chrono::Utc::now().to_rfc3339())?;
            tx.commit()?;
            Ok::<(), rusqlite::Error>(())
        })
        .await?;

    log::info!(
        "imported {} records ({} clients, {} opportunities, {} tasks)",
        report.total(),
        report.clients,
        report.opportunities,
        report.tasks
    );
    Ok(report)
}
