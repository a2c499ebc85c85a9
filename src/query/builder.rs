use serde::Serialize;

use crate::error::Result;
use crate::model::Stage;
use crate::storage::Database;

/// A row from an opportunity query.
#[derive(Debug, Clone, Serialize)]
pub struct OpportunityRow {
    pub id: String,
    pub title: String,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub value: Option<f64>,
    pub stage: String,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// Builder for constructing opportunity queries with optional filters.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    org_id: Option<String>,
    client_id: Option<String>,
    stage: Option<Stage>,
    open: Option<bool>,
    min_value: Option<f64>,
    max_value: Option<f64>,
    created_after: Option<String>,
    created_before: Option<String>,
    limit: Option<u32>,
    order_by: Option<String>,
    order_desc: bool,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn org(mut self, org_id: &str) -> Self {
        self.org_id = Some(org_id.to_string());
        self
    }

    pub fn client(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    /// `true` keeps only open stages, `false` only closed ones.
    pub fn open(mut self, val: bool) -> Self {
        self.open = Some(val);
        self
    }

    pub fn min_value(mut self, val: f64) -> Self {
        self.min_value = Some(val);
        self
    }

    pub fn max_value(mut self, val: f64) -> Self {
        self.max_value = Some(val);
        self
    }

    pub fn created_after(mut self, date: &str) -> Self {
        self.created_after = Some(date.to_string());
        self
    }

    pub fn created_before(mut self, date: &str) -> Self {
        self.created_before = Some(date.to_string());
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by = Some(field.to_string());
        self
    }

    pub fn descending(mut self) -> Self {
        self.order_desc = true;
        self
    }

    /// Build and execute the query, returning opportunity rows.
    pub async fn rows(self, db: &Database) -> Result<Vec<OpportunityRow>> {
        let builder = self;
        db.reader()
            .call(move |conn| {
                let (sql, params) = builder.build_sql();
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(param_refs.as_slice(), |row| {
                    Ok(OpportunityRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        client_id: row.get(2)?,
                        client_name: row.get(3)?,
                        value: row.get(4)?,
                        stage: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                })?;
                let result: std::result::Result<Vec<OpportunityRow>, _> = rows.collect();
                result
            })
            .await
            .map_err(|e| crate::error::Error::DataAccess(e.to_string()))
    }

    /// Build and execute the query, returning a count of matching rows.
    pub async fn count(self, db: &Database) -> Result<u64> {
        let builder = self;
        db.reader()
            .call(move |conn| {
                let (inner_sql, params) = builder.build_sql();
                let sql = format!("SELECT COUNT(*) FROM ({inner_sql})");
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
                Ok::<u64, rusqlite::Error>(count as u64)
            })
            .await
            .map_err(|e| crate::error::Error::DataAccess(e.to_string()))
    }

    /// Build and execute the query, returning results as JSON.
    pub async fn to_json(self, db: &Database) -> Result<String> {
        let rows = self.rows(db).await?;
        serde_json::to_string_pretty(&rows).map_err(|e| crate::error::Error::Other(e.to_string()))
    }

    /// Build and execute the query, returning results as CSV.
    pub async fn to_csv(self, db: &Database) -> Result<String> {
        let rows = self.rows(db).await?;
        let mut out = String::new();
        out.push_str("id,title,client_id,client_name,value,stage,created_at,updated_at\n");
        for row in &rows {
            out.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                csv_escape(&row.id),
                csv_escape(&row.title),
                csv_escape(row.client_id.as_deref().unwrap_or("")),
                csv_escape(row.client_name.as_deref().unwrap_or("")),
                row.value.map_or(String::new(), |v| v.to_string()),
                csv_escape(&row.stage),
                csv_escape(&row.created_at),
                csv_escape(row.updated_at.as_deref().unwrap_or("")),
            ));
        }
        Ok(out)
    }

    fn build_sql(&self) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut wheres = Vec::new();
        let mut param_idx = 1;

        let select = "SELECT o.id, o.title, o.client_id, c.name as client_name,
                o.value, o.stage, o.created_at, o.updated_at
            FROM opportunities o
            LEFT JOIN clients c ON c.id = o.client_id";

        if let Some(ref org) = self.org_id {
            wheres.push(format!("o.org_id = ?{param_idx}"));
            params.push(Box::new(org.clone()));
            param_idx += 1;
        }

        if let Some(ref client) = self.client_id {
            wheres.push(format!("o.client_id = ?{param_idx}"));
            params.push(Box::new(client.clone()));
            param_idx += 1;
        }

        if let Some(stage) = self.stage {
            wheres.push(format!("o.stage = ?{param_idx}"));
            params.push(Box::new(stage.as_str()));
            param_idx += 1;
        }

        if let Some(open) = self.open {
            if open {
                wheres.push("o.stage NOT IN ('closed_won', 'closed_lost')".to_string());
            } else {
                wheres.push("o.stage IN ('closed_won', 'closed_lost')".to_string());
            }
        }

        if let Some(min) = self.min_value {
            wheres.push(format!("o.value >= ?{param_idx}"));
            params.push(Box::new(min));
            param_idx += 1;
        }
        if let Some(max) = self.max_value {
            wheres.push(format!("o.value <= ?{param_idx}"));
            params.push(Box::new(max));
            param_idx += 1;
        }

        if let Some(ref date) = self.created_after {
            wheres.push(format!("o.created_at >= ?{param_idx}"));
            params.push(Box::new(date.clone()));
            param_idx += 1;
        }
        if let Some(ref date) = self.created_before {
            wheres.push(format!("o.created_at <= ?{param_idx}"));
            params.push(Box::new(date.clone()));
            param_idx += 1;
        }

        let mut sql = select.to_string();
        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres.join(" AND "));
        }

        let order_field = self.order_by.as_deref().unwrap_or("o.created_at");
        let order_dir = if self.order_desc { "DESC" } else { "ASC" };
        sql.push_str(&format!(" ORDER BY {order_field} {order_dir}"));

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT ?{param_idx}"));
            params.push(Box::new(limit));
        }

        (sql, params)
    }
}

fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
