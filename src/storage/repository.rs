use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::date_util::{format_ts, parse_ts};
use crate::model::{Client, ClientStatus, Opportunity, Stage, Task, TaskStatus};

// ── Clients ────────────────────────────────────────────────────────

pub fn upsert_client(conn: &Connection, client: &Client) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO clients (id, org_id, name, status, monthly_value, created_at, cached_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
            org_id=excluded.org_id, name=excluded.name, status=excluded.status,
            monthly_value=excluded.monthly_value, created_at=excluded.created_at,
            cached_at=excluded.cached_at",
        params![
            client.id,
            client.org_id,
            client.name,
            client.status.as_str(),
            client.monthly_value,
            format_ts(client.created_at),
        ],
    )?;
    Ok(())
}

/// Clients for a tenant, in creation order. `window` filters on
/// `created_at` (inclusive on both ends); `None` returns every record.
pub fn list_clients(
    conn: &Connection,
    org_id: &str,
    window: Option<(&str, &str)>,
) -> Result<Vec<Client>, rusqlite::Error> {
    let mut out = Vec::new();
    match window {
        Some((start, end)) => {
            let mut stmt = conn.prepare(
                "SELECT id, org_id, name, status, monthly_value, created_at
                 FROM clients
                 WHERE org_id = ?1 AND created_at >= ?2 AND created_at <= ?3
                 ORDER BY created_at, id",
            )?;
            let rows = stmt.query_map(params![org_id, start, end], client_from_row)?;
            for row in rows {
                out.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, org_id, name, status, monthly_value, created_at
                 FROM clients WHERE org_id = ?1 ORDER BY created_at, id",
            )?;
            let rows = stmt.query_map(params![org_id], client_from_row)?;
            for row in rows {
                out.push(row?);
            }
        }
    }
    Ok(out)
}

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    let status: String = row.get(3)?;
    Ok(Client {
        id: row.get(0)?,
        org_id: row.get(1)?,
        name: row.get(2)?,
        status: ClientStatus::parse(&status),
        monthly_value: row.get(4)?,
        created_at: ts_col(row, 5)?,
    })
}

// ── Opportunities ──────────────────────────────────────────────────

pub fn upsert_opportunity(
    conn: &Connection,
    opportunity: &Opportunity,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO opportunities (id, org_id, client_id, title, value, stage, created_at, updated_at, cached_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
            org_id=excluded.org_id, client_id=excluded.client_id, title=excluded.title,
            value=excluded.value, stage=excluded.stage, created_at=excluded.created_at,
            updated_at=excluded.updated_at, cached_at=excluded.cached_at",
        params![
            opportunity.id,
            opportunity.org_id,
            opportunity.client_id,
            opportunity.title,
            opportunity.value,
            opportunity.stage.as_str(),
            format_ts(opportunity.created_at),
            opportunity.updated_at.map(format_ts),
        ],
    )?;
    Ok(())
}

pub fn list_opportunities(
    conn: &Connection,
    org_id: &str,
    window: Option<(&str, &str)>,
) -> Result<Vec<Opportunity>, rusqlite::Error> {
    let mut out = Vec::new();
    match window {
        Some((start, end)) => {
            let mut stmt = conn.prepare(
                "SELECT id, org_id, client_id, title, value, stage, created_at, updated_at
                 FROM opportunities
                 WHERE org_id = ?1 AND created_at >= ?2 AND created_at <= ?3
                 ORDER BY created_at, id",
            )?;
            let rows = stmt.query_map(params![org_id, start, end], opportunity_from_row)?;
            for row in rows {
                out.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, org_id, client_id, title, value, stage, created_at, updated_at
                 FROM opportunities WHERE org_id = ?1 ORDER BY created_at, id",
            )?;
            let rows = stmt.query_map(params![org_id], opportunity_from_row)?;
            for row in rows {
                out.push(row?);
            }
        }
    }
    Ok(out)
}

fn opportunity_from_row(row: &Row<'_>) -> rusqlite::Result<Opportunity> {
    let stage: String = row.get(5)?;
    Ok(Opportunity {
        id: row.get(0)?,
        org_id: row.get(1)?,
        client_id: row.get(2)?,
        title: row.get(3)?,
        value: row.get(4)?,
        stage: Stage::parse(&stage),
        created_at: ts_col(row, 6)?,
        updated_at: opt_ts_col(row, 7)?,
    })
}

// ── Tasks ──────────────────────────────────────────────────────────

pub fn upsert_task(conn: &Connection, task: &Task) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO tasks (id, org_id, client_id, title, status, due_date, created_at, updated_at, cached_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET
            org_id=excluded.org_id, client_id=excluded.client_id, title=excluded.title,
            status=excluded.status, due_date=excluded.due_date, created_at=excluded.created_at,
            updated_at=excluded.updated_at, cached_at=excluded.cached_at",
        params![
            task.id,
            task.org_id,
            task.client_id,
            task.title,
            task.status.as_str(),
            task.due_date.map(format_ts),
            format_ts(task.created_at),
            task.updated_at.map(format_ts),
        ],
    )?;
    Ok(())
}

pub fn list_tasks(
    conn: &Connection,
    org_id: &str,
    window: Option<(&str, &str)>,
) -> Result<Vec<Task>, rusqlite::Error> {
    let mut out = Vec::new();
    match window {
        Some((start, end)) => {
            let mut stmt = conn.prepare(
                "SELECT id, org_id, client_id, title, status, due_date, created_at, updated_at
                 FROM tasks
                 WHERE org_id = ?1 AND created_at >= ?2 AND created_at <= ?3
                 ORDER BY created_at, id",
            )?;
            let rows = stmt.query_map(params![org_id, start, end], task_from_row)?;
            for row in rows {
                out.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, org_id, client_id, title, status, due_date, created_at, updated_at
                 FROM tasks WHERE org_id = ?1 ORDER BY created_at, id",
            )?;
            let rows = stmt.query_map(params![org_id], task_from_row)?;
            for row in rows {
                out.push(row?);
            }
        }
    }
    Ok(out)
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(4)?;
    Ok(Task {
        id: row.get(0)?,
        org_id: row.get(1)?,
        client_id: row.get(2)?,
        title: row.get(3)?,
        status: TaskStatus::parse(&status),
        due_date: opt_ts_col(row, 5)?,
        created_at: ts_col(row, 6)?,
        updated_at: opt_ts_col(row, 7)?,
    })
}

// ── Tenants ────────────────────────────────────────────────────────

/// Distinct tenant ids seen across the warehouse.
pub fn list_org_ids(conn: &Connection) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT org_id FROM clients
         UNION SELECT org_id FROM opportunities
         UNION SELECT org_id FROM tasks
         ORDER BY org_id",
    )?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ── App config ─────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ── Column helpers ─────────────────────────────────────────────────

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_ts(&s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {s}").into(),
        )
    })
}

fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(s) => ts_col_from_str(idx, &s).map(Some),
        None => Ok(None),
    }
}

fn ts_col_from_str(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    parse_ts(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid timestamp: {s}").into(),
        )
    })
}
