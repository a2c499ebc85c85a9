use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a client account.
///
/// Unknown or absent values parse as `Active` — upstream records predating
/// the status column carry no value at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    #[default]
    Active,
    Inactive,
    Prospect,
}

impl ClientStatus {
    pub const ALL: [ClientStatus; 3] = [
        ClientStatus::Active,
        ClientStatus::Inactive,
        ClientStatus::Prospect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStatus::Active => "active",
            ClientStatus::Inactive => "inactive",
            ClientStatus::Prospect => "prospect",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "inactive" => ClientStatus::Inactive,
            "prospect" => ClientStatus::Prospect,
            _ => ClientStatus::Active,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ClientStatus::Active => "Active",
            ClientStatus::Inactive => "Inactive",
            ClientStatus::Prospect => "Prospect",
        }
    }
}

/// Kanban pipeline stage of an opportunity. Declared in board order; the
/// stage breakdown table preserves this order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Prospection,
    Qualification,
    Proposal,
    Negotiation,
    ClosedWon,
    ClosedLost,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Prospection,
        Stage::Qualification,
        Stage::Proposal,
        Stage::Negotiation,
        Stage::ClosedWon,
        Stage::ClosedLost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prospection => "prospection",
            Stage::Qualification => "qualification",
            Stage::Proposal => "proposal",
            Stage::Negotiation => "negotiation",
            Stage::ClosedWon => "closed_won",
            Stage::ClosedLost => "closed_lost",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "qualification" => Stage::Qualification,
            "proposal" => Stage::Proposal,
            "negotiation" => Stage::Negotiation,
            "closed_won" => Stage::ClosedWon,
            "closed_lost" => Stage::ClosedLost,
            _ => Stage::Prospection,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Prospection => "Prospection",
            Stage::Qualification => "Qualification",
            Stage::Proposal => "Proposal",
            Stage::Negotiation => "Negotiation",
            Stage::ClosedWon => "Closed Won",
            Stage::ClosedLost => "Closed Lost",
        }
    }

    /// Open stages are everything before the two terminal ones.
    pub fn is_open(&self) -> bool {
        !matches!(self, Stage::ClosedWon | Stage::ClosedLost)
    }
}

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    InApproval,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::InApproval,
        TaskStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::InApproval => "in_approval",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" => TaskStatus::InProgress,
            "in_approval" => TaskStatus::InApproval,
            "completed" => TaskStatus::Completed,
            _ => TaskStatus::Pending,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::InApproval => "In Approval",
            TaskStatus::Completed => "Completed",
        }
    }
}

/// A client account owned by a tenant organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub org_id: String,
    pub name: String,
    #[serde(default)]
    pub status: ClientStatus,
    /// Recurring retainer amount, if the client is on one.
    #[serde(default)]
    pub monthly_value: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// A sales opportunity on the pipeline board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub org_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Opportunity {
    /// Timestamp of the most recent change. Records never touched after
    /// creation have no `updated_at` and fall back to `created_at`.
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

/// A work item, optionally linked to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub org_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}
