use clap::{Parser, Subcommand};

use crmdw::{CrmDw, Period, Stage};

#[derive(Parser)]
#[command(name = "crmdw", about = "CRM metrics warehouse CLI")]
struct Cli {
    /// Database path (default: ~/.crmdw/crmdw.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a JSON export from the hosted backend
    Import {
        /// Path to the bundle file ({"clients": [...], "opportunities": [...], "tasks": [...]})
        file: String,
    },
    /// Full dashboard: metrics, recent activity, and ranked insights
    Dashboard {
        /// Tenant organization id (auto-detected when the warehouse has one)
        #[arg(long)]
        tenant: Option<String>,
        /// Period token (today, yesterday, 7, 14, 30, current_month, last_month, 3m, 6m, 12m, 24m)
        #[arg(long, default_value = "6m")]
        period: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Aggregated metrics for a period
    Metrics {
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long, default_value = "6m")]
        period: String,
        #[arg(long)]
        json: bool,
    },
    /// Recent-activity feed
    Activity {
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long, default_value = "6m")]
        period: String,
        #[arg(long)]
        json: bool,
    },
    /// Ranked heuristic insights
    Insights {
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long, default_value = "6m")]
        period: String,
        #[arg(long)]
        json: bool,
    },
    /// Query opportunities with filters
    Query {
        #[arg(long)]
        tenant: Option<String>,
        /// Filter by client id
        #[arg(long)]
        client: Option<String>,
        /// Filter by stage (prospection, qualification, proposal, negotiation, closed_won, closed_lost)
        #[arg(long)]
        stage: Option<String>,
        /// Open stages only
        #[arg(long)]
        open: bool,
        /// Closed stages only
        #[arg(long)]
        closed: bool,
        /// Minimum deal value
        #[arg(long)]
        min_value: Option<f64>,
        /// Maximum deal value
        #[arg(long)]
        max_value: Option<f64>,
        /// Created after date (YYYY-MM-DD)
        #[arg(long)]
        created_after: Option<String>,
        /// Created before date (YYYY-MM-DD)
        #[arg(long)]
        created_before: Option<String>,
        /// Maximum results
        #[arg(long, default_value = "100")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Output as CSV
        #[arg(long)]
        csv: bool,
        /// Count only (no output rows)
        #[arg(long)]
        count: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show warehouse status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => crmdw::Database::open_at(path).await?,
        None => crmdw::Database::open().await?,
    };
    let dw = CrmDw::new(db);

    match cli.command {
        Commands::Import { file } => {
            let report = dw.import_file(&file).await?;
            println!("Imported {} records:", report.total());
            println!("  Clients:       {}", report.clients);
            println!("  Opportunities: {}", report.opportunities);
            println!("  Tasks:         {}", report.tasks);
        }
        Commands::Dashboard { tenant, period, json } => {
            let tenant = dw.resolve_tenant(tenant.as_deref()).await?;
            let period = Period::parse(&period);
            let snapshot = dw.dashboard(tenant.as_deref(), &period).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!(
                    "Dashboard: {} ({})",
                    tenant.as_deref().unwrap_or("(no tenant)"),
                    snapshot.period_key
                );
                print_metrics(&snapshot.metrics);
                print_activity(&snapshot.recent_activity);
                print_insights(&snapshot.insights);
            }
        }
        Commands::Metrics { tenant, period, json } => {
            let tenant = dw.resolve_tenant(tenant.as_deref()).await?;
            let period = Period::parse(&period);
            let m = dw.metrics(tenant.as_deref(), &period).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&m)?);
            } else {
                println!(
                    "Metrics: {} ({})",
                    tenant.as_deref().unwrap_or("(no tenant)"),
                    period
                );
                print_metrics(&m);
            }
        }
        Commands::Activity { tenant, period, json } => {
            let tenant = dw.resolve_tenant(tenant.as_deref()).await?;
            let period = Period::parse(&period);
            let feed = dw.recent_activity(tenant.as_deref(), &period).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&feed)?);
            } else if feed.is_empty() {
                println!("No recent activity.");
            } else {
                print_activity(&feed);
            }
        }
        Commands::Insights { tenant, period, json } => {
            let tenant = dw.resolve_tenant(tenant.as_deref()).await?;
            let period = Period::parse(&period);
            let insights = dw.insights(tenant.as_deref(), &period).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&insights)?);
            } else if insights.is_empty() {
                println!("No insights triggered.");
            } else {
                print_insights(&insights);
            }
        }
        Commands::Query {
            tenant,
            client,
            stage,
            open,
            closed,
            min_value,
            max_value,
            created_after,
            created_before,
            limit,
            json,
            csv,
            count,
        } => {
            let tenant = dw
                .resolve_tenant(tenant.as_deref())
                .await?
                .ok_or_else(|| anyhow::anyhow!("No tenant found. Run 'crmdw import' first."))?;
            handle_query(
                &dw,
                &tenant,
                client.as_deref(),
                stage.as_deref(),
                open,
                closed,
                min_value,
                max_value,
                created_after.as_deref(),
                created_before.as_deref(),
                limit,
                json,
                csv,
                count,
            )
            .await?;
        }
        Commands::Config { action } => {
            handle_config(&dw, action).await?;
        }
        Commands::Status => {
            print_status(&dw).await?;
        }
    }

    Ok(())
}

fn parse_stage(s: &str) -> anyhow::Result<Stage> {
    Stage::ALL
        .into_iter()
        .find(|stage| stage.as_str() == s)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown stage: {s}. Use: prospection, qualification, proposal, negotiation, closed_won, closed_lost"
            )
        })
}

#[allow(clippy::too_many_arguments)]
async fn handle_query(
    dw: &CrmDw,
    tenant: &str,
    client: Option<&str>,
    stage: Option<&str>,
    open: bool,
    closed: bool,
    min_value: Option<f64>,
    max_value: Option<f64>,
    created_after: Option<&str>,
    created_before: Option<&str>,
    limit: u32,
    json: bool,
    csv: bool,
    count: bool,
) -> anyhow::Result<()> {
    let mut builder = crmdw::QueryBuilder::new()
        .org(tenant)
        .limit(limit)
        .order_by("o.created_at")
        .descending();

    if let Some(c) = client {
        builder = builder.client(c);
    }
    if let Some(s) = stage {
        builder = builder.stage(parse_stage(s)?);
    }
    if open {
        builder = builder.open(true);
    }
    if closed {
        builder = builder.open(false);
    }
    if let Some(v) = min_value {
        builder = builder.min_value(v);
    }
    if let Some(v) = max_value {
        builder = builder.max_value(v);
    }
    if let Some(d) = created_after {
        builder = builder.created_after(d);
    }
    if let Some(d) = created_before {
        builder = builder.created_before(d);
    }

    if count {
        let n = builder.count(dw.db()).await?;
        println!("{n}");
    } else if json {
        let output = builder.to_json(dw.db()).await?;
        println!("{output}");
    } else if csv {
        let output = builder.to_csv(dw.db()).await?;
        print!("{output}");
    } else {
        let rows = builder.rows(dw.db()).await?;
        if rows.is_empty() {
            println!("No opportunities found.");
        } else {
            for row in &rows {
                let client = row.client_name.as_deref().unwrap_or("no client");
                let value = row
                    .value
                    .map(|v| format!("${v:.2}"))
                    .unwrap_or_else(|| "no value".to_string());
                println!(
                    "[{}] {} ({}) - {client} | {value} | created: {}",
                    row.stage, row.title, row.id, row.created_at
                );
            }
            println!("\n{} opportunities", rows.len());
        }
    }

    Ok(())
}

async fn handle_config(dw: &CrmDw, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let val = dw.config_get(&key).await?;
            match val {
                Some(v) => println!("{key} = {v}"),
                None => println!("{key} is not set"),
            }
        }
        ConfigAction::Set { key, value } => {
            dw.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = dw.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn print_status(dw: &CrmDw) -> anyhow::Result<()> {
    let stats = dw
        .db()
        .reader()
        .call(|conn| {
            let clients: i64 =
                conn.query_row("SELECT COUNT(*) FROM clients", [], |row| row.get(0))?;
            let opportunities: i64 =
                conn.query_row("SELECT COUNT(*) FROM opportunities", [], |row| row.get(0))?;
            let tasks: i64 = conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
            let orgs = crmdw::storage::repository::list_org_ids(conn)?;
            let last_import =
                crmdw::storage::repository::get_config(conn, "last_import_at")?;
            Ok::<_, rusqlite::Error>((clients, opportunities, tasks, orgs, last_import))
        })
        .await?;

    let (clients, opportunities, tasks, orgs, last_import) = stats;
    println!("Warehouse Status");
    println!("  Clients:       {clients}");
    println!("  Opportunities: {opportunities}");
    println!("  Tasks:         {tasks}");
    println!(
        "  Tenants:       {}",
        if orgs.is_empty() {
            "none".to_string()
        } else {
            orgs.join(", ")
        }
    );
    println!(
        "  Last import:   {}",
        last_import.unwrap_or_else(|| "never".to_string())
    );
    Ok(())
}

fn print_metrics(m: &crmdw::MetricsRecord) {
    println!("  Clients:");
    println!("    New in period: {}", m.total_clients);
    println!("    Active now:    {}", m.active_clients);
    println!("  Opportunities:");
    println!("    New in period: {}", m.total_opportunities);
    println!("    Won in period: {}", m.won_opportunities);
    println!("    Conversion:    {:.1}%", m.conversion_rate);
    println!("  Revenue:         ${:.2}", m.total_revenue);
    println!("  Tasks:");
    println!("    Pending:       {}", m.pending_tasks);
    println!("    Completed:     {}", m.completed_tasks);
    println!("  Pipeline:");
    for bucket in &m.opportunities_by_stage {
        println!("    {:<14} {}", bucket.label, bucket.count);
    }
}

fn print_activity(feed: &[crmdw::ActivityItem]) {
    println!("  Recent activity:");
    for item in feed {
        if item.detail.is_empty() {
            println!("    - {}", item.title);
        } else {
            println!("    - {} ({})", item.title, item.detail);
        }
    }
}

fn print_insights(insights: &[crmdw::Insight]) {
    println!("  Insights:");
    for insight in insights {
        println!(
            "    [{:?}] {} (urgency {:.0})",
            insight.priority, insight.title, insight.urgency_score
        );
        println!("      {}", insight.description);
        for action in &insight.action_items {
            println!("      - {action}");
        }
    }
}
