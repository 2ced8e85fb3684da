use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use linealyzer::config;

#[derive(Parser)]
#[command(name = "linealyzer", about = "Daily activity dashboard for a Linear team")]
struct Cli {
    /// Database path (default: ~/.linealyzer/linealyzer.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Linear API key (default: $LINEAR_API_KEY, then stored config)
    #[arg(long)]
    token: Option<String>,

    /// GraphQL endpoint (default: https://api.linear.app/graphql)
    #[arg(long)]
    endpoint: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Page size for paged API requests (default: per-query)
    #[arg(long)]
    page_size: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List teams visible to the token
    Teams {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Per-member activity for one team and day
    Dashboard {
        /// Team ID (default: last used team)
        #[arg(long)]
        team: Option<String>,
        /// Day to inspect, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
        /// Days of comment history to scan for mentions (default: 14)
        #[arg(long)]
        lookback_days: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// State transitions of one issue
    History {
        /// Issue ID or identifier (e.g. ENG-123)
        issue: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value (token, team_id, lookback_days, endpoint)
    Set { key: String, value: String },
    /// Remove a config value
    Unset { key: String },
    /// List all config values
    List,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove every cached response
    Clear,
    /// Remove expired responses only
    Prune,
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
        Some(path) => linealyzer::Database::open_at(path).await?,
        None => linealyzer::Database::open().await?,
    };

    match cli.command {
        Commands::Config { action } => {
            handle_config(&db, action).await?;
        }
        Commands::Cache { action } => {
            let cache = linealyzer::ResponseCache::new(db, Arc::new(linealyzer::SystemClock));
            handle_cache(&cache, action).await?;
        }
        Commands::Teams { json } => {
            let app = connect(&cli.token, &cli.endpoint, cli.timeout_secs, cli.page_size, db).await?;
            handle_teams(&app, json).await?;
        }
        Commands::Dashboard {
            team,
            date,
            lookback_days,
            json,
        } => {
            let app = connect(&cli.token, &cli.endpoint, cli.timeout_secs, cli.page_size, db).await?;
            handle_dashboard(&app, team.as_deref(), date.as_deref(), lookback_days, json).await?;
        }
        Commands::History { issue, json } => {
            let app = connect(&cli.token, &cli.endpoint, cli.timeout_secs, cli.page_size, db).await?;
            handle_history(&app, &issue, json).await?;
        }
    }

    Ok(())
}

async fn connect(
    token: &Option<String>,
    endpoint: &Option<String>,
    timeout_secs: u64,
    page_size: Option<u32>,
    db: linealyzer::Database,
) -> anyhow::Result<linealyzer::Linealyzer> {
    let token = config::resolve_token(&db, token.as_deref()).await?;
    let endpoint = config::resolve_endpoint(&db, endpoint.as_deref()).await?;
    let options = linealyzer::HttpOptions::new(&endpoint, Duration::from_secs(timeout_secs))?;
    let transport = linealyzer::HttpTransport::new(&token, &options)?;
    let workspace = linealyzer::cache::workspace_fingerprint(&endpoint, &token);

    let mut app = linealyzer::Linealyzer::new(
        db,
        Arc::new(transport),
        Arc::new(linealyzer::SystemClock),
    )
    .with_workspace(workspace);
    if let Some(ps) = page_size {
        app = app.with_page_size(ps);
    }
    Ok(app)
}

async fn handle_config(db: &linealyzer::Database, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match config::get(db, &key).await? {
            Some(v) if key == config::TOKEN_KEY => println!("{}", config::mask(&v)),
            Some(v) => println!("{v}"),
            None => println!("(not set)"),
        },
        ConfigAction::Set { key, value } => {
            config::set(db, &key, &value).await?;
            println!("Set {key}");
        }
        ConfigAction::Unset { key } => {
            if config::unset(db, &key).await? {
                println!("Removed {key}");
            } else {
                println!("{key} was not set");
            }
        }
        ConfigAction::List => {
            let all = config::list(db).await?;
            if all.is_empty() {
                println!("No config values set.");
            }
            for (k, v) in all {
                let shown = if k == config::TOKEN_KEY { config::mask(&v) } else { v };
                println!("{k} = {shown}");
            }
        }
    }
    Ok(())
}

async fn handle_cache(cache: &linealyzer::ResponseCache, action: CacheAction) -> anyhow::Result<()> {
    match action {
        CacheAction::Clear => {
            let n = cache.clear().await?;
            println!("Removed {n} cached responses");
        }
        CacheAction::Prune => {
            let n = cache.prune_expired().await?;
            let left = cache.len().await?;
            println!("Removed {n} expired responses ({left} remaining)");
        }
    }
    Ok(())
}

async fn handle_teams(app: &linealyzer::Linealyzer, json: bool) -> anyhow::Result<()> {
    let teams = app.teams().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&teams)?);
        return Ok(());
    }
    if teams.is_empty() {
        println!("No teams found.");
        return Ok(());
    }
    let selected = config::get(app.db(), config::TEAM_KEY).await?;
    for t in &teams {
        let marker = if selected.as_deref() == Some(t.id.as_str()) { "*" } else { " " };
        println!("{marker} {} ({})  {}", t.name, t.key, t.id);
    }
    Ok(())
}

async fn handle_dashboard(
    app: &linealyzer::Linealyzer,
    team: Option<&str>,
    date: Option<&str>,
    lookback_days: Option<u32>,
    json: bool,
) -> anyhow::Result<()> {
    let team_id = config::resolve_team(app.db(), team).await?;
    let date = match date {
        Some(d) => linealyzer::date_util::parse_date(d)?,
        None => chrono::Local::now().date_naive(),
    };
    let lookback = config::resolve_lookback_days(app.db(), lookback_days).await?;

    let request = linealyzer::DashboardRequest::new(team_id, date).with_lookback_days(lookback);
    let dashboard = if team.is_some() {
        app.load_dashboard_and_select(&request).await?
    } else {
        app.load_dashboard(&request).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&dashboard)?);
    } else {
        print_dashboard(&dashboard);
    }
    Ok(())
}

async fn handle_history(app: &linealyzer::Linealyzer, issue: &str, json: bool) -> anyhow::Result<()> {
    let history = app.issue_history(issue).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }
    println!("History: {issue}");
    let transitions: Vec<_> = history.iter().filter(|h| h.is_transition()).collect();
    if transitions.is_empty() {
        println!("  No state changes");
    }
    for h in transitions {
        let from = h.from_state.as_ref().map(|s| s.name.as_str()).unwrap_or("-");
        let to = h.to_state.as_ref().map(|s| s.name.as_str()).unwrap_or("-");
        let actor = h.actor.as_ref().map(|a| a.name.as_str()).unwrap_or("system");
        println!(
            "  {}  {from} -> {to}  ({actor})",
            h.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn print_dashboard(dashboard: &linealyzer::Dashboard) {
    let totals = dashboard.totals();
    println!("Team {} on {}", dashboard.team_id, dashboard.date);
    println!(
        "  Members: {} ({} active)  Touched: {}  Created: {}  Completed: {}  Unanswered mentions: {}",
        totals.members,
        totals.active_members,
        totals.issues_touched,
        totals.issues_created,
        totals.issues_completed,
        totals.unresponsive_mentions
    );

    for m in &dashboard.members {
        println!();
        let name = if m.member.display_name.is_empty() {
            &m.member.name
        } else {
            &m.member.display_name
        };
        println!("{name} ({})", m.member.name);
        if m.is_idle() {
            println!("  No activity");
            continue;
        }
        println!(
            "  Worked on: {}  Created: {}  Completed: {}  Interacted: {}",
            m.worked_on.len(),
            m.created.len(),
            m.completed.len(),
            m.interacted.len()
        );
        print_issues("Worked on", &m.worked_on);
        print_issues("Created", &m.created);
        print_issues("Completed", &m.completed);
        print_issues("Interacted", &m.interacted);
        if !m.unresponsive_mentions.is_empty() {
            println!("  Unanswered mentions:");
            for mention in &m.unresponsive_mentions {
                println!(
                    "    {}  {} ({} ago)",
                    mention.issue_identifier,
                    mention.issue_title,
                    format_age(dashboard.generated_at - mention.mentioned_at)
                );
                println!("      \"{}\"", mention.comment_snippet.replace('\n', " "));
            }
        }
    }
}

fn print_issues(label: &str, issues: &[linealyzer::Issue]) {
    if issues.is_empty() {
        return;
    }
    println!("  {label}:");
    for i in issues {
        println!("    {}  {}  [{}]", i.identifier, i.title, i.state.name);
    }
}

fn format_age(age: chrono::Duration) -> String {
    let hours = age.num_hours().max(0);
    if hours >= 24 {
        format!("{}d {}h", hours / 24, hours % 24)
    } else {
        format!("{hours}h")
    }
}
