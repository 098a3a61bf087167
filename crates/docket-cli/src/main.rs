//! docket - a headless command-line client for the case-management API.
//!
//! Exercises the data layer against a live server: sign in, list resources
//! through the query cache, complete deadlines through the optimistic
//! mutation protocol and inspect cache state.

use std::io::{self, Write};

use anyhow::{anyhow, bail, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use docket_core::data;
use docket_core::models::{CaseStatus, TaskStatus};
use docket_core::query::QueryState;
use docket_core::store::{CaseStatusFilter, TaskStatusFilter};
use docket_core::{AppContext, Config};

const USAGE: &str = "\
Usage: docket <command> [args]

Commands:
  login [email]          Sign in and store the session
  logout                 Clear the session
  whoami                 Show the signed-in user
  clients                List clients
  cases [status]         List cases (OPEN, PENDING_HEARING, UNDER_APPEAL, CLOSED)
  deadlines [days]       List upcoming deadlines (default 7 days)
  tasks [status]         List tasks (OPEN, IN_PROGRESS, DONE)
  complete <deadline-id> Mark a deadline as completed
  notifications          List notifications and the unread count
  cache-stats            Show query and TTL cache statistics";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=docket_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let config = Config::load()?;
    let ctx = AppContext::from_config(config)?;
    info!(base_url = ctx.api.base_url(), "docket starting");

    match command.as_str() {
        "login" => login(&ctx, args.get(1).map(String::as_str)).await,
        "logout" => {
            ctx.logout();
            println!("Logged out.");
            Ok(())
        }
        "whoami" => whoami(&ctx),
        "clients" => clients(&ctx).await,
        "cases" => cases(&ctx, args.get(1).map(String::as_str)).await,
        "deadlines" => deadlines(&ctx, args.get(1).map(String::as_str)).await,
        "tasks" => tasks(&ctx, args.get(1).map(String::as_str)).await,
        "complete" => complete(&ctx, args.get(1).map(String::as_str)).await,
        "notifications" => notifications(&ctx).await,
        "cache-stats" => cache_stats(&ctx).await,
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn login(ctx: &AppContext, email: Option<&str>) -> Result<()> {
    let email = match email.or(ctx.config.last_email.as_deref()) {
        Some(email) => email.to_string(),
        None => prompt("Email: ")?,
    };
    let password = rpassword::prompt_password("Password: ")?;
    if email.is_empty() || password.is_empty() {
        bail!("Email and password required");
    }

    let user = ctx.login(&email, &password).await?;

    let mut config = ctx.config.clone();
    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    println!("Signed in as {} {} ({:?})", user.first_name, user.last_name, user.role);
    Ok(())
}

fn whoami(ctx: &AppContext) -> Result<()> {
    let state = ctx.auth.snapshot();
    if state.is_session_expired() {
        println!("{} (no active session)", state.user_display_name());
    } else {
        println!(
            "{} - session expires in {} minutes",
            state.user_display_name(),
            state.minutes_until_expiry()
        );
    }
    Ok(())
}

fn require_session(ctx: &AppContext) -> Result<()> {
    if ctx.auth.is_session_expired() {
        bail!("No active session. Run `docket login` first.");
    }
    Ok(())
}

/// Turn a settled query into its data or an error for the terminal.
fn settled_data<T>(state: QueryState<T>) -> Result<std::sync::Arc<T>> {
    if let Some(error) = state.error {
        if state.data.is_none() {
            return Err(anyhow!(error));
        }
        warn!(error = %error, "Showing cached data after a failed refresh");
    }
    state.data.ok_or_else(|| anyhow!("No data returned"))
}

async fn clients(ctx: &AppContext) -> Result<()> {
    require_session(ctx)?;
    let mut handle = data::clients(ctx);
    let clients = settled_data(handle.settled().await)?;
    for client in clients.iter() {
        println!("{:>6}  {}", client.id, client.full_name());
    }
    Ok(())
}

async fn cases(ctx: &AppContext, status: Option<&str>) -> Result<()> {
    require_session(ctx)?;
    if let Some(status) = status {
        let status = CaseStatus::parse(status).ok_or_else(|| anyhow!("Unknown case status: {}", status))?;
        ctx.filters.set_case_filters(|f| {
            f.status = match status {
                CaseStatus::Open => CaseStatusFilter::Open,
                CaseStatus::PendingHearing => CaseStatusFilter::PendingHearing,
                CaseStatus::UnderAppeal => CaseStatusFilter::UnderAppeal,
                CaseStatus::Closed => CaseStatusFilter::Closed,
            }
        });
    }

    let query = ctx.filters.snapshot().case_filters.to_query();
    let mut handle = data::cases(ctx, &query);
    let cases = settled_data(handle.settled().await)?;
    for case in cases.iter() {
        println!("{:>6}  {:<14} {:<16} {}", case.id, case.case_number, case.status.as_str(), case.title);
    }
    Ok(())
}

async fn deadlines(ctx: &AppContext, days: Option<&str>) -> Result<()> {
    require_session(ctx)?;
    let days = match days {
        Some(days) => days.parse().map_err(|_| anyhow!("Invalid day count: {}", days))?,
        None => 7,
    };

    let mut handle = data::upcoming_deadlines(ctx, days);
    let deadlines = settled_data(handle.settled().await)?;
    for deadline in deadlines.iter() {
        let mark = if deadline.completed { "x" } else { " " };
        println!("[{}] {:>6}  {}  {}", mark, deadline.id, deadline.due_date, deadline.title);
    }
    Ok(())
}

async fn tasks(ctx: &AppContext, status: Option<&str>) -> Result<()> {
    require_session(ctx)?;
    if let Some(status) = status {
        let status = TaskStatus::parse(status).ok_or_else(|| anyhow!("Unknown task status: {}", status))?;
        ctx.filters.set_task_filters(|f| {
            f.status = match status {
                TaskStatus::Open => TaskStatusFilter::Open,
                TaskStatus::InProgress => TaskStatusFilter::InProgress,
                TaskStatus::Done => TaskStatusFilter::Completed,
            }
        });
    }

    let query = ctx.filters.snapshot().task_filters.to_query();
    let mut handle = data::tasks(ctx, &query);
    let tasks = settled_data(handle.settled().await)?;
    for task in tasks.iter() {
        println!("{:>6}  {:?}  {}", task.id, task.status, task.title);
    }
    Ok(())
}

async fn complete(ctx: &AppContext, id: Option<&str>) -> Result<()> {
    require_session(ctx)?;
    let id: i64 = id
        .ok_or_else(|| anyhow!("Usage: docket complete <deadline-id>"))?
        .parse()
        .map_err(|_| anyhow!("Deadline id must be a number"))?;

    // Load the list first so the optimistic patch has something to update
    let mut list = data::upcoming_deadlines(ctx, 7);
    list.settled().await;

    let mutation = data::complete_deadline(ctx);
    match mutation.mutate(id).await {
        Ok(deadline) => {
            println!("Completed: {}", deadline.title);
            Ok(())
        }
        Err(e) => {
            let still_open = list
                .data()
                .map(|deadlines| deadlines.iter().any(|d| d.id == id && !d.completed))
                .unwrap_or(false);
            if still_open {
                eprintln!("Deadline {} was restored to open.", id);
            }
            Err(anyhow!(e))
        }
    }
}

async fn notifications(ctx: &AppContext) -> Result<()> {
    require_session(ctx)?;
    let mut list = data::notifications(ctx);
    let mut unread = data::unread_count(ctx);

    let notifications = settled_data(list.settled().await)?;
    let count = settled_data(unread.settled().await)?;
    ctx.ui.set_unread_notifications_count(*count);

    println!("{} unread", count);
    for n in notifications.iter() {
        let mark = if n.is_read { " " } else { "*" };
        println!("{} {:>6}  {}  {}", mark, n.id, n.title, n.message);
    }
    Ok(())
}

async fn cache_stats(ctx: &AppContext) -> Result<()> {
    if !ctx.auth.is_session_expired() {
        let mut handle = data::clients(ctx);
        handle.settled().await;
    }

    let ttl = ctx.ttl.stats();
    println!("Query cache entries: {}", ctx.queries.len());
    println!(
        "TTL cache: {} total, {} valid, {} expired",
        ttl.total, ttl.valid, ttl.expired
    );
    println!("Search history: {:?}", ctx.ui.snapshot().search_history);
    Ok(())
}
