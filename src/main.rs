use budget_ledger::{
    backend::{Backend, HttpBackend, MemoryBackend, SqliteBackend},
    config::{AppConfig, BackendKind, load_app_configuration},
    core::{
        aggregate::{format_progress_bar, format_remaining},
        session::Session,
    },
    errors::Result,
};
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal since variables can be set externally
    dotenv().ok();

    // 3. Load config.toml plus environment overrides
    let config = load_app_configuration()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;

    // 4. Build the configured backend and run
    match config.backend.kind {
        BackendKind::Http => {
            let backend = HttpBackend::new(&config.backend.base_url, config.request_timeout())?;
            info!(url = %backend.base_url(), "using HTTP backend");
            run(Arc::new(backend), &config).await
        }
        BackendKind::Sqlite => {
            let backend = SqliteBackend::open(&config.backend.data_dir)
                .await
                .inspect_err(|e| error!("Failed to open local databases: {}", e))?;
            info!(dir = %config.backend.data_dir.display(), "using SQLite backend");
            run(Arc::new(backend), &config).await
        }
        BackendKind::Memory => {
            info!("using in-memory backend, nothing will be kept");
            run(Arc::new(MemoryBackend::new()), &config).await
        }
    }
}

async fn run<B: Backend>(backend: Arc<B>, config: &AppConfig) -> Result<()> {
    let mut session = Session::start(backend, config)
        .await
        .inspect_err(|e| error!("Failed to load the ledger: {}", e))?;

    session.seed_categories(&config.categories)?;
    session.settle().await;

    print_dashboard(&session);
    for notification in session.take_notifications() {
        println!("{notification}");
    }

    if let Some(path) = &config.export_path {
        session.export_json(path)?;
        println!("Exported ledger to {}", path.display());
    }

    let unsynced = session.unsynced();
    if !unsynced.is_empty() {
        warn!(count = unsynced.len(), "changes could not be saved to the backend");
    }
    Ok(())
}

fn print_dashboard<B: Backend>(session: &Session<B>) {
    let summary = session.summary();
    let tenant = session.tenants().active().unwrap_or("?");

    println!("Budget ledger - database \"{tenant}\"");
    println!(
        "Budget ${:.2} | Spent ${:.2} | Remaining {}",
        summary.total_budget,
        summary.total_spent,
        format_remaining(summary.remaining)
    );
    println!(
        "Salary ${:.2} | Misc ${:.2} | Savings ${:.2}",
        summary.salary, summary.misc_spent, summary.savings
    );
    println!();

    for stats in &summary.categories {
        let flag = if stats.over_budget { " OVER" } else { "" };
        if stats.category.is_reserved() || stats.category.budget <= 0.0 {
            println!(
                "{:<16} ${:>9.2} spent ({} expenses)",
                stats.category.name, stats.spent, stats.expense_count
            );
        } else {
            println!(
                "{:<16} {}  ${:.2} / ${:.2}{flag}",
                stats.category.name,
                format_progress_bar(stats.percentage, None),
                stats.spent,
                stats.category.budget
            );
        }
    }

    let recent = session.recent_expenses(session.recent_limit());
    if !recent.is_empty() {
        println!();
        println!("Recent expenses");
        for item in recent {
            println!(
                "  {}  {:<16} {:<24} ${:.2}",
                item.expense.timestamp.format("%Y-%m-%d %H:%M"),
                item.category_name,
                item.expense.description,
                item.expense.amount
            );
        }
    }
}
