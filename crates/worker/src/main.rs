use advisor_core::config::Settings;
use advisor_core::engine::{AdvisorEngine, PolicyConfig};
use advisor_core::narrative::anthropic::AnthropicClient;
use advisor_core::narrative::NarrativeClient;
use advisor_core::storage::client_forms::{self, FormCursor};
use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod offline;
mod poller;

#[derive(Debug, Parser)]
#[command(name = "advisor_worker")]
struct Args {
    /// Seconds between polls of `client_forms`.
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,

    /// Maximum forms processed per poll.
    #[arg(long, default_value_t = 100)]
    batch_size: i64,

    /// Process forms newer than this RFC 3339 timestamp instead of the newest form at startup.
    #[arg(long)]
    since: Option<String>,

    /// Run a single poll and exit.
    #[arg(long)]
    once: bool,

    /// Do everything except writing to the database.
    #[arg(long)]
    dry_run: bool,

    /// Advise a JSON array of client records from a file and print the results.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Do not ask the language model for a narrative.
    #[arg(long)]
    skip_narrative: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let policy = PolicyConfig::load(&settings)?;
    let engine = AdvisorEngine::new(policy).context("policy rejected by the engine")?;

    if let Some(path) = args.input.as_deref() {
        return offline::run(&engine, path);
    }

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    advisor_core::storage::migrate(&pool).await?;

    let Some(lock) = advisor_core::storage::lock::PollerLock::try_acquire(&pool).await? else {
        tracing::warn!("poller lock not acquired; another worker is running");
        return Ok(());
    };

    let narrator = build_narrator(&settings, args.skip_narrative);
    let cursor = resolve_start_cursor(&pool, args.since.as_deref()).await?;

    let poller = poller::Poller {
        engine,
        pool: pool.clone(),
        narrator,
        batch_size: args.batch_size.max(1),
        dry_run: args.dry_run,
    };

    tracing::info!(
        %cursor,
        interval_secs = args.interval_secs,
        once = args.once,
        dry_run = args.dry_run,
        "worker started"
    );

    poller
        .run(cursor, Duration::from_secs(args.interval_secs), args.once)
        .await;

    if let Err(err) = lock.release().await {
        tracing::warn!(error = %err, "failed to release poller lock");
    }
    Ok(())
}

fn build_narrator(settings: &Settings, skip: bool) -> Option<Box<dyn NarrativeClient>> {
    if skip {
        return None;
    }
    match AnthropicClient::from_settings(settings) {
        Ok(client) => Some(Box::new(client)),
        Err(err) => {
            tracing::warn!(error = %err, "narrative client unavailable; persisting without narratives");
            None
        }
    }
}

async fn resolve_start_cursor(
    pool: &sqlx::PgPool,
    since_arg: Option<&str>,
) -> anyhow::Result<FormCursor> {
    if let Some(s) = since_arg {
        let parsed = DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("--since must be an RFC 3339 timestamp (got {s:?})"))?;
        return Ok(FormCursor::after_time(parsed.with_timezone(&Utc)));
    }

    // Only forms submitted after startup are processed by default.
    let latest = client_forms::latest_cursor(pool).await?;
    Ok(latest.unwrap_or(FormCursor::START))
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
