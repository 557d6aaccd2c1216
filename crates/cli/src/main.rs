use std::sync::Arc;
use std::time::Duration;

use loadwatch_core::config::LoadwatchCfg;
use loadwatch_core::network::{LinkAttributes, StaticLink};
use loadwatch_core::runtime::Runtime;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DB_CONNECT_TIMEOUT_SECS: u64 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries alerts, logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOADWATCH_LOG_JSON").is_ok() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    // DATABASE_URL (optional, no DB = ephemeral mode)
    let pool = match std::env::var("DATABASE_URL") {
        Ok(url) => connect(&url).await,
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, running in ephemeral mode");
            None
        }
    };

    let cfg = match &pool {
        Some(pool) => LoadwatchCfg::load(pool).await?,
        None => LoadwatchCfg::default(),
    };
    let link = Arc::new(StaticLink(host_link(&cfg)));

    let (mut runtime, mut alerts) = Runtime::new(cfg, pool, link);
    runtime.register_host_samplers();

    let printer = tokio::spawn(async move {
        while let Some(alert) = alerts.recv().await {
            println!("[{}] {}: {}", alert.severity.as_db_str(), alert.title, alert.message);
        }
    });

    runtime.run().await;
    drop(runtime);
    let _ = printer.await;
    Ok(())
}

/// Connect and migrate, or fall back to ephemeral mode.
async fn connect(url: &str) -> Option<sqlx::PgPool> {
    let connect_result = tokio::time::timeout(
        Duration::from_secs(DB_CONNECT_TIMEOUT_SECS),
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect(url),
    )
    .await;

    match connect_result {
        Ok(Ok(pool)) => match sqlx::migrate!("../../migrations").run(&pool).await {
            Ok(()) => {
                tracing::info!("database connected and migrations applied");
                Some(pool)
            }
            Err(e) => {
                tracing::warn!(error = %e, "database migration failed, falling back to ephemeral mode");
                None
            }
        },
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "failed to connect DATABASE_URL, falling back to ephemeral mode");
            None
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = DB_CONNECT_TIMEOUT_SECS,
                "database connect timed out, falling back to ephemeral mode"
            );
            None
        }
    }
}

/// Link labels known without a radio driver: the configured router and the
/// first resolver from `/etc/resolv.conf`.
fn host_link(cfg: &LoadwatchCfg) -> LinkAttributes {
    let dns_server = std::fs::read_to_string("/etc/resolv.conf").ok().and_then(|s| {
        s.lines()
            .filter_map(|l| l.trim().strip_prefix("nameserver"))
            .map(|rest| rest.trim().to_string())
            .find(|ip| !ip.is_empty())
    });
    LinkAttributes {
        router_ip: Some(cfg.router_host.clone()),
        dns_server,
        ..LinkAttributes::default()
    }
}
