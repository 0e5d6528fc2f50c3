//! Closure Audit Binary
//!
//! Recomputes the template closure from the stored direct links, reports
//! drift, and optionally writes the repair delta.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (default: postgresql://localhost/templates)
//! - `AUDIT_REPAIR`: "1" to write the repair delta (default: report only)
//! - `AUDIT_ENSURE_SCHEMA`: "1" to create the link tables if missing
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://... AUDIT_REPAIR=1 cargo run --bin closure_audit --features postgres
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use template_graph_kernel::{EngineConfig, LinkEngine, PostgresLinkStore, LINK_SCHEMA_VERSION};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "closure_audit=info,template_graph_kernel=info,sqlx=warn".into());

    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true)
            )
            .init();
    }
}

fn env_flag(key: &str) -> bool {
    matches!(std::env::var(key).as_deref(), Ok("1") | Ok("true"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let version = env!("CARGO_PKG_VERSION");
    let repair = env_flag("AUDIT_REPAIR");
    info!(
        version = version,
        schema_version = LINK_SCHEMA_VERSION,
        repair = repair,
        "Starting closure audit"
    );

    info!("Connecting to PostgreSQL...");
    let connect_start = Instant::now();

    let store = match tokio::time::timeout(Duration::from_secs(30), PostgresLinkStore::from_env()).await {
        Ok(Ok(store)) => store,
        Ok(Err(e)) => {
            error!(error = %e, "Failed to connect to PostgreSQL");
            return Err(e.into());
        }
        Err(_) => {
            error!("PostgreSQL connection timeout after 30s");
            return Err("Database connection timeout".into());
        }
    };

    if !store.is_healthy().await {
        error!("PostgreSQL health check failed");
        return Err("Database health check failed".into());
    }

    info!(
        latency_ms = connect_start.elapsed().as_millis() as u64,
        "PostgreSQL connection established"
    );

    if env_flag("AUDIT_ENSURE_SCHEMA") {
        store.ensure_schema().await?;
        info!("Link tables ensured");
    }

    let config = EngineConfig::from_env();
    info!(
        config_version = %config.version,
        params_hash = %config.params_hash(),
        "Engine configuration loaded"
    );
    let engine = LinkEngine::new(Arc::new(store), config);

    let audit_start = Instant::now();
    let report = engine
        .audit(repair)
        .instrument(info_span!("audit", repair = repair))
        .await?;

    info!(
        schema_version = %report.schema_version,
        links = report.link_count,
        stored_rows = report.stored_rows,
        expected_rows = report.expected_rows,
        stored_fingerprint = %report.stored_fingerprint,
        expected_fingerprint = %report.expected_fingerprint,
        latency_ms = audit_start.elapsed().as_millis() as u64,
        "Audit completed"
    );

    if report.is_consistent() {
        info!("Closure is consistent with direct links");
    } else if repair {
        info!(
            inserted = report.missing_rows(),
            deleted = report.stale_rows(),
            "Closure repaired"
        );
    } else {
        warn!(
            missing_rows = report.missing_rows(),
            stale_rows = report.stale_rows(),
            "Closure drift detected; rerun with AUDIT_REPAIR=1 to repair"
        );
        println!("{}", serde_json::to_string_pretty(&report.repair)?);
        std::process::exit(2);
    }

    Ok(())
}
