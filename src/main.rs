//! MetriGuard API - Metric Governance & Model Safety Core
//!
//! The trust layer of the BI dashboard: every other screen depends on
//! these numbers being correct and every governance action being provable
//! after the fact.
//!
//! GOVERNANCE CORE: Three engines run behind one tenant-scoped API:
//! - Consistency Engine: verifies the same business metric agrees across
//!   data paths within a fixed tolerance (SSOT checks)
//! - Drift Detector + Safety Governor: watches the decision-support model
//!   for behavioral drift and demotes/disables it before it causes harm
//! - Audit & Evidence Engine: tamper-evident record of every automated or
//!   human decision, exportable as hashed evidence packs

mod audit;
mod config;
mod consistency;
mod drift;
mod error;
mod routes;
mod source;
mod state;
mod tenant;

use crate::config::Settings;
use crate::routes::create_router;
use crate::source::{SnapshotSourceAdapter, SourceId};
use crate::state::AppState;
use crate::tenant::TenantId;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting MetriGuard - Metric Governance & Model Safety Core...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    // Snapshot-backed source adapter; production wires the warehouse
    // adapter in its place
    let adapter = Arc::new(SnapshotSourceAdapter::new());
    seed_demo_tenant(&adapter).await;

    let state = Arc::new(AppState::new(&settings, adapter));

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints (all tenant-scoped via x-tenant-id):");
    info!("   ─── Consistency Engine ───");
    info!("   GET  /api/consistency/report        - Latest consistency report");
    info!("");
    info!("   ─── Model Safety ───");
    info!("   POST /api/ml-monitoring/detect      - Run drift detection");
    info!("   POST /api/ml-monitoring/acknowledge - Acknowledge a signal");
    info!("   POST /api/ml-monitoring/reset-status - Human-gated de-escalation");
    info!("   GET  /api/ml-monitoring/status      - Governance state + signals");
    info!("");
    info!("   ─── Audit & Evidence ───");
    info!("   GET  /api/audit/events              - Query the audit trail");
    info!("   GET  /api/audit/evidence-pack/{{7d|30d|90d}} - Hashed evidence pack");
    info!("   GET  /api/audit/export?format=json|csv - Full audit export");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,metriguard_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Seed the demo tenant so a local deployment answers every endpoint
async fn seed_demo_tenant(adapter: &SnapshotSourceAdapter) {
    let tenant = TenantId::new("demo");

    // Consistency sources: dashboard and ledger agree on revenue, the
    // order rollup drifts slightly
    let pairs: [(&str, &str, f64); 8] = [
        ("sales_dashboard", "net_revenue", 1_250_400.0),
        ("finance_ledger", "net_revenue", 1_248_900.0),
        ("ops_orders", "order_count", 18_340.0),
        ("warehouse_orders", "order_count", 18_122.0),
        ("treasury_view", "cash_position", 402_180.0),
        ("bank_feed_snapshot", "cash_position", 402_180.0),
        ("sales_dashboard", "gross_margin", 0.41),
        ("finance_ledger", "gross_margin", 0.40),
    ];
    for (source, field, value) in pairs {
        adapter
            .put(&tenant, &SourceId::new(source), field, value)
            .await;
    }

    // Model outcome metrics: live sits close to baseline
    let outcomes: [(&str, &str, f64); 8] = [
        ("sku_outcomes_live", "decision-support-v1.accuracy", 0.91),
        ("sku_outcomes_baseline", "decision-support-v1.accuracy", 0.92),
        ("sku_outcomes_live", "decision-support-v1.calibration_error", 0.03),
        ("sku_outcomes_baseline", "decision-support-v1.calibration_error", 0.02),
        (
            "sku_outcomes_live",
            "decision-support-v1.automation_false_positive_rate",
            0.02,
        ),
        (
            "sku_outcomes_baseline",
            "decision-support-v1.automation_false_positive_rate",
            0.02,
        ),
        (
            "sku_outcomes_live",
            "decision-support-v1.population_stability_index",
            0.04,
        ),
        (
            "sku_outcomes_baseline",
            "decision-support-v1.population_stability_index",
            0.0,
        ),
    ];
    for (source, field, value) in outcomes {
        adapter
            .put(&tenant, &SourceId::new(source), field, value)
            .await;
    }

    info!("✅ Seeded snapshot sources for tenant 'demo'");
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
